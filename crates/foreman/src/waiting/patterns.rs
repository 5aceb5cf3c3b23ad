// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Layer 3: output pattern scan.
//!
//! Runs against each `session.output` batch. Immediate patterns (known
//! prompt dialogs) signal at once; question patterns arm an idle timer that
//! fires only if the session stays quiet; the completion sentinel both
//! signals and requests a review.

use std::collections::HashMap;
use std::sync::OnceLock;
use std::time::Duration;

use regex::Regex;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::event::{EventBus, SessionEvent};
use crate::model::{ReviewTrigger, WaitReason};
use crate::review::ReviewRequest;

use super::{DetectorHandle, SignalLayer, WaitingSignal};

/// Literal sentinel the assistant prints when it believes the task is done.
pub const COMPLETION_SENTINEL: &str = "---TASK_COMPLETE---";

/// Dialog fragments that mean the assistant is blocked on a prompt right now.
const IMMEDIATE_PATTERNS: &[&str] = &[
    "Do you want to proceed?",
    "Allow this action?",
    "Do you trust the files in this folder?",
    "❯ 1.",
];

fn question_patterns() -> &'static [Regex] {
    static PATTERNS: OnceLock<Vec<Regex>> = OnceLock::new();
    PATTERNS.get_or_init(|| {
        [
            r"\?\s*$",
            r"^\s*What would you like",
            r"^\s*Should I\b",
            r"^\s*Would you like",
            r"^\s*Which (?:option|approach|one)\b",
        ]
        .iter()
        .filter_map(|p| Regex::new(p).ok())
        .collect()
    })
}

/// Scan outcome for one output batch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScanOutcome {
    pub immediate: bool,
    pub question: bool,
    pub completion: bool,
}

/// Scan a batch of new output lines.
pub fn scan_lines(lines: &[String]) -> ScanOutcome {
    let mut outcome = ScanOutcome::default();
    for line in lines {
        if line.contains(COMPLETION_SENTINEL) {
            outcome.completion = true;
        }
        if IMMEDIATE_PATTERNS.iter().any(|p| line.contains(p)) {
            outcome.immediate = true;
        }
        if question_patterns().iter().any(|r| r.is_match(line)) {
            outcome.question = true;
        }
    }
    outcome
}

/// Task scanning `session.output` events against the pattern lists.
pub struct OutputScanner {
    events: EventBus,
    detector: DetectorHandle,
    review_tx: mpsc::Sender<ReviewRequest>,
    idle_threshold: Duration,
    shutdown: CancellationToken,
}

impl OutputScanner {
    pub fn new(
        events: EventBus,
        detector: DetectorHandle,
        review_tx: mpsc::Sender<ReviewRequest>,
        idle_threshold: Duration,
        shutdown: CancellationToken,
    ) -> Self {
        Self { events, detector, review_tx, idle_threshold, shutdown }
    }

    pub async fn run(self) {
        let mut rx = self.events.subscribe_session();
        // Question candidates awaiting their quiet period.
        let mut armed: HashMap<String, Instant> = HashMap::new();

        loop {
            let next_deadline = armed.values().copied().min();

            tokio::select! {
                _ = self.shutdown.cancelled() => break,
                event = rx.recv() => {
                    match event {
                        Ok(SessionEvent::Output { session_id, lines }) => {
                            // Any new output supersedes an armed question.
                            armed.remove(&session_id);
                            self.handle_output(&session_id, &lines, &mut armed).await;
                        }
                        Ok(SessionEvent::Status { session_id, new, .. }) if new.is_terminal() => {
                            armed.remove(&session_id);
                        }
                        Ok(_) => {}
                        Err(tokio::sync::broadcast::error::RecvError::Lagged(_)) => continue,
                        Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
                    }
                }
                _ = super::deadline_sleep(next_deadline) => {
                    let now = Instant::now();
                    let due: Vec<String> = armed
                        .iter()
                        .filter(|(_, deadline)| **deadline <= now)
                        .map(|(k, _)| k.clone())
                        .collect();
                    for session_id in due {
                        armed.remove(&session_id);
                        self.detector
                            .signal(WaitingSignal {
                                session_id,
                                waiting: true,
                                reason: WaitReason::Question,
                                layer: SignalLayer::Output,
                                context: None,
                            })
                            .await;
                    }
                }
            }
        }
    }

    async fn handle_output(
        &self,
        session_id: &str,
        lines: &[String],
        armed: &mut HashMap<String, Instant>,
    ) {
        let outcome = scan_lines(lines);

        if outcome.completion {
            self.detector
                .signal(WaitingSignal {
                    session_id: session_id.to_owned(),
                    waiting: true,
                    reason: WaitReason::Stopped,
                    layer: SignalLayer::Output,
                    context: Some(COMPLETION_SENTINEL.to_owned()),
                })
                .await;
            let _ = self
                .review_tx
                .send(ReviewRequest {
                    session_id: session_id.to_owned(),
                    trigger: ReviewTrigger::CompletionSignal,
                })
                .await;
        }

        if outcome.immediate {
            self.detector
                .signal(WaitingSignal {
                    session_id: session_id.to_owned(),
                    waiting: true,
                    reason: WaitReason::PermissionPrompt,
                    layer: SignalLayer::Output,
                    context: None,
                })
                .await;
        } else if outcome.question {
            armed.insert(session_id.to_owned(), Instant::now() + self.idle_threshold);
        }
    }
}

#[cfg(test)]
#[path = "patterns_tests.rs"]
mod tests;
