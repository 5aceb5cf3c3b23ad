// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Completion reviews: assemble the evidence, ask the reviewer CLI, parse
//! the tri-valued verdict, and drive the ticket into `review` on
//! `complete`. Reviewer failure never transitions a ticket.

pub mod driver;
pub mod runner;

pub use driver::{CliReviewerDriver, ReviewerDriver};

use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tracing::{info, warn};

use crate::error::ApiError;
use crate::event::{EventBus, ReviewEvent};
use crate::model::{
    NotificationKind, ReviewDecision, ReviewResult, ReviewTrigger, Session, TicketState,
    TransitionReason, Trigger,
};
use crate::store::Store;
use crate::supervisor::Supervisor;
use crate::tickets::{files, TicketService, TransitionRequest};
use crate::vcs;

/// A request for a review of one session's ticket.
#[derive(Debug, Clone)]
pub struct ReviewRequest {
    pub session_id: String,
    pub trigger: ReviewTrigger,
}

/// Static reviewer configuration.
pub struct ReviewerSettings {
    pub timeout: Duration,
    pub output_tail: usize,
    pub model: Option<String>,
}

impl Default for ReviewerSettings {
    fn default() -> Self {
        Self { timeout: Duration::from_secs(30), output_tail: 100, model: None }
    }
}

pub struct Reviewer {
    store: Arc<Store>,
    events: EventBus,
    supervisor: Arc<Supervisor>,
    tickets: Arc<TicketService>,
    driver: Arc<dyn ReviewerDriver>,
    settings: ReviewerSettings,
    in_flight: Arc<Mutex<HashSet<String>>>,
}

/// Releases the per-ticket review slot on drop.
struct InFlightGuard {
    set: Arc<Mutex<HashSet<String>>>,
    ticket_id: String,
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.set.lock().remove(&self.ticket_id);
    }
}

impl Reviewer {
    pub fn new(
        store: Arc<Store>,
        events: EventBus,
        supervisor: Arc<Supervisor>,
        tickets: Arc<TicketService>,
        driver: Arc<dyn ReviewerDriver>,
        settings: ReviewerSettings,
    ) -> Self {
        Self {
            store,
            events,
            supervisor,
            tickets,
            driver,
            settings,
            in_flight: Arc::new(Mutex::new(HashSet::new())),
        }
    }

    /// Review the ticket a session is working on. `None` when the session
    /// has no ticket.
    pub async fn review_session(
        &self,
        session_id: &str,
        trigger: ReviewTrigger,
    ) -> Result<Option<ReviewResult>, ApiError> {
        let session = self
            .store
            .get_session(session_id)?
            .ok_or_else(|| ApiError::not_found("session", session_id))?;
        let Some(ticket_id) = session.ticket_id.clone() else {
            return Ok(None);
        };
        self.review(&session, &ticket_id, trigger).await.map(Some)
    }

    /// Run one review. At most one review per ticket at a time.
    pub async fn review(
        &self,
        session: &Session,
        ticket_id: &str,
        trigger: ReviewTrigger,
    ) -> Result<ReviewResult, ApiError> {
        let ticket = self
            .store
            .get_ticket(ticket_id)?
            .ok_or_else(|| ApiError::not_found("ticket", ticket_id))?;
        if ticket.state != TicketState::InProgress {
            return Err(ApiError::conflict(format!(
                "ticket {ticket_id} is not in progress (state: {})",
                ticket.state
            )));
        }

        let _guard = {
            let mut in_flight = self.in_flight.lock();
            if !in_flight.insert(ticket_id.to_owned()) {
                return Err(ApiError::conflict(format!(
                    "a review is already running for ticket {ticket_id}"
                )));
            }
            InFlightGuard { set: Arc::clone(&self.in_flight), ticket_id: ticket_id.to_owned() }
        };

        let project = self
            .store
            .get_project(&ticket.project_id)?
            .ok_or_else(|| ApiError::not_found("project", &ticket.project_id))?;

        // Assemble evidence, all best-effort.
        let ticket_content =
            files::read_content(&project, &ticket.file_path).await.unwrap_or_default();
        let git_diff = vcs::collect_diff(Path::new(&project.repo_path)).await;
        let session_output = self
            .supervisor
            .get_output(&session.id, Some(self.settings.output_tail))
            .unwrap_or_default()
            .join("\n");

        let prompt = build_prompt(&ticket_content, &git_diff, None, &session_output);

        let raw = match tokio::time::timeout(
            self.settings.timeout,
            self.driver.run(&prompt, self.settings.model.as_deref(), self.settings.timeout),
        )
        .await
        {
            Err(_) => {
                let error = format!(
                    "review timed out after {}ms",
                    self.settings.timeout.as_millis()
                );
                self.emit_failed(&session.id, ticket_id, &error);
                return Err(ApiError::timeout(error));
            }
            Ok(Err(e)) => {
                let error = format!("reviewer invocation failed: {e}");
                self.emit_failed(&session.id, ticket_id, &error);
                return Err(ApiError::external(error));
            }
            Ok(Ok(raw)) => raw,
        };

        let Some((decision, reasoning)) = parse_decision(&raw) else {
            let preserved: String = raw.trim().chars().take(500).collect();
            let error = format!("unparseable reviewer output: {preserved}");
            self.emit_failed(&session.id, ticket_id, &error);
            return Err(ApiError::external(error));
        };

        let result = self.store.insert_review_result(
            &session.id,
            ticket_id,
            decision,
            &reasoning,
            trigger,
            session.status,
        )?;
        info!(
            ticket = %ticket_id,
            session = %session.id,
            decision = decision.as_str(),
            trigger = trigger.as_str(),
            "review finished"
        );
        self.events.emit_review(ReviewEvent::Completed(result.clone()));

        if decision == ReviewDecision::Complete {
            self.promote_to_review(&result).await;
        }
        Ok(result)
    }

    /// `in_progress → review` after a complete verdict, plus the
    /// `review_ready` notification.
    async fn promote_to_review(&self, result: &ReviewResult) {
        let transition = self
            .tickets
            .transition(TransitionRequest {
                ticket_id: result.ticket_id.clone(),
                target: TicketState::Review,
                trigger: Trigger::Auto,
                reason: TransitionReason::CompletionDetected,
                feedback: None,
                triggered_by: Some(result.session_id.clone()),
            })
            .await;
        match transition {
            Ok(ticket) => {
                let message = format!("ticket \"{}\" is ready for review", ticket.title);
                match self.store.upsert_notification(
                    NotificationKind::ReviewReady,
                    &message,
                    Some(&result.session_id),
                    Some(&ticket.id),
                ) {
                    Ok(notification) => self.events.emit_notification(notification),
                    Err(e) => warn!("failed to upsert review notification: {e}"),
                }
            }
            Err(e) => warn!(ticket = %result.ticket_id, "post-review transition failed: {e}"),
        }
    }

    fn emit_failed(&self, session_id: &str, ticket_id: &str, error: &str) {
        warn!(ticket = %ticket_id, "review failed: {error}");
        self.events.emit_review(ReviewEvent::Failed {
            session_id: session_id.to_owned(),
            ticket_id: ticket_id.to_owned(),
            error: error.to_owned(),
        });
    }
}

/// Build the review prompt from the assembled evidence.
pub fn build_prompt(
    ticket_content: &str,
    git_diff: &str,
    test_output: Option<&str>,
    session_output: &str,
) -> String {
    let diff = if git_diff.trim().is_empty() {
        "No changes detected or git not available"
    } else {
        git_diff
    };
    let tests = match test_output {
        Some(t) if !t.trim().is_empty() => t,
        _ => "No test output available",
    };
    let output = if session_output.trim().is_empty() {
        "No session output available"
    } else {
        session_output
    };

    format!(
        "You are reviewing whether a ticket has been completed.\n\
         \n\
         ## Ticket Requirements\n\
         {ticket_content}\n\
         \n\
         ## Changes Made (git diff)\n\
         {diff}\n\
         \n\
         ## Test Results\n\
         {tests}\n\
         \n\
         ## Recent Session Output\n\
         {output}\n\
         \n\
         Based on the above, is this ticket complete?\n\
         Respond with COMPLETE, NOT_COMPLETE, or NEEDS_CLARIFICATION on the first line, \
         then 1-3 sentences of reasoning."
    )
}

/// Parse the reviewer's raw output into a decision and reasoning.
///
/// The first line decides; if ambiguous, the first three lines joined are
/// re-checked. `None` preserves nothing — the caller keeps the raw output
/// in its error.
pub fn parse_decision(raw: &str) -> Option<(ReviewDecision, String)> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }
    let mut lines = trimmed.lines();
    let first = lines.next().unwrap_or_default();

    let decision = classify_line(first).or_else(|| {
        let joined: Vec<&str> = trimmed.lines().take(3).collect();
        classify_line(&joined.join(" "))
    })?;

    let reasoning: String = trimmed
        .lines()
        .skip(1)
        .collect::<Vec<&str>>()
        .join("\n")
        .trim()
        .to_owned();
    let reasoning =
        if reasoning.is_empty() { "No reasoning provided".to_owned() } else { reasoning };
    Some((decision, reasoning))
}

fn classify_line(line: &str) -> Option<ReviewDecision> {
    let upper = line.trim().to_uppercase();
    if upper.starts_with("NOT_COMPLETE") || upper.contains("NOT COMPLETE") {
        return Some(ReviewDecision::NotComplete);
    }
    if upper.starts_with("COMPLETE") {
        return Some(ReviewDecision::Complete);
    }
    if upper.contains("NEEDS_CLARIFICATION") || upper.contains("NEEDS CLARIFICATION") {
        return Some(ReviewDecision::NeedsClarification);
    }
    None
}

#[cfg(test)]
#[path = "review_tests.rs"]
mod tests;
