// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::io::{BufRead, BufReader, Seek, SeekFrom};
use std::path::PathBuf;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::model::WaitReason;

use super::{DetectorInput, SignalLayer, WaitingSignal};

/// Tails a session's transcript file (append-only JSONL) for waiting
/// markers. Uses `notify` for filesystem events with a polling fallback.
pub struct TranscriptWatcher {
    path: PathBuf,
    offset: u64,
    poll_interval: Duration,
}

impl TranscriptWatcher {
    pub fn new(path: PathBuf) -> Self {
        Self { path, offset: 0, poll_interval: Duration::from_secs(5) }
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Current byte offset into the transcript.
    pub fn offset(&self) -> u64 {
        self.offset
    }

    /// Read new complete lines appended since the last read.
    pub fn read_new_lines(&mut self) -> anyhow::Result<Vec<String>> {
        let file = match std::fs::File::open(&self.path) {
            Ok(f) => f,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(vec![]),
            Err(e) => return Err(e.into()),
        };

        // Detect truncation (conversation cleared): reset and re-read.
        if let Ok(meta) = file.metadata() {
            if meta.len() < self.offset {
                self.offset = 0;
            }
        }

        let mut reader = BufReader::new(file);
        reader.seek(SeekFrom::Start(self.offset))?;

        let mut lines = Vec::new();
        let mut line = String::new();
        loop {
            line.clear();
            let bytes_read = reader.read_line(&mut line)?;
            if bytes_read == 0 {
                break;
            }
            self.offset += bytes_read as u64;
            let trimmed = line.trim_end();
            if !trimmed.is_empty() {
                lines.push(trimmed.to_string());
            }
        }

        Ok(lines)
    }

    /// Tail the transcript, forwarding classified waiting signals until the
    /// token is cancelled.
    pub async fn run(
        mut self,
        session_id: String,
        tx: mpsc::Sender<DetectorInput>,
        shutdown: CancellationToken,
    ) {
        let (wake_tx, mut wake_rx) = mpsc::channel::<()>(1);
        let _watcher = self.setup_notify_watcher(wake_tx);

        let mut poll_interval = tokio::time::interval(self.poll_interval);

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = wake_rx.recv() => {}
                _ = poll_interval.tick() => {}
            }

            let lines = match self.read_new_lines() {
                Ok(lines) => lines,
                Err(_) => continue,
            };
            for line in lines {
                if let Some(reason) = classify_transcript_line(&line) {
                    let signal = WaitingSignal {
                        session_id: session_id.clone(),
                        waiting: true,
                        reason,
                        layer: SignalLayer::Transcript,
                        context: None,
                    };
                    if tx.send(DetectorInput::Signal(signal)).await.is_err() {
                        return;
                    }
                }
            }
        }
    }

    /// Watch the transcript's parent directory so file creation is seen too.
    fn setup_notify_watcher(
        &self,
        wake_tx: mpsc::Sender<()>,
    ) -> Option<notify::RecommendedWatcher> {
        use notify::{RecursiveMode, Watcher};

        let mut watcher = notify::recommended_watcher(move |_: notify::Result<notify::Event>| {
            let _ = wake_tx.try_send(());
        })
        .ok()?;

        let watch_path = self.path.parent().unwrap_or(self.path.as_ref());
        watcher.watch(watch_path, RecursiveMode::NonRecursive).ok()?;

        Some(watcher)
    }
}

/// Classify one transcript JSONL line into a waiting reason.
///
/// Recognized markers: entries tagged as a permission request, and entries
/// marking the context window as exhausted.
pub fn classify_transcript_line(line: &str) -> Option<WaitReason> {
    let value: serde_json::Value = serde_json::from_str(line).ok()?;
    let entry_type = value.get("type").and_then(|v| v.as_str()).unwrap_or_default();
    let subtype = value.get("subtype").and_then(|v| v.as_str()).unwrap_or_default();

    if entry_type == "permission_request" || subtype == "permission_prompt" {
        return Some(WaitReason::PermissionPrompt);
    }
    if entry_type == "context_exhausted" || subtype == "context_low" {
        return Some(WaitReason::ContextExhausted);
    }
    None
}

#[cfg(test)]
#[path = "transcript_tests.rs"]
mod tests;
