// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Auto-handoff: when a session's remaining context crosses the low-water
//! threshold, export its conversational context, terminate it, spawn a
//! replacement for the same project/ticket, and re-import.
//!
//! Sequence: `exporting → waiting_file → terminating → creating_session →
//! importing → complete | failed`. Failures before termination preserve the
//! old session; after termination the replacement is still created so
//! ticket progress is not lost.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use parking_lot::Mutex;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::error::ApiError;
use crate::event::{EventBus, HandoffEvent, SessionEvent};
use crate::model::{NotificationKind, Session};
use crate::store::Store;
use crate::supervisor::{StartSessionRequest, Supervisor};
use crate::tickets::files;

/// Handoff timing and command configuration.
#[derive(Debug, Clone)]
pub struct HandoffSettings {
    pub threshold: u8,
    pub export_command: String,
    pub import_command: String,
    pub poll_interval: Duration,
    pub timeout: Duration,
    pub export_delay: Duration,
    pub import_delay: Duration,
}

impl Default for HandoffSettings {
    fn default() -> Self {
        Self {
            threshold: 20,
            export_command: "/exportHandoff".to_owned(),
            import_command: "/importHandoff".to_owned(),
            poll_interval: Duration::from_secs(1),
            timeout: Duration::from_secs(60),
            export_delay: Duration::from_secs(2),
            import_delay: Duration::from_secs(3),
        }
    }
}

/// Continuation prompt sent to the replacement session after import.
pub fn continuation_prompt(ticket_label: Option<&str>) -> String {
    match ticket_label {
        Some(label) => format!(
            "Continue working on ticket {label}. Your context was just restored from a handoff."
        ),
        None => {
            "Your context was just restored from a handoff. Continue where you left off."
                .to_owned()
        }
    }
}

struct StepFailure {
    step: &'static str,
    error: String,
    session_preserved: bool,
}

impl StepFailure {
    fn preserved(step: &'static str, error: impl Into<String>) -> Self {
        Self { step, error: error.into(), session_preserved: true }
    }

    fn lost(step: &'static str, error: impl Into<String>) -> Self {
        Self { step, error: error.into(), session_preserved: false }
    }
}

pub struct HandoffCoordinator {
    store: Arc<Store>,
    events: EventBus,
    supervisor: Arc<Supervisor>,
    settings: HandoffSettings,
    in_flight: Mutex<HashMap<String, CancellationToken>>,
}

impl HandoffCoordinator {
    pub fn new(
        store: Arc<Store>,
        events: EventBus,
        supervisor: Arc<Supervisor>,
        settings: HandoffSettings,
    ) -> Self {
        Self { store, events, supervisor, settings, in_flight: Mutex::new(HashMap::new()) }
    }

    /// Watch `session.context_low` events and take over qualifying sessions.
    pub async fn run(self: Arc<Self>, shutdown: CancellationToken) {
        let mut rx = self.events.subscribe_session();
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                event = rx.recv() => {
                    match event {
                        Ok(SessionEvent::ContextLow { session_id, percent })
                            if percent <= self.settings.threshold =>
                        {
                            if let Err(e) = self.begin(&session_id, percent) {
                                tracing::debug!(session = %session_id, "handoff not started: {e}");
                            }
                        }
                        Ok(_) => {}
                        Err(tokio::sync::broadcast::error::RecvError::Lagged(_)) => continue,
                        Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
                    }
                }
            }
        }
    }

    /// Begin a handoff for a session. `HandoffInProgress` when one is
    /// already in flight for this session.
    pub fn begin(self: &Arc<Self>, from_session_id: &str, percent: u8) -> Result<(), ApiError> {
        {
            let mut in_flight = self.in_flight.lock();
            if in_flight.contains_key(from_session_id) {
                return Err(ApiError::HandoffInProgress {
                    session_id: from_session_id.to_owned(),
                });
            }
            in_flight.insert(from_session_id.to_owned(), CancellationToken::new());
        }
        let cancel = self
            .in_flight
            .lock()
            .get(from_session_id)
            .cloned()
            .unwrap_or_default();

        let coordinator = Arc::clone(self);
        let session_id = from_session_id.to_owned();
        tokio::spawn(async move {
            coordinator.run_handoff(session_id, percent, cancel).await;
        });
        Ok(())
    }

    /// Abort an in-flight handoff. Best-effort after termination.
    pub fn cancel(&self, from_session_id: &str) -> bool {
        match self.in_flight.lock().get(from_session_id) {
            Some(token) => {
                token.cancel();
                true
            }
            None => false,
        }
    }

    /// Whether a handoff is in flight for this session.
    pub fn in_flight(&self, from_session_id: &str) -> bool {
        self.in_flight.lock().contains_key(from_session_id)
    }

    async fn run_handoff(self: Arc<Self>, from_session_id: String, percent: u8, cancel: CancellationToken) {
        let started = Instant::now();
        let outcome = self.execute(&from_session_id, percent, &cancel, started).await;

        if let Err(failure) = outcome {
            warn!(
                session = %from_session_id,
                step = failure.step,
                preserved = failure.session_preserved,
                "handoff failed: {}",
                failure.error
            );
            self.events.emit_handoff(HandoffEvent::Failed {
                from_session_id: from_session_id.clone(),
                step: failure.step.to_owned(),
                error: failure.error.clone(),
                session_preserved: failure.session_preserved,
            });
            let message = if failure.session_preserved {
                format!("handoff failed during {}: {} (session kept alive)", failure.step, failure.error)
            } else {
                format!(
                    "partial handoff: {} failed after termination: {}",
                    failure.step, failure.error
                )
            };
            match self.store.upsert_notification(
                NotificationKind::Error,
                &message,
                Some(&from_session_id),
                None,
            ) {
                Ok(notification) => self.events.emit_notification(notification),
                Err(e) => warn!("failed to record handoff notification: {e}"),
            }
        }

        self.in_flight.lock().remove(&from_session_id);
    }

    async fn execute(
        &self,
        from_session_id: &str,
        percent: u8,
        cancel: &CancellationToken,
        started: Instant,
    ) -> Result<(), StepFailure> {
        let session = self
            .store
            .get_session(from_session_id)
            .ok()
            .flatten()
            .ok_or_else(|| StepFailure::preserved("exporting", "session not found"))?;
        let project = self
            .store
            .get_project(&session.project_id)
            .ok()
            .flatten()
            .ok_or_else(|| StepFailure::preserved("exporting", "project not found"))?;

        let handoff_path = files::handoff_path(&project);
        let initial_mtime = file_mtime(&handoff_path).await;

        self.events.emit_handoff(HandoffEvent::Started {
            from_session_id: from_session_id.to_owned(),
            context_percent: percent,
        });
        info!(session = %from_session_id, percent, "handoff started");

        // exporting
        self.supervisor
            .send_input(from_session_id, &self.settings.export_command)
            .await
            .map_err(|e| StepFailure::preserved("exporting", e.to_string()))?;

        // waiting_file
        let deadline = Instant::now() + self.settings.timeout;
        loop {
            if cancel.is_cancelled() {
                return Err(StepFailure::preserved("waiting_file", "cancelled"));
            }
            if file_ready(&handoff_path, initial_mtime).await {
                break;
            }
            if Instant::now() >= deadline {
                return Err(StepFailure::preserved(
                    "waiting_file",
                    format!(
                        "handoff file did not appear within {}ms",
                        self.settings.timeout.as_millis()
                    ),
                ));
            }
            tokio::time::sleep(self.settings.poll_interval).await;
        }

        // terminating: last cancellation point that preserves the session.
        tokio::time::sleep(self.settings.export_delay).await;
        if cancel.is_cancelled() {
            return Err(StepFailure::preserved("terminating", "cancelled"));
        }
        self.supervisor
            .stop_session(from_session_id)
            .await
            .map_err(|e| StepFailure::preserved("terminating", e.to_string()))?;

        // creating_session: even a cancelled handoff creates the
        // replacement now, to avoid losing ticket progress.
        let new_session = self
            .supervisor
            .start_session(StartSessionRequest {
                project_id: session.project_id.clone(),
                ticket_id: session.ticket_id.clone(),
                initial_prompt: None,
                cwd: None,
            })
            .await
            .map_err(|e| StepFailure::lost("creating_session", e.to_string()))?;

        // importing
        tokio::time::sleep(self.settings.import_delay).await;
        self.supervisor
            .send_input(&new_session.id, &self.settings.import_command)
            .await
            .map_err(|e| StepFailure::lost("importing", e.to_string()))?;
        let label = self.ticket_label(&session);
        self.supervisor
            .send_input(&new_session.id, &continuation_prompt(label.as_deref()))
            .await
            .map_err(|e| StepFailure::lost("importing", e.to_string()))?;

        self.events.emit_handoff(HandoffEvent::Completed {
            from_session_id: from_session_id.to_owned(),
            to_session_id: new_session.id.clone(),
            context_at_handoff: percent,
            duration_ms: started.elapsed().as_millis() as u64,
        });
        info!(
            from = %from_session_id,
            to = %new_session.id,
            "handoff completed"
        );
        Ok(())
    }

    fn ticket_label(&self, session: &Session) -> Option<String> {
        let ticket_id = session.ticket_id.as_deref()?;
        let ticket = self.store.get_ticket(ticket_id).ok().flatten()?;
        Some(ticket.external_id.unwrap_or(ticket.title))
    }
}

async fn file_mtime(path: &Path) -> Option<SystemTime> {
    tokio::fs::metadata(path).await.ok().and_then(|m| m.modified().ok())
}

/// The export is done when the file exists and is newer than what was
/// there before the handoff began.
async fn file_ready(path: &Path, initial: Option<SystemTime>) -> bool {
    match tokio::fs::metadata(path).await {
        Ok(meta) => match (initial, meta.modified().ok()) {
            (None, _) => true,
            (Some(initial), Some(current)) => current > initial,
            (Some(_), None) => false,
        },
        Err(_) => false,
    }
}

#[cfg(test)]
#[path = "handoff_tests.rs"]
mod tests;
