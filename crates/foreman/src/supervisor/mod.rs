// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Session supervision: lifecycle, pane tracking, output tailing, input
//! injection, orphan sync, and startup recovery.
//!
//! The supervisor exclusively owns the in-memory `ActiveSession` table; the
//! store owns the durable rows. One poll task per active session captures
//! new pane output into that session's ring buffer and emits `session.*`
//! events.

mod poll;

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicI32, AtomicI64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::{Mutex, RwLock};
use regex::Regex;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::error::ApiError;
use crate::event::{EventBus, SessionEvent};
use crate::model::{now_epoch_ms, Session, SessionKind, SessionStatus, TicketState};
use crate::pane::{PaneCursor, PaneDriver, PaneError};
use crate::ring::RingBuffer;
use crate::store::{is_constraint_violation, NewSession, Store};
use crate::waiting::DetectorHandle;

/// Static supervisor configuration.
pub struct SupervisorSettings {
    pub poll_interval: Duration,
    pub ring_capacity: usize,
    pub context_pattern: Regex,
    pub context_low_threshold: u8,
}

/// In-memory record for one supervised session.
pub struct ActiveSession {
    pub session_id: String,
    pub project_id: String,
    pub ticket_id: Option<String>,
    pub pane_id: String,
    ring: Mutex<RingBuffer>,
    last_output_hash: Mutex<Option<[u8; 32]>>,
    last_output_ms: AtomicI64,
    /// Remaining context percent; -1 until first report.
    context_percent: AtomicI32,
    cancel: CancellationToken,
}

impl ActiveSession {
    pub fn last_output_ms(&self) -> i64 {
        self.last_output_ms.load(Ordering::Relaxed)
    }

    pub fn context_percent(&self) -> Option<u8> {
        let v = self.context_percent.load(Ordering::Relaxed);
        (v >= 0).then_some(v as u8)
    }
}

/// Result of an orphan sweep.
#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct SyncReport {
    pub alive: Vec<String>,
    pub orphaned: Vec<String>,
    pub total_checked: usize,
}

/// Parameters for starting a session.
#[derive(Debug, Clone, Default)]
pub struct StartSessionRequest {
    pub project_id: String,
    pub ticket_id: Option<String>,
    pub initial_prompt: Option<String>,
    pub cwd: Option<PathBuf>,
}

pub struct Supervisor {
    store: Arc<Store>,
    driver: Arc<dyn PaneDriver>,
    events: EventBus,
    detector: DetectorHandle,
    settings: Arc<SupervisorSettings>,
    active: Arc<RwLock<HashMap<String, Arc<ActiveSession>>>>,
    shutdown: CancellationToken,
}

impl Supervisor {
    pub fn new(
        store: Arc<Store>,
        driver: Arc<dyn PaneDriver>,
        events: EventBus,
        detector: DetectorHandle,
        settings: SupervisorSettings,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            store,
            driver,
            events,
            detector,
            settings: Arc::new(settings),
            active: Arc::new(RwLock::new(HashMap::new())),
            shutdown,
        }
    }

    /// Start a session: create the durable row, spawn a pane, begin output
    /// polling, and optionally send an initial prompt.
    pub async fn start_session(&self, req: StartSessionRequest) -> Result<Session, ApiError> {
        let project = self
            .store
            .get_project(&req.project_id)?
            .ok_or_else(|| ApiError::not_found("project", &req.project_id))?;

        // Early check for a friendly error; the store's partial unique
        // index is the authoritative guard against concurrent starts.
        if self.store.active_session_for_project(&project.id)?.is_some() {
            return Err(ApiError::AlreadyRunning { project_id: project.id });
        }

        let kind = match req.ticket_id.as_deref() {
            Some(ticket_id) => {
                let ticket = self
                    .store
                    .get_ticket(ticket_id)?
                    .ok_or_else(|| ApiError::not_found("ticket", ticket_id))?;
                // A ticket session must reference a ticket being worked on.
                if ticket.state != TicketState::InProgress {
                    return Err(ApiError::conflict(format!(
                        "ticket {ticket_id} is not in progress (state: {})",
                        ticket.state
                    )));
                }
                SessionKind::Ticket
            }
            None => SessionKind::Adhoc,
        };

        let session = self.store.insert_session(NewSession {
            project_id: project.id.clone(),
            ticket_id: req.ticket_id.clone(),
            kind,
            status: SessionStatus::Pending,
            pane_id: String::new(),
            assistant_session_id: None,
            transcript_path: None,
        })?;

        let cwd = req.cwd.clone().unwrap_or_else(|| PathBuf::from(&project.repo_path));
        let spawned = match self
            .driver
            .spawn_pane(&project.pane_group, project.pane_window.as_deref(), &cwd)
            .await
        {
            Ok(spawned) => spawned,
            Err(e) => {
                self.transition_status(&session.id, SessionStatus::Pending, SessionStatus::Error, Some(e.to_string()));
                return Err(ApiError::external(format!("pane creation failed: {e}")));
            }
        };

        // Promotion to running enters the project's single active slot; a
        // concurrent start that won the race surfaces here as a constraint
        // violation, after which our freshly spawned pane must go away.
        let session = match self.store.set_session_running(&session.id, &spawned.id, spawned.pid)
        {
            Ok(Some(session)) => session,
            Ok(None) => return Err(ApiError::internal("session row vanished during start")),
            Err(e) if is_constraint_violation(&e) => {
                match self.driver.kill_pane(&spawned.id).await {
                    Ok(()) | Err(PaneError::NotFound(_)) => {}
                    Err(e) => warn!(pane = %spawned.id, "kill pane failed: {e}"),
                }
                self.transition_status(
                    &session.id,
                    SessionStatus::Pending,
                    SessionStatus::Error,
                    Some("lost the session start race".to_owned()),
                );
                return Err(ApiError::AlreadyRunning { project_id: project.id });
            }
            Err(e) => return Err(e.into()),
        };
        self.events.emit_session(SessionEvent::Status {
            session_id: session.id.clone(),
            previous: SessionStatus::Pending,
            new: SessionStatus::Running,
            at_ms: now_epoch_ms(),
            error: None,
        });
        info!(session = %session.id, pane = %spawned.id, "session started");

        self.track(&session, None);
        self.detector.watch_session(&session.id).await;

        if let Some(prompt) = req.initial_prompt.as_deref() {
            if let Err(e) = self.send_input(&session.id, prompt).await {
                warn!(session = %session.id, "initial prompt delivery failed: {e}");
            }
        }

        Ok(session)
    }

    /// Stop a session: kill its pane and mark it completed. Idempotent on
    /// already-stopped sessions.
    pub async fn stop_session(&self, session_id: &str) -> Result<Session, ApiError> {
        let session = self
            .store
            .get_session(session_id)?
            .ok_or_else(|| ApiError::not_found("session", session_id))?;
        if session.status.is_terminal() {
            return Ok(session);
        }

        self.untrack(session_id);
        if !session.pane_id.is_empty() {
            match self.driver.kill_pane(&session.pane_id).await {
                Ok(()) | Err(PaneError::NotFound(_)) => {}
                Err(e) => warn!(session = %session_id, "kill pane failed: {e}"),
            }
        }

        let updated = self
            .transition_status(session_id, session.status, SessionStatus::Completed, None)
            .unwrap_or(session);
        self.detector.unwatch_session(session_id).await;
        info!(session = %session_id, "session stopped");
        Ok(updated)
    }

    /// Send a line of input to a running session (appends Enter).
    pub async fn send_input(&self, session_id: &str, text: &str) -> Result<(), ApiError> {
        let pane_id = self.running_pane(session_id)?;
        self.driver
            .send_text(&pane_id, text)
            .await
            .map_err(|e| ApiError::external(format!("input failed: {e}")))?;
        self.driver
            .send_key(&pane_id, "Enter")
            .await
            .map_err(|e| ApiError::external(format!("input failed: {e}")))?;
        self.detector.note_activity(session_id).await;
        Ok(())
    }

    /// Send a named key to a running session.
    pub async fn send_key(&self, session_id: &str, key: &str) -> Result<(), ApiError> {
        let pane_id = self.running_pane(session_id)?;
        self.driver
            .send_key(&pane_id, key)
            .await
            .map_err(|e| ApiError::external(format!("input failed: {e}")))?;
        self.detector.note_activity(session_id).await;
        Ok(())
    }

    /// Recent output lines from the session's ring buffer. Never touches
    /// the pane.
    pub fn get_output(&self, session_id: &str, tail: Option<usize>) -> Result<Vec<String>, ApiError> {
        if let Some(handle) = self.active.read().get(session_id) {
            let ring = handle.ring.lock();
            return Ok(match tail {
                Some(n) => ring.tail(n),
                None => ring.to_vec(),
            });
        }
        match self.store.get_session(session_id)? {
            Some(_) => Ok(vec![]),
            None => Err(ApiError::not_found("session", session_id)),
        }
    }

    /// Focus the session's pane in the multiplexer.
    pub async fn focus_session(&self, session_id: &str) -> Result<String, ApiError> {
        let session = self
            .store
            .get_session(session_id)?
            .ok_or_else(|| ApiError::not_found("session", session_id))?;
        if session.pane_id.is_empty() {
            return Err(ApiError::validation("session has no pane"));
        }
        self.driver.focus_pane(&session.pane_id).await.map_err(ApiError::from)?;
        Ok(session.pane_id)
    }

    /// Check every running/paused session against its pane; sessions whose
    /// pane is gone are completed.
    pub async fn sync_sessions(&self, project_id: Option<&str>) -> Result<SyncReport, ApiError> {
        let sessions = self.store.list_active_sessions(project_id)?;
        let mut report = SyncReport { total_checked: sessions.len(), ..Default::default() };

        for session in sessions {
            // Hook-discovered sessions have no pane to check.
            if session.pane_id.is_empty() {
                report.alive.push(session.id);
                continue;
            }
            let exists = self.driver.pane_exists(&session.pane_id).await.unwrap_or(false);
            if exists {
                report.alive.push(session.id);
            } else {
                self.untrack(&session.id);
                self.transition_status(&session.id, session.status, SessionStatus::Completed, None);
                self.detector.unwatch_session(&session.id).await;
                info!(session = %session.id, "orphaned session completed");
                report.orphaned.push(session.id);
            }
        }
        Ok(report)
    }

    /// Startup recovery: resume polling for sessions whose pane survived,
    /// complete the rest.
    pub async fn recover(&self) -> Result<(), ApiError> {
        let sessions = self.store.list_active_sessions(None)?;
        for session in sessions {
            if session.pane_id.is_empty() {
                self.detector.watch_session(&session.id).await;
                continue;
            }
            let exists = self.driver.pane_exists(&session.pane_id).await.unwrap_or(false);
            if !exists {
                self.transition_status(&session.id, session.status, SessionStatus::Completed, None);
                continue;
            }

            // Rebuild the ring from a bounded tail of the pane history.
            let mut cursor = None;
            let mut seed = Vec::new();
            if let Ok(capture) = self.driver.capture_pane(&session.pane_id, None).await {
                cursor = Some(capture.cursor);
                let skip = capture.lines.len().saturating_sub(self.settings.ring_capacity);
                seed = capture.lines.into_iter().skip(skip).collect();
            }
            let handle = self.track(&session, cursor);
            handle.ring.lock().extend(seed);
            self.detector.watch_session(&session.id).await;
            if let Some(path) = session.transcript_path.as_deref() {
                self.detector.watch_transcript(&session.id, path.into()).await;
            }
            info!(session = %session.id, "recovered session");
        }
        Ok(())
    }

    /// Whether the supervisor is polling this session.
    pub fn is_active(&self, session_id: &str) -> bool {
        self.active.read().contains_key(session_id)
    }

    /// Insert an `ActiveSession` and spawn its poll task.
    fn track(&self, session: &Session, cursor: Option<PaneCursor>) -> Arc<ActiveSession> {
        let handle = Arc::new(ActiveSession {
            session_id: session.id.clone(),
            project_id: session.project_id.clone(),
            ticket_id: session.ticket_id.clone(),
            pane_id: session.pane_id.clone(),
            ring: Mutex::new(RingBuffer::new(self.settings.ring_capacity)),
            last_output_hash: Mutex::new(None),
            last_output_ms: AtomicI64::new(now_epoch_ms()),
            context_percent: AtomicI32::new(
                session.context_percent.map(i32::from).unwrap_or(-1),
            ),
            cancel: self.shutdown.child_token(),
        });
        self.active.write().insert(session.id.clone(), Arc::clone(&handle));

        poll::spawn(
            poll::PollContext {
                store: Arc::clone(&self.store),
                driver: Arc::clone(&self.driver),
                events: self.events.clone(),
                detector: self.detector.clone(),
                settings: Arc::clone(&self.settings),
                active: Arc::clone(&self.active),
                handle: Arc::clone(&handle),
            },
            cursor,
        );
        handle
    }

    /// Remove an `ActiveSession` and cancel its poll task.
    fn untrack(&self, session_id: &str) {
        if let Some(handle) = self.active.write().remove(session_id) {
            handle.cancel.cancel();
        }
    }

    /// Resolve the pane of a session that must be running/paused.
    fn running_pane(&self, session_id: &str) -> Result<String, ApiError> {
        let session = self
            .store
            .get_session(session_id)?
            .ok_or_else(|| ApiError::not_found("session", session_id))?;
        if !session.status.is_active() {
            return Err(ApiError::conflict(format!(
                "session {session_id} is not running (status: {})",
                session.status
            )));
        }
        if session.pane_id.is_empty() {
            return Err(ApiError::conflict(format!("session {session_id} has no pane")));
        }
        Ok(session.pane_id)
    }

    /// Persist a status change and emit the ordered `session.status` event.
    fn transition_status(
        &self,
        session_id: &str,
        previous: SessionStatus,
        new: SessionStatus,
        error: Option<String>,
    ) -> Option<Session> {
        let updated = self.store.set_session_status(session_id, new).ok().flatten();
        self.events.emit_session(SessionEvent::Status {
            session_id: session_id.to_owned(),
            previous,
            new,
            at_ms: now_epoch_ms(),
            error,
        });
        updated
    }
}

#[cfg(test)]
#[path = "supervisor_tests.rs"]
mod tests;
