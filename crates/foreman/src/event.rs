// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Typed broadcast streams connecting the core services to the fan-out
//! layer. Components interact through these channels and injected
//! capabilities only — no back-reference graphs.

use tokio::sync::broadcast;

use crate::model::{
    Notification, SessionStatus, TicketState, TransitionReason, Trigger, WaitReason,
};

/// Events emitted by the session supervisor and waiting detector.
#[derive(Debug, Clone)]
pub enum SessionEvent {
    /// New output lines captured from the session's pane.
    Output { session_id: String, lines: Vec<String> },
    /// The assistant reported its remaining context percentage.
    Context { session_id: String, percent: u8 },
    /// Context fell at or below the configured low-water threshold.
    ContextLow { session_id: String, percent: u8 },
    /// Session status transition.
    Status {
        session_id: String,
        previous: SessionStatus,
        new: SessionStatus,
        at_ms: i64,
        error: Option<String>,
    },
    /// Fused waiting-state transition.
    Waiting { session_id: String, waiting: bool, reason: Option<WaitReason> },
}

impl SessionEvent {
    pub fn session_id(&self) -> &str {
        match self {
            Self::Output { session_id, .. }
            | Self::Context { session_id, .. }
            | Self::ContextLow { session_id, .. }
            | Self::Status { session_id, .. }
            | Self::Waiting { session_id, .. } => session_id,
        }
    }
}

/// A durable ticket transition, emitted only after the history row commits.
#[derive(Debug, Clone)]
pub struct TicketEvent {
    pub ticket_id: String,
    pub project_id: String,
    pub from: TicketState,
    pub to: TicketState,
    pub trigger: Trigger,
    pub reason: TransitionReason,
}

/// Lifecycle of one auto-handoff.
#[derive(Debug, Clone)]
pub enum HandoffEvent {
    Started { from_session_id: String, context_percent: u8 },
    Completed {
        from_session_id: String,
        to_session_id: String,
        context_at_handoff: u8,
        duration_ms: u64,
    },
    Failed {
        from_session_id: String,
        step: String,
        error: String,
        session_preserved: bool,
    },
}

/// Reviewer outcomes, including failures that never touch ticket state.
#[derive(Debug, Clone)]
pub enum ReviewEvent {
    Completed(crate::model::ReviewResult),
    Failed { session_id: String, ticket_id: String, error: String },
}

/// Bundle of broadcast senders shared by all emitting services.
///
/// Receivers are created on demand with `subscribe_*`; a send with no
/// receivers is not an error.
#[derive(Clone)]
pub struct EventBus {
    session_tx: broadcast::Sender<SessionEvent>,
    ticket_tx: broadcast::Sender<TicketEvent>,
    handoff_tx: broadcast::Sender<HandoffEvent>,
    review_tx: broadcast::Sender<ReviewEvent>,
    notification_tx: broadcast::Sender<Notification>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (session_tx, _) = broadcast::channel(capacity);
        let (ticket_tx, _) = broadcast::channel(capacity);
        let (handoff_tx, _) = broadcast::channel(capacity);
        let (review_tx, _) = broadcast::channel(capacity);
        let (notification_tx, _) = broadcast::channel(capacity);
        Self { session_tx, ticket_tx, handoff_tx, review_tx, notification_tx }
    }

    pub fn emit_session(&self, event: SessionEvent) {
        let _ = self.session_tx.send(event);
    }

    pub fn emit_ticket(&self, event: TicketEvent) {
        let _ = self.ticket_tx.send(event);
    }

    pub fn emit_handoff(&self, event: HandoffEvent) {
        let _ = self.handoff_tx.send(event);
    }

    pub fn emit_review(&self, event: ReviewEvent) {
        let _ = self.review_tx.send(event);
    }

    pub fn emit_notification(&self, notification: Notification) {
        let _ = self.notification_tx.send(notification);
    }

    pub fn subscribe_session(&self) -> broadcast::Receiver<SessionEvent> {
        self.session_tx.subscribe()
    }

    pub fn subscribe_ticket(&self) -> broadcast::Receiver<TicketEvent> {
        self.ticket_tx.subscribe()
    }

    pub fn subscribe_handoff(&self) -> broadcast::Receiver<HandoffEvent> {
        self.handoff_tx.subscribe()
    }

    pub fn subscribe_review(&self) -> broadcast::Receiver<ReviewEvent> {
        self.review_tx.subscribe()
    }

    pub fn subscribe_notification(&self) -> broadcast::Receiver<Notification> {
        self.notification_tx.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(256)
    }
}
