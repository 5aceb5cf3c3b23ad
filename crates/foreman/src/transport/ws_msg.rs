// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! WebSocket message types.
//!
//! Messages are internally-tagged JSON (`{"type": "session:subscribe", ...}`).
//! Unknown fields on client messages are tolerated and ignored.

use serde::{Deserialize, Serialize};

use crate::event::{SessionEvent, TicketEvent};
use crate::model::{
    Notification, SessionStatus, TicketState, TransitionReason, Trigger, WaitReason,
};

/// Client → server messages.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ClientMessage {
    #[serde(rename = "session:subscribe")]
    Subscribe { session_id: String },
    #[serde(rename = "session:unsubscribe")]
    Unsubscribe { session_id: String },
    #[serde(rename = "session:input")]
    Input { session_id: String, text: String },
    #[serde(rename = "ping")]
    Ping,
}

/// Server → client messages.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ServerMessage {
    #[serde(rename = "session:output")]
    Output { session_id: String, lines: Vec<String> },
    #[serde(rename = "session:context")]
    Context { session_id: String, percent: u8 },
    #[serde(rename = "session:status")]
    Status {
        session_id: String,
        previous: SessionStatus,
        new: SessionStatus,
        timestamp: i64,
        #[serde(skip_serializing_if = "Option::is_none")]
        error: Option<String>,
    },
    #[serde(rename = "session:waiting")]
    Waiting {
        session_id: String,
        waiting: bool,
        #[serde(skip_serializing_if = "Option::is_none")]
        reason: Option<WaitReason>,
    },
    #[serde(rename = "ticket:state")]
    TicketState {
        ticket_id: String,
        project_id: String,
        from: TicketState,
        to: TicketState,
        trigger: Trigger,
        reason: TransitionReason,
    },
    #[serde(rename = "notification")]
    Notification { notification: Notification },
    #[serde(rename = "pong")]
    Pong,
    #[serde(rename = "error")]
    Error { code: String, message: String },
    #[serde(rename = "subscribed")]
    Subscribed { session_id: String, replay: Vec<String> },
    #[serde(rename = "unsubscribed")]
    Unsubscribed { session_id: String },
}

impl ServerMessage {
    /// Map a session event onto its wire message. `ContextLow` is internal
    /// to the handoff coordinator and not fanned out.
    pub fn from_session_event(event: &SessionEvent) -> Option<Self> {
        match event {
            SessionEvent::Output { session_id, lines } => Some(Self::Output {
                session_id: session_id.clone(),
                lines: lines.clone(),
            }),
            SessionEvent::Context { session_id, percent } => Some(Self::Context {
                session_id: session_id.clone(),
                percent: *percent,
            }),
            SessionEvent::ContextLow { .. } => None,
            SessionEvent::Status { session_id, previous, new, at_ms, error } => {
                Some(Self::Status {
                    session_id: session_id.clone(),
                    previous: *previous,
                    new: *new,
                    timestamp: *at_ms,
                    error: error.clone(),
                })
            }
            SessionEvent::Waiting { session_id, waiting, reason } => Some(Self::Waiting {
                session_id: session_id.clone(),
                waiting: *waiting,
                reason: *reason,
            }),
        }
    }
}

impl From<&TicketEvent> for ServerMessage {
    fn from(event: &TicketEvent) -> Self {
        Self::TicketState {
            ticket_id: event.ticket_id.clone(),
            project_id: event.project_id.clone(),
            from: event.from,
            to: event.to,
            trigger: event.trigger,
            reason: event.reason,
        }
    }
}

#[cfg(test)]
#[path = "ws_msg_tests.rs"]
mod tests;
