// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Ticket state machine and lifecycle operations.
//!
//! Transitions are validated against the state graph and recorded (state
//! write + history append) in one store transaction; the `ticket.state`
//! event is emitted only after the history row is durable.

pub mod files;

use std::sync::Arc;

use tracing::{info, warn};

use crate::error::ApiError;
use crate::event::{EventBus, TicketEvent};
use crate::model::{Session, Ticket, TicketState, TransitionReason, Trigger};
use crate::store::{Store, TransitionWrite};
use crate::supervisor::{StartSessionRequest, Supervisor};

/// A requested ticket transition.
#[derive(Debug, Clone)]
pub struct TransitionRequest {
    pub ticket_id: String,
    pub target: TicketState,
    pub trigger: Trigger,
    pub reason: TransitionReason,
    pub feedback: Option<String>,
    pub triggered_by: Option<String>,
}

/// Format rejection feedback for injection into the working session.
pub fn format_rejection(feedback: &str) -> String {
    format!(
        "[REVIEW FEEDBACK] The reviewer rejected your work with this feedback:\n\"{feedback}\"\nPlease address this and continue working on the ticket."
    )
}

pub struct TicketService {
    store: Arc<Store>,
    events: EventBus,
    supervisor: Arc<Supervisor>,
}

impl TicketService {
    pub fn new(store: Arc<Store>, events: EventBus, supervisor: Arc<Supervisor>) -> Self {
        Self { store, events, supervisor }
    }

    /// Apply a transition atomically and emit `ticket.state`.
    ///
    /// Rejections require non-empty feedback; the formatted feedback is
    /// injected into the ticket's running session when one exists.
    pub async fn transition(&self, req: TransitionRequest) -> Result<Ticket, ApiError> {
        let feedback = match req.reason {
            TransitionReason::UserRejected => {
                let feedback = req.feedback.as_deref().map(str::trim).unwrap_or_default();
                if feedback.is_empty() {
                    return Err(ApiError::MissingFeedback);
                }
                Some(feedback.to_owned())
            }
            _ => req.feedback.clone(),
        };

        let (ticket, entry) = self.store.transition_ticket(&TransitionWrite {
            ticket_id: req.ticket_id.clone(),
            target: req.target,
            trigger: req.trigger,
            reason: req.reason,
            feedback: feedback.clone(),
            triggered_by: req.triggered_by.clone(),
        })?;
        info!(
            ticket = %ticket.id,
            from = %entry.from_state,
            to = %entry.to_state,
            reason = entry.reason.as_str(),
            "ticket transition"
        );

        self.events.emit_ticket(TicketEvent {
            ticket_id: ticket.id.clone(),
            project_id: ticket.project_id.clone(),
            from: entry.from_state,
            to: entry.to_state,
            trigger: entry.trigger,
            reason: entry.reason,
        });

        // A review_ready notification only lives while the ticket sits in
        // review.
        if entry.from_state == TicketState::Review {
            if let Err(e) = self
                .store
                .clear_ticket_notification(&ticket.id, crate::model::NotificationKind::ReviewReady)
            {
                warn!(ticket = %ticket.id, "failed to clear review notification: {e}");
            }
        }

        if req.reason == TransitionReason::UserRejected {
            if let Some(feedback) = feedback {
                self.inject_rejection(&ticket, &feedback).await;
            }
        }

        Ok(ticket)
    }

    /// Deliver rejection feedback to the ticket's running session, exactly
    /// once. When no session is running the feedback stays on the ticket
    /// and rides along with the next session's initial prompt.
    async fn inject_rejection(&self, ticket: &Ticket, feedback: &str) {
        let session = self.store.active_session_for_ticket(&ticket.id).ok().flatten();
        let Some(session) = session else {
            return;
        };
        match self.supervisor.send_input(&session.id, &format_rejection(feedback)).await {
            Ok(()) => {
                if let Err(e) = self.store.clear_rejection_feedback(&ticket.id) {
                    warn!(ticket = %ticket.id, "failed to clear delivered feedback: {e}");
                }
            }
            Err(e) => warn!(ticket = %ticket.id, "feedback injection failed: {e}"),
        }
    }

    /// `backlog → in_progress` and start a session for the ticket.
    ///
    /// The transition commits first; a pane-spawn failure leaves the ticket
    /// `in_progress` with the error surfaced, and a retry only needs a new
    /// session.
    pub async fn start_ticket(&self, ticket_id: &str) -> Result<(Ticket, Session), ApiError> {
        let ticket = self
            .store
            .get_ticket(ticket_id)?
            .ok_or_else(|| ApiError::not_found("ticket", ticket_id))?;

        // Surface the single-active-session invariant before transitioning.
        if self.store.active_session_for_project(&ticket.project_id)?.is_some() {
            return Err(ApiError::AlreadyRunning { project_id: ticket.project_id });
        }

        let ticket = self
            .transition(TransitionRequest {
                ticket_id: ticket_id.to_owned(),
                target: TicketState::InProgress,
                trigger: Trigger::Auto,
                reason: TransitionReason::SessionStarted,
                feedback: None,
                triggered_by: None,
            })
            .await?;

        let session = self
            .supervisor
            .start_session(StartSessionRequest {
                project_id: ticket.project_id.clone(),
                ticket_id: Some(ticket.id.clone()),
                initial_prompt: Some(initial_prompt(&ticket)),
                cwd: None,
            })
            .await?;

        if ticket.rejection_feedback.is_some() {
            if let Err(e) = self.store.clear_rejection_feedback(&ticket.id) {
                warn!(ticket = %ticket.id, "failed to clear delivered feedback: {e}");
            }
        }

        Ok((ticket, session))
    }

    /// `review → done` by explicit user approval.
    pub async fn approve(&self, ticket_id: &str, by: Option<String>) -> Result<Ticket, ApiError> {
        self.transition(TransitionRequest {
            ticket_id: ticket_id.to_owned(),
            target: TicketState::Done,
            trigger: Trigger::Manual,
            reason: TransitionReason::UserApproved,
            feedback: None,
            triggered_by: by,
        })
        .await
    }

    /// `review → in_progress` with mandatory feedback.
    pub async fn reject(
        &self,
        ticket_id: &str,
        feedback: &str,
        by: Option<String>,
    ) -> Result<Ticket, ApiError> {
        self.transition(TransitionRequest {
            ticket_id: ticket_id.to_owned(),
            target: TicketState::InProgress,
            trigger: Trigger::Manual,
            reason: TransitionReason::UserRejected,
            feedback: Some(feedback.to_owned()),
            triggered_by: by,
        })
        .await
    }
}

/// Compose the initial prompt for a ticket session.
fn initial_prompt(ticket: &Ticket) -> String {
    let mut prompt = if ticket.is_explore {
        format!(
            "Explore the question described in {}. Summarize your findings in the ticket file when done.",
            ticket.file_path
        )
    } else {
        format!(
            "Work on the ticket described in {}. Read it carefully and implement what it asks for.",
            ticket.file_path
        )
    };
    if let Some(feedback) = ticket.rejection_feedback.as_deref() {
        prompt.push('\n');
        prompt.push_str(&format_rejection(feedback));
    }
    prompt
}

#[cfg(test)]
#[path = "tickets_tests.rs"]
mod tests;
