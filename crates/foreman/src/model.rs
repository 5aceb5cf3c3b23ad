// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Durable entities and wire enums shared across the store, services, and
//! transports.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Return the current UTC time as milliseconds since the Unix epoch.
pub fn now_epoch_ms() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as i64
}

/// Generate a fresh entity id.
pub fn new_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

/// Lifecycle state of a ticket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TicketState {
    Backlog,
    InProgress,
    Review,
    Done,
}

impl TicketState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Backlog => "backlog",
            Self::InProgress => "in_progress",
            Self::Review => "review",
            Self::Done => "done",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "backlog" => Some(Self::Backlog),
            "in_progress" => Some(Self::InProgress),
            "review" => Some(Self::Review),
            "done" => Some(Self::Done),
            _ => None,
        }
    }

    /// Whether `self → to` is an edge of the ticket state graph.
    ///
    /// ```text
    /// backlog → in_progress → review → {done, in_progress}
    /// ```
    pub fn can_transition_to(&self, to: TicketState) -> bool {
        matches!(
            (self, to),
            (Self::Backlog, Self::InProgress)
                | (Self::InProgress, Self::Review)
                | (Self::Review, Self::Done)
                | (Self::Review, Self::InProgress)
        )
    }
}

impl fmt::Display for TicketState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lifecycle state of a tracked assistant session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    Pending,
    Running,
    Paused,
    Completed,
    Error,
}

impl SessionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Paused => "paused",
            Self::Completed => "completed",
            Self::Error => "error",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(Self::Pending),
            "running" => Some(Self::Running),
            "paused" => Some(Self::Paused),
            "completed" => Some(Self::Completed),
            "error" => Some(Self::Error),
            _ => None,
        }
    }

    /// Terminal states admit no further transitions.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Error)
    }

    /// Active sessions occupy their project's single running slot.
    pub fn is_active(&self) -> bool {
        matches!(self, Self::Running | Self::Paused)
    }

    /// Whether `self → to` is a legal session status transition.
    ///
    /// `pending → running → (paused ↔ running) → completed`; any
    /// non-terminal state may move to `error`.
    pub fn can_transition_to(&self, to: SessionStatus) -> bool {
        if self.is_terminal() {
            return false;
        }
        if to == Self::Error {
            return true;
        }
        matches!(
            (self, to),
            (Self::Pending, Self::Running)
                | (Self::Running, Self::Paused)
                | (Self::Paused, Self::Running)
                | (Self::Running, Self::Completed)
                | (Self::Paused, Self::Completed)
                | (Self::Pending, Self::Completed)
        )
    }
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Whether a session was started for a ticket or ad hoc.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionKind {
    Ticket,
    Adhoc,
}

impl SessionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Ticket => "ticket",
            Self::Adhoc => "adhoc",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "ticket" => Some(Self::Ticket),
            "adhoc" => Some(Self::Adhoc),
            _ => None,
        }
    }
}

/// Who drove a ticket transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Trigger {
    Auto,
    Manual,
}

impl Trigger {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Auto => "auto",
            Self::Manual => "manual",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "auto" => Some(Self::Auto),
            "manual" => Some(Self::Manual),
            _ => None,
        }
    }
}

/// Why a ticket transition happened.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransitionReason {
    SessionStarted,
    CompletionDetected,
    UserApproved,
    UserRejected,
}

impl TransitionReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::SessionStarted => "session_started",
            Self::CompletionDetected => "completion_detected",
            Self::UserApproved => "user_approved",
            Self::UserRejected => "user_rejected",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "session_started" => Some(Self::SessionStarted),
            "completion_detected" => Some(Self::CompletionDetected),
            "user_approved" => Some(Self::UserApproved),
            "user_rejected" => Some(Self::UserRejected),
            _ => None,
        }
    }
}

/// Tri-valued outcome of a completion review.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReviewDecision {
    Complete,
    NotComplete,
    NeedsClarification,
}

impl ReviewDecision {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Complete => "complete",
            Self::NotComplete => "not_complete",
            Self::NeedsClarification => "needs_clarification",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "complete" => Some(Self::Complete),
            "not_complete" => Some(Self::NotComplete),
            "needs_clarification" => Some(Self::NeedsClarification),
            _ => None,
        }
    }
}

/// What prompted a review run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReviewTrigger {
    StopHook,
    IdleTimeout,
    CompletionSignal,
    Manual,
}

impl ReviewTrigger {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::StopHook => "stop_hook",
            Self::IdleTimeout => "idle_timeout",
            Self::CompletionSignal => "completion_signal",
            Self::Manual => "manual",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "stop_hook" => Some(Self::StopHook),
            "idle_timeout" => Some(Self::IdleTimeout),
            "completion_signal" => Some(Self::CompletionSignal),
            "manual" => Some(Self::Manual),
            _ => None,
        }
    }
}

/// Notification categories. State-based: at most one active notification
/// per (session, type).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    WaitingInput,
    ReviewReady,
    Error,
    ContextLow,
}

impl NotificationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::WaitingInput => "waiting_input",
            Self::ReviewReady => "review_ready",
            Self::Error => "error",
            Self::ContextLow => "context_low",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "waiting_input" => Some(Self::WaitingInput),
            "review_ready" => Some(Self::ReviewReady),
            "error" => Some(Self::Error),
            "context_low" => Some(Self::ContextLow),
            _ => None,
        }
    }
}

/// Why a session is (believed to be) waiting for human input.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WaitReason {
    PermissionPrompt,
    ContextExhausted,
    Stopped,
    Question,
    IdlePrompt,
    Unknown,
}

impl WaitReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::PermissionPrompt => "permission_prompt",
            Self::ContextExhausted => "context_exhausted",
            Self::Stopped => "stopped",
            Self::Question => "question",
            Self::IdlePrompt => "idle_prompt",
            Self::Unknown => "unknown",
        }
    }

    /// Relative severity for debounce-window fusion. Within a window the
    /// highest-severity signal wins.
    ///
    /// ```text
    /// permission_prompt > context_exhausted > stopped > question > idle_prompt > unknown
    /// ```
    pub fn severity(&self) -> u8 {
        match self {
            Self::PermissionPrompt => 5,
            Self::ContextExhausted => 4,
            Self::Stopped => 3,
            Self::Question => 2,
            Self::IdlePrompt => 1,
            Self::Unknown => 0,
        }
    }
}

impl fmt::Display for WaitReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A project: one repository hosted in one named pane group.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Project {
    pub id: String,
    pub name: String,
    pub repo_path: String,
    pub pane_group: String,
    pub pane_window: Option<String>,
    pub tickets_path: Option<String>,
    pub handoff_path: Option<String>,
    pub created_at: i64,
    pub updated_at: i64,
}

/// A work item backed by a markdown file inside the project repository.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Ticket {
    pub id: String,
    pub project_id: String,
    pub external_id: Option<String>,
    pub title: String,
    pub state: TicketState,
    pub file_path: String,
    pub prefix: String,
    pub is_adhoc: bool,
    pub is_explore: bool,
    pub rejection_feedback: Option<String>,
    pub started_at: Option<i64>,
    pub completed_at: Option<i64>,
    pub created_at: i64,
    pub updated_at: i64,
}

/// A tracked assistant run bound to (at most) one pane.
///
/// `pane_id` is empty for sessions discovered through hook ingress that have
/// no pane under our control; those are excluded from output polling.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub id: String,
    pub project_id: String,
    pub ticket_id: Option<String>,
    #[serde(rename = "type")]
    pub kind: SessionKind,
    pub status: SessionStatus,
    pub pane_id: String,
    pub pid: Option<i64>,
    pub assistant_session_id: Option<String>,
    pub transcript_path: Option<String>,
    pub context_percent: Option<u8>,
    pub started_at: Option<i64>,
    pub ended_at: Option<i64>,
    pub created_at: i64,
    pub updated_at: i64,
}

/// Append-only record of one ticket transition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StateHistoryEntry {
    pub id: String,
    pub ticket_id: String,
    pub from_state: TicketState,
    pub to_state: TicketState,
    pub trigger: Trigger,
    pub reason: TransitionReason,
    pub feedback: Option<String>,
    pub triggered_by: Option<String>,
    pub created_at: i64,
}

/// Outcome of one reviewer invocation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReviewResult {
    pub id: String,
    pub session_id: String,
    pub ticket_id: String,
    pub decision: ReviewDecision,
    pub reasoning: String,
    pub trigger: ReviewTrigger,
    pub session_status: SessionStatus,
    pub created_at: i64,
}

/// A user-facing notification. Upserted per (session, kind).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Notification {
    pub id: String,
    pub kind: NotificationKind,
    pub message: String,
    pub session_id: Option<String>,
    pub ticket_id: Option<String>,
    pub created_at: i64,
}

#[cfg(test)]
#[path = "model_tests.rs"]
mod tests;
