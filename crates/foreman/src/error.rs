// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::model::TicketState;

/// Unified error taxonomy surfaced across HTTP and WebSocket transports.
#[derive(Debug, Clone)]
pub enum ApiError {
    /// Input shape or constraint violation; `details` carries per-field info.
    Validation { message: String, details: Option<serde_json::Value> },
    NotFound { resource: &'static str, id: String },
    Conflict { message: String },
    InvalidTransition { from: TicketState, to: TicketState },
    MissingFeedback,
    AlreadyRunning { project_id: String },
    HandoffInProgress { session_id: String },
    PathTraversal,
    Unauthorized,
    /// PaneDriver / ReviewerDriver / VCS failure surfaced to the caller.
    ExternalFailure { message: String },
    Timeout { message: String },
    Internal { message: String },
}

impl ApiError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation { message: message.into(), details: None }
    }

    pub fn validation_with(message: impl Into<String>, details: serde_json::Value) -> Self {
        Self::Validation { message: message.into(), details: Some(details) }
    }

    pub fn not_found(resource: &'static str, id: impl Into<String>) -> Self {
        Self::NotFound { resource, id: id.into() }
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self::Conflict { message: message.into() }
    }

    pub fn external(message: impl Into<String>) -> Self {
        Self::ExternalFailure { message: message.into() }
    }

    pub fn timeout(message: impl Into<String>) -> Self {
        Self::Timeout { message: message.into() }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal { message: message.into() }
    }

    /// Machine-readable code for the wire envelope.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Validation { .. } => "VALIDATION",
            Self::NotFound { .. } => "NOT_FOUND",
            Self::Conflict { .. } => "CONFLICT",
            Self::InvalidTransition { .. } => "INVALID_TRANSITION",
            Self::MissingFeedback => "MISSING_FEEDBACK",
            Self::AlreadyRunning { .. } => "ALREADY_RUNNING",
            Self::HandoffInProgress { .. } => "HANDOFF_IN_PROGRESS",
            Self::PathTraversal => "PATH_TRAVERSAL",
            Self::Unauthorized => "UNAUTHORIZED",
            Self::ExternalFailure { .. } => "EXTERNAL_FAILURE",
            Self::Timeout { .. } => "TIMEOUT",
            Self::Internal { .. } => "INTERNAL",
        }
    }

    pub fn http_status(&self) -> u16 {
        match self {
            Self::Validation { .. } => 400,
            Self::MissingFeedback => 400,
            Self::NotFound { .. } => 404,
            Self::Conflict { .. } => 409,
            Self::InvalidTransition { .. } => 409,
            Self::AlreadyRunning { .. } => 409,
            Self::HandoffInProgress { .. } => 409,
            Self::PathTraversal => 403,
            Self::Unauthorized => 401,
            Self::ExternalFailure { .. } => 502,
            Self::Timeout { .. } => 504,
            Self::Internal { .. } => 500,
        }
    }

    pub fn message(&self) -> String {
        match self {
            Self::Validation { message, .. } => message.clone(),
            Self::NotFound { resource, id } => format!("{resource} not found: {id}"),
            Self::Conflict { message } => message.clone(),
            Self::InvalidTransition { from, to } => {
                format!("invalid ticket transition: {from} -> {to}")
            }
            Self::MissingFeedback => "rejection requires non-empty feedback".to_owned(),
            Self::AlreadyRunning { project_id } => {
                format!("project {project_id} already has an active session")
            }
            Self::HandoffInProgress { session_id } => {
                format!("handoff already in flight for session {session_id}")
            }
            Self::PathTraversal => "path escapes the project repository".to_owned(),
            Self::Unauthorized => "invalid or missing API key".to_owned(),
            Self::ExternalFailure { message } => message.clone(),
            Self::Timeout { message } => message.clone(),
            Self::Internal { message } => message.clone(),
        }
    }

    fn details(&self) -> Option<serde_json::Value> {
        match self {
            Self::Validation { details, .. } => details.clone(),
            Self::InvalidTransition { from, to } => Some(serde_json::json!({
                "from": from.as_str(),
                "to": to.as_str(),
            })),
            _ => None,
        }
    }
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.code(), self.message())
    }
}

impl std::error::Error for ApiError {}

impl From<rusqlite::Error> for ApiError {
    fn from(e: rusqlite::Error) -> Self {
        Self::Internal { message: format!("store error: {e}") }
    }
}

impl From<anyhow::Error> for ApiError {
    fn from(e: anyhow::Error) -> Self {
        Self::Internal { message: format!("{e:#}") }
    }
}

/// Wire envelope: `{error, code?, details?}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl ApiError {
    pub fn to_error_body(&self) -> ErrorBody {
        ErrorBody {
            error: self.message(),
            code: Some(self.code().to_owned()),
            details: self.details(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status =
            StatusCode::from_u16(self.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        (status, Json(self.to_error_body())).into_response()
    }
}

#[cfg(test)]
#[path = "error_tests.rs"]
mod tests;
