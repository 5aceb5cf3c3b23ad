// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Session resource handlers.

use std::sync::Arc;

use axum::extract::{Path as UrlPath, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use serde::Deserialize;

use crate::error::ApiError;
use crate::supervisor::StartSessionRequest;
use crate::transport::state::AppState;

#[derive(Debug, Deserialize)]
pub struct CreateSessionBody {
    pub project_id: String,
    #[serde(default)]
    pub ticket_id: Option<String>,
    #[serde(default)]
    pub initial_prompt: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct InputBody {
    pub text: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct SyncQuery {
    #[serde(default, alias = "projectId")]
    pub project_id: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct OutputQuery {
    #[serde(default)]
    pub tail: Option<usize>,
}

/// `POST /sessions`
pub async fn create_session(
    State(s): State<Arc<AppState>>,
    Json(body): Json<CreateSessionBody>,
) -> Result<impl IntoResponse, ApiError> {
    let session = s
        .supervisor
        .start_session(StartSessionRequest {
            project_id: body.project_id,
            ticket_id: body.ticket_id,
            initial_prompt: body.initial_prompt,
            cwd: None,
        })
        .await?;
    Ok((StatusCode::CREATED, Json(session)))
}

/// `DELETE /sessions/:id` — stop; idempotent on already-stopped.
pub async fn delete_session(
    State(s): State<Arc<AppState>>,
    UrlPath(id): UrlPath<String>,
) -> Result<impl IntoResponse, ApiError> {
    s.supervisor.stop_session(&id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// `POST /sessions/:id/input`
pub async fn session_input(
    State(s): State<Arc<AppState>>,
    UrlPath(id): UrlPath<String>,
    Json(body): Json<InputBody>,
) -> Result<impl IntoResponse, ApiError> {
    if body.text.chars().count() > s.ws.input_max_chars {
        return Err(ApiError::validation_with(
            "input too large",
            serde_json::json!({
                "text": format!("must be at most {} characters", s.ws.input_max_chars)
            }),
        ));
    }
    s.supervisor.send_input(&id, &body.text).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// `GET /sessions/:id/output?tail`
pub async fn session_output(
    State(s): State<Arc<AppState>>,
    UrlPath(id): UrlPath<String>,
    Query(query): Query<OutputQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let lines = s.supervisor.get_output(&id, query.tail)?;
    Ok(Json(serde_json::json!({ "lines": lines })))
}

/// `POST /sessions/:id/focus` — 400 when the session has no pane.
pub async fn focus_session(
    State(s): State<Arc<AppState>>,
    UrlPath(id): UrlPath<String>,
) -> Result<impl IntoResponse, ApiError> {
    let pane_id = s.supervisor.focus_session(&id).await?;
    Ok(Json(serde_json::json!({
        "session_id": id,
        "pane_id": pane_id,
        "message": "pane focused",
    })))
}

/// `POST /sessions/sync?projectId?`
pub async fn sync_sessions(
    State(s): State<Arc<AppState>>,
    Query(query): Query<SyncQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let report = s.supervisor.sync_sessions(query.project_id.as_deref()).await?;
    Ok(Json(report))
}
