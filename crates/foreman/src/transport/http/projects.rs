// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Project resource handlers.

use std::path::Path;
use std::sync::Arc;

use axum::extract::{Path as UrlPath, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use serde::Deserialize;
use tracing::warn;

use crate::error::ApiError;
use crate::store::{NewProject, ProjectPatch};
use crate::transport::state::AppState;
use crate::transport::{PageQuery, Paginated};

#[derive(Debug, Deserialize)]
pub struct CreateProjectBody {
    pub name: String,
    pub repo_path: String,
    pub pane_group: String,
    #[serde(default)]
    pub pane_window: Option<String>,
    #[serde(default)]
    pub tickets_path: Option<String>,
    #[serde(default)]
    pub handoff_path: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct PatchProjectBody {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub pane_group: Option<String>,
    #[serde(default)]
    pub pane_window: Option<String>,
    #[serde(default)]
    pub tickets_path: Option<String>,
    #[serde(default)]
    pub handoff_path: Option<String>,
}

/// `GET /projects?page&limit`
pub async fn list_projects(
    State(s): State<Arc<AppState>>,
    Query(query): Query<PageQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let (page, limit) = query.resolve();
    let (items, total) = s.store.list_projects(page, limit)?;
    Ok(Json(Paginated { items, total, page, limit }))
}

/// `POST /projects` — 409 on duplicate repo_path.
pub async fn create_project(
    State(s): State<Arc<AppState>>,
    Json(body): Json<CreateProjectBody>,
) -> Result<impl IntoResponse, ApiError> {
    let mut details = serde_json::Map::new();
    if body.name.trim().is_empty() {
        details.insert("name".into(), "must not be empty".into());
    }
    if !Path::new(&body.repo_path).is_absolute() {
        details.insert("repo_path".into(), "must be an absolute path".into());
    }
    if body.pane_group.trim().is_empty() {
        details.insert("pane_group".into(), "must not be empty".into());
    }
    if !details.is_empty() {
        return Err(ApiError::validation_with("invalid project", details.into()));
    }

    let project = s.store.insert_project(NewProject {
        name: body.name.trim().to_owned(),
        repo_path: body.repo_path,
        pane_group: body.pane_group,
        pane_window: body.pane_window,
        tickets_path: body.tickets_path,
        handoff_path: body.handoff_path,
    })?;
    Ok((StatusCode::CREATED, Json(project)))
}

/// `GET /projects/:id` — project with ticket counts and active session.
pub async fn get_project(
    State(s): State<Arc<AppState>>,
    UrlPath(id): UrlPath<String>,
) -> Result<impl IntoResponse, ApiError> {
    let project =
        s.store.get_project(&id)?.ok_or_else(|| ApiError::not_found("project", &id))?;
    let ticket_counts = s.store.ticket_counts(&id)?;
    let active_session = s.store.active_session_for_project(&id)?;
    Ok(Json(serde_json::json!({
        "project": project,
        "ticket_counts": ticket_counts,
        "active_session": active_session,
    })))
}

/// `PATCH /projects/:id`
pub async fn patch_project(
    State(s): State<Arc<AppState>>,
    UrlPath(id): UrlPath<String>,
    Json(body): Json<PatchProjectBody>,
) -> Result<impl IntoResponse, ApiError> {
    s.store.get_project(&id)?.ok_or_else(|| ApiError::not_found("project", &id))?;
    let project = s
        .store
        .update_project(
            &id,
            ProjectPatch {
                name: body.name,
                pane_group: body.pane_group,
                pane_window: body.pane_window.map(Some),
                tickets_path: body.tickets_path.map(Some),
                handoff_path: body.handoff_path.map(Some),
            },
        )?
        .ok_or_else(|| ApiError::not_found("project", &id))?;
    Ok(Json(project))
}

/// `DELETE /projects/:id` — stops active sessions first.
pub async fn delete_project(
    State(s): State<Arc<AppState>>,
    UrlPath(id): UrlPath<String>,
) -> Result<impl IntoResponse, ApiError> {
    s.store.get_project(&id)?.ok_or_else(|| ApiError::not_found("project", &id))?;

    for session in s.store.list_active_sessions(Some(&id))? {
        if let Err(e) = s.supervisor.stop_session(&session.id).await {
            warn!(session = %session.id, "failed to stop session during project delete: {e}");
        }
    }
    s.store.delete_project(&id)?;
    Ok(StatusCode::NO_CONTENT)
}
