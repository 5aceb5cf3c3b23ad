// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Ticket resource handlers.

use std::sync::Arc;

use axum::extract::{Path as UrlPath, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use serde::Deserialize;

use crate::error::ApiError;
use crate::model::{ReviewTrigger, Ticket, TicketState};
use crate::store::{NewTicket, TicketFilter};
use crate::tickets::files;
use crate::transport::state::AppState;
use crate::transport::{PageQuery, Paginated};

#[derive(Debug, Deserialize)]
pub struct TicketListQuery {
    #[serde(default)]
    pub state: Option<String>,
    /// Comma-separated prefix list.
    #[serde(default)]
    pub prefixes: Option<String>,
    /// Rescan the tickets directory before listing.
    #[serde(default)]
    pub sync: Option<bool>,
    #[serde(default)]
    pub page: Option<u32>,
    #[serde(default)]
    pub limit: Option<u32>,
}

#[derive(Debug, Deserialize)]
pub struct CreateAdhocBody {
    pub title: String,
    pub slug: String,
    #[serde(default, alias = "isExplore")]
    pub is_explore: bool,
}

#[derive(Debug, Deserialize)]
pub struct ContentBody {
    pub content: String,
}

#[derive(Debug, Deserialize)]
pub struct TitleBody {
    pub title: String,
}

#[derive(Debug, Deserialize)]
pub struct RejectBody {
    pub feedback: String,
}

fn lookup_ticket(s: &AppState, id: &str) -> Result<Ticket, ApiError> {
    s.store.get_ticket(id)?.ok_or_else(|| ApiError::not_found("ticket", id))
}

/// `GET /projects/:id/tickets?state&prefixes&sync`
pub async fn list_tickets(
    State(s): State<Arc<AppState>>,
    UrlPath(project_id): UrlPath<String>,
    Query(query): Query<TicketListQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let project = s
        .store
        .get_project(&project_id)?
        .ok_or_else(|| ApiError::not_found("project", &project_id))?;

    if query.sync.unwrap_or(false) {
        files::sync_tickets(&s.store, &project).await?;
    }

    let state = match query.state.as_deref() {
        Some(raw) => Some(TicketState::parse(raw).ok_or_else(|| {
            ApiError::validation_with(
                "invalid ticket state",
                serde_json::json!({ "state": format!("unknown state: {raw}") }),
            )
        })?),
        None => None,
    };
    let prefixes = query.prefixes.as_deref().map(|raw| {
        raw.split(',').map(str::trim).filter(|p| !p.is_empty()).map(str::to_owned).collect()
    });

    let (page, limit) = PageQuery { page: query.page, limit: query.limit }.resolve();
    let (items, total) =
        s.store.list_tickets(&project_id, &TicketFilter { state, prefixes }, page, limit)?;
    Ok(Json(Paginated { items, total, page, limit }))
}

/// `POST /projects/:id/adhoc-tickets` — 409 on slug collision.
pub async fn create_adhoc_ticket(
    State(s): State<Arc<AppState>>,
    UrlPath(project_id): UrlPath<String>,
    Json(body): Json<CreateAdhocBody>,
) -> Result<impl IntoResponse, ApiError> {
    let project = s
        .store
        .get_project(&project_id)?
        .ok_or_else(|| ApiError::not_found("project", &project_id))?;

    let mut details = serde_json::Map::new();
    if !files::validate_title(&body.title) {
        details.insert("title".into(), "must be 3-100 characters".into());
    }
    if !files::validate_slug(&body.slug) {
        details
            .insert("slug".into(), "must be 3-50 lowercase alphanumeric segments joined by dashes".into());
    }
    if !details.is_empty() {
        return Err(ApiError::validation_with("invalid adhoc ticket", details.into()));
    }

    let rel_path = files::ticket_rel_path(&project, &body.slug);
    if s.store.ticket_by_file_path(&project_id, &rel_path)?.is_some() {
        return Err(ApiError::conflict(format!("slug {} already in use", body.slug)));
    }

    files::write_content(&project, &rel_path, &format!("# {}\n", body.title.trim())).await?;
    let ticket = s.store.insert_ticket(NewTicket {
        project_id,
        external_id: None,
        title: body.title.trim().to_owned(),
        file_path: rel_path,
        prefix: files::prefix_from_filename(&format!("{}.md", body.slug)),
        is_adhoc: true,
        is_explore: body.is_explore,
    })?;
    Ok((StatusCode::CREATED, Json(ticket)))
}

/// `GET /tickets/:id/content`
pub async fn get_ticket_content(
    State(s): State<Arc<AppState>>,
    UrlPath(id): UrlPath<String>,
) -> Result<impl IntoResponse, ApiError> {
    let ticket = lookup_ticket(&s, &id)?;
    let project = s
        .store
        .get_project(&ticket.project_id)?
        .ok_or_else(|| ApiError::not_found("project", &ticket.project_id))?;
    let content = files::read_content(&project, &ticket.file_path).await?;
    Ok(Json(serde_json::json!({ "content": content })))
}

/// `PUT /tickets/:id/content` — content capped at 100 000 chars.
pub async fn put_ticket_content(
    State(s): State<Arc<AppState>>,
    UrlPath(id): UrlPath<String>,
    Json(body): Json<ContentBody>,
) -> Result<impl IntoResponse, ApiError> {
    let ticket = lookup_ticket(&s, &id)?;
    let project = s
        .store
        .get_project(&ticket.project_id)?
        .ok_or_else(|| ApiError::not_found("project", &ticket.project_id))?;
    files::write_content(&project, &ticket.file_path, &body.content).await?;
    Ok(Json(serde_json::json!({ "content": body.content })))
}

/// `PATCH /tickets/:id/title` — renames the backing file.
pub async fn patch_ticket_title(
    State(s): State<Arc<AppState>>,
    UrlPath(id): UrlPath<String>,
    Json(body): Json<TitleBody>,
) -> Result<impl IntoResponse, ApiError> {
    if !files::validate_title(&body.title) {
        return Err(ApiError::validation_with(
            "invalid title",
            serde_json::json!({ "title": "must be 3-100 characters" }),
        ));
    }
    let ticket = lookup_ticket(&s, &id)?;
    let project = s
        .store
        .get_project(&ticket.project_id)?
        .ok_or_else(|| ApiError::not_found("project", &ticket.project_id))?;

    let title = body.title.trim().to_owned();
    let new_rel = files::ticket_rel_path(&project, &files::slugify(&title));
    if new_rel != ticket.file_path
        && s.store.ticket_by_file_path(&ticket.project_id, &new_rel)?.is_some()
    {
        return Err(ApiError::conflict(format!("a ticket already uses file {new_rel}")));
    }

    if new_rel != ticket.file_path {
        files::rename_file(&project, &ticket.file_path, &new_rel).await?;
    }
    let updated = s
        .store
        .rename_ticket(&id, &title, &new_rel)?
        .ok_or_else(|| ApiError::not_found("ticket", &id))?;
    Ok(Json(updated))
}

/// `DELETE /tickets/:id` — 409 while a session is running the ticket.
pub async fn delete_ticket(
    State(s): State<Arc<AppState>>,
    UrlPath(id): UrlPath<String>,
) -> Result<impl IntoResponse, ApiError> {
    let ticket = lookup_ticket(&s, &id)?;
    if s.store.active_session_for_ticket(&id)?.is_some() {
        return Err(ApiError::conflict(format!(
            "ticket {id} has a running session; stop it first"
        )));
    }
    if let Ok(Some(project)) = s.store.get_project(&ticket.project_id) {
        files::remove_file(&project, &ticket.file_path).await?;
    }
    s.store.delete_ticket(&id)?;
    Ok(StatusCode::NO_CONTENT)
}

/// `POST /tickets/:id/start` — `backlog → in_progress` plus a session.
pub async fn start_ticket(
    State(s): State<Arc<AppState>>,
    UrlPath(id): UrlPath<String>,
) -> Result<impl IntoResponse, ApiError> {
    let (ticket, session) = s.tickets.start_ticket(&id).await?;
    Ok(Json(serde_json::json!({ "ticket": ticket, "session": session })))
}

/// `POST /tickets/:id/approve` — `review → done`.
pub async fn approve_ticket(
    State(s): State<Arc<AppState>>,
    UrlPath(id): UrlPath<String>,
) -> Result<impl IntoResponse, ApiError> {
    let ticket = s.tickets.approve(&id, None).await?;
    Ok(Json(ticket))
}

/// `POST /tickets/:id/reject` — `review → in_progress` with feedback.
pub async fn reject_ticket(
    State(s): State<Arc<AppState>>,
    UrlPath(id): UrlPath<String>,
    Json(body): Json<RejectBody>,
) -> Result<impl IntoResponse, ApiError> {
    let feedback = body.feedback.trim();
    if feedback.is_empty() || feedback.chars().count() > 5000 {
        return Err(ApiError::validation_with(
            "invalid feedback",
            serde_json::json!({ "feedback": "must be 1-5000 characters" }),
        ));
    }
    let ticket = s.tickets.reject(&id, feedback, None).await?;
    Ok(Json(ticket))
}

/// `GET /tickets/:id/history`
pub async fn ticket_history(
    State(s): State<Arc<AppState>>,
    UrlPath(id): UrlPath<String>,
) -> Result<impl IntoResponse, ApiError> {
    lookup_ticket(&s, &id)?;
    let entries = s.store.history_for_ticket(&id)?;
    Ok(Json(serde_json::json!({ "history": entries })))
}

/// `POST /tickets/:id/review` — explicit manual review request.
pub async fn request_review(
    State(s): State<Arc<AppState>>,
    UrlPath(id): UrlPath<String>,
) -> Result<impl IntoResponse, ApiError> {
    let ticket = lookup_ticket(&s, &id)?;
    let session = s
        .store
        .active_session_for_ticket(&ticket.id)?
        .ok_or_else(|| ApiError::conflict(format!("ticket {id} has no running session")))?;
    let result = s.reviewer.review(&session, &ticket.id, ReviewTrigger::Manual).await?;
    Ok(Json(result))
}
