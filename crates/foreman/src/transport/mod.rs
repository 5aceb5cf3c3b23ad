// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! HTTP and WebSocket transports: router assembly, auth, pagination, and
//! the REST + fan-out handler implementations.

pub mod auth;
pub mod http;
pub mod state;
pub mod ws;

pub use state::{AppState, WsSettings};

use std::sync::Arc;

use axum::middleware;
use axum::routing::{delete, get, patch, post};
use axum::Router;
use serde::{Deserialize, Serialize};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

/// Page/limit query with sane bounds.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PageQuery {
    pub page: Option<u32>,
    pub limit: Option<u32>,
}

impl PageQuery {
    pub fn resolve(&self) -> (u32, u32) {
        let page = self.page.unwrap_or(1).max(1);
        let limit = self.limit.unwrap_or(50).clamp(1, 200);
        (page, limit)
    }
}

/// Standard paginated response envelope.
#[derive(Debug, Clone, Serialize)]
pub struct Paginated<T> {
    pub items: Vec<T>,
    pub total: i64,
    pub page: u32,
    pub limit: u32,
}

/// Build the axum `Router` with all HTTP and WebSocket routes.
pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(http::health))
        .route("/hooks/claude", post(http::hook_claude))
        .route("/hooks/session-start", post(http::hook_session_start))
        .route("/projects", get(http::list_projects).post(http::create_project))
        .route(
            "/projects/{id}",
            get(http::get_project).patch(http::patch_project).delete(http::delete_project),
        )
        .route("/projects/{id}/tickets", get(http::list_tickets))
        .route("/projects/{id}/adhoc-tickets", post(http::create_adhoc_ticket))
        .route(
            "/tickets/{id}/content",
            get(http::get_ticket_content).put(http::put_ticket_content),
        )
        .route("/tickets/{id}/title", patch(http::patch_ticket_title))
        .route("/tickets/{id}", delete(http::delete_ticket))
        .route("/tickets/{id}/start", post(http::start_ticket))
        .route("/tickets/{id}/approve", post(http::approve_ticket))
        .route("/tickets/{id}/reject", post(http::reject_ticket))
        .route("/tickets/{id}/history", get(http::ticket_history))
        .route("/tickets/{id}/review", post(http::request_review))
        .route("/sessions", post(http::create_session))
        .route("/sessions/sync", post(http::sync_sessions))
        .route("/sessions/{id}", delete(http::delete_session))
        .route("/sessions/{id}/input", post(http::session_input))
        .route("/sessions/{id}/output", get(http::session_output))
        .route("/sessions/{id}/focus", post(http::focus_session))
        .route(
            "/notifications",
            get(http::list_notifications).delete(http::delete_all_notifications),
        )
        .route("/notifications/{id}", delete(http::delete_notification))
        .route("/ws", get(ws::ws_handler))
        .route_layer(middleware::from_fn_with_state(state.clone(), auth::auth_layer))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
