// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! HTTP request/response types and axum handler implementations.

mod hooks;
mod notifications;
mod projects;
mod sessions;
mod tickets;

pub use hooks::*;
pub use notifications::*;
pub use projects::*;
pub use sessions::*;
pub use tickets::*;

use std::sync::Arc;

use axum::extract::State;
use axum::response::IntoResponse;
use axum::Json;

use crate::model::now_epoch_ms;
use crate::transport::state::AppState;

/// `GET /health` — unauthenticated liveness probe.
pub async fn health(State(s): State<Arc<AppState>>) -> impl IntoResponse {
    let database = if s.store.ping() { "ok" } else { "error" };
    Json(serde_json::json!({
        "status": "ok",
        "uptime": s.started_at.elapsed().as_secs(),
        "version": env!("CARGO_PKG_VERSION"),
        "database": database,
        "timestamp": now_epoch_ms(),
    }))
}
