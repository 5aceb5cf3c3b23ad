// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Notification handlers.

use std::sync::Arc;

use axum::extract::{Path as UrlPath, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;

use crate::error::ApiError;
use crate::transport::state::AppState;

/// `GET /notifications`
pub async fn list_notifications(
    State(s): State<Arc<AppState>>,
) -> Result<impl IntoResponse, ApiError> {
    let notifications = s.store.list_notifications()?;
    Ok(Json(serde_json::json!({ "notifications": notifications })))
}

/// `DELETE /notifications/:id`
pub async fn delete_notification(
    State(s): State<Arc<AppState>>,
    UrlPath(id): UrlPath<String>,
) -> Result<impl IntoResponse, ApiError> {
    if s.store.delete_notification(&id)? {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(ApiError::not_found("notification", &id))
    }
}

/// `DELETE /notifications` — dismiss everything.
pub async fn delete_all_notifications(
    State(s): State<Arc<AppState>>,
) -> Result<impl IntoResponse, ApiError> {
    let dismissed = s.store.delete_all_notifications()?;
    Ok(Json(serde_json::json!({ "dismissed": dismissed })))
}
