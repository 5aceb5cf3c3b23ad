// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::sync::Arc;

use axum::extract::{Request, State};
use axum::http::HeaderMap;
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};

use crate::error::ApiError;
use crate::transport::state::AppState;

/// Constant-time string comparison to prevent timing side channels.
fn constant_time_eq(a: &str, b: &str) -> bool {
    let a = a.as_bytes();
    let b = b.as_bytes();
    if a.len() != b.len() {
        return false;
    }
    let mut acc = 0u8;
    for (x, y) in a.iter().zip(b.iter()) {
        acc |= x ^ y;
    }
    acc == 0
}

/// Validate the `X-API-Key` header against the configured secret.
///
/// `Ok(())` when `expected` is `None` (auth disabled) or the header
/// matches.
pub fn validate_api_key(headers: &HeaderMap, expected: Option<&str>) -> Result<(), ApiError> {
    let expected = match expected {
        Some(key) => key,
        None => return Ok(()),
    };
    let provided = headers
        .get("x-api-key")
        .and_then(|v| v.to_str().ok())
        .ok_or(ApiError::Unauthorized)?;
    if constant_time_eq(provided, expected) {
        Ok(())
    } else {
        Err(ApiError::Unauthorized)
    }
}

/// Paths reachable without authentication: health and hook ingress.
fn is_exempt(path: &str) -> bool {
    path == "/health" || path == "/hooks" || path.starts_with("/hooks/")
}

/// Router-wide auth middleware.
pub async fn auth_layer(
    State(state): State<Arc<AppState>>,
    request: Request,
    next: Next,
) -> Response {
    if state.api_key.is_none() || is_exempt(request.uri().path()) {
        return next.run(request).await;
    }
    match validate_api_key(request.headers(), state.api_key.as_deref()) {
        Ok(()) => next.run(request).await,
        Err(e) => e.into_response(),
    }
}

#[cfg(test)]
#[path = "auth_tests.rs"]
mod tests;
