// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Hook ingress handlers.
//!
//! Hooks must be resilient: both endpoints reply 200 with
//! `{received: true}` even on malformed bodies, carrying a `warning` field
//! when the payload was not actionable.

use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::State;
use axum::response::IntoResponse;
use axum::Json;
use tracing::debug;

use crate::transport::state::AppState;
use crate::waiting::hook;

fn reply(warning: Option<String>) -> Json<serde_json::Value> {
    match warning {
        Some(warning) => Json(serde_json::json!({ "received": true, "warning": warning })),
        None => Json(serde_json::json!({ "received": true })),
    }
}

/// `POST /hooks/claude` — free-form push payload from the assistant's
/// runtime. Always 200.
pub async fn hook_claude(State(s): State<Arc<AppState>>, body: Bytes) -> impl IntoResponse {
    let payload: serde_json::Value = match serde_json::from_slice(&body) {
        Ok(value) => value,
        Err(e) => {
            debug!("unparseable hook body: {e}");
            return reply(Some("invalid JSON body".to_owned()));
        }
    };
    let review_tx = s.review_on_stop_hook.then(|| s.review_tx.clone());
    let warning =
        hook::handle_hook_event(&s.store, &s.detector, review_tx.as_ref(), payload).await;
    reply(warning)
}

/// `POST /hooks/session-start` — `{session_id, cwd, transcript_path?,
/// source?}`. Always 200.
pub async fn hook_session_start(
    State(s): State<Arc<AppState>>,
    body: Bytes,
) -> impl IntoResponse {
    let payload: serde_json::Value = match serde_json::from_slice(&body) {
        Ok(serde_json::Value::Object(mut map)) => {
            map.insert("hook_event_name".to_owned(), "SessionStart".into());
            serde_json::Value::Object(map)
        }
        Ok(_) | Err(_) => {
            debug!("unparseable session-start body");
            return reply(Some("invalid JSON body".to_owned()));
        }
    };
    let warning = hook::handle_hook_event(&s.store, &s.detector, None, payload).await;
    reply(warning)
}
