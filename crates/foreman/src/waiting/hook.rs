// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Layer 1: push notifications from the assistant's runtime.
//!
//! Hook ingress never fails: malformed or uncorrelatable payloads produce a
//! warning in the (always-200) response and are otherwise ignored.

use serde::Deserialize;
use tokio::sync::mpsc;
use tracing::{debug, info};

use crate::model::{ReviewTrigger, SessionKind, SessionStatus, WaitReason};
use crate::review::ReviewRequest;
use crate::store::{NewSession, Store};

use super::{DetectorHandle, SignalLayer, WaitingSignal};

/// Push payload shape. Every field optional: hooks must be resilient.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct HookPayload {
    pub hook_event_name: Option<String>,
    pub notification_type: Option<String>,
    pub session_id: Option<String>,
    pub cwd: Option<String>,
    pub transcript_path: Option<String>,
    #[allow(dead_code)]
    pub source: Option<String>,
}

/// Process one hook payload. Returns a warning string for the response body
/// when the payload was accepted but not actionable.
pub async fn handle_hook_event(
    store: &Store,
    detector: &DetectorHandle,
    review_tx: Option<&mpsc::Sender<ReviewRequest>>,
    payload: serde_json::Value,
) -> Option<String> {
    let payload: HookPayload = match serde_json::from_value(payload) {
        Ok(p) => p,
        Err(e) => {
            debug!("malformed hook payload: {e}");
            return Some("malformed payload".to_owned());
        }
    };

    let event_name = match payload.hook_event_name.as_deref() {
        Some(name) => name.to_owned(),
        None => {
            debug!("hook payload without hook_event_name");
            return Some("missing hook_event_name".to_owned());
        }
    };

    match event_name.as_str() {
        "Notification" => {
            let reason = match payload.notification_type.as_deref() {
                Some("permission_prompt") => WaitReason::PermissionPrompt,
                Some("idle_prompt") => WaitReason::IdlePrompt,
                other => {
                    debug!("ignoring notification type {other:?}");
                    return Some("unrecognized notification_type".to_owned());
                }
            };
            let session = match resolve_session(store, payload.session_id.as_deref()) {
                Some(session) => session,
                None => return Some("no session for hook".to_owned()),
            };
            detector
                .signal(WaitingSignal {
                    session_id: session,
                    waiting: true,
                    reason,
                    layer: SignalLayer::Hook,
                    context: payload.notification_type.clone(),
                })
                .await;
            None
        }
        "Stop" => {
            let session = match resolve_session(store, payload.session_id.as_deref()) {
                Some(session) => session,
                None => return Some("no session for hook".to_owned()),
            };
            detector
                .signal(WaitingSignal {
                    session_id: session.clone(),
                    waiting: true,
                    reason: WaitReason::Stopped,
                    layer: SignalLayer::Hook,
                    context: None,
                })
                .await;
            // Stop-hook reviews are config-gated and off by default.
            if let Some(tx) = review_tx {
                let _ = tx
                    .send(ReviewRequest { session_id: session, trigger: ReviewTrigger::StopHook })
                    .await;
            }
            None
        }
        "SessionStart" => handle_session_start(store, detector, &payload).await,
        other => {
            debug!("ignoring hook event {other}");
            Some(format!("unrecognized hook_event_name: {other}"))
        }
    }
}

/// Correlate an external `session_id` to an internal session by `cwd`.
///
/// Longest-prefix match of `cwd` against project repo paths; links the most
/// recent running/paused session without an assistant id, or creates an
/// adhoc session when none exists. Replaying the same payload is a no-op.
async fn handle_session_start(
    store: &Store,
    detector: &DetectorHandle,
    payload: &HookPayload,
) -> Option<String> {
    let assistant_id = match payload.session_id.as_deref() {
        Some(id) if !id.is_empty() => id,
        _ => return Some("SessionStart without session_id".to_owned()),
    };

    // Same external session already linked: refresh the transcript path only.
    if let Ok(Some(existing)) = store.session_by_assistant_id(assistant_id) {
        if let Some(path) = payload.transcript_path.as_deref() {
            let _ = store.link_assistant_session(&existing.id, assistant_id, Some(path));
            detector.watch_transcript(&existing.id, path.into()).await;
        }
        return None;
    }

    let cwd = match payload.cwd.as_deref() {
        Some(cwd) if !cwd.is_empty() => cwd,
        _ => return Some("SessionStart without cwd".to_owned()),
    };
    let project = match store.find_project_by_cwd(cwd) {
        Ok(Some(project)) => project,
        _ => return Some(format!("no project matches cwd {cwd}")),
    };

    let session_id = match store.latest_unlinked_session(&project.id) {
        Ok(Some(session)) => session.id,
        _ => {
            // Assistant started outside our supervision: track it as an
            // adhoc session without a pane.
            let created = store.insert_session(NewSession {
                project_id: project.id.clone(),
                ticket_id: None,
                kind: SessionKind::Adhoc,
                status: SessionStatus::Running,
                pane_id: String::new(),
                assistant_session_id: None,
                transcript_path: None,
            });
            match created {
                Ok(session) => session.id,
                Err(e) => return Some(format!("failed to create adhoc session: {e}")),
            }
        }
    };

    if let Err(e) =
        store.link_assistant_session(&session_id, assistant_id, payload.transcript_path.as_deref())
    {
        return Some(format!("failed to link session: {e}"));
    }
    info!(session = %session_id, assistant = %assistant_id, "linked assistant session");

    detector.watch_session(&session_id).await;
    if let Some(path) = payload.transcript_path.as_deref() {
        detector.watch_transcript(&session_id, path.into()).await;
    }
    None
}

/// External assistant session id → internal session id.
fn resolve_session(store: &Store, assistant_id: Option<&str>) -> Option<String> {
    let assistant_id = assistant_id?;
    store.session_by_assistant_id(assistant_id).ok().flatten().map(|s| s.id)
}

#[cfg(test)]
#[path = "hook_tests.rs"]
mod tests;
