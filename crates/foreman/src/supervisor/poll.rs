// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Per-session output poll task.
//!
//! Each tick captures only-new pane lines, appends them to the session's
//! ring buffer, tracks chunk-hash change for idle timing, and scans for the
//! context-percent pattern. A vanished pane completes the session.

use std::collections::HashMap;
use std::sync::atomic::Ordering;
use std::sync::Arc;

use parking_lot::RwLock;
use sha2::{Digest, Sha256};
use tracing::{info, warn};

use crate::event::{EventBus, SessionEvent};
use crate::model::{now_epoch_ms, SessionStatus};
use crate::pane::{PaneCursor, PaneDriver, PaneError};
use crate::store::Store;
use crate::waiting::DetectorHandle;

use super::{ActiveSession, SupervisorSettings};

pub(super) struct PollContext {
    pub store: Arc<Store>,
    pub driver: Arc<dyn PaneDriver>,
    pub events: EventBus,
    pub detector: DetectorHandle,
    pub settings: Arc<SupervisorSettings>,
    pub active: Arc<RwLock<HashMap<String, Arc<ActiveSession>>>>,
    pub handle: Arc<ActiveSession>,
}

pub(super) fn spawn(ctx: PollContext, cursor: Option<PaneCursor>) {
    tokio::spawn(run(ctx, cursor));
}

async fn run(ctx: PollContext, mut cursor: Option<PaneCursor>) {
    let mut interval = tokio::time::interval(ctx.settings.poll_interval);
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = ctx.handle.cancel.cancelled() => break,
            _ = interval.tick() => {}
        }

        let capture = match ctx.driver.capture_pane(&ctx.handle.pane_id, cursor).await {
            Ok(capture) => capture,
            Err(PaneError::NotFound(_)) => {
                handle_vanished_pane(&ctx).await;
                break;
            }
            Err(e) => {
                warn!(session = %ctx.handle.session_id, "capture failed: {e}");
                continue;
            }
        };
        cursor = Some(capture.cursor);
        if capture.lines.is_empty() {
            continue;
        }

        process_lines(&ctx, capture.lines).await;
    }
}

/// The pane disappeared underneath us: complete the session.
async fn handle_vanished_pane(ctx: &PollContext) {
    let session_id = &ctx.handle.session_id;
    ctx.active.write().remove(session_id);

    let previous = ctx
        .store
        .get_session(session_id)
        .ok()
        .flatten()
        .map(|s| s.status)
        .unwrap_or(SessionStatus::Running);
    if previous.is_terminal() {
        return;
    }
    let _ = ctx.store.set_session_status(session_id, SessionStatus::Completed);
    ctx.events.emit_session(SessionEvent::Status {
        session_id: session_id.clone(),
        previous,
        new: SessionStatus::Completed,
        at_ms: now_epoch_ms(),
        error: None,
    });
    ctx.detector.unwatch_session(session_id).await;
    info!(session = %session_id, "pane vanished, session completed");
}

async fn process_lines(ctx: &PollContext, lines: Vec<String>) {
    let handle = &ctx.handle;

    // Hash the captured chunk; an unchanged chunk must not refresh the
    // activity clock.
    let chunk_hash = hash_chunk(&lines);
    let changed = {
        let mut last = handle.last_output_hash.lock();
        if *last == Some(chunk_hash) {
            false
        } else {
            *last = Some(chunk_hash);
            true
        }
    };

    handle.ring.lock().extend(lines.iter().cloned());

    if changed {
        handle.last_output_ms.store(now_epoch_ms(), Ordering::Relaxed);
        ctx.detector.note_activity(&handle.session_id).await;
    }

    ctx.events.emit_session(SessionEvent::Output {
        session_id: handle.session_id.clone(),
        lines: lines.clone(),
    });

    if let Some(percent) = scan_context_percent(&ctx.settings.context_pattern, &lines) {
        handle.context_percent.store(i32::from(percent), Ordering::Relaxed);
        if let Err(e) = ctx.store.set_session_context_percent(&handle.session_id, percent) {
            warn!(session = %handle.session_id, "context percent update failed: {e}");
        }
        ctx.events.emit_session(SessionEvent::Context {
            session_id: handle.session_id.clone(),
            percent,
        });
        if percent <= ctx.settings.context_low_threshold {
            ctx.events.emit_session(SessionEvent::ContextLow {
                session_id: handle.session_id.clone(),
                percent,
            });
        }
    }
}

fn hash_chunk(lines: &[String]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    for line in lines {
        hasher.update(line.as_bytes());
        hasher.update(b"\n");
    }
    hasher.finalize().into()
}

/// Last context-percent match in the batch wins.
pub(crate) fn scan_context_percent(pattern: &regex::Regex, lines: &[String]) -> Option<u8> {
    let mut found = None;
    for line in lines {
        if let Some(caps) = pattern.captures(line) {
            if let Some(value) = caps.get(1).and_then(|m| m.as_str().parse::<u64>().ok()) {
                found = Some(value.min(100) as u8);
            }
        }
    }
    found
}

#[cfg(test)]
#[path = "poll_tests.rs"]
mod tests;
