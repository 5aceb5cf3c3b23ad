// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Review trigger runner: consumes explicit review requests and arms
//! idle-timeout reviews for ticket sessions that stay waiting.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::event::{EventBus, SessionEvent};
use crate::model::ReviewTrigger;
use crate::store::Store;

use super::{ReviewRequest, Reviewer};

/// Trigger policy knobs.
#[derive(Debug, Clone)]
pub struct RunnerSettings {
    pub idle_review: bool,
    pub idle_after: Duration,
}

/// Drive reviews until shutdown.
pub async fn run(
    reviewer: Arc<Reviewer>,
    store: Arc<Store>,
    events: EventBus,
    mut requests: mpsc::Receiver<ReviewRequest>,
    settings: RunnerSettings,
    shutdown: CancellationToken,
) {
    let mut session_rx = events.subscribe_session();
    // Ticket sessions waiting long enough to deserve an idle review.
    let mut armed: HashMap<String, Instant> = HashMap::new();

    loop {
        let next_deadline = armed.values().copied().min();

        tokio::select! {
            _ = shutdown.cancelled() => break,
            request = requests.recv() => {
                match request {
                    Some(request) => spawn_review(Arc::clone(&reviewer), request),
                    None => break,
                }
            }
            event = session_rx.recv() => {
                match event {
                    Ok(SessionEvent::Waiting { session_id, waiting: true, .. }) => {
                        if settings.idle_review && has_ticket(&store, &session_id) {
                            armed
                                .entry(session_id)
                                .or_insert_with(|| Instant::now() + settings.idle_after);
                        }
                    }
                    Ok(SessionEvent::Waiting { session_id, waiting: false, .. }) => {
                        armed.remove(&session_id);
                    }
                    Ok(SessionEvent::Status { session_id, new, .. }) if new.is_terminal() => {
                        armed.remove(&session_id);
                    }
                    Ok(_) => {}
                    Err(tokio::sync::broadcast::error::RecvError::Lagged(_)) => continue,
                    Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
                }
            }
            _ = deadline_sleep(next_deadline) => {
                let now = Instant::now();
                let due: Vec<String> = armed
                    .iter()
                    .filter(|(_, deadline)| **deadline <= now)
                    .map(|(k, _)| k.clone())
                    .collect();
                for session_id in due {
                    armed.remove(&session_id);
                    spawn_review(
                        Arc::clone(&reviewer),
                        ReviewRequest { session_id, trigger: ReviewTrigger::IdleTimeout },
                    );
                }
            }
        }
    }
}

fn has_ticket(store: &Store, session_id: &str) -> bool {
    store
        .get_session(session_id)
        .ok()
        .flatten()
        .map(|s| s.ticket_id.is_some())
        .unwrap_or(false)
}

/// One task per in-flight review; the per-ticket lock serializes duplicates.
fn spawn_review(reviewer: Arc<Reviewer>, request: ReviewRequest) {
    tokio::spawn(async move {
        match reviewer.review_session(&request.session_id, request.trigger).await {
            Ok(Some(result)) => {
                debug!(session = %request.session_id, decision = result.decision.as_str(), "review done")
            }
            Ok(None) => debug!(session = %request.session_id, "review skipped: no ticket"),
            Err(e) => warn!(session = %request.session_id, "review errored: {e}"),
        }
    });
}

async fn deadline_sleep(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}
