// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::event::EventBus;
use crate::handoff::HandoffCoordinator;
use crate::review::{ReviewRequest, Reviewer};
use crate::store::Store;
use crate::supervisor::Supervisor;
use crate::tickets::TicketService;
use crate::waiting::DetectorHandle;

/// Fan-out and input limits for the WebSocket layer.
#[derive(Debug, Clone)]
pub struct WsSettings {
    pub ping_interval: Duration,
    pub connection_timeout: Duration,
    pub rate_limit_max: u32,
    pub rate_limit_window: Duration,
    pub max_message_bytes: usize,
    pub replay_lines: usize,
    pub input_max_chars: usize,
}

impl Default for WsSettings {
    fn default() -> Self {
        Self {
            ping_interval: Duration::from_secs(30),
            connection_timeout: Duration::from_secs(60),
            rate_limit_max: 100,
            rate_limit_window: Duration::from_secs(10),
            max_message_bytes: 64 * 1024,
            replay_lines: 100,
            input_max_chars: 10_000,
        }
    }
}

/// Shared application state passed to all handlers via the axum `State`
/// extractor. Long-lived services are initialized once at startup and torn
/// down in reverse order on shutdown.
pub struct AppState {
    pub store: Arc<Store>,
    pub supervisor: Arc<Supervisor>,
    pub detector: DetectorHandle,
    pub tickets: Arc<TicketService>,
    pub reviewer: Arc<Reviewer>,
    pub handoff: Arc<HandoffCoordinator>,
    pub events: EventBus,
    pub review_tx: mpsc::Sender<ReviewRequest>,
    /// Stop-hook reviews enabled (config-gated, off by default).
    pub review_on_stop_hook: bool,
    /// Pre-shared API key; `None` disables authentication.
    pub api_key: Option<String>,
    pub ws: WsSettings,
    pub started_at: Instant,
    pub shutdown: CancellationToken,
}

impl std::fmt::Debug for AppState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppState").field("auth", &self.api_key.is_some()).finish()
    }
}
