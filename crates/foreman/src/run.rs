// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Top-level runtime assembly — shared by `main` and integration tests.
//!
//! Services are constructed once, wired through the event bus and injected
//! capabilities, and torn down in reverse order on shutdown.

use std::sync::Arc;
use std::time::{Duration, Instant};

use regex::Regex;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use crate::config::Config;
use crate::event::EventBus;
use crate::handoff::{HandoffCoordinator, HandoffSettings};
use crate::pane::{PaneDriver, TmuxPaneDriver};
use crate::review::runner::RunnerSettings;
use crate::review::{CliReviewerDriver, Reviewer, ReviewerDriver, ReviewerSettings};
use crate::store::Store;
use crate::supervisor::{Supervisor, SupervisorSettings};
use crate::tickets::TicketService;
use crate::transport::{build_router, AppState, WsSettings};
use crate::waiting::patterns::OutputScanner;
use crate::waiting::{FusionSettings, WaitingDetector};

/// A fully wired service graph with its background tasks running.
pub struct Runtime {
    pub state: Arc<AppState>,
    shutdown: CancellationToken,
    grace: Duration,
    tasks: Vec<JoinHandle<()>>,
}

impl Runtime {
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Cancel all background tasks and wait up to the grace period for
    /// them to quiesce.
    pub async fn shutdown(self) {
        self.shutdown.cancel();
        for task in self.tasks {
            if tokio::time::timeout(self.grace, task).await.is_err() {
                warn!("background task did not quiesce within grace period");
            }
        }
    }
}

/// Initialize tracing/logging from config.
///
/// Uses `try_init` so it's safe to call multiple times (e.g. from tests).
pub fn init_tracing(config: &Config) {
    use tracing_subscriber::fmt;

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));
    let result = match config.log_format.as_str() {
        "json" => fmt::fmt().with_env_filter(filter).json().try_init(),
        _ => fmt::fmt().with_env_filter(filter).try_init(),
    };
    drop(result);
}

/// Construct every service and spawn the background tasks. Must run inside
/// a tokio runtime.
pub fn build_runtime(
    config: &Config,
    store: Arc<Store>,
    pane_driver: Arc<dyn PaneDriver>,
    reviewer_driver: Arc<dyn ReviewerDriver>,
) -> anyhow::Result<Runtime> {
    let shutdown = CancellationToken::new();
    let events = EventBus::new(256);
    let mut tasks = Vec::new();

    // Waiting detector (fusion task) and its handle.
    let detector = WaitingDetector::new(
        Arc::clone(&store),
        events.clone(),
        FusionSettings {
            debounce: config.debounce(),
            clear_delay: config.clear_delay(),
            transcript_poll: Duration::from_secs(5),
        },
        shutdown.child_token(),
    );
    let detector_handle = detector.handle();
    tasks.push(tokio::spawn(detector.run()));

    let supervisor = Arc::new(Supervisor::new(
        Arc::clone(&store),
        pane_driver,
        events.clone(),
        detector_handle.clone(),
        SupervisorSettings {
            poll_interval: config.poll_interval(),
            ring_capacity: config.ring_capacity,
            context_pattern: Regex::new(&config.context_pattern)?,
            context_low_threshold: config.context_low_threshold,
        },
        shutdown.child_token(),
    ));

    let tickets =
        Arc::new(TicketService::new(Arc::clone(&store), events.clone(), Arc::clone(&supervisor)));

    let reviewer = Arc::new(Reviewer::new(
        Arc::clone(&store),
        events.clone(),
        Arc::clone(&supervisor),
        Arc::clone(&tickets),
        reviewer_driver,
        ReviewerSettings {
            timeout: config.review_timeout(),
            output_tail: 100,
            model: config.reviewer_model.clone(),
        },
    ));

    // Review triggers: explicit requests + idle timeout.
    let (review_tx, review_rx) = mpsc::channel(64);
    tasks.push(tokio::spawn(crate::review::runner::run(
        Arc::clone(&reviewer),
        Arc::clone(&store),
        events.clone(),
        review_rx,
        RunnerSettings {
            idle_review: config.effective_review_on_idle(),
            idle_after: config.review_idle(),
        },
        shutdown.child_token(),
    )));

    // Layer 3: output pattern scanner.
    let scanner = OutputScanner::new(
        events.clone(),
        detector_handle.clone(),
        review_tx.clone(),
        config.idle_threshold(),
        shutdown.child_token(),
    );
    tasks.push(tokio::spawn(scanner.run()));

    // Auto-handoff coordinator.
    let handoff = Arc::new(HandoffCoordinator::new(
        Arc::clone(&store),
        events.clone(),
        Arc::clone(&supervisor),
        HandoffSettings {
            threshold: config.context_low_threshold,
            export_command: config.export_command.clone(),
            import_command: config.import_command.clone(),
            poll_interval: config.handoff_poll(),
            timeout: config.handoff_timeout(),
            export_delay: config.export_delay(),
            import_delay: config.import_delay(),
        },
    ));
    tasks.push(tokio::spawn(Arc::clone(&handoff).run(shutdown.child_token())));

    let state = Arc::new(AppState {
        store,
        supervisor,
        detector: detector_handle,
        tickets,
        reviewer,
        handoff,
        events,
        review_tx,
        review_on_stop_hook: config.effective_review_on_stop_hook(),
        api_key: config.api_key.clone(),
        ws: WsSettings {
            ping_interval: config.ws_ping_interval(),
            connection_timeout: config.ws_connection_timeout(),
            rate_limit_max: config.ws_rate_limit_max,
            rate_limit_window: config.ws_rate_limit_window(),
            max_message_bytes: config.ws_max_message_bytes,
            replay_lines: config.ws_replay_lines,
            input_max_chars: config.input_max_chars,
        },
        started_at: Instant::now(),
        shutdown: shutdown.clone(),
    });

    Ok(Runtime { state, shutdown, grace: config.shutdown_grace(), tasks })
}

/// Run the server to completion: open the store, wire the production
/// drivers, recover supervised sessions, and serve until SIGINT/SIGTERM.
pub async fn run(config: Config) -> anyhow::Result<()> {
    init_tracing(&config);
    config.validate()?;

    let store = Arc::new(Store::open(&config.database_url)?);
    let pane_driver: Arc<dyn PaneDriver> =
        Arc::new(TmuxPaneDriver::new(config.pane_tool_path.clone()));
    let reviewer_driver: Arc<dyn ReviewerDriver> =
        Arc::new(CliReviewerDriver::new(config.reviewer_cli_path.clone()));

    let runtime = build_runtime(&config, store, pane_driver, reviewer_driver)?;

    if let Err(e) = runtime.state.supervisor.recover().await {
        warn!("session recovery failed: {e}");
    }

    let addr = format!("{}:{}", config.host, config.port);
    let listener = TcpListener::bind(&addr).await?;
    info!("listening on {}", listener.local_addr()?);

    let router = build_router(Arc::clone(&runtime.state));
    let shutdown = runtime.shutdown_token();
    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal(shutdown.clone()))
        .await?;

    info!("shutting down");
    runtime.shutdown().await;
    Ok(())
}

/// Resolve when SIGINT/SIGTERM arrives or the runtime is cancelled.
async fn shutdown_signal(shutdown: CancellationToken) {
    let ctrl_c = async {
        let _ = tokio::signal::ctrl_c().await;
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(_) => std::future::pending().await,
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
        _ = shutdown.cancelled() => {}
    }
}
