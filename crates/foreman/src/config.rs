// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::time::Duration;

use clap::Parser;

/// Orchestrator for assistant coding sessions hosted in terminal
/// multiplexer panes.
#[derive(Debug, Clone, Parser)]
#[command(name = "foreman", version, about)]
pub struct Config {
    /// HTTP port to listen on.
    #[arg(long, env = "PORT", default_value = "4810")]
    pub port: u16,

    /// Host address to bind to.
    #[arg(long, env = "HOST", default_value = "0.0.0.0")]
    pub host: String,

    /// Pre-shared API key. Unset disables authentication.
    #[arg(long, env = "API_KEY")]
    pub api_key: Option<String>,

    /// Path to the terminal multiplexer binary.
    #[arg(long, env = "PANE_TOOL_PATH", default_value = "tmux")]
    pub pane_tool_path: String,

    /// Path to the reviewer assistant CLI binary.
    #[arg(long, env = "REVIEWER_CLI_PATH", default_value = "claude")]
    pub reviewer_cli_path: String,

    /// Database location: a file path or `sqlite://` URL.
    #[arg(long, env = "DATABASE_URL", default_value = "foreman.db")]
    pub database_url: String,

    /// Output poll interval per active session, in milliseconds.
    #[arg(long, env = "FOREMAN_POLL_INTERVAL_MS", default_value = "500")]
    pub poll_interval_ms: u64,

    /// Output ring buffer capacity, in lines, per session.
    #[arg(long, env = "FOREMAN_RING_CAPACITY", default_value = "1000")]
    pub ring_capacity: usize,

    /// Regex extracting the remaining-context percentage from output.
    #[arg(long, env = "FOREMAN_CONTEXT_PATTERN", default_value = r"Context: (\d+)% remaining")]
    pub context_pattern: String,

    /// Context percentage at or below which a handoff is triggered.
    #[arg(long, env = "FOREMAN_CONTEXT_LOW_THRESHOLD", default_value = "20")]
    pub context_low_threshold: u8,

    /// Waiting-signal debounce window, in milliseconds.
    #[arg(long, env = "FOREMAN_DEBOUNCE_MS", default_value = "500")]
    pub debounce_ms: u64,

    /// Delay before activity clears a waiting state, in milliseconds.
    #[arg(long, env = "FOREMAN_CLEAR_DELAY_MS", default_value = "2000")]
    pub clear_delay_ms: u64,

    /// Quiet time after a question pattern before the session counts as
    /// waiting, in seconds.
    #[arg(long, env = "FOREMAN_IDLE_THRESHOLD_SECS", default_value = "5")]
    pub idle_threshold_secs: u64,

    /// Continuous waiting time after which a ticket session is reviewed
    /// with the idle_timeout trigger, in seconds.
    #[arg(long, env = "FOREMAN_REVIEW_IDLE_SECS", default_value = "300")]
    pub review_idle_secs: u64,

    /// Run a review when a ticket session goes idle. Default: true.
    #[arg(long, env = "FOREMAN_REVIEW_ON_IDLE")]
    pub review_on_idle: Option<bool>,

    /// Run a review on every assistant stop hook. Default: false.
    #[arg(long, env = "FOREMAN_REVIEW_ON_STOP_HOOK")]
    pub review_on_stop_hook: Option<bool>,

    /// Reviewer CLI timeout, in milliseconds.
    #[arg(long, env = "FOREMAN_REVIEW_TIMEOUT_MS", default_value = "30000")]
    pub review_timeout_ms: u64,

    /// Reviewer model override passed to the CLI.
    #[arg(long, env = "FOREMAN_REVIEWER_MODEL")]
    pub reviewer_model: Option<String>,

    /// Command sent to a session to export handoff context.
    #[arg(long, env = "FOREMAN_EXPORT_COMMAND", default_value = "/exportHandoff")]
    pub export_command: String,

    /// Command sent to the replacement session to import handoff context.
    #[arg(long, env = "FOREMAN_IMPORT_COMMAND", default_value = "/importHandoff")]
    pub import_command: String,

    /// Handoff file poll interval, in milliseconds.
    #[arg(long, env = "FOREMAN_HANDOFF_POLL_MS", default_value = "1000")]
    pub handoff_poll_ms: u64,

    /// Handoff file wait timeout, in milliseconds.
    #[arg(long, env = "FOREMAN_HANDOFF_TIMEOUT_MS", default_value = "60000")]
    pub handoff_timeout_ms: u64,

    /// Grace period between export completion and termination, in
    /// milliseconds.
    #[arg(long, env = "FOREMAN_EXPORT_DELAY_MS", default_value = "2000")]
    pub export_delay_ms: u64,

    /// Delay after the replacement session starts before importing, in
    /// milliseconds.
    #[arg(long, env = "FOREMAN_IMPORT_DELAY_MS", default_value = "3000")]
    pub import_delay_ms: u64,

    /// WebSocket heartbeat interval, in seconds.
    #[arg(long, env = "FOREMAN_WS_PING_INTERVAL_SECS", default_value = "30")]
    pub ws_ping_interval_secs: u64,

    /// WebSocket client silence timeout, in seconds.
    #[arg(long, env = "FOREMAN_WS_CONNECTION_TIMEOUT_SECS", default_value = "60")]
    pub ws_connection_timeout_secs: u64,

    /// Max client → server messages per rate-limit window.
    #[arg(long, env = "FOREMAN_WS_RATE_LIMIT_MAX", default_value = "100")]
    pub ws_rate_limit_max: u32,

    /// Rate-limit window, in seconds.
    #[arg(long, env = "FOREMAN_WS_RATE_LIMIT_WINDOW_SECS", default_value = "10")]
    pub ws_rate_limit_window_secs: u64,

    /// Max incoming WebSocket message size, in bytes.
    #[arg(long, env = "FOREMAN_WS_MAX_MESSAGE_BYTES", default_value = "65536")]
    pub ws_max_message_bytes: usize,

    /// Buffered output lines replayed on subscribe.
    #[arg(long, env = "FOREMAN_WS_REPLAY_LINES", default_value = "100")]
    pub ws_replay_lines: usize,

    /// Max characters accepted in a `session:input` message.
    #[arg(long, env = "FOREMAN_INPUT_MAX_CHARS", default_value = "10000")]
    pub input_max_chars: usize,

    /// Shutdown grace period for background tasks, in seconds.
    #[arg(long, env = "FOREMAN_SHUTDOWN_GRACE_SECS", default_value = "5")]
    pub shutdown_grace_secs: u64,

    /// Log format (json or text).
    #[arg(long, env = "FOREMAN_LOG_FORMAT", default_value = "json")]
    pub log_format: String,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long, env = "FOREMAN_LOG_LEVEL", default_value = "info")]
    pub log_level: String,
}

impl Config {
    /// Validate the configuration after parsing.
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.database_url.trim().is_empty() {
            anyhow::bail!("DATABASE_URL must not be empty");
        }
        if self.context_low_threshold > 100 {
            anyhow::bail!("context low threshold must be within 0..=100");
        }
        if self.ring_capacity == 0 {
            anyhow::bail!("ring capacity must be positive");
        }
        regex::Regex::new(&self.context_pattern)
            .map_err(|e| anyhow::anyhow!("invalid context pattern: {e}"))?;
        Ok(())
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }

    pub fn clear_delay(&self) -> Duration {
        Duration::from_millis(self.clear_delay_ms)
    }

    pub fn idle_threshold(&self) -> Duration {
        Duration::from_secs(self.idle_threshold_secs)
    }

    pub fn review_idle(&self) -> Duration {
        Duration::from_secs(self.review_idle_secs)
    }

    pub fn review_timeout(&self) -> Duration {
        Duration::from_millis(self.review_timeout_ms)
    }

    pub fn handoff_poll(&self) -> Duration {
        Duration::from_millis(self.handoff_poll_ms)
    }

    pub fn handoff_timeout(&self) -> Duration {
        Duration::from_millis(self.handoff_timeout_ms)
    }

    pub fn export_delay(&self) -> Duration {
        Duration::from_millis(self.export_delay_ms)
    }

    pub fn import_delay(&self) -> Duration {
        Duration::from_millis(self.import_delay_ms)
    }

    pub fn ws_ping_interval(&self) -> Duration {
        Duration::from_secs(self.ws_ping_interval_secs)
    }

    pub fn ws_connection_timeout(&self) -> Duration {
        Duration::from_secs(self.ws_connection_timeout_secs)
    }

    pub fn ws_rate_limit_window(&self) -> Duration {
        Duration::from_secs(self.ws_rate_limit_window_secs)
    }

    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_secs(self.shutdown_grace_secs)
    }

    /// Idle reviews default to on.
    pub fn effective_review_on_idle(&self) -> bool {
        self.review_on_idle.unwrap_or(true)
    }

    /// Stop-hook reviews default to off.
    pub fn effective_review_on_stop_hook(&self) -> bool {
        self.review_on_stop_hook.unwrap_or(false)
    }
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
