// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Terminal multiplexer capability consumed by the core.
//!
//! The production implementation shells out to the tmux binary; tests use
//! an in-memory fake. Driver calls may be slow (external process), so
//! callers must not hold internal locks across them.

pub mod tmux;

pub use tmux::TmuxPaneDriver;

use std::fmt;
use std::path::Path;

use async_trait::async_trait;

/// A named pane group ("session" in multiplexer parlance).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupInfo {
    pub name: String,
}

/// One pane inside a group.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaneInfo {
    pub id: String,
    pub index: u32,
    pub active: bool,
    pub pid: Option<i64>,
}

/// A freshly spawned pane.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpawnedPane {
    pub id: String,
    pub pid: Option<i64>,
}

/// Opaque capture cursor: callers hold it between `capture_pane` calls and
/// get only lines appended since.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PaneCursor(pub(crate) u64);

/// Result of one pane capture.
#[derive(Debug, Clone)]
pub struct Capture {
    pub lines: Vec<String>,
    pub cursor: PaneCursor,
}

#[derive(Debug, Clone)]
pub enum PaneError {
    /// The pane (or group) does not exist.
    NotFound(String),
    /// The multiplexer tool failed.
    Failed(String),
}

impl fmt::Display for PaneError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotFound(what) => write!(f, "pane not found: {what}"),
            Self::Failed(detail) => write!(f, "pane driver failed: {detail}"),
        }
    }
}

impl std::error::Error for PaneError {}

impl From<PaneError> for crate::error::ApiError {
    fn from(e: PaneError) -> Self {
        match e {
            PaneError::NotFound(what) => crate::error::ApiError::NotFound {
                resource: "pane",
                id: what,
            },
            PaneError::Failed(detail) => crate::error::ApiError::external(detail),
        }
    }
}

/// Capability for spawning, inspecting, and driving multiplexer panes.
#[async_trait]
pub trait PaneDriver: Send + Sync {
    async fn list_groups(&self) -> Result<Vec<GroupInfo>, PaneError>;

    async fn list_panes(&self, group: &str) -> Result<Vec<PaneInfo>, PaneError>;

    async fn pane_exists(&self, pane_id: &str) -> Result<bool, PaneError>;

    /// Spawn a new pane in `group` (creating the group when missing) with
    /// the given working directory.
    async fn spawn_pane(
        &self,
        group: &str,
        window: Option<&str>,
        cwd: &Path,
    ) -> Result<SpawnedPane, PaneError>;

    /// Send literal text (no trailing newline).
    async fn send_text(&self, pane_id: &str, text: &str) -> Result<(), PaneError>;

    /// Send a named key: `Enter`, `Escape`, `C-c`, ...
    async fn send_key(&self, pane_id: &str, key: &str) -> Result<(), PaneError>;

    /// Capture lines appended since `since` (all history when `None`).
    async fn capture_pane(
        &self,
        pane_id: &str,
        since: Option<PaneCursor>,
    ) -> Result<Capture, PaneError>;

    async fn kill_pane(&self, pane_id: &str) -> Result<(), PaneError>;

    async fn focus_pane(&self, pane_id: &str) -> Result<(), PaneError>;
}
