// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Shared test infrastructure: fake capability drivers and config builders.

use std::collections::{HashMap, VecDeque};
use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::config::Config;
use crate::pane::{
    Capture, GroupInfo, PaneCursor, PaneDriver, PaneError, PaneInfo, SpawnedPane,
};
use crate::review::ReviewerDriver;

/// In-memory pane state for [`FakePaneDriver`].
#[derive(Debug, Clone, Default)]
pub struct FakePane {
    pub group: String,
    pub cwd: PathBuf,
    pub lines: Vec<String>,
    pub sent: Vec<String>,
    pub keys: Vec<String>,
    pub alive: bool,
}

#[derive(Default)]
struct FakeMux {
    counter: u64,
    fail_next_spawn: bool,
    panes: HashMap<String, FakePane>,
}

/// Scriptable multiplexer double: panes are vectors of lines, input is
/// recorded for assertions, and panes can be killed out from under the
/// supervisor.
#[derive(Default)]
pub struct FakePaneDriver {
    state: Mutex<FakeMux>,
}

impl FakePaneDriver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append output lines to a pane, as if the assistant printed them.
    pub fn feed(&self, pane_id: &str, lines: &[&str]) {
        let mut state = self.state.lock();
        if let Some(pane) = state.panes.get_mut(pane_id) {
            pane.lines.extend(lines.iter().map(|s| (*s).to_owned()));
        }
    }

    /// Kill a pane outside the supervisor's control.
    pub fn kill_externally(&self, pane_id: &str) {
        let mut state = self.state.lock();
        if let Some(pane) = state.panes.get_mut(pane_id) {
            pane.alive = false;
        }
    }

    /// Make the next `spawn_pane` fail.
    pub fn fail_next_spawn(&self) {
        self.state.lock().fail_next_spawn = true;
    }

    /// Text lines sent to a pane via `send_text`.
    pub fn sent(&self, pane_id: &str) -> Vec<String> {
        self.state.lock().panes.get(pane_id).map(|p| p.sent.clone()).unwrap_or_default()
    }

    /// Keys sent to a pane via `send_key`.
    pub fn keys(&self, pane_id: &str) -> Vec<String> {
        self.state.lock().panes.get(pane_id).map(|p| p.keys.clone()).unwrap_or_default()
    }

    pub fn pane_count(&self) -> usize {
        self.state.lock().panes.len()
    }

    /// Id of the most recently spawned pane.
    pub fn latest_pane_id(&self) -> Option<String> {
        let state = self.state.lock();
        let n = state.counter;
        (n > 0).then(|| format!("%{n}"))
    }
}

#[async_trait]
impl PaneDriver for FakePaneDriver {
    async fn list_groups(&self) -> Result<Vec<GroupInfo>, PaneError> {
        let state = self.state.lock();
        let mut names: Vec<String> = state.panes.values().map(|p| p.group.clone()).collect();
        names.sort();
        names.dedup();
        Ok(names.into_iter().map(|name| GroupInfo { name }).collect())
    }

    async fn list_panes(&self, group: &str) -> Result<Vec<PaneInfo>, PaneError> {
        let state = self.state.lock();
        let mut panes: Vec<PaneInfo> = state
            .panes
            .iter()
            .filter(|(_, p)| p.group == group && p.alive)
            .enumerate()
            .map(|(index, (id, _))| PaneInfo {
                id: id.clone(),
                index: index as u32,
                active: index == 0,
                pid: None,
            })
            .collect();
        panes.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(panes)
    }

    async fn pane_exists(&self, pane_id: &str) -> Result<bool, PaneError> {
        let state = self.state.lock();
        Ok(state.panes.get(pane_id).map(|p| p.alive).unwrap_or(false))
    }

    async fn spawn_pane(
        &self,
        group: &str,
        _window: Option<&str>,
        cwd: &Path,
    ) -> Result<SpawnedPane, PaneError> {
        let mut state = self.state.lock();
        if state.fail_next_spawn {
            state.fail_next_spawn = false;
            return Err(PaneError::Failed("injected spawn failure".to_owned()));
        }
        state.counter += 1;
        let id = format!("%{}", state.counter);
        let pid = 1000 + state.counter as i64;
        state.panes.insert(
            id.clone(),
            FakePane {
                group: group.to_owned(),
                cwd: cwd.to_path_buf(),
                alive: true,
                ..Default::default()
            },
        );
        Ok(SpawnedPane { id, pid: Some(pid) })
    }

    async fn send_text(&self, pane_id: &str, text: &str) -> Result<(), PaneError> {
        let mut state = self.state.lock();
        match state.panes.get_mut(pane_id) {
            Some(pane) if pane.alive => {
                pane.sent.push(text.to_owned());
                Ok(())
            }
            _ => Err(PaneError::NotFound(pane_id.to_owned())),
        }
    }

    async fn send_key(&self, pane_id: &str, key: &str) -> Result<(), PaneError> {
        let mut state = self.state.lock();
        match state.panes.get_mut(pane_id) {
            Some(pane) if pane.alive => {
                pane.keys.push(key.to_owned());
                Ok(())
            }
            _ => Err(PaneError::NotFound(pane_id.to_owned())),
        }
    }

    async fn capture_pane(
        &self,
        pane_id: &str,
        since: Option<PaneCursor>,
    ) -> Result<Capture, PaneError> {
        let state = self.state.lock();
        match state.panes.get(pane_id) {
            Some(pane) if pane.alive => {
                let total = pane.lines.len() as u64;
                let seen = since.map(|c| c.0).unwrap_or(0).min(total);
                let lines = pane.lines[seen as usize..].to_vec();
                Ok(Capture { lines, cursor: PaneCursor(total) })
            }
            _ => Err(PaneError::NotFound(pane_id.to_owned())),
        }
    }

    async fn kill_pane(&self, pane_id: &str) -> Result<(), PaneError> {
        let mut state = self.state.lock();
        match state.panes.get_mut(pane_id) {
            Some(pane) => {
                pane.alive = false;
                Ok(())
            }
            None => Err(PaneError::NotFound(pane_id.to_owned())),
        }
    }

    async fn focus_pane(&self, pane_id: &str) -> Result<(), PaneError> {
        let state = self.state.lock();
        match state.panes.get(pane_id) {
            Some(pane) if pane.alive => Ok(()),
            _ => Err(PaneError::NotFound(pane_id.to_owned())),
        }
    }
}

/// Scriptable reviewer double: returns queued responses (then a default)
/// and records every prompt.
pub struct FakeReviewerDriver {
    responses: Mutex<VecDeque<anyhow::Result<String>>>,
    default: String,
    delay: Mutex<Option<Duration>>,
    prompts: Mutex<Vec<String>>,
}

impl FakeReviewerDriver {
    pub fn new() -> Self {
        Self::with_default("COMPLETE\nAll criteria met.")
    }

    pub fn with_default(response: impl Into<String>) -> Self {
        Self {
            responses: Mutex::new(VecDeque::new()),
            default: response.into(),
            delay: Mutex::new(None),
            prompts: Mutex::new(Vec::new()),
        }
    }

    pub fn push_response(&self, response: impl Into<String>) {
        self.responses.lock().push_back(Ok(response.into()));
    }

    pub fn push_failure(&self, error: impl Into<String>) {
        let message = error.into();
        self.responses.lock().push_back(Err(anyhow::anyhow!(message)));
    }

    /// Delay every response, for timeout tests.
    pub fn set_delay(&self, delay: Duration) {
        *self.delay.lock() = Some(delay);
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().clone()
    }
}

impl Default for FakeReviewerDriver {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ReviewerDriver for FakeReviewerDriver {
    async fn run(
        &self,
        prompt: &str,
        _model: Option<&str>,
        _timeout: Duration,
    ) -> anyhow::Result<String> {
        self.prompts.lock().push(prompt.to_owned());
        let delay = *self.delay.lock();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        match self.responses.lock().pop_front() {
            Some(response) => response,
            None => Ok(self.default.clone()),
        }
    }
}

/// A config with an in-memory database and timings suitable for tests.
pub fn test_config() -> Config {
    use clap::Parser;
    Config::parse_from([
        "foreman",
        "--database-url",
        ":memory:",
        "--poll-interval-ms",
        "20",
        "--debounce-ms",
        "50",
        "--clear-delay-ms",
        "100",
        "--idle-threshold-secs",
        "1",
        "--handoff-poll-ms",
        "20",
        "--export-delay-ms",
        "10",
        "--import-delay-ms",
        "10",
        "--handoff-timeout-ms",
        "2000",
        "--review-timeout-ms",
        "2000",
    ])
}
