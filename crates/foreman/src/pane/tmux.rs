// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! tmux-backed [`PaneDriver`].
//!
//! Every method is one or two invocations of the tmux binary. Pane ids are
//! tmux pane ids (`%N`); the capture cursor counts lines already returned
//! from the pane's full history.

use std::path::Path;

use async_trait::async_trait;
use tokio::process::Command;

use super::{Capture, GroupInfo, PaneCursor, PaneDriver, PaneError, PaneInfo, SpawnedPane};

pub struct TmuxPaneDriver {
    bin: String,
}

impl TmuxPaneDriver {
    pub fn new(bin: impl Into<String>) -> Self {
        Self { bin: bin.into() }
    }

    /// Run tmux with the given args, returning trimmed stdout.
    async fn run(&self, args: &[&str]) -> Result<String, PaneError> {
        let output = Command::new(&self.bin)
            .args(args)
            .output()
            .await
            .map_err(|e| PaneError::Failed(format!("failed to invoke {}: {e}", self.bin)))?;

        if output.status.success() {
            Ok(String::from_utf8_lossy(&output.stdout).trim_end().to_owned())
        } else {
            let stderr = String::from_utf8_lossy(&output.stderr);
            Err(classify_failure(stderr.trim()))
        }
    }
}

/// Map a tmux error message to the driver error taxonomy.
fn classify_failure(stderr: &str) -> PaneError {
    let lower = stderr.to_lowercase();
    if lower.contains("can't find")
        || lower.contains("no such")
        || lower.contains("session not found")
        || lower.contains("no server running")
    {
        PaneError::NotFound(stderr.to_owned())
    } else {
        PaneError::Failed(stderr.to_owned())
    }
}

/// Split full-history capture output into lines past the cursor.
///
/// tmux pads the visible region with trailing blank lines; those are
/// stripped before cursor math so repeated captures stay stable. A cursor
/// beyond the current history (pane cleared or history trimmed) resets to
/// the end without replaying old lines.
pub(crate) fn lines_since(text: &str, since: Option<PaneCursor>) -> Capture {
    let mut all: Vec<&str> = text.split('\n').collect();
    while all.last().is_some_and(|line| line.trim().is_empty()) {
        all.pop();
    }
    let total = all.len() as u64;
    let seen = since.map(|c| c.0).unwrap_or(0).min(total);
    let lines = all[seen as usize..].iter().map(|s| (*s).to_owned()).collect();
    Capture { lines, cursor: PaneCursor(total) }
}

/// Parse one `list-panes` format line: `%id index active pid`.
pub(crate) fn parse_pane_line(line: &str) -> Option<PaneInfo> {
    let mut parts = line.split_whitespace();
    let id = parts.next()?.to_owned();
    let index = parts.next()?.parse().ok()?;
    let active = parts.next()? == "1";
    let pid = parts.next().and_then(|p| p.parse().ok());
    Some(PaneInfo { id, index, active, pid })
}

/// Parse `spawn` output: `%id pid`.
pub(crate) fn parse_spawned(line: &str) -> Option<SpawnedPane> {
    let mut parts = line.split_whitespace();
    let id = parts.next()?.to_owned();
    let pid = parts.next().and_then(|p| p.parse().ok());
    Some(SpawnedPane { id, pid })
}

#[async_trait]
impl PaneDriver for TmuxPaneDriver {
    async fn list_groups(&self) -> Result<Vec<GroupInfo>, PaneError> {
        let out = match self.run(&["list-sessions", "-F", "#{session_name}"]).await {
            Ok(out) => out,
            // No server running means no groups, not an error.
            Err(PaneError::NotFound(_)) => return Ok(vec![]),
            Err(e) => return Err(e),
        };
        Ok(out
            .lines()
            .filter(|l| !l.is_empty())
            .map(|l| GroupInfo { name: l.to_owned() })
            .collect())
    }

    async fn list_panes(&self, group: &str) -> Result<Vec<PaneInfo>, PaneError> {
        let out = self
            .run(&[
                "list-panes",
                "-s",
                "-t",
                group,
                "-F",
                "#{pane_id} #{pane_index} #{pane_active} #{pane_pid}",
            ])
            .await?;
        Ok(out.lines().filter_map(parse_pane_line).collect())
    }

    async fn pane_exists(&self, pane_id: &str) -> Result<bool, PaneError> {
        match self.run(&["display-message", "-p", "-t", pane_id, "#{pane_id}"]).await {
            Ok(out) => Ok(!out.is_empty()),
            Err(PaneError::NotFound(_)) => Ok(false),
            Err(e) => Err(e),
        }
    }

    async fn spawn_pane(
        &self,
        group: &str,
        window: Option<&str>,
        cwd: &Path,
    ) -> Result<SpawnedPane, PaneError> {
        let cwd_str = cwd.display().to_string();
        let format = "#{pane_id} #{pane_pid}";

        let group_exists = self.run(&["has-session", "-t", group]).await.is_ok();
        let out = if group_exists {
            let mut args = vec!["new-window", "-d", "-t", group, "-c", &cwd_str];
            if let Some(name) = window {
                args.extend_from_slice(&["-n", name]);
            }
            args.extend_from_slice(&["-P", "-F", format]);
            self.run(&args).await?
        } else {
            let mut args = vec!["new-session", "-d", "-s", group, "-c", &cwd_str];
            if let Some(name) = window {
                args.extend_from_slice(&["-n", name]);
            }
            args.extend_from_slice(&["-P", "-F", format]);
            self.run(&args).await?
        };

        parse_spawned(&out)
            .ok_or_else(|| PaneError::Failed(format!("unexpected spawn output: {out}")))
    }

    async fn send_text(&self, pane_id: &str, text: &str) -> Result<(), PaneError> {
        // -l sends the text literally; `--` guards leading dashes.
        self.run(&["send-keys", "-t", pane_id, "-l", "--", text]).await?;
        Ok(())
    }

    async fn send_key(&self, pane_id: &str, key: &str) -> Result<(), PaneError> {
        self.run(&["send-keys", "-t", pane_id, key]).await?;
        Ok(())
    }

    async fn capture_pane(
        &self,
        pane_id: &str,
        since: Option<PaneCursor>,
    ) -> Result<Capture, PaneError> {
        let out = self.run(&["capture-pane", "-p", "-t", pane_id, "-S", "-"]).await?;
        Ok(lines_since(&out, since))
    }

    async fn kill_pane(&self, pane_id: &str) -> Result<(), PaneError> {
        self.run(&["kill-pane", "-t", pane_id]).await?;
        Ok(())
    }

    async fn focus_pane(&self, pane_id: &str) -> Result<(), PaneError> {
        self.run(&["select-window", "-t", pane_id]).await?;
        self.run(&["select-pane", "-t", pane_id]).await?;
        Ok(())
    }
}

#[cfg(test)]
#[path = "tmux_tests.rs"]
mod tests;
