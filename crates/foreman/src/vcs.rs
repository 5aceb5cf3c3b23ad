// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::path::Path;

use tokio::process::Command;
use tracing::debug;

/// Collect a working-tree diff for the repository, best effort.
///
/// Review assembly must never fail on VCS problems: any error (git missing,
/// not a repository, no commits yet) yields an empty string.
pub async fn collect_diff(repo_path: &Path) -> String {
    let output = Command::new("git")
        .arg("-C")
        .arg(repo_path)
        .args(["diff", "HEAD"])
        .output()
        .await;

    match output {
        Ok(out) if out.status.success() => String::from_utf8_lossy(&out.stdout).into_owned(),
        Ok(out) => {
            debug!(
                repo = %repo_path.display(),
                "git diff failed: {}",
                String::from_utf8_lossy(&out.stderr).trim()
            );
            String::new()
        }
        Err(e) => {
            debug!(repo = %repo_path.display(), "git unavailable: {e}");
            String::new()
        }
    }
}
