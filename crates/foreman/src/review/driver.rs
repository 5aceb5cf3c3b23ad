// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::time::Duration;

use async_trait::async_trait;
use tokio::process::Command;

/// Capability for invoking the external reviewer assistant CLI.
#[async_trait]
pub trait ReviewerDriver: Send + Sync {
    /// Run the reviewer with the given prompt, returning its raw text
    /// output.
    async fn run(
        &self,
        prompt: &str,
        model: Option<&str>,
        timeout: Duration,
    ) -> anyhow::Result<String>;
}

/// Production driver: spawns the assistant CLI in non-interactive mode with
/// the prompt as an argument.
pub struct CliReviewerDriver {
    bin: String,
}

impl CliReviewerDriver {
    pub fn new(bin: impl Into<String>) -> Self {
        Self { bin: bin.into() }
    }
}

#[async_trait]
impl ReviewerDriver for CliReviewerDriver {
    async fn run(
        &self,
        prompt: &str,
        model: Option<&str>,
        timeout: Duration,
    ) -> anyhow::Result<String> {
        let mut command = Command::new(&self.bin);
        command.arg("-p").arg(prompt);
        if let Some(model) = model {
            command.arg("--model").arg(model);
        }
        // Kill the child if we stop waiting for it.
        command.kill_on_drop(true);

        let output = tokio::time::timeout(timeout, command.output())
            .await
            .map_err(|_| anyhow::anyhow!("reviewer CLI exceeded {}ms", timeout.as_millis()))?
            .map_err(|e| anyhow::anyhow!("failed to invoke reviewer CLI {}: {e}", self.bin))?;

        if !output.status.success() {
            anyhow::bail!(
                "reviewer CLI exited with {}: {}",
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            );
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}
