// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Shared harness for integration tests: the full service graph wired to
//! fake pane and reviewer drivers over a tempdir repository.

use std::sync::Arc;
use std::time::Duration;

use foreman::config::Config;
use foreman::model::Project;
use foreman::pane::PaneDriver;
use foreman::review::ReviewerDriver;
use foreman::run::{build_runtime, Runtime};
use foreman::store::{NewProject, Store};
use foreman::test_support::{test_config, FakePaneDriver, FakeReviewerDriver};
use foreman::transport::AppState;

pub struct TestApp {
    pub state: Arc<AppState>,
    pub store: Arc<Store>,
    pub pane: Arc<FakePaneDriver>,
    pub reviewer: Arc<FakeReviewerDriver>,
    pub repo: tempfile::TempDir,
    _runtime: Runtime,
}

impl TestApp {
    pub fn repo_path(&self) -> String {
        self.repo.path().display().to_string()
    }

    /// Insert a project rooted at the harness tempdir.
    pub fn project(&self) -> Project {
        self.store
            .insert_project(NewProject {
                name: "demo".into(),
                repo_path: self.repo_path(),
                pane_group: "g".into(),
                pane_window: None,
                tickets_path: None,
                handoff_path: None,
            })
            .unwrap()
    }
}

pub async fn spawn_app() -> TestApp {
    spawn_app_with(test_config()).await
}

pub async fn spawn_app_with(config: Config) -> TestApp {
    let repo = tempfile::tempdir().unwrap();
    let store = Arc::new(Store::open_in_memory().unwrap());
    let pane = Arc::new(FakePaneDriver::new());
    let reviewer = Arc::new(FakeReviewerDriver::new());

    let runtime = build_runtime(
        &config,
        Arc::clone(&store),
        Arc::clone(&pane) as Arc<dyn PaneDriver>,
        Arc::clone(&reviewer) as Arc<dyn ReviewerDriver>,
    )
    .unwrap();

    TestApp { state: Arc::clone(&runtime.state), store, pane, reviewer, repo, _runtime: runtime }
}

/// Poll until `cond` holds, panicking after ~5 seconds.
pub async fn wait_for<F: Fn() -> bool>(what: &str, cond: F) {
    for _ in 0..500 {
        if cond() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("timed out waiting for: {what}");
}
