// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use clap::Parser;

use super::Config;

fn base() -> Config {
    Config::parse_from(["foreman"])
}

#[test]
fn defaults_validate() {
    let config = base();
    assert!(config.validate().is_ok());
    assert_eq!(config.ring_capacity, 1000);
    assert_eq!(config.debounce_ms, 500);
    assert_eq!(config.clear_delay_ms, 2000);
    assert_eq!(config.context_low_threshold, 20);
    assert!(config.effective_review_on_idle());
    assert!(!config.effective_review_on_stop_hook());
}

#[test]
fn rejects_bad_context_pattern() {
    let mut config = base();
    config.context_pattern = "(unclosed".to_owned();
    assert!(config.validate().is_err());
}

#[test]
fn rejects_empty_database_url() {
    let mut config = base();
    config.database_url = "  ".to_owned();
    assert!(config.validate().is_err());
}

#[test]
fn rejects_out_of_range_threshold() {
    let mut config = base();
    config.context_low_threshold = 101;
    assert!(config.validate().is_err());
}

#[test]
fn review_toggles_parse_from_flags() {
    let config =
        Config::parse_from(["foreman", "--review-on-idle", "false", "--review-on-stop-hook", "true"]);
    assert!(!config.effective_review_on_idle());
    assert!(config.effective_review_on_stop_hook());
}
