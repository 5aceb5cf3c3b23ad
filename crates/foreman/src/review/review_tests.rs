// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::sync::Arc;
use std::time::Duration;

use regex::Regex;
use tokio_util::sync::CancellationToken;

use crate::error::ApiError;
use crate::event::EventBus;
use crate::model::{NotificationKind, TicketState, TransitionReason, Trigger};
use crate::pane::PaneDriver;
use crate::store::{NewProject, NewTicket, Store, TransitionWrite};
use crate::supervisor::{StartSessionRequest, Supervisor, SupervisorSettings};
use crate::test_support::{FakePaneDriver, FakeReviewerDriver};
use crate::tickets::TicketService;
use crate::waiting::{FusionSettings, WaitingDetector};

use super::*;

#[test]
fn parses_complete_verdicts() {
    let (decision, reasoning) = parse_decision("COMPLETE\nAll criteria met.").unwrap();
    assert_eq!(decision, ReviewDecision::Complete);
    assert_eq!(reasoning, "All criteria met.");

    let (decision, reasoning) = parse_decision("  complete").unwrap();
    assert_eq!(decision, ReviewDecision::Complete);
    assert_eq!(reasoning, "No reasoning provided");
}

#[test]
fn parses_not_complete_verdicts() {
    let (decision, _) = parse_decision("NOT_COMPLETE\nTests are failing.").unwrap();
    assert_eq!(decision, ReviewDecision::NotComplete);

    let (decision, _) = parse_decision("The work is NOT COMPLETE yet\nmore detail").unwrap();
    assert_eq!(decision, ReviewDecision::NotComplete);
}

#[test]
fn parses_needs_clarification() {
    let (decision, _) = parse_decision("NEEDS_CLARIFICATION\nWhich database?").unwrap();
    assert_eq!(decision, ReviewDecision::NeedsClarification);

    let (decision, _) = parse_decision("Verdict: NEEDS CLARIFICATION").unwrap();
    assert_eq!(decision, ReviewDecision::NeedsClarification);
}

#[test]
fn ambiguous_first_line_falls_back_to_first_three() {
    let raw = "Review summary\nAfter checking everything: NOT COMPLETE\nMissing error handling";
    let (decision, _) = parse_decision(raw).unwrap();
    assert_eq!(decision, ReviewDecision::NotComplete);
}

#[test]
fn unparseable_output_is_preserved_as_error() {
    assert!(parse_decision("").is_none());
    assert!(parse_decision("The assistant did some work today.").is_none());
}

#[test]
fn not_complete_never_reads_as_complete() {
    // The COMPLETE prefix check must not swallow NOT_COMPLETE.
    let (decision, _) = parse_decision("NOT_COMPLETE").unwrap();
    assert_eq!(decision, ReviewDecision::NotComplete);
}

#[test]
fn prompt_carries_all_sections_with_fallbacks() {
    let prompt = build_prompt("# Add X\nDo the thing.", "", None, "$ cargo test\nok");
    assert!(prompt.contains("## Ticket Requirements"));
    assert!(prompt.contains("# Add X"));
    assert!(prompt.contains("No changes detected or git not available"));
    assert!(prompt.contains("No test output available"));
    assert!(prompt.contains("$ cargo test"));
    assert!(prompt.contains("is this ticket complete?"));

    let prompt = build_prompt("", "diff --git a b", Some("2 passed"), "");
    assert!(prompt.contains("diff --git a b"));
    assert!(prompt.contains("2 passed"));
    assert!(prompt.contains("No session output available"));
}

// -- End-to-end reviewer with fakes -------------------------------------------

struct Fixture {
    store: Arc<Store>,
    reviewer: Arc<Reviewer>,
    reviewer_cli: Arc<FakeReviewerDriver>,
    events: EventBus,
    shutdown: CancellationToken,
    supervisor: Arc<Supervisor>,
}

fn fixture_with(reviewer_cli: FakeReviewerDriver, timeout: Duration) -> Fixture {
    let store = Arc::new(Store::open_in_memory().unwrap());
    let events = EventBus::new(256);
    let shutdown = CancellationToken::new();

    let detector = WaitingDetector::new(
        Arc::clone(&store),
        events.clone(),
        FusionSettings::default(),
        shutdown.child_token(),
    );
    let detector_handle = detector.handle();
    tokio::spawn(detector.run());

    let pane_driver = Arc::new(FakePaneDriver::new());
    let supervisor = Arc::new(Supervisor::new(
        Arc::clone(&store),
        Arc::clone(&pane_driver) as Arc<dyn PaneDriver>,
        events.clone(),
        detector_handle,
        SupervisorSettings {
            poll_interval: Duration::from_millis(20),
            ring_capacity: 100,
            context_pattern: Regex::new(r"Context: (\d+)% remaining").unwrap(),
            context_low_threshold: 20,
        },
        shutdown.child_token(),
    ));
    let tickets =
        Arc::new(TicketService::new(Arc::clone(&store), events.clone(), Arc::clone(&supervisor)));
    let reviewer_cli = Arc::new(reviewer_cli);
    let reviewer = Arc::new(Reviewer::new(
        Arc::clone(&store),
        events.clone(),
        Arc::clone(&supervisor),
        tickets,
        Arc::clone(&reviewer_cli) as Arc<dyn ReviewerDriver>,
        ReviewerSettings { timeout, output_tail: 100, model: None },
    ));
    Fixture { store, reviewer, reviewer_cli, events, shutdown, supervisor }
}

async fn in_progress_ticket(fx: &Fixture) -> (crate::model::Ticket, crate::model::Session) {
    let project = fx
        .store
        .insert_project(NewProject {
            name: "demo".into(),
            repo_path: "/nonexistent-repo-for-tests".into(),
            pane_group: "g".into(),
            pane_window: None,
            tickets_path: None,
            handoff_path: None,
        })
        .unwrap();
    let ticket = fx
        .store
        .insert_ticket(NewTicket {
            project_id: project.id.clone(),
            external_id: None,
            title: "Add X".into(),
            file_path: "tickets/add-x.md".into(),
            prefix: "add".into(),
            is_adhoc: true,
            is_explore: false,
        })
        .unwrap();
    fx.store
        .transition_ticket(&TransitionWrite {
            ticket_id: ticket.id.clone(),
            target: TicketState::InProgress,
            trigger: Trigger::Auto,
            reason: TransitionReason::SessionStarted,
            feedback: None,
            triggered_by: None,
        })
        .unwrap();
    let session = fx
        .supervisor
        .start_session(StartSessionRequest {
            project_id: project.id,
            ticket_id: Some(ticket.id.clone()),
            ..Default::default()
        })
        .await
        .unwrap();
    (fx.store.get_ticket(&ticket.id).unwrap().unwrap(), session)
}

#[tokio::test]
async fn complete_verdict_promotes_ticket_to_review() {
    let fx = fixture_with(FakeReviewerDriver::new(), Duration::from_secs(5));
    let (ticket, session) = in_progress_ticket(&fx).await;

    let result = fx
        .reviewer
        .review(&session, &ticket.id, ReviewTrigger::CompletionSignal)
        .await
        .unwrap();
    assert_eq!(result.decision, ReviewDecision::Complete);
    assert_eq!(result.trigger, ReviewTrigger::CompletionSignal);
    assert_eq!(result.reasoning, "All criteria met.");

    let after = fx.store.get_ticket(&ticket.id).unwrap().unwrap();
    assert_eq!(after.state, TicketState::Review);

    let notification = fx
        .store
        .notification_for_ticket(&ticket.id, NotificationKind::ReviewReady)
        .unwrap()
        .unwrap();
    assert!(notification.message.contains("Add X"));

    assert_eq!(fx.store.latest_review_for_ticket(&ticket.id).unwrap().unwrap().id, result.id);
    fx.shutdown.cancel();
}

#[tokio::test]
async fn not_complete_records_but_never_transitions() {
    let driver = FakeReviewerDriver::new();
    driver.push_response("NOT_COMPLETE\nTests are failing.");
    let fx = fixture_with(driver, Duration::from_secs(5));
    let (ticket, session) = in_progress_ticket(&fx).await;

    let result =
        fx.reviewer.review(&session, &ticket.id, ReviewTrigger::IdleTimeout).await.unwrap();
    assert_eq!(result.decision, ReviewDecision::NotComplete);
    assert_eq!(
        fx.store.get_ticket(&ticket.id).unwrap().unwrap().state,
        TicketState::InProgress
    );
    assert!(fx
        .store
        .notification_for_ticket(&ticket.id, NotificationKind::ReviewReady)
        .unwrap()
        .is_none());
    fx.shutdown.cancel();
}

#[tokio::test(start_paused = true)]
async fn review_timeout_emits_failed_and_keeps_state() {
    let driver = FakeReviewerDriver::new();
    driver.set_delay(Duration::from_secs(60));
    let fx = fixture_with(driver, Duration::from_millis(200));
    let (ticket, session) = in_progress_ticket(&fx).await;

    let mut review_rx = fx.events.subscribe_review();
    let err = fx
        .reviewer
        .review(&session, &ticket.id, ReviewTrigger::Manual)
        .await
        .unwrap_err();
    assert!(matches!(err, ApiError::Timeout { .. }));
    assert_eq!(
        fx.store.get_ticket(&ticket.id).unwrap().unwrap().state,
        TicketState::InProgress
    );
    assert!(matches!(review_rx.try_recv(), Ok(ReviewEvent::Failed { .. })));
    fx.shutdown.cancel();
}

#[tokio::test]
async fn unparseable_output_errors_and_keeps_state() {
    let driver = FakeReviewerDriver::new();
    driver.push_response("I looked around and found things interesting.");
    let fx = fixture_with(driver, Duration::from_secs(5));
    let (ticket, session) = in_progress_ticket(&fx).await;

    let err =
        fx.reviewer.review(&session, &ticket.id, ReviewTrigger::Manual).await.unwrap_err();
    assert!(matches!(err, ApiError::ExternalFailure { .. }));
    assert!(err.message().contains("found things interesting"));
    assert_eq!(
        fx.store.get_ticket(&ticket.id).unwrap().unwrap().state,
        TicketState::InProgress
    );
    fx.shutdown.cancel();
}

#[tokio::test]
async fn review_prompt_carries_assembled_sections() {
    let fx = fixture_with(FakeReviewerDriver::new(), Duration::from_secs(5));
    let (ticket, session) = in_progress_ticket(&fx).await;

    fx.reviewer.review(&session, &ticket.id, ReviewTrigger::Manual).await.unwrap();
    let prompts = fx.reviewer_cli.prompts();
    assert_eq!(prompts.len(), 1);
    assert!(prompts[0].starts_with("You are reviewing whether a ticket has been completed."));
    assert!(prompts[0].contains("## Ticket Requirements"));
    assert!(prompts[0].contains("## Changes Made (git diff)"));
    assert!(prompts[0].contains("## Recent Session Output"));
    fx.shutdown.cancel();
}

#[tokio::test]
async fn only_in_progress_tickets_are_reviewable() {
    let fx = fixture_with(FakeReviewerDriver::new(), Duration::from_secs(5));
    let (ticket, session) = in_progress_ticket(&fx).await;

    // Drive the ticket into review, then try to review again.
    fx.reviewer.review(&session, &ticket.id, ReviewTrigger::Manual).await.unwrap();
    let err =
        fx.reviewer.review(&session, &ticket.id, ReviewTrigger::Manual).await.unwrap_err();
    assert!(matches!(err, ApiError::Conflict { .. }));
    fx.shutdown.cancel();
}
