// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::sync::Arc;
use std::time::Duration;

use regex::Regex;
use tokio_util::sync::CancellationToken;

use crate::error::ApiError;
use crate::event::EventBus;
use crate::model::{SessionStatus, TicketState, TransitionReason, Trigger};
use crate::pane::PaneDriver;
use crate::store::{NewProject, NewTicket, Store, TransitionWrite};
use crate::supervisor::{Supervisor, SupervisorSettings};
use crate::test_support::FakePaneDriver;
use crate::waiting::{FusionSettings, WaitingDetector};

use super::*;

struct Fixture {
    store: Arc<Store>,
    driver: Arc<FakePaneDriver>,
    service: TicketService,
    events: EventBus,
    shutdown: CancellationToken,
}

fn fixture() -> Fixture {
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

    let driver = Arc::new(FakePaneDriver::new());
    let supervisor = Arc::new(Supervisor::new(
        Arc::clone(&store),
        Arc::clone(&driver) as Arc<dyn PaneDriver>,
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
    let service = TicketService::new(Arc::clone(&store), events.clone(), supervisor);
    Fixture { store, driver, service, events, shutdown }
}

fn project(store: &Store) -> crate::model::Project {
    store
        .insert_project(NewProject {
            name: "demo".into(),
            repo_path: "/r".into(),
            pane_group: "g".into(),
            pane_window: None,
            tickets_path: None,
            handoff_path: None,
        })
        .unwrap()
}

fn ticket(store: &Store, project_id: &str) -> crate::model::Ticket {
    store
        .insert_ticket(NewTicket {
            project_id: project_id.into(),
            external_id: None,
            title: "Add X".into(),
            file_path: "tickets/add-x.md".into(),
            prefix: "add".into(),
            is_adhoc: true,
            is_explore: false,
        })
        .unwrap()
}

fn force_state(store: &Store, ticket_id: &str, walk: &[TicketState]) {
    for target in walk {
        let reason = match target {
            TicketState::InProgress => TransitionReason::SessionStarted,
            TicketState::Review => TransitionReason::CompletionDetected,
            TicketState::Done => TransitionReason::UserApproved,
            TicketState::Backlog => TransitionReason::SessionStarted,
        };
        store
            .transition_ticket(&TransitionWrite {
                ticket_id: ticket_id.into(),
                target: *target,
                trigger: Trigger::Auto,
                reason,
                feedback: None,
                triggered_by: None,
            })
            .unwrap();
    }
}

#[test]
fn rejection_format_is_exact() {
    assert_eq!(
        format_rejection("Missing tests"),
        "[REVIEW FEEDBACK] The reviewer rejected your work with this feedback:\n\"Missing tests\"\nPlease address this and continue working on the ticket."
    );
}

#[tokio::test]
async fn start_ticket_transitions_and_starts_session() {
    let fx = fixture();
    let p = project(&fx.store);
    let t = ticket(&fx.store, &p.id);

    let (ticket, session) = fx.service.start_ticket(&t.id).await.unwrap();
    assert_eq!(ticket.state, TicketState::InProgress);
    assert!(ticket.started_at.is_some());
    assert_eq!(session.status, SessionStatus::Running);
    assert_eq!(session.ticket_id.as_deref(), Some(t.id.as_str()));

    let history = fx.store.history_for_ticket(&t.id).unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].trigger, Trigger::Auto);
    assert_eq!(history[0].reason, TransitionReason::SessionStarted);

    // The session got pointed at the ticket file.
    let sent = fx.driver.sent(&session.pane_id);
    assert_eq!(sent.len(), 1);
    assert!(sent[0].contains("tickets/add-x.md"));
    fx.shutdown.cancel();
}

#[tokio::test]
async fn reject_requires_feedback() {
    let fx = fixture();
    let p = project(&fx.store);
    let t = ticket(&fx.store, &p.id);
    force_state(&fx.store, &t.id, &[TicketState::InProgress, TicketState::Review]);

    let err = fx.service.reject(&t.id, "   ", None).await.unwrap_err();
    assert!(matches!(err, ApiError::MissingFeedback));
    assert_eq!(fx.store.get_ticket(&t.id).unwrap().unwrap().state, TicketState::Review);
    fx.shutdown.cancel();
}

#[tokio::test]
async fn reject_injects_formatted_feedback_exactly_once() {
    let fx = fixture();
    let p = project(&fx.store);
    let t = ticket(&fx.store, &p.id);

    // Bring the ticket in progress with a live session, then into review.
    let (_, session) = fx.service.start_ticket(&t.id).await.unwrap();
    force_state(&fx.store, &t.id, &[TicketState::Review]);

    let rejected = fx.service.reject(&t.id, "Missing tests", None).await.unwrap();
    assert_eq!(rejected.state, TicketState::InProgress);

    let sent = fx.driver.sent(&session.pane_id);
    let feedback_lines: Vec<&String> =
        sent.iter().filter(|l| l.starts_with("[REVIEW FEEDBACK]")).collect();
    assert_eq!(feedback_lines.len(), 1);
    assert_eq!(feedback_lines[0], &format_rejection("Missing tests"));

    // Delivered feedback does not linger on the ticket.
    assert!(fx.store.get_ticket(&t.id).unwrap().unwrap().rejection_feedback.is_none());
    fx.shutdown.cancel();
}

#[tokio::test]
async fn undelivered_feedback_rides_the_next_session_prompt() {
    let fx = fixture();
    let p = project(&fx.store);
    let t = ticket(&fx.store, &p.id);
    force_state(&fx.store, &t.id, &[TicketState::InProgress, TicketState::Review]);

    // No session is running: the rejection is stored, not injected.
    fx.service.reject(&t.id, "Handle empty input", None).await.unwrap();
    let stored = fx.store.get_ticket(&t.id).unwrap().unwrap();
    assert_eq!(stored.rejection_feedback.as_deref(), Some("Handle empty input"));

    // A later restart of the ticket carries the feedback along. The ticket
    // is already in_progress, so drive a session directly through the
    // supervisor path used by start_ticket's prompt composition.
    let prompt = super::initial_prompt(&stored);
    assert!(prompt.contains("tickets/add-x.md"));
    assert!(prompt.contains("Handle empty input"));
    fx.shutdown.cancel();
}

#[tokio::test]
async fn approve_stamps_completed_at_and_emits_event() {
    let fx = fixture();
    let p = project(&fx.store);
    let t = ticket(&fx.store, &p.id);
    force_state(&fx.store, &t.id, &[TicketState::InProgress, TicketState::Review]);

    let mut rx = fx.events.subscribe_ticket();
    let ticket = fx.service.approve(&t.id, Some("alex".into())).await.unwrap();
    assert_eq!(ticket.state, TicketState::Done);
    assert!(ticket.completed_at.is_some());

    let event = rx.try_recv().unwrap();
    assert_eq!(event.ticket_id, t.id);
    assert_eq!(event.from, TicketState::Review);
    assert_eq!(event.to, TicketState::Done);
    assert_eq!(event.trigger, Trigger::Manual);
    fx.shutdown.cancel();
}

#[tokio::test]
async fn illegal_transitions_are_rejected_without_history() {
    let fx = fixture();
    let p = project(&fx.store);
    let t = ticket(&fx.store, &p.id);

    let err = fx.service.approve(&t.id, None).await.unwrap_err();
    assert!(matches!(err, ApiError::InvalidTransition { .. }));
    assert_eq!(fx.store.get_ticket(&t.id).unwrap().unwrap().state, TicketState::Backlog);
    assert!(fx.store.history_for_ticket(&t.id).unwrap().is_empty());
    fx.shutdown.cancel();
}
