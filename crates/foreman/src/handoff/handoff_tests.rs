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
use crate::supervisor::{StartSessionRequest, Supervisor, SupervisorSettings};
use crate::test_support::FakePaneDriver;
use crate::waiting::{FusionSettings, WaitingDetector};

use super::*;

struct Fixture {
    store: Arc<Store>,
    driver: Arc<FakePaneDriver>,
    supervisor: Arc<Supervisor>,
    coordinator: Arc<HandoffCoordinator>,
    events: EventBus,
    shutdown: CancellationToken,
    _repo: tempfile::TempDir,
    repo_path: std::path::PathBuf,
}

fn fast_settings() -> HandoffSettings {
    HandoffSettings {
        threshold: 20,
        poll_interval: Duration::from_millis(20),
        timeout: Duration::from_secs(5),
        export_delay: Duration::from_millis(10),
        import_delay: Duration::from_millis(10),
        ..Default::default()
    }
}

fn fixture(settings: HandoffSettings) -> Fixture {
    let repo = tempfile::tempdir().unwrap();
    let repo_path = repo.path().to_path_buf();

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
    let coordinator = Arc::new(HandoffCoordinator::new(
        Arc::clone(&store),
        events.clone(),
        Arc::clone(&supervisor),
        settings,
    ));
    Fixture { store, driver, supervisor, coordinator, events, shutdown, _repo: repo, repo_path }
}

async fn ticket_session(fx: &Fixture) -> (crate::model::Ticket, crate::model::Session) {
    let project = fx
        .store
        .insert_project(NewProject {
            name: "demo".into(),
            repo_path: fx.repo_path.display().to_string(),
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
            external_id: Some("PROJ-7".into()),
            title: "Add X".into(),
            file_path: "tickets/add-x.md".into(),
            prefix: "add".into(),
            is_adhoc: false,
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
    (ticket, session)
}

async fn next_handoff(
    rx: &mut tokio::sync::broadcast::Receiver<HandoffEvent>,
) -> HandoffEvent {
    tokio::time::timeout(Duration::from_secs(10), rx.recv())
        .await
        .expect("timed out waiting for handoff event")
        .expect("handoff channel closed")
}

#[tokio::test]
async fn full_handoff_sequence_moves_ticket_to_new_session() {
    let fx = fixture(fast_settings());
    let (ticket, session) = ticket_session(&fx).await;
    let mut rx = fx.events.subscribe_handoff();

    // No handoff file exists yet, so the waiting_file step succeeds as
    // soon as the export appears on disk.
    let handoff_file = fx.repo_path.join("docs/ai-context/HANDOFF.md");
    fx.coordinator.begin(&session.id, 18).unwrap();

    assert!(matches!(next_handoff(&mut rx).await, HandoffEvent::Started { .. }));

    // The export command reached the old session; now "the assistant"
    // writes the handoff file.
    for _ in 0..100 {
        if fx.driver.sent(&session.pane_id).iter().any(|l| l == "/exportHandoff") {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    std::fs::create_dir_all(handoff_file.parent().unwrap()).unwrap();
    std::fs::write(&handoff_file, "# Handoff\ncontext dump\n").unwrap();

    let completed = next_handoff(&mut rx).await;
    let (from, to, context) = match completed {
        HandoffEvent::Completed { from_session_id, to_session_id, context_at_handoff, .. } => {
            (from_session_id, to_session_id, context_at_handoff)
        }
        other => panic!("expected completion, got {other:?}"),
    };
    assert_eq!(from, session.id);
    assert_ne!(to, session.id);
    assert_eq!(context, 18);

    // Old session completed; replacement owns the ticket.
    let old = fx.store.get_session(&session.id).unwrap().unwrap();
    assert_eq!(old.status, SessionStatus::Completed);
    let new = fx.store.get_session(&to).unwrap().unwrap();
    assert_eq!(new.status, SessionStatus::Running);
    assert_eq!(new.ticket_id.as_deref(), Some(ticket.id.as_str()));
    assert_eq!(
        fx.store.get_ticket(&ticket.id).unwrap().unwrap().state,
        TicketState::InProgress
    );

    // Import command and ticket continuation prompt reached the new pane.
    let sent = fx.driver.sent(&new.pane_id);
    assert!(sent.iter().any(|l| l == "/importHandoff"));
    assert!(sent.iter().any(|l| l.contains("Continue working on ticket PROJ-7")));

    assert!(!fx.coordinator.in_flight(&session.id));
    fx.shutdown.cancel();
}

#[tokio::test]
async fn export_timeout_preserves_the_old_session() {
    let mut settings = fast_settings();
    settings.timeout = Duration::from_millis(150);
    let fx = fixture(settings);
    let (_, session) = ticket_session(&fx).await;
    let mut rx = fx.events.subscribe_handoff();

    fx.coordinator.begin(&session.id, 15).unwrap();
    assert!(matches!(next_handoff(&mut rx).await, HandoffEvent::Started { .. }));

    let failed = next_handoff(&mut rx).await;
    match failed {
        HandoffEvent::Failed { step, session_preserved, .. } => {
            assert_eq!(step, "waiting_file");
            assert!(session_preserved);
        }
        other => panic!("expected failure, got {other:?}"),
    }

    let old = fx.store.get_session(&session.id).unwrap().unwrap();
    assert_eq!(old.status, SessionStatus::Running);
    assert!(!fx.coordinator.in_flight(&session.id));

    // The failure surfaced as a notification.
    assert!(!fx.store.list_notifications().unwrap().is_empty());
    fx.shutdown.cancel();
}

#[tokio::test]
async fn overlapping_handoffs_are_rejected() {
    let fx = fixture(fast_settings());
    let (_, session) = ticket_session(&fx).await;

    fx.coordinator.begin(&session.id, 10).unwrap();
    let err = fx.coordinator.begin(&session.id, 10).unwrap_err();
    assert!(matches!(err, ApiError::HandoffInProgress { .. }));
    fx.shutdown.cancel();
}

#[test]
fn continuation_prompt_variants() {
    assert_eq!(
        continuation_prompt(Some("PROJ-7")),
        "Continue working on ticket PROJ-7. Your context was just restored from a handoff."
    );
    assert_eq!(
        continuation_prompt(None),
        "Your context was just restored from a handoff. Continue where you left off."
    );
}
