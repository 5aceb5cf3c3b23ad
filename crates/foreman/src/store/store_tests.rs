// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::error::ApiError;
use crate::model::{
    NotificationKind, SessionKind, SessionStatus, TicketState, TransitionReason, Trigger,
};

fn store() -> Store {
    Store::open_in_memory().unwrap()
}

fn project(store: &Store, repo: &str) -> crate::model::Project {
    store
        .insert_project(NewProject {
            name: "demo".into(),
            repo_path: repo.into(),
            pane_group: "g".into(),
            pane_window: None,
            tickets_path: None,
            handoff_path: None,
        })
        .unwrap()
}

fn ticket(store: &Store, project_id: &str, file: &str) -> crate::model::Ticket {
    store
        .insert_ticket(NewTicket {
            project_id: project_id.into(),
            external_id: None,
            title: "Add X".into(),
            file_path: file.into(),
            prefix: "add".into(),
            is_adhoc: true,
            is_explore: false,
        })
        .unwrap()
}

#[test]
fn duplicate_repo_path_conflicts() {
    let store = store();
    project(&store, "/r");
    let err = store
        .insert_project(NewProject {
            name: "other".into(),
            repo_path: "/r".into(),
            pane_group: "g2".into(),
            pane_window: None,
            tickets_path: None,
            handoff_path: None,
        })
        .unwrap_err();
    assert!(matches!(err, ApiError::Conflict { .. }));
}

#[test]
fn cwd_correlation_picks_longest_prefix() {
    let store = store();
    project(&store, "/work");
    let nested = project(&store, "/work/app");

    let found = store.find_project_by_cwd("/work/app/src").unwrap().unwrap();
    assert_eq!(found.id, nested.id);

    // Exact match also correlates.
    let found = store.find_project_by_cwd("/work/app").unwrap().unwrap();
    assert_eq!(found.id, nested.id);

    // A sibling path that merely shares a string prefix does not.
    assert!(store.find_project_by_cwd("/work-other").unwrap().is_none());
}

#[test]
fn transition_appends_history_and_stamps_timestamps() {
    let store = store();
    let p = project(&store, "/r");
    let t = ticket(&store, &p.id, "tickets/add-x.md");

    let (t, entry) = store
        .transition_ticket(&TransitionWrite {
            ticket_id: t.id.clone(),
            target: TicketState::InProgress,
            trigger: Trigger::Auto,
            reason: TransitionReason::SessionStarted,
            feedback: None,
            triggered_by: None,
        })
        .unwrap();
    assert_eq!(t.state, TicketState::InProgress);
    assert!(t.started_at.is_some());
    assert_eq!(entry.from_state, TicketState::Backlog);
    assert_eq!(entry.to_state, TicketState::InProgress);

    let history = store.history_for_ticket(&t.id).unwrap();
    assert_eq!(history.len(), 1);
}

#[test]
fn invalid_transition_leaves_no_trace() {
    let store = store();
    let p = project(&store, "/r");
    let t = ticket(&store, &p.id, "tickets/add-x.md");

    let err = store
        .transition_ticket(&TransitionWrite {
            ticket_id: t.id.clone(),
            target: TicketState::Done,
            trigger: Trigger::Manual,
            reason: TransitionReason::UserApproved,
            feedback: None,
            triggered_by: None,
        })
        .unwrap_err();
    assert!(matches!(err, ApiError::InvalidTransition { .. }));

    let unchanged = store.get_ticket(&t.id).unwrap().unwrap();
    assert_eq!(unchanged.state, TicketState::Backlog);
    assert!(store.history_for_ticket(&t.id).unwrap().is_empty());
}

#[test]
fn history_forms_a_valid_walk() {
    let store = store();
    let p = project(&store, "/r");
    let t = ticket(&store, &p.id, "tickets/add-x.md");

    let steps = [
        (TicketState::InProgress, Trigger::Auto, TransitionReason::SessionStarted, None),
        (TicketState::Review, Trigger::Auto, TransitionReason::CompletionDetected, None),
        (
            TicketState::InProgress,
            Trigger::Manual,
            TransitionReason::UserRejected,
            Some("missing tests".to_owned()),
        ),
        (TicketState::Review, Trigger::Auto, TransitionReason::CompletionDetected, None),
        (TicketState::Done, Trigger::Manual, TransitionReason::UserApproved, None),
    ];
    for (target, trigger, reason, feedback) in steps {
        store
            .transition_ticket(&TransitionWrite {
                ticket_id: t.id.clone(),
                target,
                trigger,
                reason,
                feedback,
                triggered_by: None,
            })
            .unwrap();
    }

    let history = store.history_for_ticket(&t.id).unwrap();
    assert_eq!(history.len(), 5);
    for pair in history.windows(2) {
        assert_eq!(pair[0].to_state, pair[1].from_state);
    }
    let current = store.get_ticket(&t.id).unwrap().unwrap();
    assert_eq!(history.last().unwrap().to_state, current.state);
    assert!(current.completed_at.is_some());
}

#[test]
fn single_active_session_lookup() {
    let store = store();
    let p = project(&store, "/r");

    let s = store
        .insert_session(NewSession {
            project_id: p.id.clone(),
            ticket_id: None,
            kind: SessionKind::Adhoc,
            status: SessionStatus::Running,
            pane_id: "%1".into(),
            assistant_session_id: None,
            transcript_path: None,
        })
        .unwrap();

    let active = store.active_session_for_project(&p.id).unwrap().unwrap();
    assert_eq!(active.id, s.id);

    store.set_session_status(&s.id, SessionStatus::Completed).unwrap();
    assert!(store.active_session_for_project(&p.id).unwrap().is_none());
    let ended = store.get_session(&s.id).unwrap().unwrap();
    assert!(ended.ended_at.is_some());
}

#[test]
fn single_active_session_slot_is_enforced_by_the_store() {
    let store = store();
    let p = project(&store, "/r");

    let first = store
        .insert_session(NewSession {
            project_id: p.id.clone(),
            ticket_id: None,
            kind: SessionKind::Adhoc,
            status: SessionStatus::Running,
            pane_id: "%1".into(),
            assistant_session_id: None,
            transcript_path: None,
        })
        .unwrap();

    // Pending rows do not occupy the slot...
    let second = store
        .insert_session(NewSession {
            project_id: p.id.clone(),
            ticket_id: None,
            kind: SessionKind::Adhoc,
            status: SessionStatus::Pending,
            pane_id: String::new(),
            assistant_session_id: None,
            transcript_path: None,
        })
        .unwrap();

    // ...but promoting one while another is running does.
    let err = store.set_session_running(&second.id, "%2", None).unwrap_err();
    assert!(is_constraint_violation(&err));

    // Inserting a second running session directly is rejected too.
    let err = store
        .insert_session(NewSession {
            project_id: p.id.clone(),
            ticket_id: None,
            kind: SessionKind::Adhoc,
            status: SessionStatus::Running,
            pane_id: "%3".into(),
            assistant_session_id: None,
            transcript_path: None,
        })
        .unwrap_err();
    assert!(is_constraint_violation(&err));

    // Completing the holder frees the slot.
    store.set_session_status(&first.id, SessionStatus::Completed).unwrap();
    let promoted = store.set_session_running(&second.id, "%2", None).unwrap().unwrap();
    assert_eq!(promoted.status, SessionStatus::Running);
}

#[test]
fn assistant_session_linking_is_idempotent() {
    let store = store();
    let p = project(&store, "/r");
    let s = store
        .insert_session(NewSession {
            project_id: p.id.clone(),
            ticket_id: None,
            kind: SessionKind::Adhoc,
            status: SessionStatus::Running,
            pane_id: "%1".into(),
            assistant_session_id: None,
            transcript_path: None,
        })
        .unwrap();

    store.link_assistant_session(&s.id, "ext-1", Some("/tmp/t.jsonl")).unwrap();
    store.link_assistant_session(&s.id, "ext-1", None).unwrap();

    let linked = store.session_by_assistant_id("ext-1").unwrap().unwrap();
    assert_eq!(linked.id, s.id);
    assert_eq!(linked.transcript_path.as_deref(), Some("/tmp/t.jsonl"));
    assert!(store.latest_unlinked_session(&p.id).unwrap().is_none());
}

#[test]
fn notification_upsert_replaces_per_session_and_kind() {
    let store = store();
    let first = store
        .upsert_notification(NotificationKind::WaitingInput, "waiting", Some("s1"), None)
        .unwrap();
    let second = store
        .upsert_notification(NotificationKind::WaitingInput, "still waiting", Some("s1"), None)
        .unwrap();
    assert_ne!(first.id, second.id);

    let all = store.list_notifications().unwrap();
    assert_eq!(all.len(), 1);
    assert_eq!(all[0].message, "still waiting");

    // A different kind for the same session coexists.
    store.upsert_notification(NotificationKind::ContextLow, "low", Some("s1"), None).unwrap();
    assert_eq!(store.list_notifications().unwrap().len(), 2);

    assert!(store.clear_notification("s1", NotificationKind::WaitingInput).unwrap());
    assert_eq!(store.delete_all_notifications().unwrap(), 1);
}

#[test]
fn ticket_listing_filters_state_and_prefix() {
    let store = store();
    let p = project(&store, "/r");
    ticket(&store, &p.id, "tickets/add-x.md");
    let t2 = store
        .insert_ticket(NewTicket {
            project_id: p.id.clone(),
            external_id: None,
            title: "Fix Y".into(),
            file_path: "tickets/fix-y.md".into(),
            prefix: "fix".into(),
            is_adhoc: false,
            is_explore: false,
        })
        .unwrap();

    let (all, total) = store.list_tickets(&p.id, &TicketFilter::default(), 1, 50).unwrap();
    assert_eq!(total, 2);
    assert_eq!(all.len(), 2);

    let filter = TicketFilter { state: None, prefixes: Some(vec!["fix".into()]) };
    let (fixed, total) = store.list_tickets(&p.id, &filter, 1, 50).unwrap();
    assert_eq!(total, 1);
    assert_eq!(fixed[0].id, t2.id);

    let filter = TicketFilter { state: Some(TicketState::Done), prefixes: None };
    let (done, _) = store.list_tickets(&p.id, &filter, 1, 50).unwrap();
    assert!(done.is_empty());
}
