// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::event::{EventBus, SessionEvent};
use crate::model::{NotificationKind, WaitReason};
use crate::store::Store;

use super::*;

fn settings() -> FusionSettings {
    FusionSettings {
        debounce: Duration::from_millis(500),
        clear_delay: Duration::from_millis(2000),
        transcript_poll: Duration::from_secs(5),
    }
}

struct Fixture {
    handle: DetectorHandle,
    events: EventBus,
    store: Arc<Store>,
    shutdown: CancellationToken,
}

fn start_detector() -> Fixture {
    let store = Arc::new(Store::open_in_memory().unwrap());
    let events = EventBus::new(64);
    let shutdown = CancellationToken::new();
    let detector =
        WaitingDetector::new(Arc::clone(&store), events.clone(), settings(), shutdown.clone());
    let handle = detector.handle();
    tokio::spawn(detector.run());
    Fixture { handle, events, store, shutdown }
}

fn signal(session: &str, reason: WaitReason) -> WaitingSignal {
    WaitingSignal {
        session_id: session.to_owned(),
        waiting: true,
        reason,
        layer: SignalLayer::Hook,
        context: None,
    }
}

async fn next_waiting(
    rx: &mut tokio::sync::broadcast::Receiver<SessionEvent>,
) -> (String, bool, Option<WaitReason>) {
    loop {
        match tokio::time::timeout(Duration::from_secs(30), rx.recv()).await {
            Ok(Ok(SessionEvent::Waiting { session_id, waiting, reason })) => {
                return (session_id, waiting, reason)
            }
            Ok(Ok(_)) => continue,
            other => panic!("no waiting event: {other:?}"),
        }
    }
}

#[tokio::test(start_paused = true)]
async fn highest_severity_wins_within_debounce_window() {
    let fx = start_detector();
    let mut rx = fx.events.subscribe_session();

    fx.handle.signal(signal("s1", WaitReason::Question)).await;
    fx.handle.signal(signal("s1", WaitReason::PermissionPrompt)).await;
    fx.handle.signal(signal("s1", WaitReason::IdlePrompt)).await;

    let (session, waiting, reason) = next_waiting(&mut rx).await;
    assert_eq!(session, "s1");
    assert!(waiting);
    assert_eq!(reason, Some(WaitReason::PermissionPrompt));
    assert!(fx.handle.is_waiting("s1"));

    // Exactly one transition, no duplicates from the merged signals.
    tokio::time::sleep(Duration::from_secs(2)).await;
    assert!(matches!(
        rx.try_recv(),
        Err(tokio::sync::broadcast::error::TryRecvError::Empty)
    ));
    fx.shutdown.cancel();
}

#[tokio::test(start_paused = true)]
async fn waiting_upserts_notification_and_activity_clears_it() {
    let fx = start_detector();
    let mut rx = fx.events.subscribe_session();

    fx.handle.watch_session("s1").await;
    fx.handle.signal(signal("s1", WaitReason::PermissionPrompt)).await;
    let (_, waiting, _) = next_waiting(&mut rx).await;
    assert!(waiting);

    let notifications = fx.store.list_notifications().unwrap();
    assert_eq!(notifications.len(), 1);
    assert_eq!(notifications[0].kind, NotificationKind::WaitingInput);
    assert_eq!(notifications[0].session_id.as_deref(), Some("s1"));

    // Activity clears the waiting state after the clear delay.
    fx.handle.note_activity("s1").await;
    let (session, waiting, reason) = next_waiting(&mut rx).await;
    assert_eq!(session, "s1");
    assert!(!waiting);
    assert_eq!(reason, None);
    assert!(!fx.handle.is_waiting("s1"));
    assert!(fx.store.list_notifications().unwrap().is_empty());
    fx.shutdown.cancel();
}

#[tokio::test(start_paused = true)]
async fn new_signal_supersedes_pending_clear() {
    let fx = start_detector();
    let mut rx = fx.events.subscribe_session();

    fx.handle.signal(signal("s1", WaitReason::Stopped)).await;
    let (_, waiting, _) = next_waiting(&mut rx).await;
    assert!(waiting);

    // Activity schedules a clear, but a fresh signal before the delay
    // elapses keeps the session waiting.
    fx.handle.note_activity("s1").await;
    fx.handle.signal(signal("s1", WaitReason::PermissionPrompt)).await;

    tokio::time::sleep(Duration::from_secs(5)).await;
    assert!(fx.handle.is_waiting("s1"));
    fx.shutdown.cancel();
}

#[tokio::test(start_paused = true)]
async fn unwatch_drops_state() {
    let fx = start_detector();
    let mut rx = fx.events.subscribe_session();

    fx.handle.signal(signal("s1", WaitReason::Question)).await;
    let (_, waiting, _) = next_waiting(&mut rx).await;
    assert!(waiting);

    fx.handle.unwatch_session("s1").await;
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(!fx.handle.is_waiting("s1"));
    fx.shutdown.cancel();
}
