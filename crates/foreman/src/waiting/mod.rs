// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Waiting detection: three signal layers (hook push, transcript tail,
//! output pattern scan) fused into one authoritative waiting / not-waiting
//! state per session.
//!
//! Signals converge on a single fusion task through an mpsc channel; the
//! fusion task is the sole writer of the per-session state table. Within a
//! debounce window the highest-severity reason wins. Activity (changed
//! output or explicit input) clears a waiting state after a short delay.

pub mod hook;
pub mod patterns;
pub mod transcript;

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::event::{EventBus, SessionEvent};
use crate::model::{now_epoch_ms, NotificationKind, WaitReason};
use crate::store::Store;

/// Which detection layer produced a signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignalLayer {
    Hook,
    Transcript,
    Output,
}

/// One raw observation from a detection layer.
#[derive(Debug, Clone)]
pub struct WaitingSignal {
    pub session_id: String,
    pub waiting: bool,
    pub reason: WaitReason,
    pub layer: SignalLayer,
    pub context: Option<String>,
}

/// Inputs consumed by the fusion task.
#[derive(Debug)]
pub enum DetectorInput {
    Signal(WaitingSignal),
    Activity { session_id: String },
    Watch { session_id: String },
    Unwatch { session_id: String },
    WatchTranscript { session_id: String, path: PathBuf },
}

/// Per-session fused waiting state. Owned by the fusion task.
#[derive(Debug, Clone, Default)]
pub struct WaitingSessionState {
    pub is_waiting: bool,
    pub last_reason: Option<WaitReason>,
    pub last_signal_ms: i64,
    pub last_output_ms: i64,
    pub threshold_notified: bool,
}

/// Fusion timing knobs.
#[derive(Debug, Clone)]
pub struct FusionSettings {
    pub debounce: Duration,
    pub clear_delay: Duration,
    pub transcript_poll: Duration,
}

impl Default for FusionSettings {
    fn default() -> Self {
        Self {
            debounce: Duration::from_millis(500),
            clear_delay: Duration::from_millis(2000),
            transcript_poll: Duration::from_secs(5),
        }
    }
}

/// Cheap handle for feeding the detector and reading fused state.
#[derive(Clone)]
pub struct DetectorHandle {
    tx: mpsc::Sender<DetectorInput>,
    states: Arc<RwLock<HashMap<String, WaitingSessionState>>>,
}

impl DetectorHandle {
    pub async fn signal(&self, signal: WaitingSignal) {
        let _ = self.tx.send(DetectorInput::Signal(signal)).await;
    }

    /// Record output-changing or input activity for a session.
    pub async fn note_activity(&self, session_id: &str) {
        let _ = self.tx.send(DetectorInput::Activity { session_id: session_id.to_owned() }).await;
    }

    pub async fn watch_session(&self, session_id: &str) {
        let _ = self.tx.send(DetectorInput::Watch { session_id: session_id.to_owned() }).await;
    }

    pub async fn unwatch_session(&self, session_id: &str) {
        let _ = self.tx.send(DetectorInput::Unwatch { session_id: session_id.to_owned() }).await;
    }

    /// Start tailing a transcript file for a watched session.
    pub async fn watch_transcript(&self, session_id: &str, path: PathBuf) {
        let _ = self
            .tx
            .send(DetectorInput::WatchTranscript { session_id: session_id.to_owned(), path })
            .await;
    }

    /// Fused waiting state for a session.
    pub fn is_waiting(&self, session_id: &str) -> bool {
        self.states.read().get(session_id).map(|s| s.is_waiting).unwrap_or(false)
    }
}

/// The fusion task. Construct with [`WaitingDetector::new`], obtain handles,
/// then drive with [`WaitingDetector::run`].
pub struct WaitingDetector {
    store: Arc<Store>,
    events: EventBus,
    settings: FusionSettings,
    rx: Option<mpsc::Receiver<DetectorInput>>,
    tx: mpsc::Sender<DetectorInput>,
    states: Arc<RwLock<HashMap<String, WaitingSessionState>>>,
    tails: HashMap<String, CancellationToken>,
    shutdown: CancellationToken,
}

/// A debounce window accumulating signals for one session.
struct PendingWindow {
    deadline: Instant,
    best: WaitingSignal,
}

impl WaitingDetector {
    pub fn new(
        store: Arc<Store>,
        events: EventBus,
        settings: FusionSettings,
        shutdown: CancellationToken,
    ) -> Self {
        let (tx, rx) = mpsc::channel(256);
        Self {
            store,
            events,
            settings,
            rx: Some(rx),
            tx,
            states: Arc::new(RwLock::new(HashMap::new())),
            tails: HashMap::new(),
            shutdown,
        }
    }

    pub fn handle(&self) -> DetectorHandle {
        DetectorHandle { tx: self.tx.clone(), states: Arc::clone(&self.states) }
    }

    /// Run the fusion loop until shutdown.
    pub async fn run(mut self) {
        let Some(mut rx) = self.rx.take() else {
            return;
        };
        let shutdown = self.shutdown.clone();
        let mut pending: HashMap<String, PendingWindow> = HashMap::new();
        let mut clears: HashMap<String, Instant> = HashMap::new();

        loop {
            let next_deadline = pending
                .values()
                .map(|w| w.deadline)
                .chain(clears.values().copied())
                .min();

            tokio::select! {
                _ = shutdown.cancelled() => break,
                input = rx.recv() => {
                    match input {
                        Some(input) => self.handle_input(input, &mut pending, &mut clears),
                        None => break,
                    }
                }
                _ = deadline_sleep(next_deadline) => {
                    self.fire_due(&mut pending, &mut clears).await;
                }
            }
        }

        for (_, token) in self.tails.drain() {
            token.cancel();
        }
    }

    fn handle_input(
        &mut self,
        input: DetectorInput,
        pending: &mut HashMap<String, PendingWindow>,
        clears: &mut HashMap<String, Instant>,
    ) {
        match input {
            DetectorInput::Signal(signal) if signal.waiting => {
                debug!(
                    session = %signal.session_id,
                    reason = %signal.reason,
                    layer = ?signal.layer,
                    "waiting signal"
                );
                {
                    let mut states = self.states.write();
                    states.entry(signal.session_id.clone()).or_default().last_signal_ms =
                        now_epoch_ms();
                }
                // A fresh waiting signal supersedes a pending clear.
                clears.remove(&signal.session_id);
                match pending.get_mut(&signal.session_id) {
                    Some(window) => {
                        if signal.reason.severity() > window.best.reason.severity() {
                            window.best = signal;
                        }
                    }
                    None => {
                        let deadline = Instant::now() + self.settings.debounce;
                        pending
                            .insert(signal.session_id.clone(), PendingWindow { deadline, best: signal });
                    }
                }
            }
            DetectorInput::Signal(signal) => {
                // A not-waiting observation is treated as activity.
                self.note_activity_inner(&signal.session_id, clears);
            }
            DetectorInput::Activity { session_id } => {
                self.note_activity_inner(&session_id, clears);
            }
            DetectorInput::Watch { session_id } => {
                self.states.write().entry(session_id).or_default();
            }
            DetectorInput::Unwatch { session_id } => {
                self.states.write().remove(&session_id);
                pending.remove(&session_id);
                clears.remove(&session_id);
                if let Some(token) = self.tails.remove(&session_id) {
                    token.cancel();
                }
            }
            DetectorInput::WatchTranscript { session_id, path } => {
                // Replace any previous tail for this session.
                if let Some(token) = self.tails.remove(&session_id) {
                    token.cancel();
                }
                let token = self.shutdown.child_token();
                self.tails.insert(session_id.clone(), token.clone());
                let watcher = transcript::TranscriptWatcher::new(path)
                    .with_poll_interval(self.settings.transcript_poll);
                let tx = self.tx.clone();
                tokio::spawn(watcher.run(session_id, tx, token));
            }
        }
    }

    fn note_activity_inner(&self, session_id: &str, clears: &mut HashMap<String, Instant>) {
        let is_waiting = {
            let mut states = self.states.write();
            let state = states.entry(session_id.to_owned()).or_default();
            state.last_output_ms = now_epoch_ms();
            state.is_waiting
        };
        if is_waiting {
            clears
                .entry(session_id.to_owned())
                .or_insert_with(|| Instant::now() + self.settings.clear_delay);
        }
    }

    async fn fire_due(
        &mut self,
        pending: &mut HashMap<String, PendingWindow>,
        clears: &mut HashMap<String, Instant>,
    ) {
        let now = Instant::now();

        let due_waits: Vec<WaitingSignal> = {
            let keys: Vec<String> = pending
                .iter()
                .filter(|(_, w)| w.deadline <= now)
                .map(|(k, _)| k.clone())
                .collect();
            keys.into_iter()
                .filter_map(|k| pending.remove(&k).map(|w| w.best))
                .collect()
        };
        for signal in due_waits {
            self.mark_waiting(signal).await;
        }

        let due_clears: Vec<String> = clears
            .iter()
            .filter(|(_, deadline)| **deadline <= now)
            .map(|(k, _)| k.clone())
            .collect();
        for session_id in due_clears {
            clears.remove(&session_id);
            self.mark_cleared(&session_id).await;
        }
    }

    /// Transition a session to waiting and notify, unless already waiting.
    async fn mark_waiting(&self, signal: WaitingSignal) {
        let should_notify = {
            let mut states = self.states.write();
            let state = states.entry(signal.session_id.clone()).or_default();
            if state.is_waiting {
                state.last_reason = Some(signal.reason);
                false
            } else {
                state.is_waiting = true;
                state.last_reason = Some(signal.reason);
                let notify = !state.threshold_notified;
                state.threshold_notified = true;
                notify
            }
        };

        if !should_notify {
            return;
        }

        self.events.emit_session(SessionEvent::Waiting {
            session_id: signal.session_id.clone(),
            waiting: true,
            reason: Some(signal.reason),
        });

        let ticket_id = self
            .store
            .get_session(&signal.session_id)
            .ok()
            .flatten()
            .and_then(|s| s.ticket_id);
        let message = match signal.context.as_deref() {
            Some(context) => format!("session is waiting for input ({}): {context}", signal.reason),
            None => format!("session is waiting for input ({})", signal.reason),
        };
        match self.store.upsert_notification(
            NotificationKind::WaitingInput,
            &message,
            Some(&signal.session_id),
            ticket_id.as_deref(),
        ) {
            Ok(notification) => self.events.emit_notification(notification),
            Err(e) => warn!("failed to upsert waiting notification: {e}"),
        }
    }

    /// Clear a session's waiting state after the activity delay elapsed.
    async fn mark_cleared(&self, session_id: &str) {
        let was_waiting = {
            let mut states = self.states.write();
            match states.get_mut(session_id) {
                Some(state) if state.is_waiting => {
                    state.is_waiting = false;
                    state.threshold_notified = false;
                    true
                }
                _ => false,
            }
        };
        if !was_waiting {
            return;
        }

        self.events.emit_session(SessionEvent::Waiting {
            session_id: session_id.to_owned(),
            waiting: false,
            reason: None,
        });
        if let Err(e) = self.store.clear_notification(session_id, NotificationKind::WaitingInput) {
            warn!("failed to clear waiting notification: {e}");
        }
    }
}

/// Sleep until `deadline`, or forever when there is none.
async fn deadline_sleep(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

#[cfg(test)]
#[path = "fusion_tests.rs"]
mod tests;
