// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Fan-out: per-client WebSocket channel.
//!
//! Each connection runs one select loop over its own subscriptions of the
//! event bus, so per-session order is preserved end to end. Heartbeat,
//! rate limiting, and message-size bounds are enforced per connection; a
//! client that lags its event subscription is dropped.

#[path = "ws_msg.rs"]
mod msg;
pub use msg::*;

use std::collections::HashSet;
use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket};
use axum::extract::{State, WebSocketUpgrade};
use axum::response::IntoResponse;
use futures_util::{SinkExt, StreamExt};
use tokio::time::Instant;
use tracing::debug;

use crate::transport::state::AppState;

/// WebSocket upgrade handler. Authentication already happened in the
/// router middleware.
pub async fn ws_handler(
    State(state): State<Arc<AppState>>,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_connection(state, socket))
}

/// Per-connection event loop.
async fn handle_connection(state: Arc<AppState>, socket: WebSocket) {
    let (mut ws_tx, mut ws_rx) = socket.split();
    let mut session_rx = state.events.subscribe_session();
    let mut ticket_rx = state.events.subscribe_ticket();
    let mut notification_rx = state.events.subscribe_notification();

    let mut subscriptions: HashSet<String> = HashSet::new();
    let mut ping_interval = tokio::time::interval(state.ws.ping_interval);
    ping_interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    let mut last_seen = Instant::now();

    // Sliding rate-limit window.
    let mut window_start = Instant::now();
    let mut window_count: u32 = 0;

    loop {
        tokio::select! {
            _ = state.shutdown.cancelled() => break,

            _ = ping_interval.tick() => {
                if last_seen.elapsed() > state.ws.connection_timeout {
                    debug!("dropping silent ws client");
                    break;
                }
                if ws_tx.send(Message::Ping(Vec::new().into())).await.is_err() {
                    break;
                }
            }

            event = session_rx.recv() => {
                match event {
                    Ok(event) => {
                        if !subscriptions.contains(event.session_id()) {
                            continue;
                        }
                        let Some(message) = ServerMessage::from_session_event(&event) else {
                            continue;
                        };
                        if send_json(&mut ws_tx, &message).await.is_err() {
                            break;
                        }
                    }
                    // Lagging consumer: drop rather than stall the bus.
                    Err(tokio::sync::broadcast::error::RecvError::Lagged(_)) => break,
                    Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
                }
            }

            event = ticket_rx.recv() => {
                match event {
                    Ok(event) => {
                        if send_json(&mut ws_tx, &ServerMessage::from(&event)).await.is_err() {
                            break;
                        }
                    }
                    Err(tokio::sync::broadcast::error::RecvError::Lagged(_)) => break,
                    Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
                }
            }

            notification = notification_rx.recv() => {
                match notification {
                    Ok(notification) => {
                        let message = ServerMessage::Notification { notification };
                        if send_json(&mut ws_tx, &message).await.is_err() {
                            break;
                        }
                    }
                    Err(tokio::sync::broadcast::error::RecvError::Lagged(_)) => break,
                    Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
                }
            }

            incoming = ws_rx.next() => {
                let message = match incoming {
                    Some(Ok(message)) => message,
                    Some(Err(_)) | None => break,
                };
                last_seen = Instant::now();

                let text = match message {
                    Message::Text(text) => text,
                    Message::Ping(payload) => {
                        if ws_tx.send(Message::Pong(payload)).await.is_err() {
                            break;
                        }
                        continue;
                    }
                    Message::Pong(_) => continue,
                    Message::Close(_) => break,
                    Message::Binary(_) => {
                        let _ = send_json(
                            &mut ws_tx,
                            &ws_error("INVALID_MESSAGE", "binary frames are not accepted"),
                        )
                        .await;
                        break;
                    }
                };

                // Size bound: 64 KiB + 1 is an INVALID_MESSAGE violation.
                if text.len() > state.ws.max_message_bytes {
                    let _ = send_json(
                        &mut ws_tx,
                        &ws_error("INVALID_MESSAGE", "message exceeds size limit"),
                    )
                    .await;
                    break;
                }

                // Rate limit: max N client messages per window.
                if window_start.elapsed() > state.ws.rate_limit_window {
                    window_start = Instant::now();
                    window_count = 0;
                }
                window_count += 1;
                if window_count > state.ws.rate_limit_max {
                    let _ = send_json(
                        &mut ws_tx,
                        &ws_error("RATE_LIMITED", "too many messages"),
                    )
                    .await;
                    break;
                }

                let client_message: ClientMessage = match serde_json::from_str(&text) {
                    Ok(message) => message,
                    Err(_) => {
                        if send_json(
                            &mut ws_tx,
                            &ws_error("INVALID_MESSAGE", "unrecognized message"),
                        )
                        .await
                        .is_err()
                        {
                            break;
                        }
                        continue;
                    }
                };

                if let Some(reply) =
                    handle_client_message(&state, client_message, &mut subscriptions).await
                {
                    if send_json(&mut ws_tx, &reply).await.is_err() {
                        break;
                    }
                }
            }
        }
    }
}

/// Handle one client message, optionally returning a reply.
async fn handle_client_message(
    state: &AppState,
    message: ClientMessage,
    subscriptions: &mut HashSet<String>,
) -> Option<ServerMessage> {
    match message {
        ClientMessage::Subscribe { session_id } => {
            match state.store.get_session(&session_id) {
                Ok(Some(_)) => {}
                _ => {
                    return Some(ws_error("NOT_FOUND", &format!("unknown session {session_id}")))
                }
            }
            subscriptions.insert(session_id.clone());
            let replay = state
                .supervisor
                .get_output(&session_id, Some(state.ws.replay_lines))
                .unwrap_or_default();
            Some(ServerMessage::Subscribed { session_id, replay })
        }

        ClientMessage::Unsubscribe { session_id } => {
            subscriptions.remove(&session_id);
            Some(ServerMessage::Unsubscribed { session_id })
        }

        ClientMessage::Input { session_id, text } => {
            if text.chars().count() > state.ws.input_max_chars {
                return Some(ws_error("INVALID_MESSAGE", "input exceeds character limit"));
            }
            match state.supervisor.send_input(&session_id, &text).await {
                Ok(()) => None,
                Err(e) => Some(ws_error(e.code(), &e.message())),
            }
        }

        ClientMessage::Ping => Some(ServerMessage::Pong),
    }
}

fn ws_error(code: &str, message: &str) -> ServerMessage {
    ServerMessage::Error { code: code.to_owned(), message: message.to_owned() }
}

/// Send a JSON-serialized message over the socket.
async fn send_json<S>(tx: &mut S, message: &ServerMessage) -> Result<(), ()>
where
    S: SinkExt<Message> + Unpin,
{
    let text = match serde_json::to_string(message) {
        Ok(text) => text,
        Err(_) => return Err(()),
    };
    tx.send(Message::Text(text.into())).await.map_err(|_| ())
}
