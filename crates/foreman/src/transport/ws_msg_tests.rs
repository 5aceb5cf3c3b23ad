// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::event::SessionEvent;
use crate::model::WaitReason;

#[test]
fn client_messages_parse_from_tagged_json() {
    let msg: ClientMessage =
        serde_json::from_str(r#"{"type":"session:subscribe","session_id":"s1"}"#).unwrap();
    assert!(matches!(msg, ClientMessage::Subscribe { session_id } if session_id == "s1"));

    let msg: ClientMessage =
        serde_json::from_str(r#"{"type":"session:input","session_id":"s1","text":"ls"}"#).unwrap();
    assert!(matches!(msg, ClientMessage::Input { text, .. } if text == "ls"));

    let msg: ClientMessage = serde_json::from_str(r#"{"type":"ping"}"#).unwrap();
    assert!(matches!(msg, ClientMessage::Ping));
}

#[test]
fn unknown_fields_are_tolerated() {
    let msg: ClientMessage = serde_json::from_str(
        r#"{"type":"session:unsubscribe","session_id":"s1","extra":{"nested":true}}"#,
    )
    .unwrap();
    assert!(matches!(msg, ClientMessage::Unsubscribe { .. }));
}

#[test]
fn unknown_type_is_rejected() {
    assert!(serde_json::from_str::<ClientMessage>(r#"{"type":"session:kill"}"#).is_err());
    assert!(serde_json::from_str::<ClientMessage>(r#"{"no_type":true}"#).is_err());
}

#[test]
fn server_messages_serialize_with_wire_tags() {
    let json = serde_json::to_value(ServerMessage::Waiting {
        session_id: "s1".into(),
        waiting: true,
        reason: Some(WaitReason::PermissionPrompt),
    })
    .unwrap();
    assert_eq!(json["type"], "session:waiting");
    assert_eq!(json["waiting"], true);
    assert_eq!(json["reason"], "permission_prompt");

    let json = serde_json::to_value(ServerMessage::Pong).unwrap();
    assert_eq!(json["type"], "pong");
}

#[test]
fn context_low_is_not_fanned_out() {
    let event = SessionEvent::ContextLow { session_id: "s1".into(), percent: 10 };
    assert!(ServerMessage::from_session_event(&event).is_none());

    let event = SessionEvent::Context { session_id: "s1".into(), percent: 42 };
    let msg = ServerMessage::from_session_event(&event).unwrap();
    let json = serde_json::to_value(msg).unwrap();
    assert_eq!(json["type"], "session:context");
    assert_eq!(json["percent"], 42);
}
