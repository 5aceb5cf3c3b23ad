// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::io::Write;

use crate::model::WaitReason;

use super::*;

#[test]
fn classifies_permission_request_entries() {
    assert_eq!(
        classify_transcript_line(r#"{"type":"permission_request","tool":"Bash"}"#),
        Some(WaitReason::PermissionPrompt)
    );
    assert_eq!(
        classify_transcript_line(r#"{"type":"notification","subtype":"permission_prompt"}"#),
        Some(WaitReason::PermissionPrompt)
    );
}

#[test]
fn classifies_context_exhaustion_entries() {
    assert_eq!(
        classify_transcript_line(r#"{"type":"context_exhausted"}"#),
        Some(WaitReason::ContextExhausted)
    );
    assert_eq!(
        classify_transcript_line(r#"{"type":"system","subtype":"context_low"}"#),
        Some(WaitReason::ContextExhausted)
    );
}

#[test]
fn ignores_ordinary_and_malformed_entries() {
    assert_eq!(classify_transcript_line(r#"{"type":"assistant","text":"hello"}"#), None);
    assert_eq!(classify_transcript_line("not json at all"), None);
    assert_eq!(classify_transcript_line(""), None);
}

#[test]
fn reads_only_appended_lines() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("transcript.jsonl");
    std::fs::write(&path, "{\"type\":\"a\"}\n{\"type\":\"b\"}\n").unwrap();

    let mut watcher = TranscriptWatcher::new(path.clone());
    let lines = watcher.read_new_lines().unwrap();
    assert_eq!(lines.len(), 2);

    // No new data → no lines.
    assert!(watcher.read_new_lines().unwrap().is_empty());

    let mut file = std::fs::OpenOptions::new().append(true).open(&path).unwrap();
    writeln!(file, "{{\"type\":\"c\"}}").unwrap();
    drop(file);

    let lines = watcher.read_new_lines().unwrap();
    assert_eq!(lines, vec!["{\"type\":\"c\"}"]);
}

#[test]
fn truncation_resets_the_offset() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("transcript.jsonl");
    std::fs::write(&path, "{\"type\":\"a\"}\n{\"type\":\"b\"}\n").unwrap();

    let mut watcher = TranscriptWatcher::new(path.clone());
    watcher.read_new_lines().unwrap();

    // Conversation cleared: the file shrinks below the tracked offset.
    std::fs::write(&path, "{\"type\":\"z\"}\n").unwrap();
    let lines = watcher.read_new_lines().unwrap();
    assert_eq!(lines, vec!["{\"type\":\"z\"}"]);
}

#[test]
fn missing_file_is_not_an_error() {
    let dir = tempfile::tempdir().unwrap();
    let mut watcher = TranscriptWatcher::new(dir.path().join("absent.jsonl"));
    assert!(watcher.read_new_lines().unwrap().is_empty());
}
