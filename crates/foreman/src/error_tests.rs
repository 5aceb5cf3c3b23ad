// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

#[test]
fn status_codes_match_taxonomy() {
    assert_eq!(ApiError::validation("x").http_status(), 400);
    assert_eq!(ApiError::not_found("ticket", "t1").http_status(), 404);
    assert_eq!(ApiError::conflict("busy").http_status(), 409);
    assert_eq!(
        ApiError::InvalidTransition { from: TicketState::Backlog, to: TicketState::Done }
            .http_status(),
        409
    );
    assert_eq!(ApiError::MissingFeedback.http_status(), 400);
    assert_eq!(ApiError::PathTraversal.http_status(), 403);
    assert_eq!(ApiError::Unauthorized.http_status(), 401);
    assert_eq!(ApiError::internal("boom").http_status(), 500);
}

#[test]
fn invalid_transition_carries_from_to_details() {
    let err = ApiError::InvalidTransition { from: TicketState::Backlog, to: TicketState::Done };
    let body = err.to_error_body();
    assert_eq!(body.code.as_deref(), Some("INVALID_TRANSITION"));
    let details = body.details.unwrap();
    assert_eq!(details["from"], "backlog");
    assert_eq!(details["to"], "done");
}

#[test]
fn envelope_omits_empty_fields() {
    let body = ApiError::not_found("project", "p1").to_error_body();
    let json = serde_json::to_value(&body).unwrap();
    assert!(json.get("details").is_none());
    assert_eq!(json["error"], "project not found: p1");
}
