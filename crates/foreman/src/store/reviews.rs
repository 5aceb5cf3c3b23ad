// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use rusqlite::{params, OptionalExtension, Row};

use crate::model::{
    new_id, now_epoch_ms, ReviewDecision, ReviewResult, ReviewTrigger, SessionStatus,
};

use super::{parse_stored, Store};

fn row_to_review(row: &Row<'_>) -> rusqlite::Result<ReviewResult> {
    Ok(ReviewResult {
        id: row.get("id")?,
        session_id: row.get("session_id")?,
        ticket_id: row.get("ticket_id")?,
        decision: parse_stored(row.get("decision")?, ReviewDecision::parse, "review decision")?,
        reasoning: row.get("reasoning")?,
        trigger: parse_stored(row.get("trigger")?, ReviewTrigger::parse, "review trigger")?,
        session_status: parse_stored(
            row.get("session_status")?,
            SessionStatus::parse,
            "session status",
        )?,
        created_at: row.get("created_at")?,
    })
}

impl Store {
    pub fn insert_review_result(
        &self,
        session_id: &str,
        ticket_id: &str,
        decision: ReviewDecision,
        reasoning: &str,
        trigger: ReviewTrigger,
        session_status: SessionStatus,
    ) -> rusqlite::Result<ReviewResult> {
        let conn = self.lock();
        let result = ReviewResult {
            id: new_id(),
            session_id: session_id.to_owned(),
            ticket_id: ticket_id.to_owned(),
            decision,
            reasoning: reasoning.to_owned(),
            trigger,
            session_status,
            created_at: now_epoch_ms(),
        };
        conn.execute(
            "INSERT INTO review_results (id, session_id, ticket_id, decision, reasoning, \
             trigger, session_status, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                result.id,
                result.session_id,
                result.ticket_id,
                result.decision.as_str(),
                result.reasoning,
                result.trigger.as_str(),
                result.session_status.as_str(),
                result.created_at,
            ],
        )?;
        Ok(result)
    }

    pub fn latest_review_for_ticket(
        &self,
        ticket_id: &str,
    ) -> rusqlite::Result<Option<ReviewResult>> {
        let conn = self.lock();
        conn.query_row(
            "SELECT id, session_id, ticket_id, decision, reasoning, trigger, session_status, \
             created_at FROM review_results WHERE ticket_id = ?1 \
             ORDER BY created_at DESC, id DESC LIMIT 1",
            params![ticket_id],
            row_to_review,
        )
        .optional()
    }
}
