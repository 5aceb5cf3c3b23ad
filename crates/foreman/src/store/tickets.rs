// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use rusqlite::{params, OptionalExtension, Row};

use crate::error::ApiError;
use crate::model::{
    new_id, now_epoch_ms, StateHistoryEntry, Ticket, TicketState, TransitionReason, Trigger,
};

use super::{parse_stored, Store};

/// Fields for creating a ticket row.
#[derive(Debug, Clone)]
pub struct NewTicket {
    pub project_id: String,
    pub external_id: Option<String>,
    pub title: String,
    pub file_path: String,
    pub prefix: String,
    pub is_adhoc: bool,
    pub is_explore: bool,
}

/// Listing filter for a project's tickets.
#[derive(Debug, Clone, Default)]
pub struct TicketFilter {
    pub state: Option<TicketState>,
    pub prefixes: Option<Vec<String>>,
}

/// A validated transition to record atomically.
#[derive(Debug, Clone)]
pub struct TransitionWrite {
    pub ticket_id: String,
    pub target: TicketState,
    pub trigger: Trigger,
    pub reason: TransitionReason,
    pub feedback: Option<String>,
    pub triggered_by: Option<String>,
}

fn row_to_ticket(row: &Row<'_>) -> rusqlite::Result<Ticket> {
    Ok(Ticket {
        id: row.get("id")?,
        project_id: row.get("project_id")?,
        external_id: row.get("external_id")?,
        title: row.get("title")?,
        state: parse_stored(row.get("state")?, TicketState::parse, "ticket state")?,
        file_path: row.get("file_path")?,
        prefix: row.get("prefix")?,
        is_adhoc: row.get("is_adhoc")?,
        is_explore: row.get("is_explore")?,
        rejection_feedback: row.get("rejection_feedback")?,
        started_at: row.get("started_at")?,
        completed_at: row.get("completed_at")?,
        created_at: row.get("created_at")?,
        updated_at: row.get("updated_at")?,
    })
}

fn row_to_history(row: &Row<'_>) -> rusqlite::Result<StateHistoryEntry> {
    Ok(StateHistoryEntry {
        id: row.get("id")?,
        ticket_id: row.get("ticket_id")?,
        from_state: parse_stored(row.get("from_state")?, TicketState::parse, "ticket state")?,
        to_state: parse_stored(row.get("to_state")?, TicketState::parse, "ticket state")?,
        trigger: parse_stored(row.get("trigger")?, Trigger::parse, "trigger")?,
        reason: parse_stored(row.get("reason")?, TransitionReason::parse, "transition reason")?,
        feedback: row.get("feedback")?,
        triggered_by: row.get("triggered_by")?,
        created_at: row.get("created_at")?,
    })
}

const TICKET_COLS: &str =
    "id, project_id, external_id, title, state, file_path, prefix, is_adhoc, is_explore, \
     rejection_feedback, started_at, completed_at, created_at, updated_at";

impl Store {
    /// Insert a new ticket in `backlog`. Conflict when the file path is
    /// already claimed within the project.
    pub fn insert_ticket(&self, new: NewTicket) -> Result<Ticket, ApiError> {
        let conn = self.lock();
        let taken: Option<String> = conn
            .query_row(
                "SELECT id FROM tickets WHERE project_id = ?1 AND file_path = ?2",
                params![new.project_id, new.file_path],
                |row| row.get(0),
            )
            .optional()
            .map_err(ApiError::from)?;
        if taken.is_some() {
            return Err(ApiError::conflict(format!(
                "a ticket already exists for file {}",
                new.file_path
            )));
        }

        let now = now_epoch_ms();
        let ticket = Ticket {
            id: new_id(),
            project_id: new.project_id,
            external_id: new.external_id,
            title: new.title,
            state: TicketState::Backlog,
            file_path: new.file_path,
            prefix: new.prefix,
            is_adhoc: new.is_adhoc,
            is_explore: new.is_explore,
            rejection_feedback: None,
            started_at: None,
            completed_at: None,
            created_at: now,
            updated_at: now,
        };
        conn.execute(
            "INSERT INTO tickets (id, project_id, external_id, title, state, file_path, prefix, \
             is_adhoc, is_explore, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
            params![
                ticket.id,
                ticket.project_id,
                ticket.external_id,
                ticket.title,
                ticket.state.as_str(),
                ticket.file_path,
                ticket.prefix,
                ticket.is_adhoc,
                ticket.is_explore,
                ticket.created_at,
                ticket.updated_at,
            ],
        )
        .map_err(ApiError::from)?;
        Ok(ticket)
    }

    pub fn get_ticket(&self, id: &str) -> rusqlite::Result<Option<Ticket>> {
        let conn = self.lock();
        conn.query_row(
            &format!("SELECT {TICKET_COLS} FROM tickets WHERE id = ?1"),
            params![id],
            row_to_ticket,
        )
        .optional()
    }

    pub fn ticket_by_file_path(
        &self,
        project_id: &str,
        file_path: &str,
    ) -> rusqlite::Result<Option<Ticket>> {
        let conn = self.lock();
        conn.query_row(
            &format!("SELECT {TICKET_COLS} FROM tickets WHERE project_id = ?1 AND file_path = ?2"),
            params![project_id, file_path],
            row_to_ticket,
        )
        .optional()
    }

    pub fn list_tickets(
        &self,
        project_id: &str,
        filter: &TicketFilter,
        page: u32,
        limit: u32,
    ) -> rusqlite::Result<(Vec<Ticket>, i64)> {
        let conn = self.lock();
        let mut stmt = conn.prepare(&format!(
            "SELECT {TICKET_COLS} FROM tickets WHERE project_id = ?1 ORDER BY created_at ASC"
        ))?;
        let rows = stmt.query_map(params![project_id], row_to_ticket)?;

        // Prefix filtering is an in-memory pass; ticket counts per project
        // are small and the prefixes list is user-supplied.
        let mut matched = Vec::new();
        for row in rows {
            let ticket = row?;
            if let Some(state) = filter.state {
                if ticket.state != state {
                    continue;
                }
            }
            if let Some(prefixes) = &filter.prefixes {
                if !prefixes.is_empty() && !prefixes.iter().any(|p| &ticket.prefix == p) {
                    continue;
                }
            }
            matched.push(ticket);
        }

        let total = matched.len() as i64;
        let offset = (page.saturating_sub(1) as usize) * limit as usize;
        let paged = matched.into_iter().skip(offset).take(limit as usize).collect();
        Ok((paged, total))
    }

    pub fn rename_ticket(
        &self,
        id: &str,
        title: &str,
        file_path: &str,
    ) -> rusqlite::Result<Option<Ticket>> {
        {
            let conn = self.lock();
            conn.execute(
                "UPDATE tickets SET title = ?2, file_path = ?3, updated_at = ?4 WHERE id = ?1",
                params![id, title, file_path, now_epoch_ms()],
            )?;
        }
        self.get_ticket(id)
    }

    pub fn delete_ticket(&self, id: &str) -> rusqlite::Result<bool> {
        let conn = self.lock();
        let n = conn.execute("DELETE FROM tickets WHERE id = ?1", params![id])?;
        Ok(n > 0)
    }

    /// Record a ticket transition atomically: read the current state,
    /// validate the edge, write the new state, and append the history row
    /// in one transaction.
    ///
    /// Entering `in_progress` stamps `started_at` (first time only) and
    /// stores any rejection feedback; entering `done` stamps `completed_at`.
    pub fn transition_ticket(
        &self,
        write: &TransitionWrite,
    ) -> Result<(Ticket, StateHistoryEntry), ApiError> {
        let mut conn = self.lock();
        let tx = conn.transaction().map_err(ApiError::from)?;

        let current = tx
            .query_row(
                &format!("SELECT {TICKET_COLS} FROM tickets WHERE id = ?1"),
                params![write.ticket_id],
                row_to_ticket,
            )
            .optional()
            .map_err(ApiError::from)?
            .ok_or_else(|| ApiError::not_found("ticket", &write.ticket_id))?;

        if !current.state.can_transition_to(write.target) {
            return Err(ApiError::InvalidTransition { from: current.state, to: write.target });
        }

        let now = now_epoch_ms();
        let started_at = match (write.target, current.started_at) {
            (TicketState::InProgress, None) => Some(now),
            (_, existing) => existing,
        };
        let completed_at = match write.target {
            TicketState::Done => Some(now),
            _ => current.completed_at,
        };
        let rejection_feedback = if write.reason == TransitionReason::UserRejected {
            write.feedback.clone()
        } else {
            current.rejection_feedback.clone()
        };

        tx.execute(
            "UPDATE tickets SET state = ?2, started_at = ?3, completed_at = ?4, \
             rejection_feedback = ?5, updated_at = ?6 WHERE id = ?1",
            params![
                write.ticket_id,
                write.target.as_str(),
                started_at,
                completed_at,
                rejection_feedback,
                now,
            ],
        )
        .map_err(ApiError::from)?;

        let entry = StateHistoryEntry {
            id: new_id(),
            ticket_id: write.ticket_id.clone(),
            from_state: current.state,
            to_state: write.target,
            trigger: write.trigger,
            reason: write.reason,
            feedback: write.feedback.clone(),
            triggered_by: write.triggered_by.clone(),
            created_at: now,
        };
        tx.execute(
            "INSERT INTO state_history (id, ticket_id, from_state, to_state, trigger, reason, \
             feedback, triggered_by, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            params![
                entry.id,
                entry.ticket_id,
                entry.from_state.as_str(),
                entry.to_state.as_str(),
                entry.trigger.as_str(),
                entry.reason.as_str(),
                entry.feedback,
                entry.triggered_by,
                entry.created_at,
            ],
        )
        .map_err(ApiError::from)?;

        tx.commit().map_err(ApiError::from)?;

        let ticket = Ticket {
            state: write.target,
            started_at,
            completed_at,
            rejection_feedback,
            updated_at: now,
            ..current
        };
        Ok((ticket, entry))
    }

    /// Clear stored rejection feedback after it has been delivered.
    pub fn clear_rejection_feedback(&self, ticket_id: &str) -> rusqlite::Result<()> {
        let conn = self.lock();
        conn.execute(
            "UPDATE tickets SET rejection_feedback = NULL, updated_at = ?2 WHERE id = ?1",
            params![ticket_id, now_epoch_ms()],
        )?;
        Ok(())
    }

    /// Ordered transition history for a ticket, oldest first.
    pub fn history_for_ticket(&self, ticket_id: &str) -> rusqlite::Result<Vec<StateHistoryEntry>> {
        let conn = self.lock();
        let mut stmt = conn.prepare(
            "SELECT id, ticket_id, from_state, to_state, trigger, reason, feedback, \
             triggered_by, created_at
             FROM state_history WHERE ticket_id = ?1 ORDER BY created_at ASC, id ASC",
        )?;
        let rows = stmt.query_map(params![ticket_id], row_to_history)?;
        let mut entries = Vec::new();
        for row in rows {
            entries.push(row?);
        }
        Ok(entries)
    }
}
