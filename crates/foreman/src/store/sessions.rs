// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use rusqlite::{params, OptionalExtension, Row};

use crate::model::{new_id, now_epoch_ms, Session, SessionKind, SessionStatus};

use super::{parse_stored, Store};

/// Fields for creating a session row.
#[derive(Debug, Clone)]
pub struct NewSession {
    pub project_id: String,
    pub ticket_id: Option<String>,
    pub kind: SessionKind,
    pub status: SessionStatus,
    pub pane_id: String,
    pub assistant_session_id: Option<String>,
    pub transcript_path: Option<String>,
}

fn row_to_session(row: &Row<'_>) -> rusqlite::Result<Session> {
    let context: Option<i64> = row.get("context_percent")?;
    Ok(Session {
        id: row.get("id")?,
        project_id: row.get("project_id")?,
        ticket_id: row.get("ticket_id")?,
        kind: parse_stored(row.get("kind")?, SessionKind::parse, "session kind")?,
        status: parse_stored(row.get("status")?, SessionStatus::parse, "session status")?,
        pane_id: row.get("pane_id")?,
        pid: row.get("pid")?,
        assistant_session_id: row.get("assistant_session_id")?,
        transcript_path: row.get("transcript_path")?,
        context_percent: context.map(|v| v.clamp(0, 100) as u8),
        started_at: row.get("started_at")?,
        ended_at: row.get("ended_at")?,
        created_at: row.get("created_at")?,
        updated_at: row.get("updated_at")?,
    })
}

const SESSION_COLS: &str =
    "id, project_id, ticket_id, kind, status, pane_id, pid, assistant_session_id, \
     transcript_path, context_percent, started_at, ended_at, created_at, updated_at";

impl Store {
    pub fn insert_session(&self, new: NewSession) -> rusqlite::Result<Session> {
        let conn = self.lock();
        let now = now_epoch_ms();
        let session = Session {
            id: new_id(),
            project_id: new.project_id,
            ticket_id: new.ticket_id,
            kind: new.kind,
            status: new.status,
            pane_id: new.pane_id,
            pid: None,
            assistant_session_id: new.assistant_session_id,
            transcript_path: new.transcript_path,
            context_percent: None,
            started_at: if new.status == SessionStatus::Running { Some(now) } else { None },
            ended_at: None,
            created_at: now,
            updated_at: now,
        };
        conn.execute(
            "INSERT INTO sessions (id, project_id, ticket_id, kind, status, pane_id, pid, \
             assistant_session_id, transcript_path, started_at, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
            params![
                session.id,
                session.project_id,
                session.ticket_id,
                session.kind.as_str(),
                session.status.as_str(),
                session.pane_id,
                session.pid,
                session.assistant_session_id,
                session.transcript_path,
                session.started_at,
                session.created_at,
                session.updated_at,
            ],
        )?;
        Ok(session)
    }

    pub fn get_session(&self, id: &str) -> rusqlite::Result<Option<Session>> {
        let conn = self.lock();
        conn.query_row(
            &format!("SELECT {SESSION_COLS} FROM sessions WHERE id = ?1"),
            params![id],
            row_to_session,
        )
        .optional()
    }

    /// Mark a pending session as running with its pane handle and pid.
    ///
    /// A partial unique index admits one running/paused session per
    /// project; losing that race surfaces as a constraint violation.
    pub fn set_session_running(
        &self,
        id: &str,
        pane_id: &str,
        pid: Option<i64>,
    ) -> rusqlite::Result<Option<Session>> {
        {
            let conn = self.lock();
            let now = now_epoch_ms();
            conn.execute(
                "UPDATE sessions SET status = 'running', pane_id = ?2, pid = ?3, \
                 started_at = COALESCE(started_at, ?4), updated_at = ?4 WHERE id = ?1",
                params![id, pane_id, pid, now],
            )?;
        }
        self.get_session(id)
    }

    /// Set a session's status, stamping `ended_at` for terminal states.
    pub fn set_session_status(
        &self,
        id: &str,
        status: SessionStatus,
    ) -> rusqlite::Result<Option<Session>> {
        {
            let conn = self.lock();
            let now = now_epoch_ms();
            let ended_at: Option<i64> = if status.is_terminal() { Some(now) } else { None };
            conn.execute(
                "UPDATE sessions SET status = ?2, ended_at = COALESCE(?3, ended_at), \
                 updated_at = ?4 WHERE id = ?1",
                params![id, status.as_str(), ended_at, now],
            )?;
        }
        self.get_session(id)
    }

    pub fn set_session_context_percent(&self, id: &str, percent: u8) -> rusqlite::Result<()> {
        let conn = self.lock();
        conn.execute(
            "UPDATE sessions SET context_percent = ?2, updated_at = ?3 WHERE id = ?1",
            params![id, percent as i64, now_epoch_ms()],
        )?;
        Ok(())
    }

    /// Link an internal session to an external assistant session.
    pub fn link_assistant_session(
        &self,
        id: &str,
        assistant_session_id: &str,
        transcript_path: Option<&str>,
    ) -> rusqlite::Result<()> {
        let conn = self.lock();
        conn.execute(
            "UPDATE sessions SET assistant_session_id = ?2, \
             transcript_path = COALESCE(?3, transcript_path), updated_at = ?4 WHERE id = ?1",
            params![id, assistant_session_id, transcript_path, now_epoch_ms()],
        )?;
        Ok(())
    }

    pub fn session_by_assistant_id(
        &self,
        assistant_session_id: &str,
    ) -> rusqlite::Result<Option<Session>> {
        let conn = self.lock();
        conn.query_row(
            &format!(
                "SELECT {SESSION_COLS} FROM sessions WHERE assistant_session_id = ?1 \
                 ORDER BY created_at DESC LIMIT 1"
            ),
            params![assistant_session_id],
            row_to_session,
        )
        .optional()
    }

    /// The single running/paused session for a project, if any.
    pub fn active_session_for_project(
        &self,
        project_id: &str,
    ) -> rusqlite::Result<Option<Session>> {
        let conn = self.lock();
        conn.query_row(
            &format!(
                "SELECT {SESSION_COLS} FROM sessions \
                 WHERE project_id = ?1 AND status IN ('running', 'paused') \
                 ORDER BY created_at DESC LIMIT 1"
            ),
            params![project_id],
            row_to_session,
        )
        .optional()
    }

    /// The running/paused session currently working a ticket, if any.
    pub fn active_session_for_ticket(&self, ticket_id: &str) -> rusqlite::Result<Option<Session>> {
        let conn = self.lock();
        conn.query_row(
            &format!(
                "SELECT {SESSION_COLS} FROM sessions \
                 WHERE ticket_id = ?1 AND status IN ('running', 'paused') \
                 ORDER BY created_at DESC LIMIT 1"
            ),
            params![ticket_id],
            row_to_session,
        )
        .optional()
    }

    /// All running/paused sessions, optionally scoped to a project.
    pub fn list_active_sessions(
        &self,
        project_id: Option<&str>,
    ) -> rusqlite::Result<Vec<Session>> {
        let conn = self.lock();
        let mut sessions = Vec::new();
        match project_id {
            Some(pid) => {
                let mut stmt = conn.prepare(&format!(
                    "SELECT {SESSION_COLS} FROM sessions \
                     WHERE project_id = ?1 AND status IN ('running', 'paused') \
                     ORDER BY created_at ASC"
                ))?;
                let rows = stmt.query_map(params![pid], row_to_session)?;
                for row in rows {
                    sessions.push(row?);
                }
            }
            None => {
                let mut stmt = conn.prepare(&format!(
                    "SELECT {SESSION_COLS} FROM sessions \
                     WHERE status IN ('running', 'paused') ORDER BY created_at ASC"
                ))?;
                let rows = stmt.query_map([], row_to_session)?;
                for row in rows {
                    sessions.push(row?);
                }
            }
        }
        Ok(sessions)
    }

    /// Most recent running/paused session for a project that has not yet
    /// been linked to an external assistant session.
    pub fn latest_unlinked_session(&self, project_id: &str) -> rusqlite::Result<Option<Session>> {
        let conn = self.lock();
        conn.query_row(
            &format!(
                "SELECT {SESSION_COLS} FROM sessions \
                 WHERE project_id = ?1 AND status IN ('running', 'paused') \
                 AND assistant_session_id IS NULL \
                 ORDER BY created_at DESC LIMIT 1"
            ),
            params![project_id],
            row_to_session,
        )
        .optional()
    }
}
