// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Relational persistence for projects, tickets, sessions, transition
//! history, review results, and notifications.
//!
//! The connection lives behind a synchronous mutex; methods run short
//! statements and are called from async code without any other lock held.
//! Multi-row invariants (ticket state + history append) commit in a single
//! transaction; the one-active-session-per-project invariant is enforced
//! by a partial unique index so racing writers cannot both claim the slot.

mod notifications;
mod projects;
mod reviews;
mod sessions;
mod tickets;

pub use projects::{NewProject, ProjectPatch, TicketCounts};
pub use sessions::NewSession;
pub use tickets::{NewTicket, TicketFilter, TransitionWrite};

use parking_lot::Mutex;
use rusqlite::Connection;

/// Durable store. Exclusively owns every persistent entity.
pub struct Store {
    conn: Mutex<Connection>,
}

impl Store {
    /// Open (and migrate) the database at `database_url`.
    ///
    /// Accepts a bare filesystem path, a `sqlite://` URL, or `:memory:`.
    pub fn open(database_url: &str) -> anyhow::Result<Self> {
        let path = database_url
            .trim()
            .strip_prefix("sqlite://")
            .or_else(|| database_url.trim().strip_prefix("sqlite:"))
            .unwrap_or(database_url.trim());

        let conn = if path == ":memory:" {
            Connection::open_in_memory()?
        } else {
            Connection::open(path)?
        };

        if path != ":memory:" {
            conn.pragma_update(None, "journal_mode", "WAL")?;
        }
        conn.pragma_update(None, "foreign_keys", true)?;
        migrate(&conn)?;
        Ok(Self { conn: Mutex::new(conn) })
    }

    /// Open a fresh in-memory store (tests, ephemeral runs).
    pub fn open_in_memory() -> anyhow::Result<Self> {
        Self::open(":memory:")
    }

    /// Liveness probe for the health endpoint.
    pub fn ping(&self) -> bool {
        let conn = self.conn.lock();
        conn.query_row("SELECT 1", [], |row| row.get::<_, i64>(0)).is_ok()
    }

    pub(crate) fn lock(&self) -> parking_lot::MutexGuard<'_, Connection> {
        self.conn.lock()
    }
}

fn migrate(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS projects (
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            repo_path TEXT NOT NULL UNIQUE,
            pane_group TEXT NOT NULL,
            pane_window TEXT,
            tickets_path TEXT,
            handoff_path TEXT,
            created_at INTEGER NOT NULL,
            updated_at INTEGER NOT NULL
        );

        CREATE TABLE IF NOT EXISTS tickets (
            id TEXT PRIMARY KEY,
            project_id TEXT NOT NULL REFERENCES projects(id) ON DELETE CASCADE,
            external_id TEXT,
            title TEXT NOT NULL,
            state TEXT NOT NULL,
            file_path TEXT NOT NULL,
            prefix TEXT NOT NULL DEFAULT '',
            is_adhoc INTEGER NOT NULL DEFAULT 0,
            is_explore INTEGER NOT NULL DEFAULT 0,
            rejection_feedback TEXT,
            started_at INTEGER,
            completed_at INTEGER,
            created_at INTEGER NOT NULL,
            updated_at INTEGER NOT NULL,
            UNIQUE (project_id, file_path)
        );

        CREATE TABLE IF NOT EXISTS sessions (
            id TEXT PRIMARY KEY,
            project_id TEXT NOT NULL REFERENCES projects(id) ON DELETE CASCADE,
            ticket_id TEXT REFERENCES tickets(id) ON DELETE SET NULL,
            kind TEXT NOT NULL,
            status TEXT NOT NULL,
            pane_id TEXT NOT NULL DEFAULT '',
            pid INTEGER,
            assistant_session_id TEXT,
            transcript_path TEXT,
            context_percent INTEGER,
            started_at INTEGER,
            ended_at INTEGER,
            created_at INTEGER NOT NULL,
            updated_at INTEGER NOT NULL
        );

        CREATE UNIQUE INDEX IF NOT EXISTS idx_sessions_pane
            ON sessions(pane_id) WHERE pane_id != '';
        CREATE INDEX IF NOT EXISTS idx_sessions_project
            ON sessions(project_id, status);
        CREATE UNIQUE INDEX IF NOT EXISTS idx_sessions_single_active
            ON sessions(project_id) WHERE status IN ('running', 'paused');

        CREATE TABLE IF NOT EXISTS state_history (
            id TEXT PRIMARY KEY,
            ticket_id TEXT NOT NULL REFERENCES tickets(id) ON DELETE CASCADE,
            from_state TEXT NOT NULL,
            to_state TEXT NOT NULL,
            trigger TEXT NOT NULL,
            reason TEXT NOT NULL,
            feedback TEXT,
            triggered_by TEXT,
            created_at INTEGER NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_history_ticket
            ON state_history(ticket_id, created_at);

        CREATE TABLE IF NOT EXISTS review_results (
            id TEXT PRIMARY KEY,
            session_id TEXT NOT NULL,
            ticket_id TEXT NOT NULL,
            decision TEXT NOT NULL,
            reasoning TEXT NOT NULL,
            trigger TEXT NOT NULL,
            session_status TEXT NOT NULL,
            created_at INTEGER NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_reviews_ticket
            ON review_results(ticket_id, created_at);

        CREATE TABLE IF NOT EXISTS notifications (
            id TEXT PRIMARY KEY,
            kind TEXT NOT NULL,
            message TEXT NOT NULL,
            session_id TEXT,
            ticket_id TEXT,
            created_at INTEGER NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_notifications_session
            ON notifications(session_id, kind);",
    )
}

/// Whether a rusqlite error is a uniqueness/constraint violation, e.g. a
/// second running session entering a project's single active slot.
pub(crate) fn is_constraint_violation(e: &rusqlite::Error) -> bool {
    matches!(
        e,
        rusqlite::Error::SqliteFailure(err, _)
            if err.code == rusqlite::ErrorCode::ConstraintViolation
    )
}

/// Map a stored enum string back to its typed value, surfacing corruption
/// as a conversion error instead of a silent default.
pub(crate) fn parse_stored<T>(
    value: String,
    parse: fn(&str) -> Option<T>,
    what: &'static str,
) -> rusqlite::Result<T> {
    parse(&value).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            0,
            rusqlite::types::Type::Text,
            format!("invalid stored {what}: {value}").into(),
        )
    })
}

#[cfg(test)]
#[path = "store_tests.rs"]
mod tests;
