// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use rusqlite::{params, Row};

use crate::model::{new_id, now_epoch_ms, Notification, NotificationKind};

use super::{parse_stored, Store};

fn row_to_notification(row: &Row<'_>) -> rusqlite::Result<Notification> {
    Ok(Notification {
        id: row.get("id")?,
        kind: parse_stored(row.get("kind")?, NotificationKind::parse, "notification kind")?,
        message: row.get("message")?,
        session_id: row.get("session_id")?,
        ticket_id: row.get("ticket_id")?,
        created_at: row.get("created_at")?,
    })
}

impl Store {
    /// Upsert the single active notification for a (session, kind) pair.
    ///
    /// Replacing an existing notification is a replace, not an append: the
    /// old row is removed and a fresh one inserted.
    pub fn upsert_notification(
        &self,
        kind: NotificationKind,
        message: &str,
        session_id: Option<&str>,
        ticket_id: Option<&str>,
    ) -> rusqlite::Result<Notification> {
        let conn = self.lock();
        if let Some(session) = session_id {
            conn.execute(
                "DELETE FROM notifications WHERE session_id = ?1 AND kind = ?2",
                params![session, kind.as_str()],
            )?;
        }
        let notification = Notification {
            id: new_id(),
            kind,
            message: message.to_owned(),
            session_id: session_id.map(str::to_owned),
            ticket_id: ticket_id.map(str::to_owned),
            created_at: now_epoch_ms(),
        };
        conn.execute(
            "INSERT INTO notifications (id, kind, message, session_id, ticket_id, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                notification.id,
                notification.kind.as_str(),
                notification.message,
                notification.session_id,
                notification.ticket_id,
                notification.created_at,
            ],
        )?;
        Ok(notification)
    }

    /// Remove the active notification for a (session, kind) pair.
    pub fn clear_notification(
        &self,
        session_id: &str,
        kind: NotificationKind,
    ) -> rusqlite::Result<bool> {
        let conn = self.lock();
        let n = conn.execute(
            "DELETE FROM notifications WHERE session_id = ?1 AND kind = ?2",
            params![session_id, kind.as_str()],
        )?;
        Ok(n > 0)
    }

    pub fn list_notifications(&self) -> rusqlite::Result<Vec<Notification>> {
        let conn = self.lock();
        let mut stmt = conn.prepare(
            "SELECT id, kind, message, session_id, ticket_id, created_at \
             FROM notifications ORDER BY created_at DESC",
        )?;
        let rows = stmt.query_map([], row_to_notification)?;
        let mut notifications = Vec::new();
        for row in rows {
            notifications.push(row?);
        }
        Ok(notifications)
    }

    pub fn delete_notification(&self, id: &str) -> rusqlite::Result<bool> {
        let conn = self.lock();
        let n = conn.execute("DELETE FROM notifications WHERE id = ?1", params![id])?;
        Ok(n > 0)
    }

    /// Dismiss all notifications, returning the dismissal count.
    pub fn delete_all_notifications(&self) -> rusqlite::Result<i64> {
        let conn = self.lock();
        let n = conn.execute("DELETE FROM notifications", [])?;
        Ok(n as i64)
    }

    /// Remove notifications of one kind attached to a ticket.
    pub fn clear_ticket_notification(
        &self,
        ticket_id: &str,
        kind: NotificationKind,
    ) -> rusqlite::Result<bool> {
        let conn = self.lock();
        let n = conn.execute(
            "DELETE FROM notifications WHERE ticket_id = ?1 AND kind = ?2",
            params![ticket_id, kind.as_str()],
        )?;
        Ok(n > 0)
    }

    /// The active notification for a (ticket, kind) pair, if any.
    pub fn notification_for_ticket(
        &self,
        ticket_id: &str,
        kind: NotificationKind,
    ) -> rusqlite::Result<Option<Notification>> {
        use rusqlite::OptionalExtension;
        let conn = self.lock();
        conn.query_row(
            "SELECT id, kind, message, session_id, ticket_id, created_at \
             FROM notifications WHERE ticket_id = ?1 AND kind = ?2 \
             ORDER BY created_at DESC LIMIT 1",
            params![ticket_id, kind.as_str()],
            row_to_notification,
        )
        .optional()
    }
}
