// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use rusqlite::{params, OptionalExtension, Row};

use crate::error::ApiError;
use crate::model::{new_id, now_epoch_ms, Project, TicketState};

use super::Store;

/// Fields for creating a project.
#[derive(Debug, Clone)]
pub struct NewProject {
    pub name: String,
    pub repo_path: String,
    pub pane_group: String,
    pub pane_window: Option<String>,
    pub tickets_path: Option<String>,
    pub handoff_path: Option<String>,
}

/// Partial update for a project.
#[derive(Debug, Clone, Default)]
pub struct ProjectPatch {
    pub name: Option<String>,
    pub pane_group: Option<String>,
    pub pane_window: Option<Option<String>>,
    pub tickets_path: Option<Option<String>>,
    pub handoff_path: Option<Option<String>>,
}

/// Per-state ticket counts for the project detail view.
#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct TicketCounts {
    pub backlog: i64,
    pub in_progress: i64,
    pub review: i64,
    pub done: i64,
}

fn row_to_project(row: &Row<'_>) -> rusqlite::Result<Project> {
    Ok(Project {
        id: row.get("id")?,
        name: row.get("name")?,
        repo_path: row.get("repo_path")?,
        pane_group: row.get("pane_group")?,
        pane_window: row.get("pane_window")?,
        tickets_path: row.get("tickets_path")?,
        handoff_path: row.get("handoff_path")?,
        created_at: row.get("created_at")?,
        updated_at: row.get("updated_at")?,
    })
}

const PROJECT_COLS: &str =
    "id, name, repo_path, pane_group, pane_window, tickets_path, handoff_path, \
     created_at, updated_at";

impl Store {
    /// Insert a project. `repo_path` uniquely identifies a project.
    pub fn insert_project(&self, new: NewProject) -> Result<Project, ApiError> {
        let conn = self.lock();
        let exists: Option<String> = conn
            .query_row(
                "SELECT id FROM projects WHERE repo_path = ?1",
                params![new.repo_path],
                |row| row.get(0),
            )
            .optional()
            .map_err(ApiError::from)?;
        if exists.is_some() {
            return Err(ApiError::conflict(format!(
                "a project already exists for repo path {}",
                new.repo_path
            )));
        }

        let now = now_epoch_ms();
        let project = Project {
            id: new_id(),
            name: new.name,
            repo_path: new.repo_path,
            pane_group: new.pane_group,
            pane_window: new.pane_window,
            tickets_path: new.tickets_path,
            handoff_path: new.handoff_path,
            created_at: now,
            updated_at: now,
        };
        conn.execute(
            "INSERT INTO projects (id, name, repo_path, pane_group, pane_window, tickets_path, \
             handoff_path, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            params![
                project.id,
                project.name,
                project.repo_path,
                project.pane_group,
                project.pane_window,
                project.tickets_path,
                project.handoff_path,
                project.created_at,
                project.updated_at,
            ],
        )
        .map_err(ApiError::from)?;
        Ok(project)
    }

    pub fn get_project(&self, id: &str) -> rusqlite::Result<Option<Project>> {
        let conn = self.lock();
        conn.query_row(
            &format!("SELECT {PROJECT_COLS} FROM projects WHERE id = ?1"),
            params![id],
            row_to_project,
        )
        .optional()
    }

    pub fn list_projects(&self, page: u32, limit: u32) -> rusqlite::Result<(Vec<Project>, i64)> {
        let conn = self.lock();
        let total: i64 = conn.query_row("SELECT COUNT(*) FROM projects", [], |row| row.get(0))?;
        let offset = (page.saturating_sub(1) as i64) * limit as i64;
        let mut stmt = conn.prepare(&format!(
            "SELECT {PROJECT_COLS} FROM projects ORDER BY created_at DESC LIMIT ?1 OFFSET ?2"
        ))?;
        let rows = stmt.query_map(params![limit as i64, offset], row_to_project)?;
        let mut projects = Vec::new();
        for row in rows {
            projects.push(row?);
        }
        Ok((projects, total))
    }

    pub fn update_project(
        &self,
        id: &str,
        patch: ProjectPatch,
    ) -> Result<Option<Project>, ApiError> {
        {
            let conn = self.lock();
            let now = now_epoch_ms();
            if let Some(name) = &patch.name {
                conn.execute(
                    "UPDATE projects SET name = ?2, updated_at = ?3 WHERE id = ?1",
                    params![id, name, now],
                )
                .map_err(ApiError::from)?;
            }
            if let Some(group) = &patch.pane_group {
                conn.execute(
                    "UPDATE projects SET pane_group = ?2, updated_at = ?3 WHERE id = ?1",
                    params![id, group, now],
                )
                .map_err(ApiError::from)?;
            }
            if let Some(window) = &patch.pane_window {
                conn.execute(
                    "UPDATE projects SET pane_window = ?2, updated_at = ?3 WHERE id = ?1",
                    params![id, window, now],
                )
                .map_err(ApiError::from)?;
            }
            if let Some(tickets_path) = &patch.tickets_path {
                conn.execute(
                    "UPDATE projects SET tickets_path = ?2, updated_at = ?3 WHERE id = ?1",
                    params![id, tickets_path, now],
                )
                .map_err(ApiError::from)?;
            }
            if let Some(handoff_path) = &patch.handoff_path {
                conn.execute(
                    "UPDATE projects SET handoff_path = ?2, updated_at = ?3 WHERE id = ?1",
                    params![id, handoff_path, now],
                )
                .map_err(ApiError::from)?;
            }
        }
        self.get_project(id).map_err(ApiError::from)
    }

    pub fn delete_project(&self, id: &str) -> rusqlite::Result<bool> {
        let conn = self.lock();
        let n = conn.execute("DELETE FROM projects WHERE id = ?1", params![id])?;
        Ok(n > 0)
    }

    /// Longest-prefix match of `cwd` against project repo paths.
    ///
    /// Used by hook ingress to correlate an external session to a project
    /// when several projects share a path prefix.
    pub fn find_project_by_cwd(&self, cwd: &str) -> rusqlite::Result<Option<Project>> {
        let conn = self.lock();
        let mut stmt = conn.prepare(&format!("SELECT {PROJECT_COLS} FROM projects"))?;
        let rows = stmt.query_map([], row_to_project)?;
        let mut best: Option<Project> = None;
        for row in rows {
            let project = row?;
            if cwd == project.repo_path
                || cwd.starts_with(&format!("{}/", project.repo_path.trim_end_matches('/')))
            {
                let better = best
                    .as_ref()
                    .map(|b| project.repo_path.len() > b.repo_path.len())
                    .unwrap_or(true);
                if better {
                    best = Some(project);
                }
            }
        }
        Ok(best)
    }

    pub fn ticket_counts(&self, project_id: &str) -> rusqlite::Result<TicketCounts> {
        let conn = self.lock();
        let mut stmt = conn.prepare(
            "SELECT state, COUNT(*) FROM tickets WHERE project_id = ?1 GROUP BY state",
        )?;
        let rows = stmt.query_map(params![project_id], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?))
        })?;
        let mut counts = TicketCounts::default();
        for row in rows {
            let (state, count) = row?;
            match TicketState::parse(&state) {
                Some(TicketState::Backlog) => counts.backlog = count,
                Some(TicketState::InProgress) => counts.in_progress = count,
                Some(TicketState::Review) => counts.review = count,
                Some(TicketState::Done) => counts.done = count,
                None => {}
            }
        }
        Ok(counts)
    }
}
