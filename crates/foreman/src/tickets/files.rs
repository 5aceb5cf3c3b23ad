// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Ticket markdown files: validation, path handling, and filesystem sync.
//!
//! Every ticket corresponds 1:1 with a markdown file under the project's
//! tickets directory; adhoc ticket filenames are `{slug}.md`.

use std::path::{Component, Path, PathBuf};

use crate::error::ApiError;
use crate::model::Project;
use crate::store::{NewTicket, Store};

/// Hard bound on ticket markdown content.
pub const MAX_CONTENT_CHARS: usize = 100_000;

/// Default tickets directory under the repo root.
pub const DEFAULT_TICKETS_DIR: &str = "tickets";

/// Default handoff export path under the repo root.
pub const DEFAULT_HANDOFF_PATH: &str = "docs/ai-context/HANDOFF.md";

/// Slug rule (`^[a-z0-9]+(?:-[a-z0-9]+)*$`, 3–50 chars): lowercase
/// alphanumeric runs joined by single dashes.
pub fn validate_slug(slug: &str) -> bool {
    if !(3..=50).contains(&slug.chars().count()) {
        return false;
    }
    if slug.starts_with('-') || slug.ends_with('-') || slug.contains("--") {
        return false;
    }
    slug.chars().all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
}

/// Title rule: 3–100 characters after trimming.
pub fn validate_title(title: &str) -> bool {
    (3..=100).contains(&title.trim().chars().count())
}

/// Reduce a title to a slug-shaped filename root.
pub fn slugify(title: &str) -> String {
    let mut slug = String::with_capacity(title.len());
    let mut last_dash = true;
    for ch in title.chars() {
        let ch = ch.to_ascii_lowercase();
        if ch.is_ascii_alphanumeric() {
            slug.push(ch);
            last_dash = false;
        } else if !last_dash {
            slug.push('-');
            last_dash = true;
        }
    }
    while slug.ends_with('-') {
        slug.pop();
    }
    slug.truncate(50);
    while slug.ends_with('-') {
        slug.pop();
    }
    if slug.is_empty() {
        "ticket".to_owned()
    } else {
        slug
    }
}

/// Leading `-`-separated segment of a ticket file name.
pub fn prefix_from_filename(name: &str) -> String {
    let stem = name.strip_suffix(".md").unwrap_or(name);
    stem.split('-').next().unwrap_or_default().to_owned()
}

/// First `# ` heading of the markdown body, or the fallback.
pub fn title_from_markdown(content: &str, fallback: &str) -> String {
    content
        .lines()
        .find_map(|line| line.strip_prefix("# ").map(|t| t.trim().to_owned()))
        .filter(|t| !t.is_empty())
        .unwrap_or_else(|| fallback.to_owned())
}

/// The project's tickets directory, relative to the repo root.
pub fn tickets_dir(project: &Project) -> PathBuf {
    let rel = project.tickets_path.as_deref().unwrap_or(DEFAULT_TICKETS_DIR);
    Path::new(&project.repo_path).join(rel)
}

/// The project's handoff export path.
pub fn handoff_path(project: &Project) -> PathBuf {
    let rel = project.handoff_path.as_deref().unwrap_or(DEFAULT_HANDOFF_PATH);
    Path::new(&project.repo_path).join(rel)
}

/// Repo-relative ticket file path for a slug.
pub fn ticket_rel_path(project: &Project, slug: &str) -> String {
    let dir = project.tickets_path.as_deref().unwrap_or(DEFAULT_TICKETS_DIR);
    format!("{}/{slug}.md", dir.trim_end_matches('/'))
}

/// Reject relative paths that escape the repository.
pub fn ensure_inside_repo(rel_path: &str) -> Result<(), ApiError> {
    let path = Path::new(rel_path);
    if path.is_absolute() {
        return Err(ApiError::PathTraversal);
    }
    for component in path.components() {
        match component {
            Component::ParentDir | Component::RootDir | Component::Prefix(_) => {
                return Err(ApiError::PathTraversal)
            }
            _ => {}
        }
    }
    Ok(())
}

/// Absolute path of a ticket's markdown file.
pub fn absolute_ticket_path(project: &Project, rel_path: &str) -> Result<PathBuf, ApiError> {
    ensure_inside_repo(rel_path)?;
    Ok(Path::new(&project.repo_path).join(rel_path))
}

/// Read ticket content, or empty when the file does not exist yet.
pub async fn read_content(project: &Project, rel_path: &str) -> Result<String, ApiError> {
    let path = absolute_ticket_path(project, rel_path)?;
    match tokio::fs::read_to_string(&path).await {
        Ok(content) => Ok(content),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(String::new()),
        Err(e) => Err(ApiError::internal(format!("failed to read ticket file: {e}"))),
    }
}

/// Write ticket content, enforcing the size bound and creating parent
/// directories as needed.
pub async fn write_content(
    project: &Project,
    rel_path: &str,
    content: &str,
) -> Result<(), ApiError> {
    if content.chars().count() > MAX_CONTENT_CHARS {
        return Err(ApiError::validation_with(
            "ticket content too large",
            serde_json::json!({ "content": format!("must be at most {MAX_CONTENT_CHARS} characters") }),
        ));
    }
    let path = absolute_ticket_path(project, rel_path)?;
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|e| ApiError::internal(format!("failed to create tickets dir: {e}")))?;
    }
    tokio::fs::write(&path, content)
        .await
        .map_err(|e| ApiError::internal(format!("failed to write ticket file: {e}")))
}

/// Move a ticket file after a rename. Missing source is tolerated.
pub async fn rename_file(
    project: &Project,
    old_rel: &str,
    new_rel: &str,
) -> Result<(), ApiError> {
    let old = absolute_ticket_path(project, old_rel)?;
    let new = absolute_ticket_path(project, new_rel)?;
    if let Some(parent) = new.parent() {
        let _ = tokio::fs::create_dir_all(parent).await;
    }
    match tokio::fs::rename(&old, &new).await {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(ApiError::internal(format!("failed to rename ticket file: {e}"))),
    }
}

/// Remove a ticket file. Missing file is tolerated.
pub async fn remove_file(project: &Project, rel_path: &str) -> Result<(), ApiError> {
    let path = absolute_ticket_path(project, rel_path)?;
    match tokio::fs::remove_file(&path).await {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(ApiError::internal(format!("failed to remove ticket file: {e}"))),
    }
}

/// Import markdown files from the tickets directory that have no ticket
/// row yet. Returns the number of tickets created.
pub async fn sync_tickets(store: &Store, project: &Project) -> Result<usize, ApiError> {
    let dir = tickets_dir(project);
    let mut entries = match tokio::fs::read_dir(&dir).await {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(0),
        Err(e) => return Err(ApiError::internal(format!("failed to read tickets dir: {e}"))),
    };

    let rel_dir = project.tickets_path.as_deref().unwrap_or(DEFAULT_TICKETS_DIR);
    let mut created = 0;
    while let Ok(Some(entry)) = entries.next_entry().await {
        let name = entry.file_name().to_string_lossy().into_owned();
        if !name.ends_with(".md") {
            continue;
        }
        let rel_path = format!("{}/{name}", rel_dir.trim_end_matches('/'));
        if store.ticket_by_file_path(&project.id, &rel_path)?.is_some() {
            continue;
        }

        let stem = name.trim_end_matches(".md");
        let content = tokio::fs::read_to_string(entry.path()).await.unwrap_or_default();
        let title = title_from_markdown(&content, stem);
        store.insert_ticket(NewTicket {
            project_id: project.id.clone(),
            external_id: None,
            title,
            file_path: rel_path,
            prefix: prefix_from_filename(&name),
            is_adhoc: false,
            is_explore: false,
        })?;
        created += 1;
    }
    Ok(created)
}

#[cfg(test)]
#[path = "files_tests.rs"]
mod tests;
