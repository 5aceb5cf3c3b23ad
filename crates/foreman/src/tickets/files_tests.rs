// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::store::{NewProject, Store};
use yare::parameterized;

#[parameterized(
    single_run = { "abc", true },
    multi_run = { "a-b-c", true },
    digits = { "fix-404", true },
    leading_dash = { "-abc", false },
    trailing_dash = { "abc-", false },
    double_dash = { "a--b", false },
    uppercase = { "Abc", false },
    underscore = { "a_bc", false },
    too_short = { "ab", false },
    min_length = { "abc", true },
)]
fn slug_validation(slug: &str, valid: bool) {
    assert_eq!(validate_slug(slug), valid, "slug: {slug}");
}

#[test]
fn slug_length_bounds() {
    assert!(!validate_slug(&"a".repeat(2)));
    assert!(validate_slug(&"a".repeat(3)));
    assert!(validate_slug(&"a".repeat(50)));
    assert!(!validate_slug(&"a".repeat(51)));
}

#[test]
fn title_length_bounds() {
    assert!(!validate_title("ab"));
    assert!(validate_title("abc"));
    assert!(validate_title(&"t".repeat(100)));
    assert!(!validate_title(&"t".repeat(101)));
    assert!(!validate_title("   a   "));
}

#[test]
fn slugify_produces_valid_slugs() {
    assert_eq!(slugify("Add X support"), "add-x-support");
    assert_eq!(slugify("  Fix: the (parser)!  "), "fix-the-parser");
    assert_eq!(slugify("___"), "ticket");
    assert!(validate_slug(&slugify("A very long title that should still slugify cleanly")));
}

#[test]
fn prefix_comes_from_leading_segment() {
    assert_eq!(prefix_from_filename("proj-123-add-x.md"), "proj");
    assert_eq!(prefix_from_filename("standalone.md"), "standalone");
}

#[test]
fn title_prefers_first_heading() {
    assert_eq!(title_from_markdown("# Add X\n\nbody", "fallback"), "Add X");
    assert_eq!(title_from_markdown("no heading here", "fallback"), "fallback");
    assert_eq!(title_from_markdown("#not-a-heading\n# Real\n", "fb"), "Real");
}

#[test]
fn path_traversal_is_rejected() {
    assert!(ensure_inside_repo("tickets/add-x.md").is_ok());
    assert!(ensure_inside_repo("../etc/passwd").is_err());
    assert!(ensure_inside_repo("tickets/../../outside.md").is_err());
    assert!(ensure_inside_repo("/absolute/path.md").is_err());
}

#[tokio::test]
async fn content_size_bound_is_enforced() {
    let dir = tempfile::tempdir().unwrap();
    let project = test_project(dir.path().to_str().unwrap());

    let ok = "x".repeat(MAX_CONTENT_CHARS);
    assert!(write_content(&project, "tickets/a.md", &ok).await.is_ok());

    let too_big = "x".repeat(MAX_CONTENT_CHARS + 1);
    let err = write_content(&project, "tickets/a.md", &too_big).await.unwrap_err();
    assert_eq!(err.http_status(), 400);
}

#[tokio::test]
async fn sync_imports_unknown_markdown_files() {
    let dir = tempfile::tempdir().unwrap();
    let repo = dir.path().to_str().unwrap().to_owned();
    std::fs::create_dir_all(dir.path().join("tickets")).unwrap();
    std::fs::write(dir.path().join("tickets/core-fix-parser.md"), "# Fix the parser\n").unwrap();
    std::fs::write(dir.path().join("tickets/notes.txt"), "ignored").unwrap();

    let store = Store::open_in_memory().unwrap();
    let project = store
        .insert_project(NewProject {
            name: "demo".into(),
            repo_path: repo,
            pane_group: "g".into(),
            pane_window: None,
            tickets_path: None,
            handoff_path: None,
        })
        .unwrap();

    let created = sync_tickets(&store, &project).await.unwrap();
    assert_eq!(created, 1);

    let ticket =
        store.ticket_by_file_path(&project.id, "tickets/core-fix-parser.md").unwrap().unwrap();
    assert_eq!(ticket.title, "Fix the parser");
    assert_eq!(ticket.prefix, "core");
    assert!(!ticket.is_adhoc);

    // Re-sync is a no-op.
    assert_eq!(sync_tickets(&store, &project).await.unwrap(), 0);
}

fn test_project(repo: &str) -> crate::model::Project {
    crate::model::Project {
        id: "p1".into(),
        name: "demo".into(),
        repo_path: repo.into(),
        pane_group: "g".into(),
        pane_window: None,
        tickets_path: None,
        handoff_path: None,
        created_at: 0,
        updated_at: 0,
    }
}
