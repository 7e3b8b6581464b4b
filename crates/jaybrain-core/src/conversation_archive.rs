//! Conversation Archive
//!
//! Nightly job: parse recent assistant transcripts (same rules as the pulse
//! reader) and render each into a canonical markdown file. A row in
//! `conversation_archive_sessions` makes re-archival a no-op.

use std::path::{Path, PathBuf};

use rusqlite::params;
use serde::Serialize;

use crate::config::Config;
use crate::storage::{now_iso, Result, Store};
use crate::transcript;

/// Turns longer than this are cut with a marker
const TURN_TRUNCATE_CHARS: usize = 10_000;

/// Marker appended to truncated turns
const TRUNCATION_MARKER: &str = "\n\n*[truncated]*";

// ============================================================================
// TYPES
// ============================================================================

/// Outcome of one archive run
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ArchiveReport {
    pub scanned: usize,
    pub archived: usize,
    pub skipped_existing: usize,
}

// ============================================================================
// RENDERING
// ============================================================================

/// Render a parsed transcript as canonical markdown: frontmatter with the
/// counts, one section per turn, truncation markers past the cap.
pub fn render_markdown(session_id: &str, parsed: &transcript::Transcript) -> String {
    let mut doc = String::new();
    doc.push_str("---\n");
    doc.push_str(&format!("session: {session_id}\n"));
    doc.push_str(&format!("turns: {}\n", parsed.turns.len()));
    let total_tools: i64 = parsed.tool_counts.values().sum();
    doc.push_str(&format!("tool_calls: {total_tools}\n"));
    for (tool, count) in &parsed.tool_counts {
        doc.push_str(&format!("  {tool}: {count}\n"));
    }
    doc.push_str(&format!("archived_at: {}\n", now_iso()));
    doc.push_str("---\n\n");

    for turn in &parsed.turns {
        let heading = if turn.role == "user" { "## User" } else { "## Assistant" };
        doc.push_str(heading);
        doc.push_str("\n\n");
        if turn.text.chars().count() > TURN_TRUNCATE_CHARS {
            let clipped: String = turn.text.chars().take(TURN_TRUNCATE_CHARS).collect();
            doc.push_str(&clipped);
            doc.push_str(TRUNCATION_MARKER);
        } else {
            doc.push_str(&turn.text);
        }
        doc.push_str("\n\n");
    }
    doc
}

// ============================================================================
// ARCHIVING
// ============================================================================

/// Archive transcripts newer than the configured window. Already-archived
/// sessions are skipped via the `(session_id)` table.
pub fn archive_recent(store: &Store, config: &Config) -> Result<ArchiveReport> {
    let run_id = {
        let conn = store.write()?;
        conn.execute(
            "INSERT INTO conversation_archive_runs (started_at, sessions_archived) VALUES (?1, 0)",
            [now_iso()],
        )?;
        conn.last_insert_rowid()
    };

    let out_dir = config.data_dir.join("conversations");
    let cutoff = std::time::SystemTime::now()
        - std::time::Duration::from_secs(config.archive_after_days as u64 * 86_400);

    let mut report = ArchiveReport {
        scanned: 0,
        archived: 0,
        skipped_existing: 0,
    };

    for entry in walkdir::WalkDir::new(&config.projects_dir)
        .max_depth(3)
        .into_iter()
        .filter_map(|e| e.ok())
    {
        let path = entry.path();
        if path.extension().and_then(|e| e.to_str()) != Some("jsonl") {
            continue;
        }
        let fresh = entry
            .metadata()
            .and_then(|m| m.modified())
            .map(|m| m >= cutoff)
            .unwrap_or(false);
        if !fresh {
            continue;
        }
        report.scanned += 1;

        let Some(session_id) = path.file_stem().and_then(|s| s.to_str()) else {
            continue;
        };
        if is_archived(store, session_id)? {
            report.skipped_existing += 1;
            continue;
        }

        match archive_one(store, path, session_id, &out_dir) {
            Ok(()) => report.archived += 1,
            Err(e) => tracing::warn!("Failed to archive {}: {}", session_id, e),
        }
    }

    {
        let conn = store.write()?;
        conn.execute(
            "UPDATE conversation_archive_runs SET completed_at = ?1, sessions_archived = ?2
             WHERE id = ?3",
            params![now_iso(), report.archived as i64, run_id],
        )?;
    }
    Ok(report)
}

fn archive_one(store: &Store, path: &Path, session_id: &str, out_dir: &Path) -> Result<()> {
    let parsed = transcript::parse_file(path)?;
    let rendered = render_markdown(session_id, &parsed);

    std::fs::create_dir_all(out_dir)?;
    let out_path = out_dir.join(format!("{session_id}.md"));
    std::fs::write(&out_path, rendered)?;

    let conn = store.write()?;
    conn.execute(
        "INSERT OR IGNORE INTO conversation_archive_sessions (session_id, archived_at, path)
         VALUES (?1, ?2, ?3)",
        params![session_id, now_iso(), out_path.display().to_string()],
    )?;
    Ok(())
}

fn is_archived(store: &Store, session_id: &str) -> Result<bool> {
    let conn = store.read()?;
    let count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM conversation_archive_sessions WHERE session_id = ?1",
        [session_id],
        |row| row.get(0),
    )?;
    Ok(count > 0)
}

/// Helper for tests and tools: list archived session ids.
pub fn archived_sessions(store: &Store) -> Result<Vec<String>> {
    let conn = store.read()?;
    let mut stmt =
        conn.prepare("SELECT session_id FROM conversation_archive_sessions ORDER BY archived_at")?;
    let rows = stmt
        .query_map([], |row| row.get(0))?
        .filter_map(|r| r.ok())
        .collect();
    Ok(rows)
}

// ============================================================================
// TESTS
// ============================================================================
