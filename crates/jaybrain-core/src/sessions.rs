//! Work Sessions
//!
//! Session rows are created by the session tools, checkpointed by the
//! pre-compaction hook, and ended explicitly or by the stale-session sweep.
//! The current session id lives in a pointer file under the data directory;
//! handoffs are human-readable markdown files.

use std::path::Path;

use chrono::{DateTime, Duration, Utc};
use rusqlite::{params, OptionalExtension};
use serde::{Deserialize, Serialize};

use crate::storage::{now_iso, short_id, Result, Store, StoreError};

// ============================================================================
// TYPES
// ============================================================================

/// A work session
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub id: String,
    pub title: String,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
    pub summary: String,
    pub decisions_made: Vec<String>,
    pub next_steps: Vec<String>,
    pub checkpoint_summary: Option<String>,
    pub checkpoint_at: Option<DateTime<Utc>>,
}

fn row_to_session(row: &rusqlite::Row<'_>) -> rusqlite::Result<Session> {
    let decisions: String = row.get("decisions_made")?;
    let next_steps: String = row.get("next_steps")?;
    Ok(Session {
        id: row.get("id")?,
        title: row.get("title")?,
        started_at: row.get("started_at")?,
        ended_at: row.get("ended_at")?,
        summary: row.get("summary")?,
        decisions_made: serde_json::from_str(&decisions).unwrap_or_default(),
        next_steps: serde_json::from_str(&next_steps).unwrap_or_default(),
        checkpoint_summary: row.get("checkpoint_summary")?,
        checkpoint_at: row.get("checkpoint_at")?,
    })
}

const SESSION_COLUMNS: &str = "id, title, started_at, ended_at, summary, decisions_made, next_steps, checkpoint_summary, checkpoint_at";

// ============================================================================
// STORE API
// ============================================================================

impl Store {
    /// Start a session and return it.
    pub fn session_start(&self, title: &str) -> Result<Session> {
        let id = short_id();
        let now = now_iso();
        {
            let conn = self.write()?;
            conn.execute(
                "INSERT INTO sessions (id, title, started_at) VALUES (?1, ?2, ?3)",
                params![id, title, now],
            )?;
        }
        self.get_session(&id)?.ok_or_else(|| StoreError::NotFound(id))
    }

    /// Fetch a session by id.
    pub fn get_session(&self, id: &str) -> Result<Option<Session>> {
        let conn = self.read()?;
        let session = conn
            .query_row(
                &format!("SELECT {SESSION_COLUMNS} FROM sessions WHERE id = ?1"),
                [id],
                |row| row_to_session(row),
            )
            .optional()?;
        Ok(session)
    }

    /// End a session with its wrap-up payload. Returns the updated row, or
    /// `None` for an unknown id.
    pub fn session_end(
        &self,
        id: &str,
        summary: &str,
        decisions_made: &[String],
        next_steps: &[String],
    ) -> Result<Option<Session>> {
        if self.get_session(id)?.is_none() {
            return Ok(None);
        }
        {
            let conn = self.write()?;
            conn.execute(
                "UPDATE sessions SET ended_at = ?1, summary = ?2, decisions_made = ?3, next_steps = ?4
                 WHERE id = ?5",
                params![
                    now_iso(),
                    summary,
                    serde_json::to_string(decisions_made).unwrap_or_else(|_| "[]".into()),
                    serde_json::to_string(next_steps).unwrap_or_else(|_| "[]".into()),
                    id,
                ],
            )?;
        }
        self.get_session(id)
    }

    /// Write a checkpoint onto a session, creating a minimal row when the id
    /// is unknown (the pre-compaction hook may fire before session_start).
    pub fn session_checkpoint(&self, id: &str, summary: &str) -> Result<Session> {
        let now = now_iso();
        {
            let conn = self.write()?;
            conn.execute(
                "INSERT INTO sessions (id, title, started_at, checkpoint_summary, checkpoint_at)
                 VALUES (?1, '', ?2, ?3, ?2)
                 ON CONFLICT(id) DO UPDATE SET
                     checkpoint_summary = excluded.checkpoint_summary,
                     checkpoint_at = excluded.checkpoint_at",
                params![id, now, summary],
            )?;
        }
        self.get_session(id)?
            .ok_or_else(|| StoreError::NotFound(id.to_string()))
    }

    /// Most recent sessions, newest first.
    pub fn recent_sessions(&self, limit: usize) -> Result<Vec<Session>> {
        let conn = self.read()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {SESSION_COLUMNS} FROM sessions ORDER BY started_at DESC LIMIT ?1"
        ))?;
        let rows = stmt
            .query_map([limit as i64], |row| row_to_session(row))?
            .filter_map(|r| r.ok())
            .collect();
        Ok(rows)
    }

    /// Auto-close open sessions older than `max_age_hours`. Returns how many
    /// were closed.
    pub fn close_stale_sessions(&self, max_age_hours: i64) -> Result<usize> {
        let cutoff = (Utc::now() - Duration::hours(max_age_hours)).to_rfc3339();
        let conn = self.write()?;
        let changed = conn.execute(
            "UPDATE sessions SET ended_at = ?1, summary = CASE WHEN summary = '' THEN 'auto-closed' ELSE summary END
             WHERE ended_at IS NULL AND started_at < ?2",
            params![now_iso(), cutoff],
        )?;
        Ok(changed)
    }
}

// ============================================================================
// POINTER FILE + HANDOFFS
// ============================================================================

/// Record the current session id in `data/.active_session`.
pub fn write_active_session(data_dir: &Path, session_id: &str) -> Result<()> {
    std::fs::create_dir_all(data_dir)?;
    std::fs::write(data_dir.join(".active_session"), session_id)?;
    Ok(())
}

/// Read the current session id, if the pointer file exists.
pub fn read_active_session(data_dir: &Path) -> Option<String> {
    let contents = std::fs::read_to_string(data_dir.join(".active_session")).ok()?;
    let trimmed = contents.trim().to_string();
    if trimmed.is_empty() { None } else { Some(trimmed) }
}

/// Clear the pointer file.
pub fn clear_active_session(data_dir: &Path) -> Result<()> {
    let path = data_dir.join(".active_session");
    if path.exists() {
        std::fs::remove_file(path)?;
    }
    Ok(())
}

/// Write a human-readable markdown handoff under `data/sessions/` and return
/// its path.
pub fn write_handoff(data_dir: &Path, session: &Session) -> Result<std::path::PathBuf> {
    let dir = data_dir.join("sessions");
    std::fs::create_dir_all(&dir)?;
    let path = dir.join(format!(
        "handoff_{}_{}.md",
        session.started_at.format("%Y%m%d"),
        session.id
    ));

    let mut doc = String::new();
    doc.push_str(&format!("# Session Handoff: {}\n\n", session.title));
    doc.push_str(&format!("- Session: `{}`\n", session.id));
    doc.push_str(&format!("- Started: {}\n", session.started_at.to_rfc3339()));
    if let Some(ended) = session.ended_at {
        doc.push_str(&format!("- Ended: {}\n", ended.to_rfc3339()));
    }
    doc.push_str("\n## Summary\n\n");
    doc.push_str(if session.summary.is_empty() { "(none)" } else { &session.summary });
    doc.push('\n');
    if !session.decisions_made.is_empty() {
        doc.push_str("\n## Decisions\n\n");
        for decision in &session.decisions_made {
            doc.push_str(&format!("- {decision}\n"));
        }
    }
    if !session.next_steps.is_empty() {
        doc.push_str("\n## Next steps\n\n");
        for step in &session.next_steps {
            doc.push_str(&format!("- {step}\n"));
        }
    }

    std::fs::write(&path, doc)?;
    Ok(path)
}

// ============================================================================
// TESTS
// ============================================================================
