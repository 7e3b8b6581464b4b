//! Hook Ingestion
//!
//! The write-only fast path invoked by the assistant host on every tool
//! call. Budget is <1 s typical, 5 s hard ceiling, so this module opens its
//! own bare connection — no migrations, no vector index, no embedding model.
//! The hook binary wraps [`handle_event`] and never propagates errors to the
//! host.

use std::path::Path;

use chrono::{Duration, Utc};
use rand::Rng;
use rusqlite::{params, Connection};
use serde::Deserialize;
use serde_json::Value;

use crate::storage::now_iso;

// ============================================================================
// CONSTANTS
// ============================================================================

/// Fields worth surfacing in the activity log, most informative first
const PRIORITY_INPUT_KEYS: &[&str] = &[
    "command",
    "query",
    "prompt",
    "file_path",
    "pattern",
    "url",
    "description",
    "task_id",
    "skill",
    "content",
];

/// Per-field cap in the tool-input summary
const FIELD_MAX_CHARS: usize = 100;

/// Overall cap on the tool-input summary
const SUMMARY_MAX_CHARS: usize = 200;

/// Activity rows and silent sessions older than this get pruned
const PRUNE_AFTER_HOURS: i64 = 48;

/// Roughly 1-in-N hook invocations run the pruning pass
const PRUNE_DICE: u32 = 50;

/// Lock retry schedule: 3 tries with exponential backoff
const LOCK_RETRY_DELAYS_MS: &[u64] = &[100, 200, 400];

// ============================================================================
// TYPES
// ============================================================================

/// Hook error type
#[non_exhaustive]
#[derive(Debug, thiserror::Error)]
pub enum HookError {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Bad event: {0}")]
    BadEvent(String),
}

/// An inbound hook event, as the host sends it
#[derive(Debug, Clone, Default, Deserialize)]
pub struct HookEvent {
    #[serde(default)]
    pub hook_event_name: String,
    #[serde(default)]
    pub session_id: String,
    #[serde(default)]
    pub cwd: String,
    #[serde(default)]
    pub tool_name: String,
    #[serde(default)]
    pub tool_input: Option<Value>,
}

/// Tables the hook path needs; kept in sync with the main migration chain
/// but creatable standalone so a hook can fire before the store ever opened.
const HOOK_SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS claude_sessions (
    session_id TEXT PRIMARY KEY,
    cwd TEXT NOT NULL DEFAULT '',
    started_at TEXT NOT NULL,
    last_heartbeat TEXT NOT NULL,
    status TEXT NOT NULL DEFAULT 'active',
    description TEXT NOT NULL DEFAULT '',
    tool_count INTEGER NOT NULL DEFAULT 0,
    last_tool TEXT NOT NULL DEFAULT '',
    last_tool_input TEXT NOT NULL DEFAULT ''
);

CREATE TABLE IF NOT EXISTS session_activity_log (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    session_id TEXT NOT NULL,
    event_type TEXT NOT NULL,
    tool_name TEXT NOT NULL DEFAULT '',
    tool_input_summary TEXT NOT NULL DEFAULT '',
    timestamp TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_sal_session ON session_activity_log(session_id);
CREATE INDEX IF NOT EXISTS idx_sal_timestamp ON session_activity_log(timestamp);

CREATE TABLE IF NOT EXISTS sessions (
    id TEXT PRIMARY KEY,
    title TEXT NOT NULL DEFAULT '',
    started_at TEXT NOT NULL,
    ended_at TEXT,
    summary TEXT NOT NULL DEFAULT '',
    decisions_made TEXT NOT NULL DEFAULT '[]',
    next_steps TEXT NOT NULL DEFAULT '[]',
    checkpoint_summary TEXT,
    checkpoint_at TEXT
);
"#;

// ============================================================================
// ENTRY POINT
// ============================================================================

/// Handle one raw hook event. Empty input is a no-op. Retries the whole
/// write on "database is locked" with exponential backoff.
pub fn handle_raw(db_path: &Path, raw: &str) -> Result<(), HookError> {
    if raw.trim().is_empty() {
        return Ok(());
    }
    let event: HookEvent = serde_json::from_str(raw)
        .map_err(|e| HookError::BadEvent(format!("unparseable event: {e}")))?;

    let mut last_err: Option<HookError> = None;
    for (attempt, delay_ms) in std::iter::once(&0u64)
        .chain(LOCK_RETRY_DELAYS_MS.iter())
        .enumerate()
    {
        if attempt > 0 {
            std::thread::sleep(std::time::Duration::from_millis(*delay_ms));
        }
        match handle_event(db_path, &event) {
            Ok(()) => return Ok(()),
            Err(HookError::Database(e)) if is_locked(&e) => {
                last_err = Some(HookError::Database(e));
            }
            Err(other) => return Err(other),
        }
    }
    Err(last_err.unwrap_or_else(|| HookError::BadEvent("retries exhausted".into())))
}

fn is_locked(e: &rusqlite::Error) -> bool {
    matches!(
        e.sqlite_error_code(),
        Some(rusqlite::ErrorCode::DatabaseBusy) | Some(rusqlite::ErrorCode::DatabaseLocked)
    )
}

/// Dispatch a parsed event.
pub fn handle_event(db_path: &Path, event: &HookEvent) -> Result<(), HookError> {
    let conn = open_hook_connection(db_path)?;
    let now = now_iso();

    match event.hook_event_name.as_str() {
        "SessionStart" => {
            conn.execute(
                "INSERT OR REPLACE INTO claude_sessions
                 (session_id, cwd, started_at, last_heartbeat, status, description, tool_count, last_tool, last_tool_input)
                 VALUES (?1, ?2, ?3, ?3, 'active', '', 0, '', '')",
                params![event.session_id, event.cwd, now],
            )?;
            conn.execute(
                "INSERT INTO session_activity_log (session_id, event_type, timestamp)
                 VALUES (?1, 'session_start', ?2)",
                params![event.session_id, now],
            )?;
        }
        "PostToolUse" | "PostToolUseFailure" => {
            let summary = summarize_tool_input(event.tool_input.as_ref());
            let event_type = if event.hook_event_name == "PostToolUse" {
                "tool_use"
            } else {
                "tool_failure"
            };
            // Upsert handles the case where SessionStart was missed
            conn.execute(
                "INSERT INTO claude_sessions
                 (session_id, cwd, started_at, last_heartbeat, status, tool_count, last_tool, last_tool_input)
                 VALUES (?1, ?2, ?3, ?3, 'active', 1, ?4, ?5)
                 ON CONFLICT(session_id) DO UPDATE SET
                     last_heartbeat = excluded.last_heartbeat,
                     tool_count = tool_count + 1,
                     last_tool = excluded.last_tool,
                     last_tool_input = excluded.last_tool_input,
                     status = 'active'",
                params![event.session_id, event.cwd, now, event.tool_name, summary],
            )?;
            conn.execute(
                "INSERT INTO session_activity_log (session_id, event_type, tool_name, tool_input_summary, timestamp)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![event.session_id, event_type, event.tool_name, summary, now],
            )?;
        }
        "SessionEnd" => {
            conn.execute(
                "UPDATE claude_sessions SET status = 'ended', last_heartbeat = ?1
                 WHERE session_id = ?2",
                params![now, event.session_id],
            )?;
            conn.execute(
                "INSERT INTO session_activity_log (session_id, event_type, timestamp)
                 VALUES (?1, 'session_end', ?2)",
                params![event.session_id, now],
            )?;
        }
        // Stop fires after every response: heartbeat only, no log row
        "Stop" => {
            conn.execute(
                "UPDATE claude_sessions SET last_heartbeat = ?1 WHERE session_id = ?2",
                params![now, event.session_id],
            )?;
        }
        "PreCompact" => {
            handle_precompact(&conn, event, &now)?;
        }
        other => {
            return Err(HookError::BadEvent(format!("unknown hook event '{other}'")));
        }
    }

    // Prune old data occasionally
    if rand::thread_rng().gen_range(1..=PRUNE_DICE) == 1 {
        prune_old_activity(&conn)?;
    }

    Ok(())
}

/// Snapshot working state into the session checkpoint columns before the
/// host compresses its context.
fn handle_precompact(conn: &Connection, event: &HookEvent, now: &str) -> Result<(), HookError> {
    if event.session_id.is_empty() {
        return Ok(());
    }

    let mut summary_parts = vec![format!("PreCompact triggered at {now}")];
    if !event.cwd.is_empty() {
        summary_parts.push(format!("Working directory: {}", event.cwd));
    }

    // Recent tool activity gives the checkpoint some context
    let recent_tools: Vec<String> = {
        let mut stmt = conn.prepare(
            "SELECT tool_name FROM session_activity_log
             WHERE session_id = ?1 AND tool_name != ''
             ORDER BY timestamp DESC LIMIT 5",
        )?;
        stmt.query_map([&event.session_id], |row| row.get(0))?
            .filter_map(|r| r.ok())
            .collect()
    };
    if !recent_tools.is_empty() {
        summary_parts.push(format!("Recent tools: {}", recent_tools.join(", ")));
    }

    let checkpoint_summary = summary_parts.join(". ");
    conn.execute(
        "INSERT INTO sessions (id, title, started_at, checkpoint_summary, checkpoint_at)
         VALUES (?1, 'auto-checkpoint', ?2, ?3, ?2)
         ON CONFLICT(id) DO UPDATE SET
             checkpoint_summary = excluded.checkpoint_summary,
             checkpoint_at = excluded.checkpoint_at",
        params![event.session_id, now, checkpoint_summary],
    )?;
    Ok(())
}

// ============================================================================
// HELPERS
// ============================================================================

/// Open the dedicated hook connection: WAL, 10 s busy timeout, and just the
/// tables this path touches.
pub fn open_hook_connection(db_path: &Path) -> Result<Connection, HookError> {
    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let conn = Connection::open(db_path)?;
    conn.execute_batch(
        "PRAGMA journal_mode = WAL;
         PRAGMA synchronous = NORMAL;
         PRAGMA busy_timeout = 10000;",
    )?;
    conn.execute_batch(HOOK_SCHEMA)?;
    Ok(conn)
}

/// Compact, best-effort summary of a tool input for the activity log.
pub fn summarize_tool_input(tool_input: Option<&Value>) -> String {
    let Some(Value::Object(map)) = tool_input else {
        return String::new();
    };

    let mut parts: Vec<String> = Vec::new();
    for key in PRIORITY_INPUT_KEYS {
        if let Some(value) = map.get(*key) {
            let mut text = match value {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            };
            if text.chars().count() > FIELD_MAX_CHARS {
                text = format!(
                    "{}...",
                    text.chars().take(FIELD_MAX_CHARS - 3).collect::<String>()
                );
            }
            parts.push(format!("{key}={text}"));
            if parts.join(", ").chars().count() > SUMMARY_MAX_CHARS {
                break;
            }
        }
    }

    if parts.is_empty() {
        // Fallback: just name the first few keys
        parts = map.keys().take(4).map(|k| format!("{k}=...")).collect();
    }

    let joined = parts.join(", ");
    joined.chars().take(SUMMARY_MAX_CHARS).collect()
}

/// Delete activity rows older than the window and mark silent sessions
/// ended.
pub fn prune_old_activity(conn: &Connection) -> Result<(), HookError> {
    let cutoff = (Utc::now() - Duration::hours(PRUNE_AFTER_HOURS)).to_rfc3339();
    conn.execute(
        "DELETE FROM session_activity_log WHERE timestamp < ?1",
        [&cutoff],
    )?;
    conn.execute(
        "UPDATE claude_sessions SET status = 'ended'
         WHERE status = 'active' AND last_heartbeat < ?1",
        [&cutoff],
    )?;
    Ok(())
}

// ============================================================================
// TESTS
// ============================================================================
