//! Pulse — Cross-Session Awareness
//!
//! Read-side of the hook ingest pipeline: which assistant sessions are
//! alive, what they have been doing, and (via the transcript files) what
//! was actually said. Never writes.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Duration, Utc};
use rusqlite::OptionalExtension;
use serde::Serialize;

use crate::storage::{Result, Store};
use crate::transcript::{self, Turn};

/// Turns shown around a snippet match
const SNIPPET_WINDOW: usize = 3;

/// Display cap per turn in session context
const TURN_DISPLAY_CHARS: usize = 800;

/// How many opening turns accompany a `last_n` view
const OPENING_TURNS: usize = 3;

// ============================================================================
// TYPES
// ============================================================================

/// One tracked assistant session
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PulseSession {
    pub session_id: String,
    pub cwd: String,
    pub status: String,
    pub started_at: DateTime<Utc>,
    pub last_heartbeat: DateTime<Utc>,
    pub tool_count: i64,
    pub last_tool: String,
    pub last_tool_input: String,
    pub minutes_since_heartbeat: i64,
}

/// Active + recently-ended sessions
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PulseOverview {
    /// "ok" or "no_data"
    pub status: String,
    pub active: Vec<PulseSession>,
    pub recently_ended: Vec<PulseSession>,
}

/// One activity-log row
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ActivityRow {
    pub session_id: String,
    pub event_type: String,
    pub tool_name: String,
    pub tool_input_summary: String,
    pub timestamp: DateTime<Utc>,
}

/// Outcome of resolving a session needle
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "snake_case", tag = "status")]
pub enum SessionQuery {
    Ok {
        session: PulseSession,
        /// tool_name -> count over the activity log
        tool_usage: std::collections::BTreeMap<String, i64>,
    },
    Ambiguous {
        matches: Vec<String>,
    },
    NotFound,
}

/// Transcript context for one session
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionContext {
    /// "ok", "snippet_not_found", or "not_found"
    pub status: String,
    /// The first few turns, for orientation (last_n mode)
    pub opening: Vec<Turn>,
    pub turns: Vec<Turn>,
}

fn row_to_pulse_session(row: &rusqlite::Row<'_>, now: DateTime<Utc>) -> rusqlite::Result<PulseSession> {
    let last_heartbeat: DateTime<Utc> = row.get("last_heartbeat")?;
    Ok(PulseSession {
        session_id: row.get("session_id")?,
        cwd: row.get("cwd")?,
        status: row.get("status")?,
        started_at: row.get("started_at")?,
        last_heartbeat,
        tool_count: row.get("tool_count")?,
        last_tool: row.get("last_tool")?,
        last_tool_input: row.get("last_tool_input")?,
        minutes_since_heartbeat: (now - last_heartbeat).num_minutes().max(0),
    })
}

const PULSE_COLUMNS: &str = "session_id, cwd, started_at, last_heartbeat, status, description, tool_count, last_tool, last_tool_input";

// ============================================================================
// READERS
// ============================================================================

/// Active sessions plus sessions that ended in the last 24 h.
pub fn get_active_sessions(store: &Store) -> PulseOverview {
    let inner = || -> Result<PulseOverview> {
        let now = Utc::now();
        let conn = store.read()?;

        let mut stmt = conn.prepare(&format!(
            "SELECT {PULSE_COLUMNS} FROM claude_sessions WHERE status = 'active'
             ORDER BY last_heartbeat DESC"
        ))?;
        let active: Vec<PulseSession> = stmt
            .query_map([], |row| row_to_pulse_session(row, now))?
            .filter_map(|r| r.ok())
            .collect();

        let cutoff = (now - Duration::hours(24)).to_rfc3339();
        let mut stmt = conn.prepare(&format!(
            "SELECT {PULSE_COLUMNS} FROM claude_sessions
             WHERE status = 'ended' AND last_heartbeat > ?1
             ORDER BY last_heartbeat DESC"
        ))?;
        let recently_ended: Vec<PulseSession> = stmt
            .query_map([&cutoff], |row| row_to_pulse_session(row, now))?
            .filter_map(|r| r.ok())
            .collect();

        Ok(PulseOverview {
            status: "ok".into(),
            active,
            recently_ended,
        })
    };

    // A store the hooks never wrote to has nothing to report
    inner().unwrap_or(PulseOverview {
        status: "no_data".into(),
        active: vec![],
        recently_ended: vec![],
    })
}

/// Activity log rows, newest first, optionally scoped to one session.
pub fn get_session_activity(
    store: &Store,
    session_id: Option<&str>,
    limit: usize,
) -> Result<Vec<ActivityRow>> {
    let conn = store.read()?;
    let mut rows = Vec::new();
    match session_id {
        Some(id) => {
            let mut stmt = conn.prepare(
                "SELECT session_id, event_type, tool_name, tool_input_summary, timestamp
                 FROM session_activity_log WHERE session_id = ?1
                 ORDER BY timestamp DESC LIMIT ?2",
            )?;
            let mapped = stmt.query_map(rusqlite::params![id, limit as i64], |row| {
                Ok(ActivityRow {
                    session_id: row.get(0)?,
                    event_type: row.get(1)?,
                    tool_name: row.get(2)?,
                    tool_input_summary: row.get(3)?,
                    timestamp: row.get(4)?,
                })
            })?;
            for row in mapped {
                rows.push(row?);
            }
        }
        None => {
            let mut stmt = conn.prepare(
                "SELECT session_id, event_type, tool_name, tool_input_summary, timestamp
                 FROM session_activity_log ORDER BY timestamp DESC LIMIT ?1",
            )?;
            let mapped = stmt.query_map([limit as i64], |row| {
                Ok(ActivityRow {
                    session_id: row.get(0)?,
                    event_type: row.get(1)?,
                    tool_name: row.get(2)?,
                    tool_input_summary: row.get(3)?,
                    timestamp: row.get(4)?,
                })
            })?;
            for row in mapped {
                rows.push(row?);
            }
        }
    }
    Ok(rows)
}

/// Resolve a session needle: exact id, then unique prefix. On a hit, the
/// per-tool usage counts come along.
pub fn query_session(store: &Store, needle: &str) -> Result<SessionQuery> {
    let now = Utc::now();
    let conn = store.read()?;

    let exact = conn
        .query_row(
            &format!("SELECT {PULSE_COLUMNS} FROM claude_sessions WHERE session_id = ?1"),
            [needle],
            |row| row_to_pulse_session(row, now),
        )
        .optional()?;

    let session = match exact {
        Some(s) => s,
        None => {
            let pattern = format!("{needle}%");
            let mut stmt = conn.prepare(&format!(
                "SELECT {PULSE_COLUMNS} FROM claude_sessions WHERE session_id LIKE ?1"
            ))?;
            let matches: Vec<PulseSession> = stmt
                .query_map([&pattern], |row| row_to_pulse_session(row, now))?
                .filter_map(|r| r.ok())
                .collect();
            match matches.len() {
                0 => return Ok(SessionQuery::NotFound),
                1 => matches.into_iter().next().expect("len checked"),
                _ => {
                    return Ok(SessionQuery::Ambiguous {
                        matches: matches.into_iter().map(|s| s.session_id).collect(),
                    });
                }
            }
        }
    };

    let mut tool_usage = std::collections::BTreeMap::new();
    {
        let mut stmt = conn.prepare(
            "SELECT tool_name, COUNT(*) FROM session_activity_log
             WHERE session_id = ?1 AND tool_name != '' GROUP BY tool_name",
        )?;
        let rows = stmt.query_map([&session.session_id], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?))
        })?;
        for row in rows {
            let (tool, count) = row?;
            tool_usage.insert(tool, count);
        }
    }

    Ok(SessionQuery::Ok {
        session,
        tool_usage,
    })
}

/// Read transcript context for a session. `session` may be an id prefix;
/// the transcript file is located under `projects_dir` by that prefix.
pub fn get_session_context(
    projects_dir: &Path,
    session: &str,
    last_n: Option<usize>,
    snippet: Option<&str>,
) -> SessionContext {
    let Some(path) = find_transcript(projects_dir, session) else {
        return SessionContext {
            status: "not_found".into(),
            opening: vec![],
            turns: vec![],
        };
    };
    let Ok(parsed) = transcript::parse_file(&path) else {
        return SessionContext {
            status: "not_found".into(),
            opening: vec![],
            turns: vec![],
        };
    };

    let clipped: Vec<Turn> = parsed
        .turns
        .iter()
        .map(|t| Turn {
            role: t.role.clone(),
            text: transcript::clip(&t.text, TURN_DISPLAY_CHARS),
        })
        .collect();

    if let Some(needle) = snippet {
        let lowered = needle.to_lowercase();
        if let Some(hit) = clipped
            .iter()
            .position(|t| t.text.to_lowercase().contains(&lowered))
        {
            let start = hit.saturating_sub(SNIPPET_WINDOW);
            let end = (hit + SNIPPET_WINDOW + 1).min(clipped.len());
            return SessionContext {
                status: "ok".into(),
                opening: vec![],
                turns: clipped[start..end].to_vec(),
            };
        }
        // Snippet missing: fall back to the tail view
        let (opening, turns) = tail_view(&clipped, last_n.unwrap_or(5));
        return SessionContext {
            status: "snippet_not_found".into(),
            opening,
            turns,
        };
    }

    let (opening, turns) = tail_view(&clipped, last_n.unwrap_or(5));
    SessionContext {
        status: "ok".into(),
        opening,
        turns,
    }
}

fn tail_view(turns: &[Turn], last_n: usize) -> (Vec<Turn>, Vec<Turn>) {
    let tail_start = turns.len().saturating_sub(last_n);
    let opening = turns
        .iter()
        .take(OPENING_TURNS.min(tail_start))
        .cloned()
        .collect();
    let tail = turns[tail_start..].to_vec();
    (opening, tail)
}

/// Locate a transcript file by session-id prefix anywhere under the
/// projects directory.
fn find_transcript(projects_dir: &Path, session_prefix: &str) -> Option<PathBuf> {
    if session_prefix.is_empty() {
        return None;
    }
    for entry in walkdir::WalkDir::new(projects_dir)
        .max_depth(3)
        .into_iter()
        .filter_map(|e| e.ok())
    {
        let path = entry.path();
        if path.extension().and_then(|e| e.to_str()) != Some("jsonl") {
            continue;
        }
        if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
            if stem.starts_with(session_prefix) {
                return Some(path.to_path_buf());
            }
        }
    }
    None
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hooks::{handle_event, HookEvent};
    use tempfile::TempDir;

    fn seeded_store() -> (Store, TempDir) {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("test.store");
        // Seed through the hook path, then open the store on the same file
        handle_event(
            &path,
            &HookEvent {
                hook_event_name: "SessionStart".into(),
                session_id: "abcdef123456".into(),
                cwd: "/proj".into(),
                ..Default::default()
            },
        )
        .unwrap();
        for _ in 0..4 {
            handle_event(
                &path,
                &HookEvent {
                    hook_event_name: "PostToolUse".into(),
                    session_id: "abcdef123456".into(),
                    cwd: "/proj".into(),
                    tool_name: "Read".into(),
                    ..Default::default()
                },
            )
            .unwrap();
        }
        let store = Store::open(&path).unwrap();
        (store, dir)
    }

    #[test]
    fn test_active_sessions_includes_heartbeat_age() {
        let (store, _dir) = seeded_store();
        let overview = get_active_sessions(&store);
        assert_eq!(overview.status, "ok");
        assert_eq!(overview.active.len(), 1);
        assert_eq!(overview.active[0].tool_count, 4);
        assert!(overview.active[0].minutes_since_heartbeat <= 1);
    }

    #[test]
    fn test_query_session_exact_and_prefix() {
        let (store, _dir) = seeded_store();
        match query_session(&store, "abcdef123456").unwrap() {
            SessionQuery::Ok { tool_usage, .. } => {
                assert_eq!(tool_usage.get("Read"), Some(&4));
            }
            other => panic!("expected ok, got {other:?}"),
        }
        assert!(matches!(
            query_session(&store, "abcdef").unwrap(),
            SessionQuery::Ok { .. }
        ));
        assert!(matches!(
            query_session(&store, "zzz").unwrap(),
            SessionQuery::NotFound
        ));
    }

    #[test]
    fn test_query_session_ambiguous_prefix() {
        let (store, dir) = seeded_store();
        handle_event(
            &dir.path().join("test.store"),
            &HookEvent {
                hook_event_name: "SessionStart".into(),
                session_id: "abcdef999999".into(),
                ..Default::default()
            },
        )
        .unwrap();
        match query_session(&store, "abcdef").unwrap() {
            SessionQuery::Ambiguous { matches } => assert_eq!(matches.len(), 2),
            other => panic!("expected ambiguous, got {other:?}"),
        }
    }

    #[test]
    fn test_session_activity_scoped() {
        let (store, _dir) = seeded_store();
        let rows = get_session_activity(&store, Some("abcdef123456"), 50).unwrap();
        assert_eq!(rows.len(), 5); // start + 4 tool uses
        let rows = get_session_activity(&store, Some("nope"), 50).unwrap();
        assert!(rows.is_empty());
    }

    fn write_transcript(dir: &Path, session_id: &str, turn_texts: &[(&str, &str)]) {
        let lines: Vec<String> = turn_texts
            .iter()
            .map(|(role, text)| {
                if *role == "user" {
                    serde_json::json!({"type": "user", "message": {"content": text}}).to_string()
                } else {
                    serde_json::json!({
                        "type": "assistant",
                        "message": {"content": [{"type": "text", "text": text}]}
                    })
                    .to_string()
                }
            })
            .collect();
        std::fs::create_dir_all(dir).unwrap();
        std::fs::write(dir.join(format!("{session_id}.jsonl")), lines.join("\n")).unwrap();
    }

    #[test]
    fn test_session_context_last_n_with_opening() {
        let dir = TempDir::new().unwrap();
        let turns: Vec<(&str, String)> = (0..12)
            .map(|i| {
                (
                    if i % 2 == 0 { "user" } else { "assistant" },
                    format!("turn number {i}"),
                )
            })
            .collect();
        let turns_ref: Vec<(&str, &str)> =
            turns.iter().map(|(r, t)| (*r, t.as_str())).collect();
        write_transcript(dir.path(), "sess-ctx-0001", &turns_ref);

        let context = get_session_context(dir.path(), "sess-ctx", Some(5), None);
        assert_eq!(context.status, "ok");
        assert_eq!(context.turns.len(), 5);
        assert_eq!(context.opening.len(), 3);
        assert_eq!(context.opening[0].text, "turn number 0");
        assert_eq!(context.turns.last().unwrap().text, "turn number 11");
    }

    #[test]
    fn test_session_context_snippet_window() {
        let dir = TempDir::new().unwrap();
        let turns: Vec<(&str, String)> = (0..20)
            .map(|i| {
                let text = if i == 10 {
                    "here is the NEEDLE we want".to_string()
                } else {
                    format!("filler {i}")
                };
                ("user", text)
            })
            .collect();
        let turns_ref: Vec<(&str, &str)> =
            turns.iter().map(|(r, t)| (*r, t.as_str())).collect();
        write_transcript(dir.path(), "sess-snip-0001", &turns_ref);

        let context = get_session_context(dir.path(), "sess-snip", None, Some("needle"));
        assert_eq!(context.status, "ok");
        assert_eq!(context.turns.len(), 7); // match ± 3
        assert!(context.turns[3].text.contains("NEEDLE"));
    }

    #[test]
    fn test_session_context_snippet_fallback() {
        let dir = TempDir::new().unwrap();
        write_transcript(dir.path(), "sess-fall-0001", &[("user", "only turn")]);
        let context = get_session_context(dir.path(), "sess-fall", Some(5), Some("absent"));
        assert_eq!(context.status, "snippet_not_found");
        assert_eq!(context.turns.len(), 1);
    }

    #[test]
    fn test_session_context_missing_transcript() {
        let dir = TempDir::new().unwrap();
        let context = get_session_context(dir.path(), "ghost", None, None);
        assert_eq!(context.status, "not_found");
    }
}
