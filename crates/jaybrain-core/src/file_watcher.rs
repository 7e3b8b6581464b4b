//! File-Deletion Watcher
//!
//! A continuously running filesystem watcher under the configured roots.
//! Deletions (minus the ignore globs: bytecode dirs, git object churn,
//! node_modules, editor droppings) land in `file_deletion_log`.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use globset::{Glob, GlobSet, GlobSetBuilder};
use notify::{Event, EventKind, RecursiveMode, Watcher};
use tokio::sync::watch;

use crate::storage::{now_iso, Result, Store, StoreError};

/// Glob patterns the watcher never logs
pub const IGNORE_GLOBS: &[&str] = &[
    "**/__pycache__/**",
    "**/*.pyc",
    "**/.git/objects/**",
    "**/.git/index.lock",
    "**/node_modules/**",
    "**/target/**",
    "**/*.swp",
    "**/*.swx",
    "**/*~",
    "**/*.tmp",
];

/// Build the ignore matcher.
pub fn ignore_set() -> GlobSet {
    let mut builder = GlobSetBuilder::new();
    for pattern in IGNORE_GLOBS {
        if let Ok(glob) = Glob::new(pattern) {
            builder.add(glob);
        }
    }
    builder.build().unwrap_or_else(|_| GlobSet::empty())
}

/// Record one deletion, applying the ignore globs.
pub fn log_deletion(store: &Store, ignore: &GlobSet, path: &Path, is_dir: bool) -> Result<bool> {
    if ignore.is_match(path) {
        return Ok(false);
    }
    let filename = path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or_default();
    let event_type = if is_dir { "dir_deleted" } else { "file_deleted" };

    let conn = store.write()?;
    conn.execute(
        "INSERT INTO file_deletion_log (path, filename, event_type, pid, timestamp)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        rusqlite::params![
            path.display().to_string(),
            filename,
            event_type,
            std::process::id() as i64,
            now_iso(),
        ],
    )?;
    Ok(true)
}

/// Recent deletion log rows as `(path, event_type, timestamp)`.
pub fn recent_deletions(store: &Store, limit: usize) -> Result<Vec<(String, String, String)>> {
    let conn = store.read()?;
    let mut stmt = conn.prepare(
        "SELECT path, event_type, timestamp FROM file_deletion_log
         ORDER BY id DESC LIMIT ?1",
    )?;
    let rows = stmt
        .query_map([limit as i64], |row| {
            Ok((row.get(0)?, row.get(1)?, row.get(2)?))
        })?
        .filter_map(|r| r.ok())
        .collect();
    Ok(rows)
}

/// Run the watcher until the shutdown signal flips. Spawned by the daemon as
/// its one continuous module.
pub async fn run_watcher(
    store: Arc<Store>,
    roots: Vec<PathBuf>,
    mut shutdown: watch::Receiver<bool>,
) -> Result<()> {
    let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel::<Event>();

    let mut watcher = notify::recommended_watcher(move |result: notify::Result<Event>| {
        if let Ok(event) = result {
            let _ = tx.send(event);
        }
    })
    .map_err(|e| StoreError::Init(format!("watcher init: {e}")))?;

    for root in &roots {
        if let Err(e) = watcher.watch(root, RecursiveMode::Recursive) {
            tracing::warn!("Cannot watch {}: {}", root.display(), e);
        }
    }

    let ignore = ignore_set();
    loop {
        tokio::select! {
            maybe_event = rx.recv() => {
                let Some(event) = maybe_event else { break };
                if !matches!(event.kind, EventKind::Remove(_)) {
                    continue;
                }
                let is_dir = matches!(
                    event.kind,
                    EventKind::Remove(notify::event::RemoveKind::Folder)
                );
                for path in &event.paths {
                    if let Err(e) = log_deletion(&store, &ignore, path, is_dir) {
                        tracing::warn!("Failed to log deletion of {}: {}", path.display(), e);
                    }
                }
            }
            _ = shutdown.changed() => break,
        }
    }
    Ok(())
}

// ============================================================================
// TESTS
// ============================================================================
