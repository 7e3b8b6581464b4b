//! Trash — Soft-Delete Recycle Bin
//!
//! Deleting moves a path into `data/trash/YYYY-MM-DD/<uuid>-<basename>` and
//! records a manifest row; retention depends on the file category. Restore
//! refuses to overwrite; the sweep permanently deletes expired entries.

use std::path::{Path, PathBuf};

use chrono::{Duration, Utc};
use rusqlite::{params, OptionalExtension};
use serde::Serialize;
use sha2::{Digest, Sha256};

use crate::storage::{now_iso, short_id, Result, Store, StoreError};

// ============================================================================
// CATEGORIES & RETENTION
// ============================================================================

/// Retention in days per category.
pub fn retention_days(category: &str) -> i64 {
    match category {
        "bytecode" => 7,
        "cache" => 7,
        "build_artifact" => 14,
        "log" => 14,
        "temp" => 3,
        "source" => 30,
        _ => 14, // general
    }
}

/// Categories safe to trash automatically (still requires git-ignored and
/// untracked).
pub const AUTO_TRASH_CATEGORIES: &[&str] = &["bytecode", "cache", "build_artifact"];

/// Guess a category from the file name / extension.
pub fn categorize(path: &Path) -> &'static str {
    let name = path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or_default()
        .to_lowercase();
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or_default()
        .to_lowercase();

    if name == "__pycache__" || ext == "pyc" || ext == "pyo" {
        return "bytecode";
    }
    if name.contains("cache") || name == ".mypy_cache" || name == ".pytest_cache" {
        return "cache";
    }
    if name == "target" || name == "build" || name == "dist" || name == "node_modules"
        || ext == "o" || ext == "a" || ext == "rlib"
    {
        return "build_artifact";
    }
    if ext == "log" {
        return "log";
    }
    if ext == "tmp" || ext == "swp" || ext == "bak" || name.ends_with('~') {
        return "temp";
    }
    if matches!(
        ext.as_str(),
        "rs" | "py" | "js" | "ts" | "go" | "c" | "h" | "cpp" | "java" | "sh" | "sql" | "toml"
            | "yaml" | "yml" | "json" | "md"
    ) {
        return "source";
    }
    "general"
}

// ============================================================================
// TYPES
// ============================================================================

/// A manifest row
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TrashEntry {
    pub id: String,
    pub original_path: String,
    pub trash_path: String,
    pub category: String,
    pub size_bytes: i64,
    pub sha256: String,
    pub is_dir: bool,
    pub reason: String,
    pub auto: bool,
    pub created_at: String,
    pub expires_at: String,
}

/// Restore outcome with the collision case spelled out
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "snake_case", tag = "status")]
pub enum RestoreResult {
    Restored { path: String },
    Conflict { occupied_path: String },
    NotFound { id: String },
}

/// One scan candidate
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScanCandidate {
    pub path: String,
    pub category: String,
    pub size_bytes: i64,
    /// Auto-trashable: junk category AND git-ignored AND untracked
    pub auto_trashable: bool,
}

fn row_to_entry(row: &rusqlite::Row<'_>) -> rusqlite::Result<TrashEntry> {
    Ok(TrashEntry {
        id: row.get("id")?,
        original_path: row.get("original_path")?,
        trash_path: row.get("trash_path")?,
        category: row.get("category")?,
        size_bytes: row.get("size_bytes")?,
        sha256: row.get("sha256")?,
        is_dir: row.get::<_, i64>("is_dir")? != 0,
        reason: row.get("reason")?,
        auto: row.get::<_, i64>("auto")? != 0,
        created_at: row.get("created_at")?,
        expires_at: row.get("expires_at")?,
    })
}

const TRASH_COLUMNS: &str = "id, original_path, trash_path, category, size_bytes, sha256, is_dir, reason, auto, created_at, expires_at";

// ============================================================================
// OPERATIONS
// ============================================================================

/// Soft-delete a path into the trash. `category` overrides the guess.
pub fn trash_put(
    store: &Store,
    trash_dir: &Path,
    path: &Path,
    reason: &str,
    auto: bool,
    category: Option<&str>,
) -> Result<TrashEntry> {
    if !path.exists() {
        return Err(StoreError::NotFound(path.display().to_string()));
    }
    let metadata = std::fs::symlink_metadata(path)?;
    let is_dir = metadata.is_dir();
    let category = category.unwrap_or_else(|| categorize(path)).to_string();

    let basename = path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("unnamed");
    let id = short_id();
    let day_dir = trash_dir.join(Utc::now().format("%Y-%m-%d").to_string());
    std::fs::create_dir_all(&day_dir)?;
    let trash_path = day_dir.join(format!("{id}-{basename}"));

    let (size_bytes, sha256) = if is_dir {
        (dir_size(path), String::new())
    } else {
        let bytes = std::fs::read(path)?;
        (bytes.len() as i64, hex::encode(Sha256::digest(&bytes)))
    };

    move_path(path, &trash_path)?;

    let now = Utc::now();
    let expires = now + Duration::days(retention_days(&category));
    {
        let conn = store.write()?;
        conn.execute(
            "INSERT INTO trash_manifest
             (id, original_path, trash_path, category, size_bytes, sha256, is_dir, reason, auto, created_at, expires_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
            params![
                id,
                path.display().to_string(),
                trash_path.display().to_string(),
                category,
                size_bytes,
                sha256,
                is_dir as i64,
                reason,
                auto as i64,
                now.to_rfc3339(),
                expires.to_rfc3339(),
            ],
        )?;
    }

    get_entry(store, &id)?.ok_or_else(|| StoreError::NotFound(id))
}

/// Restore an entry to its original path. Occupied targets are a structured
/// conflict, not an overwrite.
pub fn trash_restore(store: &Store, id: &str) -> Result<RestoreResult> {
    let Some(entry) = get_entry(store, id)? else {
        return Ok(RestoreResult::NotFound { id: id.to_string() });
    };

    let original = PathBuf::from(&entry.original_path);
    if original.exists() {
        return Ok(RestoreResult::Conflict {
            occupied_path: entry.original_path,
        });
    }
    if let Some(parent) = original.parent() {
        std::fs::create_dir_all(parent)?;
    }
    move_path(Path::new(&entry.trash_path), &original)?;

    let conn = store.write()?;
    conn.execute("DELETE FROM trash_manifest WHERE id = ?1", [id])?;
    Ok(RestoreResult::Restored {
        path: original.display().to_string(),
    })
}

/// All manifest entries, newest first.
pub fn trash_list(store: &Store) -> Result<Vec<TrashEntry>> {
    let conn = store.read()?;
    let mut stmt = conn.prepare(&format!(
        "SELECT {TRASH_COLUMNS} FROM trash_manifest ORDER BY created_at DESC"
    ))?;
    let rows = stmt
        .query_map([], |row| row_to_entry(row))?
        .filter_map(|r| r.ok())
        .collect();
    Ok(rows)
}

/// Permanently delete entries past their retention. Returns how many were
/// purged.
pub fn sweep_expired(store: &Store) -> Result<usize> {
    let now = Utc::now().to_rfc3339();
    let expired: Vec<TrashEntry> = {
        let conn = store.read()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {TRASH_COLUMNS} FROM trash_manifest WHERE expires_at <= ?1"
        ))?;
        stmt.query_map([&now], |row| row_to_entry(row))?
            .filter_map(|r| r.ok())
            .collect()
    };

    let mut purged = 0;
    for entry in expired {
        let trash_path = PathBuf::from(&entry.trash_path);
        let removal = if entry.is_dir {
            std::fs::remove_dir_all(&trash_path)
        } else {
            std::fs::remove_file(&trash_path)
        };
        match removal {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => {
                tracing::warn!("Failed to purge {}: {}", entry.trash_path, e);
                continue;
            }
        }
        let conn = store.write()?;
        conn.execute("DELETE FROM trash_manifest WHERE id = ?1", [&entry.id])?;
        purged += 1;
    }
    Ok(purged)
}

/// Walk a directory and classify trash candidates. A candidate is
/// auto-trashable only when its category is junk AND git ignores it AND git
/// does not track it.
pub fn scan_files(root: &Path, limit: usize) -> Result<Vec<ScanCandidate>> {
    let repo = git2::Repository::discover(root).ok();
    let mut candidates = Vec::new();

    for entry in walkdir::WalkDir::new(root)
        .min_depth(1)
        .max_depth(6)
        .into_iter()
        .filter_entry(|e| e.file_name().to_str() != Some(".git"))
        .filter_map(|e| e.ok())
    {
        if candidates.len() >= limit {
            break;
        }
        let path = entry.path();
        let category = categorize(path);
        if category == "source" {
            continue;
        }
        // Only leaf files and junk directories are candidates
        if entry.file_type().is_dir()
            && !AUTO_TRASH_CATEGORIES.contains(&category)
        {
            continue;
        }

        let junk = AUTO_TRASH_CATEGORIES.contains(&category);
        let auto_trashable = junk
            && repo
                .as_ref()
                .map(|r| git_ignored_and_untracked(r, path))
                .unwrap_or(false);

        let size_bytes = if entry.file_type().is_dir() {
            dir_size(path)
        } else {
            entry.metadata().map(|m| m.len() as i64).unwrap_or(0)
        };

        candidates.push(ScanCandidate {
            path: path.display().to_string(),
            category: category.to_string(),
            size_bytes,
            auto_trashable,
        });
    }
    Ok(candidates)
}

fn git_ignored_and_untracked(repo: &git2::Repository, path: &Path) -> bool {
    let Some(workdir) = repo.workdir() else {
        return false;
    };
    let Ok(relative) = path.strip_prefix(workdir) else {
        return false;
    };
    let ignored = repo.is_path_ignored(relative).unwrap_or(false);
    if !ignored {
        return false;
    }
    // A tracked path is never auto-trashable, ignored or not
    let tracked = repo
        .status_file(relative)
        .map(|s| !s.contains(git2::Status::WT_NEW) && !s.contains(git2::Status::IGNORED))
        .unwrap_or(false);
    !tracked
}

fn get_entry(store: &Store, id: &str) -> Result<Option<TrashEntry>> {
    let conn = store.read()?;
    let entry = conn
        .query_row(
            &format!("SELECT {TRASH_COLUMNS} FROM trash_manifest WHERE id = ?1"),
            [id],
            |row| row_to_entry(row),
        )
        .optional()?;
    Ok(entry)
}

fn dir_size(path: &Path) -> i64 {
    walkdir::WalkDir::new(path)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter_map(|e| e.metadata().ok())
        .filter(|m| m.is_file())
        .map(|m| m.len() as i64)
        .sum()
}

/// Rename, falling back to copy+delete for cross-device moves of files.
fn move_path(from: &Path, to: &Path) -> std::io::Result<()> {
    match std::fs::rename(from, to) {
        Ok(()) => Ok(()),
        Err(_) if from.is_file() => {
            std::fs::copy(from, to)?;
            std::fs::remove_file(from)
        }
        Err(e) => Err(e),
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn test_store() -> (Store, TempDir) {
        let dir = TempDir::new().unwrap();
        let store = Store::open(dir.path().join("test.store")).unwrap();
        (store, dir)
    }

    #[test]
    fn test_categorize() {
        assert_eq!(categorize(Path::new("mod.pyc")), "bytecode");
        assert_eq!(categorize(Path::new("__pycache__")), "bytecode");
        assert_eq!(categorize(Path::new(".pytest_cache")), "cache");
        assert_eq!(categorize(Path::new("target")), "build_artifact");
        assert_eq!(categorize(Path::new("app.log")), "log");
        assert_eq!(categorize(Path::new("scratch.tmp")), "temp");
        assert_eq!(categorize(Path::new("main.rs")), "source");
        assert_eq!(categorize(Path::new("photo.jpg")), "general");
    }

    #[test]
    fn test_retention_by_category() {
        assert_eq!(retention_days("bytecode"), 7);
        assert_eq!(retention_days("temp"), 3);
        assert_eq!(retention_days("source"), 30);
        assert_eq!(retention_days("whatever"), 14);
    }

    #[test]
    fn test_put_moves_file_and_records_manifest() {
        let (store, dir) = test_store();
        let trash = dir.path().join("trash");
        let victim = dir.path().join("notes.log");
        std::fs::write(&victim, "log contents").unwrap();

        let entry = trash_put(&store, &trash, &victim, "cleanup", false, None).unwrap();
        assert!(!victim.exists());
        assert!(Path::new(&entry.trash_path).exists());
        assert_eq!(entry.category, "log");
        assert_eq!(entry.size_bytes, 12);
        assert!(!entry.sha256.is_empty());
        assert!(!entry.is_dir);
    }

    #[test]
    fn test_restore_roundtrip() {
        let (store, dir) = test_store();
        let trash = dir.path().join("trash");
        let victim = dir.path().join("keep.md");
        std::fs::write(&victim, "# doc").unwrap();

        let entry = trash_put(&store, &trash, &victim, "", false, None).unwrap();
        let result = trash_restore(&store, &entry.id).unwrap();
        assert!(matches!(result, RestoreResult::Restored { .. }));
        assert_eq!(std::fs::read_to_string(&victim).unwrap(), "# doc");
        assert!(trash_list(&store).unwrap().is_empty());
    }

    #[test]
    fn test_restore_conflict_when_occupied() {
        let (store, dir) = test_store();
        let trash = dir.path().join("trash");
        let victim = dir.path().join("busy.txt");
        std::fs::write(&victim, "v1").unwrap();

        let entry = trash_put(&store, &trash, &victim, "", false, None).unwrap();
        // Someone recreates the path before the restore
        std::fs::write(&victim, "v2").unwrap();

        let result = trash_restore(&store, &entry.id).unwrap();
        assert!(matches!(result, RestoreResult::Conflict { .. }));
        assert_eq!(std::fs::read_to_string(&victim).unwrap(), "v2");
    }

    #[test]
    fn test_restore_unknown_id() {
        let (store, _dir) = test_store();
        assert!(matches!(
            trash_restore(&store, "missing").unwrap(),
            RestoreResult::NotFound { .. }
        ));
    }

    #[test]
    fn test_sweep_only_purges_expired() {
        let (store, dir) = test_store();
        let trash = dir.path().join("trash");
        let victim = dir.path().join("old.tmp");
        std::fs::write(&victim, "x").unwrap();
        let entry = trash_put(&store, &trash, &victim, "", true, None).unwrap();

        // Nothing expired yet
        assert_eq!(sweep_expired(&store).unwrap(), 0);

        {
            let conn = store.write().unwrap();
            conn.execute(
                "UPDATE trash_manifest SET expires_at = ?1 WHERE id = ?2",
                params![(Utc::now() - Duration::days(1)).to_rfc3339(), entry.id],
            )
            .unwrap();
        }
        assert_eq!(sweep_expired(&store).unwrap(), 1);
        assert!(!Path::new(&entry.trash_path).exists());
        assert!(trash_list(&store).unwrap().is_empty());
    }

    #[test]
    fn test_put_directory() {
        let (store, dir) = test_store();
        let trash = dir.path().join("trash");
        let victim = dir.path().join("__pycache__");
        std::fs::create_dir(&victim).unwrap();
        std::fs::write(victim.join("m.pyc"), "bytecode").unwrap();

        let entry = trash_put(&store, &trash, &victim, "", true, None).unwrap();
        assert!(entry.is_dir);
        assert_eq!(entry.category, "bytecode");
        assert_eq!(entry.size_bytes, 8);
        assert!(!victim.exists());
    }

    #[test]
    fn test_scan_skips_source_files() {
        let (_store, dir) = test_store();
        std::fs::write(dir.path().join("main.rs"), "fn main() {}").unwrap();
        std::fs::write(dir.path().join("debug.log"), "log").unwrap();

        let candidates = scan_files(dir.path(), 100).unwrap();
        assert!(candidates.iter().all(|c| !c.path.ends_with("main.rs")));
        let log = candidates.iter().find(|c| c.path.ends_with("debug.log"));
        assert!(log.is_some());
        // Not a junk category, so never auto-trashable
        assert!(!log.unwrap().auto_trashable);
    }
}
