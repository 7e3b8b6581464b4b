//! Git Shadow Snapshots
//!
//! Every 15 minutes the daemon walks the configured repos; any working tree
//! with tracked modifications gets a `git stash create` (which builds the
//! stash commit WITHOUT touching the tree) and the hash is recorded so
//! uncommitted work can be recovered later. libgit2 drives the status
//! check; the stash hash comes from the git binary because libgit2 has no
//! non-destructive stash.

use std::path::{Path, PathBuf};
use std::process::Command;

use git2::{Repository, StatusOptions};
use serde::Serialize;

use crate::storage::{now_iso, Result, Store, StoreError};

// ============================================================================
// TYPES
// ============================================================================

/// One recorded snapshot
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ShadowSnapshot {
    pub repo_path: String,
    pub stash_hash: String,
    pub changed_files: i64,
    pub created_at: String,
}

/// Per-repo outcome of a snapshot pass
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "snake_case", tag = "status")]
pub enum SnapshotOutcome {
    /// Dirty tree, snapshot recorded
    Snapshotted { repo: String, stash_hash: String, changed_files: usize },
    /// Clean or untracked-only tree, nothing to do
    Skipped { repo: String },
    /// Not a repo / git failed
    Failed { repo: String, error: String },
}

// ============================================================================
// SNAPSHOTTING
// ============================================================================

/// Count tracked modifications (staged or unstaged); untracked files don't
/// count — a repo with only untracked noise is skipped.
fn tracked_changes(repo: &Repository) -> std::result::Result<usize, git2::Error> {
    let mut options = StatusOptions::new();
    options.include_untracked(false).include_ignored(false);
    let statuses = repo.statuses(Some(&mut options))?;
    Ok(statuses
        .iter()
        .filter(|s| {
            s.status().intersects(
                git2::Status::WT_MODIFIED
                    | git2::Status::WT_DELETED
                    | git2::Status::WT_TYPECHANGE
                    | git2::Status::WT_RENAMED
                    | git2::Status::INDEX_NEW
                    | git2::Status::INDEX_MODIFIED
                    | git2::Status::INDEX_DELETED
                    | git2::Status::INDEX_TYPECHANGE
                    | git2::Status::INDEX_RENAMED,
            )
        })
        .count())
}

/// Snapshot one repo. Clean trees are skipped, not errors.
pub fn snapshot_repo(store: &Store, repo_path: &Path) -> Result<SnapshotOutcome> {
    let repo_display = repo_path.display().to_string();

    let repo = match Repository::open(repo_path) {
        Ok(repo) => repo,
        Err(e) => {
            return Ok(SnapshotOutcome::Failed {
                repo: repo_display,
                error: e.to_string(),
            });
        }
    };

    let changed = match tracked_changes(&repo) {
        Ok(n) => n,
        Err(e) => {
            return Ok(SnapshotOutcome::Failed {
                repo: repo_display,
                error: e.to_string(),
            });
        }
    };
    if changed == 0 {
        return Ok(SnapshotOutcome::Skipped { repo: repo_display });
    }

    // `git stash create` writes the stash commit without mutating the tree
    let output = Command::new("git")
        .arg("-C")
        .arg(repo_path)
        .args(["stash", "create"])
        .output()?;
    if !output.status.success() {
        return Ok(SnapshotOutcome::Failed {
            repo: repo_display,
            error: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        });
    }

    let stash_hash = String::from_utf8_lossy(&output.stdout).trim().to_string();
    if stash_hash.is_empty() {
        // Happens when the only changes are already staged identically
        return Ok(SnapshotOutcome::Skipped { repo: repo_display });
    }

    {
        let conn = store.write()?;
        conn.execute(
            "INSERT INTO git_shadow_snapshots (repo_path, stash_hash, changed_files, created_at)
             VALUES (?1, ?2, ?3, ?4)",
            rusqlite::params![repo_display, stash_hash, changed as i64, now_iso()],
        )?;
    }

    Ok(SnapshotOutcome::Snapshotted {
        repo: repo_display,
        stash_hash,
        changed_files: changed,
    })
}

/// Snapshot every configured repo; per-repo failures are reported, not
/// raised.
pub fn snapshot_repos(store: &Store, repos: &[PathBuf]) -> Result<Vec<SnapshotOutcome>> {
    let mut outcomes = Vec::with_capacity(repos.len());
    for repo in repos {
        match snapshot_repo(store, repo) {
            Ok(outcome) => outcomes.push(outcome),
            Err(e) => outcomes.push(SnapshotOutcome::Failed {
                repo: repo.display().to_string(),
                error: e.to_string(),
            }),
        }
    }
    Ok(outcomes)
}

/// Recent snapshots, newest first.
pub fn recent_snapshots(store: &Store, limit: usize) -> Result<Vec<ShadowSnapshot>> {
    let conn = store.read().map_err(StoreError::from)?;
    let mut stmt = conn.prepare(
        "SELECT repo_path, stash_hash, changed_files, created_at
         FROM git_shadow_snapshots ORDER BY id DESC LIMIT ?1",
    )?;
    let rows = stmt
        .query_map([limit as i64], |row| {
            Ok(ShadowSnapshot {
                repo_path: row.get(0)?,
                stash_hash: row.get(1)?,
                changed_files: row.get(2)?,
                created_at: row.get(3)?,
            })
        })?
        .filter_map(|r| r.ok())
        .collect();
    Ok(rows)
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

    /// Init a repo with one committed file
    fn init_repo(dir: &Path) -> Repository {
        let repo = Repository::init(dir).unwrap();
        std::fs::write(dir.join("tracked.txt"), "original").unwrap();
        {
            let mut index = repo.index().unwrap();
            index.add_path(Path::new("tracked.txt")).unwrap();
            index.write().unwrap();
            let tree_id = index.write_tree().unwrap();
            let tree = repo.find_tree(tree_id).unwrap();
            let sig = git2::Signature::now("test", "test@example.com").unwrap();
            repo.commit(Some("HEAD"), &sig, &sig, "initial", &tree, &[])
                .unwrap();
        }
        repo
    }

    #[test]
    fn test_clean_repo_is_skipped() {
        let (store, _store_dir) = test_store();
        let repo_dir = TempDir::new().unwrap();
        init_repo(repo_dir.path());

        let outcome = snapshot_repo(&store, repo_dir.path()).unwrap();
        assert!(matches!(outcome, SnapshotOutcome::Skipped { .. }));
    }

    #[test]
    fn test_untracked_only_repo_is_skipped() {
        let (store, _store_dir) = test_store();
        let repo_dir = TempDir::new().unwrap();
        init_repo(repo_dir.path());
        std::fs::write(repo_dir.path().join("scratch.txt"), "new file").unwrap();

        let outcome = snapshot_repo(&store, repo_dir.path()).unwrap();
        assert!(matches!(outcome, SnapshotOutcome::Skipped { .. }));
    }

    #[test]
    fn test_dirty_repo_gets_snapshot_without_touching_tree() {
        let (store, _store_dir) = test_store();
        let repo_dir = TempDir::new().unwrap();
        init_repo(repo_dir.path());
        std::fs::write(repo_dir.path().join("tracked.txt"), "modified").unwrap();

        let outcome = snapshot_repo(&store, repo_dir.path()).unwrap();
        match outcome {
            SnapshotOutcome::Snapshotted {
                stash_hash,
                changed_files,
                ..
            } => {
                assert_eq!(stash_hash.len(), 40);
                assert_eq!(changed_files, 1);
            }
            other => panic!("expected snapshot, got {other:?}"),
        }

        // The working tree is untouched
        assert_eq!(
            std::fs::read_to_string(repo_dir.path().join("tracked.txt")).unwrap(),
            "modified"
        );

        let snapshots = recent_snapshots(&store, 10).unwrap();
        assert_eq!(snapshots.len(), 1);
        assert_eq!(snapshots[0].changed_files, 1);
    }

    #[test]
    fn test_non_repo_fails_gracefully() {
        let (store, _store_dir) = test_store();
        let plain_dir = TempDir::new().unwrap();
        let outcome = snapshot_repo(&store, plain_dir.path()).unwrap();
        assert!(matches!(outcome, SnapshotOutcome::Failed { .. }));
    }
}
