//! Scheduler Daemon
//!
//! The singleton background process that owns all recurring work. Startup
//! enforces single-instance discipline twice: an exclusive lock file with
//! PID-liveness stale detection, then the `daemon_state` row. Jobs register
//! with an interval or cron trigger; each runs under its own mutex (no
//! self-overlap), a hard timeout, and a catch-all so a failing job never
//! takes the daemon down.

use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration as StdDuration;

use chrono::Utc;
use fs2::FileExt;
use rusqlite::{params, OptionalExtension};
use serde::Serialize;
use tokio::sync::{watch, Mutex as AsyncMutex};

use crate::config::Config;
use crate::notify::Notifier;
use crate::storage::{now_iso, Result as StoreResult, Store};

// ============================================================================
// CONSTANTS
// ============================================================================

/// Daemon heartbeat cadence
pub const HEARTBEAT_INTERVAL_SECS: u64 = 30;

/// Default per-job timeout
pub const JOB_TIMEOUT_SECS: u64 = 300;

// ============================================================================
// ERROR TYPES
// ============================================================================

/// Daemon error type
#[non_exhaustive]
#[derive(Debug, thiserror::Error)]
pub enum DaemonError {
    /// Another live daemon owns the lock / state row
    #[error("Startup refused: daemon already running as PID {rival_pid}")]
    StartupRefused { rival_pid: i64 },
    /// Store failure
    #[error("Store error: {0}")]
    Store(#[from] crate::storage::StoreError),
    /// Lock file failure
    #[error("Lock error: {0}")]
    Lock(String),
    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    /// Bad cron expression
    #[error("Bad trigger: {0}")]
    BadTrigger(String),
}

/// Daemon result type
pub type Result<T> = std::result::Result<T, DaemonError>;

// ============================================================================
// PID LIVENESS
// ============================================================================

/// Whether a PID refers to a live process.
#[cfg(unix)]
pub fn pid_alive(pid: i64) -> bool {
    if pid <= 0 {
        return false;
    }
    // Signal 0 probes without sending; EPERM still means the process exists
    let rc = unsafe { libc::kill(pid as libc::pid_t, 0) };
    rc == 0 || std::io::Error::last_os_error().raw_os_error() == Some(libc::EPERM)
}

#[cfg(not(unix))]
pub fn pid_alive(_pid: i64) -> bool {
    false
}

/// Ask a process to terminate (SIGTERM). Returns whether the signal was
/// delivered.
#[cfg(unix)]
pub fn terminate_pid(pid: i64) -> bool {
    if pid <= 0 {
        return false;
    }
    unsafe { libc::kill(pid as libc::pid_t, libc::SIGTERM) == 0 }
}

#[cfg(not(unix))]
pub fn terminate_pid(_pid: i64) -> bool {
    false
}

// ============================================================================
// LOCK FILE
// ============================================================================

/// The held daemon lock: an exclusive flock on the PID-bearing lock file.
/// Released (and the file removed) on [`DaemonLock::release`] or drop.
pub struct DaemonLock {
    file: File,
    path: PathBuf,
    released: bool,
}

impl DaemonLock {
    /// Acquire the lock, cleaning up a stale lock left by a dead PID.
    pub fn acquire(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)?;

        if file.try_lock_exclusive().is_err() {
            // A live process holds the flock; name it from the file contents
            let rival_pid = read_pid(&mut file).unwrap_or(0);
            return Err(DaemonError::StartupRefused { rival_pid });
        }

        // We hold the flock. A non-empty file is a leftover from a crash;
        // refuse anyway if that PID is somehow still alive.
        if let Some(stale_pid) = read_pid(&mut file) {
            if pid_alive(stale_pid) && stale_pid != std::process::id() as i64 {
                fs2::FileExt::unlock(&file)
                    .map_err(|e| DaemonError::Lock(e.to_string()))?;
                return Err(DaemonError::StartupRefused { rival_pid: stale_pid });
            }
            tracing::info!("Removing stale daemon lock left by PID {}", stale_pid);
        }

        file.set_len(0)?;
        file.rewind()?;
        write!(file, "{}", std::process::id())?;
        file.flush()?;

        Ok(Self {
            file,
            path: path.to_path_buf(),
            released: false,
        })
    }

    /// Release the lock and remove the file.
    pub fn release(&mut self) {
        if self.released {
            return;
        }
        self.released = true;
        let _ = fs2::FileExt::unlock(&self.file);
        let _ = std::fs::remove_file(&self.path);
    }
}

impl Drop for DaemonLock {
    fn drop(&mut self) {
        self.release();
    }
}

fn read_pid(file: &mut File) -> Option<i64> {
    let mut contents = String::new();
    file.rewind().ok()?;
    file.read_to_string(&mut contents).ok()?;
    contents.trim().parse().ok()
}

// ============================================================================
// JOB REGISTRY
// ============================================================================

/// When a job fires
pub enum Trigger {
    /// Every N
    Interval(StdDuration),
    /// Cron schedule (seconds-resolution expression)
    Cron(cron::Schedule),
}

impl Trigger {
    /// Parse a cron expression trigger.
    pub fn cron(expr: &str) -> Result<Self> {
        use std::str::FromStr;
        cron::Schedule::from_str(expr)
            .map(Trigger::Cron)
            .map_err(|e| DaemonError::BadTrigger(format!("{expr}: {e}")))
    }

    /// Delay until the next firing.
    fn next_delay(&self) -> StdDuration {
        match self {
            Trigger::Interval(d) => *d,
            Trigger::Cron(schedule) => schedule
                .upcoming(Utc)
                .next()
                .map(|next| {
                    (next - Utc::now())
                        .to_std()
                        .unwrap_or(StdDuration::from_secs(1))
                })
                .unwrap_or(StdDuration::from_secs(3600)),
        }
    }
}

/// Shared dependencies handed to every job
#[derive(Clone)]
pub struct JobDeps {
    pub store: Arc<Store>,
    pub notifier: Arc<dyn Notifier>,
    pub config: Arc<Config>,
}

type JobFn = Arc<dyn Fn(&JobDeps) -> std::result::Result<(), String> + Send + Sync>;

/// A registered job
struct JobSpec {
    name: String,
    description: String,
    trigger: Trigger,
    callable: JobFn,
    /// Guards against self-overlap
    running: Arc<AsyncMutex<()>>,
}

// ============================================================================
// DAEMON
// ============================================================================

/// The daemon: lock + registry + scheduler loops.
pub struct Daemon {
    deps: JobDeps,
    jobs: Vec<JobSpec>,
    lock: DaemonLock,
    shutdown_tx: watch::Sender<bool>,
}

impl Daemon {
    /// Start the daemon: acquire the lock, verify and claim `daemon_state`.
    /// Refusals are recorded in the lifecycle log before returning.
    pub fn start(
        store: Arc<Store>,
        notifier: Arc<dyn Notifier>,
        config: Arc<Config>,
    ) -> Result<Self> {
        let lock_path = config.daemon_lock_file();
        let lock = match DaemonLock::acquire(&lock_path) {
            Ok(lock) => lock,
            Err(DaemonError::StartupRefused { rival_pid }) => {
                log_lifecycle(
                    &store,
                    "startup_refused",
                    &format!("lock held by PID {rival_pid}"),
                );
                return Err(DaemonError::StartupRefused { rival_pid });
            }
            Err(other) => return Err(other),
        };

        // Second gate: the daemon_state row
        let recorded = read_daemon_state(&store)?;
        let our_pid = std::process::id() as i64;
        if let Some((pid, status)) = recorded {
            if status == "running" && pid != our_pid && pid_alive(pid) {
                log_lifecycle(
                    &store,
                    "startup_refused",
                    &format!("daemon_state claims running PID {pid}"),
                );
                return Err(DaemonError::StartupRefused { rival_pid: pid });
            }
        }

        {
            let conn = store.write()?;
            conn.execute(
                "INSERT INTO daemon_state (id, pid, started_at, last_heartbeat, modules, status)
                 VALUES (1, ?1, ?2, ?2, '[]', 'running')
                 ON CONFLICT(id) DO UPDATE SET
                     pid = excluded.pid,
                     started_at = excluded.started_at,
                     last_heartbeat = excluded.last_heartbeat,
                     modules = excluded.modules,
                     status = 'running'",
                params![our_pid, now_iso()],
            )?;
        }
        log_lifecycle(&store, "started", &format!("PID {our_pid}"));

        let (shutdown_tx, _) = watch::channel(false);
        Ok(Self {
            deps: JobDeps {
                store,
                notifier,
                config,
            },
            jobs: Vec::new(),
            lock,
            shutdown_tx,
        })
    }

    /// Register a job.
    pub fn register<F>(&mut self, name: &str, description: &str, trigger: Trigger, callable: F)
    where
        F: Fn(&JobDeps) -> std::result::Result<(), String> + Send + Sync + 'static,
    {
        self.jobs.push(JobSpec {
            name: name.to_string(),
            description: description.to_string(),
            trigger,
            callable: Arc::new(callable),
            running: Arc::new(AsyncMutex::new(())),
        });
    }

    /// Register the standard job set.
    pub fn register_default_jobs(&mut self) -> Result<()> {
        // Heartbeat checks
        self.register(
            "forge_study_morning",
            "Morning study nudge",
            Trigger::cron("0 0 8 * * *")?,
            |deps| {
                crate::heartbeat::check_forge_study_morning(
                    &deps.store,
                    deps.notifier.as_ref(),
                    &deps.config,
                )
                .map(|_| ())
                .map_err(|e| e.to_string())
            },
        );
        self.register(
            "forge_study_evening",
            "Evening streak-at-risk nudge",
            Trigger::cron("0 0 20 * * *")?,
            |deps| {
                crate::heartbeat::check_forge_study_evening(
                    &deps.store,
                    deps.notifier.as_ref(),
                    &deps.config,
                )
                .map(|_| ())
                .map_err(|e| e.to_string())
            },
        );
        self.register(
            "exam_countdown",
            "Exam countdown alert",
            Trigger::Interval(StdDuration::from_secs(24 * 3600)),
            |deps| {
                crate::heartbeat::check_exam_countdown(
                    &deps.store,
                    deps.notifier.as_ref(),
                    &deps.config,
                )
                .map(|_| ())
                .map_err(|e| e.to_string())
            },
        );
        self.register(
            "stale_applications",
            "Applications needing follow-up",
            Trigger::Interval(StdDuration::from_secs(24 * 3600)),
            |deps| {
                crate::heartbeat::check_stale_applications(
                    &deps.store,
                    deps.notifier.as_ref(),
                    &deps.config,
                )
                .map(|_| ())
                .map_err(|e| e.to_string())
            },
        );
        self.register(
            "session_crash",
            "Stalled assistant sessions",
            Trigger::Interval(StdDuration::from_secs(600)),
            |deps| {
                crate::heartbeat::check_session_crash(&deps.store, deps.notifier.as_ref())
                    .map(|_| ())
                    .map_err(|e| e.to_string())
            },
        );
        self.register(
            "goal_staleness",
            "Goals with no recent progress",
            Trigger::Interval(StdDuration::from_secs(7 * 24 * 3600)),
            |deps| {
                crate::heartbeat::check_goal_staleness(&deps.store, deps.notifier.as_ref())
                    .map(|_| ())
                    .map_err(|e| e.to_string())
            },
        );
        self.register(
            "time_allocation",
            "Weekly hours vs domain targets",
            Trigger::Interval(StdDuration::from_secs(7 * 24 * 3600)),
            |deps| {
                crate::time_allocation::check_time_allocation(
                    &deps.store,
                    deps.notifier.as_ref(),
                    &deps.config,
                )
                .map(|_| ())
                .map_err(|e| e.to_string())
            },
        );
        self.register(
            "network_decay",
            "Contacts overdue for outreach",
            Trigger::Interval(StdDuration::from_secs(7 * 24 * 3600)),
            |deps| {
                crate::network_decay::check_network_decay(&deps.store, deps.notifier.as_ref())
                    .map(|_| ())
                    .map_err(|e| e.to_string())
            },
        );
        self.register(
            "job_board_autofetch",
            "Neglected job boards",
            Trigger::Interval(StdDuration::from_secs(7 * 24 * 3600)),
            |deps| {
                crate::heartbeat::check_job_board_staleness(&deps.store, deps.notifier.as_ref())
                    .map(|_| ())
                    .map_err(|e| e.to_string())
            },
        );

        // Auxiliary jobs
        self.register(
            "feed_poll",
            "Poll news feeds",
            Trigger::Interval(StdDuration::from_secs(30 * 60)),
            |deps| {
                crate::feeds::poll_all(&deps.store, &deps.config)
                    .map(|_| ())
                    .map_err(|e| e.to_string())
            },
        );
        self.register(
            "vault_sync",
            "Mirror the store into the markdown vault",
            Trigger::Interval(StdDuration::from_secs(3600)),
            |deps| match &deps.config.vault_dir {
                Some(dir) => crate::vault::sync_vault(&deps.store, dir)
                    .map(|_| ())
                    .map_err(|e| e.to_string()),
                None => Ok(()),
            },
        );
        self.register(
            "trash_sweep",
            "Purge expired trash entries",
            Trigger::Interval(StdDuration::from_secs(24 * 3600)),
            |deps| {
                crate::trash::sweep_expired(&deps.store)
                    .map(|_| ())
                    .map_err(|e| e.to_string())
            },
        );
        self.register(
            "git_shadow",
            "Stash-snapshot dirty repos",
            Trigger::Interval(StdDuration::from_secs(15 * 60)),
            |deps| {
                crate::git_shadow::snapshot_repos(&deps.store, &deps.config.shadow_repos)
                    .map(|_| ())
                    .map_err(|e| e.to_string())
            },
        );
        self.register(
            "daily_briefing",
            "Morning digest",
            Trigger::cron("0 0 7 * * *")?,
            |deps| {
                crate::briefing::send_daily_briefing(
                    &deps.store,
                    deps.notifier.as_ref(),
                    &deps.config,
                )
                .map(|_| ())
                .map_err(|e| e.to_string())
            },
        );
        self.register(
            "conversation_archive",
            "Archive recent transcripts",
            Trigger::cron("0 0 2 * * *")?,
            |deps| {
                crate::conversation_archive::archive_recent(&deps.store, &deps.config)
                    .map(|_| ())
                    .map_err(|e| e.to_string())
            },
        );
        Ok(())
    }

    /// Registered job names (the `modules` list).
    pub fn module_names(&self) -> Vec<String> {
        self.jobs.iter().map(|j| j.name.clone()).collect()
    }

    /// Registered jobs as `(name, description)` pairs.
    pub fn registry(&self) -> Vec<(String, String)> {
        self.jobs
            .iter()
            .map(|j| (j.name.clone(), j.description.clone()))
            .collect()
    }

    /// Run until [`Daemon::shutdown`] (or ctrl-c handling by the caller).
    /// Spawns the heartbeat task, one loop per job, and the file-deletion
    /// watcher when roots are configured.
    pub async fn run(&self) {
        let mut handles = Vec::new();

        // Heartbeat: refresh daemon_state every 30 s
        {
            let deps = self.deps.clone();
            let modules = self.module_names();
            let mut shutdown = self.shutdown_tx.subscribe();
            handles.push(tokio::spawn(async move {
                let modules_json =
                    serde_json::to_string(&modules).unwrap_or_else(|_| "[]".into());
                loop {
                    tokio::select! {
                        _ = tokio::time::sleep(StdDuration::from_secs(HEARTBEAT_INTERVAL_SECS)) => {
                            if let Err(e) = write_heartbeat(&deps.store, &modules_json) {
                                tracing::error!("Daemon heartbeat write failed: {}", e);
                            }
                        }
                        _ = shutdown.changed() => break,
                    }
                }
            }));
        }

        // File-deletion watcher runs continuously, outside the job cadence
        if !self.deps.config.watch_roots.is_empty() {
            let deps = self.deps.clone();
            let shutdown = self.shutdown_tx.subscribe();
            handles.push(tokio::spawn(async move {
                if let Err(e) =
                    crate::file_watcher::run_watcher(deps.store.clone(), deps.config.watch_roots.clone(), shutdown)
                        .await
                {
                    tracing::error!("File watcher exited: {}", e);
                }
            }));
        }

        for job in &self.jobs {
            let name = job.name.clone();
            let callable = job.callable.clone();
            let running = job.running.clone();
            let deps = self.deps.clone();
            let delay_source = match &job.trigger {
                Trigger::Interval(d) => TriggerRepr::Interval(*d),
                Trigger::Cron(s) => TriggerRepr::Cron(s.clone()),
            };
            let mut shutdown = self.shutdown_tx.subscribe();

            handles.push(tokio::spawn(async move {
                loop {
                    let delay = delay_source.next_delay();
                    tokio::select! {
                        _ = tokio::time::sleep(delay) => {
                            run_job_once(&name, &callable, &running, &deps).await;
                        }
                        _ = shutdown.changed() => break,
                    }
                }
            }));
        }

        let mut shutdown = self.shutdown_tx.subscribe();
        let _ = shutdown.changed().await;
        for handle in handles {
            let _ = handle.await;
        }
    }

    /// Graceful stop: signal the loops, mark the state row stopped, release
    /// the lock.
    pub fn shutdown(&mut self) {
        let _ = self.shutdown_tx.send(true);
        let result: StoreResult<()> = (|| {
            let conn = self.deps.store.write()?;
            conn.execute(
                "UPDATE daemon_state SET status = 'stopped', last_heartbeat = ?1 WHERE id = 1",
                [now_iso()],
            )?;
            Ok(())
        })();
        if let Err(e) = result {
            tracing::error!("Failed to mark daemon stopped: {}", e);
        }
        log_lifecycle(&self.deps.store, "stopped", "");
        self.lock.release();
    }
}

/// Owned trigger clone for the job loops
enum TriggerRepr {
    Interval(StdDuration),
    Cron(cron::Schedule),
}

impl TriggerRepr {
    fn next_delay(&self) -> StdDuration {
        match self {
            TriggerRepr::Interval(d) => Trigger::Interval(*d).next_delay(),
            TriggerRepr::Cron(s) => Trigger::Cron(s.clone()).next_delay(),
        }
    }
}

/// Run one job invocation: skip when already running, bound by the job
/// timeout, catch errors and panics.
async fn run_job_once(
    name: &str,
    callable: &JobFn,
    running: &Arc<AsyncMutex<()>>,
    deps: &JobDeps,
) {
    let Ok(_guard) = running.try_lock() else {
        tracing::warn!("Job {} still running, skipping this firing", name);
        return;
    };

    let callable = callable.clone();
    let deps = deps.clone();
    let job_name = name.to_string();
    let work = tokio::task::spawn_blocking(move || callable(&deps));

    match tokio::time::timeout(StdDuration::from_secs(JOB_TIMEOUT_SECS), work).await {
        Ok(Ok(Ok(()))) => tracing::debug!("Job {} completed", job_name),
        Ok(Ok(Err(e))) => tracing::error!("Job {} failed: {}", job_name, e),
        Ok(Err(join_err)) => tracing::error!("Job {} panicked: {}", job_name, join_err),
        Err(_) => tracing::error!("Job {} timed out after {}s", job_name, JOB_TIMEOUT_SECS),
    }
}

// ============================================================================
// STATE READERS
// ============================================================================

/// Daemon status as reported to the tool surface.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DaemonStatus {
    pub status: String,
    pub pid: i64,
    pub started_at: Option<String>,
    pub last_heartbeat: Option<String>,
    pub modules: Vec<String>,
    pub process_alive: bool,
}

/// Read daemon status; a dead recorded PID reports as `stopped` regardless
/// of what the row says.
pub fn get_daemon_status(store: &Store) -> StoreResult<DaemonStatus> {
    let conn = store.read()?;
    let row: Option<(i64, Option<String>, Option<String>, String, String)> = conn
        .query_row(
            "SELECT pid, started_at, last_heartbeat, modules, status FROM daemon_state WHERE id = 1",
            [],
            |row| {
                Ok((
                    row.get(0)?,
                    row.get(1)?,
                    row.get(2)?,
                    row.get(3)?,
                    row.get(4)?,
                ))
            },
        )
        .optional()?;

    let Some((pid, started_at, last_heartbeat, modules_json, status)) = row else {
        return Ok(DaemonStatus {
            status: "stopped".into(),
            pid: 0,
            started_at: None,
            last_heartbeat: None,
            modules: vec![],
            process_alive: false,
        });
    };

    let process_alive = pid_alive(pid);
    let status = if status == "running" && !process_alive {
        "stopped".to_string()
    } else {
        status
    };

    Ok(DaemonStatus {
        status,
        pid,
        started_at,
        last_heartbeat,
        modules: serde_json::from_str(&modules_json).unwrap_or_default(),
        process_alive,
    })
}

fn read_daemon_state(store: &Store) -> StoreResult<Option<(i64, String)>> {
    let conn = store.read()?;
    let row = conn
        .query_row(
            "SELECT pid, status FROM daemon_state WHERE id = 1",
            [],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )
        .optional()?;
    Ok(row)
}

fn write_heartbeat(store: &Store, modules_json: &str) -> StoreResult<()> {
    let conn = store.write()?;
    conn.execute(
        "UPDATE daemon_state SET last_heartbeat = ?1, modules = ?2 WHERE id = 1",
        params![now_iso(), modules_json],
    )?;
    Ok(())
}

/// Recent lifecycle events as `(event, detail, created_at)`, newest first.
pub fn lifecycle_log(store: &Store, limit: usize) -> StoreResult<Vec<(String, String, String)>> {
    let conn = store.read()?;
    let mut stmt = conn.prepare(
        "SELECT event, detail, created_at FROM daemon_lifecycle_log ORDER BY id DESC LIMIT ?1",
    )?;
    let rows = stmt
        .query_map([limit as i64], |row| {
            Ok((row.get(0)?, row.get(1)?, row.get(2)?))
        })?
        .filter_map(|r| r.ok())
        .collect();
    Ok(rows)
}

/// Append to the lifecycle log; best-effort.
pub fn log_lifecycle(store: &Store, event: &str, detail: &str) {
    let result: StoreResult<()> = (|| {
        let conn = store.write()?;
        conn.execute(
            "INSERT INTO daemon_lifecycle_log (event, detail, created_at) VALUES (?1, ?2, ?3)",
            params![event, detail, now_iso()],
        )?;
        Ok(())
    })();
    if let Err(e) = result {
        tracing::error!("Failed to write lifecycle log: {}", e);
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notify::LogNotifier;
    use tempfile::TempDir;

    fn test_env() -> (Arc<Store>, Arc<Config>, TempDir) {
        let dir = TempDir::new().unwrap();
        let store = Arc::new(Store::open(dir.path().join("test.store")).unwrap());
        let mut config = Config::from_env();
        config.data_dir = dir.path().to_path_buf();
        (store, Arc::new(config), dir)
    }

    #[test]
    fn test_current_pid_is_alive() {
        assert!(pid_alive(std::process::id() as i64));
        assert!(!pid_alive(0));
    }

    #[test]
    fn test_stale_lock_with_dead_pid_is_cleaned() {
        let dir = TempDir::new().unwrap();
        let lock_path = dir.path().join("daemon.lock");
        // A PID far above pid_max that can't be alive
        std::fs::write(&lock_path, "999999999").unwrap();

        let lock = DaemonLock::acquire(&lock_path).unwrap();
        let contents = std::fs::read_to_string(&lock_path).unwrap();
        assert_eq!(contents.trim(), std::process::id().to_string());
        drop(lock);
        assert!(!lock_path.exists());
    }

    #[test]
    fn test_second_acquire_is_refused() {
        let dir = TempDir::new().unwrap();
        let lock_path = dir.path().join("daemon.lock");
        let _held = DaemonLock::acquire(&lock_path).unwrap();

        match DaemonLock::acquire(&lock_path) {
            Err(DaemonError::StartupRefused { rival_pid }) => {
                assert_eq!(rival_pid, std::process::id() as i64);
            }
            other => panic!("expected refusal, got {:?}", other.map(|_| ())),
        }
    }

    #[tokio::test]
    async fn test_daemon_start_claims_state_row() {
        let (store, config, _dir) = test_env();
        let mut daemon =
            Daemon::start(store.clone(), Arc::new(LogNotifier), config).unwrap();
        daemon.register_default_jobs().unwrap();
        assert!(daemon.module_names().contains(&"git_shadow".to_string()));

        let status = get_daemon_status(&store).unwrap();
        assert_eq!(status.status, "running");
        assert_eq!(status.pid, std::process::id() as i64);
        assert!(status.process_alive);

        daemon.shutdown();
        let status = get_daemon_status(&store).unwrap();
        assert_eq!(status.status, "stopped");
    }

    #[tokio::test]
    async fn test_second_daemon_refused_and_logged() {
        let (store, config, _dir) = test_env();
        let _first =
            Daemon::start(store.clone(), Arc::new(LogNotifier), config.clone()).unwrap();

        let second = Daemon::start(store.clone(), Arc::new(LogNotifier), config);
        assert!(matches!(second, Err(DaemonError::StartupRefused { .. })));

        let conn = store.read().unwrap();
        let (event, detail): (String, String) = conn
            .query_row(
                "SELECT event, detail FROM daemon_lifecycle_log
                 WHERE event = 'startup_refused' ORDER BY id DESC LIMIT 1",
                [],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .unwrap();
        assert_eq!(event, "startup_refused");
        assert!(detail.contains(&std::process::id().to_string()));
    }

    #[test]
    fn test_dead_pid_reports_stopped() {
        let (store, _config, _dir) = test_env();
        {
            let conn = store.write().unwrap();
            conn.execute(
                "INSERT INTO daemon_state (id, pid, started_at, last_heartbeat, modules, status)
                 VALUES (1, 999999999, ?1, ?1, '[\"x\"]', 'running')",
                [now_iso()],
            )
            .unwrap();
        }
        let status = get_daemon_status(&store).unwrap();
        assert_eq!(status.status, "stopped");
        assert!(!status.process_alive);
        assert_eq!(status.modules, vec!["x"]);
    }

    #[test]
    fn test_status_with_no_row() {
        let (store, _config, _dir) = test_env();
        let status = get_daemon_status(&store).unwrap();
        assert_eq!(status.status, "stopped");
        assert_eq!(status.pid, 0);
    }

    #[test]
    fn test_cron_trigger_parses() {
        assert!(Trigger::cron("0 0 8 * * *").is_ok());
        assert!(Trigger::cron("not a cron").is_err());
    }
}
