//! Daemon singleton discipline: a live daemon refuses a second instance
//! (logging the rival PID), and a stale lock from a dead PID is cleaned up.

use std::sync::Arc;

use jaybrain_e2e_tests::test_env;
use jaybrain_core::daemon::{Daemon, DaemonError, DaemonLock};
use jaybrain_core::{get_daemon_status, LogNotifier};

#[tokio::test]
async fn second_daemon_is_refused_and_logged() {
    let (store, config, _dir) = test_env();
    let config = Arc::new(config);

    let mut first = Daemon::start(store.clone(), Arc::new(LogNotifier), config.clone())
        .expect("first daemon starts");

    // Daemon B arrives while A is live
    match Daemon::start(store.clone(), Arc::new(LogNotifier), config.clone()) {
        Err(DaemonError::StartupRefused { rival_pid }) => {
            assert_eq!(rival_pid, std::process::id() as i64);
        }
        other => panic!("expected refusal, got {:?}", other.map(|_| "daemon")),
    }

    // The refusal named the rival in the lifecycle log
    {
        let status = get_daemon_status(&store).unwrap();
        assert_eq!(status.status, "running");
        assert!(status.process_alive);
    }
    let log = jaybrain_core::daemon::lifecycle_log(&store, 10).unwrap();
    let refusal = log
        .iter()
        .find(|(event, _, _)| event == "startup_refused")
        .expect("refusal logged");
    assert!(refusal.1.contains(&std::process::id().to_string()));

    first.shutdown();
    assert_eq!(get_daemon_status(&store).unwrap().status, "stopped");
}

#[tokio::test]
async fn stale_lock_from_dead_pid_is_cleaned() {
    let (store, config, _dir) = test_env();
    let config = Arc::new(config);

    // Daemon A "crashed": its lock file remains, holding a PID that is dead
    std::fs::create_dir_all(&config.data_dir).unwrap();
    std::fs::write(config.daemon_lock_file(), "999999999").unwrap();

    // Daemon C starts, removes the stale lock, and proceeds with its own PID
    let mut daemon = Daemon::start(store.clone(), Arc::new(LogNotifier), config.clone())
        .expect("stale lock should not block startup");

    let lock_contents = std::fs::read_to_string(config.daemon_lock_file()).unwrap();
    assert_eq!(lock_contents.trim(), std::process::id().to_string());

    let status = get_daemon_status(&store).unwrap();
    assert_eq!(status.status, "running");
    assert_eq!(status.pid, std::process::id() as i64);

    daemon.shutdown();
}

#[test]
fn lock_acquire_reports_rival_pid() {
    let dir = tempfile::TempDir::new().unwrap();
    let lock_path = dir.path().join("daemon.lock");
    let _held = DaemonLock::acquire(&lock_path).unwrap();

    match DaemonLock::acquire(&lock_path) {
        Err(DaemonError::StartupRefused { rival_pid }) => {
            assert_eq!(rival_pid, std::process::id() as i64);
        }
        _ => panic!("expected refusal"),
    }
}
