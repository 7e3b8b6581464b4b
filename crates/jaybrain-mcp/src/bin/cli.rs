//! JayBrain CLI
//!
//! Start/stop commands for the scheduler daemon and the bot shell, each
//! with `--daemon` detach semantics and a PID file.
//!
//! Exit codes: 0 success, 1 already-running (for starts), 2 invalid
//! invocation.

use std::path::Path;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use colored::Colorize;
use tracing_subscriber::EnvFilter;

use jaybrain_core::daemon::{self, Daemon, DaemonError};
use jaybrain_core::{Config, LogNotifier, Store};

#[derive(Parser)]
#[command(name = "jaybrain", version, about = "JayBrain control CLI")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Scheduler daemon control
    Daemon {
        /// Start the daemon
        #[arg(long)]
        start: bool,
        /// Stop a running daemon
        #[arg(long)]
        stop: bool,
        /// Show daemon status
        #[arg(long)]
        status: bool,
        /// Detach and run in the background
        #[arg(long)]
        daemon: bool,
    },
    /// Bot shell control (the notification transport adapter runs here)
    Bot {
        /// Start the bot shell
        #[arg(long)]
        start: bool,
        /// Stop a running bot shell
        #[arg(long)]
        stop: bool,
        /// Detach and run in the background
        #[arg(long)]
        daemon: bool,
    },
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();

    let cli = Cli::parse();
    let config = Config::from_env();

    let code = match cli.command {
        Command::Daemon {
            start,
            stop,
            status,
            daemon,
        } => match (start, stop, status) {
            (true, false, false) => daemon_start(&config, daemon),
            (false, true, false) => daemon_stop(&config),
            (false, false, true) => daemon_status(&config),
            _ => {
                eprintln!("usage: jaybrain daemon --start|--stop|--status [--daemon]");
                2
            }
        },
        Command::Bot { start, stop, daemon } => match (start, stop) {
            (true, false) => bot_start(&config, daemon),
            (false, true) => bot_stop(&config),
            _ => {
                eprintln!("usage: jaybrain bot --start|--stop [--daemon]");
                2
            }
        },
    };
    std::process::exit(code);
}

// ============================================================================
// DAEMON COMMANDS
// ============================================================================

fn daemon_start(config: &Config, detach: bool) -> i32 {
    if detach {
        return respawn_detached("daemon");
    }

    let store = match Store::open(config.store_path()) {
        Ok(store) => Arc::new(store),
        Err(e) => {
            eprintln!("{} failed to open store: {e}", "error:".red());
            return 1;
        }
    };

    let mut instance = match Daemon::start(
        store.clone(),
        Arc::new(LogNotifier),
        Arc::new(config.clone()),
    ) {
        Ok(instance) => instance,
        Err(DaemonError::StartupRefused { rival_pid }) => {
            eprintln!(
                "{} daemon already running as PID {rival_pid}",
                "refused:".yellow()
            );
            return 1;
        }
        Err(e) => {
            eprintln!("{} {e}", "error:".red());
            return 1;
        }
    };

    if let Err(e) = instance.register_default_jobs() {
        eprintln!("{} {e}", "error:".red());
        return 1;
    }
    if let Err(e) = write_pid_file(&config.daemon_pid_file()) {
        eprintln!("{} cannot write pid file: {e}", "error:".red());
        return 1;
    }

    println!(
        "{} daemon running (PID {}), {} jobs registered",
        "ok:".green(),
        std::process::id(),
        instance.module_names().len()
    );

    let runtime = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("{} runtime: {e}", "error:".red());
            return 1;
        }
    };
    runtime.block_on(async {
        tokio::select! {
            _ = instance.run() => {}
            _ = tokio::signal::ctrl_c() => {
                println!("\nshutting down...");
            }
        }
    });
    instance.shutdown();
    let _ = std::fs::remove_file(config.daemon_pid_file());
    0
}

fn daemon_stop(config: &Config) -> i32 {
    let pid = read_pid_file(&config.daemon_pid_file()).or_else(|| {
        Store::open(config.store_path())
            .ok()
            .and_then(|store| daemon::get_daemon_status(&store).ok())
            .filter(|s| s.process_alive)
            .map(|s| s.pid)
    });

    match pid {
        Some(pid) if daemon::pid_alive(pid) => {
            if daemon::terminate_pid(pid) {
                println!("{} sent SIGTERM to PID {pid}", "ok:".green());
                0
            } else {
                eprintln!("{} could not signal PID {pid}", "error:".red());
                1
            }
        }
        _ => {
            println!("daemon is not running");
            0
        }
    }
}

fn daemon_status(config: &Config) -> i32 {
    let store = match Store::open(config.store_path()) {
        Ok(store) => store,
        Err(e) => {
            eprintln!("{} failed to open store: {e}", "error:".red());
            return 1;
        }
    };
    match daemon::get_daemon_status(&store) {
        Ok(status) => {
            let state = if status.status == "running" {
                status.status.green()
            } else {
                status.status.yellow()
            };
            println!("status:   {state}");
            println!("pid:      {}", status.pid);
            println!("alive:    {}", status.process_alive);
            if let Some(started) = &status.started_at {
                println!("started:  {started}");
            }
            if let Some(heartbeat) = &status.last_heartbeat {
                println!("heartbeat: {heartbeat}");
            }
            if !status.modules.is_empty() {
                println!("modules:  {}", status.modules.join(", "));
            }
            0
        }
        Err(e) => {
            eprintln!("{} {e}", "error:".red());
            1
        }
    }
}

// ============================================================================
// BOT COMMANDS
// ============================================================================

/// The bot shell: holds the PID file and keeps the transport adapter alive.
/// The actual Telegram client is an external collaborator; without it the
/// shell logs outbound messages.
fn bot_start(config: &Config, detach: bool) -> i32 {
    if detach {
        return respawn_detached("bot");
    }

    let pid_file = config.data_dir.join("bot.pid");
    if let Some(pid) = read_pid_file(&pid_file) {
        if daemon::pid_alive(pid) {
            eprintln!("{} bot already running as PID {pid}", "refused:".yellow());
            return 1;
        }
    }
    if let Err(e) = write_pid_file(&pid_file) {
        eprintln!("{} cannot write pid file: {e}", "error:".red());
        return 1;
    }

    println!("{} bot shell running (PID {})", "ok:".green(), std::process::id());
    let runtime = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("{} runtime: {e}", "error:".red());
            return 1;
        }
    };
    runtime.block_on(async {
        let _ = tokio::signal::ctrl_c().await;
    });
    let _ = std::fs::remove_file(&pid_file);
    0
}

fn bot_stop(config: &Config) -> i32 {
    let pid_file = config.data_dir.join("bot.pid");
    match read_pid_file(&pid_file) {
        Some(pid) if daemon::pid_alive(pid) => {
            if daemon::terminate_pid(pid) {
                println!("{} sent SIGTERM to PID {pid}", "ok:".green());
                0
            } else {
                eprintln!("{} could not signal PID {pid}", "error:".red());
                1
            }
        }
        _ => {
            println!("bot is not running");
            0
        }
    }
}

// ============================================================================
// HELPERS
// ============================================================================

/// Re-exec ourselves detached with `--start` (minus `--daemon`).
fn respawn_detached(subcommand: &str) -> i32 {
    let exe = match std::env::current_exe() {
        Ok(exe) => exe,
        Err(e) => {
            eprintln!("{} cannot find own executable: {e}", "error:".red());
            return 1;
        }
    };
    match std::process::Command::new(exe)
        .args([subcommand, "--start"])
        .stdin(std::process::Stdio::null())
        .stdout(std::process::Stdio::null())
        .stderr(std::process::Stdio::null())
        .spawn()
    {
        Ok(child) => {
            println!("{} detached as PID {}", "ok:".green(), child.id());
            0
        }
        Err(e) => {
            eprintln!("{} spawn failed: {e}", "error:".red());
            1
        }
    }
}

fn write_pid_file(path: &Path) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, std::process::id().to_string())
}

fn read_pid_file(path: &Path) -> Option<i64> {
    std::fs::read_to_string(path).ok()?.trim().parse().ok()
}
