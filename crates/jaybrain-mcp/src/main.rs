//! JayBrain MCP Server
//!
//! Exposes the memory engine, task queue, forge, knowledge graph, pulse,
//! and daemon status as MCP tools over stdio. Logging goes to stderr;
//! stdout carries JSON-RPC only.

mod protocol;
mod server;
mod tools;

use std::io;
use std::path::PathBuf;
use std::sync::Arc;

use tracing::{info, Level};
use tracing_subscriber::EnvFilter;

use jaybrain_core::{Config, LogNotifier, Store};

use crate::protocol::stdio::StdioTransport;
use crate::server::McpServer;
use crate::tools::ToolCtx;

/// Parse `--data-dir`; exits for `--help`/`--version`.
fn parse_args() -> Option<PathBuf> {
    let args: Vec<String> = std::env::args().collect();
    let mut data_dir: Option<PathBuf> = None;
    let mut i = 1;

    while i < args.len() {
        match args[i].as_str() {
            "--help" | "-h" => {
                println!("JayBrain MCP Server v{}", env!("CARGO_PKG_VERSION"));
                println!();
                println!("Personal-agent memory server over the Model Context Protocol.");
                println!();
                println!("USAGE:");
                println!("    jaybrain-mcp [OPTIONS]");
                println!();
                println!("OPTIONS:");
                println!("    -h, --help              Print help information");
                println!("    -V, --version           Print version information");
                println!("    --data-dir <PATH>       Custom data directory");
                println!();
                println!("ENVIRONMENT:");
                println!("    RUST_LOG                Log level filter (debug, info, warn, error)");
                println!("    JAYBRAIN_DATA_DIR       Same as --data-dir");
                std::process::exit(0);
            }
            "--version" | "-V" => {
                println!("jaybrain-mcp {}", env!("CARGO_PKG_VERSION"));
                std::process::exit(0);
            }
            "--data-dir" => {
                i += 1;
                if i >= args.len() {
                    eprintln!("error: --data-dir requires a path argument");
                    std::process::exit(1);
                }
                data_dir = Some(PathBuf::from(&args[i]));
            }
            arg if arg.starts_with("--data-dir=") => {
                let path = arg.strip_prefix("--data-dir=").unwrap_or("");
                if path.is_empty() {
                    eprintln!("error: --data-dir requires a path argument");
                    std::process::exit(1);
                }
                data_dir = Some(PathBuf::from(path));
            }
            arg => {
                eprintln!("error: unknown argument '{}'", arg);
                eprintln!("Try 'jaybrain-mcp --help' for more information.");
                std::process::exit(1);
            }
        }
        i += 1;
    }

    data_dir
}

#[tokio::main]
async fn main() {
    let data_dir = parse_args();

    // stdout is for JSON-RPC; all logging goes to stderr
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(Level::INFO.into()))
        .with_writer(io::stderr)
        .with_target(false)
        .with_ansi(false)
        .init();

    info!("JayBrain MCP server v{} starting...", env!("CARGO_PKG_VERSION"));

    let mut config = Config::from_env();
    if let Some(dir) = data_dir {
        config.data_dir = dir;
    }

    let store = match Store::open(config.store_path()) {
        Ok(store) => {
            info!("Store opened at {}", config.store_path().display());
            Arc::new(store)
        }
        Err(e) => {
            eprintln!("Failed to open store: {e}");
            std::process::exit(1);
        }
    };

    let ctx = ToolCtx {
        store,
        config: Arc::new(config),
        notifier: Arc::new(LogNotifier),
    };

    let server = McpServer::new(ctx);
    let transport = StdioTransport::new();
    if let Err(e) = transport.run(server).await {
        eprintln!("Transport error: {e}");
        std::process::exit(1);
    }
}
