//! JayBrain Hook Ingest
//!
//! Invoked by the assistant host on SessionStart / PostToolUse /
//! PostToolUseFailure / Stop / SessionEnd / PreCompact. Reads the event
//! JSON from stdin and writes the pulse tables.
//!
//! Budget: <1s typical, 5s hard ceiling. No embeddings, no migrations, no
//! vector index — just one bare SQLite connection. Never fails the host:
//! every error goes to stderr and the exit code stays 0.

use std::io::Read;
use std::time::Instant;

use jaybrain_core::config::Config;
use jaybrain_core::hooks;

fn main() {
    let start = Instant::now();

    let mut raw = String::new();
    if let Err(e) = std::io::stdin().read_to_string(&mut raw) {
        eprintln!("jaybrain-hook: stdin read failed: {e}");
        return;
    }

    let config = Config::from_env();
    if let Err(e) = hooks::handle_raw(&config.store_path(), &raw) {
        eprintln!("jaybrain-hook: {e}");
    }

    let elapsed = start.elapsed();
    if elapsed.as_secs_f64() > 4.0 {
        eprintln!(
            "jaybrain-hook: WARNING took {:.1}s (>4s budget)",
            elapsed.as_secs_f64()
        );
    }
}
