//! Daemon & Heartbeat Tools
//!
//! Status queries and on-demand check runs. Starting and stopping the
//! daemon itself belongs to the CLI, not the tool surface.

use serde::Deserialize;
use serde_json::{json, Value};

use super::{parse_args, store_result, ToolCtx, ToolResult};
use crate::protocol::messages::ToolDescription;

pub fn tools() -> Vec<ToolDescription> {
    vec![
        ToolDescription::new(
            "daemon_status",
            "Daemon status from the state row. A dead recorded PID reports as stopped.",
            json!({"type": "object", "properties": {}}),
        ),
        ToolDescription::new(
            "heartbeat_run",
            "Run one heartbeat check by name (forge_study_morning, exam_countdown, stale_applications, session_crash, goal_staleness, time_allocation, network_decay, ...).",
            json!({
                "type": "object",
                "properties": {
                    "check": {"type": "string"}
                },
                "required": ["check"]
            }),
        ),
        ToolDescription::new(
            "heartbeat_status",
            "Recent heartbeat check history: latest outcome per check plus a short log.",
            json!({"type": "object", "properties": {}}),
        ),
        ToolDescription::new(
            "shadow_snapshots",
            "Recent git shadow snapshots (stash hashes of dirty working trees).",
            json!({
                "type": "object",
                "properties": {
                    "limit": {"type": "integer", "default": 20, "minimum": 1, "maximum": 100}
                }
            }),
        ),
    ]
}

pub fn call(name: &str, ctx: &ToolCtx, args: Option<Value>) -> Option<ToolResult> {
    match name {
        "daemon_status" => Some(store_result(jaybrain_core::get_daemon_status(&ctx.store))),
        "heartbeat_run" => Some(heartbeat_run(ctx, args)),
        "heartbeat_status" => Some(store_result(jaybrain_core::heartbeat::heartbeat_status(
            &ctx.store,
        ))),
        "shadow_snapshots" => Some(snapshots(ctx, args)),
        _ => None,
    }
}

// ============================================================================
// HANDLERS
// ============================================================================

#[derive(Deserialize)]
struct RunArgs {
    check: String,
}

fn heartbeat_run(ctx: &ToolCtx, args: Option<Value>) -> ToolResult {
    let args: RunArgs = parse_args(args)?;
    store_result(jaybrain_core::heartbeat::run_single_check(
        &ctx.store,
        ctx.notifier.as_ref(),
        &ctx.config,
        &args.check,
    ))
}

#[derive(Deserialize, Default)]
#[serde(default)]
struct SnapshotArgs {
    limit: Option<usize>,
}

fn snapshots(ctx: &ToolCtx, args: Option<Value>) -> ToolResult {
    let args: SnapshotArgs = parse_args(args)?;
    let rows = store_result(jaybrain_core::git_shadow::recent_snapshots(
        &ctx.store,
        args.limit.unwrap_or(20),
    ))?;
    Ok(json!({
        "total": rows.as_array().map(|a| a.len()).unwrap_or(0),
        "snapshots": rows,
    }))
}

// ============================================================================
// TESTS
// ============================================================================
