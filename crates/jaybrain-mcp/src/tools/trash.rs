//! Trash Tools
//!
//! Soft-delete, restore, listing, sweep, and the scan that classifies
//! auto-trashable junk.

use serde::Deserialize;
use serde_json::{json, Value};

use super::{parse_args, store_result, ToolCtx, ToolResult};
use crate::protocol::messages::ToolDescription;

pub fn tools() -> Vec<ToolDescription> {
    vec![
        ToolDescription::new(
            "trash_put",
            "Soft-delete a path into the trash with category-based retention.",
            json!({
                "type": "object",
                "properties": {
                    "path": {"type": "string"},
                    "reason": {"type": "string", "default": ""},
                    "category": {"type": "string", "enum": ["bytecode", "cache", "build_artifact", "log", "temp", "source", "general"]}
                },
                "required": ["path"]
            }),
        ),
        ToolDescription::new(
            "trash_restore",
            "Restore a trashed entry to its original path. Refuses if the path is occupied.",
            json!({
                "type": "object",
                "properties": {
                    "id": {"type": "string"}
                },
                "required": ["id"]
            }),
        ),
        ToolDescription::new(
            "trash_list",
            "List trash manifest entries.",
            json!({"type": "object", "properties": {}}),
        ),
        ToolDescription::new(
            "trash_sweep",
            "Permanently delete entries past their retention.",
            json!({"type": "object", "properties": {}}),
        ),
        ToolDescription::new(
            "trash_scan",
            "Walk a directory and classify trash candidates. Auto-trashable means junk category AND git-ignored AND untracked.",
            json!({
                "type": "object",
                "properties": {
                    "path": {"type": "string"},
                    "limit": {"type": "integer", "default": 200, "minimum": 1, "maximum": 2000}
                },
                "required": ["path"]
            }),
        ),
    ]
}

pub fn call(name: &str, ctx: &ToolCtx, args: Option<Value>) -> Option<ToolResult> {
    match name {
        "trash_put" => Some(put(ctx, args)),
        "trash_restore" => Some(restore(ctx, args)),
        "trash_list" => Some(list(ctx)),
        "trash_sweep" => Some(sweep(ctx)),
        "trash_scan" => Some(scan(ctx, args)),
        _ => None,
    }
}

// ============================================================================
// HANDLERS
// ============================================================================

#[derive(Deserialize)]
struct PutArgs {
    path: String,
    #[serde(default)]
    reason: String,
    category: Option<String>,
}

fn put(ctx: &ToolCtx, args: Option<Value>) -> ToolResult {
    let args: PutArgs = parse_args(args)?;
    store_result(jaybrain_core::trash::trash_put(
        &ctx.store,
        &ctx.config.trash_dir(),
        std::path::Path::new(&args.path),
        &args.reason,
        false,
        args.category.as_deref(),
    ))
}

#[derive(Deserialize)]
struct RestoreArgs {
    id: String,
}

fn restore(ctx: &ToolCtx, args: Option<Value>) -> ToolResult {
    let args: RestoreArgs = parse_args(args)?;
    store_result(jaybrain_core::trash::trash_restore(&ctx.store, &args.id))
}

fn list(ctx: &ToolCtx) -> ToolResult {
    let entries = store_result(jaybrain_core::trash::trash_list(&ctx.store))?;
    Ok(json!({
        "total": entries.as_array().map(|a| a.len()).unwrap_or(0),
        "entries": entries,
    }))
}

fn sweep(ctx: &ToolCtx) -> ToolResult {
    let purged = store_result(jaybrain_core::trash::sweep_expired(&ctx.store))?;
    Ok(json!({ "purged": purged }))
}

#[derive(Deserialize)]
struct ScanArgs {
    path: String,
    limit: Option<usize>,
}

fn scan(_ctx: &ToolCtx, args: Option<Value>) -> ToolResult {
    let args: ScanArgs = parse_args(args)?;
    let candidates = store_result(jaybrain_core::trash::scan_files(
        std::path::Path::new(&args.path),
        args.limit.unwrap_or(200).clamp(1, 2000),
    ))?;
    Ok(json!({
        "total": candidates.as_array().map(|a| a.len()).unwrap_or(0),
        "candidates": candidates,
    }))
}

// ============================================================================
// TESTS
// ============================================================================
