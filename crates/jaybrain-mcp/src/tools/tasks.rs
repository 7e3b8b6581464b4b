//! Task Tools
//!
//! `task_create`, `task_list`, `task_update`, and the queue triplet.

use serde::Deserialize;
use serde_json::{json, Value};

use jaybrain_core::{TaskCreate, TaskUpdate};

use super::{domain_error, parse_args, store_result, ToolCtx, ToolResult};
use crate::protocol::messages::ToolDescription;

pub fn tools() -> Vec<ToolDescription> {
    vec![
        ToolDescription::new(
            "task_create",
            "Create a task. Priority: low, medium, high, critical.",
            json!({
                "type": "object",
                "properties": {
                    "title": {"type": "string"},
                    "description": {"type": "string", "default": ""},
                    "priority": {"type": "string", "enum": ["low", "medium", "high", "critical"]},
                    "project": {"type": "string"},
                    "tags": {"type": "array", "items": {"type": "string"}},
                    "due_date": {"type": "string", "description": "YYYY-MM-DD"}
                },
                "required": ["title"]
            }),
        ),
        ToolDescription::new(
            "task_list",
            "List tasks, optionally filtered by status and/or project.",
            json!({
                "type": "object",
                "properties": {
                    "status": {"type": "string", "enum": ["todo", "in_progress", "blocked", "done", "cancelled"]},
                    "project": {"type": "string"},
                    "limit": {"type": "integer", "default": 50, "minimum": 1, "maximum": 500}
                }
            }),
        ),
        ToolDescription::new(
            "task_update",
            "Update task fields. Moving to done/cancelled removes it from the queue.",
            json!({
                "type": "object",
                "properties": {
                    "id": {"type": "string"},
                    "title": {"type": "string"},
                    "description": {"type": "string"},
                    "status": {"type": "string", "enum": ["todo", "in_progress", "blocked", "done", "cancelled"]},
                    "priority": {"type": "string", "enum": ["low", "medium", "high", "critical"]},
                    "project": {"type": "string"},
                    "tags": {"type": "array", "items": {"type": "string"}},
                    "due_date": {"type": "string"}
                },
                "required": ["id"]
            }),
        ),
        ToolDescription::new(
            "queue_push",
            "Push a task onto the work queue. Position is 1-based; omitted appends at the tail.",
            json!({
                "type": "object",
                "properties": {
                    "id": {"type": "string"},
                    "position": {"type": "integer", "minimum": 1}
                },
                "required": ["id"]
            }),
        ),
        ToolDescription::new(
            "queue_pop",
            "Pop the head of the queue; the rest shifts up.",
            json!({"type": "object", "properties": {}}),
        ),
        ToolDescription::new(
            "queue_view",
            "The work queue in order.",
            json!({"type": "object", "properties": {}}),
        ),
    ]
}

pub fn call(name: &str, ctx: &ToolCtx, args: Option<Value>) -> Option<ToolResult> {
    match name {
        "task_create" => Some(task_create(ctx, args)),
        "task_list" => Some(task_list(ctx, args)),
        "task_update" => Some(task_update(ctx, args)),
        "queue_push" => Some(queue_push(ctx, args)),
        "queue_pop" => Some(queue_pop(ctx)),
        "queue_view" => Some(queue_view(ctx)),
        _ => None,
    }
}

// ============================================================================
// HANDLERS
// ============================================================================

fn task_create(ctx: &ToolCtx, args: Option<Value>) -> ToolResult {
    let input: TaskCreate = parse_args(args)?;
    store_result(ctx.store.task_create(input))
}

#[derive(Deserialize)]
struct ListArgs {
    status: Option<String>,
    project: Option<String>,
    limit: Option<usize>,
}

fn task_list(ctx: &ToolCtx, args: Option<Value>) -> ToolResult {
    let args: ListArgs = parse_args(args)?;
    let tasks = store_result(ctx.store.task_list(
        args.status.as_deref(),
        args.project.as_deref(),
        args.limit.unwrap_or(50).clamp(1, 500),
    ))?;
    Ok(json!({
        "total": tasks.as_array().map(|a| a.len()).unwrap_or(0),
        "tasks": tasks,
    }))
}

#[derive(Deserialize)]
struct UpdateArgs {
    id: String,
    #[serde(flatten)]
    update: TaskUpdate,
}

fn task_update(ctx: &ToolCtx, args: Option<Value>) -> ToolResult {
    let args: UpdateArgs = parse_args(args)?;
    let updated = store_result(ctx.store.task_update(&args.id, args.update))?;
    if updated.is_null() {
        Ok(domain_error(format!("Task not found: {}", args.id)))
    } else {
        Ok(updated)
    }
}

#[derive(Deserialize)]
struct PushArgs {
    id: String,
    position: Option<i64>,
}

fn queue_push(ctx: &ToolCtx, args: Option<Value>) -> ToolResult {
    let args: PushArgs = parse_args(args)?;
    store_result(ctx.store.queue_push(&args.id, args.position))
}

fn queue_pop(ctx: &ToolCtx) -> ToolResult {
    store_result(ctx.store.queue_pop())
}

fn queue_view(ctx: &ToolCtx) -> ToolResult {
    let queue = store_result(ctx.store.queue_view())?;
    Ok(json!({
        "total": queue.as_array().map(|a| a.len()).unwrap_or(0),
        "queue": queue,
    }))
}

// ============================================================================
// TESTS
// ============================================================================
