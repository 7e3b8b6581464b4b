//! Knowledge Tools
//!
//! `knowledge_store`, `knowledge_search`, `knowledge_update`.

use serde::Deserialize;
use serde_json::{json, Value};

use jaybrain_core::KnowledgeUpdate;

use super::{domain_error, parse_args, store_result, ToolCtx, ToolResult};
use crate::protocol::messages::ToolDescription;

pub fn tools() -> Vec<ToolDescription> {
    vec![
        ToolDescription::new(
            "knowledge_store",
            "Store a curated knowledge entry (unlike memories, knowledge doesn't decay).",
            json!({
                "type": "object",
                "properties": {
                    "title": {"type": "string"},
                    "content": {"type": "string"},
                    "category": {"type": "string", "default": "general"},
                    "tags": {"type": "array", "items": {"type": "string"}},
                    "source": {"type": "string", "default": ""}
                },
                "required": ["title", "content"]
            }),
        ),
        ToolDescription::new(
            "knowledge_search",
            "Hybrid keyword+vector search over knowledge entries.",
            json!({
                "type": "object",
                "properties": {
                    "query": {"type": "string"},
                    "category": {"type": "string"},
                    "limit": {"type": "integer", "default": 10, "minimum": 1, "maximum": 100}
                },
                "required": ["query"]
            }),
        ),
        ToolDescription::new(
            "knowledge_update",
            "Update fields of a knowledge entry; changed text is re-embedded.",
            json!({
                "type": "object",
                "properties": {
                    "id": {"type": "string"},
                    "title": {"type": "string"},
                    "content": {"type": "string"},
                    "category": {"type": "string"},
                    "tags": {"type": "array", "items": {"type": "string"}},
                    "source": {"type": "string"}
                },
                "required": ["id"]
            }),
        ),
    ]
}

pub fn call(name: &str, ctx: &ToolCtx, args: Option<Value>) -> Option<ToolResult> {
    match name {
        "knowledge_store" => Some(store(ctx, args)),
        "knowledge_search" => Some(search(ctx, args)),
        "knowledge_update" => Some(update(ctx, args)),
        _ => None,
    }
}

// ============================================================================
// HANDLERS
// ============================================================================

#[derive(Deserialize)]
struct StoreArgs {
    title: String,
    content: String,
    #[serde(default)]
    category: String,
    #[serde(default)]
    tags: Vec<String>,
    #[serde(default)]
    source: String,
}

fn store(ctx: &ToolCtx, args: Option<Value>) -> ToolResult {
    let args: StoreArgs = parse_args(args)?;
    store_result(ctx.store.knowledge_store(
        &args.title,
        &args.content,
        &args.category,
        &args.tags,
        &args.source,
    ))
}

#[derive(Deserialize)]
struct SearchArgs {
    query: String,
    category: Option<String>,
    limit: Option<usize>,
}

fn search(ctx: &ToolCtx, args: Option<Value>) -> ToolResult {
    let args: SearchArgs = parse_args(args)?;
    let hits = store_result(ctx.store.search_knowledge(
        &args.query,
        args.category.as_deref(),
        args.limit.unwrap_or(10),
    ))?;
    Ok(json!({
        "query": args.query,
        "total": hits.as_array().map(|a| a.len()).unwrap_or(0),
        "results": hits,
    }))
}

#[derive(Deserialize)]
struct UpdateArgs {
    id: String,
    #[serde(flatten)]
    update: KnowledgeUpdate,
}

fn update(ctx: &ToolCtx, args: Option<Value>) -> ToolResult {
    let args: UpdateArgs = parse_args(args)?;
    let updated = store_result(ctx.store.update_knowledge(&args.id, args.update))?;
    if updated.is_null() {
        Ok(domain_error(format!("Knowledge entry not found: {}", args.id)))
    } else {
        Ok(updated)
    }
}

// ============================================================================
// TESTS
// ============================================================================
