//! Memory Tools
//!
//! `remember`, `recall`, `deep_recall`, `forget`.

use serde::Deserialize;
use serde_json::{json, Value};

use jaybrain_core::{RecallInput, RememberInput};

use super::{domain_error, parse_args, store_result, ToolCtx, ToolResult};
use crate::protocol::messages::ToolDescription;

pub fn tools() -> Vec<ToolDescription> {
    vec![
        ToolDescription::new(
            "remember",
            "Store a memory. Categories: semantic, episodic, procedural, decision, preference.",
            json!({
                "type": "object",
                "properties": {
                    "content": {"type": "string", "description": "What to remember"},
                    "category": {"type": "string", "enum": ["semantic", "episodic", "procedural", "decision", "preference"], "default": "semantic"},
                    "tags": {"type": "array", "items": {"type": "string"}},
                    "importance": {"type": "number", "minimum": 0.0, "maximum": 1.0, "default": 0.5},
                    "session_id": {"type": "string"}
                },
                "required": ["content"]
            }),
        ),
        ToolDescription::new(
            "recall",
            "Hybrid keyword+vector recall with decay scoring. Returns the top matches with their scores.",
            json!({
                "type": "object",
                "properties": {
                    "query": {"type": "string"},
                    "category": {"type": "string"},
                    "limit": {"type": "integer", "default": 10, "minimum": 1, "maximum": 100},
                    "vector_weight": {"type": "number", "minimum": 0.0, "maximum": 1.0},
                    "keyword_weight": {"type": "number", "minimum": 0.0, "maximum": 1.0},
                    "include_archived": {"type": "boolean", "default": false}
                },
                "required": ["query"]
            }),
        ),
        ToolDescription::new(
            "deep_recall",
            "Recall plus one hop of knowledge-graph expansion: entities evidenced by the hits and the further memories they point at.",
            json!({
                "type": "object",
                "properties": {
                    "query": {"type": "string"},
                    "limit": {"type": "integer", "default": 10, "minimum": 1, "maximum": 50}
                },
                "required": ["query"]
            }),
        ),
        ToolDescription::new(
            "forget",
            "Archive a memory: it disappears from recall but stays in the archive with its content intact.",
            json!({
                "type": "object",
                "properties": {
                    "id": {"type": "string"},
                    "reason": {"type": "string", "default": ""}
                },
                "required": ["id"]
            }),
        ),
        ToolDescription::new(
            "memory_consolidate",
            "Find near-duplicate memory clusters by vector similarity and merge them (keep the most important, archive the rest). dry_run previews.",
            json!({
                "type": "object",
                "properties": {
                    "min_similarity": {"type": "number", "default": 0.95, "minimum": 0.5, "maximum": 1.0},
                    "dry_run": {"type": "boolean", "default": true}
                }
            }),
        ),
    ]
}

pub fn call(name: &str, ctx: &ToolCtx, args: Option<Value>) -> Option<ToolResult> {
    match name {
        "remember" => Some(remember(ctx, args)),
        "recall" => Some(recall(ctx, args)),
        "deep_recall" => Some(deep_recall(ctx, args)),
        "forget" => Some(forget(ctx, args)),
        "memory_consolidate" => Some(consolidate(ctx, args)),
        _ => None,
    }
}

// ============================================================================
// HANDLERS
// ============================================================================

fn remember(ctx: &ToolCtx, args: Option<Value>) -> ToolResult {
    let input: RememberInput = parse_args(args)?;
    store_result(ctx.store.remember(input))
}

#[derive(Deserialize)]
struct RecallArgs {
    query: String,
    category: Option<String>,
    limit: Option<usize>,
    vector_weight: Option<f32>,
    keyword_weight: Option<f32>,
    #[serde(default)]
    include_archived: bool,
}

fn recall(ctx: &ToolCtx, args: Option<Value>) -> ToolResult {
    let args: RecallArgs = parse_args(args)?;
    let hits = store_result(ctx.store.recall(RecallInput {
        query: args.query.clone(),
        category: args.category,
        limit: args.limit.unwrap_or(10),
        vector_weight: args.vector_weight,
        keyword_weight: args.keyword_weight,
        include_archived: args.include_archived,
    }))?;
    Ok(json!({
        "query": args.query,
        "total": hits.as_array().map(|a| a.len()).unwrap_or(0),
        "results": hits,
    }))
}

#[derive(Deserialize)]
struct DeepRecallArgs {
    query: String,
    limit: Option<usize>,
}

fn deep_recall(ctx: &ToolCtx, args: Option<Value>) -> ToolResult {
    let args: DeepRecallArgs = parse_args(args)?;
    store_result(
        ctx.store
            .deep_recall(&args.query, args.limit.unwrap_or(10).clamp(1, 50)),
    )
}

#[derive(Deserialize)]
struct ForgetArgs {
    id: String,
    #[serde(default)]
    reason: String,
}

fn forget(ctx: &ToolCtx, args: Option<Value>) -> ToolResult {
    let args: ForgetArgs = parse_args(args)?;
    let found = store_result(ctx.store.forget(&args.id, &args.reason))?;
    if found == Value::Bool(true) {
        Ok(json!({ "status": "archived", "id": args.id }))
    } else {
        Ok(domain_error(format!("Memory not found: {}", args.id)))
    }
}

#[derive(Deserialize)]
struct ConsolidateArgs {
    min_similarity: Option<f32>,
    dry_run: Option<bool>,
}

fn consolidate(ctx: &ToolCtx, args: Option<Value>) -> ToolResult {
    let args: ConsolidateArgs = parse_args(args)?;
    store_result(ctx.store.consolidate(
        args.min_similarity.unwrap_or(0.95).clamp(0.5, 1.0),
        args.dry_run.unwrap_or(true),
    ))
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::testutil::test_ctx;

    #[test]
    fn test_remember_then_recall() {
        let (ctx, _dir) = test_ctx();
        let stored = call(
            "remember",
            &ctx,
            Some(json!({"content": "the staging cluster lives in rack 4"})),
        )
        .unwrap()
        .unwrap();
        assert!(stored["id"].is_string());

        let recalled = call("recall", &ctx, Some(json!({"query": "staging cluster"})))
            .unwrap()
            .unwrap();
        assert!(recalled["total"].as_u64().unwrap() >= 1);
        assert_eq!(
            recalled["results"][0]["memory"]["id"],
            stored["id"]
        );
    }

    #[test]
    fn test_remember_missing_content_is_invalid_args() {
        let (ctx, _dir) = test_ctx();
        let result = call("remember", &ctx, Some(json!({"tags": []}))).unwrap();
        assert!(matches!(result, Err(super::super::ToolError::InvalidArgs(_))));
    }

    #[test]
    fn test_remember_bad_category_is_invalid_args() {
        let (ctx, _dir) = test_ctx();
        let result = call(
            "remember",
            &ctx,
            Some(json!({"content": "x", "category": "vibes"})),
        )
        .unwrap();
        assert!(matches!(result, Err(super::super::ToolError::InvalidArgs(_))));
    }

    #[test]
    fn test_forget_unknown_id_is_domain_error() {
        let (ctx, _dir) = test_ctx();
        let result = call("forget", &ctx, Some(json!({"id": "000000000000"})))
            .unwrap()
            .unwrap();
        assert!(result["error"].is_string());
    }

    #[test]
    fn test_forget_roundtrip() {
        let (ctx, _dir) = test_ctx();
        let stored = call("remember", &ctx, Some(json!({"content": "temporary"})))
            .unwrap()
            .unwrap();
        let id = stored["id"].as_str().unwrap();
        let result = call("forget", &ctx, Some(json!({"id": id, "reason": "test"})))
            .unwrap()
            .unwrap();
        assert_eq!(result["status"], "archived");
    }

    #[test]
    fn test_unknown_name_is_none() {
        let (ctx, _dir) = test_ctx();
        assert!(call("not_a_tool", &ctx, None).is_none());
    }
}
