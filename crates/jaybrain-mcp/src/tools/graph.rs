//! Graph Tools
//!
//! `graph_add_entity`, `graph_add_relationship`, `graph_query`,
//! `graph_search`, `graph_list`.

use serde::Deserialize;
use serde_json::{json, Map, Value};

use super::{domain_error, parse_args, store_result, ToolCtx, ToolResult};
use crate::protocol::messages::ToolDescription;

pub fn tools() -> Vec<ToolDescription> {
    vec![
        ToolDescription::new(
            "graph_add_entity",
            "Add or merge an entity keyed on (name, type). Re-adding merges: aliases and evidence union, properties shallow-merge.",
            json!({
                "type": "object",
                "properties": {
                    "name": {"type": "string"},
                    "entity_type": {"type": "string", "description": "person, project, tool, skill, concept, ..."},
                    "description": {"type": "string", "default": ""},
                    "aliases": {"type": "array", "items": {"type": "string"}},
                    "memory_ids": {"type": "array", "items": {"type": "string"}},
                    "properties": {"type": "object"}
                },
                "required": ["name", "entity_type"]
            }),
        ),
        ToolDescription::new(
            "graph_add_relationship",
            "Add or merge a typed weighted edge keyed on (source, target, type). Endpoints resolve by id or unique name.",
            json!({
                "type": "object",
                "properties": {
                    "source": {"type": "string"},
                    "target": {"type": "string"},
                    "rel_type": {"type": "string"},
                    "weight": {"type": "number", "default": 1.0, "minimum": 0.0, "maximum": 1.0},
                    "evidence_ids": {"type": "array", "items": {"type": "string"}},
                    "properties": {"type": "object"}
                },
                "required": ["source", "target", "rel_type"]
            }),
        ),
        ToolDescription::new(
            "graph_query",
            "BFS neighborhood around an entity (id or name), up to depth 3.",
            json!({
                "type": "object",
                "properties": {
                    "center": {"type": "string"},
                    "depth": {"type": "integer", "default": 1, "minimum": 1, "maximum": 3},
                    "entity_type": {"type": "string"}
                },
                "required": ["center"]
            }),
        ),
        ToolDescription::new(
            "graph_search",
            "Case-insensitive substring search on entity names.",
            json!({
                "type": "object",
                "properties": {
                    "query": {"type": "string"},
                    "entity_type": {"type": "string"},
                    "limit": {"type": "integer", "default": 20, "minimum": 1, "maximum": 100}
                },
                "required": ["query"]
            }),
        ),
        ToolDescription::new(
            "graph_list",
            "List entities, optionally filtered by type.",
            json!({
                "type": "object",
                "properties": {
                    "entity_type": {"type": "string"},
                    "limit": {"type": "integer", "default": 100, "minimum": 1, "maximum": 1000}
                }
            }),
        ),
    ]
}

pub fn call(name: &str, ctx: &ToolCtx, args: Option<Value>) -> Option<ToolResult> {
    match name {
        "graph_add_entity" => Some(add_entity(ctx, args)),
        "graph_add_relationship" => Some(add_relationship(ctx, args)),
        "graph_query" => Some(query(ctx, args)),
        "graph_search" => Some(search(ctx, args)),
        "graph_list" => Some(list(ctx, args)),
        _ => None,
    }
}

// ============================================================================
// HANDLERS
// ============================================================================

#[derive(Deserialize)]
struct EntityArgs {
    name: String,
    entity_type: String,
    #[serde(default)]
    description: String,
    #[serde(default)]
    aliases: Vec<String>,
    #[serde(default)]
    memory_ids: Vec<String>,
    properties: Option<Map<String, Value>>,
}

fn add_entity(ctx: &ToolCtx, args: Option<Value>) -> ToolResult {
    let args: EntityArgs = parse_args(args)?;
    store_result(ctx.store.add_entity(
        &args.name,
        &args.entity_type,
        &args.description,
        &args.aliases,
        &args.memory_ids,
        args.properties.as_ref(),
    ))
}

#[derive(Deserialize)]
struct RelArgs {
    source: String,
    target: String,
    rel_type: String,
    weight: Option<f64>,
    #[serde(default)]
    evidence_ids: Vec<String>,
    properties: Option<Map<String, Value>>,
}

fn add_relationship(ctx: &ToolCtx, args: Option<Value>) -> ToolResult {
    let args: RelArgs = parse_args(args)?;
    store_result(ctx.store.add_relationship(
        &args.source,
        &args.target,
        &args.rel_type,
        args.weight.unwrap_or(1.0),
        &args.evidence_ids,
        args.properties.as_ref(),
    ))
}

#[derive(Deserialize)]
struct QueryArgs {
    center: String,
    depth: Option<usize>,
    entity_type: Option<String>,
}

fn query(ctx: &ToolCtx, args: Option<Value>) -> ToolResult {
    let args: QueryArgs = parse_args(args)?;
    let hood = store_result(ctx.store.query_neighborhood(
        &args.center,
        args.depth.unwrap_or(jaybrain_core::GRAPH_DEFAULT_DEPTH),
        args.entity_type.as_deref(),
    ))?;
    if hood.is_null() {
        Ok(domain_error(format!("Entity not found: {}", args.center)))
    } else {
        Ok(hood)
    }
}

#[derive(Deserialize)]
struct SearchArgs {
    query: String,
    entity_type: Option<String>,
    limit: Option<usize>,
}

fn search(ctx: &ToolCtx, args: Option<Value>) -> ToolResult {
    let args: SearchArgs = parse_args(args)?;
    let entities = store_result(ctx.store.search_entities(
        &args.query,
        args.entity_type.as_deref(),
        args.limit.unwrap_or(20),
    ))?;
    Ok(json!({
        "total": entities.as_array().map(|a| a.len()).unwrap_or(0),
        "entities": entities,
    }))
}

#[derive(Deserialize, Default)]
#[serde(default)]
struct ListArgs {
    entity_type: Option<String>,
    limit: Option<usize>,
}

fn list(ctx: &ToolCtx, args: Option<Value>) -> ToolResult {
    let args: ListArgs = parse_args(args)?;
    let entities = store_result(
        ctx.store
            .list_entities(args.entity_type.as_deref(), args.limit.unwrap_or(100)),
    )?;
    Ok(json!({
        "total": entities.as_array().map(|a| a.len()).unwrap_or(0),
        "entities": entities,
    }))
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::testutil::test_ctx;

    #[test]
    fn test_double_add_merges_aliases() {
        let (ctx, _dir) = test_ctx();
        call(
            "graph_add_entity",
            &ctx,
            Some(json!({"name": "Rust", "entity_type": "skill", "aliases": ["rustlang"]})),
        )
        .unwrap()
        .unwrap();

        let merged = call(
            "graph_add_entity",
            &ctx,
            Some(json!({"name": "Rust", "entity_type": "skill", "aliases": ["rs"]})),
        )
        .unwrap()
        .unwrap();
        assert_eq!(merged["status"], "updated");
        assert_eq!(
            merged["entity"]["aliases"],
            json!(["rs", "rustlang"])
        );
    }

    #[test]
    fn test_relationship_missing_endpoint_is_data() {
        let (ctx, _dir) = test_ctx();
        call(
            "graph_add_entity",
            &ctx,
            Some(json!({"name": "Alice", "entity_type": "person"})),
        )
        .unwrap()
        .unwrap();

        let result = call(
            "graph_add_relationship",
            &ctx,
            Some(json!({"source": "Alice", "target": "Ghost", "rel_type": "knows"})),
        )
        .unwrap()
        .unwrap();
        assert!(result["error"].as_str().unwrap().contains("Ghost"));
    }

    #[test]
    fn test_query_neighborhood_shape() {
        let (ctx, _dir) = test_ctx();
        for name in ["A", "B"] {
            call(
                "graph_add_entity",
                &ctx,
                Some(json!({"name": name, "entity_type": "concept"})),
            )
            .unwrap()
            .unwrap();
        }
        call(
            "graph_add_relationship",
            &ctx,
            Some(json!({"source": "A", "target": "B", "rel_type": "linked"})),
        )
        .unwrap()
        .unwrap();

        let hood = call("graph_query", &ctx, Some(json!({"center": "A"})))
            .unwrap()
            .unwrap();
        assert_eq!(hood["entityCount"], 2);
        assert_eq!(hood["relationshipCount"], 1);
        assert_eq!(hood["center"]["name"], "A");
    }

    #[test]
    fn test_query_unknown_center() {
        let (ctx, _dir) = test_ctx();
        let result = call("graph_query", &ctx, Some(json!({"center": "Nobody"})))
            .unwrap()
            .unwrap();
        assert!(result["error"].is_string());
    }
}
