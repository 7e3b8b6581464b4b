//! Life-Domain Tools
//!
//! Domains with hour targets, goals with progress, and the time-allocation
//! report that compares the two.

use serde::Deserialize;
use serde_json::{json, Value};

use super::{domain_error, parse_args, store_result, ToolCtx, ToolResult};
use crate::protocol::messages::ToolDescription;

pub fn tools() -> Vec<ToolDescription> {
    vec![
        ToolDescription::new(
            "life_domains",
            "List life domains by priority, or upsert one when name is given.",
            json!({
                "type": "object",
                "properties": {
                    "name": {"type": "string"},
                    "description": {"type": "string", "default": ""},
                    "priority": {"type": "integer", "default": 0},
                    "hours_per_week": {"type": "number", "default": 0.0}
                }
            }),
        ),
        ToolDescription::new(
            "life_goal_create",
            "Create a goal in a domain.",
            json!({
                "type": "object",
                "properties": {
                    "domain_id": {"type": "string"},
                    "title": {"type": "string"},
                    "target_date": {"type": "string", "description": "YYYY-MM-DD"}
                },
                "required": ["domain_id", "title"]
            }),
        ),
        ToolDescription::new(
            "life_goal_update",
            "Update goal progress (clamped to [0,1]; 1.0 completes it) or status.",
            json!({
                "type": "object",
                "properties": {
                    "id": {"type": "string"},
                    "progress": {"type": "number", "minimum": 0.0, "maximum": 1.0},
                    "status": {"type": "string"}
                },
                "required": ["id"]
            }),
        ),
        ToolDescription::new(
            "time_allocation_report",
            "Actual hours per domain (from the pulse activity log) vs weekly targets.",
            json!({"type": "object", "properties": {}}),
        ),
    ]
}

pub fn call(name: &str, ctx: &ToolCtx, args: Option<Value>) -> Option<ToolResult> {
    match name {
        "life_domains" => Some(domains(ctx, args)),
        "life_goal_create" => Some(goal_create(ctx, args)),
        "life_goal_update" => Some(goal_update(ctx, args)),
        "time_allocation_report" => Some(store_result(
            jaybrain_core::time_allocation::weekly_report(&ctx.store, &ctx.config),
        )),
        _ => None,
    }
}

// ============================================================================
// HANDLERS
// ============================================================================

#[derive(Deserialize, Default)]
#[serde(default)]
struct DomainArgs {
    name: Option<String>,
    description: String,
    priority: i64,
    hours_per_week: f64,
}

fn domains(ctx: &ToolCtx, args: Option<Value>) -> ToolResult {
    let args: DomainArgs = parse_args(args)?;
    if let Some(name) = args.name {
        return store_result(ctx.store.life_domain_upsert(
            &name,
            &args.description,
            args.priority,
            args.hours_per_week,
        ));
    }
    let domains = store_result(ctx.store.life_domains())?;
    Ok(json!({
        "total": domains.as_array().map(|a| a.len()).unwrap_or(0),
        "domains": domains,
    }))
}

#[derive(Deserialize)]
struct GoalCreateArgs {
    domain_id: String,
    title: String,
    target_date: Option<String>,
}

fn goal_create(ctx: &ToolCtx, args: Option<Value>) -> ToolResult {
    let args: GoalCreateArgs = parse_args(args)?;
    store_result(ctx.store.life_goal_create(
        &args.domain_id,
        &args.title,
        args.target_date.as_deref(),
    ))
}

#[derive(Deserialize)]
struct GoalUpdateArgs {
    id: String,
    progress: Option<f64>,
    status: Option<String>,
}

fn goal_update(ctx: &ToolCtx, args: Option<Value>) -> ToolResult {
    let args: GoalUpdateArgs = parse_args(args)?;
    let updated = store_result(ctx.store.life_goal_update(
        &args.id,
        args.progress,
        args.status.as_deref(),
    ))?;
    if updated.is_null() {
        Ok(domain_error(format!("Goal not found: {}", args.id)))
    } else {
        Ok(updated)
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::testutil::test_ctx;

    #[test]
    fn test_domain_upsert_and_goal_flow() {
        let (ctx, _dir) = test_ctx();
        let domain = call(
            "life_domains",
            &ctx,
            Some(json!({"name": "Career", "priority": 9, "hours_per_week": 20.0})),
        )
        .unwrap()
        .unwrap();
        let domain_id = domain["id"].as_str().unwrap();

        let goal = call(
            "life_goal_create",
            &ctx,
            Some(json!({"domain_id": domain_id, "title": "land the platform role"})),
        )
        .unwrap()
        .unwrap();

        let updated = call(
            "life_goal_update",
            &ctx,
            Some(json!({"id": goal["id"].as_str().unwrap(), "progress": 1.0})),
        )
        .unwrap()
        .unwrap();
        assert_eq!(updated["status"], "completed");
    }

    #[test]
    fn test_list_domains() {
        let (ctx, _dir) = test_ctx();
        call("life_domains", &ctx, Some(json!({"name": "Health"})))
            .unwrap()
            .unwrap();
        let listed = call("life_domains", &ctx, None).unwrap().unwrap();
        assert_eq!(listed["total"], 1);
    }
}
