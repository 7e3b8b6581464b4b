//! Pulse Tools
//!
//! Cross-session awareness readers: live sessions, activity, session
//! resolution, and transcript context.

use serde::Deserialize;
use serde_json::{json, Value};

use super::{parse_args, store_result, ToolCtx, ToolResult};
use crate::protocol::messages::ToolDescription;

pub fn tools() -> Vec<ToolDescription> {
    vec![
        ToolDescription::new(
            "pulse_sessions",
            "Active assistant sessions plus those that ended in the last 24h, with heartbeat ages.",
            json!({"type": "object", "properties": {}}),
        ),
        ToolDescription::new(
            "pulse_activity",
            "Recent activity-log rows, optionally scoped to one session.",
            json!({
                "type": "object",
                "properties": {
                    "session_id": {"type": "string"},
                    "limit": {"type": "integer", "default": 50, "minimum": 1, "maximum": 500}
                }
            }),
        ),
        ToolDescription::new(
            "pulse_query_session",
            "Resolve a session id or prefix. On a unique hit, per-tool usage counts come along.",
            json!({
                "type": "object",
                "properties": {
                    "needle": {"type": "string"}
                },
                "required": ["needle"]
            }),
        ),
        ToolDescription::new(
            "pulse_session_context",
            "Read transcript context for a session: the last N turns (plus the opening), or a window around a snippet.",
            json!({
                "type": "object",
                "properties": {
                    "session": {"type": "string", "description": "Session id or prefix"},
                    "last_n": {"type": "integer", "default": 5, "minimum": 1, "maximum": 50},
                    "snippet": {"type": "string", "description": "Find this text and show the surrounding turns"}
                },
                "required": ["session"]
            }),
        ),
    ]
}

pub fn call(name: &str, ctx: &ToolCtx, args: Option<Value>) -> Option<ToolResult> {
    match name {
        "pulse_sessions" => Some(Ok(serde_json::to_value(
            jaybrain_core::pulse::get_active_sessions(&ctx.store),
        )
        .unwrap_or_default())),
        "pulse_activity" => Some(activity(ctx, args)),
        "pulse_query_session" => Some(query_session(ctx, args)),
        "pulse_session_context" => Some(session_context(ctx, args)),
        _ => None,
    }
}

// ============================================================================
// HANDLERS
// ============================================================================

#[derive(Deserialize, Default)]
#[serde(default)]
struct ActivityArgs {
    session_id: Option<String>,
    limit: Option<usize>,
}

fn activity(ctx: &ToolCtx, args: Option<Value>) -> ToolResult {
    let args: ActivityArgs = parse_args(args)?;
    let rows = store_result(jaybrain_core::pulse::get_session_activity(
        &ctx.store,
        args.session_id.as_deref(),
        args.limit.unwrap_or(50).clamp(1, 500),
    ))?;
    Ok(json!({
        "total": rows.as_array().map(|a| a.len()).unwrap_or(0),
        "activity": rows,
    }))
}

#[derive(Deserialize)]
struct QueryArgs {
    needle: String,
}

fn query_session(ctx: &ToolCtx, args: Option<Value>) -> ToolResult {
    let args: QueryArgs = parse_args(args)?;
    store_result(jaybrain_core::pulse::query_session(&ctx.store, &args.needle))
}

#[derive(Deserialize)]
struct ContextArgs {
    session: String,
    last_n: Option<usize>,
    snippet: Option<String>,
}

fn session_context(ctx: &ToolCtx, args: Option<Value>) -> ToolResult {
    let args: ContextArgs = parse_args(args)?;
    let context = jaybrain_core::pulse::get_session_context(
        &ctx.config.projects_dir,
        &args.session,
        args.last_n,
        args.snippet.as_deref(),
    );
    serde_json::to_value(context).map_err(|e| super::ToolError::Internal(e.to_string()))
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::testutil::test_ctx;
    use jaybrain_core::hooks::{handle_event, HookEvent};

    fn seed_session(ctx: &ToolCtx, session_id: &str, tool_uses: usize) {
        let path = ctx.store.path().to_path_buf();
        handle_event(
            &path,
            &HookEvent {
                hook_event_name: "SessionStart".into(),
                session_id: session_id.into(),
                cwd: "/proj".into(),
                ..Default::default()
            },
        )
        .unwrap();
        for _ in 0..tool_uses {
            handle_event(
                &path,
                &HookEvent {
                    hook_event_name: "PostToolUse".into(),
                    session_id: session_id.into(),
                    tool_name: "Read".into(),
                    ..Default::default()
                },
            )
            .unwrap();
        }
    }

    #[test]
    fn test_sessions_and_activity() {
        let (ctx, _dir) = test_ctx();
        seed_session(&ctx, "sess-pulse-01", 3);

        let overview = call("pulse_sessions", &ctx, None).unwrap().unwrap();
        assert_eq!(overview["status"], "ok");
        assert_eq!(overview["active"].as_array().unwrap().len(), 1);

        let activity = call(
            "pulse_activity",
            &ctx,
            Some(json!({"session_id": "sess-pulse-01"})),
        )
        .unwrap()
        .unwrap();
        assert_eq!(activity["total"], 4); // start + 3 tool uses
    }

    #[test]
    fn test_query_session_tool_usage() {
        let (ctx, _dir) = test_ctx();
        seed_session(&ctx, "sess-pulse-02", 5);

        let result = call(
            "pulse_query_session",
            &ctx,
            Some(json!({"needle": "sess-pulse"})),
        )
        .unwrap()
        .unwrap();
        assert_eq!(result["status"], "ok");
        assert_eq!(result["tool_usage"]["Read"], 5);
    }

    #[test]
    fn test_session_context_not_found() {
        let (ctx, _dir) = test_ctx();
        let result = call(
            "pulse_session_context",
            &ctx,
            Some(json!({"session": "ghost"})),
        )
        .unwrap()
        .unwrap();
        assert_eq!(result["status"], "not_found");
    }
}
