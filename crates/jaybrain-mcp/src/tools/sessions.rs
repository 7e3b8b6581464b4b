//! Session Tools
//!
//! `session_start`, `session_end`, `session_handoff`. The active-session
//! pointer file under the data dir tracks the current session for the
//! cleanup hook.

use serde::Deserialize;
use serde_json::{json, Value};

use jaybrain_core::sessions::{
    clear_active_session, read_active_session, write_active_session, write_handoff,
};

use super::{domain_error, parse_args, store_result, ToolCtx, ToolError, ToolResult};
use crate::protocol::messages::ToolDescription;

pub fn tools() -> Vec<ToolDescription> {
    vec![
        ToolDescription::new(
            "session_start",
            "Start a work session and set it as the active session.",
            json!({
                "type": "object",
                "properties": {
                    "title": {"type": "string", "default": ""}
                }
            }),
        ),
        ToolDescription::new(
            "session_end",
            "End a session with its summary, decisions, and next steps. Omitting id ends the active session.",
            json!({
                "type": "object",
                "properties": {
                    "id": {"type": "string"},
                    "summary": {"type": "string", "default": ""},
                    "decisions_made": {"type": "array", "items": {"type": "string"}},
                    "next_steps": {"type": "array", "items": {"type": "string"}}
                }
            }),
        ),
        ToolDescription::new(
            "session_handoff",
            "Write a human-readable markdown handoff for a session under data/sessions/.",
            json!({
                "type": "object",
                "properties": {
                    "id": {"type": "string"}
                },
                "required": ["id"]
            }),
        ),
    ]
}

pub fn call(name: &str, ctx: &ToolCtx, args: Option<Value>) -> Option<ToolResult> {
    match name {
        "session_start" => Some(session_start(ctx, args)),
        "session_end" => Some(session_end(ctx, args)),
        "session_handoff" => Some(session_handoff(ctx, args)),
        _ => None,
    }
}

// ============================================================================
// HANDLERS
// ============================================================================

#[derive(Deserialize)]
struct StartArgs {
    #[serde(default)]
    title: String,
}

fn session_start(ctx: &ToolCtx, args: Option<Value>) -> ToolResult {
    let args: StartArgs = parse_args(args)?;
    let session = ctx
        .store
        .session_start(&args.title)
        .map_err(|e| ToolError::Internal(e.to_string()))?;
    write_active_session(&ctx.config.data_dir, &session.id)
        .map_err(|e| ToolError::Internal(e.to_string()))?;
    store_result(Ok(session))
}

#[derive(Deserialize, Default)]
#[serde(default)]
struct EndArgs {
    id: Option<String>,
    summary: String,
    decisions_made: Vec<String>,
    next_steps: Vec<String>,
}

fn session_end(ctx: &ToolCtx, args: Option<Value>) -> ToolResult {
    let args: EndArgs = parse_args(args)?;
    let id = match args.id.or_else(|| read_active_session(&ctx.config.data_dir)) {
        Some(id) => id,
        None => return Ok(domain_error("No active session and no id given")),
    };

    let ended = store_result(ctx.store.session_end(
        &id,
        &args.summary,
        &args.decisions_made,
        &args.next_steps,
    ))?;
    if ended.is_null() {
        return Ok(domain_error(format!("Session not found: {id}")));
    }
    let _ = clear_active_session(&ctx.config.data_dir);
    Ok(ended)
}

#[derive(Deserialize)]
struct HandoffArgs {
    id: String,
}

fn session_handoff(ctx: &ToolCtx, args: Option<Value>) -> ToolResult {
    let args: HandoffArgs = parse_args(args)?;
    let Some(session) = ctx
        .store
        .get_session(&args.id)
        .map_err(|e| ToolError::Internal(e.to_string()))?
    else {
        return Ok(domain_error(format!("Session not found: {}", args.id)));
    };
    let path = write_handoff(&ctx.config.data_dir, &session)
        .map_err(|e| ToolError::Internal(e.to_string()))?;
    Ok(json!({
        "status": "written",
        "path": path.display().to_string(),
        "session": session.id,
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
    fn test_start_sets_active_pointer() {
        let (ctx, _dir) = test_ctx();
        let session = call("session_start", &ctx, Some(json!({"title": "debugging"})))
            .unwrap()
            .unwrap();
        let id = session["id"].as_str().unwrap();
        assert_eq!(
            read_active_session(&ctx.config.data_dir).as_deref(),
            Some(id)
        );
    }

    #[test]
    fn test_end_uses_active_session_and_clears_pointer() {
        let (ctx, _dir) = test_ctx();
        call("session_start", &ctx, Some(json!({"title": "work"})))
            .unwrap()
            .unwrap();

        let ended = call(
            "session_end",
            &ctx,
            Some(json!({"summary": "shipped", "decisions_made": ["kept WAL"]})),
        )
        .unwrap()
        .unwrap();
        assert!(ended["endedAt"].is_string());
        assert!(read_active_session(&ctx.config.data_dir).is_none());
    }

    #[test]
    fn test_end_without_active_session_is_domain_error() {
        let (ctx, _dir) = test_ctx();
        let result = call("session_end", &ctx, None).unwrap().unwrap();
        assert!(result["error"].is_string());
    }

    #[test]
    fn test_handoff_writes_file() {
        let (ctx, _dir) = test_ctx();
        let session = call("session_start", &ctx, Some(json!({"title": "handoff me"})))
            .unwrap()
            .unwrap();
        let id = session["id"].as_str().unwrap();

        let result = call("session_handoff", &ctx, Some(json!({"id": id})))
            .unwrap()
            .unwrap();
        assert_eq!(result["status"], "written");
        let path = result["path"].as_str().unwrap();
        assert!(std::path::Path::new(path).exists());
    }
}
