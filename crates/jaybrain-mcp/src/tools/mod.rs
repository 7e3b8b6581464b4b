//! MCP Tools
//!
//! Every tool is a named operation with a JSON-shaped input and output.
//! Domain-level misses and conflicts come back as data (`{"error": ...}` or
//! a `status` field); malformed arguments surface as protocol-level
//! `invalid_params`. Each module owns one domain and exposes `tools()` +
//! `call()`; the server walks the modules in order.

pub mod daemon_ctl;
pub mod forge;
pub mod graph;
pub mod jobs;
pub mod knowledge;
pub mod life;
pub mod memory;
pub mod misc;
pub mod pulse;
pub mod sessions;
pub mod tasks;
pub mod trash;

use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde_json::Value;

use jaybrain_core::{Config, Notifier, Store, StoreError};

use crate::protocol::messages::ToolDescription;

// ============================================================================
// SHARED PLUMBING
// ============================================================================

/// Dependencies handed to every tool call
#[derive(Clone)]
pub struct ToolCtx {
    pub store: Arc<Store>,
    pub config: Arc<Config>,
    pub notifier: Arc<dyn Notifier>,
}

/// Protocol-level tool failure
#[derive(Debug)]
pub enum ToolError {
    /// Bad argument shape — surfaces as JSON-RPC invalid_params
    InvalidArgs(String),
    /// Unexpected failure — surfaces as JSON-RPC internal_error
    Internal(String),
}

/// Tool handler result
pub type ToolResult = Result<Value, ToolError>;

/// Parse tool arguments into a typed struct.
pub fn parse_args<T: DeserializeOwned>(args: Option<Value>) -> Result<T, ToolError> {
    let value = args.unwrap_or(Value::Object(serde_json::Map::new()));
    serde_json::from_value(value).map_err(|e| ToolError::InvalidArgs(format!("Invalid arguments: {e}")))
}

/// A domain-level miss, returned as data.
pub fn domain_error(message: impl Into<String>) -> Value {
    serde_json::json!({ "error": message.into() })
}

/// Map a store result into the tool convention: validation errors are the
/// caller's fault (protocol error), not-found is data, the rest is internal.
pub fn store_result<T: serde::Serialize>(result: jaybrain_core::Result<T>) -> ToolResult {
    match result {
        Ok(value) => serde_json::to_value(value)
            .map_err(|e| ToolError::Internal(format!("serialization: {e}"))),
        Err(StoreError::Validation(msg)) => Err(ToolError::InvalidArgs(msg)),
        Err(StoreError::NotFound(what)) => Ok(domain_error(format!("Not found: {what}"))),
        Err(other) => Err(ToolError::Internal(other.to_string())),
    }
}

/// All tool descriptors, in listing order.
pub fn all_tools() -> Vec<ToolDescription> {
    let mut tools = Vec::new();
    tools.extend(memory::tools());
    tools.extend(tasks::tools());
    tools.extend(sessions::tools());
    tools.extend(knowledge::tools());
    tools.extend(forge::tools());
    tools.extend(graph::tools());
    tools.extend(jobs::tools());
    tools.extend(life::tools());
    tools.extend(pulse::tools());
    tools.extend(trash::tools());
    tools.extend(daemon_ctl::tools());
    tools.extend(misc::tools());
    tools
}

/// Dispatch a call to whichever module owns the name.
pub fn dispatch(name: &str, ctx: &ToolCtx, args: Option<Value>) -> Option<ToolResult> {
    memory::call(name, ctx, args.clone())
        .or_else(|| tasks::call(name, ctx, args.clone()))
        .or_else(|| sessions::call(name, ctx, args.clone()))
        .or_else(|| knowledge::call(name, ctx, args.clone()))
        .or_else(|| forge::call(name, ctx, args.clone()))
        .or_else(|| graph::call(name, ctx, args.clone()))
        .or_else(|| jobs::call(name, ctx, args.clone()))
        .or_else(|| life::call(name, ctx, args.clone()))
        .or_else(|| pulse::call(name, ctx, args.clone()))
        .or_else(|| trash::call(name, ctx, args.clone()))
        .or_else(|| daemon_ctl::call(name, ctx, args.clone()))
        .or_else(|| misc::call(name, ctx, args))
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tool_names_are_unique() {
        let tools = all_tools();
        let mut names: Vec<&str> = tools.iter().map(|t| t.name.as_str()).collect();
        let total = names.len();
        names.sort_unstable();
        names.dedup();
        assert_eq!(names.len(), total, "duplicate tool names");
    }

    #[test]
    fn test_every_tool_has_schema_and_description() {
        for tool in all_tools() {
            assert!(tool.description.is_some(), "{} missing description", tool.name);
            assert_eq!(tool.input_schema["type"], "object", "{} schema", tool.name);
        }
    }

    #[test]
    fn test_stable_tool_names_present() {
        let tools = all_tools();
        let names: std::collections::HashSet<&str> =
            tools.iter().map(|t| t.name.as_str()).collect();
        for required in [
            "remember",
            "recall",
            "deep_recall",
            "forget",
            "task_create",
            "task_list",
            "task_update",
            "queue_push",
            "queue_pop",
            "queue_view",
            "session_start",
            "session_end",
            "session_handoff",
            "knowledge_store",
            "knowledge_search",
            "knowledge_update",
            "forge_add_concept",
            "forge_record_review",
            "forge_study_queue",
            "forge_stats",
            "forge_readiness",
            "forge_calibration",
            "forge_knowledge_map",
            "forge_error_analysis",
            "graph_add_entity",
            "graph_add_relationship",
            "graph_query",
            "graph_search",
            "graph_list",
            "jobs_add",
            "jobs_search",
            "application_create",
            "application_update",
            "application_list",
            "board_add",
            "board_list",
            "interview_prep_save",
            "interview_prep_get",
            "personality_get",
            "personality_set",
            "trash_put",
            "trash_restore",
            "trash_list",
            "pulse_sessions",
            "pulse_activity",
            "pulse_query_session",
            "pulse_session_context",
            "heartbeat_run",
            "heartbeat_status",
            "daemon_status",
        ] {
            assert!(names.contains(required), "missing tool {required}");
        }
    }
}
