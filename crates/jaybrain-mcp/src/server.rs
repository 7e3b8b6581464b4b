//! MCP Server Core
//!
//! Routes JSON-RPC requests to the tool modules. Tool handlers run on the
//! blocking pool since the store and the embedding model are synchronous.

use std::collections::HashMap;

use tracing::{debug, info, warn};

use crate::protocol::messages::{
    CallToolRequest, CallToolResult, InitializeRequest, InitializeResult, ListToolsResult,
    ServerCapabilities, ServerInfo,
};
use crate::protocol::types::{JsonRpcError, JsonRpcRequest, JsonRpcResponse, MCP_VERSION};
use crate::tools::{self, ToolCtx, ToolError};

/// MCP server state
pub struct McpServer {
    ctx: ToolCtx,
    initialized: bool,
}

impl McpServer {
    pub fn new(ctx: ToolCtx) -> Self {
        Self {
            ctx,
            initialized: false,
        }
    }

    /// Handle one JSON-RPC request. Notifications return `None`.
    pub async fn handle_request(&mut self, request: JsonRpcRequest) -> Option<JsonRpcResponse> {
        debug!("Handling request: {}", request.method);

        if !self.initialized
            && request.method != "initialize"
            && request.method != "notifications/initialized"
        {
            warn!("Rejecting request '{}': server not initialized", request.method);
            return Some(JsonRpcResponse::error(
                request.id,
                JsonRpcError::server_not_initialized(),
            ));
        }

        let result = match request.method.as_str() {
            "initialize" => self.handle_initialize(request.params),
            "notifications/initialized" => return None,
            "tools/list" => self.handle_tools_list(),
            "tools/call" => self.handle_tools_call(request.params).await,
            "ping" => Ok(serde_json::json!({})),
            method => {
                warn!("Unknown method: {}", method);
                Err(JsonRpcError::method_not_found())
            }
        };

        Some(match result {
            Ok(value) => JsonRpcResponse::success(request.id, value),
            Err(error) => JsonRpcResponse::error(request.id, error),
        })
    }

    fn handle_initialize(
        &mut self,
        params: Option<serde_json::Value>,
    ) -> Result<serde_json::Value, JsonRpcError> {
        let request: InitializeRequest = match params {
            Some(p) => serde_json::from_value(p)
                .map_err(|e| JsonRpcError::invalid_params(&e.to_string()))?,
            None => InitializeRequest::default(),
        };

        // Version negotiation: use the client's version when it's older
        let negotiated = if request.protocol_version.as_str() < MCP_VERSION {
            info!(
                "Client requested older protocol version {}, using it",
                request.protocol_version
            );
            request.protocol_version.clone()
        } else {
            MCP_VERSION.to_string()
        };

        self.initialized = true;
        info!("MCP session initialized with protocol version {}", negotiated);

        let result = InitializeResult {
            protocol_version: negotiated,
            server_info: ServerInfo {
                name: "jaybrain".to_string(),
                version: env!("CARGO_PKG_VERSION").to_string(),
            },
            capabilities: ServerCapabilities {
                tools: Some({
                    let mut map = HashMap::new();
                    map.insert("listChanged".to_string(), serde_json::json!(false));
                    map
                }),
                resources: None,
            },
            instructions: Some(
                "JayBrain is your memory and automation substrate. Use remember/recall for \
                 durable context, tasks and the queue for work tracking, forge_* for spaced \
                 repetition study, and graph_* to build the entity graph. Memories decay \
                 unless recalled; importance slows the decay."
                    .to_string(),
            ),
        };

        serde_json::to_value(result).map_err(|e| JsonRpcError::internal_error(&e.to_string()))
    }

    fn handle_tools_list(&self) -> Result<serde_json::Value, JsonRpcError> {
        let result = ListToolsResult {
            tools: tools::all_tools(),
        };
        serde_json::to_value(result).map_err(|e| JsonRpcError::internal_error(&e.to_string()))
    }

    async fn handle_tools_call(
        &self,
        params: Option<serde_json::Value>,
    ) -> Result<serde_json::Value, JsonRpcError> {
        let request: CallToolRequest = match params {
            Some(p) => serde_json::from_value(p)
                .map_err(|e| JsonRpcError::invalid_params(&e.to_string()))?,
            None => return Err(JsonRpcError::invalid_params("missing params")),
        };

        let ctx = self.ctx.clone();
        let name = request.name.clone();
        let arguments = request.arguments.clone();

        // Store + embedding work is synchronous; keep it off the reactor
        let outcome = tokio::task::spawn_blocking(move || tools::dispatch(&name, &ctx, arguments))
            .await
            .map_err(|e| JsonRpcError::internal_error(&format!("tool panicked: {e}")))?;

        match outcome {
            None => Err(JsonRpcError::invalid_params(&format!(
                "Unknown tool: {}",
                request.name
            ))),
            Some(Ok(value)) => serde_json::to_value(CallToolResult::json(&value))
                .map_err(|e| JsonRpcError::internal_error(&e.to_string())),
            Some(Err(ToolError::InvalidArgs(msg))) => Err(JsonRpcError::invalid_params(&msg)),
            Some(Err(ToolError::Internal(msg))) => Err(JsonRpcError::internal_error(&msg)),
        }
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::testutil::test_ctx;
    use serde_json::{json, Value};

    fn request(method: &str, params: Option<Value>) -> JsonRpcRequest {
        JsonRpcRequest {
            jsonrpc: "2.0".into(),
            id: Some(json!(1)),
            method: method.into(),
            params,
        }
    }

    async fn initialized_server() -> (McpServer, tempfile::TempDir) {
        let (ctx, dir) = test_ctx();
        let mut server = McpServer::new(ctx);
        server
            .handle_request(request("initialize", Some(json!({}))))
            .await
            .unwrap();
        (server, dir)
    }

    #[tokio::test]
    async fn test_requests_rejected_before_initialize() {
        let (ctx, _dir) = test_ctx();
        let mut server = McpServer::new(ctx);
        let response = server
            .handle_request(request("tools/list", None))
            .await
            .unwrap();
        assert_eq!(response.error.unwrap().code, -32003);
    }

    #[tokio::test]
    async fn test_initialize_then_list_tools() {
        let (mut server, _dir) = initialized_server().await;
        let response = server
            .handle_request(request("tools/list", None))
            .await
            .unwrap();
        let tools = response.result.unwrap();
        assert!(tools["tools"].as_array().unwrap().len() > 40);
    }

    #[tokio::test]
    async fn test_tool_call_roundtrip() {
        let (mut server, _dir) = initialized_server().await;
        let response = server
            .handle_request(request(
                "tools/call",
                Some(json!({
                    "name": "remember",
                    "arguments": {"content": "server test memory"}
                })),
            ))
            .await
            .unwrap();
        let result = response.result.unwrap();
        assert_eq!(result["isError"], false);
        let text = result["content"][0]["text"].as_str().unwrap();
        assert!(text.contains("server test memory"));
    }

    #[tokio::test]
    async fn test_unknown_tool_is_invalid_params() {
        let (mut server, _dir) = initialized_server().await;
        let response = server
            .handle_request(request(
                "tools/call",
                Some(json!({"name": "no_such_tool"})),
            ))
            .await
            .unwrap();
        assert_eq!(response.error.unwrap().code, -32602);
    }

    #[tokio::test]
    async fn test_unknown_method() {
        let (mut server, _dir) = initialized_server().await;
        let response = server
            .handle_request(request("bogus/method", None))
            .await
            .unwrap();
        assert_eq!(response.error.unwrap().code, -32601);
    }

    #[tokio::test]
    async fn test_notification_gets_no_response() {
        let (mut server, _dir) = initialized_server().await;
        let notification = JsonRpcRequest {
            jsonrpc: "2.0".into(),
            id: None,
            method: "notifications/initialized".into(),
            params: None,
        };
        assert!(server.handle_request(notification).await.is_none());
    }
}
