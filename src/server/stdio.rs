//! Stdio Transport
//!
//! Line-framed JSON-RPC 2.0 server loop. Requests are read from stdin one
//! per line and answered on stdout; logging goes to stderr so the protocol
//! channel stays clean. Tool results travel as JSON text content; soft
//! failures (like a refused claim) are successful results carrying
//! `success: false`.

use serde_json::{json, Value};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tracing::{debug, warn};

use crate::server::protocol::{
    JsonRpcRequest, JsonRpcResponse, INTERNAL_ERROR, INVALID_PARAMS, METHOD_NOT_FOUND,
    PARSE_ERROR, PROTOCOL_VERSION,
};
use crate::server::tools::ToolRegistry;
use crate::utils::error::{AppError, AppResult};

/// Server name reported by `initialize`
const SERVER_NAME: &str = "task-fleet";

/// Stdio JSON-RPC server over a tool registry
pub struct StdioServer {
    registry: ToolRegistry,
}

impl StdioServer {
    pub fn new(registry: ToolRegistry) -> Self {
        Self { registry }
    }

    /// Serve requests until stdin closes
    pub async fn run(&self) -> AppResult<()> {
        let stdin = tokio::io::stdin();
        let mut stdout = tokio::io::stdout();
        let mut lines = BufReader::new(stdin).lines();

        while let Some(line) = lines
            .next_line()
            .await
            .map_err(|e| AppError::internal(format!("stdin read failed: {}", e)))?
        {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }

            let request: JsonRpcRequest = match serde_json::from_str(line) {
                Ok(request) => request,
                Err(e) => {
                    warn!(error = %e, "unparseable request line");
                    let response = JsonRpcResponse::failure(
                        Value::Null,
                        PARSE_ERROR,
                        format!("Parse error: {}", e),
                    );
                    write_response(&mut stdout, &response).await?;
                    continue;
                }
            };

            // Notifications get no response
            let id = match request.id {
                Some(id) => id,
                None => {
                    debug!(method = %request.method, "notification consumed");
                    continue;
                }
            };

            let response = self.dispatch(id, &request.method, request.params).await;
            write_response(&mut stdout, &response).await?;
        }

        Ok(())
    }

    async fn dispatch(&self, id: Value, method: &str, params: Option<Value>) -> JsonRpcResponse {
        debug!(method, "dispatching request");
        match method {
            "initialize" => JsonRpcResponse::success(
                id,
                json!({
                    "protocolVersion": PROTOCOL_VERSION,
                    "capabilities": { "tools": {} },
                    "serverInfo": {
                        "name": SERVER_NAME,
                        "version": env!("CARGO_PKG_VERSION"),
                    },
                }),
            ),
            "ping" => JsonRpcResponse::success(id, json!({})),
            "tools/list" => JsonRpcResponse::success(
                id,
                json!({ "tools": self.registry.definitions() }),
            ),
            "tools/call" => self.call_tool(id, params).await,
            other => JsonRpcResponse::failure(
                id,
                METHOD_NOT_FOUND,
                format!("Method not found: {}", other),
            ),
        }
    }

    async fn call_tool(&self, id: Value, params: Option<Value>) -> JsonRpcResponse {
        let params = match params {
            Some(params) => params,
            None => {
                return JsonRpcResponse::failure(id, INVALID_PARAMS, "Missing call parameters")
            }
        };
        let name = match params.get("name").and_then(|n| n.as_str()) {
            Some(name) => name.to_string(),
            None => {
                return JsonRpcResponse::failure(id, INVALID_PARAMS, "Missing tool name")
            }
        };
        let arguments = params.get("arguments").cloned().unwrap_or(Value::Null);

        match self.registry.execute(&name, arguments).await {
            Ok(result) => JsonRpcResponse::success(id, tool_content(&result, false)),
            // Tool failures are results with isError, not protocol errors
            Err(AppError::Internal(message)) => {
                JsonRpcResponse::failure(id, INTERNAL_ERROR, message)
            }
            Err(e) => JsonRpcResponse::success(id, tool_content(&json!(e.to_string()), true)),
        }
    }
}

/// Wrap a tool result in the transport's content envelope
fn tool_content(result: &Value, is_error: bool) -> Value {
    let text = match result {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    };
    json!({
        "content": [{ "type": "text", "text": text }],
        "isError": is_error,
    })
}

async fn write_response(
    stdout: &mut tokio::io::Stdout,
    response: &JsonRpcResponse,
) -> AppResult<()> {
    let mut payload = serde_json::to_string(response)?;
    payload.push('\n');
    stdout
        .write_all(payload.as_bytes())
        .await
        .map_err(|e| AppError::internal(format!("stdout write failed: {}", e)))?;
    stdout
        .flush()
        .await
        .map_err(|e| AppError::internal(format!("stdout flush failed: {}", e)))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::server::tools::coordinator_registry;
    use crate::services::coordinator::CoordinatorService;
    use crate::services::worktree::GitDriver;
    use crate::storage::TaskStore;
    use std::sync::Arc;

    fn test_server() -> StdioServer {
        let store = TaskStore::in_memory().unwrap();
        let service = Arc::new(CoordinatorService::new(
            store,
            GitDriver::open(std::env::temp_dir()),
        ));
        StdioServer::new(coordinator_registry(service))
    }

    #[tokio::test]
    async fn test_initialize_reports_capabilities() {
        let server = test_server();
        let response = server.dispatch(json!(1), "initialize", None).await;
        let result = response.result.unwrap();
        assert_eq!(result["protocolVersion"], json!(PROTOCOL_VERSION));
        assert_eq!(result["serverInfo"]["name"], json!("task-fleet"));
        assert!(result["capabilities"]["tools"].is_object());
    }

    #[tokio::test]
    async fn test_tools_list_returns_nine_tools() {
        let server = test_server();
        let response = server.dispatch(json!(2), "tools/list", None).await;
        let result = response.result.unwrap();
        assert_eq!(result["tools"].as_array().unwrap().len(), 9);
    }

    #[tokio::test]
    async fn test_unknown_method_fails() {
        let server = test_server();
        let response = server.dispatch(json!(3), "resources/list", None).await;
        let error = response.error.unwrap();
        assert_eq!(error.code, METHOD_NOT_FOUND);
    }

    #[tokio::test]
    async fn test_tools_call_requires_name() {
        let server = test_server();
        let response = server
            .dispatch(json!(4), "tools/call", Some(json!({"arguments": {}})))
            .await;
        assert_eq!(response.error.unwrap().code, INVALID_PARAMS);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_tools_call_round_trip() {
        let server = test_server();
        let response = server
            .dispatch(
                json!(5),
                "tools/call",
                Some(json!({
                    "name": "create_tasks",
                    "arguments": {
                        "title": "Blog",
                        "tasks": [{ "title": "DB Schema" }]
                    }
                })),
            )
            .await;
        let result = response.result.unwrap();
        assert_eq!(result["isError"], json!(false));
        let text = result["content"][0]["text"].as_str().unwrap();
        let payload: Value = serde_json::from_str(text).unwrap();
        assert_eq!(payload["tasks"][0]["sequence"], json!(1));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_tools_call_surfaces_tool_error_as_result() {
        let server = test_server();
        let response = server
            .dispatch(
                json!(6),
                "tools/call",
                Some(json!({
                    "name": "get_task",
                    "arguments": { "task_id": "missing" }
                })),
            )
            .await;
        let result = response.result.unwrap();
        assert_eq!(result["isError"], json!(true));
        assert!(result["content"][0]["text"]
            .as_str()
            .unwrap()
            .contains("Not found"));
    }

    #[test]
    fn test_tool_content_wraps_plain_strings() {
        let wrapped = tool_content(&json!("boom"), true);
        assert_eq!(wrapped["content"][0]["text"], json!("boom"));
        assert_eq!(wrapped["isError"], json!(true));
    }
}
