// MCP server loop over stdio
//
// Reads newline-delimited JSON-RPC requests from stdin and writes responses
// to stdout. Malformed lines produce parse errors, unknown methods produce
// method-not-found, and notifications get no response. All diagnostics go
// to stderr via tracing so stdout stays protocol-clean.

use anyhow::Result;
use serde::Serialize;
use serde_json::{json, Value};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tracing::{debug, info, warn};

use crate::tools::{ToolContext, ToolExecutor};

use super::protocol::{
    CallToolParams, CallToolResult, InitializeResult, JsonRpcError, JsonRpcRequest,
    JsonRpcResponse, ListToolsResult, ServerCapabilities, ServerInfo, INTERNAL_ERROR,
    INVALID_PARAMS, METHOD_NOT_FOUND, PARSE_ERROR, PROTOCOL_VERSION,
};

pub struct McpServer {
    executor: ToolExecutor,
    context: ToolContext,
}

impl McpServer {
    pub fn new(executor: ToolExecutor, context: ToolContext) -> Self {
        Self { executor, context }
    }

    /// Serve until stdin closes.
    pub async fn run(&self) -> Result<()> {
        let stdin = tokio::io::stdin();
        let mut stdout = tokio::io::stdout();
        let mut lines = BufReader::new(stdin).lines();

        info!(
            tools = self.executor.registry().len(),
            "MCP server listening on stdio"
        );

        while let Some(line) = lines.next_line().await? {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            if let Some(response) = self.handle_line(line).await {
                let mut payload = serde_json::to_string(&response)?;
                payload.push('\n');
                stdout.write_all(payload.as_bytes()).await?;
                stdout.flush().await?;
            }
        }

        info!("stdin closed; shutting down");
        Ok(())
    }

    /// Handle one raw request line. Returns None when no response is due.
    pub async fn handle_line(&self, line: &str) -> Option<JsonRpcResponse> {
        let request: JsonRpcRequest = match serde_json::from_str(line) {
            Ok(request) => request,
            Err(e) => {
                warn!("failed to parse request: {e}");
                return Some(JsonRpcResponse::failure(
                    Value::Null,
                    JsonRpcError::new(PARSE_ERROR, format!("Parse error: {e}")),
                ));
            }
        };

        if request.method.starts_with("notifications/") {
            debug!(method = %request.method, "notification received");
            return None;
        }

        let is_notification = request.is_notification();
        let id = request.id.unwrap_or(Value::Null);
        let response = match self.dispatch(&request.method, request.params).await {
            Ok(result) => JsonRpcResponse::success(id, result),
            Err(error) => JsonRpcResponse::failure(id, error),
        };

        if is_notification {
            None
        } else {
            Some(response)
        }
    }

    /// Dispatch one MCP method.
    pub async fn dispatch(&self, method: &str, params: Value) -> Result<Value, JsonRpcError> {
        match method {
            "initialize" => to_result_value(InitializeResult {
                protocol_version: PROTOCOL_VERSION,
                capabilities: ServerCapabilities::default(),
                server_info: ServerInfo {
                    name: env!("CARGO_PKG_NAME").to_string(),
                    version: env!("CARGO_PKG_VERSION").to_string(),
                },
            }),
            "ping" => Ok(json!({})),
            "tools/list" => to_result_value(ListToolsResult {
                tools: self.executor.registry().definitions(),
            }),
            "tools/call" => {
                let params: CallToolParams = serde_json::from_value(params).map_err(|e| {
                    JsonRpcError::new(INVALID_PARAMS, format!("Invalid tools/call params: {e}"))
                })?;
                let output = self
                    .executor
                    .execute_tool(&params.name, params.arguments, &self.context)
                    .await;
                to_result_value(CallToolResult::from(output))
            }
            other => Err(JsonRpcError::new(
                METHOD_NOT_FOUND,
                format!("Method not found: {other}"),
            )),
        }
    }
}

fn to_result_value<T: Serialize>(value: T) -> Result<Value, JsonRpcError> {
    serde_json::to_value(value)
        .map_err(|e| JsonRpcError::new(INTERNAL_ERROR, format!("Serialization failed: {e}")))
}
