//! MCP server implementation.
//!
//! Routes JSON-RPC methods to the tool handlers and runs them over stdio or
//! HTTP. Tool failures, bad arguments included, come back as successful
//! JSON-RPC responses whose result has `isError` set; only malformed calls
//! and unknown tools get JSON-RPC errors.

use crate::error::McpError;
use crate::handlers::ToolHandlers;
use crate::http_transport::{HttpServer, RequestSender};
use crate::protocol::*;
use crate::tools::{DecodeError, ToolRequest, redacted_input, tool_definitions};
use pglens_core::{ErrorCode, McpConfig, ToolError};
use serde_json::{Value, json};
use std::sync::Arc;
use std::time::Instant;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::sync::mpsc;

/// The MCP server.
#[derive(Clone)]
pub struct McpServer {
    config: McpConfig,
    tools: Arc<ToolHandlers>,
}

impl McpServer {
    pub fn new(config: McpConfig, tools: ToolHandlers) -> Self {
        Self {
            config,
            tools: Arc::new(tools),
        }
    }

    pub fn config(&self) -> &McpConfig {
        &self.config
    }

    /// Serve on the configured transport until input ends or the process
    /// is interrupted.
    pub async fn run(&self) -> Result<(), McpError> {
        if self.config.is_http() {
            self.run_http().await
        } else {
            self.run_stdio().await
        }
    }

    /// Newline-delimited JSON-RPC on stdin/stdout. Logs go to stderr.
    async fn run_stdio(&self) -> Result<(), McpError> {
        tracing::info!("Starting MCP server with stdio transport");

        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        let mut stdout = tokio::io::stdout();

        while let Some(line) = lines.next_line().await? {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }

            let response = match serde_json::from_str::<JsonRpcRequest>(line) {
                Ok(request) => self.handle_request(request).await,
                Err(e) => {
                    tracing::warn!(error = %e, "unparseable JSON-RPC message");
                    Some(JsonRpcResponse::error(None, PARSE_ERROR, format!("Parse error: {e}")))
                }
            };

            if let Some(response) = response {
                let mut out = serde_json::to_vec(&response)?;
                out.push(b'\n');
                stdout.write_all(&out).await?;
                stdout.flush().await?;
            }
        }

        tracing::info!("stdin closed, MCP server stopping");
        Ok(())
    }

    async fn run_http(&self) -> Result<(), McpError> {
        let (request_tx, mut request_rx): (RequestSender, _) = mpsc::channel(100);

        let server = self.clone();
        tokio::spawn(async move {
            while let Some((request, response_tx)) = request_rx.recv().await {
                let server = server.clone();
                tokio::spawn(async move {
                    let response = server.handle_request(request).await;
                    let _ = response_tx.send(response).await;
                });
            }
        });

        HttpServer::new(self.config.bind_address(), request_tx).run().await
    }

    /// Handle one JSON-RPC message. Notifications get no response.
    pub async fn handle_request(&self, request: JsonRpcRequest) -> Option<JsonRpcResponse> {
        if request.is_notification() {
            tracing::debug!(method = %request.method, "notification received");
            return None;
        }
        let id = request.id.clone();

        let response = match request.method.as_str() {
            "initialize" => self.handle_initialize(id),
            "tools/list" => JsonRpcResponse::success(id, json!({ "tools": tool_definitions() })),
            "tools/call" => self.handle_call_tool(id, request.params).await,
            "ping" => JsonRpcResponse::success(id, json!({})),
            "shutdown" => {
                tracing::info!("MCP server shutdown requested");
                JsonRpcResponse::success(id, Value::Null)
            }
            _ => JsonRpcResponse::error(
                id,
                METHOD_NOT_FOUND,
                format!("Method not found: {}", request.method),
            ),
        };
        Some(response)
    }

    fn handle_initialize(&self, id: Option<Value>) -> JsonRpcResponse {
        let result = json!({
            "protocolVersion": PROTOCOL_VERSION,
            "serverInfo": {
                "name": "pglens",
                "version": env!("CARGO_PKG_VERSION")
            },
            "capabilities": {
                "tools": {
                    "listChanged": false
                }
            }
        });
        JsonRpcResponse::success(id, result)
    }

    async fn handle_call_tool(&self, id: Option<Value>, params: Option<Value>) -> JsonRpcResponse {
        let params: CallToolParams = match params {
            Some(p) => match serde_json::from_value(p) {
                Ok(params) => params,
                Err(e) => return JsonRpcResponse::error(id, INVALID_PARAMS, format!("Invalid params: {e}")),
            },
            None => return JsonRpcResponse::error(id, INVALID_PARAMS, "Missing params"),
        };

        let input_received = redacted_input(&params.arguments);
        let request = match ToolRequest::decode(&params.name, params.arguments) {
            Ok(request) => request,
            Err(DecodeError::UnknownTool(name)) => {
                return JsonRpcResponse::error(id, INVALID_PARAMS, format!("Tool not found: {name}"));
            }
            Err(DecodeError::InvalidArguments { tool, reason }) => {
                tracing::info!(tool = %tool, code = %ErrorCode::ParameterError, "tool arguments rejected");
                let err = ToolError::new(ErrorCode::ParameterError, format!("Invalid arguments for {tool}: {reason}"));
                return tool_failure(id, &tool, err, input_received);
            }
        };

        let tool = request.tool_name();
        let started = Instant::now();
        let outcome = self.tools.call(request).await;
        let elapsed_ms = started.elapsed().as_millis() as u64;

        match outcome {
            Ok(payload) => {
                tracing::info!(tool, elapsed_ms, "tool call succeeded");
                tool_result(id, CallToolResult::json(&payload, false))
            }
            Err(err) => {
                tracing::info!(tool, elapsed_ms, code = %err.code, "tool call failed");
                tool_failure(id, tool, err, input_received)
            }
        }
    }
}

/// A failed call as an `isError` result carrying the structured error.
fn tool_failure(id: Option<Value>, tool: &str, err: ToolError, input_received: Value) -> JsonRpcResponse {
    match serde_json::to_value(err.into_response(tool, input_received)) {
        Ok(payload) => tool_result(id, CallToolResult::json(&payload, true)),
        Err(e) => JsonRpcResponse::error(id, INTERNAL_ERROR, format!("failed to encode error: {e}")),
    }
}

fn tool_result(id: Option<Value>, result: CallToolResult) -> JsonRpcResponse {
    match serde_json::to_value(result) {
        Ok(result) => JsonRpcResponse::success(id, result),
        Err(e) => JsonRpcResponse::error(id, INTERNAL_ERROR, format!("failed to encode result: {e}")),
    }
}
