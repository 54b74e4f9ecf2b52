//! Tool discovery over JSON-RPC 2.0 (MCP).
//!
//! [`McpServer`] answers `initialize`, `ping`, `tools/list` and `tools/call`
//! for a [`ToolRegistry`]. [`McpServer::serve`] speaks newline-delimited JSON
//! over any reader/writer pair, which covers the stdio transport.

use std::sync::Arc;

use futures::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio_util::codec::{FramedRead, FramedWrite, LinesCodec};
use tracing::{debug, info, warn};

use crate::errors::ToolError;
use crate::registry::ToolRegistry;

/// MCP protocol revision reported by `initialize`.
pub const PROTOCOL_VERSION: &str = "2024-11-05";

/// Upper bound on one framed request line.
const MAX_LINE_BYTES: usize = 1024 * 1024;

pub(crate) const PARSE_ERROR: i32 = -32700;
pub(crate) const INVALID_REQUEST: i32 = -32600;
pub(crate) const METHOD_NOT_FOUND: i32 = -32601;
pub(crate) const INVALID_PARAMS: i32 = -32602;

/// Incoming JSON-RPC request or notification.
#[derive(Debug, Deserialize)]
pub struct JsonRpcRequest {
    /// Protocol marker, must be `"2.0"`.
    pub jsonrpc: String,
    /// Absent for notifications.
    #[serde(default)]
    pub id: Option<Value>,
    /// Method name.
    pub method: String,
    /// Method parameters.
    #[serde(default)]
    pub params: Value,
}

/// Outgoing JSON-RPC response.
#[derive(Debug, Serialize)]
pub struct JsonRpcResponse {
    /// Always `"2.0"`.
    pub jsonrpc: &'static str,
    /// Echoed request id (`null` when the request could not be read).
    pub id: Value,
    /// Success payload.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    /// Failure payload.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<JsonRpcError>,
}

/// JSON-RPC error object.
#[derive(Debug, Serialize)]
pub struct JsonRpcError {
    /// Standard error code.
    pub code: i32,
    /// Description.
    pub message: String,
}

impl JsonRpcResponse {
    fn success(id: Value, result: Value) -> Self {
        Self {
            jsonrpc: "2.0",
            id,
            result: Some(result),
            error: None,
        }
    }

    fn error(id: Value, code: i32, message: impl Into<String>) -> Self {
        Self {
            jsonrpc: "2.0",
            id,
            result: None,
            error: Some(JsonRpcError {
                code,
                message: message.into(),
            }),
        }
    }
}

#[derive(Deserialize)]
struct ToolCallParams {
    name: String,
    #[serde(default = "empty_arguments")]
    arguments: Value,
}

fn empty_arguments() -> Value {
    Value::Object(serde_json::Map::new())
}

/// JSON-RPC front end for a tool registry.
#[derive(Clone, Debug)]
pub struct McpServer {
    name: String,
    version: String,
    registry: Arc<ToolRegistry>,
}

impl McpServer {
    /// Create a server advertising `name`/`version`.
    pub fn new(name: impl Into<String>, version: impl Into<String>, registry: Arc<ToolRegistry>) -> Self {
        Self {
            name: name.into(),
            version: version.into(),
            registry,
        }
    }

    /// Registry being served.
    pub fn registry(&self) -> &ToolRegistry {
        &self.registry
    }

    /// Handle one request. Notifications yield `None`.
    pub async fn handle_request(&self, request: JsonRpcRequest) -> Option<JsonRpcResponse> {
        let Some(id) = request.id else {
            debug!(method = %request.method, "notification");
            return None;
        };
        if request.jsonrpc != "2.0" {
            return Some(JsonRpcResponse::error(id, INVALID_REQUEST, "jsonrpc must be \"2.0\""));
        }

        let response = match request.method.as_str() {
            "initialize" => JsonRpcResponse::success(
                id,
                json!({
                    "protocolVersion": PROTOCOL_VERSION,
                    "capabilities": { "tools": { "listChanged": false } },
                    "serverInfo": { "name": self.name, "version": self.version },
                }),
            ),
            "ping" => JsonRpcResponse::success(id, json!({})),
            "tools/list" => JsonRpcResponse::success(id, json!({ "tools": self.registry.descriptors() })),
            "tools/call" => match serde_json::from_value::<ToolCallParams>(request.params) {
                Ok(params) => {
                    let result = self.registry.call(&params.name, &params.arguments).await;
                    match serde_json::to_value(result) {
                        Ok(value) => JsonRpcResponse::success(id, value),
                        Err(e) => JsonRpcResponse::error(id, INVALID_PARAMS, e.to_string()),
                    }
                }
                Err(e) => JsonRpcResponse::error(id, INVALID_PARAMS, format!("invalid tools/call params: {e}")),
            },
            other => JsonRpcResponse::error(id, METHOD_NOT_FOUND, format!("method not found: {other}")),
        };
        Some(response)
    }

    /// Handle one raw line.
    pub async fn handle_line(&self, line: &str) -> Option<JsonRpcResponse> {
        match serde_json::from_str::<JsonRpcRequest>(line) {
            Ok(request) => self.handle_request(request).await,
            Err(e) => {
                warn!(error = %e, "unparseable request");
                Some(JsonRpcResponse::error(Value::Null, PARSE_ERROR, format!("parse error: {e}")))
            }
        }
    }

    /// Serve newline-delimited requests until `reader` reaches EOF.
    pub async fn serve<R, W>(&self, reader: R, writer: W) -> Result<(), ToolError>
    where
        R: AsyncRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        let mut lines = FramedRead::new(reader, LinesCodec::new_with_max_length(MAX_LINE_BYTES));
        let mut sink = FramedWrite::new(writer, LinesCodec::new());
        info!(server = %self.name, tools = self.registry.len(), "mcp server started");

        while let Some(line) = lines.next().await {
            let line = line.map_err(|e| ToolError::Io(std::io::Error::other(e)))?;
            if line.trim().is_empty() {
                continue;
            }
            if let Some(response) = self.handle_line(&line).await {
                sink.send(serde_json::to_string(&response)?)
                    .await
                    .map_err(|e| ToolError::Io(std::io::Error::other(e)))?;
            }
        }

        info!(server = %self.name, "mcp server stopped");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::definition::ToolDefinition;
    use crate::result::text_result;
    use crate::schema::Schema;
    use tokio::io::AsyncReadExt;

    fn server() -> McpServer {
        let registry: ToolRegistry = [ToolDefinition::new(
            "shout",
            "Upper-case text",
            Schema::object([("text", Schema::string())]),
            |input: Value| async move {
                Ok(text_result(input["text"].as_str().unwrap_or_default().to_uppercase()))
            },
        )]
        .into_iter()
        .collect();
        McpServer::new("harbor-test", "0.0.1", Arc::new(registry))
    }

    async fn roundtrip(server: &McpServer, line: &str) -> Value {
        let response = server.handle_line(line).await.unwrap();
        serde_json::to_value(response).unwrap()
    }

    #[tokio::test]
    async fn initialize_reports_server_info() {
        let v = roundtrip(&server(), r#"{"jsonrpc":"2.0","id":1,"method":"initialize","params":{}}"#).await;
        assert_eq!(v["result"]["protocolVersion"], PROTOCOL_VERSION);
        assert_eq!(v["result"]["serverInfo"]["name"], "harbor-test");
        assert_eq!(v["id"], 1);
    }

    #[tokio::test]
    async fn tools_list_and_call() {
        let server = server();
        let list = roundtrip(&server, r#"{"jsonrpc":"2.0","id":"a","method":"tools/list"}"#).await;
        assert_eq!(list["result"]["tools"][0]["name"], "shout");
        assert_eq!(list["result"]["tools"][0]["inputSchema"]["required"][0], "text");

        let call = roundtrip(
            &server,
            r#"{"jsonrpc":"2.0","id":2,"method":"tools/call","params":{"name":"shout","arguments":{"text":"hi"}}}"#,
        )
        .await;
        assert_eq!(call["result"]["content"][0]["text"], "HI");
        assert_eq!(call["result"]["isError"], false);
    }

    #[tokio::test]
    async fn missing_arguments_default_to_empty_object() {
        let registry: ToolRegistry = [ToolDefinition::new(
            "greet",
            "Say hello",
            Schema::object([("name", Schema::string().optional())]),
            |input: Value| async move {
                Ok(text_result(format!(
                    "hello {}",
                    input["name"].as_str().unwrap_or("there")
                )))
            },
        )]
        .into_iter()
        .collect();
        let server = McpServer::new("harbor-test", "0.0.1", Arc::new(registry));

        let call = roundtrip(
            &server,
            r#"{"jsonrpc":"2.0","id":4,"method":"tools/call","params":{"name":"greet"}}"#,
        )
        .await;
        assert_eq!(call["result"]["isError"], false);
        assert_eq!(call["result"]["content"][0]["text"], "hello there");
    }

    #[tokio::test]
    async fn invalid_arguments_become_tool_errors() {
        let call = roundtrip(
            &server(),
            r#"{"jsonrpc":"2.0","id":3,"method":"tools/call","params":{"name":"shout","arguments":{"text":7}}}"#,
        )
        .await;
        assert_eq!(call["result"]["isError"], true);
        let text = call["result"]["content"][0]["text"].as_str().unwrap();
        assert!(text.starts_with("Validation error"), "{text}");
    }

    #[tokio::test]
    async fn protocol_errors() {
        let server = server();
        let unknown = roundtrip(&server, r#"{"jsonrpc":"2.0","id":4,"method":"resources/list"}"#).await;
        assert_eq!(unknown["error"]["code"], METHOD_NOT_FOUND);

        let garbage = roundtrip(&server, "{not json").await;
        assert_eq!(garbage["error"]["code"], PARSE_ERROR);
        assert!(garbage["id"].is_null());

        let bad_params = roundtrip(&server, r#"{"jsonrpc":"2.0","id":5,"method":"tools/call","params":{}}"#).await;
        assert_eq!(bad_params["error"]["code"], INVALID_PARAMS);

        assert!(
            server
                .handle_line(r#"{"jsonrpc":"2.0","method":"notifications/initialized"}"#)
                .await
                .is_none()
        );
    }

    #[tokio::test]
    async fn serve_over_duplex() {
        let server = server();
        let input = concat!(
            r#"{"jsonrpc":"2.0","id":1,"method":"ping"}"#,
            "\n\n",
            r#"{"jsonrpc":"2.0","method":"notifications/initialized"}"#,
            "\n",
            r#"{"jsonrpc":"2.0","id":2,"method":"tools/list"}"#,
            "\n",
        );
        let (client, mut remote) = tokio::io::duplex(64 * 1024);
        server.serve(input.as_bytes(), client).await.unwrap();

        let mut out = String::new();
        let _ = remote.read_to_string(&mut out).await.unwrap();
        let responses: Vec<Value> = out.lines().map(|l| serde_json::from_str(l).unwrap()).collect();
        assert_eq!(responses.len(), 2);
        assert_eq!(responses[0]["id"], 1);
        assert_eq!(responses[1]["id"], 2);
    }
}
