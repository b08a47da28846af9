// MCP server: JSON-RPC 2.0 over newline-delimited stdio

use crate::protocol::{
    CallToolParams, CallToolResult, InitializeParams, InitializeResult, JsonRpcError,
    JsonRpcRequest, JsonRpcResponse, ListToolsResult, ServerCapabilities, ServerInfo,
    ToolsCapability, PROTOCOL_VERSION,
};
use crate::tools::ToolRegistry;
use anyhow::{Context, Result};
use bytes::BytesMut;
use futures_util::{FutureExt, SinkExt, StreamExt};
use serde_json::Value;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tokio_util::codec::{Decoder, FramedRead, FramedWrite, LinesCodec, LinesCodecError};

pub const SERVER_NAME: &str = "MarketoAPI";

/// Longest inbound message accepted, in bytes.
pub const DEFAULT_MAX_LINE_LENGTH: usize = 4 * 1024 * 1024;

/// Protocol revisions this server can speak, newest last.
const SUPPORTED_PROTOCOL_VERSIONS: &[&str] = &["2024-11-05", "2025-03-26", PROTOCOL_VERSION];

/// What to do with one inbound message.
enum Dispatch {
    Reply(JsonRpcResponse),
    Ignore,
    CallTool { id: Value, params: CallToolParams },
}

/// Line decoder that yields undecodable lines as items.
///
/// `FramedRead` ends the stream after a decoder error, so invalid UTF-8 and
/// oversized lines are surfaced as `Err` items and the stream keeps going.
struct MessageCodec {
    lines: LinesCodec,
}

impl MessageCodec {
    fn new(max_length: usize) -> Self {
        Self {
            lines: LinesCodec::new_with_max_length(max_length),
        }
    }

    fn recover(
        result: Result<Option<String>, LinesCodecError>,
    ) -> Result<Option<Result<String, LinesCodecError>>, LinesCodecError> {
        match result {
            Ok(line) => Ok(line.map(Ok)),
            Err(LinesCodecError::MaxLineLengthExceeded) => {
                Ok(Some(Err(LinesCodecError::MaxLineLengthExceeded)))
            }
            Err(LinesCodecError::Io(e)) if e.kind() == std::io::ErrorKind::InvalidData => {
                Ok(Some(Err(LinesCodecError::Io(e))))
            }
            Err(e) => Err(e),
        }
    }
}

impl Decoder for MessageCodec {
    type Item = Result<String, LinesCodecError>;
    type Error = LinesCodecError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        Self::recover(self.lines.decode(src))
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        Self::recover(self.lines.decode_eof(src))
    }
}

pub struct McpServer {
    registry: Arc<ToolRegistry>,
    info: ServerInfo,
    max_line_length: usize,
}

impl McpServer {
    pub fn new(registry: ToolRegistry) -> Self {
        Self {
            registry: Arc::new(registry),
            info: ServerInfo {
                name: SERVER_NAME.to_string(),
                version: env!("CARGO_PKG_VERSION").to_string(),
            },
            max_line_length: DEFAULT_MAX_LINE_LENGTH,
        }
    }

    /// Set the longest inbound message accepted; longer lines get a parse error.
    pub fn with_max_line_length(mut self, max_line_length: usize) -> Self {
        self.max_line_length = max_line_length;
        self
    }

    /// Serve on the process's stdin/stdout until stdin closes.
    pub async fn start(&self) -> Result<()> {
        tracing::info!(tools = self.registry.len(), "MCP server listening on stdio");
        self.serve(tokio::io::stdin(), tokio::io::stdout()).await
    }

    /// Serve one connection.
    ///
    /// Requests are read in order; each `tools/call` runs on its own task, so
    /// responses are written as calls finish rather than in request order.
    pub async fn serve<R, W>(&self, reader: R, writer: W) -> Result<()>
    where
        R: AsyncRead + Unpin,
        W: AsyncWrite + Unpin + Send + 'static,
    {
        let mut lines = FramedRead::new(reader, MessageCodec::new(self.max_line_length));
        let (tx, mut rx) = mpsc::unbounded_channel::<JsonRpcResponse>();

        let writer_task = tokio::spawn(async move {
            let mut sink = FramedWrite::new(writer, LinesCodec::new());
            while let Some(response) = rx.recv().await {
                let payload = serde_json::to_string(&response)?;
                sink.send(payload).await?;
            }
            Ok::<_, anyhow::Error>(())
        });

        let mut calls = JoinSet::new();

        while let Some(frame) = lines.next().await {
            let dispatch = match frame {
                Ok(Ok(line)) => self.dispatch(&line),
                Ok(Err(e)) => {
                    tracing::warn!(error = %e, "Discarding undecodable message");
                    Dispatch::Reply(JsonRpcResponse::error(Value::Null, JsonRpcError::parse_error()))
                }
                Err(e) => {
                    tracing::warn!(error = %e, "Failed to read from input stream");
                    break;
                }
            };

            match dispatch {
                Dispatch::Reply(response) => {
                    if tx.send(response).is_err() {
                        break;
                    }
                }
                Dispatch::Ignore => {}
                Dispatch::CallTool { id, params } => {
                    let registry = self.registry.clone();
                    let tx = tx.clone();
                    calls.spawn(async move {
                        let tool = params.name.clone();
                        let outcome = AssertUnwindSafe(call_tool(&registry, params))
                            .catch_unwind()
                            .await;
                        let response = match outcome {
                            Ok(Ok(result)) => JsonRpcResponse::success(id, result),
                            Ok(Err(error)) => JsonRpcResponse::error(id, error),
                            Err(_) => {
                                tracing::error!(tool = %tool, "Tool panicked");
                                JsonRpcResponse::error(
                                    id,
                                    JsonRpcError::internal_error(format!("Tool {} failed unexpectedly", tool)),
                                )
                            }
                        };
                        let _ = tx.send(response);
                    });
                }
            }

            // Reap finished calls so the set does not grow without bound.
            while let Some(joined) = calls.try_join_next() {
                log_join(joined);
            }
        }

        while let Some(joined) = calls.join_next().await {
            log_join(joined);
        }
        drop(tx);

        writer_task.await.context("Response writer panicked")??;
        tracing::info!("Input closed, MCP server stopping");
        Ok(())
    }

    fn dispatch(&self, line: &str) -> Dispatch {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            return Dispatch::Ignore;
        }

        let parsed: Value = match serde_json::from_str(trimmed) {
            Ok(value) => value,
            Err(_) => return Dispatch::Reply(JsonRpcResponse::error(Value::Null, JsonRpcError::parse_error())),
        };

        let request: JsonRpcRequest = match serde_json::from_value(parsed) {
            Ok(request) => request,
            Err(_) => {
                return Dispatch::Reply(JsonRpcResponse::error(
                    Value::Null,
                    JsonRpcError::invalid_request(),
                ))
            }
        };

        self.dispatch_request(request)
    }

    fn dispatch_request(&self, request: JsonRpcRequest) -> Dispatch {
        if request.is_notification() {
            tracing::debug!(method = %request.method, "Notification received");
            return Dispatch::Ignore;
        }
        let id = request.id.clone().unwrap_or(Value::Null);

        if request.jsonrpc != "2.0" {
            tracing::warn!(version = %request.jsonrpc, "Rejecting request with unsupported jsonrpc version");
            return Dispatch::Reply(JsonRpcResponse::error(id, JsonRpcError::invalid_request()));
        }

        match request.method.as_str() {
            "initialize" => Dispatch::Reply(JsonRpcResponse::success(id, self.initialize(request.params))),
            "ping" => Dispatch::Reply(JsonRpcResponse::success(id, serde_json::json!({}))),
            "tools/list" => Dispatch::Reply(JsonRpcResponse::success(
                id,
                ListToolsResult {
                    tools: self.registry.list_schemas(),
                },
            )),
            "tools/call" => {
                let params = request.params.unwrap_or(Value::Null);
                match serde_json::from_value::<CallToolParams>(params) {
                    Ok(params) => Dispatch::CallTool { id, params },
                    Err(e) => Dispatch::Reply(JsonRpcResponse::error(
                        id,
                        JsonRpcError::invalid_params(format!("Invalid tools/call params: {}", e)),
                    )),
                }
            }
            other => Dispatch::Reply(JsonRpcResponse::error(id, JsonRpcError::method_not_found(other))),
        }
    }

    fn initialize(&self, params: Option<Value>) -> InitializeResult {
        let params = params.and_then(|p| serde_json::from_value::<InitializeParams>(p).ok());

        let protocol_version = match &params {
            Some(p) if SUPPORTED_PROTOCOL_VERSIONS.contains(&p.protocol_version.as_str()) => {
                p.protocol_version.clone()
            }
            _ => PROTOCOL_VERSION.to_string(),
        };

        if let Some(client) = params.as_ref().and_then(|p| p.client_info.as_ref()) {
            tracing::info!(client = %client.name, version = %client.version, "Client connected");
        }

        InitializeResult {
            protocol_version,
            capabilities: ServerCapabilities {
                tools: Some(ToolsCapability {
                    list_changed: false,
                }),
            },
            server_info: self.info.clone(),
        }
    }
}

async fn call_tool(registry: &ToolRegistry, params: CallToolParams) -> Result<CallToolResult, JsonRpcError> {
    let tool = registry
        .get(&params.name)
        .ok_or_else(|| JsonRpcError::invalid_params(format!("Unknown tool: {}", params.name)))?;

    let arguments = match params.arguments {
        Value::Null => Value::Object(Default::default()),
        other => other,
    };

    tracing::debug!(tool = %params.name, "Calling tool");
    tool.execute(arguments).await.map_err(|e| {
        tracing::warn!(tool = %params.name, error = %e, "Rejected tool arguments");
        JsonRpcError::invalid_params(format!("{:#}", e))
    })
}

fn log_join(joined: Result<(), tokio::task::JoinError>) {
    if let Err(e) = joined {
        tracing::warn!(error = %e, "Tool task did not complete");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{ToolContent, ToolSchema};
    use crate::tools::{json_schema_number, json_schema_object, Tool};
    use serde::Deserialize;
    use serde_json::json;
    use std::time::Duration;
    use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};

    /// Sleeps for `delayMs` then echoes it back.
    struct SleepTool;

    #[derive(Deserialize)]
    #[serde(rename_all = "camelCase")]
    struct SleepArgs {
        delay_ms: u64,
    }

    #[async_trait::async_trait]
    impl Tool for SleepTool {
        fn schema(&self) -> ToolSchema {
            ToolSchema {
                name: "sleep".to_string(),
                description: "Sleep then answer".to_string(),
                input_schema: json_schema_object(
                    json!({"delayMs": json_schema_number("Delay")}),
                    vec!["delayMs"],
                ),
            }
        }

        async fn execute(&self, arguments: Value) -> Result<CallToolResult> {
            let args: SleepArgs = serde_json::from_value(arguments)?;
            tokio::time::sleep(Duration::from_millis(args.delay_ms)).await;
            Ok(CallToolResult {
                content: vec![ToolContent::text(args.delay_ms.to_string())],
                is_error: None,
            })
        }
    }

    /// Panics on every call.
    struct UnstableTool;

    #[async_trait::async_trait]
    impl Tool for UnstableTool {
        fn schema(&self) -> ToolSchema {
            ToolSchema {
                name: "unstable".to_string(),
                description: "Always panics".to_string(),
                input_schema: json_schema_object(json!({}), vec![]),
            }
        }

        async fn execute(&self, _arguments: Value) -> Result<CallToolResult> {
            panic!("tool blew up");
        }
    }

    fn server() -> McpServer {
        let mut registry = ToolRegistry::new();
        registry.register(Arc::new(SleepTool));
        registry.register(Arc::new(UnstableTool));
        McpServer::new(registry)
    }

    type ClientLines = tokio::io::Lines<BufReader<tokio::io::ReadHalf<tokio::io::DuplexStream>>>;
    type ClientWriter = tokio::io::WriteHalf<tokio::io::DuplexStream>;

    fn connect(server: McpServer) -> (tokio::task::JoinHandle<Result<()>>, ClientLines, ClientWriter) {
        let (client_side, server_side) = tokio::io::duplex(64 * 1024);
        let (server_read, server_write) = tokio::io::split(server_side);
        let (client_read, client_write) = tokio::io::split(client_side);

        let serve = tokio::spawn(async move { server.serve(server_read, server_write).await });
        (serve, BufReader::new(client_read).lines(), client_write)
    }

    async fn next_response(lines: &mut ClientLines) -> Value {
        serde_json::from_str(&lines.next_line().await.unwrap().unwrap()).unwrap()
    }

    fn reply(dispatch: Dispatch) -> Value {
        match dispatch {
            Dispatch::Reply(response) => serde_json::to_value(response).unwrap(),
            Dispatch::Ignore => panic!("expected a reply, got nothing"),
            Dispatch::CallTool { .. } => panic!("expected a reply, got a tool call"),
        }
    }

    #[test]
    fn test_initialize() {
        let response = reply(server().dispatch(
            r#"{"jsonrpc":"2.0","id":1,"method":"initialize","params":{"protocolVersion":"2024-11-05","capabilities":{},"clientInfo":{"name":"test","version":"1.0"}}}"#,
        ));

        assert_eq!(response["id"], 1);
        assert_eq!(response["result"]["protocolVersion"], "2024-11-05");
        assert_eq!(response["result"]["serverInfo"]["name"], "MarketoAPI");
        assert_eq!(response["result"]["capabilities"]["tools"]["listChanged"], false);
    }

    #[test]
    fn test_initialize_with_unknown_version() {
        let response = reply(server().dispatch(
            r#"{"jsonrpc":"2.0","id":1,"method":"initialize","params":{"protocolVersion":"1999-01-01"}}"#,
        ));

        assert_eq!(response["result"]["protocolVersion"], PROTOCOL_VERSION);
    }

    #[test]
    fn test_tools_list() {
        let response = reply(server().dispatch(r#"{"jsonrpc":"2.0","id":"a","method":"tools/list"}"#));

        assert_eq!(response["id"], "a");
        assert_eq!(response["result"]["tools"][0]["name"], "sleep");
        assert!(response["result"]["tools"][0]["inputSchema"].is_object());
    }

    #[test]
    fn test_notifications_are_ignored() {
        let dispatch = server().dispatch(r#"{"jsonrpc":"2.0","method":"notifications/initialized"}"#);
        assert!(matches!(dispatch, Dispatch::Ignore));
    }

    #[test]
    fn test_parse_error() {
        let response = reply(server().dispatch("{not json"));

        assert_eq!(response["error"]["code"], -32700);
        assert!(response["id"].is_null());
    }

    #[test]
    fn test_invalid_request() {
        let response = reply(server().dispatch(r#"{"jsonrpc":"2.0","id":1}"#));
        assert_eq!(response["error"]["code"], -32600);
    }

    #[test]
    fn test_wrong_jsonrpc_version_is_invalid_request() {
        let response = reply(server().dispatch(r#"{"jsonrpc":"1.0","id":4,"method":"ping"}"#));

        assert_eq!(response["id"], 4);
        assert_eq!(response["error"]["code"], -32600);
    }

    #[test]
    fn test_unknown_method() {
        let response = reply(server().dispatch(r#"{"jsonrpc":"2.0","id":3,"method":"resources/list"}"#));
        assert_eq!(response["error"]["code"], -32601);
    }

    #[tokio::test]
    async fn test_call_unknown_tool() {
        let registry = ToolRegistry::new();
        let err = call_tool(
            &registry,
            CallToolParams {
                name: "nope".to_string(),
                arguments: Value::Null,
            },
        )
        .await
        .unwrap_err();

        assert_eq!(err.code, -32602);
        assert_eq!(err.message, "Unknown tool: nope");
    }

    #[tokio::test]
    async fn test_call_with_bad_arguments() {
        let server = server();
        let err = call_tool(
            &server.registry,
            CallToolParams {
                name: "sleep".to_string(),
                arguments: json!({"delayMs": "soon"}),
            },
        )
        .await
        .unwrap_err();

        assert_eq!(err.code, -32602);
    }

    #[tokio::test]
    async fn test_serve_answers_concurrent_calls_as_they_finish() {
        let (serve, mut responses, mut client_write) = connect(server());

        client_write
            .write_all(
                concat!(
                    r#"{"jsonrpc":"2.0","id":1,"method":"tools/call","params":{"name":"sleep","arguments":{"delayMs":300}}}"#,
                    "\n",
                    r#"{"jsonrpc":"2.0","method":"notifications/initialized"}"#,
                    "\n",
                    r#"{"jsonrpc":"2.0","id":2,"method":"tools/call","params":{"name":"sleep","arguments":{"delayMs":0}}}"#,
                    "\n"
                )
                .as_bytes(),
            )
            .await
            .unwrap();

        let first = next_response(&mut responses).await;
        let second = next_response(&mut responses).await;

        assert_eq!(first["id"], 2);
        assert_eq!(second["id"], 1);
        assert_eq!(second["result"]["content"][0]["text"], "300");

        // Closing input drains in-flight work and stops the server.
        client_write.shutdown().await.unwrap();
        serve.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_serve_survives_undecodable_line() {
        let (serve, mut responses, mut client_write) = connect(server());

        client_write.write_all(b"\xff\xfe\n").await.unwrap();
        client_write
            .write_all(b"{\"jsonrpc\":\"2.0\",\"id\":7,\"method\":\"ping\"}\n")
            .await
            .unwrap();

        let bad = next_response(&mut responses).await;
        assert_eq!(bad["error"]["code"], -32700);
        assert!(bad["id"].is_null());

        let pong = next_response(&mut responses).await;
        assert_eq!(pong["id"], 7);
        assert_eq!(pong["result"], json!({}));

        client_write.shutdown().await.unwrap();
        serve.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_serve_rejects_oversized_line_and_continues() {
        let (serve, mut responses, mut client_write) = connect(server().with_max_line_length(64));

        let oversized = format!("{}\n", "a".repeat(200));
        client_write.write_all(oversized.as_bytes()).await.unwrap();
        client_write
            .write_all(b"{\"jsonrpc\":\"2.0\",\"id\":8,\"method\":\"ping\"}\n")
            .await
            .unwrap();

        let bad = next_response(&mut responses).await;
        assert_eq!(bad["error"]["code"], -32700);

        let pong = next_response(&mut responses).await;
        assert_eq!(pong["id"], 8);

        client_write.shutdown().await.unwrap();
        serve.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_panicking_tool_gets_internal_error() {
        let (serve, mut responses, mut client_write) = connect(server());

        client_write
            .write_all(
                b"{\"jsonrpc\":\"2.0\",\"id\":9,\"method\":\"tools/call\",\"params\":{\"name\":\"unstable\"}}\n",
            )
            .await
            .unwrap();

        let response = next_response(&mut responses).await;
        assert_eq!(response["id"], 9);
        assert_eq!(response["error"]["code"], -32603);
        assert_eq!(response["error"]["message"], "Tool unstable failed unexpectedly");

        client_write.shutdown().await.unwrap();
        serve.await.unwrap().unwrap();
    }
}
