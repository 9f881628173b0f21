//! MCP Protocol Handler
//!
//! Implements JSON-RPC 2.0 over stdio for Model Context Protocol and
//! exposes every toolkit in the [`ToolRegistry`].
//! Reference: https://modelcontextprotocol.io/specification

use serde::{Deserialize, Serialize};
use std::future::Future;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tracing::{debug, error, info, warn};

use crate::config::Config;
use crate::tools::ToolRegistry;

/// JSON-RPC 2.0 Request
#[derive(Debug, Clone, Deserialize)]
pub struct McpRequest {
    pub jsonrpc: String,
    pub method: String,
    #[serde(default)]
    pub params: serde_json::Value,
    pub id: Option<serde_json::Value>,
}

/// JSON-RPC 2.0 Response
#[derive(Debug, Clone, Serialize)]
pub struct McpResponse {
    pub jsonrpc: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<McpError>,
    pub id: Option<serde_json::Value>,
}

/// JSON-RPC 2.0 Error
#[derive(Debug, Clone, Serialize)]
pub struct McpError {
    pub code: i32,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
}

impl McpResponse {
    pub fn success(id: Option<serde_json::Value>, result: serde_json::Value) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            result: Some(result),
            error: None,
            id,
        }
    }

    pub fn error(id: Option<serde_json::Value>, code: i32, message: impl Into<String>) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            result: None,
            error: Some(McpError {
                code,
                message: message.into(),
                data: None,
            }),
            id,
        }
    }

    /// Notification (no id, no response expected)
    pub fn notification() -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            result: None,
            error: None,
            id: None,
        }
    }
}

/// MCP Error Codes
pub mod error_codes {
    // JSON-RPC standard errors
    pub const PARSE_ERROR: i32 = -32700;
    pub const METHOD_NOT_FOUND: i32 = -32601;
    pub const INVALID_PARAMS: i32 = -32602;

    // MCP custom errors (-32000 to -32099)
    pub const TOOL_NOT_FOUND: i32 = -32000;
    pub const TOOL_EXECUTION_ERROR: i32 = -32001;
}

/// Server capabilities
#[derive(Debug, Clone, Serialize)]
pub struct ServerCapabilities {
    pub tools: Option<ToolCapabilities>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ToolCapabilities {
    #[serde(rename = "listChanged")]
    pub list_changed: bool,
}

/// Server info
#[derive(Debug, Clone, Serialize)]
pub struct ServerInfo {
    pub name: String,
    pub version: String,
}

/// MCP Server
pub struct McpServer {
    tools: Arc<ToolRegistry>,
}

impl McpServer {
    /// Create new MCP server
    pub async fn new(config: Config) -> anyhow::Result<Self> {
        let config = Arc::new(config);
        let tools = Arc::new(ToolRegistry::new(config).await?);

        Ok(Self { tools })
    }

    /// Create a server over an existing registry
    pub fn with_registry(tools: Arc<ToolRegistry>) -> Self {
        Self { tools }
    }

    /// Run the MCP server (stdio mode) until EOF, Ctrl+C or SIGTERM
    pub async fn run(&self) -> anyhow::Result<()> {
        let shutdown = shutdown_signal()?;
        self.serve(tokio::io::stdin(), tokio::io::stdout(), shutdown).await
    }

    /// Serve JSON-RPC lines from `input` until EOF or `shutdown` resolves,
    /// then stop every toolkit's background work
    pub async fn serve<R, W, S>(&self, input: R, mut output: W, shutdown: S) -> anyhow::Result<()>
    where
        R: AsyncRead + Unpin,
        W: AsyncWrite + Unpin,
        S: Future<Output = ()>,
    {
        let mut reader = BufReader::new(input);
        let mut line = String::new();
        tokio::pin!(shutdown);

        info!("MCP server ready, waiting for requests...");

        loop {
            line.clear();
            let bytes_read = tokio::select! {
                read = reader.read_line(&mut line) => read?,
                _ = &mut shutdown => {
                    info!("Received termination signal. Cleaning up...");
                    break;
                }
            };

            if bytes_read == 0 {
                info!("Client disconnected (EOF)");
                break;
            }

            let trimmed = line.trim();
            if trimmed.is_empty() {
                continue;
            }

            debug!("← {}", trimmed);

            let response = match self.handle_line(trimmed).await {
                Some(response) => response,
                None => continue,
            };

            let response_json = serde_json::to_string(&response)?;
            debug!("→ {}", response_json);

            output.write_all(response_json.as_bytes()).await?;
            output.write_all(b"\n").await?;
            output.flush().await?;
        }

        self.tools.shutdown().await;
        Ok(())
    }

    /// Handle one raw JSON-RPC line; `None` when no response is due
    pub async fn handle_line(&self, line: &str) -> Option<McpResponse> {
        let response = match serde_json::from_str::<McpRequest>(line) {
            Ok(request) => {
                // Handle notification (no id) - no response needed
                if request.id.is_none() && request.method.starts_with("notifications/") {
                    debug!("Received notification: {}", request.method);
                    return None;
                }
                self.handle_request(request).await
            }
            Err(e) => {
                error!("Parse error: {}", e);
                McpResponse::error(None, error_codes::PARSE_ERROR, format!("Parse error: {}", e))
            }
        };

        // Don't send response for notifications
        if response.id.is_none() && response.result.is_none() && response.error.is_none() {
            return None;
        }

        Some(response)
    }

    /// Handle a single MCP request
    async fn handle_request(&self, request: McpRequest) -> McpResponse {
        match request.method.as_str() {
            // Lifecycle
            "initialize" => self.handle_initialize(request.id),
            "initialized" => McpResponse::notification(),
            "shutdown" => {
                info!("Shutdown requested");
                self.tools.shutdown().await;
                McpResponse::success(request.id, serde_json::json!({}))
            }

            // Tools
            "tools/list" => self.handle_tools_list(request.id).await,
            "tools/call" => self.handle_tools_call(request.id, request.params).await,

            // Ping
            "ping" => McpResponse::success(request.id, serde_json::json!({})),

            // Unknown
            method => {
                warn!("Unknown method: {}", method);
                McpResponse::error(
                    request.id,
                    error_codes::METHOD_NOT_FOUND,
                    format!("Method not found: {}", method),
                )
            }
        }
    }

    /// Handle initialize
    fn handle_initialize(&self, id: Option<serde_json::Value>) -> McpResponse {
        let capabilities = ServerCapabilities {
            tools: Some(ToolCapabilities { list_changed: false }),
        };
        let server_info = ServerInfo {
            name: "goose-plugins-mcp".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        };

        McpResponse::success(
            id,
            serde_json::json!({
                "protocolVersion": "2024-11-05",
                "capabilities": capabilities,
                "serverInfo": server_info,
                "instructions": self.tools.instructions()
            }),
        )
    }

    /// Handle tools/list
    async fn handle_tools_list(&self, id: Option<serde_json::Value>) -> McpResponse {
        let tools = self.tools.list_definitions();
        McpResponse::success(id, serde_json::json!({ "tools": tools }))
    }

    /// Handle tools/call
    async fn handle_tools_call(
        &self,
        id: Option<serde_json::Value>,
        params: serde_json::Value,
    ) -> McpResponse {
        let name = match params.get("name").and_then(|v| v.as_str()) {
            Some(n) => n,
            None => {
                return McpResponse::error(
                    id,
                    error_codes::INVALID_PARAMS,
                    "Missing 'name' parameter",
                )
            }
        };

        let arguments = params
            .get("arguments")
            .cloned()
            .unwrap_or(serde_json::json!({}));

        if !self.tools.has_tool(name) {
            return McpResponse::error(
                id,
                error_codes::TOOL_NOT_FOUND,
                format!("Unknown tool: {}", name),
            );
        }

        match self.tools.call(name, arguments).await {
            Ok(result) => McpResponse::success(
                id,
                serde_json::json!({
                    "content": [{
                        "type": "text",
                        "text": result
                    }]
                }),
            ),
            Err(e) => McpResponse::error(
                id,
                error_codes::TOOL_EXECUTION_ERROR,
                format!("Tool '{}' failed: {}", name, e),
            ),
        }
    }
}

/// Resolves on Ctrl+C or SIGTERM. The SIGTERM handler is installed before
/// this returns, so a signal arriving early is not lost.
#[cfg(unix)]
pub fn shutdown_signal() -> std::io::Result<impl Future<Output = ()>> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut terminate = signal(SignalKind::terminate())?;
    Ok(async move {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => info!("Received Ctrl+C"),
            _ = terminate.recv() => info!("Received SIGTERM"),
        }
    })
}

#[cfg(not(unix))]
pub fn shutdown_signal() -> std::io::Result<impl Future<Output = ()>> {
    Ok(async {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Received Ctrl+C");
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::toolkits::TodoToolkit;

    fn server() -> McpServer {
        let registry = ToolRegistry::with_toolkits(vec![Arc::new(TodoToolkit::new())]).unwrap();
        McpServer::with_registry(Arc::new(registry))
    }

    #[tokio::test]
    async fn test_initialize_reports_server_info() {
        let server = server();
        let response = server
            .handle_line(r#"{"jsonrpc":"2.0","method":"initialize","id":1}"#)
            .await
            .unwrap();
        let result = response.result.unwrap();
        assert_eq!(result["serverInfo"]["name"], "goose-plugins-mcp");
        assert_eq!(result["capabilities"]["tools"]["listChanged"], false);
    }

    #[tokio::test]
    async fn test_notifications_get_no_response() {
        let server = server();
        let response = server
            .handle_line(r#"{"jsonrpc":"2.0","method":"notifications/initialized"}"#)
            .await;
        assert!(response.is_none());
    }

    #[tokio::test]
    async fn test_tools_call_round_trip() {
        let server = server();
        let response = server
            .handle_line(r#"{"jsonrpc":"2.0","method":"tools/call","id":2,"params":{"name":"add_task","arguments":{"task":"Ship it"}}}"#)
            .await
            .unwrap();
        let result = response.result.unwrap();
        assert_eq!(result["content"][0]["text"], "Added task: 'Ship it'");
    }

    #[tokio::test]
    async fn test_unknown_tool_and_method() {
        let server = server();
        let response = server
            .handle_line(r#"{"jsonrpc":"2.0","method":"tools/call","id":3,"params":{"name":"nope"}}"#)
            .await
            .unwrap();
        assert_eq!(response.error.unwrap().code, error_codes::TOOL_NOT_FOUND);

        let response = server
            .handle_line(r#"{"jsonrpc":"2.0","method":"resources/list","id":4}"#)
            .await
            .unwrap();
        assert_eq!(response.error.unwrap().code, error_codes::METHOD_NOT_FOUND);
    }

    #[tokio::test]
    async fn test_parse_error() {
        let server = server();
        let response = server.handle_line("{not json").await.unwrap();
        assert_eq!(response.error.unwrap().code, error_codes::PARSE_ERROR);
    }

    /// Records whether the server asked it to stop
    #[derive(Default)]
    struct StopRecorder {
        stopped: std::sync::atomic::AtomicBool,
    }

    #[async_trait::async_trait]
    impl crate::tools::Toolkit for StopRecorder {
        fn name(&self) -> &'static str {
            "recorder"
        }

        fn definitions(&self) -> Vec<crate::tools::ToolDefinition> {
            Vec::new()
        }

        async fn call(&self, _tool: &str, _args: &serde_json::Value) -> anyhow::Result<String> {
            Ok(String::new())
        }

        async fn shutdown(&self) {
            self.stopped.store(true, std::sync::atomic::Ordering::SeqCst);
        }
    }

    #[tokio::test]
    async fn test_shutdown_future_stops_toolkits_while_client_connected() {
        let recorder = Arc::new(StopRecorder::default());
        let toolkit: Arc<dyn crate::tools::Toolkit> = recorder.clone();
        let registry = ToolRegistry::with_toolkits(vec![toolkit]).unwrap();
        let server = McpServer::with_registry(Arc::new(registry));

        // The client end stays open, so only the shutdown future can end the loop
        let (_client, input) = tokio::io::duplex(64);
        tokio::time::timeout(
            std::time::Duration::from_secs(5),
            server.serve(input, tokio::io::sink(), async {}),
        )
        .await
        .unwrap()
        .unwrap();

        assert!(recorder.stopped.load(std::sync::atomic::Ordering::SeqCst));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_sigterm_resolves_shutdown_signal() {
        let shutdown = shutdown_signal().unwrap();
        let status = std::process::Command::new("kill")
            .args(["-TERM", &std::process::id().to_string()])
            .status()
            .unwrap();
        assert!(status.success());

        tokio::time::timeout(std::time::Duration::from_secs(5), shutdown)
            .await
            .unwrap();
    }
}
