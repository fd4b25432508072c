use rmcp::model::{
    CallToolRequestParam, CallToolResult, ClientInfo, Implementation, JsonObject, ServerInfo,
    Tool as McpTool,
};
use rmcp::service::RunningService;
use rmcp::{RoleClient, ServiceExt};
use serde_json::Value;
use tokio::io::DuplexStream;
use tracing::{debug, warn};

use super::server::McpServer;
use crate::errors::McpError;
use crate::models::tool::Tool;

/// Buffer size of each direction of the in-process pipe
const PIPE_CAPACITY: usize = 64 * 1024;

/// An initialized MCP session: tool discovery and tool calls
pub struct McpClient {
    service: RunningService<RoleClient, ClientInfo>,
}

impl McpClient {
    /// Serve `server` on one end of an in-memory pipe and connect to the other.
    /// Messages cross the pipe as newline-delimited JSON-RPC text.
    pub async fn in_process(server: McpServer) -> Result<Self, McpError> {
        let (client_io, server_io) = tokio::io::duplex(PIPE_CAPACITY);
        tokio::spawn(async move {
            match server.serve(server_io).await {
                Ok(running) => {
                    if let Err(e) = running.waiting().await {
                        warn!(error = %e, "mcp server task failed");
                    }
                }
                Err(e) => warn!(error = %e, "mcp server failed to initialize"),
            }
        });
        Self::connect(client_io).await
    }

    /// Run the initialize handshake over one end of a pipe
    pub async fn connect(io: DuplexStream) -> Result<Self, McpError> {
        let service = client_info()
            .serve(io)
            .await
            .map_err(|e| McpError::Connect(e.to_string()))?;
        Ok(Self { service })
    }

    /// What the server reported during the handshake
    pub fn server_info(&self) -> Option<&ServerInfo> {
        self.service.peer_info()
    }

    /// Every tool the server offers, following pagination
    pub async fn list_tools(&self) -> Result<Vec<Tool>, McpError> {
        let tools = self.service.list_all_tools().await?;
        Ok(tools.into_iter().map(from_mcp_tool).collect())
    }

    pub async fn call_tool(
        &self,
        name: &str,
        arguments: JsonObject,
    ) -> Result<CallToolResult, McpError> {
        debug!(tool = %name, "sending tools/call");
        let request = CallToolRequestParam {
            name: name.to_string().into(),
            arguments: Some(arguments),
        };
        Ok(self.service.call_tool(request).await?)
    }

    /// End the session and stop the connection task
    pub async fn close(self) -> Result<(), McpError> {
        self.service
            .cancel()
            .await
            .map_err(|e| McpError::Transport(e.to_string()))?;
        Ok(())
    }
}

fn client_info() -> ClientInfo {
    ClientInfo {
        client_info: Implementation {
            name: env!("CARGO_PKG_NAME").to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            ..Implementation::default()
        },
        ..ClientInfo::default()
    }
}

fn from_mcp_tool(tool: McpTool) -> Tool {
    Tool::new(
        tool.name.into_owned(),
        tool.description.map(|d| d.into_owned()).unwrap_or_default(),
        Value::Object(tool.input_schema.as_ref().clone()),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builtin;
    use serde_json::json;
    use std::sync::Arc;

    async fn client() -> McpClient {
        let server = McpServer::new(Arc::new(builtin::registry().unwrap())).unwrap();
        McpClient::in_process(server).await.unwrap()
    }

    #[tokio::test]
    async fn test_handshake_reports_server() {
        let client = client().await;
        let info = client.server_info().unwrap();
        assert_eq!(info.server_info.name, "builtin");
        client.close().await.unwrap();
    }

    #[tokio::test]
    async fn test_list_tools_over_the_wire() {
        let client = client().await;
        let tools = client.list_tools().await.unwrap();
        let names: Vec<&str> = tools.iter().map(|t| t.name.as_str()).collect();
        assert_eq!(names, vec!["get_weather", "calculate", "search_contacts"]);
        assert_eq!(tools[1].input_schema["required"], json!(["expression"]));
    }

    #[tokio::test]
    async fn test_unknown_tool_is_rpc_error() {
        let client = client().await;
        let err = client.call_tool("get_time", JsonObject::new()).await.unwrap_err();
        assert!(matches!(err, McpError::Rpc { code: -32602, .. }), "{}", err);
    }

    #[tokio::test]
    async fn test_pipe_closed_after_server_stops() {
        let (client_io, server_io) = tokio::io::duplex(PIPE_CAPACITY);
        drop(server_io);
        let err = McpClient::connect(client_io).await.err().unwrap();
        assert!(matches!(err, McpError::Connect(_)));
    }
}
