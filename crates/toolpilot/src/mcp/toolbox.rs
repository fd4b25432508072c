use async_trait::async_trait;
use rmcp::model::{CallToolResult, ErrorCode, JsonObject};
use serde_json::Value;
use tracing::{debug, info};

use super::client::McpClient;
use crate::errors::{AgentError, AgentResult, McpError};
use crate::models::tool::{Tool, ToolCall};
use crate::registry::Toolbox;

/// A toolbox whose tools were discovered from an MCP server. The tool list is
/// fetched once at connect time and never refreshed.
pub struct McpToolbox {
    name: String,
    client: McpClient,
    tools: Vec<Tool>,
}

impl McpToolbox {
    /// Discover the tools of an initialized session
    pub async fn connect(client: McpClient) -> Result<Self, McpError> {
        let name = client
            .server_info()
            .map(|info| info.server_info.name.clone())
            .unwrap_or_default();
        let tools = client.list_tools().await?;
        info!(server = %name, tools = tools.len(), "connected to mcp server");
        Ok(Self {
            name,
            client,
            tools,
        })
    }

    pub fn client(&self) -> &McpClient {
        &self.client
    }
}

fn result_text(result: &CallToolResult) -> String {
    result
        .content
        .iter()
        .filter_map(|content| content.as_text())
        .map(|text| text.text.as_str())
        .collect::<Vec<_>>()
        .join("\n")
}

/// Structured content wins, then text that parses as JSON, then the raw text
fn result_value(result: CallToolResult) -> Value {
    let text = result_text(&result);
    if let Some(structured) = result.structured_content {
        return structured;
    }
    serde_json::from_str(&text).unwrap_or(Value::String(text))
}

/// Rebuild the error the server-side invoker produced. Results from other
/// servers carry no kind, so their text becomes an execution failure.
fn result_error(result: &CallToolResult) -> AgentError {
    let detail = result.structured_content.as_ref().and_then(|detail| {
        Some((detail.get("kind")?.as_str()?, detail.get("message")?.as_str()?))
    });
    match detail {
        Some((kind, message)) => AgentError::from_kind(kind, message),
        None => AgentError::ExecutionError(result_text(result)),
    }
}

#[async_trait]
impl Toolbox for McpToolbox {
    fn name(&self) -> &str {
        &self.name
    }

    fn tools(&self) -> &[Tool] {
        &self.tools
    }

    async fn call(&self, tool_call: ToolCall) -> AgentResult<Value> {
        if !self.tools.iter().any(|tool| tool.name == tool_call.name) {
            return Err(AgentError::ToolNotFound(tool_call.name));
        }
        let arguments = match tool_call.arguments {
            Value::Object(arguments) => arguments,
            Value::Null => JsonObject::new(),
            other => {
                return Err(AgentError::InvalidParameters(format!(
                    "arguments for {} must be a JSON object, got {}",
                    tool_call.name, other
                )))
            }
        };

        debug!(tool = %tool_call.name, server = %self.name, "calling tool over mcp");
        let result = self
            .client
            .call_tool(&tool_call.name, arguments)
            .await
            .map_err(|e| match e {
                McpError::Rpc { code, message } if code == ErrorCode::INVALID_PARAMS.0 => {
                    AgentError::InvalidParameters(message)
                }
                other => AgentError::ExecutionError(other.to_string()),
            })?;

        if result.is_error.unwrap_or(false) {
            return Err(result_error(&result));
        }
        Ok(result_value(result))
    }
}
