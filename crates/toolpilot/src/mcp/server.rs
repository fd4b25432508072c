use std::sync::Arc;

use rmcp::model::{
    CallToolRequestParam, CallToolResult, Content, Implementation, JsonObject, ListToolsResult,
    PaginatedRequestParam, ServerCapabilities, ServerInfo, Tool as McpTool,
};
use rmcp::service::RequestContext;
use rmcp::{ErrorData, RoleServer, ServerHandler};
use serde_json::{json, Value};
use tracing::debug;

use crate::errors::{AgentError, RegistryError};
use crate::invoker::ToolInvoker;
use crate::models::tool::{Tool, ToolCall};
use crate::registry::Toolbox;

/// Serves a toolbox over MCP. Arguments are validated here as well, so any
/// client gets the same guarantees as an in-process caller.
pub struct McpServer {
    info: Implementation,
    tools: Vec<McpTool>,
    invoker: ToolInvoker,
}

impl McpServer {
    pub fn new(toolbox: Arc<dyn Toolbox>) -> Result<Self, RegistryError> {
        let tools = toolbox
            .tools()
            .iter()
            .map(to_mcp_tool)
            .collect::<Result<Vec<_>, _>>()?;
        let info = Implementation {
            name: toolbox.name().to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            ..Implementation::default()
        };
        Ok(Self {
            info,
            tools,
            invoker: ToolInvoker::new(toolbox)?,
        })
    }

    pub fn info(&self) -> &Implementation {
        &self.info
    }

    /// Run one tool call. An unknown tool is a protocol error; every other
    /// failure comes back as an error result whose structured content holds
    /// the error kind and message.
    pub async fn call(
        &self,
        name: String,
        arguments: Option<JsonObject>,
    ) -> Result<CallToolResult, ErrorData> {
        let arguments = arguments.map(Value::Object).unwrap_or_else(|| json!({}));
        let call = ToolCall::new(name, arguments);
        match self.invoker.invoke(&call).await {
            Ok(value) => Ok(success(value)),
            Err(AgentError::ToolNotFound(name)) => Err(ErrorData::invalid_params(
                format!("Unknown tool: {}", name),
                None,
            )),
            Err(e) => {
                debug!(tool = %call.name, kind = e.kind(), "reporting tool failure in-band");
                Ok(failure(&e))
            }
        }
    }
}

impl ServerHandler for McpServer {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            server_info: self.info.clone(),
            ..ServerInfo::default()
        }
    }

    async fn list_tools(
        &self,
        _request: Option<PaginatedRequestParam>,
        _context: RequestContext<RoleServer>,
    ) -> Result<ListToolsResult, ErrorData> {
        Ok(ListToolsResult::with_all_items(self.tools.clone()))
    }

    async fn call_tool(
        &self,
        request: CallToolRequestParam,
        _context: RequestContext<RoleServer>,
    ) -> Result<CallToolResult, ErrorData> {
        debug!(tool = %request.name, "mcp tool call");
        self.call(request.name.into_owned(), request.arguments).await
    }
}

/// MCP requires object input schemas
fn to_mcp_tool(tool: &Tool) -> Result<McpTool, RegistryError> {
    match &tool.input_schema {
        Value::Object(schema) => Ok(McpTool::new(
            tool.name.clone(),
            tool.description.clone(),
            Arc::new(schema.clone()),
        )),
        other => Err(RegistryError::SchemaTranslation {
            tool: tool.name.clone(),
            reason: format!("input schema must be a JSON object, got {}", other),
        }),
    }
}

/// Objects are also offered as structured content
fn success(value: Value) -> CallToolResult {
    if value.is_object() {
        CallToolResult::structured(value)
    } else {
        CallToolResult::success(vec![Content::text(value.to_string())])
    }
}

fn failure(error: &AgentError) -> CallToolResult {
    let mut result = CallToolResult::error(vec![Content::text(error.to_string())]);
    result.structured_content = Some(json!({
        "kind": error.kind(),
        "message": error.message(),
    }));
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builtin;
    use crate::errors::AgentResult;
    use crate::registry::{FnHandler, ToolRegistry};
    use rmcp::model::ErrorCode;

    fn server() -> McpServer {
        McpServer::new(Arc::new(builtin::registry().unwrap())).unwrap()
    }

    fn arguments(value: Value) -> Option<JsonObject> {
        value.as_object().cloned()
    }

    #[test]
    fn test_info_names_the_toolbox() {
        let info = server().get_info();
        assert_eq!(info.server_info.name, "builtin");
        assert!(info.capabilities.tools.is_some());
    }

    #[test]
    fn test_tools_keep_registration_order() {
        let names: Vec<String> = server().tools.iter().map(|t| t.name.to_string()).collect();
        assert_eq!(names, vec!["get_weather", "calculate", "search_contacts"]);
    }

    #[test]
    fn test_non_object_schema_rejected() {
        let registry = ToolRegistry::new("odd")
            .with_tool(
                Tool::new("anything", "Accepts anything", json!(true)),
                FnHandler(|_: Value| -> AgentResult<Value> { Ok(json!(null)) }),
            )
            .unwrap();
        let err = McpServer::new(Arc::new(registry)).err().unwrap();
        assert!(matches!(err, RegistryError::SchemaTranslation { tool, .. } if tool == "anything"));
    }

    #[tokio::test]
    async fn test_call_returns_structured_content() {
        let result = server()
            .call("get_weather".into(), arguments(json!({"city": "Mumbai"})))
            .await
            .unwrap();
        assert_ne!(result.is_error, Some(true));
        assert_eq!(
            result.structured_content,
            Some(json!({"temp_c": 32, "condition": "Humid"}))
        );
    }

    #[tokio::test]
    async fn test_bad_arguments_reported_in_band() {
        let result = server()
            .call("calculate".into(), arguments(json!({"expression": 12})))
            .await
            .unwrap();
        assert_eq!(result.is_error, Some(true));
        let detail = result.structured_content.unwrap();
        assert_eq!(detail["kind"], "bad_arguments");
        assert!(!detail["message"]
            .as_str()
            .unwrap()
            .starts_with("Invalid parameters"));
    }

    #[tokio::test]
    async fn test_unknown_tool_is_invalid_params() {
        let err = server().call("get_time".into(), None).await.unwrap_err();
        assert_eq!(err.code.0, ErrorCode::INVALID_PARAMS.0);
        assert!(err.message.contains("get_time"));
    }
}
