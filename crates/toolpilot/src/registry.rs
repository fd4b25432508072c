use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use crate::errors::{AgentError, AgentResult, RegistryError};
use crate::models::tool::{Tool, ToolCall};

/// The executable side of a tool
#[async_trait]
pub trait ToolHandler: Send + Sync {
    async fn call(&self, arguments: Value) -> AgentResult<Value>;
}

/// Adapts a synchronous closure into a [`ToolHandler`]
pub struct FnHandler<F>(pub F);

#[async_trait]
impl<F> ToolHandler for FnHandler<F>
where
    F: Fn(Value) -> AgentResult<Value> + Send + Sync,
{
    async fn call(&self, arguments: Value) -> AgentResult<Value> {
        (self.0)(arguments)
    }
}

/// Adapts a closure returning a future into a [`ToolHandler`]
pub struct AsyncFnHandler<F>(pub F);

#[async_trait]
impl<F, Fut> ToolHandler for AsyncFnHandler<F>
where
    F: Fn(Value) -> Fut + Send + Sync,
    Fut: Future<Output = AgentResult<Value>> + Send,
{
    async fn call(&self, arguments: Value) -> AgentResult<Value> {
        (self.0)(arguments).await
    }
}

/// A named set of tools the agent can discover and call.
///
/// Implemented by the in-process [`ToolRegistry`] and by toolboxes backed by a
/// remote discovery interface such as an MCP server. The tool list is fixed
/// for the lifetime of the toolbox.
#[async_trait]
pub trait Toolbox: Send + Sync {
    /// Get the name of the toolbox
    fn name(&self) -> &str;

    /// Get available tools, in a stable order
    fn tools(&self) -> &[Tool];

    /// Call a tool with the given arguments
    async fn call(&self, tool_call: ToolCall) -> AgentResult<Value>;
}

/// An in-process registry mapping tool names to their handlers.
///
/// Built once before any loop starts and shared read-only afterwards.
pub struct ToolRegistry {
    name: String,
    tools: Vec<Tool>,
    handlers: HashMap<String, Arc<dyn ToolHandler>>,
}

impl ToolRegistry {
    pub fn new<S: Into<String>>(name: S) -> Self {
        Self {
            name: name.into(),
            tools: Vec::new(),
            handlers: HashMap::new(),
        }
    }

    /// Register a tool, failing if the name is taken or the schema does not compile
    pub fn register<H>(&mut self, tool: Tool, handler: H) -> Result<(), RegistryError>
    where
        H: ToolHandler + 'static,
    {
        if self.handlers.contains_key(&tool.name) {
            return Err(RegistryError::DuplicateTool(tool.name));
        }
        if let Err(e) = jsonschema::validator_for(&tool.input_schema) {
            return Err(RegistryError::InvalidSchema {
                tool: tool.name,
                reason: e.to_string(),
            });
        }

        tracing::debug!(tool = %tool.name, registry = %self.name, "registered tool");
        self.handlers.insert(tool.name.clone(), Arc::new(handler));
        self.tools.push(tool);
        Ok(())
    }

    /// Builder-style variant of [`ToolRegistry::register`]
    pub fn with_tool<H>(mut self, tool: Tool, handler: H) -> Result<Self, RegistryError>
    where
        H: ToolHandler + 'static,
    {
        self.register(tool, handler)?;
        Ok(self)
    }

    /// Look up the handler for a tool
    pub fn resolve(&self, name: &str) -> AgentResult<Arc<dyn ToolHandler>> {
        self.handlers
            .get(name)
            .cloned()
            .ok_or_else(|| AgentError::ToolNotFound(name.to_string()))
    }

    /// Descriptors in registration order
    pub fn list(&self) -> &[Tool] {
        &self.tools
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}

#[async_trait]
impl Toolbox for ToolRegistry {
    fn name(&self) -> &str {
        &self.name
    }

    fn tools(&self) -> &[Tool] {
        self.list()
    }

    async fn call(&self, tool_call: ToolCall) -> AgentResult<Value> {
        let handler = self.resolve(&tool_call.name)?;
        handler.call(tool_call.arguments).await
    }
}
