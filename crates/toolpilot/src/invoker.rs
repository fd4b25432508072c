use std::any::Any;
use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::FutureExt;
use jsonschema::Validator;
use serde_json::Value;
use tracing::{debug, warn};

use crate::errors::{AgentError, AgentResult, RegistryError};
use crate::models::message::ToolRequest;
use crate::models::tool::{Tool, ToolCall};
use crate::registry::Toolbox;

/// Routes tool calls to a toolbox after checking them against the declared schemas
pub struct ToolInvoker {
    toolbox: Arc<dyn Toolbox>,
    validators: HashMap<String, Validator>,
}

impl ToolInvoker {
    /// Compile the input schema of every tool in the toolbox
    pub fn new(toolbox: Arc<dyn Toolbox>) -> Result<Self, RegistryError> {
        let mut validators = HashMap::new();
        for tool in toolbox.tools() {
            let validator = jsonschema::validator_for(&tool.input_schema).map_err(|e| {
                RegistryError::InvalidSchema {
                    tool: tool.name.clone(),
                    reason: e.to_string(),
                }
            })?;
            if validators.insert(tool.name.clone(), validator).is_some() {
                return Err(RegistryError::DuplicateTool(tool.name.clone()));
            }
        }
        Ok(Self {
            toolbox,
            validators,
        })
    }

    pub fn tools(&self) -> &[Tool] {
        self.toolbox.tools()
    }

    pub fn toolbox(&self) -> &Arc<dyn Toolbox> {
        &self.toolbox
    }

    /// Check the arguments of a call against the tool's declared schema
    pub fn validate(&self, tool_call: &ToolCall) -> AgentResult<()> {
        let validator = self
            .validators
            .get(&tool_call.name)
            .ok_or_else(|| AgentError::ToolNotFound(tool_call.name.clone()))?;

        if !tool_call.arguments.is_object() {
            return Err(AgentError::InvalidParameters(format!(
                "arguments for {} must be a JSON object, got {}",
                tool_call.name, tool_call.arguments
            )));
        }

        let problems: Vec<String> = validator
            .iter_errors(&tool_call.arguments)
            .map(|e| e.to_string())
            .collect();
        if problems.is_empty() {
            Ok(())
        } else {
            Err(AgentError::InvalidParameters(format!(
                "arguments for {} do not match its schema: {}",
                tool_call.name,
                problems.join("; ")
            )))
        }
    }

    /// Invoke a single tool call. Failures are returned as values and panics
    /// inside the tool are caught, so this never takes the caller down.
    pub async fn invoke(&self, tool_call: &ToolCall) -> AgentResult<Value> {
        self.validate(tool_call)?;

        let outcome = AssertUnwindSafe(self.toolbox.call(tool_call.clone()))
            .catch_unwind()
            .await;

        match outcome {
            Ok(Ok(value)) => {
                debug!(tool = %tool_call.name, result = %value, "tool succeeded");
                Ok(value)
            }
            Ok(Err(AgentError::Internal(message))) => Err(AgentError::ExecutionError(message)),
            Ok(Err(e)) => Err(e),
            Err(panic) => {
                let message = panic_message(panic.as_ref());
                warn!(tool = %tool_call.name, %message, "tool panicked");
                Err(AgentError::ExecutionError(message))
            }
        }
    }

    /// Invoke every request of one model turn concurrently. Results come back
    /// in the same order as the requests.
    pub async fn invoke_all(&self, requests: &[&ToolRequest]) -> Vec<AgentResult<Value>> {
        let futures: Vec<_> = requests
            .iter()
            .map(|request| self.invoke(&request.tool_call))
            .collect();
        futures::future::join_all(futures).await
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "tool panicked".to_string()
    }
}
