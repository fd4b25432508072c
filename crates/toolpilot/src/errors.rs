use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use thiserror::Error;

/// Tool-level failures. These never end a loop: they are serialized into a
/// tool message so the model can react to them.
#[non_exhaustive]
#[derive(Error, Debug, Clone, PartialEq, Deserialize, Serialize)]
pub enum AgentError {
    #[error("Tool not found: {0}")]
    ToolNotFound(String),

    #[error("Invalid parameters: {0}")]
    InvalidParameters(String),

    #[error("Tool execution failed: {0}")]
    ExecutionError(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl AgentError {
    /// Stable tag reported to the model alongside the message
    pub fn kind(&self) -> &'static str {
        match self {
            AgentError::ToolNotFound(_) => "unknown_tool",
            AgentError::InvalidParameters(_) => "bad_arguments",
            AgentError::ExecutionError(_) => "execution_failed",
            AgentError::Internal(_) => "internal",
        }
    }

    /// The message without the kind prefix
    pub fn message(&self) -> &str {
        match self {
            AgentError::ToolNotFound(m)
            | AgentError::InvalidParameters(m)
            | AgentError::ExecutionError(m)
            | AgentError::Internal(m) => m,
        }
    }

    /// Rebuild an error from its `kind()` tag. Unknown tags become execution failures.
    pub fn from_kind<S: Into<String>>(kind: &str, message: S) -> Self {
        let message = message.into();
        match kind {
            "unknown_tool" => AgentError::ToolNotFound(message),
            "bad_arguments" => AgentError::InvalidParameters(message),
            "internal" => AgentError::Internal(message),
            _ => AgentError::ExecutionError(message),
        }
    }

    /// The structured payload embedded in a tool message
    pub fn to_payload(&self) -> Value {
        json!({
            "error": self.to_string(),
            "kind": self.kind(),
        })
    }
}

pub type AgentResult<T> = Result<T, AgentError>;

/// Failures while assembling a set of tools or the agent around them. These
/// surface before any loop runs.
#[derive(Error, Debug)]
pub enum RegistryError {
    #[error("max_steps must be at least 1")]
    ZeroStepBudget,

    #[error("Duplicate tool name: {0}")]
    DuplicateTool(String),

    #[error("Invalid input schema for tool {tool}: {reason}")]
    InvalidSchema { tool: String, reason: String },

    #[error("Tool {tool} cannot be expressed to the provider: {reason}")]
    SchemaTranslation { tool: String, reason: String },
}

/// Conditions that end an agentic loop with an error instead of an outcome
#[derive(Error, Debug)]
pub enum LoopError {
    #[error("Completion request failed: {0}")]
    Upstream(#[source] anyhow::Error),

    #[error("Agent run was cancelled")]
    Cancelled,
}

/// Failures talking to an MCP server
#[derive(Error, Debug)]
pub enum McpError {
    #[error("Failed to establish mcp session: {0}")]
    Connect(String),

    #[error("Transport failure: {0}")]
    Transport(String),

    #[error("Server returned error {code}: {message}")]
    Rpc { code: i32, message: String },
}

impl From<rmcp::ServiceError> for McpError {
    fn from(err: rmcp::ServiceError) -> Self {
        match err {
            rmcp::ServiceError::McpError(data) => McpError::Rpc {
                code: data.code.0,
                message: data.message.into_owned(),
            },
            other => McpError::Transport(other.to_string()),
        }
    }
}
