use super::content::TextContent;
use super::role::Role;
use super::tool::ToolCall;
use crate::errors::AgentResult;
use chrono::Utc;
use serde_json::Value;

#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct ToolRequest {
    pub id: String,
    pub tool_call: ToolCall,
    /// The argument text exactly as the provider sent it, replayed verbatim
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub raw_arguments: Option<String>,
}

impl ToolRequest {
    pub fn new<S: Into<String>>(id: S, tool_call: ToolCall) -> Self {
        Self {
            id: id.into(),
            tool_call,
            raw_arguments: None,
        }
    }

    pub fn with_raw_arguments<S: Into<String>>(mut self, raw: S) -> Self {
        self.raw_arguments = Some(raw.into());
        self
    }
}

#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct ToolResponse {
    pub id: String,
    pub tool_result: AgentResult<Value>,
}

impl ToolResponse {
    /// The payload the model sees: the tool's value, or the error payload
    pub fn payload(&self) -> Value {
        match &self.tool_result {
            Ok(value) => value.clone(),
            Err(e) => e.to_payload(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
/// Content passed inside a message, which can be both simple content and tool content
pub enum MessageContent {
    Text(TextContent),
    ToolRequest(ToolRequest),
    ToolResponse(ToolResponse),
}

impl MessageContent {
    pub fn text<S: Into<String>>(text: S) -> Self {
        MessageContent::Text(TextContent::new(text))
    }

    pub fn tool_request<S: Into<String>>(id: S, tool_call: ToolCall) -> Self {
        MessageContent::ToolRequest(ToolRequest::new(id, tool_call))
    }

    pub fn tool_response<S: Into<String>>(id: S, tool_result: AgentResult<Value>) -> Self {
        MessageContent::ToolResponse(ToolResponse {
            id: id.into(),
            tool_result,
        })
    }

    pub fn as_tool_request(&self) -> Option<&ToolRequest> {
        if let MessageContent::ToolRequest(ref tool_request) = self {
            Some(tool_request)
        } else {
            None
        }
    }

    pub fn as_tool_response(&self) -> Option<&ToolResponse> {
        if let MessageContent::ToolResponse(ref tool_response) = self {
            Some(tool_response)
        } else {
            None
        }
    }

    /// Get the text content if this is a TextContent variant
    pub fn as_text(&self) -> Option<&str> {
        match self {
            MessageContent::Text(text) => Some(&text.text),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
/// A message to or from an LLM
pub struct Message {
    pub role: Role,
    pub created: i64,
    pub content: Vec<MessageContent>,
}

impl Message {
    fn with_role(role: Role) -> Self {
        Message {
            role,
            created: Utc::now().timestamp(),
            content: Vec::new(),
        }
    }

    /// Create a new system message with the current timestamp
    pub fn system() -> Self {
        Self::with_role(Role::System)
    }

    /// Create a new user message with the current timestamp
    pub fn user() -> Self {
        Self::with_role(Role::User)
    }

    /// Create a new assistant message with the current timestamp
    pub fn assistant() -> Self {
        Self::with_role(Role::Assistant)
    }

    /// Create the tool message answering the request with the given id.
    /// A tool message always carries exactly one response.
    pub fn tool_result<S: Into<String>>(id: S, result: AgentResult<Value>) -> Self {
        Self::with_role(Role::Tool).with_content(MessageContent::tool_response(id, result))
    }

    /// Add any MessageContent to the message
    pub fn with_content(mut self, content: MessageContent) -> Self {
        self.content.push(content);
        self
    }

    /// Add text content to the message
    pub fn with_text<S: Into<String>>(self, text: S) -> Self {
        self.with_content(MessageContent::text(text))
    }

    /// Add a tool request to the message
    pub fn with_tool_request<S: Into<String>>(self, id: S, tool_call: ToolCall) -> Self {
        self.with_content(MessageContent::tool_request(id, tool_call))
    }

    /// All text content joined with newlines
    pub fn text(&self) -> String {
        self.content
            .iter()
            .filter_map(|c| c.as_text())
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// The tool requests carried by this message, in the order the model emitted them
    pub fn tool_requests(&self) -> Vec<&ToolRequest> {
        self.content
            .iter()
            .filter_map(|c| c.as_tool_request())
            .collect()
    }

    pub fn has_tool_requests(&self) -> bool {
        self.content.iter().any(|c| c.as_tool_request().is_some())
    }

    pub fn tool_response(&self) -> Option<&ToolResponse> {
        self.content.iter().find_map(|c| c.as_tool_response())
    }
}
