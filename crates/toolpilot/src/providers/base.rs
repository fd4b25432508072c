use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use strum_macros::{Display, EnumString};

use crate::models::message::Message;
use crate::models::tool::Tool;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Usage {
    pub input_tokens: Option<i32>,
    pub output_tokens: Option<i32>,
    pub total_tokens: Option<i32>,
}

impl Usage {
    pub fn new(
        input_tokens: Option<i32>,
        output_tokens: Option<i32>,
        total_tokens: Option<i32>,
    ) -> Self {
        Self {
            input_tokens,
            output_tokens,
            total_tokens,
        }
    }
}

/// How the model may use the tools it is offered
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, Display, EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum ToolChoice {
    /// The model decides whether to call tools
    #[default]
    Auto,
    /// The model must call at least one tool
    Required,
    /// The model must answer without tools
    None,
}

/// How tool requests travel between the agent and the endpoint
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, Display, EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum ToolCalling {
    /// The endpoint's own function-calling API
    #[default]
    Native,
    /// Tools are described in the system prompt and calls are parsed out of
    /// the reply text
    Prompted,
}

/// Base trait for completion endpoints (OpenAI, Groq, Ollama, etc)
#[async_trait]
pub trait Provider: Send + Sync {
    /// Generate the next message for the conversation.
    ///
    /// The returned message either carries text, one or more tool requests, or both.
    async fn complete(
        &self,
        messages: &[Message],
        tools: &[Tool],
        tool_choice: ToolChoice,
    ) -> Result<(Message, Usage)>;
}
