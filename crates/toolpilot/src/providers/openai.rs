use anyhow::{anyhow, Result};
use async_trait::async_trait;
use reqwest::Client;
use reqwest::StatusCode;
use serde_json::{json, Value};
use std::time::Duration;

use super::base::{Provider, ToolChoice, Usage};
use super::configs::OpenAiProviderConfig;
use super::utils::{
    check_openai_context_length_error, messages_to_openai_spec, openai_response_to_message,
};
use crate::bridge::tools_to_openai_spec;
use crate::models::message::Message;
use crate::models::tool::Tool;

pub struct OpenAiProvider {
    client: Client,
    config: OpenAiProviderConfig,
}

impl OpenAiProvider {
    pub fn new(config: OpenAiProviderConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(600)) // 10 minutes timeout
            .build()?;

        Ok(Self { client, config })
    }

    pub fn model(&self) -> &str {
        &self.config.model
    }

    fn get_usage(data: &Value) -> Usage {
        let Some(usage) = data.get("usage") else {
            return Usage::default();
        };

        let input_tokens = usage
            .get("prompt_tokens")
            .and_then(|v| v.as_i64())
            .map(|v| v as i32);

        let output_tokens = usage
            .get("completion_tokens")
            .and_then(|v| v.as_i64())
            .map(|v| v as i32);

        let total_tokens = usage
            .get("total_tokens")
            .and_then(|v| v.as_i64())
            .map(|v| v as i32)
            .or_else(|| match (input_tokens, output_tokens) {
                (Some(input), Some(output)) => Some(input + output),
                _ => None,
            });

        Usage::new(input_tokens, output_tokens, total_tokens)
    }

    async fn post(&self, payload: Value) -> Result<Value> {
        let url = format!(
            "{}/v1/chat/completions",
            self.config.host.trim_end_matches('/')
        );

        let mut request = self.client.post(&url).json(&payload);
        if let Some(api_key) = &self.config.api_key {
            request = request.header("Authorization", format!("Bearer {}", api_key));
        }
        let response = request.send().await?;

        match response.status() {
            StatusCode::OK => Ok(response.json().await?),
            status if status == StatusCode::TOO_MANY_REQUESTS || status.as_u16() >= 500 => {
                Err(anyhow!("Server error: {}", status))
            }
            status => {
                // error bodies usually explain what was wrong with the request
                let body = response.text().await.unwrap_or_default();
                Err(anyhow!("Request failed: {}\nResponse: {}", status, body))
            }
        }
    }

    fn build_payload(
        &self,
        messages: &[Message],
        tools: &[Tool],
        tool_choice: ToolChoice,
    ) -> Result<Value> {
        let mut payload = serde_json::Map::new();
        payload.insert("model".to_string(), json!(self.config.model));
        payload.insert(
            "messages".to_string(),
            json!(messages_to_openai_spec(messages)),
        );

        if !tools.is_empty() {
            let tools_spec = tools_to_openai_spec(tools)?;
            payload.insert("tools".to_string(), json!(tools_spec));
            payload.insert("tool_choice".to_string(), json!(tool_choice));
        }
        if let Some(temp) = self.config.temperature {
            payload.insert("temperature".to_string(), json!(temp));
        }
        if let Some(tokens) = self.config.max_tokens {
            payload.insert("max_tokens".to_string(), json!(tokens));
        }

        Ok(Value::Object(payload))
    }
}

#[async_trait]
impl Provider for OpenAiProvider {
    async fn complete(
        &self,
        messages: &[Message],
        tools: &[Tool],
        tool_choice: ToolChoice,
    ) -> Result<(Message, Usage)> {
        let payload = self.build_payload(messages, tools, tool_choice)?;
        tracing::debug!(model = %self.config.model, %payload, "sending completion request");

        let response = self.post(payload).await?;

        // Raise specific error if context length is exceeded
        if let Some(error) = response.get("error") {
            if let Some(err) = check_openai_context_length_error(error) {
                return Err(err.into());
            }
            return Err(anyhow!("OpenAI API error: {}", error));
        }

        let usage = Self::get_usage(&response);
        let message = openai_response_to_message(response)?;

        Ok((message, usage))
    }
}
