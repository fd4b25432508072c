use anyhow::{anyhow, Result};
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use crate::models::message::Message;
use crate::models::tool::Tool;
use crate::providers::base::{Provider, ToolChoice, Usage};

/// What the mock provider was asked for on one call
#[derive(Debug, Clone)]
pub struct MockRequest {
    pub messages: Vec<Message>,
    pub tools: Vec<Tool>,
    pub tool_choice: ToolChoice,
}

/// A mock provider that returns pre-configured responses for testing.
/// Clones share their script and request log.
#[derive(Clone)]
pub struct MockProvider {
    responses: Arc<Mutex<VecDeque<Result<Message, String>>>>,
    repeat: Option<Message>,
    requests: Arc<Mutex<Vec<MockRequest>>>,
}

impl MockProvider {
    /// Create a new mock provider with a sequence of responses
    pub fn new(responses: Vec<Message>) -> Self {
        Self {
            responses: Arc::new(Mutex::new(responses.into_iter().map(Ok).collect())),
            repeat: None,
            requests: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// A provider that answers every call with the same message
    pub fn repeating(response: Message) -> Self {
        Self {
            repeat: Some(response),
            ..Self::new(Vec::new())
        }
    }

    /// Queue a failed completion after the responses already queued
    pub fn with_failure<S: Into<String>>(self, error: S) -> Self {
        self.responses
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push_back(Err(error.into()));
        self
    }

    /// Every request received so far, oldest first
    pub fn requests(&self) -> Vec<MockRequest> {
        self.requests
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    pub fn call_count(&self) -> usize {
        self.requests.lock().unwrap_or_else(|e| e.into_inner()).len()
    }
}

#[async_trait]
impl Provider for MockProvider {
    async fn complete(
        &self,
        messages: &[Message],
        tools: &[Tool],
        tool_choice: ToolChoice,
    ) -> Result<(Message, Usage)> {
        self.requests
            .lock()
            .map_err(|_| anyhow!("mock provider lock poisoned"))?
            .push(MockRequest {
                messages: messages.to_vec(),
                tools: tools.to_vec(),
                tool_choice,
            });

        let next = self
            .responses
            .lock()
            .map_err(|_| anyhow!("mock provider lock poisoned"))?
            .pop_front();

        match (next, &self.repeat) {
            (Some(Ok(message)), _) => Ok((message, Usage::default())),
            (Some(Err(error)), _) => Err(anyhow!(error)),
            (None, Some(message)) => Ok((message.clone(), Usage::default())),
            // Return empty response if no more pre-configured responses
            (None, None) => Ok((Message::assistant().with_text(""), Usage::default())),
        }
    }
}
