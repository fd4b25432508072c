use anyhow::{anyhow, Result};
use serde_json::{json, Value};

use crate::models::message::{Message, MessageContent, ToolRequest};
use crate::models::role::Role;
use crate::models::tool::ToolCall;

/// Convert internal Message format to OpenAI's API message specification
pub fn messages_to_openai_spec(messages: &[Message]) -> Vec<Value> {
    let mut messages_spec = Vec::new();

    for message in messages {
        match message.role {
            Role::Tool => {
                // each tool message answers exactly one request
                for response in message.content.iter().filter_map(|c| c.as_tool_response()) {
                    messages_spec.push(json!({
                        "role": "tool",
                        "tool_call_id": response.id,
                        "content": response.payload().to_string(),
                    }));
                }
            }
            role => {
                let text = message.text();
                let mut converted = json!({ "role": role });

                let tool_calls: Vec<Value> = message
                    .tool_requests()
                    .into_iter()
                    .map(|request| {
                        json!({
                            "id": request.id,
                            "type": "function",
                            "function": {
                                "name": request.tool_call.name,
                                "arguments": arguments_to_wire(request),
                            }
                        })
                    })
                    .collect();

                if tool_calls.is_empty() {
                    converted["content"] = json!(text);
                } else {
                    converted["content"] = if text.is_empty() {
                        Value::Null
                    } else {
                        json!(text)
                    };
                    converted["tool_calls"] = json!(tool_calls);
                }
                messages_spec.push(converted);
            }
        }
    }

    messages_spec
}

// the model's own text goes back unchanged when we have it
fn arguments_to_wire(request: &ToolRequest) -> String {
    match &request.raw_arguments {
        Some(raw) => raw.clone(),
        None => request.tool_call.arguments.to_string(),
    }
}

/// Convert OpenAI's API response to internal Message format
pub fn openai_response_to_message(response: Value) -> Result<Message> {
    let original = response
        .get("choices")
        .and_then(|choices| choices.get(0))
        .and_then(|choice| choice.get("message"))
        .ok_or_else(|| anyhow!("Response did not contain a message: {}", response))?;

    let mut message = Message::assistant();

    if let Some(text) = original.get("content").and_then(|t| t.as_str()) {
        if !text.is_empty() {
            message = message.with_text(text);
        }
    }

    if let Some(tool_calls) = original.get("tool_calls").and_then(|t| t.as_array()) {
        for (index, tool_call) in tool_calls.iter().enumerate() {
            let id = tool_call["id"]
                .as_str()
                .map(String::from)
                .unwrap_or_else(|| format!("call_{}", index));
            let function_name = tool_call["function"]["name"]
                .as_str()
                .unwrap_or_default()
                .to_string();
            let raw = &tool_call["function"]["arguments"];
            let call = ToolCall::new(function_name, parse_arguments(raw));
            let mut request = ToolRequest::new(id, call);
            if let Value::String(text) = raw {
                request = request.with_raw_arguments(text.as_str());
            }

            message = message.with_content(MessageContent::ToolRequest(request));
        }
    }

    Ok(message)
}

fn parse_arguments(raw: &Value) -> Value {
    match raw {
        Value::String(text) if text.trim().is_empty() => json!({}),
        Value::String(text) => match serde_json::from_str::<Value>(text) {
            Ok(Value::Null) => json!({}),
            Ok(parsed) => parsed,
            Err(_) => Value::String(text.clone()),
        },
        // some compatible servers send the object inline
        Value::Object(_) => raw.clone(),
        Value::Null => json!({}),
        other => other.clone(),
    }
}

#[derive(Debug, thiserror::Error)]
#[error("Context length exceeded. Message: {0}")]
pub struct ContextLengthExceededError(String);

pub fn check_openai_context_length_error(error: &Value) -> Option<ContextLengthExceededError> {
    let code = error.get("code")?.as_str()?;
    if code == "context_length_exceeded" || code == "string_above_max_length" {
        let message = error
            .get("message")
            .and_then(|m| m.as_str())
            .unwrap_or("Unknown error")
            .to_string();
        Some(ContextLengthExceededError(message))
    } else {
        None
    }
}
