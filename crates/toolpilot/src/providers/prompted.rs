use anyhow::Result;
use async_trait::async_trait;
use lazy_static::lazy_static;
use regex::Regex;
use serde_json::{json, Value};
use tracing::debug;
use uuid::Uuid;

use super::base::{Provider, ToolChoice, Usage};
use crate::models::message::{Message, MessageContent, ToolRequest};
use crate::models::role::Role;
use crate::models::tool::{Tool, ToolCall};

lazy_static! {
    static ref CODE_FENCE: Regex = Regex::new(r"(?s)^```[a-zA-Z]*\s*(.*?)\s*```$").unwrap();
}

/// Tool calling for endpoints without native support. The tool catalog goes
/// into the system prompt, and a reply that is nothing but
/// `{"function": ..., "arguments": ...}` becomes a tool request. Any other
/// reply is a direct answer.
pub struct PromptedToolsProvider {
    inner: Box<dyn Provider>,
}

impl PromptedToolsProvider {
    pub fn new(inner: Box<dyn Provider>) -> Self {
        Self { inner }
    }
}

#[async_trait]
impl Provider for PromptedToolsProvider {
    async fn complete(
        &self,
        messages: &[Message],
        tools: &[Tool],
        tool_choice: ToolChoice,
    ) -> Result<(Message, Usage)> {
        let offered: &[Tool] = if tool_choice == ToolChoice::None {
            &[]
        } else {
            tools
        };
        let prompt = tool_prompt(offered, tool_choice);
        let rewritten = rewrite_history(messages, prompt.as_deref());

        let (reply, usage) = self.inner.complete(&rewritten, &[], ToolChoice::None).await?;
        if offered.is_empty() || !reply.tool_requests().is_empty() {
            return Ok((reply, usage));
        }
        Ok((parse_reply(reply), usage))
    }
}

fn tool_prompt(tools: &[Tool], tool_choice: ToolChoice) -> Option<String> {
    if tools.is_empty() {
        return None;
    }
    let catalog: Vec<String> = tools
        .iter()
        .map(|tool| {
            format!(
                "- {}: {} Arguments schema: {}",
                tool.name, tool.description, tool.input_schema
            )
        })
        .collect();
    let otherwise = match tool_choice {
        ToolChoice::Required => "Always call one of the tools.",
        _ => "For any other question, respond normally in plain text.",
    };
    Some(format!(
        "You have access to these tools:\n{}\n\n\
         RULES:\n\
         1. To call a tool, respond with ONLY this JSON (no extra text):\n   \
         {{\"function\": \"tool_name\", \"arguments\": {{...}}}}\n\
         2. {}\n\
         3. NEVER make up tool results. Wait for them to be sent to you.",
        catalog.join("\n"),
        otherwise
    ))
}

fn call_text(request: &ToolRequest) -> String {
    format!(
        r#"{{"function": {}, "arguments": {}}}"#,
        json!(request.tool_call.name),
        request.tool_call.arguments
    )
}

/// Replace the structured parts of the history with plain text: requests
/// become the JSON the model would have written and results come back as
/// user messages.
fn rewrite_history(messages: &[Message], prompt: Option<&str>) -> Vec<Message> {
    let mut rewritten = Vec::with_capacity(messages.len() + 1);
    let mut prompt = prompt;

    if !matches!(messages.first().map(|m| &m.role), Some(Role::System)) {
        if let Some(prompt) = prompt.take() {
            rewritten.push(Message::system().with_text(prompt));
        }
    }

    for message in messages {
        match message.role {
            Role::System => {
                let text = match prompt.take() {
                    Some(prompt) => format!("{}\n\n{}", message.text(), prompt),
                    None => message.text(),
                };
                rewritten.push(Message::system().with_text(text));
            }
            Role::Assistant if !message.tool_requests().is_empty() => {
                let mut parts: Vec<String> = Vec::new();
                let text = message.text();
                if !text.is_empty() {
                    parts.push(text);
                }
                parts.extend(message.tool_requests().into_iter().map(call_text));
                rewritten.push(Message::assistant().with_text(parts.join("\n")));
            }
            Role::Tool => {
                for response in message.content.iter().filter_map(|c| c.as_tool_response()) {
                    rewritten.push(Message::user().with_text(format!(
                        "Here is the tool result: {}. Now respond naturally to the user.",
                        response.payload()
                    )));
                }
            }
            _ => rewritten.push(message.clone()),
        }
    }
    rewritten
}

/// Turn a reply holding one call object, or an array of them, into tool
/// requests. Anything else is left as a direct answer.
fn parse_reply(reply: Message) -> Message {
    let text = reply.text();
    let Some(calls) = extract_calls(&text) else {
        return reply;
    };
    debug!(calls = calls.len(), "parsed prompted tool calls");

    calls.into_iter().fold(Message::assistant(), |message, call| {
        let id = format!("call_{}", Uuid::new_v4().simple());
        message.with_content(MessageContent::ToolRequest(ToolRequest::new(id, call)))
    })
}

fn extract_calls(text: &str) -> Option<Vec<ToolCall>> {
    let trimmed = text.trim();
    let body = CODE_FENCE
        .captures(trimmed)
        .and_then(|captures| captures.get(1))
        .map_or(trimmed, |body| body.as_str());

    match serde_json::from_str::<Value>(body).ok()? {
        Value::Array(items) if !items.is_empty() => items.iter().map(to_call).collect(),
        item @ Value::Object(_) => Some(vec![to_call(&item)?]),
        _ => None,
    }
}

fn to_call(item: &Value) -> Option<ToolCall> {
    let name = item.get("function")?.as_str()?;
    let arguments = match item.get("arguments") {
        None | Some(Value::Null) => json!({}),
        // some models double-encode the arguments
        Some(Value::String(raw)) => {
            serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.clone()))
        }
        Some(arguments) => arguments.clone(),
    };
    Some(ToolCall::new(name, arguments))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builtin;
    use crate::providers::mock::MockProvider;

    fn tools() -> Vec<Tool> {
        vec![builtin::weather_tool(), builtin::calculator_tool()]
    }

    fn history() -> Vec<Message> {
        vec![
            Message::system().with_text("You are a helpful assistant."),
            Message::user().with_text("What's the weather like in Bengaluru?"),
        ]
    }

    #[tokio::test]
    async fn test_json_reply_becomes_tool_request() -> Result<()> {
        let mock = MockProvider::new(vec![Message::assistant()
            .with_text(r#"{"function": "get_weather", "arguments": {"city": "Bengaluru"}}"#)]);
        let provider = PromptedToolsProvider::new(Box::new(mock.clone()));

        let (reply, _) = provider.complete(&history(), &tools(), ToolChoice::Auto).await?;
        let requests = reply.tool_requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(
            requests[0].tool_call,
            ToolCall::new("get_weather", json!({"city": "Bengaluru"}))
        );
        assert!(reply.text().is_empty());

        // the endpoint itself never sees tools
        let requests = mock.requests();
        let sent = &requests[0];
        assert!(sent.tools.is_empty());
        assert_eq!(sent.tool_choice, ToolChoice::None);
        assert_eq!(sent.messages.len(), 2);
        let system = sent.messages[0].text();
        assert!(system.starts_with("You are a helpful assistant."));
        assert!(system.contains("- get_weather: Get current weather"));
        assert!(system.contains("respond normally in plain text"));
        Ok(())
    }

    #[tokio::test]
    async fn test_plain_text_is_a_direct_answer() -> Result<()> {
        let mock = MockProvider::new(vec![Message::assistant()
            .with_text("Why did the scarecrow win an award? He was outstanding in his field.")]);
        let provider = PromptedToolsProvider::new(Box::new(mock));

        let (reply, _) = provider.complete(&history(), &tools(), ToolChoice::Auto).await?;
        assert!(reply.tool_requests().is_empty());
        assert!(reply.text().starts_with("Why did the scarecrow"));
        Ok(())
    }

    #[test]
    fn test_extract_calls() {
        let fenced = "```json\n{\"function\": \"calculate\", \"arguments\": {\"expression\": \"2+2\"}}\n```";
        assert_eq!(
            extract_calls(fenced),
            Some(vec![ToolCall::new("calculate", json!({"expression": "2+2"}))])
        );

        let many = r#"[{"function": "get_weather", "arguments": {"city": "Delhi"}},
                       {"function": "get_weather", "arguments": "{\"city\": \"Mumbai\"}"}]"#;
        let calls = extract_calls(many).unwrap();
        assert_eq!(calls[1].arguments, json!({"city": "Mumbai"}));

        assert_eq!(
            extract_calls(r#"{"function": "get_time"}"#),
            Some(vec![ToolCall::new("get_time", json!({}))])
        );
        assert_eq!(extract_calls(r#"{"answer": 42}"#), None);
        assert_eq!(extract_calls("42"), None);
        assert_eq!(extract_calls("The answer is {\"function\": 1}"), None);
    }

    #[test]
    fn test_history_rewritten_as_text() {
        let mut messages = history();
        messages.push(Message::assistant().with_tool_request(
            "call_1",
            ToolCall::new("get_weather", json!({"city": "Bengaluru"})),
        ));
        messages.push(Message::tool_result(
            "call_1",
            Ok(json!({"temp_c": 28, "condition": "Partly Cloudy"})),
        ));

        let rewritten = rewrite_history(&messages, None);
        assert_eq!(rewritten.len(), 4);
        assert_eq!(rewritten[0].text(), "You are a helpful assistant.");
        assert_eq!(
            rewritten[2].text(),
            r#"{"function": "get_weather", "arguments": {"city":"Bengaluru"}}"#
        );
        assert!(rewritten[2].tool_requests().is_empty());
        assert_eq!(rewritten[3].role, Role::User);
        let text = rewritten[3].text();
        let payload = text
            .strip_prefix("Here is the tool result: ")
            .and_then(|rest| rest.strip_suffix(". Now respond naturally to the user."))
            .unwrap();
        let payload: Value = serde_json::from_str(payload).unwrap();
        assert_eq!(payload, json!({"temp_c": 28, "condition": "Partly Cloudy"}));
    }

    #[test]
    fn test_prompt_added_without_system_message() {
        let messages = vec![Message::user().with_text("2+2?")];
        let prompt = tool_prompt(&tools(), ToolChoice::Required);
        let rewritten = rewrite_history(&messages, prompt.as_deref());
        assert_eq!(rewritten.len(), 2);
        assert_eq!(rewritten[0].role, Role::System);
        assert!(rewritten[0].text().contains("Always call one of the tools."));
    }

    #[tokio::test]
    async fn test_tool_choice_none_sends_no_catalog() -> Result<()> {
        let mock = MockProvider::new(vec![Message::assistant()
            .with_text(r#"{"function": "get_weather", "arguments": {"city": "Delhi"}}"#)]);
        let provider = PromptedToolsProvider::new(Box::new(mock.clone()));

        let (reply, _) = provider.complete(&history(), &tools(), ToolChoice::None).await?;
        assert!(reply.tool_requests().is_empty());
        assert_eq!(mock.requests()[0].messages[0].text(), "You are a helpful assistant.");
        Ok(())
    }
}
