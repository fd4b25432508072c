use anyhow::Result;
use bat::WrappingMode;
use console::style;
use toolpilot::errors::AgentError;
use toolpilot::models::message::{Message, MessageContent};
use toolpilot::models::tool::Tool;

const THEME: &str = "zenburn";

fn pretty(content: &str, language: &str, header: Option<String>) -> Result<()> {
    let mut input = bat::Input::from_bytes(content.as_bytes());
    if let Some(name) = &header {
        input = input.name(name);
    }
    bat::PrettyPrinter::new()
        .input(input)
        .theme(THEME)
        .language(language)
        .grid(header.is_some())
        .header(header.is_some())
        .wrapping_mode(WrappingMode::Character)
        .print()?;
    Ok(())
}

fn print_error(error: &AgentError) {
    println!(
        "{} {}",
        style(format!("[{}]", error.kind())).red().bold(),
        style(error.to_string()).red()
    );
}

/// Print one loop step: tool requests with their arguments, or tool results
pub fn render_step(message: &Message) -> Result<()> {
    for content in &message.content {
        match content {
            MessageContent::Text(text) if !text.text.trim().is_empty() => {
                pretty(&text.text, "Markdown", None)?
            }
            MessageContent::Text(_) => {}
            MessageContent::ToolRequest(request) => pretty(
                &serde_json::to_string_pretty(&request.tool_call.arguments)?,
                "JSON",
                Some(format!("Tool Request: {}", request.tool_call.name)),
            )?,
            MessageContent::ToolResponse(response) => match &response.tool_result {
                Ok(output) => pretty(
                    &serde_json::to_string_pretty(output)?,
                    "JSON",
                    Some(format!("Tool Response: {}", response.id)),
                )?,
                Err(e) => print_error(e),
            },
        }
    }
    Ok(())
}

pub fn render_answer(text: &str) -> Result<()> {
    println!();
    pretty(text, "Markdown", None)?;
    println!();
    Ok(())
}

pub fn render_tools(tools: &[Tool]) {
    for tool in tools {
        println!("{} {}", style(&tool.name).cyan().bold(), style(&tool.description).dim());
    }
}
