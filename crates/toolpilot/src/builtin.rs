//! Demo tools backed by fixed data tables.

pub mod calculator;

use serde_json::{json, Value};
use tracing::debug;

use crate::errors::{AgentError, AgentResult, RegistryError};
use crate::models::tool::Tool;
use crate::registry::{FnHandler, ToolRegistry};

const WEATHER: &[(&str, i64, &str)] = &[
    ("bengaluru", 28, "Partly Cloudy"),
    ("delhi", 35, "Sunny"),
    ("mumbai", 32, "Humid"),
];

const CONTACTS: &[(&str, &str, &str)] = &[
    ("alice", "+91-9876543210", "alice@example.com"),
    ("bob", "+91-9123456789", "bob@example.com"),
    ("charlie", "+91-9988776655", "charlie@example.com"),
];

fn string_argument<'a>(arguments: &'a Value, key: &str) -> AgentResult<&'a str> {
    arguments
        .get(key)
        .and_then(Value::as_str)
        .ok_or_else(|| AgentError::InvalidParameters(format!("missing string argument '{}'", key)))
}

fn single_string_schema(key: &str, description: &str) -> Value {
    json!({
        "type": "object",
        "properties": {
            key: {"type": "string", "description": description}
        },
        "required": [key]
    })
}

pub fn weather_tool() -> Tool {
    Tool::new(
        "get_weather",
        "Get current weather for a city. Returns temp_c and condition.",
        single_string_schema("city", "City name (e.g., 'Bengaluru', 'Delhi', 'Mumbai')"),
    )
}

pub fn get_weather(arguments: Value) -> AgentResult<Value> {
    let city = string_argument(&arguments, "city")?;
    let key = city.to_lowercase();
    let result = WEATHER
        .iter()
        .find(|(name, _, _)| *name == key)
        .map(|(_, temp_c, condition)| json!({"temp_c": temp_c, "condition": condition}))
        .unwrap_or_else(|| json!({"error": format!("No weather data for {}", city)}));
    Ok(result)
}

pub fn calculator_tool() -> Tool {
    Tool::new(
        "calculate",
        "Evaluate a mathematical expression and return the result",
        single_string_schema("expression", "Math expression, e.g. '245 * 38 + 17'"),
    )
}

/// Arithmetic failures are answers, not tool errors: the model gets an
/// `error` field it can read and recover from.
pub fn calculate(arguments: Value) -> AgentResult<Value> {
    let expression = string_argument(&arguments, "expression")?;
    let result = calculator::evaluate(expression).and_then(|n| n.to_json());
    Ok(match result {
        Ok(result) => json!({"expression": expression, "result": result}),
        Err(e) => {
            debug!(%expression, error = %e, "calculation rejected");
            json!({"error": format!("Cannot calculate: {}", expression)})
        }
    })
}

pub fn contacts_tool() -> Tool {
    Tool::new(
        "search_contacts",
        "Search for a contact by name to get their phone number and email",
        single_string_schema("name", "Name of the contact to search for"),
    )
}

pub fn search_contacts(arguments: Value) -> AgentResult<Value> {
    let name = string_argument(&arguments, "name")?;
    let key = name.to_lowercase();
    let result = CONTACTS
        .iter()
        .find(|(contact, _, _)| *contact == key)
        .map(|(_, phone, email)| json!({"phone": phone, "email": email}))
        .unwrap_or_else(|| json!({"error": format!("Contact '{}' not found", name)}));
    Ok(result)
}

/// A registry holding all three demo tools, in a fixed order
pub fn registry() -> Result<ToolRegistry, RegistryError> {
    ToolRegistry::new("builtin")
        .with_tool(weather_tool(), FnHandler(get_weather))?
        .with_tool(calculator_tool(), FnHandler(calculate))?
        .with_tool(contacts_tool(), FnHandler(search_contacts))
}
