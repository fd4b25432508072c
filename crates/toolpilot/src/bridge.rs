//! Translation of tool descriptors into the OpenAI function-calling dialect.
use std::collections::HashSet;

use lazy_static::lazy_static;
use regex::Regex;
use serde_json::{json, Value};

use crate::errors::RegistryError;
use crate::models::tool::Tool;

lazy_static! {
    static ref FUNCTION_NAME: Regex = Regex::new(r"^[a-zA-Z0-9_-]{1,64}$").unwrap();
}

/// Schema keywords the function-calling dialect understands
const SUPPORTED_KEYWORDS: &[&str] = &[
    "type",
    "properties",
    "required",
    "description",
    "enum",
    "items",
    "default",
    "title",
    "additionalProperties",
    "minimum",
    "maximum",
    "minLength",
    "maxLength",
    "minItems",
    "maxItems",
    "format",
    "pattern",
    "nullable",
    "const",
];

/// Convert internal Tool format to OpenAI's API tool specification
pub fn tools_to_openai_spec(tools: &[Tool]) -> Result<Vec<Value>, RegistryError> {
    let mut tool_names = HashSet::new();
    let mut result = Vec::new();

    for tool in tools {
        if !tool_names.insert(&tool.name) {
            return Err(RegistryError::DuplicateTool(tool.name.clone()));
        }
        result.push(tool_to_openai_spec(tool)?);
    }

    Ok(result)
}

/// Convert a single tool, checking that its schema fits the dialect
pub fn tool_to_openai_spec(tool: &Tool) -> Result<Value, RegistryError> {
    let fail = |reason: String| RegistryError::SchemaTranslation {
        tool: tool.name.clone(),
        reason,
    };

    if !FUNCTION_NAME.is_match(&tool.name) {
        return Err(fail(
            "name must match [a-zA-Z0-9_-] and be at most 64 characters".to_string(),
        ));
    }
    if tool.input_schema.get("type").and_then(Value::as_str) != Some("object") {
        return Err(fail("root schema must be of type object".to_string()));
    }
    check_schema(&tool.input_schema, "#").map_err(fail)?;

    Ok(json!({
        "type": "function",
        "function": {
            "name": tool.name,
            "description": tool.description,
            "parameters": tool.input_schema,
        }
    }))
}

fn check_schema(schema: &Value, path: &str) -> Result<(), String> {
    let object = match schema {
        Value::Object(object) => object,
        Value::Bool(_) => return Ok(()),
        other => return Err(format!("{} is not a schema: {}", path, other)),
    };

    for (keyword, value) in object {
        if !SUPPORTED_KEYWORDS.contains(&keyword.as_str()) {
            return Err(format!("unsupported keyword '{}' at {}", keyword, path));
        }
        match keyword.as_str() {
            "properties" => {
                let properties = value
                    .as_object()
                    .ok_or_else(|| format!("{}/properties must be an object", path))?;
                for (name, property) in properties {
                    check_schema(property, &format!("{}/properties/{}", path, name))?;
                }
            }
            "items" | "additionalProperties" => {
                check_schema(value, &format!("{}/{}", path, keyword))?;
            }
            _ => {}
        }
    }
    Ok(())
}
