//! Variable input templating
//!
//! Grid item arguments may reference dashboard variables with `${name}`
//! placeholders. Substitution happens per top-level argument: string
//! arguments are templated directly, structured arguments are serialized,
//! templated as text, and parsed back.

use crate::grid_item::{GridItemError, VariableValue};
use serde_json::Value;
use std::collections::HashMap;

/// Unique variable names referenced by `${name}` placeholders, in order of
/// first appearance.
pub fn dependent_variable_inputs(text: &str) -> Vec<String> {
    let mut names = Vec::new();
    let mut rest = text;
    while let Some(start) = rest.find("${") {
        let after = &rest[start + 2..];
        let Some(end) = after.find('}') else {
            break;
        };
        let name = &after[..end];
        if !name.is_empty() && !names.iter().any(|existing| existing == name) {
            names.push(name.to_string());
        }
        rest = &after[end + 1..];
    }
    names
}

fn render_value(value: &VariableValue) -> String {
    match value {
        VariableValue::Text(text) => text.clone(),
        VariableValue::Bool(b) => b.to_string(),
        VariableValue::Number(n) => {
            // Render whole numbers without a trailing ".0"; magnitudes
            // beyond i64 keep their float rendering.
            if n.fract() == 0.0 && n.abs() < i64::MAX as f64 {
                format!("{}", *n as i64)
            } else {
                n.to_string()
            }
        }
    }
}

fn replace_placeholders(input: &str, values: &HashMap<String, VariableValue>) -> String {
    let mut output = String::with_capacity(input.len());
    let mut rest = input;
    while let Some(start) = rest.find("${") {
        let after = &rest[start + 2..];
        let Some(end) = after.find('}') else {
            break;
        };
        output.push_str(&rest[..start]);
        let name = &after[..end];
        // An unset variable renders as empty text.
        if let Some(value) = values.get(name) {
            output.push_str(&render_value(value));
        }
        rest = &after[end + 1..];
    }
    output.push_str(rest);
    output
}

/// Substitutes variable values into every top-level argument. Non-string
/// arguments round-trip through their JSON text so placeholders nested in
/// structured values are templated too.
pub fn apply_variable_inputs(
    args: &Value,
    values: &HashMap<String, VariableValue>,
) -> Result<Value, GridItemError> {
    let Some(object) = args.as_object() else {
        return Ok(args.clone());
    };
    let mut updated = serde_json::Map::with_capacity(object.len());
    for (key, value) in object {
        let templated = match value {
            Value::String(text) => Value::String(replace_placeholders(text, values)),
            other => {
                let text = replace_placeholders(&other.to_string(), values);
                serde_json::from_str(&text)
                    .map_err(|e| GridItemError::MalformedPayload(e.to_string()))?
            }
        };
        updated.insert(key.clone(), templated);
    }
    Ok(Value::Object(updated))
}
