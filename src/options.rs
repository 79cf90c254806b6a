//! Enumerated choices offered by a field.

use serde::Serialize;
use serde_json::Value;

use crate::resolver::deref;

/// One selectable value with its display label.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EnumOption {
    pub label: String,
    pub value: Value,
}

/// Options declared by `enum` (labelled by `enumNames`) or by a
/// `oneOf`/`anyOf` whose branches are all constants (labelled by `title`).
pub fn options_list(root: &Value, schema: &Value) -> Option<Vec<EnumOption>> {
    let schema = deref(root, schema);

    if let Some(values) = schema.get("enum").and_then(Value::as_array) {
        let names = schema.get("enumNames").and_then(Value::as_array);
        return Some(
            values
                .iter()
                .enumerate()
                .map(|(i, value)| EnumOption {
                    label: names
                        .and_then(|n| n.get(i))
                        .and_then(Value::as_str)
                        .map(str::to_string)
                        .unwrap_or_else(|| label_of(value)),
                    value: value.clone(),
                })
                .collect(),
        );
    }

    let branches = schema
        .get("oneOf")
        .or_else(|| schema.get("anyOf"))
        .and_then(Value::as_array)?;
    branches
        .iter()
        .map(|branch| {
            let branch = deref(root, branch);
            let value = constant_of(branch)?;
            let label = branch
                .get("title")
                .and_then(Value::as_str)
                .map(str::to_string)
                .unwrap_or_else(|| label_of(&value));
            Some(EnumOption { label, value })
        })
        .collect()
}

/// True when the field picks one of a fixed set of values.
pub fn is_select(root: &Value, schema: &Value) -> bool {
    options_list(root, schema).is_some()
}

/// True for arrays of unique items drawn from a fixed set.
pub fn is_multi_select(root: &Value, schema: &Value) -> bool {
    let schema = deref(root, schema);
    let unique = schema.get("uniqueItems").and_then(Value::as_bool) == Some(true);
    match schema.get("items") {
        Some(items) if unique && items.is_object() => is_select(root, items),
        _ => false,
    }
}

fn constant_of(schema: &Value) -> Option<Value> {
    if let Some(constant) = schema.get("const") {
        return Some(constant.clone());
    }
    match schema.get("enum").and_then(Value::as_array) {
        Some(values) if values.len() == 1 => Some(values[0].clone()),
        _ => None,
    }
}

fn label_of(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
