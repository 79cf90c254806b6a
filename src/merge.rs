//! Deep merge of schema branches.
//!
//! Used for `allOf`, for folding a `$ref` target into its sibling keywords,
//! and for folding a selected `oneOf`/`anyOf`/`then`/`else` branch into its
//! parent. Merging tightens constraints; it never loosens them.

use serde_json::{Map, Value};

use crate::error::{SchemaError, SchemaErrorKind};
use crate::types::json_type_name;

/// Keywords whose lower bound tightens to the larger value.
const LOWER_BOUNDS: &[&str] = &[
    "minimum",
    "exclusiveMinimum",
    "minLength",
    "minItems",
    "minProperties",
];

/// Keywords whose upper bound tightens to the smaller value.
const UPPER_BOUNDS: &[&str] = &[
    "maximum",
    "exclusiveMaximum",
    "maxLength",
    "maxItems",
    "maxProperties",
];

/// Keywords that cannot be combined in place; a conflicting right-hand value
/// is deferred into `allOf` so the resolver applies it later.
const DEFERRED: &[&str] = &["oneOf", "anyOf", "not", "dependencies"];

/// Merge two schemas into one that accepts only what both accept.
///
/// Annotations (`title`, `default`, ...) keep the left-hand value.
///
/// # Errors
///
/// Returns `SchemaError` with kind `IncompatibleAllOf` when the schemas
/// contradict each other (disjoint `type`, `enum` or `const`).
pub fn merge_schemas(left: &Value, right: &Value, pointer: &str) -> Result<Value, SchemaError> {
    let (left, right) = match (left, right) {
        (Value::Bool(false), _) | (_, Value::Bool(false)) => return Ok(Value::Bool(false)),
        (Value::Bool(true), other) | (other, Value::Bool(true)) => {
            return match other {
                Value::Bool(_) | Value::Object(_) => Ok(other.clone()),
                _ => Err(not_a_schema(other, pointer)),
            }
        }
        (Value::Object(l), Value::Object(r)) => (l, r),
        (Value::Object(_), other) | (other, _) => return Err(not_a_schema(other, pointer)),
    };

    let mut merged = left.clone();
    let split_conditionals =
        left.contains_key("if") && right.contains_key("if") && left.get("if") != right.get("if");

    for (key, right_value) in right {
        if split_conditionals && (key == "then" || key == "else") {
            continue;
        }
        let Some(left_value) = left.get(key) else {
            merged.insert(key.clone(), right_value.clone());
            continue;
        };
        if left_value == right_value {
            continue;
        }

        let key_path = format!("{}/{}", pointer, key);
        let key = key.as_str();
        match key {
            "type" => {
                merged.insert(key.to_string(), merge_types(left_value, right_value, &key_path)?);
            }
            "properties" => {
                merged.insert(
                    key.to_string(),
                    merge_properties(left_value, right_value, &key_path)?,
                );
            }
            "required" => {
                merged.insert(key.to_string(), union(left_value, right_value));
            }
            "enum" => {
                merged.insert(key.to_string(), intersect_enum(left_value, right_value, &key_path)?);
            }
            "const" => {
                return Err(SchemaError::incompatible(
                    key_path,
                    format!("conflicting const values {} and {}", left_value, right_value),
                ));
            }
            "items" | "additionalItems" if left_value.is_object() && right_value.is_object() => {
                merged.insert(key.to_string(), merge_schemas(left_value, right_value, &key_path)?);
            }
            "additionalProperties" => {
                merged.insert(
                    key.to_string(),
                    merge_additional(left_value, right_value, &key_path)?,
                );
            }
            "definitions" | "$defs" => {
                if let (Some(l), Some(r)) = (left_value.as_object(), right_value.as_object()) {
                    let mut defs = l.clone();
                    for (name, def) in r {
                        defs.entry(name.clone()).or_insert_with(|| def.clone());
                    }
                    merged.insert(key.to_string(), Value::Object(defs));
                }
            }
            "allOf" => {
                let mut branches = left_value.as_array().cloned().unwrap_or_default();
                branches.extend(right_value.as_array().cloned().unwrap_or_default());
                merged.insert(key.to_string(), Value::Array(branches));
            }
            "uniqueItems" => {
                let unique = left_value.as_bool().unwrap_or(false)
                    || right_value.as_bool().unwrap_or(false);
                merged.insert(key.to_string(), Value::Bool(unique));
            }
            "if" => defer(&mut merged, conditional_of(right)),
            "then" | "else" => {
                merged.insert(key.to_string(), merge_schemas(left_value, right_value, &key_path)?);
            }
            _ if DEFERRED.contains(&key) => {
                let mut deferred = Map::new();
                deferred.insert(key.to_string(), right_value.clone());
                defer(&mut merged, Value::Object(deferred));
            }
            _ if LOWER_BOUNDS.contains(&key) => {
                if as_f64(right_value) > as_f64(left_value) {
                    merged.insert(key.to_string(), right_value.clone());
                }
            }
            _ if UPPER_BOUNDS.contains(&key) => {
                if as_f64(right_value) < as_f64(left_value) {
                    merged.insert(key.to_string(), right_value.clone());
                }
            }
            // annotations and unknown keywords: left wins
            _ => {}
        }
    }

    Ok(Value::Object(merged))
}

/// Fold `base` with every branch, left to right.
pub fn merge_all<'a, I>(base: Value, branches: I, pointer: &str) -> Result<Value, SchemaError>
where
    I: IntoIterator<Item = &'a Value>,
{
    branches
        .into_iter()
        .try_fold(base, |acc, branch| merge_schemas(&acc, branch, pointer))
}

fn not_a_schema(value: &Value, pointer: &str) -> SchemaError {
    SchemaError::new(
        SchemaErrorKind::NotAnObject,
        pointer,
        format!("cannot merge {} as a schema", json_type_name(value)),
    )
}

fn type_set(value: &Value) -> Vec<&str> {
    match value {
        Value::String(t) => vec![t.as_str()],
        Value::Array(types) => types.iter().filter_map(Value::as_str).collect(),
        _ => Vec::new(),
    }
}

fn merge_types(left: &Value, right: &Value, pointer: &str) -> Result<Value, SchemaError> {
    let left_types = type_set(left);
    let right_types = type_set(right);

    let mut common: Vec<&str> = Vec::new();
    for l in &left_types {
        for r in &right_types {
            let narrowed = match (*l, *r) {
                (a, b) if a == b => Some(a),
                ("integer", "number") | ("number", "integer") => Some("integer"),
                _ => None,
            };
            if let Some(t) = narrowed {
                if !common.contains(&t) {
                    common.push(t);
                }
            }
        }
    }

    match common.len() {
        0 => Err(SchemaError::incompatible(
            pointer,
            format!("incompatible types {} and {}", left, right),
        )),
        1 => Ok(Value::String(common[0].to_string())),
        _ => Ok(Value::Array(
            common.into_iter().map(|t| Value::String(t.to_string())).collect(),
        )),
    }
}

fn merge_properties(left: &Value, right: &Value, pointer: &str) -> Result<Value, SchemaError> {
    let (Some(l), Some(r)) = (left.as_object(), right.as_object()) else {
        return Err(SchemaError::new(
            SchemaErrorKind::NotAnObject,
            pointer,
            "properties must be an object",
        ));
    };

    let mut props = l.clone();
    for (name, schema) in r {
        let merged = match l.get(name) {
            Some(existing) => merge_schemas(existing, schema, &format!("{}/{}", pointer, name))?,
            None => schema.clone(),
        };
        props.insert(name.clone(), merged);
    }
    Ok(Value::Object(props))
}

fn merge_additional(left: &Value, right: &Value, pointer: &str) -> Result<Value, SchemaError> {
    match (left, right) {
        (Value::Bool(false), _) | (_, Value::Bool(false)) => Ok(Value::Bool(false)),
        (Value::Bool(true), other) | (other, Value::Bool(true)) => Ok(other.clone()),
        _ => merge_schemas(left, right, pointer),
    }
}

fn union(left: &Value, right: &Value) -> Value {
    let mut items: Vec<Value> = left.as_array().cloned().unwrap_or_default();
    for item in right.as_array().into_iter().flatten() {
        if !items.contains(item) {
            items.push(item.clone());
        }
    }
    Value::Array(items)
}

fn intersect_enum(left: &Value, right: &Value, pointer: &str) -> Result<Value, SchemaError> {
    let right_values = right.as_array().cloned().unwrap_or_default();
    let common: Vec<Value> = left
        .as_array()
        .into_iter()
        .flatten()
        .filter(|v| right_values.contains(v))
        .cloned()
        .collect();
    if common.is_empty() {
        return Err(SchemaError::incompatible(pointer, "enum values do not overlap"));
    }
    Ok(Value::Array(common))
}

fn conditional_of(schema: &Map<String, Value>) -> Value {
    let mut conditional = Map::new();
    for key in ["if", "then", "else"] {
        if let Some(value) = schema.get(key) {
            conditional.insert(key.to_string(), value.clone());
        }
    }
    Value::Object(conditional)
}

fn defer(merged: &mut Map<String, Value>, schema: Value) {
    let entry = merged
        .entry("allOf".to_string())
        .or_insert_with(|| Value::Array(Vec::new()));
    if let Value::Array(branches) = entry {
        branches.push(schema);
    }
}

fn as_f64(value: &Value) -> f64 {
    value.as_f64().unwrap_or(f64::NAN)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn merges_properties_and_required() {
        let a = json!({ "type": "object", "required": ["a"], "properties": { "a": { "type": "string" } } });
        let b = json!({ "required": ["b", "a"], "properties": { "b": { "type": "number" } } });
        let merged = merge_schemas(&a, &b, "#").unwrap();
        assert_eq!(merged["required"], json!(["a", "b"]));
        assert_eq!(merged["properties"]["a"]["type"], "string");
        assert_eq!(merged["properties"]["b"]["type"], "number");
    }

    #[test]
    fn tightens_numeric_bounds() {
        let a = json!({ "minimum": 1, "maximum": 10 });
        let b = json!({ "minimum": 3, "maximum": 20 });
        let merged = merge_schemas(&a, &b, "#").unwrap();
        assert_eq!(merged["minimum"], 3);
        assert_eq!(merged["maximum"], 10);
    }

    #[test]
    fn integer_narrows_number() {
        let merged =
            merge_schemas(&json!({ "type": "number" }), &json!({ "type": "integer" }), "#").unwrap();
        assert_eq!(merged["type"], "integer");
    }

    #[test]
    fn conflicting_types_fail() {
        let err =
            merge_schemas(&json!({ "type": "string" }), &json!({ "type": "number" }), "#/allOf")
                .unwrap_err();
        assert_eq!(err.kind, SchemaErrorKind::IncompatibleAllOf);
        assert_eq!(err.kind.as_str(), "incompatible-allOf");
    }

    #[test]
    fn type_lists_intersect() {
        let merged = merge_schemas(
            &json!({ "type": ["string", "null"] }),
            &json!({ "type": ["null", "number"] }),
            "#",
        )
        .unwrap();
        assert_eq!(merged["type"], "null");
    }

    #[test]
    fn enum_intersection() {
        let merged =
            merge_schemas(&json!({ "enum": [1, 2, 3] }), &json!({ "enum": [3, 2, 9] }), "#").unwrap();
        assert_eq!(merged["enum"], json!([2, 3]));
    }

    #[test]
    fn annotations_keep_left() {
        let merged =
            merge_schemas(&json!({ "title": "A", "default": 1 }), &json!({ "title": "B", "default": 2 }), "#")
                .unwrap();
        assert_eq!(merged["title"], "A");
        assert_eq!(merged["default"], 1);
    }

    #[test]
    fn conflicting_one_of_is_deferred() {
        let merged = merge_schemas(
            &json!({ "oneOf": [{ "type": "string" }] }),
            &json!({ "oneOf": [{ "type": "number" }] }),
            "#",
        )
        .unwrap();
        assert_eq!(merged["oneOf"], json!([{ "type": "string" }]));
        assert_eq!(merged["allOf"], json!([{ "oneOf": [{ "type": "number" }] }]));
    }

    #[test]
    fn additional_properties_false_wins() {
        let merged = merge_schemas(
            &json!({ "additionalProperties": { "type": "string" } }),
            &json!({ "additionalProperties": false }),
            "#",
        )
        .unwrap();
        assert_eq!(merged["additionalProperties"], false);
    }

    #[test]
    fn associative_for_compatible_branches() {
        let a = json!({ "type": "object", "properties": { "a": { "type": "string", "minLength": 1 } } });
        let b = json!({ "required": ["a"], "properties": { "a": { "maxLength": 5 } } });
        let c = json!({ "properties": { "a": { "minLength": 2 }, "c": { "type": "boolean" } } });

        let left_first = merge_schemas(&merge_schemas(&a, &b, "#").unwrap(), &c, "#").unwrap();
        let right_first = merge_schemas(&a, &merge_schemas(&b, &c, "#").unwrap(), "#").unwrap();
        assert_eq!(left_first, right_first);
    }
}
