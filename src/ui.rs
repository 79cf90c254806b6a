//! UI-hint accessors.
//!
//! UI hints are a side-channel tree keyed by the same property names as the
//! schema. The engine hands them through to renderers untouched; the only
//! hint it interprets is `ui:order`.

use serde_json::{Map, Value};

use crate::error::{SchemaError, SchemaErrorKind};

/// Property ordering hint.
pub const ORDER_KEY: &str = "ui:order";

/// Nested options hint.
pub const OPTIONS_KEY: &str = "ui:options";

/// Prefix marking a UI hint key.
pub const UI_PREFIX: &str = "ui:";

const WILDCARD: &str = "*";

static NO_HINTS: Value = Value::Null;

/// Hints for object property `key`.
pub fn property_hints<'a>(hints: &'a Value, key: &str) -> &'a Value {
    hints.get(key).unwrap_or(&NO_HINTS)
}

/// Hints for array item `index`.
///
/// `items` may be a single hint object or a tuple of them; tuple positions
/// past the end fall back to `additionalItems`.
pub fn item_hints(hints: &Value, index: usize) -> &Value {
    match hints.get("items") {
        Some(Value::Array(tuple)) => tuple
            .get(index)
            .or_else(|| hints.get("additionalItems"))
            .unwrap_or(&NO_HINTS),
        Some(items) => items,
        None => &NO_HINTS,
    }
}

/// Flatten `ui:options` and the top-level `ui:*` keys into one map with the
/// prefix stripped. Top-level keys win over `ui:options` entries.
pub fn ui_options(hints: &Value) -> Map<String, Value> {
    let mut options = hints
        .get(OPTIONS_KEY)
        .and_then(Value::as_object)
        .cloned()
        .unwrap_or_default();

    if let Some(map) = hints.as_object() {
        for (key, value) in map {
            if key == OPTIONS_KEY {
                continue;
            }
            if let Some(name) = key.strip_prefix(UI_PREFIX) {
                options.insert(name.to_string(), value.clone());
            }
        }
    }
    options
}

/// Apply a `ui:order` hint to the declared property names.
///
/// Order entries naming undeclared properties are ignored. A single `*`
/// stands for every property the order does not mention.
///
/// # Errors
///
/// Returns `SchemaError` with kind `InvalidOrder` when the order has more
/// than one wildcard, or leaves properties out without a wildcard.
pub fn order_properties(names: Vec<String>, order: Option<&Value>) -> Result<Vec<String>, SchemaError> {
    let Some(order) = order.and_then(Value::as_array) else {
        return Ok(names);
    };

    let order: Vec<&str> = order
        .iter()
        .filter_map(Value::as_str)
        .filter(|entry| *entry == WILDCARD || names.iter().any(|n| n == entry))
        .collect();

    let rest: Vec<String> = names
        .iter()
        .filter(|name| !order.contains(&name.as_str()))
        .cloned()
        .collect();

    let wildcards = order.iter().filter(|entry| **entry == WILDCARD).count();
    if wildcards > 1 {
        return Err(SchemaError::new(
            SchemaErrorKind::InvalidOrder,
            ORDER_KEY,
            "order list contains more than one wildcard item",
        ));
    }
    if wildcards == 0 && !rest.is_empty() {
        let noun = if rest.len() == 1 { "property" } else { "properties" };
        return Err(SchemaError::new(
            SchemaErrorKind::InvalidOrder,
            ORDER_KEY,
            format!("order list does not contain {} '{}'", noun, rest.join("', '")),
        ));
    }

    let mut ordered = Vec::with_capacity(names.len());
    for entry in order {
        if entry == WILDCARD {
            ordered.extend(rest.iter().cloned());
        } else {
            ordered.push(entry.to_string());
        }
    }
    Ok(ordered)
}
