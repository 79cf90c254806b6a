//! Tagged view over a raw schema value.
//!
//! [`SchemaNode::classify`] names the next resolution step a schema still
//! needs, or the concrete shape it already has. The resolver loops over
//! this classification until a concrete shape comes out.

use serde_json::{Map, Value};

use crate::error::{SchemaError, SchemaErrorKind};
use crate::types::json_type_name;

/// `anyOf` / `oneOf` / `allOf`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Combinator {
    AllOf,
    AnyOf,
    OneOf,
}

impl Combinator {
    pub fn keyword(&self) -> &'static str {
        match self {
            Combinator::AllOf => "allOf",
            Combinator::AnyOf => "anyOf",
            Combinator::OneOf => "oneOf",
        }
    }
}

/// Classification of a schema node.
#[derive(Debug, Clone, Copy)]
pub enum SchemaNode<'a> {
    /// `$ref` still pending.
    Ref(&'a str),
    /// A combinator still pending. `allOf` always precedes `oneOf`/`anyOf`.
    Combinator(Combinator, &'a [Value]),
    /// `dependencies` still pending.
    Dependencies(&'a Map<String, Value>),
    /// `if` still pending.
    Conditional {
        condition: &'a Value,
        then: Option<&'a Value>,
        otherwise: Option<&'a Value>,
    },
    /// Concrete object schema.
    Object(&'a Map<String, Value>),
    /// Concrete array schema.
    Array(&'a Map<String, Value>),
    /// Concrete scalar or untyped schema.
    Leaf(&'a Map<String, Value>),
    /// Boolean schema `false`.
    Never,
}

impl<'a> SchemaNode<'a> {
    /// Classify a schema value.
    ///
    /// `pointer` only feeds error messages.
    pub fn classify(schema: &'a Value, pointer: &str) -> Result<Self, SchemaError> {
        let map = match schema {
            Value::Object(map) => map,
            Value::Bool(false) => return Ok(SchemaNode::Never),
            Value::Bool(true) => return Ok(SchemaNode::Leaf(empty_map())),
            other => {
                return Err(SchemaError::new(
                    SchemaErrorKind::NotAnObject,
                    pointer,
                    format!("expected a schema, got {}", json_type_name(other)),
                ))
            }
        };

        if let Some(reference) = map.get("$ref") {
            let reference = reference.as_str().ok_or_else(|| {
                SchemaError::malformed(pointer, "$ref must be a string")
            })?;
            return Ok(SchemaNode::Ref(reference));
        }

        if let Some(branches) = map.get("allOf") {
            return Ok(SchemaNode::Combinator(
                Combinator::AllOf,
                combinator_branches(branches, Combinator::AllOf, pointer)?,
            ));
        }

        if let Some(deps) = map.get("dependencies") {
            let deps = deps.as_object().ok_or_else(|| {
                SchemaError::malformed(pointer, "dependencies must be an object")
            })?;
            return Ok(SchemaNode::Dependencies(deps));
        }

        if let Some(condition) = map.get("if") {
            return Ok(SchemaNode::Conditional {
                condition,
                then: map.get("then"),
                otherwise: map.get("else"),
            });
        }

        for combinator in [Combinator::OneOf, Combinator::AnyOf] {
            if let Some(branches) = map.get(combinator.keyword()) {
                return Ok(SchemaNode::Combinator(
                    combinator,
                    combinator_branches(branches, combinator, pointer)?,
                ));
            }
        }

        Ok(concrete(map))
    }
}

fn concrete(map: &Map<String, Value>) -> SchemaNode<'_> {
    match primary_type(map.get("type")) {
        Some("object") => SchemaNode::Object(map),
        Some("array") => SchemaNode::Array(map),
        Some(_) => SchemaNode::Leaf(map),
        None if map.contains_key("properties") || map.contains_key("additionalProperties") => {
            SchemaNode::Object(map)
        }
        None if map.contains_key("items") => SchemaNode::Array(map),
        None => SchemaNode::Leaf(map),
    }
}

fn combinator_branches<'a>(
    value: &'a Value,
    combinator: Combinator,
    pointer: &str,
) -> Result<&'a [Value], SchemaError> {
    match value {
        Value::Array(branches) if !branches.is_empty() => Ok(branches.as_slice()),
        _ => Err(SchemaError::malformed(
            format!("{}/{}", pointer, combinator.keyword()),
            format!("{} must be a non-empty array of schemas", combinator.keyword()),
        )),
    }
}

fn empty_map() -> &'static Map<String, Value> {
    static EMPTY: std::sync::OnceLock<Map<String, Value>> = std::sync::OnceLock::new();
    EMPTY.get_or_init(Map::new)
}

/// A declared `type`, normalising `["x", "null"]` to `x`.
fn primary_type(declared: Option<&Value>) -> Option<&str> {
    match declared? {
        Value::String(t) => Some(t.as_str()),
        Value::Array(types) => {
            let mut non_null = types.iter().filter_map(Value::as_str).filter(|t| *t != "null");
            let first = non_null.next();
            first.or_else(|| types.first().and_then(Value::as_str))
        }
        _ => None,
    }
}
