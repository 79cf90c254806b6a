//! Default value computation.
//!
//! Fills absent form data from `default` keywords, recursing through object
//! properties and existing array items. Existing data always wins over a
//! computed default, and array lengths never change, so applying defaults to
//! their own output is a no-op.

use serde_json::{Map, Value};

use crate::error::SchemaError;
use crate::node::SchemaNode;
use crate::resolver::{item_schema, resolve_tracked};
use crate::types::{FormConfig, ObjectDefaults};

/// Compute the default value tree for `schema`, keeping `existing` data.
///
/// Returns `Ok(None)` when nothing is known for the node (no data and no
/// default). A `$ref` that recurses into itself where no data exists yields
/// `None` for that subtree instead of expanding forever.
///
/// # Errors
///
/// Returns `SchemaError` when `schema` itself cannot be resolved. Failures
/// further down degrade to leaving that subtree's data as it was.
pub fn compute_defaults(
    root: &Value,
    schema: &Value,
    existing: Option<&Value>,
    config: &FormConfig,
) -> Result<Option<Value>, SchemaError> {
    let mut defaulter = Defaulter {
        root,
        policy: config.object_defaults,
        refs: Vec::new(),
    };
    defaulter.compute(schema, existing)
}

/// Initial form state: the given form data merged over computed defaults.
///
/// Object roots always produce at least `{}`.
pub fn default_form_state(
    root: &Value,
    schema: &Value,
    form_data: Option<&Value>,
    config: &FormConfig,
) -> Result<Option<Value>, SchemaError> {
    compute_defaults(root, schema, form_data, config)
}

/// Bound on re-resolving an object after its own defaults changed the data.
const MAX_SETTLE_PASSES: usize = 8;

struct Defaulter<'a> {
    root: &'a Value,
    policy: ObjectDefaults,
    /// `$ref`s followed on the way down, including those behind combinators;
    /// re-entering one without data stops.
    refs: Vec<String>,
}

impl Defaulter<'_> {
    fn compute(&mut self, schema: &Value, existing: Option<&Value>) -> Result<Option<Value>, SchemaError> {
        let (effective, followed) = resolve_tracked(self.root, schema, existing)?;
        if existing.is_none() {
            if let Some(reference) = followed.iter().find(|r| self.refs.contains(r)) {
                tracing::debug!(reference = %reference, "recursive reference, no default");
                return Ok(None);
            }
        }

        let mark = self.refs.len();
        self.enter(followed);
        let result = self.compute_resolved(schema, effective, existing);
        self.refs.truncate(mark);
        result
    }

    fn enter(&mut self, followed: Vec<String>) {
        for reference in followed {
            if !self.refs.contains(&reference) {
                self.refs.push(reference);
            }
        }
    }

    fn compute_resolved(
        &mut self,
        schema: &Value,
        effective: Value,
        existing: Option<&Value>,
    ) -> Result<Option<Value>, SchemaError> {
        let seed = existing.cloned().or_else(|| effective.get("default").cloned());

        match SchemaNode::classify(&effective, "#")? {
            SchemaNode::Object(_) => {}
            SchemaNode::Array(_) => return Ok(self.fill_array(&effective, seed)),
            _ => return Ok(seed),
        }

        let mut object = match seed {
            Some(Value::Object(object)) => object,
            Some(other) => return Ok(Some(other)),
            None => Map::new(),
        };
        self.fill_object(&effective, &mut object);

        // Filled values can switch on `dependencies`, an `if` or another
        // branch; settle against the filled object.
        let mut effective = effective;
        for _ in 0..MAX_SETTLE_PASSES {
            let filled = Value::Object(object.clone());
            let Ok((next, followed)) = resolve_tracked(self.root, schema, Some(&filled)) else {
                break;
            };
            if next == effective {
                break;
            }
            self.enter(followed);
            effective = next;
            self.fill_object(&effective, &mut object);
        }
        Ok(Some(Value::Object(object)))
    }

    /// Default the items of an array seed; the length never changes.
    fn fill_array(&mut self, effective: &Value, seed: Option<Value>) -> Option<Value> {
        let items = match seed {
            Some(Value::Array(items)) => items,
            other => return other,
        };
        let mut filled = Vec::with_capacity(items.len());
        for (index, item) in items.iter().enumerate() {
            let value = match item_schema(effective, index) {
                Some(item_schema) => self
                    .child(item_schema, Some(item), &index.to_string())
                    .unwrap_or_else(|| item.clone()),
                None => item.clone(),
            };
            filled.push(value);
        }
        Some(Value::Array(filled))
    }

    /// Default every declared property of `effective` into `object`.
    fn fill_object(&mut self, effective: &Value, object: &mut Map<String, Value>) {
        let required: Vec<&str> = effective
            .get("required")
            .and_then(Value::as_array)
            .into_iter()
            .flatten()
            .filter_map(Value::as_str)
            .collect();

        let properties = effective.get("properties").and_then(Value::as_object);
        for (key, property) in properties.into_iter().flatten() {
            match object.get(key).cloned() {
                Some(current) => {
                    if let Some(value) = self.child(property, Some(&current), key) {
                        object.insert(key.clone(), value);
                    }
                }
                None => {
                    let Some(value) = self.child(property, None, key) else {
                        continue;
                    };
                    if self.keeps(&value, required.contains(&key.as_str())) {
                        object.insert(key.clone(), value);
                    }
                }
            }
        }
    }

    /// Defaults for a child schema; resolution failures keep the child's data.
    fn child(&mut self, schema: &Value, existing: Option<&Value>, name: &str) -> Option<Value> {
        match self.compute(schema, existing) {
            Ok(value) => value,
            Err(err) => {
                tracing::warn!(field = name, error = %err, "skipping defaults for unsupported schema");
                existing.cloned()
            }
        }
    }

    /// Whether a computed default for an absent property is kept.
    fn keeps(&self, value: &Value, required: bool) -> bool {
        let empty_object = value.as_object().map_or(false, Map::is_empty);
        if !empty_object {
            return true;
        }
        match self.policy {
            ObjectDefaults::PopulateAll => true,
            ObjectDefaults::PopulateRequired => required,
            ObjectDefaults::SkipEmpty => false,
        }
    }
}
