//! Removal of data the schema does not describe.

use serde_json::{Map, Value};

use crate::node::SchemaNode;
use crate::resolver::{item_schema, property_schema, resolve};

/// Keep only the parts of `data` reachable through declared properties and
/// items.
///
/// Keys allowed by `additionalProperties` are kept. Subtrees whose schema
/// fails to resolve are kept as they are.
pub fn omit_extra_data(root: &Value, schema: &Value, data: &Value) -> Value {
    let effective = match resolve(root, schema, Some(data)) {
        Ok(effective) => effective,
        Err(err) => {
            tracing::debug!(error = %err, "keeping data under unsupported schema");
            return data.clone();
        }
    };

    match (SchemaNode::classify(&effective, "#"), data) {
        (Ok(SchemaNode::Object(_)), Value::Object(object)) => {
            let mut kept = Map::new();
            for (key, value) in object {
                if let Some(child) = property_schema(&effective, key) {
                    kept.insert(key.clone(), omit_extra_data(root, child, value));
                }
            }
            Value::Object(kept)
        }
        (Ok(SchemaNode::Array(_)), Value::Array(items)) => Value::Array(
            items
                .iter()
                .enumerate()
                .map(|(index, item)| match item_schema(&effective, index) {
                    Some(child) => omit_extra_data(root, child, item),
                    None => item.clone(),
                })
                .collect(),
        ),
        _ => data.clone(),
    }
}
