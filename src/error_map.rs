//! Mapping of validation errors onto the id tree.

use indexmap::IndexMap;
use serde::Serialize;
use serde_json::{Map, Value};

use crate::error::ValidationError;
use crate::ids::IdNode;
use crate::types::ERRORS_KEY;

/// Validation errors grouped by field id.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorMap {
    /// Errors attached to the node whose data path they name.
    pub by_id: IndexMap<String, Vec<ValidationError>>,
    /// Every error, in validator order.
    pub all: Vec<ValidationError>,
    /// Errors whose path names no node of the current tree.
    pub orphans: Vec<ValidationError>,
}

impl ErrorMap {
    /// Errors attached to `id`.
    pub fn for_id(&self, id: &str) -> &[ValidationError] {
        self.by_id.get(id).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn is_empty(&self) -> bool {
        self.all.is_empty()
    }

    pub fn len(&self) -> usize {
        self.all.len()
    }
}

/// Attach raw validator errors to the nodes of `ids`.
///
/// Each error's path is walked through the tree with the same property and
/// index segments ids are built from. Errors that fall off the tree stay in
/// `all` and are also listed in `orphans`.
pub fn map_errors(raw: &[ValidationError], ids: &IdNode) -> ErrorMap {
    let mut map = ErrorMap {
        all: raw.to_vec(),
        ..ErrorMap::default()
    };

    for error in raw {
        match ids.find_raw(&error.path) {
            Some(node) => map
                .by_id
                .entry(node.id.clone())
                .or_default()
                .push(error.clone()),
            None => {
                tracing::debug!(path = ?error.path, "validation error has no field");
                map.orphans.push(error.clone());
            }
        }
    }
    map
}

/// Nest error messages by data path: `{"tasks": {"0": {"__errors": [..]}}}`.
///
/// Root-level messages land in the top-level `__errors`.
pub fn to_error_schema(errors: &[ValidationError]) -> Value {
    let mut tree = ErrorTree::default();
    for error in errors {
        let node = error
            .path
            .iter()
            .fold(&mut tree, |node, segment| node.children.entry(segment.clone()).or_default());
        node.messages.push(error.message.clone());
    }
    tree.into_value()
}

#[derive(Default)]
struct ErrorTree {
    messages: Vec<String>,
    children: IndexMap<String, ErrorTree>,
}

impl ErrorTree {
    fn into_value(self) -> Value {
        let mut map = Map::new();
        if !self.messages.is_empty() {
            map.insert(
                ERRORS_KEY.to_string(),
                Value::Array(self.messages.into_iter().map(Value::String).collect()),
            );
        }
        for (segment, child) in self.children {
            map.insert(segment, child.into_value());
        }
        Value::Object(map)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ids::build_id_tree;
    use crate::types::FormConfig;
    use serde_json::json;

    fn err(path: &[&str], message: &str) -> ValidationError {
        ValidationError::new(path.iter().map(|s| s.to_string()).collect(), message)
    }

    fn tree() -> IdNode {
        let schema = json!({
            "type": "object",
            "properties": {
                "name": { "type": "string" },
                "tasks": { "type": "array", "items": { "type": "object", "properties": { "done": { "type": "boolean" } } } }
            }
        });
        let data = json!({ "tasks": [{}, {}] });
        build_id_tree(&schema, &schema, Some(&data), &Value::Null, &FormConfig::default())
    }

    #[test]
    fn attaches_by_path() {
        let raw = vec![
            err(&["name"], "too short"),
            err(&["tasks", "1", "done"], "must be boolean"),
            err(&[], "form-level"),
        ];
        let map = map_errors(&raw, &tree());
        assert_eq!(map.for_id("root_name")[0].message, "too short");
        assert_eq!(map.for_id("root_tasks_1_done").len(), 1);
        assert_eq!(map.for_id("root").len(), 1);
        assert!(map.orphans.is_empty());
        assert_eq!(map.len(), 3);
    }

    #[test]
    fn orphans_are_kept() {
        let raw = vec![err(&["tasks", "7"], "gone"), err(&["ghost"], "gone too")];
        let map = map_errors(&raw, &tree());
        assert!(map.by_id.is_empty());
        assert_eq!(map.orphans.len(), 2);
        assert_eq!(map.all, raw);
    }

    #[test]
    fn every_valid_error_lands_exactly_once() {
        let tree = tree();
        let raw: Vec<ValidationError> = ["name", "tasks"]
            .iter()
            .map(|p| err(&[*p], "x"))
            .chain([err(&["tasks", "0", "done"], "y")])
            .collect();
        let map = map_errors(&raw, &tree);
        let attached: usize = map.by_id.values().map(Vec::len).sum();
        assert_eq!(attached, raw.len());
    }

    #[test]
    fn error_schema_nesting() {
        let raw = vec![
            err(&["tasks", "0", "done"], "a"),
            err(&["tasks", "0", "done"], "b"),
            err(&[], "top"),
        ];
        assert_eq!(
            to_error_schema(&raw),
            json!({
                "tasks": { "0": { "done": { "__errors": ["a", "b"] } } },
                "__errors": ["top"]
            })
        );
    }
}
