//! Identifier tree construction.
//!
//! Every node of the form gets an id derived from its ancestors
//! (`root_tasks_0_done`) and a dotted data path (`tasks.0.done`). Array
//! items are identified by position, so removing or moving an item
//! renumbers every later sibling.

use std::collections::HashSet;

use indexmap::IndexMap;
use serde::Serialize;
use serde_json::Value;

use crate::error::SchemaError;
use crate::node::SchemaNode;
use crate::resolver::{item_schema, resolve_tracked};
use crate::types::{FormConfig, PathSegment};
use crate::ui::{item_hints, order_properties, property_hints, ORDER_KEY};

/// One node of the identifier tree.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IdNode {
    /// Unique id within one build of the tree.
    pub id: String,
    /// Dotted data path; empty for the root.
    pub name: String,
    #[serde(skip_serializing_if = "IndexMap::is_empty")]
    pub properties: IndexMap<String, IdNode>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub items: Vec<IdNode>,
    /// Set when this subtree's schema could not be resolved.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub unsupported: Option<SchemaError>,
}

impl IdNode {
    fn leaf(id: String, name: String) -> Self {
        Self {
            id,
            name,
            properties: IndexMap::new(),
            items: Vec::new(),
            unsupported: None,
        }
    }

    /// Node at `path` below this one.
    pub fn find(&self, path: &[PathSegment]) -> Option<&IdNode> {
        path.iter().try_fold(self, |node, segment| node.child(&segment.as_key()))
    }

    /// Node at a path given as raw strings, as validators report them.
    pub fn find_raw(&self, path: &[String]) -> Option<&IdNode> {
        path.iter().try_fold(self, |node, segment| node.child(segment))
    }

    /// Direct child by property name or, failing that, by item index.
    pub fn child(&self, segment: &str) -> Option<&IdNode> {
        self.properties.get(segment).or_else(|| {
            segment
                .parse::<usize>()
                .ok()
                .and_then(|index| self.items.get(index))
        })
    }

    /// Node with the given id anywhere in this subtree.
    pub fn get(&self, id: &str) -> Option<&IdNode> {
        if self.id == id {
            return Some(self);
        }
        self.children().find_map(|child| child.get(id))
    }

    /// All ids in this subtree, parents before children.
    pub fn ids(&self) -> Vec<&str> {
        let mut ids = vec![self.id.as_str()];
        for child in self.children() {
            ids.extend(child.ids());
        }
        ids
    }

    fn children(&self) -> impl Iterator<Item = &IdNode> {
        self.properties.values().chain(self.items.iter())
    }
}

/// Build the id tree for `schema` and the current data.
///
/// Object properties follow declaration order unless the UI hints carry a
/// `ui:order`. Array items get nodes for the items present in `data`.
/// Subtrees whose schema fails to resolve become leaves marked
/// `unsupported`; building itself never fails.
///
/// Ids are unique within the tree. When a joined id is already taken (a
/// property name containing the separator can collide with a nested path),
/// the later node gets `~1`, `~2`, ... appended in build order.
pub fn build_id_tree(
    root: &Value,
    schema: &Value,
    data: Option<&Value>,
    hints: &Value,
    config: &FormConfig,
) -> IdNode {
    let mut builder = Builder {
        root,
        separator: &config.id_separator,
        refs: Vec::new(),
        used: HashSet::from([config.id_prefix.clone()]),
    };
    builder.build(schema, data, hints, config.id_prefix.clone(), String::new())
}

struct Builder<'a> {
    root: &'a Value,
    separator: &'a str,
    /// `$ref`s followed on the way down; re-entering one without data stops.
    refs: Vec<String>,
    used: HashSet<String>,
}

impl Builder<'_> {
    fn build(
        &mut self,
        schema: &Value,
        data: Option<&Value>,
        hints: &Value,
        id: String,
        name: String,
    ) -> IdNode {
        let node = IdNode::leaf(id, name);
        let (effective, followed) = match resolve_tracked(self.root, schema, data) {
            Ok(resolved) => resolved,
            Err(err) => return self.unsupported(node, err),
        };
        if data.is_none() && followed.iter().any(|r| self.refs.contains(r)) {
            return node;
        }

        let mark = self.refs.len();
        for reference in followed {
            if !self.refs.contains(&reference) {
                self.refs.push(reference);
            }
        }
        let node = self.build_resolved(&effective, data, hints, node);
        self.refs.truncate(mark);
        node
    }

    fn build_resolved(
        &mut self,
        effective: &Value,
        data: Option<&Value>,
        hints: &Value,
        mut node: IdNode,
    ) -> IdNode {
        let shape = match SchemaNode::classify(effective, "#") {
            Ok(shape) => shape,
            Err(err) => return self.unsupported(node, err),
        };

        match shape {
            SchemaNode::Object(map) => {
                let Some(properties) = map.get("properties").and_then(Value::as_object) else {
                    return node;
                };
                let names = properties.keys().cloned().collect();
                let ordered = match order_properties(names, hints.get(ORDER_KEY)) {
                    Ok(ordered) => ordered,
                    Err(err) => return self.unsupported(node, err),
                };
                for key in ordered {
                    let Some(property) = properties.get(&key) else {
                        continue;
                    };
                    let child_id = self.join_id(&node.id, &key);
                    let child = self.build(
                        property,
                        data.and_then(|d| d.get(&key)),
                        property_hints(hints, &key),
                        child_id,
                        join_name(&node.name, &key),
                    );
                    node.properties.insert(key, child);
                }
            }
            SchemaNode::Array(_) => {
                let Some(Value::Array(items)) = data else {
                    return node;
                };
                for (index, item) in items.iter().enumerate() {
                    let segment = index.to_string();
                    let child_id = self.join_id(&node.id, &segment);
                    let child_name = join_name(&node.name, &segment);
                    let child = match item_schema(effective, index) {
                        Some(item_schema) => self.build(
                            item_schema,
                            Some(item),
                            item_hints(hints, index),
                            child_id,
                            child_name,
                        ),
                        None => IdNode::leaf(child_id, child_name),
                    };
                    node.items.push(child);
                }
            }
            _ => {}
        }
        node
    }

    fn unsupported(&self, mut node: IdNode, err: SchemaError) -> IdNode {
        tracing::warn!(id = %node.id, error = %err, "unsupported schema");
        node.unsupported = Some(err);
        node
    }

    fn join_id(&mut self, parent: &str, segment: &str) -> String {
        let joined = format!("{}{}{}", parent, self.separator, segment);
        let mut id = joined.clone();
        let mut suffix = 0;
        while !self.used.insert(id.clone()) {
            suffix += 1;
            id = format!("{}~{}", joined, suffix);
        }
        id
    }
}

fn join_name(parent: &str, segment: &str) -> String {
    if parent.is_empty() {
        segment.to_string()
    } else {
        format!("{}.{}", parent, segment)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SchemaErrorKind;
    use serde_json::json;

    fn tasks_schema() -> Value {
        json!({
            "type": "object",
            "properties": {
                "title": { "type": "string" },
                "tasks": {
                    "type": "array",
                    "items": { "type": "object", "properties": { "done": { "type": "boolean" } } }
                }
            }
        })
    }

    #[test]
    fn object_and_array_ids() {
        let schema = tasks_schema();
        let data = json!({ "tasks": [{ "done": true }, {}] });
        let tree = build_id_tree(&schema, &schema, Some(&data), &Value::Null, &FormConfig::default());

        assert_eq!(tree.id, "root");
        assert_eq!(tree.name, "");
        assert_eq!(tree.properties["title"].id, "root_title");
        assert_eq!(tree.properties["tasks"].items[1].id, "root_tasks_1");
        assert_eq!(tree.properties["tasks"].items[1].properties["done"].id, "root_tasks_1_done");
        assert_eq!(tree.properties["tasks"].items[0].properties["done"].name, "tasks.0.done");
    }

    #[test]
    fn custom_prefix_and_separator() {
        let schema = tasks_schema();
        let config = FormConfig::new().id_prefix("form").id_separator(".");
        let tree = build_id_tree(&schema, &schema, None, &Value::Null, &config);
        assert_eq!(tree.properties["title"].id, "form.title");
        assert!(tree.properties["tasks"].items.is_empty());
    }

    #[test]
    fn ui_order_controls_property_order() {
        let schema = json!({
            "type": "object",
            "properties": { "a": {}, "b": {}, "c": {} }
        });
        let hints = json!({ "ui:order": ["c", "*"] });
        let tree = build_id_tree(&schema, &schema, None, &hints, &FormConfig::default());
        let keys: Vec<&String> = tree.properties.keys().collect();
        assert_eq!(keys, vec!["c", "a", "b"]);
    }

    #[test]
    fn invalid_order_marks_subtree() {
        let schema = json!({
            "type": "object",
            "properties": {
                "inner": { "type": "object", "properties": { "x": {}, "y": {} } },
                "other": { "type": "string" }
            }
        });
        let hints = json!({ "inner": { "ui:order": ["x"] } });
        let tree = build_id_tree(&schema, &schema, None, &hints, &FormConfig::default());
        let inner = &tree.properties["inner"];
        assert_eq!(inner.unsupported.as_ref().unwrap().kind, SchemaErrorKind::InvalidOrder);
        assert!(tree.properties["other"].unsupported.is_none());
    }

    #[test]
    fn broken_ref_is_contained() {
        let schema = json!({
            "type": "object",
            "properties": {
                "good": { "type": "string" },
                "bad": { "$ref": "#/definitions/missing" }
            }
        });
        let tree = build_id_tree(&schema, &schema, None, &Value::Null, &FormConfig::default());
        assert!(tree.properties["good"].unsupported.is_none());
        assert_eq!(
            tree.properties["bad"].unsupported.as_ref().unwrap().kind,
            SchemaErrorKind::RefNotFound
        );
    }

    #[test]
    fn stable_across_builds() {
        let schema = tasks_schema();
        let data = json!({ "tasks": [{}, {}, {}] });
        let a = build_id_tree(&schema, &schema, Some(&data), &Value::Null, &FormConfig::default());
        let b = build_id_tree(&schema, &schema, Some(&data), &Value::Null, &FormConfig::default());
        assert_eq!(a, b);
    }

    #[test]
    fn separator_in_key_gets_distinct_id() {
        let schema = json!({
            "type": "object",
            "properties": {
                "a_b": { "type": "string" },
                "a": { "type": "object", "properties": { "b": { "type": "string" } } }
            }
        });
        let tree = build_id_tree(&schema, &schema, None, &Value::Null, &FormConfig::default());

        assert_eq!(tree.ids(), vec!["root", "root_a_b", "root_a", "root_a_b~1"]);
        assert_eq!(tree.properties["a"].properties["b"].name, "a.b");
        assert_eq!(tree.get("root_a_b~1").unwrap().name, "a.b");
    }

    #[test]
    fn recursive_ref_behind_any_of_stops_without_data() {
        let schema = json!({
            "definitions": {
                "node": {
                    "type": "object",
                    "properties": {
                        "label": { "type": "string" },
                        "next": { "anyOf": [{ "$ref": "#/definitions/node" }, { "type": "null" }] }
                    }
                }
            },
            "$ref": "#/definitions/node"
        });
        let tree = build_id_tree(&schema, &schema, None, &Value::Null, &FormConfig::default());
        assert_eq!(tree.ids(), vec!["root", "root_label", "root_next"]);

        let data = json!({ "next": { "next": null } });
        let tree = build_id_tree(&schema, &schema, Some(&data), &Value::Null, &FormConfig::default());
        assert_eq!(tree.find(&crate::path!["next", "next"]).unwrap().id, "root_next_next");
    }

    #[test]
    fn lookups() {
        let schema = tasks_schema();
        let data = json!({ "tasks": [{}, {}] });
        let tree = build_id_tree(&schema, &schema, Some(&data), &Value::Null, &FormConfig::default());

        let node = tree.find(&crate::path!["tasks", 1usize, "done"]).unwrap();
        assert_eq!(node.id, "root_tasks_1_done");
        let raw = tree.find_raw(&["tasks".to_string(), "0".to_string()]).unwrap();
        assert_eq!(raw.id, "root_tasks_0");
        assert!(tree.find_raw(&["tasks".to_string(), "5".to_string()]).is_none());
        assert_eq!(tree.get("root_tasks_1").unwrap().name, "tasks.1");

        let ids = tree.ids();
        let unique: std::collections::HashSet<_> = ids.iter().collect();
        assert_eq!(ids.len(), unique.len());
    }
}
