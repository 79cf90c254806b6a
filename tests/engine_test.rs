//! Integration tests for the form engine.

use schema_form::{
    build_id_tree, compute_defaults, map_errors, path, resolve, resolve_at, FormConfig,
    FormStateStore, JsonSchemaValidator, SchemaErrorKind, ValidationError, Validator,
};
use serde_json::{json, Value};

fn defaults(schema: &Value, data: Option<&Value>) -> Option<Value> {
    compute_defaults(schema, schema, data, &FormConfig::default()).unwrap()
}

fn err(path: &[&str], message: &str) -> ValidationError {
    ValidationError::new(path.iter().map(|s| s.to_string()).collect(), message)
}

// === Concrete Scenarios ===

mod scenarios {
    use super::*;

    #[test]
    fn defaults_for_empty_form() {
        let schema = json!({
            "type": "object",
            "required": ["title"],
            "properties": {
                "title": { "type": "string", "default": "A new task" },
                "done": { "type": "boolean", "default": false }
            }
        });

        assert_eq!(
            defaults(&schema, None),
            Some(json!({ "title": "A new task", "done": false }))
        );
    }

    #[test]
    fn inserted_item_gets_ids_without_defaults() {
        let schema = json!({
            "type": "object",
            "properties": {
                "tasks": {
                    "type": "array",
                    "items": { "type": "object", "properties": { "done": { "type": "boolean" } } }
                }
            }
        });
        let mut store = FormStateStore::new(
            schema,
            Value::Null,
            Some(json!({ "tasks": [{ "done": true }] })),
            FormConfig::default(),
        )
        .unwrap();

        store.insert_array_item(&path!["tasks"], 1, None);

        let tasks = &store.ids().properties["tasks"];
        let ids: Vec<&str> = tasks.items.iter().map(|item| item.id.as_str()).collect();
        assert_eq!(ids, vec!["root_tasks_0", "root_tasks_1"]);
        assert_eq!(tasks.items[1].properties["done"].id, "root_tasks_1_done");
        assert_eq!(store.value_at(&path!["tasks", 1usize, "done"]), None);
    }

    #[test]
    fn one_of_selects_matching_branch() {
        let schema = json!({
            "oneOf": [
                { "properties": { "kind": { "const": "a" }, "x": { "type": "string" } } },
                { "properties": { "kind": { "const": "b" }, "y": { "type": "number" } } }
            ]
        });

        let effective = resolve(&schema, &schema, Some(&json!({ "kind": "b", "y": 5 }))).unwrap();
        let properties = effective["properties"].as_object().unwrap();
        assert!(properties.contains_key("y"));
        assert!(!properties.contains_key("x"));
    }

    #[test]
    fn removal_renumbers_and_drops_stale_errors() {
        let schema = json!({
            "type": "object",
            "properties": {
                "tasks": {
                    "type": "array",
                    "items": { "type": "object", "properties": { "label": { "type": "string" } } }
                }
            }
        });
        let mut store = FormStateStore::new(
            schema,
            Value::Null,
            Some(json!({ "tasks": [{ "label": "a" }, { "label": "b" }, { "label": "c" }] })),
            FormConfig::default(),
        )
        .unwrap();
        store.apply_errors(vec![err(&["tasks", "1", "label"], "too short")]);
        assert_eq!(store.errors().for_id("root_tasks_1_label").len(), 1);

        store.remove_array_item(&path!["tasks"], 0);

        assert_eq!(
            store.value_at(&path!["tasks"]),
            Some(&json!([{ "label": "b" }, { "label": "c" }]))
        );
        let ids: Vec<&str> = store.ids().properties["tasks"]
            .items
            .iter()
            .map(|item| item.id.as_str())
            .collect();
        assert_eq!(ids, vec!["root_tasks_0", "root_tasks_1"]);
        assert!(store.errors().for_id("root_tasks_0_label").is_empty());
        assert!(store.errors().for_id("root_tasks_1_label").is_empty());
        assert!(store.errors().is_empty());
    }

    #[test]
    fn self_referential_schema_follows_data_depth() {
        let schema = json!({
            "definitions": {
                "node": {
                    "type": "object",
                    "properties": {
                        "name": { "type": "string", "default": "node" },
                        "children": { "type": "array", "items": { "$ref": "#/definitions/node" } }
                    }
                }
            },
            "$ref": "#/definitions/node"
        });
        let data = json!({ "children": [{ "children": [{ "children": [{}] }] }] });

        let filled = defaults(&schema, Some(&data)).unwrap();
        assert_eq!(
            filled["children"][0]["children"][0]["children"][0]["name"],
            "node"
        );

        let ids = build_id_tree(&schema, &schema, Some(&filled), &Value::Null, &FormConfig::default());
        let deepest = ids
            .find(&path!["children", 0usize, "children", 0usize, "children", 0usize, "name"])
            .unwrap();
        assert_eq!(deepest.id, "root_children_0_children_0_children_0_name");

        let effective = resolve_at(
            &schema,
            &schema,
            Some(&filled),
            &path!["children", 0usize, "children", 0usize, "children", 0usize],
        )
        .unwrap()
        .unwrap();
        assert!(effective["properties"].get("children").is_some());

        // No data below the root: the recursive array is not created.
        assert_eq!(defaults(&schema, None), Some(json!({ "name": "node" })));
    }

    #[test]
    fn optional_empty_objects_are_not_populated() {
        let schema = json!({
            "type": "object",
            "required": ["owner"],
            "properties": {
                "owner": { "type": "object", "properties": { "name": { "type": "string" } } },
                "address": { "type": "object", "properties": { "street": { "type": "string" } } },
                "prefs": {
                    "type": "object",
                    "properties": { "theme": { "type": "string", "default": "dark" } }
                }
            }
        });

        assert_eq!(
            defaults(&schema, None),
            Some(json!({ "owner": {}, "prefs": { "theme": "dark" } }))
        );
    }

    #[test]
    fn keys_containing_separator_keep_ids_unique() {
        let schema = json!({
            "type": "object",
            "properties": {
                "a": { "type": "object", "properties": { "b": { "type": "string" } } },
                "a_b": { "type": "string" }
            }
        });
        let mut store = FormStateStore::new(schema, Value::Null, None, FormConfig::default()).unwrap();
        assert_eq!(store.ids().ids(), vec!["root", "root_a", "root_a_b", "root_a_b~1"]);

        store.apply_errors(vec![err(&["a_b"], "flat"), err(&["a", "b"], "nested")]);
        assert_eq!(store.errors().for_id("root_a_b")[0].message, "nested");
        assert_eq!(store.errors().for_id("root_a_b~1")[0].message, "flat");
    }
}

// === Properties ===

mod properties {
    use super::*;

    fn fixtures() -> Vec<(Value, Option<Value>)> {
        vec![
            (
                json!({
                    "type": "object",
                    "properties": {
                        "a": { "type": "string", "default": "x" },
                        "b": { "type": "object", "properties": { "c": { "default": 1 } } }
                    }
                }),
                None,
            ),
            (
                json!({
                    "type": "object",
                    "properties": {
                        "list": { "type": "array", "items": { "properties": { "v": { "default": 0 } } } }
                    }
                }),
                Some(json!({ "list": [{}, { "v": 3 }, null] })),
            ),
            (
                json!({
                    "type": "object",
                    "oneOf": [
                        { "properties": { "kind": { "const": "a" }, "x": { "default": "ax" } } },
                        { "properties": { "kind": { "const": "b" }, "y": { "default": "by" } } }
                    ]
                }),
                Some(json!({ "kind": "b" })),
            ),
            (
                json!({
                    "type": "object",
                    "properties": { "card": { "type": "string", "default": "visa" } },
                    "dependencies": {
                        "card": { "properties": { "billing": { "type": "string", "default": "home" } } }
                    }
                }),
                None,
            ),
            (
                json!({
                    "type": "object",
                    "properties": { "kind": { "type": "string", "default": "pro" } },
                    "if": { "required": ["kind"], "properties": { "kind": { "const": "pro" } } },
                    "then": { "properties": { "seats": { "type": "integer", "default": 5 } } }
                }),
                None,
            ),
            (
                json!({
                    "definitions": {
                        "node": {
                            "type": "object",
                            "properties": {
                                "name": { "type": "string", "default": "n" },
                                "next": { "anyOf": [{ "$ref": "#/definitions/node" }, { "type": "null" }] }
                            }
                        }
                    },
                    "$ref": "#/definitions/node"
                }),
                None,
            ),
        ]
    }

    #[test]
    fn defaults_are_idempotent() {
        for (schema, data) in fixtures() {
            let once = defaults(&schema, data.as_ref());
            let twice = defaults(&schema, once.as_ref());
            assert_eq!(once, twice, "schema: {}", schema);
        }
    }

    #[test]
    fn ids_are_stable() {
        for (schema, data) in fixtures() {
            let data = defaults(&schema, data.as_ref());
            let first = build_id_tree(&schema, &schema, data.as_ref(), &Value::Null, &FormConfig::default());
            let second = build_id_tree(&schema, &schema, data.as_ref(), &Value::Null, &FormConfig::default());
            assert_eq!(first, second);
        }
    }

    #[test]
    fn mapping_valid_paths_loses_nothing() {
        let schema = json!({
            "type": "object",
            "properties": {
                "title": { "type": "string" },
                "tasks": { "type": "array", "items": { "properties": { "done": {} } } }
            }
        });
        let data = json!({ "title": "t", "tasks": [{}, {}] });
        let ids = build_id_tree(&schema, &schema, Some(&data), &Value::Null, &FormConfig::default());

        let raw = vec![
            err(&[], "root"),
            err(&["title"], "title"),
            err(&["tasks", "0", "done"], "first"),
            err(&["tasks", "1"], "second"),
        ];
        let mapped = map_errors(&raw, &ids);

        assert!(mapped.orphans.is_empty());
        let attached: usize = mapped.by_id.values().map(Vec::len).sum();
        assert_eq!(attached, raw.len());
        assert_eq!(mapped.for_id("root_tasks_0_done")[0].message, "first");
    }

    #[test]
    fn all_of_merge_is_associative() {
        let a = json!({ "type": "object", "properties": { "a": { "type": "string" } }, "required": ["a"] });
        let b = json!({ "properties": { "b": { "type": "number", "minimum": 1 } } });
        let c = json!({ "properties": { "b": { "maximum": 5 }, "c": {} }, "required": ["c"] });

        let flat = json!({ "allOf": [a.clone(), b.clone(), c.clone()] });
        let right = json!({ "allOf": [a.clone(), { "allOf": [b.clone(), c.clone()] }] });
        let left = json!({ "allOf": [{ "allOf": [a, b] }, c] });

        let flat = resolve(&flat, &flat, None).unwrap();
        assert_eq!(flat, resolve(&right, &right, None).unwrap());
        assert_eq!(flat, resolve(&left, &left, None).unwrap());
        assert_eq!(flat["properties"]["b"]["maximum"], 5);
    }
}

// === Degradation ===

mod degradation {
    use super::*;

    #[test]
    fn broken_subtree_is_marked_unsupported() {
        let schema = json!({
            "type": "object",
            "properties": {
                "ok": { "type": "string", "default": "fine" },
                "broken": { "$ref": "#/definitions/missing" }
            }
        });
        let store = FormStateStore::new(schema, Value::Null, None, FormConfig::default()).unwrap();

        assert_eq!(store.data(), Some(&json!({ "ok": "fine" })));
        let broken = &store.ids().properties["broken"];
        assert_eq!(
            broken.unsupported.as_ref().map(|e| e.kind),
            Some(SchemaErrorKind::RefNotFound)
        );
        assert!(store.ids().properties["ok"].unsupported.is_none());
    }

    #[test]
    fn broken_root_fails_session() {
        let schema = json!({ "$ref": "#/definitions/missing" });
        let err = FormStateStore::new(schema, Value::Null, None, FormConfig::default()).unwrap_err();
        assert_eq!(err.kind, SchemaErrorKind::RefNotFound);
    }

    #[test]
    fn contradictory_all_of_is_error() {
        let schema = json!({ "allOf": [{ "type": "string" }, { "type": "number" }] });
        let err = resolve(&schema, &schema, None).unwrap_err();
        assert_eq!(err.kind, SchemaErrorKind::IncompatibleAllOf);
    }
}

// === Validation Round Trip ===

mod validation {
    use super::*;

    #[test]
    fn store_validation_attaches_to_fields() {
        let schema = json!({
            "type": "object",
            "required": ["title"],
            "properties": {
                "title": { "type": "string" },
                "tasks": {
                    "type": "array",
                    "items": { "type": "object", "properties": { "done": { "type": "boolean" } } }
                }
            }
        });
        let mut store = FormStateStore::new(
            schema,
            Value::Null,
            Some(json!({ "tasks": [{ "done": "nope" }] })),
            FormConfig::default(),
        )
        .unwrap();

        let errors = store.validate(&JsonSchemaValidator).unwrap();
        assert_eq!(errors.for_id("root_title").len(), 1);
        assert_eq!(errors.for_id("root_tasks_0_done").len(), 1);
        assert!(errors.orphans.is_empty());

        store.set_at(&path!["title"], json!("t"));
        store.set_at(&path!["tasks", 0usize, "done"], json!(true));
        assert!(store.validate(&JsonSchemaValidator).unwrap().is_empty());
    }

    #[test]
    fn custom_validator_plugs_in() {
        struct AlwaysTitle;

        impl Validator for AlwaysTitle {
            fn validate(
                &self,
                _schema: &Value,
                _data: &Value,
            ) -> Result<Vec<ValidationError>, schema_form::SchemaError> {
                Ok(vec![ValidationError::new(vec!["title".into()], "custom")])
            }
        }

        let schema = json!({ "type": "object", "properties": { "title": { "type": "string" } } });
        let mut store = FormStateStore::new(schema, Value::Null, None, FormConfig::default()).unwrap();
        store.validate(&AlwaysTitle).unwrap();
        assert_eq!(store.errors().for_id("root_title")[0].message, "custom");
    }
}
