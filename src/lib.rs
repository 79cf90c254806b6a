//! Schema Form Engine
//!
//! Headless core of a JSON-Schema-driven form: resolves the effective schema
//! of every node for the current data, computes defaults, assigns stable
//! field ids, keeps the live form state and maps validation errors back onto
//! fields. Rendering is left to the caller.
//!
//! # Example
//!
//! ```
//! use schema_form::{path, FormConfig, FormStateStore, JsonSchemaValidator};
//! use serde_json::json;
//!
//! let schema = json!({
//!     "type": "object",
//!     "required": ["title"],
//!     "properties": {
//!         "title": { "type": "string", "minLength": 1 },
//!         "done": { "type": "boolean", "default": false }
//!     }
//! });
//!
//! let mut store = FormStateStore::new(schema, json!({}), None, FormConfig::default()).unwrap();
//! assert_eq!(store.data(), Some(&json!({ "done": false })));
//!
//! store.validate(&JsonSchemaValidator).unwrap();
//! assert_eq!(store.errors().for_id("root_title").len(), 1);
//!
//! store.set_at(&path!["title"], json!("Buy milk"));
//! store.validate(&JsonSchemaValidator).unwrap();
//! assert!(store.errors().is_empty());
//! ```
//!
//! # Resolution Order
//!
//! | Keyword | Effect |
//! |---------|--------|
//! | `$ref` | Replaced by the target, sibling keywords merged over it |
//! | `allOf` | Branches merged into one schema |
//! | `dependencies` | Dependent schemas merged when their trigger is present |
//! | `if`/`then`/`else` | Branch chosen by evaluating `if` against the data |
//! | `oneOf`/`anyOf` | Best-matching branch merged into the base |
//!
//! Recursion into `properties` and `items` happens only when a caller
//! descends, so recursive schemas stay bounded.

mod defaults;
mod error;
mod error_map;
mod ids;
mod loader;
mod merge;
mod node;
mod options;
mod prune;
mod resolver;
mod store;
mod types;
mod ui;
mod validator;

pub use defaults::{compute_defaults, default_form_state};
pub use error::{LoadError, SchemaError, SchemaErrorKind, ValidationError};
pub use error_map::{map_errors, to_error_schema, ErrorMap};
pub use ids::{build_id_tree, IdNode};
pub use loader::{
    is_url, load_schema, load_schema_auto, load_schema_str, lookup_fragment, navigate_fragment,
};
pub use merge::merge_schemas;
pub use options::{is_multi_select, is_select, options_list, EnumOption};
pub use prune::omit_extra_data;
pub use resolver::{
    conforms, is_array_schema, is_object_schema, item_schema, property_schema, resolve, resolve_at,
    resolve_ref, select_branch,
};
pub use store::{Change, FieldView, FormStateStore, SubscriptionId};
pub use types::{
    parse_pointer, to_pointer, FormConfig, ObjectDefaults, PathSegment, ADDITIONAL_PROPERTY_FLAG,
    ERRORS_KEY,
};
pub use ui::{order_properties, ui_options};
pub use validator::{JsonSchemaValidator, Validator};

#[cfg(feature = "remote")]
pub use loader::load_schema_url;
