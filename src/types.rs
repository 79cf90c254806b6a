//! Core types shared by the form engine.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Key used to flag property schemas synthesized from `additionalProperties`.
pub const ADDITIONAL_PROPERTY_FLAG: &str = "__additional_property";

/// Key under which per-field messages are stored in an error schema.
pub const ERRORS_KEY: &str = "__errors";

/// Returns the JSON type name for error messages.
pub fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// One step of a path into the form data tree.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PathSegment {
    Index(usize),
    Key(String),
}

impl PathSegment {
    /// Interpret the segment as an array index, if it is one or looks like one.
    pub fn as_index(&self) -> Option<usize> {
        match self {
            PathSegment::Index(i) => Some(*i),
            PathSegment::Key(k) => k.parse().ok(),
        }
    }

    /// Interpret the segment as an object key.
    pub fn as_key(&self) -> String {
        match self {
            PathSegment::Index(i) => i.to_string(),
            PathSegment::Key(k) => k.clone(),
        }
    }
}

impl fmt::Display for PathSegment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PathSegment::Index(i) => write!(f, "{}", i),
            PathSegment::Key(k) => f.write_str(k),
        }
    }
}

impl From<&str> for PathSegment {
    fn from(key: &str) -> Self {
        PathSegment::Key(key.to_string())
    }
}

impl From<String> for PathSegment {
    fn from(key: String) -> Self {
        PathSegment::Key(key)
    }
}

impl From<usize> for PathSegment {
    fn from(index: usize) -> Self {
        PathSegment::Index(index)
    }
}

/// Build a data path from anything convertible into segments.
///
/// ```
/// use schema_form::{path, PathSegment};
///
/// let p = path!["tasks", 0usize, "done"];
/// assert_eq!(p[1], PathSegment::Index(0));
/// ```
#[macro_export]
macro_rules! path {
    () => { Vec::<$crate::PathSegment>::new() };
    ($($seg:expr),+ $(,)?) => { vec![$($crate::PathSegment::from($seg)),+] };
}

/// Parse a JSON Pointer (RFC 6901) into path segments.
///
/// Numeric segments stay keys; consumers decide whether they index an array.
pub fn parse_pointer(pointer: &str) -> Vec<PathSegment> {
    let trimmed = pointer.trim_start_matches('#');
    if trimmed.is_empty() || trimmed == "/" {
        return Vec::new();
    }
    trimmed
        .trim_start_matches('/')
        .split('/')
        .map(|part| PathSegment::Key(part.replace("~1", "/").replace("~0", "~")))
        .collect()
}

/// Render path segments as a JSON Pointer.
pub fn to_pointer(path: &[PathSegment]) -> String {
    path.iter()
        .map(|seg| format!("/{}", seg.as_key().replace('~', "~0").replace('/', "~1")))
        .collect()
}

/// How object defaults are populated when no data exists for a property.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ObjectDefaults {
    /// Every object property yields its computed default; nested objects
    /// without defaults still produce `{}`.
    PopulateAll,
    /// Nested objects without defaults produce `{}` only when required.
    #[default]
    PopulateRequired,
    /// Nested objects that end up empty are left out.
    SkipEmpty,
}

/// Per-session configuration of the form engine.
///
/// Passed explicitly to every operation that needs it; there is no global
/// registry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct FormConfig {
    /// Id of the root node.
    pub id_prefix: String,
    /// Separator placed between id segments.
    pub id_separator: String,
    /// Object defaulting policy.
    pub object_defaults: ObjectDefaults,
    /// Strip data not described by the schema in `submit_data`.
    pub omit_extra_data: bool,
}

impl Default for FormConfig {
    fn default() -> Self {
        Self {
            id_prefix: "root".to_string(),
            id_separator: "_".to_string(),
            object_defaults: ObjectDefaults::default(),
            omit_extra_data: false,
        }
    }
}

impl FormConfig {
    /// Create a config with the default `root` prefix and `_` separator.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn id_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.id_prefix = prefix.into();
        self
    }

    pub fn id_separator(mut self, separator: impl Into<String>) -> Self {
        self.id_separator = separator.into();
        self
    }

    pub fn object_defaults(mut self, policy: ObjectDefaults) -> Self {
        self.object_defaults = policy;
        self
    }

    pub fn omit_extra_data(mut self, omit: bool) -> Self {
        self.omit_extra_data = omit;
        self
    }
}
