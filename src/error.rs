//! Error types for schema loading, resolution and validation.

use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// Classification of a [`SchemaError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SchemaErrorKind {
    /// A `$ref` pointer does not resolve inside the root document.
    RefNotFound,
    /// A chain of `$ref`/`allOf` leads back to itself without structure.
    CircularRef,
    /// Two merged schemas declare contradictory constraints.
    IncompatibleAllOf,
    /// A combinator is not a non-empty array of schemas.
    MalformedCombinator,
    /// A schema was expected but something else was found.
    NotAnObject,
    /// A `ui:order` hint does not match the declared properties.
    InvalidOrder,
    /// The validator backend rejected the schema itself.
    InvalidSchema,
}

impl SchemaErrorKind {
    /// Stable tag for this kind.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::RefNotFound => "ref-not-found",
            Self::CircularRef => "circular-ref",
            Self::IncompatibleAllOf => "incompatible-allOf",
            Self::MalformedCombinator => "malformed-combinator",
            Self::NotAnObject => "not-an-object",
            Self::InvalidOrder => "invalid-order",
            Self::InvalidSchema => "invalid-schema",
        }
    }
}

impl fmt::Display for SchemaErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Fatal error while resolving one schema subtree.
///
/// Renderers substitute an "unsupported schema" placeholder for the
/// subtree that produced it; the rest of the form stays usable.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize)]
#[error("{kind} at {pointer}: {message}")]
pub struct SchemaError {
    pub kind: SchemaErrorKind,
    /// Schema location (`$ref` string or JSON Pointer) the error refers to.
    pub pointer: String,
    pub message: String,
}

impl SchemaError {
    pub fn new(kind: SchemaErrorKind, pointer: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            kind,
            pointer: pointer.into(),
            message: message.into(),
        }
    }

    pub fn ref_not_found(reference: &str) -> Self {
        Self::new(
            SchemaErrorKind::RefNotFound,
            reference,
            format!("could not find a definition for {}", reference),
        )
    }

    pub fn circular_ref(reference: &str) -> Self {
        Self::new(
            SchemaErrorKind::CircularRef,
            reference,
            "reference cycle without intermediate structure",
        )
    }

    pub fn incompatible(pointer: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(SchemaErrorKind::IncompatibleAllOf, pointer, message)
    }

    pub fn malformed(pointer: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(SchemaErrorKind::MalformedCombinator, pointer, message)
    }

    /// Exit code used by the CLI.
    pub fn exit_code(&self) -> i32 {
        2
    }
}

/// Errors while loading schema, data or UI-hint documents.
#[derive(Debug, Error)]
pub enum LoadError {
    // IO errors (exit code 3)
    #[error("file not found: {path}")]
    FileNotFound { path: PathBuf },

    #[error("cannot read {path}: {source}")]
    ReadError {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[cfg(feature = "remote")]
    #[error("failed to fetch {url}: {source}")]
    NetworkError {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    // Parse errors (exit code 2)
    #[error("invalid JSON: {source}")]
    InvalidJson {
        #[source]
        source: serde_json::Error,
    },

    #[error("fragment not found: {fragment}")]
    FragmentNotFound { fragment: String },
}

impl LoadError {
    /// Returns the exit code for this error type.
    pub fn exit_code(&self) -> i32 {
        match self {
            LoadError::FileNotFound { .. } | LoadError::ReadError { .. } => 3,
            #[cfg(feature = "remote")]
            LoadError::NetworkError { .. } => 3,
            _ => 2,
        }
    }
}

/// A single validation failure reported by a validator backend.
///
/// Validation errors are ordinary data: they are collected, mapped onto the
/// id tree and displayed, never raised.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationError {
    /// Data path of the offending value, one entry per property or index.
    pub path: Vec<String>,
    /// Human-readable message.
    pub message: String,
    /// JSON Pointer to the failing keyword within the schema.
    pub schema_path: String,
    /// Keyword-specific parameters.
    #[serde(default)]
    pub params: Value,
}

impl ValidationError {
    pub fn new(path: Vec<String>, message: impl Into<String>) -> Self {
        Self {
            path,
            message: message.into(),
            schema_path: String::new(),
            params: Value::Object(Default::default()),
        }
    }

    pub fn with_schema_path(mut self, schema_path: impl Into<String>) -> Self {
        self.schema_path = schema_path.into();
        self
    }

    pub fn with_params(mut self, params: Value) -> Self {
        self.params = params;
        self
    }

    /// The data path rendered as a dotted property path (`.tasks.0.done`).
    pub fn property(&self) -> String {
        self.path.iter().map(|seg| format!(".{}", seg)).collect()
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let pointer: String = self.path.iter().map(|seg| format!("/{}", seg)).collect();
        write!(f, "{}: {}", pointer, self.message)
    }
}
