//! Validator collaborator interface and the `jsonschema` backend.

use jsonschema::error::ValidationErrorKind;
use serde_json::{json, Value};

use crate::error::{SchemaError, SchemaErrorKind, ValidationError};
use crate::types::parse_pointer;

/// A pluggable JSON Schema validator.
///
/// Implementations validate `data` against the full `schema` document and
/// report every failure as data. Only a schema the backend cannot compile
/// is an `Err`.
pub trait Validator {
    fn validate(&self, schema: &Value, data: &Value) -> Result<Vec<ValidationError>, SchemaError>;
}

/// Validator backed by the `jsonschema` crate.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonSchemaValidator;

impl JsonSchemaValidator {
    pub fn new() -> Self {
        Self
    }
}

impl Validator for JsonSchemaValidator {
    fn validate(&self, schema: &Value, data: &Value) -> Result<Vec<ValidationError>, SchemaError> {
        let validator = jsonschema::validator_for(schema).map_err(|e| {
            SchemaError::new(SchemaErrorKind::InvalidSchema, "#", e.to_string())
        })?;

        Ok(validator.iter_errors(data).map(|e| convert(&e)).collect())
    }
}

/// Convert a backend error into engine data.
///
/// `required` failures are re-pointed from the parent object to the missing
/// property so they attach to that field.
fn convert(error: &jsonschema::ValidationError<'_>) -> ValidationError {
    let mut path: Vec<String> = parse_pointer(&error.instance_path.to_string())
        .into_iter()
        .map(|segment| segment.as_key())
        .collect();
    let schema_path = error.schema_path.to_string();
    let keyword = schema_path.rsplit('/').next().unwrap_or_default().to_string();

    let params = match &error.kind {
        ValidationErrorKind::Required { property } => {
            let name = property
                .as_str()
                .map(str::to_string)
                .unwrap_or_else(|| property.to_string());
            path.push(name.clone());
            json!({ "keyword": keyword, "missingProperty": name })
        }
        _ => json!({ "keyword": keyword }),
    };

    ValidationError {
        path,
        message: error.to_string(),
        schema_path,
        params,
    }
}
