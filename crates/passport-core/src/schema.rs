//! JSON Schema helpers: derive schemas from payload types and validate
//! payloads against compiled schemas.

use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;

use jsonschema::{Draft, JSONSchema};
use schemars::generate::SchemaSettings;
use schemars::JsonSchema;
use serde_json::Value;

use crate::error::PassportError;

/// Draft-07 schema for `T` with all subschemas inlined.
pub fn schema_of<T: JsonSchema>() -> Value {
    let mut settings = SchemaSettings::draft07();
    settings.inline_subschemas = true;
    let schema = settings.into_generator().into_root_schema_for::<T>();
    serde_json::to_value(schema).unwrap_or(Value::Bool(true))
}

/// Names listed under the top-level `required` keyword.
pub fn required_fields(schema: &Value) -> BTreeSet<String> {
    schema
        .get("required")
        .and_then(Value::as_array)
        .map(|fields| {
            fields
                .iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

/// Names listed under the top-level `properties` keyword.
pub fn property_names(schema: &Value) -> BTreeSet<String> {
    schema
        .get("properties")
        .and_then(Value::as_object)
        .map(|props| props.keys().cloned().collect())
        .unwrap_or_default()
}

/// A compiled schema, cheap to clone and share across tasks.
#[derive(Clone)]
pub struct SchemaValidator {
    schema: Arc<Value>,
    compiled: Arc<JSONSchema>,
}

impl SchemaValidator {
    pub fn compile(schema: &Value) -> Result<Self, PassportError> {
        let compiled = JSONSchema::options()
            .with_draft(Draft::Draft7)
            .compile(schema)
            .map_err(|e| PassportError::SchemaValidation(format!("invalid schema: {}", e)))?;
        Ok(Self {
            schema: Arc::new(schema.clone()),
            compiled: Arc::new(compiled),
        })
    }

    pub fn schema(&self) -> &Value {
        &self.schema
    }

    /// Validate `instance`; `subject` names what is being checked in the
    /// error message (e.g. "input of tool 'ocr_image'").
    pub fn validate(&self, instance: &Value, subject: &str) -> Result<(), PassportError> {
        if let Err(errors) = self.compiled.validate(instance) {
            let details: Vec<String> = errors
                .map(|e| {
                    let path = e.instance_path.to_string();
                    if path.is_empty() {
                        e.to_string()
                    } else {
                        format!("{} (at {})", e, path)
                    }
                })
                .collect();
            return Err(PassportError::SchemaValidation(format!(
                "{}: {}",
                subject,
                details.join("; ")
            )));
        }
        Ok(())
    }
}

impl fmt::Debug for SchemaValidator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SchemaValidator")
            .field("schema", &self.schema)
            .finish_non_exhaustive()
    }
}
