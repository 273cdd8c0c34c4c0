//! `clinical_parse_to_fhir`: narrative note → minimal FHIR-like `Bundle`.

use std::sync::Arc;

use async_trait::async_trait;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::capability::{InferenceBackend, TypedToolHandler};
use crate::error::PassportError;

const SYSTEM_PROMPT: &str = r#"You are an expert clinical coder. Convert the user's narrative clinical note into a minimal FHIR-like JSON Bundle.
Reply with strict JSON only: no code fences, no commentary. Use this shape:
{
  "resourceType": "Bundle",
  "type": "collection",
  "entry": [
    {"resource": {"resourceType": "Condition", "code": {"text": ""}}},
    {"resource": {"resourceType": "MedicationStatement", "medicationCodeableConcept": {"text": ""}}},
    {"resource": {"resourceType": "Procedure", "code": {"text": ""}}},
    {"resource": {"resourceType": "Observation", "code": {"text": ""}, "valueString": ""}}
  ]
}
Include only items that appear in the text. Use free-text codes (no coding systems)."#;

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct ClinicalParseInput {
    pub text: String,
    /// Demographics passed to the coder alongside the note.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub patient_meta: Option<Map<String, Value>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ClinicalParseOutput {
    pub bundle: Map<String, Value>,
}

pub struct ClinicalParseTool {
    backend: Arc<dyn InferenceBackend>,
}

impl ClinicalParseTool {
    pub fn new(backend: Arc<dyn InferenceBackend>) -> Self {
        Self { backend }
    }
}

/// Drop a surrounding Markdown code fence, if any.
pub fn strip_code_fence(raw: &str) -> &str {
    let trimmed = raw.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    // Skip the info string (e.g. "json") on the opening line.
    let body = rest.split_once('\n').map(|(_, body)| body).unwrap_or("");
    body.trim_end().strip_suffix("```").unwrap_or(body).trim()
}

/// Parse backend output as a JSON object.
pub fn parse_bundle(raw: &str) -> Result<Map<String, Value>, PassportError> {
    let value: Value = serde_json::from_str(strip_code_fence(raw)).map_err(|e| {
        PassportError::upstream(format!("backend did not return a valid JSON bundle: {}", e))
    })?;
    match value {
        Value::Object(bundle) => Ok(bundle),
        other => Err(PassportError::upstream(format!(
            "backend returned JSON {} instead of a bundle object",
            json_kind(&other)
        ))),
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[async_trait]
impl TypedToolHandler for ClinicalParseTool {
    type Input = ClinicalParseInput;
    type Output = ClinicalParseOutput;

    const NAME: &'static str = "clinical_parse_to_fhir";
    const DESCRIPTION: &'static str = "Parse narrative clinical text into a minimal FHIR-like JSON Bundle. \
        Returns strict JSON only.";

    async fn handle(&self, input: ClinicalParseInput) -> Result<ClinicalParseOutput, PassportError> {
        let user = match &input.patient_meta {
            Some(meta) if !meta.is_empty() => format!(
                "{}\n\nPATIENT:\n{}",
                input.text,
                serde_json::to_string_pretty(meta).unwrap_or_default()
            ),
            _ => input.text.clone(),
        };
        let raw = self.backend.complete(SYSTEM_PROMPT, &user).await?;
        Ok(ClinicalParseOutput {
            bundle: parse_bundle(&raw)?,
        })
    }
}
