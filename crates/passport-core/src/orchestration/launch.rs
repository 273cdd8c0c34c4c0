//! The submission accepted by the orchestrator's `orchestrate` skill and the
//! report it returns.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::run::{RunStatus, WorkflowRun};
use crate::envelope::{CapabilityDescriptor, DOCUMENT_VERSION};
use crate::error::PassportError;
use crate::schema::schema_of;

pub const ORCHESTRATE_SKILL: &str = "orchestrate";

fn default_target_locale() -> String {
    "en".to_string()
}

/// A scanned document to turn into a bilingual referral.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct LaunchRequest {
    #[serde(alias = "image_path")]
    #[schemars(length(min = 1))]
    pub document_path: String,
    /// OCR language of the document (e.g. `ara`).
    #[schemars(length(min = 1))]
    pub locale_hint: String,
    /// Clinic language.
    #[serde(default = "default_target_locale", alias = "patient_lang_target")]
    pub target_locale: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub patient_meta: Option<Map<String, Value>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
}

impl LaunchRequest {
    pub fn new(document_path: impl Into<String>, locale_hint: impl Into<String>) -> Self {
        Self {
            document_path: document_path.into(),
            locale_hint: locale_hint.into(),
            target_locale: default_target_locale(),
            patient_meta: None,
            title: None,
        }
    }

    pub fn with_target(mut self, target_locale: impl Into<String>) -> Self {
        self.target_locale = target_locale.into();
        self
    }

    /// Initial run context.
    pub fn into_context(self) -> Map<String, Value> {
        match serde_json::to_value(self) {
            Ok(Value::Object(map)) => map,
            _ => Map::new(),
        }
    }
}

/// What a successful run hands back to the caller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct LaunchReport {
    pub run_id: String,
    /// Formatted (HTML) referral.
    pub document_path: String,
    /// Plain-text referral.
    pub text_path: String,
    pub patient_lang: String,
    pub source_locale: String,
    pub summary_clinic: String,
    pub risks_clinic: Vec<String>,
    pub final_message: String,
}

fn text_field(context: &Map<String, Value>, field: &str) -> Result<String, PassportError> {
    context
        .get(field)
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| PassportError::Internal(format!("run context has no '{}'", field)))
}

impl LaunchReport {
    /// Report for a finished run. Artifacts are only reported when every
    /// stage succeeded; otherwise the run's halting error is returned.
    pub fn from_run(run: &WorkflowRun) -> Result<Self, PassportError> {
        if run.status != RunStatus::Succeeded {
            return Err(match run.clone().into_result() {
                Err(err) => err,
                Ok(_) => PassportError::Internal(format!("run {} has not succeeded", run.run_id)),
            });
        }

        let context = &run.context;
        let risks_clinic = context
            .get("risks_clinic")
            .and_then(Value::as_array)
            .map(|risks| risks.iter().filter_map(Value::as_str).map(str::to_string).collect())
            .unwrap_or_default();
        let document_path = text_field(context, "document_path")?;

        Ok(Self {
            run_id: run.run_id.clone(),
            text_path: text_field(context, "text_path")?,
            patient_lang: text_field(context, "patient_lang")?,
            source_locale: text_field(context, "source_locale")?,
            summary_clinic: text_field(context, "summary_clinic")?,
            risks_clinic,
            final_message: format!("Referral ready: {}", document_path),
            document_path,
        })
    }
}

/// Descriptor the orchestrator publishes for its own `orchestrate` skill.
pub fn orchestrator_descriptor(endpoint: impl Into<String>) -> CapabilityDescriptor {
    CapabilityDescriptor {
        document_version: DOCUMENT_VERSION.to_string(),
        skill_name: ORCHESTRATE_SKILL.to_string(),
        version: "1.0.0".to_string(),
        description: "Run the medical passport pipeline: OCR, translation, structuring, \
                      risk summary, patient-language localization and referral rendering."
            .to_string(),
        endpoint: endpoint.into(),
        input_schema: schema_of::<LaunchRequest>(),
        output_schema: schema_of::<LaunchReport>(),
        tags: vec!["orchestrator".into(), "medical-passport".into()],
    }
}
