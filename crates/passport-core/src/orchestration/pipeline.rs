//! YAML schema types for pipeline definitions.
//!
//! A pipeline lists its stages in execution order:
//!
//! ```yaml
//! name: "medical-passport"
//! version: "1.0"
//!
//! context_fields: [document_path, locale_hint, target_locale]
//!
//! stages:
//!   - skill: intake
//!     endpoint: "${INTAKE_URL:-http://127.0.0.1:41241}"
//!     exports: [patient_lang]
//!
//!   - skill: translate
//!     exports: [translated_text, source_locale]
//!     timeout_secs: 120
//! ```
//!
//! Stage k receives the run context merged with stage k-1's output (the
//! output wins on key collisions). The run context starts as the submitted
//! `context_fields` and grows only by each stage's `exports`.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::envelope::check_document_version;
use crate::error::PassportError;

/// Top-level pipeline definition loaded from YAML.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineDefinition {
    pub name: String,

    #[serde(default)]
    pub description: Option<String>,

    /// Definition format version.
    #[serde(default = "default_version")]
    pub version: String,

    /// Fields every submission must provide; they seed the run context.
    #[serde(default)]
    pub context_fields: Vec<String>,

    /// Ordered stages.
    pub stages: Vec<StageDefinition>,
}

fn default_version() -> String {
    "1.0".to_string()
}

/// A single stage of the pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageDefinition {
    /// Skill name; also the stage name within a run.
    pub skill: String,

    /// Agent base URL; supports `${VAR}` / `${VAR:-default}` references.
    /// When absent the registry decides.
    #[serde(default)]
    pub endpoint: Option<String>,

    /// Output fields copied into the run context for later stages.
    #[serde(default)]
    pub exports: Vec<String>,

    /// Per-invocation timeout override.
    #[serde(default)]
    pub timeout_secs: Option<u64>,
}

impl StageDefinition {
    pub fn new(skill: &str, exports: &[&str]) -> Self {
        Self {
            skill: skill.to_string(),
            endpoint: None,
            exports: exports.iter().map(|e| e.to_string()).collect(),
            timeout_secs: None,
        }
    }
}

impl PipelineDefinition {
    /// Parse a pipeline definition from a YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self, PassportError> {
        let definition: Self = serde_yaml::from_str(yaml).map_err(|e| {
            PassportError::SchemaValidation(format!("Failed to parse pipeline YAML: {}", e))
        })?;
        definition.validate()?;
        Ok(definition)
    }

    /// Load a pipeline definition from a file path.
    pub fn from_file(path: &str) -> Result<Self, PassportError> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            PassportError::NotFound(format!("Failed to read pipeline file '{}': {}", path, e))
        })?;
        Self::from_yaml(&content)
    }

    /// The built-in six-stage medical passport pipeline.
    pub fn medical_passport() -> Self {
        let endpoint = |var: &str, port: u16| Some(format!("${{{}:-http://127.0.0.1:{}}}", var, port));
        let stage = |skill: &str, var: &str, port: u16, exports: &[&str]| StageDefinition {
            endpoint: endpoint(var, port),
            ..StageDefinition::new(skill, exports)
        };

        Self {
            name: "medical-passport".into(),
            description: Some("Scanned clinical note to bilingual referral".into()),
            version: default_version(),
            context_fields: vec![
                "document_path".into(),
                "locale_hint".into(),
                "target_locale".into(),
            ],
            stages: vec![
                stage("intake", "INTAKE_URL", 41241, &["patient_lang"]),
                stage("translate", "TRANSLATE_URL", 41242, &["translated_text", "source_locale"]),
                stage("structure", "STRUCTURE_URL", 41243, &["bundle"]),
                stage("summarize", "SUMMARIZER_URL", 41244, &["summary_clinic", "risks_clinic"]),
                stage("localize", "LOCALIZE_URL", 41247, &["summary_patient", "risks_patient"]),
                StageDefinition {
                    timeout_secs: Some(120),
                    ..stage("referral", "REFERRAL_URL", 41245, &["document_path", "text_path"])
                },
            ],
        }
    }

    /// Structural checks that need no agent: version, non-empty, unique
    /// stage names.
    pub fn validate(&self) -> Result<(), PassportError> {
        check_document_version(&self.version)?;
        if self.name.trim().is_empty() {
            return Err(PassportError::SchemaValidation("pipeline name is empty".into()));
        }
        if self.stages.is_empty() {
            return Err(PassportError::SchemaValidation(format!(
                "pipeline '{}' has no stages",
                self.name
            )));
        }
        let mut seen = HashSet::new();
        for stage in &self.stages {
            if stage.skill.trim().is_empty() {
                return Err(PassportError::SchemaValidation(
                    "stage with an empty skill name".into(),
                ));
            }
            if !seen.insert(stage.skill.as_str()) {
                return Err(PassportError::SchemaValidation(format!(
                    "stage '{}' appears more than once",
                    stage.skill
                )));
            }
        }
        Ok(())
    }

    pub fn stage_names(&self) -> Vec<String> {
        self.stages.iter().map(|s| s.skill.clone()).collect()
    }
}

/// Expand `${VAR}` and `${VAR:-default}` references from the process
/// environment. Unset variables without a default are left as written.
pub fn resolve_env_vars(input: &str) -> String {
    resolve_vars_with(input, &|name| std::env::var(name).ok())
}

pub fn resolve_vars_with(input: &str, lookup: &dyn Fn(&str) -> Option<String>) -> String {
    let Ok(re) = regex::Regex::new(r"\$\{([^}]+)\}") else {
        return input.to_string();
    };
    re.replace_all(input, |caps: &regex::Captures| {
        let var_expr = &caps[1];
        // Support default value syntax: ${VAR:-default}
        if let Some(idx) = var_expr.find(":-") {
            let var_name = &var_expr[..idx];
            let default_val = &var_expr[idx + 2..];
            lookup(var_name).unwrap_or_else(|| default_val.to_string())
        } else {
            lookup(var_expr).unwrap_or_else(|| format!("${{{}}}", var_expr))
        }
    })
    .to_string()
}
