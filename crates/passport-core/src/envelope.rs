//! Versioned documents exchanged between orchestrator, agents and the
//! capability server.
//!
//! - `CapabilityDescriptor`: what an agent advertises at
//!   `/.well-known/agent-card.json`
//! - `InvocationRequest` / `InvocationResponse`: the body of `POST /invoke`
//!
//! Every document carries a version string; a peer accepts any version
//! sharing its major component.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{ErrorBody, PassportError};

/// Document version emitted by this build.
pub const DOCUMENT_VERSION: &str = "1.0";

fn default_document_version() -> String {
    DOCUMENT_VERSION.to_string()
}

fn major_of(version: &str) -> Option<u64> {
    version.trim().split('.').next()?.parse().ok()
}

/// Reject documents whose major version differs from ours.
pub fn check_document_version(version: &str) -> Result<(), PassportError> {
    match (major_of(version), major_of(DOCUMENT_VERSION)) {
        (Some(theirs), Some(ours)) if theirs == ours => Ok(()),
        _ => Err(PassportError::SchemaValidation(format!(
            "unsupported document version '{}' (expected {}.x)",
            version,
            major_of(DOCUMENT_VERSION).unwrap_or_default()
        ))),
    }
}

/// Self-description an agent publishes for discovery.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CapabilityDescriptor {
    #[serde(default = "default_document_version")]
    pub document_version: String,
    pub skill_name: String,
    pub version: String,
    #[serde(default)]
    pub description: String,
    pub endpoint: String,
    pub input_schema: Value,
    pub output_schema: Value,
    #[serde(default)]
    pub tags: Vec<String>,
}

impl CapabilityDescriptor {
    pub fn validate(&self) -> Result<(), PassportError> {
        check_document_version(&self.document_version)?;
        if self.skill_name.trim().is_empty() {
            return Err(PassportError::SchemaValidation(
                "descriptor has an empty skill_name".into(),
            ));
        }
        Ok(())
    }
}

/// Body of `POST /invoke`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InvocationRequest {
    #[serde(default = "default_document_version")]
    pub envelope_version: String,
    pub skill: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub run_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub task_id: Option<String>,
    pub payload: Value,
}

impl InvocationRequest {
    pub fn new(skill: impl Into<String>, payload: Value) -> Self {
        Self {
            envelope_version: default_document_version(),
            skill: skill.into(),
            run_id: None,
            task_id: None,
            payload,
        }
    }

    pub fn with_task(mut self, run_id: impl Into<String>, task_id: impl Into<String>) -> Self {
        self.run_id = Some(run_id.into());
        self.task_id = Some(task_id.into());
        self
    }
}

/// Reply to an invocation: exactly one of `result` / `error` is set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InvocationResponse {
    #[serde(default = "default_document_version")]
    pub envelope_version: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorBody>,
}

impl InvocationResponse {
    pub fn success(result: Value) -> Self {
        Self {
            envelope_version: default_document_version(),
            result: Some(result),
            error: None,
        }
    }

    pub fn failure(error: ErrorBody) -> Self {
        Self {
            envelope_version: default_document_version(),
            result: None,
            error: Some(error),
        }
    }

    pub fn from_result(result: Result<Value, PassportError>) -> Self {
        match result {
            Ok(value) => Self::success(value),
            Err(err) => Self::failure(err.to_body()),
        }
    }

    pub fn into_result(self) -> Result<Value, PassportError> {
        check_document_version(&self.envelope_version)?;
        match (self.result, self.error) {
            (_, Some(error)) => Err(PassportError::from(error)),
            (Some(result), None) => Ok(result),
            (None, None) => Err(PassportError::upstream(
                "invocation response carries neither result nor error",
            )),
        }
    }
}
