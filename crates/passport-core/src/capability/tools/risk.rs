//! `risk_assessment`: handoff summary plus bullet-point risks.

use std::sync::Arc;

use async_trait::async_trait;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::capability::{InferenceBackend, TypedToolHandler};
use crate::error::PassportError;

const SYSTEM_PROMPT: &str = "You are a clinical summarizer. Write a 6-10 sentence summary for a clinical handoff, \
then list the key risks as short bullet points (at most 6). Use both the raw text and the FHIR-like bundle \
when both are given. Reply in plain text; every risk line starts with '- '.";

#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
pub struct RiskInput {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bundle: Option<Map<String, Value>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct RiskOutput {
    pub summary: String,
    pub risks: Vec<String>,
}

fn is_risk_line(line: &str) -> bool {
    line.trim_start().starts_with("- ")
}

/// Split a completion into summary and `- ` bullet risks. The summary is
/// everything before the first risk line (the whole text when it is empty).
pub fn parse_assessment(completion: &str) -> RiskOutput {
    let lines: Vec<&str> = completion.lines().map(str::trim_end).collect();

    let risks: Vec<String> = lines
        .iter()
        .filter(|line| is_risk_line(line))
        .map(|line| line.trim_start()[2..].trim().to_string())
        .collect();

    let summary = match lines.iter().position(|line| is_risk_line(line)) {
        Some(first) => {
            let before = lines[..first].join("\n");
            let before = before.trim();
            if before.is_empty() {
                completion.trim().to_string()
            } else {
                before.to_string()
            }
        }
        None => completion.trim().to_string(),
    };

    RiskOutput { summary, risks }
}

pub struct RiskAssessmentTool {
    backend: Arc<dyn InferenceBackend>,
}

impl RiskAssessmentTool {
    pub fn new(backend: Arc<dyn InferenceBackend>) -> Self {
        Self { backend }
    }
}

#[async_trait]
impl TypedToolHandler for RiskAssessmentTool {
    type Input = RiskInput;
    type Output = RiskOutput;

    const NAME: &'static str = "risk_assessment";
    const DESCRIPTION: &'static str = "Summarize history and flag key risks from text and/or a FHIR-like bundle. \
        Returns a plain-text summary plus a list of risks.";

    async fn handle(&self, input: RiskInput) -> Result<RiskOutput, PassportError> {
        let text = input.text.as_deref().map(str::trim).unwrap_or_default();
        let bundle = input.bundle.as_ref().filter(|b| !b.is_empty());
        if text.is_empty() && bundle.is_none() {
            return Err(PassportError::SchemaValidation(
                "risk_assessment needs a non-empty 'text' or 'bundle'".into(),
            ));
        }

        let bundle_json = bundle
            .and_then(|b| serde_json::to_string_pretty(b).ok())
            .unwrap_or_default();
        let user = format!("TEXT:\n{}\n\nBUNDLE:\n{}", text, bundle_json);
        let completion = self.backend.complete(SYSTEM_PROMPT, &user).await?;
        Ok(parse_assessment(&completion))
    }
}
