use async_trait::async_trait;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::agent::{AgentContext, Skill};
use crate::capability::tools::{RiskInput, RiskOutput};
use crate::error::PassportError;

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct SummarizeInput {
    pub translated_text: String,
    pub bundle: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct SummarizeOutput {
    pub summary_clinic: String,
    pub risks_clinic: Vec<String>,
}

/// Clinic-language handoff summary and risk list.
pub struct SummarizeSkill;

#[async_trait]
impl Skill for SummarizeSkill {
    type Input = SummarizeInput;
    type Output = SummarizeOutput;

    fn name(&self) -> &str {
        "summarize"
    }

    fn description(&self) -> &str {
        "Summarize the history for a clinical handoff and flag key risks."
    }

    fn tags(&self) -> Vec<String> {
        vec!["summary".into(), "risk".into()]
    }

    fn required_tools(&self) -> &'static [&'static str] {
        &["risk_assessment"]
    }

    async fn run(&self, ctx: &AgentContext, input: SummarizeInput) -> Result<SummarizeOutput, PassportError> {
        let assessment: RiskOutput = ctx
            .call_tool_as(
                "risk_assessment",
                RiskInput {
                    text: Some(input.translated_text),
                    bundle: Some(input.bundle),
                },
            )
            .await?;
        Ok(SummarizeOutput {
            summary_clinic: assessment.summary,
            risks_clinic: assessment.risks,
        })
    }
}
