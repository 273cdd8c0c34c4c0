use async_trait::async_trait;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::agent::{AgentContext, Skill};
use crate::capability::tools::{RenderInput, RenderOutput};
use crate::error::PassportError;

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct ReferralInput {
    pub bundle: Map<String, Value>,
    pub summary_clinic: String,
    pub summary_patient: String,
    pub risks_clinic: Vec<String>,
    pub risks_patient: Vec<String>,
    pub patient_lang: String,
    #[schemars(length(min = 1))]
    pub target_locale: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ReferralOutput {
    /// Formatted referral document.
    pub document_path: String,
    /// Plain-text referral document.
    pub text_path: String,
    pub patient_lang: String,
}

/// Render the bilingual referral artifacts.
pub struct ReferralSkill;

#[async_trait]
impl Skill for ReferralSkill {
    type Input = ReferralInput;
    type Output = ReferralOutput;

    fn name(&self) -> &str {
        "referral"
    }

    fn description(&self) -> &str {
        "Render the bilingual referral document and its plain-text copy."
    }

    fn tags(&self) -> Vec<String> {
        vec!["referral".into(), "document".into()]
    }

    fn required_tools(&self) -> &'static [&'static str] {
        &["render_referral"]
    }

    async fn run(&self, ctx: &AgentContext, input: ReferralInput) -> Result<ReferralOutput, PassportError> {
        let rendered: RenderOutput = ctx
            .call_tool_as(
                "render_referral",
                RenderInput {
                    bundle: input.bundle,
                    summary_clinic: input.summary_clinic,
                    summary_patient: input.summary_patient,
                    risks_clinic: input.risks_clinic,
                    risks_patient: input.risks_patient,
                    clinic_lang: input.target_locale,
                    patient_lang: input.patient_lang.clone(),
                    title: input.title,
                },
            )
            .await?;

        Ok(ReferralOutput {
            document_path: rendered.document_path,
            text_path: rendered.text_path,
            patient_lang: input.patient_lang,
        })
    }
}
