use async_trait::async_trait;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::agent::{AgentContext, Skill};
use crate::capability::tools::{TranslateInput, TranslateOutput};
use crate::error::PassportError;
use crate::locale::{is_undetermined, same_language};

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct LocalizeInput {
    pub summary_clinic: String,
    pub risks_clinic: Vec<String>,
    pub patient_lang: String,
    #[schemars(length(min = 1))]
    pub target_locale: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct LocalizeOutput {
    pub summary_patient: String,
    pub risks_patient: Vec<String>,
    pub patient_lang: String,
}

/// False when the patient already reads the clinic language, or their
/// language is unknown.
pub fn needs_translation(patient_lang: &str, target_locale: &str) -> bool {
    !is_undetermined(patient_lang) && !same_language(patient_lang, target_locale)
}

/// Patient-language copy of the clinic summary and risks.
pub struct LocalizeSkill;

impl LocalizeSkill {
    async fn translate(
        ctx: &AgentContext,
        text: String,
        patient_lang: &str,
        clinic_lang: &str,
    ) -> Result<String, PassportError> {
        let translated: TranslateOutput = ctx
            .call_tool_as(
                "translate_text",
                TranslateInput {
                    text,
                    target_locale: patient_lang.to_string(),
                    source_locale: Some(clinic_lang.to_string()),
                },
            )
            .await?;
        Ok(translated.text)
    }
}

#[async_trait]
impl Skill for LocalizeSkill {
    type Input = LocalizeInput;
    type Output = LocalizeOutput;

    fn name(&self) -> &str {
        "localize"
    }

    fn description(&self) -> &str {
        "Translate the clinic summary and risks back into the patient's language."
    }

    fn tags(&self) -> Vec<String> {
        vec!["translation".into(), "patient".into()]
    }

    fn required_tools(&self) -> &'static [&'static str] {
        &["translate_text"]
    }

    async fn run(&self, ctx: &AgentContext, input: LocalizeInput) -> Result<LocalizeOutput, PassportError> {
        let LocalizeInput {
            summary_clinic,
            risks_clinic,
            patient_lang,
            target_locale,
        } = input;

        if !needs_translation(&patient_lang, &target_locale) {
            tracing::info!(
                "[Agent] localize: patient language '{}' needs no translation from '{}'",
                patient_lang,
                target_locale
            );
            return Ok(LocalizeOutput {
                summary_patient: summary_clinic,
                risks_patient: risks_clinic,
                patient_lang,
            });
        }

        let summary_patient =
            Self::translate(ctx, summary_clinic, &patient_lang, &target_locale).await?;

        let mut risks_patient = Vec::with_capacity(risks_clinic.len());
        for risk in risks_clinic {
            risks_patient.push(Self::translate(ctx, risk, &patient_lang, &target_locale).await?);
        }

        Ok(LocalizeOutput {
            summary_patient,
            risks_patient,
            patient_lang,
        })
    }
}
