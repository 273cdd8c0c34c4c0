use async_trait::async_trait;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::agent::{AgentContext, Skill};
use crate::capability::tools::{TranslateInput, TranslateOutput};
use crate::error::PassportError;

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct TranslateStageInput {
    pub source_text: String,
    #[schemars(length(min = 1))]
    pub target_locale: String,
    /// Language hint supplied with the document; reported as the source
    /// locale when present.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub locale_hint: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct TranslateStageOutput {
    pub translated_text: String,
    pub source_locale: String,
    pub target_locale: String,
}

/// Translate the OCR text into the clinic's language.
pub struct TranslateSkill;

#[async_trait]
impl Skill for TranslateSkill {
    type Input = TranslateStageInput;
    type Output = TranslateStageOutput;

    fn name(&self) -> &str {
        "translate"
    }

    fn description(&self) -> &str {
        "Translate the source document text into the target (clinic) locale."
    }

    fn tags(&self) -> Vec<String> {
        vec!["translation".into()]
    }

    fn required_tools(&self) -> &'static [&'static str] {
        &["translate_text"]
    }

    async fn run(
        &self,
        ctx: &AgentContext,
        input: TranslateStageInput,
    ) -> Result<TranslateStageOutput, PassportError> {
        let request = TranslateInput {
            text: input.source_text,
            target_locale: input.target_locale.clone(),
            source_locale: input.locale_hint,
        };
        let translated: TranslateOutput = ctx.call_tool_as("translate_text", request).await?;

        Ok(TranslateStageOutput {
            translated_text: translated.text,
            source_locale: translated.source_locale,
            target_locale: input.target_locale,
        })
    }
}
