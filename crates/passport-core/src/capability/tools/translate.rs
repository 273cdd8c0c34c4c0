//! `translate_text`: clinical translation through the inference backend.

use std::sync::Arc;

use async_trait::async_trait;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::language::detect;
use crate::capability::{InferenceBackend, TypedToolHandler};
use crate::error::PassportError;
use crate::locale::is_undetermined;

const SYSTEM_PROMPT: &str = "You are a precise clinical translator. Translate the user's text into \
the requested target language. Keep medication names and clinical terminology intact. \
Reply with the translated text only.";

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct TranslateInput {
    pub text: String,
    #[schemars(length(min = 1))]
    pub target_locale: String,
    /// Known source language; detected from `text` when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_locale: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct TranslateOutput {
    pub text: String,
    pub source_locale: String,
}

pub struct TranslateTool {
    backend: Arc<dyn InferenceBackend>,
}

impl TranslateTool {
    pub fn new(backend: Arc<dyn InferenceBackend>) -> Self {
        Self { backend }
    }
}

#[async_trait]
impl TypedToolHandler for TranslateTool {
    type Input = TranslateInput;
    type Output = TranslateOutput;

    const NAME: &'static str = "translate_text";
    const DESCRIPTION: &'static str = "Translate text to the target locale. Returns only the translated text \
        plus the source locale (echoed when supplied, detected otherwise).";

    async fn handle(&self, input: TranslateInput) -> Result<TranslateOutput, PassportError> {
        self.backend.ensure_available()?;
        let source_locale = match input.source_locale.as_deref() {
            Some(code) if !is_undetermined(code) => code.trim().to_string(),
            _ => detect(&input.text).lang,
        };

        if input.text.trim().is_empty() {
            return Ok(TranslateOutput {
                text: String::new(),
                source_locale,
            });
        }

        let user = format!("Target language: {}\n\n---\n{}", input.target_locale, input.text);
        let text = self.backend.complete(SYSTEM_PROMPT, &user).await?;

        Ok(TranslateOutput {
            text,
            source_locale,
        })
    }
}
