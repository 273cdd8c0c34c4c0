use async_trait::async_trait;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::agent::{AgentContext, Skill};
use crate::capability::tools::{Detection, OcrOutput};
use crate::error::PassportError;
use crate::locale::{primary_language, UNDETERMINED};

const LANGUAGE_PROMPT: &str = "Identify the language of the user's text. Reply with its ISO 639-1 code \
only (for example 'ar' or 'en'), or 'und' if you cannot tell.";

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct IntakeInput {
    /// Scanned document, as a path the capability server can read.
    #[schemars(length(min = 1))]
    pub document_path: String,
    /// OCR language code (e.g. `ara`, `eng`).
    #[schemars(length(min = 1))]
    pub locale_hint: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct IntakeMetadata {
    pub source: String,
    pub used_lang: String,
    pub detection_confidence: f64,
    /// `heuristic` or `reasoning`.
    pub detected_by: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct IntakeOutput {
    pub source_text: String,
    pub patient_lang: String,
    pub metadata: IntakeMetadata,
}

/// OCR the document, then identify the patient's language.
pub struct IntakeSkill;

/// First token of a reasoning reply, if it looks like a language code.
fn language_from_reply(reply: &str) -> Option<String> {
    let token: String = reply
        .split_whitespace()
        .next()?
        .chars()
        .filter(|c| c.is_ascii_alphabetic() || *c == '-')
        .collect();
    let primary = primary_language(&token);
    let valid = (2..=3).contains(&primary.len()) && primary != UNDETERMINED;
    valid.then_some(primary)
}

#[async_trait]
impl Skill for IntakeSkill {
    type Input = IntakeInput;
    type Output = IntakeOutput;

    fn name(&self) -> &str {
        "intake"
    }

    fn description(&self) -> &str {
        "OCR a scanned clinical document and detect the patient's language."
    }

    fn tags(&self) -> Vec<String> {
        vec!["ocr".into(), "language-detection".into()]
    }

    fn required_tools(&self) -> &'static [&'static str] {
        &["ocr_image", "detect_language"]
    }

    async fn run(&self, ctx: &AgentContext, input: IntakeInput) -> Result<IntakeOutput, PassportError> {
        let ocr: OcrOutput = ctx
            .call_tool_as(
                "ocr_image",
                json!({ "file_path": input.document_path, "locale_hint": input.locale_hint }),
            )
            .await?;

        let detection: Detection = ctx
            .call_tool_as("detect_language", json!({ "text": ocr.text }))
            .await?;

        let mut patient_lang = detection.lang;
        let mut detected_by = "heuristic";
        if patient_lang == UNDETERMINED && !ocr.text.trim().is_empty() {
            if let Some(reply) = ctx.reason(LANGUAGE_PROMPT, &ocr.text).await? {
                if let Some(lang) = language_from_reply(&reply) {
                    patient_lang = lang;
                    detected_by = "reasoning";
                }
            }
        }

        Ok(IntakeOutput {
            source_text: ocr.text,
            patient_lang,
            metadata: IntakeMetadata {
                source: ocr.metadata.source,
                used_lang: ocr.metadata.used_lang,
                detection_confidence: detection.confidence,
                detected_by: detected_by.to_string(),
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_language_from_reply() {
        assert_eq!(language_from_reply("fa").as_deref(), Some("fa"));
        assert_eq!(language_from_reply("'ar'.").as_deref(), Some("ar"));
        assert_eq!(language_from_reply("ara").as_deref(), Some("ar"));
        assert_eq!(language_from_reply("und"), None);
        assert_eq!(language_from_reply("I think it is Farsi"), None);
        assert_eq!(language_from_reply(""), None);
    }
}
