//! Default tool providers.
//!
//! | Tool                     | Provider                               |
//! |--------------------------|----------------------------------------|
//! | `ocr_image`              | tesseract child process                |
//! | `detect_language`        | script / stop-word heuristic           |
//! | `translate_text`         | inference backend                      |
//! | `clinical_parse_to_fhir` | inference backend, strict JSON         |
//! | `risk_assessment`        | inference backend, `- ` bullet risks   |
//! | `render_referral`        | HTML + plain-text files on disk        |

pub mod clinical;
pub mod language;
pub mod ocr;
pub mod render;
pub mod risk;
pub mod translate;

use std::sync::Arc;

pub use clinical::{ClinicalParseInput, ClinicalParseOutput, ClinicalParseTool};
pub use language::{DetectLanguageInput, Detection, LanguageCandidate, LanguageDetector};
pub use ocr::{OcrInput, OcrMetadata, OcrOutput, OcrTool};
pub use render::{RenderInput, RenderOutput, RenderReferralTool};
pub use risk::{RiskAssessmentTool, RiskInput, RiskOutput};
pub use translate::{TranslateInput, TranslateOutput, TranslateTool};

use super::{CapabilityServer, CapabilityServerBuilder, InferenceBackend};
use crate::config::PassportConfig;
use crate::error::PassportError;

/// Builder pre-loaded with every default tool.
pub fn default_tools(
    config: &PassportConfig,
    backend: Arc<dyn InferenceBackend>,
) -> CapabilityServerBuilder {
    CapabilityServer::builder("MedicalPassport-Capabilities")
        .default_timeout(config.tool_timeout)
        .register_typed(OcrTool::new(config.tesseract.clone()))
        .register_typed(LanguageDetector)
        .register_typed(TranslateTool::new(backend.clone()))
        .register_typed(ClinicalParseTool::new(backend.clone()))
        .register_typed(RiskAssessmentTool::new(backend))
        .register_typed(RenderReferralTool::new(config.output_dir.clone()))
}

pub fn default_capability_server(
    config: &PassportConfig,
    backend: Arc<dyn InferenceBackend>,
) -> Result<CapabilityServer, PassportError> {
    default_tools(config, backend).build()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capability::ChatCompletionsBackend;
    use std::collections::HashMap;

    #[tokio::test]
    async fn test_default_server_lists_all_tools() {
        let env: HashMap<&str, &str> = HashMap::new();
        let config = PassportConfig::from_lookup(&|k| env.get(k).map(|v| v.to_string()));
        let backend = Arc::new(ChatCompletionsBackend::new(&config.inference));
        let server = default_capability_server(&config, backend).unwrap();

        let names: Vec<String> = server.list_tools().into_iter().map(|t| t.name).collect();
        assert_eq!(
            names,
            vec![
                "clinical_parse_to_fhir",
                "detect_language",
                "ocr_image",
                "render_referral",
                "risk_assessment",
                "translate_text",
            ]
        );

        // LLM-backed tools fail cleanly without a credential.
        let err = server
            .call_tool("translate_text", serde_json::json!({"text": "hola", "target_locale": "en"}))
            .await
            .unwrap_err();
        assert!(matches!(err, PassportError::Upstream { .. }));

        let detected = server
            .call_tool("detect_language", serde_json::json!({"text": ""}))
            .await
            .unwrap();
        assert_eq!(detected["lang"], "und");
    }
}
