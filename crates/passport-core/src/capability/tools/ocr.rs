//! `ocr_image`: extract text from a scanned document with tesseract.

use async_trait::async_trait;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use tokio::process::Command;

use crate::capability::TypedToolHandler;
use crate::error::PassportError;

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct OcrInput {
    /// Path of the image on the capability server's filesystem.
    #[schemars(length(min = 1))]
    pub file_path: String,
    /// Tesseract language code passed through verbatim (e.g. `eng`, `ara`).
    #[schemars(length(min = 1))]
    pub locale_hint: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct OcrMetadata {
    pub source: String,
    pub used_lang: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct OcrOutput {
    pub text: String,
    pub metadata: OcrMetadata,
}

pub struct OcrTool {
    binary: String,
}

impl OcrTool {
    pub fn new(binary: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
        }
    }
}

#[async_trait]
impl TypedToolHandler for OcrTool {
    type Input = OcrInput;
    type Output = OcrOutput;

    const NAME: &'static str = "ocr_image";
    const DESCRIPTION: &'static str = "Run OCR on an image file and return the extracted text and metadata. \
        'locale_hint' is required and is passed directly to the OCR engine (e.g. 'eng', 'ara').";

    async fn handle(&self, input: OcrInput) -> Result<OcrOutput, PassportError> {
        let used_lang = input.locale_hint.trim().to_string();
        if used_lang.is_empty() {
            return Err(PassportError::SchemaValidation(
                "locale_hint must be a non-empty OCR language code (e.g. 'eng', 'ara')".into(),
            ));
        }

        if tokio::fs::metadata(&input.file_path).await.is_err() {
            return Err(PassportError::NotFound(format!(
                "file_path not found: {}",
                input.file_path
            )));
        }

        tracing::info!("[Tool] ocr_image {} (lang: {})", input.file_path, used_lang);

        let output = Command::new(&self.binary)
            .arg(&input.file_path)
            .arg("stdout")
            .arg("-l")
            .arg(&used_lang)
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| {
                PassportError::upstream(format!("failed to start OCR engine '{}': {}", self.binary, e))
            })?;

        if !output.status.success() {
            return Err(PassportError::upstream(format!(
                "OCR engine exited with {}: {}",
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }

        Ok(OcrOutput {
            text: String::from_utf8_lossy(&output.stdout).into_owned(),
            metadata: OcrMetadata {
                source: input.file_path,
                used_lang,
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_missing_file_is_not_found() {
        let tool = OcrTool::new("tesseract");
        let err = tool
            .handle(OcrInput {
                file_path: "/definitely/not/here.png".into(),
                locale_hint: "eng".into(),
            })
            .await
            .unwrap_err();
        assert!(matches!(err, PassportError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_blank_locale_hint_is_rejected() {
        let tool = OcrTool::new("tesseract");
        let err = tool
            .handle(OcrInput {
                file_path: "x.png".into(),
                locale_hint: "   ".into(),
            })
            .await
            .unwrap_err();
        assert!(matches!(err, PassportError::SchemaValidation(_)));
    }

    #[tokio::test]
    async fn test_missing_engine_is_upstream_error() {
        let file = tempfile::NamedTempFile::new().unwrap();
        let tool = OcrTool::new("passport-no-such-ocr-binary");
        let err = tool
            .handle(OcrInput {
                file_path: file.path().display().to_string(),
                locale_hint: "eng".into(),
            })
            .await
            .unwrap_err();
        assert!(matches!(err, PassportError::Upstream { .. }));
    }
}
