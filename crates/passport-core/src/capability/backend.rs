//! Inference backend: the language model behind translation, clinical
//! structuring, risk assessment and the intake fallback.
//!
//! `ChatCompletionsBackend` speaks the OpenAI-compatible
//! `POST {base_url}/chat/completions` protocol.

use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::config::InferenceSettings;
use crate::error::PassportError;

#[async_trait]
pub trait InferenceBackend: Send + Sync {
    /// Single-turn completion: system instructions plus one user message.
    async fn complete(&self, system: &str, user: &str) -> Result<String, PassportError>;

    /// Fails when the backend cannot serve requests at all (no credential).
    /// Tools call this before any shortcut that would skip `complete`.
    fn ensure_available(&self) -> Result<(), PassportError> {
        Ok(())
    }
}

const MISSING_KEY: &str = "OPENAI_API_KEY is not set; no inference backend is available";

/// OpenAI-compatible chat completions client.
pub struct ChatCompletionsBackend {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
    model: String,
}

impl ChatCompletionsBackend {
    pub fn new(settings: &InferenceSettings) -> Self {
        Self {
            client: reqwest::Client::builder()
                .timeout(settings.timeout)
                .build()
                .unwrap_or_else(|_| reqwest::Client::new()),
            base_url: settings.base_url.trim_end_matches('/').to_string(),
            api_key: settings.api_key.clone().filter(|k| !k.trim().is_empty()),
            model: settings.model.clone(),
        }
    }

    pub fn is_configured(&self) -> bool {
        self.api_key.is_some()
    }

    pub fn model(&self) -> &str {
        &self.model
    }
}

#[async_trait]
impl InferenceBackend for ChatCompletionsBackend {
    async fn complete(&self, system: &str, user: &str) -> Result<String, PassportError> {
        let api_key = self
            .api_key
            .as_deref()
            .ok_or_else(|| PassportError::upstream(MISSING_KEY))?;

        let url = format!("{}/chat/completions", self.base_url);
        let body = json!({
            "model": self.model,
            "messages": [
                { "role": "system", "content": system },
                { "role": "user", "content": user }
            ]
        });

        tracing::debug!("[Inference] Calling {} (model: {})", url, self.model);

        let response = self
            .client
            .post(&url)
            .bearer_auth(api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| PassportError::from_reqwest(e, "inference backend"))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| PassportError::from_reqwest(e, "inference backend"))?;

        if !status.is_success() {
            return Err(PassportError::Upstream {
                status: Some(status.as_u16()),
                detail: format!("inference backend returned {}: {}", status, text),
            });
        }

        let json: Value = serde_json::from_str(&text).map_err(|e| {
            PassportError::upstream(format!("inference backend returned invalid JSON: {}", e))
        })?;

        extract_content(&json).ok_or_else(|| {
            PassportError::upstream("inference backend response has no message content")
        })
    }

    fn ensure_available(&self) -> Result<(), PassportError> {
        if self.is_configured() {
            Ok(())
        } else {
            Err(PassportError::upstream(MISSING_KEY))
        }
    }
}

fn extract_content(json: &Value) -> Option<String> {
    json.get("choices")
        .and_then(|c| c.as_array())
        .and_then(|arr| arr.first())
        .and_then(|choice| choice.get("message"))
        .and_then(|msg| msg.get("content"))
        .and_then(|c| c.as_str())
        .map(|s| s.trim().to_string())
}

/// Default timeout for a single completion.
pub const DEFAULT_INFERENCE_TIMEOUT: Duration = Duration::from_secs(120);
