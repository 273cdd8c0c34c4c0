//! Environment-driven configuration shared by every service.

use std::collections::BTreeMap;
use std::env;
use std::path::PathBuf;
use std::time::Duration;

const DEFAULT_CAPABILITY_URL: &str = "http://127.0.0.1:8000";
const DEFAULT_ORCHESTRATOR_URL: &str = "http://127.0.0.1:41246";
const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";
const DEFAULT_MODEL: &str = "o4-mini";
const DEFAULT_TOOL_TIMEOUT_SECS: u64 = 180;
const DEFAULT_STAGE_TIMEOUT_SECS: u64 = 240;
const DEFAULT_OUTPUT_DIR: &str = "data/outputs";
const DEFAULT_TESSERACT: &str = "tesseract";

/// `(skill, env var, default port)` for every stage agent.
pub const AGENT_ENDPOINTS: &[(&str, &str, u16)] = &[
    ("intake", "INTAKE_URL", 41241),
    ("translate", "TRANSLATE_URL", 41242),
    ("structure", "STRUCTURE_URL", 41243),
    ("summarize", "SUMMARIZER_URL", 41244),
    ("referral", "REFERRAL_URL", 41245),
    ("localize", "LOCALIZE_URL", 41247),
];

#[derive(Debug, Clone)]
pub struct InferenceSettings {
    pub base_url: String,
    pub api_key: Option<String>,
    pub model: String,
    pub timeout: Duration,
}

impl InferenceSettings {
    pub fn from_env() -> Self {
        Self::from_lookup(&|key| env::var(key).ok())
    }

    fn from_lookup(lookup: &dyn Fn(&str) -> Option<String>) -> Self {
        let tool_timeout = lookup("PASSPORT_TOOL_TIMEOUT_SECS")
            .and_then(|value| value.parse::<u64>().ok())
            .unwrap_or(DEFAULT_TOOL_TIMEOUT_SECS);
        Self {
            base_url: lookup("OPENAI_BASE_URL")
                .filter(|value| !value.is_empty())
                .unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
            api_key: lookup("OPENAI_API_KEY").filter(|value| !value.is_empty()),
            model: lookup("OPENAI_MODEL")
                .filter(|value| !value.is_empty())
                .unwrap_or_else(|| DEFAULT_MODEL.to_string()),
            timeout: Duration::from_secs(tool_timeout),
        }
    }
}

#[derive(Debug, Clone)]
pub struct PassportConfig {
    pub capability_url: String,
    pub orchestrator_url: String,
    /// skill name → agent base URL
    pub agent_urls: BTreeMap<String, String>,
    pub inference: InferenceSettings,
    pub tool_timeout: Duration,
    pub stage_timeout: Duration,
    pub output_dir: PathBuf,
    pub tesseract: String,
    pub pipeline_path: Option<PathBuf>,
}

impl PassportConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(&|key| env::var(key).ok())
    }

    pub fn from_lookup(lookup: &dyn Fn(&str) -> Option<String>) -> Self {
        let non_empty = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());
        let secs = |key: &str, default: u64| {
            non_empty(key)
                .and_then(|value| value.parse::<u64>().ok())
                .unwrap_or(default)
        };

        let agent_urls = AGENT_ENDPOINTS
            .iter()
            .map(|(skill, var, port)| {
                let url = non_empty(var).unwrap_or_else(|| format!("http://127.0.0.1:{}", port));
                (skill.to_string(), url)
            })
            .collect();

        Self {
            capability_url: non_empty("PASSPORT_CAPABILITY_URL")
                .unwrap_or_else(|| DEFAULT_CAPABILITY_URL.to_string()),
            orchestrator_url: non_empty("ORCHESTRATOR_URL")
                .unwrap_or_else(|| DEFAULT_ORCHESTRATOR_URL.to_string()),
            agent_urls,
            inference: InferenceSettings::from_lookup(lookup),
            tool_timeout: Duration::from_secs(secs(
                "PASSPORT_TOOL_TIMEOUT_SECS",
                DEFAULT_TOOL_TIMEOUT_SECS,
            )),
            stage_timeout: Duration::from_secs(secs(
                "PASSPORT_STAGE_TIMEOUT_SECS",
                DEFAULT_STAGE_TIMEOUT_SECS,
            )),
            output_dir: PathBuf::from(
                non_empty("PASSPORT_OUTPUT_DIR").unwrap_or_else(|| DEFAULT_OUTPUT_DIR.to_string()),
            ),
            tesseract: non_empty("PASSPORT_TESSERACT")
                .unwrap_or_else(|| DEFAULT_TESSERACT.to_string()),
            pipeline_path: non_empty("PASSPORT_PIPELINE").map(PathBuf::from),
        }
    }

    pub fn agent_url(&self, skill: &str) -> Option<&str> {
        self.agent_urls.get(skill).map(String::as_str)
    }
}

/// Port component of a `scheme://host:port[/path]` URL.
pub fn port_of(url: &str) -> Option<u16> {
    let without_scheme = url.split_once("://").map(|(_, rest)| rest).unwrap_or(url);
    let authority = without_scheme.split('/').next()?;
    authority.rsplit_once(':')?.1.parse().ok()
}
