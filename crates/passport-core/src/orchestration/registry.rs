//! Skill name → agent endpoint resolution.

use std::collections::{BTreeMap, HashMap};
use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::pipeline::{resolve_env_vars, PipelineDefinition};
use super::transport::AgentTransport;
use crate::config::PassportConfig;
use crate::envelope::CapabilityDescriptor;
use crate::error::PassportError;

/// Base URL (or in-process key) of an agent service.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Endpoint(String);

impl Endpoint {
    pub fn new(url: impl Into<String>) -> Self {
        Self(url.into().trim_end_matches('/').to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// `path` appended to the base, e.g. `join("/invoke")`.
    pub fn join(&self, path: &str) -> String {
        format!("{}/{}", self.0, path.trim_start_matches('/'))
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Endpoint {
    fn from(url: &str) -> Self {
        Endpoint::new(url)
    }
}

#[async_trait]
pub trait Registry: Send + Sync {
    async fn resolve(&self, skill: &str) -> Result<Endpoint, PassportError>;
}

// ─── Static table ───────────────────────────────────────────────────────

/// Fixed skill → endpoint table.
#[derive(Debug, Clone, Default)]
pub struct StaticRegistry {
    endpoints: BTreeMap<String, Endpoint>,
}

impl StaticRegistry {
    pub fn new<I, S, E>(entries: I) -> Self
    where
        I: IntoIterator<Item = (S, E)>,
        S: Into<String>,
        E: Into<Endpoint>,
    {
        Self {
            endpoints: entries
                .into_iter()
                .map(|(skill, endpoint)| (skill.into(), endpoint.into()))
                .collect(),
        }
    }

    /// Endpoints for every stage of `definition`: the stage's own
    /// `endpoint` (env references expanded) or else the configured URL.
    pub fn from_definition(definition: &PipelineDefinition, config: &PassportConfig) -> Self {
        let mut endpoints = BTreeMap::new();
        for stage in &definition.stages {
            let url = stage
                .endpoint
                .as_deref()
                .map(resolve_env_vars)
                .or_else(|| config.agent_url(&stage.skill).map(str::to_string));
            if let Some(url) = url {
                endpoints.insert(stage.skill.clone(), Endpoint::new(url));
            }
        }
        Self { endpoints }
    }

    pub fn insert(&mut self, skill: impl Into<String>, endpoint: impl Into<Endpoint>) {
        self.endpoints.insert(skill.into(), endpoint.into());
    }

    pub fn entries(&self) -> impl Iterator<Item = (&str, &Endpoint)> {
        self.endpoints.iter().map(|(skill, ep)| (skill.as_str(), ep))
    }
}

impl From<Endpoint> for String {
    fn from(endpoint: Endpoint) -> Self {
        endpoint.0
    }
}

impl From<String> for Endpoint {
    fn from(url: String) -> Self {
        Endpoint::new(url)
    }
}

#[async_trait]
impl Registry for StaticRegistry {
    async fn resolve(&self, skill: &str) -> Result<Endpoint, PassportError> {
        self.endpoints
            .get(skill)
            .cloned()
            .ok_or_else(|| PassportError::NotFound(format!("no endpoint registered for skill '{}'", skill)))
    }
}

// ─── Discovery ──────────────────────────────────────────────────────────

/// Registry built by asking candidate endpoints what they serve. Several
/// endpoints may serve the same skill; the first discovered is primary and
/// the rest act as fallbacks.
#[derive(Debug, Clone, Default)]
pub struct DiscoveryRegistry {
    table: HashMap<String, Vec<(Endpoint, CapabilityDescriptor)>>,
}

impl DiscoveryRegistry {
    /// Probe every candidate. Unreachable candidates are logged and skipped.
    pub async fn discover(
        transport: &dyn AgentTransport,
        candidates: impl IntoIterator<Item = Endpoint>,
    ) -> Self {
        let mut table: HashMap<String, Vec<(Endpoint, CapabilityDescriptor)>> = HashMap::new();
        for endpoint in candidates {
            match transport.discover(&endpoint).await {
                Ok(descriptor) => {
                    tracing::info!(
                        "[Orchestrator] Discovered '{}' v{} at {}",
                        descriptor.skill_name,
                        descriptor.version,
                        endpoint
                    );
                    table
                        .entry(descriptor.skill_name.clone())
                        .or_default()
                        .push((endpoint, descriptor));
                }
                Err(err) => {
                    tracing::warn!("[Orchestrator] Skipping {}: {}", endpoint, err);
                }
            }
        }
        Self { table }
    }

    pub fn descriptors(&self) -> Vec<&CapabilityDescriptor> {
        let mut all: Vec<&CapabilityDescriptor> = self
            .table
            .values()
            .flat_map(|entries| entries.iter().map(|(_, d)| d))
            .collect();
        all.sort_by(|a, b| a.skill_name.cmp(&b.skill_name));
        all
    }

    pub fn endpoints_for(&self, skill: &str) -> Vec<Endpoint> {
        self.table
            .get(skill)
            .map(|entries| entries.iter().map(|(ep, _)| ep.clone()).collect())
            .unwrap_or_default()
    }
}

#[async_trait]
impl Registry for DiscoveryRegistry {
    async fn resolve(&self, skill: &str) -> Result<Endpoint, PassportError> {
        self.endpoints_for(skill)
            .into_iter()
            .next()
            .ok_or_else(|| PassportError::NotFound(format!("no agent discovered for skill '{}'", skill)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_endpoint_join_normalizes_slashes() {
        let ep = Endpoint::new("http://127.0.0.1:41241/");
        assert_eq!(ep.as_str(), "http://127.0.0.1:41241");
        assert_eq!(ep.join("/invoke"), "http://127.0.0.1:41241/invoke");
        assert_eq!(
            ep.join(".well-known/agent-card.json"),
            "http://127.0.0.1:41241/.well-known/agent-card.json"
        );
    }

    #[tokio::test]
    async fn test_static_registry_resolves_known_skills() {
        let registry = StaticRegistry::new([("intake", "http://a"), ("translate", "http://b")]);
        assert_eq!(registry.resolve("translate").await.unwrap().as_str(), "http://b");
        assert!(matches!(
            registry.resolve("summarize").await,
            Err(PassportError::NotFound(_))
        ));
    }

    #[test]
    fn test_from_definition_prefers_stage_endpoint() {
        let config = PassportConfig::from_lookup(&|key| match key {
            "TRANSLATE_URL" => Some("http://config-translate".into()),
            _ => None,
        });
        let mut definition = PipelineDefinition::medical_passport();
        definition.stages[0].endpoint = Some("http://stage-intake".into());
        definition.stages[1].endpoint = None;

        let registry = StaticRegistry::from_definition(&definition, &config);
        let table: BTreeMap<&str, &str> = registry.entries().map(|(s, e)| (s, e.as_str())).collect();
        assert_eq!(table["intake"], "http://stage-intake");
        assert_eq!(table["translate"], "http://config-translate");
        assert_eq!(table.len(), 6);
    }
}
