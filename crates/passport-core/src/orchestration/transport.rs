//! How the orchestrator talks to agent services.
//!
//! `HttpAgentTransport` speaks the HTTP binding (`GET
//! /.well-known/agent-card.json`, `POST /invoke`); `LocalAgentTransport`
//! calls in-process [`AgentService`]s through the same envelopes, so the
//! orchestrator behaves identically in tests and single-process mode.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;

use super::registry::Endpoint;
use crate::agent::AgentService;
use crate::envelope::{CapabilityDescriptor, InvocationRequest, InvocationResponse};
use crate::error::PassportError;

pub const AGENT_CARD_PATH: &str = "/.well-known/agent-card.json";
pub const INVOKE_PATH: &str = "/invoke";

#[async_trait]
pub trait AgentTransport: Send + Sync {
    async fn discover(&self, endpoint: &Endpoint) -> Result<CapabilityDescriptor, PassportError>;

    async fn invoke(
        &self,
        endpoint: &Endpoint,
        request: InvocationRequest,
        timeout: Duration,
    ) -> Result<Value, PassportError>;
}

// ─── HTTP ───────────────────────────────────────────────────────────────

#[derive(Clone)]
pub struct HttpAgentTransport {
    client: reqwest::Client,
}

impl Default for HttpAgentTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl HttpAgentTransport {
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::new(),
        }
    }

    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl AgentTransport for HttpAgentTransport {
    async fn discover(&self, endpoint: &Endpoint) -> Result<CapabilityDescriptor, PassportError> {
        let url = endpoint.join(AGENT_CARD_PATH);
        let response = self
            .client
            .get(&url)
            .timeout(Duration::from_secs(10))
            .send()
            .await
            .map_err(|e| PassportError::from_reqwest(e, &url))?;

        let status = response.status();
        if status == reqwest::StatusCode::NOT_FOUND {
            return Err(PassportError::NotFound(format!("no agent card at {}", url)));
        }
        if !status.is_success() {
            return Err(PassportError::Upstream {
                status: Some(status.as_u16()),
                detail: format!("agent card request to {} failed", url),
            });
        }

        let descriptor: CapabilityDescriptor = response
            .json()
            .await
            .map_err(|e| PassportError::from_reqwest(e, &url))?;
        descriptor.validate()?;
        Ok(descriptor)
    }

    async fn invoke(
        &self,
        endpoint: &Endpoint,
        request: InvocationRequest,
        timeout: Duration,
    ) -> Result<Value, PassportError> {
        let url = endpoint.join(INVOKE_PATH);
        let response = self
            .client
            .post(&url)
            .timeout(timeout)
            .json(&request)
            .send()
            .await
            .map_err(|e| PassportError::from_reqwest(e, &url))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| PassportError::from_reqwest(e, &url))?;

        // Agents answer failures with an envelope too, whatever the status.
        match serde_json::from_str::<InvocationResponse>(&text) {
            Ok(envelope) => envelope.into_result(),
            Err(_) => Err(PassportError::Upstream {
                status: Some(status.as_u16()),
                detail: format!("{} returned a non-envelope body: {}", url, truncate(&text, 200)),
            }),
        }
    }
}

fn truncate(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        text.to_string()
    } else {
        let head: String = text.chars().take(max_chars).collect();
        format!("{}…", head)
    }
}

// ─── In-process ─────────────────────────────────────────────────────────

/// Routes endpoints to in-process agent services.
#[derive(Clone, Default)]
pub struct LocalAgentTransport {
    agents: HashMap<Endpoint, Arc<AgentService>>,
}

impl LocalAgentTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_agent(mut self, endpoint: impl Into<Endpoint>, agent: Arc<AgentService>) -> Self {
        self.agents.insert(endpoint.into(), agent);
        self
    }

    fn agent(&self, endpoint: &Endpoint) -> Result<&Arc<AgentService>, PassportError> {
        self.agents
            .get(endpoint)
            .ok_or_else(|| PassportError::upstream(format!("no agent listening at {}", endpoint)))
    }
}

#[async_trait]
impl AgentTransport for LocalAgentTransport {
    async fn discover(&self, endpoint: &Endpoint) -> Result<CapabilityDescriptor, PassportError> {
        let agent = self.agent(endpoint)?;
        Ok(agent.discover().clone())
    }

    async fn invoke(
        &self,
        endpoint: &Endpoint,
        request: InvocationRequest,
        timeout: Duration,
    ) -> Result<Value, PassportError> {
        let agent = self.agent(endpoint)?.clone();
        let skill = request.skill.clone();
        match tokio::time::timeout(timeout, agent.handle(request)).await {
            Ok(response) => response.into_result(),
            Err(_) => Err(PassportError::Timeout(format!(
                "stage '{}' did not answer within {}s",
                skill,
                timeout.as_secs_f64()
            ))),
        }
    }
}
