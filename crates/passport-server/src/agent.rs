//! Stage agent routes.
//!
//! - `GET /.well-known/agent-card.json`: the agent's descriptor
//! - `POST /invoke`: run the stage; the body is always an envelope

use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::State,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};

use passport_core::agent::AgentService;
use passport_core::envelope::{CapabilityDescriptor, InvocationRequest};
use passport_core::orchestration::{AGENT_CARD_PATH, INVOKE_PATH};
use passport_core::PassportError;

use crate::envelope_response;

pub fn router(agent: Arc<AgentService>) -> Router {
    Router::new()
        .route(AGENT_CARD_PATH, get(agent_card))
        .route(INVOKE_PATH, post(invoke))
        .with_state(agent)
}

async fn agent_card(State(agent): State<Arc<AgentService>>) -> Json<CapabilityDescriptor> {
    Json(agent.discover().clone())
}

/// Decode an invocation envelope, mapping any failure onto a schema error.
pub(crate) fn parse_request(body: &[u8]) -> Result<InvocationRequest, PassportError> {
    serde_json::from_slice(body)
        .map_err(|e| PassportError::SchemaValidation(format!("invalid invocation envelope: {}", e)))
}

async fn invoke(State(agent): State<Arc<AgentService>>, body: Bytes) -> Response {
    let request = match parse_request(&body) {
        Ok(request) => request,
        Err(err) => return err.into_response(),
    };
    let response = agent.handle(request).await;
    envelope_response(response.into_result())
}
