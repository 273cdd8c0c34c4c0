//! Orchestrator routes.
//!
//! - `GET /.well-known/agent-card.json`: the `orchestrate` descriptor
//! - `POST /invoke`: run the pipeline to completion, reply with a
//!   [`LaunchReport`] envelope
//! - `GET /runs`, `POST /runs`: list runs, start one in the background
//! - `GET /runs/{id}`, `POST /runs/{id}/cancel`

use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde_json::Value;

use passport_core::envelope::{check_document_version, CapabilityDescriptor};
use passport_core::orchestration::{
    orchestrator_descriptor, LaunchReport, LaunchRequest, Orchestrator, WorkflowRun,
    AGENT_CARD_PATH, INVOKE_PATH, ORCHESTRATE_SKILL,
};
use passport_core::PassportError;

use crate::agent::parse_request;
use crate::envelope_response;

#[derive(Clone)]
struct OrchestratorState {
    orchestrator: Arc<Orchestrator>,
    descriptor: Arc<CapabilityDescriptor>,
}

pub fn router(orchestrator: Arc<Orchestrator>, endpoint: &str) -> Router {
    let state = OrchestratorState {
        orchestrator,
        descriptor: Arc::new(orchestrator_descriptor(endpoint)),
    };
    Router::new()
        .route(AGENT_CARD_PATH, get(agent_card))
        .route(INVOKE_PATH, post(invoke))
        .route("/runs", get(list_runs).post(start_run))
        .route("/runs/{id}", get(get_run))
        .route("/runs/{id}/cancel", post(cancel_run))
        .with_state(state)
}

async fn agent_card(State(state): State<OrchestratorState>) -> Json<CapabilityDescriptor> {
    Json(state.descriptor.as_ref().clone())
}

fn parse_launch(payload: Value) -> Result<LaunchRequest, PassportError> {
    serde_json::from_value(payload)
        .map_err(|e| PassportError::SchemaValidation(format!("invalid launch request: {}", e)))
}

/// POST /invoke: synchronous run.
async fn invoke(State(state): State<OrchestratorState>, body: Bytes) -> Response {
    envelope_response(run_to_report(&state, &body).await)
}

async fn run_to_report(state: &OrchestratorState, body: &[u8]) -> Result<Value, PassportError> {
    let request = parse_request(body)?;
    check_document_version(&request.envelope_version)?;
    if request.skill != ORCHESTRATE_SKILL {
        return Err(PassportError::NotFound(format!(
            "skill '{}' is not served here (this agent serves '{}')",
            request.skill, ORCHESTRATE_SKILL
        )));
    }

    let launch = parse_launch(request.payload)?;
    tracing::info!(
        "[Orchestrator] Launch for {} ({} → {})",
        launch.document_path,
        launch.locale_hint,
        launch.target_locale
    );
    let run = state.orchestrator.run(launch.into_context()).await?;
    let report = LaunchReport::from_run(&run)?;
    serde_json::to_value(report).map_err(|e| PassportError::Internal(e.to_string()))
}

/// GET /runs
async fn list_runs(State(state): State<OrchestratorState>) -> Json<Value> {
    let runs = state.orchestrator.list_runs().await;
    Json(serde_json::json!({ "runs": runs }))
}

/// POST /runs: body is a bare launch request; replies 202 with the run id.
async fn start_run(
    State(state): State<OrchestratorState>,
    Json(payload): Json<Value>,
) -> Result<(StatusCode, Json<Value>), PassportError> {
    let launch = parse_launch(payload)?;
    let run_id = state.orchestrator.spawn(launch.into_context()).await?;
    Ok((
        StatusCode::ACCEPTED,
        Json(serde_json::json!({ "run_id": run_id })),
    ))
}

/// GET /runs/{id}
async fn get_run(
    State(state): State<OrchestratorState>,
    Path(id): Path<String>,
) -> Result<Json<WorkflowRun>, PassportError> {
    state
        .orchestrator
        .get_run(&id)
        .await
        .map(Json)
        .ok_or_else(|| PassportError::NotFound(format!("run '{}'", id)))
}

/// POST /runs/{id}/cancel
async fn cancel_run(
    State(state): State<OrchestratorState>,
    Path(id): Path<String>,
) -> Response {
    match state.orchestrator.cancel(&id).await {
        Ok(run) => (StatusCode::ACCEPTED, Json(run)).into_response(),
        Err(err) => err.into_response(),
    }
}
