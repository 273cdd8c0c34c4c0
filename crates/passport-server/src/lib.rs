//! Passport Server: HTTP bindings for the Medical Passport services.
//!
//! Every service is an axum router plus a `/health` route:
//! - capability server: `POST /mcp` (JSON-RPC 2.0), `GET /tools`
//! - stage agent: `GET /.well-known/agent-card.json`, `POST /invoke`
//! - orchestrator: the agent routes plus `/runs`
//!
//! The `start_*` functions bind a listener, spawn the server in the
//! background and return the address actually bound.

pub mod agent;
pub mod capability;
pub mod orchestrator;

use std::net::SocketAddr;
use std::sync::Arc;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::{Json, Router};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use passport_core::agent::{build_agent, StageKind};
use passport_core::capability::tools::default_capability_server;
use passport_core::capability::{ChatCompletionsBackend, InferenceBackend, ToolClient};
use passport_core::config::{port_of, PassportConfig};
use passport_core::envelope::InvocationResponse;
use passport_core::orchestration::{
    HttpAgentTransport, Orchestrator, PipelineDefinition, RetryPolicy, StaticRegistry,
};
use passport_core::PassportError;

/// Install the global tracing subscriber. `RUST_LOG` overrides the default
/// filter. Safe to call more than once.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "passport_core=info,passport_server=info,passport_cli=info,tower_http=info".into()
            }),
        )
        .try_init();
}

/// Add `/health`, CORS and request tracing to a service router.
pub fn with_common_layers(router: Router, server: &str) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let server = server.to_string();
    router
        .route(
            "/health",
            axum::routing::get(move || health_check(server.clone())),
        )
        .layer(cors)
        .layer(TraceLayer::new_for_http())
}

async fn health_check(server: String) -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "ok",
        "server": server,
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

/// Bind `host:port` and serve `app` on a background task.
///
/// Returns the actual address the server is listening on (useful with
/// port 0).
pub async fn serve(app: Router, host: &str, port: u16) -> Result<SocketAddr, String> {
    let addr: SocketAddr = format!("{}:{}", host, port)
        .parse()
        .map_err(|e| format!("Invalid address: {}", e))?;

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|e| format!("Failed to bind to {}: {}", addr, e))?;

    let local_addr = listener
        .local_addr()
        .map_err(|e| format!("Failed to get local address: {}", e))?;

    tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app).await {
            tracing::error!("Server error: {}", e);
        }
    });

    Ok(local_addr)
}

/// An invocation envelope with the HTTP status matching its outcome.
pub(crate) fn envelope_response(result: Result<serde_json::Value, PassportError>) -> Response {
    match result {
        Ok(value) => (StatusCode::OK, Json(InvocationResponse::success(value))).into_response(),
        Err(err) => err.into_response(),
    }
}

fn url_port(url: &str, what: &str) -> Result<u16, String> {
    port_of(url).ok_or_else(|| format!("No port in {} URL '{}'", what, url))
}

// ─── Services ───────────────────────────────────────────────────────────

/// Reasoning backend for agents, when a credential is configured.
pub fn reasoning_backend(config: &PassportConfig) -> Option<Arc<dyn InferenceBackend>> {
    let backend = ChatCompletionsBackend::new(&config.inference);
    if backend.is_configured() {
        Some(Arc::new(backend))
    } else {
        None
    }
}

/// Serve the default tools on the configured capability URL's port.
pub async fn start_capability_server(
    config: &PassportConfig,
    host: &str,
) -> Result<SocketAddr, String> {
    let backend = Arc::new(ChatCompletionsBackend::new(&config.inference));
    if !backend.is_configured() {
        tracing::warn!("[CapabilityServer] OPENAI_API_KEY is not set; inference tools will fail");
    }
    let server = default_capability_server(config, backend).map_err(|e| e.to_string())?;
    let name = server.name().to_string();
    let app = with_common_layers(capability::router(server), &name);

    let addr = serve(app, host, url_port(&config.capability_url, "capability")?).await?;
    tracing::info!("[CapabilityServer] {} listening on {}", name, addr);
    Ok(addr)
}

/// Serve one stage agent on its configured port. `tools` is how the agent
/// reaches the capability server.
pub async fn start_agent(
    stage: StageKind,
    config: &PassportConfig,
    tools: Arc<dyn ToolClient>,
    host: &str,
) -> Result<SocketAddr, String> {
    let url = config
        .agent_url(stage.as_str())
        .ok_or_else(|| format!("No URL configured for stage '{}'", stage))?
        .to_string();

    let agent = build_agent(stage, url.clone(), tools, reasoning_backend(config))
        .map_err(|e| e.to_string())?;
    if let Err(err) = agent.check_tools().await {
        // The capability server may come up later; invocations will fail
        // with the same error until it does.
        tracing::warn!("[Agent] {}: {}", stage, err);
    }

    let app = with_common_layers(agent::router(Arc::new(agent)), &format!("{}-agent", stage));
    let addr = serve(app, host, url_port(&url, stage.as_str())?).await?;
    tracing::info!("[Agent] {} listening on {}", stage, addr);
    Ok(addr)
}

/// The pipeline file named by the configuration, or the built-in pipeline.
pub fn load_pipeline(config: &PassportConfig) -> Result<PipelineDefinition, String> {
    match &config.pipeline_path {
        Some(path) => {
            PipelineDefinition::from_file(&path.to_string_lossy()).map_err(|e| e.to_string())
        }
        None => Ok(PipelineDefinition::medical_passport()),
    }
}

/// Assemble the orchestrator against the stage agents over HTTP and serve
/// it on the configured orchestrator port.
pub async fn start_orchestrator(
    config: &PassportConfig,
    retry: RetryPolicy,
    host: &str,
) -> Result<SocketAddr, String> {
    let definition = load_pipeline(config)?;
    let registry = StaticRegistry::from_definition(&definition, config);
    let orchestrator = Orchestrator::builder(
        definition,
        Arc::new(registry),
        Arc::new(HttpAgentTransport::new()),
    )
    .retry(retry)
    .stage_timeout(config.stage_timeout)
    .assemble()
    .await
    .map_err(|e| format!("Failed to assemble pipeline: {}", e))?;

    let app = with_common_layers(
        orchestrator::router(Arc::new(orchestrator), &config.orchestrator_url),
        "orchestrator",
    );
    let addr = serve(app, host, url_port(&config.orchestrator_url, "orchestrator")?).await?;
    tracing::info!("[Orchestrator] listening on {}", addr);
    Ok(addr)
}
