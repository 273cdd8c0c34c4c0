//! Workflow orchestration: pipeline definitions, endpoint resolution,
//! retry/fallback policies and the orchestrator that runs stages in order.

pub mod launch;
pub mod orchestrator;
pub mod pipeline;
pub mod policy;
pub mod registry;
pub mod run;
pub mod transport;

pub use launch::{orchestrator_descriptor, LaunchReport, LaunchRequest, ORCHESTRATE_SKILL};
pub use orchestrator::{
    check_sufficiency, Orchestrator, OrchestratorBuilder, DEFAULT_MAX_RETAINED_RUNS, DEFAULT_STAGE_TIMEOUT,
};
pub use pipeline::{resolve_env_vars, PipelineDefinition, StageDefinition};
pub use policy::{FallbackResolver, NoFallback, RetryPolicy, StaticFallback};
pub use registry::{DiscoveryRegistry, Endpoint, Registry, StaticRegistry};
pub use run::{AgentTask, RunStatus, StageFailure, TaskStatus, WorkflowRun};
pub use transport::{AgentTransport, HttpAgentTransport, LocalAgentTransport, AGENT_CARD_PATH, INVOKE_PATH};
