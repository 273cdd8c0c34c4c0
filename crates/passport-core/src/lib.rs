//! Passport Core: transport-agnostic logic for the Medical Passport
//! pipeline.
//!
//! A scanned clinical note becomes a bilingual referral through six stage
//! agents driven by an orchestrator. This crate holds:
//!
//! - `capability`: the tool registry (OCR, language detection,
//!   translation, clinical parsing, risk assessment, rendering) and its
//!   JSON-RPC wire form
//! - `agent`: stage skills behind the discover / invoke contract
//! - `orchestration`: pipeline definitions, registries, policies and the
//!   orchestrator
//!
//! It has **no HTTP framework dependency** by default; `passport-server`
//! binds it to axum.
//!
//! # Feature Flags
//!
//! - `axum`: Enables `IntoResponse` impl on `PassportError` for use in axum handlers.

pub mod agent;
pub mod capability;
pub mod config;
pub mod envelope;
pub mod error;
pub mod locale;
pub mod orchestration;
pub mod schema;

// Convenience re-exports
pub use agent::{build_agent, AgentService, StageKind};
pub use capability::{CapabilityServer, ToolClient};
pub use config::PassportConfig;
pub use envelope::{CapabilityDescriptor, InvocationRequest, InvocationResponse};
pub use error::{ErrorBody, ErrorCode, PassportError};
pub use orchestration::{Orchestrator, PipelineDefinition, WorkflowRun};
