//! Agent Service: one pipeline stage behind a uniform discover / invoke
//! contract.
//!
//! A stage's behaviour is a [`Skill`]: typed input, typed output, the tools
//! it needs and an async `run`. [`AgentService`] wraps a skill with its
//! published [`CapabilityDescriptor`], schema validation on both sides, and
//! stage-tagged error reporting.

pub mod skills;

use std::sync::Arc;

use async_trait::async_trait;
use schemars::JsonSchema;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

use crate::capability::{InferenceBackend, ToolClient};
use crate::envelope::{
    check_document_version, CapabilityDescriptor, InvocationRequest, InvocationResponse,
    DOCUMENT_VERSION,
};
use crate::error::PassportError;
use crate::schema::{schema_of, SchemaValidator};

pub use skills::{build_agent, StageKind};

#[async_trait]
pub trait Skill: Send + Sync + 'static {
    type Input: DeserializeOwned + JsonSchema + Send;
    type Output: Serialize + JsonSchema + Send;

    fn name(&self) -> &str;

    fn description(&self) -> &str;

    fn version(&self) -> &str {
        "1.0.0"
    }

    fn tags(&self) -> Vec<String> {
        Vec::new()
    }

    /// Tools that must be advertised by the capability server.
    fn required_tools(&self) -> &'static [&'static str] {
        &[]
    }

    /// Published output schema. Skills with untyped output override this
    /// to state which fields they guarantee.
    fn output_schema(&self) -> Value {
        schema_of::<Self::Output>()
    }

    async fn run(&self, ctx: &AgentContext, input: Self::Input) -> Result<Self::Output, PassportError>;
}

// ─── Context ────────────────────────────────────────────────────────────

/// What a skill can reach while running: the capability server and, when
/// configured, a reasoning backend.
#[derive(Clone)]
pub struct AgentContext {
    stage: String,
    tools: Arc<dyn ToolClient>,
    reasoning: Option<Arc<dyn InferenceBackend>>,
}

impl AgentContext {
    pub fn new(
        stage: impl Into<String>,
        tools: Arc<dyn ToolClient>,
        reasoning: Option<Arc<dyn InferenceBackend>>,
    ) -> Self {
        Self {
            stage: stage.into(),
            tools,
            reasoning,
        }
    }

    pub fn stage(&self) -> &str {
        &self.stage
    }

    pub fn tools(&self) -> &Arc<dyn ToolClient> {
        &self.tools
    }

    pub async fn call_tool(&self, tool: &str, input: Value) -> Result<Value, PassportError> {
        tracing::info!("[Agent] {} → tool {}", self.stage, tool);
        let started = std::time::Instant::now();
        let result = self.tools.call_tool(tool, input).await;
        match &result {
            Ok(_) => tracing::debug!(
                "[Agent] {} ← tool {} ({}ms)",
                self.stage,
                tool,
                started.elapsed().as_millis()
            ),
            Err(err) => tracing::warn!("[Agent] {} ← tool {} failed: {}", self.stage, tool, err),
        }
        result
    }

    /// Call a tool and decode its result.
    pub async fn call_tool_as<T: DeserializeOwned>(
        &self,
        tool: &str,
        input: impl Serialize + Send,
    ) -> Result<T, PassportError> {
        let input = serde_json::to_value(input)
            .map_err(|e| PassportError::Internal(format!("encoding input for '{}': {}", tool, e)))?;
        let output = self.call_tool(tool, input).await?;
        serde_json::from_value(output).map_err(|e| {
            PassportError::upstream(format!("tool '{}' returned an unexpected shape: {}", tool, e))
        })
    }

    /// Direct reasoning call; `None` when no backend is configured.
    pub async fn reason(&self, system: &str, user: &str) -> Result<Option<String>, PassportError> {
        match &self.reasoning {
            Some(backend) => backend.complete(system, user).await.map(Some),
            None => Ok(None),
        }
    }
}

// ─── Type erasure ───────────────────────────────────────────────────────

#[async_trait]
trait StageHandler: Send + Sync {
    async fn handle(&self, ctx: &AgentContext, payload: Value) -> Result<Value, PassportError>;
}

struct SkillHandler<S>(S);

#[async_trait]
impl<S: Skill> StageHandler for SkillHandler<S> {
    async fn handle(&self, ctx: &AgentContext, payload: Value) -> Result<Value, PassportError> {
        let input: S::Input = serde_json::from_value(payload)
            .map_err(|e| PassportError::SchemaValidation(format!("input: {}", e)))?;
        let output = self.0.run(ctx, input).await?;
        serde_json::to_value(output)
            .map_err(|e| PassportError::Internal(format!("encoding output: {}", e)))
    }
}

// ─── Service ────────────────────────────────────────────────────────────

pub struct AgentService {
    descriptor: CapabilityDescriptor,
    handler: Arc<dyn StageHandler>,
    required_tools: &'static [&'static str],
    input: SchemaValidator,
    output: SchemaValidator,
    context: AgentContext,
}

impl AgentService {
    pub fn new<S: Skill>(
        skill: S,
        endpoint: impl Into<String>,
        tools: Arc<dyn ToolClient>,
        reasoning: Option<Arc<dyn InferenceBackend>>,
    ) -> Result<Self, PassportError> {
        let input_schema = schema_of::<S::Input>();
        let output_schema = skill.output_schema();
        let descriptor = CapabilityDescriptor {
            document_version: DOCUMENT_VERSION.to_string(),
            skill_name: skill.name().to_string(),
            version: skill.version().to_string(),
            description: skill.description().to_string(),
            endpoint: endpoint.into(),
            input_schema: input_schema.clone(),
            output_schema: output_schema.clone(),
            tags: skill.tags(),
        };
        Ok(Self {
            input: SchemaValidator::compile(&input_schema)?,
            output: SchemaValidator::compile(&output_schema)?,
            context: AgentContext::new(skill.name(), tools, reasoning),
            required_tools: skill.required_tools(),
            handler: Arc::new(SkillHandler(skill)),
            descriptor,
        })
    }

    /// The descriptor published at `/.well-known/agent-card.json`.
    pub fn discover(&self) -> &CapabilityDescriptor {
        &self.descriptor
    }

    pub fn skill_name(&self) -> &str {
        &self.descriptor.skill_name
    }

    pub fn required_tools(&self) -> &'static [&'static str] {
        self.required_tools
    }

    /// Verify the capability server advertises every tool this skill uses.
    pub async fn check_tools(&self) -> Result<(), PassportError> {
        let advertised = self.context.tools.list_tools().await?;
        let missing: Vec<&str> = self
            .required_tools
            .iter()
            .copied()
            .filter(|name| !advertised.iter().any(|t| t.name == *name))
            .collect();
        if !missing.is_empty() {
            return Err(PassportError::NotFound(format!(
                "capability server does not advertise tools required by '{}': {}",
                self.skill_name(),
                missing.join(", ")
            )));
        }
        Ok(())
    }

    /// Validate, run the skill, validate the result. Errors carry the
    /// stage name.
    pub async fn invoke(&self, payload: Value) -> Result<Value, PassportError> {
        let stage = self.skill_name();
        self.input
            .validate(&payload, "input")
            .map_err(|e| PassportError::stage(stage, e))?;

        let output = self
            .handler
            .handle(&self.context, payload)
            .await
            .map_err(|e| PassportError::stage(stage, e))?;

        self.output
            .validate(&output, "output")
            .map_err(|e| PassportError::stage(stage, e))?;
        Ok(output)
    }

    /// Envelope entry point behind `POST /invoke`.
    pub async fn handle(&self, request: InvocationRequest) -> InvocationResponse {
        if let Err(err) = check_document_version(&request.envelope_version) {
            return InvocationResponse::failure(err.to_body());
        }
        if request.skill != self.skill_name() {
            let err = PassportError::NotFound(format!(
                "skill '{}' is not served here (this agent serves '{}')",
                request.skill,
                self.skill_name()
            ));
            return InvocationResponse::failure(err.to_body());
        }

        tracing::info!(
            "[Agent] {} invoked (run: {}, task: {})",
            self.skill_name(),
            request.run_id.as_deref().unwrap_or("-"),
            request.task_id.as_deref().unwrap_or("-")
        );
        let result = self.invoke(request.payload).await;
        if let Err(err) = &result {
            tracing::warn!("[Agent] {} failed: {}", self.skill_name(), err);
        }
        InvocationResponse::from_result(result)
    }
}
