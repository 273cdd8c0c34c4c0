//! Capability Server: a registry of named tools with validated inputs and
//! outputs.
//!
//! Tools are registered once through [`CapabilityServerBuilder`]; the built
//! server is immutable and shared by reference across request handlers.
//!
//! Transport-facing entry points:
//! - `list_tools()`           → `tools/list`
//! - `call_tool(name, input)` → `tools/call`
//! - `dispatch(request)`      → any JSON-RPC request

pub mod backend;
pub mod client;
pub mod rpc;
pub mod tools;

use std::collections::BTreeMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use schemars::JsonSchema;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::error::PassportError;
use crate::schema::{schema_of, SchemaValidator};

pub use backend::{ChatCompletionsBackend, InferenceBackend};
pub use client::{HttpToolClient, ToolClient};
pub use rpc::{JsonRpcRequest, JsonRpcResponse};

pub const DEFAULT_TOOL_TIMEOUT: Duration = Duration::from_secs(180);

/// Public listing entry for one tool.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolSpec {
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub input_schema: Value,
    pub output_schema: Value,
}

// ─── Handlers ───────────────────────────────────────────────────────────

/// Untyped tool implementation.
#[async_trait]
pub trait ToolHandler: Send + Sync {
    async fn call(&self, input: Value) -> Result<Value, PassportError>;
}

/// Tool implementation with typed input / output; schemas are derived
/// from the associated types.
#[async_trait]
pub trait TypedToolHandler: Send + Sync + 'static {
    type Input: DeserializeOwned + JsonSchema + Send;
    type Output: Serialize + JsonSchema;

    const NAME: &'static str;
    const DESCRIPTION: &'static str;

    async fn handle(&self, input: Self::Input) -> Result<Self::Output, PassportError>;
}

struct Typed<H>(H);

#[async_trait]
impl<H: TypedToolHandler> ToolHandler for Typed<H> {
    async fn call(&self, input: Value) -> Result<Value, PassportError> {
        let input: H::Input = serde_json::from_value(input).map_err(|e| {
            PassportError::SchemaValidation(format!("input of tool '{}': {}", H::NAME, e))
        })?;
        let output = self.0.handle(input).await?;
        serde_json::to_value(output).map_err(|e| {
            PassportError::Internal(format!("output of tool '{}': {}", H::NAME, e))
        })
    }
}

struct FnHandler<F>(F);

#[async_trait]
impl<F, Fut> ToolHandler for FnHandler<F>
where
    F: Fn(Value) -> Fut + Send + Sync,
    Fut: Future<Output = Result<Value, PassportError>> + Send,
{
    async fn call(&self, input: Value) -> Result<Value, PassportError> {
        (self.0)(input).await
    }
}

/// Wrap an async closure as a tool handler.
pub fn handler_fn<F, Fut>(f: F) -> Arc<dyn ToolHandler>
where
    F: Fn(Value) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Value, PassportError>> + Send + 'static,
{
    Arc::new(FnHandler(f))
}

// ─── Tools ──────────────────────────────────────────────────────────────

/// A named operation with declared input and output schemas.
#[derive(Clone)]
pub struct Tool {
    pub name: String,
    pub description: String,
    pub input_schema: Value,
    pub output_schema: Value,
    /// Per-tool override of the server's default timeout.
    pub timeout: Option<Duration>,
    handler: Arc<dyn ToolHandler>,
}

impl Tool {
    pub fn new(
        name: impl Into<String>,
        handler: Arc<dyn ToolHandler>,
        input_schema: Value,
        output_schema: Value,
    ) -> Self {
        Self {
            name: name.into(),
            description: String::new(),
            input_schema,
            output_schema,
            timeout: None,
            handler,
        }
    }

    pub fn typed<H: TypedToolHandler>(handler: H) -> Self {
        Self {
            name: H::NAME.to_string(),
            description: H::DESCRIPTION.to_string(),
            input_schema: schema_of::<H::Input>(),
            output_schema: schema_of::<H::Output>(),
            timeout: None,
            handler: Arc::new(Typed(handler)),
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn spec(&self) -> ToolSpec {
        ToolSpec {
            name: self.name.clone(),
            description: self.description.clone(),
            input_schema: self.input_schema.clone(),
            output_schema: self.output_schema.clone(),
        }
    }
}

struct RegisteredTool {
    tool: Tool,
    input: SchemaValidator,
    output: SchemaValidator,
}

// ─── Server ─────────────────────────────────────────────────────────────

pub struct CapabilityServerBuilder {
    name: String,
    default_timeout: Duration,
    tools: Vec<Tool>,
}

impl CapabilityServerBuilder {
    pub fn default_timeout(mut self, timeout: Duration) -> Self {
        self.default_timeout = timeout;
        self
    }

    pub fn register(
        self,
        name: impl Into<String>,
        handler: Arc<dyn ToolHandler>,
        input_schema: Value,
        output_schema: Value,
    ) -> Self {
        self.register_tool(Tool::new(name, handler, input_schema, output_schema))
    }

    pub fn register_tool(mut self, tool: Tool) -> Self {
        self.tools.push(tool);
        self
    }

    pub fn register_typed<H: TypedToolHandler>(self, handler: H) -> Self {
        self.register_tool(Tool::typed(handler))
    }

    /// Compile every schema and freeze the registry. Duplicate names are
    /// rejected.
    pub fn build(self) -> Result<CapabilityServer, PassportError> {
        let mut tools = BTreeMap::new();
        for tool in self.tools {
            if tools.contains_key(&tool.name) {
                return Err(PassportError::Internal(format!(
                    "tool '{}' registered twice",
                    tool.name
                )));
            }
            let input = SchemaValidator::compile(&tool.input_schema)?;
            let output = SchemaValidator::compile(&tool.output_schema)?;
            tools.insert(tool.name.clone(), RegisteredTool { tool, input, output });
        }
        tracing::info!(
            "[CapabilityServer] {} ready with {} tools",
            self.name,
            tools.len()
        );
        Ok(CapabilityServer {
            name: self.name,
            default_timeout: self.default_timeout,
            tools: Arc::new(tools),
        })
    }
}

/// Immutable tool registry. Clones share the same tools.
#[derive(Clone)]
pub struct CapabilityServer {
    name: String,
    default_timeout: Duration,
    tools: Arc<BTreeMap<String, RegisteredTool>>,
}

impl CapabilityServer {
    pub fn builder(name: impl Into<String>) -> CapabilityServerBuilder {
        CapabilityServerBuilder {
            name: name.into(),
            default_timeout: DEFAULT_TOOL_TIMEOUT,
            tools: Vec::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn list_tools(&self) -> Vec<ToolSpec> {
        self.tools.values().map(|t| t.tool.spec()).collect()
    }

    pub fn has_tool(&self, name: &str) -> bool {
        self.tools.contains_key(name)
    }

    /// Look up, validate input, run the handler under its timeout, then
    /// validate output.
    pub async fn call_tool(&self, name: &str, input: Value) -> Result<Value, PassportError> {
        let entry = self
            .tools
            .get(name)
            .ok_or_else(|| PassportError::NotFound(format!("tool '{}' is not registered", name)))?;

        entry
            .input
            .validate(&input, &format!("input of tool '{}'", name))?;

        let timeout = entry.tool.timeout.unwrap_or(self.default_timeout);
        let handler = entry.tool.handler.clone();
        let started = std::time::Instant::now();
        tracing::debug!("[CapabilityServer] tools/call {}", name);

        // Run on its own task so a panicking handler surfaces as an error.
        let mut task = tokio::spawn(async move { handler.call(input).await });
        let joined = match tokio::time::timeout(timeout, &mut task).await {
            Ok(joined) => joined,
            Err(_) => {
                task.abort();
                tracing::warn!(
                    "[CapabilityServer] tool {} timed out after {:?}",
                    name,
                    timeout
                );
                return Err(PassportError::Timeout(format!(
                    "tool '{}' exceeded {}s",
                    name,
                    timeout.as_secs_f64()
                )));
            }
        };

        let output = match joined {
            Ok(Ok(output)) => output,
            Ok(Err(err)) => {
                tracing::warn!("[CapabilityServer] tool {} failed: {}", name, err);
                return Err(wrap_handler_error(name, err));
            }
            Err(join_err) => {
                return Err(PassportError::upstream(format!(
                    "tool '{}' aborted: {}",
                    name, join_err
                )));
            }
        };

        entry
            .output
            .validate(&output, &format!("output of tool '{}'", name))
            .map_err(|e| PassportError::upstream(e.to_string()))?;

        tracing::info!(
            "[CapabilityServer] tool {} completed in {}ms",
            name,
            started.elapsed().as_millis()
        );
        Ok(output)
    }

    /// Handle one JSON-RPC request (`initialize`, `tools/list`, `tools/call`).
    pub async fn dispatch(&self, request: JsonRpcRequest) -> JsonRpcResponse {
        let id = request.id.clone();
        if request.jsonrpc != "2.0" {
            return JsonRpcResponse::error(id, rpc::INVALID_REQUEST, "jsonrpc must be \"2.0\"");
        }

        match request.method.as_str() {
            "initialize" => JsonRpcResponse::success(
                id,
                json!({
                    "protocolVersion": "2024-11-05",
                    "capabilities": { "tools": {} },
                    "serverInfo": {
                        "name": self.name,
                        "version": env!("CARGO_PKG_VERSION"),
                    }
                }),
            ),
            "tools/list" => JsonRpcResponse::success(id, json!({ "tools": self.list_tools() })),
            "tools/call" => {
                let params: CallParams = match request
                    .params
                    .map(serde_json::from_value)
                    .transpose()
                {
                    Ok(Some(params)) => params,
                    Ok(None) => {
                        return JsonRpcResponse::error(id, rpc::INVALID_PARAMS, "missing params")
                    }
                    Err(e) => {
                        return JsonRpcResponse::error(
                            id,
                            rpc::INVALID_PARAMS,
                            format!("invalid params: {}", e),
                        )
                    }
                };
                match self.call_tool(&params.name, params.arguments).await {
                    Ok(output) => JsonRpcResponse::success(id, output),
                    Err(err) => JsonRpcResponse::from_error(id, &err),
                }
            }
            other => JsonRpcResponse::error(
                id,
                rpc::METHOD_NOT_FOUND,
                format!("Method not found: {}", other),
            ),
        }
    }
}

#[derive(Deserialize)]
struct CallParams {
    name: String,
    #[serde(default)]
    arguments: Value,
}

/// Structured handler errors keep their variant; anything else becomes an
/// upstream failure naming the tool.
fn wrap_handler_error(tool: &str, err: PassportError) -> PassportError {
    match err {
        PassportError::Upstream { status, detail } => PassportError::Upstream {
            status,
            detail: format!("{}: {}", tool, detail),
        },
        PassportError::Internal(msg) => PassportError::upstream(format!("{}: {}", tool, msg)),
        other => other,
    }
}
