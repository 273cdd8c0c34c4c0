//! How agents reach the capability server: in-process or over JSON-RPC.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};

use super::rpc::{JsonRpcRequest, JsonRpcResponse};
use super::{CapabilityServer, ToolSpec};
use crate::error::PassportError;

#[async_trait]
pub trait ToolClient: Send + Sync {
    async fn list_tools(&self) -> Result<Vec<ToolSpec>, PassportError>;
    async fn call_tool(&self, name: &str, input: Value) -> Result<Value, PassportError>;
}

#[async_trait]
impl ToolClient for CapabilityServer {
    async fn list_tools(&self) -> Result<Vec<ToolSpec>, PassportError> {
        Ok(CapabilityServer::list_tools(self))
    }

    async fn call_tool(&self, name: &str, input: Value) -> Result<Value, PassportError> {
        CapabilityServer::call_tool(self, name, input).await
    }
}

#[derive(Deserialize)]
struct ToolList {
    tools: Vec<ToolSpec>,
}

/// JSON-RPC client for a remote capability server's `/mcp` endpoint.
pub struct HttpToolClient {
    client: reqwest::Client,
    rpc_url: String,
    next_id: AtomicU64,
}

impl HttpToolClient {
    /// `base_url` is the server root, e.g. `http://127.0.0.1:8000`.
    pub fn new(base_url: &str, timeout: Duration) -> Self {
        Self {
            client: reqwest::Client::builder()
                .timeout(timeout)
                .build()
                .unwrap_or_else(|_| reqwest::Client::new()),
            rpc_url: format!("{}/mcp", base_url.trim_end_matches('/')),
            next_id: AtomicU64::new(1),
        }
    }

    async fn request(&self, method: &str, params: Value) -> Result<Value, PassportError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let request = JsonRpcRequest::new(id, method, params);

        let response = self
            .client
            .post(&self.rpc_url)
            .json(&request)
            .send()
            .await
            .map_err(|e| PassportError::from_reqwest(e, "capability server"))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| PassportError::from_reqwest(e, "capability server"))?;

        let rpc: JsonRpcResponse = serde_json::from_str(&text).map_err(|_| PassportError::Upstream {
            status: Some(status.as_u16()),
            detail: format!("capability server returned a non JSON-RPC body: {}", text),
        })?;
        rpc.into_result()
    }
}

#[async_trait]
impl ToolClient for HttpToolClient {
    async fn list_tools(&self) -> Result<Vec<ToolSpec>, PassportError> {
        let result = self.request("tools/list", json!({})).await?;
        let list: ToolList = serde_json::from_value(result).map_err(|e| {
            PassportError::upstream(format!("malformed tools/list result: {}", e))
        })?;
        Ok(list.tools)
    }

    async fn call_tool(&self, name: &str, input: Value) -> Result<Value, PassportError> {
        self.request("tools/call", json!({ "name": name, "arguments": input }))
            .await
    }
}
