//! Capability server routes.
//!
//! - `POST /mcp`: JSON-RPC 2.0 (`initialize`, `tools/list`, `tools/call`)
//! - `GET /tools`: tool list for humans

use axum::{
    body::Bytes,
    extract::State,
    routing::{get, post},
    Json, Router,
};
use serde_json::Value;

use passport_core::capability::rpc::{self, JsonRpcRequest, JsonRpcResponse};
use passport_core::capability::CapabilityServer;

pub fn router(server: CapabilityServer) -> Router {
    Router::new()
        .route("/mcp", post(rpc_handler))
        .route("/tools", get(list_tools))
        .with_state(server)
}

/// POST /mcp: the body is parsed by hand so malformed requests still get
/// a JSON-RPC error back.
async fn rpc_handler(State(server): State<CapabilityServer>, body: Bytes) -> Json<JsonRpcResponse> {
    let value: Value = match serde_json::from_slice(&body) {
        Ok(value) => value,
        Err(e) => {
            return Json(JsonRpcResponse::error(
                None,
                rpc::PARSE_ERROR,
                format!("Parse error: {}", e),
            ))
        }
    };
    let id = value.get("id").cloned();
    let request: JsonRpcRequest = match serde_json::from_value(value) {
        Ok(request) => request,
        Err(e) => {
            return Json(JsonRpcResponse::error(
                id,
                rpc::INVALID_REQUEST,
                format!("Invalid request: {}", e),
            ))
        }
    };
    Json(server.dispatch(request).await)
}

/// GET /tools
async fn list_tools(State(server): State<CapabilityServer>) -> Json<Value> {
    Json(serde_json::json!({
        "server": server.name(),
        "tools": server.list_tools(),
    }))
}
