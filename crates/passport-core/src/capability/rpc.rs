//! JSON-RPC 2.0 protocol types used by the capability server's `/mcp`
//! endpoint.
//!
//! These types are defined standalone (not tied to axum or any HTTP framework)
//! so they can be serialized/deserialized in any transport context.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{ErrorBody, PassportError};

/// JSON-RPC 2.0 request object.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcRequest {
    /// Must be "2.0".
    pub jsonrpc: String,
    /// Request identifier: number or string. `None` for notifications.
    #[serde(default)]
    pub id: Option<Value>,
    /// Method name, e.g. `"tools/call"`.
    pub method: String,
    #[serde(default)]
    pub params: Option<Value>,
}

impl JsonRpcRequest {
    pub fn new(id: u64, method: impl Into<String>, params: Value) -> Self {
        Self {
            jsonrpc: "2.0".into(),
            id: Some(Value::from(id)),
            method: method.into(),
            params: Some(params),
        }
    }
}

/// JSON-RPC 2.0 response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcResponse {
    /// Always "2.0".
    pub jsonrpc: String,
    /// Echoed from the request.
    pub id: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<JsonRpcError>,
}

/// JSON-RPC 2.0 error object.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcError {
    pub code: i64,
    pub message: String,
    /// Structured `ErrorBody` for application errors.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

// ---------------------------------------------------------------------------
// Standard JSON-RPC 2.0 error codes
// ---------------------------------------------------------------------------

pub const PARSE_ERROR: i64 = -32700;
pub const INVALID_REQUEST: i64 = -32600;
pub const METHOD_NOT_FOUND: i64 = -32601;
pub const INVALID_PARAMS: i64 = -32602;
pub const INTERNAL_ERROR: i64 = -32603;

// Application-defined error codes (server range: -32000 to -32099)
pub const NOT_FOUND: i64 = -32001;
pub const SCHEMA_VALIDATION: i64 = -32002;
pub const UPSTREAM: i64 = -32003;
pub const TIMEOUT: i64 = -32004;
pub const CANCELLED: i64 = -32005;

/// JSON-RPC code for a domain error.
pub fn code_for(err: &PassportError) -> i64 {
    match err.root_cause() {
        PassportError::NotFound(_) => NOT_FOUND,
        PassportError::SchemaValidation(_) => SCHEMA_VALIDATION,
        PassportError::Upstream { .. } => UPSTREAM,
        PassportError::Timeout(_) => TIMEOUT,
        PassportError::Cancelled(_) => CANCELLED,
        _ => INTERNAL_ERROR,
    }
}

impl JsonRpcResponse {
    pub fn success(id: Option<Value>, result: Value) -> Self {
        Self {
            jsonrpc: "2.0".into(),
            id,
            result: Some(result),
            error: None,
        }
    }

    pub fn error(id: Option<Value>, code: i64, message: impl Into<String>) -> Self {
        Self {
            jsonrpc: "2.0".into(),
            id,
            result: None,
            error: Some(JsonRpcError {
                code,
                message: message.into(),
                data: None,
            }),
        }
    }

    /// Error response carrying the full `ErrorBody` in `data`.
    pub fn from_error(id: Option<Value>, err: &PassportError) -> Self {
        Self {
            jsonrpc: "2.0".into(),
            id,
            result: None,
            error: Some(JsonRpcError {
                code: code_for(err),
                message: err.to_string(),
                data: serde_json::to_value(err.to_body()).ok(),
            }),
        }
    }

    /// Unwrap into the domain result, rebuilding structured errors.
    pub fn into_result(self) -> Result<Value, PassportError> {
        if let Some(error) = self.error {
            if let Some(body) = error
                .data
                .and_then(|data| serde_json::from_value::<ErrorBody>(data).ok())
            {
                return Err(PassportError::from(body));
            }
            return Err(match error.code {
                NOT_FOUND | METHOD_NOT_FOUND => PassportError::NotFound(error.message),
                SCHEMA_VALIDATION | INVALID_PARAMS => {
                    PassportError::SchemaValidation(error.message)
                }
                TIMEOUT => PassportError::Timeout(error.message),
                _ => PassportError::upstream(error.message),
            });
        }
        self.result
            .ok_or_else(|| PassportError::upstream("JSON-RPC response has no result"))
    }
}
