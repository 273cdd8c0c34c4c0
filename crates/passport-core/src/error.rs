//! Core error type for the Medical Passport pipeline.
//!
//! `PassportError` is returned by every fallible operation in the core
//! (tool calls, agent invocations, orchestration). It crosses process
//! boundaries as an [`ErrorBody`], which converts back into an equivalent
//! `PassportError` on the receiving side, nested stage context included.
//!
//! When the `axum` feature is enabled, it also implements `IntoResponse`
//! so it can be used directly as an axum handler error type.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum PassportError {
    #[error("Schema validation failed: {0}")]
    SchemaValidation(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Upstream error{}: {detail}", status_suffix(.status))]
    Upstream { status: Option<u16>, detail: String },

    #[error("Timed out: {0}")]
    Timeout(String),

    #[error("Stage '{stage}' failed: {source}")]
    Stage {
        stage: String,
        source: Box<PassportError>,
    },

    #[error("Pipeline halted at stage '{stage}': {source}")]
    PipelineHalt {
        stage: String,
        source: Box<PassportError>,
    },

    #[error("Cancelled: {0}")]
    Cancelled(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

fn status_suffix(status: &Option<u16>) -> String {
    match status {
        Some(code) => format!(" ({})", code),
        None => String::new(),
    }
}

impl PassportError {
    pub fn upstream(detail: impl Into<String>) -> Self {
        PassportError::Upstream {
            status: None,
            detail: detail.into(),
        }
    }

    /// Attach stage identity. An error already carrying the same stage is
    /// returned unchanged so agents never double-wrap.
    pub fn stage(stage: impl Into<String>, err: PassportError) -> Self {
        let stage = stage.into();
        if let PassportError::Stage { stage: inner, .. } = &err {
            if *inner == stage {
                return err;
            }
        }
        PassportError::Stage {
            stage,
            source: Box::new(err),
        }
    }

    pub fn halt(stage: impl Into<String>, err: PassportError) -> Self {
        PassportError::PipelineHalt {
            stage: stage.into(),
            source: Box::new(err),
        }
    }

    pub fn code(&self) -> ErrorCode {
        match self {
            PassportError::SchemaValidation(_) => ErrorCode::SchemaValidation,
            PassportError::NotFound(_) => ErrorCode::NotFound,
            PassportError::Upstream { .. } => ErrorCode::Upstream,
            PassportError::Timeout(_) => ErrorCode::Timeout,
            PassportError::Stage { .. } => ErrorCode::StageFailed,
            PassportError::PipelineHalt { .. } => ErrorCode::PipelineHalt,
            PassportError::Cancelled(_) => ErrorCode::Cancelled,
            PassportError::Internal(_) => ErrorCode::Internal,
        }
    }

    /// The innermost error beneath any stage / halt wrappers.
    pub fn root_cause(&self) -> &PassportError {
        let mut current = self;
        while let PassportError::Stage { source, .. } | PassportError::PipelineHalt { source, .. } =
            current
        {
            current = source.as_ref();
        }
        current
    }

    /// Outermost stage name carried by this error, if any.
    pub fn stage_name(&self) -> Option<&str> {
        match self {
            PassportError::Stage { stage, .. } | PassportError::PipelineHalt { stage, .. } => {
                Some(stage)
            }
            _ => None,
        }
    }

    /// Transient failures (timeouts, upstream errors) may be retried.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self.root_cause(),
            PassportError::Timeout(_) | PassportError::Upstream { .. }
        )
    }

    pub fn to_body(&self) -> ErrorBody {
        match self {
            PassportError::Upstream { status, detail } => ErrorBody {
                code: ErrorCode::Upstream,
                message: detail.clone(),
                stage: None,
                status: *status,
                cause: None,
            },
            PassportError::Stage { stage, source } | PassportError::PipelineHalt { stage, source } => {
                ErrorBody {
                    code: self.code(),
                    message: self.to_string(),
                    stage: Some(stage.clone()),
                    status: None,
                    cause: Some(Box::new(source.to_body())),
                }
            }
            PassportError::SchemaValidation(msg)
            | PassportError::NotFound(msg)
            | PassportError::Timeout(msg)
            | PassportError::Cancelled(msg)
            | PassportError::Internal(msg) => ErrorBody::new(self.code(), msg.clone()),
        }
    }

    /// Map a reqwest failure onto the taxonomy.
    pub fn from_reqwest(err: reqwest::Error, target: &str) -> Self {
        if err.is_timeout() {
            PassportError::Timeout(format!("{}: {}", target, err))
        } else if err.is_decode() {
            PassportError::Upstream {
                status: err.status().map(|s| s.as_u16()),
                detail: format!("{} returned an unreadable body: {}", target, err),
            }
        } else {
            PassportError::Upstream {
                status: err.status().map(|s| s.as_u16()),
                detail: format!("{}: {}", target, err),
            }
        }
    }
}

// ─── Wire form ──────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    SchemaValidation,
    NotFound,
    Upstream,
    Timeout,
    StageFailed,
    PipelineHalt,
    Cancelled,
    /// Codes this build does not know decode as `internal`.
    #[serde(other)]
    Internal,
}

/// Structured error document carried in envelopes and JSON-RPC `error.data`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorBody {
    pub code: ErrorCode,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stage: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<u16>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cause: Option<Box<ErrorBody>>,
}

impl ErrorBody {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            stage: None,
            status: None,
            cause: None,
        }
    }
}

impl From<ErrorBody> for PassportError {
    fn from(body: ErrorBody) -> Self {
        let ErrorBody {
            code,
            message,
            stage,
            status,
            cause,
        } = body;
        match (code, stage, cause) {
            (ErrorCode::StageFailed, Some(stage), Some(cause)) => PassportError::Stage {
                stage,
                source: Box::new(PassportError::from(*cause)),
            },
            (ErrorCode::PipelineHalt, Some(stage), Some(cause)) => PassportError::PipelineHalt {
                stage,
                source: Box::new(PassportError::from(*cause)),
            },
            (ErrorCode::SchemaValidation, _, _) => PassportError::SchemaValidation(message),
            (ErrorCode::NotFound, _, _) => PassportError::NotFound(message),
            (ErrorCode::Upstream, _, _) => PassportError::Upstream {
                status,
                detail: message,
            },
            (ErrorCode::Timeout, _, _) => PassportError::Timeout(message),
            (ErrorCode::Cancelled, _, _) => PassportError::Cancelled(message),
            _ => PassportError::Internal(message),
        }
    }
}

impl From<&PassportError> for ErrorBody {
    fn from(err: &PassportError) -> Self {
        err.to_body()
    }
}

// ---------------------------------------------------------------------------
// axum integration (opt-in via feature flag)
// ---------------------------------------------------------------------------

#[cfg(feature = "axum")]
impl PassportError {
    pub fn status_code(&self) -> axum::http::StatusCode {
        use axum::http::StatusCode;

        match self.root_cause() {
            PassportError::SchemaValidation(_) => StatusCode::BAD_REQUEST,
            PassportError::NotFound(_) => StatusCode::NOT_FOUND,
            PassportError::Upstream { .. } => StatusCode::BAD_GATEWAY,
            PassportError::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
            PassportError::Cancelled(_) => StatusCode::CONFLICT,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

#[cfg(feature = "axum")]
impl axum::response::IntoResponse for PassportError {
    fn into_response(self) -> axum::response::Response {
        let status = self.status_code();
        let body = crate::envelope::InvocationResponse::failure(self.to_body());
        (status, axum::Json(body)).into_response()
    }
}
