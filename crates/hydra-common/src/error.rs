// SPDX-License-Identifier: MIT
use serde_json::{json, Value};
use thiserror::Error;

/// The engine-wide error taxonomy. Every user-visible error
/// carries `{kind, message, retryable, context}` via [`HydraError::to_json`].
#[derive(Debug, Error, Clone)]
pub enum HydraError {
    #[error("validation error: {message}")]
    Validation { message: String },

    #[error("backend unavailable: {message}")]
    BackendUnavailable { message: String },

    #[error("backend returned HTTP {status}: {message}")]
    BackendHttp { status: u16, message: String },

    #[error("backend call timed out: {message}")]
    BackendTimeout { message: String },

    #[error("rate limited")]
    RateLimited { retry_after_s: Option<u64> },

    #[error("cancelled")]
    Cancelled,

    #[error("cache error: {message}")]
    Cache { message: String },

    #[error("all backends failed: {summary}")]
    AllBackendsFailed {
        errors: Vec<(String, String)>,
        summary: String,
    },

    #[error("wait timed out")]
    WaitTimeout,

    #[error("scheduler is shut down")]
    SchedulerShutdown,
}

impl HydraError {
    /// Build an `AllBackendsFailed` error from the per-model error list,
    /// precomputing the human-readable summary used in `Display`.
    pub fn all_backends_failed(errors: Vec<(String, String)>) -> Self {
        let summary = errors
            .iter()
            .map(|(model, err)| format!("{model}: {err}"))
            .collect::<Vec<_>>()
            .join("; ");
        HydraError::AllBackendsFailed { errors, summary }
    }

    /// Stable taxonomy name used in the `kind` field of `to_json`.
    pub fn kind(&self) -> &'static str {
        match self {
            HydraError::Validation { .. } => "ValidationError",
            HydraError::BackendUnavailable { .. } => "BackendUnavailable",
            HydraError::BackendHttp { .. } => "BackendHTTP",
            HydraError::BackendTimeout { .. } => "BackendTimeout",
            HydraError::RateLimited { .. } => "RateLimited",
            HydraError::Cancelled => "Cancelled",
            HydraError::Cache { .. } => "CacheError",
            HydraError::AllBackendsFailed { .. } => "AllBackendsFailed",
            HydraError::WaitTimeout => "WaitTimeout",
            HydraError::SchedulerShutdown => "SchedulerShutdown",
        }
    }

    /// Whether the scheduler should re-enqueue an attempt that failed with
    /// this error.
    pub fn is_retryable(&self) -> bool {
        match self {
            HydraError::BackendUnavailable { .. } => true,
            HydraError::BackendTimeout { .. } => true,
            HydraError::RateLimited { .. } => true,
            HydraError::BackendHttp { status, .. } => {
                *status == 408 || *status == 429 || (500..600).contains(status)
            }
            HydraError::Validation { .. }
            | HydraError::Cancelled
            | HydraError::Cache { .. }
            | HydraError::AllBackendsFailed { .. }
            | HydraError::WaitTimeout
            | HydraError::SchedulerShutdown => false,
        }
    }

    /// `Retry-After` seconds, when this error carries one (only `RateLimited`
    /// does; backends construct it directly from the response header on 429).
    pub fn retry_after_s(&self) -> Option<u64> {
        match self {
            HydraError::RateLimited { retry_after_s } => *retry_after_s,
            _ => None,
        }
    }

    /// Render as the `{kind, message, retryable, context}` shape every
    /// user-visible error carries.
    pub fn to_json(&self) -> Value {
        let context = match self {
            HydraError::BackendHttp { status, .. } => json!({ "status": status }),
            HydraError::RateLimited { retry_after_s } => {
                json!({ "retry_after_s": retry_after_s })
            }
            HydraError::AllBackendsFailed { errors, .. } => {
                json!({ "errors": errors.iter().map(|(m, e)| json!({"model": m, "error": e})).collect::<Vec<_>>() })
            }
            _ => Value::Null,
        };
        json!({
            "kind": self.kind(),
            "message": self.to_string(),
            "retryable": self.is_retryable(),
            "context": context,
        })
    }
}
