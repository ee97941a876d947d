//! Application error types.
//!
//! All errors use `thiserror` for automatic Error trait derivation and carry a
//! machine-readable code plus enough context to diagnose a denial or failure.

use serde_json::{json, Value};
use thiserror::Error;

use crate::access::AccessControlError;
use crate::resilience::NormalizedError;

/// Application result type.
pub type Result<T> = std::result::Result<T, Error>;

/// Main error enum for the Workspace pipeline.
#[derive(Error, Debug)]
pub enum Error {
    /// Malformed input. Never retried.
    #[error("validation error: {0}")]
    Validation(String),

    /// Credential or token failure reported by the auth collaborator.
    #[error("auth error: {0}")]
    Auth(String),

    /// Upstream failure, already normalized (boxed to reduce Result size).
    #[error("service error: {0}")]
    Service(Box<NormalizedError>),

    /// Policy denial (read-only / service / tool / folder).
    #[error("access denied: {0}")]
    AccessControl(#[from] AccessControlError),

    /// Timeout talking to the upstream API. Retryable.
    #[error("timeout: {0}")]
    Timeout(String),

    /// The caller cancelled the operation.
    #[error("operation cancelled: {0}")]
    Cancelled(String),

    /// Internal errors.
    #[error("internal error: {0}")]
    Internal(String),

    /// Serialization/deserialization errors.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl From<NormalizedError> for Error {
    fn from(err: NormalizedError) -> Self {
        Self::Service(Box::new(err))
    }
}

impl Error {
    /// Machine-readable code surfaced to tool callers.
    pub fn code(&self) -> &'static str {
        match self {
            Error::Validation(_) => "VALIDATION_ERROR",
            Error::Auth(_) => "AUTH_ERROR",
            Error::Service(_) => "SERVICE_ERROR",
            Error::AccessControl(denial) => denial.code.as_str(),
            Error::Timeout(_) => "TIMEOUT",
            Error::Cancelled(_) => "CANCELLED",
            Error::Internal(_) => "INTERNAL_ERROR",
            Error::Serialization(_) => "SERIALIZATION_ERROR",
        }
    }

    /// Whether the retry loop may attempt the call again after this error.
    ///
    /// `None` leaves the decision to the normalized HTTP status.
    pub fn retryable_override(&self) -> Option<bool> {
        match self {
            Error::Timeout(_) => Some(true),
            Error::Validation(_)
            | Error::Auth(_)
            | Error::AccessControl(_)
            | Error::Cancelled(_)
            | Error::Serialization(_) => Some(false),
            Error::Service(_) | Error::Internal(_) => None,
        }
    }

    /// Render as the JSON error body returned to a tool caller.
    pub fn to_payload(&self) -> Value {
        let context = match self {
            Error::Service(normalized) => json!({
                "httpStatus": normalized.http_status,
                "status": normalized.status,
                "reason": normalized.reason,
                "retryable": normalized.is_retryable,
            }),
            Error::AccessControl(denial) => json!({
                "operation": denial.operation,
                "service": denial.service,
                "tool": denial.tool,
                "folder": denial.folder,
            }),
            _ => Value::Null,
        };

        json!({
            "code": self.code(),
            "message": self.to_string(),
            "context": context,
        })
    }
}

// Convenience constructors
impl Error {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn auth(msg: impl Into<String>) -> Self {
        Self::Auth(msg.into())
    }

    pub fn timeout(msg: impl Into<String>) -> Self {
        Self::Timeout(msg.into())
    }

    pub fn cancelled(msg: impl Into<String>) -> Self {
        Self::Cancelled(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }
}
