//! Unified error type for all layers of the system.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Unified error type for Conveyor.
///
/// Every layer converts its local failures into one of these kinds at the
/// boundary, so the HTTP surface and the binaries only ever reason about
/// this enum.
#[derive(Error, Debug)]
pub enum CoreError {
    /// Lookup against a missing job, DLQ entry, or idempotency key.
    #[error("Not found: {resource_type} with id {id}")]
    NotFound {
        resource_type: &'static str,
        id: String,
    },

    /// Request-level validation failure.
    #[error("Validation error: {0}")]
    Validation(String),

    /// Unique constraint violation (idempotency key already accepted).
    #[error("Conflict: {0}")]
    Conflict(String),

    /// A user-initiated transition was rejected by the state machine.
    #[error("Invalid state transition: {0}")]
    InvalidTransition(String),

    /// Durable store failure.
    #[error("Database error: {0}")]
    Database(String),

    /// Ready-queue failure.
    #[error("Queue error: {0}")]
    Queue(String),

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// I/O or programming error.
    #[error("Internal error: {0}")]
    Internal(String),

    /// Generic error wrapper.
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl CoreError {
    /// Returns the HTTP status code for this error.
    #[must_use]
    pub const fn status_code(&self) -> u16 {
        match self {
            Self::NotFound { .. } => 404,
            Self::Validation(_) => 400,
            Self::Conflict(_) | Self::InvalidTransition(_) => 409,
            Self::Database(_)
            | Self::Queue(_)
            | Self::Configuration(_)
            | Self::Internal(_)
            | Self::Other(_) => 500,
        }
    }

    /// Returns a machine-readable error code.
    #[must_use]
    pub const fn error_code(&self) -> &'static str {
        match self {
            Self::NotFound { .. } => "not_found",
            Self::Validation(_) => "validation_error",
            Self::Conflict(_) => "conflict",
            Self::InvalidTransition(_) => "invalid_state_transition",
            Self::Database(_) => "database_error",
            Self::Queue(_) => "queue_error",
            Self::Configuration(_) => "configuration_error",
            Self::Internal(_) | Self::Other(_) => "internal_error",
        }
    }

    /// Creates a not found error for a resource.
    #[must_use]
    pub fn not_found<T: ToString>(resource_type: &'static str, id: T) -> Self {
        Self::NotFound {
            resource_type,
            id: id.to_string(),
        }
    }

    /// Creates a validation error.
    #[must_use]
    pub fn validation<T: Into<String>>(message: T) -> Self {
        Self::Validation(message.into())
    }

    /// Creates a conflict error.
    #[must_use]
    pub fn conflict<T: Into<String>>(message: T) -> Self {
        Self::Conflict(message.into())
    }

    /// Creates an internal error.
    #[must_use]
    pub fn internal<T: Into<String>>(message: T) -> Self {
        Self::Internal(message.into())
    }
}

impl From<serde_json::Error> for CoreError {
    fn from(err: serde_json::Error) -> Self {
        Self::Internal(format!("JSON serialization error: {}", err))
    }
}

/// Serializable error body for API responses.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// Machine-readable error code
    pub code: String,
    /// Human-readable error message
    pub error: String,
    /// Optional extra detail
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

impl ErrorResponse {
    /// Creates a new error response from a `CoreError`.
    #[must_use]
    pub fn from_error(error: &CoreError) -> Self {
        Self {
            code: error.error_code().to_string(),
            error: error.to_string(),
            detail: None,
        }
    }

    /// Sets the detail field.
    #[must_use]
    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }
}

impl From<&CoreError> for ErrorResponse {
    fn from(error: &CoreError) -> Self {
        Self::from_error(error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_status_codes() {
        assert_eq!(CoreError::not_found("job", "j1").status_code(), 404);
        assert_eq!(CoreError::validation("jitter out of range").status_code(), 400);
        assert_eq!(CoreError::conflict("duplicate key").status_code(), 409);
        assert_eq!(
            CoreError::InvalidTransition("COMPLETED -> PENDING".into()).status_code(),
            409
        );
        assert_eq!(CoreError::Database("down".into()).status_code(), 500);
        assert_eq!(CoreError::Queue("down".into()).status_code(), 500);
        assert_eq!(CoreError::internal("oops").status_code(), 500);
    }

    #[test]
    fn test_error_codes() {
        assert_eq!(CoreError::not_found("job", 1).error_code(), "not_found");
        assert_eq!(CoreError::conflict("dup").error_code(), "conflict");
        assert_eq!(
            CoreError::InvalidTransition("bad".into()).error_code(),
            "invalid_state_transition"
        );
        assert_eq!(CoreError::internal("e").error_code(), "internal_error");
    }

    #[test]
    fn test_error_response_from_error() {
        let err = CoreError::not_found("job", "j42");
        let response = ErrorResponse::from_error(&err);
        assert_eq!(response.code, "not_found");
        assert!(response.error.contains("j42"));
        assert!(response.detail.is_none());
    }

    #[test]
    fn test_error_response_with_detail() {
        let err = CoreError::validation("bad payload");
        let response = ErrorResponse::from_error(&err).with_detail("payload must be JSON");
        assert_eq!(response.detail.as_deref(), Some("payload must be JSON"));
    }
}
