//! Engine error types.

use conveyor_core::CoreError;
use thiserror::Error;

/// Result type for engine operations.
pub type JobResult<T> = Result<T, JobError>;

/// Errors raised by the job engine.
#[derive(Debug, Error)]
pub enum JobError {
    /// Job or DLQ entry not found.
    #[error("Job not found: {0}")]
    NotFound(String),

    /// A user-initiated transition was rejected by the state machine.
    #[error("Invalid transition for job {job_id}: {from} -> {to}")]
    InvalidTransition {
        job_id: String,
        from: String,
        to: String,
    },

    /// Unique index on (queue_name, idempotency_key) violated.
    #[error("Duplicate idempotency key {key} in queue {queue}")]
    Conflict { queue: String, key: String },

    /// A worker-initiated commit failed its lease predicate.
    #[error("Lease lost for job {0}")]
    LeaseLost(String),

    /// A throttled or blocking wait was cancelled.
    #[error("Operation cancelled")]
    Cancelled,

    /// Invalid retry policy or configuration.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Serialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Durable store error.
    #[error("Database error: {0}")]
    Sqlx(#[from] sqlx::Error),

    /// Ready-queue error.
    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    /// Ready-queue pool error.
    #[error("Redis pool error: {0}")]
    Pool(#[from] deadpool_redis::PoolError),

    /// Internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<JobError> for CoreError {
    fn from(err: JobError) -> Self {
        match err {
            JobError::NotFound(id) => CoreError::NotFound {
                resource_type: "job",
                id,
            },
            JobError::InvalidTransition { job_id, from, to } => {
                CoreError::InvalidTransition(format!("job {}: {} -> {}", job_id, from, to))
            }
            JobError::Conflict { queue, key } => {
                CoreError::Conflict(format!("idempotency key {} in queue {}", key, queue))
            }
            // Lease loss never surfaces to callers as a failure; if it does
            // leak this far, treat it as a conflict.
            JobError::LeaseLost(id) => CoreError::Conflict(format!("lease lost for job {}", id)),
            JobError::Cancelled => CoreError::Internal("operation cancelled".to_string()),
            JobError::Configuration(msg) => CoreError::Configuration(msg),
            JobError::Serialization(e) => CoreError::Internal(e.to_string()),
            JobError::Sqlx(e) => CoreError::Database(e.to_string()),
            JobError::Redis(e) => CoreError::Queue(e.to_string()),
            JobError::Pool(e) => CoreError::Queue(e.to_string()),
            JobError::Internal(msg) => CoreError::Internal(msg),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_found_maps_to_404_kind() {
        let core: CoreError = JobError::NotFound("j1".into()).into();
        assert_eq!(core.status_code(), 404);
    }

    #[test]
    fn test_invalid_transition_maps_to_conflict_status() {
        let core: CoreError = JobError::InvalidTransition {
            job_id: "j1".into(),
            from: "COMPLETED".into(),
            to: "PENDING".into(),
        }
        .into();
        assert_eq!(core.status_code(), 409);
        assert_eq!(core.error_code(), "invalid_state_transition");
    }

    #[test]
    fn test_conflict_carries_key_and_queue() {
        let err = JobError::Conflict {
            queue: "jobs:ready".into(),
            key: "K".into(),
        };
        let msg = err.to_string();
        assert!(msg.contains("K") && msg.contains("jobs:ready"));
    }
}
