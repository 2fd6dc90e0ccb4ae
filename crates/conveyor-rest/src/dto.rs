//! Request and response bodies for the control plane.

use chrono::{DateTime, Utc};
use conveyor_core::CoreError;
use conveyor_jobs::{DlqEntry, JobRecord, NewJob, RetryPolicy};
use serde::{Deserialize, Serialize};

/// Job submission request.
///
/// `maxRetries` is a deprecated alias for `maxAttempts`; when only the alias
/// is given, `maxAttempts = maxRetries + 1`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct SubmitJobRequest {
    #[serde(default)]
    pub job_type: String,
    #[serde(default)]
    pub payload: serde_json::Value,
    #[serde(default)]
    pub idempotency_key: String,
    pub max_attempts: Option<u32>,
    pub max_retries: Option<u32>,
    pub initial_delay_ms: Option<u64>,
    pub backoff_multiplier: Option<f64>,
    pub max_delay_ms: Option<u64>,
    pub jitter: Option<f64>,
}

impl SubmitJobRequest {
    /// Validates the submission and resolves policy defaults.
    pub fn into_new_job(
        self,
        queue_name: &str,
        traceparent: Option<String>,
    ) -> Result<NewJob, CoreError> {
        let job_type = self.job_type.trim().to_string();
        let idempotency_key = self.idempotency_key.trim().to_string();

        if job_type.is_empty() || idempotency_key.is_empty() || self.payload.is_null() {
            return Err(CoreError::validation("missing required fields"));
        }

        let max_attempts = self
            .max_attempts
            .or_else(|| self.max_retries.map(|r| r.saturating_add(1)))
            .unwrap_or(5);

        let policy = RetryPolicy {
            max_attempts,
            initial_delay_ms: self.initial_delay_ms.unwrap_or(1000),
            backoff_multiplier: self.backoff_multiplier.unwrap_or(2.0),
            max_delay_ms: self.max_delay_ms.unwrap_or(60_000),
            jitter: self.jitter.unwrap_or(0.0),
        };
        policy
            .validate()
            .map_err(|e| CoreError::validation(e.to_string()))?;

        Ok(NewJob {
            queue_name: queue_name.to_string(),
            job_type,
            payload: self.payload.to_string(),
            idempotency_key,
            policy,
            traceparent,
        })
    }
}

/// Submission response.
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitJobResponse {
    pub job_id: String,
}

/// Full job row, as exposed by the status endpoints.
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobStatusResponse {
    pub job_id: String,
    pub job_type: String,
    pub queue_name: String,
    pub state: String,
    pub retry_count: u32,
    pub attempt_count: u32,
    pub max_attempts: u32,
    pub max_retries: u32,
    pub initial_delay_ms: u64,
    pub backoff_multiplier: f64,
    pub max_delay_ms: u64,
    pub jitter: f64,
    pub next_run_at: DateTime<Utc>,
    pub last_error: String,
    pub scheduled_at: DateTime<Utc>,
    pub available_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<JobRecord> for JobStatusResponse {
    fn from(job: JobRecord) -> Self {
        Self {
            job_id: job.job_id.to_string(),
            job_type: job.job_type,
            queue_name: job.queue_name,
            state: job.state.to_string(),
            retry_count: job.retry_count,
            attempt_count: job.attempt_count,
            max_attempts: job.max_attempts,
            max_retries: job.max_attempts.saturating_sub(1),
            initial_delay_ms: job.initial_delay_ms,
            backoff_multiplier: job.backoff_multiplier,
            max_delay_ms: job.max_delay_ms,
            jitter: job.jitter,
            next_run_at: job.next_run_at,
            last_error: job.last_error,
            scheduled_at: job.created_at,
            available_at: job.available_at,
            started_at: job.started_at,
            completed_at: job.completed_at,
            created_at: job.created_at,
            updated_at: job.updated_at,
        }
    }
}

/// One DLQ entry.
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DlqEntryResponse {
    pub job_id: String,
    pub reason: String,
    pub created_at: DateTime<Utc>,
}

impl From<DlqEntry> for DlqEntryResponse {
    fn from(entry: DlqEntry) -> Self {
        Self {
            job_id: entry.job_id.to_string(),
            reason: entry.reason,
            created_at: entry.created_at,
        }
    }
}

/// DLQ entry plus the full job row.
#[derive(Debug, Serialize, Deserialize)]
pub struct DlqInspectResponse {
    pub entry: DlqEntryResponse,
    pub job: JobStatusResponse,
}

/// Reason body for manual cancel / dlq.
#[derive(Debug, Default, Deserialize)]
pub struct ReasonRequest {
    #[serde(default)]
    pub reason: String,
}

/// Aggregate counts by state plus queue observability.
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatsResponse {
    pub total: u64,
    pub pending: u64,
    pub in_progress: u64,
    pub completed: u64,
    pub failed: u64,
    pub retrying: u64,
    pub dlq: u64,
    pub dead: u64,
    pub queue_depth: u64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn request(body: serde_json::Value) -> SubmitJobRequest {
        serde_json::from_value(body).unwrap()
    }

    #[test]
    fn test_defaults_applied() {
        let req = request(json!({
            "jobType": "demo",
            "payload": {"n": 1},
            "idempotencyKey": "K"
        }));
        let job = req.into_new_job("jobs:ready", None).unwrap();
        assert_eq!(job.policy.max_attempts, 5);
        assert_eq!(job.policy.initial_delay_ms, 1000);
        assert_eq!(job.policy.backoff_multiplier, 2.0);
        assert_eq!(job.policy.max_delay_ms, 60_000);
        assert_eq!(job.policy.jitter, 0.0);
        assert_eq!(job.payload, r#"{"n":1}"#);
    }

    #[test]
    fn test_max_retries_alias() {
        let req = request(json!({
            "jobType": "demo",
            "payload": {},
            "idempotencyKey": "K",
            "maxRetries": 2
        }));
        let job = req.into_new_job("jobs:ready", None).unwrap();
        assert_eq!(job.policy.max_attempts, 3);
    }

    #[test]
    fn test_max_attempts_wins_over_alias() {
        let req = request(json!({
            "jobType": "demo",
            "payload": {},
            "idempotencyKey": "K",
            "maxAttempts": 7,
            "maxRetries": 2
        }));
        let job = req.into_new_job("jobs:ready", None).unwrap();
        assert_eq!(job.policy.max_attempts, 7);
    }

    #[test]
    fn test_missing_fields_rejected() {
        for body in [
            json!({"payload": {}, "idempotencyKey": "K"}),
            json!({"jobType": "demo", "idempotencyKey": "K"}),
            json!({"jobType": "demo", "payload": {}}),
            json!({"jobType": "  ", "payload": {}, "idempotencyKey": "K"}),
        ] {
            let req = request(body.clone());
            assert!(
                req.into_new_job("jobs:ready", None).is_err(),
                "body {} should be rejected",
                body
            );
        }
    }

    #[test]
    fn test_invalid_policy_rejected() {
        let cases = [
            json!({"jobType": "d", "payload": {}, "idempotencyKey": "K", "jitter": 1.5}),
            json!({"jobType": "d", "payload": {}, "idempotencyKey": "K", "backoffMultiplier": 0.5}),
            json!({"jobType": "d", "payload": {}, "idempotencyKey": "K",
                   "initialDelayMs": 5000, "maxDelayMs": 1000}),
            json!({"jobType": "d", "payload": {}, "idempotencyKey": "K", "maxAttempts": 0}),
        ];
        for body in cases {
            let req = request(body.clone());
            assert!(
                req.into_new_job("jobs:ready", None).is_err(),
                "body {} should be rejected",
                body
            );
        }
    }

    #[test]
    fn test_traceparent_captured() {
        let req = request(json!({
            "jobType": "demo",
            "payload": {},
            "idempotencyKey": "K"
        }));
        let job = req
            .into_new_job("jobs:ready", Some("00-abc-def-01".into()))
            .unwrap();
        assert_eq!(job.traceparent.as_deref(), Some("00-abc-def-01"));
    }
}
