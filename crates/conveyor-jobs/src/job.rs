//! Job identity, state machine, and the persisted row model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::retry::RetryPolicy;

/// Unique job identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct JobId(String);

impl JobId {
    /// Creates a new random job ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Creates a job ID from a string.
    pub fn from_string(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    /// Returns the job ID as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for JobId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for JobId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Job lifecycle state.
///
/// The store enforces the edge set via conditional updates; [`JobState::can_transition_to`]
/// is the single description of the legal edges and is what the in-memory
/// store consults before committing a change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobState {
    /// Eligible for lease once `next_run_at` has passed.
    Pending,
    /// Leased by a worker; lease fields are set.
    InProgress,
    /// Terminal success.
    Completed,
    /// Last attempt failed with a retryable error; awaiting scheduling.
    Failed,
    /// Retry scheduled; promoted back to PENDING when `next_run_at` passes.
    Retrying,
    /// Dead-lettered; has a matching DLQ entry. Replayable.
    Dlq,
    /// Reserved terminal state with no ingress (poison pill after replay).
    Dead,
}

impl JobState {
    /// All states, for stats iteration.
    pub const ALL: [JobState; 7] = [
        JobState::Pending,
        JobState::InProgress,
        JobState::Completed,
        JobState::Failed,
        JobState::Retrying,
        JobState::Dlq,
        JobState::Dead,
    ];

    /// Returns the canonical wire string for this state.
    pub fn as_str(&self) -> &'static str {
        match self {
            JobState::Pending => "PENDING",
            JobState::InProgress => "IN_PROGRESS",
            JobState::Completed => "COMPLETED",
            JobState::Failed => "FAILED",
            JobState::Retrying => "RETRYING",
            JobState::Dlq => "DLQ",
            JobState::Dead => "DEAD",
        }
    }

    /// Returns true if no outbound transition exists except manual revival.
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobState::Completed | JobState::Dlq | JobState::Dead)
    }

    /// Returns true if `self -> to` is a legal edge of the state machine.
    pub fn can_transition_to(&self, to: JobState) -> bool {
        use JobState::*;
        matches!(
            (self, to),
            (Pending, InProgress)
                | (Pending, Dlq)
                | (InProgress, Completed)
                | (InProgress, Failed)
                | (InProgress, Dlq)
                | (InProgress, Pending)
                | (Failed, Retrying)
                | (Failed, Dlq)
                | (Failed, Pending)
                | (Retrying, Pending)
                | (Retrying, Dlq)
                | (Dlq, Pending)
                | (Dead, Pending)
        )
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JobState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PENDING" => Ok(JobState::Pending),
            "IN_PROGRESS" => Ok(JobState::InProgress),
            "COMPLETED" => Ok(JobState::Completed),
            "FAILED" => Ok(JobState::Failed),
            "RETRYING" => Ok(JobState::Retrying),
            "DLQ" => Ok(JobState::Dlq),
            "DEAD" => Ok(JobState::Dead),
            other => Err(format!("unknown job state: {}", other)),
        }
    }
}

/// A submission accepted by the engine, ready to insert.
#[derive(Debug, Clone)]
pub struct NewJob {
    /// Routing key.
    pub queue_name: String,
    /// Dispatch hint for the executor.
    pub job_type: String,
    /// Opaque payload, persisted verbatim.
    pub payload: String,
    /// Unique within `queue_name`.
    pub idempotency_key: String,
    /// Immutable retry policy.
    pub policy: RetryPolicy,
    /// Tracing context captured at submission.
    pub traceparent: Option<String>,
}

/// The persisted job row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobRecord {
    pub job_id: JobId,
    pub queue_name: String,
    pub job_type: String,
    pub payload: String,
    pub idempotency_key: String,
    pub state: JobState,

    /// Retry policy, immutable after insert.
    pub max_attempts: u32,
    pub initial_delay_ms: u64,
    pub backoff_multiplier: f64,
    pub max_delay_ms: u64,
    pub jitter: f64,

    /// Incremented on lease claim.
    pub attempt_count: u32,
    /// Incremented when a retry is scheduled.
    pub retry_count: u32,

    /// Earliest time the job is eligible to lease.
    pub next_run_at: DateTime<Utc>,
    /// When the job last became PENDING-ready.
    pub available_at: DateTime<Utc>,

    pub lease_owner: Option<String>,
    pub lease_expires_at: Option<DateTime<Utc>>,

    pub last_error: String,
    pub traceparent: Option<String>,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl JobRecord {
    /// Builds the initial PENDING row for a submission.
    pub fn from_new(job_id: JobId, job: NewJob, now: DateTime<Utc>) -> Self {
        Self {
            job_id,
            queue_name: job.queue_name,
            job_type: job.job_type,
            payload: job.payload,
            idempotency_key: job.idempotency_key,
            state: JobState::Pending,
            max_attempts: job.policy.max_attempts,
            initial_delay_ms: job.policy.initial_delay_ms,
            backoff_multiplier: job.policy.backoff_multiplier,
            max_delay_ms: job.policy.max_delay_ms,
            jitter: job.policy.jitter,
            attempt_count: 0,
            retry_count: 0,
            next_run_at: now,
            available_at: now,
            lease_owner: None,
            lease_expires_at: None,
            last_error: String::new(),
            traceparent: job.traceparent,
            created_at: now,
            updated_at: now,
            started_at: None,
            completed_at: None,
        }
    }

    /// Returns the retry policy embedded in the row.
    pub fn policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.max_attempts,
            initial_delay_ms: self.initial_delay_ms,
            backoff_multiplier: self.backoff_multiplier,
            max_delay_ms: self.max_delay_ms,
            jitter: self.jitter,
        }
    }
}

/// A dead-letter entry, keyed by job id.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DlqEntry {
    pub job_id: JobId,
    pub reason: String,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_job_id_generation_is_unique() {
        let id1 = JobId::new();
        let id2 = JobId::new();
        assert_ne!(id1, id2);
    }

    #[test]
    fn test_state_round_trip() {
        for state in JobState::ALL {
            let parsed: JobState = state.as_str().parse().unwrap();
            assert_eq!(parsed, state);
        }
        assert!("bogus".parse::<JobState>().is_err());
    }

    #[test]
    fn test_completed_has_no_outbound_edges() {
        for to in JobState::ALL {
            assert!(!JobState::Completed.can_transition_to(to));
        }
    }

    #[test]
    fn test_lease_claim_edge() {
        assert!(JobState::Pending.can_transition_to(JobState::InProgress));
        assert!(!JobState::Failed.can_transition_to(JobState::InProgress));
        assert!(!JobState::Retrying.can_transition_to(JobState::InProgress));
    }

    #[test]
    fn test_worker_commit_edges() {
        assert!(JobState::InProgress.can_transition_to(JobState::Completed));
        assert!(JobState::InProgress.can_transition_to(JobState::Failed));
        assert!(JobState::InProgress.can_transition_to(JobState::Dlq));
        assert!(JobState::InProgress.can_transition_to(JobState::Pending));
    }

    #[test]
    fn test_retry_edges() {
        assert!(JobState::Failed.can_transition_to(JobState::Retrying));
        assert!(JobState::Failed.can_transition_to(JobState::Dlq));
        assert!(JobState::Retrying.can_transition_to(JobState::Pending));
        assert!(!JobState::Retrying.can_transition_to(JobState::Failed));
    }

    #[test]
    fn test_replay_edges() {
        assert!(JobState::Dlq.can_transition_to(JobState::Pending));
        assert!(JobState::Dead.can_transition_to(JobState::Pending));
        assert!(!JobState::Dlq.can_transition_to(JobState::Retrying));
    }

    #[test]
    fn test_terminal_states() {
        assert!(JobState::Completed.is_terminal());
        assert!(JobState::Dlq.is_terminal());
        assert!(JobState::Dead.is_terminal());
        assert!(!JobState::Failed.is_terminal());
    }

    #[test]
    fn test_from_new_initial_row() {
        let now = Utc::now();
        let job = NewJob {
            queue_name: "jobs:ready".into(),
            job_type: "demo".into(),
            payload: "{}".into(),
            idempotency_key: "K".into(),
            policy: RetryPolicy::default(),
            traceparent: None,
        };
        let record = JobRecord::from_new(JobId::new(), job, now);
        assert_eq!(record.state, JobState::Pending);
        assert_eq!(record.attempt_count, 0);
        assert_eq!(record.retry_count, 0);
        assert_eq!(record.next_run_at, now);
        assert!(record.lease_owner.is_none());
        assert!(record.started_at.is_none());
    }
}
