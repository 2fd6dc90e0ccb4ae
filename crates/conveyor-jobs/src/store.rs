//! The job store contract: the single source of truth for job state.
//!
//! Every mutating operation is conditional on the current observable state
//! (and, for lease-scoped mutations, the lease owner). A predicate miss is
//! not an error: operations that can race return `bool` ("took effect") and
//! the caller decides. User-initiated transitions from a forbidden state
//! reject with [`JobError::InvalidTransition`].

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::time::Duration;

use crate::error::JobResult;
use crate::job::{DlqEntry, JobId, JobRecord, JobState, NewJob};
use crate::retry::RetryPolicy;
use conveyor_core::PageRequest;

/// What the retry scheduler needs to know about a failed job.
#[derive(Debug, Clone)]
pub struct RetryState {
    pub job_id: JobId,
    pub queue_name: String,
    pub retry_count: u32,
    pub policy: RetryPolicy,
    pub traceparent: Option<String>,
}

/// Filter for the read-only job listing.
#[derive(Debug, Clone, Default)]
pub struct JobFilter {
    /// Restrict to one queue.
    pub queue_name: Option<String>,
    /// Restrict to one state.
    pub state: Option<JobState>,
    /// Restrict to one job type.
    pub job_type: Option<String>,
    /// Substring match over job id and idempotency key.
    pub search: Option<String>,
}

/// Aggregate job counts by state.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StateCounts {
    pub total: u64,
    pub by_state: HashMap<JobState, u64>,
}

impl StateCounts {
    /// Returns the count for one state (zero when absent).
    pub fn get(&self, state: JobState) -> u64 {
        self.by_state.get(&state).copied().unwrap_or(0)
    }
}

/// Durable state of every job, with atomic conditional transitions.
///
/// Implementations need (a) atomic conditional updates and (b) a
/// claim-one-skip-others primitive for [`lease_next_job`](Self::lease_next_job).
/// [`PostgresJobStore`](crate::postgres::PostgresJobStore) uses row locks and
/// `FOR UPDATE SKIP LOCKED`; [`MemoryJobStore`](crate::memory::MemoryJobStore)
/// serializes under one mutex.
#[async_trait]
pub trait JobStore: Send + Sync {
    /// Liveness check.
    async fn ping(&self) -> JobResult<()>;

    /// Inserts a PENDING row with `next_run_at = now` and zeroed counters.
    ///
    /// Fails with [`JobError::Conflict`](crate::error::JobError::Conflict)
    /// when `(queue_name, idempotency_key)` already exists; the caller then
    /// resolves the existing row via
    /// [`get_job_by_idempotency_key`](Self::get_job_by_idempotency_key).
    async fn insert_job(&self, job_id: JobId, job: NewJob) -> JobResult<()>;

    /// Fetches a job row by id.
    async fn get_job(&self, job_id: &JobId) -> JobResult<Option<JobRecord>>;

    /// Lookup for the idempotent-submission path.
    async fn get_job_by_idempotency_key(
        &self,
        queue_name: &str,
        key: &str,
    ) -> JobResult<Option<JobRecord>>;

    /// Atomically claims the oldest due PENDING job in the queue.
    ///
    /// On success the row is IN_PROGRESS, owned by `worker_id` until
    /// `now + lease_for`, `attempt_count` is incremented, and `started_at`
    /// is set if unset. Two concurrent callers never claim the same job.
    async fn lease_next_job(
        &self,
        queue_name: &str,
        worker_id: &str,
        now: DateTime<Utc>,
        lease_for: Duration,
    ) -> JobResult<Option<JobId>>;

    /// Claims a lease on a specific PENDING job (test setup and targeted
    /// redelivery). Returns whether the claim took effect.
    async fn acquire_lease(
        &self,
        job_id: &JobId,
        worker_id: &str,
        now: DateTime<Utc>,
        lease_for: Duration,
    ) -> JobResult<bool>;

    /// Extends the lease iff the job is IN_PROGRESS and owned by `worker_id`.
    ///
    /// A `false` result means the lease was revoked or the job finalized;
    /// the worker must abandon.
    async fn renew_lease(
        &self,
        job_id: &JobId,
        worker_id: &str,
        extend_by: Duration,
    ) -> JobResult<bool>;

    /// IN_PROGRESS -> COMPLETED under lease ownership; clears the lease.
    async fn mark_job_succeeded(&self, job_id: &JobId, worker_id: &str) -> JobResult<bool>;

    /// IN_PROGRESS -> FAILED under lease ownership; clears the lease and
    /// records `last_error`.
    async fn mark_job_failed(
        &self,
        job_id: &JobId,
        worker_id: &str,
        last_error: &str,
    ) -> JobResult<bool>;

    /// IN_PROGRESS -> DLQ under lease ownership; clears the lease and inserts
    /// the DLQ entry in the same transaction.
    async fn mark_job_terminal(
        &self,
        job_id: &JobId,
        worker_id: &str,
        reason: &str,
    ) -> JobResult<bool>;

    /// Reads the retry policy and counters for scheduling.
    async fn get_retry_state(&self, job_id: &JobId) -> JobResult<RetryState>;

    /// FAILED -> RETRYING with the computed `retry_count` and `next_run_at`.
    /// Returns whether the transition took effect.
    async fn update_retry_schedule(
        &self,
        job_id: &JobId,
        retry_count: u32,
        next_run_at: DateTime<Utc>,
    ) -> JobResult<bool>;

    /// FAILED -> DLQ for exhausted jobs; inserts the DLQ entry atomically.
    /// Returns whether the transition took effect.
    async fn mark_exhausted(&self, job_id: &JobId, reason: &str) -> JobResult<bool>;

    /// FAILED jobs awaiting a retry schedule, oldest first.
    async fn list_failed(&self, limit: i64) -> JobResult<Vec<JobId>>;

    /// RETRYING jobs whose `next_run_at` has passed, oldest first.
    async fn list_due_retries(&self, now: DateTime<Utc>, limit: i64) -> JobResult<Vec<JobId>>;

    /// RETRYING -> PENDING once the retry is back on the ready queue.
    async fn mark_retry_enqueued(&self, job_id: &JobId) -> JobResult<()>;

    /// IN_PROGRESS jobs whose lease expired at or before `now`.
    async fn list_expired_leases(&self, now: DateTime<Utc>, limit: i64) -> JobResult<Vec<JobId>>;

    /// IN_PROGRESS -> PENDING, clearing the lease fields.
    async fn reset_lease(&self, job_id: &JobId) -> JobResult<()>;

    /// Manual retry. Allowed from FAILED, RETRYING, DLQ, and DEAD; rejects
    /// everything else with InvalidTransition. Retry from DLQ is a replay
    /// (counters zeroed, DLQ entry removed).
    async fn retry_job(&self, job_id: &JobId) -> JobResult<()>;

    /// Manual dead-letter. Allowed from PENDING, IN_PROGRESS, FAILED, and
    /// RETRYING; rejects everything else with InvalidTransition. Inserts the
    /// DLQ entry atomically.
    async fn dlq_job(&self, job_id: &JobId, reason: &str) -> JobResult<()>;

    /// Atomic replay: deletes the DLQ entry, zeroes the counters, and returns
    /// the job to PENDING with `next_run_at = now`. NotFound without an entry.
    async fn replay_dlq(&self, job_id: &JobId) -> JobResult<()>;

    /// Pages through DLQ entries, newest first.
    async fn list_dlq(&self, page: PageRequest) -> JobResult<(Vec<DlqEntry>, u64)>;

    /// Fetches one DLQ entry.
    async fn get_dlq_entry(&self, job_id: &JobId) -> JobResult<Option<DlqEntry>>;

    /// Aggregate counts by state.
    async fn stats(&self) -> JobResult<StateCounts>;

    /// Read-only listing with filter and pagination, newest first.
    async fn query_jobs(
        &self,
        filter: &JobFilter,
        page: PageRequest,
    ) -> JobResult<(Vec<JobRecord>, u64)>;

    /// Tracing context captured at submission, if any.
    async fn get_traceparent(&self, job_id: &JobId) -> JobResult<Option<String>>;
}
