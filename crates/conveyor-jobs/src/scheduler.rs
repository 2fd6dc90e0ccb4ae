//! Retry scheduler: computes next-attempt times for failed jobs and promotes
//! due retries back onto the ready queue.
//!
//! The RNG behind jitter is seeded per call, so the same seed and policy
//! always produce the same `next_run_at`. Batch sizes are bounded to avoid
//! head-of-line starvation during catch-up.

use chrono::{DateTime, Utc};
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::sync::Arc;
use tracing::{debug, info, warn, Instrument};

use crate::error::{JobError, JobResult};
use crate::job::JobId;
use crate::metrics::JobMetrics;
use crate::queue::ReadyQueue;
use crate::store::JobStore;

/// Reason recorded when a job runs out of attempts.
pub const MAX_ATTEMPTS_EXCEEDED: &str = "max attempts exceeded";

/// Default per-tick batch limit.
const DEFAULT_BATCH_LIMIT: i64 = 100;

/// Periodic retry scheduling over a single queue.
pub struct RetryScheduler {
    store: Arc<dyn JobStore>,
    queue: Arc<dyn ReadyQueue>,
    queue_name: String,
    limit: i64,
}

impl RetryScheduler {
    /// Creates a scheduler with the default batch limit of 100.
    pub fn new(
        store: Arc<dyn JobStore>,
        queue: Arc<dyn ReadyQueue>,
        queue_name: impl Into<String>,
    ) -> Self {
        Self {
            store,
            queue,
            queue_name: queue_name.into(),
            limit: DEFAULT_BATCH_LIMIT,
        }
    }

    /// Overrides the per-tick batch limit.
    pub fn with_batch_limit(mut self, limit: i64) -> Self {
        self.limit = limit;
        self
    }

    /// Computes and persists the next run time for one failed job.
    ///
    /// Returns `Ok(Some(next_run_at))` when a retry was scheduled and
    /// `Ok(None)` when the job exhausted its attempts and was dead-lettered.
    /// The seed fully determines the jitter, so retries are reproducible.
    pub async fn schedule_retry(
        &self,
        job_id: &JobId,
        now: DateTime<Utc>,
        seed: u64,
    ) -> JobResult<Option<DateTime<Utc>>> {
        let state = self.store.get_retry_state(job_id).await?;
        let span = tracing::info_span!(
            "schedule_retry",
            job_id = %job_id,
            queue = %self.queue_name,
            traceparent = state.traceparent.as_deref().unwrap_or(""),
        );

        async {
            let attempt = state.retry_count + 1;
            if attempt >= state.policy.max_attempts {
                if self.store.mark_exhausted(job_id, MAX_ATTEMPTS_EXCEEDED).await? {
                    JobMetrics::dead_lettered(&self.queue_name, "max_attempts");
                    info!(job_id = %job_id, attempts = attempt, "Job exhausted retries; dead-lettered");
                } else {
                    debug!(job_id = %job_id, "Exhaustion lost a race; job no longer FAILED");
                }
                return Ok(None);
            }

            state.policy.validate()?;
            let mut rng = StdRng::seed_from_u64(seed);
            let next_run_at = state.policy.next_run_at(now, attempt, Some(&mut rng));

            if self
                .store
                .update_retry_schedule(job_id, attempt, next_run_at)
                .await?
            {
                JobMetrics::retried(&self.queue_name);
                debug!(
                    job_id = %job_id,
                    retry_count = attempt,
                    next_run_at = %next_run_at,
                    "Retry scheduled"
                );
                Ok(Some(next_run_at))
            } else {
                debug!(job_id = %job_id, "Retry schedule lost a race; job no longer FAILED");
                Ok(None)
            }
        }
        .instrument(span)
        .await
    }

    /// Scans FAILED rows and schedules each, bounded by the batch limit.
    ///
    /// Returns how many jobs were touched (scheduled or dead-lettered).
    pub async fn schedule_failed(&self, now: DateTime<Utc>, seed: u64) -> JobResult<usize> {
        let ids = self.store.list_failed(self.limit).await?;
        let mut touched = 0usize;
        for (i, id) in ids.iter().enumerate() {
            // Derive a per-job seed so one tick's jobs don't share jitter.
            match self.schedule_retry(id, now, seed.wrapping_add(i as u64)).await {
                Ok(_) => touched += 1,
                Err(JobError::NotFound(_)) => {
                    debug!(job_id = %id, "Failed job vanished before scheduling");
                }
                Err(e) => return Err(e),
            }
        }
        Ok(touched)
    }

    /// Promotes due RETRYING jobs back onto the ready queue.
    ///
    /// Order matters: enqueue before marking PENDING, so a crash between the
    /// two yields a duplicate enqueue rather than a stranded job. Duplicates
    /// are harmless; the second lease fails the PENDING predicate.
    pub async fn enqueue_due_retries(&self, now: DateTime<Utc>) -> JobResult<usize> {
        let ids = self.store.list_due_retries(now, self.limit).await?;
        for id in &ids {
            self.queue.enqueue(&self.queue_name, id).await?;
            JobMetrics::enqueued(&self.queue_name);
            self.store.mark_retry_enqueued(id).await?;
        }
        if !ids.is_empty() {
            debug!(count = ids.len(), queue = %self.queue_name, "Promoted due retries");
        }
        Ok(ids.len())
    }

    /// One scheduler tick: schedule failures, then promote due retries.
    pub async fn tick(&self, now: DateTime<Utc>, seed: u64) -> JobResult<()> {
        if let Err(e) = self.schedule_failed(now, seed).await {
            warn!(error = %e, "Scheduling failed jobs aborted this tick");
        }
        if let Err(e) = self.enqueue_due_retries(now).await {
            warn!(error = %e, "Promoting due retries aborted this tick");
        }
        Ok(())
    }
}
