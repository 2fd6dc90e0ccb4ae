//! In-memory store and ready queue.
//!
//! The store keeps the full contract of [`JobStore`] behind one mutex, which
//! makes every transition an atomic compare-and-set on the row. The queue is
//! a plain FIFO with a notify-based blocking pop. Both back the test suite
//! and single-node embeddings; multi-node deployments use the Postgres store
//! and the Redis queue.

use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;
use tokio::time::Instant;

use crate::error::{JobError, JobResult};
use crate::job::{DlqEntry, JobId, JobRecord, JobState, NewJob};
use crate::store::{JobFilter, JobStore, RetryState, StateCounts};
use conveyor_core::PageRequest;

fn chrono_from_std(d: Duration) -> ChronoDuration {
    ChronoDuration::from_std(d).unwrap_or_else(|_| ChronoDuration::zero())
}

#[derive(Default)]
struct StoreInner {
    jobs: HashMap<String, JobRecord>,
    dlq: HashMap<String, DlqEntry>,
    /// (queue_name, idempotency_key) -> job_id
    idempotency: HashMap<(String, String), String>,
}

/// In-memory [`JobStore`].
#[derive(Default)]
pub struct MemoryJobStore {
    inner: Mutex<StoreInner>,
}

impl MemoryJobStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    fn with_job<T>(
        &self,
        job_id: &JobId,
        f: impl FnOnce(&mut JobRecord, &mut StoreInner) -> JobResult<T>,
    ) -> JobResult<T> {
        let mut inner = self.inner.lock();
        let mut job = match inner.jobs.get(job_id.as_str()) {
            Some(job) => job.clone(),
            None => return Err(JobError::NotFound(job_id.to_string())),
        };
        let out = f(&mut job, &mut inner)?;
        job.updated_at = Utc::now();
        inner.jobs.insert(job.job_id.to_string(), job);
        Ok(out)
    }

    fn insert_dlq_entry(inner: &mut StoreInner, job_id: &JobId, reason: &str) {
        let reason = if reason.is_empty() {
            "terminal failure"
        } else {
            reason
        };
        inner.dlq.insert(
            job_id.to_string(),
            DlqEntry {
                job_id: job_id.clone(),
                reason: reason.to_string(),
                created_at: Utc::now(),
            },
        );
    }
}

#[async_trait]
impl JobStore for MemoryJobStore {
    async fn ping(&self) -> JobResult<()> {
        Ok(())
    }

    async fn insert_job(&self, job_id: JobId, job: NewJob) -> JobResult<()> {
        let mut inner = self.inner.lock();
        let key = (job.queue_name.clone(), job.idempotency_key.clone());
        if inner.idempotency.contains_key(&key) {
            return Err(JobError::Conflict {
                queue: key.0,
                key: key.1,
            });
        }
        let record = JobRecord::from_new(job_id.clone(), job, Utc::now());
        inner.idempotency.insert(key, job_id.to_string());
        inner.jobs.insert(job_id.to_string(), record);
        Ok(())
    }

    async fn get_job(&self, job_id: &JobId) -> JobResult<Option<JobRecord>> {
        Ok(self.inner.lock().jobs.get(job_id.as_str()).cloned())
    }

    async fn get_job_by_idempotency_key(
        &self,
        queue_name: &str,
        key: &str,
    ) -> JobResult<Option<JobRecord>> {
        let inner = self.inner.lock();
        let id = inner
            .idempotency
            .get(&(queue_name.to_string(), key.to_string()));
        Ok(id.and_then(|id| inner.jobs.get(id)).cloned())
    }

    async fn lease_next_job(
        &self,
        queue_name: &str,
        worker_id: &str,
        now: DateTime<Utc>,
        lease_for: Duration,
    ) -> JobResult<Option<JobId>> {
        let mut inner = self.inner.lock();
        let candidate = inner
            .jobs
            .values()
            .filter(|j| {
                j.queue_name == queue_name && j.state == JobState::Pending && j.next_run_at <= now
            })
            .min_by_key(|j| (j.next_run_at, j.created_at))
            .map(|j| j.job_id.clone());

        let Some(job_id) = candidate else {
            return Ok(None);
        };
        let job = inner
            .jobs
            .get_mut(job_id.as_str())
            .ok_or_else(|| JobError::NotFound(job_id.to_string()))?;
        job.state = JobState::InProgress;
        job.attempt_count += 1;
        job.lease_owner = Some(worker_id.to_string());
        job.lease_expires_at = Some(now + chrono_from_std(lease_for));
        job.started_at.get_or_insert(now);
        job.updated_at = Utc::now();
        Ok(Some(job_id))
    }

    async fn acquire_lease(
        &self,
        job_id: &JobId,
        worker_id: &str,
        now: DateTime<Utc>,
        lease_for: Duration,
    ) -> JobResult<bool> {
        self.with_job(job_id, |job, _| {
            let lease_free = job.lease_expires_at.map_or(true, |at| at <= now);
            if job.state != JobState::Pending || !lease_free {
                return Ok(false);
            }
            job.state = JobState::InProgress;
            job.attempt_count += 1;
            job.lease_owner = Some(worker_id.to_string());
            job.lease_expires_at = Some(now + chrono_from_std(lease_for));
            job.started_at.get_or_insert(now);
            Ok(true)
        })
    }

    async fn renew_lease(
        &self,
        job_id: &JobId,
        worker_id: &str,
        extend_by: Duration,
    ) -> JobResult<bool> {
        self.with_job(job_id, |job, _| {
            if job.state != JobState::InProgress || job.lease_owner.as_deref() != Some(worker_id) {
                return Ok(false);
            }
            job.lease_expires_at = Some(Utc::now() + chrono_from_std(extend_by));
            Ok(true)
        })
    }

    async fn mark_job_succeeded(&self, job_id: &JobId, worker_id: &str) -> JobResult<bool> {
        self.with_job(job_id, |job, _| {
            if job.state != JobState::InProgress || job.lease_owner.as_deref() != Some(worker_id) {
                return Ok(false);
            }
            job.state = JobState::Completed;
            job.lease_owner = None;
            job.lease_expires_at = None;
            job.last_error.clear();
            job.completed_at = Some(Utc::now());
            Ok(true)
        })
    }

    async fn mark_job_failed(
        &self,
        job_id: &JobId,
        worker_id: &str,
        last_error: &str,
    ) -> JobResult<bool> {
        self.with_job(job_id, |job, _| {
            if job.state != JobState::InProgress || job.lease_owner.as_deref() != Some(worker_id) {
                return Ok(false);
            }
            job.state = JobState::Failed;
            job.lease_owner = None;
            job.lease_expires_at = None;
            job.last_error = last_error.to_string();
            Ok(true)
        })
    }

    async fn mark_job_terminal(
        &self,
        job_id: &JobId,
        worker_id: &str,
        reason: &str,
    ) -> JobResult<bool> {
        self.with_job(job_id, |job, inner| {
            if job.state != JobState::InProgress || job.lease_owner.as_deref() != Some(worker_id) {
                return Ok(false);
            }
            job.state = JobState::Dlq;
            job.lease_owner = None;
            job.lease_expires_at = None;
            job.last_error = reason.to_string();
            Self::insert_dlq_entry(inner, job_id, reason);
            Ok(true)
        })
    }

    async fn get_retry_state(&self, job_id: &JobId) -> JobResult<RetryState> {
        let inner = self.inner.lock();
        let job = inner
            .jobs
            .get(job_id.as_str())
            .ok_or_else(|| JobError::NotFound(job_id.to_string()))?;
        Ok(RetryState {
            job_id: job.job_id.clone(),
            queue_name: job.queue_name.clone(),
            retry_count: job.retry_count,
            policy: job.policy(),
            traceparent: job.traceparent.clone(),
        })
    }

    async fn update_retry_schedule(
        &self,
        job_id: &JobId,
        retry_count: u32,
        next_run_at: DateTime<Utc>,
    ) -> JobResult<bool> {
        self.with_job(job_id, |job, _| {
            if job.state != JobState::Failed {
                return Ok(false);
            }
            job.state = JobState::Retrying;
            job.retry_count = retry_count;
            job.next_run_at = next_run_at;
            Ok(true)
        })
    }

    async fn mark_exhausted(&self, job_id: &JobId, reason: &str) -> JobResult<bool> {
        self.with_job(job_id, |job, inner| {
            if job.state != JobState::Failed {
                return Ok(false);
            }
            job.state = JobState::Dlq;
            job.last_error = reason.to_string();
            Self::insert_dlq_entry(inner, job_id, reason);
            Ok(true)
        })
    }

    async fn list_failed(&self, limit: i64) -> JobResult<Vec<JobId>> {
        let inner = self.inner.lock();
        let mut failed: Vec<&JobRecord> = inner
            .jobs
            .values()
            .filter(|j| j.state == JobState::Failed)
            .collect();
        failed.sort_by_key(|j| j.updated_at);
        Ok(failed
            .into_iter()
            .take(limit.max(0) as usize)
            .map(|j| j.job_id.clone())
            .collect())
    }

    async fn list_due_retries(&self, now: DateTime<Utc>, limit: i64) -> JobResult<Vec<JobId>> {
        let inner = self.inner.lock();
        let mut due: Vec<&JobRecord> = inner
            .jobs
            .values()
            .filter(|j| j.state == JobState::Retrying && j.next_run_at <= now)
            .collect();
        due.sort_by_key(|j| j.next_run_at);
        Ok(due
            .into_iter()
            .take(limit.max(0) as usize)
            .map(|j| j.job_id.clone())
            .collect())
    }

    async fn mark_retry_enqueued(&self, job_id: &JobId) -> JobResult<()> {
        self.with_job(job_id, |job, _| {
            if job.state == JobState::Retrying {
                job.state = JobState::Pending;
                job.available_at = Utc::now();
            }
            Ok(())
        })
    }

    async fn list_expired_leases(&self, now: DateTime<Utc>, limit: i64) -> JobResult<Vec<JobId>> {
        let inner = self.inner.lock();
        let mut expired: Vec<&JobRecord> = inner
            .jobs
            .values()
            .filter(|j| {
                j.state == JobState::InProgress
                    && j.lease_expires_at.map_or(false, |at| at <= now)
            })
            .collect();
        expired.sort_by_key(|j| j.lease_expires_at);
        Ok(expired
            .into_iter()
            .take(limit.max(0) as usize)
            .map(|j| j.job_id.clone())
            .collect())
    }

    async fn reset_lease(&self, job_id: &JobId) -> JobResult<()> {
        self.with_job(job_id, |job, _| {
            if job.state == JobState::InProgress {
                job.state = JobState::Pending;
                job.lease_owner = None;
                job.lease_expires_at = None;
                job.available_at = Utc::now();
            }
            Ok(())
        })
    }

    async fn retry_job(&self, job_id: &JobId) -> JobResult<()> {
        self.with_job(job_id, |job, inner| {
            let now = Utc::now();
            match job.state {
                JobState::Failed | JobState::Retrying => {
                    job.state = JobState::Pending;
                    job.last_error.clear();
                    job.next_run_at = now;
                    job.available_at = now;
                    Ok(())
                }
                // Retry from the dead-letter states is a replay: counters
                // reset and the DLQ entry (if any) is removed.
                JobState::Dlq | JobState::Dead => {
                    inner.dlq.remove(job_id.as_str());
                    job.state = JobState::Pending;
                    job.attempt_count = 0;
                    job.retry_count = 0;
                    job.last_error.clear();
                    job.next_run_at = now;
                    job.available_at = now;
                    Ok(())
                }
                from => Err(JobError::InvalidTransition {
                    job_id: job_id.to_string(),
                    from: from.to_string(),
                    to: JobState::Pending.to_string(),
                }),
            }
        })
    }

    async fn dlq_job(&self, job_id: &JobId, reason: &str) -> JobResult<()> {
        self.with_job(job_id, |job, inner| {
            match job.state {
                JobState::Pending
                | JobState::InProgress
                | JobState::Failed
                | JobState::Retrying => {
                    job.state = JobState::Dlq;
                    job.lease_owner = None;
                    job.lease_expires_at = None;
                    job.last_error = reason.to_string();
                    Self::insert_dlq_entry(inner, job_id, reason);
                    Ok(())
                }
                from => Err(JobError::InvalidTransition {
                    job_id: job_id.to_string(),
                    from: from.to_string(),
                    to: JobState::Dlq.to_string(),
                }),
            }
        })
    }

    async fn replay_dlq(&self, job_id: &JobId) -> JobResult<()> {
        self.with_job(job_id, |job, inner| {
            if inner.dlq.remove(job_id.as_str()).is_none() {
                return Err(JobError::NotFound(job_id.to_string()));
            }
            let now = Utc::now();
            job.state = JobState::Pending;
            job.attempt_count = 0;
            job.retry_count = 0;
            job.last_error.clear();
            job.next_run_at = now;
            job.available_at = now;
            Ok(())
        })
    }

    async fn list_dlq(&self, page: PageRequest) -> JobResult<(Vec<DlqEntry>, u64)> {
        let inner = self.inner.lock();
        let mut entries: Vec<DlqEntry> = inner.dlq.values().cloned().collect();
        entries.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        let total = entries.len() as u64;
        let items = entries
            .into_iter()
            .skip(page.offset)
            .take(page.limit)
            .collect();
        Ok((items, total))
    }

    async fn get_dlq_entry(&self, job_id: &JobId) -> JobResult<Option<DlqEntry>> {
        Ok(self.inner.lock().dlq.get(job_id.as_str()).cloned())
    }

    async fn stats(&self) -> JobResult<StateCounts> {
        let inner = self.inner.lock();
        let mut counts = StateCounts::default();
        for job in inner.jobs.values() {
            counts.total += 1;
            *counts.by_state.entry(job.state).or_insert(0) += 1;
        }
        Ok(counts)
    }

    async fn query_jobs(
        &self,
        filter: &JobFilter,
        page: PageRequest,
    ) -> JobResult<(Vec<JobRecord>, u64)> {
        let inner = self.inner.lock();
        let mut matched: Vec<JobRecord> = inner
            .jobs
            .values()
            .filter(|j| {
                filter
                    .queue_name
                    .as_deref()
                    .map_or(true, |q| j.queue_name == q)
                    && filter.state.map_or(true, |s| j.state == s)
                    && filter
                        .job_type
                        .as_deref()
                        .map_or(true, |t| j.job_type == t)
                    && filter.search.as_deref().map_or(true, |s| {
                        j.job_id.as_str().contains(s) || j.idempotency_key.contains(s)
                    })
            })
            .cloned()
            .collect();
        matched.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        let total = matched.len() as u64;
        let items = matched
            .into_iter()
            .skip(page.offset)
            .take(page.limit)
            .collect();
        Ok((items, total))
    }

    async fn get_traceparent(&self, job_id: &JobId) -> JobResult<Option<String>> {
        let inner = self.inner.lock();
        let job = inner
            .jobs
            .get(job_id.as_str())
            .ok_or_else(|| JobError::NotFound(job_id.to_string()))?;
        Ok(job.traceparent.clone())
    }
}

/// In-memory [`crate::queue::ReadyQueue`] with notify-based blocking pop.
#[derive(Default)]
pub struct MemoryReadyQueue {
    queues: Mutex<HashMap<String, VecDeque<JobId>>>,
    notifiers: Mutex<HashMap<String, Arc<Notify>>>,
}

impl MemoryReadyQueue {
    /// Creates an empty queue set.
    pub fn new() -> Self {
        Self::default()
    }

    fn notifier(&self, queue_name: &str) -> Arc<Notify> {
        self.notifiers
            .lock()
            .entry(queue_name.to_string())
            .or_insert_with(|| Arc::new(Notify::new()))
            .clone()
    }
}

#[async_trait]
impl crate::queue::ReadyQueue for MemoryReadyQueue {
    async fn enqueue(&self, queue_name: &str, job_id: &JobId) -> JobResult<()> {
        self.queues
            .lock()
            .entry(queue_name.to_string())
            .or_default()
            .push_back(job_id.clone());
        self.notifier(queue_name).notify_one();
        Ok(())
    }

    async fn pop(&self, queue_name: &str, block_for: Duration) -> JobResult<Option<JobId>> {
        let deadline = Instant::now() + block_for;
        loop {
            let notify = self.notifier(queue_name);
            // Register interest before checking so an enqueue between the
            // check and the wait cannot be missed.
            let notified = notify.notified();

            if let Some(id) = self
                .queues
                .lock()
                .get_mut(queue_name)
                .and_then(|q| q.pop_front())
            {
                return Ok(Some(id));
            }

            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Ok(None);
            }
            tokio::select! {
                _ = notified => {}
                _ = tokio::time::sleep(remaining) => return Ok(None),
            }
        }
    }

    async fn depth(&self, queue_name: &str) -> JobResult<u64> {
        Ok(self
            .queues
            .lock()
            .get(queue_name)
            .map_or(0, |q| q.len() as u64))
    }

    async fn ping(&self) -> JobResult<()> {
        Ok(())
    }
}
