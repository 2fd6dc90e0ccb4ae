//! Worker loop: lease a job, execute it under a heartbeat, classify the
//! outcome, and commit it under lease ownership.
//!
//! The worker never retries in-process. A predicate miss on commit means the
//! lease was lost mid-flight; the worker logs and abandons, and the reaper or
//! scheduler recovers the job. A crashed worker simply leaves an IN_PROGRESS
//! row with an expiring lease.

use chrono::Utc;
use futures::future::BoxFuture;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn, Instrument};
use uuid::Uuid;

use crate::classify::{Classifier, ExecutionError, FailureClass};
use crate::error::{JobError, JobResult};
use crate::job::JobId;
use crate::metrics::JobMetrics;
use crate::store::JobStore;
use crate::throttle::Throttler;

/// Execution context handed to the executor.
#[derive(Debug, Clone)]
pub struct JobContext {
    /// Job ID. The executor must be idempotent with respect to it: an
    /// attempt whose commit is lost will re-execute after lease expiry.
    pub job_id: JobId,
    /// Queue name.
    pub queue_name: String,
    /// Dispatch hint.
    pub job_type: String,
    /// Opaque payload as submitted.
    pub payload: String,
    /// 1-based attempt number.
    pub attempt: u32,
    /// Cancels this execution only. Worker shutdown does NOT fire this; the
    /// in-flight attempt always runs to completion.
    pub cancel: CancellationToken,
}

/// Job executor: user-supplied per-deployment execution logic.
pub type Executor =
    Arc<dyn Fn(JobContext) -> BoxFuture<'static, Result<(), ExecutionError>> + Send + Sync>;

/// Derives a worker id stable for the process lifetime.
pub fn generate_worker_id() -> String {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos())
        .unwrap_or_default();
    let nonce = Uuid::new_v4().to_string();
    format!("worker-{}-{}", nanos, &nonce[..8])
}

/// Lease-holding side of a worker: claim, renew, heartbeat.
#[derive(Clone)]
pub struct Worker {
    store: Arc<dyn JobStore>,
    worker_id: String,
    lease_for: Duration,
    renew_every: Duration,
}

impl Worker {
    /// Creates a worker that renews at half the lease duration.
    pub fn new(store: Arc<dyn JobStore>, worker_id: impl Into<String>, lease_for: Duration) -> Self {
        Self {
            store,
            worker_id: worker_id.into(),
            lease_for,
            renew_every: lease_for / 2,
        }
    }

    /// The opaque worker id.
    pub fn worker_id(&self) -> &str {
        &self.worker_id
    }

    /// Claims the next due job in the queue.
    pub async fn lease_next(&self, queue_name: &str) -> JobResult<Option<JobId>> {
        self.store
            .lease_next_job(queue_name, &self.worker_id, Utc::now(), self.lease_for)
            .await
    }

    /// Renews the lease on a held job.
    pub async fn renew(&self, job_id: &JobId) -> JobResult<bool> {
        self.store
            .renew_lease(job_id, &self.worker_id, self.lease_for)
            .await
    }

    /// Renews the lease every `lease_for / 2` until `stop` fires.
    ///
    /// A renew that reports "no effect" means the lease was revoked or the
    /// job finalized: `lease_lost` is set and the heartbeat ends. Store
    /// errors are logged and the heartbeat keeps going.
    async fn heartbeat(&self, job_id: JobId, stop: CancellationToken, lease_lost: Arc<AtomicBool>) {
        loop {
            tokio::select! {
                _ = stop.cancelled() => return,
                _ = tokio::time::sleep(self.renew_every) => {
                    match self.renew(&job_id).await {
                        Ok(true) => {
                            debug!(job_id = %job_id, worker_id = %self.worker_id, "Lease renewed");
                        }
                        Ok(false) => {
                            warn!(job_id = %job_id, worker_id = %self.worker_id, "Lease lost during heartbeat");
                            lease_lost.store(true, Ordering::SeqCst);
                            return;
                        }
                        Err(e) => {
                            warn!(job_id = %job_id, error = %e, "Heartbeat renew failed; continuing");
                        }
                    }
                }
            }
        }
    }
}

/// The poll-execute-commit loop for one queue.
pub struct WorkerLoop {
    worker: Worker,
    store: Arc<dyn JobStore>,
    queue_name: String,
    poll_interval: Duration,
    throttler: Option<Arc<Throttler>>,
    classifier: Classifier,
}

impl WorkerLoop {
    /// Creates a loop with the default 100 ms poll interval.
    pub fn new(
        store: Arc<dyn JobStore>,
        queue_name: impl Into<String>,
        worker_id: impl Into<String>,
        lease_for: Duration,
    ) -> Self {
        Self {
            worker: Worker::new(store.clone(), worker_id, lease_for),
            store,
            queue_name: queue_name.into(),
            poll_interval: Duration::from_millis(100),
            throttler: None,
            classifier: Classifier::default(),
        }
    }

    /// Overrides the poll interval.
    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    /// Attaches a throttler.
    pub fn with_throttler(mut self, throttler: Arc<Throttler>) -> Self {
        self.throttler = Some(throttler);
        self
    }

    /// Overrides the failure classifier.
    pub fn with_classifier(mut self, classifier: Classifier) -> Self {
        self.classifier = classifier;
        self
    }

    /// Runs until `shutdown` fires.
    ///
    /// Shutdown stops the loop from issuing new leases but never cancels the
    /// in-flight executor: once a job is leased, the current attempt runs to
    /// completion under its own cancellation scope.
    pub async fn run(&self, shutdown: CancellationToken, execute: Executor) -> JobResult<()> {
        info!(
            queue = %self.queue_name,
            worker_id = %self.worker.worker_id(),
            "Worker loop started"
        );
        loop {
            if shutdown.is_cancelled() {
                info!(worker_id = %self.worker.worker_id(), "Worker loop stopping");
                return Ok(());
            }

            match self.worker.lease_next(&self.queue_name).await? {
                Some(job_id) => {
                    let exec_cancel = CancellationToken::new();
                    self.process_one(&job_id, &execute, exec_cancel).await?;
                }
                None => {
                    tokio::select! {
                        _ = shutdown.cancelled() => {
                            info!(worker_id = %self.worker.worker_id(), "Worker loop stopping");
                            return Ok(());
                        }
                        _ = tokio::time::sleep(self.poll_interval) => {}
                    }
                }
            }
        }
    }

    /// Executes one leased job and commits the outcome.
    ///
    /// Executor errors never propagate: they are classified and committed.
    /// Only a store failure while committing surfaces as an error. A commit
    /// predicate miss (lease lost) is logged and abandoned.
    pub async fn process_one(
        &self,
        job_id: &JobId,
        execute: &Executor,
        exec_cancel: CancellationToken,
    ) -> JobResult<()> {
        let record = self
            .store
            .get_job(job_id)
            .await?
            .ok_or_else(|| JobError::NotFound(job_id.to_string()))?;

        let _guard = match &self.throttler {
            Some(throttler) => match throttler.acquire(&exec_cancel).await {
                Ok(guard) => Some(guard),
                Err(JobError::Cancelled) => {
                    warn!(job_id = %job_id, "Throttle wait cancelled; abandoning attempt");
                    return Ok(());
                }
                Err(e) => return Err(e),
            },
            None => None,
        };

        let hb_stop = CancellationToken::new();
        let lease_lost = Arc::new(AtomicBool::new(false));
        let heartbeat = {
            let worker = self.worker.clone();
            let job_id = job_id.clone();
            let hb_stop = hb_stop.clone();
            let lease_lost = lease_lost.clone();
            tokio::spawn(async move { worker.heartbeat(job_id, hb_stop, lease_lost).await })
        };

        let waited = Utc::now()
            .signed_duration_since(record.available_at)
            .to_std()
            .unwrap_or_default();
        JobMetrics::time_in_queue(&self.queue_name, waited);
        JobMetrics::attempt(&self.queue_name);

        let span = tracing::info_span!(
            "execute_job",
            job_id = %job_id,
            queue = %self.queue_name,
            traceparent = record.traceparent.as_deref().unwrap_or(""),
        );
        let ctx = JobContext {
            job_id: job_id.clone(),
            queue_name: record.queue_name.clone(),
            job_type: record.job_type.clone(),
            payload: record.payload.clone(),
            attempt: record.attempt_count,
            cancel: exec_cancel,
        };

        let start = Instant::now();
        let result = execute(ctx).instrument(span).await;
        JobMetrics::runtime(&self.queue_name, start.elapsed());

        hb_stop.cancel();
        let _ = heartbeat.await;

        let worker_id = self.worker.worker_id();
        match result {
            Ok(()) => {
                if self.store.mark_job_succeeded(job_id, worker_id).await? {
                    JobMetrics::success(&self.queue_name);
                    debug!(job_id = %job_id, "Job completed");
                } else {
                    warn!(job_id = %job_id, worker_id = %worker_id, "Lease lost; abandoning success commit");
                }
            }
            Err(err) => {
                JobMetrics::failure(&self.queue_name);
                match self.classifier.classify(&err) {
                    FailureClass::Retryable => {
                        if self
                            .store
                            .mark_job_failed(job_id, worker_id, &err.to_string())
                            .await?
                        {
                            debug!(job_id = %job_id, error = %err, "Job failed; retry pending");
                        } else {
                            warn!(job_id = %job_id, worker_id = %worker_id, "Lease lost; abandoning failure commit");
                        }
                    }
                    FailureClass::Terminal => {
                        if self
                            .store
                            .mark_job_terminal(job_id, worker_id, &err.to_string())
                            .await?
                        {
                            JobMetrics::dead_lettered(&self.queue_name, "terminal_error");
                            warn!(job_id = %job_id, error = %err, "Job dead-lettered");
                        } else {
                            warn!(job_id = %job_id, worker_id = %worker_id, "Lease lost; abandoning terminal commit");
                        }
                    }
                }
            }
        }

        if lease_lost.load(Ordering::SeqCst) {
            debug!(job_id = %job_id, "Heartbeat had reported lease loss");
        }

        Ok(())
    }
}
