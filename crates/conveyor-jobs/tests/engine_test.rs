//! End-to-end engine scenarios against the in-memory store and queue.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::FutureExt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use conveyor_core::PageRequest;
use conveyor_jobs::{
    DlqEntry, ExecutionError, JobError, JobFilter, JobId, JobRecord, JobResult, JobState,
    JobStore, LeaseReaper, MemoryJobStore, MemoryReadyQueue, NewJob, ReadyQueue, RetryPolicy,
    RetryScheduler, RetryState, StateCounts, WorkerLoop, MAX_ATTEMPTS_EXCEEDED,
};

fn new_job(key: &str, policy: RetryPolicy) -> NewJob {
    NewJob {
        queue_name: "jobs:ready".into(),
        job_type: "demo".into(),
        payload: r#"{"n":1}"#.into(),
        idempotency_key: key.into(),
        policy,
        traceparent: None,
    }
}

/// Store wrapper that counts lease renewals, standing in for heartbeat
/// observation.
struct CountingStore {
    inner: MemoryJobStore,
    renew_count: AtomicU64,
}

impl CountingStore {
    fn new() -> Self {
        Self {
            inner: MemoryJobStore::new(),
            renew_count: AtomicU64::new(0),
        }
    }

    fn renews(&self) -> u64 {
        self.renew_count.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl JobStore for CountingStore {
    async fn ping(&self) -> JobResult<()> {
        self.inner.ping().await
    }
    async fn insert_job(&self, job_id: JobId, job: NewJob) -> JobResult<()> {
        self.inner.insert_job(job_id, job).await
    }
    async fn get_job(&self, job_id: &JobId) -> JobResult<Option<JobRecord>> {
        self.inner.get_job(job_id).await
    }
    async fn get_job_by_idempotency_key(
        &self,
        queue_name: &str,
        key: &str,
    ) -> JobResult<Option<JobRecord>> {
        self.inner.get_job_by_idempotency_key(queue_name, key).await
    }
    async fn lease_next_job(
        &self,
        queue_name: &str,
        worker_id: &str,
        now: DateTime<Utc>,
        lease_for: Duration,
    ) -> JobResult<Option<JobId>> {
        self.inner
            .lease_next_job(queue_name, worker_id, now, lease_for)
            .await
    }
    async fn acquire_lease(
        &self,
        job_id: &JobId,
        worker_id: &str,
        now: DateTime<Utc>,
        lease_for: Duration,
    ) -> JobResult<bool> {
        self.inner.acquire_lease(job_id, worker_id, now, lease_for).await
    }
    async fn renew_lease(
        &self,
        job_id: &JobId,
        worker_id: &str,
        extend_by: Duration,
    ) -> JobResult<bool> {
        self.renew_count.fetch_add(1, Ordering::SeqCst);
        self.inner.renew_lease(job_id, worker_id, extend_by).await
    }
    async fn mark_job_succeeded(&self, job_id: &JobId, worker_id: &str) -> JobResult<bool> {
        self.inner.mark_job_succeeded(job_id, worker_id).await
    }
    async fn mark_job_failed(
        &self,
        job_id: &JobId,
        worker_id: &str,
        last_error: &str,
    ) -> JobResult<bool> {
        self.inner.mark_job_failed(job_id, worker_id, last_error).await
    }
    async fn mark_job_terminal(
        &self,
        job_id: &JobId,
        worker_id: &str,
        reason: &str,
    ) -> JobResult<bool> {
        self.inner.mark_job_terminal(job_id, worker_id, reason).await
    }
    async fn get_retry_state(&self, job_id: &JobId) -> JobResult<RetryState> {
        self.inner.get_retry_state(job_id).await
    }
    async fn update_retry_schedule(
        &self,
        job_id: &JobId,
        retry_count: u32,
        next_run_at: DateTime<Utc>,
    ) -> JobResult<bool> {
        self.inner
            .update_retry_schedule(job_id, retry_count, next_run_at)
            .await
    }
    async fn mark_exhausted(&self, job_id: &JobId, reason: &str) -> JobResult<bool> {
        self.inner.mark_exhausted(job_id, reason).await
    }
    async fn list_failed(&self, limit: i64) -> JobResult<Vec<JobId>> {
        self.inner.list_failed(limit).await
    }
    async fn list_due_retries(&self, now: DateTime<Utc>, limit: i64) -> JobResult<Vec<JobId>> {
        self.inner.list_due_retries(now, limit).await
    }
    async fn mark_retry_enqueued(&self, job_id: &JobId) -> JobResult<()> {
        self.inner.mark_retry_enqueued(job_id).await
    }
    async fn list_expired_leases(&self, now: DateTime<Utc>, limit: i64) -> JobResult<Vec<JobId>> {
        self.inner.list_expired_leases(now, limit).await
    }
    async fn reset_lease(&self, job_id: &JobId) -> JobResult<()> {
        self.inner.reset_lease(job_id).await
    }
    async fn retry_job(&self, job_id: &JobId) -> JobResult<()> {
        self.inner.retry_job(job_id).await
    }
    async fn dlq_job(&self, job_id: &JobId, reason: &str) -> JobResult<()> {
        self.inner.dlq_job(job_id, reason).await
    }
    async fn replay_dlq(&self, job_id: &JobId) -> JobResult<()> {
        self.inner.replay_dlq(job_id).await
    }
    async fn list_dlq(&self, page: PageRequest) -> JobResult<(Vec<DlqEntry>, u64)> {
        self.inner.list_dlq(page).await
    }
    async fn get_dlq_entry(&self, job_id: &JobId) -> JobResult<Option<DlqEntry>> {
        self.inner.get_dlq_entry(job_id).await
    }
    async fn stats(&self) -> JobResult<StateCounts> {
        self.inner.stats().await
    }
    async fn query_jobs(
        &self,
        filter: &JobFilter,
        page: PageRequest,
    ) -> JobResult<(Vec<JobRecord>, u64)> {
        self.inner.query_jobs(filter, page).await
    }
    async fn get_traceparent(&self, job_id: &JobId) -> JobResult<Option<String>> {
        self.inner.get_traceparent(job_id).await
    }
}

fn noop_executor() -> conveyor_jobs::Executor {
    Arc::new(|_ctx| async { Ok(()) }.boxed())
}

#[tokio::test]
async fn idempotent_submission_returns_existing_job() {
    let store = MemoryJobStore::new();
    let first = JobId::new();
    store
        .insert_job(first.clone(), new_job("K", RetryPolicy::default()))
        .await
        .unwrap();

    let err = store
        .insert_job(JobId::new(), new_job("K", RetryPolicy::default()))
        .await
        .unwrap_err();
    assert!(matches!(err, JobError::Conflict { .. }));

    let existing = store
        .get_job_by_idempotency_key("jobs:ready", "K")
        .await
        .unwrap()
        .expect("existing job");
    assert_eq!(existing.job_id, first);
}

#[tokio::test]
async fn traceparent_round_trips_through_the_store() {
    let store = MemoryJobStore::new();
    let id = JobId::new();
    let mut job = new_job("K", RetryPolicy::default());
    job.traceparent = Some("00-4bf92f3577b34da6a3ce929d0e0e4736-00f067aa0ba902b7-01".into());
    store.insert_job(id.clone(), job).await.unwrap();

    let tp = store.get_traceparent(&id).await.unwrap();
    assert_eq!(
        tp.as_deref(),
        Some("00-4bf92f3577b34da6a3ce929d0e0e4736-00f067aa0ba902b7-01")
    );
}

#[tokio::test]
async fn lease_exclusivity_under_concurrency() {
    let store = Arc::new(MemoryJobStore::new());
    let id = JobId::new();
    store
        .insert_job(id.clone(), new_job("K", RetryPolicy::default()))
        .await
        .unwrap();

    let mut handles = Vec::new();
    for i in 0..8 {
        let store = store.clone();
        handles.push(tokio::spawn(async move {
            store
                .lease_next_job(
                    "jobs:ready",
                    &format!("worker-{}", i),
                    Utc::now(),
                    Duration::from_secs(30),
                )
                .await
                .unwrap()
        }));
    }

    let mut winners = 0;
    for handle in handles {
        if handle.await.unwrap().is_some() {
            winners += 1;
        }
    }
    assert_eq!(winners, 1, "exactly one lease claim must succeed");

    let job = store.get_job(&id).await.unwrap().unwrap();
    assert_eq!(job.state, JobState::InProgress);
    assert!(job.lease_owner.is_some());
    assert_eq!(job.attempt_count, 1);
}

#[tokio::test]
async fn reaper_recovers_expired_lease() {
    let store: Arc<dyn JobStore> = Arc::new(MemoryJobStore::new());
    let queue = Arc::new(MemoryReadyQueue::new());
    let id = JobId::new();
    store
        .insert_job(id.clone(), new_job("K", RetryPolicy::default()))
        .await
        .unwrap();

    // W1 takes a 1s lease at t0; at t0+2s the lease is expired.
    let t0 = Utc::now();
    assert!(store
        .acquire_lease(&id, "w1", t0, Duration::from_secs(1))
        .await
        .unwrap());

    let reaper = LeaseReaper::new(store.clone(), queue.clone(), "jobs:ready");
    let reclaimed = reaper
        .requeue_expired_leases(t0 + chrono::Duration::seconds(2))
        .await
        .unwrap();
    assert_eq!(reclaimed, 1);

    let popped = queue
        .pop("jobs:ready", Duration::from_millis(50))
        .await
        .unwrap();
    assert_eq!(popped, Some(id.clone()));

    let job = store.get_job(&id).await.unwrap().unwrap();
    assert_eq!(job.state, JobState::Pending);
    assert!(job.lease_owner.is_none());

    // W2 can now claim it.
    assert!(store
        .acquire_lease(&id, "w2", Utc::now(), Duration::from_secs(30))
        .await
        .unwrap());
    let job = store.get_job(&id).await.unwrap().unwrap();
    assert_eq!(job.lease_owner.as_deref(), Some("w2"));
}

#[tokio::test]
async fn late_worker_commit_loses_to_reaper() {
    let store: Arc<dyn JobStore> = Arc::new(MemoryJobStore::new());
    let queue = Arc::new(MemoryReadyQueue::new());
    let id = JobId::new();
    store
        .insert_job(id.clone(), new_job("K", RetryPolicy::default()))
        .await
        .unwrap();

    let t0 = Utc::now();
    store
        .acquire_lease(&id, "w1", t0, Duration::from_millis(10))
        .await
        .unwrap();

    let reaper = LeaseReaper::new(store.clone(), queue.clone(), "jobs:ready");
    reaper
        .requeue_expired_leases(t0 + chrono::Duration::seconds(1))
        .await
        .unwrap();

    // The old worker's heartbeat and commit both fail their predicates.
    assert!(!store
        .renew_lease(&id, "w1", Duration::from_secs(30))
        .await
        .unwrap());
    assert!(!store.mark_job_succeeded(&id, "w1").await.unwrap());

    let job = store.get_job(&id).await.unwrap().unwrap();
    assert_eq!(job.state, JobState::Pending);
}

#[tokio::test]
async fn cancelled_execution_commits_failed_and_heartbeat_stops() {
    let store = Arc::new(CountingStore::new());
    let id = JobId::new();
    store
        .insert_job(id.clone(), new_job("K", RetryPolicy::default()))
        .await
        .unwrap();
    assert!(store
        .acquire_lease(&id, "lease-1", Utc::now(), Duration::from_millis(30))
        .await
        .unwrap());

    let store_dyn: Arc<dyn JobStore> = store.clone();
    let worker_loop = WorkerLoop::new(
        store_dyn,
        "jobs:ready",
        "lease-1",
        Duration::from_millis(30),
    );

    let exec_cancel = CancellationToken::new();
    {
        let exec_cancel = exec_cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(40)).await;
            exec_cancel.cancel();
        });
    }

    let executor: conveyor_jobs::Executor = Arc::new(|ctx| {
        async move {
            ctx.cancel.cancelled().await;
            Err(ExecutionError::Cancelled)
        }
        .boxed()
    });

    worker_loop
        .process_one(&id, &executor, exec_cancel)
        .await
        .unwrap();

    let job = store.get_job(&id).await.unwrap().unwrap();
    assert_eq!(job.state, JobState::Failed, "cancellation is retryable");
    assert!(!job.last_error.is_empty());

    // Heartbeat stopped with the execution.
    let renews_after = store.renews();
    tokio::time::sleep(Duration::from_millis(80)).await;
    assert_eq!(store.renews(), renews_after);
}

#[tokio::test]
async fn heartbeat_keeps_long_execution_leased() {
    let store = Arc::new(CountingStore::new());
    let id = JobId::new();
    store
        .insert_job(id.clone(), new_job("K", RetryPolicy::default()))
        .await
        .unwrap();
    assert!(store
        .acquire_lease(&id, "lease-1", Utc::now(), Duration::from_millis(40))
        .await
        .unwrap());

    let store_dyn: Arc<dyn JobStore> = store.clone();
    let worker_loop = WorkerLoop::new(
        store_dyn,
        "jobs:ready",
        "lease-1",
        Duration::from_millis(40),
    );

    // Runs well past the initial lease; heartbeat must keep it alive.
    let executor: conveyor_jobs::Executor = Arc::new(|_ctx| {
        async {
            tokio::time::sleep(Duration::from_millis(120)).await;
            Ok(())
        }
        .boxed()
    });

    worker_loop
        .process_one(&id, &executor, CancellationToken::new())
        .await
        .unwrap();

    assert!(store.renews() >= 1, "lease should have been renewed");
    let job = store.get_job(&id).await.unwrap().unwrap();
    assert_eq!(job.state, JobState::Completed);
}

#[tokio::test]
async fn graceful_shutdown_finishes_current_job() {
    let store: Arc<dyn JobStore> = Arc::new(MemoryJobStore::new());
    let id = JobId::new();
    store
        .insert_job(id.clone(), new_job("K", RetryPolicy::default()))
        .await
        .unwrap();

    let worker_loop = Arc::new(
        WorkerLoop::new(store.clone(), "jobs:ready", "w1", Duration::from_secs(30))
            .with_poll_interval(Duration::from_millis(5)),
    );

    let (started_tx, started_rx) = tokio::sync::oneshot::channel::<()>();
    let (done_tx, done_rx) = tokio::sync::oneshot::channel::<()>();
    let started_tx = std::sync::Mutex::new(Some(started_tx));
    let done_tx = std::sync::Mutex::new(Some(done_tx));

    let executor: conveyor_jobs::Executor = Arc::new(move |_ctx| {
        let started = started_tx.lock().unwrap().take();
        let done = done_tx.lock().unwrap().take();
        async move {
            if let Some(tx) = started {
                let _ = tx.send(());
            }
            tokio::time::sleep(Duration::from_millis(30)).await;
            if let Some(tx) = done {
                let _ = tx.send(());
            }
            Ok(())
        }
        .boxed()
    });

    let shutdown = CancellationToken::new();
    let run = {
        let worker_loop = worker_loop.clone();
        let shutdown = shutdown.clone();
        tokio::spawn(async move { worker_loop.run(shutdown, executor).await })
    };

    started_rx.await.unwrap();
    shutdown.cancel();

    // The in-flight job must finish even though shutdown fired.
    tokio::time::timeout(Duration::from_millis(500), done_rx)
        .await
        .expect("in-flight job should finish during graceful shutdown")
        .unwrap();

    run.await.unwrap().unwrap();
    let job = store.get_job(&id).await.unwrap().unwrap();
    assert_eq!(job.state, JobState::Completed);
}

#[tokio::test]
async fn exhaustion_to_dlq_and_replay() {
    let store: Arc<dyn JobStore> = Arc::new(MemoryJobStore::new());
    let queue = Arc::new(MemoryReadyQueue::new());
    let id = JobId::new();
    let policy = RetryPolicy {
        max_attempts: 3,
        initial_delay_ms: 0,
        backoff_multiplier: 1.0,
        max_delay_ms: 0,
        jitter: 0.0,
    };
    store.insert_job(id.clone(), new_job("K", policy)).await.unwrap();

    let scheduler = RetryScheduler::new(store.clone(), queue.clone(), "jobs:ready");

    // Three consecutive retryable failures.
    for attempt in 1..=3 {
        assert!(store
            .acquire_lease(&id, "w1", Utc::now(), Duration::from_secs(30))
            .await
            .unwrap());
        assert!(store.mark_job_failed(&id, "w1", "boom").await.unwrap());

        let scheduled = scheduler.schedule_retry(&id, Utc::now(), 1).await.unwrap();
        if attempt < 3 {
            assert!(scheduled.is_some(), "attempt {} should schedule", attempt);
            // Promote the due retry so the next lease can happen.
            let promoted = scheduler.enqueue_due_retries(Utc::now()).await.unwrap();
            assert_eq!(promoted, 1);
        } else {
            assert!(scheduled.is_none(), "third failure must exhaust");
        }
    }

    let job = store.get_job(&id).await.unwrap().unwrap();
    assert_eq!(job.state, JobState::Dlq);
    assert_eq!(job.last_error, MAX_ATTEMPTS_EXCEEDED);

    let entry = store.get_dlq_entry(&id).await.unwrap().expect("dlq entry");
    assert_eq!(entry.reason, MAX_ATTEMPTS_EXCEEDED);

    // Replay resets counters and clears the entry atomically.
    store.replay_dlq(&id).await.unwrap();
    let job = store.get_job(&id).await.unwrap().unwrap();
    assert_eq!(job.state, JobState::Pending);
    assert_eq!(job.attempt_count, 0);
    assert_eq!(job.retry_count, 0);
    assert!(store.get_dlq_entry(&id).await.unwrap().is_none());
}

#[tokio::test]
async fn retry_schedule_advances_and_is_bounded() {
    let store: Arc<dyn JobStore> = Arc::new(MemoryJobStore::new());
    let queue = Arc::new(MemoryReadyQueue::new());
    let id = JobId::new();
    let policy = RetryPolicy {
        max_attempts: 10,
        initial_delay_ms: 100,
        backoff_multiplier: 2.0,
        max_delay_ms: 1000,
        jitter: 0.0,
    };
    store.insert_job(id.clone(), new_job("K", policy)).await.unwrap();

    let scheduler = RetryScheduler::new(store.clone(), queue.clone(), "jobs:ready");
    let now = Utc::now();
    let mut prev = now;

    for _ in 0..5 {
        store
            .acquire_lease(&id, "w1", Utc::now(), Duration::from_secs(30))
            .await
            .unwrap();
        store.mark_job_failed(&id, "w1", "boom").await.unwrap();

        let next = scheduler
            .schedule_retry(&id, now, 7)
            .await
            .unwrap()
            .expect("scheduled");
        assert!(next > prev, "next_run_at must advance");
        assert!(
            next <= now + chrono::Duration::milliseconds(1000),
            "delay bounded by max_delay_ms"
        );
        prev = next;

        // Make it leasable again for the next round.
        store.mark_retry_enqueued(&id).await.unwrap();
        let job = store.get_job(&id).await.unwrap().unwrap();
        assert_eq!(job.state, JobState::Pending);
    }
}

#[tokio::test]
async fn scheduler_scans_failed_rows() {
    let store: Arc<dyn JobStore> = Arc::new(MemoryJobStore::new());
    let queue = Arc::new(MemoryReadyQueue::new());
    let scheduler = RetryScheduler::new(store.clone(), queue.clone(), "jobs:ready");

    let mut ids = Vec::new();
    for i in 0..3 {
        let id = JobId::new();
        store
            .insert_job(id.clone(), new_job(&format!("K{}", i), RetryPolicy::default()))
            .await
            .unwrap();
        store
            .acquire_lease(&id, "w1", Utc::now(), Duration::from_secs(30))
            .await
            .unwrap();
        store.mark_job_failed(&id, "w1", "boom").await.unwrap();
        ids.push(id);
    }

    let touched = scheduler.schedule_failed(Utc::now(), 99).await.unwrap();
    assert_eq!(touched, 3);
    for id in &ids {
        let job = store.get_job(id).await.unwrap().unwrap();
        assert_eq!(job.state, JobState::Retrying);
        assert_eq!(job.retry_count, 1);
    }
}

#[tokio::test]
async fn full_cycle_submit_enqueue_execute_complete() {
    let store: Arc<dyn JobStore> = Arc::new(MemoryJobStore::new());
    let queue: Arc<dyn ReadyQueue> = Arc::new(MemoryReadyQueue::new());

    let id = JobId::new();
    store
        .insert_job(id.clone(), new_job("K", RetryPolicy::default()))
        .await
        .unwrap();
    queue.enqueue("jobs:ready", &id).await.unwrap();

    let worker_loop = Arc::new(
        WorkerLoop::new(store.clone(), "jobs:ready", "w1", Duration::from_secs(30))
            .with_poll_interval(Duration::from_millis(5)),
    );
    let shutdown = CancellationToken::new();
    let run = {
        let worker_loop = worker_loop.clone();
        let shutdown = shutdown.clone();
        tokio::spawn(async move { worker_loop.run(shutdown, noop_executor()).await })
    };

    // Wait for the worker to pick it up and finish.
    let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
    loop {
        let job = store.get_job(&id).await.unwrap().unwrap();
        if job.state == JobState::Completed {
            break;
        }
        assert!(
            tokio::time::Instant::now() < deadline,
            "job never completed; state {:?}",
            job.state
        );
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    shutdown.cancel();
    run.await.unwrap().unwrap();
}

#[tokio::test]
async fn stats_count_by_state() {
    let store = MemoryJobStore::new();
    for i in 0..3 {
        store
            .insert_job(JobId::new(), new_job(&format!("K{}", i), RetryPolicy::default()))
            .await
            .unwrap();
    }
    let id = JobId::new();
    store
        .insert_job(id.clone(), new_job("done", RetryPolicy::default()))
        .await
        .unwrap();
    store
        .acquire_lease(&id, "w1", Utc::now(), Duration::from_secs(30))
        .await
        .unwrap();
    store.mark_job_succeeded(&id, "w1").await.unwrap();

    let counts = store.stats().await.unwrap();
    assert_eq!(counts.total, 4);
    assert_eq!(counts.get(JobState::Pending), 3);
    assert_eq!(counts.get(JobState::Completed), 1);
    assert_eq!(counts.get(JobState::Dlq), 0);
}

#[tokio::test]
async fn query_jobs_filters_and_paginates() {
    let store = MemoryJobStore::new();
    for i in 0..5 {
        store
            .insert_job(JobId::new(), new_job(&format!("key-{}", i), RetryPolicy::default()))
            .await
            .unwrap();
    }

    let (items, total) = store
        .query_jobs(
            &JobFilter {
                state: Some(JobState::Pending),
                ..JobFilter::default()
            },
            PageRequest::new(2, 0),
        )
        .await
        .unwrap();
    assert_eq!(total, 5);
    assert_eq!(items.len(), 2);

    let (items, total) = store
        .query_jobs(
            &JobFilter {
                search: Some("key-3".into()),
                ..JobFilter::default()
            },
            PageRequest::default(),
        )
        .await
        .unwrap();
    assert_eq!(total, 1);
    assert_eq!(items[0].idempotency_key, "key-3");
}

#[tokio::test]
async fn manual_dlq_and_manual_retry() {
    let store = MemoryJobStore::new();
    let id = JobId::new();
    store
        .insert_job(id.clone(), new_job("K", RetryPolicy::default()))
        .await
        .unwrap();

    // Manual cancel from PENDING goes to DLQ with the given reason.
    store.dlq_job(&id, "canceled").await.unwrap();
    let job = store.get_job(&id).await.unwrap().unwrap();
    assert_eq!(job.state, JobState::Dlq);
    let entry = store.get_dlq_entry(&id).await.unwrap().unwrap();
    assert_eq!(entry.reason, "canceled");

    // Manual retry from DLQ is a replay: counters reset, entry removed.
    store.retry_job(&id).await.unwrap();
    let job = store.get_job(&id).await.unwrap().unwrap();
    assert_eq!(job.state, JobState::Pending);
    assert_eq!(job.attempt_count, 0);
    assert!(store.get_dlq_entry(&id).await.unwrap().is_none());

    // DLQ from a terminal state is rejected.
    store
        .acquire_lease(&id, "w1", Utc::now(), Duration::from_secs(30))
        .await
        .unwrap();
    store.mark_job_succeeded(&id, "w1").await.unwrap();
    let err = store.dlq_job(&id, "nope").await.unwrap_err();
    assert!(matches!(err, JobError::InvalidTransition { .. }));
}
