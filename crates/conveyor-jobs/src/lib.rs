//! Conveyor Jobs - durable distributed job queue engine
//!
//! Clients submit jobs with an idempotency key and a retry policy; workers
//! pick them up under exclusive leases; every job ends in terminal success,
//! exhausts its retries into the dead-letter queue, or is re-leased after a
//! worker crash.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │                        Conveyor Engine                           │
//! ├──────────────────────────────────────────────────────────────────┤
//! │                                                                  │
//! │  Submission ──▶ Job Store (Postgres) ──▶ Ready Queue (Redis)     │
//! │                    ▲   │  conditional        │  FIFO hint        │
//! │                    │   │  transitions        ▼                   │
//! │                    │   │              ┌────────────┐             │
//! │                    │   └─────────────▶│  Workers   │             │
//! │                    │     skip-locked  │ lease/exec │             │
//! │                    │     lease claim  │ heartbeat  │             │
//! │                    │                  └─────┬──────┘             │
//! │   ┌────────────────┴───────────┐            │                   │
//! │   │ Retry Scheduler + Reaper   │◀───────────┘                   │
//! │   │ backoff+jitter, DLQ,       │   FAILED / expired leases      │
//! │   │ lease recovery             │                                │
//! │   └────────────────────────────┘                                │
//! │                                                                  │
//! └──────────────────────────────────────────────────────────────────┘
//! ```
//!
//! The store is the single source of truth: every transition is a
//! conditional update and the ready queue is only a dispatch hint. Execution
//! is at-least-once; executors must be idempotent with respect to their
//! `job_id`.

pub mod classify;
pub mod config;
pub mod error;
pub mod job;
pub mod memory;
pub mod metrics;
pub mod postgres;
pub mod queue;
pub mod reaper;
pub mod redis;
pub mod retry;
pub mod scheduler;
pub mod store;
pub mod throttle;
pub mod worker;

pub use classify::{retryable, terminal, Classifier, ExecutionError, FailureClass};
pub use config::{ClassifierConfig, JobsConfig, RedisConfig, SchedulerConfig, WorkerConfig};
pub use error::{JobError, JobResult};
pub use job::{DlqEntry, JobId, JobRecord, JobState, NewJob};
pub use memory::{MemoryJobStore, MemoryReadyQueue};
pub use metrics::{register_metrics, JobMetrics, SchedulerMetrics, WorkerMetrics};
pub use postgres::PostgresJobStore;
pub use queue::ReadyQueue;
pub use reaper::LeaseReaper;
pub use redis::RedisReadyQueue;
pub use retry::RetryPolicy;
pub use scheduler::{RetryScheduler, MAX_ATTEMPTS_EXCEEDED};
pub use store::{JobFilter, JobStore, RetryState, StateCounts};
pub use throttle::{ThrottleGuard, Throttler};
pub use worker::{generate_worker_id, Executor, JobContext, Worker, WorkerLoop};

/// Re-export commonly used types.
pub mod prelude {
    pub use crate::classify::{retryable, terminal, ExecutionError};
    pub use crate::job::{JobId, JobState, NewJob};
    pub use crate::queue::ReadyQueue;
    pub use crate::retry::RetryPolicy;
    pub use crate::store::JobStore;
    pub use crate::worker::{JobContext, WorkerLoop};
    pub use crate::{JobError, JobResult};
}
