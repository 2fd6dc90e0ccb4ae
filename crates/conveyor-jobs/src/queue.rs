//! Ready-queue contract: the FIFO hand-off of job ids to workers.
//!
//! The queue is a dispatch hint only. The store's `next_run_at` and
//! conditional transitions are authoritative: a duplicated id fails the
//! PENDING predicate on the second lease, and a lost id is rediscovered by
//! the reaper or the scheduler. Durability is therefore not required here.

use async_trait::async_trait;
use std::time::Duration;

use crate::error::JobResult;
use crate::job::JobId;

/// A named FIFO of job ids.
#[async_trait]
pub trait ReadyQueue: Send + Sync {
    /// Atomic append. No duplicate suppression: a job may legitimately
    /// appear twice after a lease reset and must still be picked up once.
    async fn enqueue(&self, queue_name: &str, job_id: &JobId) -> JobResult<()>;

    /// Blocks up to `block_for` for the next id.
    async fn pop(&self, queue_name: &str, block_for: Duration) -> JobResult<Option<JobId>>;

    /// Observable depth for metrics.
    async fn depth(&self, queue_name: &str) -> JobResult<u64>;

    /// Liveness check.
    async fn ping(&self) -> JobResult<()>;
}
