//! Lease reaper: returns jobs whose worker disappeared to the ready queue.

use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::{info, warn};

use crate::error::JobResult;
use crate::metrics::{JobMetrics, SchedulerMetrics};
use crate::queue::ReadyQueue;
use crate::store::JobStore;

/// Default per-tick batch limit.
const DEFAULT_BATCH_LIMIT: i64 = 100;

/// Detects expired leases and re-queues their jobs.
pub struct LeaseReaper {
    store: Arc<dyn JobStore>,
    queue: Arc<dyn ReadyQueue>,
    queue_name: String,
    limit: i64,
}

impl LeaseReaper {
    /// Creates a reaper with the default batch limit of 100.
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

    /// Resets every expired lease and re-enqueues the job id.
    ///
    /// Order matters: reset before enqueue, so a fast worker that pops the id
    /// immediately sees PENDING. A late heartbeat from the old worker loses
    /// the race at the store predicate and the old worker abandons.
    pub async fn requeue_expired_leases(&self, now: DateTime<Utc>) -> JobResult<usize> {
        let ids = self.store.list_expired_leases(now, self.limit).await?;
        for id in &ids {
            self.store.reset_lease(id).await?;
            self.queue.enqueue(&self.queue_name, id).await?;
            JobMetrics::enqueued(&self.queue_name);
            warn!(job_id = %id, queue = %self.queue_name, "Expired lease reset; job re-queued");
        }
        if !ids.is_empty() {
            SchedulerMetrics::leases_reaped(&self.queue_name, ids.len() as u64);
            info!(count = ids.len(), queue = %self.queue_name, "Reclaimed expired leases");
        }
        Ok(ids.len())
    }
}
