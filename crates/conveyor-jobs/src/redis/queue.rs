//! Redis ready-queue implementation.
//!
//! `LPUSH` + `BRPOP` gives FIFO order with a blocking pop; `LLEN` exposes the
//! depth. Ids are plain strings with no message-level metadata.

use async_trait::async_trait;
use deadpool_redis::Pool;
use redis::AsyncCommands;
use std::time::Duration;
use tracing::debug;

use super::RedisKeys;
use crate::error::JobResult;
use crate::job::JobId;
use crate::queue::ReadyQueue;

/// Redis-backed [`ReadyQueue`].
pub struct RedisReadyQueue {
    pool: Pool,
    keys: RedisKeys,
}

impl RedisReadyQueue {
    /// Create a new Redis ready queue.
    pub fn new(pool: Pool, key_prefix: &str) -> Self {
        Self {
            pool,
            keys: RedisKeys::new(key_prefix),
        }
    }

    async fn conn(&self) -> JobResult<deadpool_redis::Connection> {
        Ok(self.pool.get().await?)
    }
}

#[async_trait]
impl ReadyQueue for RedisReadyQueue {
    async fn enqueue(&self, queue_name: &str, job_id: &JobId) -> JobResult<()> {
        let mut conn = self.conn().await?;
        let _: () = conn
            .lpush(self.keys.ready(queue_name), job_id.as_str())
            .await?;
        debug!(job_id = %job_id, queue = %queue_name, "Enqueued job id");
        Ok(())
    }

    async fn pop(&self, queue_name: &str, block_for: Duration) -> JobResult<Option<JobId>> {
        let mut conn = self.conn().await?;
        // BRPOP returns (key, value) or nil on timeout.
        let popped: Option<(String, String)> = conn
            .brpop(self.keys.ready(queue_name), block_for.as_secs_f64())
            .await?;
        Ok(popped.map(|(_, id)| JobId::from_string(id)))
    }

    async fn depth(&self, queue_name: &str) -> JobResult<u64> {
        let mut conn = self.conn().await?;
        let depth: u64 = conn.llen(self.keys.ready(queue_name)).await?;
        Ok(depth)
    }

    async fn ping(&self) -> JobResult<()> {
        let mut conn = self.conn().await?;
        let _: String = redis::cmd("PING").query_async(&mut *conn).await?;
        Ok(())
    }
}
