//! Redis-backed ready queue.

mod queue;

pub use queue::RedisReadyQueue;

use deadpool_redis::{Config, Pool, Runtime};
use tracing::info;

use crate::error::{JobError, JobResult};

/// Create a Redis connection pool.
pub async fn create_pool(url: &str, pool_size: usize) -> JobResult<Pool> {
    info!("Creating Redis connection pool for ready queue...");

    let cfg = Config::from_url(url);
    let pool = cfg
        .builder()
        .map_err(|e| JobError::Configuration(format!("Invalid Redis config: {}", e)))?
        .max_size(pool_size)
        .runtime(Runtime::Tokio1)
        .build()
        .map_err(|e| JobError::Configuration(format!("Failed to create pool: {}", e)))?;

    // Test connection
    let mut conn = pool.get().await?;
    redis::cmd("PING").query_async::<String>(&mut *conn).await?;

    info!("Redis connection pool created successfully");

    Ok(pool)
}

/// Redis key builder for the ready queue.
pub struct RedisKeys {
    prefix: String,
}

impl RedisKeys {
    /// Create a new key builder with the given prefix.
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }

    /// Ready list for a queue (list of job ids, FIFO).
    pub fn ready(&self, queue_name: &str) -> String {
        format!("{}:ready:{}", self.prefix, queue_name)
    }
}

impl Default for RedisKeys {
    fn default() -> Self {
        Self::new("conveyor")
    }
}
