//! Engine configuration.

use serde::{Deserialize, Serialize};
use std::io;
use std::time::Duration;

use crate::classify::Classifier;
use crate::error::{JobError, JobResult};

/// Configuration for the job engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobsConfig {
    /// Queue this deployment serves.
    #[serde(default = "default_queue_name")]
    pub queue_name: String,

    /// Ready-queue Redis connection.
    #[serde(default)]
    pub redis: RedisConfig,

    /// Worker configuration.
    #[serde(default)]
    pub worker: WorkerConfig,

    /// Scheduler and reaper configuration.
    #[serde(default)]
    pub scheduler: SchedulerConfig,

    /// Failure classification configuration.
    #[serde(default)]
    pub classifier: ClassifierConfig,
}

impl Default for JobsConfig {
    fn default() -> Self {
        Self {
            queue_name: default_queue_name(),
            redis: RedisConfig::default(),
            worker: WorkerConfig::default(),
            scheduler: SchedulerConfig::default(),
            classifier: ClassifierConfig::default(),
        }
    }
}

impl JobsConfig {
    /// Validates the configuration.
    pub fn validate(&self) -> JobResult<()> {
        if self.queue_name.is_empty() {
            return Err(JobError::Configuration("queue_name must not be empty".into()));
        }
        if self.worker.concurrency < 1 {
            return Err(JobError::Configuration("worker.concurrency must be >= 1".into()));
        }
        if self.worker.lease_secs == 0 {
            return Err(JobError::Configuration("worker.lease_secs must be >= 1".into()));
        }
        if self.scheduler.tick_interval_ms == 0 {
            return Err(JobError::Configuration(
                "scheduler.tick_interval_ms must be >= 1".into(),
            ));
        }
        self.classifier.build()?;
        Ok(())
    }
}

fn default_queue_name() -> String {
    "jobs:ready".to_string()
}

/// Ready-queue Redis connection configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedisConfig {
    /// Redis URL.
    #[serde(default = "default_redis_url")]
    pub url: String,

    /// Connection pool size.
    #[serde(default = "default_pool_size")]
    pub pool_size: usize,

    /// Key prefix for all ready-queue keys.
    #[serde(default = "default_key_prefix")]
    pub key_prefix: String,
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self {
            url: default_redis_url(),
            pool_size: default_pool_size(),
            key_prefix: default_key_prefix(),
        }
    }
}

fn default_redis_url() -> String {
    "redis://localhost:6379".to_string()
}

fn default_pool_size() -> usize {
    10
}

fn default_key_prefix() -> String {
    "conveyor".to_string()
}

/// Worker configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerConfig {
    /// Concurrent executions per worker process.
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,

    /// Executions per second (0 = unlimited).
    #[serde(default)]
    pub rate_limit_per_sec: u32,

    /// Lease duration in seconds.
    #[serde(default = "default_lease_secs")]
    pub lease_secs: u64,

    /// Polling interval in milliseconds when the queue is idle.
    #[serde(default = "default_poll_interval")]
    pub poll_interval_ms: u64,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            concurrency: default_concurrency(),
            rate_limit_per_sec: 0,
            lease_secs: default_lease_secs(),
            poll_interval_ms: default_poll_interval(),
        }
    }
}

impl WorkerConfig {
    /// Returns the lease duration.
    pub fn lease_for(&self) -> Duration {
        Duration::from_secs(self.lease_secs)
    }

    /// Returns the poll interval.
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

fn default_concurrency() -> usize {
    10
}

fn default_lease_secs() -> u64 {
    30
}

fn default_poll_interval() -> u64 {
    100
}

/// Scheduler and reaper configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Tick interval in milliseconds.
    #[serde(default = "default_tick_interval")]
    pub tick_interval_ms: u64,

    /// Per-tick batch limit for retries and lease resets.
    #[serde(default = "default_batch_limit")]
    pub batch_limit: i64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            tick_interval_ms: default_tick_interval(),
            batch_limit: default_batch_limit(),
        }
    }
}

impl SchedulerConfig {
    /// Returns the tick interval.
    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }
}

fn default_tick_interval() -> u64 {
    1000
}

fn default_batch_limit() -> i64 {
    100
}

/// Failure classification configuration.
///
/// The retryable set is data so new infrastructure errors can be added
/// without rebuilding the worker.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClassifierConfig {
    /// I/O error kinds treated as retryable, by snake_case name.
    #[serde(default = "default_retryable_io_kinds")]
    pub retryable_io_kinds: Vec<String>,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            retryable_io_kinds: default_retryable_io_kinds(),
        }
    }
}

fn default_retryable_io_kinds() -> Vec<String> {
    [
        "connection_reset",
        "connection_refused",
        "connection_aborted",
        "timed_out",
        "host_unreachable",
        "network_unreachable",
        "not_connected",
        "broken_pipe",
    ]
    .into_iter()
    .map(String::from)
    .collect()
}

fn parse_io_kind(name: &str) -> Option<io::ErrorKind> {
    match name {
        "connection_reset" => Some(io::ErrorKind::ConnectionReset),
        "connection_refused" => Some(io::ErrorKind::ConnectionRefused),
        "connection_aborted" => Some(io::ErrorKind::ConnectionAborted),
        "timed_out" => Some(io::ErrorKind::TimedOut),
        "host_unreachable" => Some(io::ErrorKind::HostUnreachable),
        "network_unreachable" => Some(io::ErrorKind::NetworkUnreachable),
        "not_connected" => Some(io::ErrorKind::NotConnected),
        "broken_pipe" => Some(io::ErrorKind::BrokenPipe),
        "would_block" => Some(io::ErrorKind::WouldBlock),
        "interrupted" => Some(io::ErrorKind::Interrupted),
        "unexpected_eof" => Some(io::ErrorKind::UnexpectedEof),
        _ => None,
    }
}

impl ClassifierConfig {
    /// Builds the classifier, rejecting unknown kind names.
    pub fn build(&self) -> JobResult<Classifier> {
        let mut kinds = Vec::with_capacity(self.retryable_io_kinds.len());
        for name in &self.retryable_io_kinds {
            let kind = parse_io_kind(name).ok_or_else(|| {
                JobError::Configuration(format!("unknown io error kind: {}", name))
            })?;
            kinds.push(kind);
        }
        Ok(Classifier::new(kinds))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let cfg = JobsConfig::default();
        assert!(cfg.validate().is_ok());
        assert_eq!(cfg.queue_name, "jobs:ready");
        assert_eq!(cfg.worker.lease_for(), Duration::from_secs(30));
        assert_eq!(cfg.worker.poll_interval(), Duration::from_millis(100));
        assert_eq!(cfg.scheduler.tick_interval(), Duration::from_millis(1000));
    }

    #[test]
    fn test_zero_concurrency_rejected() {
        let mut cfg = JobsConfig::default();
        cfg.worker.concurrency = 0;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn test_unknown_io_kind_rejected() {
        let cfg = ClassifierConfig {
            retryable_io_kinds: vec!["flux_capacitor".into()],
        };
        assert!(cfg.build().is_err());
    }

    #[test]
    fn test_classifier_builds_from_defaults() {
        assert!(ClassifierConfig::default().build().is_ok());
    }
}
