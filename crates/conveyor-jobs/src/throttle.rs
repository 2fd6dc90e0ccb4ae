//! Execution throttling: a concurrency semaphore plus an optional token
//! bucket.
//!
//! Both acquisition points are cancellable, and every blocked wait is counted
//! so throttling pressure is observable. Permits are released on all exit
//! paths via the guard's `Drop`.

use governor::clock::DefaultClock;
use governor::middleware::NoOpMiddleware;
use governor::state::{InMemoryState, NotKeyed};
use governor::{Quota, RateLimiter};
use std::num::NonZeroU32;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio_util::sync::CancellationToken;

use crate::error::{JobError, JobResult};
use crate::metrics::WorkerMetrics;

type DirectLimiter = RateLimiter<NotKeyed, InMemoryState, DefaultClock, NoOpMiddleware>;

/// Per-process throttler for one queue.
pub struct Throttler {
    queue_name: String,
    sem: Option<Arc<Semaphore>>,
    rate: Option<DirectLimiter>,
    capacity: usize,
    in_flight: AtomicUsize,
}

impl Throttler {
    /// Creates a throttler. `concurrency = 0` disables the semaphore;
    /// `rate_per_sec = 0` disables the token bucket.
    pub fn new(queue_name: impl Into<String>, concurrency: usize, rate_per_sec: u32) -> Self {
        let sem = (concurrency > 0).then(|| Arc::new(Semaphore::new(concurrency)));
        let rate = NonZeroU32::new(rate_per_sec)
            .map(|rate| RateLimiter::direct(Quota::per_second(rate)));
        Self {
            queue_name: queue_name.into(),
            sem,
            rate,
            capacity: concurrency,
            in_flight: AtomicUsize::new(0),
        }
    }

    /// Acquires a concurrency permit and a rate token, blocking as needed.
    ///
    /// Cancellation during either wait returns
    /// [`JobError::Cancelled`](crate::error::JobError::Cancelled) with no
    /// permit held.
    pub async fn acquire(&self, cancel: &CancellationToken) -> JobResult<ThrottleGuard<'_>> {
        let permit = match &self.sem {
            Some(sem) => match sem.clone().try_acquire_owned() {
                Ok(permit) => Some(permit),
                Err(_) => {
                    WorkerMetrics::concurrency_throttled(&self.queue_name);
                    tokio::select! {
                        permit = sem.clone().acquire_owned() => {
                            Some(permit.map_err(|_| JobError::Cancelled)?)
                        }
                        _ = cancel.cancelled() => return Err(JobError::Cancelled),
                    }
                }
            },
            None => None,
        };

        if let Some(rate) = &self.rate {
            if rate.check().is_err() {
                WorkerMetrics::rate_throttled(&self.queue_name);
                tokio::select! {
                    _ = rate.until_ready() => {}
                    // The semaphore permit (if any) drops with the early
                    // return, before the caller ever saw it.
                    _ = cancel.cancelled() => return Err(JobError::Cancelled),
                }
            }
        }

        let in_flight = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        WorkerMetrics::utilization(&self.queue_name, in_flight, self.capacity);

        Ok(ThrottleGuard {
            throttler: self,
            _permit: permit,
        })
    }

    /// Current in-flight count.
    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::SeqCst)
    }

    fn release(&self) {
        let in_flight = self
            .in_flight
            .fetch_sub(1, Ordering::SeqCst)
            .saturating_sub(1);
        WorkerMetrics::utilization(&self.queue_name, in_flight, self.capacity);
    }
}

/// Held for the duration of one execution; releases on drop.
pub struct ThrottleGuard<'a> {
    throttler: &'a Throttler,
    _permit: Option<OwnedSemaphorePermit>,
}

impl Drop for ThrottleGuard<'_> {
    fn drop(&mut self) {
        self.throttler.release();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_concurrency_limit_enforced() {
        let throttler = Arc::new(Throttler::new("q", 2, 0));
        let cancel = CancellationToken::new();

        let g1 = throttler.acquire(&cancel).await.unwrap();
        let _g2 = throttler.acquire(&cancel).await.unwrap();
        assert_eq!(throttler.in_flight(), 2);

        // Third acquire blocks until a guard drops.
        let blocked = {
            let throttler = throttler.clone();
            let cancel = cancel.clone();
            tokio::spawn(async move { throttler.acquire(&cancel).await.map(|_| ()) })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!blocked.is_finished());

        drop(g1);
        tokio::time::timeout(Duration::from_millis(200), blocked)
            .await
            .expect("acquire should unblock")
            .unwrap()
            .unwrap();
    }

    #[tokio::test]
    async fn test_cancelled_acquire_returns_error() {
        let throttler = Arc::new(Throttler::new("q", 1, 0));
        let cancel = CancellationToken::new();
        let _held = throttler.acquire(&cancel).await.unwrap();

        let waiter_cancel = CancellationToken::new();
        let waiter = {
            let throttler = throttler.clone();
            let waiter_cancel = waiter_cancel.clone();
            tokio::spawn(async move { throttler.acquire(&waiter_cancel).await.map(|_| ()) })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;
        waiter_cancel.cancel();

        let result = waiter.await.unwrap();
        assert!(matches!(result, Err(JobError::Cancelled)));
        assert_eq!(throttler.in_flight(), 1);
    }

    #[tokio::test]
    async fn test_release_restores_capacity() {
        let throttler = Arc::new(Throttler::new("q", 1, 0));
        let cancel = CancellationToken::new();
        {
            let _guard = throttler.acquire(&cancel).await.unwrap();
            assert_eq!(throttler.in_flight(), 1);
        }
        assert_eq!(throttler.in_flight(), 0);
        let _again = throttler.acquire(&cancel).await.unwrap();
    }

    #[tokio::test]
    async fn test_disabled_throttler_never_blocks() {
        let throttler = Arc::new(Throttler::new("q", 0, 0));
        let cancel = CancellationToken::new();
        for _ in 0..32 {
            let _guard = throttler.acquire(&cancel).await.unwrap();
        }
    }
}
