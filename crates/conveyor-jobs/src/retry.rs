//! Retry policy: exponential backoff with bounded, seedable jitter.

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::error::{JobError, JobResult};

/// Retry policy persisted with every job, immutable after insert.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Total attempts allowed, including the first.
    pub max_attempts: u32,

    /// Delay before the first retry, in milliseconds.
    pub initial_delay_ms: u64,

    /// Multiplier applied per attempt.
    pub backoff_multiplier: f64,

    /// Upper bound for the computed delay, in milliseconds.
    pub max_delay_ms: u64,

    /// Symmetric multiplicative jitter fraction in [0, 1].
    pub jitter: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            initial_delay_ms: 1000,
            backoff_multiplier: 2.0,
            max_delay_ms: 60_000,
            jitter: 0.0,
        }
    }
}

impl RetryPolicy {
    /// Validates the policy bounds.
    pub fn validate(&self) -> JobResult<()> {
        if self.max_attempts < 1 {
            return Err(JobError::Configuration("maxAttempts must be >= 1".into()));
        }
        if self.backoff_multiplier < 1.0 {
            return Err(JobError::Configuration(
                "backoffMultiplier must be >= 1".into(),
            ));
        }
        if self.max_delay_ms < self.initial_delay_ms {
            return Err(JobError::Configuration(
                "maxDelayMs must be >= initialDelayMs".into(),
            ));
        }
        if !(0.0..=1.0).contains(&self.jitter) {
            return Err(JobError::Configuration(
                "jitter must be between 0 and 1".into(),
            ));
        }
        Ok(())
    }

    /// Returns the delay for the given 1-based attempt number.
    ///
    /// With `jitter = 0` (or no RNG) the result is fully deterministic:
    /// `min(initial * multiplier^(attempt-1), max_delay)`. With jitter, the
    /// clamped delay is scaled by `1 + uniform(-jitter, +jitter)` and floored
    /// at zero, so the delay curve never regresses below zero but stays
    /// bounded by `max_delay * (1 + jitter)`.
    pub fn next_delay<R: Rng>(&self, attempt: u32, rng: Option<&mut R>) -> Duration {
        if attempt < 1 {
            return Duration::ZERO;
        }

        let base = self.initial_delay_ms as f64;
        let exp = (attempt - 1) as i32;
        let mut delay = base * self.backoff_multiplier.powi(exp);
        if self.max_delay_ms > 0 && delay > self.max_delay_ms as f64 {
            delay = self.max_delay_ms as f64;
        }

        if self.jitter > 0.0 {
            if let Some(rng) = rng {
                let frac = (rng.gen::<f64>() * 2.0 - 1.0) * self.jitter;
                delay *= 1.0 + frac;
                if delay < 0.0 {
                    delay = 0.0;
                }
            }
        }

        Duration::from_millis(delay as u64)
    }

    /// Returns the absolute next run time for the given attempt.
    pub fn next_run_at<R: Rng>(
        &self,
        now: DateTime<Utc>,
        attempt: u32,
        rng: Option<&mut R>,
    ) -> DateTime<Utc> {
        let delay = self.next_delay(attempt, rng);
        now + ChronoDuration::from_std(delay).unwrap_or_else(|_| ChronoDuration::zero())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn policy(initial_ms: u64, mult: f64, max_ms: u64, jitter: f64) -> RetryPolicy {
        RetryPolicy {
            max_attempts: 5,
            initial_delay_ms: initial_ms,
            backoff_multiplier: mult,
            max_delay_ms: max_ms,
            jitter,
        }
    }

    #[test]
    fn test_exponential_backoff_no_jitter() {
        // {initial=1s, mult=2, max=10s, jitter=0} => [1s, 2s, 4s, 8s, 10s]
        let p = policy(1000, 2.0, 10_000, 0.0);
        let expected = [1000, 2000, 4000, 8000, 10_000];
        for (i, want) in expected.iter().enumerate() {
            let got = p.next_delay::<StdRng>(i as u32 + 1, None);
            assert_eq!(got, Duration::from_millis(*want), "attempt {}", i + 1);
        }
    }

    #[test]
    fn test_delay_clamped_at_max() {
        let p = policy(1000, 2.0, 5000, 0.0);
        assert_eq!(p.next_delay::<StdRng>(10, None), Duration::from_millis(5000));
    }

    #[test]
    fn test_attempt_zero_is_immediate() {
        let p = policy(1000, 2.0, 10_000, 0.0);
        assert_eq!(p.next_delay::<StdRng>(0, None), Duration::ZERO);
    }

    #[test]
    fn test_seeded_jitter_is_deterministic() {
        let p = policy(1000, 2.0, 60_000, 0.5);
        let mut rng1 = StdRng::seed_from_u64(42);
        let mut rng2 = StdRng::seed_from_u64(42);
        for attempt in 1..=5 {
            let a = p.next_delay(attempt, Some(&mut rng1));
            let b = p.next_delay(attempt, Some(&mut rng2));
            assert_eq!(a, b, "attempt {}", attempt);
        }
    }

    #[test]
    fn test_jitter_stays_within_band() {
        let p = policy(1000, 1.0, 60_000, 0.25);
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..200 {
            let d = p.next_delay(1, Some(&mut rng)).as_millis() as f64;
            assert!((750.0..=1250.0).contains(&d), "delay {} out of band", d);
        }
    }

    #[test]
    fn test_next_run_at_advances_monotonically() {
        let p = policy(1000, 2.0, 60_000, 0.0);
        let now = Utc::now();
        let mut prev = now;
        for attempt in 1..=5 {
            let at = p.next_run_at::<StdRng>(now, attempt, None);
            assert!(at > prev, "attempt {} did not advance", attempt);
            prev = at;
        }
    }

    #[test]
    fn test_validate_rejects_bad_policies() {
        assert!(policy(1000, 0.5, 60_000, 0.0).validate().is_err());
        assert!(policy(1000, 2.0, 500, 0.0).validate().is_err());
        assert!(policy(1000, 2.0, 60_000, 1.5).validate().is_err());
        assert!(RetryPolicy {
            max_attempts: 0,
            ..RetryPolicy::default()
        }
        .validate()
        .is_err());
        assert!(RetryPolicy::default().validate().is_ok());
    }
}
