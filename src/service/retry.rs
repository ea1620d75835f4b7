//! Exponential backoff for transient store failures.

use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

use rand::Rng;
use tokio::time::Instant;
use tracing::warn;

use crate::config::RetryConfig;

/// Retry policy with a growing, jittered delay and a total time budget.
#[derive(Debug, Clone)]
pub struct ExponentialBackoff {
    initial_interval: Duration,
    max_interval: Duration,
    max_elapsed: Duration,
    multiplier: f64,
    randomization_factor: f64,
}

impl ExponentialBackoff {
    /// Build the policy from configuration.
    #[must_use]
    pub const fn from_config(config: &RetryConfig) -> Self {
        Self {
            initial_interval: Duration::from_millis(config.initial_interval_ms),
            max_interval: Duration::from_millis(config.max_interval_ms),
            max_elapsed: Duration::from_millis(config.max_elapsed_ms),
            multiplier: config.multiplier,
            randomization_factor: config.randomization_factor,
        }
    }

    /// Run `operation` until it succeeds or the time budget is spent.
    ///
    /// Gives up before sleeping if the next delay would take the total past
    /// the budget.
    ///
    /// # Errors
    ///
    /// Returns the error of the last attempt once the budget is exhausted.
    pub async fn retry<T, E, F, Fut>(&self, operation: &str, mut attempt_fn: F) -> Result<T, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Display,
    {
        let started = Instant::now();
        let mut interval = self.initial_interval;
        let mut attempt: u32 = 1;

        loop {
            let err = match attempt_fn().await {
                Ok(value) => return Ok(value),
                Err(err) => err,
            };

            let delay = self.jittered(interval);
            if started.elapsed() + delay > self.max_elapsed {
                return Err(err);
            }

            warn!(
                operation,
                attempt,
                delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                error = %err,
                "Attempt failed, retrying"
            );

            tokio::time::sleep(delay).await;
            interval = interval.mul_f64(self.multiplier).min(self.max_interval);
            attempt += 1;
        }
    }

    fn jittered(&self, interval: Duration) -> Duration {
        if self.randomization_factor <= 0.0 {
            return interval;
        }
        let base = interval.as_secs_f64();
        let delta = base * self.randomization_factor;
        let secs = rand::rng().random_range((base - delta)..=(base + delta));
        Duration::from_secs_f64(secs.max(0.0))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};

    use super::*;

    fn policy(randomization_factor: f64) -> ExponentialBackoff {
        ExponentialBackoff::from_config(&RetryConfig {
            initial_interval_ms: 100,
            max_interval_ms: 400,
            max_elapsed_ms: 1000,
            multiplier: 2.0,
            randomization_factor,
        })
    }

    #[tokio::test(start_paused = true)]
    async fn test_succeeds_after_transient_failures() {
        let attempts = &AtomicU32::new(0);
        let started = Instant::now();

        let result: Result<u32, String> = policy(0.0)
            .retry("test", move || async move {
                let n = attempts.fetch_add(1, Ordering::SeqCst) + 1;
                if n < 3 { Err(format!("failure {n}")) } else { Ok(n) }
            })
            .await;

        assert_eq!(result.unwrap(), 3);
        let elapsed = started.elapsed();
        assert!(elapsed >= Duration::from_millis(300) && elapsed < Duration::from_millis(310));
    }

    #[tokio::test(start_paused = true)]
    async fn test_gives_up_when_budget_spent() {
        let attempts = &AtomicU32::new(0);
        let started = Instant::now();

        let result: Result<(), String> = policy(0.0)
            .retry("test", move || async move {
                let n = attempts.fetch_add(1, Ordering::SeqCst) + 1;
                Err(format!("failure {n}"))
            })
            .await;

        // Delays 100, 200, 400; the next 400 would end at 1100ms.
        assert_eq!(result.unwrap_err(), "failure 4");
        assert_eq!(attempts.load(Ordering::SeqCst), 4);
        let elapsed = started.elapsed();
        assert!(elapsed >= Duration::from_millis(700) && elapsed < Duration::from_millis(710));
    }

    #[test]
    fn test_jitter_stays_within_factor() {
        let backoff = policy(0.5);
        for _ in 0..1000 {
            let delay = backoff.jittered(Duration::from_millis(100));
            assert!(delay >= Duration::from_millis(49));
            assert!(delay <= Duration::from_millis(151));
        }
    }
}
