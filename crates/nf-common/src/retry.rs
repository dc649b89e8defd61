//! Generic retry-with-backoff helper.
//!
//! A single implementation underlies Database Gateway queries, processor
//! persistence calls, and side-channel publishes. The caller supplies a
//! `classify` closure that decides retryable vs terminal from an error
//! value, never from string matching.

use std::future::Future;
use std::time::Duration;
use tracing::debug;

#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    /// Total attempts, including the first. `max_attempts = 3` means up to
    /// two retries after the initial try.
    pub max_attempts: u32,
    pub initial_delay: Duration,
    pub factor: f64,
}

impl RetryPolicy {
    pub const fn new(max_attempts: u32, initial_delay: Duration, factor: f64) -> Self {
        Self {
            max_attempts,
            initial_delay,
            factor,
        }
    }

    fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let millis = self.initial_delay.as_millis() as f64 * self.factor.powi(attempt as i32 - 1);
        Duration::from_millis(millis as u64)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(3, Duration::from_secs(1), 2.0)
    }
}

/// Run `op` up to `policy.max_attempts` times, sleeping with exponential
/// backoff between attempts, stopping early when `classify` says the error is
/// not worth retrying.
pub async fn with_retry<T, E, F, Fut>(
    policy: &RetryPolicy,
    classify: impl Fn(&E) -> bool,
    mut op: F,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    let mut attempt = 0;
    loop {
        attempt += 1;
        match op().await {
            Ok(value) => return Ok(value),
            Err(err) => {
                let retryable = classify(&err);
                if !retryable || attempt >= policy.max_attempts {
                    return Err(err);
                }
                let delay = policy.delay_for_attempt(attempt);
                debug!(attempt, delay_ms = delay.as_millis() as u64, "retrying after transient error");
                tokio::time::sleep(delay).await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test]
    async fn retries_until_success() {
        let attempts = AtomicU32::new(0);
        let policy = RetryPolicy::new(5, Duration::from_millis(1), 1.0);

        let result: Result<u32, &str> = with_retry(&policy, |_| true, || {
            let n = attempts.fetch_add(1, Ordering::SeqCst) + 1;
            async move {
                if n < 3 {
                    Err("transient")
                } else {
                    Ok(n)
                }
            }
        })
        .await;

        assert_eq!(result, Ok(3));
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn stops_on_non_retryable() {
        let attempts = AtomicU32::new(0);
        let policy = RetryPolicy::new(5, Duration::from_millis(1), 1.0);

        let result: Result<u32, &str> = with_retry(&policy, |_| false, || {
            attempts.fetch_add(1, Ordering::SeqCst);
            async move { Err("permanent") }
        })
        .await;

        assert_eq!(result, Err("permanent"));
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn exhausts_max_attempts() {
        let attempts = AtomicU32::new(0);
        let policy = RetryPolicy::new(3, Duration::from_millis(1), 1.0);

        let result: Result<u32, &str> = with_retry(&policy, |_| true, || {
            attempts.fetch_add(1, Ordering::SeqCst);
            async move { Err("always fails") }
        })
        .await;

        assert_eq!(result, Err("always fails"));
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
    }
}
