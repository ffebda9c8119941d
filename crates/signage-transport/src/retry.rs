//! Exponential backoff with jitter (spec.md §4.1, "Retry & backoff").

use rand::Rng;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, warn};

/// Retry policy. Defaults match spec.md: `maxRetries=2`, `baseDelayMs=2000`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RetryConfig {
    pub max_retries: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
    pub multiplier: f64,
    pub jitter_factor: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 2,
            base_delay_ms: 2000,
            max_delay_ms: 30_000,
            multiplier: 2.0,
            jitter_factor: 0.2,
        }
    }
}

impl RetryConfig {
    /// Delay before attempt `attempt` (0-indexed: the first retry is
    /// `attempt == 0`), with jitter applied.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let base = self.base_delay_ms as f64 * self.multiplier.powi(attempt as i32);
        let capped = base.min(self.max_delay_ms as f64);
        let jitter_span = capped * self.jitter_factor;
        let jitter = rand::rng().random_range(-jitter_span..=jitter_span);
        Duration::from_millis((capped + jitter).max(0.0) as u64)
    }
}

/// Runs `op` up to `config.max_retries + 1` times, retrying only when
/// `is_retriable` returns true for the error and sleeping for the
/// configured backoff between attempts. A 304-style "no change" success
/// path never reaches this function — callers short-circuit on it before
/// treating anything as a retry candidate (spec.md §4.1).
pub async fn retry_async<T, E, Fut, Op, Retriable>(
    config: &RetryConfig,
    operation_name: &str,
    is_retriable: Retriable,
    mut op: Op,
) -> Result<T, E>
where
    Op: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T, E>>,
    Retriable: Fn(&E) -> bool,
{
    let mut attempt = 0;
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(err) if attempt < config.max_retries && is_retriable(&err) => {
                let delay = config.delay_for(attempt);
                warn!(
                    operation = operation_name,
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    "retrying after transient failure"
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(err) => {
                debug!(operation = operation_name, attempt, "giving up");
                return Err(err);
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[test]
    fn delay_grows_with_attempt_and_stays_capped() {
        let cfg = RetryConfig {
            jitter_factor: 0.0,
            ..Default::default()
        };
        assert_eq!(cfg.delay_for(0), Duration::from_millis(2000));
        assert_eq!(cfg.delay_for(1), Duration::from_millis(4000));
        assert_eq!(cfg.delay_for(10), Duration::from_millis(cfg.max_delay_ms));
    }

    #[tokio::test]
    async fn retries_until_success_within_budget() {
        let calls = AtomicU32::new(0);
        let cfg = RetryConfig {
            base_delay_ms: 1,
            max_delay_ms: 2,
            jitter_factor: 0.0,
            ..Default::default()
        };
        let result: Result<u32, &str> = retry_async(&cfg, "test", |_: &&str| true, || {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if n < 2 {
                    Err("transient")
                } else {
                    Ok(42)
                }
            }
        })
        .await;
        assert_eq!(result, Ok(42));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn non_retriable_error_returns_immediately() {
        let calls = AtomicU32::new(0);
        let cfg = RetryConfig::default();
        let result: Result<u32, &str> = retry_async(&cfg, "test", |_: &&str| false, || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err("fatal") }
        })
        .await;
        assert_eq!(result, Err("fatal"));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn exhausts_retry_budget() {
        let calls = AtomicU32::new(0);
        let cfg = RetryConfig {
            max_retries: 2,
            base_delay_ms: 1,
            max_delay_ms: 2,
            jitter_factor: 0.0,
            ..Default::default()
        };
        let result: Result<u32, &str> = retry_async(&cfg, "test", |_: &&str| true, || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err("always") }
        })
        .await;
        assert_eq!(result, Err("always"));
        assert_eq!(calls.load(Ordering::SeqCst), 3); // initial + 2 retries
    }
}
