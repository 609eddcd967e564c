//! Retry with exponential backoff for unary chat calls.
//!
//! Streaming is never retried (`resilient.rs` forwards stream chunks
//! as-is); this module only backs the unary `chat()` path.

use std::future::Future;
use std::time::Duration;

use crate::error::Error;

/// Backoff schedule: `base_delay * 2^attempt`, capped at `max_delay`,
/// with uniform jitter pulled from the lower half of that range
/// (`[delay/2, delay]`) rather than a centered jitter — the schedule
/// never exceeds the deterministic cap even with jitter applied.
#[derive(Debug, Clone, Copy)]
pub struct RetryConfig {
    /// Number of retries *after* the first attempt (so a request can run
    /// up to `max_retries + 1` times total).
    pub max_retries: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(30),
        }
    }
}

impl RetryConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_max_retries(mut self, n: u32) -> Self {
        self.max_retries = n;
        self
    }

    pub fn with_base_delay(mut self, d: Duration) -> Self {
        self.base_delay = d;
        self
    }

    pub fn with_max_delay(mut self, d: Duration) -> Self {
        self.max_delay = d;
        self
    }

    /// Delay scheduled before retry attempt `attempt` (0-indexed: the
    /// sleep before the *second* try is `attempt == 0`).
    fn scheduled_delay(&self, attempt: u32) -> Duration {
        let exp = self.base_delay.as_millis() as f64 * 2f64.powi(attempt as i32);
        let capped = exp.min(self.max_delay.as_millis() as f64);
        let jittered = capped * (0.5 + rand::random::<f64>() * 0.5);
        Duration::from_millis(jittered.round() as u64)
    }
}

/// Retries `operation` up to `config.max_retries + 1` times total,
/// sleeping with [`RetryConfig::scheduled_delay`] between attempts,
/// stopping early on a non-retryable error. Returns the last error if
/// every attempt is exhausted.
pub async fn retry_with_backoff<F, Fut, T>(config: &RetryConfig, mut operation: F) -> Result<T, Error>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, Error>>,
{
    let total_attempts = config.max_retries + 1;
    let mut last_err = None;
    for attempt in 0..total_attempts {
        match operation().await {
            Ok(v) => return Ok(v),
            Err(e) => {
                let retryable = e.retryable();
                last_err = Some(e);
                if !retryable || attempt + 1 == total_attempts {
                    break;
                }
                let delay = config.scheduled_delay(attempt);
                log::warn!(
                    "retry attempt {}/{} after {:?}: {}",
                    attempt + 1,
                    total_attempts - 1,
                    delay,
                    last_err.as_ref().expect("just set above")
                );
                tokio::time::sleep(delay).await;
            }
        }
    }
    Err(last_err.expect("at least one attempt runs"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    #[test]
    fn scheduled_delay_stays_within_bounds() {
        let config = RetryConfig::new()
            .with_base_delay(Duration::from_millis(100))
            .with_max_delay(Duration::from_secs(10));
        for attempt in 0..6 {
            let d = config.scheduled_delay(attempt);
            let base = 100u128 * 2u128.pow(attempt);
            let cap = base.min(10_000);
            assert!(d.as_millis() as u128 >= cap / 2);
            assert!(d.as_millis() as u128 <= cap);
        }
    }

    #[tokio::test]
    async fn succeeds_on_first_attempt_without_sleeping() {
        let config = RetryConfig::new().with_max_retries(3);
        let calls = Arc::new(AtomicU32::new(0));
        let calls2 = calls.clone();
        let result: Result<i32, Error> = retry_with_backoff(&config, || {
            let calls = calls2.clone();
            async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok(42)
            }
        })
        .await;
        assert_eq!(result.unwrap(), 42);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn retries_retryable_errors_then_succeeds() {
        let config = RetryConfig::new()
            .with_max_retries(5)
            .with_base_delay(Duration::from_millis(1));
        let calls = Arc::new(AtomicU32::new(0));
        let calls2 = calls.clone();
        let result: Result<i32, Error> = retry_with_backoff(&config, || {
            let calls = calls2.clone();
            async move {
                let n = calls.fetch_add(1, Ordering::SeqCst);
                if n < 2 {
                    Err(Error::llm_unavailable("down"))
                } else {
                    Ok(7)
                }
            }
        })
        .await;
        assert_eq!(result.unwrap(), 7);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn stops_immediately_on_non_retryable_error() {
        let config = RetryConfig::new().with_max_retries(5).with_base_delay(Duration::from_millis(1));
        let calls = Arc::new(AtomicU32::new(0));
        let calls2 = calls.clone();
        let result: Result<i32, Error> = retry_with_backoff(&config, || {
            let calls = calls2.clone();
            async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(Error::llm_model_not_found("qwen3:8b"))
            }
        })
        .await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn exhausts_attempts_and_reports_exact_call_count() {
        // Scenario 5 from the testable-properties list: llm_request_failed
        // returned every time with max_retries=3 means exactly 4 inner
        // invocations (1 first attempt + 3 retries).
        let config = RetryConfig::new()
            .with_max_retries(3)
            .with_base_delay(Duration::from_millis(1));
        let calls = Arc::new(AtomicU32::new(0));
        let calls2 = calls.clone();
        let result: Result<i32, Error> = retry_with_backoff(&config, || {
            let calls = calls2.clone();
            async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(Error::llm_request_failed("boom"))
            }
        })
        .await;
        let err = result.unwrap_err();
        assert_eq!(err.code(), crate::error::Code::LlmRequestFailed);
        assert_eq!(calls.load(Ordering::SeqCst), 4);
    }
}
