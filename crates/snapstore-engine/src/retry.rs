//! Retry with exponential backoff and per-attempt timeout

use std::future::Future;
use std::time::Duration;

use snapstore_core::errors::{Result, SnapStoreError};

const DEFAULT_MAX_ATTEMPTS: u32 = 3;
const DEFAULT_BASE_DELAY: Duration = Duration::from_millis(50);
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

/// How often, how patiently and how long to call a fallible collaborator
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, the first one included; at least 1
    pub max_attempts: u32,
    /// Delay after the first failure; doubles after each further one
    pub base_delay: Duration,
    /// Per-attempt limit; `None` waits forever
    pub timeout: Option<Duration>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            base_delay: DEFAULT_BASE_DELAY,
            timeout: Some(DEFAULT_TIMEOUT),
        }
    }
}

impl RetryPolicy {
    /// Single attempt, no timeout
    pub fn once() -> Self {
        Self {
            max_attempts: 1,
            base_delay: Duration::ZERO,
            timeout: None,
        }
    }

    pub fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = attempts.max(1);
        self
    }

    pub fn with_base_delay(mut self, delay: Duration) -> Self {
        self.base_delay = delay;
        self
    }

    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    /// Backoff after failed attempt number `attempt` (1-based)
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
        self.base_delay.saturating_mul(factor)
    }

    /// Only transport-level failures are worth another attempt
    pub fn is_retryable(err: &SnapStoreError) -> bool {
        matches!(
            err,
            SnapStoreError::ExternalService { .. } | SnapStoreError::Timeout { .. }
        )
    }

    /// Run `op` until it succeeds, fails permanently, or attempts run out
    ///
    /// # Errors
    ///
    /// Returns the last error; an attempt exceeding the timeout yields
    /// `Timeout` for `target`.
    pub async fn run<T, F, Fut>(&self, target: &str, mut op: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let max_attempts = self.max_attempts.max(1);
        let mut attempt = 1;
        loop {
            let outcome = match self.timeout {
                Some(limit) => match tokio::time::timeout(limit, op()).await {
                    Ok(result) => result,
                    Err(_) => Err(SnapStoreError::Timeout {
                        target: target.to_string(),
                        after_ms: limit.as_millis() as u64,
                    }),
                },
                None => op().await,
            };

            match outcome {
                Ok(value) => return Ok(value),
                Err(err) if attempt < max_attempts && Self::is_retryable(&err) => {
                    let delay = self.delay_for(attempt);
                    tracing::warn!(
                        target_ref = target,
                        attempt = attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "retrying after failure"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(err) => return Err(err),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[test]
    fn test_backoff_doubles() {
        let policy = RetryPolicy::default().with_base_delay(Duration::from_millis(10));
        assert_eq!(policy.delay_for(1), Duration::from_millis(10));
        assert_eq!(policy.delay_for(2), Duration::from_millis(20));
        assert_eq!(policy.delay_for(4), Duration::from_millis(80));
    }

    #[tokio::test]
    async fn test_retries_transport_failures_then_succeeds() {
        let policy = RetryPolicy::default().with_base_delay(Duration::from_millis(1));
        let calls = AtomicU32::new(0);

        let result = policy
            .run("tasks/t1", || async {
                if calls.fetch_add(1, Ordering::SeqCst) < 2 {
                    Err(SnapStoreError::ExternalService {
                        target: "tasks/t1".to_string(),
                        message: "flaky".to_string(),
                    })
                } else {
                    Ok(7)
                }
            })
            .await;

        assert_eq!(result.unwrap(), 7);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_does_not_retry_permanent_errors() {
        let policy = RetryPolicy::default().with_base_delay(Duration::from_millis(1));
        let calls = AtomicU32::new(0);

        let result: Result<()> = policy
            .run("tasks/t1", || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(SnapStoreError::NotFound {
                    store_id: "tasks".into(),
                    id: "t1".into(),
                })
            })
            .await;

        assert!(result.unwrap_err().is_not_found());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_slow_attempt_times_out() {
        let policy = RetryPolicy::once().with_timeout(Some(Duration::from_millis(5)));

        let result = policy
            .run("tasks/slow", || async {
                tokio::time::sleep(Duration::from_millis(200)).await;
                Ok(())
            })
            .await;

        assert!(matches!(
            result,
            Err(SnapStoreError::Timeout { after_ms: 5, .. })
        ));
    }
}
