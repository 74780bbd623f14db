//! Retry logic with exponential backoff.
//!
//! Every attempt runs under the policy's timeout. A timeout is classified like
//! any other transient failure. Only errors for which
//! [`Error::is_retryable`] holds are retried; authentication failures return
//! immediately.

use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use rand::Rng;

use crate::config::DownloadConfig;
use crate::error::{Error, Result};

/// Retry and timeout settings for network calls.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Retries after the first attempt.
    pub max_retries: u32,
    /// Delay before the first retry; doubled for each further retry.
    pub base_delay: Duration,
    pub max_delay: Duration,
    /// Per-attempt timeout for requests and per-chunk stall timeout for transfers.
    pub timeout: Duration,
    /// Ceiling for a whole file transfer attempt.
    pub transfer_timeout: Duration,
    /// Add up to 10% random delay to each backoff.
    pub jitter: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            timeout: Duration::from_secs(30),
            transfer_timeout: Duration::from_secs(30 * 60),
            jitter: true,
        }
    }
}

impl RetryPolicy {
    pub fn from_config(config: &DownloadConfig) -> Self {
        Self {
            max_retries: config.max_retries,
            base_delay: Duration::from_millis(config.retry_base_delay_ms),
            max_delay: Duration::from_millis(config.retry_max_delay_ms),
            timeout: Duration::from_secs(config.timeout_seconds),
            transfer_timeout: Duration::from_secs(config.timeout_seconds.saturating_mul(60)),
            jitter: true,
        }
    }

    /// Backoff before retry number `retry` (1-based), without jitter.
    pub fn delay_for_retry(&self, retry: u32) -> Duration {
        let factor = 2u32.saturating_pow(retry.saturating_sub(1));
        self.base_delay.saturating_mul(factor).min(self.max_delay)
    }

    /// Same policy with the per-attempt timeout raised to the transfer ceiling.
    pub fn for_transfer(&self) -> Self {
        Self {
            timeout: self.transfer_timeout,
            ..self.clone()
        }
    }
}

/// Counters shared by every call made through one fetcher.
#[derive(Debug, Default)]
pub struct RetryStats {
    attempts: AtomicU64,
    retries: AtomicU64,
    failures: AtomicU64,
}

impl RetryStats {
    pub fn attempts(&self) -> u64 {
        self.attempts.load(Ordering::Relaxed)
    }

    pub fn retries(&self) -> u64 {
        self.retries.load(Ordering::Relaxed)
    }

    /// Calls that gave up, either non-retryable or out of retries.
    pub fn failures(&self) -> u64 {
        self.failures.load(Ordering::Relaxed)
    }
}

fn add_jitter(delay: Duration) -> Duration {
    let max_jitter = delay.as_millis() as u64 / 10;
    if max_jitter == 0 {
        return delay;
    }
    delay + Duration::from_millis(rand::thread_rng().gen_range(0..=max_jitter))
}

/// Run `operation` until it succeeds, fails permanently, or retries run out.
pub async fn with_retry<F, Fut, T>(
    policy: &RetryPolicy,
    stats: &RetryStats,
    mut operation: F,
) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut retries = 0;

    loop {
        stats.attempts.fetch_add(1, Ordering::Relaxed);

        let outcome = match tokio::time::timeout(policy.timeout, operation()).await {
            Ok(result) => result,
            Err(_) => Err(Error::Timeout(policy.timeout)),
        };

        match outcome {
            Ok(value) => {
                if retries > 0 {
                    tracing::info!(attempts = retries + 1, "Request succeeded after retry");
                }
                return Ok(value);
            }
            Err(e) if e.is_retryable() && retries < policy.max_retries => {
                retries += 1;
                stats.retries.fetch_add(1, Ordering::Relaxed);

                let mut delay = policy.delay_for_retry(retries);
                if let Error::RateLimited(secs) = &e {
                    delay = delay.max(Duration::from_secs(*secs)).min(policy.max_delay);
                }
                if policy.jitter {
                    delay = add_jitter(delay);
                }

                tracing::warn!(
                    error = %e,
                    attempt = retries,
                    max_retries = policy.max_retries,
                    delay_ms = delay.as_millis() as u64,
                    "Request failed, retrying"
                );

                tokio::time::sleep(delay).await;
            }
            Err(e) => {
                stats.failures.fetch_add(1, Ordering::Relaxed);
                if e.is_retryable() {
                    tracing::error!(
                        error = %e,
                        attempts = retries + 1,
                        "Request failed after all retries"
                    );
                } else {
                    tracing::debug!(error = %e, "Request failed with non-retryable error");
                }
                return Err(e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicU32;
    use std::sync::Arc;

    fn fast_policy(max_retries: u32) -> RetryPolicy {
        RetryPolicy {
            max_retries,
            base_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(10),
            timeout: Duration::from_millis(200),
            transfer_timeout: Duration::from_secs(1),
            jitter: false,
        }
    }

    fn unavailable() -> Error {
        Error::Status {
            status: 503,
            url: "https://canvas.test/api/v1/courses".into(),
        }
    }

    #[tokio::test]
    async fn test_fails_twice_then_succeeds() {
        let policy = fast_policy(3);
        let stats = RetryStats::default();
        let calls = Arc::new(AtomicU32::new(0));

        let counter = calls.clone();
        let result = with_retry(&policy, &stats, || {
            let counter = counter.clone();
            async move {
                if counter.fetch_add(1, Ordering::SeqCst) < 2 {
                    Err(unavailable())
                } else {
                    Ok("done")
                }
            }
        })
        .await;

        assert_eq!(tokio_test::assert_ok!(result), "done");
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert_eq!(stats.retries(), 2);
        assert_eq!(stats.attempts(), 3);
        assert_eq!(stats.failures(), 0);
    }

    #[tokio::test]
    async fn test_authentication_is_never_retried() {
        let policy = fast_policy(3);
        let stats = RetryStats::default();

        let result: Result<()> = with_retry(&policy, &stats, || async {
            Err(Error::Authentication("HTTP 401".into()))
        })
        .await;

        assert!(matches!(result, Err(Error::Authentication(_))));
        assert_eq!(stats.attempts(), 1);
        assert_eq!(stats.retries(), 0);
        assert_eq!(stats.failures(), 1);
    }

    #[tokio::test]
    async fn test_gives_up_after_max_retries() {
        let policy = fast_policy(2);
        let stats = RetryStats::default();

        let result: Result<()> = with_retry(&policy, &stats, || async { Err(unavailable()) }).await;

        let err = tokio_test::assert_err!(result);
        assert!(matches!(err, Error::Status { status: 503, .. }));
        assert_eq!(stats.attempts(), 3);
        assert_eq!(stats.retries(), 2);
    }

    #[tokio::test]
    async fn test_timeout_is_transient() {
        let mut policy = fast_policy(1);
        policy.timeout = Duration::from_millis(20);
        let stats = RetryStats::default();
        let calls = Arc::new(AtomicU32::new(0));

        let counter = calls.clone();
        let result = with_retry(&policy, &stats, || {
            let counter = counter.clone();
            async move {
                if counter.fetch_add(1, Ordering::SeqCst) == 0 {
                    tokio::time::sleep(Duration::from_millis(500)).await;
                }
                Ok(42)
            }
        })
        .await;

        assert_eq!(tokio_test::assert_ok!(result), 42);
        assert_eq!(stats.retries(), 1);
    }

    #[test]
    fn test_backoff_doubles_and_caps() {
        let policy = RetryPolicy {
            base_delay: Duration::from_millis(100),
            max_delay: Duration::from_millis(500),
            ..RetryPolicy::default()
        };
        assert_eq!(policy.delay_for_retry(1), Duration::from_millis(100));
        assert_eq!(policy.delay_for_retry(2), Duration::from_millis(200));
        assert_eq!(policy.delay_for_retry(3), Duration::from_millis(400));
        assert_eq!(policy.delay_for_retry(4), Duration::from_millis(500));
        assert_eq!(policy.delay_for_retry(40), Duration::from_millis(500));
    }
}
