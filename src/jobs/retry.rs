// src/jobs/retry.rs
//! Bounded retry for generator calls.
//!
//! Every attempt holds a permit from the process-wide call limiter and runs
//! under the collaborator's timeout. Transient failures back off
//! exponentially until `max_attempts` is reached; permanent failures return
//! immediately.

use std::future::Future;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use backoff::ExponentialBackoffBuilder;
use tokio::sync::Semaphore;

use crate::config::RetryPolicy;
use crate::error::GeneratorError;

pub async fn call_with_retry<T, F, Fut>(
    label: &str,
    policy: &RetryPolicy,
    timeout: Duration,
    limiter: &Semaphore,
    mut operation: F,
) -> Result<T, GeneratorError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, GeneratorError>>,
{
    let backoff = ExponentialBackoffBuilder::new()
        .with_initial_interval(policy.initial_interval)
        .with_max_interval(policy.max_interval)
        .with_multiplier(policy.multiplier)
        .with_max_elapsed_time(None)
        .build();

    let attempts = AtomicU32::new(0);
    let max_attempts = policy.max_attempts.max(1);

    backoff::future::retry(backoff, || {
        let call = operation();
        let attempt = attempts.fetch_add(1, Ordering::SeqCst) + 1;
        async move {
            let _permit = limiter.acquire().await.map_err(|_| {
                backoff::Error::permanent(GeneratorError::Rejected(
                    "call limiter closed".to_string(),
                ))
            })?;

            let result = match tokio::time::timeout(timeout, call).await {
                Ok(result) => result,
                Err(_) => Err(GeneratorError::Timeout(timeout)),
            };

            match result {
                Ok(value) => Ok(value),
                Err(e) if e.is_transient() && attempt < max_attempts => {
                    tracing::warn!("⏳ {} attempt {}/{} failed (retrying): {}", label, attempt, max_attempts, e);
                    Err(backoff::Error::transient(e))
                }
                Err(e) => {
                    if e.is_transient() {
                        tracing::warn!("❌ {} gave up after {} attempts: {}", label, attempt, e);
                    } else {
                        tracing::warn!("❌ {} failed permanently: {}", label, e);
                    }
                    Err(backoff::Error::permanent(e))
                }
            }
        }
    })
    .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    fn fast_policy(max_attempts: u32) -> RetryPolicy {
        RetryPolicy {
            max_attempts,
            initial_interval: Duration::from_millis(1),
            max_interval: Duration::from_millis(4),
            multiplier: 2.0,
        }
    }

    #[tokio::test]
    async fn test_recovers_after_transient_failures() {
        let calls = AtomicUsize::new(0);
        let limiter = Semaphore::new(1);
        let result = call_with_retry("image", &fast_policy(4), Duration::from_secs(1), &limiter, || {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if n < 2 {
                    Err(GeneratorError::RateLimited("429".into()))
                } else {
                    Ok(n)
                }
            }
        })
        .await;
        assert_eq!(result.unwrap(), 2);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_transient_failures_stop_at_bound() {
        let calls = AtomicUsize::new(0);
        let limiter = Semaphore::new(1);
        let result: Result<(), _> = call_with_retry("speech", &fast_policy(3), Duration::from_secs(1), &limiter, || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(GeneratorError::ServiceUnavailable("503".into())) }
        })
        .await;
        assert!(matches!(result, Err(GeneratorError::ServiceUnavailable(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_permanent_failure_is_not_retried() {
        let calls = AtomicUsize::new(0);
        let limiter = Semaphore::new(1);
        let result: Result<(), _> = call_with_retry("image", &fast_policy(5), Duration::from_secs(1), &limiter, || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(GeneratorError::InvalidPrompt("unsafe".into())) }
        })
        .await;
        assert!(matches!(result, Err(GeneratorError::InvalidPrompt(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_slow_call_times_out() {
        let limiter = Semaphore::new(1);
        let result: Result<(), _> = call_with_retry("avatar", &fast_policy(2), Duration::from_millis(10), &limiter, || async {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(())
        })
        .await;
        assert!(matches!(result, Err(GeneratorError::Timeout(_))));
    }
}
