//! Retry policy for calls to the remote table service.
//!
//! Every call goes through [`RetryPolicy::call`], which retries failures classified as transient
//! with exponential backoff and jitter, and surfaces everything else immediately. The calling task
//! is suspended during backoff, no extra task or thread is spawned.

use std::future::Future;
use std::time::Duration;

use config::shared::RetryConfig;
use rand::Rng;
use tokio::time::sleep;
use tracing::{error, warn};

use crate::error::{ErrorKind, ExportError, ExportResult};
use crate::export_error;
use crate::remote::error::RemoteError;

/// Maximum share of the backoff delay added as random jitter.
const MAX_JITTER_FACTOR: f64 = 0.3;

/// Bounded exponential backoff applied to remote calls.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    max_attempts: u32,
    initial_delay: Duration,
    max_delay: Duration,
    backoff_multiplier: f64,
}

impl RetryPolicy {
    pub fn from_config(config: &RetryConfig) -> Self {
        Self {
            max_attempts: config.max_attempts.max(1),
            initial_delay: config.initial_delay(),
            max_delay: config.max_delay(),
            backoff_multiplier: config.backoff_multiplier,
        }
    }

    /// Returns a policy that makes exactly one attempt.
    pub fn no_retry() -> Self {
        Self {
            max_attempts: 1,
            initial_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
            backoff_multiplier: 1.0,
        }
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Returns the delay before retry number `retry` (1-indexed), without jitter.
    ///
    /// Grows by the backoff multiplier with every retry and never exceeds the max delay.
    pub fn base_delay(&self, retry: u32) -> Duration {
        let exponent = retry.saturating_sub(1).min(i32::MAX as u32) as i32;
        let delay_ms =
            self.initial_delay.as_millis() as f64 * self.backoff_multiplier.powi(exponent);
        let capped_ms = delay_ms.min(self.max_delay.as_millis() as f64);

        Duration::from_millis(capped_ms as u64)
    }

    /// Returns the delay before retry number `retry` with up to 30% of random jitter added.
    fn backoff(&self, retry: u32) -> Duration {
        let base = self.base_delay(retry);
        let jitter_factor = rand::thread_rng().gen_range(0.0..=MAX_JITTER_FACTOR);

        base.mul_f64(1.0 + jitter_factor)
    }

    /// Runs `operation` until it succeeds, fails with an error `is_retryable` rejects, or the
    /// attempt budget is spent.
    ///
    /// Non-retryable errors are converted and returned as is. When the budget is spent the error
    /// has kind [`ErrorKind::RemoteRetriesExhausted`] and the last failure as source.
    pub async fn call<T, F, Fut, R>(
        &self,
        operation_name: &'static str,
        mut operation: F,
        is_retryable: R,
    ) -> ExportResult<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, RemoteError>>,
        R: Fn(&RemoteError) -> bool,
    {
        let mut attempt = 1;

        loop {
            let err = match operation().await {
                Ok(value) => return Ok(value),
                Err(err) => err,
            };

            if !is_retryable(&err) {
                warn!(
                    operation = operation_name,
                    attempt,
                    error = %err,
                    "remote call failed with non-retryable error"
                );
                return Err(ExportError::from(err));
            }

            if attempt >= self.max_attempts {
                error!(
                    operation = operation_name,
                    attempts = attempt,
                    error = %err,
                    "remote call failed, retries exhausted"
                );
                return Err(export_error!(
                    ErrorKind::RemoteRetriesExhausted,
                    "Remote call failed after exhausting retries",
                    format!("{operation_name} failed after {attempt} attempts: {err}"),
                    source: err
                ));
            }

            let backoff = self.backoff(attempt);
            warn!(
                operation = operation_name,
                attempt,
                max_attempts = self.max_attempts,
                backoff_ms = backoff.as_millis() as u64,
                error = %err,
                "remote call failed, backing off before retry"
            );
            sleep(backoff).await;

            attempt += 1;
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&RetryConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU32, Ordering};

    use tokio::time::Instant;

    use super::*;
    use crate::remote::error::is_retryable_remote_error;

    fn policy(max_attempts: u32) -> RetryPolicy {
        RetryPolicy::from_config(&RetryConfig {
            max_attempts,
            initial_delay_ms: 100,
            max_delay_ms: 1000,
            backoff_multiplier: 2.0,
        })
    }

    /// Fails with `error` for the first `failures` calls, then succeeds with the call count.
    fn flaky(
        calls: Arc<AtomicU32>,
        failures: u32,
        error: RemoteError,
    ) -> impl FnMut() -> std::future::Ready<Result<u32, RemoteError>> {
        move || {
            let call = calls.fetch_add(1, Ordering::SeqCst) + 1;
            if call <= failures {
                std::future::ready(Err(error.clone()))
            } else {
                std::future::ready(Ok(call))
            }
        }
    }

    #[test]
    fn base_delay_grows_and_is_capped() {
        let policy = policy(10);

        assert_eq!(policy.base_delay(1), Duration::from_millis(100));
        assert_eq!(policy.base_delay(2), Duration::from_millis(200));
        assert_eq!(policy.base_delay(4), Duration::from_millis(800));
        assert_eq!(policy.base_delay(5), Duration::from_millis(1000));
        assert_eq!(policy.base_delay(60), Duration::from_millis(1000));
    }

    #[tokio::test(start_paused = true)]
    async fn returns_first_success_without_retry() {
        let calls = Arc::new(AtomicU32::new(0));

        let result = policy(3)
            .call(
                "get_table",
                flaky(calls.clone(), 0, RemoteError::Unavailable("503".into())),
                is_retryable_remote_error,
            )
            .await
            .unwrap();

        assert_eq!(result, 1);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn retries_transient_failures_with_backoff() {
        let calls = Arc::new(AtomicU32::new(0));
        let started = Instant::now();

        let result = policy(5)
            .call(
                "create_table",
                flaky(calls.clone(), 2, RemoteError::Throttled("429".into())),
                is_retryable_remote_error,
            )
            .await
            .unwrap();

        assert_eq!(result, 3);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        // 100ms then 200ms of base delay, each with at most 30% jitter.
        let elapsed = started.elapsed();
        assert!(elapsed >= Duration::from_millis(300), "{elapsed:?}");
        assert!(elapsed <= Duration::from_millis(400), "{elapsed:?}");
    }

    #[tokio::test(start_paused = true)]
    async fn non_retryable_failure_propagates_immediately() {
        let calls = Arc::new(AtomicU32::new(0));

        let err = policy(5)
            .call(
                "create_acl",
                flaky(calls.clone(), 10, RemoteError::Conflict("duplicate".into())),
                is_retryable_remote_error,
            )
            .await
            .unwrap_err();

        assert_eq!(err.kind(), ErrorKind::RemoteConflict);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn exhausted_budget_surfaces_last_error() {
        let calls = Arc::new(AtomicU32::new(0));

        let err = policy(3)
            .call(
                "append_rows",
                flaky(calls.clone(), 10, RemoteError::Server("500".into())),
                is_retryable_remote_error,
            )
            .await
            .unwrap_err();

        assert_eq!(err.kind(), ErrorKind::RemoteRetriesExhausted);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert_eq!(
            err.detail(),
            Some("append_rows failed after 3 attempts: internal server error: 500")
        );
        let source = err.shared_source().unwrap();
        assert_eq!(
            source.downcast_ref::<RemoteError>(),
            Some(&RemoteError::Server("500".into()))
        );
    }

    #[tokio::test(start_paused = true)]
    async fn custom_classifier_overrides_default() {
        let calls = Arc::new(AtomicU32::new(0));

        let result = policy(4)
            .call(
                "update_table",
                flaky(calls.clone(), 1, RemoteError::Conflict("stale etag".into())),
                |err: &RemoteError| matches!(err, RemoteError::Conflict(_)),
            )
            .await
            .unwrap();

        assert_eq!(result, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn no_retry_policy_makes_single_attempt() {
        let calls = Arc::new(AtomicU32::new(0));

        let err = RetryPolicy::no_retry()
            .call(
                "stack_status",
                flaky(calls.clone(), 10, RemoteError::Unavailable("down".into())),
                is_retryable_remote_error,
            )
            .await
            .unwrap_err();

        assert_eq!(err.kind(), ErrorKind::RemoteRetriesExhausted);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
