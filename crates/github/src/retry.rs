//! Retry loop for tracker calls.
//!
//! Only errors whose [`RetryPolicy`] is `Retryable` are retried. A rate-limit
//! hint replaces the exponential delay; both are capped at `max_delay`.

use std::future::Future;
use std::time::Duration;

use pipeline::{RetryConfig, RetryPolicy, TrackerError, TrackerOperation};
use rand::Rng;
use tracing::warn;

/// Runs `call` until it succeeds, fails permanently, or `max_attempts` calls
/// have been made. The last error is returned unchanged.
pub(crate) async fn with_retry<T, F, Fut>(
    retry: &RetryConfig,
    operation: TrackerOperation,
    call: F,
) -> Result<T, TrackerError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, TrackerError>>,
{
    with_retry_if(retry, operation, |_| true, call).await
}

/// [`with_retry`] for calls where some retryable errors must not be retried;
/// an error is retried only if its policy allows it and `allowed` agrees.
pub(crate) async fn with_retry_if<T, F, Fut, P>(
    retry: &RetryConfig,
    operation: TrackerOperation,
    allowed: P,
    mut call: F,
) -> Result<T, TrackerError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, TrackerError>>,
    P: Fn(&TrackerError) -> bool,
{
    let mut attempt = 1;
    loop {
        let err = match call().await {
            Ok(value) => return Ok(value),
            Err(err) => err,
        };
        let hint = match err.retry_policy() {
            RetryPolicy::Retryable { after } if allowed(&err) => after,
            _ => return Err(err),
        };
        if attempt >= retry.max_attempts {
            warn!(%operation, attempt, error = %err, "Giving up after final attempt");
            return Err(err);
        }

        let delay = next_delay(retry, attempt, hint);
        warn!(
            %operation,
            attempt,
            delay_ms = delay.as_millis() as u64,
            error = %err,
            "Tracker call failed; retrying"
        );
        tokio::time::sleep(delay).await;
        attempt += 1;
    }
}

/// Delay before retry number `retry_number` (1-based).
pub(crate) fn next_delay(retry: &RetryConfig, retry_number: u32, hint: Option<Duration>) -> Duration {
    match hint {
        Some(after) => after.min(retry.max_delay()),
        None => retry.backoff_delay(retry_number) + jitter(retry.jitter()),
    }
}

fn jitter(max: Duration) -> Duration {
    let max_ms = max.as_millis() as u64;
    if max_ms == 0 {
        return Duration::ZERO;
    }
    Duration::from_millis(rand::thread_rng().gen_range(0..=max_ms))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use tokio::time::Instant;

    fn config(max_attempts: u32) -> RetryConfig {
        RetryConfig {
            max_attempts,
            base_delay_ms: 100,
            max_delay_ms: 1_000,
            jitter_ms: 0,
            request_timeout_secs: 5,
        }
    }

    fn transient() -> TrackerError {
        TrackerError::Transient {
            message: "503 Service Unavailable".into(),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_transient_errors_are_retried_with_backoff() {
        let calls = AtomicU32::new(0);
        let counter = &calls;
        let start = Instant::now();

        let result = with_retry(&config(4), TrackerOperation::AddLabel, || async move {
            if counter.fetch_add(1, Ordering::SeqCst) < 2 {
                Err(transient())
            } else {
                Ok("labelled")
            }
        })
        .await;

        assert_eq!(result, Ok("labelled"));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        // 100ms then 200ms.
        assert_eq!(start.elapsed(), Duration::from_millis(300));
    }

    #[tokio::test(start_paused = true)]
    async fn test_attempts_are_bounded() {
        let calls = AtomicU32::new(0);
        let counter = &calls;

        let result: Result<(), _> = with_retry(&config(3), TrackerOperation::ListIssues, || async move {
            counter.fetch_add(1, Ordering::SeqCst);
            Err(transient())
        })
        .await;

        assert_eq!(result, Err(transient()));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_permanent_errors_are_not_retried() {
        let calls = AtomicU32::new(0);
        let counter = &calls;
        let rejected = TrackerError::Rejected {
            operation: TrackerOperation::AddLabel,
            status: 422,
            message: "Validation Failed".into(),
        };
        let expected = &rejected;

        let result: Result<(), _> = with_retry(&config(4), TrackerOperation::AddLabel, || async move {
            counter.fetch_add(1, Ordering::SeqCst);
            Err(expected.clone())
        })
        .await;

        assert_eq!(result, Err(rejected));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_caller_can_veto_a_retry() {
        let calls = AtomicU32::new(0);
        let counter = &calls;
        let veto = |err: &TrackerError| !matches!(err, TrackerError::Transient { .. });

        let result: Result<(), _> =
            with_retry_if(&config(4), TrackerOperation::PostComment, veto, || async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Err(transient())
            })
            .await;

        assert_eq!(result, Err(transient()));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_rate_limit_hint_replaces_backoff() {
        let calls = AtomicU32::new(0);
        let counter = &calls;
        let start = Instant::now();

        let result = with_retry(&config(2), TrackerOperation::PostComment, || async move {
            if counter.fetch_add(1, Ordering::SeqCst) == 0 {
                Err(TrackerError::RateLimited {
                    retry_after: Some(Duration::from_millis(700)),
                })
            } else {
                Ok(())
            }
        })
        .await;

        assert_eq!(result, Ok(()));
        assert_eq!(start.elapsed(), Duration::from_millis(700));
    }

    #[test]
    fn test_delays_are_capped() {
        let retry = config(10);
        assert_eq!(next_delay(&retry, 1, None), Duration::from_millis(100));
        assert_eq!(next_delay(&retry, 4, None), Duration::from_millis(800));
        assert_eq!(next_delay(&retry, 5, None), Duration::from_millis(1_000));
        assert_eq!(
            next_delay(&retry, 1, Some(Duration::from_secs(60))),
            Duration::from_millis(1_000)
        );
    }

    #[test]
    fn test_jitter_stays_in_range() {
        let retry = RetryConfig {
            jitter_ms: 50,
            ..config(4)
        };
        for _ in 0..100 {
            let delay = next_delay(&retry, 1, None);
            assert!(delay >= Duration::from_millis(100));
            assert!(delay <= Duration::from_millis(150));
        }
    }
}
