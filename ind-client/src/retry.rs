//! Bounded retries for upstream requests.

use crate::{config::RetryPolicy, IndClientError, Result};
use std::future::Future;
use tracing::{info, warn};

/// Run `operation` under `policy`.
///
/// Every attempt is bounded by `request_timeout`. Hitting the timeout is an
/// [`IndClientError::AmbiguousOutcome`] and is never retried, since the
/// upstream service may have acted on the request. Only
/// [`IndClientError::UpstreamUnavailable`] is retried, with exponential
/// backoff, until `max_attempts` is reached.
pub(crate) async fn with_retry<T, F, Fut>(
    policy: &RetryPolicy,
    description: &str,
    mut operation: F,
) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 1;
    loop {
        let outcome = match tokio::time::timeout(policy.request_timeout, operation()).await {
            Ok(outcome) => outcome,
            Err(_) => {
                warn!("{} timed out on attempt {}", description, attempt);
                return Err(IndClientError::AmbiguousOutcome(format!(
                    "{description} timed out after {:?}",
                    policy.request_timeout
                )));
            }
        };

        match outcome {
            Err(error) if error.never_sent() && attempt < max_attempts => {
                let backoff = policy.backoff(attempt);
                info!(
                    "{} failed on attempt {}: {}. Retrying in {:?}",
                    description, attempt, error, backoff
                );
                tokio::time::sleep(backoff).await;
                attempt += 1;
            }
            outcome => return outcome,
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use std::{
        sync::atomic::{AtomicU32, Ordering},
        time::Duration,
    };

    fn policy() -> RetryPolicy {
        RetryPolicy {
            request_timeout: Duration::from_millis(100),
            max_attempts: 3,
            initial_backoff: Duration::from_millis(1),
        }
    }

    #[tokio::test]
    async fn unavailable_is_retried_until_success() {
        let calls = AtomicU32::new(0);
        let counter = &calls;
        let result = with_retry(&policy(), "test", move || async move {
            if counter.fetch_add(1, Ordering::SeqCst) < 2 {
                Err(IndClientError::UpstreamUnavailable("refused".to_string()))
            } else {
                Ok(7)
            }
        })
        .await;

        assert_eq!(result.unwrap(), 7);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn attempts_are_bounded() {
        let calls = AtomicU32::new(0);
        let counter = &calls;
        let result: Result<()> = with_retry(&policy(), "test", move || async move {
            let _ = counter.fetch_add(1, Ordering::SeqCst);
            Err(IndClientError::UpstreamUnavailable("refused".to_string()))
        })
        .await;

        assert!(matches!(result, Err(IndClientError::UpstreamUnavailable(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn timeouts_are_ambiguous_and_not_retried() {
        let calls = AtomicU32::new(0);
        let counter = &calls;
        let result: Result<()> = with_retry(&policy(), "test", move || async move {
            let _ = counter.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(())
        })
        .await;

        assert!(matches!(result, Err(IndClientError::AmbiguousOutcome(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn other_errors_are_not_retried() {
        let calls = AtomicU32::new(0);
        let counter = &calls;
        let result: Result<()> = with_retry(&policy(), "test", move || async move {
            let _ = counter.fetch_add(1, Ordering::SeqCst);
            Err(IndClientError::AmbiguousOutcome("reset".to_string()))
        })
        .await;

        assert!(matches!(result, Err(IndClientError::AmbiguousOutcome(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
