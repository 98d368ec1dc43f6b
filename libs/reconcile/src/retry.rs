//! Bounded fixed-delay retries.
//!
//! [`run_with_retry`] drives any fallible async operation. Transient failures
//! are logged and retried after the policy delay until the attempt budget is
//! spent; permanent failures return immediately.

use std::future::Future;
use std::time::Duration;

use thiserror::Error;
use tracing::{info, warn};

use crate::{DEFAULT_MAX_ATTEMPTS, DEFAULT_RETRY_DELAY};

/// Classifies errors for the retry executor.
pub trait Retryable {
    /// Whether another attempt may succeed.
    fn is_transient(&self) -> bool {
        true
    }
}

/// Retry configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first one.
    pub max_attempts: u32,

    /// Fixed wait between attempts.
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            delay: DEFAULT_RETRY_DELAY,
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, delay: Duration) -> Self {
        Self {
            max_attempts,
            delay,
        }
    }

    /// Attempt budget, never less than one.
    pub fn attempts(&self) -> u32 {
        self.max_attempts.max(1)
    }
}

/// Terminal failure of a retried operation.
#[derive(Debug, Error)]
pub enum RetryError<E> {
    /// Every attempt failed; carries the last error.
    #[error("gave up after {attempts} attempt(s): {last}")]
    Exhausted { attempts: u32, last: E },

    /// The operation failed in a way retrying cannot fix.
    #[error("{0}")]
    Permanent(E),
}

impl<E> RetryError<E> {
    /// The underlying error.
    pub fn into_inner(self) -> E {
        match self {
            Self::Exhausted { last, .. } => last,
            Self::Permanent(e) => e,
        }
    }

    /// Attempts made before giving up.
    pub fn attempts(&self) -> u32 {
        match self {
            Self::Exhausted { attempts, .. } => *attempts,
            Self::Permanent(_) => 1,
        }
    }
}

/// Run `operation` until it succeeds, fails permanently, or the policy's
/// attempt budget is exhausted.
///
/// `label` names the operation in log output, e.g. `spawn 'registry'`.
pub async fn run_with_retry<T, E, F, Fut>(
    policy: &RetryPolicy,
    label: &str,
    mut operation: F,
) -> Result<T, RetryError<E>>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Retryable + std::fmt::Display,
{
    let max_attempts = policy.attempts();
    let mut attempt = 0;

    loop {
        attempt += 1;

        let err = match operation().await {
            Ok(value) => return Ok(value),
            Err(err) => err,
        };

        if !err.is_transient() {
            warn!(operation = label, error = %err, "Failed with a non-retryable error");
            return Err(RetryError::Permanent(err));
        }

        warn!(
            operation = label,
            attempt,
            max_attempts,
            error = %err,
            "Failed to {label}. Attempt {attempt}/{max_attempts}"
        );

        if attempt >= max_attempts {
            return Err(RetryError::Exhausted {
                attempts: attempt,
                last: err,
            });
        }

        info!(
            operation = label,
            delay_secs = policy.delay.as_secs_f64(),
            "Retrying in {} seconds...",
            policy.delay.as_secs()
        );
        tokio::time::sleep(policy.delay).await;
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};

    use rstest::rstest;
    use tokio::time::Instant;

    use super::*;

    #[derive(Debug)]
    struct Flaky(bool);

    impl std::fmt::Display for Flaky {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            write!(f, "flaky (transient: {})", self.0)
        }
    }

    impl Retryable for Flaky {
        fn is_transient(&self) -> bool {
            self.0
        }
    }

    /// Operation that fails transiently `failures` times, then succeeds.
    async fn run_flaky(policy: RetryPolicy, failures: u32) -> (Result<u32, RetryError<Flaky>>, u32) {
        let calls = AtomicU32::new(0);
        let result = run_with_retry(&policy, "test", || {
            let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
            async move {
                if n <= failures {
                    Err(Flaky(true))
                } else {
                    Ok(n)
                }
            }
        })
        .await;
        (result, calls.load(Ordering::SeqCst))
    }

    #[rstest]
    #[case(0)]
    #[case(1)]
    #[case(4)]
    #[tokio::test(start_paused = true)]
    async fn test_succeeds_after_k_failures(#[case] k: u32) {
        let policy = RetryPolicy::new(5, Duration::from_secs(30));
        let start = Instant::now();

        let (result, calls) = run_flaky(policy, k).await;

        assert_eq!(result.unwrap(), k + 1);
        assert_eq!(calls, k + 1);
        assert_eq!(start.elapsed(), Duration::from_secs(30) * k);
    }

    #[rstest]
    #[case(5)]
    #[case(9)]
    #[tokio::test(start_paused = true)]
    async fn test_exhausts_after_max_attempts(#[case] k: u32) {
        let policy = RetryPolicy::new(5, Duration::from_secs(30));
        let start = Instant::now();

        let (result, calls) = run_flaky(policy, k).await;

        let err = result.unwrap_err();
        assert!(matches!(err, RetryError::Exhausted { attempts: 5, .. }));
        assert_eq!(calls, 5);
        assert_eq!(start.elapsed(), Duration::from_secs(120));
    }

    #[tokio::test(start_paused = true)]
    async fn test_permanent_error_is_not_retried() {
        let policy = RetryPolicy::new(5, Duration::from_secs(30));
        let calls = AtomicU32::new(0);
        let start = Instant::now();

        let result: Result<(), _> = run_with_retry(&policy, "test", || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(Flaky(false)) }
        })
        .await;

        assert!(matches!(result, Err(RetryError::Permanent(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(start.elapsed(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn test_zero_attempts_still_tries_once() {
        let policy = RetryPolicy::new(0, Duration::from_secs(1));
        let (result, calls) = run_flaky(policy, 3).await;

        assert_eq!(result.unwrap_err().attempts(), 1);
        assert_eq!(calls, 1);
    }

    #[test]
    fn test_default_policy() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.max_attempts, 5);
        assert_eq!(policy.delay, Duration::from_secs(30));
    }
}
