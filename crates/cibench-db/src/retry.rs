//! Retry of fallible operations with transient/permanent classification.
//!
//! Independent of the storage driver: callers supply the classifier.

use std::fmt;
use std::future::Future;
use std::time::Duration;
use tracing::warn;

/// Delay between attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backoff {
    /// `base * 2^(attempt - 1)`.
    Exponential { base: Duration },
    Fixed(Duration),
    None,
}

impl Backoff {
    /// Delay to wait after failed attempt number `attempt` (1-based).
    pub fn delay(&self, attempt: u32) -> Duration {
        match *self {
            Backoff::Exponential { base } => {
                let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
                base.saturating_mul(factor)
            }
            Backoff::Fixed(delay) => delay,
            Backoff::None => Duration::ZERO,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub backoff: Backoff,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            backoff: Backoff::Exponential {
                base: Duration::from_millis(100),
            },
        }
    }
}

#[derive(Debug)]
pub enum RetryError<E> {
    /// Failed with an error the classifier did not consider transient.
    Permanent(E),
    /// Every attempt failed transiently.
    Exhausted { attempts: u32, last: E },
}

/// Run `op` until it succeeds, fails permanently, or attempts run out.
///
/// `op` receives the 1-based attempt number.
pub async fn retry<T, E, Op, Fut, C>(
    policy: &RetryPolicy,
    is_transient: C,
    mut op: Op,
) -> Result<T, RetryError<E>>
where
    Op: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, E>>,
    C: Fn(&E) -> bool,
    E: fmt::Display,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 1;

    loop {
        match op(attempt).await {
            Ok(value) => return Ok(value),
            Err(err) if !is_transient(&err) => return Err(RetryError::Permanent(err)),
            Err(err) if attempt >= max_attempts => {
                return Err(RetryError::Exhausted {
                    attempts: attempt,
                    last: err,
                });
            }
            Err(err) => {
                let delay = policy.backoff.delay(attempt);
                warn!(
                    attempt,
                    max_attempts,
                    delay_ms = delay.as_millis() as u64,
                    error = %err,
                    "Transient failure, retrying"
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[derive(Debug, PartialEq)]
    enum TestError {
        Busy,
        Broken,
    }

    impl fmt::Display for TestError {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            write!(f, "{:?}", self)
        }
    }

    fn fast_policy(max_attempts: u32) -> RetryPolicy {
        RetryPolicy {
            max_attempts,
            backoff: Backoff::Fixed(Duration::from_millis(1)),
        }
    }

    #[test]
    fn test_exponential_backoff_doubles() {
        let backoff = Backoff::Exponential {
            base: Duration::from_millis(100),
        };
        assert_eq!(backoff.delay(1), Duration::from_millis(100));
        assert_eq!(backoff.delay(2), Duration::from_millis(200));
        assert_eq!(backoff.delay(3), Duration::from_millis(400));
        assert_eq!(backoff.delay(5), Duration::from_millis(1600));
    }

    #[test]
    fn test_backoff_saturates() {
        let backoff = Backoff::Exponential {
            base: Duration::from_secs(1),
        };
        assert!(backoff.delay(200) >= backoff.delay(40));
    }

    #[tokio::test]
    async fn test_succeeds_after_transient_failures() {
        let calls = AtomicU32::new(0);
        let counter = &calls;
        let result = retry(&fast_policy(5), |e| *e == TestError::Busy, move |_| async move {
            if counter.fetch_add(1, Ordering::SeqCst) < 2 {
                Err(TestError::Busy)
            } else {
                Ok("stored")
            }
        })
        .await;

        assert_eq!(result.unwrap(), "stored");
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_permanent_error_is_not_retried() {
        let calls = AtomicU32::new(0);
        let counter = &calls;
        let result: Result<(), _> = retry(&fast_policy(5), |e| *e == TestError::Busy, move |_| async move {
            counter.fetch_add(1, Ordering::SeqCst);
            Err(TestError::Broken)
        })
        .await;

        assert!(matches!(result, Err(RetryError::Permanent(TestError::Broken))));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_exhaustion_reports_attempts() {
        let result: Result<(), _> =
            retry(&fast_policy(3), |e| *e == TestError::Busy, |_| async {
                Err(TestError::Busy)
            })
            .await;

        match result {
            Err(RetryError::Exhausted { attempts, last }) => {
                assert_eq!(attempts, 3);
                assert_eq!(last, TestError::Busy);
            }
            other => panic!("expected exhaustion, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_attempt_numbers_are_passed_in_order() {
        let mut seen = Vec::new();
        let _: Result<(), _> = retry(&fast_policy(4), |_: &TestError| true, |attempt| {
            seen.push(attempt);
            async { Err(TestError::Busy) }
        })
        .await;
        assert_eq!(seen, vec![1, 2, 3, 4]);
    }

    #[tokio::test]
    async fn test_zero_attempts_still_runs_once() {
        let calls = AtomicU32::new(0);
        let counter = &calls;
        let _: Result<(), _> = retry(&fast_policy(0), |_: &TestError| true, move |_| async move {
            counter.fetch_add(1, Ordering::SeqCst);
            Err(TestError::Busy)
        })
        .await;
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
