//! Conflict retry with exponential backoff
//!
//! Only optimistic-concurrency conflicts are retried. Anything else is
//! returned on the spot, and cancellation wins over both the operation and
//! the backoff sleep.

use crate::error::{Result, SleepError};
use crate::observability::StructuredLogger;
use std::future::Future;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Delay before the second attempt
const DEFAULT_STARTING_DELAY: Duration = Duration::from_millis(100);

/// Upper bound for a single backoff sleep
const DEFAULT_MAX_DELAY: Duration = Duration::from_secs(5);

const DEFAULT_BACKOFF_FACTOR: u32 = 2;

const DEFAULT_MAX_ATTEMPTS: u32 = 5;

/// Bounded exponential backoff for write conflicts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub starting_delay: Duration,
    pub max_delay: Duration,
    pub backoff_factor: u32,
    /// Total number of attempts, including the first one
    pub max_attempts: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            starting_delay: DEFAULT_STARTING_DELAY,
            max_delay: DEFAULT_MAX_DELAY,
            backoff_factor: DEFAULT_BACKOFF_FACTOR,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
        }
    }
}

impl RetryPolicy {
    pub fn starting_delay(mut self, delay: Duration) -> Self {
        self.starting_delay = delay;
        self
    }

    pub fn max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = delay;
        self
    }

    pub fn max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = attempts;
        self
    }

    /// Run `operation` until it succeeds, fails with something other than a
    /// conflict, or the attempts are used up.
    pub async fn repeat<T, F, Fut>(
        &self,
        cancel: &CancellationToken,
        logger: &StructuredLogger,
        mut operation: F,
    ) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let max_attempts = self.max_attempts.max(1);
        let mut delay = self.starting_delay;
        let mut attempt = 0;

        loop {
            attempt += 1;
            if cancel.is_cancelled() {
                return Err(SleepError::Cancelled);
            }

            let outcome = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(SleepError::Cancelled),
                outcome = operation() => outcome,
            };

            let err = match outcome {
                Ok(value) => return Ok(value),
                Err(err) if !err.is_conflict() => return Err(err),
                Err(err) => err,
            };

            if attempt >= max_attempts {
                return Err(SleepError::RetriesExhausted {
                    attempts: attempt,
                    source: Box::new(err),
                });
            }

            logger.log_retry(attempt, delay, &err);

            tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(SleepError::Cancelled),
                _ = tokio::time::sleep(delay) => {}
            }

            delay = std::cmp::min(delay.saturating_mul(self.backoff_factor), self.max_delay);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn fast_policy() -> RetryPolicy {
        RetryPolicy::default().starting_delay(Duration::from_millis(1))
    }

    fn conflict() -> SleepError {
        SleepError::Conflict("the object has been modified".to_string())
    }

    #[test]
    fn test_default_policy() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.starting_delay, Duration::from_millis(100));
        assert_eq!(policy.backoff_factor, 2);
        assert_eq!(policy.max_attempts, 5);
    }

    #[tokio::test]
    async fn test_always_conflicting_operation_is_bounded() {
        let calls = AtomicU32::new(0);
        let cancel = CancellationToken::new();

        let result: Result<()> = fast_policy()
            .repeat(&cancel, &StructuredLogger::noop(), || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err(conflict()) }
            })
            .await;

        assert_eq!(calls.load(Ordering::SeqCst), 5);
        match result {
            Err(SleepError::RetriesExhausted { attempts, source }) => {
                assert_eq!(attempts, 5);
                assert!(source.is_conflict());
            }
            other => panic!("expected RetriesExhausted, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_exhausted_error_reports_count() {
        let cancel = CancellationToken::new();
        let err = fast_policy()
            .max_attempts(3)
            .repeat(&cancel, &StructuredLogger::noop(), || async {
                Err::<(), _>(conflict())
            })
            .await
            .unwrap_err();
        assert!(err.to_string().contains("after 3 tries"));
    }

    #[tokio::test]
    async fn test_non_conflict_is_not_retried() {
        let calls = AtomicU32::new(0);
        let cancel = CancellationToken::new();

        let err = fast_policy()
            .repeat(&cancel, &StructuredLogger::noop(), || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err::<(), _>(SleepError::NotFound("deployment web".to_string())) }
            })
            .await
            .unwrap_err();

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(err.is_not_found());
        assert!(!err.is_retries_exhausted());
    }

    #[tokio::test]
    async fn test_succeeds_after_transient_conflicts() {
        let calls = AtomicU32::new(0);
        let cancel = CancellationToken::new();

        let value = fast_policy()
            .repeat(&cancel, &StructuredLogger::noop(), || {
                let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
                async move {
                    if n < 3 {
                        Err(conflict())
                    } else {
                        Ok(n)
                    }
                }
            })
            .await
            .unwrap();

        assert_eq!(value, 3);
    }

    #[tokio::test]
    async fn test_cancelled_before_start() {
        let calls = AtomicU32::new(0);
        let cancel = CancellationToken::new();
        cancel.cancel();

        let err = fast_policy()
            .repeat(&cancel, &StructuredLogger::noop(), || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Ok(()) }
            })
            .await
            .unwrap_err();

        assert!(err.is_cancelled());
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_cancel_interrupts_backoff() {
        let calls = AtomicU32::new(0);
        let cancel = CancellationToken::new();
        let policy = RetryPolicy::default().starting_delay(Duration::from_secs(60));

        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            trigger.cancel();
        });

        let err = policy
            .repeat(&cancel, &StructuredLogger::noop(), || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err::<(), _>(conflict()) }
            })
            .await
            .unwrap_err();

        assert!(err.is_cancelled());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
