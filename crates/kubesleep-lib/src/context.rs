//! Per-run operation context

use crate::error::Result;
use crate::observability::StructuredLogger;
use crate::retry::RetryPolicy;
use std::future::Future;
use tokio_util::sync::CancellationToken;

/// Everything a suspend or wake needs besides the cluster itself.
#[derive(Debug, Clone)]
pub struct SleepContext {
    pub cancel: CancellationToken,
    pub retry: RetryPolicy,
    pub logger: StructuredLogger,
}

impl SleepContext {
    pub fn new(logger: StructuredLogger) -> Self {
        Self {
            cancel: CancellationToken::new(),
            retry: RetryPolicy::default(),
            logger,
        }
    }

    /// Silent context with the default retry policy.
    pub fn noop() -> Self {
        Self::new(StructuredLogger::noop())
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Run `operation` under this context's retry policy and cancellation.
    pub async fn repeat<T, F, Fut>(&self, operation: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        self.retry.repeat(&self.cancel, &self.logger, operation).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SleepError;

    #[test]
    fn test_repeat_observes_context_cancel() {
        let cancel = CancellationToken::new();
        let ctx = SleepContext::noop().with_cancel(cancel.clone());
        cancel.cancel();

        let result: Result<()> = tokio_test::block_on(ctx.repeat(|| async { Ok(()) }));
        assert!(matches!(result, Err(SleepError::Cancelled)));
    }

    #[test]
    fn test_default_retry_policy() {
        assert_eq!(SleepContext::noop().retry, RetryPolicy::default());
    }
}
