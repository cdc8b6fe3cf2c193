/// Retry executor - runs any async operation under a RetryPolicy
use super::RetryPolicy;
use crate::{error::SyncError, metrics};
use std::future::Future;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Terminal result of a retried operation
#[derive(Debug, Clone, PartialEq)]
pub enum RetryResult<T> {
    /// Operation returned a value
    Success(T),
    /// Gave up: error was not retryable or attempts ran out
    Failed(SyncError),
    /// Caller cancelled before the operation settled
    Cancelled,
}

/// Outcome of one `execute` invocation
#[derive(Debug, Clone, PartialEq)]
pub struct RetryOutcome<T> {
    /// Number of times the operation was invoked. Zero only when the token
    /// was already cancelled before the first attempt.
    pub attempts: u32,
    /// Sum of all inter-attempt waits actually slept
    pub total_delay: Duration,
    pub result: RetryResult<T>,
}

impl<T> RetryOutcome<T> {
    pub fn success(&self) -> bool {
        matches!(self.result, RetryResult::Success(_))
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self.result, RetryResult::Cancelled)
    }

    pub fn last_error(&self) -> Option<&SyncError> {
        match &self.result {
            RetryResult::Failed(e) => Some(e),
            _ => None,
        }
    }

    pub fn final_result(&self) -> Option<&T> {
        match &self.result {
            RetryResult::Success(v) => Some(v),
            _ => None,
        }
    }

    /// Collapse into a plain result; cancellation becomes `SyncError::Cancelled`
    pub fn into_result(self) -> Result<T, SyncError> {
        match self.result {
            RetryResult::Success(v) => Ok(v),
            RetryResult::Failed(e) => Err(e),
            RetryResult::Cancelled => Err(SyncError::Cancelled),
        }
    }
}

/// Execute `operation` with retry-on-transient-failure semantics.
///
/// The operation receives a clone of `cancel` for its own use. Cancellation is
/// observed at every suspension point (the call itself and the backoff sleep)
/// and produces [`RetryResult::Cancelled`]; it is never classified and never
/// counted as a failed attempt. An attempt that fails after the token fired is
/// also reported as cancelled.
///
/// `label` only feeds logs and metrics.
pub async fn execute<T, F, Fut>(
    cancel: &CancellationToken,
    policy: &RetryPolicy,
    label: &str,
    mut operation: F,
) -> RetryOutcome<T>
where
    F: FnMut(CancellationToken) -> Fut,
    Fut: Future<Output = Result<T, SyncError>>,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut attempts = 0u32;
    let mut total_delay = Duration::ZERO;

    loop {
        if cancel.is_cancelled() {
            return cancelled(label, attempts, total_delay);
        }

        attempts += 1;
        metrics::REMOTE_CALL_ATTEMPTS_TOTAL
            .with_label_values(&[label])
            .inc();
        debug!(operation = label, attempt = attempts, "Invoking operation");

        let outcome = tokio::select! {
            biased;
            _ = cancel.cancelled() => None,
            res = operation(cancel.clone()) => Some(res),
        };

        let err = match outcome {
            None => return cancelled(label, attempts, total_delay),
            Some(Ok(value)) => {
                metrics::record_outcome(label, "success");
                if attempts > 1 {
                    debug!(operation = label, attempts, "Operation succeeded after retry");
                }
                return RetryOutcome {
                    attempts,
                    total_delay,
                    result: RetryResult::Success(value),
                };
            }
            Some(Err(err)) => err,
        };

        if err.is_cancelled() || cancel.is_cancelled() {
            return cancelled(label, attempts, total_delay);
        }

        if !policy.is_retryable(&err) {
            debug!(operation = label, attempt = attempts, error = %err, "Error is not retryable");
            metrics::record_outcome(label, "failed");
            return RetryOutcome {
                attempts,
                total_delay,
                result: RetryResult::Failed(err),
            };
        }

        if attempts >= max_attempts {
            warn!(
                operation = label,
                attempts,
                error = %err,
                "Giving up after exhausting retry attempts"
            );
            metrics::record_outcome(label, "exhausted");
            return RetryOutcome {
                attempts,
                total_delay,
                result: RetryResult::Failed(err),
            };
        }

        let delay = policy.jittered_delay(attempts);
        warn!(
            operation = label,
            attempt = attempts,
            max_attempts,
            delay_ms = delay.as_millis() as u64,
            error = %err,
            "Retryable failure, backing off"
        );

        let started = tokio::time::Instant::now();
        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                total_delay += started.elapsed();
                return cancelled(label, attempts, total_delay);
            }
            _ = tokio::time::sleep(delay) => {
                total_delay += delay;
                metrics::RETRY_DELAY_SECONDS
                    .with_label_values(&[label])
                    .observe(delay.as_secs_f64());
            }
        }
    }
}

fn cancelled<T>(label: &str, attempts: u32, total_delay: Duration) -> RetryOutcome<T> {
    debug!(operation = label, attempts, "Operation cancelled");
    metrics::record_outcome(label, "cancelled");
    RetryOutcome {
        attempts,
        total_delay,
        result: RetryResult::Cancelled,
    }
}
