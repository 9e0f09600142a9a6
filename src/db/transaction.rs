//! Transaction helpers.
//!
//! Every engine operation runs as one database transaction. [`finish`] closes
//! a transaction according to the operation's outcome and [`with_retry`]
//! re-runs the whole transaction when it lost a version race.

use metrics::{counter, histogram};
use sea_orm::DatabaseTransaction;
use std::future::Future;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

use crate::config::AppConfig;
use crate::errors::ServiceError;

/// Bounded retry with exponential backoff.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_backoff: Duration::from_millis(25),
        }
    }
}

impl RetryPolicy {
    pub fn from_config(cfg: &AppConfig) -> Self {
        Self {
            max_attempts: cfg.transaction_retry_attempts.max(1),
            base_backoff: Duration::from_millis(cfg.transaction_retry_backoff_ms),
        }
    }

    /// Delay before the attempt following `attempt` (1-based).
    pub fn backoff(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(10);
        self.base_backoff.saturating_mul(1u32 << exponent)
    }
}

/// Commits on `Ok`, rolls back on `Err`.
pub async fn finish<T>(
    txn: DatabaseTransaction,
    result: Result<T, ServiceError>,
) -> Result<T, ServiceError> {
    match result {
        Ok(value) => {
            txn.commit().await.map_err(ServiceError::db_error)?;
            counter!("docflow_db.transaction.committed", 1);
            Ok(value)
        }
        Err(err) => {
            if let Err(rollback_err) = txn.rollback().await {
                warn!(error = %rollback_err, "transaction rollback failed");
            }
            counter!("docflow_db.transaction.rolled_back", 1);
            debug!(error = %err, "transaction rolled back");
            Err(err)
        }
    }
}

/// Runs `attempt_fn` until it succeeds, fails with a non-retryable error, or
/// the policy's attempts are used up.
///
/// Each call of `attempt_fn` must open and finish its own transaction so a
/// retry starts from fresh reads.
pub async fn with_retry<T, F, Fut>(
    policy: RetryPolicy,
    operation: &'static str,
    mut attempt_fn: F,
) -> Result<T, ServiceError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, ServiceError>>,
{
    let mut attempt = 1;
    loop {
        let start = Instant::now();
        let result = attempt_fn().await;
        histogram!("docflow_db.transaction.duration", start.elapsed(), "operation" => operation);

        match result {
            Err(err) if err.is_retryable() && attempt < policy.max_attempts => {
                let delay = policy.backoff(attempt);
                warn!(
                    operation,
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    error = %err,
                    "retrying transaction"
                );
                counter!("docflow_db.transaction.retried", 1, "operation" => operation);
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            other => return other,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::ErrorKind;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn fast_policy(max_attempts: u32) -> RetryPolicy {
        RetryPolicy {
            max_attempts,
            base_backoff: Duration::from_millis(1),
        }
    }

    #[test]
    fn backoff_doubles() {
        let policy = RetryPolicy {
            max_attempts: 5,
            base_backoff: Duration::from_millis(10),
        };
        assert_eq!(policy.backoff(1), Duration::from_millis(10));
        assert_eq!(policy.backoff(2), Duration::from_millis(20));
        assert_eq!(policy.backoff(4), Duration::from_millis(80));
    }

    #[tokio::test]
    async fn retries_lost_races_until_success() {
        let calls = AtomicU32::new(0);
        let counter = &calls;
        let result = with_retry(fast_policy(3), "test", || async move {
            if counter.fetch_add(1, Ordering::SeqCst) < 2 {
                Err(ServiceError::ConcurrentModification("row".into()))
            } else {
                Ok(7)
            }
        })
        .await;

        assert_eq!(result.unwrap(), 7);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn gives_up_after_max_attempts() {
        let calls = AtomicU32::new(0);
        let counter = &calls;
        let result: Result<(), _> = with_retry(fast_policy(2), "test", || async move {
            counter.fetch_add(1, Ordering::SeqCst);
            Err(ServiceError::ConcurrentModification("row".into()))
        })
        .await;

        assert_eq!(result.unwrap_err().kind(), ErrorKind::ConcurrentModification);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn business_errors_are_not_retried() {
        let calls = AtomicU32::new(0);
        let counter = &calls;
        let result: Result<(), _> = with_retry(fast_policy(5), "test", || async move {
            counter.fetch_add(1, Ordering::SeqCst);
            Err(ServiceError::InvariantViolation("over".into()))
        })
        .await;

        assert_eq!(result.unwrap_err().kind(), ErrorKind::InvariantViolation);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
