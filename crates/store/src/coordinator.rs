use std::{fmt::Display, time::Duration};

use futures_util::future::BoxFuture;
use tokio::time::{Instant, sleep, timeout};

use crate::{Retryable, StoreError, Transaction, store::Store};

/// Future returned by a unit of work run inside a transaction.
pub type TxFuture<'t, T, E> = BoxFuture<'t, std::result::Result<T, E>>;

/// Bounded exponential backoff for transactions that lose a write race.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Total attempts, the first one included.
    pub max_attempts: u32,
    /// Delay before the first retry.
    pub initial_delay: Duration,
    /// Upper bound for any single delay.
    pub max_delay: Duration,
    pub multiplier: f64,
    /// Wall-clock budget for one attempt, commit included.
    pub attempt_timeout: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            initial_delay: Duration::from_millis(10),
            max_delay: Duration::from_millis(500),
            multiplier: 2.0,
            attempt_timeout: Duration::from_secs(5),
        }
    }
}

impl RetryConfig {
    /// A single attempt with no retry.
    pub fn no_retry() -> Self {
        Self {
            max_attempts: 1,
            ..Self::default()
        }
    }

    pub fn next_delay(&self, current: Duration) -> Duration {
        let next = Duration::from_secs_f64(current.as_secs_f64() * self.multiplier);
        next.min(self.max_delay)
    }
}

/// Runs units of work atomically against a [`Store`].
///
/// Each attempt opens a transaction, runs the work, and commits on `Ok` or
/// rolls back on `Err`. Attempts that fail with a transient error are
/// retried from scratch, so the work closure must re-read everything it
/// depends on and must not carry state between attempts.
#[derive(Clone)]
pub struct TransactionCoordinator<S> {
    store: S,
    retry: RetryConfig,
}

impl<S: Store> TransactionCoordinator<S> {
    pub fn new(store: S) -> Self {
        Self::with_retry(store, RetryConfig::default())
    }

    pub fn with_retry(store: S, retry: RetryConfig) -> Self {
        Self { store, retry }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn retry_config(&self) -> &RetryConfig {
        &self.retry
    }

    /// Runs `work` in a transaction, retrying transient failures.
    ///
    /// An attempt that exceeds `attempt_timeout` is abandoned, its writes
    /// are discarded, and the call fails with [`StoreError::Timeout`]. A
    /// timed-out attempt is not retried.
    pub async fn run<T, E, F>(&self, operation: &'static str, mut work: F) -> Result<T, E>
    where
        F: for<'t> FnMut(&'t mut dyn Transaction) -> TxFuture<'t, T, E> + Send,
        T: Send,
        E: From<StoreError> + Retryable + Display + Send,
    {
        let started = Instant::now();
        let mut attempt = 0;
        let mut delay = self.retry.initial_delay;

        loop {
            attempt += 1;

            let outcome = match timeout(self.retry.attempt_timeout, self.attempt(&mut work)).await
            {
                Ok(outcome) => outcome,
                Err(_) => Err(E::from(StoreError::Timeout(self.retry.attempt_timeout))),
            };

            match outcome {
                Ok(value) => {
                    if attempt > 1 {
                        tracing::debug!(operation, attempt, "Transaction committed after retry");
                    }
                    metrics::counter!("transactions_committed_total", "operation" => operation)
                        .increment(1);
                    metrics::histogram!("transaction_duration_seconds", "operation" => operation)
                        .record(started.elapsed().as_secs_f64());
                    return Ok(value);
                }
                Err(error) if error.is_transient() && attempt < self.retry.max_attempts => {
                    tracing::warn!(
                        operation,
                        attempt,
                        max_attempts = self.retry.max_attempts,
                        delay_ms = delay.as_millis() as u64,
                        error = %error,
                        "Transaction conflict, retrying"
                    );
                    metrics::counter!("transactions_retried_total", "operation" => operation)
                        .increment(1);
                    sleep(delay).await;
                    delay = self.retry.next_delay(delay);
                }
                Err(error) => {
                    if error.is_transient() {
                        tracing::error!(operation, attempt, error = %error, "Transaction retries exhausted");
                    } else {
                        tracing::debug!(operation, attempt, error = %error, "Transaction aborted");
                    }
                    metrics::counter!("transactions_failed_total", "operation" => operation)
                        .increment(1);
                    return Err(error);
                }
            }
        }
    }

    async fn attempt<T, E, F>(&self, work: &mut F) -> Result<T, E>
    where
        F: for<'t> FnMut(&'t mut dyn Transaction) -> TxFuture<'t, T, E> + Send,
        T: Send,
        E: From<StoreError> + Send,
    {
        let mut tx = self.store.begin().await.map_err(E::from)?;

        let result = work(tx.as_mut()).await;
        match result {
            Ok(value) => {
                tx.commit().await.map_err(E::from)?;
                Ok(value)
            }
            Err(error) => {
                if let Err(rollback_error) = tx.rollback().await {
                    tracing::warn!(error = %rollback_error, "Rollback failed");
                }
                Err(error)
            }
        }
    }
}
