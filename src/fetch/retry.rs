//! Transient-failure retry

use tokio::time::sleep;
use tracing::warn;

use crate::config::RetryConfig;
use crate::errors::AdapterResult;
use crate::observability::OperationStats;
use crate::store::StoreFuture;

/// Runs `call` until it succeeds, fails with a non-transient error, or the
/// attempt budget is spent.
///
/// Delays grow as `base * 2^attempt`, capped at the configured maximum.
pub(crate) async fn with_retry<'a, T, F>(
    retry: &RetryConfig,
    stats: &OperationStats,
    operation: &'static str,
    mut call: F,
) -> AdapterResult<T>
where
    F: FnMut() -> StoreFuture<'a, T>,
{
    let mut attempt = 0u32;
    loop {
        match call().await {
            Ok(value) => return Ok(value),
            Err(err) if err.is_retryable() && attempt + 1 < retry.max_attempts => {
                let delay = retry.delay_for(attempt);
                warn!(
                    operation,
                    attempt = attempt + 1,
                    delay_ms = delay.as_millis() as u64,
                    error = %err,
                    "transient store failure, retrying"
                );
                stats.increment_transient_retries();
                sleep(delay).await;
                attempt += 1;
            }
            Err(err) => return Err(err.into()),
        }
    }
}
