use crate::config::RetryConfig;
use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;
use tracing::warn;

/// The last error of a retried operation and how many attempts were made.
#[derive(Debug)]
pub struct RetryFailure<E> {
    pub attempts: u32,
    pub error: E,
}

/// Execute an async operation with jittered exponential backoff.
///
/// Errors for which `retryable` returns false fail immediately.
pub async fn retry_with_backoff<F, Fut, T, E, R>(
    config: &RetryConfig,
    retryable: R,
    mut operation: F,
) -> Result<T, RetryFailure<E>>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: std::fmt::Display,
    R: Fn(&E) -> bool,
{
    let max_attempts = config.max_attempts.max(1);
    let mut attempts = 0;
    let mut backoff_ms = config.backoff_base_ms;

    loop {
        attempts += 1;

        match operation().await {
            Ok(result) => return Ok(result),
            Err(e) if !retryable(&e) => {
                warn!("Attempt {} failed with a non-retryable error: {}", attempts, e);
                return Err(RetryFailure { attempts, error: e });
            }
            Err(e) if attempts >= max_attempts => {
                warn!("All {} attempts failed: {}", attempts, e);
                return Err(RetryFailure { attempts, error: e });
            }
            Err(e) => {
                // Jittered backoff: base * 2^attempt + random(0..base)
                let delay = if config.backoff_base_ms == 0 {
                    Duration::ZERO
                } else {
                    let jitter = rand::random::<u64>() % config.backoff_base_ms;
                    Duration::from_millis(backoff_ms + jitter)
                };

                warn!(
                    "Attempt {} failed: {}. Retrying in {:?}...",
                    attempts, e, delay
                );

                sleep(delay).await;
                backoff_ms = backoff_ms.saturating_mul(2);
            }
        }
    }
}
