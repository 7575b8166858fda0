//! Exponential backoff retry for completion requests.

use std::future::Future;

use backoff::ExponentialBackoff;
use backoff::backoff::Backoff;
use tracing::debug;

use crate::config::RetryPolicy;
use crate::error::CompletionError;

/// Retry an async operation with exponential backoff and jitter.
///
/// `attempt` is called up to `policy.max_attempts` times. Only transient
/// errors (see [`CompletionError::is_transient`]) are retried; anything else is
/// returned as-is. A rate-limit `Retry-After` lengthens the wait, never
/// shortens it. Exhaustion wraps the last error in
/// [`CompletionError::CompletionFailed`].
pub async fn retry_transient<T, Fut, F>(policy: &RetryPolicy, mut attempt: F) -> Result<T, CompletionError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, CompletionError>>,
{
    let mut backoff = ExponentialBackoff {
        initial_interval: policy.initial_interval,
        max_interval: policy.max_interval,
        max_elapsed_time: None,
        ..Default::default()
    };

    let max_attempts = policy.max_attempts.max(1);
    let mut attempts = 0;

    loop {
        attempts += 1;

        let error = match attempt().await {
            Ok(value) => return Ok(value),
            Err(e) if !e.is_transient() => return Err(e),
            Err(e) => e,
        };

        if attempts >= max_attempts {
            return Err(CompletionError::CompletionFailed {
                attempts,
                last: Box::new(error),
            });
        }

        let mut wait = backoff.next_backoff().unwrap_or(policy.max_interval);
        if let Some(requested) = error.retry_after() {
            wait = wait.max(requested);
        }
        debug!(
            "Completion attempt {}/{} failed ({}), retrying in {:?}",
            attempts, max_attempts, error, wait
        );
        tokio::time::sleep(wait).await;
    }
}
