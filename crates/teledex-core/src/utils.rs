//! Utility functions shared by the upstream clients.

use std::time::Duration;
use tokio_retry::strategy::{jitter, ExponentialBackoff};
use tokio_retry::RetryIf;
use tracing::warn;

use crate::config::{
    TELEGRAM_API_INITIAL_BACKOFF_MS, TELEGRAM_API_MAX_BACKOFF_MS, TELEGRAM_API_MAX_RETRIES,
};

/// Retry an upstream operation with exponential backoff and jitter.
///
/// Only errors for which `is_transient` returns `true` are retried; anything
/// else (e.g. "chat not found") is returned on the first attempt.
///
/// # Errors
///
/// Returns the last error if all attempts fail, or the first non-transient error.
///
/// # Examples
///
/// ```no_run
/// use teledex_core::utils::retry_transport_operation;
///
/// # async fn example() -> Result<(), std::io::Error> {
/// let body = retry_transport_operation(
///     || async { Ok::<_, std::io::Error>(vec![0u8; 4]) },
///     |e: &std::io::Error| e.kind() == std::io::ErrorKind::TimedOut,
/// )
/// .await?;
/// # Ok(())
/// # }
/// ```
pub async fn retry_transport_operation<F, Fut, T, E, C>(operation: F, is_transient: C) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T, E>>,
    C: FnMut(&E) -> bool,
    E: std::fmt::Display,
{
    let retry_strategy = ExponentialBackoff::from_millis(TELEGRAM_API_INITIAL_BACKOFF_MS)
        .max_delay(Duration::from_millis(TELEGRAM_API_MAX_BACKOFF_MS))
        .map(jitter) // Add jitter to prevent thundering herd
        .take(TELEGRAM_API_MAX_RETRIES);

    RetryIf::spawn(retry_strategy, operation, is_transient)
        .await
        .map_err(|e| {
            warn!(error = %e, "Upstream operation failed");
            e
        })
}

/// Strip the query string and fragment from a URL or path.
#[must_use]
pub fn strip_query(s: &str) -> &str {
    s.split(['?', '#']).next().unwrap_or(s)
}
