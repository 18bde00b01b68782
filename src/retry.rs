//! Retry logic with exponential backoff
//!
//! Transient WorldCat failures (5xx gateways, timeouts, dropped connections) are
//! retried inside a single fetcher call. The retrieval loop itself never retries: a
//! call that is still failing after the last attempt becomes a recorded failure.
//!
//! # Example
//!
//! ```no_run
//! use bibrecord_dl::retry::{IsRetryable, with_retry};
//! use bibrecord_dl::config::RetryConfig;
//!
//! #[derive(Debug)]
//! enum MyError {
//!     Transient,
//!     Permanent,
//! }
//!
//! impl std::fmt::Display for MyError {
//!     fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
//!         write!(f, "{:?}", self)
//!     }
//! }
//!
//! impl IsRetryable for MyError {
//!     fn is_retryable(&self) -> bool {
//!         matches!(self, MyError::Transient)
//!     }
//! }
//!
//! # async fn example() -> Result<(), MyError> {
//! let config = RetryConfig::default();
//! with_retry(&config, || async {
//!     Ok::<_, MyError>(())
//! }).await?;
//! # Ok(())
//! # }
//! ```

use crate::config::RetryConfig;
use crate::error::FetchError;
use rand::Rng;
use std::future::Future;
use std::time::Duration;

/// Trait for errors that can be classified as retryable or not
pub trait IsRetryable {
    /// Returns true if the error is transient and the operation should be retried
    fn is_retryable(&self) -> bool;
}

impl IsRetryable for FetchError {
    fn is_retryable(&self) -> bool {
        match self {
            FetchError::Timeout | FetchError::Network(_) => true,
            FetchError::Http { status, .. } => matches!(status, 500 | 502 | 503 | 504),
            // left to the request rate limiter
            FetchError::RateLimited => false,
            FetchError::NotFound | FetchError::Auth(_) | FetchError::Malformed(_) => false,
        }
    }
}

impl FetchError {
    /// Retry classification honoring the configured transient status list
    pub fn is_retryable_with(&self, config: &RetryConfig) -> bool {
        match self {
            FetchError::Http { status, .. } => config.retry_statuses.contains(status),
            other => other.is_retryable(),
        }
    }
}

/// Execute an async operation with exponential backoff retry logic
///
/// Returns the successful result or the last error after all retry attempts are exhausted.
pub async fn with_retry<F, Fut, T, E>(config: &RetryConfig, operation: F) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: IsRetryable + std::fmt::Display,
{
    with_retry_when(config, |e: &E| e.is_retryable(), operation).await
}

/// Like [`with_retry`], with a caller-supplied retry classification
pub async fn with_retry_when<F, Fut, T, E, P>(
    config: &RetryConfig,
    should_retry: P,
    mut operation: F,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: std::fmt::Display,
    P: Fn(&E) -> bool,
{
    let mut attempt = 0;
    let mut delay = config.initial_delay;

    loop {
        match operation().await {
            Ok(result) => {
                if attempt > 0 {
                    tracing::info!(attempts = attempt + 1, "request succeeded after retry");
                }
                return Ok(result);
            }
            Err(e) if should_retry(&e) && attempt < config.max_attempts => {
                attempt += 1;

                tracing::warn!(
                    error = %e,
                    attempt,
                    max_attempts = config.max_attempts,
                    delay_ms = delay.as_millis(),
                    "request failed, retrying"
                );

                let wait = if config.jitter { add_jitter(delay) } else { delay };
                tokio::time::sleep(wait).await;

                let next_delay =
                    Duration::from_secs_f64(delay.as_secs_f64() * config.backoff_multiplier);
                delay = next_delay.min(config.max_delay);
            }
            Err(e) => {
                if attempt > 0 {
                    tracing::debug!(
                        error = %e,
                        attempts = attempt + 1,
                        "request failed after all retry attempts"
                    );
                }
                return Err(e);
            }
        }
    }
}

/// Jitter is uniform between 0% and 100% of the delay, so the wait lands in `[delay, 2 * delay]`.
fn add_jitter(delay: Duration) -> Duration {
    let mut rng = rand::thread_rng();
    let jitter_factor: f64 = rng.gen_range(0.0..=1.0);
    Duration::from_secs_f64(delay.as_secs_f64() * (1.0 + jitter_factor))
}
