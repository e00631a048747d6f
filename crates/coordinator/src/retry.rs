//! Constant-backoff retry for connection bootstrapping.

use std::future::Future;
use std::time::Duration;

use tokio::time::sleep;

/// How often and how far apart to retry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first. Zero is treated as one.
    pub attempts: u32,
    /// Pause between attempts.
    pub interval: Duration,
}

impl RetryPolicy {
    pub fn new(attempts: u32, interval: Duration) -> Self {
        Self { attempts, interval }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: 5,
            interval: Duration::from_secs(1),
        }
    }
}

/// Runs `operation` until it succeeds or the attempts are used up,
/// returning the last error.
pub async fn with_constant_backoff<F, Fut, T, E>(
    policy: RetryPolicy,
    target: &str,
    mut operation: F,
) -> Result<T, E>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: std::fmt::Display,
{
    let attempts = policy.attempts.max(1);
    let mut attempt = 0;

    loop {
        attempt += 1;

        match operation(attempt).await {
            Ok(value) => {
                if attempt > 1 {
                    tracing::info!(target_service = target, attempt, "connected after retry");
                }
                return Ok(value);
            }
            Err(error) if attempt >= attempts => {
                tracing::error!(
                    target_service = target,
                    attempt,
                    error = %error,
                    "giving up after all attempts"
                );
                return Err(error);
            }
            Err(error) => {
                tracing::warn!(
                    target_service = target,
                    attempt,
                    max_attempts = attempts,
                    error = %error,
                    delay_ms = policy.interval.as_millis() as u64,
                    "connection attempt failed, retrying"
                );
                sleep(policy.interval).await;
            }
        }
    }
}
