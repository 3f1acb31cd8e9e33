// Async retry loop driven by a BackoffPolicy
use std::fmt::Display;
use std::future::Future;

use tracing::{debug, error, warn};

use crate::retry::backoff::{Backoff, BackoffPolicy};

/// Run `operation` until it succeeds, fails permanently or the policy stops.
///
/// `is_retryable` classifies each failure. A permanent failure is returned
/// immediately without consuming the policy; a transient one sleeps for the
/// next scheduled delay. When the policy answers [`Backoff::Stop`], the last
/// observed error is returned.
///
/// The policy is taken by value: pass a freshly built one per operation.
pub async fn retry_with_backoff<T, E, F, Fut, P>(
    mut policy: BackoffPolicy,
    operation_name: &str,
    is_retryable: P,
    mut operation: F,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    P: Fn(&E) -> bool,
    E: Display,
{
    loop {
        let err = match operation().await {
            Ok(value) => {
                if policy.attempts() > 0 {
                    debug!(
                        operation = operation_name,
                        retries = policy.attempts(),
                        "operation succeeded after retry"
                    );
                }
                return Ok(value);
            }
            Err(err) => err,
        };

        if !is_retryable(&err) {
            debug!(operation = operation_name, error = %err, "permanent failure, not retrying");
            return Err(err);
        }

        match policy.next_backoff() {
            Backoff::Delay(delay) => {
                warn!(
                    operation = operation_name,
                    attempt = policy.attempts(),
                    max_attempts = policy.max_attempts(),
                    delay_ms = delay.as_millis() as u64,
                    error = %err,
                    "transient failure, retrying"
                );
                tokio::time::sleep(delay).await;
            }
            Backoff::Stop => {
                error!(
                    operation = operation_name,
                    attempts = policy.attempts(),
                    error = %err,
                    "retry attempts exhausted"
                );
                return Err(err);
            }
        }
    }
}
