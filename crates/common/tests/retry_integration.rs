//! Integration tests for retry module
//!
//! Validates that the backoff executor cooperates with errors classified
//! through `impl_error_classification!`.

#![cfg(feature = "runtime")]

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tally_common::{
    impl_error_classification, retry_with_backoff, BackoffConfig, CommonError, ErrorClassification,
};

#[derive(Debug, thiserror::Error)]
enum SendError {
    #[error("connection refused")]
    Refused,

    #[error("payload rejected: {0}")]
    Rejected(String),

    #[error(transparent)]
    Common(#[from] CommonError),
}

impl_error_classification!(SendError, Common,
    Self::Refused => { retryable: true },
    Self::Rejected(_) => { retryable: false },
);

fn fast_config(max_attempts: u32) -> BackoffConfig {
    BackoffConfig::new(Duration::from_millis(5), Duration::from_millis(5), max_attempts)
        .expect("valid backoff config")
}

/// Transient errors are retried through the whole schedule, then the last
/// error surfaces.
#[tokio::test]
async fn transient_errors_exhaust_the_schedule() {
    let calls = Arc::new(AtomicU32::new(0));
    let counter = Arc::clone(&calls);

    let result: Result<(), SendError> = retry_with_backoff(
        fast_config(3).policy(),
        "post_batch",
        SendError::is_retryable,
        || {
            let counter = Arc::clone(&counter);
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Err(SendError::Refused)
            }
        },
    )
    .await;

    assert_eq!(calls.load(Ordering::SeqCst), 4, "one attempt plus three retries");
    assert!(matches!(result, Err(SendError::Refused)));
}

/// Permanent errors fail fast even with a long schedule, including shared
/// failures routed through the `Common` variant.
#[tokio::test]
async fn permanent_errors_fail_fast() {
    let slow = BackoffConfig::new(Duration::from_secs(30), Duration::from_secs(30), 3)
        .expect("valid backoff config");
    let started = Instant::now();

    let result: Result<(), SendError> = retry_with_backoff(
        slow.policy(),
        "validate",
        SendError::is_retryable,
        || async { Err(SendError::Rejected("empty id".into())) },
    )
    .await;
    assert!(matches!(result, Err(SendError::Rejected(_))));

    let result: Result<(), SendError> = retry_with_backoff(
        slow.policy(),
        "configure",
        SendError::is_retryable,
        || async { Err(CommonError::config_field("rate_limit", "must be at least 1").into()) },
    )
    .await;
    assert!(matches!(result, Err(SendError::Common(CommonError::Config { .. }))));

    assert!(started.elapsed() < Duration::from_secs(1));
}

/// Delays follow the linear schedule: with 20ms/20ms/2 the two sleeps add up
/// to at least 60ms.
#[tokio::test]
async fn delays_follow_linear_schedule() {
    let config = BackoffConfig::new(Duration::from_millis(20), Duration::from_millis(20), 2)
        .expect("valid backoff config");
    let started = Instant::now();

    let _: Result<(), SendError> = retry_with_backoff(
        config.policy(),
        "timed",
        SendError::is_retryable,
        || async { Err(SendError::Refused) },
    )
    .await;

    assert!(started.elapsed() >= Duration::from_millis(60));
}
