//! Bounded retry primitives.
//!
//! [`BackoffPolicy`] is a small state machine handing out a linear delay
//! schedule (`initial`, `initial + increment`, `initial + 2 * increment`, ...)
//! and answering [`Backoff::Stop`] once `max_attempts` delays have been
//! handed out. A policy carries per-operation state, so every independent
//! retryable operation builds its own instance from a [`BackoffConfig`].
//!
//! [`retry_with_backoff`] drives an async operation through a fresh policy,
//! retrying only errors the caller classifies as transient.

pub mod backoff;
pub mod constants;
pub mod error;
pub mod executor;

pub use backoff::{Backoff, BackoffConfig, BackoffPolicy};
pub use error::{RetryError, RetryResult};
pub use executor::retry_with_backoff;
