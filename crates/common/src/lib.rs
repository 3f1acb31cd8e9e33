//! Modular common utilities shared across Tally crates.
//!
//! # Feature Tiers
//!
//! Enable cargo features to opt into the tiers you need:
//! - `foundation`: error taxonomy and classification
//! - `runtime`: retry/backoff, payload compression, confidentiality and
//!   integrity guards
//! - `platform`: pooled SQLite storage
//! - `observability`: tracing (pulled in by `runtime`)

#![forbid(unsafe_code)]
#![warn(rust_2018_idioms)]
#![warn(clippy::all, clippy::perf, clippy::complexity, clippy::suspicious)]

// Foundation tier
// -----------------------------------------------------------------
#[cfg(feature = "foundation")]
pub mod error;

// Runtime tier
// --------------------------------------------------------------------
#[cfg(feature = "runtime")]
pub mod compression;
#[cfg(feature = "runtime")]
pub mod crypto;
#[cfg(feature = "runtime")]
pub mod retry;

// Platform tier
// -------------------------------------------------------------------
#[cfg(feature = "platform")]
pub mod storage;

// Re-export commonly used types and traits for convenience
// ------------------------
#[cfg(feature = "runtime")]
pub use compression::{CompressionError, CompressionService};
#[cfg(feature = "runtime")]
pub use crypto::{
    ConfidentialityGuard, CryptoError, EncryptedEnvelope, IntegrityError, IntegrityGuard,
};
#[cfg(feature = "foundation")]
pub use error::{CommonError, CommonResult, ErrorClassification};
#[cfg(feature = "runtime")]
pub use retry::{retry_with_backoff, Backoff, BackoffConfig, BackoffPolicy, RetryError};
#[cfg(feature = "platform")]
pub use storage::{PoolConfig, SqliteConnection, SqlitePool, StorageError};
