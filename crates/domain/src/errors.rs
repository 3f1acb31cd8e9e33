//! Error types used throughout the workspace

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Main error type for Tally
///
/// Every error crossing a crate boundary is one of these variants. The
/// variant alone decides whether a failure is transient; see
/// [`TallyError::is_transient`].
#[derive(Error, Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "message")]
pub enum TallyError {
    /// Permanent backend failure (constraint violation, malformed SQL, ...)
    #[error("Database error: {0}")]
    Database(String),

    /// Backend failure that may clear on retry (busy, locked, I/O, ...)
    #[error("Transient database error: {0}")]
    DatabaseTransient(String),

    #[error("Configuration error: {0}")]
    Config(String),

    /// Connection-class transport failure
    #[error("Network error: {0}")]
    Network(String),

    /// Server answered with a status that retrying will not fix
    #[error("Request rejected: {0}")]
    Rejected(String),

    #[error("Security error: {0}")]
    Security(String),

    #[error("Integrity check failed: {0}")]
    Integrity(String),

    #[error("Decryption failed: {0}")]
    Decryption(String),

    #[error("Operation timed out: {0}")]
    Timeout(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl TallyError {
    /// Transient failures are retried under a backoff policy; everything else
    /// fails immediately.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::DatabaseTransient(_) | Self::Network(_) | Self::Timeout(_))
    }

    /// Failures caused by the caller's request rather than by this process.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            Self::InvalidInput(_) | Self::Integrity(_) | Self::Decryption(_) | Self::Security(_)
        )
    }
}

/// Result type alias for Tally operations
pub type Result<T> = std::result::Result<T, TallyError>;
