//! Storage error types
//!
//! Defines error types for the pooled SQLite layer and classifies SQLite
//! result codes into transient and permanent failures.

use thiserror::Error;

use crate::error::ErrorClassification;

/// Storage error type
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Database connection error: {0}")]
    Connection(String),

    #[error("Database query error: {0}")]
    Query(String),

    #[error("Database migration error: {0}")]
    Migration(String),

    #[error("Connection timeout after {0}s")]
    Timeout(u64),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Rusqlite(#[from] rusqlite::Error),

    #[error(transparent)]
    R2d2(#[from] r2d2::Error),
}

/// Storage result type
pub type StorageResult<T> = Result<T, StorageError>;

/// SQLite result codes that describe a transient condition.
///
/// Lock contention, a database file that cannot be opened right now,
/// resource exhaustion and I/O failures may clear on their own; every other
/// code (constraint violations, type mismatches, malformed SQL) is
/// permanent.
pub fn is_transient_sqlite_code(code: rusqlite::ErrorCode) -> bool {
    matches!(
        code,
        rusqlite::ErrorCode::DatabaseBusy
            | rusqlite::ErrorCode::DatabaseLocked
            | rusqlite::ErrorCode::CannotOpen
            | rusqlite::ErrorCode::OutOfMemory
            | rusqlite::ErrorCode::DiskFull
            | rusqlite::ErrorCode::SystemIoFailure
            | rusqlite::ErrorCode::FileLockingProtocolFailed
    )
}

/// Classify a raw rusqlite error.
pub fn is_transient_sqlite_error(err: &rusqlite::Error) -> bool {
    err.sqlite_error_code().is_some_and(is_transient_sqlite_code)
}

impl ErrorClassification for StorageError {
    /// Pool checkout failures and the transient SQLite codes may clear on
    /// their own; configuration, migration and I/O failures will not.
    fn is_retryable(&self) -> bool {
        match self {
            Self::Timeout(_) | Self::Connection(_) | Self::R2d2(_) => true,
            Self::Rusqlite(err) => is_transient_sqlite_error(err),
            Self::Query(_) | Self::Migration(_) | Self::InvalidConfig(_) | Self::Io(_) => false,
        }
    }
}
