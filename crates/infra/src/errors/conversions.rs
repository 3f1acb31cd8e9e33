//! Conversions from external infrastructure errors into domain errors.

use reqwest::Error as HttpError;
use rusqlite::Error as SqlError;
use tally_common::storage::{is_transient_sqlite_code, StorageError};
use tally_common::{CompressionError, CryptoError, ErrorClassification, IntegrityError};
use tally_domain::TallyError;

/// Error newtype that keeps conversions on the infrastructure side and can be
/// converted back into the domain error.
#[derive(Debug)]
pub struct InfraError(pub TallyError);

impl From<InfraError> for TallyError {
    fn from(value: InfraError) -> Self {
        value.0
    }
}

impl From<TallyError> for InfraError {
    fn from(value: TallyError) -> Self {
        InfraError(value)
    }
}

/// Extension trait to make the conversion logic explicit in tests and within
/// this module.
trait IntoTallyError {
    fn into_tally(self) -> TallyError;
}

/* -------------------------------------------------------------------------- */
/* rusqlite::Error → TallyError */
/* -------------------------------------------------------------------------- */

impl IntoTallyError for SqlError {
    fn into_tally(self) -> TallyError {
        use rusqlite::ffi::ErrorCode;
        use rusqlite::Error as RE;

        match self {
            RE::SqliteFailure(err, maybe_message) => {
                let message = maybe_message.unwrap_or_default();
                match err.code {
                    ErrorCode::DatabaseBusy => {
                        TallyError::DatabaseTransient("database is busy".into())
                    }
                    ErrorCode::DatabaseLocked => {
                        TallyError::DatabaseTransient("database is locked".into())
                    }
                    code if is_transient_sqlite_code(code) => TallyError::DatabaseTransient(
                        format!("sqlite failure {:?} (code {}): {}", code, err.extended_code, message),
                    ),
                    ErrorCode::ConstraintViolation => TallyError::Database(format!(
                        "constraint violation (code {}): {}",
                        err.extended_code, message
                    )),
                    code => TallyError::Database(format!(
                        "sqlite failure {:?} (code {}): {}",
                        code, err.extended_code, message
                    )),
                }
            }
            RE::QueryReturnedNoRows => TallyError::NotFound("no rows returned by query".into()),
            RE::FromSqlConversionFailure(_, _, cause) => {
                TallyError::Database(format!("failed to convert sqlite value: {cause}"))
            }
            RE::InvalidColumnType(_, _, ty) => {
                TallyError::Database(format!("invalid column type: {ty}"))
            }
            RE::InvalidPath(path) => TallyError::Database(format!(
                "invalid database path: {}",
                path.to_string_lossy()
            )),
            RE::InvalidQuery => TallyError::Database("invalid SQL query".into()),
            other => TallyError::Database(other.to_string()),
        }
    }
}

impl From<SqlError> for InfraError {
    fn from(value: SqlError) -> Self {
        InfraError(value.into_tally())
    }
}

/* -------------------------------------------------------------------------- */
/* r2d2::Error / StorageError → TallyError */
/* -------------------------------------------------------------------------- */

impl From<r2d2::Error> for InfraError {
    fn from(value: r2d2::Error) -> Self {
        InfraError(TallyError::DatabaseTransient(format!("connection pool: {value}")))
    }
}

impl IntoTallyError for StorageError {
    fn into_tally(self) -> TallyError {
        match self {
            StorageError::Rusqlite(err) => err.into_tally(),
            StorageError::Timeout(secs) => {
                TallyError::Timeout(format!("connection checkout timed out after {secs}s"))
            }
            StorageError::InvalidConfig(message) => TallyError::Config(message),
            other if other.is_retryable() => TallyError::DatabaseTransient(other.to_string()),
            other => TallyError::Database(other.to_string()),
        }
    }
}

impl From<StorageError> for InfraError {
    fn from(value: StorageError) -> Self {
        InfraError(value.into_tally())
    }
}

/* -------------------------------------------------------------------------- */
/* reqwest::Error → TallyError */
/* -------------------------------------------------------------------------- */

impl IntoTallyError for HttpError {
    fn into_tally(self) -> TallyError {
        if self.is_timeout() {
            return TallyError::Timeout("HTTP request timed out".into());
        }

        if self.is_connect() {
            return TallyError::Network(format!("HTTP connection failure: {self}"));
        }

        if let Some(status) = self.status() {
            return status_to_error(status);
        }

        if self.is_builder() {
            return TallyError::Config(format!("invalid HTTP request: {self}"));
        }

        TallyError::Network(self.to_string())
    }
}

/// Classify a non-success HTTP status returned by the ingestion server.
///
/// 408 and 429 are transient, as is every 5xx; the remaining 4xx codes mean
/// the server refused the payload and resending it cannot help.
pub fn status_to_error(status: reqwest::StatusCode) -> TallyError {
    let code = status.as_u16();
    let message = format!("HTTP {} {}", code, status.canonical_reason().unwrap_or("unknown status"));

    match code {
        408 => TallyError::Timeout(message),
        429 => TallyError::Network(message),
        400..=499 => TallyError::Rejected(message),
        _ => TallyError::Network(message),
    }
}

impl From<HttpError> for InfraError {
    fn from(value: HttpError) -> Self {
        InfraError(value.into_tally())
    }
}

/* -------------------------------------------------------------------------- */
/* wire guards → TallyError */
/* -------------------------------------------------------------------------- */

impl From<CryptoError> for InfraError {
    fn from(value: CryptoError) -> Self {
        let mapped = match value {
            CryptoError::Decryption(message) => TallyError::Decryption(message),
            CryptoError::InvalidKey(message) => TallyError::Security(message),
            CryptoError::Encryption(message) => TallyError::Internal(message),
            CryptoError::Common(err) => TallyError::Security(err.to_string()),
        };
        InfraError(mapped)
    }
}

impl From<IntegrityError> for InfraError {
    fn from(value: IntegrityError) -> Self {
        let mapped = match value {
            IntegrityError::InvalidKey(message) => TallyError::Security(message),
            other => TallyError::Integrity(other.to_string()),
        };
        InfraError(mapped)
    }
}

impl From<CompressionError> for InfraError {
    fn from(value: CompressionError) -> Self {
        let mapped = match value {
            CompressionError::Compress(message) => TallyError::Internal(message),
            other @ (CompressionError::Decompress(_) | CompressionError::TooLarge { .. }) => {
                TallyError::InvalidInput(other.to_string())
            }
            CompressionError::Common(err) => TallyError::Internal(err.to_string()),
        };
        InfraError(mapped)
    }
}

/// Shorthand for `map_err` chains: `.map_err(infra_err)?`.
pub fn infra_err<E>(err: E) -> TallyError
where
    InfraError: From<E>,
{
    InfraError::from(err).into()
}

/* -------------------------------------------------------------------------- */
/* Tests */
/* -------------------------------------------------------------------------- */
