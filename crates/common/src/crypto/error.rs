// Error types for the crypto module
use thiserror::Error;

use crate::error::CommonError;
use crate::{impl_error_classification, impl_error_conversion};

/// Errors raised by the confidentiality guard
#[derive(Debug, Error)]
pub enum CryptoError {
    #[error(transparent)]
    Common(#[from] CommonError),

    #[error("Invalid key material: {0}")]
    InvalidKey(String),

    #[error("Encryption failed: {0}")]
    Encryption(String),

    #[error("Decryption failed: {0}")]
    Decryption(String),
}

impl_error_conversion!(CryptoError, Common);

impl_error_classification!(CryptoError, Common,
    Self::InvalidKey(_) | Self::Encryption(_) | Self::Decryption(_) => { retryable: false },
);

/// Result type for crypto operations
pub type CryptoResult<T> = Result<T, CryptoError>;
