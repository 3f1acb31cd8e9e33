//! Shared error taxonomy for the common modules.
//!
//! [`CommonError`] holds the failure shapes more than one module produces:
//! bad configuration and the JSON and file I/O failures routed in through
//! [`impl_error_conversion!`](crate::impl_error_conversion). Module errors
//! (`RetryError`, `CryptoError`, `IntegrityError`, `CompressionError`) embed
//! it as a `Common` variant and answer [`ErrorClassification`] through
//! [`impl_error_classification!`](crate::impl_error_classification), so the
//! infra error mapping can ask any of them whether it is transient without
//! matching on concrete types.
//!
//! None of the shared shapes is transient.

use thiserror::Error;

pub type CommonResult<T> = Result<T, CommonError>;

#[derive(Debug, Clone, Error)]
pub enum CommonError {
    #[error("Configuration error{}: {message}", field_suffix(.field))]
    Config { message: String, field: Option<String> },

    #[error("Serialization error ({format}): {message}")]
    Serialization { message: String, format: &'static str },

    /// File I/O outside the database
    #[error("Persistence error: {message}")]
    Persistence { message: String },
}

fn field_suffix(field: &Option<String>) -> String {
    field.as_ref().map(|field| format!(" in field '{field}'")).unwrap_or_default()
}

impl CommonError {
    pub fn config_field(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Config { message: message.into(), field: Some(field.into()) }
    }
}

impl ErrorClassification for CommonError {
    fn is_retryable(&self) -> bool {
        false
    }
}

impl From<serde_json::Error> for CommonError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization { message: err.to_string(), format: "JSON" }
    }
}

impl From<std::io::Error> for CommonError {
    fn from(err: std::io::Error) -> Self {
        Self::Persistence { message: err.to_string() }
    }
}

/// Whether repeating the failed operation may succeed.
pub trait ErrorClassification {
    fn is_retryable(&self) -> bool;
}

/// Route `serde_json::Error` and `std::io::Error` into a module error's
/// `Common` variant.
///
/// ```rust,ignore
/// impl_error_conversion!(CodecError, Common);
/// ```
#[macro_export]
macro_rules! impl_error_conversion {
    ($error_type:ty, $variant:ident) => {
        impl ::std::convert::From<::serde_json::Error> for $error_type {
            fn from(err: ::serde_json::Error) -> Self {
                Self::$variant($crate::error::CommonError::from(err))
            }
        }

        impl ::std::convert::From<::std::io::Error> for $error_type {
            fn from(err: ::std::io::Error) -> Self {
                Self::$variant($crate::error::CommonError::from(err))
            }
        }
    };
}

/// Implement [`ErrorClassification`] for a module error, delegating its
/// `Common` variant and listing the answer for every other variant.
///
/// ```rust,ignore
/// impl_error_classification!(CodecError, Common,
///     Self::Unsupported(_) => { retryable: false },
///     Self::Busy => { retryable: true },
/// );
/// ```
#[macro_export]
macro_rules! impl_error_classification {
    (
        $error_type:ty,
        $common_variant:ident
        $(, $variant:pat => { retryable: $retryable:expr $(,)? })*
        $(,)?
    ) => {
        impl $crate::error::ErrorClassification for $error_type {
            fn is_retryable(&self) -> bool {
                match self {
                    Self::$common_variant(e) => $crate::error::ErrorClassification::is_retryable(e),
                    $($variant => $retryable,)*
                }
            }
        }
    };
}
