//! Retry schedule errors
//!
//! Building a schedule only fails on configuration, so every failure lands in
//! the shared taxonomy; the wrapper keeps the module's public surface stable.

use thiserror::Error;

use crate::error::CommonError;
use crate::{impl_error_classification, impl_error_conversion};

#[derive(Debug, Error)]
pub enum RetryError {
    #[error(transparent)]
    Common(#[from] CommonError),
}

impl_error_conversion!(RetryError, Common);
impl_error_classification!(RetryError, Common);

pub type RetryResult<T> = Result<T, RetryError>;
