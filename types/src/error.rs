//! Validation errors for the fundamental types.

use thiserror::Error;

/// Raised when a raw value cannot be turned into one of the workspace's
/// validated primitives.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum TypeError {
    #[error("invalid subject id: {0}")]
    InvalidSubject(String),

    #[error("invalid phone number: {0}")]
    InvalidPhone(String),

    #[error("invalid one-time code: {0}")]
    InvalidCode(String),

    #[error("invalid field name: {0}")]
    InvalidField(String),

    #[error("invalid capture reference: {0}")]
    InvalidCapture(String),

    #[error("invalid parameter {name}: {reason}")]
    InvalidParam { name: &'static str, reason: String },
}
