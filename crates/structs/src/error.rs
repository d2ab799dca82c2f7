//! Codec error types.

use thiserror::Error;

/// Errors raised while converting between records and wire bytes.
///
/// Both variants describe a message the authority refuses to process; neither
/// is retried.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StructError {
    /// The record or its layout cannot be expressed on the wire
    #[error("Struct conversion error: {0}")]
    StructConversion(String),

    /// The input bytes do not form a complete message
    #[error("Invalid struct: {0}")]
    InvalidStruct(String),
}

impl StructError {
    pub(crate) fn conversion(msg: impl Into<String>) -> Self {
        StructError::StructConversion(msg.into())
    }

    pub(crate) fn invalid(msg: impl Into<String>) -> Self {
        StructError::InvalidStruct(msg.into())
    }
}

/// Result type for codec operations.
pub type Result<T> = std::result::Result<T, StructError>;
