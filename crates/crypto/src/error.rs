//! Error types for cryptographic operations.

use thiserror::Error;

/// Errors that can occur in cryptographic operations.
#[derive(Debug, Error)]
pub enum CryptoError {
    /// TPM structure could not be parsed
    #[error("Malformed TPM structure: {0}")]
    MalformedTpmStructure(String),

    /// Algorithm or parameter not supported by the authority
    #[error("Unsupported algorithm: {0}")]
    UnsupportedAlgorithm(String),

    /// Key material is invalid
    #[error("Invalid key: {0}")]
    InvalidKey(String),

    /// Nonce or secret has an invalid length
    #[error("Invalid length: {0}")]
    InvalidLength(String),

    /// Integrity check failed while unwrapping a credential
    #[error("Integrity check failed")]
    IntegrityCheckFailed,

    /// Underlying RSA operation failed
    #[error("RSA error: {0}")]
    Rsa(#[from] rsa::Error),
}

/// Result type for cryptographic operations.
pub type CryptoResult<T> = Result<T, CryptoError>;
