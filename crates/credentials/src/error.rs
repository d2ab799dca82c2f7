//! Error types for credential parsing, verification and storage.

use thiserror::Error;

/// Errors raised while parsing or verifying credentials.
#[derive(Debug, Error)]
pub enum CredentialError {
    /// Bytes are not a well-formed certificate or attribute certificate
    #[error("Credential parse error: {0}")]
    Parse(String),

    /// A PEM bundle is malformed
    #[error("PEM error: {0}")]
    Pem(String),

    /// A required TCG attribute or extension is missing or malformed
    #[error("Missing or malformed attribute: {0}")]
    Attribute(String),

    /// Signature algorithm or key type outside the supported set
    #[error("Unsupported algorithm: {0}")]
    UnsupportedAlgorithm(String),

    /// Issuer public key could not be decoded
    #[error("Invalid public key: {0}")]
    InvalidKey(String),

    /// Signature did not verify against the issuer key
    #[error("Signature verification failed: {0}")]
    SignatureVerification(String),

    /// Device report is missing a sub-report or is not valid JSON
    #[error("Device report error: {0}")]
    DeviceReport(String),

    /// DER encoding errors
    #[error("DER error: {0}")]
    Der(#[from] der::Error),
}

/// Errors raised by a [`CredentialStore`](crate::store::CredentialStore).
#[derive(Debug, Error)]
pub enum StoreError {
    /// Another credential of the same kind already uses this SKI
    #[error("Duplicate subject key identifier {ski}")]
    DuplicateSubjectKeyIdentifier { ski: String },

    /// A persisted row no longer parses
    #[error("Corrupt stored credential {id}: {reason}")]
    Corrupt { id: i64, reason: String },

    /// Backing store could not be reached
    #[error("Store unavailable: {0}")]
    Unavailable(String),

    /// SQLite errors
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),
}

/// Result alias for credential operations.
pub type Result<T> = std::result::Result<T, CredentialError>;

/// Result alias for store operations.
pub type StoreResult<T> = std::result::Result<T, StoreError>;
