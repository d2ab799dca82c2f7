//! Provisioning error taxonomy.
//!
//! Every failure of a provisioning request maps to exactly one kind. The
//! transport uses [`ProvisioningError::kind`] to choose a response; internal
//! detail stays in the logs and the validation summary.

use attestca_structs::StructError;
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Malformed,
    ProtocolState,
    ValidationFailed,
    ValidationError,
    SecurityViolation,
    Internal,
}

#[derive(Debug, Error)]
pub enum ProvisioningError {
    /// The request could not be decoded or is internally inconsistent
    #[error("Malformed request: {0}")]
    Malformed(String),

    /// Unknown, mismatched, expired or replayed nonce, or an invalid
    /// session transition
    #[error("Protocol state error: {0}")]
    ProtocolState(String),

    /// Appraisal failed; the summary holds the details
    #[error("Supply chain validation failed (summary {summary_id}): {}", failed.join("; "))]
    ValidationFailed { summary_id: Uuid, failed: Vec<String> },

    /// A check could not reach a verdict
    #[error("Supply chain validation error (summary {summary_id})")]
    ValidationError { summary_id: Uuid },

    /// Appraisal raised a security event such as a duplicate SKI
    #[error("Security violation (summary {summary_id}): {detail}")]
    SecurityViolation { summary_id: Uuid, detail: String },

    /// Store, signing or other server-side failure
    #[error("Internal error: {0}")]
    Internal(String),
}

impl ProvisioningError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Malformed(_) => ErrorKind::Malformed,
            Self::ProtocolState(_) => ErrorKind::ProtocolState,
            Self::ValidationFailed { .. } => ErrorKind::ValidationFailed,
            Self::ValidationError { .. } => ErrorKind::ValidationError,
            Self::SecurityViolation { .. } => ErrorKind::SecurityViolation,
            Self::Internal(_) => ErrorKind::Internal,
        }
    }

    /// Whether the request itself was at fault.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self.kind(),
            ErrorKind::Malformed
                | ErrorKind::ProtocolState
                | ErrorKind::ValidationFailed
                | ErrorKind::SecurityViolation
        )
    }
}

impl From<StructError> for ProvisioningError {
    fn from(err: StructError) -> Self {
        Self::Malformed(err.to_string())
    }
}

impl From<ChallengeStoreError> for ProvisioningError {
    fn from(err: ChallengeStoreError) -> Self {
        Self::Internal(err.to_string())
    }
}

/// Challenge state persistence failures.
#[derive(Debug, Error)]
pub enum ChallengeStoreError {
    /// Another challenge already occupies the lookup key
    #[error("Challenge key {0:#018x} already in use")]
    KeyInUse(i64),

    #[error("Challenge store unavailable: {0}")]
    Unavailable(String),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),
}

pub type Result<T> = std::result::Result<T, ProvisioningError>;
