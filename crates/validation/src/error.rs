//! Error types for supply-chain validation.
//!
//! Appraisal outcomes (PASS/FAIL) are never errors; they live in the
//! [`ValidationSummary`](crate::ValidationSummary). These variants cover
//! conditions that stop a check from reaching a verdict at all.

use attestca_credentials::{CredentialError, StoreError};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ValidationError {
    /// Trust store could not be read
    #[error("Credential store error: {0}")]
    Store(#[from] StoreError),

    /// A credential or device report could not be interpreted
    #[error("Credential error: {0}")]
    Credential(#[from] CredentialError),

    /// Baseline source failure
    #[error("Baseline unavailable: {0}")]
    Baseline(String),

    /// Summary persistence failure
    #[error("Summary store error: {0}")]
    SummaryStore(String),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, ValidationError>;
