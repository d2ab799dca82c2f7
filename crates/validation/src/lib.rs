//! Supply-chain validation for the attestation authority.
//!
//! Checks endorsement and platform credentials against the trust store
//! and cross-checks declared platform components with the inventory a
//! device reports, producing an ordered [`ValidationSummary`].

pub mod attributes;
pub mod baseline;
pub mod chain;
pub mod error;
pub mod policy;
pub mod summary;
pub mod summary_store;
pub mod validator;

pub use attributes::{cross_check, merge_deltas, MergeOutcome};
pub use baseline::{PcrBaseline, PcrBaselineSource, StaticPcrBaselines};
pub use chain::{verify_chain, ChainVerdict, MAX_CHAIN_DEPTH};
pub use error::{Result, ValidationError};
pub use policy::SupplyChainPolicy;
pub use summary::{
    AppraisalStatus, SecurityEvent, ValidationResult, ValidationSummary, ValidationType,
};
pub use summary_store::{InMemorySummaryStore, SqliteSummaryStore, SummaryStore};
pub use validator::{EndorsementInput, SupplyChainValidator, UnparsedCredential};
