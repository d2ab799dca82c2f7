//! TPM provisioning authority.
//!
//! Drives the two-phase credential activation protocol: identity claims are
//! answered with a nonce only the claimed TPM can recover, and a recovered
//! nonce is exchanged for an identity certificate once the device passes
//! supply-chain validation.

pub mod authority;
pub mod challenge;
pub mod error;
pub mod issuer;
pub mod session;

pub use authority::{ProvisioningAuthority, EK_MODULUS_LENGTH};
pub use challenge::{
    ChallengeState, ChallengeStateStore, InMemoryChallengeStore, SqliteChallengeStore,
};
pub use error::{ChallengeStoreError, ErrorKind, ProvisioningError, Result};
pub use issuer::{CertificateIssuer, IdentityAttributes, IssuedCertificate};
pub use session::{ProvisioningSession, SessionState, StateTransition};
