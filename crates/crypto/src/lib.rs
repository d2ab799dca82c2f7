//! Cryptographic primitives for the attestation authority.
//!
//! # Core Capabilities
//!
//! - **Nonces**: single-use challenge values and their lookup keys
//! - **TPM objects**: parsing RSA `TPMT_PUBLIC` areas and computing object names
//! - **Credential activation**: TPM2 MakeCredential, and a software
//!   ActivateCredential used by test clients
//! - **Authority keys**: loading the certificate signing key
//!
//! # Security Principles
//!
//! - Seeds and derived keys are zeroized after use
//! - Integrity tags are compared in constant time
//! - Secrets are never logged

pub mod credential;
pub mod error;
pub mod nonce;
pub mod signer;
pub mod tpm;

pub use credential::{activate_credential, make_credential, ActivationChallenge, CredentialBlob};
pub use error::{CryptoError, CryptoResult};
pub use nonce::{Nonce, NONCE_KEY_LENGTH};
pub use signer::AuthoritySigner;
pub use tpm::{encode_rsa_public, TpmPublicArea};
