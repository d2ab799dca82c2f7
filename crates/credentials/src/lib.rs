//! Credentials for TPM attestation.
//!
//! Parses the credentials a provisioning authority appraises and keeps its
//! trust store:
//!
//! - **Endorsement credentials**: X.509 certificates binding a TPM
//!   endorsement key, issued by the TPM manufacturer
//! - **Platform credentials**: RFC 5755 attribute certificates listing a
//!   platform's hardware components, bound to an endorsement credential
//! - **CA credentials**: trust anchors and intermediates used for chain
//!   building
//! - **Device reports**: the inventory a client collects from the running
//!   platform
//!
//! Credentials are immutable values; the [`CredentialStore`] trait hides
//! where they live.

pub mod asn1;
pub mod component;
pub mod credential;
pub mod device;
pub mod error;
pub mod oids;
pub mod pem;
pub mod store;
pub mod verify;

#[cfg(any(test, feature = "test-support"))]
pub mod test_support;

pub use component::{
    specified, AttributeStatus, ComponentClass, ComponentIdentifier, PlatformProperty,
};
pub use credential::{
    CaCredential, ConformanceCredential, Credential, CredentialInfo, CredentialKind,
    EndorsementCredential, PlatformCredential, PlatformCredentialType, PlatformIdentity,
    SignedPortion,
};
pub use device::{
    ComponentInfo, DeviceInfoReport, FirmwareInfo, HardwareInfo, NetworkInfo, OsInfo, TpmInfo,
};
pub use error::{CredentialError, Result, StoreError, StoreResult};
pub use store::{
    CredentialSelector, CredentialStore, InMemoryCredentialStore, SqliteCredentialStore,
};
pub use verify::verify_signature;

pub use x509_cert::name::Name;
