//! TCG and PKIX object identifiers used by credentials.

use der::oid::ObjectIdentifier;

// TPM identity in the EK/AIK subject alternative name
pub const TPM_MANUFACTURER: ObjectIdentifier = ObjectIdentifier::new_unwrap("2.23.133.2.1");
pub const TPM_MODEL: ObjectIdentifier = ObjectIdentifier::new_unwrap("2.23.133.2.2");
pub const TPM_VERSION: ObjectIdentifier = ObjectIdentifier::new_unwrap("2.23.133.2.3");

/// `tcg-at-tcgCredentialType`
pub const TCG_CREDENTIAL_TYPE: ObjectIdentifier = ObjectIdentifier::new_unwrap("2.23.133.2.25");
/// `tcg-kp-PlatformAttributeCertificate`, a base platform credential
pub const PLATFORM_CERTIFICATE_BASE: ObjectIdentifier =
    ObjectIdentifier::new_unwrap("2.23.133.8.2");
/// `tcg-kp-DeltaPlatformAttributeCertificate`
pub const PLATFORM_CERTIFICATE_DELTA: ObjectIdentifier =
    ObjectIdentifier::new_unwrap("2.23.133.8.5");
/// `tcg-kp-AIKCertificate`, extended key usage of issued identity certificates
pub const AIK_CERTIFICATE: ObjectIdentifier = ObjectIdentifier::new_unwrap("2.23.133.8.3");

// Platform attributes
pub const PLATFORM_MANUFACTURER: ObjectIdentifier = ObjectIdentifier::new_unwrap("2.23.133.5.1.1");
pub const PLATFORM_MODEL: ObjectIdentifier = ObjectIdentifier::new_unwrap("2.23.133.5.1.4");
pub const PLATFORM_VERSION: ObjectIdentifier = ObjectIdentifier::new_unwrap("2.23.133.5.1.5");
pub const PLATFORM_SERIAL: ObjectIdentifier = ObjectIdentifier::new_unwrap("2.23.133.5.1.6");
pub const PLATFORM_CONFIGURATION_V2: ObjectIdentifier =
    ObjectIdentifier::new_unwrap("2.23.133.5.1.7.2");

/// TCG component class registry
pub const COMPONENT_CLASS_TCG: ObjectIdentifier = ObjectIdentifier::new_unwrap("2.23.133.18.3.1");

// Signature algorithms
pub const RSA_ENCRYPTION: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.2.840.113549.1.1.1");
pub const SHA256_WITH_RSA: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.2.840.113549.1.1.11");
pub const SHA384_WITH_RSA: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.2.840.113549.1.1.12");
pub const ECDSA_WITH_SHA256: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.2.840.10045.4.3.2");
pub const ECDSA_WITH_SHA384: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.2.840.10045.4.3.3");
