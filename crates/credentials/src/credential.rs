//! Parsed credentials.
//!
//! A [`Credential`] is immutable once parsed. Endorsement and CA credentials
//! are X.509 certificates; platform and conformance credentials are RFC 5755
//! attribute certificates. Every variant shares a [`CredentialInfo`] with the
//! fields chain building and the store rely on.

use crate::asn1::{
    AttributeCertificate, PlatformConfiguration, TcgCredentialType, ATTRIBUTE_CERTIFICATE_V2,
};
use crate::component::{specified, ComponentIdentifier, PlatformProperty};
use crate::error::{CredentialError, Result};
use crate::oids;
use der::asn1::{Any, ObjectIdentifier};
use der::oid::AssociatedOid;
use der::{Decode, Encode, Tag, Tagged};
use rsa::traits::PublicKeyParts;
use rsa::RsaPublicKey;
use serde::{Deserialize, Serialize};
use sha1::{Digest, Sha1};
use spki::DecodePublicKey;
use std::fmt;
use std::str::FromStr;
use x509_cert::attr::Attribute;
use x509_cert::ext::pkix::name::GeneralName;
use x509_cert::ext::pkix::{
    AuthorityKeyIdentifier, BasicConstraints, SubjectAltName, SubjectKeyIdentifier,
};
use x509_cert::ext::Extension;
use x509_cert::name::Name;
use x509_cert::Certificate;

/// Credential variant tag, also the persisted discriminator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum CredentialKind {
    Endorsement,
    Platform,
    CertificateAuthority,
    Conformance,
}

impl CredentialKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Endorsement => "endorsement",
            Self::Platform => "platform",
            Self::CertificateAuthority => "certificate_authority",
            Self::Conformance => "conformance",
        }
    }
}

impl fmt::Display for CredentialKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CredentialKind {
    type Err = CredentialError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "endorsement" => Ok(Self::Endorsement),
            "platform" => Ok(Self::Platform),
            "certificate_authority" => Ok(Self::CertificateAuthority),
            "conformance" => Ok(Self::Conformance),
            other => Err(CredentialError::Parse(format!(
                "unknown credential kind {}",
                other
            ))),
        }
    }
}

/// The bytes a signature covers, with the algorithm and signature value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedPortion {
    pub tbs: Vec<u8>,
    pub algorithm: ObjectIdentifier,
    pub signature: Vec<u8>,
}

/// Fields every credential variant carries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CredentialInfo {
    /// DER INTEGER content of the serial number
    pub serial: Vec<u8>,
    pub issuer: Name,
    pub subject: Option<Name>,
    pub subject_key_id: Option<Vec<u8>>,
    pub authority_key_id: Option<Vec<u8>>,
    /// Unix seconds
    pub not_before: u64,
    /// Unix seconds
    pub not_after: u64,
    pub der: Vec<u8>,
    pub signed: SignedPortion,
}

impl CredentialInfo {
    pub fn serial_hex(&self) -> String {
        hex::encode(&self.serial)
    }

    pub fn subject_key_id_hex(&self) -> Option<String> {
        self.subject_key_id.as_ref().map(hex::encode)
    }

    pub fn is_valid_at(&self, unix_secs: u64) -> bool {
        self.not_before <= unix_secs && unix_secs <= self.not_after
    }

    pub fn is_self_issued(&self) -> bool {
        self.subject.as_ref() == Some(&self.issuer)
    }

    fn from_certificate(cert: &Certificate, der: &[u8]) -> Result<Self> {
        let tbs = &cert.tbs_certificate;
        let extensions = tbs.extensions.as_deref().unwrap_or(&[]);

        let subject_key_id = find_extension::<SubjectKeyIdentifier>(extensions)?
            .map(|ski| ski.0.as_bytes().to_vec())
            .or_else(|| {
                tbs.subject_public_key_info
                    .subject_public_key
                    .as_bytes()
                    .map(|bits| Sha1::digest(bits).to_vec())
            });
        let authority_key_id = find_extension::<AuthorityKeyIdentifier>(extensions)?
            .and_then(|aki| aki.key_identifier)
            .map(|id| id.as_bytes().to_vec());

        Ok(Self {
            serial: tbs.serial_number.as_bytes().to_vec(),
            issuer: tbs.issuer.clone(),
            subject: Some(tbs.subject.clone()),
            subject_key_id,
            authority_key_id,
            not_before: tbs.validity.not_before.to_unix_duration().as_secs(),
            not_after: tbs.validity.not_after.to_unix_duration().as_secs(),
            der: der.to_vec(),
            signed: SignedPortion {
                tbs: tbs.to_der()?,
                algorithm: cert.signature_algorithm.oid,
                signature: cert.signature.raw_bytes().to_vec(),
            },
        })
    }

    fn from_attribute_certificate(ac: &AttributeCertificate, der: &[u8]) -> Result<Self> {
        let info = &ac.acinfo;
        if info.version != ATTRIBUTE_CERTIFICATE_V2 {
            return Err(CredentialError::Parse(format!(
                "attribute certificate version {} is not v2",
                info.version
            )));
        }
        let issuer = info
            .issuer
            .issuer_name
            .as_deref()
            .and_then(first_directory_name)
            .ok_or_else(|| {
                CredentialError::Parse("attribute certificate issuer has no directory name".into())
            })?;
        let extensions = info.extensions.as_deref().unwrap_or(&[]);
        let authority_key_id = find_extension::<AuthorityKeyIdentifier>(extensions)?
            .and_then(|aki| aki.key_identifier)
            .map(|id| id.as_bytes().to_vec());

        Ok(Self {
            serial: info.serial_number.as_bytes().to_vec(),
            issuer,
            subject: None,
            subject_key_id: None,
            authority_key_id,
            not_before: info.validity.not_before_time.to_unix_duration().as_secs(),
            not_after: info.validity.not_after_time.to_unix_duration().as_secs(),
            der: der.to_vec(),
            signed: SignedPortion {
                tbs: info.to_der()?,
                algorithm: ac.signature_algorithm.oid,
                signature: ac.signature_value.raw_bytes().to_vec(),
            },
        })
    }
}

/// TPM endorsement key certificate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EndorsementCredential {
    pub info: CredentialInfo,
    pub public_key_der: Vec<u8>,
    pub rsa_modulus: Option<Vec<u8>>,
    pub tpm_manufacturer: Option<String>,
    pub tpm_model: Option<String>,
    pub tpm_version: Option<String>,
}

impl EndorsementCredential {
    pub fn from_der(der: &[u8]) -> Result<Self> {
        let cert = Certificate::from_der(der)?;
        let info = CredentialInfo::from_certificate(&cert, der)?;
        let public_key_der = cert.tbs_certificate.subject_public_key_info.to_der()?;
        let rsa_modulus = RsaPublicKey::from_public_key_der(&public_key_der)
            .ok()
            .map(|key| key.n().to_bytes_be());

        let mut credential = Self {
            info,
            public_key_der,
            rsa_modulus,
            tpm_manufacturer: None,
            tpm_model: None,
            tpm_version: None,
        };

        let extensions = cert.tbs_certificate.extensions.as_deref().unwrap_or(&[]);
        if let Some(san) = find_extension::<SubjectAltName>(extensions)? {
            for name in san.0.iter() {
                if let GeneralName::DirectoryName(directory) = name {
                    for rdn in directory.0.iter() {
                        for atv in rdn.0.iter() {
                            let value = any_to_string(&atv.value);
                            match atv.oid {
                                oid if oid == oids::TPM_MANUFACTURER => {
                                    credential.tpm_manufacturer = value
                                }
                                oid if oid == oids::TPM_MODEL => credential.tpm_model = value,
                                oid if oid == oids::TPM_VERSION => credential.tpm_version = value,
                                _ => {}
                            }
                        }
                    }
                }
            }
        }
        Ok(credential)
    }

    /// Compare against a raw big-endian modulus, ignoring leading zeros.
    pub fn has_modulus(&self, modulus: &[u8]) -> bool {
        match &self.rsa_modulus {
            Some(own) => strip_leading_zeros(own) == strip_leading_zeros(modulus),
            None => false,
        }
    }
}

/// Trust anchor or intermediate CA certificate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaCredential {
    pub info: CredentialInfo,
    pub public_key_der: Vec<u8>,
    pub is_ca: bool,
    pub path_len: Option<u8>,
}

impl CaCredential {
    pub fn from_der(der: &[u8]) -> Result<Self> {
        let cert = Certificate::from_der(der)?;
        let info = CredentialInfo::from_certificate(&cert, der)?;
        let extensions = cert.tbs_certificate.extensions.as_deref().unwrap_or(&[]);
        let constraints = find_extension::<BasicConstraints>(extensions)?;
        Ok(Self {
            info,
            public_key_der: cert.tbs_certificate.subject_public_key_info.to_der()?,
            is_ca: constraints.as_ref().map(|bc| bc.ca).unwrap_or(false),
            path_len: constraints.and_then(|bc| bc.path_len_constraint),
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PlatformCredentialType {
    Base,
    Delta,
}

/// Platform identity attributes of a platform credential.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlatformIdentity {
    pub manufacturer: Option<String>,
    pub model: Option<String>,
    pub version: Option<String>,
    pub serial: Option<String>,
}

/// OEM-issued attribute certificate describing a platform.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlatformCredential {
    pub info: CredentialInfo,
    pub credential_type: PlatformCredentialType,
    /// Issuer of the referenced endorsement credential
    pub holder_issuer: Option<Name>,
    /// Serial of the referenced endorsement credential
    pub holder_serial: Option<Vec<u8>>,
    pub platform: PlatformIdentity,
    pub components: Vec<ComponentIdentifier>,
    pub properties: Vec<PlatformProperty>,
}

impl PlatformCredential {
    pub fn from_der(der: &[u8]) -> Result<Self> {
        let ac = AttributeCertificate::from_der(der)?;
        let info = CredentialInfo::from_attribute_certificate(&ac, der)?;
        let attributes = ac.acinfo.attributes.as_slice();

        let credential_type = match attribute_value(attributes, oids::TCG_CREDENTIAL_TYPE) {
            None => PlatformCredentialType::Base,
            Some(value) => {
                let raw: TcgCredentialType = decode_any(value)?;
                match raw.certificate_type {
                    oid if oid == oids::PLATFORM_CERTIFICATE_BASE => PlatformCredentialType::Base,
                    oid if oid == oids::PLATFORM_CERTIFICATE_DELTA => {
                        PlatformCredentialType::Delta
                    }
                    other => {
                        return Err(CredentialError::Attribute(format!(
                            "unknown platform credential type {}",
                            other
                        )))
                    }
                }
            }
        };

        let platform = PlatformIdentity {
            manufacturer: string_attribute(attributes, oids::PLATFORM_MANUFACTURER),
            model: string_attribute(attributes, oids::PLATFORM_MODEL),
            version: string_attribute(attributes, oids::PLATFORM_VERSION),
            serial: string_attribute(attributes, oids::PLATFORM_SERIAL),
        };

        let configuration = match attribute_value(attributes, oids::PLATFORM_CONFIGURATION_V2) {
            Some(value) => decode_any::<PlatformConfiguration>(value)?,
            None => PlatformConfiguration::default(),
        };
        let components = configuration
            .component_identifiers
            .unwrap_or_default()
            .into_iter()
            .map(ComponentIdentifier::try_from)
            .collect::<Result<Vec<_>>>()?;
        let properties = configuration
            .platform_properties
            .unwrap_or_default()
            .into_iter()
            .map(PlatformProperty::from)
            .collect();

        let (holder_issuer, holder_serial) = match &ac.acinfo.holder.base_certificate_id {
            Some(base) => (
                first_directory_name(&base.issuer),
                Some(base.serial.as_bytes().to_vec()),
            ),
            None => (None, None),
        };

        Ok(Self {
            info,
            credential_type,
            holder_issuer,
            holder_serial,
            platform,
            components,
            properties,
        })
    }

    pub fn is_delta(&self) -> bool {
        self.credential_type == PlatformCredentialType::Delta
    }

    /// Whether the holder reference names this endorsement credential.
    pub fn references(&self, ec: &EndorsementCredential) -> bool {
        let serial_matches = self.holder_serial.as_deref() == Some(ec.info.serial.as_slice());
        let issuer_matches = match &self.holder_issuer {
            Some(issuer) => issuer == &ec.info.issuer,
            None => true,
        };
        serial_matches && issuer_matches
    }
}

/// TCG conformance attribute certificate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConformanceCredential {
    pub info: CredentialInfo,
}

impl ConformanceCredential {
    pub fn from_der(der: &[u8]) -> Result<Self> {
        let ac = AttributeCertificate::from_der(der)?;
        Ok(Self {
            info: CredentialInfo::from_attribute_certificate(&ac, der)?,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Credential {
    Endorsement(EndorsementCredential),
    Platform(PlatformCredential),
    CertificateAuthority(CaCredential),
    Conformance(ConformanceCredential),
}

impl Credential {
    pub fn from_der(kind: CredentialKind, der: &[u8]) -> Result<Self> {
        Ok(match kind {
            CredentialKind::Endorsement => Self::Endorsement(EndorsementCredential::from_der(der)?),
            CredentialKind::Platform => Self::Platform(PlatformCredential::from_der(der)?),
            CredentialKind::CertificateAuthority => {
                Self::CertificateAuthority(CaCredential::from_der(der)?)
            }
            CredentialKind::Conformance => Self::Conformance(ConformanceCredential::from_der(der)?),
        })
    }

    pub fn kind(&self) -> CredentialKind {
        match self {
            Self::Endorsement(_) => CredentialKind::Endorsement,
            Self::Platform(_) => CredentialKind::Platform,
            Self::CertificateAuthority(_) => CredentialKind::CertificateAuthority,
            Self::Conformance(_) => CredentialKind::Conformance,
        }
    }

    pub fn info(&self) -> &CredentialInfo {
        match self {
            Self::Endorsement(c) => &c.info,
            Self::Platform(c) => &c.info,
            Self::CertificateAuthority(c) => &c.info,
            Self::Conformance(c) => &c.info,
        }
    }

    pub fn der(&self) -> &[u8] {
        &self.info().der
    }

    pub fn as_endorsement(&self) -> Option<&EndorsementCredential> {
        match self {
            Self::Endorsement(c) => Some(c),
            _ => None,
        }
    }

    pub fn as_platform(&self) -> Option<&PlatformCredential> {
        match self {
            Self::Platform(c) => Some(c),
            _ => None,
        }
    }

    pub fn as_certificate_authority(&self) -> Option<&CaCredential> {
        match self {
            Self::CertificateAuthority(c) => Some(c),
            _ => None,
        }
    }
}

fn find_extension<T>(extensions: &[Extension]) -> Result<Option<T>>
where
    T: AssociatedOid + for<'a> Decode<'a>,
{
    extensions
        .iter()
        .find(|ext| ext.extn_id == T::OID)
        .map(|ext| T::from_der(ext.extn_value.as_bytes()))
        .transpose()
        .map_err(Into::into)
}

fn first_directory_name(names: &[GeneralName]) -> Option<Name> {
    names.iter().find_map(|name| match name {
        GeneralName::DirectoryName(directory) => Some(directory.clone()),
        _ => None,
    })
}

fn attribute_value(attributes: &[Attribute], oid: ObjectIdentifier) -> Option<&Any> {
    attributes
        .iter()
        .find(|attribute| attribute.oid == oid)
        .and_then(|attribute| attribute.values.iter().next())
}

fn decode_any<T>(value: &Any) -> Result<T>
where
    T: for<'a> Decode<'a>,
{
    Ok(T::from_der(&value.to_der()?)?)
}

fn string_attribute(attributes: &[Attribute], oid: ObjectIdentifier) -> Option<String> {
    attribute_value(attributes, oid).and_then(any_to_string)
}

/// Directory string value, `None` for placeholders and non-string types.
fn any_to_string(value: &Any) -> Option<String> {
    match value.tag() {
        Tag::Utf8String | Tag::PrintableString | Tag::Ia5String => {
            let text = std::str::from_utf8(value.value()).ok()?;
            specified(text).map(str::to_string)
        }
        _ => None,
    }
}

fn strip_leading_zeros(bytes: &[u8]) -> &[u8] {
    let start = bytes.iter().position(|b| *b != 0).unwrap_or(bytes.len());
    &bytes[start..]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{self, TestCa};

    #[test]
    fn test_kind_round_trips_through_str() {
        for kind in [
            CredentialKind::Endorsement,
            CredentialKind::Platform,
            CredentialKind::CertificateAuthority,
            CredentialKind::Conformance,
        ] {
            assert_eq!(kind.as_str().parse::<CredentialKind>().unwrap(), kind);
        }
        assert!("bogus".parse::<CredentialKind>().is_err());
    }

    #[test]
    fn test_parse_ca_credential() {
        let ca = TestCa::root("Test Root CA");
        let parsed = CaCredential::from_der(&ca.der).unwrap();
        assert!(parsed.is_ca);
        assert!(parsed.info.is_self_issued());
        assert!(parsed.info.subject_key_id.is_some());
    }

    #[test]
    fn test_parse_endorsement_credential() {
        let ca = TestCa::root("TPM Vendor CA");
        let ek = test_support::ek_private_key();
        let der = ca.issue_endorsement(&RsaPublicKey::from(&ek), 7);
        let parsed = EndorsementCredential::from_der(&der).unwrap();

        assert_eq!(parsed.info.issuer, ca.name);
        assert_eq!(parsed.info.authority_key_id, ca.subject_key_id());
        assert_eq!(parsed.tpm_manufacturer.as_deref(), Some(test_support::TPM_MANUFACTURER));
        assert!(parsed.has_modulus(&ek.n().to_bytes_be()));
        let mut padded = vec![0u8];
        padded.extend_from_slice(&ek.n().to_bytes_be());
        assert!(parsed.has_modulus(&padded));
        assert!(!parsed.has_modulus(&[1, 2, 3]));
    }

    #[test]
    fn test_parse_platform_credential() {
        let ca = TestCa::root("Platform CA");
        let ek = test_support::ek_private_key();
        let ec_der = ca.issue_endorsement(&RsaPublicKey::from(&ek), 9);
        let ec = EndorsementCredential::from_der(&ec_der).unwrap();

        let spec = test_support::PlatformSpec::base(&ec_der, 100)
            .with_component(test_support::bios("Acme", "X1"));
        let pc = PlatformCredential::from_der(&ca.issue_platform(&spec)).unwrap();

        assert_eq!(pc.credential_type, PlatformCredentialType::Base);
        assert_eq!(pc.platform.manufacturer.as_deref(), Some(test_support::PLATFORM_MANUFACTURER));
        assert_eq!(pc.platform.serial.as_deref(), Some(test_support::PLATFORM_SERIAL));
        assert_eq!(pc.components.len(), 1);
        assert_eq!(pc.components[0].manufacturer, "Acme");
        assert_eq!(pc.info.issuer, ca.name);
        assert!(pc.references(&ec));
    }

    #[test]
    fn test_platform_credential_for_other_ec_not_referenced() {
        let ca = TestCa::root("Platform CA");
        let ek = RsaPublicKey::from(&test_support::ek_private_key());
        let ec = EndorsementCredential::from_der(&ca.issue_endorsement(&ek, 1)).unwrap();
        let other_ec_der = ca.issue_endorsement(&ek, 2);

        let pc_der = ca.issue_platform(&test_support::PlatformSpec::base(&other_ec_der, 3));
        let pc = PlatformCredential::from_der(&pc_der).unwrap();
        assert!(!pc.references(&ec));
    }

    #[test]
    fn test_delta_type_parsed() {
        let ca = TestCa::root("Platform CA");
        let ek = RsaPublicKey::from(&test_support::ek_private_key());
        let ec_der = ca.issue_endorsement(&ek, 1);
        let spec = test_support::PlatformSpec::delta(&ec_der, 5);
        let pc = PlatformCredential::from_der(&ca.issue_platform(&spec)).unwrap();
        assert!(pc.is_delta());
    }

    #[test]
    fn test_garbage_is_parse_error() {
        assert!(Credential::from_der(CredentialKind::Endorsement, &[0x30, 0x03, 1, 2, 3]).is_err());
        assert!(Credential::from_der(CredentialKind::Platform, b"not der").is_err());
    }
}
