//! Identity certificate issuance.

use crate::error::{ProvisioningError, Result};
use attestca_credentials::{oids, pem, EndorsementCredential, PlatformCredential};
use attestca_crypto::AuthoritySigner;
use der::asn1::{Any, ObjectIdentifier};
use der::{Decode, Encode, Tag};
use rand::{rngs::OsRng, RngCore};
use rsa::RsaPublicKey;
use signature::{Keypair, Signer};
use spki::{
    DynSignatureAlgorithmIdentifier, EncodePublicKey, SignatureBitStringEncoding,
    SubjectPublicKeyInfoOwned,
};
use std::path::Path;
use std::time::Duration;
use tracing::info;
use x509_cert::attr::AttributeTypeAndValue;
use x509_cert::builder::{Builder, CertificateBuilder, Profile};
use x509_cert::ext::pkix::name::GeneralName;
use x509_cert::ext::pkix::{ExtendedKeyUsage, SubjectAltName};
use x509_cert::name::{Name, RdnSequence, RelativeDistinguishedName};
use x509_cert::serial_number::SerialNumber;
use x509_cert::time::Validity;
use x509_cert::Certificate;

const SERIAL_LENGTH: usize = 16;

/// TPM and platform identity written into the certificate's subject
/// alternative name.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IdentityAttributes {
    pub tpm_manufacturer: Option<String>,
    pub tpm_model: Option<String>,
    pub tpm_version: Option<String>,
    pub platform_manufacturer: Option<String>,
    pub platform_model: Option<String>,
    pub platform_serial: Option<String>,
}

impl IdentityAttributes {
    pub fn from_credentials(
        ec: Option<&EndorsementCredential>,
        platform: Option<&PlatformCredential>,
    ) -> Self {
        Self {
            tpm_manufacturer: ec.and_then(|ec| ec.tpm_manufacturer.clone()),
            tpm_model: ec.and_then(|ec| ec.tpm_model.clone()),
            tpm_version: ec.and_then(|ec| ec.tpm_version.clone()),
            platform_manufacturer: platform.and_then(|pc| pc.platform.manufacturer.clone()),
            platform_model: platform.and_then(|pc| pc.platform.model.clone()),
            platform_serial: platform.and_then(|pc| pc.platform.serial.clone()),
        }
    }

    fn directory_name(&self) -> Result<Option<Name>> {
        let attributes = [
            (oids::TPM_MANUFACTURER, &self.tpm_manufacturer),
            (oids::TPM_MODEL, &self.tpm_model),
            (oids::TPM_VERSION, &self.tpm_version),
            (oids::PLATFORM_MANUFACTURER, &self.platform_manufacturer),
            (oids::PLATFORM_MODEL, &self.platform_model),
            (oids::PLATFORM_SERIAL, &self.platform_serial),
        ];
        let mut rdns = Vec::new();
        for (oid, value) in attributes {
            if let Some(value) = value {
                rdns.push(rdn(oid, value)?);
            }
        }
        Ok((!rdns.is_empty()).then_some(RdnSequence(rdns)))
    }
}

fn rdn(oid: ObjectIdentifier, value: &str) -> Result<RelativeDistinguishedName> {
    let value = Any::new(Tag::Utf8String, value.as_bytes().to_vec()).map_err(internal)?;
    let set = vec![AttributeTypeAndValue { oid, value }]
        .try_into()
        .map_err(internal)?;
    Ok(RelativeDistinguishedName(set))
}

fn internal(err: impl std::fmt::Display) -> ProvisioningError {
    ProvisioningError::Internal(format!("certificate issuance: {}", err))
}

#[derive(Debug, Clone)]
pub struct IssuedCertificate {
    pub der: Vec<u8>,
    pub serial_hex: String,
}

/// The authority's certificate and signing key.
pub struct CertificateIssuer {
    signer: AuthoritySigner,
    issuer: Name,
    certificate_der: Vec<u8>,
}

impl CertificateIssuer {
    /// `authority_certificate` is DER or a PEM `CERTIFICATE` block; its
    /// public key must belong to `signer`.
    pub fn new(signer: AuthoritySigner, authority_certificate: &[u8]) -> Result<Self> {
        let der = match std::str::from_utf8(authority_certificate) {
            Ok(text) if text.trim_start().starts_with("-----BEGIN") => {
                pem::parse_labelled(text, pem::CERTIFICATE_LABEL)
                    .map_err(internal)?
                    .into_iter()
                    .next()
                    .ok_or_else(|| internal("authority PEM holds no certificate"))?
            }
            _ => authority_certificate.to_vec(),
        };
        let certificate = Certificate::from_der(&der).map_err(internal)?;

        let certified_key = certificate
            .tbs_certificate
            .subject_public_key_info
            .to_der()
            .map_err(internal)?;
        let signing_key = signer.public_key_der().map_err(internal)?;
        if certified_key != signing_key {
            return Err(internal(
                "authority private key does not match the authority certificate",
            ));
        }

        Ok(Self {
            signer,
            issuer: certificate.tbs_certificate.subject,
            certificate_der: der,
        })
    }

    pub fn from_files<P: AsRef<Path>, Q: AsRef<Path>>(
        certificate_path: P,
        private_key_path: Q,
    ) -> Result<Self> {
        let certificate = std::fs::read(certificate_path.as_ref()).map_err(|e| {
            internal(format!("{}: {}", certificate_path.as_ref().display(), e))
        })?;
        let signer = AuthoritySigner::from_file(private_key_path).map_err(internal)?;
        let issuer = Self::new(signer, &certificate)?;
        info!(issuer = %issuer.issuer, algorithm = issuer.signer.algorithm(), "Loaded authority certificate");
        Ok(issuer)
    }

    pub fn issuer(&self) -> &Name {
        &self.issuer
    }

    pub fn certificate_der(&self) -> &[u8] {
        &self.certificate_der
    }

    /// Issue an identity certificate for the attestation key `ak`, valid
    /// from now for `validity_days`.
    pub fn issue(
        &self,
        ak: &RsaPublicKey,
        attributes: &IdentityAttributes,
        validity_days: u32,
    ) -> Result<IssuedCertificate> {
        let mut serial = [0u8; SERIAL_LENGTH];
        OsRng.fill_bytes(&mut serial);
        // Positive, and no leading zero octet to normalise away
        serial[0] = (serial[0] & 0x7f) | 0x01;

        let spki_der = ak.to_public_key_der().map_err(internal)?;
        let parts = CertificateParts {
            issuer: self.issuer.clone(),
            serial: SerialNumber::new(&serial).map_err(internal)?,
            validity: Validity::from_now(Duration::from_secs(u64::from(validity_days) * 86_400))
                .map_err(internal)?,
            spki: SubjectPublicKeyInfoOwned::try_from(spki_der.as_bytes()).map_err(internal)?,
            san: attributes.directory_name()?,
        };

        let der = match &self.signer {
            AuthoritySigner::Rsa(key) => build::<_, rsa::pkcs1v15::Signature>(key, parts)?,
            AuthoritySigner::P256(key) => build::<_, p256::ecdsa::DerSignature>(key, parts)?,
        };
        Ok(IssuedCertificate {
            der,
            serial_hex: hex::encode(serial),
        })
    }
}

struct CertificateParts {
    issuer: Name,
    serial: SerialNumber,
    validity: Validity,
    spki: SubjectPublicKeyInfoOwned,
    san: Option<Name>,
}

fn build<S, Sig>(signer: &S, parts: CertificateParts) -> Result<Vec<u8>>
where
    S: Keypair + DynSignatureAlgorithmIdentifier + Signer<Sig>,
    S::VerifyingKey: EncodePublicKey,
    Sig: SignatureBitStringEncoding,
{
    let mut builder = CertificateBuilder::new(
        Profile::Leaf {
            issuer: parts.issuer,
            enable_key_agreement: false,
            enable_key_encipherment: false,
        },
        parts.serial,
        parts.validity,
        RdnSequence(Vec::new()),
        parts.spki,
        signer,
    )
    .map_err(internal)?;

    if let Some(name) = parts.san {
        builder
            .add_extension(&SubjectAltName(vec![GeneralName::DirectoryName(name)]))
            .map_err(internal)?;
    }
    builder
        .add_extension(&ExtendedKeyUsage(vec![oids::AIK_CERTIFICATE]))
        .map_err(internal)?;

    builder
        .build::<Sig>()
        .map_err(internal)?
        .to_der()
        .map_err(internal)
}

#[cfg(test)]
mod tests {
    use super::*;
    use attestca_credentials::test_support::{self, TestCa};
    use attestca_credentials::verify_signature;
    use der::oid::AssociatedOid;
    use rsa::traits::PublicKeyParts;

    fn issuer_for(ca: &TestCa) -> CertificateIssuer {
        let signer = AuthoritySigner::from_pkcs8_pem(&ca.private_key_pem()).unwrap();
        CertificateIssuer::new(signer, ca.certificate_pem().as_bytes()).unwrap()
    }

    #[test]
    fn test_issue_identity_certificate() {
        let ca = TestCa::root("Attestation CA");
        let issuer = issuer_for(&ca);
        let ak = RsaPublicKey::from(&test_support::ak_private_key());
        let attributes = IdentityAttributes {
            tpm_manufacturer: Some(test_support::TPM_MANUFACTURER.to_string()),
            tpm_model: Some(test_support::TPM_MODEL.to_string()),
            tpm_version: Some(test_support::TPM_VERSION.to_string()),
            ..IdentityAttributes::default()
        };

        let issued = issuer.issue(&ak, &attributes, 30).unwrap();
        assert_eq!(issued.serial_hex.len(), SERIAL_LENGTH * 2);

        let parsed = EndorsementCredential::from_der(&issued.der).unwrap();
        assert_eq!(parsed.info.issuer, ca.name);
        assert_eq!(parsed.tpm_model.as_deref(), Some(test_support::TPM_MODEL));
        assert!(parsed.has_modulus(&ak.n().to_bytes_be()));
        assert_eq!(parsed.info.serial_hex(), issued.serial_hex);
        verify_signature(&parsed.info.signed, &issuer.signer.public_key_der().unwrap()).unwrap();

        let certificate = Certificate::from_der(&issued.der).unwrap();
        assert!(certificate.tbs_certificate.subject.0.is_empty());
        let eku = certificate
            .tbs_certificate
            .extensions
            .unwrap()
            .into_iter()
            .find(|e| e.extn_id == ExtendedKeyUsage::OID)
            .unwrap();
        let eku = ExtendedKeyUsage::from_der(eku.extn_value.as_bytes()).unwrap();
        assert_eq!(eku.0, vec![oids::AIK_CERTIFICATE]);

        let days = (parsed.info.not_after - parsed.info.not_before) / 86_400;
        assert_eq!(days, 30);
    }

    #[test]
    fn test_mismatched_key_rejected() {
        let ca = TestCa::root("Attestation CA");
        let other = TestCa::root("Other CA");
        let signer = AuthoritySigner::from_pkcs8_pem(&other.private_key_pem()).unwrap();
        assert!(matches!(
            CertificateIssuer::new(signer, &ca.der),
            Err(ProvisioningError::Internal(_))
        ));
    }

    #[test]
    fn test_empty_attributes_have_no_directory_name() {
        assert!(IdentityAttributes::default().directory_name().unwrap().is_none());
    }
}
