//! Fixture builders for tests: a P-256 test CA that issues CA, endorsement
//! and platform credentials, fixed RSA-2048 TPM keys, and device reports.

use crate::asn1::{
    AttCertValidityPeriod, AttributeCertificate, AttributeCertificateInfo, Holder, IssuerSerial,
    PlatformConfiguration, TcgCredentialType, V2Form, ATTRIBUTE_CERTIFICATE_V2,
};
use crate::component::{ComponentClass, ComponentIdentifier};
use crate::credential::{CaCredential, Credential, EndorsementCredential, PlatformCredentialType};
use crate::device::{
    ComponentInfo, DeviceInfoReport, FirmwareInfo, HardwareInfo, NetworkInfo, OsInfo, TpmInfo,
};
use crate::oids;
use der::asn1::{Any, BitString, GeneralizedTime, ObjectIdentifier, OctetString, SetOfVec, UtcTime};
use der::oid::AssociatedOid;
use der::{Decode, Encode, Tag};
use p256::ecdsa::{DerSignature, SigningKey};
use p256::pkcs8::{EncodePrivateKey, EncodePublicKey, LineEnding};
use rand::rngs::OsRng;
use rsa::pkcs8::DecodePrivateKey;
use rsa::{RsaPrivateKey, RsaPublicKey};
use signature::{SignatureEncoding, Signer};
use spki::{AlgorithmIdentifierOwned, SubjectPublicKeyInfoOwned};
use std::collections::BTreeMap;
use std::str::FromStr;
use std::time::{Duration, SystemTime};
use x509_cert::attr::{Attribute, AttributeTypeAndValue};
use x509_cert::builder::{Builder, CertificateBuilder, Profile};
use x509_cert::ext::pkix::name::GeneralName;
use x509_cert::ext::pkix::{AuthorityKeyIdentifier, SubjectAltName};
use x509_cert::ext::Extension;
use x509_cert::name::{Name, RdnSequence, RelativeDistinguishedName};
use x509_cert::serial_number::SerialNumber;
use x509_cert::time::{Time, Validity};
use x509_cert::Certificate;

pub const TPM_MANUFACTURER: &str = "id:414D4400";
pub const TPM_MODEL: &str = "AMD fTPM";
pub const TPM_VERSION: &str = "id:00030001";

pub const PLATFORM_MANUFACTURER: &str = "Acme";
pub const PLATFORM_MODEL: &str = "Rack 9";
pub const PLATFORM_VERSION: &str = "1.0";
pub const PLATFORM_SERIAL: &str = "PLAT-0001";

const DAY: Duration = Duration::from_secs(86_400);

/// Fixed EK key matching `testdata/ek_rsa2048.pem`.
pub fn ek_private_key() -> RsaPrivateKey {
    load_key(include_str!("../testdata/ek_rsa2048.pem"))
}

/// A second EK key, for devices that must not match the first.
pub fn second_ek_private_key() -> RsaPrivateKey {
    load_key(include_str!("../testdata/ek2_rsa2048.pem"))
}

/// Fixed attestation key.
pub fn ak_private_key() -> RsaPrivateKey {
    load_key(include_str!("../testdata/ak_rsa2048.pem"))
}

fn load_key(pem: &str) -> RsaPrivateKey {
    RsaPrivateKey::from_pkcs8_pem(pem).expect("fixture key parses")
}

pub fn endorsement(der: &[u8]) -> Credential {
    Credential::Endorsement(EndorsementCredential::from_der(der).expect("endorsement parses"))
}

fn utc(time: SystemTime) -> Time {
    Time::UtcTime(UtcTime::from_system_time(time).expect("time in UTCTime range"))
}

fn utf8(value: &str) -> Any {
    Any::new(Tag::Utf8String, value.as_bytes().to_vec()).expect("utf8 value")
}

fn attribute(oid: ObjectIdentifier, value: Any) -> Attribute {
    Attribute {
        oid,
        values: SetOfVec::try_from(vec![value]).expect("single value set"),
    }
}

fn spki_of(key: &impl EncodePublicKey) -> SubjectPublicKeyInfoOwned {
    let der = key.to_public_key_der().expect("public key der");
    SubjectPublicKeyInfoOwned::try_from(der.as_bytes()).expect("spki")
}

fn any_of<T: Encode>(value: &T) -> Any {
    Any::from_der(&value.to_der().expect("encode")).expect("reparse")
}

/// A certificate authority with a P-256 key.
pub struct TestCa {
    pub name: Name,
    pub key: SigningKey,
    pub der: Vec<u8>,
}

impl TestCa {
    /// Self-signed root valid for ten years.
    pub fn root(common_name: &str) -> Self {
        let key = SigningKey::random(&mut OsRng);
        let name = Name::from_str(&format!("CN={},O=Attestation Test", common_name))
            .expect("valid name");
        let spki = spki_of(&*key.verifying_key());
        let builder = CertificateBuilder::new(
            Profile::Root,
            SerialNumber::from(1u32),
            Validity::from_now(DAY * 3650).expect("validity"),
            name.clone(),
            spki,
            &key,
        )
        .expect("root builder");
        let der = builder
            .build::<DerSignature>()
            .expect("root certificate")
            .to_der()
            .expect("encode root");
        Self { name, key, der }
    }

    /// Intermediate CA signed by `self`.
    pub fn intermediate(&self, common_name: &str) -> Self {
        let key = SigningKey::random(&mut OsRng);
        let name = Name::from_str(&format!("CN={},O=Attestation Test", common_name))
            .expect("valid name");
        let spki = spki_of(&*key.verifying_key());
        let builder = CertificateBuilder::new(
            Profile::SubCA {
                issuer: self.name.clone(),
                path_len_constraint: None,
            },
            SerialNumber::from(2u32),
            Validity::from_now(DAY * 3650).expect("validity"),
            name.clone(),
            spki,
            &self.key,
        )
        .expect("intermediate builder");
        let der = builder
            .build::<DerSignature>()
            .expect("intermediate certificate")
            .to_der()
            .expect("encode intermediate");
        Self { name, key, der }
    }

    pub fn credential(&self) -> Credential {
        Credential::CertificateAuthority(CaCredential::from_der(&self.der).expect("CA parses"))
    }

    pub fn subject_key_id(&self) -> Option<Vec<u8>> {
        self.credential().info().subject_key_id.clone()
    }

    pub fn certificate_pem(&self) -> String {
        crate::pem::encode(crate::pem::CERTIFICATE_LABEL, &self.der)
    }

    pub fn private_key_pem(&self) -> String {
        self.key
            .to_pkcs8_pem(LineEnding::LF)
            .expect("pkcs8 pem")
            .to_string()
    }

    /// Endorsement credential for `ek`, valid from yesterday for ten years.
    pub fn issue_endorsement(&self, ek: &RsaPublicKey, serial: u32) -> Vec<u8> {
        let now = SystemTime::now();
        self.issue_endorsement_with_validity(ek, serial, now - DAY, now + DAY * 3650)
    }

    pub fn issue_endorsement_with_validity(
        &self,
        ek: &RsaPublicKey,
        serial: u32,
        not_before: SystemTime,
        not_after: SystemTime,
    ) -> Vec<u8> {
        let tpm_name = RdnSequence(
            [
                (oids::TPM_MANUFACTURER, TPM_MANUFACTURER),
                (oids::TPM_MODEL, TPM_MODEL),
                (oids::TPM_VERSION, TPM_VERSION),
            ]
            .into_iter()
            .map(|(oid, value)| {
                RelativeDistinguishedName(
                    vec![AttributeTypeAndValue {
                        oid,
                        value: utf8(value),
                    }]
                    .try_into()
                    .expect("single attribute rdn"),
                )
            })
            .collect(),
        );

        let spki = spki_of(ek);
        let mut builder = CertificateBuilder::new(
            Profile::Leaf {
                issuer: self.name.clone(),
                enable_key_agreement: false,
                enable_key_encipherment: true,
            },
            SerialNumber::from(serial),
            Validity {
                not_before: utc(not_before),
                not_after: utc(not_after),
            },
            RdnSequence(Vec::new()),
            spki,
            &self.key,
        )
        .expect("endorsement builder");
        builder
            .add_extension(&SubjectAltName(vec![GeneralName::DirectoryName(tpm_name)]))
            .expect("san");
        builder
            .build::<DerSignature>()
            .expect("endorsement certificate")
            .to_der()
            .expect("encode endorsement")
    }

    /// Platform attribute certificate described by `spec`.
    pub fn issue_platform(&self, spec: &PlatformSpec) -> Vec<u8> {
        let certificate_type = match spec.credential_type {
            PlatformCredentialType::Base => oids::PLATFORM_CERTIFICATE_BASE,
            PlatformCredentialType::Delta => oids::PLATFORM_CERTIFICATE_DELTA,
        };
        let components = spec
            .components
            .iter()
            .map(|c| c.to_asn1().expect("component encodes"))
            .collect::<Vec<_>>();
        let configuration = PlatformConfiguration {
            component_identifiers: (!components.is_empty()).then_some(components),
            ..Default::default()
        };

        let mut attributes = vec![
            attribute(
                oids::TCG_CREDENTIAL_TYPE,
                any_of(&TcgCredentialType { certificate_type }),
            ),
            attribute(oids::PLATFORM_MANUFACTURER, utf8(&spec.manufacturer)),
            attribute(oids::PLATFORM_MODEL, utf8(&spec.model)),
            attribute(oids::PLATFORM_VERSION, utf8(&spec.version)),
        ];
        if let Some(serial) = &spec.platform_serial {
            attributes.push(attribute(oids::PLATFORM_SERIAL, utf8(serial)));
        }
        attributes.push(attribute(
            oids::PLATFORM_CONFIGURATION_V2,
            any_of(&configuration),
        ));

        let aki = AuthorityKeyIdentifier {
            key_identifier: self
                .subject_key_id()
                .map(|ski| OctetString::new(ski).expect("ski")),
            authority_cert_issuer: None,
            authority_cert_serial_number: None,
        };
        let extensions = vec![Extension {
            extn_id: AuthorityKeyIdentifier::OID,
            critical: false,
            extn_value: OctetString::new(aki.to_der().expect("aki")).expect("aki octets"),
        }];

        let algorithm = AlgorithmIdentifierOwned {
            oid: oids::ECDSA_WITH_SHA256,
            parameters: None,
        };
        let acinfo = AttributeCertificateInfo {
            version: ATTRIBUTE_CERTIFICATE_V2,
            holder: Holder {
                base_certificate_id: Some(spec.holder.clone()),
                entity_name: None,
            },
            issuer: V2Form {
                issuer_name: Some(vec![GeneralName::DirectoryName(self.name.clone())]),
                base_certificate_id: None,
            },
            signature: algorithm.clone(),
            serial_number: SerialNumber::from(spec.serial),
            validity: AttCertValidityPeriod {
                not_before_time: GeneralizedTime::from_system_time(spec.not_before)
                    .expect("not before"),
                not_after_time: GeneralizedTime::from_system_time(spec.not_after)
                    .expect("not after"),
            },
            attributes,
            issuer_unique_id: None,
            extensions: Some(extensions),
        };

        let tbs = acinfo.to_der().expect("encode acinfo");
        let signature: DerSignature = self.key.sign(&tbs);
        AttributeCertificate {
            acinfo,
            signature_algorithm: algorithm,
            signature_value: BitString::from_bytes(&signature.to_vec()).expect("signature bits"),
        }
        .to_der()
        .expect("encode attribute certificate")
    }
}

/// Contents of a platform credential to issue.
#[derive(Debug, Clone)]
pub struct PlatformSpec {
    pub holder: IssuerSerial,
    pub serial: u32,
    pub credential_type: PlatformCredentialType,
    pub manufacturer: String,
    pub model: String,
    pub version: String,
    pub platform_serial: Option<String>,
    pub components: Vec<ComponentIdentifier>,
    pub not_before: SystemTime,
    pub not_after: SystemTime,
}

impl PlatformSpec {
    /// Base credential for the endorsement credential `ec_der`, valid
    /// from yesterday for a year.
    pub fn base(ec_der: &[u8], serial: u32) -> Self {
        let ec = Certificate::from_der(ec_der).expect("endorsement certificate");
        let now = SystemTime::now();
        Self {
            holder: IssuerSerial {
                issuer: vec![GeneralName::DirectoryName(ec.tbs_certificate.issuer.clone())],
                serial: ec.tbs_certificate.serial_number.clone(),
                issuer_uid: None,
            },
            serial,
            credential_type: PlatformCredentialType::Base,
            manufacturer: PLATFORM_MANUFACTURER.to_string(),
            model: PLATFORM_MODEL.to_string(),
            version: PLATFORM_VERSION.to_string(),
            platform_serial: Some(PLATFORM_SERIAL.to_string()),
            components: Vec::new(),
            not_before: now - DAY,
            not_after: now + DAY * 365,
        }
    }

    /// Delta credential issued an hour ago.
    pub fn delta(ec_der: &[u8], serial: u32) -> Self {
        let mut spec = Self::base(ec_der, serial);
        spec.credential_type = PlatformCredentialType::Delta;
        spec.not_before = SystemTime::now() - Duration::from_secs(3600);
        spec
    }

    pub fn with_component(mut self, component: ComponentIdentifier) -> Self {
        self.components.push(component);
        self
    }

    pub fn with_components(mut self, components: Vec<ComponentIdentifier>) -> Self {
        self.components.extend(components);
        self
    }

    pub fn with_platform_serial(mut self, serial: Option<&str>) -> Self {
        self.platform_serial = serial.map(str::to_string);
        self
    }

    pub fn with_validity(mut self, not_before: SystemTime, not_after: SystemTime) -> Self {
        self.not_before = not_before;
        self.not_after = not_after;
        self
    }
}

pub fn bios(manufacturer: &str, model: &str) -> ComponentIdentifier {
    ComponentIdentifier::new(ComponentClass::tcg(ComponentClass::BIOS), manufacturer, model)
}

pub fn baseboard(manufacturer: &str, model: &str, serial: &str) -> ComponentIdentifier {
    ComponentIdentifier::new(
        ComponentClass::tcg(ComponentClass::BASEBOARD),
        manufacturer,
        model,
    )
    .with_serial(serial)
}

pub fn nic(manufacturer: &str, model: &str, serial: &str) -> ComponentIdentifier {
    ComponentIdentifier::new(ComponentClass::tcg(ComponentClass::NIC), manufacturer, model)
        .with_serial(serial)
}

/// Report of a device whose hardware identity matches the platform
/// defaults and whose inventory holds `components`.
pub fn device_report(components: &[ComponentIdentifier]) -> DeviceInfoReport {
    DeviceInfoReport {
        network: NetworkInfo {
            hostname: "node-1".to_string(),
            ip_address: Some("10.0.0.1".to_string()),
            mac_address: Some("00:11:22:33:44:55".to_string()),
        },
        os: OsInfo {
            name: "Linux".to_string(),
            version: "6.1.0".to_string(),
            architecture: Some("x86_64".to_string()),
            distribution: None,
        },
        firmware: FirmwareInfo {
            bios_vendor: "Acme".to_string(),
            bios_version: "X1".to_string(),
            bios_release_date: Some("2024-01-01".to_string()),
        },
        hardware: HardwareInfo {
            manufacturer: PLATFORM_MANUFACTURER.to_string(),
            product_name: PLATFORM_MODEL.to_string(),
            version: Some(PLATFORM_VERSION.to_string()),
            system_serial: Some(PLATFORM_SERIAL.to_string()),
            chassis_serial: None,
            baseboard_serial: None,
            components: components.iter().map(ComponentInfo::from).collect(),
        },
        tpm: TpmInfo {
            make: TPM_MANUFACTURER.to_string(),
            version_major: 2,
            version_minor: 0,
            revision_major: 1,
            revision_minor: 38,
            pcr_values: BTreeMap::new(),
            quote: None,
        },
        client_version: Some("1.0.0".to_string()),
    }
}
