//! RFC 5755 attribute certificate and TCG platform configuration structures.
//!
//! Only the forms TCG platform credentials use are modelled: holders are
//! identified by `baseCertificateID` or `entityName`, issuers use `v2Form`.

use der::asn1::{BitString, GeneralizedTime, Ia5String, ObjectIdentifier, OctetString};
use der::{Enumerated, Sequence};
use spki::AlgorithmIdentifierOwned;
use x509_cert::attr::Attribute;
use x509_cert::ext::pkix::name::GeneralNames;
use x509_cert::ext::Extensions;
use x509_cert::serial_number::SerialNumber;

/// Attribute certificate version `v2`.
pub const ATTRIBUTE_CERTIFICATE_V2: u8 = 1;

#[derive(Clone, Debug, Eq, PartialEq, Sequence)]
pub struct AttributeCertificate {
    pub acinfo: AttributeCertificateInfo,
    pub signature_algorithm: AlgorithmIdentifierOwned,
    pub signature_value: BitString,
}

#[derive(Clone, Debug, Eq, PartialEq, Sequence)]
pub struct AttributeCertificateInfo {
    pub version: u8,
    pub holder: Holder,
    #[asn1(context_specific = "0", tag_mode = "IMPLICIT", constructed = "true")]
    pub issuer: V2Form,
    pub signature: AlgorithmIdentifierOwned,
    pub serial_number: SerialNumber,
    pub validity: AttCertValidityPeriod,
    pub attributes: Vec<Attribute>,
    #[asn1(optional = "true")]
    pub issuer_unique_id: Option<BitString>,
    #[asn1(optional = "true")]
    pub extensions: Option<Extensions>,
}

#[derive(Clone, Debug, Default, Eq, PartialEq, Sequence)]
pub struct Holder {
    #[asn1(
        context_specific = "0",
        tag_mode = "IMPLICIT",
        constructed = "true",
        optional = "true"
    )]
    pub base_certificate_id: Option<IssuerSerial>,
    #[asn1(
        context_specific = "1",
        tag_mode = "IMPLICIT",
        constructed = "true",
        optional = "true"
    )]
    pub entity_name: Option<GeneralNames>,
}

#[derive(Clone, Debug, Eq, PartialEq, Sequence)]
pub struct IssuerSerial {
    pub issuer: GeneralNames,
    pub serial: SerialNumber,
    #[asn1(optional = "true")]
    pub issuer_uid: Option<BitString>,
}

#[derive(Clone, Debug, Default, Eq, PartialEq, Sequence)]
pub struct V2Form {
    #[asn1(optional = "true")]
    pub issuer_name: Option<GeneralNames>,
    #[asn1(
        context_specific = "0",
        tag_mode = "IMPLICIT",
        constructed = "true",
        optional = "true"
    )]
    pub base_certificate_id: Option<IssuerSerial>,
}

#[derive(Clone, Debug, Eq, PartialEq, Sequence)]
pub struct AttCertValidityPeriod {
    pub not_before_time: GeneralizedTime,
    pub not_after_time: GeneralizedTime,
}

/// Value of `tcg-at-tcgCredentialType`.
#[derive(Clone, Debug, Eq, PartialEq, Sequence)]
pub struct TcgCredentialType {
    pub certificate_type: ObjectIdentifier,
}

/// Value of `tcg-at-platformConfiguration-v2`.
#[derive(Clone, Debug, Default, Eq, PartialEq, Sequence)]
pub struct PlatformConfiguration {
    #[asn1(
        context_specific = "0",
        tag_mode = "IMPLICIT",
        constructed = "true",
        optional = "true"
    )]
    pub component_identifiers: Option<Vec<ComponentIdentifierV2>>,
    #[asn1(
        context_specific = "1",
        tag_mode = "IMPLICIT",
        constructed = "true",
        optional = "true"
    )]
    pub component_identifiers_uri: Option<UriReference>,
    #[asn1(
        context_specific = "2",
        tag_mode = "IMPLICIT",
        constructed = "true",
        optional = "true"
    )]
    pub platform_properties: Option<Vec<PropertiesV2>>,
    #[asn1(
        context_specific = "3",
        tag_mode = "IMPLICIT",
        constructed = "true",
        optional = "true"
    )]
    pub platform_properties_uri: Option<UriReference>,
}

#[derive(Clone, Debug, Eq, PartialEq, Sequence)]
pub struct UriReference {
    pub uniform_resource_identifier: Ia5String,
    #[asn1(optional = "true")]
    pub hash_algorithm: Option<AlgorithmIdentifierOwned>,
    #[asn1(optional = "true")]
    pub hash_value: Option<BitString>,
}

#[derive(Clone, Debug, Eq, PartialEq, Sequence)]
pub struct ComponentClassV2 {
    pub component_class_registry: ObjectIdentifier,
    pub component_class_value: OctetString,
}

#[derive(Clone, Debug, Eq, PartialEq, Sequence)]
pub struct ComponentAddress {
    pub address_type: ObjectIdentifier,
    pub address_value: String,
}

// componentPlatformCert [5] and componentPlatformCertUri [6] are not modelled;
// identifiers carrying them fail to decode.
#[derive(Clone, Debug, Eq, PartialEq, Sequence)]
pub struct ComponentIdentifierV2 {
    pub component_class: ComponentClassV2,
    pub component_manufacturer: String,
    pub component_model: String,
    #[asn1(context_specific = "0", tag_mode = "IMPLICIT", optional = "true")]
    pub component_serial: Option<String>,
    #[asn1(context_specific = "1", tag_mode = "IMPLICIT", optional = "true")]
    pub component_revision: Option<String>,
    #[asn1(context_specific = "2", tag_mode = "IMPLICIT", optional = "true")]
    pub component_manufacturer_id: Option<ObjectIdentifier>,
    #[asn1(context_specific = "3", tag_mode = "IMPLICIT", optional = "true")]
    pub field_replaceable: Option<bool>,
    #[asn1(
        context_specific = "4",
        tag_mode = "IMPLICIT",
        constructed = "true",
        optional = "true"
    )]
    pub component_addresses: Option<Vec<ComponentAddress>>,
    #[asn1(context_specific = "7", tag_mode = "IMPLICIT", optional = "true")]
    pub status: Option<AttributeStatusV2>,
}

#[derive(Clone, Debug, Eq, PartialEq, Sequence)]
pub struct PropertiesV2 {
    pub property_name: String,
    pub property_value: String,
    #[asn1(context_specific = "0", tag_mode = "IMPLICIT", optional = "true")]
    pub status: Option<AttributeStatusV2>,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Enumerated)]
#[repr(u32)]
pub enum AttributeStatusV2 {
    Added = 0,
    Modified = 1,
    Removed = 2,
}

#[cfg(test)]
mod tests {
    use super::*;
    use der::{Decode, Encode};

    #[test]
    fn test_platform_configuration_round_trip() {
        let config = PlatformConfiguration {
            component_identifiers: Some(vec![ComponentIdentifierV2 {
                component_class: ComponentClassV2 {
                    component_class_registry: crate::oids::COMPONENT_CLASS_TCG,
                    component_class_value: OctetString::new(vec![0x00, 0x13, 0x00, 0x03])
                        .unwrap(),
                },
                component_manufacturer: "Acme".to_string(),
                component_model: "X1".to_string(),
                component_serial: None,
                component_revision: Some("1.2".to_string()),
                component_manufacturer_id: None,
                field_replaceable: Some(false),
                component_addresses: None,
                status: Some(AttributeStatusV2::Modified),
            }]),
            ..Default::default()
        };

        let der = config.to_der().unwrap();
        let decoded = PlatformConfiguration::from_der(&der).unwrap();
        assert_eq!(decoded, config);
    }

    #[test]
    fn test_empty_platform_configuration_is_empty_sequence() {
        let der = PlatformConfiguration::default().to_der().unwrap();
        assert_eq!(der, vec![0x30, 0x00]);
    }
}
