//! Both provisioning phases against SQLite-backed stores.

use crate::test_utils::*;
use attestca_core::Config;
use attestca_credentials::test_support::{self, PlatformSpec};
use attestca_credentials::{AttributeStatus, CredentialStore, EndorsementCredential};
use attestca_structs::CertificateResponseEnvelope;
use attestca_validation::{AppraisalStatus, SummaryStore};
use rsa::traits::PublicKeyParts;

#[test]
fn test_device_receives_identity_certificate() {
    let ca = TestAuthority::new();
    let device = TestDevice::new(&ca.manufacturer, 1);

    let nonce = ca.challenge(&device);
    let request = device.certificate_request(&ca.codec, &nonce, &[ca.base_platform(&device, 10)]);
    let response = ca.authority.process_certificate_request(&request).unwrap();

    let response: CertificateResponseEnvelope = ca.codec.decode(&response).unwrap();
    let certificate = EndorsementCredential::from_der(&response.certificate).unwrap();
    assert!(certificate.has_modulus(&device.ak_public().n().to_bytes_be()));
    assert_eq!(certificate.info.issuer, ca.authority_ca.name);
    assert_eq!(
        certificate.tpm_manufacturer.as_deref(),
        Some(test_support::TPM_MANUFACTURER)
    );

    // One audit summary per phase
    let summaries = ca.summaries.list_for_device("node-1").unwrap();
    assert_eq!(summaries.len(), 2);
    assert!(summaries
        .iter()
        .all(|s| s.overall_status() == AppraisalStatus::Pass));
}

#[test]
fn test_phases_served_by_different_instances() {
    let ca = TestAuthority::new();
    let device = TestDevice::new(&ca.manufacturer, 1);
    let nonce = ca.challenge(&device);

    let other = ca.second_instance(&Config::default_config());
    let request = device.certificate_request(&ca.codec, &nonce, &[ca.base_platform(&device, 10)]);
    other.process_certificate_request(&request).unwrap();

    // The redemption is visible to the first instance
    assert!(ca.authority.process_certificate_request(&request).is_err());
}

#[test]
fn test_delta_credentials_update_inventory() {
    let ca = TestAuthority::new();
    let added_nic = test_support::nic("Broadcom", "BCM5720", "00:aa:bb:cc:dd:ee");
    let device = TestDevice::new(&ca.manufacturer, 1).with_components(vec![
        test_support::bios("Acme", "X1"),
        added_nic.clone(),
    ]);

    let base = ca.manufacturer.issue_platform(
        &PlatformSpec::base(&device.ec_der, 10).with_components(default_inventory()),
    );
    let delta = ca.manufacturer.issue_platform(
        &PlatformSpec::delta(&device.ec_der, 11)
            .with_component(added_nic.with_status(AttributeStatus::Added))
            .with_component(
                test_support::nic("Intel", "I210", "00:11:22:33:44:55")
                    .with_status(AttributeStatus::Removed),
            ),
    );

    let nonce = ca.challenge(&device);
    let request = device.certificate_request(&ca.codec, &nonce, &[delta, base]);
    ca.authority.process_certificate_request(&request).unwrap();
}

#[test]
fn test_stale_inventory_denied_without_delta() {
    let ca = TestAuthority::new();
    let device = TestDevice::new(&ca.manufacturer, 1).with_components(vec![
        test_support::bios("Acme", "X1"),
        test_support::nic("Broadcom", "BCM5720", "00:aa:bb:cc:dd:ee"),
    ]);
    let base = ca.manufacturer.issue_platform(
        &PlatformSpec::base(&device.ec_der, 10).with_components(default_inventory()),
    );

    let nonce = ca.challenge(&device);
    let request = device.certificate_request(&ca.codec, &nonce, &[base]);
    let err = ca.authority.process_certificate_request(&request).unwrap_err();

    match err {
        attestca_provisioning::ProvisioningError::ValidationFailed { failed, .. } => {
            assert_eq!(failed.len(), 1);
            assert!(failed[0].contains("model=I210"));
        }
        other => panic!("expected validation failure, got {:?}", other),
    }
}

#[test]
fn test_uploaded_platform_credential_is_used() {
    let ca = TestAuthority::new();
    let device = TestDevice::new(&ca.manufacturer, 1);
    ca.credentials
        .save(attestca_credentials::Credential::Platform(
            attestca_credentials::PlatformCredential::from_der(&ca.base_platform(&device, 10))
                .unwrap(),
        ))
        .unwrap();

    let mut config = Config::default_config();
    config.policy.require_platform_credential = true;
    let authority = ca.second_instance(&config);

    let response = authority
        .process_identity_claim(&device.identity_claim(&ca.codec))
        .unwrap();
    let nonce = device.activate(&ca.codec, &response);
    authority
        .process_certificate_request(&device.certificate_request(&ca.codec, &nonce, &[]))
        .unwrap();
}
