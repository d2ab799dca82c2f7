//! Supply chain verdicts as seen through the provisioning protocol.

use crate::test_utils::*;
use attestca_core::Config;
use attestca_credentials::test_support::{self, PlatformSpec};
use attestca_credentials::CredentialStore;
use attestca_provisioning::{ErrorKind, ProvisioningError};
use rsa::RsaPublicKey;
use std::time::{Duration, SystemTime};

const DAY: Duration = Duration::from_secs(86_400);

fn failures(err: ProvisioningError) -> Vec<String> {
    match err {
        ProvisioningError::ValidationFailed { failed, .. } => failed,
        other => panic!("expected validation failure, got {:?}", other),
    }
}

#[test]
fn test_intermediate_issued_credentials_accepted() {
    let ca = TestAuthority::new();
    let issuing = ca.manufacturer.intermediate("Manufacturing Line 4");
    ca.credentials.save(issuing.credential()).unwrap();

    let device = TestDevice::new(&issuing, 1);
    let platform = issuing.issue_platform(
        &PlatformSpec::base(&device.ec_der, 10).with_components(device.components.clone()),
    );

    let nonce = ca.challenge(&device);
    ca.authority
        .process_certificate_request(&device.certificate_request(&ca.codec, &nonce, &[platform]))
        .unwrap();
}

#[test]
fn test_unknown_intermediate_gets_no_challenge() {
    let ca = TestAuthority::new();
    let issuing = ca.manufacturer.intermediate("Unregistered Line");
    let device = TestDevice::new(&issuing, 1);

    let err = ca
        .authority
        .process_identity_claim(&device.identity_claim(&ca.codec))
        .unwrap_err();
    let failed = failures(err);
    assert_eq!(failed.len(), 1);
    assert!(failed[0].starts_with("EndorsementChainOfTrust"));
}

#[test]
fn test_expired_endorsement_follows_policy() {
    let now = SystemTime::now();
    let strict = TestAuthority::new();
    let ek = test_support::ek_private_key();
    let mut device = TestDevice::new(&strict.manufacturer, 1);
    device.ec_der = strict.manufacturer.issue_endorsement_with_validity(
        &RsaPublicKey::from(&ek),
        1,
        now - DAY * 400,
        now - DAY,
    );

    let err = strict
        .authority
        .process_identity_claim(&device.identity_claim(&strict.codec))
        .unwrap_err();
    assert!(failures(err)[0].starts_with("EndorsementValidity"));

    let mut config = Config::default_config();
    config.policy.accept_expired_credentials = true;
    let lenient = strict.second_instance(&config);
    lenient
        .process_identity_claim(&device.identity_claim(&strict.codec))
        .unwrap();
}

#[test]
fn test_platform_credential_for_other_tpm_rejected() {
    let ca = TestAuthority::new();
    let device = TestDevice::new(&ca.manufacturer, 1);
    let other = TestDevice::with_ek(&ca.manufacturer, test_support::second_ek_private_key(), 2);
    let foreign = ca.base_platform(&other, 20);

    let nonce = ca.challenge(&device);
    let err = ca
        .authority
        .process_certificate_request(&device.certificate_request(&ca.codec, &nonce, &[foreign]))
        .unwrap_err();
    let failed = failures(err);
    assert!(failed
        .iter()
        .any(|f| f.starts_with("PlatformEndorsementBinding")));
}

#[test]
fn test_duplicate_endorsement_key_is_security_violation() {
    let ca = TestAuthority::new();
    let device = TestDevice::new(&ca.manufacturer, 1);
    let clone = TestDevice::new(&ca.manufacturer, 99);
    ca.credentials
        .save(test_support::endorsement(&clone.ec_der))
        .unwrap();

    let err = ca
        .authority
        .process_identity_claim(&device.identity_claim(&ca.codec))
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::SecurityViolation);
}
