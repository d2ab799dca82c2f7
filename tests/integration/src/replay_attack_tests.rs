//! Replay attack detection tests
//!
//! A nonce is redeemable once; look-alike nonces and late redemptions
//! never reach certificate issuance.

use crate::test_utils::*;
use attestca_core::current_timestamp;
use attestca_credentials::test_support;
use attestca_provisioning::{ChallengeState, ChallengeStateStore, ErrorKind, ProvisioningError};

#[test]
fn test_replayed_request_rejected() {
    let ca = TestAuthority::new();
    let device = TestDevice::new(&ca.manufacturer, 1);
    let nonce = ca.challenge(&device);
    let request = device.certificate_request(&ca.codec, &nonce, &[ca.base_platform(&device, 10)]);

    ca.authority.process_certificate_request(&request).unwrap();
    let replay = ca.authority.process_certificate_request(&request);

    assert!(matches!(replay, Err(ProvisioningError::ProtocolState(_))));
}

#[tokio::test]
async fn test_concurrent_redemption_issues_one_certificate() {
    let ca = TestAuthority::new();
    let device = TestDevice::new(&ca.manufacturer, 1);
    let nonce = ca.challenge(&device);
    let request = device.certificate_request(&ca.codec, &nonce, &[ca.base_platform(&device, 10)]);

    let mut handles = Vec::new();
    for _ in 0..8 {
        let authority = ca.authority.clone();
        let request = request.clone();
        handles.push(tokio::task::spawn_blocking(move || {
            authority.process_certificate_request(&request)
        }));
    }

    let mut issued = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(_) => issued += 1,
            Err(err) => assert_eq!(err.kind(), ErrorKind::ProtocolState),
        }
    }
    assert_eq!(issued, 1);
}

#[test]
fn test_prefix_collision_does_not_burn_other_challenge() {
    let ca = TestAuthority::new();
    let victim = TestDevice::new(&ca.manufacturer, 1);
    let nonce = ca.challenge(&victim);

    // Same lookup key, different tail
    let mut forged = nonce.clone();
    for byte in forged.iter_mut().skip(8) {
        *byte = !*byte;
    }
    let attacker = TestDevice::with_ek(&ca.manufacturer, test_support::second_ek_private_key(), 2);
    let err = ca
        .authority
        .process_certificate_request(&attacker.certificate_request(&ca.codec, &forged, &[]))
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::ProtocolState);

    let request = victim.certificate_request(&ca.codec, &nonce, &[ca.base_platform(&victim, 10)]);
    ca.authority.process_certificate_request(&request).unwrap();
}

#[test]
fn test_late_redemption_rejected_and_swept() {
    let ca = TestAuthority::new();
    let device = TestDevice::new(&ca.manufacturer, 1);
    let two_hours_ago = current_timestamp() - 2 * 3600 * 1000;

    let stale = vec![0x5a; 20];
    let abandoned = vec![0x3c; 20];
    for nonce in [&stale, &abandoned] {
        ca.challenges
            .put(ChallengeState {
                nonce_key: i64::from_be_bytes(nonce[..8].try_into().unwrap()),
                nonce: nonce.clone(),
                identity_claim: device.identity_claim(&ca.codec),
                created_at: two_hours_ago,
            })
            .unwrap();
    }

    let err = ca
        .authority
        .process_certificate_request(&device.certificate_request(&ca.codec, &stale, &[]))
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::ProtocolState);

    // Only the abandoned challenge is left for the sweep
    assert_eq!(ca.authority.sweep_expired_challenges().unwrap(), 1);
    assert_eq!(ca.authority.sweep_expired_challenges().unwrap(), 0);
}
