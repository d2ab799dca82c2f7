use attestca_credentials::test_support::{self, PlatformSpec, TestCa};
use attestca_credentials::{
    AttributeStatus, ComponentIdentifier, Credential, CredentialSelector, CredentialStore,
    DeviceInfoReport, EndorsementCredential, InMemoryCredentialStore, PlatformCredential,
    StoreError, StoreResult,
};
use attestca_validation::{
    AppraisalStatus, EndorsementInput, StaticPcrBaselines, SupplyChainPolicy, SupplyChainValidator,
    UnparsedCredential, ValidationType,
};
use rsa::RsaPublicKey;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, SystemTime};

const DAY: Duration = Duration::from_secs(86_400);

struct Harness {
    ca: TestCa,
    store: Arc<InMemoryCredentialStore>,
    ec_der: Vec<u8>,
}

impl Harness {
    fn new() -> Self {
        let ca = TestCa::root("Supply Chain Root");
        let store = Arc::new(InMemoryCredentialStore::new());
        store.save(ca.credential()).unwrap();
        let ec_der = ca.issue_endorsement(&ek(), 1);
        Self { ca, store, ec_der }
    }

    fn ec(&self) -> EndorsementCredential {
        EndorsementCredential::from_der(&self.ec_der).unwrap()
    }

    fn platform(&self, spec: PlatformSpec) -> PlatformCredential {
        PlatformCredential::from_der(&self.ca.issue_platform(&spec)).unwrap()
    }

    fn validator(&self, policy: SupplyChainPolicy) -> SupplyChainValidator {
        SupplyChainValidator::new(policy, self.store.clone(), Arc::new(StaticPcrBaselines::new()))
    }
}

fn ek() -> RsaPublicKey {
    RsaPublicKey::from(&test_support::ek_private_key())
}

fn inventory() -> Vec<ComponentIdentifier> {
    vec![
        test_support::bios("Acme", "X1"),
        test_support::baseboard("Acme", "MB-7", "BB-100"),
        test_support::nic("Intel", "I210", "00:11:22:33:44:55"),
    ]
}

fn types(results: &[attestca_validation::ValidationResult]) -> Vec<ValidationType> {
    results.iter().map(|r| r.validation_type).collect()
}

#[test]
fn test_trusted_device_passes_every_check() {
    let h = Harness::new();
    let base = h.platform(PlatformSpec::base(&h.ec_der, 10).with_components(inventory()));
    let device = test_support::device_report(&inventory());

    let summary = h
        .validator(SupplyChainPolicy::default())
        .validate(Some(&h.ec()), &[base], &device);

    assert_eq!(
        types(summary.results()),
        vec![
            ValidationType::EndorsementChainOfTrust,
            ValidationType::EndorsementValidity,
            ValidationType::EndorsementDuplicateSki,
            ValidationType::PlatformChainOfTrust,
            ValidationType::PlatformValidity,
            ValidationType::PlatformEndorsementBinding,
            ValidationType::PlatformAttributes,
        ]
    );
    assert!(summary.is_pass(), "{:?}", summary.failure_messages());
    assert_eq!(summary.device, "node-1");
}

#[test]
fn test_missing_bios_is_the_only_failure() {
    let h = Harness::new();
    let base = h.platform(PlatformSpec::base(&h.ec_der, 10).with_components(inventory()));
    let collected: Vec<ComponentIdentifier> = inventory().into_iter().skip(1).collect();
    let device = test_support::device_report(&collected);

    let summary = h
        .validator(SupplyChainPolicy::default())
        .validate(Some(&h.ec()), &[base], &device);

    let failures: Vec<_> = summary.failures().collect();
    assert_eq!(failures.len(), 1);
    assert_eq!(failures[0].validation_type, ValidationType::PlatformAttributes);
    assert_eq!(failures[0].status, AppraisalStatus::Fail);
    assert!(failures[0].message.contains("BIOS/UEFI (manufacturer=Acme, model=X1"));
    assert!(!summary.has_security_event());
}

#[test]
fn test_untrusted_endorsement_does_not_short_circuit() {
    let h = Harness::new();
    let stranger = TestCa::root("Unknown Manufacturer");
    let ec_der = stranger.issue_endorsement(&ek(), 7);
    let ec = EndorsementCredential::from_der(&ec_der).unwrap();
    let base = h.platform(PlatformSpec::base(&ec_der, 10).with_components(inventory()));
    let device = test_support::device_report(&inventory());

    let summary = h
        .validator(SupplyChainPolicy::default())
        .validate(Some(&ec), &[base], &device);

    assert_eq!(summary.results().len(), 7);
    assert_eq!(summary.results()[0].status, AppraisalStatus::Fail);
    assert_eq!(summary.overall_status(), AppraisalStatus::Fail);
    assert_eq!(summary.failures().count(), 1);
}

#[test]
fn test_identical_input_gives_identical_results() {
    let h = Harness::new();
    let base = h.platform(PlatformSpec::base(&h.ec_der, 10).with_components(inventory()));
    let delta = h.platform(PlatformSpec::delta(&h.ec_der, 11).with_component(
        test_support::nic("Intel", "I225", "66:77").with_status(AttributeStatus::Added),
    ));
    let mut collected = inventory();
    collected.push(test_support::nic("Intel", "I225", "66:77"));
    let device = test_support::device_report(&collected);
    let validator = h.validator(SupplyChainPolicy::default());
    let ec = h.ec();

    let first = validator.validate(Some(&ec), &[base.clone(), delta.clone()], &device);
    let second = validator.validate(Some(&ec), &[delta, base], &device);

    assert_eq!(first.results(), second.results());
    assert!(first.is_pass(), "{:?}", first.failure_messages());
    assert_eq!(
        types(first.results())[3..],
        [
            ValidationType::PlatformChainOfTrust,
            ValidationType::PlatformValidity,
            ValidationType::PlatformEndorsementBinding,
            ValidationType::PlatformChainOfTrust,
            ValidationType::PlatformValidity,
            ValidationType::PlatformEndorsementBinding,
            ValidationType::DeltaMerge,
            ValidationType::PlatformAttributes,
        ]
    );
}

#[test]
fn test_duplicate_ski_raises_security_event() {
    let h = Harness::new();
    // A different certificate over the same key carries the same SKI.
    h.store
        .save(test_support::endorsement(&h.ca.issue_endorsement(&ek(), 99)))
        .unwrap();

    let summary = h
        .validator(SupplyChainPolicy::default())
        .validate_endorsement(Some(&h.ec()), &test_support::device_report(&[]));

    assert!(summary.has_security_event());
    let duplicate = &summary.results()[2];
    assert_eq!(duplicate.validation_type, ValidationType::EndorsementDuplicateSki);
    assert!(duplicate.security_event.is_some());
}

#[test]
fn test_same_credential_on_file_is_not_a_duplicate() {
    let h = Harness::new();
    h.store.save(test_support::endorsement(&h.ec_der)).unwrap();

    let summary = h
        .validator(SupplyChainPolicy::default())
        .validate_endorsement(Some(&h.ec()), &test_support::device_report(&[]));

    assert!(summary.is_pass(), "{:?}", summary.failure_messages());
}

#[test]
fn test_expired_endorsement_policy() {
    let h = Harness::new();
    let now = SystemTime::now();
    let ec_der = h
        .ca
        .issue_endorsement_with_validity(&ek(), 3, now - DAY * 30, now - DAY);
    let ec = EndorsementCredential::from_der(&ec_der).unwrap();
    let device = test_support::device_report(&[]);

    let strict = h
        .validator(SupplyChainPolicy::default())
        .validate_endorsement(Some(&ec), &device);
    assert_eq!(strict.results()[1].status, AppraisalStatus::Fail);

    let lenient_policy = SupplyChainPolicy {
        accept_expired_credentials: true,
        ..SupplyChainPolicy::default()
    };
    let lenient = h.validator(lenient_policy).validate_endorsement(Some(&ec), &device);
    assert_eq!(lenient.results()[1].status, AppraisalStatus::Pass);
    assert_eq!(lenient.results()[1].warnings.len(), 1);
}

#[test]
fn test_not_yet_valid_fails_even_when_accepting_expired() {
    let h = Harness::new();
    let now = SystemTime::now();
    let ec_der = h
        .ca
        .issue_endorsement_with_validity(&ek(), 4, now + DAY, now + DAY * 30);
    let ec = EndorsementCredential::from_der(&ec_der).unwrap();
    let policy = SupplyChainPolicy {
        accept_expired_credentials: true,
        ..SupplyChainPolicy::default()
    };

    let summary = h
        .validator(policy)
        .validate_endorsement(Some(&ec), &test_support::device_report(&[]));
    assert_eq!(summary.results()[1].status, AppraisalStatus::Fail);
}

#[test]
fn test_missing_endorsement_fails_presence() {
    let h = Harness::new();
    let summary = h
        .validator(SupplyChainPolicy::default())
        .validate_endorsement(None, &test_support::device_report(&[]));

    assert_eq!(summary.results().len(), 1);
    assert_eq!(summary.results()[0].validation_type, ValidationType::EndorsementPresence);
    assert_eq!(summary.overall_status(), AppraisalStatus::Fail);
}

#[test]
fn test_missing_platform_credential_follows_policy() {
    let h = Harness::new();
    let device = test_support::device_report(&inventory());

    let lenient = h
        .validator(SupplyChainPolicy::default())
        .validate(Some(&h.ec()), &[], &device);
    assert!(lenient.is_pass());
    assert!(lenient
        .results()
        .iter()
        .any(|r| r.validation_type == ValidationType::PlatformPresence
            && r.status == AppraisalStatus::Skipped));

    let strict = SupplyChainPolicy {
        require_platform_credential: true,
        ..SupplyChainPolicy::default()
    };
    let summary = h.validator(strict).validate(Some(&h.ec()), &[], &device);
    assert_eq!(summary.overall_status(), AppraisalStatus::Fail);
}

#[test]
fn test_platform_for_other_endorsement_fails_binding() {
    let h = Harness::new();
    let other_ec = h
        .ca
        .issue_endorsement(&RsaPublicKey::from(&test_support::second_ek_private_key()), 2);
    let base = h.platform(PlatformSpec::base(&other_ec, 10).with_components(inventory()));
    let device = test_support::device_report(&inventory());

    let summary = h
        .validator(SupplyChainPolicy::default())
        .validate(Some(&h.ec()), &[base], &device);

    let failures: Vec<_> = summary.failures().collect();
    assert_eq!(failures.len(), 1);
    assert_eq!(failures[0].validation_type, ValidationType::PlatformEndorsementBinding);
}

#[test]
fn test_delta_removing_unknown_component_is_error() {
    let h = Harness::new();
    let base = h.platform(PlatformSpec::base(&h.ec_der, 10).with_components(inventory()));
    let delta = h.platform(PlatformSpec::delta(&h.ec_der, 11).with_component(
        test_support::nic("Broadcom", "BCM5720", "99:99").with_status(AttributeStatus::Removed),
    ));
    let device = test_support::device_report(&inventory());

    let summary = h
        .validator(SupplyChainPolicy::default())
        .validate(Some(&h.ec()), &[base, delta], &device);

    let tail: Vec<_> = summary.results().iter().rev().take(2).collect();
    assert_eq!(tail[1].validation_type, ValidationType::DeltaMerge);
    assert_eq!(tail[1].status, AppraisalStatus::Error);
    assert_eq!(tail[0].validation_type, ValidationType::PlatformAttributes);
    assert_eq!(tail[0].status, AppraisalStatus::Skipped);
    assert_eq!(summary.overall_status(), AppraisalStatus::Error);
}

#[test]
fn test_deltas_with_equal_not_before_apply_in_numeric_serial_order() {
    let h = Harness::new();
    let issued = SystemTime::now() - Duration::from_secs(600);
    let base = h.platform(PlatformSpec::base(&h.ec_der, 10).with_components(inventory()));
    // 200 encodes as 00 C8, which sorts before 02 bytewise
    let added = h.platform(
        PlatformSpec::delta(&h.ec_der, 2)
            .with_validity(issued, issued + DAY * 30)
            .with_component(
                test_support::nic("Intel", "I225", "66:77").with_status(AttributeStatus::Added),
            ),
    );
    let removed = h.platform(
        PlatformSpec::delta(&h.ec_der, 200)
            .with_validity(issued, issued + DAY * 30)
            .with_component(
                test_support::nic("Intel", "I225", "66:77").with_status(AttributeStatus::Removed),
            ),
    );
    let device = test_support::device_report(&inventory());

    let summary = h
        .validator(SupplyChainPolicy::default())
        .validate(Some(&h.ec()), &[base, removed, added], &device);

    assert!(summary.is_pass(), "{:?}", summary.failure_messages());
}

#[test]
fn test_unparseable_endorsement_is_chain_error() {
    let h = Harness::new();
    let mut der = h.ec_der.clone();
    der.truncate(40);
    let unparsed = UnparsedCredential::new(der, "truncated certificate");

    let summary = h.validator(SupplyChainPolicy::default()).validate_presented_endorsement(
        EndorsementInput::Unparsed(&unparsed),
        &test_support::device_report(&inventory()),
    );

    assert_eq!(summary.results().len(), 1);
    let result = &summary.results()[0];
    assert_eq!(result.validation_type, ValidationType::EndorsementChainOfTrust);
    assert_eq!(result.status, AppraisalStatus::Error);
    assert!(result.message.contains("does not parse: truncated certificate"));
    assert_eq!(summary.overall_status(), AppraisalStatus::Error);
}

#[test]
fn test_unparseable_platform_is_chain_error_beside_parsed_ones() {
    let h = Harness::new();
    let base = h.platform(PlatformSpec::base(&h.ec_der, 10).with_components(inventory()));
    let unparsed = [UnparsedCredential::new(vec![0x30, 0x03, 0x02, 0x01, 0x01], "not an attribute certificate")];
    let device = test_support::device_report(&inventory());
    let ec = h.ec();

    let summary = h.validator(SupplyChainPolicy::default()).validate_presented(
        EndorsementInput::Parsed(&ec),
        &[base],
        &unparsed,
        &device,
    );

    assert_eq!(
        types(summary.results())[3..],
        [
            ValidationType::PlatformChainOfTrust,
            ValidationType::PlatformValidity,
            ValidationType::PlatformEndorsementBinding,
            ValidationType::PlatformChainOfTrust,
            ValidationType::PlatformAttributes,
        ]
    );
    let errors: Vec<_> = summary
        .results()
        .iter()
        .filter(|r| r.status == AppraisalStatus::Error)
        .collect();
    assert_eq!(errors.len(), 1);
    assert!(errors[0].message.starts_with("platform credential #1 (5 bytes) does not parse"));
    assert_eq!(summary.overall_status(), AppraisalStatus::Error);
}

#[test]
fn test_only_unparseable_platforms_skip_presence_check() {
    let h = Harness::new();
    let unparsed = [UnparsedCredential::new(vec![0x04, 0x00], "not a sequence")];
    let ec = h.ec();
    let policy = SupplyChainPolicy {
        pc_attribute_validation: false,
        ..SupplyChainPolicy::default()
    };

    let summary = h.validator(policy).validate_presented(
        EndorsementInput::Parsed(&ec),
        &[],
        &unparsed,
        &test_support::device_report(&[]),
    );

    assert!(!types(summary.results()).contains(&ValidationType::PlatformPresence));
    assert_eq!(summary.overall_status(), AppraisalStatus::Error);
}

#[test]
fn test_disabled_families_contribute_nothing() {
    let h = Harness::new();
    let policy = SupplyChainPolicy {
        ec_validation: false,
        pc_validation: false,
        pc_attribute_validation: false,
        ..SupplyChainPolicy::default()
    };
    let summary = h
        .validator(policy)
        .validate(None, &[], &test_support::device_report(&[]));
    assert!(summary.results().is_empty());
    assert!(summary.is_pass());
}

fn firmware_device(pcr0: &str) -> DeviceInfoReport {
    let mut device = test_support::device_report(&[]);
    device.tpm.pcr_values.insert(0, pcr0.to_string());
    device
}

#[test]
fn test_firmware_pcrs_against_baseline() {
    let h = Harness::new();
    let baselines = StaticPcrBaselines::new().with_baseline(
        test_support::PLATFORM_MANUFACTURER,
        test_support::PLATFORM_MODEL,
        BTreeMap::from([(0u8, vec![0xab; 32])]),
    );
    let policy = SupplyChainPolicy {
        ec_validation: false,
        pc_validation: false,
        pc_attribute_validation: false,
        firmware_validation: true,
        ..SupplyChainPolicy::default()
    };
    let validator = SupplyChainValidator::new(policy, h.store.clone(), Arc::new(baselines));

    let good = validator.validate(None, &[], &firmware_device(&"ab".repeat(32)));
    assert!(good.is_pass());

    let bad = validator.validate(None, &[], &firmware_device(&"cd".repeat(32)));
    assert_eq!(bad.results()[0].validation_type, ValidationType::FirmwarePcrs);
    assert_eq!(bad.overall_status(), AppraisalStatus::Fail);

    let mut unknown = firmware_device(&"ab".repeat(32));
    unknown.hardware.product_name = "Other".to_string();
    assert_eq!(
        validator.validate(None, &[], &unknown).overall_status(),
        AppraisalStatus::Fail
    );
}

struct UnavailableStore;

impl CredentialStore for UnavailableStore {
    fn find(&self, _selector: &CredentialSelector) -> StoreResult<Vec<Credential>> {
        Err(StoreError::Unavailable("disk offline".to_string()))
    }

    fn save(&self, _credential: Credential) -> StoreResult<()> {
        Err(StoreError::Unavailable("disk offline".to_string()))
    }

    fn replace(&self, _credential: Credential) -> StoreResult<()> {
        Err(StoreError::Unavailable("disk offline".to_string()))
    }
}

#[test]
fn test_unreadable_trust_store_is_error_not_fail() {
    let h = Harness::new();
    let validator = SupplyChainValidator::new(
        SupplyChainPolicy::default(),
        Arc::new(UnavailableStore),
        Arc::new(StaticPcrBaselines::new()),
    );
    let summary = validator.validate_endorsement(Some(&h.ec()), &test_support::device_report(&[]));

    assert_eq!(summary.results()[0].status, AppraisalStatus::Error);
    assert_eq!(summary.results()[2].status, AppraisalStatus::Error);
    assert_eq!(summary.overall_status(), AppraisalStatus::Error);
}
