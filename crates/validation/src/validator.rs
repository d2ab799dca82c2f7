//! Supply-chain validation of endorsement and platform credentials.

use crate::attributes::{cross_check, merge_deltas, MergeOutcome};
use crate::baseline::PcrBaselineSource;
use crate::chain::{verify_chain, ChainVerdict};
use crate::policy::SupplyChainPolicy;
use crate::summary::{SecurityEvent, ValidationResult, ValidationSummary, ValidationType};
use attestca_core::current_timestamp;
use attestca_credentials::{
    CredentialInfo, CredentialSelector, CredentialStore, DeviceInfoReport, EndorsementCredential,
    PlatformCredential,
};
use chrono::DateTime;
use std::sync::Arc;
use tracing::{error, info, warn};

/// Runs the configured check families and assembles a summary.
///
/// Every applicable check produces exactly one result, in a fixed order,
/// whatever the outcome of earlier checks. Trust store failures become
/// ERROR results rather than aborting the run.
pub struct SupplyChainValidator {
    policy: SupplyChainPolicy,
    credentials: Arc<dyn CredentialStore>,
    baselines: Arc<dyn PcrBaselineSource>,
}

fn format_time(unix_secs: u64) -> String {
    i64::try_from(unix_secs)
        .ok()
        .and_then(|secs| DateTime::from_timestamp(secs, 0))
        .map(|t| t.to_rfc3339())
        .unwrap_or_else(|| unix_secs.to_string())
}

/// Credential bytes a device presented that could not be parsed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnparsedCredential {
    pub der: Vec<u8>,
    pub reason: String,
}

impl UnparsedCredential {
    pub fn new(der: impl Into<Vec<u8>>, reason: impl ToString) -> Self {
        Self {
            der: der.into(),
            reason: reason.to_string(),
        }
    }
}

/// The endorsement credential as far as it could be read.
#[derive(Debug, Clone, Copy)]
pub enum EndorsementInput<'a> {
    Absent,
    Parsed(&'a EndorsementCredential),
    Unparsed(&'a UnparsedCredential),
}

impl<'a> EndorsementInput<'a> {
    pub fn parsed(&self) -> Option<&'a EndorsementCredential> {
        match *self {
            Self::Parsed(ec) => Some(ec),
            _ => None,
        }
    }
}

impl<'a> From<Option<&'a EndorsementCredential>> for EndorsementInput<'a> {
    fn from(ec: Option<&'a EndorsementCredential>) -> Self {
        ec.map_or(Self::Absent, Self::Parsed)
    }
}

/// Big-endian serials compared as unsigned integers.
fn serial_order(a: &[u8], b: &[u8]) -> std::cmp::Ordering {
    fn significant(serial: &[u8]) -> &[u8] {
        let start = serial.iter().position(|&b| b != 0).unwrap_or(serial.len());
        &serial[start..]
    }
    let (a, b) = (significant(a), significant(b));
    a.len().cmp(&b.len()).then_with(|| a.cmp(b))
}

/// Unique credentials, bases first, then deltas by notBefore and serial.
fn ordered(platforms: &[PlatformCredential]) -> Vec<&PlatformCredential> {
    let mut unique: Vec<&PlatformCredential> = Vec::new();
    for pc in platforms {
        if !unique.iter().any(|u| u.info.der == pc.info.der) {
            unique.push(pc);
        }
    }
    unique.sort_by(|a, b| {
        a.is_delta()
            .cmp(&b.is_delta())
            .then(a.info.not_before.cmp(&b.info.not_before))
            .then_with(|| serial_order(&a.info.serial, &b.info.serial))
    });
    unique
}

impl SupplyChainValidator {
    pub fn new(
        policy: SupplyChainPolicy,
        credentials: Arc<dyn CredentialStore>,
        baselines: Arc<dyn PcrBaselineSource>,
    ) -> Self {
        Self {
            policy,
            credentials,
            baselines,
        }
    }

    pub fn policy(&self) -> &SupplyChainPolicy {
        &self.policy
    }

    /// Endorsement checks only, as run before a challenge is issued.
    pub fn validate_endorsement(
        &self,
        ec: Option<&EndorsementCredential>,
        device: &DeviceInfoReport,
    ) -> ValidationSummary {
        self.validate_presented_endorsement(ec.into(), device)
    }

    /// Endorsement checks for a credential that may not have parsed.
    pub fn validate_presented_endorsement(
        &self,
        ec: EndorsementInput<'_>,
        device: &DeviceInfoReport,
    ) -> ValidationSummary {
        let now = current_timestamp() / 1000;
        let mut results = Vec::new();
        self.endorsement_checks(ec, now, &mut results);
        self.finish(device, results)
    }

    pub fn validate(
        &self,
        ec: Option<&EndorsementCredential>,
        platforms: &[PlatformCredential],
        device: &DeviceInfoReport,
    ) -> ValidationSummary {
        self.validate_at(ec, platforms, device, current_timestamp() / 1000)
    }

    /// Full validation with `now` in unix seconds.
    pub fn validate_at(
        &self,
        ec: Option<&EndorsementCredential>,
        platforms: &[PlatformCredential],
        device: &DeviceInfoReport,
        now: u64,
    ) -> ValidationSummary {
        self.validate_presented_at(ec.into(), platforms, &[], device, now)
    }

    /// Full validation including presented credentials that did not
    /// parse. Each of those is reported as a chain-of-trust ERROR.
    pub fn validate_presented(
        &self,
        ec: EndorsementInput<'_>,
        platforms: &[PlatformCredential],
        unparsed_platforms: &[UnparsedCredential],
        device: &DeviceInfoReport,
    ) -> ValidationSummary {
        let now = current_timestamp() / 1000;
        self.validate_presented_at(ec, platforms, unparsed_platforms, device, now)
    }

    pub fn validate_presented_at(
        &self,
        ec: EndorsementInput<'_>,
        platforms: &[PlatformCredential],
        unparsed_platforms: &[UnparsedCredential],
        device: &DeviceInfoReport,
        now: u64,
    ) -> ValidationSummary {
        let platforms = ordered(platforms);
        let mut results = Vec::new();

        self.endorsement_checks(ec, now, &mut results);
        if self.policy.pc_validation {
            self.platform_checks(ec, &platforms, unparsed_platforms, now, &mut results);
        }
        if self.policy.pc_attribute_validation {
            self.attribute_checks(&platforms, device, &mut results);
        }
        if self.policy.firmware_validation {
            results.push(self.firmware_check(device));
        }

        self.finish(device, results)
    }

    fn finish(&self, device: &DeviceInfoReport, results: Vec<ValidationResult>) -> ValidationSummary {
        let summary = ValidationSummary::new(device.device_name(), results);
        info!(
            summary_id = %summary.id,
            device = %summary.device,
            status = ?summary.overall_status(),
            checks = summary.results().len(),
            "Supply-chain validation complete"
        );
        summary
    }

    fn endorsement_checks(
        &self,
        ec: EndorsementInput<'_>,
        now: u64,
        results: &mut Vec<ValidationResult>,
    ) {
        if !self.policy.ec_validation {
            return;
        }
        let ec = match ec {
            EndorsementInput::Parsed(ec) => ec,
            EndorsementInput::Absent => {
                results.push(ValidationResult::fail(
                    ValidationType::EndorsementPresence,
                    "no endorsement credential presented or on file",
                ));
                return;
            }
            EndorsementInput::Unparsed(unparsed) => {
                warn!(
                    len = unparsed.der.len(),
                    reason = %unparsed.reason,
                    "Presented endorsement credential does not parse"
                );
                // Validity and SKI need a parsed credential; the chain ERROR stands for all three
                results.push(ValidationResult::error(
                    ValidationType::EndorsementChainOfTrust,
                    format!(
                        "endorsement credential ({} bytes) does not parse: {}",
                        unparsed.der.len(),
                        unparsed.reason
                    ),
                ));
                return;
            }
        };

        results.push(self.chain_check(ValidationType::EndorsementChainOfTrust, &ec.info, now));
        results.push(self.validity_check(ValidationType::EndorsementValidity, &ec.info, now));
        results.push(self.duplicate_ski_check(ec));
    }

    fn platform_checks(
        &self,
        ec: EndorsementInput<'_>,
        platforms: &[&PlatformCredential],
        unparsed: &[UnparsedCredential],
        now: u64,
        results: &mut Vec<ValidationResult>,
    ) {
        if platforms.is_empty() && unparsed.is_empty() {
            let message = "no platform credential presented or on file";
            results.push(if self.policy.require_platform_credential {
                ValidationResult::fail(ValidationType::PlatformPresence, message)
            } else {
                ValidationResult::skipped(ValidationType::PlatformPresence, message)
            });
            return;
        }

        for pc in platforms {
            results.push(self.chain_check(ValidationType::PlatformChainOfTrust, &pc.info, now));
            results.push(self.validity_check(ValidationType::PlatformValidity, &pc.info, now));

            let serial = pc.info.serial_hex();
            let binding = match ec {
                EndorsementInput::Parsed(ec) if pc.references(ec) => ValidationResult::pass(
                    ValidationType::PlatformEndorsementBinding,
                    format!("holder references endorsement credential {}", ec.info.serial_hex()),
                ),
                EndorsementInput::Parsed(ec) => ValidationResult::fail(
                    ValidationType::PlatformEndorsementBinding,
                    format!(
                        "holder does not reference endorsement credential {}",
                        ec.info.serial_hex()
                    ),
                ),
                EndorsementInput::Absent => ValidationResult::fail(
                    ValidationType::PlatformEndorsementBinding,
                    "no endorsement credential to bind to",
                ),
                EndorsementInput::Unparsed(_) => ValidationResult::error(
                    ValidationType::PlatformEndorsementBinding,
                    "endorsement credential does not parse",
                ),
            };
            results.push(binding.for_credential(serial));
        }

        for (index, bad) in unparsed.iter().enumerate() {
            warn!(
                index,
                len = bad.der.len(),
                reason = %bad.reason,
                "Presented platform credential does not parse"
            );
            results.push(ValidationResult::error(
                ValidationType::PlatformChainOfTrust,
                format!(
                    "platform credential #{} ({} bytes) does not parse: {}",
                    index + 1,
                    bad.der.len(),
                    bad.reason
                ),
            ));
        }
    }

    fn attribute_checks(
        &self,
        platforms: &[&PlatformCredential],
        device: &DeviceInfoReport,
        results: &mut Vec<ValidationResult>,
    ) {
        let (bases, deltas): (Vec<&PlatformCredential>, Vec<&PlatformCredential>) =
            platforms.iter().copied().partition(|pc| !pc.is_delta());

        if bases.is_empty() && deltas.is_empty() {
            results.push(ValidationResult::skipped(
                ValidationType::PlatformAttributes,
                "no platform credential to compare against the device",
            ));
            return;
        }

        let ignore_revision = self.policy.ignore_revision_attribute;
        if deltas.is_empty() {
            let mismatches: Vec<String> = bases
                .iter()
                .flat_map(|base| cross_check(base, &base.components, device, ignore_revision))
                .collect();
            let declared: usize = bases.iter().map(|b| b.components.len()).sum();
            results.push(attributes_result(mismatches, declared));
            return;
        }

        match merge_deltas(&bases, &deltas) {
            MergeOutcome::Merged(components) => {
                results.push(ValidationResult::pass(
                    ValidationType::DeltaMerge,
                    format!("applied {} delta credential(s)", deltas.len()),
                ));
                // merge_deltas only succeeds with exactly one base
                if let Some(base) = bases.first() {
                    let mismatches = cross_check(base, &components, device, ignore_revision);
                    results.push(attributes_result(mismatches, components.len()));
                }
            }
            MergeOutcome::Failed(problems) => {
                results.push(ValidationResult::fail(ValidationType::DeltaMerge, problems.join("; ")));
                results.push(merge_skipped());
            }
            MergeOutcome::Error(problems) => {
                results.push(ValidationResult::error(ValidationType::DeltaMerge, problems.join("; ")));
                results.push(merge_skipped());
            }
        }
    }

    fn firmware_check(&self, device: &DeviceInfoReport) -> ValidationResult {
        let kind = ValidationType::FirmwarePcrs;
        let baseline = match self.baselines.baseline(&device.hardware) {
            Ok(Some(baseline)) => baseline,
            Ok(None) => {
                return ValidationResult::fail(
                    kind,
                    format!(
                        "no PCR baseline for {} {}",
                        device.hardware.manufacturer, device.hardware.product_name
                    ),
                )
            }
            Err(e) => {
                error!(error = %e, "PCR baseline lookup failed");
                return ValidationResult::error(kind, format!("PCR baseline unavailable: {}", e));
            }
        };

        let mut mismatches = Vec::new();
        for (index, expected) in &baseline {
            match device.tpm.pcr(*index) {
                Ok(Some(actual)) if &actual == expected => {}
                Ok(Some(actual)) => mismatches.push(format!(
                    "PCR {} is {} expected {}",
                    index,
                    hex::encode(actual),
                    hex::encode(expected)
                )),
                Ok(None) => mismatches.push(format!("PCR {} not reported", index)),
                Err(e) => mismatches.push(e.to_string()),
            }
        }

        if mismatches.is_empty() {
            ValidationResult::pass(kind, format!("{} PCR value(s) match the baseline", baseline.len()))
        } else {
            ValidationResult::fail(kind, mismatches.join("; "))
        }
    }

    fn chain_check(
        &self,
        kind: ValidationType,
        info: &CredentialInfo,
        now: u64,
    ) -> ValidationResult {
        let serial = info.serial_hex();
        let result = match verify_chain(info, self.credentials.as_ref(), now) {
            Ok(ChainVerdict::Trusted { anchor, depth }) => ValidationResult::pass(
                kind,
                format!("chains to {} through {} issuer(s)", anchor, depth),
            ),
            Ok(ChainVerdict::Untrusted(reason)) => ValidationResult::fail(kind, reason),
            Err(e) => {
                error!(serial = %serial, error = %e, "Trust store lookup failed");
                ValidationResult::error(kind, format!("trust store unavailable: {}", e))
            }
        };
        result.for_credential(serial)
    }

    fn validity_check(
        &self,
        kind: ValidationType,
        info: &CredentialInfo,
        now: u64,
    ) -> ValidationResult {
        let serial = info.serial_hex();
        let result = if now < info.not_before {
            ValidationResult::fail(
                kind,
                format!("not valid before {}", format_time(info.not_before)),
            )
        } else if now > info.not_after {
            let expired = format!("expired at {}", format_time(info.not_after));
            if self.policy.accept_expired_credentials {
                ValidationResult::pass(kind, "expired credential accepted by policy")
                    .with_warning(expired)
            } else {
                ValidationResult::fail(kind, expired)
            }
        } else {
            ValidationResult::pass(kind, "within validity period")
        };
        result.for_credential(serial)
    }

    fn duplicate_ski_check(&self, ec: &EndorsementCredential) -> ValidationResult {
        let kind = ValidationType::EndorsementDuplicateSki;
        let serial = ec.info.serial_hex();
        let Some(ski) = &ec.info.subject_key_id else {
            return ValidationResult::pass(kind, "no subject key identifier to compare")
                .for_credential(serial);
        };

        let selector = CredentialSelector::all().with_subject_key_id(ski);
        let result = match self.credentials.find(&selector) {
            Ok(found) => {
                let conflicting: Vec<String> = found
                    .iter()
                    .filter(|c| c.der() != ec.info.der.as_slice())
                    .map(|c| c.info().serial_hex())
                    .collect();
                if conflicting.is_empty() {
                    ValidationResult::pass(kind, "subject key identifier is unique")
                } else {
                    let subject_key_id = hex::encode(ski);
                    warn!(
                        security_event = true,
                        subject_key_id = %subject_key_id,
                        serial = %serial,
                        conflicting = ?conflicting,
                        "Subject key identifier collides with a trusted credential"
                    );
                    let event = SecurityEvent::DuplicateSubjectKeyIdentifier {
                        subject_key_id,
                        conflicting_serials: conflicting,
                    };
                    ValidationResult::fail(kind, event.to_string()).with_security_event(event)
                }
            }
            Err(e) => {
                error!(serial = %serial, error = %e, "Duplicate SKI lookup failed");
                ValidationResult::error(kind, format!("trust store unavailable: {}", e))
            }
        };
        result.for_credential(serial)
    }
}

fn attributes_result(mismatches: Vec<String>, declared: usize) -> ValidationResult {
    if mismatches.is_empty() {
        ValidationResult::pass(
            ValidationType::PlatformAttributes,
            format!("all {} declared component(s) found on the device", declared),
        )
    } else {
        ValidationResult::fail(ValidationType::PlatformAttributes, mismatches.join("; "))
    }
}

fn merge_skipped() -> ValidationResult {
    ValidationResult::skipped(
        ValidationType::PlatformAttributes,
        "component set unavailable because the delta merge did not succeed",
    )
}
