//! Validation results and summaries.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Check a result belongs to. Declaration order is reporting order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ValidationType {
    EndorsementPresence,
    EndorsementChainOfTrust,
    EndorsementValidity,
    EndorsementDuplicateSki,
    PlatformPresence,
    PlatformChainOfTrust,
    PlatformValidity,
    PlatformEndorsementBinding,
    DeltaMerge,
    PlatformAttributes,
    FirmwarePcrs,
}

impl fmt::Display for ValidationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AppraisalStatus {
    Pass,
    Fail,
    Error,
    /// Not applicable under the current policy
    Skipped,
}

impl fmt::Display for AppraisalStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Pass => "PASS",
            Self::Fail => "FAIL",
            Self::Error => "ERROR",
            Self::Skipped => "SKIPPED",
        })
    }
}

/// Security-relevant findings, reported apart from routine failures.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum SecurityEvent {
    /// A presented credential reuses the SKI of a different trusted one
    DuplicateSubjectKeyIdentifier {
        subject_key_id: String,
        conflicting_serials: Vec<String>,
    },
}

impl fmt::Display for SecurityEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::DuplicateSubjectKeyIdentifier {
                subject_key_id,
                conflicting_serials,
            } => write!(
                f,
                "subject key identifier {} already used by credential(s) {}",
                subject_key_id,
                conflicting_serials.join(", ")
            ),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationResult {
    pub validation_type: ValidationType,
    pub status: AppraisalStatus,
    pub message: String,
    /// Serial (hex) of the credential the check ran on
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub credential_serial: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub security_event: Option<SecurityEvent>,
}

impl ValidationResult {
    pub fn new(validation_type: ValidationType, status: AppraisalStatus, message: impl Into<String>) -> Self {
        Self {
            validation_type,
            status,
            message: message.into(),
            credential_serial: None,
            warnings: Vec::new(),
            security_event: None,
        }
    }

    pub fn pass(validation_type: ValidationType, message: impl Into<String>) -> Self {
        Self::new(validation_type, AppraisalStatus::Pass, message)
    }

    pub fn fail(validation_type: ValidationType, message: impl Into<String>) -> Self {
        Self::new(validation_type, AppraisalStatus::Fail, message)
    }

    pub fn error(validation_type: ValidationType, message: impl Into<String>) -> Self {
        Self::new(validation_type, AppraisalStatus::Error, message)
    }

    pub fn skipped(validation_type: ValidationType, message: impl Into<String>) -> Self {
        Self::new(validation_type, AppraisalStatus::Skipped, message)
    }

    pub fn for_credential(mut self, serial: String) -> Self {
        self.credential_serial = Some(serial);
        self
    }

    pub fn with_warning(mut self, warning: impl Into<String>) -> Self {
        self.warnings.push(warning.into());
        self
    }

    pub fn with_security_event(mut self, event: SecurityEvent) -> Self {
        self.security_event = Some(event);
        self
    }
}

/// Outcome of one supply-chain validation run, kept for audit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationSummary {
    pub id: Uuid,
    pub device: String,
    pub created_at: DateTime<Utc>,
    results: Vec<ValidationResult>,
}

impl ValidationSummary {
    pub fn new(device: impl Into<String>, results: Vec<ValidationResult>) -> Self {
        Self {
            id: Uuid::new_v4(),
            device: device.into(),
            created_at: Utc::now(),
            results,
        }
    }

    pub fn results(&self) -> &[ValidationResult] {
        &self.results
    }

    /// ERROR if any check errored, else FAIL if any failed, else PASS.
    pub fn overall_status(&self) -> AppraisalStatus {
        let statuses = self.results.iter().map(|r| r.status);
        if statuses.clone().any(|s| s == AppraisalStatus::Error) {
            AppraisalStatus::Error
        } else if statuses.clone().any(|s| s == AppraisalStatus::Fail) {
            AppraisalStatus::Fail
        } else {
            AppraisalStatus::Pass
        }
    }

    pub fn is_pass(&self) -> bool {
        self.overall_status() == AppraisalStatus::Pass
    }

    pub fn security_events(&self) -> impl Iterator<Item = &SecurityEvent> {
        self.results.iter().filter_map(|r| r.security_event.as_ref())
    }

    pub fn has_security_event(&self) -> bool {
        self.security_events().next().is_some()
    }

    /// Results with FAIL or ERROR status.
    pub fn failures(&self) -> impl Iterator<Item = &ValidationResult> {
        self.results
            .iter()
            .filter(|r| matches!(r.status, AppraisalStatus::Fail | AppraisalStatus::Error))
    }

    /// One line per failing check, `Type: message`.
    pub fn failure_messages(&self) -> Vec<String> {
        self.failures()
            .map(|r| format!("{}: {}", r.validation_type, r.message))
            .collect()
    }
}
