//! Delta credential merging and component cross-checks.

use attestca_credentials::{
    AttributeStatus, ComponentIdentifier, ComponentInfo, DeviceInfoReport, PlatformCredential,
};

/// Result of applying delta credentials to a base component set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MergeOutcome {
    Merged(Vec<ComponentIdentifier>),
    /// The deltas are inconsistent with the base (appraisal failure)
    Failed(Vec<String>),
    /// A delta references a component the base never declared
    Error(Vec<String>),
}

/// Apply `deltas`, in the given order, to the single base credential.
///
/// - ADDED appends the component
/// - MODIFIED replaces the first component with the same class,
///   manufacturer and model
/// - REMOVED drops the first component that also matches the serial
///
/// A MODIFIED or REMOVED entry with nothing to act on is an error; a
/// delta entry without a status, or a delta that does not belong to the
/// base platform, is a failure. Every delta is processed so all problems
/// are reported together.
pub fn merge_deltas(bases: &[&PlatformCredential], deltas: &[&PlatformCredential]) -> MergeOutcome {
    let base = match bases {
        [base] => *base,
        _ => {
            return MergeOutcome::Failed(vec![format!(
                "delta credentials require exactly one base credential, found {}",
                bases.len()
            )])
        }
    };

    let mut merged: Vec<ComponentIdentifier> = base.components.clone();
    let mut failures = Vec::new();
    let mut errors = Vec::new();

    for delta in deltas {
        let serial = delta.info.serial_hex();
        if delta.platform.serial != base.platform.serial {
            failures.push(format!(
                "delta {} platform serial {:?} does not match base {:?}",
                serial, delta.platform.serial, base.platform.serial
            ));
            continue;
        }
        if delta.info.serial == base.info.serial {
            failures.push(format!("delta {} reuses the base credential serial", serial));
            continue;
        }
        if delta.info.not_before < base.info.not_before {
            failures.push(format!("delta {} predates its base credential", serial));
            continue;
        }

        for component in &delta.components {
            let mut entry = component.clone();
            entry.status = None;
            match component.status {
                None => failures.push(format!(
                    "delta {} lists {} without a status",
                    serial,
                    component.describe()
                )),
                Some(AttributeStatus::Added) => merged.push(entry),
                Some(AttributeStatus::Modified) => {
                    match merged.iter().position(|c| c.same_part(component)) {
                        Some(index) => merged[index] = entry,
                        None => errors.push(format!(
                            "delta {} modifies {} which is not in the base",
                            serial,
                            component.describe()
                        )),
                    }
                }
                Some(AttributeStatus::Removed) => {
                    match merged
                        .iter()
                        .position(|c| c.same_part(component) && c.serial == component.serial)
                    {
                        Some(index) => {
                            merged.remove(index);
                        }
                        None => errors.push(format!(
                            "delta {} removes {} which is not in the base",
                            serial,
                            component.describe()
                        )),
                    }
                }
            }
        }
    }

    if !errors.is_empty() {
        MergeOutcome::Error(errors)
    } else if !failures.is_empty() {
        MergeOutcome::Failed(failures)
    } else {
        MergeOutcome::Merged(merged)
    }
}

fn text_eq(a: &str, b: &str) -> bool {
    a.trim().eq_ignore_ascii_case(b.trim())
}

fn component_matches(declared: &ComponentIdentifier, found: &ComponentInfo, ignore_revision: bool) -> bool {
    if declared.class != found.class
        || !text_eq(&declared.manufacturer, &found.manufacturer)
        || !text_eq(&declared.model, &found.model)
    {
        return false;
    }
    if let Some(serial) = &declared.serial {
        if found.serial() != Some(serial.trim()) {
            return false;
        }
    }
    if !ignore_revision {
        if let Some(revision) = &declared.revision {
            if found.revision() != Some(revision.trim()) {
                return false;
            }
        }
    }
    true
}

/// Cross-check the platform identity and declared components against
/// the device inventory. Returns one message per mismatch, in declaration
/// order; empty means everything matched.
pub fn cross_check(
    platform: &PlatformCredential,
    components: &[ComponentIdentifier],
    device: &DeviceInfoReport,
    ignore_revision: bool,
) -> Vec<String> {
    let mut mismatches = Vec::new();
    let hardware = &device.hardware;

    if let Some(manufacturer) = &platform.platform.manufacturer {
        if !text_eq(manufacturer, &hardware.manufacturer) {
            mismatches.push(format!(
                "platform manufacturer {} does not match device {}",
                manufacturer, hardware.manufacturer
            ));
        }
    }
    if let Some(model) = &platform.platform.model {
        if !text_eq(model, &hardware.product_name) {
            mismatches.push(format!(
                "platform model {} does not match device {}",
                model, hardware.product_name
            ));
        }
    }
    if let Some(serial) = &platform.platform.serial {
        let serials = hardware.serials();
        if !serials.is_empty() && !serials.iter().any(|s| *s == serial.trim()) {
            mismatches.push(format!(
                "platform serial {} matches no device serial",
                serial
            ));
        }
    }

    let mut used = vec![false; hardware.components.len()];
    for declared in components {
        let found = hardware
            .components
            .iter()
            .enumerate()
            .find(|(i, c)| !used[*i] && component_matches(declared, c, ignore_revision));
        match found {
            Some((index, _)) => used[index] = true,
            None => mismatches.push(format!("unmatched component {}", declared.describe())),
        }
    }
    mismatches
}
