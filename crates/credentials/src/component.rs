//! TCG component model shared by platform credentials and device reports.

use crate::asn1::{AttributeStatusV2, ComponentClassV2, ComponentIdentifierV2, PropertiesV2};
use crate::error::{CredentialError, Result};
use crate::oids;
use der::asn1::{ObjectIdentifier, OctetString};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Placeholder strings firmware and OEMs use for "no value".
const PLACEHOLDERS: &[&str] = &["not specified", "unknown", "to be filled by o.e.m."];

/// Returns the trimmed value, or `None` for empty or placeholder strings.
pub fn specified(value: &str) -> Option<&str> {
    let trimmed = value.trim();
    if trimmed.is_empty() || PLACEHOLDERS.contains(&trimmed.to_ascii_lowercase().as_str()) {
        None
    } else {
        Some(trimmed)
    }
}

fn specified_owned(value: Option<String>) -> Option<String> {
    value.as_deref().and_then(specified).map(str::to_string)
}

/// Component change recorded by a delta platform credential.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AttributeStatus {
    Added,
    Modified,
    Removed,
}

impl From<AttributeStatusV2> for AttributeStatus {
    fn from(status: AttributeStatusV2) -> Self {
        match status {
            AttributeStatusV2::Added => Self::Added,
            AttributeStatusV2::Modified => Self::Modified,
            AttributeStatusV2::Removed => Self::Removed,
        }
    }
}

impl From<AttributeStatus> for AttributeStatusV2 {
    fn from(status: AttributeStatus) -> Self {
        match status {
            AttributeStatus::Added => Self::Added,
            AttributeStatus::Modified => Self::Modified,
            AttributeStatus::Removed => Self::Removed,
        }
    }
}

/// Component class: registry OID plus a 4-byte class value.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ComponentClass {
    pub registry: String,
    pub value: u32,
}

impl ComponentClass {
    pub const BIOS: u32 = 0x0013_0003;
    pub const BASEBOARD: u32 = 0x0003_0003;
    pub const PROCESSOR: u32 = 0x0001_0002;
    pub const MEMORY: u32 = 0x0006_0004;
    pub const HARD_DRIVE: u32 = 0x0007_0002;
    pub const NIC: u32 = 0x0009_0002;

    /// A class from the TCG component class registry.
    pub fn tcg(value: u32) -> Self {
        Self {
            registry: oids::COMPONENT_CLASS_TCG.to_string(),
            value,
        }
    }

    pub fn is_tcg(&self) -> bool {
        self.registry == oids::COMPONENT_CLASS_TCG.to_string()
    }

    /// Human-readable name used in validation messages.
    pub fn display_name(&self) -> &'static str {
        if !self.is_tcg() {
            return "Unknown";
        }
        match self.value >> 16 {
            0x0013 => "BIOS/UEFI",
            0x0003 => "Baseboard",
            0x0001 => "Processor",
            0x0006 => "Memory",
            0x0007 => "Hard Drive",
            0x0009 => "NIC",
            0x0002 => "Chassis",
            _ => "Unknown",
        }
    }
}

impl fmt::Display for ComponentClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({:08x})", self.display_name(), self.value)
    }
}

/// A hardware component declared by a platform credential.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ComponentIdentifier {
    pub class: ComponentClass,
    pub manufacturer: String,
    pub model: String,
    pub serial: Option<String>,
    pub revision: Option<String>,
    pub field_replaceable: Option<bool>,
    pub status: Option<AttributeStatus>,
}

impl ComponentIdentifier {
    pub fn new(class: ComponentClass, manufacturer: &str, model: &str) -> Self {
        Self {
            class,
            manufacturer: manufacturer.to_string(),
            model: model.to_string(),
            serial: None,
            revision: None,
            field_replaceable: None,
            status: None,
        }
    }

    pub fn with_serial(mut self, serial: &str) -> Self {
        self.serial = specified(serial).map(str::to_string);
        self
    }

    pub fn with_revision(mut self, revision: &str) -> Self {
        self.revision = specified(revision).map(str::to_string);
        self
    }

    pub fn with_status(mut self, status: AttributeStatus) -> Self {
        self.status = Some(status);
        self
    }

    /// Same class, manufacturer and model.
    pub fn same_part(&self, other: &ComponentIdentifier) -> bool {
        self.class == other.class
            && self.manufacturer == other.manufacturer
            && self.model == other.model
    }

    /// `<class name> (manufacturer=…, model=…, serial=…, revision=…)`
    pub fn describe(&self) -> String {
        format!(
            "{} (manufacturer={}, model={}, serial={}, revision={})",
            self.class.display_name(),
            self.manufacturer,
            self.model,
            self.serial.as_deref().unwrap_or("-"),
            self.revision.as_deref().unwrap_or("-"),
        )
    }

    pub(crate) fn to_asn1(&self) -> Result<ComponentIdentifierV2> {
        let registry = ObjectIdentifier::from_str(&self.class.registry)
            .map_err(|e| CredentialError::Attribute(format!("component class registry: {}", e)))?;
        Ok(ComponentIdentifierV2 {
            component_class: ComponentClassV2 {
                component_class_registry: registry,
                component_class_value: OctetString::new(self.class.value.to_be_bytes().to_vec())?,
            },
            component_manufacturer: self.manufacturer.clone(),
            component_model: self.model.clone(),
            component_serial: self.serial.clone(),
            component_revision: self.revision.clone(),
            component_manufacturer_id: None,
            field_replaceable: self.field_replaceable,
            component_addresses: None,
            status: self.status.map(Into::into),
        })
    }
}

impl TryFrom<ComponentIdentifierV2> for ComponentIdentifier {
    type Error = CredentialError;

    fn try_from(raw: ComponentIdentifierV2) -> Result<Self> {
        let value: [u8; 4] = raw
            .component_class
            .component_class_value
            .as_bytes()
            .try_into()
            .map_err(|_| {
                CredentialError::Attribute("component class value must be 4 bytes".to_string())
            })?;
        Ok(Self {
            class: ComponentClass {
                registry: raw.component_class.component_class_registry.to_string(),
                value: u32::from_be_bytes(value),
            },
            manufacturer: raw.component_manufacturer,
            model: raw.component_model,
            serial: specified_owned(raw.component_serial),
            revision: specified_owned(raw.component_revision),
            field_replaceable: raw.field_replaceable,
            status: raw.status.map(Into::into),
        })
    }
}

/// A name/value platform property.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlatformProperty {
    pub name: String,
    pub value: String,
    pub status: Option<AttributeStatus>,
}

impl From<PropertiesV2> for PlatformProperty {
    fn from(raw: PropertiesV2) -> Self {
        Self {
            name: raw.property_name,
            value: raw.property_value,
            status: raw.status.map(Into::into),
        }
    }
}
