//! Device inventory submitted with an identity claim.
//!
//! The report travels as UTF-8 JSON. Every sub-report is required: a
//! missing or `null` section fails deserialization instead of producing an
//! empty value.

use crate::component::{specified, ComponentClass, ComponentIdentifier};
use crate::error::{CredentialError, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceInfoReport {
    pub network: NetworkInfo,
    pub os: OsInfo,
    pub firmware: FirmwareInfo,
    pub hardware: HardwareInfo,
    pub tpm: TpmInfo,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_version: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkInfo {
    pub hostname: String,
    #[serde(default)]
    pub ip_address: Option<String>,
    #[serde(default)]
    pub mac_address: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OsInfo {
    pub name: String,
    pub version: String,
    #[serde(default)]
    pub architecture: Option<String>,
    #[serde(default)]
    pub distribution: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FirmwareInfo {
    pub bios_vendor: String,
    pub bios_version: String,
    #[serde(default)]
    pub bios_release_date: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HardwareInfo {
    pub manufacturer: String,
    pub product_name: String,
    #[serde(default)]
    pub version: Option<String>,
    #[serde(default)]
    pub system_serial: Option<String>,
    #[serde(default)]
    pub chassis_serial: Option<String>,
    #[serde(default)]
    pub baseboard_serial: Option<String>,
    #[serde(default)]
    pub components: Vec<ComponentInfo>,
}

impl HardwareInfo {
    /// System, chassis and baseboard serials that carry a real value.
    pub fn serials(&self) -> Vec<&str> {
        [
            &self.system_serial,
            &self.chassis_serial,
            &self.baseboard_serial,
        ]
        .into_iter()
        .filter_map(|serial| serial.as_deref().and_then(specified))
        .collect()
    }
}

/// A component the client collected from the running platform.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComponentInfo {
    pub class: ComponentClass,
    pub manufacturer: String,
    pub model: String,
    #[serde(default)]
    pub serial: Option<String>,
    #[serde(default)]
    pub revision: Option<String>,
}

impl ComponentInfo {
    pub fn serial(&self) -> Option<&str> {
        self.serial.as_deref().and_then(specified)
    }

    pub fn revision(&self) -> Option<&str> {
        self.revision.as_deref().and_then(specified)
    }
}

impl From<&ComponentIdentifier> for ComponentInfo {
    fn from(component: &ComponentIdentifier) -> Self {
        Self {
            class: component.class.clone(),
            manufacturer: component.manufacturer.clone(),
            model: component.model.clone(),
            serial: component.serial.clone(),
            revision: component.revision.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TpmInfo {
    pub make: String,
    pub version_major: u8,
    pub version_minor: u8,
    #[serde(default)]
    pub revision_major: u8,
    #[serde(default)]
    pub revision_minor: u8,
    /// SHA-256 PCR bank, lowercase hex per index
    #[serde(default)]
    pub pcr_values: BTreeMap<u8, String>,
    /// Hex TPMS_ATTEST the client quoted over the PCRs
    #[serde(default)]
    pub quote: Option<String>,
}

impl TpmInfo {
    pub fn pcr(&self, index: u8) -> Result<Option<Vec<u8>>> {
        self.pcr_values
            .get(&index)
            .map(|value| {
                hex::decode(value).map_err(|e| {
                    CredentialError::DeviceReport(format!("PCR {} is not hex: {}", index, e))
                })
            })
            .transpose()
    }
}

impl DeviceInfoReport {
    pub fn from_json(bytes: &[u8]) -> Result<Self> {
        serde_json::from_slice(bytes).map_err(|e| CredentialError::DeviceReport(e.to_string()))
    }

    pub fn to_json(&self) -> Result<Vec<u8>> {
        serde_json::to_vec(self).map_err(|e| CredentialError::DeviceReport(e.to_string()))
    }

    /// Name a validation summary is filed under.
    pub fn device_name(&self) -> &str {
        &self.network.hostname
    }
}
