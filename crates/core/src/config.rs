//! Configuration management for the attestation authority.

use crate::error::{CoreError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Smallest nonce accepted; the first 8 bytes double as the lookup key.
pub const MIN_NONCE_LENGTH: usize = 8;

/// Largest nonce that fits a TPM2 credential secret (one SHA-256 digest).
pub const MAX_NONCE_LENGTH: usize = 32;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    pub authority: AuthorityConfig,
    #[serde(default)]
    pub policy: PolicyConfig,
    #[serde(default)]
    pub storage: StorageConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_bind_address")]
    pub bind_address: String,
    #[serde(default = "default_max_body_bytes")]
    pub max_body_bytes: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthorityConfig {
    /// PEM or DER certificate of the issuing authority
    pub certificate_path: PathBuf,
    /// PKCS#8 PEM private key matching `certificate_path`
    pub private_key_path: PathBuf,
    #[serde(default = "default_validity_days")]
    pub validity_days: u32,
    #[serde(default = "default_nonce_length")]
    pub nonce_length: usize,
    #[serde(default = "default_challenge_ttl_secs")]
    pub challenge_ttl_secs: u64,
    #[serde(default = "default_sweep_interval_secs")]
    pub sweep_interval_secs: u64,
}

/// Supply chain policy switches.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PolicyConfig {
    pub ec_validation: bool,
    pub pc_validation: bool,
    pub pc_attribute_validation: bool,
    pub firmware_validation: bool,
    pub accept_expired_credentials: bool,
    pub require_platform_credential: bool,
    pub ignore_revision_attribute: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StorageConfig {
    /// SQLite database; in-memory stores are used when unset
    pub database_path: Option<PathBuf>,
    /// PEM bundle of trusted CA certificates saved at startup
    pub trust_bundle_path: Option<PathBuf>,
    /// TOML file of reference PCR values for firmware validation
    pub pcr_baselines_path: Option<PathBuf>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: default_bind_address(),
            max_body_bytes: default_max_body_bytes(),
        }
    }
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self {
            ec_validation: true,
            pc_validation: true,
            pc_attribute_validation: true,
            firmware_validation: false,
            accept_expired_credentials: false,
            require_platform_credential: false,
            ignore_revision_attribute: false,
        }
    }
}

fn default_bind_address() -> String {
    "0.0.0.0:8443".to_string()
}

fn default_max_body_bytes() -> usize {
    1024 * 1024
}

fn default_validity_days() -> u32 {
    3650
}

fn default_nonce_length() -> usize {
    20
}

fn default_challenge_ttl_secs() -> u64 {
    3600
}

fn default_sweep_interval_secs() -> u64 {
    300
}

impl Config {
    #[cfg(feature = "toml")]
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    #[cfg(feature = "toml")]
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: Config =
            toml::from_str(content).map_err(|e| CoreError::ConfigParse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values the authority cannot operate with.
    pub fn validate(&self) -> Result<()> {
        let nonce_length = self.authority.nonce_length;
        if !(MIN_NONCE_LENGTH..=MAX_NONCE_LENGTH).contains(&nonce_length) {
            return Err(CoreError::InvalidConfig(format!(
                "nonce_length {} is outside {}..={}",
                nonce_length, MIN_NONCE_LENGTH, MAX_NONCE_LENGTH
            )));
        }
        if self.authority.validity_days == 0 {
            return Err(CoreError::InvalidConfig(
                "validity_days must be positive".to_string(),
            ));
        }
        if self.authority.challenge_ttl_secs == 0 {
            return Err(CoreError::InvalidConfig(
                "challenge_ttl_secs must be positive".to_string(),
            ));
        }
        if self.policy.firmware_validation && self.storage.pcr_baselines_path.is_none() {
            return Err(CoreError::InvalidConfig(
                "firmware_validation needs storage.pcr_baselines_path".to_string(),
            ));
        }
        Ok(())
    }

    pub fn default_config() -> Self {
        Self {
            server: ServerConfig::default(),
            authority: AuthorityConfig {
                certificate_path: PathBuf::from("/etc/attestca/ca.crt"),
                private_key_path: PathBuf::from("/etc/attestca/ca.key"),
                validity_days: default_validity_days(),
                nonce_length: default_nonce_length(),
                challenge_ttl_secs: default_challenge_ttl_secs(),
                sweep_interval_secs: default_sweep_interval_secs(),
            },
            policy: PolicyConfig::default(),
            storage: StorageConfig::default(),
        }
    }
}
