//! Supply-chain validation policy.

use attestca_core::PolicyConfig;
use serde::{Deserialize, Serialize};

/// Which check families run and how tolerant they are.
///
/// A disabled family contributes no results to a summary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SupplyChainPolicy {
    pub ec_validation: bool,
    pub pc_validation: bool,
    pub pc_attribute_validation: bool,
    pub firmware_validation: bool,
    /// Expired credentials pass with a warning instead of failing
    pub accept_expired_credentials: bool,
    /// A missing platform credential fails instead of being skipped
    pub require_platform_credential: bool,
    pub ignore_revision_attribute: bool,
}

impl Default for SupplyChainPolicy {
    fn default() -> Self {
        Self::from(&PolicyConfig::default())
    }
}

impl From<&PolicyConfig> for SupplyChainPolicy {
    fn from(config: &PolicyConfig) -> Self {
        Self {
            ec_validation: config.ec_validation,
            pc_validation: config.pc_validation,
            pc_attribute_validation: config.pc_attribute_validation,
            firmware_validation: config.firmware_validation,
            accept_expired_credentials: config.accept_expired_credentials,
            require_platform_credential: config.require_platform_credential,
            ignore_revision_attribute: config.ignore_revision_attribute,
        }
    }
}
