//! Reference PCR values for firmware validation.

use crate::error::Result;
use attestca_credentials::HardwareInfo;
use std::collections::BTreeMap;

/// PCR index to expected digest.
pub type PcrBaseline = BTreeMap<u8, Vec<u8>>;

/// Source of expected PCR digests for a platform, typically derived from
/// reference integrity manifests or event logs outside this crate.
pub trait PcrBaselineSource: Send + Sync {
    /// `Ok(None)` when no baseline is known for the platform.
    fn baseline(&self, hardware: &HardwareInfo) -> Result<Option<PcrBaseline>>;
}

/// Baselines keyed by (manufacturer, product name), compared
/// case-insensitively.
#[derive(Debug, Default, Clone)]
pub struct StaticPcrBaselines {
    entries: Vec<(String, String, PcrBaseline)>,
}

impl StaticPcrBaselines {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_baseline(
        mut self,
        manufacturer: impl Into<String>,
        product_name: impl Into<String>,
        baseline: PcrBaseline,
    ) -> Self {
        self.entries
            .push((manufacturer.into(), product_name.into(), baseline));
        self
    }
}

impl PcrBaselineSource for StaticPcrBaselines {
    fn baseline(&self, hardware: &HardwareInfo) -> Result<Option<PcrBaseline>> {
        Ok(self
            .entries
            .iter()
            .find(|(manufacturer, product, _)| {
                manufacturer.eq_ignore_ascii_case(hardware.manufacturer.trim())
                    && product.eq_ignore_ascii_case(hardware.product_name.trim())
            })
            .map(|(_, _, baseline)| baseline.clone()))
    }
}
