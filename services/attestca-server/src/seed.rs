//! Startup loading of trust anchors and firmware baselines.

use anyhow::{bail, Context};
use attestca_credentials::{pem, CaCredential, Credential, CredentialStore};
use attestca_validation::{PcrBaseline, StaticPcrBaselines};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::Path;
use tracing::{info, warn};

/// Highest PCR index on a TPM 2.0 PC client platform.
const MAX_PCR_INDEX: u8 = 23;

/// Save every CA certificate in the PEM bundle at `path`.
pub fn load_trust_bundle(path: &Path, store: &dyn CredentialStore) -> anyhow::Result<usize> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("reading trust bundle {}", path.display()))?;
    let saved = seed_trust_store(&text, store)
        .with_context(|| format!("loading trust bundle {}", path.display()))?;
    info!(path = %path.display(), saved, "Seeded trust store");
    Ok(saved)
}

/// Certificates already on file are saved again as no-ops; certificates
/// without the CA flag are skipped since no chain can pass through them.
pub fn seed_trust_store(bundle: &str, store: &dyn CredentialStore) -> anyhow::Result<usize> {
    let mut saved = 0;
    for (index, der) in pem::parse_labelled(bundle, pem::CERTIFICATE_LABEL)?
        .into_iter()
        .enumerate()
    {
        let ca = CaCredential::from_der(&der)
            .with_context(|| format!("certificate #{}", index + 1))?;
        if !ca.is_ca {
            warn!(serial = %ca.info.serial_hex(), "Skipping trust bundle entry without the CA flag");
            continue;
        }
        store
            .save(Credential::CertificateAuthority(ca))
            .with_context(|| format!("saving certificate #{}", index + 1))?;
        saved += 1;
    }
    Ok(saved)
}

#[derive(Debug, Deserialize)]
struct BaselineFile {
    #[serde(default)]
    baseline: Vec<BaselineEntry>,
}

#[derive(Debug, Deserialize)]
struct BaselineEntry {
    manufacturer: String,
    product_name: String,
    /// PCR index to hex digest
    pcrs: BTreeMap<String, String>,
}

pub fn load_pcr_baselines(path: &Path) -> anyhow::Result<StaticPcrBaselines> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("reading PCR baselines {}", path.display()))?;
    let baselines = parse_pcr_baselines(&text)
        .with_context(|| format!("loading PCR baselines {}", path.display()))?;
    info!(path = %path.display(), "Loaded PCR baselines");
    Ok(baselines)
}

/// Parse `[[baseline]]` tables of manufacturer, product name and PCRs.
pub fn parse_pcr_baselines(text: &str) -> anyhow::Result<StaticPcrBaselines> {
    let file: BaselineFile = toml::from_str(text)?;
    let mut baselines = StaticPcrBaselines::new();
    for entry in file.baseline {
        let platform = format!("{} {}", entry.manufacturer, entry.product_name);
        let mut pcrs = PcrBaseline::new();
        for (index, digest) in &entry.pcrs {
            let index: u8 = index
                .trim()
                .parse()
                .with_context(|| format!("{}: PCR index {:?}", platform, index))?;
            if index > MAX_PCR_INDEX {
                bail!("{}: PCR index {} is above {}", platform, index, MAX_PCR_INDEX);
            }
            let digest = hex::decode(digest.trim())
                .with_context(|| format!("{}: PCR {} digest", platform, index))?;
            if digest.is_empty() {
                bail!("{}: PCR {} digest is empty", platform, index);
            }
            pcrs.insert(index, digest);
        }
        if pcrs.is_empty() {
            bail!("{}: baseline lists no PCRs", platform);
        }
        baselines = baselines.with_baseline(entry.manufacturer, entry.product_name, pcrs);
    }
    Ok(baselines)
}
