use anyhow::Context;
use attestca_core::Config;
use attestca_credentials::{CredentialStore, InMemoryCredentialStore, SqliteCredentialStore};
use attestca_provisioning::{
    CertificateIssuer, ChallengeStateStore, InMemoryChallengeStore, ProvisioningAuthority,
    SqliteChallengeStore,
};
use attestca_structs::StructCodec;
use crate::seed;
use attestca_validation::{InMemorySummaryStore, SqliteSummaryStore, StaticPcrBaselines, SummaryStore};
use std::sync::Arc;
use tracing::{info, warn};

pub struct AppState {
    pub authority: Arc<ProvisioningAuthority>,
    pub max_body_bytes: usize,
}

impl AppState {
    pub fn new(authority: ProvisioningAuthority, max_body_bytes: usize) -> Self {
        AppState {
            authority: Arc::new(authority),
            max_body_bytes,
        }
    }

    /// Load the authority key and open the stores named by `config`.
    pub fn from_config(config: &Config) -> anyhow::Result<Self> {
        let issuer = CertificateIssuer::from_files(
            &config.authority.certificate_path,
            &config.authority.private_key_path,
        )
        .context("loading authority certificate")?;

        let (credentials, challenges, summaries): (
            Arc<dyn CredentialStore>,
            Arc<dyn ChallengeStateStore>,
            Arc<dyn SummaryStore>,
        ) = match &config.storage.database_path {
            Some(path) => {
                info!(path = %path.display(), "Using SQLite stores");
                (
                    Arc::new(SqliteCredentialStore::open(path).context("credential store")?),
                    Arc::new(SqliteChallengeStore::open(path).context("challenge store")?),
                    Arc::new(SqliteSummaryStore::open(path).context("summary store")?),
                )
            }
            None => {
                warn!("No database_path configured; challenges and summaries are lost on restart");
                (
                    Arc::new(InMemoryCredentialStore::new()),
                    Arc::new(InMemoryChallengeStore::new()),
                    Arc::new(InMemorySummaryStore::new()),
                )
            }
        };

        if let Some(path) = &config.storage.trust_bundle_path {
            seed::load_trust_bundle(path, credentials.as_ref())?;
        }
        let baselines = match &config.storage.pcr_baselines_path {
            Some(path) => seed::load_pcr_baselines(path)?,
            None => StaticPcrBaselines::new(),
        };

        let authority = ProvisioningAuthority::new(
            config,
            StructCodec::provisioning().context("building wire schema")?,
            credentials,
            challenges,
            summaries,
            issuer,
            Arc::new(baselines),
        );
        Ok(AppState::new(authority, config.server.max_body_bytes))
    }
}
