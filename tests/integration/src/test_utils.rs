//! Test utilities for end-to-end provisioning tests

use attestca_core::Config;
use attestca_credentials::test_support::{self, TestCa};
use attestca_credentials::{
    pem, ComponentIdentifier, CredentialStore, SqliteCredentialStore,
};
use attestca_crypto::{activate_credential, encode_rsa_public, AuthoritySigner, TpmPublicArea};
use attestca_provisioning::{CertificateIssuer, ProvisioningAuthority, SqliteChallengeStore};
use attestca_structs::{
    CertificateRequestEnvelope, IdentityRequestEnvelope, IdentityResponseEnvelope, StructCodec,
};
use attestca_validation::{SqliteSummaryStore, StaticPcrBaselines};
use rsa::traits::PublicKeyParts;
use rsa::{RsaPrivateKey, RsaPublicKey};
use std::path::PathBuf;
use std::sync::Arc;
use tempfile::TempDir;

/// Object attributes of a restricted signing key (fixedTPM, fixedParent,
/// sensitiveDataOrigin, userWithAuth, restricted, sign).
pub const AK_ATTRIBUTES: u32 = 0x0005_0072;

/// Route authority logs to the test harness; safe to call from every test.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

/// Concatenate DER attribute certificates into a PEM bundle.
pub fn pem_bundle(platforms: &[Vec<u8>]) -> Vec<u8> {
    platforms
        .iter()
        .map(|der| pem::encode(pem::ATTRIBUTE_CERTIFICATE_LABEL, der))
        .collect::<String>()
        .into_bytes()
}

/// A TPM-equipped device: EK and AK keys, its endorsement credential and
/// the inventory it reports.
pub struct TestDevice {
    ek: RsaPrivateKey,
    ak: RsaPrivateKey,
    pub ec_der: Vec<u8>,
    pub components: Vec<ComponentIdentifier>,
}

impl TestDevice {
    pub fn new(manufacturer: &TestCa, serial: u32) -> Self {
        Self::with_ek(manufacturer, test_support::ek_private_key(), serial)
    }

    pub fn with_ek(manufacturer: &TestCa, ek: RsaPrivateKey, serial: u32) -> Self {
        let ec_der = manufacturer.issue_endorsement(&RsaPublicKey::from(&ek), serial);
        Self {
            ek,
            ak: test_support::ak_private_key(),
            ec_der,
            components: default_inventory(),
        }
    }

    pub fn with_components(mut self, components: Vec<ComponentIdentifier>) -> Self {
        self.components = components;
        self
    }

    pub fn ak_public(&self) -> RsaPublicKey {
        RsaPublicKey::from(&self.ak)
    }

    pub fn ak_public_area(&self) -> Vec<u8> {
        encode_rsa_public(&self.ak_public().n().to_bytes_be(), AK_ATTRIBUTES)
    }

    pub fn ek_modulus(&self) -> Vec<u8> {
        RsaPublicKey::from(&self.ek).n().to_bytes_be()
    }

    pub fn identity_claim(&self, codec: &StructCodec) -> Vec<u8> {
        codec
            .encode(&IdentityRequestEnvelope {
                request: self.ak_public_area(),
                endorsement_credential_modulus: self.ek_modulus(),
                endorsement_credential: self.ec_der.clone(),
                device_info_report: test_support::device_report(&self.components)
                    .to_json()
                    .unwrap(),
            })
            .unwrap()
    }

    /// Recover the nonce from a phase 1 response, as TPM2_ActivateCredential would.
    pub fn activate(&self, codec: &StructCodec, response: &[u8]) -> Vec<u8> {
        let response: IdentityResponseEnvelope = codec.decode(response).unwrap();
        let ak_name = TpmPublicArea::parse(&self.ak_public_area())
            .unwrap()
            .name()
            .unwrap();
        activate_credential(
            &self.ek,
            &ak_name,
            &response.symmetric_attestation.credential,
            &response.asymmetric_contents,
        )
        .unwrap()
        .to_vec()
    }

    pub fn certificate_request(
        &self,
        codec: &StructCodec,
        nonce: &[u8],
        platforms: &[Vec<u8>],
    ) -> Vec<u8> {
        codec
            .encode(&CertificateRequestEnvelope {
                nonce: nonce.to_vec(),
                quote: Vec::new(),
                platform_credentials: pem_bundle(platforms),
            })
            .unwrap()
    }
}

pub fn default_inventory() -> Vec<ComponentIdentifier> {
    vec![
        test_support::bios("Acme", "X1"),
        test_support::nic("Intel", "I210", "00:11:22:33:44:55"),
    ]
}

/// An authority backed by SQLite stores in a temporary directory, trusting
/// a single manufacturer root.
pub struct TestAuthority {
    pub manufacturer: TestCa,
    pub authority_ca: TestCa,
    pub credentials: Arc<SqliteCredentialStore>,
    pub challenges: Arc<SqliteChallengeStore>,
    pub summaries: Arc<SqliteSummaryStore>,
    pub authority: Arc<ProvisioningAuthority>,
    pub codec: StructCodec,
    pub db_path: PathBuf,
    _dir: TempDir,
}

impl TestAuthority {
    pub fn new() -> Self {
        Self::with_config(Config::default_config())
    }

    pub fn with_config(config: Config) -> Self {
        init_tracing();
        let dir = tempfile::tempdir().unwrap();
        let db_path = dir.path().join("attestca.db");

        let manufacturer = TestCa::root("TPM Manufacturer Root");
        let authority_ca = TestCa::root("Attestation CA");
        let credentials = Arc::new(SqliteCredentialStore::open(&db_path).unwrap());
        credentials.save(manufacturer.credential()).unwrap();
        let challenges = Arc::new(SqliteChallengeStore::open(&db_path).unwrap());
        let summaries = Arc::new(SqliteSummaryStore::open(&db_path).unwrap());

        let authority = ProvisioningAuthority::new(
            &config,
            StructCodec::provisioning().unwrap(),
            credentials.clone(),
            challenges.clone(),
            summaries.clone(),
            issuer_for(&authority_ca),
            Arc::new(StaticPcrBaselines::new()),
        );

        Self {
            manufacturer,
            authority_ca,
            credentials,
            challenges,
            summaries,
            authority: Arc::new(authority),
            codec: StructCodec::provisioning().unwrap(),
            db_path,
            _dir: dir,
        }
    }

    /// Another authority process sharing this one's database and key.
    pub fn second_instance(&self, config: &Config) -> ProvisioningAuthority {
        ProvisioningAuthority::new(
            config,
            StructCodec::provisioning().unwrap(),
            Arc::new(SqliteCredentialStore::open(&self.db_path).unwrap()),
            Arc::new(SqliteChallengeStore::open(&self.db_path).unwrap()),
            Arc::new(SqliteSummaryStore::open(&self.db_path).unwrap()),
            issuer_for(&self.authority_ca),
            Arc::new(StaticPcrBaselines::new()),
        )
    }

    /// Base platform credential for `device` declaring its inventory.
    pub fn base_platform(&self, device: &TestDevice, serial: u32) -> Vec<u8> {
        self.manufacturer.issue_platform(
            &test_support::PlatformSpec::base(&device.ec_der, serial)
                .with_components(device.components.clone()),
        )
    }

    /// Run phase 1 for `device` and return the recovered nonce.
    pub fn challenge(&self, device: &TestDevice) -> Vec<u8> {
        let response = self
            .authority
            .process_identity_claim(&device.identity_claim(&self.codec))
            .unwrap();
        device.activate(&self.codec, &response)
    }
}

impl Default for TestAuthority {
    fn default() -> Self {
        Self::new()
    }
}

fn issuer_for(ca: &TestCa) -> CertificateIssuer {
    let signer = AuthoritySigner::from_pkcs8_pem(&ca.private_key_pem()).unwrap();
    CertificateIssuer::new(signer, ca.certificate_pem().as_bytes()).unwrap()
}
