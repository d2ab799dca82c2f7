//! Two-phase TPM provisioning.
//!
//! Phase 1 validates the device's identity claim and answers with a
//! MakeCredential challenge wrapping a fresh nonce. Only the TPM holding
//! the endorsement key and the attestation key can recover the nonce. Phase
//! 2 presents the nonce back, runs the full supply-chain validation and, on
//! success, issues an identity certificate for the attestation key.

use crate::challenge::{ChallengeState, ChallengeStateStore};
use crate::error::{ChallengeStoreError, ProvisioningError, Result};
use crate::issuer::{CertificateIssuer, IdentityAttributes};
use crate::session::ProvisioningSession;
use attestca_core::{current_timestamp, Config};
use attestca_credentials::{
    pem, CredentialKind, CredentialSelector, CredentialStore, DeviceInfoReport,
    EndorsementCredential, PlatformCredential,
};
use attestca_crypto::{make_credential, CryptoError, Nonce, TpmPublicArea};
use rsa::RsaPublicKey;
use attestca_structs::{
    CertificateRequestEnvelope, CertificateResponseEnvelope, IdentityRequestEnvelope,
    IdentityResponseEnvelope, StructCodec, SymmetricAttestation, SymmetricKeyParams,
};
use attestca_validation::{
    AppraisalStatus, EndorsementInput, PcrBaselineSource, SummaryStore, SupplyChainPolicy,
    SupplyChainValidator, UnparsedCredential, ValidationSummary,
};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Byte length of an RSA-2048 endorsement key modulus.
pub const EK_MODULUS_LENGTH: usize = 256;

/// Attempts at finding an unused nonce lookup key.
const NONCE_ATTEMPTS: usize = 3;

/// Everything recovered from a phase 1 request.
struct IdentityClaim {
    ak_key: RsaPublicKey,
    ak_name: Vec<u8>,
    ek_modulus: Vec<u8>,
    ec: Option<EndorsementCredential>,
    /// Presented endorsement credential bytes that did not parse.
    unparsed_ec: Option<UnparsedCredential>,
    device: DeviceInfoReport,
}

impl IdentityClaim {
    fn endorsement(&self) -> EndorsementInput<'_> {
        match (&self.ec, &self.unparsed_ec) {
            (Some(ec), _) => EndorsementInput::Parsed(ec),
            (None, Some(unparsed)) => EndorsementInput::Unparsed(unparsed),
            (None, None) => EndorsementInput::Absent,
        }
    }
}

pub struct ProvisioningAuthority {
    codec: StructCodec,
    credentials: Arc<dyn CredentialStore>,
    challenges: Arc<dyn ChallengeStateStore>,
    summaries: Arc<dyn SummaryStore>,
    issuer: CertificateIssuer,
    validator: SupplyChainValidator,
    nonce_length: usize,
    validity_days: u32,
    challenge_ttl_ms: u64,
}

impl ProvisioningAuthority {
    pub fn new(
        config: &Config,
        codec: StructCodec,
        credential_store: Arc<dyn CredentialStore>,
        challenge_store: Arc<dyn ChallengeStateStore>,
        summary_store: Arc<dyn SummaryStore>,
        signer: CertificateIssuer,
        pcr_baselines: Arc<dyn PcrBaselineSource>,
    ) -> Self {
        let validator = SupplyChainValidator::new(
            SupplyChainPolicy::from(&config.policy),
            credential_store.clone(),
            pcr_baselines,
        );
        Self {
            codec,
            credentials: credential_store,
            challenges: challenge_store,
            summaries: summary_store,
            issuer: signer,
            validator,
            nonce_length: config.authority.nonce_length,
            validity_days: config.authority.validity_days,
            challenge_ttl_ms: config.authority.challenge_ttl_secs.saturating_mul(1000),
        }
    }

    pub fn issuer(&self) -> &CertificateIssuer {
        &self.issuer
    }

    /// Phase 1: validate the identity claim and issue a challenge.
    pub fn process_identity_claim(&self, request: &[u8]) -> Result<Vec<u8>> {
        let mut session = ProvisioningSession::new();
        match self.identity_claim(request, &mut session) {
            Ok(response) => Ok(response),
            Err(err) => Err(self.rejected(&mut session, err)),
        }
    }

    /// Phase 2: redeem a nonce for an identity certificate.
    pub fn process_certificate_request(&self, request: &[u8]) -> Result<Vec<u8>> {
        let envelope: CertificateRequestEnvelope = self.codec.decode(request)?;
        let nonce = Nonce::from_bytes(&envelope.nonce)
            .map_err(|e| ProvisioningError::Malformed(e.to_string()))?;
        let nonce_key = nonce.lookup_key();

        let state = match self.consume_challenge(&nonce) {
            Ok(state) => state,
            Err(err) => {
                let mut session = ProvisioningSession::new();
                return Err(self.rejected(&mut session, err));
            }
        };

        let mut session = ProvisioningSession::resume(nonce_key, state.created_at);
        match self.certificate_request(&envelope, &state, &mut session) {
            Ok(response) => Ok(response),
            Err(err) => Err(self.rejected(&mut session, err)),
        }
    }

    /// Remove challenges older than the configured TTL.
    pub fn sweep_expired_challenges(&self) -> Result<usize> {
        let cutoff = current_timestamp().saturating_sub(self.challenge_ttl_ms);
        let purged = self.challenges.purge_older_than(cutoff)?;
        if purged > 0 {
            info!(purged, "Swept expired challenges");
        }
        Ok(purged)
    }

    fn rejected(&self, session: &mut ProvisioningSession, err: ProvisioningError) -> ProvisioningError {
        if let Err(transition) = session.reject(&err.to_string()) {
            debug!(error = %transition, "Session already terminal");
        }
        if err.is_client_error() {
            info!(
                kind = ?err.kind(),
                transition = ?session.last_transition_hash(),
                error = %err,
                "Provisioning request rejected"
            );
        } else {
            error!(
                kind = ?err.kind(),
                transition = ?session.last_transition_hash(),
                error = %err,
                "Provisioning request failed"
            );
        }
        err
    }

    fn identity_claim(
        &self,
        request: &[u8],
        session: &mut ProvisioningSession,
    ) -> Result<Vec<u8>> {
        let claim = self.parse_claim(request)?;

        let summary = self
            .validator
            .validate_presented_endorsement(claim.endorsement(), &claim.device);
        self.record(&summary)?;

        let (nonce, challenge) = self.issue_challenge(&claim, request)?;
        session.on_challenge_issued(nonce.lookup_key())?;
        info!(
            nonce_key = %format!("{:#018x}", nonce.lookup_key()),
            device = %claim.device.device_name(),
            summary_id = %summary.id,
            "Issued provisioning challenge"
        );

        let response = IdentityResponseEnvelope {
            asymmetric_contents: challenge.encrypted_seed,
            symmetric_attestation: SymmetricAttestation {
                algorithm: SymmetricKeyParams::aes128_cfb(),
                credential: challenge.credential_blob,
            },
        };
        Ok(self.codec.encode(&response)?)
    }

    fn issue_challenge(
        &self,
        claim: &IdentityClaim,
        request: &[u8],
    ) -> Result<(Nonce, attestca_crypto::ActivationChallenge)> {
        for _ in 0..NONCE_ATTEMPTS {
            let nonce = Nonce::generate(self.nonce_length)
                .map_err(|e| ProvisioningError::Internal(e.to_string()))?;
            let challenge = make_credential(&claim.ek_modulus, &claim.ak_name, nonce.as_bytes())
                .map_err(|e| match e {
                    CryptoError::InvalidKey(msg) => ProvisioningError::Malformed(msg),
                    other => ProvisioningError::Internal(other.to_string()),
                })?;

            let state = ChallengeState {
                nonce_key: nonce.lookup_key(),
                nonce: nonce.as_bytes().to_vec(),
                identity_claim: request.to_vec(),
                created_at: current_timestamp(),
            };
            match self.challenges.put(state) {
                Ok(()) => return Ok((nonce, challenge)),
                Err(ChallengeStoreError::KeyInUse(key)) => {
                    warn!(nonce_key = %format!("{:#018x}", key), "Nonce lookup key in use, regenerating");
                }
                Err(e) => return Err(e.into()),
            }
        }
        Err(ProvisioningError::Internal(
            "no free nonce lookup key".to_string(),
        ))
    }

    /// Look up and remove the challenge for `nonce`.
    ///
    /// A state whose stored nonce differs from the presented one belongs
    /// to another client and is left untouched.
    fn consume_challenge(&self, nonce: &Nonce) -> Result<ChallengeState> {
        let key = nonce.lookup_key();
        let key_hex = format!("{:#018x}", key);

        let Some(stored) = self.challenges.get(key)? else {
            warn!(security_event = true, nonce_key = %key_hex, "Unknown or replayed nonce");
            return Err(ProvisioningError::ProtocolState(
                "no outstanding challenge for nonce".to_string(),
            ));
        };
        if !nonce.matches(&stored.nonce) {
            warn!(security_event = true, nonce_key = %key_hex, "Nonce prefix matches a different challenge");
            return Err(ProvisioningError::ProtocolState(
                "nonce does not match the outstanding challenge".to_string(),
            ));
        }

        let Some(state) = self.challenges.delete(key)? else {
            warn!(security_event = true, nonce_key = %key_hex, "Nonce consumed by a concurrent request");
            return Err(ProvisioningError::ProtocolState(
                "challenge already consumed".to_string(),
            ));
        };
        if !nonce.matches(&state.nonce) {
            // Replaced between get and delete; restore the other client's state
            self.challenges.put(state)?;
            return Err(ProvisioningError::ProtocolState(
                "nonce does not match the outstanding challenge".to_string(),
            ));
        }

        let age = current_timestamp().saturating_sub(state.created_at);
        if age > self.challenge_ttl_ms {
            info!(nonce_key = %key_hex, age_ms = age, "Expired challenge presented");
            return Err(ProvisioningError::ProtocolState("challenge expired".to_string()));
        }
        Ok(state)
    }

    fn certificate_request(
        &self,
        envelope: &CertificateRequestEnvelope,
        state: &ChallengeState,
        session: &mut ProvisioningSession,
    ) -> Result<Vec<u8>> {
        let claim = self.parse_claim(&state.identity_claim).map_err(|e| {
            ProvisioningError::Internal(format!("stored identity claim unreadable: {}", e))
        })?;
        if !envelope.quote.is_empty() {
            debug!(quote_len = envelope.quote.len(), "Quote presented with certificate request");
        }

        let (platforms, unparsed) =
            self.platform_credentials(&envelope.platform_credentials, claim.ec.as_ref())?;
        let summary = self.validator.validate_presented(
            claim.endorsement(),
            &platforms,
            &unparsed,
            &claim.device,
        );
        self.record(&summary)?;

        let base = platforms.iter().find(|pc| !pc.is_delta());
        let attributes = IdentityAttributes::from_credentials(claim.ec.as_ref(), base);
        let issued = self
            .issuer
            .issue(&claim.ak_key, &attributes, self.validity_days)?;

        session.on_certificate_issued(issued.serial_hex.clone())?;
        info!(
            serial = %issued.serial_hex,
            device = %claim.device.device_name(),
            summary_id = %summary.id,
            transition = ?session.last_transition_hash(),
            "Issued identity certificate"
        );

        let response = CertificateResponseEnvelope {
            certificate: issued.der,
        };
        Ok(self.codec.encode(&response)?)
    }

    fn parse_claim(&self, request: &[u8]) -> Result<IdentityClaim> {
        let envelope: IdentityRequestEnvelope = self.codec.decode(request)?;

        let ak = TpmPublicArea::parse(&envelope.request)
            .map_err(|e| ProvisioningError::Malformed(format!("attestation key: {}", e)))?;
        let ak_name = ak
            .name()
            .map_err(|e| ProvisioningError::Malformed(format!("attestation key: {}", e)))?;
        let ak_key = ak
            .rsa_public_key()
            .map_err(|e| ProvisioningError::Malformed(format!("attestation key: {}", e)))?;

        let ek_modulus = envelope.endorsement_credential_modulus;
        if ek_modulus.len() != EK_MODULUS_LENGTH {
            return Err(ProvisioningError::Malformed(format!(
                "endorsement key modulus is {} bytes, expected {}",
                ek_modulus.len(),
                EK_MODULUS_LENGTH
            )));
        }

        let device = DeviceInfoReport::from_json(&envelope.device_info_report)
            .map_err(|e| ProvisioningError::Malformed(e.to_string()))?;

        let mut unparsed_ec = None;
        let ec = if envelope.endorsement_credential.is_empty() {
            self.uploaded_endorsement(&ek_modulus)?
        } else {
            match EndorsementCredential::from_der(&envelope.endorsement_credential) {
                Ok(ec) if ec.has_modulus(&ek_modulus) => Some(ec),
                Ok(_) => {
                    return Err(ProvisioningError::Malformed(
                        "endorsement credential does not certify the presented endorsement key"
                            .to_string(),
                    ))
                }
                // Judged by the validator so the device gets a summary
                Err(e) => {
                    unparsed_ec = Some(UnparsedCredential::new(envelope.endorsement_credential, e));
                    None
                }
            }
        };

        Ok(IdentityClaim {
            ak_key,
            ak_name,
            ek_modulus,
            ec,
            unparsed_ec,
            device,
        })
    }

    fn uploaded_endorsement(&self, ek_modulus: &[u8]) -> Result<Option<EndorsementCredential>> {
        let selector =
            CredentialSelector::of_kind(CredentialKind::Endorsement).with_ek_modulus(ek_modulus);
        let found = self
            .credentials
            .find(&selector)
            .map_err(|e| ProvisioningError::Internal(e.to_string()))?;
        Ok(found.into_iter().find_map(|c| c.as_endorsement().cloned()))
    }

    /// Presented platform credentials followed by those on file for the EC,
    /// and the presented ones that did not parse.
    fn platform_credentials(
        &self,
        bundle: &[u8],
        ec: Option<&EndorsementCredential>,
    ) -> Result<(Vec<PlatformCredential>, Vec<UnparsedCredential>)> {
        let mut platforms = Vec::new();
        let mut unparsed = Vec::new();
        if !bundle.is_empty() {
            let text = std::str::from_utf8(bundle).map_err(|_| {
                ProvisioningError::Malformed("platform credential bundle is not PEM".to_string())
            })?;
            for der in pem::parse_labelled(text, pem::ATTRIBUTE_CERTIFICATE_LABEL)
                .map_err(|e| ProvisioningError::Malformed(e.to_string()))?
            {
                match PlatformCredential::from_der(&der) {
                    Ok(pc) => platforms.push(pc),
                    Err(e) => unparsed.push(UnparsedCredential::new(der, e)),
                }
            }
        }

        if let Some(ec) = ec {
            let selector = CredentialSelector::of_kind(CredentialKind::Platform)
                .with_holder_serial(&ec.info.serial);
            let stored = self
                .credentials
                .find(&selector)
                .map_err(|e| ProvisioningError::Internal(e.to_string()))?;
            platforms.extend(stored.iter().filter_map(|c| c.as_platform().cloned()));
        }
        Ok((platforms, unparsed))
    }

    /// Persist the summary and turn its verdict into a result.
    fn record(&self, summary: &ValidationSummary) -> Result<()> {
        self.summaries
            .save(summary)
            .map_err(|e| ProvisioningError::Internal(format!("saving validation summary: {}", e)))?;

        if let Some(event) = summary.security_events().next() {
            error!(
                security_event = true,
                summary_id = %summary.id,
                device = %summary.device,
                event = %event,
                "Supply-chain security violation"
            );
            return Err(ProvisioningError::SecurityViolation {
                summary_id: summary.id,
                detail: event.to_string(),
            });
        }
        match summary.overall_status() {
            AppraisalStatus::Error => Err(ProvisioningError::ValidationError {
                summary_id: summary.id,
            }),
            AppraisalStatus::Fail => Err(ProvisioningError::ValidationFailed {
                summary_id: summary.id,
                failed: summary.failure_messages(),
            }),
            _ => Ok(()),
        }
    }
}
