//! Certificate path building against the trust store.

use crate::error::Result;
use attestca_credentials::{
    verify_signature, CaCredential, CredentialInfo, CredentialKind, CredentialSelector,
    CredentialStore,
};
use tracing::debug;

/// Longest issuer path followed before giving up.
pub const MAX_CHAIN_DEPTH: usize = 10;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChainVerdict {
    /// Path ends at a self-signed CA in the store
    Trusted { anchor: String, depth: usize },
    /// No valid path; the reason names the first break
    Untrusted(String),
}

/// Build a path from `leaf` to a self-signed trust anchor.
///
/// Issuers are CA credentials whose subject equals the current issuer
/// name; when the current credential names an authority key identifier,
/// issuers with a matching SKI are preferred. Every issuer must be a CA,
/// valid at `now`, and verify the signature of the credential below it.
/// Store failures are returned as errors, not verdicts.
pub fn verify_chain(
    leaf: &CredentialInfo,
    store: &dyn CredentialStore,
    now: u64,
) -> Result<ChainVerdict> {
    let mut current = leaf.clone();

    for depth in 1..=MAX_CHAIN_DEPTH {
        let selector = CredentialSelector::of_kind(CredentialKind::CertificateAuthority)
            .with_subject(&current.issuer);
        let mut candidates: Vec<CaCredential> = store
            .find(&selector)?
            .into_iter()
            .filter_map(|c| c.as_certificate_authority().cloned())
            .collect();

        if candidates.is_empty() {
            return Ok(ChainVerdict::Untrusted(format!(
                "no trusted issuer named {}",
                current.issuer
            )));
        }
        if let Some(aki) = &current.authority_key_id {
            if candidates
                .iter()
                .any(|ca| ca.info.subject_key_id.as_ref() == Some(aki))
            {
                candidates.retain(|ca| ca.info.subject_key_id.as_ref() == Some(aki));
            }
        }

        let mut last_reason = String::new();
        let mut issuer = None;
        for candidate in candidates {
            if !candidate.is_ca {
                last_reason = format!(
                    "issuer {} ({}) is not a CA",
                    current.issuer,
                    candidate.info.serial_hex()
                );
                continue;
            }
            if !candidate.info.is_valid_at(now) {
                last_reason = format!(
                    "issuer certificate {} is outside its validity period",
                    candidate.info.serial_hex()
                );
                continue;
            }
            match verify_signature(&current.signed, &candidate.public_key_der) {
                Ok(()) => {
                    issuer = Some(candidate);
                    break;
                }
                Err(e) => {
                    debug!(serial = %candidate.info.serial_hex(), error = %e, "Issuer candidate rejected");
                    last_reason = format!("signature by {} did not verify: {}", current.issuer, e);
                }
            }
        }

        let Some(issuer) = issuer else {
            return Ok(ChainVerdict::Untrusted(last_reason));
        };

        if issuer.info.is_self_issued() {
            if let Err(e) = verify_signature(&issuer.info.signed, &issuer.public_key_der) {
                return Ok(ChainVerdict::Untrusted(format!(
                    "trust anchor self-signature did not verify: {}",
                    e
                )));
            }
            let anchor = issuer
                .info
                .subject
                .as_ref()
                .map(|name| name.to_string())
                .unwrap_or_default();
            return Ok(ChainVerdict::Trusted { anchor, depth });
        }
        current = issuer.info;
    }

    Ok(ChainVerdict::Untrusted(format!(
        "no trust anchor within {} issuers",
        MAX_CHAIN_DEPTH
    )))
}
