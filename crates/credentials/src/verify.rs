//! Signature verification over credential TBS bytes.

use crate::credential::SignedPortion;
use crate::error::{CredentialError, Result};
use crate::oids;
use rsa::pkcs1v15::{Signature as RsaSignature, VerifyingKey as RsaVerifyingKey};
use spki::DecodePublicKey;
use rsa::RsaPublicKey;
use sha2::{Sha256, Sha384};
use signature::Verifier;

/// Verify `signed` with the issuer's DER `SubjectPublicKeyInfo`.
///
/// Supports RSA PKCS#1 v1.5 with SHA-256/384 and ECDSA P-256/P-384.
pub fn verify_signature(signed: &SignedPortion, issuer_spki_der: &[u8]) -> Result<()> {
    let tbs = signed.tbs.as_slice();
    let sig = signed.signature.as_slice();

    match signed.algorithm {
        oid if oid == oids::SHA256_WITH_RSA => {
            let key = RsaVerifyingKey::<Sha256>::new(rsa_key(issuer_spki_der)?);
            key.verify(tbs, &rsa_signature(sig)?)
                .map_err(|e| CredentialError::SignatureVerification(e.to_string()))
        }
        oid if oid == oids::SHA384_WITH_RSA => {
            let key = RsaVerifyingKey::<Sha384>::new(rsa_key(issuer_spki_der)?);
            key.verify(tbs, &rsa_signature(sig)?)
                .map_err(|e| CredentialError::SignatureVerification(e.to_string()))
        }
        oid if oid == oids::ECDSA_WITH_SHA256 => {
            let key = p256::ecdsa::VerifyingKey::from_public_key_der(issuer_spki_der)
                .map_err(|e| CredentialError::InvalidKey(format!("P-256: {}", e)))?;
            let signature = p256::ecdsa::Signature::from_der(sig)
                .map_err(|e| CredentialError::SignatureVerification(e.to_string()))?;
            key.verify(tbs, &signature)
                .map_err(|e| CredentialError::SignatureVerification(e.to_string()))
        }
        oid if oid == oids::ECDSA_WITH_SHA384 => {
            let key = p384::ecdsa::VerifyingKey::from_public_key_der(issuer_spki_der)
                .map_err(|e| CredentialError::InvalidKey(format!("P-384: {}", e)))?;
            let signature = p384::ecdsa::Signature::from_der(sig)
                .map_err(|e| CredentialError::SignatureVerification(e.to_string()))?;
            key.verify(tbs, &signature)
                .map_err(|e| CredentialError::SignatureVerification(e.to_string()))
        }
        other => Err(CredentialError::UnsupportedAlgorithm(other.to_string())),
    }
}

fn rsa_key(spki_der: &[u8]) -> Result<RsaPublicKey> {
    RsaPublicKey::from_public_key_der(spki_der)
        .map_err(|e| CredentialError::InvalidKey(format!("RSA: {}", e)))
}

fn rsa_signature(bytes: &[u8]) -> Result<RsaSignature> {
    RsaSignature::try_from(bytes)
        .map_err(|e| CredentialError::SignatureVerification(e.to_string()))
}
