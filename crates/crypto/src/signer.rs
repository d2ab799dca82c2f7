//! Authority signing key.

use crate::error::{CryptoError, CryptoResult};
use p256::pkcs8::{DecodePrivateKey as _, EncodePublicKey as _};
use rsa::pkcs1v15::SigningKey as RsaSigningKey;
use rsa::RsaPrivateKey;
use sha2::Sha256;
use std::fmt;
use std::path::Path;
use tracing::info;

/// Private key the authority signs identity certificates with.
pub enum AuthoritySigner {
    /// RSA PKCS#1 v1.5 with SHA-256
    Rsa(RsaSigningKey<Sha256>),
    /// ECDSA P-256 with SHA-256
    P256(p256::ecdsa::SigningKey),
}

impl AuthoritySigner {
    /// Load a PKCS#8 PEM key, RSA or P-256.
    pub fn from_pkcs8_pem(pem: &str) -> CryptoResult<Self> {
        if let Ok(key) = RsaPrivateKey::from_pkcs8_pem(pem) {
            return Ok(Self::Rsa(RsaSigningKey::<Sha256>::new(key)));
        }
        p256::ecdsa::SigningKey::from_pkcs8_pem(pem)
            .map(Self::P256)
            .map_err(|e| {
                CryptoError::InvalidKey(format!(
                    "authority key is neither RSA nor P-256 PKCS#8: {}",
                    e
                ))
            })
    }

    pub fn from_file<P: AsRef<Path>>(path: P) -> CryptoResult<Self> {
        let pem = std::fs::read_to_string(path.as_ref()).map_err(|e| {
            CryptoError::InvalidKey(format!("{}: {}", path.as_ref().display(), e))
        })?;
        let signer = Self::from_pkcs8_pem(&pem)?;
        info!(algorithm = signer.algorithm(), "Loaded authority signing key");
        Ok(signer)
    }

    pub fn algorithm(&self) -> &'static str {
        match self {
            Self::Rsa(_) => "rsa-pkcs1v15-sha256",
            Self::P256(_) => "ecdsa-p256-sha256",
        }
    }

    /// DER `SubjectPublicKeyInfo` of the verifying key.
    pub fn public_key_der(&self) -> CryptoResult<Vec<u8>> {
        let der = match self {
            Self::Rsa(key) => {
                let public = rsa::RsaPublicKey::from(key.as_ref());
                public.to_public_key_der()
            }
            Self::P256(key) => key.verifying_key().to_public_key_der(),
        }
        .map_err(|e| CryptoError::InvalidKey(e.to_string()))?;
        Ok(der.as_bytes().to_vec())
    }
}

impl fmt::Debug for AuthoritySigner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthoritySigner")
            .field("algorithm", &self.algorithm())
            .finish_non_exhaustive()
    }
}
