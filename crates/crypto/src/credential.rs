//! TPM2 credential protection (MakeCredential / ActivateCredential).
//!
//! The authority wraps a secret so that only the TPM holding the endorsement
//! key, and loaded with the named attestation key, can recover it:
//!
//! ```text
//! seed        random, 32 bytes
//! encSeed     RSA-OAEP-SHA256(EK, seed, label "IDENTITY\0")
//! symKey      KDFa(seed, "STORAGE", akName, 128)
//! hmacKey     KDFa(seed, "INTEGRITY", -, 256)
//! encIdentity AES-128-CFB(symKey, IV = 0, u16(len) || secret)
//! integrity   HMAC-SHA256(hmacKey, encIdentity || akName)
//! blob        u16(32) || integrity || encIdentity
//! ```

use crate::error::{CryptoError, CryptoResult};
use aes::Aes128;
use cfb_mode::cipher::{AsyncStreamCipher, KeyIvInit};
use hmac::{Hmac, Mac};
use rand::{rngs::OsRng, RngCore};
use rsa::{BigUint, Oaep, RsaPrivateKey, RsaPublicKey};
use sha2::Sha256;
use tracing::debug;
use zeroize::Zeroizing;

type HmacSha256 = Hmac<Sha256>;
type Aes128CfbEnc = cfb_mode::Encryptor<Aes128>;
type Aes128CfbDec = cfb_mode::Decryptor<Aes128>;

const SEED_LENGTH: usize = 32;
const DIGEST_LENGTH: usize = 32;
const AES_KEY_BITS: u32 = 128;
const HMAC_KEY_BITS: u32 = 256;
const OAEP_LABEL: &str = "IDENTITY\0";
const EK_EXPONENT: u32 = 65537;

/// Largest secret a SHA-256 credential can carry.
pub const MAX_SECRET_LENGTH: usize = DIGEST_LENGTH;

/// Output of MakeCredential.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActivationChallenge {
    /// `TPM2B_ID_OBJECT` contents
    pub credential_blob: Vec<u8>,
    /// `TPM2B_ENCRYPTED_SECRET` contents
    pub encrypted_seed: Vec<u8>,
}

/// Parsed `TPM2B_ID_OBJECT` contents.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CredentialBlob {
    pub integrity: Vec<u8>,
    pub enc_identity: Vec<u8>,
}

impl CredentialBlob {
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(2 + self.integrity.len() + self.enc_identity.len());
        out.extend_from_slice(&(self.integrity.len() as u16).to_be_bytes());
        out.extend_from_slice(&self.integrity);
        out.extend_from_slice(&self.enc_identity);
        out
    }

    pub fn parse(bytes: &[u8]) -> CryptoResult<Self> {
        if bytes.len() < 2 {
            return Err(CryptoError::MalformedTpmStructure(
                "credential blob too short".to_string(),
            ));
        }
        let size = u16::from_be_bytes([bytes[0], bytes[1]]) as usize;
        if size != DIGEST_LENGTH || bytes.len() < 2 + size + 2 {
            return Err(CryptoError::MalformedTpmStructure(format!(
                "credential blob integrity size {} with {} bytes total",
                size,
                bytes.len()
            )));
        }
        Ok(Self {
            integrity: bytes[2..2 + size].to_vec(),
            enc_identity: bytes[2 + size..].to_vec(),
        })
    }
}

/// Protect `secret` for the TPM owning the endorsement key `ek_modulus`
/// (exponent 65537) and the attestation key named `ak_name`.
pub fn make_credential(
    ek_modulus: &[u8],
    ak_name: &[u8],
    secret: &[u8],
) -> CryptoResult<ActivationChallenge> {
    if secret.is_empty() || secret.len() > MAX_SECRET_LENGTH {
        return Err(CryptoError::InvalidLength(format!(
            "credential secret must be 1..={} bytes, got {}",
            MAX_SECRET_LENGTH,
            secret.len()
        )));
    }

    let ek = RsaPublicKey::new(
        BigUint::from_bytes_be(ek_modulus),
        BigUint::from(EK_EXPONENT),
    )
    .map_err(|e| CryptoError::InvalidKey(format!("endorsement key: {}", e)))?;

    let mut seed = Zeroizing::new([0u8; SEED_LENGTH]);
    OsRng.fill_bytes(&mut seed[..]);

    let encrypted_seed = ek.encrypt(
        &mut OsRng,
        Oaep::new_with_label::<Sha256, _>(OAEP_LABEL),
        &seed[..],
    )?;

    let (sym_key, hmac_key) = derive_keys(&seed[..], ak_name)?;

    let mut enc_identity = Vec::with_capacity(2 + secret.len());
    enc_identity.extend_from_slice(&(secret.len() as u16).to_be_bytes());
    enc_identity.extend_from_slice(secret);
    Aes128CfbEnc::new_from_slices(&sym_key[..], &[0u8; 16])
        .map_err(|e| CryptoError::InvalidKey(e.to_string()))?
        .encrypt(&mut enc_identity);

    let integrity = integrity_tag(&hmac_key, &enc_identity, ak_name)?
        .finalize()
        .into_bytes()
        .to_vec();

    debug!(
        secret_len = secret.len(),
        ak_name = %hex::encode(ak_name),
        "Made activation credential"
    );

    Ok(ActivationChallenge {
        credential_blob: CredentialBlob {
            integrity,
            enc_identity,
        }
        .to_bytes(),
        encrypted_seed,
    })
}

/// Recover the secret from a MakeCredential output with the endorsement
/// private key, verifying the integrity tag against `ak_name`.
pub fn activate_credential(
    ek: &RsaPrivateKey,
    ak_name: &[u8],
    credential_blob: &[u8],
    encrypted_seed: &[u8],
) -> CryptoResult<Zeroizing<Vec<u8>>> {
    let seed = Zeroizing::new(ek.decrypt(
        Oaep::new_with_label::<Sha256, _>(OAEP_LABEL),
        encrypted_seed,
    )?);
    let blob = CredentialBlob::parse(credential_blob)?;
    let (sym_key, hmac_key) = derive_keys(&seed, ak_name)?;

    integrity_tag(&hmac_key, &blob.enc_identity, ak_name)?
        .verify_slice(&blob.integrity)
        .map_err(|_| CryptoError::IntegrityCheckFailed)?;

    let mut plain = Zeroizing::new(blob.enc_identity);
    Aes128CfbDec::new_from_slices(&sym_key[..], &[0u8; 16])
        .map_err(|e| CryptoError::InvalidKey(e.to_string()))?
        .decrypt(plain.as_mut_slice());

    let size = u16::from_be_bytes([plain[0], plain[1]]) as usize;
    if plain.len() != 2 + size {
        return Err(CryptoError::MalformedTpmStructure(format!(
            "credential declares {} bytes but carries {}",
            size,
            plain.len() - 2
        )));
    }
    Ok(Zeroizing::new(plain[2..].to_vec()))
}

fn derive_keys(
    seed: &[u8],
    ak_name: &[u8],
) -> CryptoResult<(Zeroizing<Vec<u8>>, Zeroizing<Vec<u8>>)> {
    let sym_key = kdfa(seed, "STORAGE", ak_name, &[], AES_KEY_BITS)?;
    let hmac_key = kdfa(seed, "INTEGRITY", &[], &[], HMAC_KEY_BITS)?;
    Ok((sym_key, hmac_key))
}

fn integrity_tag(hmac_key: &[u8], enc_identity: &[u8], ak_name: &[u8]) -> CryptoResult<HmacSha256> {
    let mut mac = <HmacSha256 as Mac>::new_from_slice(hmac_key)
        .map_err(|e| CryptoError::InvalidKey(e.to_string()))?;
    mac.update(enc_identity);
    mac.update(ak_name);
    Ok(mac)
}

/// TPM 2.0 KDFa with HMAC-SHA256 (SP 800-108 counter mode).
fn kdfa(
    key: &[u8],
    label: &str,
    context_u: &[u8],
    context_v: &[u8],
    bits: u32,
) -> CryptoResult<Zeroizing<Vec<u8>>> {
    let bytes = (bits as usize).div_ceil(8);
    let mut out = Zeroizing::new(Vec::with_capacity(bytes + DIGEST_LENGTH));
    let mut counter: u32 = 0;
    while out.len() < bytes {
        counter += 1;
        let mut mac = <HmacSha256 as Mac>::new_from_slice(key)
            .map_err(|e| CryptoError::InvalidKey(e.to_string()))?;
        mac.update(&counter.to_be_bytes());
        mac.update(label.as_bytes());
        mac.update(&[0]);
        mac.update(context_u);
        mac.update(context_v);
        mac.update(&bits.to_be_bytes());
        out.extend_from_slice(&mac.finalize().into_bytes());
    }
    out.truncate(bytes);
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rsa::pkcs8::DecodePrivateKey;
    use rsa::traits::PublicKeyParts;

    const EK_PEM: &str = include_str!("../testdata/ek_rsa2048.pem");
    const AK_PEM: &str = include_str!("../testdata/ak_rsa2048.pem");

    fn ek() -> RsaPrivateKey {
        RsaPrivateKey::from_pkcs8_pem(EK_PEM).unwrap()
    }

    fn ak_name() -> Vec<u8> {
        let ak = RsaPrivateKey::from_pkcs8_pem(AK_PEM).unwrap();
        let area = crate::tpm::encode_rsa_public(&ak.n().to_bytes_be(), 0x0005_0072);
        crate::tpm::TpmPublicArea::parse(&area).unwrap().name().unwrap()
    }

    #[test]
    fn test_make_then_activate_recovers_secret() {
        let ek = ek();
        let name = ak_name();
        let secret = [0x5A; 20];

        let challenge = make_credential(&ek.n().to_bytes_be(), &name, &secret).unwrap();
        assert_eq!(challenge.encrypted_seed.len(), 256);
        // u16 size + 32-byte HMAC + u16 length + secret
        assert_eq!(challenge.credential_blob.len(), 2 + 32 + 2 + secret.len());

        let recovered = activate_credential(
            &ek,
            &name,
            &challenge.credential_blob,
            &challenge.encrypted_seed,
        )
        .unwrap();
        assert_eq!(recovered.as_slice(), &secret);
    }

    #[test]
    fn test_wrong_ak_name_fails_integrity() {
        let ek = ek();
        let name = ak_name();
        let challenge = make_credential(&ek.n().to_bytes_be(), &name, &[1; 16]).unwrap();

        let mut other = name.clone();
        other[5] ^= 0xFF;
        let result = activate_credential(
            &ek,
            &other,
            &challenge.credential_blob,
            &challenge.encrypted_seed,
        );
        assert!(matches!(result, Err(CryptoError::IntegrityCheckFailed)));
    }

    #[test]
    fn test_tampered_blob_fails_integrity() {
        let ek = ek();
        let name = ak_name();
        let mut challenge = make_credential(&ek.n().to_bytes_be(), &name, &[1; 16]).unwrap();
        let last = challenge.credential_blob.len() - 1;
        challenge.credential_blob[last] ^= 0x01;

        assert!(activate_credential(
            &ek,
            &name,
            &challenge.credential_blob,
            &challenge.encrypted_seed
        )
        .is_err());
    }

    #[test]
    fn test_oversized_secret_rejected() {
        let ek = ek();
        let result = make_credential(&ek.n().to_bytes_be(), &ak_name(), &[0; 33]);
        assert!(matches!(result, Err(CryptoError::InvalidLength(_))));
    }

    #[test]
    fn test_kdfa_lengths_and_determinism() {
        let a = kdfa(&[7; 32], "STORAGE", b"name", &[], 128).unwrap();
        let b = kdfa(&[7; 32], "STORAGE", b"name", &[], 128).unwrap();
        let c = kdfa(&[7; 32], "INTEGRITY", &[], &[], 256).unwrap();
        assert_eq!(a.len(), 16);
        assert_eq!(c.len(), 32);
        assert_eq!(*a, *b);
        assert_ne!(a[..], c[..16]);
    }

    #[test]
    fn test_blob_parse_round_trip() {
        let blob = CredentialBlob {
            integrity: vec![3; 32],
            enc_identity: vec![4; 22],
        };
        assert_eq!(CredentialBlob::parse(&blob.to_bytes()).unwrap(), blob);
        assert!(CredentialBlob::parse(&[0, 16, 1, 2]).is_err());
    }
}
