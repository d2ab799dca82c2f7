//! TPM 2.0 public area parsing and object names.

use crate::error::{CryptoError, CryptoResult};
use rsa::{BigUint, RsaPublicKey};
use sha2::{Digest, Sha256};

pub const TPM_ALG_RSA: u16 = 0x0001;
pub const TPM_ALG_SHA256: u16 = 0x000B;
pub const TPM_ALG_NULL: u16 = 0x0010;
pub const TPM_ALG_RSASSA: u16 = 0x0014;

/// Exponent used when a public area encodes 0.
pub const DEFAULT_RSA_EXPONENT: u32 = 65537;

/// Parsed RSA `TPMT_PUBLIC`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TpmPublicArea {
    pub name_alg: u16,
    pub object_attributes: u32,
    pub auth_policy: Vec<u8>,
    pub symmetric: u16,
    pub scheme: u16,
    pub key_bits: u16,
    pub exponent: u32,
    pub modulus: Vec<u8>,
    raw: Vec<u8>,
}

impl TpmPublicArea {
    /// Parse an RSA `TPMT_PUBLIC`. Trailing bytes are rejected.
    pub fn parse(bytes: &[u8]) -> CryptoResult<Self> {
        let mut cursor = Cursor::new(bytes);

        let key_type = cursor.u16("type")?;
        if key_type != TPM_ALG_RSA {
            return Err(CryptoError::UnsupportedAlgorithm(format!(
                "public area type {:#06x} is not RSA",
                key_type
            )));
        }
        let name_alg = cursor.u16("nameAlg")?;
        let object_attributes = cursor.u32("objectAttributes")?;
        let policy_len = cursor.u16("authPolicy.size")? as usize;
        let auth_policy = cursor.take(policy_len, "authPolicy")?.to_vec();

        let symmetric = cursor.u16("symmetric.algorithm")?;
        if symmetric != TPM_ALG_NULL {
            cursor.u16("symmetric.keyBits")?;
            cursor.u16("symmetric.mode")?;
        }
        let scheme = cursor.u16("scheme")?;
        if scheme != TPM_ALG_NULL {
            cursor.u16("scheme.hashAlg")?;
        }
        let key_bits = cursor.u16("keyBits")?;
        let exponent = match cursor.u32("exponent")? {
            0 => DEFAULT_RSA_EXPONENT,
            e => e,
        };
        let modulus_len = cursor.u16("unique.size")? as usize;
        let modulus = cursor.take(modulus_len, "unique")?.to_vec();

        if cursor.remaining() != 0 {
            return Err(CryptoError::MalformedTpmStructure(format!(
                "{} trailing bytes after public area",
                cursor.remaining()
            )));
        }
        if modulus.len() * 8 != key_bits as usize {
            return Err(CryptoError::MalformedTpmStructure(format!(
                "modulus of {} bytes does not match keyBits {}",
                modulus.len(),
                key_bits
            )));
        }

        Ok(Self {
            name_alg,
            object_attributes,
            auth_policy,
            symmetric,
            scheme,
            key_bits,
            exponent,
            modulus,
            raw: bytes.to_vec(),
        })
    }

    /// TPM object name: `nameAlg || H(TPMT_PUBLIC)`.
    pub fn name(&self) -> CryptoResult<Vec<u8>> {
        if self.name_alg != TPM_ALG_SHA256 {
            return Err(CryptoError::UnsupportedAlgorithm(format!(
                "name algorithm {:#06x}",
                self.name_alg
            )));
        }
        let mut name = self.name_alg.to_be_bytes().to_vec();
        name.extend_from_slice(&Sha256::digest(&self.raw));
        Ok(name)
    }

    pub fn rsa_public_key(&self) -> CryptoResult<RsaPublicKey> {
        RsaPublicKey::new(
            BigUint::from_bytes_be(&self.modulus),
            BigUint::from(self.exponent),
        )
        .map_err(|e| CryptoError::InvalidKey(e.to_string()))
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.raw
    }
}

/// Encode an unrestricted RSASSA-SHA256 signing key public area with the
/// default exponent, as a TPM would report for an attestation key.
pub fn encode_rsa_public(modulus: &[u8], object_attributes: u32) -> Vec<u8> {
    let mut out = Vec::with_capacity(22 + modulus.len());
    out.extend_from_slice(&TPM_ALG_RSA.to_be_bytes());
    out.extend_from_slice(&TPM_ALG_SHA256.to_be_bytes());
    out.extend_from_slice(&object_attributes.to_be_bytes());
    out.extend_from_slice(&0u16.to_be_bytes());
    out.extend_from_slice(&TPM_ALG_NULL.to_be_bytes());
    out.extend_from_slice(&TPM_ALG_RSASSA.to_be_bytes());
    out.extend_from_slice(&TPM_ALG_SHA256.to_be_bytes());
    out.extend_from_slice(&((modulus.len() * 8) as u16).to_be_bytes());
    out.extend_from_slice(&0u32.to_be_bytes());
    out.extend_from_slice(&(modulus.len() as u16).to_be_bytes());
    out.extend_from_slice(modulus);
    out
}

struct Cursor<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    fn take(&mut self, n: usize, field: &str) -> CryptoResult<&'a [u8]> {
        if self.remaining() < n {
            return Err(CryptoError::MalformedTpmStructure(format!(
                "truncated at {}",
                field
            )));
        }
        let slice = &self.buf[self.pos..self.pos + n];
        self.pos += n;
        Ok(slice)
    }

    fn u16(&mut self, field: &str) -> CryptoResult<u16> {
        let b = self.take(2, field)?;
        Ok(u16::from_be_bytes([b[0], b[1]]))
    }

    fn u32(&mut self, field: &str) -> CryptoResult<u32> {
        let b = self.take(4, field)?;
        Ok(u32::from_be_bytes([b[0], b[1], b[2], b[3]]))
    }
}
