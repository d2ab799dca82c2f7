//! Single-use challenge nonces.

use crate::error::{CryptoError, CryptoResult};
use rand::{rngs::OsRng, RngCore};
use std::fmt;

/// Bytes of the nonce used as the challenge lookup key.
pub const NONCE_KEY_LENGTH: usize = 8;

/// Random challenge value bound into a credential activation.
#[derive(Clone, PartialEq, Eq)]
pub struct Nonce(Vec<u8>);

impl Nonce {
    /// Generate `len` bytes from the operating system RNG.
    pub fn generate(len: usize) -> CryptoResult<Self> {
        if len < NONCE_KEY_LENGTH {
            return Err(CryptoError::InvalidLength(format!(
                "nonce of {} bytes is shorter than the {}-byte lookup key",
                len, NONCE_KEY_LENGTH
            )));
        }
        let mut bytes = vec![0u8; len];
        OsRng.fill_bytes(&mut bytes);
        Ok(Self(bytes))
    }

    pub fn from_bytes(bytes: &[u8]) -> CryptoResult<Self> {
        if bytes.len() < NONCE_KEY_LENGTH {
            return Err(CryptoError::InvalidLength(format!(
                "nonce of {} bytes is shorter than the {}-byte lookup key",
                bytes.len(),
                NONCE_KEY_LENGTH
            )));
        }
        Ok(Self(bytes.to_vec()))
    }

    /// First 8 bytes read as a big-endian signed integer.
    pub fn lookup_key(&self) -> i64 {
        let mut prefix = [0u8; NONCE_KEY_LENGTH];
        prefix.copy_from_slice(&self.0[..NONCE_KEY_LENGTH]);
        i64::from_be_bytes(prefix)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Full comparison against stored nonce bytes; lengths must agree.
    pub fn matches(&self, stored: &[u8]) -> bool {
        self.0.len() == stored.len() && self.0.as_slice() == stored
    }
}

impl fmt::Debug for Nonce {
    // Only the lookup key is printed; the full value is a secret until consumed
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Nonce(key={:#018x}, len={})", self.lookup_key(), self.0.len())
    }
}
