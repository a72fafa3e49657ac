//! Key material for the env file cipher
//!
//! A key and an IV are rendered as lowercase hex text and the ASCII bytes of
//! that text are what the cipher consumes:
//! - key: first 32 hex characters of SHA-512(seed), i.e. a 32-byte AES-256 key
//! - iv: first 16 hex characters of SHA-512(seed), i.e. a 16-byte CBC IV
//!
//! Seeds are arbitrary caller strings. Without one, a seed is drawn from the
//! OS CSPRNG.

use std::fmt;
use std::str::FromStr;

use rand::RngCore;
use rand::rngs::OsRng;
use sha2::{Digest, Sha512};
use zeroize::Zeroizing;

use crate::error::{EnvcryptError, Result};

/// Length of the hex-rendered key, which is also the AES-256 key length in bytes
pub const KEY_LEN: usize = 32;

/// Length of the hex-rendered IV, which is also the CBC IV length in bytes
pub const IV_LEN: usize = 16;

/// Number of random bytes behind a generated seed
const RANDOM_SEED_BYTES: usize = 64;

/// Derive a cipher key from a seed.
pub fn derive_key(seed: &str) -> String {
    let mut digest = sha512_hex(seed);
    digest.truncate(KEY_LEN);
    digest
}

/// Derive an IV from a seed.
pub fn derive_iv(seed: &str) -> String {
    let mut digest = sha512_hex(seed);
    digest.truncate(IV_LEN);
    digest
}

/// Generate a seed from the OS random source, hex-rendered.
pub fn random_seed() -> Zeroizing<String> {
    let mut bytes = Zeroizing::new([0u8; RANDOM_SEED_BYTES]);
    OsRng.fill_bytes(&mut bytes[..]);
    Zeroizing::new(hex::encode(&bytes[..]))
}

fn sha512_hex(seed: &str) -> String {
    hex::encode(Sha512::digest(seed.as_bytes()))
}

/// Block cipher modes understood by the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CipherMethod {
    #[default]
    Aes256Cbc,
}

impl CipherMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            CipherMethod::Aes256Cbc => "aes-256-cbc",
        }
    }
}

impl fmt::Display for CipherMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CipherMethod {
    type Err = EnvcryptError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "aes-256-cbc" => Ok(CipherMethod::Aes256Cbc),
            other => Err(EnvcryptError::configuration(format!(
                "unsupported cipher method \"{other}\""
            ))),
        }
    }
}

/// A cipher key and IV pair in their derived (hex text) form.
#[derive(Clone)]
pub struct KeyMaterial {
    secret: Zeroizing<String>,
    iv: Zeroizing<String>,
    key_block: Zeroizing<[u8; KEY_LEN]>,
    iv_block: Zeroizing<[u8; IV_LEN]>,
}

impl KeyMaterial {
    /// Derive key material from caller-supplied seeds.
    pub fn from_seeds(secret_seed: &str, iv_seed: &str) -> Self {
        let secret = derive_key(secret_seed);
        let iv = derive_iv(iv_seed);
        let mut key_block = Zeroizing::new([0u8; KEY_LEN]);
        key_block.copy_from_slice(secret.as_bytes());
        let mut iv_block = Zeroizing::new([0u8; IV_LEN]);
        iv_block.copy_from_slice(iv.as_bytes());
        Self {
            secret: Zeroizing::new(secret),
            iv: Zeroizing::new(iv),
            key_block,
            iv_block,
        }
    }

    /// Derive key material from freshly generated random seeds.
    pub fn random() -> Self {
        let secret_seed = random_seed();
        let iv_seed = random_seed();
        Self::from_seeds(&secret_seed, &iv_seed)
    }

    /// Accept already-derived values, as found in the metadata carriers of an
    /// encrypted environment.
    pub fn from_raw(secret: &str, iv: &str) -> Result<Self> {
        let key_block: [u8; KEY_LEN] = secret.as_bytes().try_into().map_err(|_| {
            EnvcryptError::configuration(format!(
                "encryption secret must be {KEY_LEN} bytes, got {}",
                secret.len()
            ))
        })?;
        let iv_block: [u8; IV_LEN] = iv.as_bytes().try_into().map_err(|_| {
            EnvcryptError::configuration(format!(
                "encryption iv must be {IV_LEN} bytes, got {}",
                iv.len()
            ))
        })?;
        Ok(Self {
            secret: Zeroizing::new(secret.to_string()),
            iv: Zeroizing::new(iv.to_string()),
            key_block: Zeroizing::new(key_block),
            iv_block: Zeroizing::new(iv_block),
        })
    }

    pub fn secret(&self) -> &str {
        &self.secret
    }

    pub fn iv(&self) -> &str {
        &self.iv
    }

    pub(crate) fn key_bytes(&self) -> &[u8; KEY_LEN] {
        &self.key_block
    }

    pub(crate) fn iv_bytes(&self) -> &[u8; IV_LEN] {
        &self.iv_block
    }
}

impl fmt::Debug for KeyMaterial {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyMaterial")
            .field("secret", &"<redacted>")
            .field("iv", &"<redacted>")
            .finish()
    }
}
