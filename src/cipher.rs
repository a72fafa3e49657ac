//! Value encryption/decryption using AES-256-CBC
//!
//! Each env key and each env value is enciphered on its own:
//! - AES-256 in CBC mode with PKCS#7 padding
//! - key and IV taken from [`KeyMaterial`]
//! - ciphertext armored into a text-safe token by [`crate::armor`]
//!
//! CBC offers no integrity protection. A wrong key or IV is detected only
//! indirectly, through invalid padding or a plaintext that is not UTF-8.

use aes::Aes256;
use cbc::cipher::block_padding::Pkcs7;
use cbc::cipher::{BlockDecryptMut, BlockEncryptMut, KeyIvInit};

use crate::armor;
use crate::error::{EnvcryptError, ErrorCategory, ErrorKind, Result};
use crate::keys::{CipherMethod, KeyMaterial};

type Aes256CbcEnc = cbc::Encryptor<Aes256>;
type Aes256CbcDec = cbc::Decryptor<Aes256>;

/// Encrypt one string into a token.
pub fn encrypt_value(plaintext: &str, keys: &KeyMaterial, method: CipherMethod) -> String {
    let ciphertext = match method {
        CipherMethod::Aes256Cbc => {
            Aes256CbcEnc::new(keys.key_bytes().into(), keys.iv_bytes().into())
                .encrypt_padded_vec_mut::<Pkcs7>(plaintext.as_bytes())
        }
    };
    armor::wrap(&ciphertext)
}

/// Decrypt a token produced by [`encrypt_value`].
pub fn decrypt_value(token: &str, keys: &KeyMaterial, method: CipherMethod) -> Result<String> {
    let ciphertext = armor::unwrap(token)?;
    let plaintext = match method {
        CipherMethod::Aes256Cbc => {
            Aes256CbcDec::new(keys.key_bytes().into(), keys.iv_bytes().into())
                .decrypt_padded_vec_mut::<Pkcs7>(&ciphertext)
                .map_err(|_| {
                    EnvcryptError::decryption("invalid padding; wrong secret, iv or method")
                })?
        }
    };
    String::from_utf8(plaintext).map_err(|e| {
        EnvcryptError::with_kind_and_source(
            ErrorCategory::User,
            ErrorKind::DecryptionFailed,
            "decrypted value is not valid UTF-8; wrong secret, iv or method",
            e,
        )
    })
}
