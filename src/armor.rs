//! Text-safe token armoring for ciphertext
//!
//! Raw ciphertext is rendered as lowercase hex, the hex text is base64
//! encoded (standard alphabet, padded), and the three base64 characters that
//! collide with env file and URL delimiters are escaped:
//!
//! | base64 | token |
//! |--------|-------|
//! | `=`    | `_0`  |
//! | `+`    | `_1`  |
//! | `/`    | `_2`  |
//!
//! The resulting token contains only `[A-Za-z0-9_]`, so it can sit on either
//! side of a `KEY=VALUE` line and be passed unescaped through a POSIX shell.

use base64::{Engine, engine::general_purpose::STANDARD};

use crate::error::{EnvcryptError, ErrorCategory, ErrorKind, Result};

/// Escapes applied after base64 encoding, in encoding order.
const ESCAPES: [(&str, &str); 3] = [("=", "_0"), ("+", "_1"), ("/", "_2")];

/// Wrap raw ciphertext bytes into a token.
pub fn wrap(ciphertext: &[u8]) -> String {
    let hex_text = hex::encode(ciphertext);
    let mut token = STANDARD.encode(hex_text.as_bytes());
    for (plain, escaped) in ESCAPES {
        token = token.replace(plain, escaped);
    }
    token
}

/// Unwrap a token, returning the raw ciphertext bytes.
pub fn unwrap(token: &str) -> Result<Vec<u8>> {
    // `_2`, `_1`, `_0`: the reverse of the encoding order.
    let mut encoded = token.to_string();
    for (plain, escaped) in ESCAPES.iter().rev() {
        encoded = encoded.replace(escaped, plain);
    }

    let hex_bytes = STANDARD.decode(encoded.as_bytes()).map_err(|e| {
        EnvcryptError::with_kind_and_source(
            ErrorCategory::User,
            ErrorKind::DecryptionFailed,
            format!("base64 decoding failed: {}", e),
            e,
        )
    })?;
    let ciphertext = hex::decode(&hex_bytes).map_err(|e| {
        EnvcryptError::with_kind_and_source(
            ErrorCategory::User,
            ErrorKind::DecryptionFailed,
            format!("token does not carry hex ciphertext: {}", e),
            e,
        )
    })?;
    Ok(ciphertext)
}
