//! Env file parsing
//!
//! The accepted format is deliberately small: `KEY=VALUE` lines separated by
//! `\n`, each line trimmed, blank lines skipped, no comments and no quoting.
//! Only the first `=` on a line is a delimiter.

use std::collections::{BTreeMap, HashSet};

use tracing::debug;

use crate::error::{EnvcryptError, ErrorCategory, ErrorKind, Result};

/// Carrier for the encryption secret.
pub const SECRET_KEY: &str = "__ENV_ENCRYPTION_SECRET";

/// Carrier for the encryption IV.
pub const IV_KEY: &str = "__ENV_ENCRYPTION_IV";

/// Carrier for the cipher method name.
pub const METHOD_KEY: &str = "__ENV_ENCRYPTION_METHOD";

/// Marker in front of every encrypted key.
pub const ENCRYPTED_PREFIX: &str = "__ENC_";

/// Entry naming the environment a file belongs to.
pub const ENVIRONMENT_KEY: &str = "NODE_ENV";

/// A flat key/value view of an environment.
pub type EnvMap = BTreeMap<String, String>;

/// One `KEY=VALUE` line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnvEntry {
    pub key: String,
    pub value: String,
}

/// Values of the reserved carrier keys found in a file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ControlValues {
    pub secret: Option<String>,
    pub iv: Option<String>,
    pub method: Option<String>,
}

impl ControlValues {
    pub fn is_empty(&self) -> bool {
        self.secret.is_none() && self.iv.is_none() && self.method.is_none()
    }
}

/// Result of parsing one env file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParsedEnvFile {
    /// Ordinary entries, in file order.
    pub entries: Vec<EnvEntry>,
    /// Reserved carriers, never part of `entries`.
    pub control: ControlValues,
}

/// Decode a raw buffer as env file text.
pub fn decode_text(buffer: &[u8]) -> Result<&str> {
    std::str::from_utf8(buffer).map_err(|e| {
        EnvcryptError::with_kind_and_source(
            ErrorCategory::User,
            ErrorKind::InvalidInput,
            "env file is not valid UTF-8",
            e,
        )
    })
}

/// Parse env file text.
///
/// With `expected_env` set, a `NODE_ENV` entry holding any other value
/// aborts the parse.
pub fn parse(text: &str, expected_env: Option<&str>) -> Result<ParsedEnvFile> {
    let mut parsed = ParsedEnvFile::default();
    for entry in lines(text)? {
        let slot = match entry.key.as_str() {
            SECRET_KEY => &mut parsed.control.secret,
            IV_KEY => &mut parsed.control.iv,
            METHOD_KEY => &mut parsed.control.method,
            _ => {
                if let Some(expected) = expected_env {
                    if entry.key == ENVIRONMENT_KEY && entry.value != expected {
                        return Err(EnvcryptError::with_kind(
                            ErrorCategory::User,
                            ErrorKind::EnvironmentMismatch,
                            format!(
                                "{ENVIRONMENT_KEY} is \"{}\" but the file was selected for \"{expected}\"",
                                entry.value
                            ),
                        ));
                    }
                }
                parsed.entries.push(entry);
                continue;
            }
        };
        *slot = Some(entry.value);
    }
    debug!(
        entries = parsed.entries.len(),
        has_control = !parsed.control.is_empty(),
        "parsed env file"
    );
    Ok(parsed)
}

/// Parse env file text into a flat map, carriers included.
pub fn parse_map(text: &str) -> Result<EnvMap> {
    Ok(lines(text)?
        .into_iter()
        .map(|entry| (entry.key, entry.value))
        .collect())
}

/// Render entries back into env file text.
pub fn render<'a, I>(entries: I) -> String
where
    I: IntoIterator<Item = (&'a str, &'a str)>,
{
    entries
        .into_iter()
        .map(|(key, value)| format!("{key}={value}"))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Split text into entries, rejecting repeated keys.
fn lines(text: &str) -> Result<Vec<EnvEntry>> {
    let mut seen = HashSet::new();
    let mut entries = Vec::new();
    for line in text.split('\n').map(str::trim).filter(|l| !l.is_empty()) {
        let (key, value) = line.split_once('=').unwrap_or((line, ""));
        if !seen.insert(key) {
            return Err(EnvcryptError::with_kind(
                ErrorCategory::User,
                ErrorKind::DuplicateKey,
                format!("duplicate variable found \"{key}\", please remove one entry and try again"),
            ));
        }
        entries.push(EnvEntry {
            key: key.to_string(),
            value: value.to_string(),
        });
    }
    Ok(entries)
}
