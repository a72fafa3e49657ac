//! Env file encryption
//!
//! [`Engine`] holds the default key material and cipher method. A file may
//! override both through its reserved carrier entries, in which case the
//! carriers are consumed and replaced by the derived values in the result's
//! metadata.

use std::collections::BTreeMap;
use std::path::Path;

use serde::Serialize;
use tracing::debug;

use crate::cipher;
use crate::dotenv::{self, ControlValues, ENCRYPTED_PREFIX, EnvMap, IV_KEY, METHOD_KEY, SECRET_KEY};
use crate::error::{EnvcryptError, Result};
use crate::file_ops;
use crate::keys::{CipherMethod, KeyMaterial};

/// The key metadata that must travel with an encrypted file.
///
/// Only the derived secret and IV are ever exposed here, never the seeds they
/// came from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EncryptionMetadata {
    #[serde(rename = "__ENV_ENCRYPTION_SECRET")]
    pub secret: String,
    #[serde(rename = "__ENV_ENCRYPTION_IV")]
    pub iv: String,
    #[serde(rename = "__ENV_ENCRYPTION_METHOD")]
    pub method: String,
}

impl EncryptionMetadata {
    fn new(keys: &KeyMaterial, method: CipherMethod) -> Self {
        Self {
            secret: keys.secret().to_string(),
            iv: keys.iv().to_string(),
            method: method.to_string(),
        }
    }

    /// The metadata as carrier entries, in the order they are emitted.
    pub fn entries(&self) -> [(&str, &str); 3] {
        [
            (SECRET_KEY, self.secret.as_str()),
            (IV_KEY, self.iv.as_str()),
            (METHOD_KEY, self.method.as_str()),
        ]
    }

    /// Copy the carriers into an environment map.
    pub fn insert_into(&self, env: &mut EnvMap) {
        for (key, value) in self.entries() {
            env.insert(key.to_string(), value.to_string());
        }
    }
}

/// Output of encrypting one env file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncryptionResult {
    /// `__ENC_<key>=<value>` lines joined with `\n`, in input order.
    pub file: Vec<u8>,
    /// The same entries as a lookup map.
    pub json: EnvMap,
    pub metadata: EncryptionMetadata,
}

/// Encrypts env files and decrypts environments.
#[derive(Debug, Clone)]
pub struct Engine {
    keys: KeyMaterial,
    method: CipherMethod,
}

impl Default for Engine {
    fn default() -> Self {
        Self::new()
    }
}

impl Engine {
    /// An engine with random key material.
    pub fn new() -> Self {
        Self::with_key_material(KeyMaterial::random())
    }

    /// An engine whose key material is derived from the given seeds.
    pub fn with_seeds(secret_seed: &str, iv_seed: &str) -> Self {
        Self::with_key_material(KeyMaterial::from_seeds(secret_seed, iv_seed))
    }

    pub fn with_key_material(keys: KeyMaterial) -> Self {
        Self {
            keys,
            method: CipherMethod::default(),
        }
    }

    pub fn with_method(mut self, method: CipherMethod) -> Self {
        self.method = method;
        self
    }

    pub fn key_material(&self) -> &KeyMaterial {
        &self.keys
    }

    pub fn method(&self) -> CipherMethod {
        self.method
    }

    /// Encrypt a single value with the engine's own key material.
    pub fn encrypt(&self, plaintext: &str) -> String {
        cipher::encrypt_value(plaintext, &self.keys, self.method)
    }

    /// Decrypt a single token with the engine's own key material.
    pub fn decrypt(&self, token: &str) -> Result<String> {
        cipher::decrypt_value(token, &self.keys, self.method)
    }

    /// Encrypt the contents of an env file.
    ///
    /// `expected_env` enables the `NODE_ENV` guard. The guard is checked
    /// while parsing, before the carrier pairing is validated.
    pub fn encrypt_file(
        &self,
        buffer: &[u8],
        expected_env: Option<&str>,
    ) -> Result<EncryptionResult> {
        let text = dotenv::decode_text(buffer)?;
        let parsed = dotenv::parse(text, expected_env)?;
        let (keys, method) = self.effective_keys(&parsed.control)?;

        let mut json = BTreeMap::new();
        let mut lines = Vec::with_capacity(parsed.entries.len());
        for entry in &parsed.entries {
            let key = format!(
                "{ENCRYPTED_PREFIX}{}",
                cipher::encrypt_value(&entry.key, &keys, method)
            );
            let value = cipher::encrypt_value(&entry.value, &keys, method);
            lines.push(format!("{key}={value}"));
            json.insert(key, value);
        }
        debug!(
            entries = lines.len(),
            overridden = parsed.control.secret.is_some(),
            %method,
            "encrypted env file"
        );

        Ok(EncryptionResult {
            file: lines.join("\n").into_bytes(),
            json,
            metadata: EncryptionMetadata::new(&keys, method),
        })
    }

    /// Read an env file from disk and encrypt it.
    ///
    /// A leading `~` is expanded to the home directory. Missing paths and
    /// directories are rejected before any cryptographic work.
    pub fn encrypt_file_from_path(&self, path: impl AsRef<Path>) -> Result<EncryptionResult> {
        let path = file_ops::expand_home(path.as_ref());
        let buffer = file_ops::read_env_file(&path)?;
        self.encrypt_file(&buffer, None)
            .map_err(|e| e.with_context(format!("failed to encrypt {}", path.display())))
    }

    /// Key material and method for one encryption pass.
    fn effective_keys(&self, control: &ControlValues) -> Result<(KeyMaterial, CipherMethod)> {
        let method = match &control.method {
            Some(name) => name.parse()?,
            None => self.method,
        };
        let keys = match (&control.secret, &control.iv) {
            (Some(secret), Some(iv)) => KeyMaterial::from_seeds(secret, iv),
            (None, None) => self.keys.clone(),
            (Some(_), None) => {
                return Err(EnvcryptError::configuration(format!(
                    "{SECRET_KEY} is set but {IV_KEY} is missing; both must be provided"
                )));
            }
            (None, Some(_)) => {
                return Err(EnvcryptError::configuration(format!(
                    "{IV_KEY} is set but {SECRET_KEY} is missing; both must be provided"
                )));
            }
        };
        Ok((keys, method))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    const FIXTURE: &str = "MY_VAR=104\nMY_OTHER_VAR=hello world\nMY_LAST_VAR=hello@%20frenz";

    #[test]
    fn test_encrypt_file_shape() {
        let engine = Engine::new();
        let result = engine.encrypt_file(FIXTURE.as_bytes(), None).unwrap();

        assert_eq!(result.json.len(), 3);
        assert!(result.json.keys().all(|k| k.starts_with(ENCRYPTED_PREFIX)));

        let text = String::from_utf8(result.file.clone()).unwrap();
        let lines: Vec<&str> = text.split('\n').collect();
        assert_eq!(lines.len(), 3);
        for line in lines {
            let (key, value) = line.split_once('=').unwrap();
            assert_eq!(result.json[key], value);
        }

        assert_eq!(result.metadata.secret, engine.key_material().secret());
        assert_eq!(result.metadata.iv, engine.key_material().iv());
        assert_eq!(result.metadata.method, "aes-256-cbc");
    }

    #[test]
    fn test_file_order_preserved() {
        let engine = Engine::with_seeds("alpha", "beta");
        let result = engine.encrypt_file(FIXTURE.as_bytes(), None).unwrap();
        let text = String::from_utf8(result.file).unwrap();
        let keys: Vec<String> = text
            .lines()
            .map(|l| {
                let token = l.split_once('=').unwrap().0;
                engine.decrypt(&token[ENCRYPTED_PREFIX.len()..]).unwrap()
            })
            .collect();
        assert_eq!(keys, vec!["MY_VAR", "MY_OTHER_VAR", "MY_LAST_VAR"]);
    }

    #[test]
    fn test_carriers_override_and_are_derived() {
        let engine = Engine::new();
        let input = format!("{SECRET_KEY}=alpha\n{IV_KEY}=beta\nA=1");
        let result = engine.encrypt_file(input.as_bytes(), None).unwrap();

        let expected = KeyMaterial::from_seeds("alpha", "beta");
        assert_eq!(result.metadata.secret, expected.secret());
        assert_eq!(result.metadata.iv, expected.iv());
        assert_ne!(result.metadata.secret, "alpha");
        assert_eq!(result.json.len(), 1);

        let seeded = Engine::with_seeds("alpha", "beta");
        let plain = seeded.encrypt_file(b"A=1", None).unwrap();
        assert_eq!(plain.json, result.json);
    }

    #[test]
    fn test_secret_without_iv() {
        let engine = Engine::new();
        let err = engine
            .encrypt_file(format!("{SECRET_KEY}=alpha\nA=1").as_bytes(), None)
            .unwrap_err();
        assert_eq!(err.kind, Some(ErrorKind::Configuration));

        let err = engine
            .encrypt_file(format!("{IV_KEY}=beta\nA=1").as_bytes(), None)
            .unwrap_err();
        assert_eq!(err.kind, Some(ErrorKind::Configuration));
    }

    #[test]
    fn test_unknown_method_carrier() {
        let engine = Engine::new();
        let err = engine
            .encrypt_file(format!("{METHOD_KEY}=rot13\nA=1").as_bytes(), None)
            .unwrap_err();
        assert_eq!(err.kind, Some(ErrorKind::Configuration));
    }

    #[test]
    fn test_guard_checked_before_pairing() {
        let engine = Engine::new();
        let input = format!("NODE_ENV=production\n{SECRET_KEY}=alpha");
        let err = engine
            .encrypt_file(input.as_bytes(), Some("staging"))
            .unwrap_err();
        assert_eq!(err.kind, Some(ErrorKind::EnvironmentMismatch));
    }

    #[test]
    fn test_duplicate_key() {
        let err = Engine::new()
            .encrypt_file(b"A=1\nA=2", None)
            .unwrap_err();
        assert_eq!(err.kind, Some(ErrorKind::DuplicateKey));
    }

    #[test]
    fn test_with_method() {
        let engine = Engine::with_seeds("alpha", "beta").with_method(CipherMethod::Aes256Cbc);
        assert_eq!(engine.method(), CipherMethod::Aes256Cbc);
        let token = engine.encrypt("hello");
        assert_eq!(engine.decrypt(&token).unwrap(), "hello");
    }

    #[test]
    fn test_empty_file() {
        let result = Engine::new().encrypt_file(b"\n\n", None).unwrap();
        assert!(result.file.is_empty());
        assert!(result.json.is_empty());
    }

    #[test]
    fn test_metadata_serializes_with_carrier_names() {
        let result = Engine::with_seeds("alpha", "beta")
            .encrypt_file(b"A=1", None)
            .unwrap();
        let value = serde_json::to_value(&result.metadata).unwrap();
        assert_eq!(value[SECRET_KEY], result.metadata.secret);
        assert_eq!(value[IV_KEY], result.metadata.iv);
        assert_eq!(value[METHOD_KEY], "aes-256-cbc");
    }
}
