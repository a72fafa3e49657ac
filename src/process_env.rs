//! Restoring encrypted entries into an environment

use tracing::{error, warn};

use crate::cipher;
use crate::dotenv::{ENCRYPTED_PREFIX, EnvMap, IV_KEY, METHOD_KEY, SECRET_KEY};
use crate::engine::Engine;
use crate::error::{EnvcryptError, ErrorCategory, ErrorKind, Result};
use crate::keys::{CipherMethod, KeyMaterial};

impl Engine {
    /// Decrypt every `__ENC_` entry of `env` in place.
    ///
    /// Key material comes from the carrier entries in `env`; the method
    /// carrier is optional and defaults to the engine's method. Each
    /// encrypted entry is replaced by its plaintext key and value. Once all
    /// entries are restored the carriers are removed.
    ///
    /// On failure, entries restored before the failing one stay restored.
    pub fn decrypt_environment(&self, env: &mut EnvMap) -> Result<()> {
        let encrypted: Vec<String> = env
            .keys()
            .filter(|k| k.starts_with(ENCRYPTED_PREFIX))
            .cloned()
            .collect();

        if !encrypted.is_empty() {
            let (keys, method) = self.carried_keys(env)?;
            for name in encrypted {
                let Some(token) = env.remove(&name) else {
                    continue;
                };
                let key_token = &name[ENCRYPTED_PREFIX.len()..];
                let restored = cipher::decrypt_value(key_token, &keys, method).and_then(|key| {
                    cipher::decrypt_value(&token, &keys, method).map(|value| (key, value))
                });
                match restored {
                    Ok((key, value)) => {
                        env.insert(key, value);
                    }
                    Err(e) => {
                        error!(entry = %name, error = %e, "could not decrypt entry");
                        return Err(e.with_context(format!("could not decrypt {name}")));
                    }
                }
            }
        }

        env.remove(SECRET_KEY);
        env.remove(IV_KEY);
        env.remove(METHOD_KEY);
        Ok(())
    }

    /// Snapshot the current process environment and decrypt it.
    ///
    /// Variables whose name or value is not valid Unicode are skipped with a
    /// warning.
    pub fn decrypt_process_env(&self) -> Result<EnvMap> {
        let mut env = EnvMap::new();
        for (key, value) in std::env::vars_os() {
            match (key.into_string(), value.into_string()) {
                (Ok(key), Ok(value)) => {
                    env.insert(key, value);
                }
                (Ok(key), Err(_)) => {
                    warn!(variable = %key, "skipping variable whose value is not valid Unicode");
                }
                (Err(key), _) => {
                    warn!(variable = ?key, "skipping variable whose name is not valid Unicode");
                }
            }
        }
        self.decrypt_environment(&mut env)?;
        Ok(env)
    }

    fn carried_keys(&self, env: &EnvMap) -> Result<(KeyMaterial, CipherMethod)> {
        let carrier = move |name: &'static str| {
            env.get(name)
                .filter(|value| !value.is_empty())
                .ok_or_else(|| missing(name))
        };
        let secret = carrier(SECRET_KEY)?;
        let iv = carrier(IV_KEY)?;
        let method = match env.get(METHOD_KEY) {
            Some(name) => name.parse()?,
            None => self.method(),
        };
        Ok((KeyMaterial::from_raw(secret, iv)?, method))
    }
}

fn missing(carrier: &str) -> EnvcryptError {
    EnvcryptError::with_kind(
        ErrorCategory::User,
        ErrorKind::MissingMetadata,
        format!("missing environment variable \"{carrier}\""),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn encrypted_env(engine: &Engine, text: &str) -> EnvMap {
        let result = engine.encrypt_file(text.as_bytes(), None).unwrap();
        let mut env = result.json.clone();
        result.metadata.insert_into(&mut env);
        env
    }

    #[test]
    fn test_restores_entries_and_drops_carriers() {
        let client = Engine::with_seeds("alpha", "beta");
        let server = Engine::new();
        let mut env = encrypted_env(&client, "A=1\nB=two words");
        env.insert("PATH".into(), "/usr/bin".into());
        assert_eq!(env.len(), 6);

        server.decrypt_environment(&mut env).unwrap();

        assert_eq!(env.len(), 3);
        assert_eq!(env["A"], "1");
        assert_eq!(env["B"], "two words");
        assert_eq!(env["PATH"], "/usr/bin");
    }

    #[test]
    fn test_method_carrier_is_optional() {
        let engine = Engine::new();
        let mut env = encrypted_env(&engine, "A=1");
        env.remove(METHOD_KEY);
        Engine::new().decrypt_environment(&mut env).unwrap();
        assert_eq!(env.len(), 1);
        assert_eq!(env["A"], "1");
    }

    #[test]
    fn test_missing_secret() {
        let engine = Engine::new();
        let mut env = encrypted_env(&engine, "A=1");
        env.remove(SECRET_KEY);
        let err = engine.decrypt_environment(&mut env).unwrap_err();
        assert_eq!(err.kind, Some(ErrorKind::MissingMetadata));
        assert!(err.to_string().contains(SECRET_KEY));
    }

    #[test]
    fn test_missing_iv() {
        let engine = Engine::new();
        let mut env = encrypted_env(&engine, "A=1");
        env.remove(IV_KEY);
        let err = engine.decrypt_environment(&mut env).unwrap_err();
        assert_eq!(err.kind, Some(ErrorKind::MissingMetadata));
        assert!(err.to_string().contains(IV_KEY));
    }

    #[test]
    fn test_empty_carriers_count_as_missing() {
        let engine = Engine::new();
        for carrier in [SECRET_KEY, IV_KEY] {
            let mut env = encrypted_env(&engine, "A=1");
            env.insert(carrier.into(), String::new());
            let err = engine.decrypt_environment(&mut env).unwrap_err();
            assert_eq!(err.kind, Some(ErrorKind::MissingMetadata));
            assert!(err.to_string().contains(carrier));
        }
    }

    #[test]
    fn test_no_encrypted_entries_still_drops_carriers() {
        let mut env = EnvMap::new();
        env.insert("HOME".into(), "/root".into());
        env.insert(SECRET_KEY.into(), "x".into());
        Engine::new().decrypt_environment(&mut env).unwrap();
        assert_eq!(env.len(), 1);
        assert_eq!(env["HOME"], "/root");
    }

    #[test]
    fn test_failure_names_entry_and_keeps_earlier_progress() {
        let engine = Engine::with_seeds("alpha", "beta");
        let mut env = encrypted_env(&engine, "A=1");
        // Sorts after every real token: uppercase letters and digits precede '~'.
        env.insert(format!("{ENCRYPTED_PREFIX}~broken"), "also broken".into());

        let err = engine.decrypt_environment(&mut env).unwrap_err();
        assert_eq!(err.kind, Some(ErrorKind::DecryptionFailed));
        assert!(err.to_string().contains("__ENC_~broken"));
        assert_eq!(env["A"], "1");
        // Carriers are kept when the pass is aborted.
        assert!(env.contains_key(SECRET_KEY));
    }

    #[test]
    fn test_wrong_carrier_length() {
        let engine = Engine::new();
        let mut env = encrypted_env(&engine, "A=1");
        env.insert(IV_KEY.into(), "short".into());
        let err = engine.decrypt_environment(&mut env).unwrap_err();
        assert_eq!(err.kind, Some(ErrorKind::Configuration));
    }
}
