//! Environment selection within a package of files
//!
//! A package is a set of named buffers, typically a deployable directory
//! holding `.env`, `.env.staging`, `.env.production` and application files.
//! Encrypting a package picks the env file for one environment, writes its
//! encrypted form under a canonical name, and optionally drops the sibling
//! candidates so they are not shipped in plaintext.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::LazyLock;

use regex::Regex;
use tracing::debug;

use crate::dotenv::EnvMap;
use crate::engine::{EncryptionMetadata, Engine};
use crate::error::Result;
use crate::file_ops;

/// Named file buffers.
pub type Package = BTreeMap<String, Vec<u8>>;

/// `.env.<environment>` file names.
static ENVIRONMENT_FILE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\.env\.([A-Za-z0-9_-]+)$").expect("valid regex"));

/// Output of [`Engine::encrypt_package`].
///
/// When the source file was absent, `file` is empty and `json` and
/// `metadata` carry nothing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackageResult {
    /// The buffer written under the target name.
    pub file: Vec<u8>,
    pub json: EnvMap,
    pub metadata: Option<EncryptionMetadata>,
    /// Names removed from the package by the prune pattern, in sorted order.
    pub pruned: Vec<String>,
}

/// The environment named by a `.env.<environment>` file name, if any.
pub fn environment_from_name(name: &str) -> Option<&str> {
    let file_name = Path::new(name).file_name()?.to_str()?;
    ENVIRONMENT_FILE
        .captures(file_name)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str())
}

impl Engine {
    /// Encrypt `files[source]` into `files[target]`.
    ///
    /// Unless `ignore_mismatch` is set, a source named `.env.<environment>`
    /// requires any `NODE_ENV` entry in it to equal `<environment>`. A missing
    /// source is not an error: the target is replaced by an empty buffer.
    /// `prune` runs after the target is written and removes every matching
    /// name, the target included if it matches. Removed names are listed in
    /// [`PackageResult::pruned`].
    pub fn encrypt_package(
        &self,
        files: &mut Package,
        source: &str,
        target: &str,
        prune: Option<&Regex>,
        ignore_mismatch: bool,
    ) -> Result<PackageResult> {
        let source = expand_name(source);
        let target = expand_name(target);
        let expected_env = if ignore_mismatch {
            None
        } else {
            environment_from_name(&source)
        };

        let mut result = match files.get(&source) {
            Some(buffer) => {
                debug!(%source, %target, ?expected_env, "encrypting package env file");
                let encrypted = self
                    .encrypt_file(buffer, expected_env)
                    .map_err(|e| e.with_context(format!("failed to encrypt {source}")))?;
                PackageResult {
                    file: encrypted.file,
                    json: encrypted.json,
                    metadata: Some(encrypted.metadata),
                    pruned: Vec::new(),
                }
            }
            None => {
                debug!(%source, %target, "package has no source env file, writing empty target");
                PackageResult {
                    file: Vec::new(),
                    json: EnvMap::new(),
                    metadata: None,
                    pruned: Vec::new(),
                }
            }
        };
        files.insert(target, result.file.clone());

        if let Some(pattern) = prune {
            files.retain(|name, _| {
                if !pattern.is_match(name) {
                    return true;
                }
                debug!(%name, "pruned from package");
                result.pruned.push(name.clone());
                false
            });
        }
        Ok(result)
    }
}

fn expand_name(name: &str) -> String {
    file_ops::expand_home(Path::new(name))
        .to_string_lossy()
        .into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dotenv::ENCRYPTED_PREFIX;
    use crate::error::ErrorKind;

    fn files() -> Package {
        let mut files = Package::new();
        files.insert("index.mjs".into(), b"console.log('hi!');".to_vec());
        files.insert(".env".into(), b"VAR_1=abc\nVAR_2=xyz".to_vec());
        files.insert(
            ".env.staging".into(),
            b"VAR_1=panic\nVAR_2=at the\nVAR_3=disco".to_vec(),
        );
        files.insert(
            ".env.production".into(),
            b"VAR_1=owl\nVAR_2=city\nVAR_3=carly rae\nVAR_4=jepsen".to_vec(),
        );
        files
    }

    fn prune() -> Regex {
        Regex::new(r"^\.env\..*$").unwrap()
    }

    #[test]
    fn test_environment_from_name() {
        assert_eq!(environment_from_name(".env.staging"), Some("staging"));
        assert_eq!(environment_from_name("deploy/.env.production"), Some("production"));
        assert_eq!(environment_from_name(".env"), None);
        assert_eq!(environment_from_name(".env.a.b"), None);
        assert_eq!(environment_from_name("app.env.staging"), None);
    }

    #[test]
    fn test_selects_environment_and_prunes() {
        let engine = Engine::new();
        let mut files = files();
        let pattern = prune();
        let result = engine
            .encrypt_package(&mut files, ".env.staging", ".env", Some(&pattern), false)
            .unwrap();

        let metadata = result.metadata.as_ref().unwrap();
        assert_eq!(metadata.secret, engine.key_material().secret());
        assert_eq!(metadata.iv, engine.key_material().iv());
        assert_eq!(metadata.method, engine.method().to_string());
        assert_eq!(result.json.len(), 3);
        assert!(result.json.keys().all(|k| k.starts_with(ENCRYPTED_PREFIX)));

        assert_eq!(files.len(), 2);
        assert!(files.contains_key("index.mjs"));
        assert_eq!(files[".env"], result.file);
        assert_eq!(result.pruned, vec![".env.production", ".env.staging"]);
    }

    #[test]
    fn test_missing_environment_is_noop() {
        let engine = Engine::new();
        let mut files = files();
        let pattern = prune();
        let result = engine
            .encrypt_package(&mut files, ".env.preview", ".env", Some(&pattern), false)
            .unwrap();

        assert!(result.metadata.is_none());
        assert!(result.json.is_empty());
        assert_eq!(files.len(), 2);
        assert!(files.contains_key("index.mjs"));
        assert!(files[".env"].is_empty());
        assert_eq!(files[".env"], result.file);
    }

    #[test]
    fn test_without_prune_keeps_siblings() {
        let mut files = files();
        let result = Engine::new()
            .encrypt_package(&mut files, ".env.production", ".env", None, false)
            .unwrap();
        assert!(result.pruned.is_empty());
        assert_eq!(files.len(), 4);
        assert!(files.contains_key(".env.staging"));
    }

    #[test]
    fn test_prune_can_remove_target() {
        let mut files = files();
        let pattern = Regex::new(r"^\.env").unwrap();
        Engine::new()
            .encrypt_package(&mut files, ".env.staging", ".env.out", Some(&pattern), false)
            .unwrap();
        assert_eq!(files.len(), 1);
        assert!(files.contains_key("index.mjs"));
    }

    #[test]
    fn test_environment_mismatch() {
        let mut files = files();
        files.insert(
            ".env.staging".into(),
            b"NODE_ENV=production\nVAR_1=panic".to_vec(),
        );
        let err = Engine::new()
            .encrypt_package(&mut files, ".env.staging", ".env", None, false)
            .unwrap_err();
        assert_eq!(err.kind, Some(ErrorKind::EnvironmentMismatch));
        // Nothing was written.
        assert_eq!(files[".env"], b"VAR_1=abc\nVAR_2=xyz");

        let result = Engine::new()
            .encrypt_package(&mut files, ".env.staging", ".env", None, true)
            .unwrap();
        assert_eq!(result.json.len(), 2);
    }
}
