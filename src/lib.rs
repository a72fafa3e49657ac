//! envcrypt - Encrypt `.env` files for transport and restore them into an environment

#![forbid(unsafe_code)]

pub mod armor;
pub mod cipher;
pub mod dotenv;
pub mod engine;
pub mod error;
pub mod file_ops;
pub mod keys;
pub mod package;
pub mod process_env;
pub mod seed;

pub use dotenv::EnvMap;
pub use engine::{EncryptionMetadata, EncryptionResult, Engine};
pub use error::{EnvcryptError, ErrorCategory, ErrorKind, Result};
pub use keys::{CipherMethod, KeyMaterial};
pub use package::{Package, PackageResult};
