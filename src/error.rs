use std::error::Error as StdError;

use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum ErrorCategory {
    /// Any failure that cannot be confidently attributed to any other error
    /// category in this enum.
    ///
    /// In particular this means that use of Internal is never a guarantee
    /// the error is not, for example due to a user error - merely that it
    /// cannot be confidently determined by the code.
    Internal,

    /// The user provided invalid input or performed an action that is
    /// unsupported or impossible to complete.
    User,
}

/// Fine-grained condition flags for consumers that want to branch on error kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum ErrorKind {
    /// Key material or cipher settings are unusable: a secret carrier
    /// without an IV carrier (or vice versa), an unknown cipher method, or
    /// key/IV values of the wrong length.
    Configuration,
    /// A path does not exist or does not name a regular file.
    NotFound,
    /// The same key appeared twice in one env file.
    DuplicateKey,
    /// The input could not be interpreted as env file text.
    InvalidInput,
    /// A `NODE_ENV` entry disagreed with the environment the file was
    /// selected for.
    EnvironmentMismatch,
    /// Encrypted entries were found but the secret or IV carrier was absent.
    MissingMetadata,
    /// A token could not be decoded or deciphered with the given key material.
    DecryptionFailed,
    /// A seed could not be obtained from the configured reader.
    SeedUnavailable,
    /// Unexpected state reached within envcrypt logic.
    InternalInvariant,
    /// Interaction with the filesystem, stdin/stdout, or other I/O failed.
    Io,
}

#[derive(Debug, Error)]
#[error("{msg}")]
pub struct EnvcryptError {
    /// Broad error category, always provided.
    pub category: ErrorCategory,
    /// Optional specific condition tag for consumers that need to
    /// branch their behavior. Any code consuming errors MUST handle
    /// the absence of a defined kind.
    pub kind: Option<ErrorKind>,
    #[source]
    source: Option<Box<dyn StdError + Send + Sync + 'static>>,
    msg: String,
}

impl EnvcryptError {
    /// Creates a new error with a required category and display message.
    pub fn new(category: ErrorCategory, msg: impl Into<String>) -> Self {
        Self {
            category,
            kind: None,
            source: None,
            msg: msg.into(),
        }
    }

    /// Creates a new error that also tags the failure with a kind.
    pub fn with_kind(category: ErrorCategory, kind: ErrorKind, msg: impl Into<String>) -> Self {
        Self {
            category,
            kind: Some(kind),
            source: None,
            msg: msg.into(),
        }
    }

    /// Creates a new error that carries both a kind tag and the originating source error.
    pub fn with_kind_and_source(
        category: ErrorCategory,
        kind: ErrorKind,
        msg: impl Into<String>,
        source: impl StdError + Send + Sync + 'static,
    ) -> Self {
        Self {
            category,
            kind: Some(kind),
            source: Some(Box::new(source)),
            msg: msg.into(),
        }
    }

    /// Shorthand for a user-caused configuration error.
    pub fn configuration(msg: impl Into<String>) -> Self {
        Self::with_kind(ErrorCategory::User, ErrorKind::Configuration, msg)
    }

    /// Shorthand for a token that failed to decode or decipher.
    pub fn decryption(msg: impl Into<String>) -> Self {
        Self::with_kind(ErrorCategory::User, ErrorKind::DecryptionFailed, msg)
    }

    /// The user-facing message carried by the error.
    pub fn message(&self) -> &str {
        &self.msg
    }

    /// Returns the preserved source error if present.
    pub fn source_error(&self) -> Option<&(dyn StdError + Send + Sync + 'static)> {
        self.source.as_deref()
    }

    /// Wraps the current error with a higher-level message while preserving the original as source.
    pub fn with_context(self, msg: impl Into<String>) -> Self {
        let category = self.category;
        let kind = self.kind;
        Self {
            category,
            kind,
            source: Some(Box::new(self)),
            msg: msg.into(),
        }
    }
}

/// Convenience alias.
pub type Result<T> = std::result::Result<T, EnvcryptError>;
