//! Seed reading functionality

use crate::error::{EnvcryptError, ErrorCategory, ErrorKind, Result};
use std::io::{self, BufRead, IsTerminal, Write};
use zeroize::Zeroizing;

/// Trait for reading key derivation seeds from various sources
pub trait SeedReader {
    /// Read the seed named by `label` (e.g. "secret" or "iv").
    ///
    /// Returns the seed wrapped in `Zeroizing` to ensure it is securely
    /// wiped from memory when dropped.
    fn read_seed(&mut self, label: &str) -> Result<Zeroizing<String>>;
}

/// Returns fixed seeds, one per call, in order (for testing)
pub struct ConstantSeedReader {
    seeds: Vec<Zeroizing<String>>,
    next: usize,
}

impl ConstantSeedReader {
    pub fn new<I, S>(seeds: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            seeds: seeds.into_iter().map(|s| Zeroizing::new(s.into())).collect(),
            next: 0,
        }
    }
}

impl SeedReader for ConstantSeedReader {
    fn read_seed(&mut self, label: &str) -> Result<Zeroizing<String>> {
        let seed = self.seeds.get(self.next).ok_or_else(|| {
            EnvcryptError::with_kind(
                ErrorCategory::Internal,
                ErrorKind::SeedUnavailable,
                format!("no {label} seed left"),
            )
        })?;
        self.next += 1;
        Ok(seed.clone())
    }
}

/// Reads one seed per line from any buffered source, such as stdin
pub struct LineSeedReader {
    reader: Box<dyn BufRead>,
}

impl LineSeedReader {
    pub fn new(reader: Box<dyn BufRead>) -> Self {
        Self { reader }
    }
}

impl SeedReader for LineSeedReader {
    fn read_seed(&mut self, label: &str) -> Result<Zeroizing<String>> {
        let mut line = Zeroizing::new(String::new());
        let read = self.reader.read_line(&mut line).map_err(|e| {
            EnvcryptError::with_kind_and_source(
                ErrorCategory::Internal,
                ErrorKind::Io,
                format!("error reading {label} seed: {}", e),
                e,
            )
        })?;
        if read == 0 {
            return Err(EnvcryptError::with_kind(
                ErrorCategory::User,
                ErrorKind::SeedUnavailable,
                format!("input ended before the {label} seed"),
            ));
        }
        let trimmed = line.trim_end_matches(['\n', '\r']).len();
        line.truncate(trimmed);
        Ok(line)
    }
}

/// Reads seeds from terminal with no echo
pub struct TerminalSeedReader;

impl TerminalSeedReader {
    pub fn new() -> Self {
        Self
    }
}

impl Default for TerminalSeedReader {
    fn default() -> Self {
        Self::new()
    }
}

impl SeedReader for TerminalSeedReader {
    fn read_seed(&mut self, label: &str) -> Result<Zeroizing<String>> {
        if !io::stdin().is_terminal() {
            return Err(EnvcryptError::with_kind(
                ErrorCategory::User,
                ErrorKind::SeedUnavailable,
                "cannot read seed from terminal - stdin is not a terminal",
            ));
        }

        io::stderr()
            .write_all(format!("{label} seed (envcrypt): ").as_bytes())
            .and_then(|_| io::stderr().flush())
            .map_err(|e| {
                EnvcryptError::with_kind_and_source(
                    ErrorCategory::Internal,
                    ErrorKind::Io,
                    format!("failed to write prompt: {}", e),
                    e,
                )
            })?;

        // Read *without echo*
        let seed = rpassword::read_password().map_err(|e| {
            EnvcryptError::with_kind_and_source(
                ErrorCategory::Internal,
                ErrorKind::SeedUnavailable,
                format!("failure reading {label} seed: {}", e),
                e,
            )
        })?;

        Ok(Zeroizing::new(seed))
    }
}
