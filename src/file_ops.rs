//! Filesystem helpers
//!
//! Reading env files and packages from disk, and writing encrypted output
//! with owner-only permissions.

use crate::error::{EnvcryptError, ErrorCategory, ErrorKind, Result};
use crate::package::Package;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Expand a leading `~` to the current user's home directory.
///
/// Paths without a leading `~`, and environments without a home directory,
/// are returned unchanged.
pub fn expand_home(path: &Path) -> PathBuf {
    let Some(text) = path.to_str() else {
        return path.to_path_buf();
    };
    let rest = if text == "~" {
        ""
    } else if let Some(rest) = text.strip_prefix("~/") {
        rest
    } else {
        return path.to_path_buf();
    };
    match dirs::home_dir() {
        Some(home) if rest.is_empty() => home,
        Some(home) => home.join(rest),
        None => path.to_path_buf(),
    }
}

/// Read an env file, requiring that it exists and is a regular file.
pub fn read_env_file(path: &Path) -> Result<Vec<u8>> {
    if !path.exists() {
        return Err(EnvcryptError::with_kind(
            ErrorCategory::User,
            ErrorKind::NotFound,
            format!("path \"{}\" does not exist", path.display()),
        ));
    }
    if !path.is_file() {
        return Err(EnvcryptError::with_kind(
            ErrorCategory::User,
            ErrorKind::NotFound,
            format!("path \"{}\" is not a valid file", path.display()),
        ));
    }
    fs::read(path).map_err(|e| read_error(path, e))
}

/// Load the regular files directly inside `dir` into a package, keyed by
/// file name. Subdirectories are not descended into.
pub fn load_package_dir(dir: &Path) -> Result<Package> {
    let entries = fs::read_dir(dir).map_err(|e| read_error(dir, e))?;
    let mut package = Package::new();
    for entry in entries {
        let entry = entry.map_err(|e| read_error(dir, e))?;
        let path = entry.path();
        if !path.is_file() {
            continue;
        }
        let name = entry.file_name().into_string().map_err(|name| {
            EnvcryptError::with_kind(
                ErrorCategory::User,
                ErrorKind::InvalidInput,
                format!("file name {:?} is not valid UTF-8", name),
            )
        })?;
        let contents = fs::read(&path).map_err(|e| read_error(&path, e))?;
        package.insert(name, contents);
    }
    Ok(package)
}

/// Write every file of a package into `dir`, creating it if needed.
///
/// Files named in `pruned` are deleted from `dir` when present, so a package
/// written over its own source directory does not keep pruned files.
pub fn write_package_dir(dir: &Path, package: &Package, pruned: &[String]) -> Result<()> {
    fs::create_dir_all(dir).map_err(|e| {
        EnvcryptError::with_kind_and_source(
            ErrorCategory::User,
            ErrorKind::Io,
            format!("failed to create {}", dir.display()),
            e,
        )
    })?;
    for (name, contents) in package {
        let path = dir.join(name);
        write_file_secure(&path, contents)
            .map_err(|e| e.with_context(format!("failed to write package file {name}")))?;
    }
    for name in pruned.iter().filter(|name| !package.contains_key(*name)) {
        let path = dir.join(name);
        if !path.is_file() {
            continue;
        }
        fs::remove_file(&path).map_err(|e| {
            EnvcryptError::with_kind_and_source(
                ErrorCategory::User,
                ErrorKind::Io,
                format!("failed to remove pruned file {}", path.display()),
                e,
            )
        })?;
        debug!(path = %path.display(), "removed pruned file");
    }
    Ok(())
}

/// Atomically replace `path` with `contents` (tempfile + fsync + rename).
///
/// Either the old file or the new file exists afterwards, never a partial
/// one. The new file is created with mode 0o600 on Unix systems.
pub fn write_file_atomic(path: &Path, contents: &[u8]) -> Result<()> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    let mut temp_file = tempfile::NamedTempFile::new_in(dir).map_err(|e| {
        EnvcryptError::with_kind_and_source(
            ErrorCategory::Internal,
            ErrorKind::Io,
            "failed to create tempfile",
            e,
        )
    })?;
    temp_file.write_all(contents).map_err(|e| {
        EnvcryptError::with_kind_and_source(
            ErrorCategory::Internal,
            ErrorKind::Io,
            "failed to write to tempfile",
            e,
        )
    })?;
    temp_file.flush().map_err(|e| {
        EnvcryptError::with_kind_and_source(
            ErrorCategory::Internal,
            ErrorKind::Io,
            "failed to flush tempfile",
            e,
        )
    })?;
    temp_file.as_file().sync_all().map_err(|e| {
        EnvcryptError::with_kind_and_source(
            ErrorCategory::Internal,
            ErrorKind::Io,
            "failed to sync file prior to rename",
            e,
        )
    })?;

    // NamedTempFile is already 0o600 on Unix.
    temp_file.persist(path).map_err(|e| {
        EnvcryptError::with_kind_and_source(
            ErrorCategory::Internal,
            ErrorKind::Io,
            format!("failed to rename to target file {}", path.display()),
            e,
        )
    })?;
    Ok(())
}

/// Write file with secure permissions (0o600 on Unix)
pub fn write_file_secure(path: &Path, contents: &[u8]) -> Result<()> {
    #[cfg(unix)]
    {
        use std::fs::OpenOptions;
        use std::os::unix::fs::OpenOptionsExt;

        let mut file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .mode(0o600)
            .open(path)
            .map_err(|e| {
                EnvcryptError::with_kind_and_source(
                    ErrorCategory::User,
                    ErrorKind::Io,
                    format!("failed to open {}", path.display()),
                    e,
                )
            })?;

        file.write_all(contents).map_err(|e| {
            EnvcryptError::with_kind_and_source(
                ErrorCategory::Internal,
                ErrorKind::Io,
                format!("failed to write {}", path.display()),
                e,
            )
        })?;
        Ok(())
    }

    #[cfg(not(unix))]
    {
        fs::write(path, contents).map_err(|e| {
            EnvcryptError::with_kind_and_source(
                ErrorCategory::User,
                ErrorKind::Io,
                format!("failed to write {}", path.display()),
                e,
            )
        })?;
        Ok(())
    }
}

fn read_error(path: &Path, err: io::Error) -> EnvcryptError {
    let (category, kind) = if err.kind() == io::ErrorKind::NotFound {
        (ErrorCategory::User, ErrorKind::NotFound)
    } else {
        (ErrorCategory::Internal, ErrorKind::Io)
    };
    EnvcryptError::with_kind_and_source(
        category,
        kind,
        format!("failed to read from {}", path.display()),
        err,
    )
}
