//! Session log file naming
//!
//! A session log is either named by the caller or gets a timestamp name
//! (`<directory>/<YYYY-MM-DD_HH-MM-SS>.<ext>`). Caller-supplied names are plain
//! file names: anything that could escape the log directory is rejected.

use crate::error::{RecorderError, Result};
use chrono::{DateTime, Local};
use std::path::{Path, PathBuf};

/// strftime pattern for generated names
pub const AUTO_NAME_FORMAT: &str = "%Y-%m-%d_%H-%M-%S";

/// Longest accepted name, in bytes
pub const MAX_NAME_LEN: usize = 200;

/// Numbered variants tried when a generated name is already taken
const MAX_AUTO_SUFFIX: u32 = 999;

/// Check that a caller-supplied session name is a plain file name
pub fn validate_name(name: &str) -> Result<()> {
    let reject = |reason: &'static str| {
        Err(RecorderError::InvalidFilename {
            name: name.to_string(),
            reason,
        })
    };

    if name.trim().is_empty() {
        return reject("name is empty");
    }
    if name.len() > MAX_NAME_LEN {
        return reject("name is too long");
    }
    if name.contains(|c: char| matches!(c, '/' | '\\' | ':')) {
        return reject("path separators are not allowed");
    }
    if name.starts_with('.') {
        return reject("name must not start with '.'");
    }
    if name.chars().any(char::is_control) {
        return reject("control characters are not allowed");
    }
    Ok(())
}

/// Validate a name and add `ext` when it has no extension of its own
pub fn normalize_name(name: &str, ext: &str) -> Result<String> {
    let name = name.trim();
    validate_name(name)?;

    match Path::new(name).extension() {
        Some(own) if !own.is_empty() => Ok(name.to_string()),
        // "run." has an empty extension; treat it as none
        _ => Ok(format!("{}.{}", name.trim_end_matches('.'), ext)),
    }
}

/// Generated file name for a session started at `at`
pub fn auto_name(at: DateTime<Local>, ext: &str) -> String {
    format!("{}.{}", at.format(AUTO_NAME_FORMAT), ext)
}

/// Resolve the log path for a new session
///
/// A custom name that already exists fails with `FilenameCollision` unless
/// `overwrite` is set. A generated name that is taken (two sessions within
/// one second) gets a `_N` suffix instead. Nothing is created on disk.
pub fn resolve_log_path(
    directory: &Path,
    name: Option<&str>,
    ext: &str,
    overwrite: bool,
) -> Result<PathBuf> {
    match name {
        Some(name) => {
            let path = directory.join(normalize_name(name, ext)?);
            if path.exists() && !overwrite {
                return Err(RecorderError::FilenameCollision(path));
            }
            Ok(path)
        }
        None => resolve_auto_path(directory, Local::now(), ext, overwrite),
    }
}

fn resolve_auto_path(
    directory: &Path,
    at: DateTime<Local>,
    ext: &str,
    overwrite: bool,
) -> Result<PathBuf> {
    let path = directory.join(auto_name(at, ext));
    if overwrite || !path.exists() {
        return Ok(path);
    }

    let stem = at.format(AUTO_NAME_FORMAT).to_string();
    for n in 1..=MAX_AUTO_SUFFIX {
        let candidate = directory.join(format!("{}_{}.{}", stem, n, ext));
        if !candidate.exists() {
            return Ok(candidate);
        }
    }
    Err(RecorderError::FilenameCollision(path))
}
