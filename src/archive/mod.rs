//! Archival collaborators
//!
//! An [`Archiver`] takes a closed session log and returns an opaque remote
//! identifier. The controller treats every failure as non-retriable at this
//! layer: it records `Failed(reason)` and leaves the session archivable.
//!
//! # Implementations
//!
//! - [`DirectoryArchiver`] - Copies the log into an archive folder (a mounted
//!   share or a directory watched by a sync client)
//! - [`CommandArchiver`] - Runs an external uploader; stdout is the remote id
//! - [`DisabledArchiver`] - Always fails; used when `archive.method = "none"`

use crate::config::{ArchiveConfig, ArchiveMethod};
use crate::error::{RecorderError, Result};
use anyhow::Context;
use chrono::Utc;
use std::path::{Path, PathBuf};
use std::process::Command;

/// Placeholder in `archive.args` replaced by the log path
pub const PATH_PLACEHOLDER: &str = "{path}";

/// Remote archival collaborator
pub trait Archiver: Send {
    /// Hand off a closed log file; returns the remote identifier
    fn upload(&mut self, path: &Path) -> anyhow::Result<String>;

    /// Human-readable name for logs
    fn name(&self) -> &str {
        "archiver"
    }
}

impl<A: Archiver + ?Sized> Archiver for Box<A> {
    fn upload(&mut self, path: &Path) -> anyhow::Result<String> {
        (**self).upload(path)
    }

    fn name(&self) -> &str {
        (**self).name()
    }
}

/// Build the archiver selected by the `[archive]` section
pub fn from_config(config: &ArchiveConfig) -> Result<Box<dyn Archiver>> {
    match config.method {
        ArchiveMethod::None => Ok(Box::new(DisabledArchiver)),
        ArchiveMethod::Directory => Ok(Box::new(DirectoryArchiver::new(&config.directory))),
        ArchiveMethod::Command => {
            let program = config.program.clone().ok_or_else(|| {
                RecorderError::Config("archive.program is required for the command method".into())
            })?;
            Ok(Box::new(CommandArchiver::new(program, config.args.clone())))
        }
    }
}

/// Copies logs into an archive directory
#[derive(Debug, Clone)]
pub struct DirectoryArchiver {
    target: PathBuf,
}

impl DirectoryArchiver {
    pub fn new(target: impl Into<PathBuf>) -> Self {
        Self {
            target: target.into(),
        }
    }

    pub fn target(&self) -> &Path {
        &self.target
    }
}

impl Archiver for DirectoryArchiver {
    fn upload(&mut self, path: &Path) -> anyhow::Result<String> {
        let file_name = path
            .file_name()
            .with_context(|| format!("{:?} has no file name", path))?
            .to_string_lossy();

        std::fs::create_dir_all(&self.target)
            .with_context(|| format!("cannot create archive directory {:?}", self.target))?;

        // Millisecond prefix keeps re-archived files from replacing each other
        let remote_id = format!("{}-{}", Utc::now().timestamp_millis(), file_name);
        let destination = self.target.join(&remote_id);
        std::fs::copy(path, &destination)
            .with_context(|| format!("cannot copy {:?} to {:?}", path, destination))?;

        tracing::debug!("Archived {:?} as {:?}", path, destination);
        Ok(remote_id)
    }

    fn name(&self) -> &str {
        "directory"
    }
}

/// Runs an external uploader program
///
/// Arguments containing `{path}` get the log path substituted; if none does,
/// the path is appended as the last argument. A zero exit status with
/// non-empty stdout is success, and the trimmed stdout is the remote id.
#[derive(Debug, Clone)]
pub struct CommandArchiver {
    program: String,
    args: Vec<String>,
}

impl CommandArchiver {
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
        }
    }

    /// Arguments for uploading `path`
    pub fn command_args(&self, path: &Path) -> Vec<String> {
        let path = path.to_string_lossy();
        let mut args: Vec<String> = self
            .args
            .iter()
            .map(|arg| arg.replace(PATH_PLACEHOLDER, &path))
            .collect();
        if !self.args.iter().any(|arg| arg.contains(PATH_PLACEHOLDER)) {
            args.push(path.into_owned());
        }
        args
    }
}

impl Archiver for CommandArchiver {
    fn upload(&mut self, path: &Path) -> anyhow::Result<String> {
        let output = Command::new(&self.program)
            .args(self.command_args(path))
            .output()
            .with_context(|| format!("cannot run uploader {:?}", self.program))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            anyhow::bail!(
                "uploader {:?} exited with {}: {}",
                self.program,
                output.status,
                stderr.trim()
            );
        }

        let remote_id = String::from_utf8_lossy(&output.stdout).trim().to_string();
        if remote_id.is_empty() {
            anyhow::bail!("uploader {:?} printed no file id", self.program);
        }
        Ok(remote_id)
    }

    fn name(&self) -> &str {
        &self.program
    }
}

/// Archiver used when archiving is turned off
#[derive(Debug, Clone, Copy, Default)]
pub struct DisabledArchiver;

impl Archiver for DisabledArchiver {
    fn upload(&mut self, _path: &Path) -> anyhow::Result<String> {
        anyhow::bail!("archiving is disabled (archive.method = \"none\")")
    }

    fn name(&self) -> &str {
        "disabled"
    }
}
