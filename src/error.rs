//! Error handling for the IMU recorder
//!
//! This module defines the recorder's error taxonomy and a Result alias for use
//! throughout the crate. Errors fall into four classes (see [`ErrorClass`]):
//! transient sensor faults that never stop a session, fatal persistence faults
//! that end the active recording, usage errors raised when an operation is called
//! in the wrong phase, and archival failures reported by the upload collaborator.

use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

use crate::session::types::Phase;

/// Main error type for recorder operations
#[derive(Error, Debug)]
pub enum RecorderError {
    /// A single sensor poll failed; the session keeps running
    #[error("Sensor read failed: {0}")]
    TransientSample(String),

    /// Opening, appending to, or closing the session log failed
    #[error("Log persistence error on {path:?}: {message}")]
    Persistence { path: PathBuf, message: String },

    /// Operation is not allowed in the current phase
    #[error("Cannot {operation} while {phase}")]
    InvalidPhase {
        operation: &'static str,
        phase: Phase,
    },

    /// A recording session is already active
    #[error("A session is already active ({0})")]
    SessionActive(Phase),

    /// The completed session has already been archived
    #[error("Session already archived as {remote_id}")]
    AlreadyArchived { remote_id: String },

    /// The archival collaborator reported a failure
    #[error("Archival failed: {0}")]
    Archival(String),

    /// The requested log file already exists
    #[error("Log file already exists: {0:?}")]
    FilenameCollision(PathBuf),

    /// A caller-supplied session name was rejected
    #[error("Invalid session name {name:?}: {reason}")]
    InvalidFilename { name: String, reason: &'static str },

    /// The closed log file vanished before it could be archived
    #[error("Log file not found: {0:?}")]
    LogFileMissing(PathBuf),

    /// The acquisition loop ignored the stop signal
    #[error("Acquisition loop did not exit within {timeout:?}")]
    LoopStalled { timeout: Duration },

    /// The acquisition loop ended without handing back the log
    #[error("Acquisition loop terminated unexpectedly")]
    LoopPanicked,

    /// No sample source could be obtained for a new session
    #[error("Sample source unavailable: {0}")]
    SourceUnavailable(String),

    /// The recorder was shut down and accepts no further sessions
    #[error("Recorder has been shut down")]
    ShutDown,

    /// Errors related to configuration loading/saving
    #[error("Configuration error: {0}")]
    Config(String),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Generic errors with context
    #[error("{context}: {source}")]
    WithContext {
        context: String,
        #[source]
        source: Box<RecorderError>,
    },
}

/// Coarse classification of a [`RecorderError`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Absorbed by the acquisition loop, visible only through the snapshot
    Transient,
    /// Ends the current session or signals an operational failure
    Fatal,
    /// Operation called in the wrong state or with bad input; no side effects
    Usage,
    /// Upload collaborator failure; the session stays archivable
    Archival,
}

impl RecorderError {
    /// Add context to an error
    pub fn with_context(self, context: impl Into<String>) -> Self {
        RecorderError::WithContext {
            context: context.into(),
            source: Box::new(self),
        }
    }

    /// Build a persistence error for a log path
    pub fn persistence(path: impl Into<PathBuf>, message: impl std::fmt::Display) -> Self {
        RecorderError::Persistence {
            path: path.into(),
            message: message.to_string(),
        }
    }

    /// Classify the error according to the recorder's propagation policy
    pub fn class(&self) -> ErrorClass {
        match self {
            RecorderError::TransientSample(_) => ErrorClass::Transient,
            RecorderError::Persistence { .. }
            | RecorderError::LoopStalled { .. }
            | RecorderError::LoopPanicked
            | RecorderError::SourceUnavailable(_)
            | RecorderError::Io(_) => ErrorClass::Fatal,
            RecorderError::InvalidPhase { .. }
            | RecorderError::SessionActive(_)
            | RecorderError::AlreadyArchived { .. }
            | RecorderError::FilenameCollision(_)
            | RecorderError::InvalidFilename { .. }
            | RecorderError::LogFileMissing(_)
            | RecorderError::ShutDown
            | RecorderError::Config(_) => ErrorClass::Usage,
            RecorderError::Archival(_) => ErrorClass::Archival,
            RecorderError::WithContext { source, .. } => source.class(),
        }
    }

    /// Check if this error ended (or would end) the active session
    pub fn is_fatal(&self) -> bool {
        self.class() == ErrorClass::Fatal
    }
}

/// Result type alias for recorder operations
pub type Result<T> = std::result::Result<T, RecorderError>;

/// Extension trait for adding context to Results
pub trait ResultExt<T> {
    /// Add context to an error result
    fn context(self, context: impl Into<String>) -> Result<T>;

    /// Add context lazily to an error result
    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String;
}

impl<T> ResultExt<T> for Result<T> {
    fn context(self, context: impl Into<String>) -> Result<T> {
        self.map_err(|e| e.with_context(context))
    }

    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String,
    {
        self.map_err(|e| e.with_context(f()))
    }
}
