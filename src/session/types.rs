//! Session data types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::error::RecorderError;

/// Phase of the session state machine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Phase {
    /// No active session
    #[default]
    Idle,
    /// Acquisition loop is running and appending to the log
    Recording,
    /// Log closed, waiting for archive or discard
    Stopped,
    /// Closed log is being handed to the archiver
    Archiving,
}

impl Phase {
    /// Check if currently recording
    pub fn is_recording(&self) -> bool {
        matches!(self, Phase::Recording)
    }

    /// Check if a closed log is waiting for archive or discard
    pub fn has_recording(&self) -> bool {
        matches!(self, Phase::Stopped | Phase::Archiving)
    }

    /// Display name for the state
    pub fn display_name(&self) -> &'static str {
        match self {
            Phase::Idle => "Idle",
            Phase::Recording => "Recording",
            Phase::Stopped => "Stopped",
            Phase::Archiving => "Archiving",
        }
    }
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.display_name())
    }
}

/// One recording run
///
/// Lifecycle fields (`file_name`, `path`, `archived`) belong to the controller;
/// counters (`started_at`, `sample_count`, `elapsed_ms`) belong to the
/// acquisition loop while recording.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct SessionInfo {
    /// Log file name within the log directory
    pub file_name: Option<String>,
    /// Full log file path
    pub path: Option<PathBuf>,
    /// Wall-clock time of the first loop iteration
    pub started_at: Option<DateTime<Utc>>,
    /// Number of samples appended to the log
    pub sample_count: u64,
    /// Time since `started_at`, frozen when the loop exits
    pub elapsed_ms: u64,
    /// Whether the log was archived successfully
    pub archived: bool,
}

impl SessionInfo {
    /// Fresh session for a newly opened log
    pub fn for_log(path: PathBuf) -> Self {
        Self {
            file_name: path
                .file_name()
                .map(|name| name.to_string_lossy().into_owned()),
            path: Some(path),
            ..Default::default()
        }
    }

    /// Whether this session has a log file identity
    pub fn has_log(&self) -> bool {
        self.path.is_some()
    }
}

/// Outcome of the last archive attempt
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ArchiveStatus {
    /// Nothing archived in this cycle
    #[default]
    Idle,
    /// Upload in progress
    InProgress,
    /// Upload succeeded
    Succeeded { remote_id: String, file_name: String },
    /// Upload failed; the session can be archived again or discarded
    Failed(String),
}

impl ArchiveStatus {
    /// Remote identifier of a successful upload
    pub fn remote_id(&self) -> Option<&str> {
        match self {
            ArchiveStatus::Succeeded { remote_id, .. } => Some(remote_id),
            _ => None,
        }
    }

    /// Check if the last archive succeeded
    pub fn is_succeeded(&self) -> bool {
        matches!(self, ArchiveStatus::Succeeded { .. })
    }
}

/// Result of a successful `archive()` call
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArchiveOutcome {
    /// Identifier returned by the archival collaborator
    pub remote_id: String,
    /// Local path of the archived log
    pub path: PathBuf,
    /// Number of samples in the archived log
    pub sample_count: u64,
}

/// Severity of a published acquisition fault
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FaultSeverity {
    /// A poll failed; recording continues after a backoff
    Transient,
    /// The log could not be written; the acquisition loop has stopped
    Fatal,
}

/// The last error observed by the acquisition loop
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SampleFault {
    pub severity: FaultSeverity,
    pub message: String,
    pub occurred_at: DateTime<Utc>,
}

impl SampleFault {
    /// Fault for a failed sensor poll
    pub fn transient(message: impl Into<String>) -> Self {
        Self {
            severity: FaultSeverity::Transient,
            message: message.into(),
            occurred_at: Utc::now(),
        }
    }

    /// Check if the fault ended the recording
    pub fn is_fatal(&self) -> bool {
        self.severity == FaultSeverity::Fatal
    }
}

impl From<&RecorderError> for SampleFault {
    fn from(err: &RecorderError) -> Self {
        let severity = if err.is_fatal() {
            FaultSeverity::Fatal
        } else {
            FaultSeverity::Transient
        };
        Self {
            severity,
            message: err.to_string(),
            occurred_at: Utc::now(),
        }
    }
}
