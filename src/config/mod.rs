//! Configuration module for the IMU recorder
//!
//! All runtime inputs are supplied at construction through [`RecorderConfig`],
//! which is stored as TOML:
//!
//! - Sampling rate, error backoff and stop timeout
//! - Log directory and file conventions
//! - Sensor source selection
//! - Archival method
//! - Console refresh interval and logging
//!
//! # Config Location
//!
//! When no path is given on the command line the config is read from the
//! platform config directory:
//! - **Linux**: `~/.config/imu-recorder/recorder.toml`
//! - **macOS**: `~/Library/Application Support/imu-recorder/recorder.toml`
//! - **Windows**: `%APPDATA%\imu-recorder\recorder.toml`
//!
//! # Example
//!
//! ```toml
//! [sampling]
//! frequency_hz = 50.0
//! error_backoff_ms = 500
//!
//! [storage]
//! log_directory = "sensor_data"
//!
//! [archive]
//! method = "command"
//! program = "rclone"
//! args = ["copy", "{path}", "drive:imu"]
//! ```

use crate::error::{RecorderError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Application identifier for config directories
pub const APP_ID: &str = "imu-recorder";

/// Config filename
pub const CONFIG_FILE: &str = "recorder.toml";

/// Default sampling frequency in Hz
pub const DEFAULT_FREQUENCY_HZ: f64 = 50.0;

/// Default delay after a failed sensor poll in milliseconds
pub const DEFAULT_ERROR_BACKOFF_MS: u64 = 500;

/// Default bound on waiting for the acquisition loop to exit
pub const DEFAULT_STOP_TIMEOUT_MS: u64 = 2000;

/// Default directory for session logs
pub const DEFAULT_LOG_DIRECTORY: &str = "sensor_data";

/// Default log file extension
pub const DEFAULT_LOG_EXTENSION: &str = "csv";

/// Default console snapshot refresh interval
pub const DEFAULT_REFRESH_INTERVAL_MS: u64 = 100;

/// Get the default config file path
pub fn default_config_path() -> Option<PathBuf> {
    dirs_next::config_dir().map(|p| p.join(APP_ID).join(CONFIG_FILE))
}

/// Period for a sampling rate
///
/// The rate must be finite and positive, and its period must fit a `Duration`.
pub fn sample_period_for(frequency_hz: f64) -> Result<Duration> {
    if !frequency_hz.is_finite() || frequency_hz <= 0.0 {
        return Err(RecorderError::Config(format!(
            "sampling.frequency_hz must be a positive number, got {}",
            frequency_hz
        )));
    }
    Duration::try_from_secs_f64(1.0 / frequency_hz).map_err(|e| {
        RecorderError::Config(format!(
            "sampling.frequency_hz {} has no usable sample period: {}",
            frequency_hz, e
        ))
    })
}

// ==================== Recorder Config ====================

/// Complete recorder configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct RecorderConfig {
    #[serde(default)]
    pub sampling: SamplingConfig,

    #[serde(default)]
    pub storage: StorageConfig,

    #[serde(default)]
    pub source: SourceConfig,

    #[serde(default)]
    pub archive: ArchiveConfig,

    #[serde(default)]
    pub console: ConsoleConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

impl RecorderConfig {
    /// Create a new default configuration
    pub fn new() -> Self {
        Self::default()
    }

    /// Load and validate a config file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            RecorderError::Config(format!("Failed to read config file {:?}: {}", path, e))
        })?;

        let config: Self = toml::from_str(&content).map_err(|e| {
            RecorderError::Config(format!("Failed to parse config file {:?}: {}", path, e))
        })?;

        config.validate()?;
        Ok(config)
    }

    /// Load a config file, falling back to defaults when it is absent or invalid
    pub fn load_or_default(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref();
        if !path.exists() {
            tracing::info!("No config at {:?}, using defaults", path);
            return Self::default();
        }
        Self::load(path).unwrap_or_else(|e| {
            tracing::warn!("Failed to load config, using defaults: {}", e);
            Self::default()
        })
    }

    /// Save the config as TOML
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                RecorderError::Config(format!("Failed to create config directory: {}", e))
            })?;
        }

        let content = toml::to_string_pretty(self)
            .map_err(|e| RecorderError::Config(format!("Failed to serialize config: {}", e)))?;

        std::fs::write(path, content).map_err(|e| {
            RecorderError::Config(format!("Failed to write config file {:?}: {}", path, e))
        })
    }

    /// Check the invariants the engine relies on
    pub fn validate(&self) -> Result<()> {
        let period = self.sample_period()?;
        if self.error_backoff() <= period {
            return Err(RecorderError::Config(format!(
                "sampling.error_backoff_ms ({} ms) must exceed the sample period ({:?})",
                self.sampling.error_backoff_ms, period
            )));
        }

        if self.sampling.stop_timeout_ms == 0 {
            return Err(RecorderError::Config(
                "sampling.stop_timeout_ms must be greater than zero".to_string(),
            ));
        }

        if self.storage.extension.is_empty()
            || self
                .storage
                .extension
                .contains(|c: char| matches!(c, '/' | '\\' | '.'))
        {
            return Err(RecorderError::Config(format!(
                "storage.extension {:?} must be a bare extension such as \"csv\"",
                self.storage.extension
            )));
        }

        if !(0.0..=1.0).contains(&self.source.failure_rate) {
            return Err(RecorderError::Config(format!(
                "source.failure_rate must be within 0.0..=1.0, got {}",
                self.source.failure_rate
            )));
        }

        if self.archive.method == ArchiveMethod::Command && self.archive.program.is_none() {
            return Err(RecorderError::Config(
                "archive.program is required when archive.method = \"command\"".to_string(),
            ));
        }

        Ok(())
    }

    /// Target period between samples (1 / frequency)
    pub fn sample_period(&self) -> Result<Duration> {
        sample_period_for(self.sampling.frequency_hz)
    }

    /// Delay applied after a failed poll
    pub fn error_backoff(&self) -> Duration {
        Duration::from_millis(self.sampling.error_backoff_ms)
    }

    /// Bound on waiting for the acquisition loop to exit
    pub fn stop_timeout(&self) -> Duration {
        Duration::from_millis(self.sampling.stop_timeout_ms)
    }

    /// Interval of the console's snapshot poll
    pub fn refresh_interval(&self) -> Duration {
        Duration::from_millis(self.console.refresh_interval_ms.max(1))
    }
}

// ==================== Sampling Config ====================

/// Acquisition loop timing
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SamplingConfig {
    /// Target sampling rate in Hz
    pub frequency_hz: f64,

    /// Delay after a failed poll before retrying
    pub error_backoff_ms: u64,

    /// How long stop/shutdown wait for the loop to exit
    pub stop_timeout_ms: u64,
}

impl Default for SamplingConfig {
    fn default() -> Self {
        Self {
            frequency_hz: DEFAULT_FREQUENCY_HZ,
            error_backoff_ms: DEFAULT_ERROR_BACKOFF_MS,
            stop_timeout_ms: DEFAULT_STOP_TIMEOUT_MS,
        }
    }
}

// ==================== Storage Config ====================

/// Session log storage
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct StorageConfig {
    /// Directory that holds one log file per session
    pub log_directory: PathBuf,

    /// Extension for log files (without the dot)
    pub extension: String,

    /// Call `sync_data` after every appended row
    #[serde(default)]
    pub sync_on_append: bool,

    /// Replace an existing log file instead of rejecting the name
    #[serde(default)]
    pub overwrite_existing: bool,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            log_directory: PathBuf::from(DEFAULT_LOG_DIRECTORY),
            extension: DEFAULT_LOG_EXTENSION.to_string(),
            sync_on_append: false,
            overwrite_existing: false,
        }
    }
}

// ==================== Source Config ====================

/// Which sensor implementation feeds the recorder
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    /// Synthetic IMU data, no hardware required
    #[default]
    Simulated,
}

impl std::fmt::Display for SourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SourceKind::Simulated => write!(f, "Simulated"),
        }
    }
}

/// Sensor source configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct SourceConfig {
    #[serde(default)]
    pub kind: SourceKind,

    /// Artificial latency added to each poll
    #[serde(default)]
    pub latency_ms: u64,

    /// Probability that a poll fails (0.0 - 1.0)
    #[serde(default)]
    pub failure_rate: f64,

    /// 1-based poll numbers that always fail
    #[serde(default)]
    pub fail_on_calls: Vec<u64>,

    /// Noise generator seed
    #[serde(default)]
    pub seed: Option<u64>,
}

// ==================== Archive Config ====================

/// How closed logs are handed off for archival
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ArchiveMethod {
    /// Archiving is disabled; `archive` reports a failure
    None,
    /// Copy into a local or mounted archive directory
    #[default]
    Directory,
    /// Run an external uploader program
    Command,
}

impl std::fmt::Display for ArchiveMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ArchiveMethod::None => write!(f, "None"),
            ArchiveMethod::Directory => write!(f, "Directory"),
            ArchiveMethod::Command => write!(f, "Command"),
        }
    }
}

/// Archival configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ArchiveConfig {
    #[serde(default)]
    pub method: ArchiveMethod,

    /// Destination for [`ArchiveMethod::Directory`]
    #[serde(default = "default_archive_directory")]
    pub directory: PathBuf,

    /// Uploader program for [`ArchiveMethod::Command`]
    #[serde(default)]
    pub program: Option<String>,

    /// Uploader arguments; `{path}` is replaced with the log file path
    #[serde(default)]
    pub args: Vec<String>,
}

fn default_archive_directory() -> PathBuf {
    PathBuf::from("archive")
}

impl Default for ArchiveConfig {
    fn default() -> Self {
        Self {
            method: ArchiveMethod::Directory,
            directory: default_archive_directory(),
            program: None,
            args: Vec::new(),
        }
    }
}

// ==================== Console Config ====================

/// Console front end settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ConsoleConfig {
    /// Snapshot poll interval in milliseconds
    pub refresh_interval_ms: u64,
}

impl Default for ConsoleConfig {
    fn default() -> Self {
        Self {
            refresh_interval_ms: DEFAULT_REFRESH_INTERVAL_MS,
        }
    }
}

// ==================== Logging Config ====================

/// Diagnostic logging settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct LoggingConfig {
    /// `EnvFilter` directive used when `RUST_LOG` is unset
    pub filter: String,

    /// Also write logs to a daily rolling file under `<log_directory>/logs`
    pub file: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: "info,imu_recorder=debug".to_string(),
            file: true,
        }
    }
}

// ==================== Tests ====================
