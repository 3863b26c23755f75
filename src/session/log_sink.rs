//! LogSink — append-only CSV log, one file per session.
//!
//! Every accepted sample becomes exactly one row, written and flushed before
//! [`LogSink::append`] returns, so a concurrent reader (or a crash between
//! calls) never observes reordered or silently dropped rows. Nothing is
//! buffered across calls.
//!
//! # Format
//!
//! A fixed header row followed by one row per sample:
//!
//! ```text
//! Packet number,Gyroscope X (deg/s),...,Magnetometer Z (microteslas),Timestamp
//! 0,0.12,-0.4,0.01,0.002,-0.013,0.998,22.1,-4.6,40.8,1718000000.123456
//! ```
//!
//! The timestamp is seconds since the Unix epoch.

use crate::error::{RecorderError, Result};
use crate::types::Sample;
use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, ErrorKind, Write};
use std::path::{Path, PathBuf};

/// Column names of the header row, in row order
pub const LOG_HEADER: [&str; 11] = [
    "Packet number",
    "Gyroscope X (deg/s)",
    "Gyroscope Y (deg/s)",
    "Gyroscope Z (deg/s)",
    "Accelerometer X (g)",
    "Accelerometer Y (g)",
    "Accelerometer Z (g)",
    "Magnetometer X (microteslas)",
    "Magnetometer Y (microteslas)",
    "Magnetometer Z (microteslas)",
    "Timestamp",
];

/// How `open` treats an existing file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OpenMode {
    /// Fail with `FilenameCollision` if the file exists
    #[default]
    CreateNew,
    /// Explicit reset: truncate an existing file
    Truncate,
}

/// Durability applied after each write
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SyncPolicy {
    /// Write through to the OS; visible to other readers immediately
    #[default]
    Flush,
    /// Additionally `sync_data` to the storage device
    SyncData,
}

/// Header row as written to the file (with trailing newline)
pub fn header_line() -> String {
    let mut line = LOG_HEADER.join(",");
    line.push('\n');
    line
}

/// Format one sample as a log row (with trailing newline)
pub fn format_row(sample: &Sample) -> String {
    let [gx, gy, gz] = sample.gyro.to_array();
    let [ax, ay, az] = sample.accel.to_array();
    let [mx, my, mz] = sample.mag.to_array();
    format!(
        "{},{},{},{},{},{},{},{},{},{},{:.6}\n",
        sample.packet_number,
        gx,
        gy,
        gz,
        ax,
        ay,
        az,
        mx,
        my,
        mz,
        sample.epoch_seconds()
    )
}

/// Append-only session log
#[derive(Debug)]
pub struct LogSink {
    path: PathBuf,
    file: Option<File>,
    sync: SyncPolicy,
    rows_written: u64,
}

impl LogSink {
    /// Create a new log, failing if the path already exists
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        Self::open_with(path, OpenMode::CreateNew, SyncPolicy::Flush)
    }

    /// Create a log with an explicit open mode and sync policy
    ///
    /// Parent directories are created as needed. The header row is written
    /// and flushed before this returns.
    pub fn open_with(path: impl Into<PathBuf>, mode: OpenMode, sync: SyncPolicy) -> Result<Self> {
        let path = path.into();

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|e| {
                    RecorderError::persistence(&path, format!("cannot create directory: {}", e))
                })?;
            }
        }

        let mut options = OpenOptions::new();
        options.write(true);
        match mode {
            OpenMode::CreateNew => options.create_new(true),
            OpenMode::Truncate => options.create(true).truncate(true),
        };

        let file = options.open(&path).map_err(|e| {
            if e.kind() == ErrorKind::AlreadyExists {
                RecorderError::FilenameCollision(path.clone())
            } else {
                RecorderError::persistence(&path, e)
            }
        })?;

        let mut sink = Self {
            path,
            file: Some(file),
            sync,
            rows_written: 0,
        };
        sink.write_line(&header_line())?;

        tracing::debug!("Opened session log {:?}", sink.path);
        Ok(sink)
    }

    /// Append one sample as one row
    ///
    /// Fails with a persistence error once the sink is closed. Failures are
    /// reported, never retried.
    pub fn append(&mut self, sample: &Sample) -> Result<()> {
        self.write_line(&format_row(sample))?;
        self.rows_written += 1;
        Ok(())
    }

    /// Close the log; calling it again is a no-op
    pub fn close(&mut self) -> Result<()> {
        if let Some(file) = self.file.take() {
            file.sync_all()
                .map_err(|e| RecorderError::persistence(&self.path, e))?;
            tracing::debug!(
                "Closed session log {:?} ({} rows)",
                self.path,
                self.rows_written
            );
        }
        Ok(())
    }

    /// Check if the log has been closed
    pub fn is_closed(&self) -> bool {
        self.file.is_none()
    }

    /// Path of the log file
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Number of data rows appended (header excluded)
    pub fn rows_written(&self) -> u64 {
        self.rows_written
    }

    fn write_line(&mut self, line: &str) -> Result<()> {
        let Some(file) = self.file.as_mut() else {
            return Err(RecorderError::persistence(&self.path, "log file is closed"));
        };

        file.write_all(line.as_bytes())
            .and_then(|_| file.flush())
            .map_err(|e| RecorderError::persistence(&self.path, e))?;

        if self.sync == SyncPolicy::SyncData {
            file.sync_data()
                .map_err(|e| RecorderError::persistence(&self.path, e))?;
        }
        Ok(())
    }
}

/// Read back the packet numbers of a session log, in file order
pub fn read_packet_numbers(path: impl AsRef<Path>) -> Result<Vec<u64>> {
    let path = path.as_ref();
    let file = File::open(path).map_err(|e| RecorderError::persistence(path, e))?;

    let mut numbers = Vec::new();
    for (index, line) in BufReader::new(file).lines().enumerate() {
        let line = line.map_err(|e| RecorderError::persistence(path, e))?;
        if index == 0 {
            if line != LOG_HEADER.join(",") {
                return Err(RecorderError::persistence(path, "unexpected header row"));
            }
            continue;
        }
        let first = line.split(',').next().unwrap_or_default();
        let number = first.parse::<u64>().map_err(|e| {
            RecorderError::persistence(path, format!("bad packet number on line {}: {}", index + 1, e))
        })?;
        numbers.push(number);
    }
    Ok(numbers)
}
