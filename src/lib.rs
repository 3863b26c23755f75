//! # imu-recorder: fixed-rate IMU acquisition and session logging
//!
//! Samples a gyroscope/accelerometer/magnetometer at a fixed rate, appends
//! every sample to a per-session CSV log, and hands closed logs to an archival
//! collaborator. The acquisition loop runs on its own thread; everything it
//! produces is published through one shared state that any number of readers
//! can snapshot.
//!
//! ## Architecture
//!
//! - **Backend**: sample source contract, simulated IMU, and the acquisition loop
//! - **Session**: state machine, append-only log sink, shared state
//! - **Archive**: collaborators that take a closed log and return a remote id
//! - **Frontend**: line-oriented console that polls snapshots on its own tick
//!
//! ## Configuration
//!
//! Settings are read from `recorder.toml`, by default in the platform config
//! directory under `imu-recorder`:
//!
//! - **Linux**: `~/.config/imu-recorder/recorder.toml`
//! - **macOS**: `~/Library/Application Support/imu-recorder/recorder.toml`
//! - **Windows**: `%APPDATA%\imu-recorder\recorder.toml`
//!
//! ## Example
//!
//! ```ignore
//! use imu_recorder::{RecorderConfig, SessionController};
//!
//! let mut controller = SessionController::from_config(RecorderConfig::default())?;
//! controller.start(Some("bench-test"))?;
//! std::thread::sleep(std::time::Duration::from_secs(2));
//! controller.stop()?;
//!
//! let view = controller.snapshot();
//! println!("{} samples in {} ms", view.session.sample_count, view.session.elapsed_ms);
//!
//! let outcome = controller.archive()?;
//! println!("archived as {}", outcome.remote_id);
//! ```

pub mod archive;
pub mod backend;
pub mod config;
pub mod error;
pub mod frontend;
pub mod session;
pub mod types;

// Re-export commonly used types
pub use archive::{Archiver, CommandArchiver, DirectoryArchiver};
pub use backend::{SampleSource, SimulatedImu};
pub use config::RecorderConfig;
pub use error::{ErrorClass, RecorderError, Result};
pub use session::{ArchiveOutcome, ArchiveStatus, Phase, SessionController, SharedState, StateView};
pub use types::{RawReading, Sample, Vec3};
