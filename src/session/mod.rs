//! Recording session module
//!
//! This module owns everything about one recording run: the state machine that
//! drives it, the log file it writes, and the shared state readers observe.
//!
//! # Components
//!
//! - [`SessionController`] - State machine and control API (start/stop/archive/discard/shutdown)
//! - [`SharedState`] - Single-lock state shared with the acquisition loop and readers
//! - [`LogSink`] - Append-only CSV log, one file per session
//! - [`naming`] - Log file name resolution and validation

pub mod controller;
pub mod log_sink;
pub mod naming;
pub mod shared;
pub mod types;

pub use controller::{SessionController, SourceFactory};
pub use log_sink::{LogSink, OpenMode, SyncPolicy, LOG_HEADER};
pub use shared::{Health, SessionPublisher, SharedState, StateView};
pub use types::{ArchiveOutcome, ArchiveStatus, FaultSeverity, Phase, SampleFault, SessionInfo};
