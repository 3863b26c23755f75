//! Backend module for sensor acquisition
//!
//! This module runs the sampling loop in its own thread so that control calls
//! and display reads never wait on the sensor bus. The loop publishes into
//! [`SharedState`](crate::session::SharedState) and stops when its crossbeam
//! stop channel fires.
//!
//! # Components
//!
//! - [`SampleSource`] - Contract for sensor drivers (may block, may fail transiently)
//! - [`SimulatedImu`] - Waveform-driven source with latency and failure injection
//! - [`AcquisitionWorker`] - The acquisition loop
//! - [`RateGovernor`] - Sleep compensation for a fixed sampling rate
//! - [`PollStats`] / [`AcquisitionStats`] - Poll latency and rate statistics
//!
//! # Example
//!
//! ```ignore
//! use imu_recorder::backend::{AcquisitionWorker, RateGovernor, SimulatedImu};
//! use imu_recorder::session::{LogSink, SessionInfo, SharedState};
//!
//! let state = SharedState::new();
//! let sink = LogSink::open("sensor_data/bench.csv")?;
//! let publisher = state.begin_session(SessionInfo::for_log(sink.path().to_path_buf()));
//! let governor = RateGovernor::new(50.0, Duration::from_millis(500))?;
//!
//! let mut handle = AcquisitionWorker::spawn(Box::new(SimulatedImu::new()), sink, publisher, governor)?;
//! std::thread::sleep(Duration::from_secs(1));
//! let exit = handle.stop(Duration::from_secs(2))?;
//! println!("{} samples", exit.samples);
//! ```

pub mod simulated;
pub mod source;
pub mod worker;

pub use simulated::{AxisPattern, SimulatedImu, TriaxialPattern};
pub use source::{AcquisitionStats, PollStats, SampleSource};
pub use worker::{AcquisitionWorker, ExitReason, RateGovernor, WorkerExit, WorkerHandle};
