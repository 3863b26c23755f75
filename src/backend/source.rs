//! SampleSource trait for the sensor bus
//!
//! This module provides the contract between the acquisition loop and the
//! sensor driver, plus the poll statistics the loop keeps about it. Both real
//! bus drivers and the simulated IMU implement [`SampleSource`].

use crate::types::RawReading;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

/// Successful polls kept for min/max and jitter
const RECENT_WINDOW_SIZE: usize = 100;

/// Unified interface for IMU sample sources
///
/// A poll may block for a variable, typically small, amount of time and may
/// fail transiently. The acquisition loop measures the actual call duration,
/// so implementations should not try to pace themselves.
///
/// Implementations must be `Send` so the source can move into the
/// acquisition thread when a session starts.
///
/// # Example
///
/// ```ignore
/// fn read_once(source: &mut dyn SampleSource) -> anyhow::Result<RawReading> {
///     source.poll()
/// }
/// ```
pub trait SampleSource: Send {
    /// Read one gyro/accel/mag triple from the sensor
    fn poll(&mut self) -> anyhow::Result<RawReading>;

    /// Human-readable name for logs
    fn name(&self) -> &str {
        "sensor"
    }
}

impl<S: SampleSource + ?Sized> SampleSource for Box<S> {
    fn poll(&mut self) -> anyhow::Result<RawReading> {
        (**self).poll()
    }

    fn name(&self) -> &str {
        (**self).name()
    }
}

/// Per-session bookkeeping of how the sensor behaves
///
/// The loop records every poll. Latencies of the last few hundred
/// milliseconds of successful reads stay in a window, so a sensor that slows
/// down mid-session shows up in the published jitter and min/max rather than
/// being averaged away.
#[derive(Debug, Clone, Default)]
pub struct PollStats {
    pub successful_polls: u64,
    pub failed_polls: u64,
    /// Sum of successful poll latencies, for the session average
    latency_sum_us: u64,
    /// Latencies of the most recent successful polls, oldest first
    recent_latency_us: VecDeque<u64>,
}

impl PollStats {
    /// A poll returned a reading after `latency_us`
    pub fn record_success(&mut self, latency_us: u64) {
        self.successful_polls += 1;
        self.latency_sum_us += latency_us;

        if self.recent_latency_us.len() == RECENT_WINDOW_SIZE {
            self.recent_latency_us.pop_front();
        }
        self.recent_latency_us.push_back(latency_us);
    }

    /// A poll failed; failures carry no latency
    pub fn record_failure(&mut self) {
        self.failed_polls += 1;
    }

    /// Mean latency of every successful poll this session
    pub fn avg_latency_us(&self) -> f64 {
        if self.successful_polls == 0 {
            0.0
        } else {
            self.latency_sum_us as f64 / self.successful_polls as f64
        }
    }

    /// Share of polls that returned a reading, in percent
    pub fn success_rate(&self) -> f64 {
        let total = self.successful_polls + self.failed_polls;
        if total == 0 {
            100.0
        } else {
            (self.successful_polls as f64 / total as f64) * 100.0
        }
    }

    /// Fastest and slowest recent poll, `(0, 0)` before the first reading
    pub fn recent_latency_range_us(&self) -> (u64, u64) {
        let min = self.recent_latency_us.iter().min().copied().unwrap_or(0);
        let max = self.recent_latency_us.iter().max().copied().unwrap_or(0);
        (min, max)
    }

    /// Summarize for publication, given the session's elapsed time
    pub fn summary(&self, elapsed_ms: u64) -> AcquisitionStats {
        let effective_rate_hz = if elapsed_ms == 0 {
            0.0
        } else {
            self.successful_polls as f64 * 1000.0 / elapsed_ms as f64
        };
        let (min, max) = self.recent_latency_range_us();

        AcquisitionStats {
            successful_polls: self.successful_polls,
            failed_polls: self.failed_polls,
            avg_poll_time_us: self.avg_latency_us(),
            min_poll_time_us: min,
            max_poll_time_us: max,
            jitter_us: max - min,
            effective_rate_hz,
        }
    }
}

/// Published view of [`PollStats`]
///
/// `effective_rate_hz` falling below the configured frequency means the loop
/// is running flat-out and lagging.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct AcquisitionStats {
    pub successful_polls: u64,
    pub failed_polls: u64,
    pub avg_poll_time_us: f64,
    /// Minimum poll latency in recent window (microseconds)
    pub min_poll_time_us: u64,
    /// Maximum poll latency in recent window (microseconds)
    pub max_poll_time_us: u64,
    pub jitter_us: u64,
    pub effective_rate_hz: f64,
}

impl AcquisitionStats {
    /// Calculate the success rate as a percentage
    pub fn success_rate(&self) -> f64 {
        let total = self.successful_polls + self.failed_polls;
        if total == 0 {
            100.0
        } else {
            (self.successful_polls as f64 / total as f64) * 100.0
        }
    }
}
