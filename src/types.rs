//! Core data types for the IMU recorder
//!
//! This module contains the value types that flow from the sensor
//! through the acquisition loop into the session log:
//!
//! - [`Vec3`] - One three-axis reading
//! - [`RawReading`] - What a [`SampleSource`](crate::backend::SampleSource) returns per poll
//! - [`Sample`] - A raw reading stamped with its packet number and capture time

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A three-axis sensor value
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Vec3 {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Vec3 {
    /// Create a new three-axis value
    pub const fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }

    /// Euclidean norm of the vector
    pub fn magnitude(&self) -> f64 {
        (self.x * self.x + self.y * self.y + self.z * self.z).sqrt()
    }

    /// Components as an array in x, y, z order
    pub fn to_array(self) -> [f64; 3] {
        [self.x, self.y, self.z]
    }
}

impl From<(f64, f64, f64)> for Vec3 {
    fn from((x, y, z): (f64, f64, f64)) -> Self {
        Self { x, y, z }
    }
}

impl From<[f64; 3]> for Vec3 {
    fn from([x, y, z]: [f64; 3]) -> Self {
        Self { x, y, z }
    }
}

impl std::fmt::Display for Vec3 {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "({:.3}, {:.3}, {:.3})", self.x, self.y, self.z)
    }
}

/// One unstamped reading from the sensor bus
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct RawReading {
    /// Angular rate (deg/s)
    pub gyro: Vec3,
    /// Linear acceleration (g)
    pub accel: Vec3,
    /// Magnetic field (microteslas)
    pub mag: Vec3,
}

impl RawReading {
    pub fn new(gyro: impl Into<Vec3>, accel: impl Into<Vec3>, mag: impl Into<Vec3>) -> Self {
        Self {
            gyro: gyro.into(),
            accel: accel.into(),
            mag: mag.into(),
        }
    }
}

/// A reading accepted by the acquisition loop
///
/// Samples are immutable once produced. `packet_number` restarts at 0 for
/// every session and grows by exactly one per accepted reading.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    pub packet_number: u64,
    pub gyro: Vec3,
    pub accel: Vec3,
    pub mag: Vec3,
    /// Wall-clock capture time, for display only
    pub captured_at: DateTime<Utc>,
}

impl Sample {
    /// Stamp a raw reading
    pub fn new(packet_number: u64, reading: RawReading, captured_at: DateTime<Utc>) -> Self {
        Self {
            packet_number,
            gyro: reading.gyro,
            accel: reading.accel,
            mag: reading.mag,
            captured_at,
        }
    }

    /// Capture time as fractional seconds since the Unix epoch
    pub fn epoch_seconds(&self) -> f64 {
        self.captured_at.timestamp_micros() as f64 / 1_000_000.0
    }

    /// Capture time formatted for display with millisecond precision
    pub fn display_timestamp(&self) -> String {
        self.captured_at
            .with_timezone(&chrono::Local)
            .format("%Y-%m-%d %H:%M:%S%.3f")
            .to_string()
    }
}
