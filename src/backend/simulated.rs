//! Simulated IMU for running without hardware
//!
//! This module provides a [`SampleSource`] that synthesizes plausible
//! gyroscope, accelerometer and magnetometer readings from simple waveform
//! patterns. It can also inject latency and failures, which makes it the
//! workhorse of the test suite.
//!
//! # Data Patterns
//!
//! Each axis is driven by an [`AxisPattern`]:
//!
//! - [`AxisPattern::Constant`] - Fixed value (gravity on the Z accelerometer axis)
//! - [`AxisPattern::Sine`] - Sinusoidal wave with configurable frequency/amplitude
//! - [`AxisPattern::Triangle`] - Triangle wave
//!
//! Uniform noise from a seeded xorshift generator is added on top,
//! so two sources with the same seed produce the same stream.
//!
//! # Example
//!
//! ```ignore
//! use imu_recorder::backend::{SampleSource, SimulatedImu};
//!
//! let mut imu = SimulatedImu::new()
//!     .with_latency(Duration::from_millis(2))
//!     .with_failures_on([10]);
//!
//! let reading = imu.poll()?;
//! ```

use crate::config::SourceConfig;
use crate::types::{RawReading, Vec3};
use std::collections::HashSet;
use std::time::{Duration, Instant};

use super::source::SampleSource;

/// Pattern for generating one axis of simulated data
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum AxisPattern {
    /// Constant value
    Constant(f64),
    /// Sine wave with frequency and amplitude
    Sine {
        frequency: f64,
        amplitude: f64,
        offset: f64,
    },
    /// Triangle wave
    Triangle { period: f64, amplitude: f64 },
}

impl AxisPattern {
    /// Evaluate the pattern at a point in time
    pub fn value_at(&self, elapsed_secs: f64) -> f64 {
        match *self {
            AxisPattern::Constant(v) => v,
            AxisPattern::Sine {
                frequency,
                amplitude,
                offset,
            } => offset + amplitude * (2.0 * std::f64::consts::PI * frequency * elapsed_secs).sin(),
            AxisPattern::Triangle { period, amplitude } => {
                let t = elapsed_secs % period;
                let half = period / 2.0;
                if t < half {
                    amplitude * (2.0 * t / half - 1.0)
                } else {
                    amplitude * (1.0 - 2.0 * (t - half) / half)
                }
            }
        }
    }
}

/// Patterns for the three axes of one sensor
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TriaxialPattern {
    pub x: AxisPattern,
    pub y: AxisPattern,
    pub z: AxisPattern,
    /// Noise amplitude to add (0.0 = no noise)
    pub noise: f64,
}

impl TriaxialPattern {
    fn sample(&self, elapsed_secs: f64, rng: &mut XorShift) -> Vec3 {
        let mut axis = |pattern: &AxisPattern| {
            let base = pattern.value_at(elapsed_secs);
            if self.noise > 0.0 {
                base + (rng.next_f64() - 0.5) * 2.0 * self.noise
            } else {
                base
            }
        };
        Vec3::new(axis(&self.x), axis(&self.y), axis(&self.z))
    }
}

/// Small deterministic generator (no external dependency)
#[derive(Debug, Clone)]
struct XorShift(u64);

impl XorShift {
    fn new(seed: u64) -> Self {
        // Zero is a fixed point of xorshift
        Self(seed.max(1))
    }

    fn next_f64(&mut self) -> f64 {
        let mut s = self.0;
        s ^= s << 13;
        s ^= s >> 7;
        s ^= s << 17;
        self.0 = s;
        (s as f64) / (u64::MAX as f64)
    }
}

/// Simulated IMU
pub struct SimulatedImu {
    /// Start time for pattern generation
    start_time: Instant,
    gyro: TriaxialPattern,
    accel: TriaxialPattern,
    mag: TriaxialPattern,
    /// Simulated bus latency per poll
    latency: Duration,
    /// Probability of a random failure per poll
    failure_rate: f64,
    /// 1-based poll numbers that always fail
    fail_on_calls: HashSet<u64>,
    /// Number of polls made so far
    calls: u64,
    rng: XorShift,
}

impl Default for SimulatedImu {
    fn default() -> Self {
        Self::new()
    }
}

impl SimulatedImu {
    /// Create a simulated IMU lying flat and rocking gently
    pub fn new() -> Self {
        Self {
            start_time: Instant::now(),
            gyro: TriaxialPattern {
                x: AxisPattern::Sine {
                    frequency: 0.5,
                    amplitude: 15.0,
                    offset: 0.0,
                },
                y: AxisPattern::Sine {
                    frequency: 0.25,
                    amplitude: 8.0,
                    offset: 0.0,
                },
                z: AxisPattern::Triangle {
                    period: 4.0,
                    amplitude: 5.0,
                },
                noise: 0.2,
            },
            accel: TriaxialPattern {
                x: AxisPattern::Sine {
                    frequency: 0.5,
                    amplitude: 0.05,
                    offset: 0.0,
                },
                y: AxisPattern::Constant(0.0),
                z: AxisPattern::Constant(1.0),
                noise: 0.01,
            },
            mag: TriaxialPattern {
                x: AxisPattern::Constant(22.0),
                y: AxisPattern::Constant(-4.5),
                z: AxisPattern::Constant(41.0),
                noise: 0.5,
            },
            latency: Duration::ZERO,
            failure_rate: 0.0,
            fail_on_calls: HashSet::new(),
            calls: 0,
            rng: XorShift::new(12345),
        }
    }

    /// Build from the `[source]` config section
    pub fn from_config(config: &SourceConfig) -> Self {
        let mut imu = Self::new()
            .with_latency(Duration::from_millis(config.latency_ms))
            .with_failure_rate(config.failure_rate)
            .with_failures_on(config.fail_on_calls.iter().copied());
        if let Some(seed) = config.seed {
            imu = imu.with_seed(seed);
        }
        imu
    }

    /// Set the simulated poll latency
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// Set the probability that any poll fails
    pub fn with_failure_rate(mut self, rate: f64) -> Self {
        self.failure_rate = rate.clamp(0.0, 1.0);
        self
    }

    /// Make specific 1-based poll numbers fail
    pub fn with_failures_on(mut self, calls: impl IntoIterator<Item = u64>) -> Self {
        self.fail_on_calls.extend(calls);
        self
    }

    /// Seed the noise generator
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.rng = XorShift::new(seed);
        self
    }

    /// Replace the gyroscope patterns
    pub fn with_gyro(mut self, pattern: TriaxialPattern) -> Self {
        self.gyro = pattern;
        self
    }

    /// Replace the accelerometer patterns
    pub fn with_accel(mut self, pattern: TriaxialPattern) -> Self {
        self.accel = pattern;
        self
    }

    /// Replace the magnetometer patterns
    pub fn with_mag(mut self, pattern: TriaxialPattern) -> Self {
        self.mag = pattern;
        self
    }

    /// Number of polls made so far, including failed ones
    pub fn calls(&self) -> u64 {
        self.calls
    }
}

impl SampleSource for SimulatedImu {
    fn poll(&mut self) -> anyhow::Result<RawReading> {
        self.calls += 1;

        if !self.latency.is_zero() {
            std::thread::sleep(self.latency);
        }

        if self.fail_on_calls.contains(&self.calls) {
            anyhow::bail!("simulated bus error on poll #{}", self.calls);
        }
        if self.failure_rate > 0.0 && self.rng.next_f64() < self.failure_rate {
            anyhow::bail!("simulated I2C timeout on poll #{}", self.calls);
        }

        let t = self.start_time.elapsed().as_secs_f64();
        Ok(RawReading {
            gyro: self.gyro.sample(t, &mut self.rng),
            accel: self.accel.sample(t, &mut self.rng),
            mag: self.mag.sample(t, &mut self.rng),
        })
    }

    fn name(&self) -> &str {
        "simulated-imu"
    }
}
