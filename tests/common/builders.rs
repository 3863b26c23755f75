//! Test data builders for creating test objects

use chrono::{TimeZone, Utc};
use imu_recorder::config::RecorderConfig;
use imu_recorder::types::{RawReading, Sample};
use std::path::{Path, PathBuf};

/// Builder for recorder configs rooted in a temporary directory
pub struct ConfigBuilder {
    config: RecorderConfig,
}

impl ConfigBuilder {
    pub fn new(root: &Path) -> Self {
        let mut config = RecorderConfig::default();
        config.storage.log_directory = root.join("sensor_data");
        config.archive.directory = root.join("archive");
        config.logging.file = false;
        // Fast defaults keep tests short
        config.sampling.frequency_hz = 200.0;
        config.sampling.error_backoff_ms = 20;
        Self { config }
    }

    pub fn frequency(mut self, hz: f64) -> Self {
        self.config.sampling.frequency_hz = hz;
        self
    }

    pub fn error_backoff_ms(mut self, ms: u64) -> Self {
        self.config.sampling.error_backoff_ms = ms;
        self
    }

    pub fn stop_timeout_ms(mut self, ms: u64) -> Self {
        self.config.sampling.stop_timeout_ms = ms;
        self
    }

    pub fn overwrite_existing(mut self, overwrite: bool) -> Self {
        self.config.storage.overwrite_existing = overwrite;
        self
    }

    pub fn log_directory(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.storage.log_directory = dir.into();
        self
    }

    pub fn build(self) -> RecorderConfig {
        self.config
    }
}

/// Sample with recognizable values for packet `n`
pub fn sample(n: u64) -> Sample {
    let reading = RawReading::new(
        (n as f64, -(n as f64), 0.5),
        (0.01, -0.02, 0.98),
        (21.5, -4.25, 40.0),
    );
    let at = Utc.timestamp_opt(1_700_000_000 + n as i64, 0).unwrap();
    Sample::new(n, reading, at)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_builder() {
        let config = ConfigBuilder::new(Path::new("/tmp/x"))
            .frequency(50.0)
            .error_backoff_ms(500)
            .build();

        assert_eq!(config.sampling.frequency_hz, 50.0);
        assert_eq!(config.storage.log_directory, Path::new("/tmp/x/sensor_data"));
        assert!(config.validate().is_ok());
    }
}
