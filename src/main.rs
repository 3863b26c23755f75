//! IMU Recorder - Main Entry Point
//!
//! Runs the console front end over a session controller built from
//! `recorder.toml`.

use imu_recorder::{
    config::{default_config_path, RecorderConfig, CONFIG_FILE},
    frontend::{spawn_stdin_reader, Console},
    SessionController,
};
use std::path::PathBuf;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

const USAGE: &str = "\
Usage: imu-recorder [--init] [CONFIG]

  CONFIG   Path to recorder.toml (default: platform config directory)
  --init   Write a default config to CONFIG and exit";

fn main() -> imu_recorder::Result<()> {
    let mut init = false;
    let mut config_arg = None;
    for arg in std::env::args().skip(1) {
        match arg.as_str() {
            "--init" => init = true,
            "-h" | "--help" => {
                println!("{}", USAGE);
                return Ok(());
            }
            other => config_arg = Some(PathBuf::from(other)),
        }
    }

    let config_path = config_arg
        .or_else(default_config_path)
        .unwrap_or_else(|| PathBuf::from(CONFIG_FILE));

    if init {
        RecorderConfig::default().save(&config_path)?;
        println!("Wrote default config to {}", config_path.display());
        return Ok(());
    }

    // Logging depends on the config, so load errors are reported after init
    let (config, load_error) = if config_path.exists() {
        match RecorderConfig::load(&config_path) {
            Ok(config) => (config, None),
            Err(e) => (RecorderConfig::default(), Some(e)),
        }
    } else {
        (RecorderConfig::default(), None)
    };

    let _log_guard = init_logging(&config);

    if let Some(e) = load_error {
        tracing::warn!("Failed to load {:?}, using defaults: {}", config_path, e);
    }
    tracing::info!(
        "Starting IMU recorder: {} Hz, logs in {:?}, archive via {}",
        config.sampling.frequency_hz,
        config.storage.log_directory,
        config.archive.method
    );

    let controller = SessionController::from_config(config)?;
    let mut console = Console::new(controller, std::io::stdout());
    console.run(spawn_stdin_reader())?;

    tracing::info!("Shutting down...");
    Ok(())
}

/// Install stderr logging, plus a daily rolling file when enabled
fn init_logging(config: &RecorderConfig) -> Option<WorkerGuard> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.logging.filter));

    let (file_layer, guard) = if config.logging.file {
        let appender = tracing_appender::rolling::daily(
            config.storage.log_directory.join("logs"),
            "imu-recorder.log",
        );
        let (writer, guard) = tracing_appender::non_blocking(appender);
        let layer = tracing_subscriber::fmt::layer()
            .with_writer(writer)
            .with_ansi(false);
        (Some(layer), Some(guard))
    } else {
        (None, None)
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(file_layer)
        .init();

    guard
}
