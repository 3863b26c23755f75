//! Integration tests for the recording session lifecycle
//!
//! These tests drive a real acquisition thread through the controller:
//! - Start/stop/archive/discard/shutdown transitions
//! - Packet numbering and elapsed time published through snapshots
//! - Usage errors rejected without side effects
//! - Archive failures and retries
//! - Loops that fail, stall or outlive their session

mod common;

use common::builders::ConfigBuilder;
use common::mock_helpers::{accepting_archiver, GatedSource, MockArchiver, MockSource, PanickingSource};
use common::wait_for;
use imu_recorder::archive::DirectoryArchiver;
use imu_recorder::backend::SimulatedImu;
use imu_recorder::session::log_sink::read_packet_numbers;
use imu_recorder::session::{ArchiveStatus, Health, Phase, SessionController};
use imu_recorder::types::RawReading;
use imu_recorder::{ErrorClass, RecorderError};
use serial_test::serial;
use std::sync::atomic::{AtomicU64, Ordering};
use std::thread;
use std::time::{Duration, Instant};

fn simulated_controller(dir: &std::path::Path) -> SessionController {
    let config = ConfigBuilder::new(dir).build();
    let archiver = DirectoryArchiver::new(&config.archive.directory);
    SessionController::with_source(config, SimulatedImu::new(), archiver).unwrap()
}

/// Block until the source has been polled at least `n` times
fn wait_for_polls(polls: &AtomicU64, n: u64) {
    let deadline = Instant::now() + common::test_timeout();
    while polls.load(Ordering::SeqCst) < n {
        assert!(Instant::now() < deadline, "source never reached poll {}", n);
        thread::sleep(Duration::from_millis(1));
    }
}

fn log_files(dir: &std::path::Path) -> Vec<std::path::PathBuf> {
    match std::fs::read_dir(dir.join("sensor_data")) {
        Ok(entries) => entries.map(|e| e.unwrap().path()).collect(),
        Err(_) => Vec::new(),
    }
}

#[test]
fn test_packet_numbers_match_log_rows() {
    let dir = tempfile::tempdir().unwrap();
    let mut controller = simulated_controller(dir.path());

    controller.start(Some("rows")).unwrap();
    wait_for(&controller, |v| v.session.sample_count >= 20);
    controller.stop().unwrap();

    let view = controller.snapshot();
    let path = controller.log_path().unwrap().to_path_buf();
    let numbers = read_packet_numbers(&path).unwrap();

    assert_eq!(numbers.len() as u64, view.session.sample_count);
    assert_eq!(numbers, (0..view.session.sample_count).collect::<Vec<_>>());
    assert_eq!(view.packet_number(), numbers.last().copied());
}

#[test]
fn test_elapsed_is_monotonic_and_frozen_at_stop() {
    let dir = tempfile::tempdir().unwrap();
    let mut controller = simulated_controller(dir.path());
    controller.start(None).unwrap();

    let mut last = 0;
    let begin = Instant::now();
    while begin.elapsed() < Duration::from_millis(150) {
        let elapsed = controller.snapshot().session.elapsed_ms;
        assert!(elapsed >= last, "elapsed went back from {} to {}", last, elapsed);
        last = elapsed;
        thread::sleep(Duration::from_millis(2));
    }

    controller.stop().unwrap();
    let frozen = controller.snapshot().session.elapsed_ms;
    assert!(frozen >= last);

    thread::sleep(Duration::from_millis(60));
    assert_eq!(controller.snapshot().session.elapsed_ms, frozen);
    assert!(controller.snapshot().session.started_at.is_some());
}

#[test]
fn test_existing_name_is_rejected_untouched() {
    let dir = tempfile::tempdir().unwrap();
    let logs = dir.path().join("sensor_data");
    std::fs::create_dir_all(&logs).unwrap();
    std::fs::write(logs.join("taken.csv"), "precious").unwrap();

    let mut controller = simulated_controller(dir.path());
    let err = controller.start(Some("taken")).unwrap_err();

    assert!(matches!(err, RecorderError::FilenameCollision(_)));
    assert_eq!(err.class(), ErrorClass::Usage);
    assert_eq!(std::fs::read_to_string(logs.join("taken.csv")).unwrap(), "precious");
    assert_eq!(controller.phase(), Phase::Idle);
    assert!(controller.snapshot().session.file_name.is_none());
}

#[test]
fn test_overwrite_existing_resets_file() {
    let dir = tempfile::tempdir().unwrap();
    let logs = dir.path().join("sensor_data");
    std::fs::create_dir_all(&logs).unwrap();
    std::fs::write(logs.join("again.csv"), "old run\n").unwrap();

    let config = ConfigBuilder::new(dir.path()).overwrite_existing(true).build();
    let mut controller =
        SessionController::with_source(config, SimulatedImu::new(), accepting_archiver("id")).unwrap();

    controller.start(Some("again")).unwrap();
    controller.stop().unwrap();
    let content = std::fs::read_to_string(logs.join("again.csv")).unwrap();
    assert!(content.starts_with("Packet number,"));
}

#[test]
fn test_path_escaping_name_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let mut controller = simulated_controller(dir.path());

    for name in ["../outside", "nested/run", ".hidden"] {
        let err = controller.start(Some(name)).unwrap_err();
        assert!(matches!(err, RecorderError::InvalidFilename { .. }), "{}", name);
    }
    assert!(log_files(dir.path()).is_empty());
    assert!(!dir.path().join("outside.csv").exists());
}

#[test]
fn test_second_start_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let mut controller = simulated_controller(dir.path());

    controller.start(Some("first")).unwrap();
    let err = controller.start(Some("second")).unwrap_err();
    assert!(matches!(err, RecorderError::SessionActive(Phase::Recording)));

    controller.stop().unwrap();
    let files = log_files(dir.path());
    assert_eq!(files.len(), 1);
    assert!(files[0].ends_with("first.csv"));
}

#[test]
fn test_archive_then_archive_again() {
    let dir = tempfile::tempdir().unwrap();
    let config = ConfigBuilder::new(dir.path()).build();
    let mut archiver = MockArchiver::new();
    archiver
        .expect_upload()
        .times(1)
        .returning(|_| Ok("1AbCdEf".to_string()));
    let mut controller = SessionController::with_source(config, SimulatedImu::new(), archiver).unwrap();

    controller.start(Some("once")).unwrap();
    wait_for(&controller, |v| v.session.sample_count >= 3);
    controller.stop().unwrap();

    let outcome = controller.archive().unwrap();
    assert_eq!(outcome.remote_id, "1AbCdEf");
    assert!(outcome.sample_count >= 3);
    assert!(outcome.path.ends_with("once.csv"));

    let view = controller.snapshot();
    assert_eq!(view.phase, Phase::Idle);
    assert_eq!(view.session.sample_count, 0);
    assert!(!view.session.has_log());
    assert!(view.session.archived);

    let err = controller.archive().unwrap_err();
    assert!(matches!(err, RecorderError::AlreadyArchived { ref remote_id } if remote_id == "1AbCdEf"));
    assert_eq!(controller.snapshot().archive_status.remote_id(), Some("1AbCdEf"));

    // A new session clears the status
    controller.start(None).unwrap();
    assert_eq!(controller.snapshot().archive_status, ArchiveStatus::Idle);
    controller.stop().unwrap();
}

#[test]
fn test_archive_failure_can_be_retried() {
    let dir = tempfile::tempdir().unwrap();
    let config = ConfigBuilder::new(dir.path()).build();

    let mut archiver = MockArchiver::new();
    let mut seq = mockall::Sequence::new();
    archiver
        .expect_upload()
        .times(1)
        .in_sequence(&mut seq)
        .returning(|_| Err(anyhow::anyhow!("503 Service Unavailable")));
    archiver
        .expect_upload()
        .times(1)
        .in_sequence(&mut seq)
        .returning(|_| Ok("retry-ok".to_string()));

    let mut controller = SessionController::with_source(config, SimulatedImu::new(), archiver).unwrap();
    controller.start(Some("flaky")).unwrap();
    controller.stop().unwrap();

    let err = controller.archive().unwrap_err();
    assert!(matches!(err, RecorderError::Archival(_)));
    assert_eq!(err.class(), ErrorClass::Archival);

    let view = controller.snapshot();
    assert_eq!(view.phase, Phase::Stopped);
    assert!(matches!(view.archive_status, ArchiveStatus::Failed(ref r) if r.contains("503")));

    let outcome = controller.archive().unwrap();
    assert_eq!(outcome.remote_id, "retry-ok");
    assert_eq!(controller.phase(), Phase::Idle);
}

#[test]
fn test_archive_requires_log_file() {
    let dir = tempfile::tempdir().unwrap();
    let config = ConfigBuilder::new(dir.path()).build();
    let mut archiver = MockArchiver::new();
    archiver.expect_upload().never();
    let mut controller = SessionController::with_source(config, SimulatedImu::new(), archiver).unwrap();

    controller.start(Some("vanish")).unwrap();
    controller.stop().unwrap();
    std::fs::remove_file(controller.log_path().unwrap()).unwrap();

    let err = controller.archive().unwrap_err();
    assert!(matches!(err, RecorderError::LogFileMissing(_)));
    assert_eq!(controller.phase(), Phase::Stopped);
    assert_eq!(controller.snapshot().archive_status, ArchiveStatus::Idle);

    controller.discard().unwrap();
}

#[test]
fn test_archive_rejected_while_recording() {
    let dir = tempfile::tempdir().unwrap();
    let mut controller = simulated_controller(dir.path());
    controller.start(None).unwrap();

    let err = controller.archive().unwrap_err();
    assert!(matches!(
        err,
        RecorderError::InvalidPhase { operation: "archive", phase: Phase::Recording }
    ));
    assert_eq!(controller.phase(), Phase::Recording);
    controller.stop().unwrap();
}

#[test]
fn test_discard_keeps_file() {
    let dir = tempfile::tempdir().unwrap();
    let mut controller = simulated_controller(dir.path());

    controller.start(Some("keep")).unwrap();
    controller.stop().unwrap();
    let path = controller.log_path().unwrap().to_path_buf();
    controller.discard().unwrap();

    assert_eq!(controller.phase(), Phase::Idle);
    assert!(controller.log_path().is_none());
    assert!(path.exists());
    assert!(matches!(
        controller.archive(),
        Err(RecorderError::InvalidPhase { .. })
    ));
}

#[test]
fn test_failed_poll_does_not_advance_packet_number() {
    let dir = tempfile::tempdir().unwrap();
    let config = ConfigBuilder::new(dir.path())
        .frequency(500.0)
        .error_backoff_ms(300)
        .build();

    let mut source = MockSource::new();
    let mut calls = 0u64;
    source.expect_poll().returning(move || {
        calls += 1;
        if calls == 10 {
            anyhow::bail!("I2C bus error on call {}", calls)
        }
        Ok(RawReading::new((0.1, 0.2, 0.3), (0.0, 0.0, 1.0), (20.0, 1.0, 40.0)))
    });

    let mut controller =
        SessionController::with_source(config, source, accepting_archiver("id")).unwrap();
    controller.start(Some("glitch")).unwrap();

    // Calls 1..=9 produced packets 0..=8, call 10 failed
    let during = wait_for(&controller, |v| v.stats.failed_polls == 1);
    assert_eq!(during.health(), Health::Degraded);
    assert_eq!(during.packet_number(), Some(8));
    assert_eq!(during.session.sample_count, 9);
    assert_eq!(during.phase, Phase::Recording);

    let after = wait_for(&controller, |v| v.session.sample_count >= 15);
    assert_eq!(after.health(), Health::Ok);
    controller.stop().unwrap();

    let view = controller.snapshot();
    let numbers = read_packet_numbers(controller.log_path().unwrap()).unwrap();
    assert_eq!(numbers, (0..view.session.sample_count).collect::<Vec<_>>());
    assert_eq!(view.stats.failed_polls, 1);
}

#[test]
#[serial]
fn test_fifty_hertz_for_one_second() {
    let dir = tempfile::tempdir().unwrap();
    let config = ConfigBuilder::new(dir.path())
        .frequency(50.0)
        .error_backoff_ms(500)
        .build();
    let source = SimulatedImu::new().with_latency(Duration::from_millis(2));
    let mut controller =
        SessionController::with_source(config, source, accepting_archiver("id")).unwrap();

    controller.start(Some("rate")).unwrap();

    // Stop once a full second of recording has been published
    let view = wait_for(&controller, |v| v.session.elapsed_ms >= 1000);
    controller.stop().unwrap();

    let last = view.packet_number().unwrap();
    // 50 samples (0..=49) expected; allow for scheduling jitter
    assert!((47..=51).contains(&last), "packet number {} after 1 s", last);
    let rate = view.stats.effective_rate_hz;
    assert!((45.0..=52.0).contains(&rate), "effective rate {:.1} Hz", rate);
}

#[test]
#[serial]
fn test_stop_is_prompt() {
    let dir = tempfile::tempdir().unwrap();
    let config = ConfigBuilder::new(dir.path()).frequency(20.0).build();
    let source = SimulatedImu::new().with_latency(Duration::from_millis(5));
    let mut controller =
        SessionController::with_source(config.clone(), source, accepting_archiver("id")).unwrap();

    controller.start(None).unwrap();
    wait_for(&controller, |v| v.session.sample_count >= 2);

    let begin = Instant::now();
    controller.stop().unwrap();
    // One period (50 ms) plus one poll (5 ms), with slack for the scheduler
    assert!(
        begin.elapsed() < config.sample_period().unwrap() + Duration::from_millis(55),
        "stop took {:?}",
        begin.elapsed()
    );
    assert_eq!(controller.phase(), Phase::Stopped);
}

#[test]
fn test_concurrent_reader_sees_consistent_views() {
    let dir = tempfile::tempdir().unwrap();
    let mut controller = simulated_controller(dir.path());
    let state = controller.state_handle();

    controller.start(None).unwrap();
    let reader = thread::spawn(move || {
        let mut seen = 0;
        let begin = Instant::now();
        while begin.elapsed() < Duration::from_millis(200) {
            let view = state.snapshot();
            if let Some(n) = view.packet_number() {
                assert_eq!(view.session.sample_count, n + 1);
                assert!(n >= seen);
                seen = n;
            }
        }
        seen
    });

    let seen = reader.join().unwrap();
    controller.stop().unwrap();
    assert!(seen > 0);
}

#[test]
fn test_shutdown_does_not_wait_on_stuck_poll() {
    let dir = tempfile::tempdir().unwrap();
    let config = ConfigBuilder::new(dir.path()).stop_timeout_ms(100).build();
    let (source, gate, polls) = GatedSource::new();
    let mut controller =
        SessionController::with_source(config, source, accepting_archiver("id")).unwrap();

    controller.start(Some("stuck")).unwrap();
    wait_for_polls(&polls, 1);

    let begin = Instant::now();
    controller.shutdown();
    assert!(begin.elapsed() < Duration::from_secs(1));

    let view = controller.snapshot();
    assert_eq!(view.phase, Phase::Idle);
    assert!(view.shut_down);
    assert!(matches!(controller.start(None), Err(RecorderError::ShutDown)));

    // Let the detached thread finish
    drop(gate);
}

#[test]
fn test_stop_reports_stalled_loop() {
    let dir = tempfile::tempdir().unwrap();
    let config = ConfigBuilder::new(dir.path()).stop_timeout_ms(50).build();
    let (source, gate, polls) = GatedSource::new();
    let mut controller =
        SessionController::with_source(config, source, accepting_archiver("id")).unwrap();

    controller.start(None).unwrap();
    wait_for_polls(&polls, 1);

    let err = controller.stop().unwrap_err();
    assert!(matches!(err, RecorderError::LoopStalled { .. }));
    assert!(err.is_fatal());
    assert_eq!(controller.phase(), Phase::Stopped);
    drop(gate);
}

#[test]
fn test_stalled_loop_blocks_next_session() {
    let dir = tempfile::tempdir().unwrap();
    let config = ConfigBuilder::new(dir.path()).stop_timeout_ms(50).build();
    let (source, gate, polls) = GatedSource::new();
    let mut controller =
        SessionController::with_source(config, source, accepting_archiver("id")).unwrap();

    controller.start(Some("old")).unwrap();
    gate.send(()).unwrap();
    wait_for(&controller, |v| v.session.sample_count == 1);
    // Second poll blocks until the gate opens again
    wait_for_polls(&polls, 2);

    let err = controller.stop().unwrap_err();
    assert!(matches!(err, RecorderError::LoopStalled { .. }));
    let old_path = controller.log_path().unwrap().to_path_buf();
    assert!(matches!(controller.archive(), Err(RecorderError::LoopStalled { .. })));
    controller.discard().unwrap();

    // The old loop is still inside poll: no second loop may start
    let err = controller.start(Some("new")).unwrap_err();
    assert!(matches!(err, RecorderError::LoopStalled { .. }));
    assert_eq!(controller.phase(), Phase::Idle);
    assert!(!old_path.with_file_name("new.csv").exists());

    // Once the poll returns, the pending stop ends the old loop. Its last
    // sample goes to the old log but never reaches the shared state.
    gate.send(()).unwrap();
    let deadline = Instant::now() + common::test_timeout();
    loop {
        match controller.start(Some("new")) {
            Ok(()) => break,
            Err(RecorderError::LoopStalled { .. }) if Instant::now() < deadline => {
                let view = controller.snapshot();
                assert_eq!(view.session.sample_count, 0);
                assert!(view.latest_sample.is_none());
                thread::sleep(Duration::from_millis(2));
            }
            Err(e) => panic!("start failed: {}", e),
        }
    }
    assert_eq!(read_packet_numbers(&old_path).unwrap(), vec![0, 1]);

    // The reclaimed sensor feeds the new session from packet 0
    for _ in 0..3 {
        gate.send(()).unwrap();
    }
    let view = wait_for(&controller, |v| v.session.sample_count == 3);
    assert_eq!(view.packet_number(), Some(2));
    assert_eq!(view.session.file_name.as_deref(), Some("new.csv"));

    drop(gate);
    controller.shutdown();
}

/// Log backed by a FIFO: the test reads exactly `rows` rows, then hangs up,
/// so the next append fails with a broken pipe
#[cfg(unix)]
#[test]
fn test_write_failure_mid_session_stops_recording() {
    use std::io::{BufRead, BufReader};

    let dir = tempfile::tempdir().unwrap();
    let logs = dir.path().join("sensor_data");
    std::fs::create_dir_all(&logs).unwrap();
    let fifo = logs.join("pipe.csv");
    let status = std::process::Command::new("mkfifo").arg(&fifo).status().unwrap();
    assert!(status.success());

    let rows = 4;
    let reader = {
        let fifo = fifo.clone();
        thread::spawn(move || {
            let mut lines = BufReader::new(std::fs::File::open(fifo).unwrap()).lines();
            (0..=rows).map(|_| lines.next().unwrap().unwrap()).collect::<Vec<_>>()
        })
    };

    let config = ConfigBuilder::new(dir.path()).overwrite_existing(true).build();
    let (source, gate, _polls) = GatedSource::new();
    let mut controller =
        SessionController::with_source(config, source, accepting_archiver("id")).unwrap();
    controller.start(Some("pipe")).unwrap();

    for _ in 0..rows {
        gate.send(()).unwrap();
    }
    wait_for(&controller, |v| v.session.sample_count == rows as u64);
    let received = reader.join().unwrap();

    // Nobody is reading any more
    gate.send(()).unwrap();
    let deadline = Instant::now() + common::test_timeout();
    let result = loop {
        match controller.supervise() {
            Ok(false) if Instant::now() < deadline => thread::sleep(Duration::from_millis(2)),
            other => break other,
        }
    };

    let err = result.unwrap_err();
    assert!(matches!(err, RecorderError::Persistence { .. }), "{:?}", err);
    assert!(err.is_fatal());

    let view = controller.snapshot();
    assert_eq!(view.phase, Phase::Stopped);
    assert_eq!(view.health(), Health::Failed);
    assert_eq!(view.session.sample_count, rows as u64);
    assert_eq!(view.packet_number(), Some(rows as u64 - 1));

    // Everything written before the failure reached the log, in order
    assert!(received[0].starts_with("Packet number,"));
    let numbers: Vec<u64> = received[1..]
        .iter()
        .map(|line| line.split(',').next().unwrap().parse().unwrap())
        .collect();
    assert_eq!(numbers, (0..rows as u64).collect::<Vec<_>>());

    // The session stays in hand for the caller to decide
    assert_eq!(controller.log_path(), Some(fifo.as_path()));
    assert!(matches!(controller.stop(), Err(RecorderError::InvalidPhase { .. })));
    controller.discard().unwrap();
    drop(gate);
}

#[test]
fn test_supervise_reaps_dead_loop() {
    let dir = tempfile::tempdir().unwrap();
    let config = ConfigBuilder::new(dir.path()).build();
    let mut controller =
        SessionController::with_source(config, PanickingSource, accepting_archiver("id")).unwrap();

    controller.start(Some("crash")).unwrap();

    let deadline = Instant::now() + Duration::from_secs(2);
    let result = loop {
        match controller.supervise() {
            Ok(false) if Instant::now() < deadline => thread::sleep(Duration::from_millis(2)),
            other => break other,
        }
    };

    assert!(matches!(result, Err(RecorderError::LoopPanicked)));
    assert_eq!(controller.phase(), Phase::Stopped);
    // The header-only log can still be discarded
    controller.discard().unwrap();
}

#[test]
fn test_from_config_runs_simulated_source() {
    let dir = tempfile::tempdir().unwrap();
    let config = ConfigBuilder::new(dir.path()).build();
    let mut controller = SessionController::from_config(config).unwrap();

    controller.start(Some("sim")).unwrap();
    wait_for(&controller, |v| v.session.sample_count >= 5);
    controller.stop().unwrap();

    let outcome = controller.archive().unwrap();
    assert!(dir.path().join("archive").join(&outcome.remote_id).exists());
}
