//! Acquisition Worker Thread Implementation
//!
//! This module contains the acquisition loop that runs in its own thread for
//! the lifetime of one recording. It owns the sample source and the session
//! log while it runs, and hands both back through a channel when it exits.
//!
//! # Loop
//!
//! Each iteration:
//!
//! 1. Checks the stop channel (top of the iteration)
//! 2. Polls the [`SampleSource`]
//! 3. On success appends the sample to the [`LogSink`] and publishes sample,
//!    packet number and elapsed time through its [`SessionPublisher`] in one
//!    update
//! 4. On failure publishes the fault and elapsed time, keeping the last sample
//! 5. Waits on the stop channel for the delay chosen by the [`RateGovernor`]
//!
//! Waiting on the channel instead of sleeping means `stop()` wakes the loop
//! immediately; worst-case stop latency is one in-flight poll.
//!
//! # Rate Limiting
//!
//! The governor subtracts the measured iteration time from the target period,
//! so a slow poll shortens the following sleep. When an iteration already took
//! longer than the period the loop runs flat-out; lag shows up as
//! `effective_rate_hz` below the configured frequency.

use crate::backend::source::{PollStats, SampleSource};
use crate::config::{sample_period_for, RecorderConfig};
use crate::error::{RecorderError, Result, ResultExt};
use crate::session::log_sink::LogSink;
use crate::session::shared::SessionPublisher;
use crate::session::types::SampleFault;
use crate::types::Sample;
use chrono::Utc;
use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender, TryRecvError};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

/// Best-effort fixed-rate pacing
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RateGovernor {
    period: Duration,
    error_backoff: Duration,
}

impl RateGovernor {
    /// Create a governor for `frequency_hz`
    ///
    /// Fails for rates that are not positive or whose period overflows.
    pub fn new(frequency_hz: f64, error_backoff: Duration) -> Result<Self> {
        Ok(Self {
            period: sample_period_for(frequency_hz)?,
            error_backoff,
        })
    }

    /// Create a governor from the `[sampling]` section
    pub fn from_config(config: &RecorderConfig) -> Result<Self> {
        Self::new(config.sampling.frequency_hz, config.error_backoff())
    }

    /// Target time between samples
    pub fn period(&self) -> Duration {
        self.period
    }

    /// Fixed delay after a failed poll
    pub fn error_backoff(&self) -> Duration {
        self.error_backoff
    }

    /// Delay after a successful iteration that took `loop_duration`
    pub fn delay_after_success(&self, loop_duration: Duration) -> Duration {
        self.period.saturating_sub(loop_duration)
    }
}

/// Why the loop ended
#[derive(Debug)]
pub enum ExitReason {
    /// The stop channel fired or was dropped
    Stopped,
    /// An append failed; the session cannot continue
    PersistenceFailed(RecorderError),
}

/// Everything the loop hands back when it exits
pub struct WorkerExit {
    pub source: Box<dyn SampleSource>,
    pub sink: LogSink,
    pub reason: ExitReason,
    /// Samples appended during this run
    pub samples: u64,
}

/// The acquisition loop for one session
pub struct AcquisitionWorker {
    source: Box<dyn SampleSource>,
    sink: LogSink,
    publisher: SessionPublisher,
    governor: RateGovernor,
    stop_rx: Receiver<()>,
    stats: PollStats,
    /// Packet number for the next appended sample
    next_packet: u64,
    /// Monotonic start, set on the first iteration
    started: Option<Instant>,
}

impl AcquisitionWorker {
    /// Create a worker; nothing runs until [`run`](Self::run) or [`spawn`](Self::spawn)
    pub fn new(
        source: Box<dyn SampleSource>,
        sink: LogSink,
        publisher: SessionPublisher,
        governor: RateGovernor,
        stop_rx: Receiver<()>,
    ) -> Self {
        Self {
            source,
            sink,
            publisher,
            governor,
            stop_rx,
            stats: PollStats::default(),
            next_packet: 0,
            started: None,
        }
    }

    /// Start the loop on a dedicated thread
    pub fn spawn(
        source: Box<dyn SampleSource>,
        sink: LogSink,
        publisher: SessionPublisher,
        governor: RateGovernor,
    ) -> Result<WorkerHandle> {
        let (stop_tx, stop_rx) = bounded(1);
        let (done_tx, done_rx) = bounded(1);
        let worker = Self::new(source, sink, publisher, governor, stop_rx);

        let thread = std::thread::Builder::new()
            .name("acquisition".to_string())
            .spawn(move || {
                let exit = worker.run();
                // Receiver is gone if the controller gave up waiting
                let _ = done_tx.send(exit);
            })
            .map_err(RecorderError::from)
            .context("Failed to spawn acquisition thread")?;

        Ok(WorkerHandle {
            stop_tx,
            done_rx,
            thread: Some(thread),
        })
    }

    /// Run until stopped or until the log cannot be written
    pub fn run(mut self) -> WorkerExit {
        tracing::info!(
            "Acquisition started: source={}, period={:?}, log={:?}",
            self.source.name(),
            self.governor.period(),
            self.sink.path()
        );

        let reason = loop {
            match self.stop_rx.try_recv() {
                Ok(()) | Err(TryRecvError::Disconnected) => break ExitReason::Stopped,
                Err(TryRecvError::Empty) => {}
            }

            let delay = match self.step() {
                Ok(delay) => delay,
                Err(e) => {
                    tracing::error!("Recording stopped: {}", e);
                    let elapsed = self.elapsed_ms();
                    self.publisher.publish_fault(
                        SampleFault::from(&e),
                        elapsed,
                        self.stats.summary(elapsed),
                    );
                    break ExitReason::PersistenceFailed(e);
                }
            };

            match self.stop_rx.recv_timeout(delay) {
                Ok(()) | Err(RecvTimeoutError::Disconnected) => break ExitReason::Stopped,
                Err(RecvTimeoutError::Timeout) => {}
            }
        };

        // Freeze the elapsed time at the moment the loop observed the stop
        if !self.publisher.publish_elapsed(self.elapsed_ms()) {
            tracing::warn!("Acquisition loop outlived its session; final state not published");
        }

        tracing::info!(
            "Acquisition ended after {} samples ({:.1}% polls ok)",
            self.next_packet,
            self.stats.success_rate()
        );

        WorkerExit {
            source: self.source,
            sink: self.sink,
            reason,
            samples: self.next_packet,
        }
    }

    /// One poll/append/publish iteration; returns the delay before the next one
    fn step(&mut self) -> Result<Duration> {
        let loop_start = Instant::now();
        if self.started.is_none() {
            self.started = Some(loop_start);
            self.publisher.mark_started(Utc::now());
        }

        match self.source.poll() {
            Ok(reading) => {
                self.stats
                    .record_success(loop_start.elapsed().as_micros() as u64);

                let sample = Sample::new(self.next_packet, reading, Utc::now());
                self.sink.append(&sample)?;
                self.next_packet += 1;

                let elapsed = self.elapsed_ms();
                self.publisher
                    .publish_sample(sample, elapsed, self.stats.summary(elapsed));
                tracing::trace!("Sample #{} at {} ms", sample.packet_number, elapsed);

                Ok(self.governor.delay_after_success(loop_start.elapsed()))
            }
            Err(e) => {
                self.stats.record_failure();
                let err = RecorderError::TransientSample(format!("{:#}", e));
                tracing::warn!("{}", err);

                let elapsed = self.elapsed_ms();
                self.publisher.publish_fault(
                    SampleFault::from(&err),
                    elapsed,
                    self.stats.summary(elapsed),
                );

                Ok(self.governor.error_backoff())
            }
        }
    }

    fn elapsed_ms(&self) -> u64 {
        self.started
            .map(|t| t.elapsed().as_millis() as u64)
            .unwrap_or(0)
    }
}

/// Controller-side handle to a running loop
pub struct WorkerHandle {
    stop_tx: Sender<()>,
    done_rx: Receiver<WorkerExit>,
    thread: Option<JoinHandle<()>>,
}

impl WorkerHandle {
    /// Signal the loop to stop at the top of its next iteration
    pub fn request_stop(&self) {
        // Full channel means a stop is already pending
        let _ = self.stop_tx.try_send(());
    }

    /// Check if the loop thread has exited
    pub fn is_finished(&self) -> bool {
        self.thread.as_ref().map_or(true, |t| t.is_finished())
    }

    /// Collect the exit of a loop that ended on its own, without blocking
    pub fn try_finish(&mut self) -> Option<Result<WorkerExit>> {
        match self.done_rx.try_recv() {
            Ok(exit) => {
                self.join();
                Some(Ok(exit))
            }
            Err(TryRecvError::Empty) => None,
            Err(TryRecvError::Disconnected) => {
                self.join();
                Some(Err(RecorderError::LoopPanicked))
            }
        }
    }

    /// Stop the loop and wait up to `timeout` for it to hand back the log
    ///
    /// On `LoopStalled` the handle stays valid: the stop request is pending, so
    /// the loop exits once its current poll returns, and [`try_finish`]
    /// collects it. Dropping the handle instead detaches the thread.
    ///
    /// [`try_finish`]: Self::try_finish
    pub fn stop(&mut self, timeout: Duration) -> Result<WorkerExit> {
        self.request_stop();
        match self.done_rx.recv_timeout(timeout) {
            Ok(exit) => {
                self.join();
                Ok(exit)
            }
            Err(RecvTimeoutError::Timeout) => Err(RecorderError::LoopStalled { timeout }),
            Err(RecvTimeoutError::Disconnected) => {
                self.join();
                Err(RecorderError::LoopPanicked)
            }
        }
    }

    fn join(&mut self) {
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                tracing::error!("Acquisition thread panicked");
            }
        }
    }
}
