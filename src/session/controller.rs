//! SessionController — the recording state machine and control API
//!
//! ```text
//!          start()              stop()              archive() ok
//!   Idle ──────────► Recording ───────► Stopped ──► Archiving ──────► Idle
//!    ▲                                   │  ▲           │
//!    │              discard()            │  └───────────┘ archive() failed
//!    └───────────────────────────────────┘
//! ```
//!
//! `shutdown()` returns to `Idle` from any phase and is terminal. The
//! controller is the only writer of `phase` and `archive_status`; control
//! operations take `&mut self`, readers use [`SessionController::snapshot`] or a
//! cloned [`SharedState`] handle from another thread.
//!
//! Usage errors (wrong phase, bad or colliding name) are returned before any
//! state changes.
//!
//! A loop that misses the stop deadline is kept as a stalled handle rather
//! than forgotten. Until it has really exited, `start()` and `archive()` fail
//! with `LoopStalled`, so two loops never run at once and the old log is not
//! archived while it can still grow.

use crate::archive::Archiver;
use crate::backend::simulated::SimulatedImu;
use crate::backend::source::SampleSource;
use crate::backend::worker::{AcquisitionWorker, ExitReason, RateGovernor, WorkerExit, WorkerHandle};
use crate::config::{RecorderConfig, SourceKind};
use crate::error::{RecorderError, Result};
use crate::session::log_sink::{LogSink, OpenMode, SyncPolicy};
use crate::session::naming;
use crate::session::shared::{SharedState, StateView};
use crate::session::types::{ArchiveOutcome, ArchiveStatus, Phase, SessionInfo};
use std::path::{Path, PathBuf};

/// Produces a sample source for a new session
pub type SourceFactory = Box<dyn FnMut() -> anyhow::Result<Box<dyn SampleSource>> + Send>;

/// Recording session state machine
pub struct SessionController {
    config: RecorderConfig,
    state: SharedState,
    governor: RateGovernor,
    factory: SourceFactory,
    /// Source handed back by the last loop, reused by the next session
    source: Option<Box<dyn SampleSource>>,
    archiver: Box<dyn Archiver>,
    worker: Option<WorkerHandle>,
    /// Loop that missed its stop deadline and has not exited yet
    stalled: Option<WorkerHandle>,
    /// Log of the current session, until it is archived or discarded
    log_path: Option<PathBuf>,
    shut_down: bool,
}

impl SessionController {
    /// Create a controller; the factory is called when a session needs a source
    pub fn new(
        config: RecorderConfig,
        factory: SourceFactory,
        archiver: Box<dyn Archiver>,
    ) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            governor: RateGovernor::from_config(&config)?,
            config,
            state: SharedState::new(),
            factory,
            source: None,
            archiver,
            worker: None,
            stalled: None,
            log_path: None,
            shut_down: false,
        })
    }

    /// Create a controller around one long-lived source
    pub fn with_source(
        config: RecorderConfig,
        source: impl SampleSource + 'static,
        archiver: impl Archiver + 'static,
    ) -> Result<Self> {
        let factory: SourceFactory =
            Box::new(|| anyhow::bail!("sample source was not returned by the previous session"));
        let mut controller = Self::new(config, factory, Box::new(archiver))?;
        controller.source = Some(Box::new(source));
        Ok(controller)
    }

    /// Create a controller with the source and archiver named in the config
    pub fn from_config(config: RecorderConfig) -> Result<Self> {
        let source_config = config.source.clone();
        let factory: SourceFactory = Box::new(move || match source_config.kind {
            SourceKind::Simulated => {
                Ok(Box::new(SimulatedImu::from_config(&source_config)) as Box<dyn SampleSource>)
            }
        });
        let archiver = crate::archive::from_config(&config.archive)?;
        Self::new(config, factory, archiver)
    }

    // ==== Control operations ====

    /// Start a new session, optionally with a caller-chosen log name
    pub fn start(&mut self, name: Option<&str>) -> Result<()> {
        self.ensure_live()?;
        let phase = self.state.phase();
        if phase != Phase::Idle || self.worker.is_some() {
            return Err(RecorderError::SessionActive(phase));
        }
        self.reap_stalled()?;

        let storage = &self.config.storage;
        let path = naming::resolve_log_path(
            &storage.log_directory,
            name,
            &storage.extension,
            storage.overwrite_existing,
        )?;

        let source = match self.source.take() {
            Some(source) => source,
            None => (self.factory)()
                .map_err(|e| RecorderError::SourceUnavailable(format!("{:#}", e)))?,
        };

        let mode = if storage.overwrite_existing {
            OpenMode::Truncate
        } else {
            OpenMode::CreateNew
        };
        let sync = if storage.sync_on_append {
            SyncPolicy::SyncData
        } else {
            SyncPolicy::Flush
        };
        let sink = match LogSink::open_with(&path, mode, sync) {
            Ok(sink) => sink,
            Err(e) => {
                self.source = Some(source);
                return Err(e);
            }
        };

        // Fresh counters must be in place before the loop publishes anything
        let publisher = self.state.begin_session(SessionInfo::for_log(path.clone()));
        match AcquisitionWorker::spawn(source, sink, publisher, self.governor) {
            Ok(handle) => self.worker = Some(handle),
            Err(e) => {
                self.state.clear_session();
                return Err(e);
            }
        }

        tracing::info!("Recording started: {:?}", path);
        self.log_path = Some(path);
        Ok(())
    }

    /// Stop recording and close the log
    ///
    /// Waits up to `sampling.stop_timeout_ms` for the loop to exit. If the loop
    /// had already died on a persistence failure, the session still moves to
    /// `Stopped` and that failure is returned. A loop that misses the deadline
    /// is kept as stalled and `LoopStalled` is returned.
    pub fn stop(&mut self) -> Result<()> {
        self.ensure_live()?;
        let phase = self.state.phase();
        if phase != Phase::Recording {
            return Err(RecorderError::InvalidPhase {
                operation: "stop",
                phase,
            });
        }

        match self.worker.take() {
            Some(mut handle) => {
                let exit = handle.stop(self.config.stop_timeout());
                if matches!(exit, Err(RecorderError::LoopStalled { .. })) {
                    self.stalled = Some(handle);
                }
                self.finish_recording(exit)
            }
            None => {
                self.state.end_recording();
                Ok(())
            }
        }
    }

    /// Hand the closed log to the archiver
    pub fn archive(&mut self) -> Result<ArchiveOutcome> {
        self.ensure_live()?;
        let view = self.state.snapshot();

        if let ArchiveStatus::Succeeded { remote_id, .. } = &view.archive_status {
            return Err(RecorderError::AlreadyArchived {
                remote_id: remote_id.clone(),
            });
        }
        if view.phase != Phase::Stopped {
            return Err(RecorderError::InvalidPhase {
                operation: "archive",
                phase: view.phase,
            });
        }

        let Some(path) = self.log_path.clone() else {
            return Err(RecorderError::InvalidPhase {
                operation: "archive",
                phase: view.phase,
            });
        };
        self.reap_stalled()?;
        if !path.is_file() {
            return Err(RecorderError::LogFileMissing(path));
        }

        self.state
            .set_archive_status(ArchiveStatus::InProgress, Some(Phase::Archiving));
        tracing::info!("Archiving {:?} via {}", path, self.archiver.name());

        match self.archiver.upload(&path) {
            Ok(remote_id) => {
                let file_name = view.session.file_name.clone().unwrap_or_default();
                self.state.complete_archive(remote_id.clone(), file_name);
                self.log_path = None;
                tracing::info!("Archived {:?} as {}", path, remote_id);
                Ok(ArchiveOutcome {
                    remote_id,
                    path,
                    sample_count: view.session.sample_count,
                })
            }
            Err(e) => {
                let reason = format!("{:#}", e);
                tracing::warn!("Archive of {:?} failed: {}", path, reason);
                self.state
                    .set_archive_status(ArchiveStatus::Failed(reason.clone()), Some(Phase::Stopped));
                Err(RecorderError::Archival(reason))
            }
        }
    }

    /// Drop the stopped session without archiving; the log stays on disk
    pub fn discard(&mut self) -> Result<()> {
        self.ensure_live()?;
        let phase = self.state.phase();
        if phase != Phase::Stopped {
            return Err(RecorderError::InvalidPhase {
                operation: "discard",
                phase,
            });
        }

        if let Some(path) = self.log_path.take() {
            tracing::info!("Discarded session, log kept at {:?}", path);
        }
        self.state.clear_session();
        Ok(())
    }

    /// Stop everything and refuse further sessions
    ///
    /// Safe from any phase. A loop stuck in a poll is detached after the stop
    /// timeout rather than waited on forever.
    pub fn shutdown(&mut self) {
        if self.shut_down {
            return;
        }

        if let Some(mut handle) = self.worker.take() {
            match handle.stop(self.config.stop_timeout()) {
                Ok(exit) => self.reclaim(exit),
                Err(e) => tracing::error!("{}; detaching acquisition thread", e),
            }
        }
        if self.stalled.take().is_some() {
            tracing::warn!("Detaching stalled acquisition thread");
        }

        self.state.mark_shut_down();
        self.shut_down = true;
        tracing::info!("Recorder shut down");
    }

    /// Reap a loop that ended on its own
    ///
    /// Returns `Ok(true)` if a loop was reaped, and the loop's failure if it
    /// died on a persistence error. The session moves to `Stopped` so the
    /// partial log can still be archived or discarded.
    pub fn supervise(&mut self) -> Result<bool> {
        if self.stalled.is_some() {
            // Still stalled is not news; the next start() reports it
            self.reap_stalled().ok();
        }

        let Some(handle) = self.worker.as_mut() else {
            return Ok(false);
        };
        let Some(exit) = handle.try_finish() else {
            return Ok(false);
        };

        self.worker = None;
        self.finish_recording(exit)?;
        Ok(true)
    }

    // ==== Observation ====

    /// Consistent copy of the shared state
    pub fn snapshot(&self) -> StateView {
        self.state.snapshot()
    }

    /// Handle for reading the state from another thread
    pub fn state_handle(&self) -> SharedState {
        self.state.clone()
    }

    /// Current phase
    pub fn phase(&self) -> Phase {
        self.state.phase()
    }

    /// Log path of the current session
    pub fn log_path(&self) -> Option<&Path> {
        self.log_path.as_deref()
    }

    pub fn config(&self) -> &RecorderConfig {
        &self.config
    }

    pub fn is_shut_down(&self) -> bool {
        self.shut_down
    }

    fn ensure_live(&self) -> Result<()> {
        if self.shut_down {
            Err(RecorderError::ShutDown)
        } else {
            Ok(())
        }
    }

    /// Take back the log and source from an exited loop and enter `Stopped`
    fn finish_recording(&mut self, exit: Result<WorkerExit>) -> Result<()> {
        let exit = match exit {
            Ok(exit) => exit,
            Err(e) => {
                // Stalled or panicked loop: the log stays where it is
                tracing::error!("{}", e);
                self.state.end_recording();
                return Err(e);
            }
        };

        self.source = Some(exit.source);
        let mut sink = exit.sink;
        let closed = sink.close();
        self.state.end_recording();
        tracing::info!(
            "Recording stopped: {} samples in {:?}",
            exit.samples,
            sink.path()
        );

        match exit.reason {
            ExitReason::Stopped => closed,
            ExitReason::PersistenceFailed(e) => {
                if let Err(close_err) = closed {
                    tracing::warn!("Closing failed log also failed: {}", close_err);
                }
                Err(e)
            }
        }
    }

    /// Collect a stalled loop if it has exited since
    ///
    /// Fails with `LoopStalled` while the thread is still alive.
    fn reap_stalled(&mut self) -> Result<()> {
        let Some(handle) = self.stalled.as_mut() else {
            return Ok(());
        };
        match handle.try_finish() {
            None => Err(RecorderError::LoopStalled {
                timeout: self.config.stop_timeout(),
            }),
            Some(Ok(exit)) => {
                self.stalled = None;
                tracing::info!("Stalled acquisition loop exited after {} samples", exit.samples);
                self.reclaim(exit);
                Ok(())
            }
            Some(Err(e)) => {
                self.stalled = None;
                tracing::warn!("Stalled acquisition loop ended: {}", e);
                Ok(())
            }
        }
    }

    /// Close the log of a finished loop and keep its source for reuse
    fn reclaim(&mut self, exit: WorkerExit) {
        let mut sink = exit.sink;
        if let Err(e) = sink.close() {
            tracing::error!("Failed to close {:?}: {}", sink.path(), e);
        }
        if self.source.is_none() {
            self.source = Some(exit.source);
        }
    }
}

impl Drop for SessionController {
    fn drop(&mut self) {
        self.shutdown();
    }
}
