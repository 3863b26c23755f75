//! SharedState — the one structure shared between the acquisition loop,
//! the controller and any number of readers.
//!
//! All fields live behind a single `RwLock`, so every publish is one critical
//! section and every [`SharedState::snapshot`] is a consistent copy: a reader
//! never sees a packet number without its paired sample and elapsed time.
//!
//! # Ownership
//!
//! | Fields | Writer |
//! |---|---|
//! | `latest_sample`, `latest_error`, `stats`, `session.sample_count`, `session.elapsed_ms`, `session.started_at` | acquisition loop |
//! | `phase`, `archive_status`, `shut_down`, session identity | controller |
//!
//! The loop writes through the [`SessionPublisher`] returned by
//! [`SharedState::begin_session`], the controller through the remaining
//! methods. Readers only call `snapshot`.
//!
//! # Generations
//!
//! Every session begin or end bumps a generation counter. A publisher only
//! writes while its generation is current, so a loop that outlives its
//! session (stalled in a poll past the stop deadline) cannot touch the
//! counters of a later one.

use crate::backend::source::AcquisitionStats;
use crate::session::types::{ArchiveStatus, Phase, SampleFault, SessionInfo};
use crate::types::Sample;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

/// What the consumer can tell about acquisition at a glance
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Health {
    /// No error outstanding
    Ok,
    /// Last poll failed but recording continues
    Degraded,
    /// Recording stopped on a persistence failure
    Failed,
}

/// Consistent copy of the shared state
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct StateView {
    pub phase: Phase,
    pub latest_sample: Option<Sample>,
    pub latest_error: Option<SampleFault>,
    pub session: SessionInfo,
    pub archive_status: ArchiveStatus,
    pub stats: AcquisitionStats,
    /// Set once `shutdown()` has run
    pub shut_down: bool,
    /// Bumped whenever a session begins or ends
    #[serde(skip)]
    pub generation: u64,
}

impl StateView {
    /// Packet number of the latest sample
    pub fn packet_number(&self) -> Option<u64> {
        self.latest_sample.as_ref().map(|s| s.packet_number)
    }

    /// Combine phase and latest error into one condition
    pub fn health(&self) -> Health {
        match &self.latest_error {
            None => Health::Ok,
            Some(fault) if fault.is_fatal() => Health::Failed,
            Some(_) => Health::Degraded,
        }
    }
}

/// Cloneable handle to the shared state
#[derive(Debug, Clone, Default)]
pub struct SharedState {
    inner: Arc<RwLock<StateView>>,
}

impl SharedState {
    /// Create an idle state
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy the current state; never blocks on anything but the lock itself
    pub fn snapshot(&self) -> StateView {
        self.read().clone()
    }

    /// Current phase
    pub fn phase(&self) -> Phase {
        self.read().phase
    }

    // ==== Controller side ====

    /// Enter `Recording` with a fresh session; all counters start at zero
    ///
    /// The returned publisher is the only way to write the session counters.
    pub fn begin_session(&self, session: SessionInfo) -> SessionPublisher {
        let mut state = self.write();
        state.generation += 1;
        state.phase = Phase::Recording;
        state.session = session;
        state.latest_sample = None;
        state.latest_error = None;
        state.archive_status = ArchiveStatus::Idle;
        state.stats = AcquisitionStats::default();

        SessionPublisher {
            state: self.clone(),
            generation: state.generation,
        }
    }

    /// Enter `Stopped`; the session's publisher goes quiet
    pub fn end_recording(&self) {
        let mut state = self.write();
        state.generation += 1;
        state.phase = Phase::Stopped;
    }

    /// Change archive status, optionally together with the phase
    pub fn set_archive_status(&self, status: ArchiveStatus, phase: Option<Phase>) {
        let mut state = self.write();
        state.archive_status = status;
        if let Some(phase) = phase {
            state.phase = phase;
        }
    }

    /// Return to `Idle` after a successful archive
    ///
    /// The file identity and counters are cleared, the success status stays
    /// visible until the next session begins.
    pub fn complete_archive(&self, remote_id: String, file_name: String) {
        let mut state = self.write();
        state.generation += 1;
        state.phase = Phase::Idle;
        state.archive_status = ArchiveStatus::Succeeded {
            remote_id,
            file_name,
        };
        state.session = SessionInfo {
            archived: true,
            ..Default::default()
        };
        state.latest_sample = None;
        state.latest_error = None;
    }

    /// Drop the session without archiving
    pub fn clear_session(&self) {
        let mut state = self.write();
        state.generation += 1;
        state.phase = Phase::Idle;
        state.session = SessionInfo::default();
        state.latest_sample = None;
        state.latest_error = None;
        state.archive_status = ArchiveStatus::Idle;
    }

    /// Mark the recorder shut down and idle
    pub fn mark_shut_down(&self) {
        let mut state = self.write();
        state.generation += 1;
        state.phase = Phase::Idle;
        state.shut_down = true;
    }

    fn read(&self) -> RwLockReadGuard<'_, StateView> {
        // Every critical section leaves plain values behind, so a poisoned
        // lock still guards a consistent view.
        self.inner.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, StateView> {
        self.inner.write().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Loop-side writer for one session
///
/// Every method is a no-op once the session has ended; the return value
/// tells whether the write landed.
#[derive(Debug, Clone)]
pub struct SessionPublisher {
    state: SharedState,
    generation: u64,
}

impl SessionPublisher {
    /// Whether this publisher's session is still the current one
    pub fn is_current(&self) -> bool {
        self.state.read().generation == self.generation
    }

    /// Record the session start time; only the first call has an effect
    pub fn mark_started(&self, at: DateTime<Utc>) -> bool {
        self.update(|state| {
            if state.session.started_at.is_none() {
                state.session.started_at = Some(at);
            }
        })
    }

    /// Publish an appended sample together with its counters
    pub fn publish_sample(&self, sample: Sample, elapsed_ms: u64, stats: AcquisitionStats) -> bool {
        self.update(|state| {
            state.session.sample_count = sample.packet_number + 1;
            state.session.elapsed_ms = elapsed_ms;
            state.latest_sample = Some(sample);
            state.latest_error = None;
            state.stats = stats;
        })
    }

    /// Publish a fault; the latest sample and sample count stay as they were
    pub fn publish_fault(&self, fault: SampleFault, elapsed_ms: u64, stats: AcquisitionStats) -> bool {
        self.update(|state| {
            state.session.elapsed_ms = elapsed_ms;
            state.latest_error = Some(fault);
            state.stats = stats;
        })
    }

    /// Advance the elapsed time without a sample
    pub fn publish_elapsed(&self, elapsed_ms: u64) -> bool {
        self.update(|state| state.session.elapsed_ms = elapsed_ms)
    }

    fn update(&self, apply: impl FnOnce(&mut StateView)) -> bool {
        let mut state = self.state.write();
        if state.generation != self.generation {
            tracing::trace!(
                "Dropped publish from session generation {} (current {})",
                self.generation,
                state.generation
            );
            return false;
        }
        apply(&mut state);
        true
    }
}
