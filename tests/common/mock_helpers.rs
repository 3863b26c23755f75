//! Mock construction helpers

use crossbeam_channel::{bounded, Receiver, Sender};
use imu_recorder::archive::Archiver;
use imu_recorder::backend::SampleSource;
use imu_recorder::types::RawReading;
use mockall::mock;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

mock! {
    pub Archiver {}

    impl Archiver for Archiver {
        fn upload(&mut self, path: &Path) -> anyhow::Result<String>;
    }
}

mock! {
    pub Source {}

    impl SampleSource for Source {
        fn poll(&mut self) -> anyhow::Result<RawReading>;
    }
}

/// Archiver that accepts every upload and returns a fixed id
pub fn accepting_archiver(remote_id: &'static str) -> MockArchiver {
    let mut archiver = MockArchiver::new();
    archiver
        .expect_upload()
        .returning(move |_| Ok(remote_id.to_string()));
    archiver
}

/// Source that blocks inside `poll` until released
///
/// Each message on the returned sender lets one poll complete. Dropping the
/// sender makes every further poll fail immediately.
pub struct GatedSource {
    gate: Receiver<()>,
    polls: Arc<AtomicU64>,
}

impl GatedSource {
    pub fn new() -> (Self, Sender<()>, Arc<AtomicU64>) {
        let (tx, rx) = bounded(16);
        let polls = Arc::new(AtomicU64::new(0));
        let source = Self {
            gate: rx,
            polls: polls.clone(),
        };
        (source, tx, polls)
    }
}

impl SampleSource for GatedSource {
    fn poll(&mut self) -> anyhow::Result<RawReading> {
        self.polls.fetch_add(1, Ordering::SeqCst);
        self.gate
            .recv()
            .map_err(|_| anyhow::anyhow!("gate closed"))?;
        Ok(RawReading::new((0.0, 0.0, 0.0), (0.0, 0.0, 1.0), (20.0, 0.0, 40.0)))
    }

    fn name(&self) -> &str {
        "gated"
    }
}

/// Source whose poll panics, taking the acquisition thread down
pub struct PanickingSource;

impl SampleSource for PanickingSource {
    fn poll(&mut self) -> anyhow::Result<RawReading> {
        panic!("driver bug")
    }
}
