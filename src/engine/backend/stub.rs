use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use crate::audio::{AudioClock, ManualClock, SoundPreset, SoundSink};
use crate::config::AudioConfig;
use crate::error::AudioError;
use crate::pattern::StepAccent;

use super::{AudioBackend, AudioOutput, TimeSource};

/// One call to [`SoundSink::trigger`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DispatchRecord {
    pub audio_time: f64,
    pub accent: StepAccent,
    pub preset: SoundPreset,
}

/// Sink that records every dispatch instead of producing sound.
///
/// Clones share the same log.
#[derive(Debug, Clone, Default)]
pub struct RecordingSink {
    log: Arc<Mutex<Vec<DispatchRecord>>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn records(&self) -> Vec<DispatchRecord> {
        self.lock().clone()
    }

    pub fn clear(&self) {
        self.lock().clear();
    }

    fn lock(&self) -> MutexGuard<'_, Vec<DispatchRecord>> {
        self.log.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl SoundSink for RecordingSink {
    fn trigger(&mut self, audio_time: f64, accent: StepAccent, preset: SoundPreset) {
        if !accent.is_audible() {
            return;
        }
        self.lock().push(DispatchRecord {
            audio_time,
            accent,
            preset,
        });
    }
}

/// Stub backend used for deterministic testing and CLI tooling.
///
/// Produces no audio. The audio clock is a [`ManualClock`] that only moves
/// when the caller advances it, and dispatches land in a shared
/// [`RecordingSink`].
pub struct StubBackend {
    clock: Arc<ManualClock>,
    sink: RecordingSink,
    available: AtomicBool,
    open_count: AtomicU64,
}

impl StubBackend {
    pub fn new() -> Self {
        Self {
            clock: Arc::new(ManualClock::default()),
            sink: RecordingSink::new(),
            available: AtomicBool::new(true),
            open_count: AtomicU64::new(0),
        }
    }

    /// A backend whose `open` fails until [`set_available`](Self::set_available)
    /// is called.
    pub fn unavailable() -> Self {
        let backend = Self::new();
        backend.set_available(false);
        backend
    }

    pub fn clock(&self) -> Arc<ManualClock> {
        Arc::clone(&self.clock)
    }

    pub fn sink(&self) -> RecordingSink {
        self.sink.clone()
    }

    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    /// Number of successful `open` calls.
    pub fn open_count(&self) -> u64 {
        self.open_count.load(Ordering::SeqCst)
    }
}

impl Default for StubBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl AudioBackend for StubBackend {
    fn name(&self) -> &'static str {
        "stub"
    }

    fn open(&self, config: &AudioConfig) -> Result<AudioOutput, AudioError> {
        if !self.available.load(Ordering::SeqCst) {
            return Err(AudioError::BackendUnavailable {
                backend: self.name().to_string(),
            });
        }
        self.open_count.fetch_add(1, Ordering::SeqCst);

        let clock: Arc<dyn AudioClock> = self.clock.clone();
        Ok(AudioOutput::new(
            clock,
            Box::new(self.sink.clone()),
            config.sample_rate,
        ))
    }
}

/// Externally driven time source for tap tempo tests.
#[derive(Default)]
pub struct StubTimeSource {
    clock: ManualClock,
}

impl StubTimeSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_ms(&self, ms: f64) {
        self.clock.set(ms);
    }
}

impl TimeSource for StubTimeSource {
    fn now_ms(&self) -> f64 {
        self.clock.now()
    }
}
