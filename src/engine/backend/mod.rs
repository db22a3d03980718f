//! Backend abstractions for the metronome engine.

use std::sync::Arc;
use std::time::Instant;

use crate::audio::{AudioClock, SoundSink};
use crate::config::AudioConfig;
use crate::error::AudioError;

/// An open audio output: the clock the scheduler times against and the
/// sink it dispatches sounds to.
///
/// Dropping the output closes the underlying stream.
pub struct AudioOutput {
    pub clock: Arc<dyn AudioClock>,
    pub sink: Box<dyn SoundSink>,
    pub sample_rate: u32,
    _stream: Option<Box<dyn Send>>,
}

impl AudioOutput {
    pub fn new(clock: Arc<dyn AudioClock>, sink: Box<dyn SoundSink>, sample_rate: u32) -> Self {
        Self {
            clock,
            sink,
            sample_rate,
            _stream: None,
        }
    }

    /// Attach a value that keeps the device stream alive for as long as this
    /// output exists.
    pub fn with_stream_guard(mut self, guard: impl Send + 'static) -> Self {
        self._stream = Some(Box::new(guard));
        self
    }
}

/// Trait implemented by platform-specific audio backends.
///
/// `open` is called lazily the first time playback starts and again on
/// later starts while it keeps failing. The returned output stays open
/// across stop/start cycles.
pub trait AudioBackend: Send + Sync {
    fn name(&self) -> &'static str;
    fn open(&self, config: &AudioConfig) -> Result<AudioOutput, AudioError>;
}

/// Monotonic wall-clock source for tap tempo and event timestamps.
pub trait TimeSource: Send + Sync {
    /// Milliseconds since an arbitrary fixed origin.
    fn now_ms(&self) -> f64;
}

/// Default time source backed by `Instant::now`.
pub struct SystemTimeSource {
    origin: Instant,
}

impl Default for SystemTimeSource {
    fn default() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl TimeSource for SystemTimeSource {
    fn now_ms(&self) -> f64 {
        self.origin.elapsed().as_secs_f64() * 1000.0
    }
}

mod cpal;
pub use self::cpal::CpalBackend;

mod stub;
pub use self::stub::{DispatchRecord, RecordingSink, StubBackend, StubTimeSource};
