//! Audio clocks
//!
//! The scheduler never looks at wall-clock time. Every decision is made
//! against an [`AudioClock`], which for live playback is the output stream's
//! frame counter divided by the sample rate: it advances exactly as fast as
//! samples leave the device and never jitters with thread scheduling.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Monotonic audio time source in seconds.
pub trait AudioClock: Send + Sync {
    fn now(&self) -> f64;
}

/// Clock derived from the number of frames rendered by the mixer.
#[derive(Clone)]
pub struct FrameClock {
    frames: Arc<AtomicU64>,
    sample_rate: u32,
}

impl FrameClock {
    pub fn new(frames: Arc<AtomicU64>, sample_rate: u32) -> Self {
        Self {
            frames,
            sample_rate: sample_rate.max(1),
        }
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Total frames rendered so far.
    pub fn frames(&self) -> u64 {
        self.frames.load(Ordering::Acquire)
    }
}

impl AudioClock for FrameClock {
    #[inline]
    fn now(&self) -> f64 {
        self.frames() as f64 / self.sample_rate as f64
    }
}

/// Convert an audio time to the nearest frame index. Negative times map to
/// frame 0.
#[inline]
pub fn time_to_frame(audio_time: f64, sample_rate: u32) -> u64 {
    if !audio_time.is_finite() || audio_time <= 0.0 {
        return 0;
    }
    (audio_time * sample_rate as f64).round() as u64
}

/// Externally driven clock for tests and tooling.
///
/// Stores the current time as `f64` bits so it can be shared across threads
/// without a lock.
#[derive(Default)]
pub struct ManualClock {
    bits: AtomicU64,
}

impl ManualClock {
    pub fn new(start: f64) -> Self {
        Self {
            bits: AtomicU64::new(start.to_bits()),
        }
    }

    pub fn set(&self, seconds: f64) {
        self.bits.store(seconds.to_bits(), Ordering::Release);
    }

    pub fn advance(&self, seconds: f64) {
        let now = self.now();
        self.set(now + seconds.max(0.0));
    }
}

impl AudioClock for ManualClock {
    #[inline]
    fn now(&self) -> f64 {
        f64::from_bits(self.bits.load(Ordering::Acquire))
    }
}
