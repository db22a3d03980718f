//! Live metronome settings shared between the controlling thread and the
//! scheduler
//!
//! The scheduler reads [`MetronomeSettings`] through a [`SettingsHandle`] at
//! every step decision, so edits take effect on the next scheduled step
//! without restarting playback. Meter changes regenerate the default
//! pattern under the same write lock, so a reader never observes a pattern
//! whose length disagrees with `beats_per_measure × subdivision`.

use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::audio::SoundPreset;
use crate::pattern::{clamp_bpm, RhythmPattern, StepAccent, SwingShiftConfig, TempoConfig};
use crate::trainers::{IntervalTrainerConfig, SpeedTrainerConfig};

/// Everything that shapes playback.
#[derive(Debug, Clone, PartialEq)]
pub struct MetronomeSettings {
    tempo: TempoConfig,
    pattern: RhythmPattern,
    pub swing_shift: SwingShiftConfig,
    pub sound: SoundPreset,
    pub speed_trainer: SpeedTrainerConfig,
    pub interval_trainer: IntervalTrainerConfig,
}

impl Default for MetronomeSettings {
    fn default() -> Self {
        Self::new(TempoConfig::default())
    }
}

impl MetronomeSettings {
    pub fn new(tempo: TempoConfig) -> Self {
        let tempo = TempoConfig::new(tempo.bpm, tempo.beats_per_measure, tempo.subdivision);
        Self {
            pattern: RhythmPattern::default_for(tempo.beats_per_measure, tempo.subdivision),
            tempo,
            swing_shift: SwingShiftConfig::default(),
            sound: SoundPreset::default(),
            speed_trainer: SpeedTrainerConfig::default(),
            interval_trainer: IntervalTrainerConfig::default(),
        }
    }

    #[inline]
    pub fn tempo(&self) -> TempoConfig {
        self.tempo
    }

    #[inline]
    pub fn pattern(&self) -> &RhythmPattern {
        &self.pattern
    }

    /// Set the tempo, clamped into the supported range. Returns the value
    /// actually applied.
    pub fn set_bpm(&mut self, bpm: u32) -> u32 {
        self.tempo.bpm = clamp_bpm(bpm);
        self.tempo.bpm
    }

    pub fn set_beats_per_measure(&mut self, beats: u32) {
        self.tempo.beats_per_measure = beats.max(1);
        self.reconcile_pattern();
    }

    pub fn set_subdivision(&mut self, subdivision: u32) {
        self.tempo.subdivision = subdivision.max(1);
        self.reconcile_pattern();
    }

    /// Replace the pattern. A pattern whose length does not fit the current
    /// meter is replaced by the default pattern; returns `false` in that
    /// case.
    pub fn set_pattern(&mut self, pattern: RhythmPattern) -> bool {
        self.pattern = pattern;
        !self.reconcile_pattern()
    }

    pub fn toggle_step(&mut self, index: usize) -> Option<StepAccent> {
        self.pattern.toggle(index)
    }

    pub fn set_step(&mut self, index: usize, accent: StepAccent) -> bool {
        self.pattern.set(index, accent)
    }

    pub fn set_swing(&mut self, swing_percent: u8) {
        self.swing_shift.swing_percent = swing_percent.min(100);
    }

    pub fn set_shift(&mut self, shift_steps: i64) {
        self.swing_shift.shift_steps = shift_steps;
    }

    /// Regenerate the default pattern if its length no longer matches the
    /// meter. Returns `true` when a new pattern was generated.
    fn reconcile_pattern(&mut self) -> bool {
        if self.pattern.matches(&self.tempo) {
            return false;
        }
        log::debug!(
            "[Settings] Pattern length {} does not fit {}x{}, regenerating",
            self.pattern.len(),
            self.tempo.beats_per_measure,
            self.tempo.subdivision
        );
        self.pattern =
            RhythmPattern::default_for(self.tempo.beats_per_measure, self.tempo.subdivision);
        true
    }
}

/// Cheaply cloneable handle to the live settings.
///
/// A poisoned lock is recovered rather than propagated: settings are plain
/// data and stay consistent across a panicking writer because every setter
/// leaves them valid.
#[derive(Debug, Clone, Default)]
pub struct SettingsHandle {
    inner: Arc<RwLock<MetronomeSettings>>,
}

impl SettingsHandle {
    pub fn new(settings: MetronomeSettings) -> Self {
        Self {
            inner: Arc::new(RwLock::new(settings)),
        }
    }

    /// Run `f` with a read lock held. Keep `f` short: the scheduler takes
    /// this lock once per step.
    pub fn read<R>(&self, f: impl FnOnce(&MetronomeSettings) -> R) -> R {
        f(&self.read_guard())
    }

    /// Run `f` with the write lock held.
    pub fn update<R>(&self, f: impl FnOnce(&mut MetronomeSettings) -> R) -> R {
        f(&mut self.write_guard())
    }

    /// Copy of the current settings.
    pub fn snapshot(&self) -> MetronomeSettings {
        self.read(|s| s.clone())
    }

    fn read_guard(&self) -> RwLockReadGuard<'_, MetronomeSettings> {
        self.inner.read().unwrap_or_else(|poisoned| {
            log::warn!("[Settings] Recovering from poisoned settings lock");
            poisoned.into_inner()
        })
    }

    fn write_guard(&self) -> RwLockWriteGuard<'_, MetronomeSettings> {
        self.inner.write().unwrap_or_else(|poisoned| {
            log::warn!("[Settings] Recovering from poisoned settings lock");
            poisoned.into_inner()
        })
    }
}
