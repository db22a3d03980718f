//! Practice trainers driven by measure boundaries
//!
//! - [`SpeedTrainerConfig`]: ramps the tempo by a fixed increment every N
//!   measures until a target is reached.
//! - [`IntervalTrainerConfig`]: plays N measures, then silences M measures,
//!   so the player has to keep time without the click.
//!
//! Both are pure functions of the measure index and are consulted from the
//! scheduler thread.

use serde::{Deserialize, Serialize};

use crate::pattern::MAX_BPM;

/// Gradual tempo increase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SpeedTrainerConfig {
    pub enabled: bool,
    /// BPM added at each step-up
    pub increment: u32,
    /// Step up every this many measures
    pub every_measures: u32,
    /// Stop ramping once this tempo is reached
    pub target_bpm: u32,
}

impl Default for SpeedTrainerConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            increment: 5,
            every_measures: 4,
            target_bpm: 200,
        }
    }
}

impl SpeedTrainerConfig {
    /// Tempo to switch to when `measure` starts, if any.
    pub fn next_bpm(&self, measure: u64, current_bpm: u32) -> Option<u32> {
        if !self.enabled || self.every_measures == 0 || current_bpm >= self.target_bpm {
            return None;
        }
        if measure == 0 || measure % self.every_measures as u64 != 0 {
            return None;
        }
        let next = current_bpm
            .saturating_add(self.increment)
            .min(self.target_bpm)
            .min(MAX_BPM);
        (next != current_bpm).then_some(next)
    }
}

/// Alternating audible / silent measures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct IntervalTrainerConfig {
    pub enabled: bool,
    pub play_bars: u32,
    pub mute_bars: u32,
}

impl Default for IntervalTrainerConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            play_bars: 3,
            mute_bars: 1,
        }
    }
}

impl IntervalTrainerConfig {
    pub fn is_muted(&self, measure: u64) -> bool {
        if !self.enabled {
            return false;
        }
        let cycle = self.play_bars as u64 + self.mute_bars as u64;
        if cycle == 0 {
            return false;
        }
        measure % cycle >= self.play_bars as u64
    }
}
