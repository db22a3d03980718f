//! Rhythm pattern data model
//!
//! A pattern holds one [`StepAccent`] per subdivision step of a single
//! measure. Playback never mutates it: shift and swing are applied when a
//! step is looked up, through [`effective_step`] and
//! [`SwingShiftConfig::swing_delay`].

mod accent;
mod tempo;

pub use accent::StepAccent;
pub use tempo::{clamp_bpm, SwingShiftConfig, TempoConfig, MAX_BPM, MIN_BPM, SWING_DELAY_FACTOR};

use serde::{Deserialize, Serialize};

/// Ordered accent sequence for one measure.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RhythmPattern {
    steps: Vec<StepAccent>,
}

impl RhythmPattern {
    pub fn new(steps: Vec<StepAccent>) -> Self {
        Self { steps }
    }

    /// Default pattern for a meter: accent on the downbeat, everything else
    /// normal.
    pub fn default_for(beats_per_measure: u32, subdivision: u32) -> Self {
        let len = beats_per_measure.max(1) as usize * subdivision.max(1) as usize;
        let mut steps = vec![StepAccent::Normal; len];
        steps[0] = StepAccent::Accent;
        Self { steps }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.steps.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn steps(&self) -> &[StepAccent] {
        &self.steps
    }

    pub fn get(&self, index: usize) -> Option<StepAccent> {
        self.steps.get(index).copied()
    }

    /// Advance one step through the accent cycle. Returns the new accent,
    /// or `None` if `index` is out of range.
    pub fn toggle(&mut self, index: usize) -> Option<StepAccent> {
        let step = self.steps.get_mut(index)?;
        *step = step.next();
        Some(*step)
    }

    pub fn set(&mut self, index: usize, accent: StepAccent) -> bool {
        match self.steps.get_mut(index) {
            Some(step) => {
                *step = accent;
                true
            }
            None => false,
        }
    }

    /// True if the pattern length matches `beats × subdivision`.
    pub fn matches(&self, tempo: &TempoConfig) -> bool {
        self.steps.len() as u64 == tempo.steps_per_measure()
    }

    /// Accent that plays on physical step `step_index` with rotation
    /// `shift`. An empty pattern resolves to [`StepAccent::Mute`].
    pub fn accent_at(&self, step_index: u64, shift: i64) -> StepAccent {
        effective_step(step_index, shift, self.steps.len())
            .and_then(|index| self.get(index))
            .unwrap_or(StepAccent::Mute)
    }
}

/// Map an unbounded step counter onto a pattern slot, applying rotation.
///
/// Computes `((step - shift) mod len + len) mod len`. Returns `None` for an
/// empty pattern instead of dividing by zero.
#[inline]
pub fn effective_step(step_index: u64, shift: i64, len: usize) -> Option<usize> {
    if len == 0 {
        return None;
    }
    let rotated = step_index as i128 - shift as i128;
    Some(rotated.rem_euclid(len as i128) as usize)
}
