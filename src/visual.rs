//! Visual sync - the "now playing" step indicator
//!
//! Runs once per display frame on its own thread. Each frame it drains the
//! notes whose audio time has been reached (plus a small latency offset) and
//! publishes the pattern slot of the most recent one through [`ActiveStep`].

use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

use crate::pattern::effective_step;
use crate::scheduler::NoteReceiver;

/// Lock-free readout of the currently highlighted step.
#[derive(Debug, Clone)]
pub struct ActiveStep(Arc<AtomicI64>);

impl Default for ActiveStep {
    fn default() -> Self {
        Self(Arc::new(AtomicI64::new(-1)))
    }
}

impl ActiveStep {
    pub fn get(&self) -> Option<usize> {
        let value = self.0.load(Ordering::Acquire);
        (value >= 0).then_some(value as usize)
    }

    pub fn set(&self, step: Option<usize>) {
        let value = step.map_or(-1, |s| s as i64);
        self.0.store(value, Ordering::Release);
    }
}

pub struct VisualSync {
    notes: NoteReceiver,
    active: ActiveStep,
    visual_offset: f64,
}

impl VisualSync {
    pub fn new(notes: NoteReceiver, active: ActiveStep, visual_offset: f64) -> Self {
        Self {
            notes,
            active,
            visual_offset,
        }
    }

    pub fn active_step(&self) -> &ActiveStep {
        &self.active
    }

    /// Process one display frame at audio time `now`.
    ///
    /// Returns the published step, which is unchanged if no note came due.
    pub fn on_frame(&mut self, now: f64, pattern_len: usize, shift: i64) -> Option<usize> {
        let deadline = now + self.visual_offset;
        let mut latest = None;
        while let Some(note) = self.notes.pop_due(deadline) {
            latest = Some(note);
        }
        if let Some(note) = latest {
            self.active
                .set(effective_step(note.step_index, shift, pattern_len));
        }
        self.active.get()
    }

    /// Drop queued notes and clear the indicator.
    pub fn clear(&mut self) {
        self.notes.clear();
        self.active.set(None);
    }
}
