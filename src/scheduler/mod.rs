//! Lookahead scheduling
//!
//! # Architecture
//! ```text
//! tick thread (every tick_interval_ms)
//!   └─> LookaheadScheduler::tick(clock.now())
//!       ├─> SettingsHandle::read        [per step, short lock]
//!       ├─> SchedulerHooks              [measure boundaries, mute]
//!       ├─> SoundSink::trigger          [audible steps]
//!       └─> NoteSender::send            [every step, for the visual loop]
//! ```

mod lookahead;
pub mod notes;
mod session;

#[cfg(test)]
mod tests;

pub use lookahead::LookaheadScheduler;
pub use notes::{note_queue, NoteReceiver, NoteSender, ScheduledNote};
pub use session::PlaybackSession;

/// Callbacks invoked by the scheduler, always on the scheduler thread.
pub trait SchedulerHooks {
    /// Called once when `measure` is first reached, in increasing order
    /// starting at 0.
    fn on_measure_complete(&mut self, measure: u64);

    /// Whether steps of `measure` should be silenced.
    fn is_measure_muted(&self, measure: u64) -> bool {
        let _ = measure;
        false
    }

    /// Checked after each measure hook. Returning `false` ends the session
    /// before the step that opened the measure is dispatched.
    fn keep_playing(&self) -> bool {
        true
    }
}

/// Hooks that do nothing.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoHooks;

impl SchedulerHooks for NoHooks {
    fn on_measure_complete(&mut self, _measure: u64) {}
}

/// Outcome of a single tick.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct TickReport {
    /// Steps committed, audible or not
    pub scheduled: u32,
    /// Steps handed to the sound sink
    pub dispatched: u32,
    /// Steps skipped by accent or mute predicate
    pub muted: u32,
    /// Measure hooks fired
    pub measures_completed: u32,
    /// The per-tick step cap stopped this tick early
    pub hit_iteration_cap: bool,
}
