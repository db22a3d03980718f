/// Mutable state of one playback run.
///
/// Owned exclusively by the scheduler and reset at every start.
#[derive(Debug, Clone, PartialEq)]
pub struct PlaybackSession {
    pub is_playing: bool,
    /// Unbounded physical step counter
    pub beat_counter: u64,
    /// Audio-clock time of the next unscheduled step, swing excluded
    pub next_note_time: f64,
    /// Highest measure index for which the measure hook has fired
    pub last_completed_measure: Option<u64>,
}

impl Default for PlaybackSession {
    fn default() -> Self {
        Self {
            is_playing: false,
            beat_counter: 0,
            next_note_time: 0.0,
            last_completed_measure: None,
        }
    }
}

impl PlaybackSession {
    pub fn reset(&mut self, now: f64, start_epsilon: f64) {
        *self = Self {
            is_playing: true,
            beat_counter: 0,
            next_note_time: now + start_epsilon,
            last_completed_measure: None,
        };
    }

    pub fn stop(&mut self) {
        self.is_playing = false;
    }

    /// Record `measure` as reached. Returns `true` exactly once per new
    /// measure, and never for a measure at or below the last one seen.
    pub fn enter_measure(&mut self, measure: u64) -> bool {
        match self.last_completed_measure {
            Some(last) if measure <= last => false,
            _ => {
                self.last_completed_measure = Some(measure);
                true
            }
        }
    }
}
