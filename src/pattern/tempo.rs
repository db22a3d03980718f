use serde::{Deserialize, Serialize};

/// Slowest tempo the engine accepts.
pub const MIN_BPM: u32 = 30;
/// Fastest tempo the engine accepts.
pub const MAX_BPM: u32 = 300;

/// Fraction of a step that 100% swing delays an off-beat note by.
///
/// 1/3 gives a triplet feel at full swing and stays below one half, so a
/// swung note can never move past the next step.
pub const SWING_DELAY_FACTOR: f64 = 1.0 / 3.0;

/// Tempo, meter and subdivision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TempoConfig {
    pub bpm: u32,
    pub beats_per_measure: u32,
    pub subdivision: u32,
}

impl TempoConfig {
    pub fn new(bpm: u32, beats_per_measure: u32, subdivision: u32) -> Self {
        Self {
            bpm: clamp_bpm(bpm),
            beats_per_measure: beats_per_measure.max(1),
            subdivision: subdivision.max(1),
        }
    }

    /// Duration of one step in seconds.
    ///
    /// Zero values are treated as 1 so the result is always finite and
    /// positive.
    #[inline]
    pub fn seconds_per_step(&self) -> f64 {
        let bpm = self.bpm.max(1) as f64;
        let subdivision = self.subdivision.max(1) as f64;
        60.0 / bpm / subdivision
    }

    #[inline]
    pub fn steps_per_measure(&self) -> u64 {
        self.beats_per_measure.max(1) as u64 * self.subdivision.max(1) as u64
    }

    /// Measure a step index falls in.
    #[inline]
    pub fn measure_of(&self, step_index: u64) -> u64 {
        step_index / self.steps_per_measure()
    }
}

impl Default for TempoConfig {
    fn default() -> Self {
        Self {
            bpm: 120,
            beats_per_measure: 4,
            subdivision: 1,
        }
    }
}

/// Clamp a tempo into `[MIN_BPM, MAX_BPM]`.
#[inline]
pub fn clamp_bpm(bpm: u32) -> u32 {
    bpm.clamp(MIN_BPM, MAX_BPM)
}

/// Swing amount and pattern rotation, applied at playback time only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SwingShiftConfig {
    /// 0-100
    pub swing_percent: u8,
    pub shift_steps: i64,
}

impl SwingShiftConfig {
    pub fn new(swing_percent: u8, shift_steps: i64) -> Self {
        Self {
            swing_percent: swing_percent.min(100),
            shift_steps,
        }
    }

    /// Delay applied to the note at `step_index`.
    ///
    /// Only odd steps are delayed, and only when there is more than one
    /// step per beat. The result is always below half of
    /// `seconds_per_step`.
    pub fn swing_delay(&self, step_index: u64, subdivision: u32, seconds_per_step: f64) -> f64 {
        let swing = self.swing_percent.min(100);
        if swing == 0 || subdivision < 2 || step_index % 2 == 0 {
            return 0.0;
        }
        (swing as f64 / 100.0) * seconds_per_step * SWING_DELAY_FACTOR
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_seconds_per_step() {
        let tempo = TempoConfig::new(120, 4, 1);
        assert!((tempo.seconds_per_step() - 0.5).abs() < 1e-12);

        let tempo = TempoConfig::new(120, 4, 4);
        assert!((tempo.seconds_per_step() - 0.125).abs() < 1e-12);
    }

    #[test]
    fn test_degenerate_values_stay_finite() {
        let tempo = TempoConfig {
            bpm: 0,
            beats_per_measure: 0,
            subdivision: 0,
        };
        assert_eq!(tempo.seconds_per_step(), 60.0);
        assert_eq!(tempo.steps_per_measure(), 1);
        assert_eq!(tempo.measure_of(7), 7);
    }

    #[test]
    fn test_bpm_clamped_on_construction() {
        assert_eq!(TempoConfig::new(5, 4, 1).bpm, MIN_BPM);
        assert_eq!(TempoConfig::new(1000, 4, 1).bpm, MAX_BPM);
        assert_eq!(TempoConfig::new(140, 0, 0).steps_per_measure(), 1);
    }

    #[test]
    fn test_swing_bound_holds_for_all_percentages() {
        for bpm in [MIN_BPM, 90, 120, 200, MAX_BPM] {
            for subdivision in 2..=4 {
                let step = TempoConfig::new(bpm, 4, subdivision).seconds_per_step();
                for percent in 0..=100u8 {
                    let swing = SwingShiftConfig::new(percent, 0);
                    for index in 0..8u64 {
                        let delay = swing.swing_delay(index, subdivision, step);
                        assert!(delay < step / 2.0, "delay {} for step {}", delay, step);
                        if index % 2 == 0 {
                            assert_eq!(delay, 0.0);
                        }
                    }
                }
            }
        }
    }

    #[test]
    fn test_no_swing_without_subdivision() {
        let swing = SwingShiftConfig::new(100, 0);
        assert_eq!(swing.swing_delay(1, 1, 0.5), 0.0);
        assert!(swing.swing_delay(1, 2, 0.25) > 0.0);
    }

    #[test]
    fn test_swing_percent_clamped() {
        assert_eq!(SwingShiftConfig::new(250, 3).swing_percent, 100);
    }
}
