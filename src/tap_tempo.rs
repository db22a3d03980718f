//! Tap tempo estimation from a short rolling window of taps.

use std::collections::VecDeque;

use crate::config::TapTempoConfig;
use crate::pattern::clamp_bpm;

#[derive(Debug, Clone)]
pub struct TapTempo {
    timeout_ms: f64,
    window: usize,
    taps: VecDeque<f64>,
}

impl Default for TapTempo {
    fn default() -> Self {
        Self::new(&TapTempoConfig::default())
    }
}

impl TapTempo {
    pub fn new(config: &TapTempoConfig) -> Self {
        let window = config.window.max(2);
        Self {
            timeout_ms: config.timeout_ms,
            window,
            taps: VecDeque::with_capacity(window),
        }
    }

    /// Register a tap at `timestamp_ms` and return the estimated tempo.
    ///
    /// A gap longer than the timeout, or a timestamp that does not move
    /// forward, starts a new window. Returns `None` until the window holds
    /// at least two taps.
    pub fn tap_at(&mut self, timestamp_ms: f64) -> Option<u32> {
        if let Some(&last) = self.taps.back() {
            let gap = timestamp_ms - last;
            if gap > self.timeout_ms || gap <= 0.0 || !gap.is_finite() {
                self.taps.clear();
            }
        }

        self.taps.push_back(timestamp_ms);
        while self.taps.len() > self.window {
            self.taps.pop_front();
        }

        self.estimate()
    }

    /// Current estimate without registering a tap.
    pub fn estimate(&self) -> Option<u32> {
        if self.taps.len() < 2 {
            return None;
        }
        let first = *self.taps.front()?;
        let last = *self.taps.back()?;
        let mean_interval = (last - first) / (self.taps.len() - 1) as f64;
        if mean_interval <= 0.0 {
            return None;
        }
        let bpm = (60_000.0 / mean_interval).round();
        Some(clamp_bpm(bpm.min(u32::MAX as f64) as u32))
    }

    pub fn tap_count(&self) -> usize {
        self.taps.len()
    }

    pub fn reset(&mut self) {
        self.taps.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pattern::{MAX_BPM, MIN_BPM};

    #[test]
    fn test_steady_taps_at_120() {
        let mut tap = TapTempo::default();
        assert_eq!(tap.tap_at(0.0), None);
        assert_eq!(tap.tap_at(500.0), Some(120));
        assert_eq!(tap.tap_at(1000.0), Some(120));
        assert_eq!(tap.tap_at(1500.0), Some(120));
    }

    #[test]
    fn test_single_tap_gives_no_estimate() {
        let mut tap = TapTempo::default();
        assert_eq!(tap.tap_at(42.0), None);
        assert_eq!(tap.estimate(), None);
    }

    #[test]
    fn test_timeout_starts_fresh_window() {
        let mut tap = TapTempo::default();
        tap.tap_at(0.0);
        assert_eq!(tap.tap_at(3000.0), None);
        assert_eq!(tap.tap_count(), 1);
        assert_eq!(tap.tap_at(3600.0), Some(100));
    }

    #[test]
    fn test_window_keeps_last_five() {
        let mut tap = TapTempo::default();
        // Slow taps first, then a faster run that should dominate.
        for t in [0.0, 1000.0, 2000.0] {
            tap.tap_at(t);
        }
        let mut last = None;
        for i in 1..=5 {
            last = tap.tap_at(2000.0 + i as f64 * 500.0);
        }
        assert_eq!(tap.tap_count(), 5);
        assert_eq!(last, Some(120));
    }

    #[test]
    fn test_estimate_is_clamped() {
        let mut tap = TapTempo::default();
        tap.tap_at(0.0);
        assert_eq!(tap.tap_at(10.0), Some(MAX_BPM));

        let mut tap = TapTempo::new(&TapTempoConfig {
            timeout_ms: 10_000.0,
            window: 5,
        });
        tap.tap_at(0.0);
        assert_eq!(tap.tap_at(5_000.0), Some(MIN_BPM));
    }

    #[test]
    fn test_backwards_timestamp_resets() {
        let mut tap = TapTempo::default();
        tap.tap_at(1000.0);
        tap.tap_at(1500.0);
        assert_eq!(tap.tap_at(200.0), None);
        assert_eq!(tap.tap_count(), 1);
    }

    #[test]
    fn test_reset_clears_window() {
        let mut tap = TapTempo::default();
        tap.tap_at(0.0);
        tap.tap_at(500.0);
        tap.reset();
        assert_eq!(tap.estimate(), None);
    }
}
