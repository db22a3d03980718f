use serde::{Deserialize, Serialize};

/// Emphasis tier of a single step.
///
/// Declaration order is the salience order, so `Mute < Normal < SubAccent <
/// Accent` holds for the derived `Ord`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepAccent {
    Mute,
    Normal,
    SubAccent,
    Accent,
}

impl StepAccent {
    /// Next tier when a step is tapped in the editor.
    ///
    /// Cycles `Mute -> Normal -> SubAccent -> Accent -> Mute`.
    pub fn next(self) -> Self {
        match self {
            StepAccent::Mute => StepAccent::Normal,
            StepAccent::Normal => StepAccent::SubAccent,
            StepAccent::SubAccent => StepAccent::Accent,
            StepAccent::Accent => StepAccent::Mute,
        }
    }

    #[inline]
    pub fn is_audible(self) -> bool {
        self != StepAccent::Mute
    }
}

impl Default for StepAccent {
    fn default() -> Self {
        StepAccent::Normal
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_toggle_cycle_returns_to_start() {
        let mut accent = StepAccent::Mute;
        let mut seen = vec![accent];
        for _ in 0..4 {
            accent = accent.next();
            seen.push(accent);
        }
        assert_eq!(
            seen,
            vec![
                StepAccent::Mute,
                StepAccent::Normal,
                StepAccent::SubAccent,
                StepAccent::Accent,
                StepAccent::Mute
            ]
        );
    }

    #[test]
    fn test_salience_ordering() {
        assert!(StepAccent::Accent > StepAccent::SubAccent);
        assert!(StepAccent::SubAccent > StepAccent::Normal);
        assert!(StepAccent::Normal > StepAccent::Mute);
        assert!(!StepAccent::Mute.is_audible());
    }

    #[test]
    fn test_serde_names() {
        let json = serde_json::to_string(&StepAccent::SubAccent).unwrap();
        assert_eq!(json, "\"sub_accent\"");
    }
}
