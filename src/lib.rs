// Pulse Metronome - Rust metronome engine
// Lookahead scheduling against an audio clock with lock-free voice delivery

// Module declarations
pub mod audio;
pub mod config;
pub mod engine;
pub mod error;
pub mod pattern;
pub mod presets;
pub mod render;
pub mod scheduler;
pub mod settings;
pub mod tap_tempo;
pub mod trainers;
pub mod visual;

// Re-exports for convenience
pub use audio::{AudioClock, SoundPreset, SoundSink};
pub use config::AppConfig;
pub use engine::{AudioBackend, EngineEvent, EngineEventKind, EngineHandle};
pub use error::{AudioError, PresetError};
pub use pattern::{RhythmPattern, StepAccent, SwingShiftConfig, TempoConfig};
pub use settings::{MetronomeSettings, SettingsHandle};
