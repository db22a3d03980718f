//! Configuration management for scheduler timing and audio output
//!
//! This module provides runtime configuration loading from JSON files so the
//! lookahead window, tick cadence and audio buffer sizes can be tuned without
//! recompilation. Missing fields fall back to the defaults below.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// Environment variable naming an alternative config file
pub const CONFIG_ENV_VAR: &str = "PULSE_METRONOME_CONFIG";

/// Default config location relative to the working directory
pub const DEFAULT_CONFIG_PATH: &str = "assets/metronome_config.json";

/// Complete application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    #[serde(default)]
    pub tap_tempo: TapTempoConfig,
    #[serde(default)]
    pub audio: AudioConfig,
}

/// Lookahead scheduler and render-loop timing
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Wall-clock period between scheduler ticks
    pub tick_interval_ms: u64,
    /// Horizon ahead of the audio clock within which notes are committed
    pub schedule_ahead_secs: f64,
    /// Delay between pressing play and the first note
    pub start_epsilon_secs: f64,
    /// Hard cap on notes scheduled in a single tick
    pub max_steps_per_tick: u32,
    /// Render-pipeline latency compensation for the active-step readout
    pub visual_offset_secs: f64,
    /// Period of the visual frame loop
    pub frame_interval_ms: u64,
    /// Capacity of the scheduler -> visual note queue
    pub note_queue_capacity: usize,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            tick_interval_ms: 25,
            schedule_ahead_secs: 0.1,
            start_epsilon_secs: 0.05,
            max_steps_per_tick: 100,
            visual_offset_secs: 0.05,
            frame_interval_ms: 16,
            note_queue_capacity: 256,
        }
    }
}

/// Tap tempo estimator parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TapTempoConfig {
    /// Gap after which a tap starts a new session
    pub timeout_ms: f64,
    /// Number of tap timestamps kept in the rolling window
    pub window: usize,
}

impl Default for TapTempoConfig {
    fn default() -> Self {
        Self {
            timeout_ms: 2000.0,
            window: 5,
        }
    }
}

/// Audio output configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioConfig {
    /// Sample rate used by offline rendering and requested from devices
    pub sample_rate: u32,
    /// Maximum number of simultaneously sounding voices in the mixer
    pub max_voices: usize,
    /// Capacity of the voice queue between sound bank and mixer
    pub voice_queue_capacity: usize,
    /// Output gain applied after mixing
    pub master_gain: f32,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            sample_rate: 48_000,
            max_voices: 32,
            voice_queue_capacity: 64,
            master_gain: 0.8,
        }
    }
}

impl AppConfig {
    /// Load configuration from JSON file
    ///
    /// # Returns
    /// The parsed configuration, or the defaults if the file is missing or
    /// the JSON is invalid (a warning is logged in both cases).
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Self {
        match fs::read_to_string(&path) {
            Ok(contents) => match serde_json::from_str(&contents) {
                Ok(config) => {
                    log::info!("[Config] Loaded configuration from {:?}", path.as_ref());
                    config
                }
                Err(err) => {
                    log::warn!(
                        "[Config] Failed to parse JSON from {:?}: {}. Using defaults.",
                        path.as_ref(),
                        err
                    );
                    Self::default()
                }
            },
            Err(err) => {
                log::warn!(
                    "[Config] Failed to read config file {:?}: {}. Using defaults.",
                    path.as_ref(),
                    err
                );
                Self::default()
            }
        }
    }

    /// Load configuration from `$PULSE_METRONOME_CONFIG` or the default path
    pub fn load() -> Self {
        match std::env::var(CONFIG_ENV_VAR) {
            Ok(path) if !path.trim().is_empty() => Self::load_from_file(path),
            _ => Self::load_from_file(DEFAULT_CONFIG_PATH),
        }
    }
}
