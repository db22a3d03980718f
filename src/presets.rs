//! User presets
//!
//! A preset is a named snapshot of tempo, meter, subdivision, sound and the
//! accent pattern. The store keeps them newest first and round-trips through
//! JSON, either in memory or via a file.

use std::fs;
use std::path::Path;
use std::time::{SystemTime, UNIX_EPOCH};

use rand::distributions::Alphanumeric;
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::audio::SoundPreset;
use crate::error::{log_preset_error, PresetError};
use crate::pattern::{RhythmPattern, StepAccent};
use crate::settings::MetronomeSettings;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Preset {
    pub id: String,
    pub name: String,
    pub bpm: u32,
    pub beats_per_measure: u32,
    pub subdivision: u32,
    pub sound: SoundPreset,
    pub step_states: Vec<StepAccent>,
    pub created_at_ms: u64,
}

impl Preset {
    /// Snapshot `settings` under `name`.
    pub fn capture(name: &str, settings: &MetronomeSettings, created_at_ms: u64) -> Self {
        let tempo = settings.tempo();
        Self {
            id: generate_id(created_at_ms),
            name: name.trim().to_string(),
            bpm: tempo.bpm,
            beats_per_measure: tempo.beats_per_measure,
            subdivision: tempo.subdivision,
            sound: settings.sound,
            step_states: settings.pattern().steps().to_vec(),
            created_at_ms,
        }
    }

    /// Apply to live settings.
    ///
    /// Tempo, meter and sound go first so the pattern is checked against the
    /// preset's own meter. A pattern that does not fit falls back to the
    /// default pattern.
    pub fn apply_to(&self, settings: &mut MetronomeSettings) {
        settings.set_bpm(self.bpm);
        settings.set_beats_per_measure(self.beats_per_measure);
        settings.set_subdivision(self.subdivision);
        settings.sound = self.sound;
        if !settings.set_pattern(RhythmPattern::new(self.step_states.clone())) {
            log::warn!(
                "[Presets] Preset '{}' has {} steps for a {}x{} meter, using default pattern",
                self.name,
                self.step_states.len(),
                self.beats_per_measure,
                self.subdivision
            );
        }
    }
}

fn generate_id(created_at_ms: u64) -> String {
    let suffix: String = rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(9)
        .map(|b| char::from(b).to_ascii_lowercase())
        .collect();
    format!("{}-{}", created_at_ms, suffix)
}

fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

/// Ordered collection of presets, newest first.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PresetStore {
    presets: Vec<Preset>,
}

impl PresetStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Save the current settings as a new preset. Blank names are rejected.
    pub fn save(&mut self, name: &str, settings: &MetronomeSettings) -> Result<&Preset, PresetError> {
        if name.trim().is_empty() {
            return Err(PresetError::InvalidName {
                name: name.to_string(),
            });
        }
        let mut preset = Preset::capture(name, settings, now_ms());
        while self.get(&preset.id).is_some() {
            preset.id = generate_id(preset.created_at_ms);
        }
        log::info!("[Presets] Saved '{}' ({})", preset.name, preset.id);
        self.presets.insert(0, preset);
        Ok(&self.presets[0])
    }

    pub fn get(&self, id: &str) -> Option<&Preset> {
        self.presets.iter().find(|p| p.id == id)
    }

    pub fn delete(&mut self, id: &str) -> Result<Preset, PresetError> {
        let index = self
            .presets
            .iter()
            .position(|p| p.id == id)
            .ok_or_else(|| PresetError::NotFound { id: id.to_string() })?;
        Ok(self.presets.remove(index))
    }

    pub fn list(&self) -> &[Preset] {
        &self.presets
    }

    pub fn len(&self) -> usize {
        self.presets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.presets.is_empty()
    }

    /// Load preset `id` into `settings`.
    pub fn apply(&self, id: &str, settings: &mut MetronomeSettings) -> Result<(), PresetError> {
        let preset = self
            .get(id)
            .ok_or_else(|| PresetError::NotFound { id: id.to_string() })?;
        preset.apply_to(settings);
        Ok(())
    }

    pub fn to_json(&self) -> Result<String, PresetError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn from_json(json: &str) -> Result<Self, PresetError> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, PresetError> {
        let loaded = fs::read_to_string(&path)
            .map_err(PresetError::from)
            .and_then(|contents| Self::from_json(&contents));
        match loaded {
            Ok(store) => {
                log::info!(
                    "[Presets] Loaded {} presets from {:?}",
                    store.len(),
                    path.as_ref()
                );
                Ok(store)
            }
            Err(err) => {
                log_preset_error(&err, "load_from_file");
                Err(err)
            }
        }
    }

    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<(), PresetError> {
        let written = self
            .to_json()
            .and_then(|json| fs::write(&path, json).map_err(PresetError::from));
        if let Err(err) = &written {
            log_preset_error(err, "save_to_file");
        }
        written
    }
}
