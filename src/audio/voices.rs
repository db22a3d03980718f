//! Voice synthesis - one short, self-decaying sound per step
//!
//! Each [`SoundPreset`] maps the three audible [`StepAccent`] tiers to a
//! [`VoiceSpec`]. Rendering is deterministic: tonal presets are pure
//! oscillators, and noise-based presets read from a seeded noise table that
//! is generated once per sound bank.
//!
//! All voices are strictly bounded by [`MAX_VOICE_SECONDS`] and end with an
//! exponential decay, so a voice never rings into the next few steps and
//! never needs an explicit stop.

use std::f32::consts::PI;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

use crate::pattern::StepAccent;

/// Upper bound on the length of any rendered voice.
pub const MAX_VOICE_SECONDS: f32 = 0.3;

/// Level the decay envelope reaches at `decay_secs` (about -60 dB).
const DECAY_FLOOR: f32 = 0.001;

/// Attack time shared by every voice.
const ATTACK_SECS: f32 = 0.002;

/// Make-up gain for band-limited noise, which is far quieter than a full
/// scale oscillator at the same envelope level.
const NOISE_MAKEUP_GAIN: f32 = 6.0;

/// Fixed seed for the noise table.
const NOISE_SEED: u64 = 42;

/// Timbre family used for every step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SoundPreset {
    /// Filtered square-wave beep
    #[default]
    Sine,
    /// FM woodblock
    Wood,
    /// Kick, snare and hi-hat
    Drum,
    /// Band-passed noise tick
    Mech,
}

impl SoundPreset {
    pub const ALL: [SoundPreset; 4] = [
        SoundPreset::Sine,
        SoundPreset::Wood,
        SoundPreset::Drum,
        SoundPreset::Mech,
    ];

    pub fn name(self) -> &'static str {
        match self {
            SoundPreset::Sine => "sine",
            SoundPreset::Wood => "wood",
            SoundPreset::Drum => "drum",
            SoundPreset::Mech => "mech",
        }
    }
}

impl std::str::FromStr for SoundPreset {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        SoundPreset::ALL
            .into_iter()
            .find(|p| p.name().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| format!("unknown sound preset '{}'", s))
    }
}

impl std::fmt::Display for SoundPreset {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.pad(self.name())
    }
}

/// Synthesis recipe for one accent tier of one preset.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Timbre {
    /// Square wave through a one-pole lowpass
    FilteredSquare { freq: f32, cutoff: f32 },
    /// Two-operator FM with a decaying modulation index
    Fm { carrier: f32, ratio: f32, index: f32 },
    /// Sine with an exponential pitch sweep
    Kick { start_freq: f32, end_freq: f32, sweep_secs: f32 },
    /// High-passed noise layered with a triangle body
    Snare { body_freq: f32, cutoff: f32 },
    /// High-passed noise
    HiHat { cutoff: f32 },
    /// Band-passed noise
    Tick { center: f32, q: f32 },
}

/// Gain envelope and timbre for a single voice.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VoiceSpec {
    pub peak_gain: f32,
    pub decay_secs: f32,
    pub timbre: Timbre,
}

impl VoiceSpec {
    /// Rendered length in seconds, including a short tail past the decay.
    pub fn duration_secs(&self) -> f32 {
        (self.decay_secs + 0.02).min(MAX_VOICE_SECONDS)
    }
}

/// Recipe for `accent` in `preset`, or `None` for a muted step.
///
/// Peak gain is strictly ordered `Accent > SubAccent > Normal` within every
/// preset.
pub fn voice_spec(preset: SoundPreset, accent: StepAccent) -> Option<VoiceSpec> {
    let tier = match accent {
        StepAccent::Mute => return None,
        StepAccent::Normal => 0,
        StepAccent::SubAccent => 1,
        StepAccent::Accent => 2,
    };
    let pick = |values: [f32; 3]| values[tier];

    let spec = match preset {
        SoundPreset::Sine => VoiceSpec {
            peak_gain: pick([0.4, 0.7, 1.0]),
            decay_secs: pick([0.05, 0.08, 0.1]),
            timbre: Timbre::FilteredSquare {
                freq: pick([880.0, 1320.0, 1760.0]),
                cutoff: pick([3000.0, 3500.0, 4000.0]),
            },
        },
        SoundPreset::Wood => VoiceSpec {
            peak_gain: pick([0.4, 0.7, 1.0]),
            decay_secs: pick([0.05, 0.1, 0.12]),
            timbre: Timbre::Fm {
                carrier: pick([800.0, 1000.0, 1200.0]),
                ratio: 1.5,
                index: pick([2.0, 3.0, 4.0]),
            },
        },
        SoundPreset::Drum => match accent {
            StepAccent::Accent => VoiceSpec {
                peak_gain: 1.0,
                decay_secs: 0.12,
                timbre: Timbre::Kick {
                    start_freq: 180.0,
                    end_freq: 50.0,
                    sweep_secs: 0.1,
                },
            },
            StepAccent::SubAccent => VoiceSpec {
                peak_gain: 0.7,
                decay_secs: 0.12,
                timbre: Timbre::Snare {
                    body_freq: 250.0,
                    cutoff: 1000.0,
                },
            },
            _ => VoiceSpec {
                peak_gain: 0.3,
                decay_secs: 0.05,
                timbre: Timbre::HiHat { cutoff: 9000.0 },
            },
        },
        SoundPreset::Mech => VoiceSpec {
            peak_gain: pick([0.4, 0.7, 1.0]),
            decay_secs: pick([0.03, 0.04, 0.05]),
            timbre: Timbre::Tick {
                center: pick([1500.0, 1800.0, 2000.0]),
                q: pick([5.0, 4.5, 4.0]),
            },
        },
    };
    Some(spec)
}

/// Generate the shared white-noise table (uniform in `[-1, 1)`).
///
/// Long enough to cover the longest voice at `sample_rate`.
pub fn generate_noise_table(sample_rate: u32) -> Vec<f32> {
    let len = max_voice_frames(sample_rate);
    let mut rng = StdRng::seed_from_u64(NOISE_SEED);
    (0..len).map(|_| rng.gen_range(-1.0..1.0)).collect()
}

/// Number of frames in the longest possible voice.
#[inline]
pub fn max_voice_frames(sample_rate: u32) -> usize {
    (sample_rate as f32 * MAX_VOICE_SECONDS).ceil() as usize
}

/// Render the voice for `accent` into `out`, replacing its contents.
///
/// Returns `false` (and leaves `out` empty) for muted steps. `out` keeps its
/// capacity so recycled buffers never reallocate.
pub fn render_voice(
    preset: SoundPreset,
    accent: StepAccent,
    sample_rate: u32,
    noise: &[f32],
    out: &mut Vec<f32>,
) -> bool {
    out.clear();
    let Some(spec) = voice_spec(preset, accent) else {
        return false;
    };
    let sr = sample_rate.max(1) as f32;
    let frames = ((spec.duration_secs() * sr) as usize).min(max_voice_frames(sample_rate));
    let envelope = Envelope::new(spec.peak_gain, spec.decay_secs);
    let noise_at = |i: usize| {
        if noise.is_empty() {
            0.0
        } else {
            noise[i % noise.len()]
        }
    };

    match spec.timbre {
        Timbre::FilteredSquare { freq, cutoff } => {
            let mut lowpass = OnePole::lowpass(cutoff, sr);
            out.extend((0..frames).map(|i| {
                let t = i as f32 / sr;
                let square = if (t * freq).fract() < 0.5 { 1.0 } else { -1.0 };
                lowpass.process(square) * envelope.at(t)
            }));
        }
        Timbre::Fm {
            carrier,
            ratio,
            index,
        } => {
            let modulator = carrier * ratio;
            let mut carrier_phase = 0.0f32;
            let mut modulator_phase = 0.0f32;
            out.extend((0..frames).map(|i| {
                let t = i as f32 / sr;
                // Index decays to 1 over the first 50 ms.
                let progress = (t / 0.05).min(1.0);
                let depth = index * (1.0 / index).powf(progress);
                let sample = carrier_phase.sin();
                let inst_freq = carrier + depth * modulator * modulator_phase.sin();
                carrier_phase = (carrier_phase + 2.0 * PI * inst_freq / sr) % (2.0 * PI);
                modulator_phase = (modulator_phase + 2.0 * PI * modulator / sr) % (2.0 * PI);
                sample * envelope.at(t)
            }));
        }
        Timbre::Kick {
            start_freq,
            end_freq,
            sweep_secs,
        } => {
            let mut phase = 0.0f32;
            out.extend((0..frames).map(|i| {
                let t = i as f32 / sr;
                let progress = (t / sweep_secs).min(1.0);
                let freq = start_freq * (end_freq / start_freq).powf(progress);
                let sample = phase.sin();
                phase = (phase + 2.0 * PI * freq / sr) % (2.0 * PI);
                sample * envelope.at(t)
            }));
        }
        Timbre::Snare { body_freq, cutoff } => {
            let mut highpass = OnePole::highpass(cutoff, sr);
            out.extend((0..frames).map(|i| {
                let t = i as f32 / sr;
                let phase = (t * body_freq).fract();
                let triangle = 4.0 * (phase - 0.5).abs() - 1.0;
                let rattle = highpass.process(noise_at(i));
                (0.75 * rattle + 0.25 * triangle).clamp(-1.0, 1.0) * envelope.at(t)
            }));
        }
        Timbre::HiHat { cutoff } => {
            let mut highpass = OnePole::highpass(cutoff, sr);
            out.extend((0..frames).map(|i| {
                let t = i as f32 / sr;
                highpass.process(noise_at(i)).clamp(-1.0, 1.0) * envelope.at(t)
            }));
        }
        Timbre::Tick { center, q } => {
            let mut bandpass = Biquad::bandpass(center, q, sr);
            out.extend((0..frames).map(|i| {
                let t = i as f32 / sr;
                let sample = bandpass.process(noise_at(i)) * NOISE_MAKEUP_GAIN;
                sample.clamp(-1.0, 1.0) * envelope.at(t)
            }));
        }
    }
    true
}

/// Linear attack followed by an exponential decay to [`DECAY_FLOOR`].
#[derive(Debug, Clone, Copy)]
struct Envelope {
    peak: f32,
    rate: f32,
}

impl Envelope {
    fn new(peak: f32, decay_secs: f32) -> Self {
        let span = (decay_secs - ATTACK_SECS).max(1e-4);
        Self {
            peak,
            rate: -DECAY_FLOOR.ln() / span,
        }
    }

    #[inline]
    fn at(&self, t: f32) -> f32 {
        if t < ATTACK_SECS {
            self.peak * t / ATTACK_SECS
        } else {
            self.peak * (-(t - ATTACK_SECS) * self.rate).exp()
        }
    }
}

/// One-pole filter.
struct OnePole {
    alpha: f32,
    highpass: bool,
    state: f32,
}

impl OnePole {
    fn lowpass(cutoff: f32, sample_rate: f32) -> Self {
        Self::new(cutoff, sample_rate, false)
    }

    fn highpass(cutoff: f32, sample_rate: f32) -> Self {
        Self::new(cutoff, sample_rate, true)
    }

    fn new(cutoff: f32, sample_rate: f32, highpass: bool) -> Self {
        let cutoff = cutoff.min(sample_rate * 0.45);
        Self {
            alpha: 1.0 - (-2.0 * PI * cutoff / sample_rate).exp(),
            highpass,
            state: 0.0,
        }
    }

    #[inline]
    fn process(&mut self, input: f32) -> f32 {
        self.state += self.alpha * (input - self.state);
        if self.highpass {
            input - self.state
        } else {
            self.state
        }
    }
}

/// Biquad with constant 0 dB peak band-pass coefficients.
struct Biquad {
    b0: f32,
    b2: f32,
    a1: f32,
    a2: f32,
    x1: f32,
    x2: f32,
    y1: f32,
    y2: f32,
}

impl Biquad {
    fn bandpass(center: f32, q: f32, sample_rate: f32) -> Self {
        let w0 = 2.0 * PI * center.min(sample_rate * 0.45) / sample_rate;
        let alpha = w0.sin() / (2.0 * q.max(0.1));
        let a0 = 1.0 + alpha;
        Self {
            b0: alpha / a0,
            b2: -alpha / a0,
            a1: -2.0 * w0.cos() / a0,
            a2: (1.0 - alpha) / a0,
            x1: 0.0,
            x2: 0.0,
            y1: 0.0,
            y2: 0.0,
        }
    }

    #[inline]
    fn process(&mut self, input: f32) -> f32 {
        let output =
            self.b0 * input + self.b2 * self.x2 - self.a1 * self.y1 - self.a2 * self.y2;
        self.x2 = self.x1;
        self.x1 = input;
        self.y2 = self.y1;
        self.y1 = output;
        output
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SR: u32 = 48_000;

    /// Shortest gap between steps: `MAX_BPM` with four subdivisions per beat.
    const FASTEST_STEP_SECS: f32 = 60.0 / crate::pattern::MAX_BPM as f32 / 4.0;

    fn render(preset: SoundPreset, accent: StepAccent) -> Vec<f32> {
        let noise = generate_noise_table(SR);
        let mut out = Vec::new();
        render_voice(preset, accent, SR, &noise, &mut out);
        out
    }

    fn peak(samples: &[f32]) -> f32 {
        samples.iter().fold(0.0f32, |acc, s| acc.max(s.abs()))
    }

    #[test]
    fn test_mute_renders_nothing() {
        for preset in SoundPreset::ALL {
            assert!(voice_spec(preset, StepAccent::Mute).is_none());
            assert!(render(preset, StepAccent::Mute).is_empty());
        }
    }

    #[test]
    fn test_gain_ordering_per_preset() {
        for preset in SoundPreset::ALL {
            let gain = |a| voice_spec(preset, a).map(|s| s.peak_gain).unwrap_or(0.0);
            assert!(gain(StepAccent::Accent) > gain(StepAccent::SubAccent), "{}", preset);
            assert!(gain(StepAccent::SubAccent) > gain(StepAccent::Normal), "{}", preset);
            assert!(gain(StepAccent::Normal) > 0.0, "{}", preset);
        }
    }

    #[test]
    fn test_tonal_presets_render_in_salience_order() {
        for preset in [SoundPreset::Sine, SoundPreset::Wood] {
            let accent = peak(&render(preset, StepAccent::Accent));
            let sub = peak(&render(preset, StepAccent::SubAccent));
            let normal = peak(&render(preset, StepAccent::Normal));
            assert!(accent > sub && sub > normal, "{}: {} {} {}", preset, accent, sub, normal);
        }
    }

    #[test]
    fn test_voices_are_bounded_and_decay() {
        let limit = max_voice_frames(SR);
        for preset in SoundPreset::ALL {
            for accent in [StepAccent::Normal, StepAccent::SubAccent, StepAccent::Accent] {
                let samples = render(preset, accent);
                assert!(!samples.is_empty());
                assert!(samples.len() <= limit, "{} {:?} too long", preset, accent);
                assert!(samples.iter().all(|s| s.is_finite() && s.abs() <= 1.0));

                let tail = &samples[samples.len() - samples.len() / 10..];
                assert!(peak(tail) < 0.01, "{} {:?} does not decay", preset, accent);
            }
        }
    }

    #[test]
    fn test_voices_fade_before_the_fastest_next_step() {
        let next_step = (FASTEST_STEP_SECS * SR as f32) as usize;
        for preset in SoundPreset::ALL {
            for accent in [StepAccent::Normal, StepAccent::SubAccent, StepAccent::Accent] {
                let samples = render(preset, accent);
                let Some(residual) = samples.get(next_step..) else {
                    continue;
                };
                // -20 dB of full scale once the next step starts.
                assert!(
                    peak(residual) <= 0.1,
                    "{} {:?} still at {} after {}s",
                    preset,
                    accent,
                    peak(residual),
                    FASTEST_STEP_SECS
                );
            }
        }
    }

    #[test]
    fn test_rendering_is_deterministic() {
        let a = render(SoundPreset::Mech, StepAccent::Accent);
        let b = render(SoundPreset::Mech, StepAccent::Accent);
        assert_eq!(a, b);
    }

    #[test]
    fn test_recycled_buffer_keeps_capacity() {
        let noise = generate_noise_table(SR);
        let mut buffer = Vec::with_capacity(max_voice_frames(SR));
        let capacity = buffer.capacity();
        render_voice(SoundPreset::Drum, StepAccent::Accent, SR, &noise, &mut buffer);
        assert_eq!(buffer.capacity(), capacity);
    }

    #[test]
    fn test_preset_names_round_trip() {
        for preset in SoundPreset::ALL {
            assert_eq!(preset.name().parse::<SoundPreset>(), Ok(preset));
        }
        assert!("kazoo".parse::<SoundPreset>().is_err());
    }
}
