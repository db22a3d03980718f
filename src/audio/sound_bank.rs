//! Sound bank - turns scheduled steps into voices for the mixer
//!
//! The scheduler calls [`SoundSink::trigger`] with an absolute audio time.
//! [`SoundBank`] renders the voice on the calling thread into a recycled
//! buffer and queues it with a sample-accurate start frame, so the audio
//! callback only ever copies samples.

use super::clock::time_to_frame;
use super::voice_pool::{SoundBankChannels, Voice, VoiceBuffer};
use super::voices::{generate_noise_table, max_voice_frames, render_voice, SoundPreset};
use crate::pattern::StepAccent;

/// Destination for scheduled sounds.
///
/// `trigger` must not block: it is called from the scheduler loop once per
/// audible step.
pub trait SoundSink: Send {
    /// Play `accent` with `preset` at `audio_time` seconds on the audio
    /// clock. Muted steps are ignored. Times already in the past play as
    /// soon as possible.
    fn trigger(&mut self, audio_time: f64, accent: StepAccent, preset: SoundPreset);
}

/// Spare buffers kept locally after draining the retired queue.
const MAX_SPARE_BUFFERS: usize = 8;

pub struct SoundBank {
    sample_rate: u32,
    noise: Vec<f32>,
    channels: SoundBankChannels,
    spare: Vec<VoiceBuffer>,
    dropped_voices: u64,
}

impl SoundBank {
    pub fn new(sample_rate: u32, channels: SoundBankChannels) -> Self {
        Self {
            sample_rate,
            noise: generate_noise_table(sample_rate),
            channels,
            spare: Vec::with_capacity(MAX_SPARE_BUFFERS),
            dropped_voices: 0,
        }
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Voices discarded because the mixer queue was full.
    pub fn dropped_voices(&self) -> u64 {
        self.dropped_voices
    }

    fn take_buffer(&mut self) -> VoiceBuffer {
        while self.spare.len() < MAX_SPARE_BUFFERS {
            match self.channels.retired_consumer.pop() {
                Ok(buffer) => self.spare.push(buffer),
                Err(_) => break,
            }
        }
        self.spare
            .pop()
            .unwrap_or_else(|| Vec::with_capacity(max_voice_frames(self.sample_rate)))
    }

    fn recycle(&mut self, buffer: VoiceBuffer) {
        if self.spare.len() < MAX_SPARE_BUFFERS {
            self.spare.push(buffer);
        }
    }
}

impl SoundSink for SoundBank {
    fn trigger(&mut self, audio_time: f64, accent: StepAccent, preset: SoundPreset) {
        if !accent.is_audible() {
            return;
        }

        let mut samples = self.take_buffer();
        if !render_voice(preset, accent, self.sample_rate, &self.noise, &mut samples) {
            self.recycle(samples);
            return;
        }

        let voice = Voice {
            start_frame: time_to_frame(audio_time, self.sample_rate),
            samples,
        };
        if let Err(rtrb::PushError::Full(voice)) = self.channels.voice_producer.push(voice) {
            self.dropped_voices += 1;
            log::warn!(
                "[SoundBank] Voice queue full, dropping {:?} at {:.3}s",
                accent,
                audio_time
            );
            self.recycle(voice.samples);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::voice_pool::VoicePool;

    const SR: u32 = 8_000;

    #[test]
    fn test_trigger_queues_voice_at_frame() {
        let (bank_channels, mut mixer_channels) = VoicePool::new(4, SR);
        let mut bank = SoundBank::new(SR, bank_channels);

        bank.trigger(0.5, StepAccent::Accent, SoundPreset::Sine);

        let voice = mixer_channels.voice_consumer.pop().unwrap();
        assert_eq!(voice.start_frame, 4_000);
        assert!(!voice.samples.is_empty());
    }

    #[test]
    fn test_mute_is_ignored() {
        let (bank_channels, mut mixer_channels) = VoicePool::new(4, SR);
        let mut bank = SoundBank::new(SR, bank_channels);

        bank.trigger(0.5, StepAccent::Mute, SoundPreset::Drum);
        assert!(mixer_channels.voice_consumer.pop().is_err());
    }

    #[test]
    fn test_past_time_maps_to_frame_zero() {
        let (bank_channels, mut mixer_channels) = VoicePool::new(4, SR);
        let mut bank = SoundBank::new(SR, bank_channels);

        bank.trigger(-1.0, StepAccent::Normal, SoundPreset::Wood);
        assert_eq!(mixer_channels.voice_consumer.pop().unwrap().start_frame, 0);
    }

    #[test]
    fn test_full_queue_drops_and_counts() {
        let (bank_channels, _mixer_channels) = VoicePool::new(2, SR);
        let mut bank = SoundBank::new(SR, bank_channels);

        for i in 0..5 {
            bank.trigger(i as f64 * 0.1, StepAccent::Normal, SoundPreset::Mech);
        }
        assert_eq!(bank.dropped_voices(), 3);
    }
}
