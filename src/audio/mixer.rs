//! Mixer - real-time voice summing for the output callback
//!
//! The mixer owns the consumer side of the voice pool and the shared frame
//! counter that drives [`FrameClock`](super::clock::FrameClock). Each
//! callback it:
//! 1. Admits queued voices, up to the configured polyphony.
//! 2. Sums every active voice whose start frame has been reached.
//! 3. Returns exhausted buffers to the sound bank.
//! 4. Advances the frame counter by the number of frames written.
//!
//! # Real-Time Safety
//! - No heap allocations once the active list has reached its capacity
//! - No locks (rtrb queues and one atomic counter)
//! - Bounded work: frames × max_voices

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use super::voice_pool::{MixerChannels, VoiceBuffer};

struct ActiveVoice {
    start_frame: u64,
    position: usize,
    samples: VoiceBuffer,
}

impl ActiveVoice {
    #[inline]
    fn is_finished(&self) -> bool {
        self.position >= self.samples.len()
    }
}

pub struct Mixer {
    channels: MixerChannels,
    active: Vec<ActiveVoice>,
    max_voices: usize,
    master_gain: f32,
    frame_counter: Arc<AtomicU64>,
}

impl Mixer {
    pub fn new(
        channels: MixerChannels,
        frame_counter: Arc<AtomicU64>,
        max_voices: usize,
        master_gain: f32,
    ) -> Self {
        let max_voices = max_voices.max(1);
        Self {
            channels,
            active: Vec::with_capacity(max_voices),
            max_voices,
            master_gain: master_gain.clamp(0.0, 1.0),
            frame_counter,
        }
    }

    /// Number of voices currently sounding or waiting for their start frame.
    pub fn active_voices(&self) -> usize {
        self.active.len()
    }

    /// Fill an interleaved buffer with `channel_count` channels.
    ///
    /// Every channel receives the same mono mix.
    pub fn render(&mut self, data: &mut [f32], channel_count: usize) {
        let channel_count = channel_count.max(1);
        let frame_count = data.len() / channel_count;
        let block_start = self.frame_counter.load(Ordering::Acquire);

        self.admit_voices(block_start);

        for (i, frame) in data.chunks_mut(channel_count).enumerate() {
            let frame_idx = block_start + i as u64;
            let mut sample = 0.0f32;
            for voice in self.active.iter_mut() {
                if frame_idx >= voice.start_frame && !voice.is_finished() {
                    sample += voice.samples[voice.position];
                    voice.position += 1;
                }
            }
            let sample = (sample * self.master_gain).clamp(-1.0, 1.0);
            for out in frame.iter_mut() {
                *out = sample;
            }
        }

        self.retire_finished();

        self.frame_counter
            .fetch_add(frame_count as u64, Ordering::AcqRel);
    }

    fn admit_voices(&mut self, block_start: u64) {
        while self.active.len() < self.max_voices {
            let Ok(voice) = self.channels.voice_consumer.pop() else {
                break;
            };
            // A voice that arrives late starts at the top of this block.
            self.active.push(ActiveVoice {
                start_frame: voice.start_frame.max(block_start),
                position: 0,
                samples: voice.samples,
            });
        }
    }

    fn retire_finished(&mut self) {
        let mut i = 0;
        while i < self.active.len() {
            if self.active[i].is_finished() {
                let voice = self.active.swap_remove(i);
                let mut samples = voice.samples;
                samples.clear();
                // A full retired queue only means the sound bank has spares.
                let _ = self.channels.retired_producer.push(samples);
            } else {
                i += 1;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::voice_pool::{SoundBankChannels, Voice, VoicePool};

    fn setup(max_voices: usize) -> (SoundBankChannels, Mixer, Arc<AtomicU64>) {
        let (bank, mixer_channels) = VoicePool::new(max_voices, 1_000);
        let counter = Arc::new(AtomicU64::new(0));
        let mixer = Mixer::new(mixer_channels, Arc::clone(&counter), max_voices, 1.0);
        (bank, mixer, counter)
    }

    fn push(bank: &mut SoundBankChannels, start_frame: u64, samples: &[f32]) {
        bank.voice_producer
            .push(Voice {
                start_frame,
                samples: samples.to_vec(),
            })
            .unwrap();
    }

    #[test]
    fn test_silence_without_voices() {
        let (_bank, mut mixer, counter) = setup(4);
        let mut out = vec![1.0f32; 64];
        mixer.render(&mut out, 2);
        assert!(out.iter().all(|s| *s == 0.0));
        assert_eq!(counter.load(Ordering::Acquire), 32);
    }

    #[test]
    fn test_voice_starts_on_exact_frame() {
        let (mut bank, mut mixer, _counter) = setup(4);
        push(&mut bank, 5, &[0.5, 0.25]);

        let mut out = vec![0.0f32; 8];
        mixer.render(&mut out, 1);
        assert_eq!(out, vec![0.0, 0.0, 0.0, 0.0, 0.0, 0.5, 0.25, 0.0]);
    }

    #[test]
    fn test_voice_spanning_blocks() {
        let (mut bank, mut mixer, _counter) = setup(4);
        push(&mut bank, 3, &[0.1, 0.2, 0.3, 0.4]);

        let mut first = vec![0.0f32; 4];
        mixer.render(&mut first, 1);
        let mut second = vec![0.0f32; 4];
        mixer.render(&mut second, 1);

        assert_eq!(first, vec![0.0, 0.0, 0.0, 0.1]);
        assert_eq!(second, vec![0.2, 0.3, 0.4, 0.0]);
        assert_eq!(mixer.active_voices(), 0);
    }

    #[test]
    fn test_late_voice_plays_immediately() {
        let (mut bank, mut mixer, counter) = setup(4);
        counter.store(100, Ordering::Release);
        push(&mut bank, 10, &[0.5]);

        let mut out = vec![0.0f32; 2];
        mixer.render(&mut out, 1);
        assert_eq!(out, vec![0.5, 0.0]);
    }

    #[test]
    fn test_overlapping_voices_sum_and_clip() {
        let (mut bank, mut mixer, _counter) = setup(4);
        push(&mut bank, 0, &[0.75, 0.25]);
        push(&mut bank, 0, &[0.75, 0.25]);

        let mut out = vec![0.0f32; 2];
        mixer.render(&mut out, 1);
        assert_eq!(out, vec![1.0, 0.5]);
    }

    #[test]
    fn test_finished_buffers_are_recycled() {
        let (mut bank, mut mixer, _counter) = setup(2);
        while bank.retired_consumer.pop().is_ok() {}

        push(&mut bank, 0, &[0.5]);
        let mut out = vec![0.0f32; 4];
        mixer.render(&mut out, 1);

        let recycled = bank.retired_consumer.pop().unwrap();
        assert!(recycled.is_empty());
    }

    #[test]
    fn test_polyphony_limit_defers_extra_voices() {
        let (mut bank, mut mixer, _counter) = setup(1);
        push(&mut bank, 0, &[0.5, 0.5, 0.5]);

        let mut out = vec![0.0f32; 1];
        mixer.render(&mut out, 1);
        assert_eq!(mixer.active_voices(), 1);

        // The queue is free again and the second voice waits for a slot.
        push(&mut bank, 0, &[0.25]);
        mixer.render(&mut out, 1);
        assert_eq!(out, vec![0.5]);
    }
}
