// VoicePool - lock-free voice hand-off with dual SPSC queues
//
// The sound bank renders voices on the scheduler thread and hands them to the
// mixer running inside the audio callback. Two rtrb ring buffers connect them
// so the audio callback never allocates or frees sample memory:
//
// - VOICE_QUEUE: sound bank pushes rendered voices, mixer consumes
// - RETIRED_QUEUE: mixer returns finished sample buffers, sound bank recycles
//
// Buffer flow:
// 1. Sound bank pops an empty buffer from RETIRED_QUEUE
// 2. Sound bank renders a voice into it
// 3. Sound bank pushes the voice to VOICE_QUEUE
// 4. Mixer pops the voice and plays it from its start frame
// 5. Mixer pushes the exhausted buffer back to RETIRED_QUEUE

use rtrb::{Consumer, Producer};

use super::voices::max_voice_frames;

/// Sample buffer reused between voices
pub type VoiceBuffer = Vec<f32>;

/// A rendered voice waiting for its start frame.
#[derive(Debug)]
pub struct Voice {
    /// Output frame the first sample plays on
    pub start_frame: u64,
    pub samples: VoiceBuffer,
}

/// Scheduler-side ends of the pool.
pub struct SoundBankChannels {
    pub voice_producer: Producer<Voice>,
    pub retired_consumer: Consumer<VoiceBuffer>,
}

/// Audio-callback-side ends of the pool.
pub struct MixerChannels {
    pub voice_consumer: Consumer<Voice>,
    pub retired_producer: Producer<VoiceBuffer>,
}

/// Lock-free voice pool using dual SPSC ring buffers
///
/// Pre-allocates `voice_count` sample buffers sized for the longest voice at
/// `sample_rate` and parks them on the retired queue, so steady-state
/// playback never touches the allocator.
///
/// # Example
/// ```ignore
/// let (bank, mixer) = VoicePool::new(32, 48_000);
/// let sound_bank = SoundBank::new(48_000, bank);
/// let mixer = Mixer::new(mixer, frame_counter, 32, 0.8);
/// ```
pub struct VoicePool;

impl VoicePool {
    /// Create both halves of the pool.
    ///
    /// A `voice_count` of 0 is treated as 1.
    #[allow(clippy::new_ret_no_self)]
    pub fn new(voice_count: usize, sample_rate: u32) -> (SoundBankChannels, MixerChannels) {
        let voice_count = voice_count.max(1);
        let buffer_size = max_voice_frames(sample_rate);

        let (voice_producer, voice_consumer) = rtrb::RingBuffer::new(voice_count);
        // Twice the voice count: the mixer may hold up to `voice_count` live
        // voices while the queue is also full.
        let (mut retired_producer, retired_consumer) = rtrb::RingBuffer::new(voice_count * 2);

        for _ in 0..voice_count {
            if retired_producer
                .push(Vec::with_capacity(buffer_size))
                .is_err()
            {
                break;
            }
        }

        (
            SoundBankChannels {
                voice_producer,
                retired_consumer,
            },
            MixerChannels {
                voice_consumer,
                retired_producer,
            },
        )
    }
}
