// Audio module - clocks, voice synthesis and real-time mixing

pub mod clock;
pub mod mixer;
pub mod sound_bank;
pub mod voice_pool;
pub mod voices;

// Re-export commonly used types for convenience
pub use clock::{time_to_frame, AudioClock, FrameClock, ManualClock};
pub use mixer::Mixer;
pub use sound_bank::{SoundBank, SoundSink};
pub use voice_pool::{MixerChannels, SoundBankChannels, Voice, VoicePool};
pub use voices::{render_voice, voice_spec, SoundPreset, VoiceSpec, MAX_VOICE_SECONDS};
