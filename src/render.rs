//! Offline rendering
//!
//! Runs the same pipeline as live playback (scheduler, sound bank, mixer)
//! against a frame clock that advances only as blocks are rendered. Output
//! is deterministic for a given configuration and settings.

use std::path::Path;
use std::sync::atomic::AtomicU64;
use std::sync::Arc;

use crate::audio::{AudioClock, FrameClock, Mixer, SoundBank, VoicePool};
use crate::config::AppConfig;
use crate::engine::{EngineHooks, SharedHooks};
use crate::error::AudioError;
use crate::scheduler::{note_queue, LookaheadScheduler};
use crate::settings::SettingsHandle;

/// Render `seconds` of mono audio at the configured sample rate.
///
/// The scheduler ticks once per block of `tick_interval_ms` worth of frames,
/// exactly as it would against a running device. Trainers in `settings` are
/// applied, so the tempo may change during the render.
pub fn render_samples(settings: &SettingsHandle, config: &AppConfig, seconds: f64) -> Vec<f32> {
    let sample_rate = config.audio.sample_rate.max(1);
    let total_frames = if seconds.is_finite() && seconds > 0.0 {
        (seconds * sample_rate as f64).round() as usize
    } else {
        0
    };
    let block_frames =
        ((sample_rate as u64 * config.scheduler.tick_interval_ms.max(1)) / 1000).max(1) as usize;

    let (bank_channels, mixer_channels) =
        VoicePool::new(config.audio.voice_queue_capacity, sample_rate);
    let frame_counter = Arc::new(AtomicU64::new(0));
    let clock = FrameClock::new(Arc::clone(&frame_counter), sample_rate);
    let mut mixer = Mixer::new(
        mixer_channels,
        frame_counter,
        config.audio.max_voices,
        config.audio.master_gain,
    );
    let mut bank = SoundBank::new(sample_rate, bank_channels);

    let (notes, mut note_rx) = note_queue(config.scheduler.note_queue_capacity);
    let mut scheduler = LookaheadScheduler::new(config.scheduler.clone(), notes);
    let mut hooks = EngineHooks::new(settings.clone(), SharedHooks::running(), None);
    scheduler.start(clock.now());

    let mut output = vec![0.0f32; total_frames];
    for block in output.chunks_mut(block_frames) {
        scheduler.tick(clock.now(), settings, &mut hooks, &mut bank);
        mixer.render(block, 1);
        // Nothing renders the visual side offline.
        note_rx.clear();
    }
    scheduler.stop();

    if bank.dropped_voices() > 0 {
        log::warn!(
            "[Render] {} voices dropped, voice queue too small",
            bank.dropped_voices()
        );
    }
    log::debug!(
        "[Render] Rendered {} frames at {} Hz",
        total_frames,
        sample_rate
    );
    output
}

/// Render `seconds` of audio and write it as a 16-bit mono WAV file.
pub fn render_to_wav<P: AsRef<Path>>(
    settings: &SettingsHandle,
    config: &AppConfig,
    seconds: f64,
    path: P,
) -> Result<(), AudioError> {
    let samples = render_samples(settings, config, seconds);
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate: config.audio.sample_rate.max(1),
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };

    let wav_error = |err: hound::Error| AudioError::StreamFailure {
        reason: format!("Failed to write {}: {}", path.as_ref().display(), err),
    };
    let mut writer = hound::WavWriter::create(path.as_ref(), spec).map_err(wav_error)?;
    for sample in samples {
        let value = (sample.clamp(-1.0, 1.0) * i16::MAX as f32) as i16;
        writer.write_sample(value).map_err(wav_error)?;
    }
    writer.finalize().map_err(wav_error)?;

    log::info!(
        "[Render] Wrote {:.2}s to {}",
        seconds,
        path.as_ref().display()
    );
    Ok(())
}
