//! CPAL-based audio backend for desktop platforms (Linux, macOS, Windows)
//!
//! `cpal::Stream` is not `Send` on every host, so the stream is built, played
//! and dropped on a dedicated thread. The caller receives the pieces that
//! are `Send` (the frame counter and the scheduler side of the voice pool)
//! plus a guard whose drop shuts the stream thread down.

use std::sync::atomic::AtomicU64;
use std::sync::mpsc;
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};

use crate::audio::{FrameClock, Mixer, SoundBank, SoundBankChannels, VoicePool};
use crate::config::AudioConfig;
use crate::error::AudioError;

use super::{AudioBackend, AudioOutput};

/// CPAL backend that opens the host's default output device.
#[derive(Default)]
pub struct CpalBackend {
    _unit: (),
}

impl CpalBackend {
    pub fn new() -> Self {
        Self::default()
    }
}

/// Everything the stream thread hands back once the device is running.
struct OpenedStream {
    sample_rate: u32,
    frame_counter: Arc<AtomicU64>,
    bank_channels: SoundBankChannels,
}

/// Keeps the stream thread alive. Dropping it stops and closes the stream.
struct StreamGuard {
    shutdown: Option<mpsc::Sender<()>>,
    thread: Option<JoinHandle<()>>,
}

impl Drop for StreamGuard {
    fn drop(&mut self) {
        // Closing the channel wakes the stream thread.
        self.shutdown.take();
        if let Some(handle) = self.thread.take() {
            if handle.join().is_err() {
                log::error!("[CpalBackend] Output stream thread panicked");
            }
        }
    }
}

impl AudioBackend for CpalBackend {
    fn name(&self) -> &'static str {
        "cpal"
    }

    fn open(&self, config: &AudioConfig) -> Result<AudioOutput, AudioError> {
        let (ready_tx, ready_rx) = mpsc::channel::<Result<OpenedStream, AudioError>>();
        let (shutdown_tx, shutdown_rx) = mpsc::channel::<()>();
        let stream_config = config.clone();

        let thread = thread::Builder::new()
            .name("metronome-output".to_string())
            .spawn(move || {
                let (stream, opened) = match build_output_stream(&stream_config) {
                    Ok(built) => built,
                    Err(err) => {
                        let _ = ready_tx.send(Err(err));
                        return;
                    }
                };
                if let Err(err) = stream.play() {
                    let _ = ready_tx.send(Err(AudioError::StreamOpenFailed {
                        reason: format!("Failed to start output stream: {}", err),
                    }));
                    return;
                }
                if ready_tx.send(Ok(opened)).is_err() {
                    return;
                }
                // Blocks until the guard drops its sender.
                let _ = shutdown_rx.recv();
                drop(stream);
                log::info!("[CpalBackend] Output stream closed");
            })
            .map_err(|e| AudioError::HardwareError {
                details: format!("Failed to spawn output thread: {}", e),
            })?;

        let opened = match ready_rx.recv() {
            Ok(Ok(opened)) => opened,
            Ok(Err(err)) => {
                let _ = thread.join();
                return Err(err);
            }
            Err(_) => {
                let _ = thread.join();
                return Err(AudioError::StreamFailure {
                    reason: "Output thread exited before the stream opened".to_string(),
                });
            }
        };

        log::info!(
            "[CpalBackend] Output stream running at {} Hz",
            opened.sample_rate
        );

        let clock = Arc::new(FrameClock::new(opened.frame_counter, opened.sample_rate));
        let bank = SoundBank::new(opened.sample_rate, opened.bank_channels);
        let guard = StreamGuard {
            shutdown: Some(shutdown_tx),
            thread: Some(thread),
        };
        Ok(AudioOutput::new(clock, Box::new(bank), opened.sample_rate).with_stream_guard(guard))
    }
}

fn build_output_stream(config: &AudioConfig) -> Result<(cpal::Stream, OpenedStream), AudioError> {
    let host = cpal::default_host();
    let device = host
        .default_output_device()
        .ok_or_else(|| AudioError::BackendUnavailable {
            backend: "cpal: no default output device".to_string(),
        })?;

    let supported = device
        .default_output_config()
        .map_err(|e| AudioError::StreamOpenFailed {
            reason: format!("Failed to get default output config: {:?}", e),
        })?;

    let stream_config: cpal::StreamConfig = supported.clone().into();
    let channels_count = stream_config.channels as usize;
    let sample_rate = stream_config.sample_rate.0;
    if sample_rate != config.sample_rate {
        log::info!(
            "[CpalBackend] Device runs at {} Hz (configured {} Hz)",
            sample_rate,
            config.sample_rate
        );
    }

    let (bank_channels, mixer_channels) = VoicePool::new(config.voice_queue_capacity, sample_rate);
    let frame_counter = Arc::new(AtomicU64::new(0));
    let mut mixer = Mixer::new(
        mixer_channels,
        Arc::clone(&frame_counter),
        config.max_voices,
        config.master_gain,
    );

    let err_fn = |err| log::error!("[CpalBackend] Output stream error: {}", err);

    let stream = match supported.sample_format() {
        cpal::SampleFormat::F32 => device.build_output_stream(
            &stream_config,
            move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                mixer.render(data, channels_count);
            },
            err_fn,
            None,
        ),
        other => {
            return Err(AudioError::StreamOpenFailed {
                reason: format!(
                    "Only F32 sample format is currently supported for output (device uses {:?})",
                    other
                ),
            })
        }
    }
    .map_err(|e| AudioError::StreamOpenFailed {
        reason: format!("{:?}", e),
    })?;

    Ok((
        stream,
        OpenedStream {
            sample_rate,
            frame_counter,
            bank_channels,
        },
    ))
}
