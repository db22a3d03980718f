//! EngineHandle: metronome orchestration layer.
//!
//! Owns the live settings, the lazily opened audio output and the two
//! playback threads, and exposes the controls a UI needs: play/stop, live
//! setters, tap tempo, the active-step readout and an event stream.

use std::sync::atomic::Ordering;
use std::sync::{Arc, Mutex, MutexGuard};

use tokio::sync::broadcast;

use super::backend::{AudioBackend, AudioOutput, CpalBackend, SystemTimeSource, TimeSource};
use super::events::{EngineEvent, EngineEventKind, EventPublisher};
use super::hooks::{EngineHooks, MutePredicate, SharedHooks};
use super::playback::Playback;
use crate::audio::SoundPreset;
use crate::config::AppConfig;
use crate::error::{log_audio_error, AudioError};
use crate::pattern::{RhythmPattern, StepAccent, MAX_BPM, MIN_BPM};
use crate::scheduler::{note_queue, LookaheadScheduler, SchedulerHooks};
use crate::settings::{MetronomeSettings, SettingsHandle};
use crate::tap_tempo::TapTempo;
use crate::trainers::{IntervalTrainerConfig, SpeedTrainerConfig};
use crate::visual::{ActiveStep, VisualSync};


const EVENT_CHANNEL_CAPACITY: usize = 128;

/// Mutable engine state guarded by one lock.
#[derive(Default)]
struct EngineState {
    /// Open output while stopped; moved into the scheduler thread while
    /// playing
    audio: Option<AudioOutput>,
    /// Scheduler and visual loop while stopped
    pipeline: Option<(LookaheadScheduler, VisualSync)>,
    playback: Option<Playback>,
    /// Playback stopped from its own measure hook, joined on the next start
    stopping: Option<Playback>,
    /// A stop is joining the playback threads with the lock released
    joining: bool,
}

/// EngineHandle orchestrates scheduling, audio output and the visual loop.
pub struct EngineHandle {
    config: AppConfig,
    backend: Arc<dyn AudioBackend>,
    settings: SettingsHandle,
    state: Mutex<EngineState>,
    active_step: ActiveStep,
    hooks: SharedHooks,
    tap: Mutex<TapTempo>,
    events: EventPublisher,
}

impl EngineHandle {
    /// Create an engine on top of `backend`. Nothing is opened until
    /// playback starts or [`ensure_audio`](Self::ensure_audio) is called.
    pub fn new(config: AppConfig, backend: Arc<dyn AudioBackend>) -> Self {
        Self::with_time_source(config, backend, Arc::new(SystemTimeSource::default()))
    }

    pub fn with_time_source(
        config: AppConfig,
        backend: Arc<dyn AudioBackend>,
        time_source: Arc<dyn TimeSource>,
    ) -> Self {
        let tap = TapTempo::new(&config.tap_tempo);
        Self {
            backend,
            settings: SettingsHandle::new(MetronomeSettings::default()),
            state: Mutex::new(EngineState::default()),
            active_step: ActiveStep::default(),
            hooks: SharedHooks::default(),
            tap: Mutex::new(tap),
            events: EventPublisher::new(EVENT_CHANNEL_CAPACITY, time_source),
            config,
        }
    }

    /// Engine with the on-disk configuration and the default output device.
    pub fn with_defaults() -> Self {
        Self::new(AppConfig::load(), Arc::new(CpalBackend::new()))
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    /// Shared live settings. Changes apply from the next scheduled step.
    pub fn settings(&self) -> SettingsHandle {
        self.settings.clone()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<EngineEvent> {
        self.events.subscribe()
    }

    fn lock_state(&self) -> Result<MutexGuard<'_, EngineState>, AudioError> {
        self.state.lock().map_err(|_| AudioError::LockPoisoned {
            component: "engine state".to_string(),
        })
    }

    fn new_pipeline(&self) -> (LookaheadScheduler, VisualSync) {
        let scheduler_config = &self.config.scheduler;
        let (tx, rx) = note_queue(scheduler_config.note_queue_capacity);
        (
            LookaheadScheduler::new(scheduler_config.clone(), tx),
            VisualSync::new(
                rx,
                self.active_step.clone(),
                scheduler_config.visual_offset_secs,
            ),
        )
    }

    fn engine_hooks(&self) -> EngineHooks {
        EngineHooks::new(
            self.settings.clone(),
            self.hooks.clone(),
            Some(self.events.clone()),
        )
    }

    // ========================================================================
    // PLAYBACK
    // ========================================================================

    /// Open the audio backend if it is not open yet.
    ///
    /// The output stays open across stop/start. A failed attempt is retried
    /// on the next call.
    pub fn ensure_audio(&self) -> Result<(), AudioError> {
        // Still winding down on this thread: the output is not back yet.
        let _ = self.reap_stopping();
        let mut state = self.lock_state()?;
        self.open_audio(&mut state)
    }

    fn open_audio(&self, state: &mut EngineState) -> Result<(), AudioError> {
        let output_in_use = state.playback.is_some() || state.stopping.is_some() || state.joining;
        if state.audio.is_some() || output_in_use {
            return Ok(());
        }
        let output = self.backend.open(&self.config.audio)?;
        log::info!(
            "[EngineHandle] Opened '{}' audio output at {} Hz",
            self.backend.name(),
            output.sample_rate
        );
        state.audio = Some(output);
        Ok(())
    }

    /// Start playback. Fails with [`AudioError::AlreadyRunning`] if already
    /// playing.
    ///
    /// An unavailable backend does not fail the start: the engine plays
    /// silently (no steps are scheduled) and publishes a warning.
    pub fn start(&self) -> Result<(), AudioError> {
        self.reap_stopping()?;
        let mut state = self.lock_state()?;
        if state.playback.is_some() {
            return Err(AudioError::AlreadyRunning);
        }
        if state.joining || state.stopping.is_some() {
            return Err(AudioError::StreamFailure {
                reason: "previous playback has not exited yet".to_string(),
            });
        }

        if let Err(err) = self.open_audio(&mut state) {
            log_audio_error(&err, "start");
            self.events
                .publish(EngineEventKind::Warning, Some(err.to_string()));
        }

        let (mut scheduler, visual) = state
            .pipeline
            .take()
            .unwrap_or_else(|| self.new_pipeline());
        let output = state.audio.take();
        let now = output.as_ref().map_or(0.0, |o| o.clock.now());

        self.hooks.measure_count.store(0, Ordering::Release);
        self.active_step.set(None);
        scheduler.start(now);

        // Published before the threads exist so it precedes every measure event.
        let bpm = self.settings.read(|s| s.tempo().bpm);
        self.events.publish(EngineEventKind::Started { bpm }, None);

        // Set before the scheduler thread runs its first measure hook.
        self.hooks.playing.store(true, Ordering::SeqCst);
        let playback = match Playback::spawn(
            scheduler,
            visual,
            output,
            self.settings.clone(),
            self.engine_hooks(),
            &self.config.scheduler,
        ) {
            Ok(playback) => playback,
            Err(err) => {
                self.hooks.playing.store(false, Ordering::SeqCst);
                self.events
                    .publish(EngineEventKind::Stopped, Some(err.to_string()));
                return Err(err);
            }
        };
        state.playback = Some(playback);
        log::info!("[EngineHandle] Playback started at {} BPM", bpm);
        Ok(())
    }

    /// Stop playback. Voices already handed to the output finish playing.
    ///
    /// May be called from a measure callback. The scheduler thread then ends
    /// its session once the callback returns and is joined by the next
    /// [`start`](Self::start) from another thread.
    pub fn stop(&self) -> Result<(), AudioError> {
        let playback = {
            let mut state = self.lock_state()?;
            let playback = state.playback.take().ok_or(AudioError::NotRunning)?;
            self.hooks.playing.store(false, Ordering::SeqCst);
            if playback.is_scheduler_thread() {
                playback.signal();
                state.stopping = Some(playback);
                None
            } else {
                state.joining = true;
                Some(playback)
            }
        };

        let result = match playback {
            Some(playback) => self.join_playback(playback),
            None => Ok(()),
        };
        self.active_step.set(None);

        log::info!("[EngineHandle] Playback stopped");
        self.events.publish(EngineEventKind::Stopped, None);
        result
    }

    /// Join `playback` without holding the state lock, so a measure callback
    /// running meanwhile can still reach the engine, then take back the
    /// pipeline and output.
    fn join_playback(&self, playback: Playback) -> Result<(), AudioError> {
        let stopped = playback.stop();
        let mut state = self.lock_state()?;
        state.joining = false;
        if state.pipeline.is_none() {
            state.pipeline = stopped.pipeline;
        }
        if state.audio.is_none() {
            state.audio = stopped.output;
        }
        match stopped.error {
            Some(err) => {
                log_audio_error(&err, "stop");
                Err(err)
            }
            None => Ok(()),
        }
    }

    /// Join a playback that was stopped from its own measure callback.
    fn reap_stopping(&self) -> Result<(), AudioError> {
        let playback = {
            let mut state = self.lock_state()?;
            let Some(playback) = state.stopping.take() else {
                return Ok(());
            };
            if playback.is_scheduler_thread() {
                state.stopping = Some(playback);
                return Err(AudioError::StreamFailure {
                    reason: "cannot restart from the measure callback that stopped playback"
                        .to_string(),
                });
            }
            state.joining = true;
            playback
        };
        // A lost pipeline or output is rebuilt by the caller.
        let _ = self.join_playback(playback);
        Ok(())
    }

    /// Idempotent play/stop.
    pub fn set_playing(&self, playing: bool) -> Result<(), AudioError> {
        let result = if playing { self.start() } else { self.stop() };
        match result {
            Err(AudioError::AlreadyRunning) | Err(AudioError::NotRunning) => Ok(()),
            other => other,
        }
    }

    /// Flip between playing and stopped. Returns the new state.
    pub fn toggle_playing(&self) -> Result<bool, AudioError> {
        let playing = !self.is_playing();
        self.set_playing(playing)?;
        Ok(playing)
    }

    pub fn is_playing(&self) -> bool {
        self.hooks.playing.load(Ordering::SeqCst)
    }

    // ========================================================================
    // LIVE SETTINGS
    // ========================================================================

    /// Set the tempo. Zero is rejected; other values are clamped to the
    /// supported range. Returns the applied tempo.
    pub fn set_bpm(&self, bpm: u32) -> Result<u32, AudioError> {
        if bpm == 0 {
            return Err(AudioError::BpmInvalid { bpm });
        }
        let applied = self.settings.update(|s| s.set_bpm(bpm));
        self.events
            .publish(EngineEventKind::BpmChanged { bpm: applied }, None);
        Ok(applied)
    }

    /// Adjust the tempo by `delta`, clamped to the supported range.
    pub fn nudge_bpm(&self, delta: i32) -> u32 {
        let applied = self.settings.update(|s| {
            let target = (s.tempo().bpm as i64 + delta as i64).clamp(MIN_BPM as i64, MAX_BPM as i64);
            s.set_bpm(target as u32)
        });
        self.events
            .publish(EngineEventKind::BpmChanged { bpm: applied }, None);
        applied
    }

    pub fn set_beats_per_measure(&self, beats: u32) {
        self.settings.update(|s| s.set_beats_per_measure(beats));
    }

    pub fn set_subdivision(&self, subdivision: u32) {
        self.settings.update(|s| s.set_subdivision(subdivision));
    }

    /// Replace the pattern. Returns `false` if it did not fit the meter and
    /// the default pattern was used instead.
    pub fn set_pattern(&self, pattern: RhythmPattern) -> bool {
        self.settings.update(|s| s.set_pattern(pattern))
    }

    pub fn toggle_step(&self, index: usize) -> Option<StepAccent> {
        self.settings.update(|s| s.toggle_step(index))
    }

    pub fn set_swing(&self, swing_percent: u8) {
        self.settings.update(|s| s.set_swing(swing_percent));
    }

    pub fn set_shift(&self, shift_steps: i64) {
        self.settings.update(|s| s.set_shift(shift_steps));
    }

    pub fn set_sound(&self, sound: SoundPreset) {
        self.settings.update(|s| s.sound = sound);
    }

    pub fn set_speed_trainer(&self, config: SpeedTrainerConfig) {
        self.settings.update(|s| s.speed_trainer = config);
    }

    pub fn set_interval_trainer(&self, config: IntervalTrainerConfig) {
        self.settings.update(|s| s.interval_trainer = config);
    }

    // ========================================================================
    // HOOKS
    // ========================================================================

    /// Register the callback invoked on the scheduler thread whenever a new
    /// measure starts. Replaces any previous callback.
    pub fn on_measure_complete<F>(&self, callback: F)
    where
        F: FnMut(u64) + Send + 'static,
    {
        self.hooks.set_listener(Some(Box::new(callback)));
    }

    pub fn clear_measure_listener(&self) {
        self.hooks.set_listener(None);
    }

    /// Silence every step of the measures for which `predicate` returns
    /// `true`, in addition to the interval trainer.
    pub fn set_mute_predicate<F>(&self, predicate: F)
    where
        F: Fn(u64) -> bool + Send + Sync + 'static,
    {
        let predicate: MutePredicate = Arc::new(predicate);
        self.hooks.set_predicate(Some(predicate));
    }

    pub fn clear_mute_predicate(&self) {
        self.hooks.set_predicate(None);
    }

    // ========================================================================
    // TAP TEMPO & READOUTS
    // ========================================================================

    /// Register a tap now. Applies and returns the estimated tempo once
    /// enough taps have been seen.
    pub fn tap(&self) -> Option<u32> {
        let now_ms = self.events.time_source().now_ms();
        let estimate = self
            .tap
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .tap_at(now_ms)?;
        self.set_bpm(estimate).ok()
    }

    pub fn reset_tap(&self) {
        self.tap
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .reset();
    }

    /// Pattern slot currently lit, if any.
    pub fn active_step(&self) -> Option<usize> {
        self.active_step.get()
    }

    /// Index of the measure most recently started.
    pub fn measure_count(&self) -> u64 {
        self.hooks.measure_count.load(Ordering::Acquire)
    }

    pub fn is_current_measure_muted(&self) -> bool {
        self.engine_hooks().is_measure_muted(self.measure_count())
    }
}

impl Drop for EngineHandle {
    fn drop(&mut self) {
        if self.is_playing() {
            if let Err(err) = self.stop() {
                log_audio_error(&err, "drop");
            }
        }

        let state = self
            .state
            .get_mut()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        // Dropped from inside a measure callback: the thread is left to exit
        // on its own.
        if let Some(playback) = state.stopping.take() {
            if !playback.is_scheduler_thread() {
                if let Some(err) = playback.stop().error {
                    log_audio_error(&err, "drop");
                }
            }
        }
    }
}
