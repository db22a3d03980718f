//! Playback threads: the scheduler tick loop and the visual frame loop.
//!
//! Both loops wait on a stop channel with their period as timeout, which
//! doubles as a cancellable timer: stopping wakes them immediately instead
//! of waiting out the current period.

use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use super::backend::AudioOutput;
use super::hooks::EngineHooks;
use crate::audio::AudioClock;
use crate::config::SchedulerConfig;
use crate::error::AudioError;
use crate::scheduler::LookaheadScheduler;
use crate::settings::SettingsHandle;
use crate::visual::VisualSync;

/// Handles to the two running loops.
pub(crate) struct Playback {
    scheduler_stop: mpsc::Sender<()>,
    scheduler_thread: JoinHandle<(LookaheadScheduler, Option<AudioOutput>)>,
    visual_stop: mpsc::Sender<()>,
    visual_thread: JoinHandle<VisualSync>,
}

/// What survives a stop.
pub(crate) struct Stopped {
    /// Scheduler and visual loop, if both threads exited cleanly
    pub(crate) pipeline: Option<(LookaheadScheduler, VisualSync)>,
    pub(crate) output: Option<AudioOutput>,
    pub(crate) error: Option<AudioError>,
}

impl Playback {
    /// Spawn both loops. `scheduler` must already have been started.
    pub(crate) fn spawn(
        scheduler: LookaheadScheduler,
        visual: VisualSync,
        output: Option<AudioOutput>,
        settings: SettingsHandle,
        hooks: EngineHooks,
        config: &SchedulerConfig,
    ) -> Result<Self, AudioError> {
        let clock = output.as_ref().map(|o| Arc::clone(&o.clock));

        let (visual_stop, visual_rx) = mpsc::channel();
        let frame_interval = Duration::from_millis(config.frame_interval_ms.max(1));
        let visual_settings = settings.clone();
        let visual_thread = thread::Builder::new()
            .name("metronome-visual".to_string())
            .spawn(move || run_visual(visual, clock, visual_settings, visual_rx, frame_interval))
            .map_err(|e| AudioError::HardwareError {
                details: format!("Failed to spawn visual thread: {}", e),
            })?;

        let (scheduler_stop, scheduler_rx) = mpsc::channel();
        let tick_interval = Duration::from_millis(config.tick_interval_ms.max(1));
        let scheduler_thread = thread::Builder::new()
            .name("metronome-scheduler".to_string())
            .spawn(move || run_scheduler(scheduler, output, settings, hooks, scheduler_rx, tick_interval))
            .map_err(|e| {
                let _ = visual_stop.send(());
                AudioError::HardwareError {
                    details: format!("Failed to spawn scheduler thread: {}", e),
                }
            })?;

        Ok(Self {
            scheduler_stop,
            scheduler_thread,
            visual_stop,
            visual_thread,
        })
    }

    /// Whether the caller is running on the scheduler thread, i.e. inside a
    /// measure hook. Joining from there would join the thread with itself.
    pub(crate) fn is_scheduler_thread(&self) -> bool {
        self.scheduler_thread.thread().id() == thread::current().id()
    }

    /// Ask both loops to exit without waiting for them.
    pub(crate) fn signal(&self) {
        let _ = self.scheduler_stop.send(());
        let _ = self.visual_stop.send(());
    }

    /// Signal both loops and wait for them to exit.
    ///
    /// Must not be called from the scheduler thread.
    pub(crate) fn stop(self) -> Stopped {
        self.signal();

        let mut error = None;
        let (scheduler, output) = match self.scheduler_thread.join() {
            Ok((scheduler, output)) => (Some(scheduler), output),
            Err(_) => {
                error = Some(AudioError::StreamFailure {
                    reason: "scheduler thread panicked".to_string(),
                });
                (None, None)
            }
        };
        let visual = match self.visual_thread.join() {
            Ok(visual) => Some(visual),
            Err(_) => {
                error = Some(AudioError::StreamFailure {
                    reason: "visual thread panicked".to_string(),
                });
                None
            }
        };

        Stopped {
            pipeline: scheduler.zip(visual),
            output,
            error,
        }
    }
}

fn run_scheduler(
    mut scheduler: LookaheadScheduler,
    mut output: Option<AudioOutput>,
    settings: SettingsHandle,
    mut hooks: EngineHooks,
    stop_rx: mpsc::Receiver<()>,
    tick_interval: Duration,
) -> (LookaheadScheduler, Option<AudioOutput>) {
    if output.is_none() {
        log::warn!("[Scheduler] No audio output, ticks are idle until restart");
    }
    loop {
        if let Some(out) = output.as_mut() {
            let now = out.clock.now();
            let report = scheduler.tick(now, &settings, &mut hooks, out.sink.as_mut());
            if report.scheduled > 0 {
                log::trace!("[Scheduler] {:?}", report);
            }
        }
        match stop_rx.recv_timeout(tick_interval) {
            Err(RecvTimeoutError::Timeout) => continue,
            Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
        }
    }
    scheduler.stop();
    (scheduler, output)
}

fn run_visual(
    mut visual: VisualSync,
    clock: Option<Arc<dyn AudioClock>>,
    settings: SettingsHandle,
    stop_rx: mpsc::Receiver<()>,
    frame_interval: Duration,
) -> VisualSync {
    loop {
        if let Some(clock) = clock.as_ref() {
            let (len, shift) = settings.read(|s| (s.pattern().len(), s.swing_shift.shift_steps));
            visual.on_frame(clock.now(), len, shift);
        }
        match stop_rx.recv_timeout(frame_interval) {
            Err(RecvTimeoutError::Timeout) => continue,
            Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
        }
    }
    visual.clear();
    visual
}
