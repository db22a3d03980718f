use super::notes::NoteSender;
use super::session::PlaybackSession;
use super::{SchedulerHooks, TickReport};
use crate::audio::{SoundPreset, SoundSink};
use crate::config::SchedulerConfig;
use crate::pattern::StepAccent;
use crate::settings::SettingsHandle;

/// Everything a single step needs, read under one short settings lock.
struct StepPlan {
    accent: StepAccent,
    measure: u64,
    swing_delay: f64,
    sound: SoundPreset,
}

/// Lookahead step scheduler.
///
/// Driven by a coarse periodic tick, it commits every step that falls
/// inside `[now, now + schedule_ahead)` on the audio clock. Audio timing is
/// therefore decoupled from the tick's own jitter: a late tick only shrinks
/// the margin, it never moves a note.
pub struct LookaheadScheduler {
    config: SchedulerConfig,
    session: PlaybackSession,
    notes: NoteSender,
}

impl LookaheadScheduler {
    pub fn new(config: SchedulerConfig, notes: NoteSender) -> Self {
        Self {
            config,
            session: PlaybackSession::default(),
            notes,
        }
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    pub fn session(&self) -> &PlaybackSession {
        &self.session
    }

    #[inline]
    pub fn is_playing(&self) -> bool {
        self.session.is_playing
    }

    /// Begin a new session at audio time `now`.
    ///
    /// The first step lands `start_epsilon_secs` later so it is never
    /// scheduled in the past. Notes still queued from a previous session
    /// are invalidated.
    pub fn start(&mut self, now: f64) {
        let session_id = self.notes.begin_session();
        self.session.reset(now, self.config.start_epsilon_secs);
        log::info!(
            "[Scheduler] Session {} started, first step at {:.3}s",
            session_id,
            self.session.next_note_time
        );
    }

    pub fn stop(&mut self) {
        if self.session.is_playing {
            log::info!(
                "[Scheduler] Stopped after {} steps",
                self.session.beat_counter
            );
        }
        self.session.stop();
    }

    /// Schedule every step due before `now + schedule_ahead_secs`.
    ///
    /// Settings are read fresh for each step. No lock is held while `hooks`
    /// or `sink` run, so hooks may update settings.
    pub fn tick(
        &mut self,
        now: f64,
        settings: &SettingsHandle,
        hooks: &mut dyn SchedulerHooks,
        sink: &mut dyn SoundSink,
    ) -> TickReport {
        let mut report = TickReport::default();
        if !self.session.is_playing {
            return report;
        }

        let horizon = now + self.config.schedule_ahead_secs;
        let cap = self.config.max_steps_per_tick.max(1);

        while self.session.next_note_time < horizon {
            if report.scheduled >= cap {
                report.hit_iteration_cap = true;
                log::warn!(
                    "[Scheduler] Iteration cap {} reached at step {}, deferring to next tick",
                    cap,
                    self.session.beat_counter
                );
                break;
            }

            let step_index = self.session.beat_counter;
            let plan = settings.read(|s| {
                let tempo = s.tempo();
                StepPlan {
                    accent: s.pattern().accent_at(step_index, s.swing_shift.shift_steps),
                    measure: tempo.measure_of(step_index),
                    swing_delay: s.swing_shift.swing_delay(
                        step_index,
                        tempo.subdivision,
                        tempo.seconds_per_step(),
                    ),
                    sound: s.sound,
                }
            });

            if self.session.enter_measure(plan.measure) {
                report.measures_completed += 1;
                hooks.on_measure_complete(plan.measure);
                if !hooks.keep_playing() {
                    self.stop();
                    break;
                }
            }

            let muted = !plan.accent.is_audible() || hooks.is_measure_muted(plan.measure);
            let note_time = self.session.next_note_time + plan.swing_delay;

            if muted {
                report.muted += 1;
            } else {
                sink.trigger(note_time, plan.accent, plan.sound);
                report.dispatched += 1;
            }

            if !self.notes.send(step_index, note_time) {
                log::debug!(
                    "[Scheduler] Note queue full, dropping visual note for step {}",
                    step_index
                );
            }

            // Read again: a measure hook may have changed the tempo.
            let seconds_per_step = settings.read(|s| s.tempo().seconds_per_step());
            self.session.next_note_time += seconds_per_step;
            self.session.beat_counter += 1;
            report.scheduled += 1;
        }

        report
    }
}
