//! Scheduler hooks wired to the engine: built-in trainers, user callbacks
//! and event publishing.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock};

use super::events::{EngineEventKind, EventPublisher};
use crate::scheduler::SchedulerHooks;
use crate::settings::SettingsHandle;

/// Called with the measure index each time a new measure starts.
pub type MeasureCallback = Box<dyn FnMut(u64) + Send>;

/// Returns `true` for measures that should be silent.
pub type MutePredicate = Arc<dyn Fn(u64) -> bool + Send + Sync>;

/// Hook state shared between the engine handle and the scheduler thread.
#[derive(Clone, Default)]
pub(crate) struct SharedHooks {
    pub(crate) measure_listener: Arc<Mutex<Option<MeasureCallback>>>,
    pub(crate) mute_predicate: Arc<RwLock<Option<MutePredicate>>>,
    pub(crate) measure_count: Arc<AtomicU64>,
    /// Cleared by a stop, including one issued from the measure listener
    pub(crate) playing: Arc<AtomicBool>,
}

impl SharedHooks {
    /// Hooks for a session that is already playing.
    pub(crate) fn running() -> Self {
        let shared = Self::default();
        shared.playing.store(true, Ordering::SeqCst);
        shared
    }

    pub(crate) fn set_listener(&self, callback: Option<MeasureCallback>) {
        let mut slot = self
            .measure_listener
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        *slot = callback;
    }

    pub(crate) fn set_predicate(&self, predicate: Option<MutePredicate>) {
        let mut slot = self
            .mute_predicate
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        *slot = predicate;
    }

    fn predicate(&self) -> Option<MutePredicate> {
        self.mute_predicate
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    /// Invoke the measure listener without holding its lock, so the
    /// callback may replace itself.
    fn notify(&self, measure: u64) {
        let taken = self
            .measure_listener
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take();
        let Some(mut callback) = taken else {
            return;
        };
        callback(measure);

        let mut slot = self
            .measure_listener
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if slot.is_none() {
            *slot = Some(callback);
        }
    }
}

pub(crate) struct EngineHooks {
    settings: SettingsHandle,
    shared: SharedHooks,
    events: Option<EventPublisher>,
}

impl EngineHooks {
    pub(crate) fn new(
        settings: SettingsHandle,
        shared: SharedHooks,
        events: Option<EventPublisher>,
    ) -> Self {
        Self {
            settings,
            shared,
            events,
        }
    }

    fn publish(&self, kind: EngineEventKind, detail: Option<String>) {
        if let Some(events) = &self.events {
            events.publish(kind, detail);
        }
    }
}

impl SchedulerHooks for EngineHooks {
    fn on_measure_complete(&mut self, measure: u64) {
        self.shared.measure_count.store(measure, Ordering::Release);

        let bumped = self.settings.update(|s| {
            let next = s.speed_trainer.next_bpm(measure, s.tempo().bpm)?;
            Some(s.set_bpm(next))
        });
        if let Some(bpm) = bumped {
            log::info!("[SpeedTrainer] Measure {}: tempo -> {} BPM", measure, bpm);
            self.publish(
                EngineEventKind::BpmChanged { bpm },
                Some("speed trainer".to_string()),
            );
        }

        self.publish(EngineEventKind::MeasureCompleted { measure }, None);
        self.shared.notify(measure);
    }

    fn is_measure_muted(&self, measure: u64) -> bool {
        if self.settings.read(|s| s.interval_trainer.is_muted(measure)) {
            return true;
        }
        self.shared
            .predicate()
            .map_or(false, |predicate| predicate(measure))
    }

    fn keep_playing(&self) -> bool {
        self.shared.playing.load(Ordering::SeqCst)
    }
}
