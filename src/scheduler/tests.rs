use super::*;
use crate::config::SchedulerConfig;
use crate::engine::backend::RecordingSink;
use crate::pattern::{RhythmPattern, StepAccent, TempoConfig, MAX_BPM, MIN_BPM};
use crate::settings::{MetronomeSettings, SettingsHandle};

const EPS: f64 = 1e-9;

#[derive(Default)]
struct RecordingHooks {
    measures: Vec<u64>,
    muted_measures: Vec<u64>,
    bump_bpm_on_measure: Option<(SettingsHandle, u32)>,
    stop_on_measure: Option<u64>,
}

impl SchedulerHooks for RecordingHooks {
    fn on_measure_complete(&mut self, measure: u64) {
        self.measures.push(measure);
        if let Some((settings, bpm)) = &self.bump_bpm_on_measure {
            if measure == 1 {
                settings.update(|s| s.set_bpm(*bpm));
            }
        }
    }

    fn is_measure_muted(&self, measure: u64) -> bool {
        self.muted_measures.contains(&measure)
    }

    fn keep_playing(&self) -> bool {
        self.stop_on_measure
            .map_or(true, |stop| !self.measures.contains(&stop))
    }
}

fn settings(bpm: u32, beats: u32, subdivision: u32) -> SettingsHandle {
    SettingsHandle::new(MetronomeSettings::new(TempoConfig::new(bpm, beats, subdivision)))
}

fn scheduler(config: SchedulerConfig) -> (LookaheadScheduler, NoteReceiver) {
    let (tx, rx) = note_queue(config.note_queue_capacity);
    (LookaheadScheduler::new(config, tx), rx)
}

/// Tick every `tick_interval_ms` of audio time over `[from, to)`.
fn run(
    scheduler: &mut LookaheadScheduler,
    settings: &SettingsHandle,
    hooks: &mut dyn SchedulerHooks,
    sink: &mut RecordingSink,
    from: f64,
    to: f64,
) -> Vec<TickReport> {
    let interval = scheduler.config().tick_interval_ms as f64 / 1000.0;
    let mut reports = Vec::new();
    let mut now = from;
    while now < to {
        reports.push(scheduler.tick(now, settings, hooks, sink));
        now += interval;
    }
    reports
}

fn drain(rx: &mut NoteReceiver) -> Vec<ScheduledNote> {
    let mut notes = Vec::new();
    while let Some(note) = rx.pop_due(f64::INFINITY) {
        notes.push(note);
    }
    notes
}

#[test]
fn test_two_seconds_at_120_bpm() {
    let settings = settings(120, 4, 1);
    settings.update(|s| {
        s.set_pattern(RhythmPattern::new(vec![
            StepAccent::Accent,
            StepAccent::Normal,
            StepAccent::Normal,
            StepAccent::Normal,
        ]))
    });
    let (mut scheduler, _rx) = scheduler(SchedulerConfig::default());
    let mut hooks = RecordingHooks::default();
    let mut sink = RecordingSink::new();

    scheduler.start(0.0);
    let t0 = scheduler.session().next_note_time;
    run(&mut scheduler, &settings, &mut hooks, &mut sink, 0.0, t0 + 2.0);

    let audible: Vec<_> = sink
        .records()
        .into_iter()
        .filter(|r| r.audio_time < t0 + 2.0 - EPS)
        .collect();
    assert_eq!(audible.len(), 4);
    for (i, record) in audible.iter().enumerate() {
        assert!((record.audio_time - (t0 + 0.5 * i as f64)).abs() < EPS);
    }
    assert_eq!(audible[0].accent, StepAccent::Accent);
    assert!(audible[1..].iter().all(|r| r.accent == StepAccent::Normal));

    // Measure 1 is reached exactly once, when the fifth step is committed.
    assert_eq!(hooks.measures, vec![0, 1]);
    assert!(scheduler.session().beat_counter >= 5);
}

#[test]
fn test_step_spacing_across_tempo_range() {
    for bpm in [MIN_BPM, 45, 60, 97, 120, 180, 240, MAX_BPM] {
        for subdivision in 1..=4 {
            let settings = settings(bpm, 4, subdivision);
            let (mut scheduler, _rx) = scheduler(SchedulerConfig::default());
            let mut sink = RecordingSink::new();
            let mut hooks = NoHooks;

            scheduler.start(1.0);
            let expected = 60.0 / bpm as f64 / subdivision as f64;
            run(
                &mut scheduler,
                &settings,
                &mut hooks,
                &mut sink,
                1.0,
                1.0 + expected * 12.0,
            );

            let times: Vec<f64> = sink.records().iter().map(|r| r.audio_time).collect();
            assert!(times.len() >= 10, "bpm {} sub {}: {}", bpm, subdivision, times.len());
            for pair in times.windows(2) {
                assert!(
                    (pair[1] - pair[0] - expected).abs() < EPS,
                    "bpm {} sub {}: {:?}",
                    bpm,
                    subdivision,
                    pair
                );
            }
        }
    }
}

#[test]
fn test_swing_delays_only_odd_steps() {
    let settings = settings(120, 4, 2);
    settings.update(|s| s.set_swing(100));
    let (mut scheduler, mut rx) = scheduler(SchedulerConfig::default());
    let mut sink = RecordingSink::new();

    scheduler.start(0.0);
    let t0 = scheduler.session().next_note_time;
    run(&mut scheduler, &settings, &mut NoHooks, &mut sink, 0.0, 2.0);

    let step = 0.25;
    for note in drain(&mut rx) {
        let grid = t0 + note.step_index as f64 * step;
        let delay = note.audio_time - grid;
        if note.step_index % 2 == 0 {
            assert!(delay.abs() < EPS);
        } else {
            assert!((delay - step / 3.0).abs() < EPS);
            assert!(delay < step / 2.0);
        }
    }
}

#[test]
fn test_swing_never_reorders_notes() {
    for percent in [0u8, 25, 50, 75, 100] {
        let settings = settings(MAX_BPM, 4, 4);
        settings.update(|s| s.set_swing(percent));
        let (mut scheduler, _rx) = scheduler(SchedulerConfig::default());
        let mut sink = RecordingSink::new();

        scheduler.start(0.0);
        run(&mut scheduler, &settings, &mut NoHooks, &mut sink, 0.0, 1.0);

        let times: Vec<f64> = sink.records().iter().map(|r| r.audio_time).collect();
        assert!(times.windows(2).all(|w| w[1] > w[0]), "swing {}", percent);
    }
}

#[test]
fn test_shift_rotates_accent() {
    let settings = settings(120, 4, 1);
    settings.update(|s| s.set_shift(1));
    let (mut scheduler, _rx) = scheduler(SchedulerConfig::default());
    let mut sink = RecordingSink::new();

    scheduler.start(0.0);
    run(&mut scheduler, &settings, &mut NoHooks, &mut sink, 0.0, 4.0);

    let accents: Vec<StepAccent> = sink.records().iter().map(|r| r.accent).take(5).collect();
    assert_eq!(
        accents,
        vec![
            StepAccent::Normal,
            StepAccent::Accent,
            StepAccent::Normal,
            StepAccent::Normal,
            StepAccent::Normal,
        ]
    );
}

#[test]
fn test_shift_by_pattern_length_is_identity() {
    let collect = |shift: i64| {
        let settings = settings(150, 3, 2);
        settings.update(|s| {
            s.toggle_step(3);
            s.toggle_step(4);
            s.toggle_step(4);
            s.set_shift(shift);
        });
        let (mut scheduler, _rx) = scheduler(SchedulerConfig::default());
        let mut sink = RecordingSink::new();
        scheduler.start(0.0);
        run(&mut scheduler, &settings, &mut NoHooks, &mut sink, 0.0, 3.0);
        sink.records()
            .iter()
            .map(|r| r.accent)
            .collect::<Vec<_>>()
    };
    assert_eq!(collect(6), collect(0));
    assert_eq!(collect(-6), collect(0));
}

#[test]
fn test_muted_steps_still_reach_the_visual_queue() {
    let settings = settings(120, 4, 1);
    settings.update(|s| s.set_step(2, StepAccent::Mute));
    let (mut scheduler, mut rx) = scheduler(SchedulerConfig::default());
    let mut sink = RecordingSink::new();
    let mut hooks = RecordingHooks {
        muted_measures: vec![1],
        ..Default::default()
    };

    scheduler.start(0.0);
    let reports = run(&mut scheduler, &settings, &mut hooks, &mut sink, 0.0, 4.0);

    let notes = drain(&mut rx);
    let scheduled: u32 = reports.iter().map(|r| r.scheduled).sum();
    let dispatched: u32 = reports.iter().map(|r| r.dispatched).sum();
    let muted: u32 = reports.iter().map(|r| r.muted).sum();
    assert_eq!(notes.len() as u32, scheduled);
    assert_eq!(dispatched + muted, scheduled);
    assert_eq!(sink.records().len() as u32, dispatched);

    // Step 2 is muted by accent, steps 4..8 by the measure predicate.
    let spb = 0.5;
    let t0 = 0.05;
    for record in sink.records() {
        let step = ((record.audio_time - t0) / spb).round() as u64;
        assert_ne!(step % 4, 2);
        assert!(!(4..8).contains(&step), "step {} sounded in muted measure", step);
    }
    assert!(notes.iter().any(|n| n.step_index == 5));
}

#[test]
fn test_iteration_cap_defers_backlog() {
    let config = SchedulerConfig {
        max_steps_per_tick: 3,
        ..SchedulerConfig::default()
    };
    let settings = settings(120, 4, 1);
    let (mut scheduler, _rx) = scheduler(config);
    let mut sink = RecordingSink::new();

    scheduler.start(0.0);
    // Tick thread stalled for ten seconds.
    let report = scheduler.tick(10.0, &settings, &mut NoHooks, &mut sink);
    assert_eq!(report.scheduled, 3);
    assert!(report.hit_iteration_cap);

    let report = scheduler.tick(10.025, &settings, &mut NoHooks, &mut sink);
    assert_eq!(report.scheduled, 3);
    assert_eq!(scheduler.session().beat_counter, 6);

    let times: Vec<f64> = sink.records().iter().map(|r| r.audio_time).collect();
    assert!((times[5] - (0.05 + 5.0 * 0.5)).abs() < EPS);
}

#[test]
fn test_tick_when_stopped_is_noop() {
    let settings = settings(120, 4, 1);
    let (mut scheduler, mut rx) = scheduler(SchedulerConfig::default());
    let mut sink = RecordingSink::new();

    let report = scheduler.tick(1.0, &settings, &mut NoHooks, &mut sink);
    assert_eq!(report, TickReport::default());

    scheduler.start(0.0);
    scheduler.stop();
    let report = scheduler.tick(1.0, &settings, &mut NoHooks, &mut sink);
    assert_eq!(report.scheduled, 0);
    assert!(sink.records().is_empty());
    assert!(rx.pop_due(f64::INFINITY).is_none());
}

#[test]
fn test_restart_resets_session_and_discards_stale_notes() {
    let settings = settings(120, 4, 1);
    let (mut scheduler, mut rx) = scheduler(SchedulerConfig::default());
    let mut sink = RecordingSink::new();
    let mut hooks = RecordingHooks::default();

    scheduler.start(0.0);
    run(&mut scheduler, &settings, &mut hooks, &mut sink, 0.0, 3.0);
    scheduler.stop();
    assert_eq!(hooks.measures, vec![0, 1]);

    scheduler.start(50.0);
    assert_eq!(scheduler.session().beat_counter, 0);
    assert!((scheduler.session().next_note_time - 50.05).abs() < EPS);
    scheduler.tick(50.0, &settings, &mut hooks, &mut sink);
    assert_eq!(hooks.measures, vec![0, 1, 0]);

    let notes = drain(&mut rx);
    assert_eq!(notes.len(), 1);
    assert_eq!(notes[0].step_index, 0);
    assert!((notes[0].audio_time - 50.05).abs() < EPS);
}

#[test]
fn test_tempo_change_applies_to_next_step() {
    let settings = settings(120, 4, 1);
    let (mut scheduler, _rx) = scheduler(SchedulerConfig::default());
    let mut sink = RecordingSink::new();

    scheduler.start(0.0);
    run(&mut scheduler, &settings, &mut NoHooks, &mut sink, 0.0, 1.0);
    let before = sink.records().len();
    settings.update(|s| s.set_bpm(60));
    run(&mut scheduler, &settings, &mut NoHooks, &mut sink, 1.0, 6.0);

    let times: Vec<f64> = sink.records().iter().map(|r| r.audio_time).collect();
    // The gap following the last pre-change note was committed at 120 bpm.
    assert!((times[before] - times[before - 1] - 0.5).abs() < EPS);
    for pair in times[before..].windows(2) {
        assert!((pair[1] - pair[0] - 1.0).abs() < EPS);
    }
}

#[test]
fn test_meter_change_mid_play_never_panics() {
    let settings = settings(200, 4, 4);
    let (mut scheduler, _rx) = scheduler(SchedulerConfig::default());
    let mut sink = RecordingSink::new();
    let mut hooks = RecordingHooks::default();

    scheduler.start(0.0);
    let mut now = 0.0;
    for i in 0..200u32 {
        if i % 7 == 0 {
            settings.update(|s| {
                s.set_beats_per_measure(1 + i % 5);
                s.set_subdivision(1 + i % 3);
            });
        }
        scheduler.tick(now, &settings, &mut hooks, &mut sink);
        now += 0.025;
    }
    assert!(!sink.records().is_empty());
    assert!(hooks.measures.windows(2).all(|w| w[1] > w[0]));
}

#[test]
fn test_measure_hook_may_update_settings() {
    let settings = settings(120, 4, 1);
    let (mut scheduler, _rx) = scheduler(SchedulerConfig::default());
    let mut sink = RecordingSink::new();
    let mut hooks = RecordingHooks {
        bump_bpm_on_measure: Some((settings.clone(), 240)),
        ..Default::default()
    };

    scheduler.start(0.0);
    run(&mut scheduler, &settings, &mut hooks, &mut sink, 0.0, 4.0);

    let times: Vec<f64> = sink.records().iter().map(|r| r.audio_time).collect();
    // Step 4 opens measure 1 at the old spacing; the step after uses the new one.
    assert!((times[4] - times[3] - 0.5).abs() < EPS);
    assert!((times[5] - times[4] - 0.25).abs() < EPS);
    assert_eq!(settings.read(|s| s.tempo().bpm), 240);
}

#[test]
fn test_measure_hook_can_end_the_session() {
    let settings = settings(120, 4, 1);
    let (mut scheduler, mut rx) = scheduler(SchedulerConfig::default());
    let mut sink = RecordingSink::new();
    let mut hooks = RecordingHooks {
        stop_on_measure: Some(1),
        ..Default::default()
    };

    scheduler.start(0.0);
    run(&mut scheduler, &settings, &mut hooks, &mut sink, 0.0, 4.0);

    assert!(!scheduler.is_playing());
    assert_eq!(hooks.measures, vec![0, 1]);
    // The downbeat of measure 1 at 2.05 is never dispatched.
    assert_eq!(sink.records().len(), 4);
    assert!(sink.records().iter().all(|r| r.audio_time < 2.0));
    assert_eq!(drain(&mut rx).len(), 4);
}
