use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{anyhow, Context, Result};
use clap::{Args, Parser, Subcommand};
use pulse_metronome::config::AppConfig;
use pulse_metronome::engine::{CpalBackend, EngineEventKind, EngineHandle};
use pulse_metronome::presets::PresetStore;
use pulse_metronome::render::render_to_wav;
use pulse_metronome::settings::{MetronomeSettings, SettingsHandle};
use pulse_metronome::tap_tempo::TapTempo;
use pulse_metronome::trainers::{IntervalTrainerConfig, SpeedTrainerConfig};
use pulse_metronome::{RhythmPattern, SoundPreset, StepAccent};
use tokio::sync::broadcast::error::RecvError;
use tracing_subscriber::EnvFilter;

const DEFAULT_PRESET_STORE: &str = "metronome_presets.json";

#[derive(Parser, Debug)]
#[command(name = "metronome_cli", about = "Sample-accurate metronome")]
struct Cli {
    /// Configuration file (defaults to $PULSE_METRONOME_CONFIG or assets/metronome_config.json)
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    /// Enable debug logging (RUST_LOG overrides)
    #[arg(short, long, global = true)]
    verbose: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Play through the default output device
    Play {
        #[command(flatten)]
        settings: SettingsArgs,
        /// Stop after this many seconds (runs until Ctrl-C otherwise)
        #[arg(long)]
        seconds: Option<f64>,
    },
    /// Render to a 16-bit mono WAV file
    Render {
        #[command(flatten)]
        settings: SettingsArgs,
        #[arg(long, default_value_t = 10.0)]
        seconds: f64,
        #[arg(long, short)]
        output: PathBuf,
    },
    /// Estimate a tempo from Enter presses on stdin
    Tap,
    /// Manage saved presets
    Presets {
        #[arg(long, default_value = DEFAULT_PRESET_STORE)]
        store: PathBuf,
        #[command(subcommand)]
        action: PresetAction,
    },
}

#[derive(Subcommand, Debug)]
enum PresetAction {
    List,
    /// Save the given settings under a name
    Save {
        name: String,
        #[command(flatten)]
        settings: SettingsArgs,
    },
    Delete {
        id: String,
    },
}

/// Settings shared by commands that produce sound. Unset values keep the
/// defaults (or the loaded preset).
#[derive(Args, Debug, Clone)]
struct SettingsArgs {
    #[arg(long)]
    bpm: Option<u32>,
    #[arg(long)]
    beats: Option<u32>,
    #[arg(long)]
    subdivision: Option<u32>,
    /// Swing amount, 0-100
    #[arg(long)]
    swing: Option<u8>,
    /// Rotate the pattern by this many steps
    #[arg(long, allow_negative_numbers = true)]
    shift: Option<i64>,
    /// sine, wood, drum or mech
    #[arg(long)]
    sound: Option<SoundPreset>,
    /// Step accents, one character per step: A (accent), s (sub), n (normal), - (mute)
    #[arg(long, allow_hyphen_values = true)]
    pattern: Option<String>,
    /// Start from a saved preset
    #[arg(long)]
    preset: Option<String>,
    #[arg(long, default_value = DEFAULT_PRESET_STORE)]
    preset_store: PathBuf,
    /// Speed trainer: BPM added every `speed_every` measures
    #[arg(long)]
    speed_increment: Option<u32>,
    #[arg(long, default_value_t = 4)]
    speed_every: u32,
    #[arg(long, default_value_t = 160)]
    speed_target: u32,
    /// Interval trainer: audible measures per cycle
    #[arg(long)]
    play_bars: Option<u32>,
    #[arg(long, default_value_t = 1)]
    mute_bars: u32,
}

impl SettingsArgs {
    fn apply(&self, settings: &mut MetronomeSettings) -> Result<()> {
        if let Some(id) = &self.preset {
            let store = PresetStore::load_from_file(&self.preset_store)
                .with_context(|| format!("loading presets from {}", self.preset_store.display()))?;
            store
                .apply(id, settings)
                .with_context(|| format!("applying preset {}", id))?;
        }
        if let Some(bpm) = self.bpm {
            if bpm == 0 {
                return Err(anyhow!("--bpm must be greater than zero"));
            }
            settings.set_bpm(bpm);
        }
        if let Some(beats) = self.beats {
            settings.set_beats_per_measure(beats);
        }
        if let Some(subdivision) = self.subdivision {
            settings.set_subdivision(subdivision);
        }
        if let Some(swing) = self.swing {
            settings.set_swing(swing);
        }
        if let Some(shift) = self.shift {
            settings.set_shift(shift);
        }
        if let Some(sound) = self.sound {
            settings.sound = sound;
        }
        if let Some(pattern) = &self.pattern {
            let steps = parse_pattern(pattern)?;
            if !settings.set_pattern(RhythmPattern::new(steps)) {
                return Err(anyhow!(
                    "--pattern has {} steps but the meter needs {}",
                    pattern.chars().count(),
                    settings.tempo().steps_per_measure()
                ));
            }
        }
        if let Some(increment) = self.speed_increment {
            settings.speed_trainer = SpeedTrainerConfig {
                enabled: true,
                increment,
                every_measures: self.speed_every,
                target_bpm: self.speed_target,
            };
        }
        if let Some(play_bars) = self.play_bars {
            settings.interval_trainer = IntervalTrainerConfig {
                enabled: true,
                play_bars,
                mute_bars: self.mute_bars,
            };
        }
        Ok(())
    }

    fn to_settings(&self) -> Result<MetronomeSettings> {
        let mut settings = MetronomeSettings::default();
        self.apply(&mut settings)?;
        Ok(settings)
    }
}

fn parse_pattern(text: &str) -> Result<Vec<StepAccent>> {
    text.chars()
        .filter(|c| !c.is_whitespace() && *c != ',')
        .map(|c| match c {
            'A' | 'a' => Ok(StepAccent::Accent),
            'S' | 's' => Ok(StepAccent::SubAccent),
            'N' | 'n' | 'x' => Ok(StepAccent::Normal),
            '-' | '.' => Ok(StepAccent::Mute),
            other => Err(anyhow!("unknown step '{}' in --pattern", other)),
        })
        .collect()
}

fn accent_char(accent: StepAccent) -> char {
    match accent {
        StepAccent::Accent => 'A',
        StepAccent::SubAccent => 's',
        StepAccent::Normal => 'n',
        StepAccent::Mute => '-',
    }
}

fn main() -> ExitCode {
    match run() {
        Ok(code) => code,
        Err(err) => {
            eprintln!("Error: {err:?}");
            ExitCode::from(1)
        }
    }
}

fn run() -> Result<ExitCode> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let config = match &cli.config {
        Some(path) => AppConfig::load_from_file(path),
        None => AppConfig::load(),
    };

    match cli.command {
        Commands::Play { settings, seconds } => run_play(config, &settings, seconds),
        Commands::Render {
            settings,
            seconds,
            output,
        } => run_render(&config, &settings, seconds, &output),
        Commands::Tap => run_tap(&config),
        Commands::Presets { store, action } => run_presets(&store, action),
    }
}

fn init_tracing(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    // Installs the log bridge too, so the library's `log` records show up.
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .try_init();
}

fn run_play(config: AppConfig, args: &SettingsArgs, seconds: Option<f64>) -> Result<ExitCode> {
    let _span = tracing::info_span!("play").entered();
    let engine = EngineHandle::new(config, Arc::new(CpalBackend::new()));
    let initial = args.to_settings()?;
    engine.settings().update(|s| *s = initial);

    let mut events = engine.subscribe();
    engine.ensure_audio().context("opening audio output")?;
    engine.set_playing(true).context("starting playback")?;

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("building runtime")?;

    let settings = engine.settings();
    runtime.block_on(async {
        let mut frame = tokio::time::interval(Duration::from_millis(20));
        let deadline = seconds
            .filter(|s| s.is_finite() && *s > 0.0)
            .map(|s| tokio::time::Instant::now() + Duration::from_secs_f64(s));
        let mut last_step = None;

        loop {
            tokio::select! {
                _ = frame.tick() => {
                    let step = engine.active_step();
                    if step != last_step {
                        if let Some(step) = step {
                            println!("{}", step_row(&settings, step));
                        }
                        last_step = step;
                    }
                    if deadline.map_or(false, |d| tokio::time::Instant::now() >= d) {
                        break;
                    }
                }
                event = events.recv() => match event {
                    Ok(event) => match event.kind {
                        EngineEventKind::MeasureCompleted { measure } => {
                            tracing::debug!(measure, "measure completed");
                        }
                        EngineEventKind::BpmChanged { bpm } => println!("tempo {} BPM", bpm),
                        EngineEventKind::Warning => {
                            tracing::warn!(detail = event.detail.as_deref().unwrap_or(""), "engine warning");
                        }
                        _ => {}
                    },
                    Err(RecvError::Lagged(skipped)) => {
                        tracing::warn!(skipped, "[CLI] Lagged behind the engine event stream");
                    }
                    Err(RecvError::Closed) => break,
                },
                _ = tokio::signal::ctrl_c() => break,
            }
        }
    });

    engine.set_playing(false).context("stopping playback")?;
    Ok(ExitCode::SUCCESS)
}

fn step_row(settings: &SettingsHandle, active: usize) -> String {
    settings.read(|s| {
        s.pattern()
            .steps()
            .iter()
            .enumerate()
            .map(|(i, accent)| {
                if i == active {
                    format!("[{}]", accent_char(*accent))
                } else {
                    format!(" {} ", accent_char(*accent))
                }
            })
            .collect()
    })
}

fn run_render(
    config: &AppConfig,
    args: &SettingsArgs,
    seconds: f64,
    output: &Path,
) -> Result<ExitCode> {
    let settings = SettingsHandle::new(args.to_settings()?);
    tracing::info!(seconds, path = %output.display(), "[CLI] Rendering offline");
    render_to_wav(&settings, config, seconds, output).with_context(|| format!("rendering {}", output.display()))?;
    println!("Wrote {:.2}s to {}", seconds, output.display());
    Ok(ExitCode::SUCCESS)
}

fn run_tap(config: &AppConfig) -> Result<ExitCode> {
    println!("Press Enter on each beat, 'q' then Enter to quit.");
    let mut tap = TapTempo::new(&config.tap_tempo);
    let origin = Instant::now();
    let stdin = io::stdin();

    for line in stdin.lock().lines() {
        let line = line.context("reading stdin")?;
        if line.trim().eq_ignore_ascii_case("q") {
            break;
        }
        let now_ms = origin.elapsed().as_secs_f64() * 1000.0;
        match tap.tap_at(now_ms) {
            Some(bpm) => print!("{} BPM ({} taps) ", bpm, tap.tap_count()),
            None => print!("tap... "),
        }
        io::stdout().flush().context("flushing stdout")?;
    }

    match tap.estimate() {
        Some(bpm) => println!("\nFinal estimate: {} BPM", bpm),
        None => println!("\nNot enough taps for an estimate"),
    }
    Ok(ExitCode::SUCCESS)
}

fn run_presets(store_path: &Path, action: PresetAction) -> Result<ExitCode> {
    let mut store = if store_path.exists() {
        PresetStore::load_from_file(store_path)
            .with_context(|| format!("loading presets from {}", store_path.display()))?
    } else {
        PresetStore::new()
    };

    match action {
        PresetAction::List => {
            if store.is_empty() {
                println!("No presets in {}", store_path.display());
            }
            for preset in store.list() {
                let steps: String = preset.step_states.iter().map(|a| accent_char(*a)).collect();
                println!(
                    "{}  {:<20} {:>3} BPM  {}/{}  {:<5} {}",
                    preset.id,
                    preset.name,
                    preset.bpm,
                    preset.beats_per_measure,
                    preset.subdivision,
                    preset.sound,
                    steps
                );
            }
            return Ok(ExitCode::SUCCESS);
        }
        PresetAction::Save { name, settings } => {
            let settings = settings.to_settings()?;
            let saved = store.save(&name, &settings).context("saving preset")?;
            println!("Saved {} as {}", saved.name, saved.id);
        }
        PresetAction::Delete { id } => {
            let removed = store.delete(&id).context("deleting preset")?;
            println!("Deleted {}", removed.name);
        }
    }

    store
        .save_to_file(store_path)
        .with_context(|| format!("writing {}", store_path.display()))?;
    Ok(ExitCode::SUCCESS)
}
