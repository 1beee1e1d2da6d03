//! Neurato command line
//!
//! - `neurato bounce out.wav drums.wav bass.wav`: mix WAV files into one
//! - `neurato play song.wav --metronome`: play through the audio device
//! - `neurato devices`, `neurato midi-inputs`: list hardware
//! - `neurato init-config`: write the default engine config
//!
//! Set RUST_LOG=debug for verbose output.

use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};

use neurato_core::config::{default_config_path, load_config, save_config, EngineConfig};
use neurato_core::model::{Clip, Session, TrackKind};
use neurato_core::plugin::PluginManager;
use neurato_core::render::{render_offline, BounceProgress, BounceSettings};

#[derive(Parser)]
#[command(name = "neurato", about = "Neurato session renderer", version)]
struct Cli {
    /// Engine config file (defaults to the user config directory)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Mix WAV files, one track each, into a stereo WAV
    Bounce {
        output: PathBuf,
        #[arg(required = true)]
        inputs: Vec<PathBuf>,
        #[arg(long, default_value_t = 120.0)]
        bpm: f64,
        /// 16, 24 or 32 (float); defaults to the config value
        #[arg(long)]
        bits: Option<u16>,
        #[arg(long)]
        sample_rate: Option<u32>,
        /// Silence rendered after the last clip
        #[arg(long)]
        tail_seconds: Option<f64>,
    },
    /// Play a WAV file through the audio device
    Play {
        input: PathBuf,
        #[arg(long)]
        metronome: bool,
        #[arg(long, default_value_t = 120.0)]
        bpm: f64,
        /// Hardware MIDI input playing the built-in piano
        #[arg(long)]
        midi_input: Option<String>,
    },
    /// List audio output devices
    Devices,
    /// List MIDI input ports
    MidiInputs,
    /// Write the default engine config if none exists
    InitConfig,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .init();

    let cli = Cli::parse();
    let config_path = cli.config.unwrap_or_else(default_config_path);
    let config: EngineConfig = load_config(&config_path);

    match cli.command {
        Commands::Bounce {
            output,
            inputs,
            bpm,
            bits,
            sample_rate,
            tail_seconds,
        } => {
            let mut settings = config.bounce.clone();
            settings.bits_per_sample = bits.unwrap_or(settings.bits_per_sample);
            settings.sample_rate = sample_rate.unwrap_or(settings.sample_rate);
            settings.tail_seconds = tail_seconds.unwrap_or(settings.tail_seconds);
            bounce(&output, &inputs, bpm, &settings)
        }
        Commands::Play {
            input,
            metronome,
            bpm,
            midi_input,
        } => play(&config, &input, metronome, bpm, midi_input.as_deref()),
        Commands::Devices => list_devices(),
        Commands::MidiInputs => list_midi_inputs(),
        Commands::InitConfig => {
            if config_path.exists() {
                println!("Config already exists at {}", config_path.display());
            } else {
                save_config(&EngineConfig::default(), &config_path)?;
                println!("Wrote default config to {}", config_path.display());
            }
            Ok(())
        }
    }
}

/// One audio track per file, every clip at the start of the timeline
fn session_from_files(inputs: &[PathBuf], bpm: f64) -> Result<Session> {
    let mut session = Session::new();
    session.set_bpm(bpm);

    for path in inputs {
        let asset = session
            .load_audio_asset(path)
            .with_context(|| format!("Failed to load {}", path.display()))?;
        let name = path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "Audio".to_string());
        let index = session.add_track(&name, TrackKind::Audio);
        session.add_clip_to_track(index, Clip::from_asset(asset, 0));
    }
    Ok(session)
}

fn bounce(output: &Path, inputs: &[PathBuf], bpm: f64, settings: &BounceSettings) -> Result<()> {
    let mut session = session_from_files(inputs, bpm)?;
    session.set_sample_rate(settings.sample_rate as f64);

    let mut plugins = PluginManager::new();
    plugins.prepare_all(settings.sample_rate as f64, settings.block_size);

    let mut on_progress = |p: BounceProgress| {
        print!("\rBouncing... {:>3.0}%", p.fraction * 100.0);
        let _ = std::io::stdout().flush();
        if p.complete {
            println!();
        }
    };

    let summary = render_offline(
        &session,
        &plugins,
        output,
        settings,
        Some(&mut on_progress as &mut dyn FnMut(BounceProgress)),
        None,
    )
    .with_context(|| format!("Bounce to {} failed", output.display()))?;

    println!(
        "Wrote {} ({} frames, peak {:.1} dBFS, {:.2}s)",
        summary.path.display(),
        summary.frames,
        20.0 * summary.peak.max(1e-9).log10(),
        summary.seconds
    );
    Ok(())
}

#[cfg(feature = "cpal-backend")]
fn play(
    config: &EngineConfig,
    input: &Path,
    metronome: bool,
    bpm: f64,
    midi_input: Option<&str>,
) -> Result<()> {
    use std::time::Duration;

    use neurato_core::audio::start_audio_system;
    use neurato_core::engine::AudioToUiMessage;

    let mut session = session_from_files(&[input.to_path_buf()], bpm)?;
    if midi_input.is_some() {
        session.add_midi_track("Piano");
    }

    let mut system = start_audio_system(config)?;
    println!(
        "Audio running at {}Hz, {} frames ({:.1} ms)",
        system.sample_rate(),
        system.buffer_size(),
        system.latency_ms()
    );
    session.set_sample_rate(system.sample_rate() as f64);

    if let Some(port) = midi_input {
        system
            .engine
            .external_io_mut()
            .enable_midi_input(port)
            .with_context(|| format!("Failed to open MIDI input {}", port))?;
    }

    let end = session.content_end();
    let engine = &mut system.engine;
    engine.publish_session(&session);
    engine.send_set_bpm(bpm);
    engine.send_set_metronome_enabled(metronome);
    engine.send_play();

    let mut position = 0;
    while position < end {
        std::thread::sleep(Duration::from_millis(50));
        engine.drain_audio_messages(|message| match message {
            AudioToUiMessage::PlayheadPosition { samples, seconds } => {
                position = samples;
                print!("\r{:>7.2}s", seconds);
                let _ = std::io::stdout().flush();
            }
            AudioToUiMessage::TransportStateChanged { state } => {
                log::debug!("Transport {}", state.name());
            }
            AudioToUiMessage::PeakLevel { .. } => {}
        });
    }
    println!();
    engine.send_stop();
    std::thread::sleep(Duration::from_millis(100));
    Ok(())
}

#[cfg(not(feature = "cpal-backend"))]
fn play(
    _config: &EngineConfig,
    _input: &Path,
    _metronome: bool,
    _bpm: f64,
    _midi_input: Option<&str>,
) -> Result<()> {
    anyhow::bail!("Playback needs the cpal-backend feature")
}

#[cfg(feature = "cpal-backend")]
fn list_devices() -> Result<()> {
    for device in neurato_core::audio::output_devices()? {
        let marker = if device.is_default { "*" } else { " " };
        println!("{} {} ({} ch, {:?} Hz)", marker, device, device.max_channels, device.sample_rates);
    }
    Ok(())
}

#[cfg(not(feature = "cpal-backend"))]
fn list_devices() -> Result<()> {
    anyhow::bail!("Device listing needs the cpal-backend feature")
}

fn list_midi_inputs() -> Result<()> {
    let (manager, _collector) = neurato_core::io::external_io();
    let inputs = manager.available_midi_inputs()?;
    if inputs.is_empty() {
        println!("No MIDI inputs found");
    }
    for input in inputs {
        println!("{}", input.name);
    }
    Ok(())
}
