mod audio;
mod cli;
mod config;
mod dsp;
mod light;
mod pipeline;
mod trace;

use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;

use audio::capture::CpalCapture;
use audio::playback::{CpalPlayback, PlaybackSink};
use cli::Cli;
use config::{Mode, UnwrapKind};
use light::LogSink;
use pipeline::Pipeline;

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .init();

    let mut cli = Cli::parse();

    // Load config: explicit --config path, or auto-detect lumispec.toml / global config
    let config_path = cli.config.clone().or_else(|| {
        let local = PathBuf::from("lumispec.toml");
        if local.exists() {
            return Some(local);
        }
        if let Some(home) = dirs::home_dir() {
            let xdg = home.join(".config").join("lumispec").join("config.toml");
            if xdg.exists() {
                return Some(xdg);
            }
        }
        if let Some(config_dir) = dirs::config_dir() {
            let platform = config_dir.join("lumispec").join("config.toml");
            if platform.exists() {
                return Some(platform);
            }
        }
        None
    });
    let mut file_bands = None;
    if let Some(ref path) = config_path {
        if let Some(cfg) = config::load_config(path) {
            log::info!("Loaded config from {}", path.display());
            // Merge: config values apply only when CLI is at its default
            if cli.device.is_none() { cli.device = cfg.audio.device; }
            if cli.playback_device.is_none() { cli.playback_device = cfg.audio.playback_device; }
            if cli.period == 256 { cli.period = cfg.audio.period; }
            if cli.rate == 44100 { cli.rate = cfg.audio.rate; }
            if cli.channels == 2 { cli.channels = cfg.audio.channels; }
            if cli.overlap == 2 { cli.overlap = cfg.audio.overlap; }
            if cli.bytes == 2 { cli.bytes = cfg.audio.bytes; }
            if cli.mode == Mode::Spectrum { cli.mode = cfg.analysis.mode; }
            if !cli.no_window && !cfg.analysis.window { cli.no_window = true; }
            if cli.unwrap == UnwrapKind::Cumulative { cli.unwrap = cfg.analysis.unwrap; }
            if cli.unwrap_cutoff.is_none() { cli.unwrap_cutoff = cfg.analysis.unwrap_cutoff; }
            if !cli.legacy_atan { cli.legacy_atan = cfg.analysis.legacy_atan; }
            if !cli.no_autoexpand && !cfg.gain.autoexpand { cli.no_autoexpand = true; }
            if !cli.no_autocontract && !cfg.gain.autocontract { cli.no_autocontract = true; }
            if cli.range_smoothing == 3 { cli.range_smoothing = cfg.gain.range_smoothing; }
            if cli.smoothing == 1 { cli.smoothing = cfg.gain.output_smoothing; }
            if cli.headroom == 0.9 { cli.headroom = cfg.gain.headroom; }
            if cli.power == 5 { cli.power = cfg.gain.power; }
            if !cli.vocoder { cli.vocoder = cfg.vocoder.enabled; }
            if cli.synthesis_hop.is_none() { cli.synthesis_hop = cfg.vocoder.synthesis_hop; }
            if !cli.robotize { cli.robotize = cfg.vocoder.robotize; }
            if cli.verbosity == 0 { cli.verbosity = cfg.trace.verbosity; }
            if !cli.waterfall { cli.waterfall = cfg.trace.waterfall; }
            if cli.dump.is_empty() { cli.dump = cfg.trace.dump; }
            if cli.dump_dir == PathBuf::from(".") { cli.dump_dir = cfg.trace.dump_dir; }
            file_bands = cfg.gain.bands;
        } else {
            log::warn!("Failed to load config from {}", path.display());
        }
    }

    let settings = config::build_settings(&cli, file_bands.as_deref())?;

    log::info!("lumispec - audio-reactive lighting controller");
    log::info!("Mode: {:?}", settings.mode);
    log::info!(
        "Rate: {} Hz, period {} frames, window {} samples",
        settings.sample_rate,
        settings.audio_period,
        settings.buffer_period
    );
    if settings.vocoder {
        log::info!(
            "Vocoder: synthesis hop {} frames{}",
            settings.synthesis_hop,
            if settings.robotize { ", robotize" } else { "" }
        );
    }

    let mut capture = CpalCapture::open(&settings)?;
    let mut playback = if settings.vocoder {
        Some(CpalPlayback::open(&settings)?)
    } else {
        None
    };
    let mut lights = LogSink::default();

    let mut pipeline = Pipeline::new(settings)?;
    pipeline.run(
        &mut capture,
        &mut lights,
        playback.as_mut().map(|p| p as &mut dyn PlaybackSink),
    );

    log::info!("Done");
    Ok(())
}
