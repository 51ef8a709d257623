use clap::ValueEnum;
use serde::Deserialize;
use std::path::PathBuf;
use thiserror::Error;

use crate::audio::pcm::PcmLayout;
use crate::cli::Cli;
use crate::dsp::gain::{default_bands, Band};
use crate::dsp::unwrap::MAX_FRAME_LEN;
use crate::light::NUM_CHANNELS;
use crate::trace::DumpOptions;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    Level,
    Spectrum,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UnwrapKind {
    Cumulative,
    Rewrap,
    Halfpi,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DumpKind {
    Waveform,
    Windowed,
    Spectrum,
    Phase,
    Unwrapped,
    Resynth,
    ResynthPcm,
}

/// Fatal startup validation failures. Anything here ends the process with a
/// diagnostic before any device is opened.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("audio period must be nonzero")]
    ZeroPeriod,
    #[error("analysis window of {window} samples exceeds the supported maximum of {max}")]
    WindowTooLarge { window: u64, max: usize },
    #[error("unsupported byte depth {0}, expected 1 or 2")]
    BadByteDepth(u8),
    #[error("channel count must be nonzero")]
    ZeroChannels,
    #[error("headroom must be in [0, 1), got {0}")]
    BadHeadroom(f64),
    #[error("response power must be at least 1")]
    ZeroPower,
    #[error("smoothing constants must be at least 1")]
    ZeroSmoothing,
    #[error("synthesis hop must be nonzero")]
    ZeroHop,
    #[error("synthesis hop {hop} exceeds the audio period {period}")]
    HopExceedsPeriod { hop: usize, period: usize },
    #[error("synthesis hop {hop} must divide the analysis window {window}")]
    HopMisaligned { hop: usize, window: usize },
    #[error("config file defines {0} bands, the sink has {max} channels", max = NUM_CHANNELS)]
    TooManyBands(usize),
    #[error("band {0} has zero width")]
    ZeroBandWidth(usize),
    #[error("band {index} scans bins {lo}..{hi} beyond the analysis window {window}")]
    BandOutOfRange {
        index: usize,
        lo: usize,
        hi: usize,
        window: usize,
    },
}

#[derive(Debug, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub audio: AudioConfig,
    #[serde(default)]
    pub analysis: AnalysisConfig,
    #[serde(default)]
    pub gain: GainConfig,
    #[serde(default)]
    pub vocoder: VocoderConfig,
    #[serde(default)]
    pub trace: TraceConfig,
}

#[derive(Debug, Deserialize)]
pub struct AudioConfig {
    pub device: Option<String>,
    pub playback_device: Option<String>,
    #[serde(default = "default_period")]
    pub period: usize,
    #[serde(default = "default_rate")]
    pub rate: u32,
    #[serde(default = "default_channels")]
    pub channels: u16,
    #[serde(default = "default_overlap")]
    pub overlap: u32,
    #[serde(default = "default_bytes")]
    pub bytes: u8,
}

#[derive(Debug, Deserialize)]
pub struct AnalysisConfig {
    #[serde(default = "default_mode")]
    pub mode: Mode,
    #[serde(default = "default_true")]
    pub window: bool,
    #[serde(default = "default_unwrap")]
    pub unwrap: UnwrapKind,
    pub unwrap_cutoff: Option<f64>,
    #[serde(default)]
    pub legacy_atan: bool,
}

#[derive(Debug, Deserialize)]
pub struct GainConfig {
    #[serde(default = "default_true")]
    pub autoexpand: bool,
    #[serde(default = "default_true")]
    pub autocontract: bool,
    #[serde(default = "default_range_smoothing")]
    pub range_smoothing: u32,
    #[serde(default = "default_output_smoothing")]
    pub output_smoothing: u32,
    #[serde(default = "default_headroom")]
    pub headroom: f64,
    #[serde(default = "default_power")]
    pub power: u32,
    pub bands: Option<Vec<BandEntry>>,
}

/// One `[[gain.bands]]` table: the first spectrum bin a channel scans and
/// how many bins wide the scan is.
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct BandEntry {
    pub bin: usize,
    #[serde(default = "default_band_width")]
    pub width: usize,
}

#[derive(Debug, Deserialize)]
pub struct VocoderConfig {
    #[serde(default)]
    pub enabled: bool,
    pub synthesis_hop: Option<usize>,
    #[serde(default)]
    pub robotize: bool,
}

#[derive(Debug, Deserialize)]
pub struct TraceConfig {
    #[serde(default)]
    pub verbosity: u32,
    #[serde(default)]
    pub waterfall: bool,
    #[serde(default)]
    pub dump: Vec<DumpKind>,
    #[serde(default = "default_dump_dir")]
    pub dump_dir: PathBuf,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            device: None,
            playback_device: None,
            period: default_period(),
            rate: default_rate(),
            channels: default_channels(),
            overlap: default_overlap(),
            bytes: default_bytes(),
        }
    }
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            mode: default_mode(),
            window: true,
            unwrap: default_unwrap(),
            unwrap_cutoff: None,
            legacy_atan: false,
        }
    }
}

impl Default for GainConfig {
    fn default() -> Self {
        Self {
            autoexpand: true,
            autocontract: true,
            range_smoothing: default_range_smoothing(),
            output_smoothing: default_output_smoothing(),
            headroom: default_headroom(),
            power: default_power(),
            bands: None,
        }
    }
}

impl Default for VocoderConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            synthesis_hop: None,
            robotize: false,
        }
    }
}

impl Default for TraceConfig {
    fn default() -> Self {
        Self {
            verbosity: 0,
            waterfall: false,
            dump: Vec::new(),
            dump_dir: default_dump_dir(),
        }
    }
}

fn default_period() -> usize { 256 }
fn default_rate() -> u32 { 44100 }
fn default_channels() -> u16 { 2 }
fn default_overlap() -> u32 { 2 }
fn default_bytes() -> u8 { 2 }
fn default_mode() -> Mode { Mode::Spectrum }
fn default_unwrap() -> UnwrapKind { UnwrapKind::Cumulative }
fn default_range_smoothing() -> u32 { 3 }
fn default_output_smoothing() -> u32 { 1 }
fn default_headroom() -> f64 { 0.9 }
fn default_power() -> u32 { 5 }
fn default_band_width() -> usize { 1 }
fn default_dump_dir() -> PathBuf { PathBuf::from(".") }
fn default_true() -> bool { true }

pub fn load_config(path: &PathBuf) -> Option<Config> {
    let content = std::fs::read_to_string(path).ok()?;
    toml::from_str(&content).ok()
}

/// Everything the pipeline runs on, validated. Built once at startup from
/// the merged CLI/config values.
#[derive(Debug, Clone)]
pub struct Settings {
    pub mode: Mode,
    pub capture_device: Option<String>,
    pub playback_device: Option<String>,
    /// Hop size: frames read per cycle, and the playback flush size.
    pub audio_period: usize,
    /// Analysis window size: `audio_period << overlap`.
    pub buffer_period: usize,
    pub sample_rate: u32,
    pub layout: PcmLayout,
    pub windowing: bool,
    pub unwrap: UnwrapKind,
    pub unwrap_cutoff: Option<f64>,
    pub legacy_atan: bool,
    pub autoexpand: bool,
    pub autocontract: bool,
    pub range_smoothing: u32,
    pub output_smoothing: u32,
    pub headroom: f64,
    pub power: u32,
    pub bands: [Band; NUM_CHANNELS],
    pub vocoder: bool,
    pub synthesis_hop: usize,
    pub robotize: bool,
    pub verbosity: u32,
    pub waterfall: bool,
    pub dumps: DumpOptions,
}

impl Settings {
    /// Normalizes smoothing times to the reference hop rate of 1024 frames,
    /// so tuning behaves the same across periods.
    pub fn speed_scaler(&self) -> f64 {
        1024.0 / self.audio_period as f64
    }
}

/// Validate the merged CLI values and derive the runtime settings. Band
/// overrides come from the config file only.
pub fn build_settings(cli: &Cli, bands: Option<&[BandEntry]>) -> Result<Settings, ConfigError> {
    if cli.period == 0 {
        return Err(ConfigError::ZeroPeriod);
    }
    if cli.bytes != 1 && cli.bytes != 2 {
        return Err(ConfigError::BadByteDepth(cli.bytes));
    }
    if cli.channels == 0 {
        return Err(ConfigError::ZeroChannels);
    }
    let window = (cli.period as u64) << cli.overlap.min(32);
    if window > MAX_FRAME_LEN as u64 {
        return Err(ConfigError::WindowTooLarge {
            window,
            max: MAX_FRAME_LEN,
        });
    }
    let buffer_period = window as usize;
    if !(0.0..1.0).contains(&cli.headroom) {
        return Err(ConfigError::BadHeadroom(cli.headroom));
    }
    if cli.power == 0 {
        return Err(ConfigError::ZeroPower);
    }
    if cli.range_smoothing == 0 || cli.smoothing == 0 {
        return Err(ConfigError::ZeroSmoothing);
    }

    let synthesis_hop = cli.synthesis_hop.unwrap_or_else(|| (cli.period / 2).max(1));
    if cli.vocoder {
        if synthesis_hop == 0 {
            return Err(ConfigError::ZeroHop);
        }
        if synthesis_hop > cli.period {
            return Err(ConfigError::HopExceedsPeriod {
                hop: synthesis_hop,
                period: cli.period,
            });
        }
        if buffer_period % synthesis_hop != 0 {
            return Err(ConfigError::HopMisaligned {
                hop: synthesis_hop,
                window: buffer_period,
            });
        }
    }

    let bands = resolve_bands(bands, buffer_period)?;

    let mut dumps = DumpOptions {
        dir: cli.dump_dir.clone(),
        ..DumpOptions::default()
    };
    for kind in &cli.dump {
        match kind {
            DumpKind::Waveform => dumps.waveform = true,
            DumpKind::Windowed => dumps.windowed = true,
            DumpKind::Spectrum => dumps.spectrum = true,
            DumpKind::Phase => dumps.phase = true,
            DumpKind::Unwrapped => dumps.unwrapped = true,
            DumpKind::Resynth => dumps.resynth = true,
            DumpKind::ResynthPcm => dumps.resynth_pcm = true,
        }
    }

    Ok(Settings {
        mode: cli.mode,
        capture_device: cli.device.clone(),
        playback_device: cli.playback_device.clone(),
        audio_period: cli.period,
        buffer_period,
        sample_rate: cli.rate,
        layout: PcmLayout {
            bytes: cli.bytes,
            channels: cli.channels,
        },
        windowing: !cli.no_window,
        unwrap: cli.unwrap,
        unwrap_cutoff: cli.unwrap_cutoff,
        legacy_atan: cli.legacy_atan,
        autoexpand: !cli.no_autoexpand,
        autocontract: !cli.no_autocontract,
        range_smoothing: cli.range_smoothing,
        output_smoothing: cli.smoothing,
        headroom: cli.headroom,
        power: cli.power,
        bands,
        vocoder: cli.vocoder,
        synthesis_hop,
        robotize: cli.robotize,
        verbosity: cli.verbosity,
        waterfall: cli.waterfall,
        dumps,
    })
}

fn resolve_bands(
    entries: Option<&[BandEntry]>,
    window: usize,
) -> Result<[Band; NUM_CHANNELS], ConfigError> {
    let mut bands = default_bands();
    if let Some(entries) = entries {
        if entries.len() > NUM_CHANNELS {
            return Err(ConfigError::TooManyBands(entries.len()));
        }
        bands = [Band { bin: 0, width: 0 }; NUM_CHANNELS];
        for (band, entry) in bands.iter_mut().zip(entries) {
            *band = Band {
                bin: entry.bin,
                width: entry.width,
            };
        }
    }
    for (index, band) in bands.iter().enumerate() {
        if band.bin == 0 {
            continue;
        }
        if band.width == 0 {
            return Err(ConfigError::ZeroBandWidth(index));
        }
        if band.bin + band.width > window {
            return Err(ConfigError::BandOutOfRange {
                index,
                lo: band.bin,
                hi: band.bin + band.width,
                window,
            });
        }
    }
    Ok(bands)
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    fn cli(args: &[&str]) -> Cli {
        Cli::parse_from(std::iter::once("lumispec").chain(args.iter().copied()))
    }

    #[test]
    fn defaults_resolve() {
        let settings = build_settings(&cli(&[]), None).unwrap();
        assert_eq!(settings.audio_period, 256);
        assert_eq!(settings.buffer_period, 1024);
        assert_eq!(settings.synthesis_hop, 128);
        assert!(settings.windowing);
        assert!((settings.speed_scaler() - 4.0).abs() < 1e-12);
    }

    #[test]
    fn oversized_window_is_fatal() {
        let err = build_settings(&cli(&["-p", "8192", "-o", "2"]), None).unwrap_err();
        assert!(matches!(err, ConfigError::WindowTooLarge { window: 32768, .. }));
    }

    #[test]
    fn synthesis_hop_cannot_exceed_the_period() {
        let err =
            build_settings(&cli(&["-V", "--synthesis-hop", "512"]), None).unwrap_err();
        assert!(matches!(
            err,
            ConfigError::HopExceedsPeriod { hop: 512, period: 256 }
        ));
    }

    #[test]
    fn misaligned_synthesis_hop_is_fatal() {
        let err =
            build_settings(&cli(&["-V", "--synthesis-hop", "96"]), None).unwrap_err();
        assert!(matches!(err, ConfigError::HopMisaligned { hop: 96, .. }));
    }

    #[test]
    fn bad_byte_depth_is_fatal() {
        let err = build_settings(&cli(&["-B", "3"]), None).unwrap_err();
        assert!(matches!(err, ConfigError::BadByteDepth(3)));
    }

    #[test]
    fn band_overrides_replace_the_default_table() {
        let entries = vec![
            BandEntry { bin: 1, width: 2 },
            BandEntry { bin: 8, width: 4 },
        ];
        let settings = build_settings(&cli(&[]), Some(&entries)).unwrap();
        assert_eq!(settings.bands[0].bin, 1);
        assert_eq!(settings.bands[1].width, 4);
        assert_eq!(settings.bands[2].bin, 0);
    }

    #[test]
    fn bands_must_fit_the_window() {
        let entries = vec![BandEntry { bin: 1020, width: 8 }];
        let err = build_settings(&cli(&[]), Some(&entries)).unwrap_err();
        assert!(matches!(err, ConfigError::BandOutOfRange { index: 0, .. }));
    }

    #[test]
    fn config_file_parses_with_partial_sections() {
        let cfg: Config = toml::from_str(
            r#"
            [audio]
            period = 512

            [vocoder]
            enabled = true
            robotize = true

            [[gain.bands]]
            bin = 2

            [[gain.bands]]
            bin = 5
            width = 3
            "#,
        )
        .unwrap();
        assert_eq!(cfg.audio.period, 512);
        assert_eq!(cfg.audio.rate, 44100);
        assert!(cfg.vocoder.enabled);
        let bands = cfg.gain.bands.unwrap();
        assert_eq!(bands[0].width, 1);
        assert_eq!(bands[1].bin, 5);
    }
}
