use clap::Parser;
use std::path::PathBuf;

use crate::config::{DumpKind, Mode, UnwrapKind};

#[derive(Parser, Debug)]
#[command(name = "lumispec", about = "Audio-reactive lighting from a live spectral analysis loop")]
pub struct Cli {
    /// Audio processing mode
    #[arg(short, long, value_enum, default_value_t = Mode::Spectrum)]
    pub mode: Mode,

    /// Capture device name (system default when omitted)
    #[arg(short, long)]
    pub device: Option<String>,

    /// Playback device name for resynthesis (system default when omitted)
    #[arg(short = 'P', long)]
    pub playback_device: Option<String>,

    /// Audio period in frames; one hop is read per cycle
    #[arg(short, long, default_value_t = 256)]
    pub period: usize,

    /// Sample rate in Hz
    #[arg(short, long, default_value_t = 44100)]
    pub rate: u32,

    /// Interleaved channel count; only the first channel is analyzed
    #[arg(short, long, default_value_t = 2)]
    pub channels: u16,

    /// Overlap exponent; the analysis window is period << overlap samples
    #[arg(short, long, default_value_t = 2)]
    pub overlap: u32,

    /// Bytes per sample (1 or 2)
    #[arg(short = 'B', long, default_value_t = 2)]
    pub bytes: u8,

    /// Skip the raised-cosine analysis window
    #[arg(long)]
    pub no_window: bool,

    /// Phase unwrap strategy
    #[arg(long, value_enum, default_value_t = UnwrapKind::Cumulative)]
    pub unwrap: UnwrapKind,

    /// Override the unwrap discontinuity cutoff in radians
    #[arg(long)]
    pub unwrap_cutoff: Option<f64>,

    /// Quadrant-lossy atan phase, matching older builds
    #[arg(long)]
    pub legacy_atan: bool,

    /// Keep the tracked ranges from expanding on new peaks
    #[arg(long)]
    pub no_autoexpand: bool,

    /// Keep the tracked ranges from relaxing over time
    #[arg(long)]
    pub no_autocontract: bool,

    /// Range tracking smoothing constant
    #[arg(long, default_value_t = 3)]
    pub range_smoothing: u32,

    /// Output smoothing constant (release time)
    #[arg(short, long, default_value_t = 1)]
    pub smoothing: u32,

    /// Headroom fraction of the tracked range kept below full scale
    #[arg(long, default_value_t = 0.9)]
    pub headroom: f64,

    /// Integer power applied to the output ratio
    #[arg(long, default_value_t = 5)]
    pub power: u32,

    /// Resynthesize a time-stretched playback stream
    #[arg(short = 'V', long)]
    pub vocoder: bool,

    /// Synthesis hop in frames (default period / 2)
    #[arg(long)]
    pub synthesis_hop: Option<usize>,

    /// Zero spectral phase before resynthesis
    #[arg(short = 'R', long)]
    pub robotize: bool,

    /// Diagnostic verbosity bit-flags
    #[arg(short, long, default_value_t = 0)]
    pub verbosity: u32,

    /// Print an ascii waterfall of the low bins
    #[arg(short, long)]
    pub waterfall: bool,

    /// Signals to dump, one line per cycle (comma-separated)
    #[arg(long, value_enum, value_delimiter = ',')]
    pub dump: Vec<DumpKind>,

    /// Directory for dump files
    #[arg(long, default_value = ".")]
    pub dump_dir: PathBuf,

    /// Config file path
    #[arg(long)]
    pub config: Option<PathBuf>,
}
