//! Diagnostic surface: verbosity bit-flags for per-cycle tracing and
//! plain-text dump files for offline inspection of intermediate signals,
//! one line per analysis cycle.

use anyhow::{Context, Result};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::PathBuf;

/// Verbosity bits, combined into the `-v` flag value.
pub mod verb {
    /// adaptive range tracking per channel
    pub const RANGE: u32 = 0x1;
    /// per-channel intensities
    pub const LEVELS: u32 = 0x2;
    /// loop cadence
    pub const CYCLE: u32 = 0x4;
    /// resynthesis hop state
    pub const VOCODER: u32 = 0x8;
}

pub fn enabled(flags: u32, bit: u32) -> bool {
    flags & bit != 0
}

/// Which intermediate signals to dump, and where.
#[derive(Debug, Clone, Default)]
pub struct DumpOptions {
    pub dir: PathBuf,
    pub waveform: bool,
    pub windowed: bool,
    pub spectrum: bool,
    pub phase: bool,
    pub unwrapped: bool,
    pub resynth: bool,
    pub resynth_pcm: bool,
}

impl DumpOptions {
    pub fn any(&self) -> bool {
        self.waveform
            || self.windowed
            || self.spectrum
            || self.phase
            || self.unwrapped
            || self.resynth
            || self.resynth_pcm
    }
}

/// Open dump writers for the enabled signals. Write failures mid-run are
/// logged and swallowed; only creation is fatal.
pub struct TraceFiles {
    waveform: Option<BufWriter<File>>,
    windowed: Option<BufWriter<File>>,
    spectrum: Option<BufWriter<File>>,
    phase: Option<BufWriter<File>>,
    unwrapped: Option<BufWriter<File>>,
    resynth: Option<BufWriter<File>>,
    resynth_pcm: Option<BufWriter<File>>,
}

impl TraceFiles {
    pub fn disabled() -> Self {
        Self {
            waveform: None,
            windowed: None,
            spectrum: None,
            phase: None,
            unwrapped: None,
            resynth: None,
            resynth_pcm: None,
        }
    }

    pub fn create(opts: &DumpOptions) -> Result<Self> {
        if !opts.any() {
            return Ok(Self::disabled());
        }
        std::fs::create_dir_all(&opts.dir)
            .with_context(|| format!("Failed to create dump directory {}", opts.dir.display()))?;
        let open = |on: bool, name: &str| -> Result<Option<BufWriter<File>>> {
            if !on {
                return Ok(None);
            }
            let path = opts.dir.join(name);
            let file = File::create(&path)
                .with_context(|| format!("Failed to create dump file {}", path.display()))?;
            Ok(Some(BufWriter::new(file)))
        };
        Ok(Self {
            waveform: open(opts.waveform, "input.dat")?,
            windowed: open(opts.windowed, "inputwin.dat")?,
            spectrum: open(opts.spectrum, "outputspec.dat")?,
            phase: open(opts.phase, "outputphase.dat")?,
            unwrapped: open(opts.unwrapped, "outputunwrap.dat")?,
            resynth: open(opts.resynth, "output.dat")?,
            resynth_pcm: open(opts.resynth_pcm, "outputwav.dat")?,
        })
    }

    pub fn waveform_row(&mut self, values: impl Iterator<Item = f64>) {
        row(&mut self.waveform, values);
    }

    pub fn windowed_row(&mut self, values: impl Iterator<Item = f64>) {
        row(&mut self.windowed, values);
    }

    pub fn spectrum_row(&mut self, values: impl Iterator<Item = f64>) {
        row(&mut self.spectrum, values);
    }

    pub fn phase_row(&mut self, values: impl Iterator<Item = f64>) {
        row(&mut self.phase, values);
    }

    pub fn unwrapped_row(&mut self, values: impl Iterator<Item = f64>) {
        row(&mut self.unwrapped, values);
    }

    pub fn resynth_row(&mut self, values: impl Iterator<Item = f64>) {
        row(&mut self.resynth, values);
    }

    pub fn resynth_pcm_row(&mut self, values: impl Iterator<Item = f64>) {
        row(&mut self.resynth_pcm, values);
    }

    pub fn flush(&mut self) {
        for writer in [
            &mut self.waveform,
            &mut self.windowed,
            &mut self.spectrum,
            &mut self.phase,
            &mut self.unwrapped,
            &mut self.resynth,
            &mut self.resynth_pcm,
        ] {
            if let Some(w) = writer {
                if let Err(err) = w.flush() {
                    log::warn!("dump flush failed: {}", err);
                }
            }
        }
    }
}

fn row(writer: &mut Option<BufWriter<File>>, values: impl Iterator<Item = f64>) {
    if let Some(w) = writer {
        let mut line = String::new();
        for v in values {
            if !line.is_empty() {
                line.push(' ');
            }
            line.push_str(&format!("{:.6}", v));
        }
        line.push('\n');
        if let Err(err) = w.write_all(line.as_bytes()) {
            log::warn!("dump write failed: {}", err);
        }
    }
}
