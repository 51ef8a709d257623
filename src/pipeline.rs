use anyhow::Result;
use rustfft::num_complex::Complex;
use std::time::{Duration, Instant};

use crate::audio::capture::CaptureSource;
use crate::audio::pcm::decode_first_channel;
use crate::audio::playback::PlaybackSink;
use crate::audio::StreamError;
use crate::config::{Mode, Settings};
use crate::dsp::analysis::SpectralAnalyzer;
use crate::dsp::gain::{GainMapper, GainTuning, LevelTracker};
use crate::dsp::hop::HopBuffer;
use crate::dsp::transform::SpectralTransform;
use crate::dsp::unwrap::{self, UnwrapStrategy};
use crate::dsp::vocoder::Resynthesizer;
use crate::dsp::window::{apply_window, make_window};
use crate::light::{IntensitySink, NUM_CHANNELS};
use crate::trace::{enabled, verb, TraceFiles};

const WATERFALL_INTERVAL: Duration = Duration::from_millis(50);

/// The control loop: one capture hop in, one analysis cycle out. Owns every
/// piece of pipeline state; capture, playback and the intensity sink are
/// borrowed for the duration of `run`.
pub struct Pipeline {
    settings: Settings,
    hop_buffer: HopBuffer,
    window: Option<Vec<f64>>,
    transform: SpectralTransform,
    analyzer: SpectralAnalyzer,
    unwrapper: Box<dyn UnwrapStrategy>,
    gain: GainMapper,
    level: LevelTracker,
    resynth: Option<Resynthesizer>,
    trace: TraceFiles,
    frame: Vec<Complex<f64>>,
    unwrapped: Vec<f64>,
    hop_samples: Vec<i32>,
    cycles: u64,
    last_waterfall: Instant,
}

impl Pipeline {
    pub fn new(settings: Settings) -> Result<Self> {
        let n = settings.buffer_period;
        let trace = TraceFiles::create(&settings.dumps)?;
        let tuning = GainTuning {
            autoexpand: settings.autoexpand,
            autocontract: settings.autocontract,
            range_smoothing: settings.range_smoothing,
            output_smoothing: settings.output_smoothing,
            headroom: settings.headroom,
            power: settings.power,
            speed_scaler: settings.speed_scaler(),
            trace_range: enabled(settings.verbosity, verb::RANGE),
            trace_levels: enabled(settings.verbosity, verb::LEVELS),
        };
        let resynth = if settings.vocoder {
            Some(Resynthesizer::new(
                n,
                settings.audio_period,
                settings.synthesis_hop,
                settings.robotize,
                settings.layout,
                enabled(settings.verbosity, verb::VOCODER),
            ))
        } else {
            None
        };
        if let Some(r) = &resynth {
            log::debug!("overlap-add buffer {} samples", r.buffer_len());
        }
        Ok(Self {
            hop_buffer: HopBuffer::new(n, settings.audio_period),
            window: if settings.windowing {
                Some(make_window(n))
            } else {
                None
            },
            transform: SpectralTransform::new(n),
            analyzer: SpectralAnalyzer::new(n, settings.legacy_atan),
            unwrapper: unwrap::select(settings.unwrap, settings.unwrap_cutoff),
            gain: GainMapper::new(settings.bands, tuning),
            level: LevelTracker::new(
                settings.output_smoothing,
                settings.speed_scaler(),
                enabled(settings.verbosity, verb::LEVELS),
            ),
            resynth,
            trace,
            frame: vec![Complex::new(0.0, 0.0); n],
            unwrapped: vec![0.0; n],
            hop_samples: Vec::with_capacity(settings.audio_period),
            cycles: 0,
            last_waterfall: Instant::now(),
            settings,
        })
    }

    /// Drive the loop until the capture side disconnects. Recoverable stream
    /// conditions are logged and skipped; every exit drives the lights dark
    /// and flushes any open dump files.
    pub fn run<'p>(
        &mut self,
        capture: &mut dyn CaptureSource,
        lights: &mut dyn IntensitySink,
        mut playback: Option<&mut (dyn PlaybackSink + 'p)>,
    ) {
        loop {
            let pcm = match capture.read_hop() {
                Ok(pcm) => pcm,
                Err(StreamError::Disconnected) => {
                    log::info!("capture disconnected, stopping");
                    break;
                }
                Err(err) => {
                    log::warn!("capture: {}", err);
                    continue;
                }
            };
            decode_first_channel(self.settings.layout, &pcm, &mut self.hop_samples);
            if self.hop_samples.len() != self.settings.audio_period {
                log::warn!(
                    "short read, {} of {} frames",
                    self.hop_samples.len(),
                    self.settings.audio_period
                );
                continue;
            }
            self.hop_buffer.append(&self.hop_samples);
            if !self.hop_buffer.primed() {
                log::debug!("buffering one period");
                continue;
            }

            self.cycles += 1;
            if enabled(self.settings.verbosity, verb::CYCLE) {
                log::trace!("cycle {}", self.cycles);
            }
            match self.settings.mode {
                Mode::Level => {
                    let value = self.level.update(self.hop_buffer.window());
                    lights.set_levels(&[value; NUM_CHANNELS]);
                }
                Mode::Spectrum => self.spectrum_cycle(lights, playback.as_deref_mut()),
            }
        }

        lights.set_levels(&[0; NUM_CHANNELS]);
        self.trace.flush();
        log::info!("pipeline stopped after {} cycles", self.cycles);
    }

    fn spectrum_cycle<'p>(
        &mut self,
        lights: &mut dyn IntensitySink,
        playback: Option<&mut (dyn PlaybackSink + 'p)>,
    ) {
        for (slot, &sample) in self.frame.iter_mut().zip(self.hop_buffer.window()) {
            *slot = Complex::new(sample as f64, 0.0);
        }
        self.trace.waveform_row(self.frame.iter().map(|c| c.re));

        if let Some(window) = &self.window {
            apply_window(&mut self.frame, window);
            self.trace.windowed_row(self.frame.iter().map(|c| c.re));
        }

        self.transform.shift_halves(&mut self.frame);
        self.transform.forward(&mut self.frame);

        self.analyzer.analyze(&self.frame);
        self.trace
            .spectrum_row(self.analyzer.magnitude_db.iter().copied());
        self.trace.phase_row(self.analyzer.phase.iter().copied());

        self.unwrapped.copy_from_slice(&self.analyzer.phase);
        self.unwrapper.unwrap(&mut self.unwrapped);
        self.trace.unwrapped_row(self.unwrapped.iter().copied());

        if self.settings.waterfall && self.last_waterfall.elapsed() >= WATERFALL_INTERVAL {
            print_waterfall(&self.analyzer.magnitude_db);
            self.last_waterfall = Instant::now();
        }

        let levels = self.gain.update(&self.analyzer.magnitude_db);
        lights.set_levels(&levels);

        if let (Some(resynth), Some(sink)) = (self.resynth.as_mut(), playback) {
            resynth.process(&self.frame, &mut self.transform, sink, &mut self.trace);
        }
    }
}

/// One row of the ascii waterfall: the low bins mapped onto a density ramp.
fn print_waterfall(magnitude_db: &[f64]) {
    let top = magnitude_db.len().min(40);
    let mut row = String::with_capacity(top);
    for &db in &magnitude_db[1..top] {
        row.push_str(glyph(db));
    }
    println!("{}", row);
}

fn glyph(db: f64) -> &'static str {
    if db < 71.0 {
        " "
    } else if db < 72.0 {
        "-"
    } else if db < 73.0 {
        "."
    } else if db < 74.0 {
        ","
    } else if db < 75.0 {
        ":"
    } else if db < 76.0 {
        ";"
    } else if db < 77.0 {
        "+"
    } else if db < 78.0 {
        "="
    } else if db < 79.0 {
        "&"
    } else if db < 80.0 {
        "@"
    } else {
        "#"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::pcm::{encode_mono, PcmLayout};
    use crate::config::UnwrapKind;
    use crate::dsp::gain::default_bands;
    use crate::trace::DumpOptions;
    use std::f64::consts::PI;

    fn test_settings(mode: Mode, vocoder: bool) -> Settings {
        Settings {
            mode,
            capture_device: None,
            playback_device: None,
            audio_period: 64,
            buffer_period: 128,
            sample_rate: 44100,
            layout: PcmLayout { bytes: 2, channels: 2 },
            windowing: true,
            unwrap: UnwrapKind::Cumulative,
            unwrap_cutoff: None,
            legacy_atan: false,
            autoexpand: true,
            autocontract: true,
            range_smoothing: 3,
            output_smoothing: 1,
            headroom: 0.9,
            power: 5,
            bands: default_bands(),
            vocoder,
            synthesis_hop: 32,
            robotize: false,
            verbosity: 0,
            waterfall: false,
            dumps: DumpOptions::default(),
        }
    }

    struct ScriptedCapture {
        hops: Vec<Vec<u8>>,
        next: usize,
    }

    impl CaptureSource for ScriptedCapture {
        fn read_hop(&mut self) -> Result<Vec<u8>, StreamError> {
            if self.next < self.hops.len() {
                self.next += 1;
                Ok(self.hops[self.next - 1].clone())
            } else {
                Err(StreamError::Disconnected)
            }
        }
    }

    struct RecordingLights {
        last: [u32; NUM_CHANNELS],
        updates: usize,
    }

    impl IntensitySink for RecordingLights {
        fn set_levels(&mut self, levels: &[u32; NUM_CHANNELS]) {
            self.last = *levels;
            self.updates += 1;
        }
    }

    struct CollectingPlayback {
        writes: Vec<usize>,
    }

    impl PlaybackSink for CollectingPlayback {
        fn write(&mut self, pcm: &[u8]) -> Result<(), StreamError> {
            self.writes.push(pcm.len());
            Ok(())
        }
    }

    fn sine_hops(count: usize, period: usize, layout: PcmLayout) -> Vec<Vec<u8>> {
        let mut t = 0usize;
        (0..count)
            .map(|_| {
                let samples: Vec<i32> = (0..period)
                    .map(|_| {
                        let v = (2.0 * PI * 4.0 * t as f64 / 128.0).sin() * 8000.0;
                        t += 1;
                        v as i32
                    })
                    .collect();
                let mut pcm = Vec::new();
                encode_mono(layout, &samples, &mut pcm);
                pcm
            })
            .collect()
    }

    #[test]
    fn lights_go_dark_when_capture_disconnects() {
        let settings = test_settings(Mode::Spectrum, false);
        let hops = sine_hops(10, settings.audio_period, settings.layout);
        let mut capture = ScriptedCapture { hops, next: 0 };
        let mut lights = RecordingLights {
            last: [1; NUM_CHANNELS],
            updates: 0,
        };
        let mut pipeline = Pipeline::new(settings).unwrap();
        pipeline.run(&mut capture, &mut lights, None);

        // 2 priming hops, 8 analysis cycles, 1 blackout
        assert_eq!(lights.updates, 9);
        assert_eq!(lights.last, [0; NUM_CHANNELS]);
    }

    #[test]
    fn recoverable_errors_keep_the_loop_alive() {
        struct FlakyCapture {
            inner: ScriptedCapture,
            hiccuped: bool,
        }
        impl CaptureSource for FlakyCapture {
            fn read_hop(&mut self) -> Result<Vec<u8>, StreamError> {
                if !self.hiccuped && self.inner.next == 3 {
                    self.hiccuped = true;
                    return Err(StreamError::Overrun);
                }
                self.inner.read_hop()
            }
        }

        let settings = test_settings(Mode::Spectrum, false);
        let hops = sine_hops(6, settings.audio_period, settings.layout);
        let mut capture = FlakyCapture {
            inner: ScriptedCapture { hops, next: 0 },
            hiccuped: false,
        };
        let mut lights = RecordingLights {
            last: [0; NUM_CHANNELS],
            updates: 0,
        };
        let mut pipeline = Pipeline::new(settings).unwrap();
        pipeline.run(&mut capture, &mut lights, None);

        // all 6 hops still processed: 2 priming, 4 cycles, 1 blackout
        assert_eq!(lights.updates, 5);
    }

    #[test]
    fn vocoder_flushes_full_audio_periods() {
        let settings = test_settings(Mode::Spectrum, true);
        let frame_bytes = settings.layout.frame_bytes();
        let period = settings.audio_period;
        let hops = sine_hops(12, period, settings.layout);
        let mut capture = ScriptedCapture { hops, next: 0 };
        let mut lights = RecordingLights {
            last: [0; NUM_CHANNELS],
            updates: 0,
        };
        let mut playback = CollectingPlayback { writes: Vec::new() };
        let mut pipeline = Pipeline::new(settings).unwrap();
        pipeline.run(
            &mut capture,
            &mut lights,
            Some(&mut playback as &mut dyn PlaybackSink),
        );

        // 10 analysis cycles with 4 hop slots: first flush on the 4th
        assert_eq!(playback.writes.len(), 7);
        for &len in &playback.writes {
            assert_eq!(len, period * frame_bytes);
        }
    }

    #[test]
    fn level_mode_updates_every_cycle() {
        let settings = test_settings(Mode::Level, false);
        let hops = sine_hops(8, settings.audio_period, settings.layout);
        let mut capture = ScriptedCapture { hops, next: 0 };
        let mut lights = RecordingLights {
            last: [9; NUM_CHANNELS],
            updates: 0,
        };
        let mut pipeline = Pipeline::new(settings).unwrap();
        pipeline.run(&mut capture, &mut lights, None);

        assert_eq!(lights.updates, 7);
        assert_eq!(lights.last, [0; NUM_CHANNELS]);
    }
}
