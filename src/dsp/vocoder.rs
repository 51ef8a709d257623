use rustfft::num_complex::Complex;

use super::transform::SpectralTransform;
use crate::audio::pcm::{encode_mono, PcmLayout};
use crate::audio::playback::PlaybackSink;
use crate::audio::StreamError;
use crate::trace::TraceFiles;

/// Overlap-add resynthesizer. Each cycle inverse-transforms the current
/// spectrum (optionally phase-zeroed for robotize) and accumulates it into a
/// fixed-length buffer at the current hop offset; once the last hop slot has
/// been filled, a full audio period is flushed to the playback sink and the
/// buffer slides by one synthesis hop per cycle from then on. A synthesis
/// hop shorter than the audio period stretches the output in time.
pub struct Resynthesizer {
    audio_period: usize,
    hop_period: usize,
    num_hops: usize,
    hop: usize,
    robotize: bool,
    layout: PcmLayout,
    frame: Vec<Complex<f64>>,
    accumulator: Vec<i32>,
    pcm: Vec<u8>,
    trace_hops: bool,
}

impl Resynthesizer {
    pub fn new(
        fft_period: usize,
        audio_period: usize,
        hop_period: usize,
        robotize: bool,
        layout: PcmLayout,
        trace_hops: bool,
    ) -> Self {
        assert!(hop_period > 0 && hop_period <= audio_period && fft_period % hop_period == 0);
        let num_hops = fft_period / hop_period;
        Self {
            audio_period,
            hop_period,
            num_hops,
            hop: 0,
            robotize,
            layout,
            frame: vec![Complex::new(0.0, 0.0); fft_period],
            accumulator: vec![0; audio_period + fft_period - 2 * hop_period],
            pcm: Vec::with_capacity(audio_period * layout.frame_bytes()),
            trace_hops,
        }
    }

    pub fn buffer_len(&self) -> usize {
        self.accumulator.len()
    }

    /// Load a spectrum for resynthesis, collapsing phase in robotize mode.
    fn load_spectrum(&mut self, spectrum: &[Complex<f64>]) {
        self.frame.copy_from_slice(spectrum);
        if self.robotize {
            for bin in self.frame.iter_mut() {
                bin.im = 0.0;
            }
        }
    }

    /// One resynthesis cycle against the current spectrum.
    pub fn process(
        &mut self,
        spectrum: &[Complex<f64>],
        transform: &mut SpectralTransform,
        sink: &mut dyn PlaybackSink,
        trace: &mut TraceFiles,
    ) {
        self.load_spectrum(spectrum);
        transform.inverse(&mut self.frame);
        transform.shift_halves(&mut self.frame);

        let n = transform.size() as f64;

        if self.hop == self.num_hops {
            // buffer full: slide one hop left and reuse the last slot
            if self.hop_period <= self.accumulator.len() {
                let tail = self.accumulator.len() - self.hop_period;
                self.accumulator.copy_within(self.hop_period.., 0);
                self.accumulator[tail..].fill(0);
            }
            self.hop = self.num_hops - 1;
        }

        // accumulate the first audio period of the descaled output at this
        // hop's offset; samples past the buffer end belong to hops that
        // never flush
        let offset = self.hop * self.hop_period;
        let end = self.accumulator.len();
        for i in 0..self.audio_period {
            let idx = offset + i;
            if idx >= end {
                break;
            }
            let sample = (self.frame[i].re / n).round() as i64;
            self.accumulator[idx] = self.layout.clamp(self.accumulator[idx] as i64 + sample);
        }
        trace.resynth_row(self.frame[..self.audio_period].iter().map(|c| c.re / n));

        if self.hop == self.num_hops - 1 {
            let prefix = self.audio_period.min(end);
            encode_mono(self.layout, &self.accumulator[..prefix], &mut self.pcm);
            trace.resynth_pcm_row(self.accumulator[..prefix].iter().map(|&v| v as f64));
            if self.trace_hops {
                log::trace!(
                    "flush at hop {} of {}, {} bytes",
                    self.hop,
                    self.num_hops,
                    self.pcm.len()
                );
            }
            match sink.write(&self.pcm) {
                Ok(()) => {}
                Err(StreamError::Underrun) => log::warn!("playback underrun, repriming"),
                Err(StreamError::Short { got, want }) => {
                    log::warn!("short write, wrote {} of {} frames", got, want)
                }
                Err(err) => log::warn!("playback error: {}", err),
            }
        }
        self.hop += 1;
    }
}
