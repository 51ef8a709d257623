use super::analysis::DB_FLOOR;
use crate::light::{MAX_INTENSITY, NUM_CHANNELS};

/// One spectrum scan range feeding an output channel. A bin of 0 disables
/// the channel.
#[derive(Debug, Clone, Copy)]
pub struct Band {
    pub bin: usize,
    pub width: usize,
}

/// Calibrated band layout: low bins spread across the channels that have
/// fixtures attached, wider scans covering the upper ranges.
pub fn default_bands() -> [Band; NUM_CHANNELS] {
    const BINS: [usize; NUM_CHANNELS] = [0, 0, 1, 0, 2, 2, 0, 3, 0, 4, 4, 0, 20, 0, 0, 0];
    const WIDTHS: [usize; NUM_CHANNELS] = [0, 0, 1, 0, 1, 1, 0, 1, 0, 16, 16, 0, 20, 0, 0, 0];
    let mut bands = [Band { bin: 0, width: 0 }; NUM_CHANNELS];
    for (band, (&bin, &width)) in bands.iter_mut().zip(BINS.iter().zip(&WIDTHS)) {
        *band = Band { bin, width };
    }
    bands
}

/// Static per-channel dB ranges used when adaptive tracking is off.
const CALIBRATED_RANGES: [(f64, f64); NUM_CHANNELS] = [
    (38.0, 92.0),
    (38.0, 92.0),
    (38.0, 92.0),
    (30.0, 88.0),
    (30.0, 88.0),
    (30.0, 88.0),
    (80.0, 83.0),
    (80.0, 83.0),
    (80.0, 83.0),
    (60.0, 86.0),
    (60.0, 86.0),
    (60.0, 86.0),
    (74.0, 76.0),
    (74.0, 76.0),
    (74.0, 76.0),
    (0.0, 0.0),
];

/// Fixed span keeping the tracked range non-degenerate.
const MIN_SPAN_DB: f64 = 15.0;

/// Adaptive range state for one output channel. Persists across cycles and
/// is never reset after startup.
#[derive(Debug, Clone, Copy)]
pub struct GainState {
    pub min: f64,
    pub max: f64,
    pub output: f64,
}

/// Tuning for the adaptive mapping. `speed_scaler` normalizes the smoothing
/// constants to the reference hop rate of 1024 frames.
#[derive(Debug, Clone)]
pub struct GainTuning {
    pub autoexpand: bool,
    pub autocontract: bool,
    pub range_smoothing: u32,
    pub output_smoothing: u32,
    pub headroom: f64,
    pub power: u32,
    pub speed_scaler: f64,
    pub trace_range: bool,
    pub trace_levels: bool,
}

impl Default for GainTuning {
    fn default() -> Self {
        Self {
            autoexpand: true,
            autocontract: true,
            range_smoothing: 3,
            output_smoothing: 1,
            headroom: 0.9,
            power: 5,
            speed_scaler: 4.0,
            trace_range: false,
            trace_levels: false,
        }
    }
}

/// Maps per-bin magnitudes onto bounded channel intensities with adaptive
/// min/max tracking, a headroom threshold, a power-shaped response curve and
/// fast-attack/slow-release output smoothing.
pub struct GainMapper {
    bands: [Band; NUM_CHANNELS],
    states: [GainState; NUM_CHANNELS],
    tuning: GainTuning,
}

impl GainMapper {
    pub fn new(bands: [Band; NUM_CHANNELS], tuning: GainTuning) -> Self {
        let mut states = [GainState {
            min: 0.0,
            max: 0.0,
            output: 0.0,
        }; NUM_CHANNELS];
        if !tuning.autoexpand {
            for (state, &(min, max)) in states.iter_mut().zip(&CALIBRATED_RANGES) {
                state.min = min;
                state.max = max;
            }
        }
        Self {
            bands,
            states,
            tuning,
        }
    }

    /// The lowest bins carry enough ambient energy that their tracked floor
    /// has to sit well above the broadband one.
    fn floor_db(bin: usize) -> f64 {
        match bin {
            1 => 38.0,
            2 => 37.0,
            _ => 15.0,
        }
    }

    /// Map a magnitude into the tracked range; lands in [0, 1] for any
    /// finite inputs, including a degenerate or inverted range.
    fn bounded_ratio(amp: f64, min: f64, max: f64, headroom: f64) -> f64 {
        let low = min + headroom * (max - min);
        if max - low <= 0.0 {
            return if amp > low { 1.0 } else { 0.0 };
        }
        ((amp - low) / (max - low)).clamp(0.0, 1.0)
    }

    /// One cycle: track ranges, map, shape and smooth every channel.
    pub fn update(&mut self, magnitude_db: &[f64]) -> [u32; NUM_CHANNELS] {
        let range_alpha =
            (self.tuning.range_smoothing as f64 * self.tuning.speed_scaler).max(1.0);
        let output_alpha =
            (self.tuning.output_smoothing as f64 * self.tuning.speed_scaler).max(1.0);
        let mut levels = [0u32; NUM_CHANNELS];

        for (index, band) in self.bands.iter().enumerate() {
            let state = &mut self.states[index];
            if band.bin == 0 {
                state.output = 0.0;
                continue;
            }

            // loudest bin across the scan width drives the channel
            let mut amp = DB_FLOOR;
            for j in 0..band.width {
                let bin = band.bin + j;
                if bin >= magnitude_db.len() {
                    break;
                }
                if magnitude_db[bin] > amp {
                    amp = magnitude_db[bin];
                }
            }

            if self.tuning.autoexpand {
                if amp > state.max {
                    state.max = ((range_alpha - 1.0) * state.max + amp) / range_alpha;
                }
                if amp < state.min {
                    state.min = ((range_alpha - 1.0) * state.min + amp) / range_alpha;
                }
                let floor = Self::floor_db(band.bin);
                if state.min < floor {
                    state.min = floor;
                }
                if state.max < state.min + MIN_SPAN_DB {
                    state.max = state.min + MIN_SPAN_DB;
                }
                if self.tuning.trace_range {
                    log::trace!(
                        "channel {} amp {:.1} range {:.1}..{:.1}",
                        index,
                        amp,
                        state.min,
                        state.max
                    );
                }
            }

            let ratio = Self::bounded_ratio(amp, state.min, state.max, self.tuning.headroom)
                .powi(self.tuning.power as i32);
            let value = (ratio * MAX_INTENSITY as f64).min(MAX_INTENSITY as f64);

            // fast attack, slow release
            state.output = if value < state.output {
                ((output_alpha - 1.0) * state.output + value) / output_alpha
            } else {
                value
            };
            levels[index] = state.output as u32;
        }

        if self.tuning.autocontract {
            for state in self.states.iter_mut() {
                state.min += 0.01 / self.tuning.speed_scaler;
                state.max -= 0.1 / self.tuning.speed_scaler;
            }
        }
        if self.tuning.trace_levels {
            log::trace!("levels {:?}", levels);
        }
        levels
    }
}

/// Full-band tracker for level mode: peak-to-peak swing per window, adaptive
/// offset, exponential smoothing and a squared response applied twice. One
/// intensity drives every channel.
pub struct LevelTracker {
    min_swing: i32,
    max_swing: i32,
    average: f64,
    alpha: f64,
    trace: bool,
}

impl LevelTracker {
    pub fn new(output_smoothing: u32, speed_scaler: f64, trace: bool) -> Self {
        Self {
            min_swing: 32000,
            max_swing: -32000,
            average: 0.0,
            alpha: (output_smoothing as f64 * speed_scaler).max(1.0),
            trace,
        }
    }

    pub fn update(&mut self, samples: &[i32]) -> u32 {
        let mut lo = i32::MAX;
        let mut hi = i32::MIN;
        for &s in samples {
            if s < lo {
                lo = s;
            }
            if s > hi {
                hi = s;
            }
        }
        let swing = if hi >= lo { hi - lo } else { 0 };
        if swing < self.min_swing {
            self.min_swing = swing;
        }
        if swing > self.max_swing {
            self.max_swing = swing;
        }

        let value = (swing - self.min_swing) as f64;
        self.average = (value + (self.alpha - 1.0) * self.average) / self.alpha;

        let range = (self.max_swing - self.min_swing) as f64;
        let mut ratio = if range > 0.0 {
            (self.average / range).clamp(0.0, 1.0)
        } else {
            0.0
        };
        ratio = ratio * ratio;
        ratio = ratio * ratio;
        if self.trace {
            log::trace!("swing {} ratio {:.3}", swing, ratio);
        }
        (ratio * MAX_INTENSITY as f64) as u32
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ratio_is_always_bounded() {
        let configs = [
            (0.0, 0.0, 0.0),
            (50.0, 15.0, 92.0),
            (120.0, 15.0, 92.0),
            (-300.0, 15.0, 92.0),
            (50.0, 92.0, 15.0), // inverted range
            (50.0, 50.0, 50.0), // degenerate range
            (DB_FLOOR, 0.0, 15.0),
        ];
        for &(amp, min, max) in &configs {
            for &headroom in &[0.0, 0.5, 0.9] {
                let r = GainMapper::bounded_ratio(amp, min, max, headroom);
                assert!((0.0..=1.0).contains(&r), "amp {} min {} max {}", amp, min, max);
            }
        }
    }

    #[test]
    fn silence_settles_dark() {
        // 1024-sample window advanced 256 frames per cycle
        let tuning = GainTuning {
            speed_scaler: 1024.0 / 256.0,
            ..GainTuning::default()
        };
        let mut mapper = GainMapper::new(default_bands(), tuning);
        let silence = vec![DB_FLOOR; 1024];
        let mut levels = [0u32; NUM_CHANNELS];
        for _ in 0..200 {
            levels = mapper.update(&silence);
        }
        assert_eq!(levels, [0; NUM_CHANNELS]);
    }

    #[test]
    fn driven_bin_lights_its_channels() {
        let mut mapper = GainMapper::new(default_bands(), GainTuning::default());
        let mut mags = vec![-100.0; 1024];
        mags[2] = 80.0;
        let mut levels = [0u32; NUM_CHANNELS];
        for _ in 0..40 {
            levels = mapper.update(&mags);
        }
        // channels 4 and 5 scan bin 2
        assert!(levels[4] > 4000, "levels {:?}", levels);
        assert!(levels[5] > 4000, "levels {:?}", levels);
        for (i, &level) in levels.iter().enumerate() {
            if i != 4 && i != 5 {
                assert_eq!(level, 0, "channel {} lit: {:?}", i, levels);
            }
        }
    }

    #[test]
    fn fast_attack_slow_release() {
        let tuning = GainTuning {
            output_smoothing: 4,
            ..GainTuning::default()
        };
        let mut mapper = GainMapper::new(default_bands(), tuning);
        let mut mags = vec![-100.0; 1024];
        mags[2] = 80.0;
        let mut peak = 0;
        for _ in 0..40 {
            peak = mapper.update(&mags)[4];
        }
        assert!(peak > 4000);

        // signal drops; the output has to ramp down instead of snapping
        let silence = vec![DB_FLOOR; 1024];
        let first = mapper.update(&silence)[4];
        assert!(first < peak);
        assert!(first > peak / 2, "released too fast: {} -> {}", peak, first);
        let second = mapper.update(&silence)[4];
        assert!(second < first);
    }

    #[test]
    fn autocontract_narrows_an_idle_range() {
        let tuning = GainTuning {
            autocontract: true,
            ..GainTuning::default()
        };
        let mut mapper = GainMapper::new(default_bands(), tuning);
        let mut mags = vec![-100.0; 1024];
        mags[2] = 80.0;
        for _ in 0..20 {
            mapper.update(&mags);
        }
        let expanded = mapper.states[4].max;
        // quiet signal keeps amp below max, so only contraction applies
        mags[2] = 40.0;
        for _ in 0..50 {
            mapper.update(&mags);
        }
        assert!(mapper.states[4].max < expanded);
    }

    #[test]
    fn level_tracker_rises_from_silence_to_full() {
        let mut tracker = LevelTracker::new(1, 4.0, false);
        assert_eq!(tracker.update(&[0; 256]), 0);

        let loud: Vec<i32> = (0..256).map(|i| if i % 2 == 0 { 10000 } else { -10000 }).collect();
        let first = tracker.update(&loud);
        let mut last = first;
        for _ in 0..100 {
            last = tracker.update(&loud);
        }
        assert!(first < last);
        assert!(last >= MAX_INTENSITY - 1);
    }
}
