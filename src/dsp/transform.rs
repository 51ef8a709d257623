use rustfft::{num_complex::Complex, Fft, FftPlanner};
use std::sync::Arc;

/// Forward/inverse DFT of a fixed size, with the zero-phase alignment step
/// used on both sides of the transform. Plans are built once at startup and
/// scratch is pre-allocated; the inverse is unnormalized, so callers divide
/// by the size.
pub struct SpectralTransform {
    n: usize,
    forward: Arc<dyn Fft<f64>>,
    inverse: Arc<dyn Fft<f64>>,
    scratch: Vec<Complex<f64>>,
    rotated: Vec<f64>,
}

impl SpectralTransform {
    pub fn new(n: usize) -> Self {
        let mut planner = FftPlanner::new();
        let forward = planner.plan_fft_forward(n);
        let inverse = planner.plan_fft_inverse(n);
        let scratch_len = forward
            .get_inplace_scratch_len()
            .max(inverse.get_inplace_scratch_len());
        Self {
            n,
            forward,
            inverse,
            scratch: vec![Complex::new(0.0, 0.0); scratch_len],
            rotated: vec![0.0; n],
        }
    }

    pub fn size(&self) -> usize {
        self.n
    }

    pub fn forward(&mut self, frame: &mut [Complex<f64>]) {
        self.forward.process_with_scratch(frame, &mut self.scratch);
    }

    pub fn inverse(&mut self, frame: &mut [Complex<f64>]) {
        self.inverse.process_with_scratch(frame, &mut self.scratch);
    }

    /// Swap the first and second half of the real components, aligning the
    /// window center with sample index 0. Applied before the forward
    /// transform and again after the inverse. Odd sizes rotate by n/2
    /// rounded down.
    pub fn shift_halves(&mut self, frame: &mut [Complex<f64>]) {
        let half = self.n / 2;
        for (i, slot) in self.rotated.iter_mut().enumerate() {
            *slot = frame[(i + half) % self.n].re;
        }
        for (sample, &re) in frame.iter_mut().zip(&self.rotated) {
            sample.re = re;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f64::consts::PI;

    #[test]
    fn shift_halves_swaps_real_parts_only() {
        let mut t = SpectralTransform::new(8);
        let mut frame: Vec<Complex<f64>> =
            (0..8).map(|i| Complex::new(i as f64, 100.0 + i as f64)).collect();
        t.shift_halves(&mut frame);
        let re: Vec<f64> = frame.iter().map(|c| c.re).collect();
        assert_eq!(re, [4.0, 5.0, 6.0, 7.0, 0.0, 1.0, 2.0, 3.0]);
        for (i, sample) in frame.iter().enumerate() {
            assert_eq!(sample.im, 100.0 + i as f64);
        }
        // applying it twice restores the original order
        t.shift_halves(&mut frame);
        let re: Vec<f64> = frame.iter().map(|c| c.re).collect();
        assert_eq!(re, [0.0, 1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0]);
    }

    #[test]
    fn bin_aligned_sinusoid_round_trips() {
        let n = 64;
        let mut t = SpectralTransform::new(n);
        let original: Vec<f64> = (0..n)
            .map(|i| (2.0 * PI * 4.0 * i as f64 / n as f64).cos())
            .collect();
        let mut frame: Vec<Complex<f64>> =
            original.iter().map(|&x| Complex::new(x, 0.0)).collect();

        t.shift_halves(&mut frame);
        t.forward(&mut frame);
        t.inverse(&mut frame);
        t.shift_halves(&mut frame);

        for (sample, &want) in frame.iter().zip(&original) {
            assert!((sample.re / n as f64 - want).abs() < 1e-9);
        }
    }

    #[test]
    fn supports_non_power_of_two_sizes() {
        let n = 96;
        let mut t = SpectralTransform::new(n);
        let original: Vec<f64> = (0..n)
            .map(|i| (2.0 * PI * 3.0 * i as f64 / n as f64).sin())
            .collect();
        let mut frame: Vec<Complex<f64>> =
            original.iter().map(|&x| Complex::new(x, 0.0)).collect();

        t.shift_halves(&mut frame);
        t.forward(&mut frame);
        t.inverse(&mut frame);
        t.shift_halves(&mut frame);

        for (sample, &want) in frame.iter().zip(&original) {
            assert!((sample.re / n as f64 - want).abs() < 1e-9);
        }
    }
}
