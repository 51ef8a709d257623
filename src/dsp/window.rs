use rustfft::num_complex::Complex;
use std::f64::consts::PI;

/// Periodic raised-cosine analysis window: w[i] = 0.5 * (1 - cos(2*pi*i/n)).
/// The first coefficient is zero and the last is not; the asymmetry is what
/// makes hop-aligned overlap-add sum back to constant energy.
pub fn make_window(n: usize) -> Vec<f64> {
    (0..n)
        .map(|i| 0.5 * (1.0 - (2.0 * PI * i as f64 / n as f64).cos()))
        .collect()
}

/// Scale the real component of each sample by its window coefficient.
/// Imaginary components are left untouched.
pub fn apply_window(frame: &mut [Complex<f64>], window: &[f64]) {
    for (sample, &w) in frame.iter_mut().zip(window) {
        sample.re *= w;
    }
}
