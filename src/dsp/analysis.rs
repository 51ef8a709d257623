use rustfft::num_complex::Complex;

/// Finite stand-in for the magnitude of an empty bin, far below any tracked
/// range, so silence never produces a non-finite dB value.
pub const DB_FLOOR: f64 = -200.0;

/// Derives per-bin magnitude (dB) and phase from a complex spectrum. Output
/// vectors are pre-allocated and rewritten every cycle.
pub struct SpectralAnalyzer {
    n: usize,
    legacy_atan: bool,
    pub magnitude_db: Vec<f64>,
    pub phase: Vec<f64>,
}

impl SpectralAnalyzer {
    pub fn new(n: usize, legacy_atan: bool) -> Self {
        Self {
            n,
            legacy_atan,
            magnitude_db: vec![DB_FLOOR; n],
            phase: vec![0.0; n],
        }
    }

    pub fn analyze(&mut self, spectrum: &[Complex<f64>]) {
        for (i, bin) in spectrum.iter().enumerate() {
            let norm = (bin.re * bin.re + bin.im * bin.im).sqrt();
            self.magnitude_db[i] = if norm == 0.0 {
                DB_FLOOR
            } else {
                20.0 * (2.0 * norm / self.n as f64).log10()
            };
            // the legacy mode loses the quadrant; kept selectable for parity
            // with captures made by older builds
            self.phase[i] = if self.legacy_atan {
                (bin.im / bin.re).atan()
            } else {
                bin.im.atan2(bin.re)
            };
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f64::consts::PI;

    #[test]
    fn zero_magnitude_hits_the_floor() {
        let mut analyzer = SpectralAnalyzer::new(16, false);
        let spectrum = vec![Complex::new(0.0, 0.0); 16];
        analyzer.analyze(&spectrum);
        assert!(analyzer.magnitude_db.iter().all(|&db| db == DB_FLOOR));
        assert!(analyzer.magnitude_db.iter().all(|db| db.is_finite()));
    }

    #[test]
    fn half_size_norm_is_zero_db() {
        // a bin-aligned unit sinusoid lands n/2 in its bin, which the 2/n
        // normalization maps to 0 dB
        let n = 1024;
        let mut analyzer = SpectralAnalyzer::new(n, false);
        let mut spectrum = vec![Complex::new(0.0, 0.0); n];
        spectrum[3] = Complex::new(n as f64 / 2.0, 0.0);
        analyzer.analyze(&spectrum);
        assert!(analyzer.magnitude_db[3].abs() < 1e-9);
    }

    #[test]
    fn legacy_atan_loses_the_quadrant() {
        let mut full = SpectralAnalyzer::new(1, false);
        let mut legacy = SpectralAnalyzer::new(1, true);
        let spectrum = vec![Complex::new(-1.0, -1.0)];
        full.analyze(&spectrum);
        legacy.analyze(&spectrum);
        assert!((full.phase[0] - (-3.0 * PI / 4.0)).abs() < 1e-12);
        assert!((legacy.phase[0] - PI / 4.0).abs() < 1e-12);
    }
}
