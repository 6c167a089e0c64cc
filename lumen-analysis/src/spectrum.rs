//! FFT-based band-energy analyzer for live audio reactivity

use rustfft::{num_complex::Complex, FftPlanner};
use std::f32::consts::PI;

/// Default analysis window length in samples (power of two)
pub const DEFAULT_WINDOW_SIZE: usize = 1024;

/// Energy of the three frequency bands for one analysis window
///
/// Ephemeral: recomputed per window, never persisted.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct FrequencyBand {
    pub bass: f32,
    pub mid: f32,
    pub treble: f32,
}

/// Real-time three-band spectrum analyzer
///
/// Consumes non-overlapping windows of 16-bit PCM on the audio-callback
/// thread. All buffers are pre-allocated in `new`; `process` does not
/// allocate.
pub struct SpectrumAnalyzer {
    window_size: usize,
    fft: std::sync::Arc<dyn rustfft::Fft<f32>>,
    window: Vec<f32>,
    /// Pre-allocated FFT buffer to avoid allocation in process()
    fft_buffer: Vec<Complex<f32>>,
    /// (start, end) bin ranges for bass, mid, treble
    band_bins: [(usize, usize); 3],
}

impl SpectrumAnalyzer {
    /// Create a new analyzer for the given window length
    ///
    /// `window_size` must be a power of two.
    pub fn new(window_size: usize) -> Self {
        assert!(
            window_size.is_power_of_two(),
            "window size must be a power of two"
        );
        let mut planner = FftPlanner::new();
        let fft = planner.plan_fft_forward(window_size);

        // Pre-compute Hann window
        let window: Vec<f32> = (0..window_size)
            .map(|i| 0.5 * (1.0 - (2.0 * PI * i as f32 / window_size as f32).cos()))
            .collect();

        // Contiguous bin ranges, fixed relative to the window size.
        // Bin 0 (DC) is excluded from bass.
        let bass_end = window_size / 64;
        let mid_end = window_size / 8;
        let treble_end = window_size / 2;
        let band_bins = [(1, bass_end), (bass_end, mid_end), (mid_end, treble_end)];

        Self {
            window_size,
            fft,
            window,
            fft_buffer: vec![Complex::new(0.0, 0.0); window_size],
            band_bins,
        }
    }

    /// Analyze one window of 16-bit PCM samples
    ///
    /// Short windows are zero-padded; extra samples beyond the window
    /// length are ignored.
    pub fn process(&mut self, samples: &[i16]) -> FrequencyBand {
        let count = samples.len().min(self.window_size);
        for (i, &sample) in samples.iter().enumerate().take(count) {
            let normalized = sample as f32 / i16::MAX as f32;
            self.fft_buffer[i] = Complex::new(normalized * self.window[i], 0.0);
        }
        // Zero pad the rest
        for slot in self.fft_buffer.iter_mut().skip(count) {
            *slot = Complex::new(0.0, 0.0);
        }

        self.fft.process(&mut self.fft_buffer);

        let mut bands = [0.0f32; 3];
        for (value, &(start, end)) in bands.iter_mut().zip(self.band_bins.iter()) {
            if start < end {
                let sum: f32 = self.fft_buffer[start..end].iter().map(|c| c.norm()).sum();
                *value = sum / (end - start) as f32;
            }
        }

        FrequencyBand {
            bass: bands[0],
            mid: bands[1],
            treble: bands[2],
        }
    }

    /// Window length this analyzer was built for
    pub fn window_size(&self) -> usize {
        self.window_size
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sine(freq: f32, sample_rate: f32, len: usize) -> Vec<i16> {
        (0..len)
            .map(|i| {
                let t = i as f32 / sample_rate;
                ((2.0 * PI * freq * t).sin() * 0.8 * i16::MAX as f32) as i16
            })
            .collect()
    }

    #[test]
    fn test_silence_yields_zero_bands() {
        let mut analyzer = SpectrumAnalyzer::new(DEFAULT_WINDOW_SIZE);
        let band = analyzer.process(&vec![0i16; DEFAULT_WINDOW_SIZE]);
        assert_eq!(band.bass, 0.0);
        assert_eq!(band.mid, 0.0);
        assert_eq!(band.treble, 0.0);
    }

    #[test]
    fn test_low_tone_lands_in_bass() {
        let mut analyzer = SpectrumAnalyzer::new(DEFAULT_WINDOW_SIZE);
        // 200 Hz at 44.1 kHz falls well inside the bass bin range
        let band = analyzer.process(&sine(200.0, 44_100.0, DEFAULT_WINDOW_SIZE));
        assert!(band.bass > band.mid);
        assert!(band.bass > band.treble);
    }

    #[test]
    fn test_high_tone_lands_in_treble() {
        let mut analyzer = SpectrumAnalyzer::new(DEFAULT_WINDOW_SIZE);
        // 10 kHz at 44.1 kHz is above the mid/treble boundary
        let band = analyzer.process(&sine(10_000.0, 44_100.0, DEFAULT_WINDOW_SIZE));
        assert!(band.treble > band.bass);
        assert!(band.treble > band.mid);
    }

    #[test]
    fn test_short_window_is_zero_padded() {
        let mut analyzer = SpectrumAnalyzer::new(DEFAULT_WINDOW_SIZE);
        let band = analyzer.process(&sine(200.0, 44_100.0, 256));
        assert!(band.bass.is_finite());
        assert!(band.bass > 0.0);
    }

    #[test]
    fn test_output_is_always_finite() {
        let mut analyzer = SpectrumAnalyzer::new(DEFAULT_WINDOW_SIZE);
        let loud = vec![i16::MAX; DEFAULT_WINDOW_SIZE];
        let band = analyzer.process(&loud);
        assert!(band.bass.is_finite() && band.mid.is_finite() && band.treble.is_finite());
    }
}
