//! # Fast Fourier Transform (FFT) Module
//!
//! Magnitude spectra for the spectral pitch strategies. The planner output,
//! the Hann window and the working buffers are kept between calls so the
//! analysis worker does not allocate per window.
//!
//! ## Processing
//! - DC offset removal
//! - Hann windowing for reduced spectral leakage
//! - Forward FFT using RustFFT, magnitudes up to Nyquist

use rustfft::{Fft, FftPlanner, num_complex::Complex};
use std::sync::Arc;

/// Removes the DC offset from a signal by making its average value zero.
fn remove_dc_offset(signal: &mut [f32]) {
    let len = signal.len();
    if len == 0 {
        return;
    }
    let avg = signal.iter().sum::<f32>() / len as f32;
    if avg.abs() > 1e-6 {
        for sample in signal.iter_mut() {
            *sample -= avg;
        }
    }
}

/// Hann window coefficients of length `n`.
fn hann_window(n: usize) -> Vec<f32> {
    if n < 2 {
        return vec![1.0; n];
    }
    let n_minus_1 = (n - 1) as f32;
    (0..n)
        .map(|i| 0.5 * (1.0 - (2.0 * std::f32::consts::PI * i as f32 / n_minus_1).cos()))
        .collect()
}

/// Reusable forward FFT producing magnitude spectra.
pub struct SpectrumAnalyzer {
    size: usize,
    fft: Arc<dyn Fft<f32>>,
    window: Vec<f32>,
    signal: Vec<f32>,
    buffer: Vec<Complex<f32>>,
    scratch: Vec<Complex<f32>>,
    magnitudes: Vec<f32>,
}

impl std::fmt::Debug for SpectrumAnalyzer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SpectrumAnalyzer")
            .field("size", &self.size)
            .finish_non_exhaustive()
    }
}

impl SpectrumAnalyzer {
    pub fn new(size: usize) -> Self {
        let fft = FftPlanner::new().plan_fft_forward(size);
        let scratch = vec![Complex::default(); fft.get_inplace_scratch_len()];
        Self {
            size,
            fft,
            window: hann_window(size),
            signal: Vec::with_capacity(size),
            buffer: Vec::with_capacity(size),
            scratch,
            magnitudes: Vec::with_capacity(size / 2),
        }
    }

    pub fn size(&self) -> usize {
        self.size
    }

    /// Magnitude spectrum of `signal` for bins `0..len/2`.
    ///
    /// A signal of a different length than the planned size re-plans the
    /// transform.
    pub fn magnitudes(&mut self, signal: &[f32]) -> &[f32] {
        if signal.len() != self.size {
            *self = Self::new(signal.len());
        }

        self.signal.clear();
        self.signal.extend_from_slice(signal);
        remove_dc_offset(&mut self.signal);

        self.buffer.clear();
        self.buffer.extend(
            self.signal
                .iter()
                .zip(&self.window)
                .map(|(&sample, &w)| Complex {
                    re: sample * w,
                    im: 0.0,
                }),
        );
        self.fft.process_with_scratch(&mut self.buffer, &mut self.scratch);

        self.magnitudes.clear();
        self.magnitudes.extend(
            self.buffer
                .iter()
                .take(self.size / 2)
                .map(|c| c.norm()), // .norm() is sqrt(re^2 + im^2)
        );
        &self.magnitudes
    }
}

/// Centre frequency of an FFT bin.
pub fn bin_to_frequency(bin: f32, fft_size: usize, sample_rate: u32) -> f32 {
    bin * sample_rate as f32 / fft_size as f32
}

/// Bin containing `frequency`, possibly fractional.
pub fn frequency_to_bin(frequency: f32, fft_size: usize, sample_rate: u32) -> f32 {
    frequency * fft_size as f32 / sample_rate as f32
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hann_window_tapers_to_zero() {
        let window = hann_window(9);
        assert!(window[0].abs() < 1e-6);
        assert!(window[8].abs() < 1e-6);
        assert!((window[4] - 1.0).abs() < 1e-6);
    }

    #[test]
    fn dc_offset_is_removed() {
        let mut signal = vec![1.5, 2.5, 1.5, 2.5];
        remove_dc_offset(&mut signal);
        assert_eq!(signal, vec![-0.5, 0.5, -0.5, 0.5]);
    }

    #[test]
    fn sine_peaks_in_its_bin() {
        let size = 1024;
        let sample_rate = 8_000;
        // Exactly bin 64.
        let frequency = bin_to_frequency(64.0, size, sample_rate);
        let signal: Vec<f32> = (0..size)
            .map(|i| (2.0 * std::f32::consts::PI * frequency * i as f32 / sample_rate as f32).sin())
            .collect();

        let mut analyzer = SpectrumAnalyzer::new(size);
        let magnitudes = analyzer.magnitudes(&signal);
        assert_eq!(magnitudes.len(), size / 2);
        let peak = magnitudes
            .iter()
            .enumerate()
            .max_by(|a, b| a.1.total_cmp(b.1))
            .map(|(i, _)| i);
        assert_eq!(peak, Some(64));
    }

    #[test]
    fn replans_for_a_different_length() {
        let mut analyzer = SpectrumAnalyzer::new(256);
        assert_eq!(analyzer.magnitudes(&[0.0; 512]).len(), 256);
        assert_eq!(analyzer.size(), 512);
    }

    #[test]
    fn bin_conversions_are_inverse() {
        let bin = frequency_to_bin(440.0, 2048, 44_100);
        assert!((bin_to_frequency(bin, 2048, 44_100) - 440.0).abs() < 1e-3);
    }
}
