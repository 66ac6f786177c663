//! # Pitch Detection Module
//!
//! Fundamental frequency estimation over a single analysis window. Three
//! strategies share the [`PitchDetector`] capability and are selected once,
//! from the engine configuration, through the [`Estimator`] enum.
//!
//! ## Strategies
//! - **YIN**: time-domain cumulative mean normalized difference with
//!   parabolic interpolation. The default, and the most accurate on clean
//!   tones.
//! - **Harmonic product spectrum**: multiplies the spectrum with its own
//!   downsampled copies so the fundamental wins even when an overtone is
//!   louder.
//! - **Quadratic peak**: the loudest spectral bin, refined by parabolic
//!   interpolation of the log magnitudes.
//!
//! Failing to find a pitch is an expected outcome, reported as
//! [`NoPitchFound`]. Degenerate input (empty or all-zero windows) ends there
//! too rather than as an error.

use serde::Serialize;

use crate::config::{EngineConfig, EstimationStrategy};
use crate::error::NoPitchFound;
use crate::fft::{SpectrumAnalyzer, bin_to_frequency, frequency_to_bin};
use crate::window::AudioWindow;

/// Number of spectrum copies multiplied by the HPS strategy.
const HPS_HARMONICS: usize = 5;
/// Half-width, in bins, of a Hann main lobe.
const PEAK_RADIUS: usize = 2;
/// HPS candidates must be within 40 dB of the loudest bin.
const HPS_MIN_RELATIVE_MAGNITUDE: f32 = 0.01;
/// Share of spectral energy a spectral estimate must explain.
const MIN_SPECTRAL_CLARITY: f32 = 0.5;
/// Keeps `ln` finite for empty bins.
const MAGNITUDE_FLOOR: f32 = 1e-12;

/// A fundamental frequency estimate for one window.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct PitchEstimate {
    /// Frequency in Hz, always positive.
    pub frequency: f32,
    /// Confidence in `[0, 1]`.
    pub clarity: f32,
}

/// Estimates the fundamental frequency of a window.
pub trait PitchDetector {
    fn estimate(&mut self, window: &AudioWindow) -> Result<PitchEstimate, NoPitchFound>;
}

/// Frequencies an estimator is allowed to report.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrequencyRange {
    pub min_hz: f32,
    pub max_hz: f32,
}

impl FrequencyRange {
    pub fn new(min_hz: f32, max_hz: f32) -> Self {
        Self { min_hz, max_hz }
    }

    pub fn contains(&self, frequency: f32) -> bool {
        frequency.is_finite() && frequency >= self.min_hz && frequency <= self.max_hz
    }

    fn accept(&self, estimate: PitchEstimate) -> Result<PitchEstimate, NoPitchFound> {
        if self.contains(estimate.frequency) {
            Ok(estimate)
        } else {
            Err(NoPitchFound)
        }
    }
}

/// Vertex of the parabola through three equally spaced points.
///
/// Returns the vertex offset from the middle point (in `[-0.5, 0.5]` when
/// the middle point is an extremum) and the parabola's value there.
fn parabolic_vertex(y1: f32, y2: f32, y3: f32) -> Option<(f32, f32)> {
    let denominator = y1 - 2.0 * y2 + y3;
    if denominator.abs() < 1e-12 {
        return None;
    }
    let shift = 0.5 * (y1 - y3) / denominator;
    Some((shift, y2 - 0.25 * (y1 - y3) * shift))
}

/// YIN detector with a reusable difference buffer.
#[derive(Debug, Clone)]
pub struct YinDetector {
    threshold: f32,
    range: FrequencyRange,
    yin_buffer: Vec<f32>,
}

impl YinDetector {
    pub fn new(threshold: f32, range: FrequencyRange) -> Self {
        Self {
            threshold,
            range,
            yin_buffer: Vec::new(),
        }
    }

    pub fn threshold(&self) -> f32 {
        self.threshold
    }

    /// Runs YIN over `signal`.
    ///
    /// Lags from 2 up to half the frame are searched first; the frequency
    /// range is applied to the result afterwards.
    ///
    /// # Arguments
    /// * `signal` - One analysis window; should have an even length
    /// * `sample_rate` - Sample rate in Hz
    ///
    /// # Returns
    /// * `Ok(PitchEstimate)` - Interpolated frequency and its clarity
    /// * `Err(NoPitchFound)` - No dip below the threshold, or the result lies
    ///   outside the frequency range
    pub fn detect(
        &mut self,
        signal: &[f32],
        sample_rate: u32,
    ) -> Result<PitchEstimate, NoPitchFound> {
        let frame_size = signal.len();
        let half = frame_size / 2;
        if half < 3 || sample_rate == 0 {
            return Err(NoPitchFound);
        }

        self.yin_buffer.clear();
        self.yin_buffer.resize(half + 1, 0.0);
        let yin = &mut self.yin_buffer;

        // --- Step 1: Difference function for lags 1..=W/2 ---
        for tau in 1..=half {
            let mut diff = 0.0;
            for j in 0..(frame_size - tau) {
                let delta = signal[j] - signal[j + tau];
                diff += delta * delta;
            }
            yin[tau] = diff;
        }

        // --- Step 2: Cumulative mean normalized difference ---
        // An all-zero window leaves the running sum at zero; every lag is
        // then set to 1.0 and nothing passes the threshold.
        yin[0] = 1.0;
        let mut running_sum = 0.0;
        for tau in 1..=half {
            running_sum += yin[tau];
            yin[tau] = if running_sum > 0.0 {
                yin[tau] * tau as f32 / running_sum
            } else {
                1.0
            };
        }

        // --- Step 3: First dip below the absolute threshold ---
        // Lag 1 has no left neighbour for interpolation.
        let mut period = None;
        for tau in 2..=half {
            if yin[tau] < self.threshold {
                // Follow the dip down to its local minimum.
                let mut best = tau;
                while best < half && yin[best + 1] < yin[best] {
                    best += 1;
                }
                period = Some(best);
                break;
            }
        }
        let period = period.ok_or(NoPitchFound)?;

        // --- Step 4: Parabolic interpolation for sub-sample precision ---
        let (period_float, dip) = if period < half {
            parabolic_vertex(yin[period - 1], yin[period], yin[period + 1])
                .map(|(shift, value)| (period as f32 + shift, value))
                .unwrap_or((period as f32, yin[period]))
        } else {
            (period as f32, yin[period])
        };

        if period_float.is_nan() || period_float <= 0.0 {
            return Err(NoPitchFound);
        }

        self.range.accept(PitchEstimate {
            frequency: sample_rate as f32 / period_float,
            clarity: (1.0 - dip).clamp(0.0, 1.0),
        })
    }
}

impl PitchDetector for YinDetector {
    fn estimate(&mut self, window: &AudioWindow) -> Result<PitchEstimate, NoPitchFound> {
        self.detect(window.samples(), window.sample_rate())
    }
}

/// Refines a peak bin using the log magnitudes of its neighbours.
///
/// The true peak is first searched within [`PEAK_RADIUS`] bins of `coarse`.
fn refine_peak(magnitudes: &[f32], coarse: usize) -> f32 {
    let last = magnitudes.len() - 1;
    let start = coarse.saturating_sub(PEAK_RADIUS);
    let end = (coarse + PEAK_RADIUS).min(last);
    let peak = (start..=end)
        .max_by(|&a, &b| magnitudes[a].total_cmp(&magnitudes[b]))
        .unwrap_or(coarse);

    if peak == 0 || peak >= last {
        return peak as f32;
    }

    let y1 = magnitudes[peak - 1].max(MAGNITUDE_FLOOR).ln();
    let y2 = magnitudes[peak].max(MAGNITUDE_FLOOR).ln();
    let y3 = magnitudes[peak + 1].max(MAGNITUDE_FLOOR).ln();

    match parabolic_vertex(y1, y2, y3) {
        Some((shift, _)) if shift.abs() <= 1.0 => peak as f32 + shift,
        _ => peak as f32,
    }
}

/// Fraction of spectral energy within [`PEAK_RADIUS`] bins of the first
/// `harmonics` multiples of `fundamental_bin`.
fn harmonic_energy_ratio(magnitudes: &[f32], fundamental_bin: f32, harmonics: usize) -> f32 {
    let mut total = 0.0;
    let mut harmonic = 0.0;
    for (bin, &magnitude) in magnitudes.iter().enumerate().skip(1) {
        let energy = magnitude * magnitude;
        total += energy;
        let n = (bin as f32 / fundamental_bin).round();
        if n >= 1.0
            && n <= harmonics as f32
            && (bin as f32 - n * fundamental_bin).abs() <= PEAK_RADIUS as f32
        {
            harmonic += energy;
        }
    }
    if total > 0.0 {
        (harmonic / total).clamp(0.0, 1.0)
    } else {
        0.0
    }
}

/// Bins a spectral search may cover, clamped to `1..=max_bin`.
fn search_bins(
    range: FrequencyRange,
    fft_size: usize,
    sample_rate: u32,
    max_bin: usize,
) -> (usize, usize) {
    let lo = (frequency_to_bin(range.min_hz, fft_size, sample_rate).floor() as usize).max(1);
    let hi = (frequency_to_bin(range.max_hz, fft_size, sample_rate).ceil() as usize).min(max_bin);
    (lo, hi)
}

/// Harmonic product spectrum detector.
#[derive(Debug)]
pub struct HpsDetector {
    spectrum: SpectrumAnalyzer,
    range: FrequencyRange,
}

impl HpsDetector {
    pub fn new(window_size: usize, range: FrequencyRange) -> Self {
        Self {
            spectrum: SpectrumAnalyzer::new(window_size),
            range,
        }
    }

    pub fn detect(
        &mut self,
        signal: &[f32],
        sample_rate: u32,
    ) -> Result<PitchEstimate, NoPitchFound> {
        let fft_size = signal.len();
        if fft_size < 4 || sample_rate == 0 {
            return Err(NoPitchFound);
        }
        let magnitudes = self.spectrum.magnitudes(signal);
        let max_magnitude = magnitudes.iter().copied().fold(0.0_f32, f32::max);
        if max_magnitude.is_nan() || max_magnitude <= 0.0 {
            return Err(NoPitchFound);
        }

        // Every candidate needs all of its harmonics below Nyquist.
        let max_bin = (magnitudes.len() - 1) / HPS_HARMONICS;
        let (lo, hi) = search_bins(self.range, fft_size, sample_rate, max_bin);

        // Summing logs keeps the product of five magnitudes in range.
        let min_magnitude = max_magnitude * HPS_MIN_RELATIVE_MAGNITUDE;
        let coarse = (lo..=hi)
            .filter(|&k| magnitudes[k] >= min_magnitude)
            .map(|k| {
                let score: f32 = (1..=HPS_HARMONICS)
                    .map(|h| magnitudes[k * h].max(MAGNITUDE_FLOOR).ln())
                    .sum();
                (k, score)
            })
            .max_by(|a, b| a.1.total_cmp(&b.1))
            .map(|(k, _)| k)
            .ok_or(NoPitchFound)?;

        let bin = refine_peak(magnitudes, coarse);
        let clarity = harmonic_energy_ratio(magnitudes, bin, HPS_HARMONICS);
        if clarity < MIN_SPECTRAL_CLARITY {
            return Err(NoPitchFound);
        }

        self.range.accept(PitchEstimate {
            frequency: bin_to_frequency(bin, fft_size, sample_rate),
            clarity,
        })
    }
}

impl PitchDetector for HpsDetector {
    fn estimate(&mut self, window: &AudioWindow) -> Result<PitchEstimate, NoPitchFound> {
        self.detect(window.samples(), window.sample_rate())
    }
}

/// Loudest-bin detector with quadratic interpolation.
#[derive(Debug)]
pub struct QuadraticPeakDetector {
    spectrum: SpectrumAnalyzer,
    range: FrequencyRange,
}

impl QuadraticPeakDetector {
    pub fn new(window_size: usize, range: FrequencyRange) -> Self {
        Self {
            spectrum: SpectrumAnalyzer::new(window_size),
            range,
        }
    }

    pub fn detect(
        &mut self,
        signal: &[f32],
        sample_rate: u32,
    ) -> Result<PitchEstimate, NoPitchFound> {
        let fft_size = signal.len();
        if fft_size < 4 || sample_rate == 0 {
            return Err(NoPitchFound);
        }
        let magnitudes = self.spectrum.magnitudes(signal);
        let (lo, hi) = search_bins(self.range, fft_size, sample_rate, magnitudes.len() - 2);

        let coarse = (lo..=hi)
            .max_by(|&a, &b| magnitudes[a].total_cmp(&magnitudes[b]))
            .filter(|&k| magnitudes[k] > 0.0)
            .ok_or(NoPitchFound)?;

        let bin = refine_peak(magnitudes, coarse);
        let clarity = harmonic_energy_ratio(magnitudes, bin, 1);
        if clarity < MIN_SPECTRAL_CLARITY {
            return Err(NoPitchFound);
        }

        self.range.accept(PitchEstimate {
            frequency: bin_to_frequency(bin, fft_size, sample_rate),
            clarity,
        })
    }
}

impl PitchDetector for QuadraticPeakDetector {
    fn estimate(&mut self, window: &AudioWindow) -> Result<PitchEstimate, NoPitchFound> {
        self.detect(window.samples(), window.sample_rate())
    }
}

/// The configured estimation strategy.
#[derive(Debug)]
pub enum Estimator {
    Yin(YinDetector),
    Hps(HpsDetector),
    QuadraticPeak(QuadraticPeakDetector),
}

impl Estimator {
    /// Builds the strategy named by `config`. The config is assumed valid.
    pub fn from_config(config: &EngineConfig) -> Self {
        let range = FrequencyRange::new(config.min_frequency_hz, config.max_frequency_hz);
        match config.strategy {
            EstimationStrategy::Yin => Self::Yin(YinDetector::new(config.yin_threshold, range)),
            EstimationStrategy::Hps => Self::Hps(HpsDetector::new(config.window_size, range)),
            EstimationStrategy::QuadraticPeak => {
                Self::QuadraticPeak(QuadraticPeakDetector::new(config.window_size, range))
            }
        }
    }

    pub fn strategy(&self) -> EstimationStrategy {
        match self {
            Self::Yin(_) => EstimationStrategy::Yin,
            Self::Hps(_) => EstimationStrategy::Hps,
            Self::QuadraticPeak(_) => EstimationStrategy::QuadraticPeak,
        }
    }
}

impl PitchDetector for Estimator {
    fn estimate(&mut self, window: &AudioWindow) -> Result<PitchEstimate, NoPitchFound> {
        match self {
            Self::Yin(detector) => detector.estimate(window),
            Self::Hps(detector) => detector.estimate(window),
            Self::QuadraticPeak(detector) => detector.estimate(window),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE_RATE: u32 = 44_100;
    const WINDOW: usize = 2048;

    fn tone(partials: &[(f32, f32)], len: usize) -> AudioWindow {
        let samples: Vec<f32> = (0..len)
            .map(|i| {
                let t = i as f32 / SAMPLE_RATE as f32;
                partials
                    .iter()
                    .map(|&(f, a)| a * (2.0 * std::f32::consts::PI * f * t).sin())
                    .sum::<f32>()
            })
            .collect();
        AudioWindow::new(samples, SAMPLE_RATE)
    }

    fn sine(frequency: f32) -> AudioWindow {
        tone(&[(frequency, 0.8)], WINDOW)
    }

    /// Deterministic white noise in [-0.5, 0.5).
    fn noise(len: usize) -> AudioWindow {
        let mut state: u32 = 0x1234_5678;
        let samples: Vec<f32> = (0..len)
            .map(|_| {
                state ^= state << 13;
                state ^= state >> 17;
                state ^= state << 5;
                state as f32 / u32::MAX as f32 - 0.5
            })
            .collect();
        AudioWindow::new(samples, SAMPLE_RATE)
    }

    fn config(strategy: EstimationStrategy) -> EngineConfig {
        EngineConfig {
            strategy,
            ..Default::default()
        }
    }

    fn assert_close(actual: f32, expected: f32, tolerance: f32) {
        let error = (actual - expected).abs() / expected;
        assert!(
            error <= tolerance,
            "expected {expected} Hz, got {actual} Hz ({:.3}% off)",
            error * 100.0
        );
    }

    #[test]
    fn yin_tracks_sines_across_the_range() {
        let mut estimator = Estimator::from_config(&config(EstimationStrategy::Yin));
        for frequency in [82.41, 110.0, 196.0, 329.63, 440.0, 880.0, 1760.0] {
            let estimate = estimator.estimate(&sine(frequency)).unwrap();
            assert_close(estimate.frequency, frequency, 0.005);
            assert!(estimate.clarity > 0.9, "clarity {} at {frequency}", estimate.clarity);
        }
    }

    #[test]
    fn yin_finds_fundamental_of_harmonic_tone() {
        let mut yin = YinDetector::new(0.1, FrequencyRange::new(20.0, 4200.0));
        let window = tone(&[(146.83, 0.4), (293.66, 0.6), (440.49, 0.3)], WINDOW);
        let estimate = yin.estimate(&window).unwrap();
        assert_close(estimate.frequency, 146.83, 0.005);
    }

    #[test]
    fn silence_has_no_pitch() {
        let silence = AudioWindow::new(vec![0.0; WINDOW], SAMPLE_RATE);
        for strategy in [
            EstimationStrategy::Yin,
            EstimationStrategy::Hps,
            EstimationStrategy::QuadraticPeak,
        ] {
            let mut estimator = Estimator::from_config(&config(strategy));
            assert_eq!(estimator.estimate(&silence), Err(NoPitchFound), "{strategy:?}");
        }
    }

    #[test]
    fn noise_has_no_pitch() {
        let mut yin = Estimator::from_config(&config(EstimationStrategy::Yin));
        assert_eq!(yin.estimate(&noise(WINDOW)), Err(NoPitchFound));

        let mut hps = Estimator::from_config(&config(EstimationStrategy::Hps));
        assert_eq!(hps.estimate(&noise(WINDOW)), Err(NoPitchFound));
    }

    #[test]
    fn pitch_below_detectable_range_is_not_found() {
        // Below sample_rate / (W / 2) the window holds less than two periods.
        let mut yin = YinDetector::new(0.1, FrequencyRange::new(20.0, 4200.0));
        let window = tone(&[(30.0, 0.8)], WINDOW);
        assert_eq!(yin.estimate(&window), Err(NoPitchFound));
    }

    #[test]
    fn estimates_outside_configured_range_are_rejected() {
        let mut yin = YinDetector::new(0.1, FrequencyRange::new(20.0, 300.0));
        assert_eq!(yin.estimate(&sine(440.0)), Err(NoPitchFound));
        assert!(yin.estimate(&sine(220.0)).is_ok());
    }

    #[test]
    fn degenerate_windows_are_not_errors() {
        let mut yin = YinDetector::new(0.1, FrequencyRange::new(20.0, 4200.0));
        assert_eq!(yin.detect(&[], SAMPLE_RATE), Err(NoPitchFound));
        assert_eq!(yin.detect(&[0.5; 4], SAMPLE_RATE), Err(NoPitchFound));
        assert_eq!(yin.detect(&[0.5; 64], 0), Err(NoPitchFound));
    }

    #[test]
    fn hps_finds_fundamental_under_louder_overtone() {
        let mut hps = Estimator::from_config(&config(EstimationStrategy::Hps));
        let window = tone(&[(220.0, 0.3), (440.0, 0.6), (660.0, 0.3), (880.0, 0.2)], WINDOW);
        let estimate = hps.estimate(&window).unwrap();
        assert_close(estimate.frequency, 220.0, 0.02);
        assert!(estimate.clarity > 0.9);
    }

    #[test]
    fn quadratic_peak_tracks_sine() {
        let mut peak = Estimator::from_config(&config(EstimationStrategy::QuadraticPeak));
        for frequency in [261.63, 440.0, 1046.5] {
            let estimate = peak.estimate(&sine(frequency)).unwrap();
            assert_close(estimate.frequency, frequency, 0.02);
            assert!(estimate.clarity > 0.9);
        }
    }

    #[test]
    fn estimator_reports_its_strategy() {
        for strategy in [
            EstimationStrategy::Yin,
            EstimationStrategy::Hps,
            EstimationStrategy::QuadraticPeak,
        ] {
            assert_eq!(Estimator::from_config(&config(strategy)).strategy(), strategy);
        }
    }

    #[test]
    fn parabolic_vertex_finds_minimum() {
        // y = (x - 0.25)^2 sampled at -1, 0, 1.
        let (shift, value) = parabolic_vertex(1.5625, 0.0625, 0.5625).unwrap();
        assert!((shift - 0.25).abs() < 1e-6);
        assert!(value.abs() < 1e-6);
        assert!(parabolic_vertex(1.0, 1.0, 1.0).is_none());
    }
}
