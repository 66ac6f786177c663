//! # Level Gate Module
//!
//! Measures window loudness in dBFS and decides whether a window is loud
//! enough to be worth estimating. Gating the noise floor saves the
//! estimator's work and keeps it from reporting pitches in room noise.

use crate::window::AudioWindow;

/// Floor for silent windows, so a zero RMS never becomes `-inf`.
pub const MIN_LEVEL_DB: f32 = -160.0;

/// Root mean square of a signal. Empty signals have zero RMS.
pub fn rms(signal: &[f32]) -> f32 {
    if signal.is_empty() {
        return 0.0;
    }
    (signal.iter().map(|&s| s * s).sum::<f32>() / signal.len() as f32).sqrt()
}

/// Converts a linear amplitude to dBFS, floored at [`MIN_LEVEL_DB`].
pub fn amplitude_to_db(amplitude: f32) -> f32 {
    if amplitude.is_nan() || amplitude <= 0.0 {
        return MIN_LEVEL_DB;
    }
    (20.0 * amplitude.log10()).max(MIN_LEVEL_DB)
}

/// RMS level of a window in dBFS.
pub fn level_db(window: &AudioWindow) -> f32 {
    amplitude_to_db(rms(window.samples()))
}

/// Absolute peak of a window in dBFS.
pub fn peak_db(window: &AudioWindow) -> f32 {
    let peak = window
        .samples()
        .iter()
        .fold(0.0_f32, |peak, &s| peak.max(s.abs()));
    amplitude_to_db(peak)
}

pub fn should_process(level_db: f32, threshold_db: f32) -> bool {
    level_db >= threshold_db
}

/// Level gate with a fixed threshold.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LevelGate {
    threshold_db: f32,
}

impl LevelGate {
    pub fn new(threshold_db: f32) -> Self {
        Self { threshold_db }
    }

    pub fn threshold_db(&self) -> f32 {
        self.threshold_db
    }

    pub fn level(&self, window: &AudioWindow) -> f32 {
        level_db(window)
    }

    pub fn should_process(&self, level_db: f32) -> bool {
        should_process(level_db, self.threshold_db)
    }
}
