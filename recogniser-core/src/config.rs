//! # Engine Configuration
//!
//! The single explicit configuration surface of the engine. A config is
//! validated once, when an engine or analyzer is built from it, and is never
//! mutated afterwards.
//!
//! Configs can be loaded from JSON; any field left out takes its default.
//!
//! ```json
//! { "window_size": 4096, "hop_size": 1024, "strategy": "hps" }
//! ```

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::ConfigError;

/// Sample rate used when none is configured (CD quality).
pub const DEFAULT_SAMPLE_RATE: u32 = 44_100;
/// Analysis window length in samples (~46ms at 44.1kHz).
pub const DEFAULT_WINDOW_SIZE: usize = 2048;
/// Half-window hop, giving 50% overlap.
pub const DEFAULT_HOP_SIZE: usize = 1024;
/// Absolute threshold on the cumulative mean normalized difference.
pub const DEFAULT_YIN_THRESHOLD: f32 = 0.1;
/// Windows quieter than this are reported as below threshold.
pub const DEFAULT_LEVEL_THRESHOLD_DB: f32 = -30.0;
/// Concert pitch, A4.
pub const DEFAULT_REFERENCE_FREQUENCY_HZ: f32 = 440.0;
pub const DEFAULT_MIN_FREQUENCY_HZ: f32 = 20.0;
/// Just above C8, the top key of a piano.
pub const DEFAULT_MAX_FREQUENCY_HZ: f32 = 4200.0;
/// Windows waiting for analysis before the oldest is dropped.
pub const DEFAULT_QUEUE_CAPACITY: usize = 4;

/// Pitch estimation algorithm, selected at construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EstimationStrategy {
    /// Time-domain cumulative mean normalized difference.
    #[default]
    Yin,
    /// Harmonic product spectrum.
    Hps,
    /// Largest spectral peak with parabolic interpolation.
    QuadraticPeak,
}

/// Parameters of a pitch engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub sample_rate: u32,
    pub window_size: usize,
    pub hop_size: usize,
    pub yin_threshold: f32,
    pub level_threshold_db: f32,
    pub reference_frequency_hz: f32,
    pub strategy: EstimationStrategy,
    pub min_frequency_hz: f32,
    pub max_frequency_hz: f32,
    pub queue_capacity: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            sample_rate: DEFAULT_SAMPLE_RATE,
            window_size: DEFAULT_WINDOW_SIZE,
            hop_size: DEFAULT_HOP_SIZE,
            yin_threshold: DEFAULT_YIN_THRESHOLD,
            level_threshold_db: DEFAULT_LEVEL_THRESHOLD_DB,
            reference_frequency_hz: DEFAULT_REFERENCE_FREQUENCY_HZ,
            strategy: EstimationStrategy::default(),
            min_frequency_hz: DEFAULT_MIN_FREQUENCY_HZ,
            max_frequency_hz: DEFAULT_MAX_FREQUENCY_HZ,
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
        }
    }
}

impl EngineConfig {
    /// Checks every parameter, returning the first violation found.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.sample_rate == 0 {
            return Err(ConfigError::InvalidSampleRate(self.sample_rate));
        }
        // The YIN lag search covers 1..=W/2 and interpolates around the dip,
        // so the window needs an even length and room for three lags.
        if self.window_size < 4 || self.window_size % 2 != 0 {
            return Err(ConfigError::InvalidWindowSize(self.window_size));
        }
        if self.hop_size == 0 || self.hop_size > self.window_size {
            return Err(ConfigError::InvalidHopSize {
                hop_size: self.hop_size,
                window_size: self.window_size,
            });
        }
        if !(self.yin_threshold > 0.0 && self.yin_threshold < 1.0) {
            return Err(ConfigError::InvalidYinThreshold(self.yin_threshold));
        }
        if !self.level_threshold_db.is_finite() || self.level_threshold_db > 0.0 {
            return Err(ConfigError::InvalidLevelThreshold(self.level_threshold_db));
        }
        if !(self.reference_frequency_hz.is_finite() && self.reference_frequency_hz > 0.0) {
            return Err(ConfigError::InvalidReferenceFrequency(
                self.reference_frequency_hz,
            ));
        }
        let (min, max) = (self.min_frequency_hz, self.max_frequency_hz);
        if !(min.is_finite() && max.is_finite() && min > 0.0 && min < max) {
            return Err(ConfigError::InvalidFrequencyRange { min, max });
        }
        if self.queue_capacity == 0 {
            return Err(ConfigError::InvalidQueueCapacity);
        }
        Ok(())
    }

    /// Parses and validates a JSON config.
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Reads, parses and validates a JSON config file.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path).map_err(|source| ConfigError::ReadFile {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json_str(&json)
    }

    /// Lowest frequency the window can hold two periods of.
    pub fn min_detectable_frequency_hz(&self) -> f32 {
        self.sample_rate as f32 / (self.window_size / 2) as f32
    }
}
