//! # Window Analysis Module
//!
//! The per-window pipeline shared by the live engine and offline analysis:
//! level gate, then pitch estimation, then note mapping.

use tracing::trace;

use crate::config::EngineConfig;
use crate::engine::EngineEvent;
use crate::error::ConfigError;
use crate::level::LevelGate;
use crate::pitch::{Estimator, PitchDetector};
use crate::tuning::{NoteMapper, TunedPitch};
use crate::window::AudioWindow;

/// Runs one window at a time through the gate, estimator and mapper.
#[derive(Debug)]
pub struct Analyzer {
    gate: LevelGate,
    estimator: Estimator,
    mapper: NoteMapper,
}

impl Analyzer {
    /// Validates `config` and builds the pipeline it describes.
    pub fn new(config: &EngineConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self::from_validated(config))
    }

    pub(crate) fn from_validated(config: &EngineConfig) -> Self {
        Self {
            gate: LevelGate::new(config.level_threshold_db),
            estimator: Estimator::from_config(config),
            mapper: NoteMapper::new(config.reference_frequency_hz)
                .unwrap_or_default(),
        }
    }

    /// Analyses one window.
    ///
    /// Returns `None` when the window is loud enough but holds no pitch;
    /// that is an ordinary outcome, not an error.
    pub fn analyze(&mut self, window: &AudioWindow) -> Option<EngineEvent> {
        let level_db = self.gate.level(window);
        if !self.gate.should_process(level_db) {
            return Some(EngineEvent::BelowThreshold { level_db });
        }

        let estimate = match self.estimator.estimate(window) {
            Ok(estimate) => estimate,
            Err(_) => {
                trace!(level_db, "[ANALYZER] no pitch in window");
                return None;
            }
        };
        let (note, offset) = self.mapper.map(estimate.frequency).ok()?;

        Some(EngineEvent::PitchDetected(TunedPitch {
            estimate,
            note,
            offset,
            level_db,
        }))
    }

    pub fn estimator(&self) -> &Estimator {
        &self.estimator
    }

    pub fn mapper(&self) -> &NoteMapper {
        &self.mapper
    }
}
