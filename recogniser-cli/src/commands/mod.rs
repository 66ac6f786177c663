//! Subcommand implementations.

pub mod analyze;
pub mod listen;
pub mod note;

use anyhow::{Context, Result};
use clap::ValueEnum;
use recogniser_core::{EngineConfig, EstimationStrategy};
use std::path::Path;

/// Estimation strategy as accepted on the command line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum StrategyArg {
    Yin,
    Hps,
    QuadraticPeak,
}

impl From<StrategyArg> for EstimationStrategy {
    fn from(arg: StrategyArg) -> Self {
        match arg {
            StrategyArg::Yin => EstimationStrategy::Yin,
            StrategyArg::Hps => EstimationStrategy::Hps,
            StrategyArg::QuadraticPeak => EstimationStrategy::QuadraticPeak,
        }
    }
}

/// Loads the engine config from `path`, or the defaults when absent.
pub fn load_config(path: Option<&Path>) -> Result<EngineConfig> {
    match path {
        Some(path) => EngineConfig::from_json_file(path)
            .with_context(|| format!("failed to load config from {}", path.display())),
        None => Ok(EngineConfig::default()),
    }
}

/// Applies command-line overrides and re-validates.
pub fn apply_overrides(
    mut config: EngineConfig,
    threshold_db: Option<f32>,
    strategy: Option<StrategyArg>,
) -> Result<EngineConfig> {
    if let Some(threshold_db) = threshold_db {
        config.level_threshold_db = threshold_db;
    }
    if let Some(strategy) = strategy {
        config.strategy = strategy.into();
    }
    config.validate().context("invalid engine configuration")?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn missing_path_gives_defaults() {
        assert_eq!(load_config(None).unwrap(), EngineConfig::default());
    }

    #[test]
    fn config_file_is_loaded() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{ "reference_frequency_hz": 442.0, "strategy": "hps" }}"#).unwrap();

        let config = load_config(Some(file.path())).unwrap();
        assert_eq!(config.reference_frequency_hz, 442.0);
        assert_eq!(config.strategy, EstimationStrategy::Hps);
    }

    #[test]
    fn bad_config_file_reports_path() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{ "window_size": 3 }}"#).unwrap();

        let err = load_config(Some(file.path())).unwrap_err();
        assert!(format!("{err:#}").contains("window size"), "{err:#}");
    }

    #[test]
    fn overrides_are_validated() {
        let config = apply_overrides(
            EngineConfig::default(),
            Some(-45.0),
            Some(StrategyArg::QuadraticPeak),
        )
        .unwrap();
        assert_eq!(config.level_threshold_db, -45.0);
        assert_eq!(config.strategy, EstimationStrategy::QuadraticPeak);

        assert!(apply_overrides(EngineConfig::default(), Some(3.0), None).is_err());
    }
}
