//! # Error Types
//!
//! Errors surfaced by the pitch engine. Only configuration errors are fatal;
//! a missing pitch is an ordinary outcome and capture failures travel through
//! the event stream.

use serde::Serialize;
use std::path::PathBuf;
use thiserror::Error;

/// Invalid engine construction parameters.
///
/// Construction fails as a whole when any of these is returned; there is no
/// partially configured engine.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("sample rate must be positive, got {0}")]
    InvalidSampleRate(u32),

    #[error("window size must be an even number of at least 4 samples, got {0}")]
    InvalidWindowSize(usize),

    #[error("hop size must be in 1..={window_size}, got {hop_size}")]
    InvalidHopSize { hop_size: usize, window_size: usize },

    #[error("YIN threshold must be in (0, 1), got {0}")]
    InvalidYinThreshold(f32),

    #[error("level threshold must be a finite dBFS value <= 0, got {0}")]
    InvalidLevelThreshold(f32),

    #[error("reference frequency must be a positive number of Hz, got {0}")]
    InvalidReferenceFrequency(f32),

    #[error("frequency range must satisfy 0 < min < max, got {min} Hz..{max} Hz")]
    InvalidFrequencyRange { min: f32, max: f32 },

    #[error("window queue capacity must be at least 1")]
    InvalidQueueCapacity,

    #[error("failed to read config file '{path}': {source}")]
    ReadFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Failure reported by the host's capture device or stream.
///
/// Delivered to listeners as an `EngineError` event; the engine falls back
/// to idle and waits for an explicit restart.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize)]
#[serde(tag = "type", content = "message", rename_all = "snake_case")]
pub enum CaptureError {
    #[error("no input device available: {0}")]
    DeviceUnavailable(String),

    #[error("unsupported input format: {0}")]
    UnsupportedFormat(String),

    #[error("audio stream failed: {0}")]
    StreamFailed(String),
}

/// The estimator found no periodicity in the window.
///
/// Silence, noise and pitches outside the detectable range all end here.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("no pitch found")]
pub struct NoPitchFound;

/// Errors from the note API.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum NoteError {
    #[error("frequency must be a positive finite number of Hz, got {0}")]
    InvalidFrequency(f32),

    #[error("invalid note name {0:?}")]
    InvalidName(String),
}

/// Errors from engine lifecycle calls.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("failed to spawn analysis worker: {0}")]
    WorkerSpawn(#[source] std::io::Error),
}
