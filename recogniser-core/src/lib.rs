// recogniser-core/src/lib.rs

//! The core logic for the pitch recogniser.
//! This crate is responsible for windowing, pitch estimation, note mapping
//! and the real-time engine that ties them together. It is completely
//! headless; hosts consume its event stream.

pub mod analyzer;
#[cfg(feature = "capture")]
pub mod audio;
pub mod config;
pub mod engine;
pub mod error;
pub mod fft;
pub mod level;
pub mod pitch;
pub mod tuning;
pub mod window;

pub use analyzer::Analyzer;
pub use config::{EngineConfig, EstimationStrategy};
pub use engine::{EngineEvent, EngineState, ErrorReporter, PitchEngine, SampleInput};
pub use error::{CaptureError, ConfigError, EngineError, NoPitchFound, NoteError};
pub use pitch::{Estimator, PitchDetector, PitchEstimate};
pub use tuning::{Note, NoteMapper, Offset, TunedPitch, TuningAccuracy};
pub use window::{AudioWindow, FrameBuffer};
