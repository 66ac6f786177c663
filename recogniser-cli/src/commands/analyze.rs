//! Offline analysis of WAV files.

use anyhow::{Context, Result, bail};
use clap::Args;
use recogniser_core::{Analyzer, EngineConfig, EngineEvent, FrameBuffer};
use std::path::{Path, PathBuf};
use tracing::info;

use super::{StrategyArg, apply_overrides, load_config};
use crate::output::{Format, format_event};

#[derive(Args)]
pub struct AnalyzeArgs {
    /// Input WAV file
    #[arg(value_name = "INPUT")]
    input: PathBuf,

    /// Engine config file (JSON)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Level threshold in dBFS
    #[arg(long, allow_hyphen_values = true)]
    threshold_db: Option<f32>,

    /// Pitch estimation strategy
    #[arg(long, value_enum)]
    strategy: Option<StrategyArg>,

    /// Also print windows below the level threshold
    #[arg(long)]
    show_quiet: bool,
}

/// An event and the time of its window's first sample.
#[derive(Debug, Clone, PartialEq)]
pub struct TimedEvent {
    pub seconds: f64,
    pub event: EngineEvent,
}

pub fn run(args: AnalyzeArgs, format: Format) -> Result<()> {
    let config = apply_overrides(
        load_config(args.config.as_deref())?,
        args.threshold_db,
        args.strategy,
    )?;
    let events = analyze_file(&args.input, config)?;
    info!("[ANALYZE] {} events from {}", events.len(), args.input.display());

    for timed in events {
        if !args.show_quiet && matches!(timed.event, EngineEvent::BelowThreshold { .. }) {
            continue;
        }
        match format {
            Format::Json => println!("{}", format_event(&timed.event, format)),
            Format::Text => {
                let line = format_event(&timed.event, format);
                println!("{:>8.3}s  {}", timed.seconds, line)
            }
        }
    }
    Ok(())
}

/// Reads the first channel of a WAV file as floats in [-1, 1].
pub fn read_wav_mono(path: &Path) -> Result<(Vec<f32>, u32)> {
    let mut reader = hound::WavReader::open(path)
        .with_context(|| format!("failed to open {}", path.display()))?;
    let spec = reader.spec();
    let channels = spec.channels as usize;
    if channels == 0 {
        bail!("{} has no channels", path.display());
    }

    let interleaved: Vec<f32> = match spec.sample_format {
        hound::SampleFormat::Float => reader
            .samples::<f32>()
            .collect::<Result<_, _>>()
            .context("failed to read float samples")?,
        hound::SampleFormat::Int => {
            let scale = 1.0 / (1_i64 << (spec.bits_per_sample - 1)) as f32;
            reader
                .samples::<i32>()
                .map(|s| s.map(|s| s as f32 * scale))
                .collect::<Result<_, _>>()
                .context("failed to read integer samples")?
        }
    };

    let mono = interleaved.into_iter().step_by(channels).collect();
    Ok((mono, spec.sample_rate))
}

/// Runs a WAV file through the analyzer. The file's sample rate replaces
/// the configured one.
pub fn analyze_file(path: &Path, config: EngineConfig) -> Result<Vec<TimedEvent>> {
    let (samples, sample_rate) = read_wav_mono(path)?;
    let config = EngineConfig {
        sample_rate,
        ..config
    };
    let mut analyzer = Analyzer::new(&config).context("invalid engine configuration")?;
    let mut frames = FrameBuffer::new(config.window_size, config.hop_size, sample_rate)?;

    let mut events = Vec::new();
    let mut window_index = 0_u64;
    frames.push(&samples, |window| {
        let seconds = (window_index * config.hop_size as u64) as f64 / sample_rate as f64;
        window_index += 1;
        if let Some(event) = analyzer.analyze(&window) {
            events.push(TimedEvent { seconds, event });
        }
    });
    Ok(events)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_wav(path: &Path, channels: u16, frames: &[f32]) {
        let spec = hound::WavSpec {
            channels,
            sample_rate: 44_100,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut writer = hound::WavWriter::create(path, spec).unwrap();
        for &sample in frames {
            for _ in 0..channels {
                writer.write_sample((sample * i16::MAX as f32) as i16).unwrap();
            }
        }
        writer.finalize().unwrap();
    }

    fn tone(frequency: f32, len: usize) -> Vec<f32> {
        (0..len)
            .map(|i| 0.5 * (2.0 * std::f32::consts::PI * frequency * i as f32 / 44_100.0).sin())
            .collect()
    }

    #[test]
    fn stereo_file_is_reduced_to_first_channel() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("stereo.wav");
        write_wav(&path, 2, &tone(440.0, 1000));

        let (samples, sample_rate) = read_wav_mono(&path).unwrap();
        assert_eq!(sample_rate, 44_100);
        assert_eq!(samples.len(), 1000);
        assert!(samples.iter().all(|s| s.abs() <= 0.51));
    }

    #[test]
    fn tone_then_silence_is_timed() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tone.wav");
        let mut frames = tone(329.63, 8192);
        frames.extend(std::iter::repeat_n(0.0, 8192));
        write_wav(&path, 1, &frames);

        let config = EngineConfig {
            hop_size: 2048,
            ..Default::default()
        };
        let events = analyze_file(&path, config).unwrap();
        assert_eq!(events.len(), 8);

        for timed in &events[..4] {
            match &timed.event {
                EngineEvent::PitchDetected(pitch) => assert_eq!(pitch.note.to_string(), "E4"),
                other => panic!("expected a pitch, got {other:?}"),
            }
        }
        for timed in &events[4..] {
            assert!(matches!(timed.event, EngineEvent::BelowThreshold { .. }));
        }
        assert_eq!(events[1].seconds, 2048.0 / 44_100.0);
    }

    #[test]
    fn missing_file_is_an_error() {
        let result = analyze_file(Path::new("/no/such/file.wav"), EngineConfig::default());
        assert!(result.is_err());
    }
}
