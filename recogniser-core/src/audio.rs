//! # Audio Capture Module
//!
//! Live microphone capture using CPAL (Cross-Platform Audio Library). The
//! capture callback feeds a [`SampleInput`]; stream errors are reported to
//! the engine, which turns them into `EngineError` events.
//!
//! ## Features
//! - Default input device selection
//! - Requested sample rate, 32-bit float samples
//! - Multichannel devices are downmixed to mono in the callback

use anyhow::{Context, Result, anyhow};
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::SupportedStreamConfigRange;
use tracing::{error, info};

use crate::engine::SampleInput;
use crate::error::CaptureError;

/// A running capture stream. Capture stops when this is dropped.
pub struct Capture {
    stream: cpal::Stream,
    device_name: String,
    sample_rate: u32,
    channels: u16,
}

impl Capture {
    pub fn device_name(&self) -> &str {
        &self.device_name
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn channels(&self) -> u16 {
        self.channels
    }

    /// Pauses the device stream; dropping the capture releases it.
    pub fn pause(&self) -> Result<()> {
        self.stream.pause().context("failed to pause input stream")
    }
}

/// Starts capturing from the default input device into `input`.
///
/// Multichannel input is downmixed to mono in the callback. Stream errors
/// are forwarded to the engine as capture errors.
///
/// # Arguments
/// * `input` - Producer side of the engine; moved into the stream callback
/// * `sample_rate` - Rate the device must support; has to match the rate the
///   engine was configured with
///
/// # Returns
/// * `Ok(Capture)` - The playing stream; capture stops when it is dropped
/// * `Err` - No input device, no f32 config at `sample_rate`, or the stream
///   could not be built or started
pub fn start_capture(mut input: SampleInput, sample_rate: u32) -> Result<Capture> {
    let host = cpal::default_host();
    let device = host
        .default_input_device()
        .ok_or_else(|| anyhow!(CaptureError::DeviceUnavailable("no default input device".into())))?;

    let device_name = device.name().unwrap_or_else(|_| "unknown device".to_string());
    info!("[CAPTURE] using audio input device: {}", device_name);

    let configs = device
        .supported_input_configs()
        .context("failed to query input configurations")?
        .collect::<Vec<_>>();
    let supported_config = find_supported_config(configs, sample_rate).ok_or_else(|| {
        anyhow!(CaptureError::UnsupportedFormat(format!(
            "no f32 input format at {sample_rate} Hz"
        )))
    })?;

    let config = supported_config.with_sample_rate(cpal::SampleRate(sample_rate));
    let channels = config.channels();
    let config: cpal::StreamConfig = config.into();
    info!("[CAPTURE] {} Hz, {} channel(s)", sample_rate, channels);

    let reporter = input.error_reporter();
    let err_fn = move |err: cpal::StreamError| {
        error!("[CAPTURE] an error occurred on the audio stream: {}", err);
        reporter.report(CaptureError::StreamFailed(err.to_string()));
    };

    // Reused across callbacks for the downmix.
    let mut mono = Vec::new();
    let stream = device.build_input_stream(
        &config,
        move |data: &[f32], _: &cpal::InputCallbackInfo| {
            if channels == 1 {
                input.push(data);
            } else {
                downmix(data, channels as usize, &mut mono);
                input.push(&mono);
            }
        },
        err_fn,
        None,
    )?;

    stream.play().context("failed to start input stream")?;

    Ok(Capture {
        stream,
        device_name,
        sample_rate,
        channels,
    })
}

/// Averages interleaved frames into `out`.
fn downmix(interleaved: &[f32], channels: usize, out: &mut Vec<f32>) {
    out.clear();
    out.extend(
        interleaved
            .chunks_exact(channels)
            .map(|frame| frame.iter().sum::<f32>() / channels as f32),
    );
}

/// Picks an f32 configuration that supports `target_rate`, preferring the
/// fewest channels.
fn find_supported_config(
    configs: Vec<SupportedStreamConfigRange>,
    target_rate: u32,
) -> Option<SupportedStreamConfigRange> {
    configs
        .into_iter()
        .filter(|c| c.sample_format() == cpal::SampleFormat::F32)
        .filter(|c| c.min_sample_rate().0 <= target_rate && target_rate <= c.max_sample_rate().0)
        .min_by_key(|c| c.channels())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn downmix_averages_frames() {
        let mut out = Vec::new();
        downmix(&[1.0, 0.0, 0.5, 0.5, -1.0, 1.0], 2, &mut out);
        assert_eq!(out, vec![0.5, 0.5, 0.0]);
    }

    #[test]
    fn config_selection_prefers_mono_at_target_rate() {
        use cpal::{SampleFormat, SampleRate, SupportedBufferSize};

        let range = |channels, min, max, format| {
            SupportedStreamConfigRange::new(
                channels,
                SampleRate(min),
                SampleRate(max),
                SupportedBufferSize::Unknown,
                format,
            )
        };
        let configs = vec![
            range(2, 8_000, 96_000, SampleFormat::F32),
            range(1, 8_000, 96_000, SampleFormat::I16),
            range(1, 48_000, 48_000, SampleFormat::F32),
            range(1, 8_000, 48_000, SampleFormat::F32),
        ];

        let chosen = find_supported_config(configs.clone(), 44_100).unwrap();
        assert_eq!(chosen.channels(), 1);
        assert_eq!(chosen.sample_format(), SampleFormat::F32);
        assert_eq!(chosen.min_sample_rate().0, 8_000);

        assert!(find_supported_config(configs, 192_000).is_none());
    }
}
