//! # Frame Buffer Module
//!
//! Turns the continuous sample stream from the capture callback into
//! fixed-size analysis windows. Windows overlap when the hop is shorter than
//! the window; trailing samples that do not yet fill a window are kept for
//! the next push.

use crate::error::ConfigError;

/// One analysis window. Immutable once built.
#[derive(Debug, Clone, PartialEq)]
pub struct AudioWindow {
    samples: Box<[f32]>,
    sample_rate: u32,
}

impl AudioWindow {
    pub fn new(samples: impl Into<Box<[f32]>>, sample_rate: u32) -> Self {
        Self {
            samples: samples.into(),
            sample_rate,
        }
    }

    pub fn samples(&self) -> &[f32] {
        &self.samples
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}

/// Rolling sample buffer that emits hop-spaced windows.
///
/// Not safe for concurrent pushes; the single capture callback owns it.
#[derive(Debug)]
pub struct FrameBuffer {
    buffer: Vec<f32>,
    window_size: usize,
    hop_size: usize,
    sample_rate: u32,
}

impl FrameBuffer {
    /// Builds an empty buffer. `window_size` must be non-zero and
    /// `hop_size` in `1..=window_size`.
    pub fn new(window_size: usize, hop_size: usize, sample_rate: u32) -> Result<Self, ConfigError> {
        if window_size == 0 {
            return Err(ConfigError::InvalidWindowSize(window_size));
        }
        if hop_size == 0 || hop_size > window_size {
            return Err(ConfigError::InvalidHopSize {
                hop_size,
                window_size,
            });
        }
        Ok(Self {
            buffer: Vec::with_capacity(window_size * 2),
            window_size,
            hop_size,
            sample_rate,
        })
    }

    /// Appends `samples` and calls `on_window` for every window that is now
    /// complete, in stream order.
    pub fn push<F>(&mut self, samples: &[f32], mut on_window: F)
    where
        F: FnMut(AudioWindow),
    {
        self.buffer.extend_from_slice(samples);

        let mut start = 0;
        while self.buffer.len() - start >= self.window_size {
            let frame = &self.buffer[start..start + self.window_size];
            on_window(AudioWindow::new(frame, self.sample_rate));
            start += self.hop_size;
        }

        // Remove the consumed hops from the front of the buffer.
        if start > 0 {
            self.buffer.drain(..start);
        }
    }

    /// Samples waiting for the next window.
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    pub fn reset(&mut self) {
        self.buffer.clear();
    }

    pub fn window_size(&self) -> usize {
        self.window_size
    }

    pub fn hop_size(&self) -> usize {
        self.hop_size
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ramp(len: usize) -> Vec<f32> {
        (0..len).map(|i| i as f32).collect()
    }

    fn collect(buffer: &mut FrameBuffer, samples: &[f32]) -> Vec<AudioWindow> {
        let mut windows = Vec::new();
        buffer.push(samples, |w| windows.push(w));
        windows
    }

    #[test]
    fn half_hop_emits_three_windows_from_two_window_lengths() {
        let mut buffer = FrameBuffer::new(2048, 1024, 44_100).unwrap();
        let windows = collect(&mut buffer, &ramp(4096));

        assert_eq!(windows.len(), 3);
        for (i, window) in windows.iter().enumerate() {
            assert_eq!(window.len(), 2048);
            assert_eq!(window.samples()[0], (i * 1024) as f32);
            assert_eq!(window.sample_rate(), 44_100);
        }
        // The last hop's tail waits for more samples.
        assert_eq!(buffer.buffered(), 1024);
    }

    #[test]
    fn trailing_partial_data_completes_on_next_push() {
        let mut buffer = FrameBuffer::new(2048, 1024, 44_100).unwrap();
        let samples = ramp(5120);
        assert_eq!(collect(&mut buffer, &samples[..4096]).len(), 3);

        let windows = collect(&mut buffer, &samples[4096..]);
        assert_eq!(windows.len(), 1);
        assert_eq!(windows[0].samples()[0], 3072.0);
    }

    #[test]
    fn equal_hop_and_window_do_not_overlap() {
        let mut buffer = FrameBuffer::new(256, 256, 8_000).unwrap();
        let samples = ramp(1000);
        let windows = collect(&mut buffer, &samples);

        assert_eq!(windows.len(), 3);
        let flattened: Vec<f32> = windows
            .iter()
            .flat_map(|w| w.samples().iter().copied())
            .collect();
        assert_eq!(flattened, samples[..768]);
        assert_eq!(buffer.buffered(), 1000 - 768);
    }

    #[test]
    fn small_pushes_accumulate() {
        let mut buffer = FrameBuffer::new(64, 32, 8_000).unwrap();
        let mut count = 0;
        for chunk in ramp(256).chunks(10) {
            buffer.push(chunk, |_| count += 1);
        }
        // Windows start at 0, 32, ..., 192.
        assert_eq!(count, 7);
    }

    #[test]
    fn hop_outside_window_is_rejected() {
        assert!(matches!(
            FrameBuffer::new(64, 0, 8_000),
            Err(ConfigError::InvalidHopSize { hop_size: 0, .. })
        ));
        assert!(matches!(
            FrameBuffer::new(64, 65, 8_000),
            Err(ConfigError::InvalidHopSize { hop_size: 65, .. })
        ));
        assert!(matches!(
            FrameBuffer::new(0, 0, 8_000),
            Err(ConfigError::InvalidWindowSize(0))
        ));
    }

    #[test]
    fn reset_discards_buffered_samples() {
        let mut buffer = FrameBuffer::new(64, 32, 8_000).unwrap();
        assert!(collect(&mut buffer, &ramp(40)).is_empty());
        buffer.reset();
        assert_eq!(buffer.buffered(), 0);
        assert!(collect(&mut buffer, &ramp(40)).is_empty());
    }
}
