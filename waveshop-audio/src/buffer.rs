//! Immutable multichannel sample buffer
//!
//! Every transform in this crate takes a `&SampleBuffer` and returns a new
//! one; there is no API that writes into an existing buffer.

use crate::error::{AudioError, Result};

/// Multichannel floating-point PCM data
///
/// Invariants: at least one channel, every channel holds `frame_count`
/// samples, `sample_rate > 0`.
#[derive(Debug, Clone, PartialEq)]
pub struct SampleBuffer {
    channels: Vec<Vec<f32>>,
    sample_rate: u32,
    frame_count: usize,
}

impl SampleBuffer {
    /// Create a buffer from per-channel sample data
    pub fn new(channels: Vec<Vec<f32>>, sample_rate: u32) -> Result<Self> {
        if sample_rate == 0 {
            return Err(AudioError::invalid("sample_rate", "must be positive"));
        }
        let frame_count = channels.first().ok_or(AudioError::NoChannels)?.len();
        if let Some(bad) = channels.iter().find(|ch| ch.len() != frame_count) {
            return Err(AudioError::MismatchedLength {
                expected: frame_count,
                actual: bad.len(),
            });
        }
        Ok(Self {
            channels,
            sample_rate,
            frame_count,
        })
    }

    /// Single-channel buffer
    pub fn mono(samples: Vec<f32>, sample_rate: u32) -> Result<Self> {
        Self::new(vec![samples], sample_rate)
    }

    /// Buffer of zeros
    pub fn silent(channels: usize, frames: usize, sample_rate: u32) -> Result<Self> {
        Self::new(vec![vec![0.0; frames]; channels], sample_rate)
    }

    /// Deinterleave `L,R,L,R,...` style data
    pub fn from_interleaved(samples: &[f32], channels: usize, sample_rate: u32) -> Result<Self> {
        if channels == 0 {
            return Err(AudioError::NoChannels);
        }
        let frames = samples.len() / channels;
        let data = (0..channels)
            .map(|ch| {
                samples
                    .chunks_exact(channels)
                    .take(frames)
                    .map(|frame| frame[ch])
                    .collect()
            })
            .collect();
        Self::new(data, sample_rate)
    }

    /// Number of channels
    pub fn num_channels(&self) -> usize {
        self.channels.len()
    }

    /// Number of sample frames per channel
    pub fn frame_count(&self) -> usize {
        self.frame_count
    }

    /// Sample rate in Hz
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Duration in seconds
    pub fn duration_secs(&self) -> f64 {
        self.frame_count as f64 / self.sample_rate as f64
    }

    /// All channels
    pub fn channels(&self) -> &[Vec<f32>] {
        &self.channels
    }

    /// One channel by index
    pub fn channel(&self, index: usize) -> Result<&[f32]> {
        self.channels
            .get(index)
            .map(Vec::as_slice)
            .ok_or(AudioError::ChannelOutOfRange {
                index,
                channels: self.channels.len(),
            })
    }

    /// Consume the buffer and hand back its channel data
    pub fn into_channels(self) -> Vec<Vec<f32>> {
        self.channels
    }

    /// Interleave into `L,R,L,R,...` order
    pub fn to_interleaved(&self) -> Vec<f32> {
        let mut out = Vec::with_capacity(self.frame_count * self.channels.len());
        for frame in 0..self.frame_count {
            for channel in &self.channels {
                out.push(channel[frame]);
            }
        }
        out
    }

    /// Maximum absolute sample across all channels
    pub fn peak(&self) -> f32 {
        waveshop_analysis::peak(&self.channels)
    }

    /// Number of frames covering `secs` seconds (rounded to nearest)
    pub fn frames_for(&self, secs: f64) -> usize {
        secs_to_frames(secs, self.sample_rate)
    }

    /// New buffer with `f` applied to every sample
    pub fn map_samples<F: Fn(f32) -> f32>(&self, f: F) -> Self {
        Self {
            channels: self
                .channels
                .iter()
                .map(|ch| ch.iter().map(|&s| f(s)).collect())
                .collect(),
            sample_rate: self.sample_rate,
            frame_count: self.frame_count,
        }
    }

    /// New buffer with `f` applied to each channel (index, samples)
    ///
    /// `f` must return channels of equal length.
    pub fn map_channels<F: FnMut(usize, &[f32]) -> Vec<f32>>(&self, mut f: F) -> Result<Self> {
        let channels = self
            .channels
            .iter()
            .enumerate()
            .map(|(i, ch)| f(i, ch))
            .collect();
        Self::new(channels, self.sample_rate)
    }

    /// Check that two buffers can be combined sample by sample
    pub(crate) fn ensure_compatible(&self, other: &Self) -> Result<()> {
        if self.sample_rate != other.sample_rate {
            return Err(AudioError::SampleRateMismatch {
                left: self.sample_rate,
                right: other.sample_rate,
            });
        }
        if self.num_channels() != other.num_channels() {
            return Err(AudioError::MismatchedChannels {
                left: self.num_channels(),
                right: other.num_channels(),
            });
        }
        Ok(())
    }
}

/// Convert seconds to a frame count at `sample_rate` (rounded, never negative)
pub fn secs_to_frames(secs: f64, sample_rate: u32) -> usize {
    (secs.max(0.0) * sample_rate as f64).round() as usize
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_validates_shape() {
        assert!(SampleBuffer::new(vec![vec![0.0; 4], vec![0.0; 4]], 44100).is_ok());
        assert_eq!(
            SampleBuffer::new(vec![vec![0.0; 4], vec![0.0; 3]], 44100).unwrap_err(),
            AudioError::MismatchedLength {
                expected: 4,
                actual: 3
            }
        );
        assert_eq!(
            SampleBuffer::new(Vec::new(), 44100).unwrap_err(),
            AudioError::NoChannels
        );
        assert!(SampleBuffer::new(vec![vec![0.0; 4]], 0).is_err());
    }

    #[test]
    fn test_interleave_roundtrip() {
        let interleaved = vec![0.1, 0.2, 0.3, 0.4, 0.5, 0.6];
        let buffer = SampleBuffer::from_interleaved(&interleaved, 2, 48000).unwrap();

        assert_eq!(buffer.frame_count(), 3);
        assert_eq!(buffer.channel(0).unwrap(), &[0.1, 0.3, 0.5]);
        assert_eq!(buffer.channel(1).unwrap(), &[0.2, 0.4, 0.6]);
        assert_eq!(buffer.to_interleaved(), interleaved);
    }

    #[test]
    fn test_channel_out_of_range() {
        let buffer = SampleBuffer::mono(vec![0.0; 8], 8000).unwrap();
        assert_eq!(
            buffer.channel(1).unwrap_err(),
            AudioError::ChannelOutOfRange {
                index: 1,
                channels: 1
            }
        );
    }

    #[test]
    fn test_map_samples_leaves_input_untouched() {
        let buffer = SampleBuffer::mono(vec![0.5, -0.5], 8000).unwrap();
        let doubled = buffer.map_samples(|s| s * 2.0);

        assert_eq!(buffer.channel(0).unwrap(), &[0.5, -0.5]);
        assert_eq!(doubled.channel(0).unwrap(), &[1.0, -1.0]);
    }

    #[test]
    fn test_duration_and_frames() {
        let buffer = SampleBuffer::silent(2, 22050, 44100).unwrap();
        assert!((buffer.duration_secs() - 0.5).abs() < 1e-12);
        assert_eq!(buffer.frames_for(0.25), 11025);
        assert_eq!(buffer.frames_for(-1.0), 0);
    }
}
