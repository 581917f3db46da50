//! Silence detection
//!
//! Splits a signal into sound regions separated by silences of at least a
//! minimum duration. Shorter gaps are treated as part of the surrounding sound.

use crate::AnalysisError;
use tracing::debug;

/// A closed interval of non-silent audio, in seconds
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SoundRegion {
    pub start: f64,
    pub end: f64,
}

impl SoundRegion {
    /// Region length in seconds
    pub fn duration(&self) -> f64 {
        self.end - self.start
    }
}

/// Silence detector configuration
#[derive(Debug, Clone, Copy)]
pub struct SilenceDetector {
    sample_rate: u32,
    /// Frames whose max-abs sample is below this level count as silent
    threshold: f32,
    /// Minimum silence length in seconds that splits two sound regions
    min_duration: f64,
}

impl SilenceDetector {
    pub fn new(sample_rate: u32, threshold: f32, min_duration: f64) -> Result<Self, AnalysisError> {
        if sample_rate == 0 {
            return Err(AnalysisError::ZeroSampleRate);
        }
        if !(threshold >= 0.0) {
            return Err(AnalysisError::InvalidParameter {
                name: "threshold",
                reason: format!("must be non-negative, got {threshold}"),
            });
        }
        if !(min_duration >= 0.0) {
            return Err(AnalysisError::InvalidParameter {
                name: "min_duration",
                reason: format!("must be non-negative, got {min_duration}"),
            });
        }
        Ok(Self {
            sample_rate,
            threshold,
            min_duration,
        })
    }

    #[inline]
    fn secs(&self, frames: usize) -> f64 {
        frames as f64 / self.sample_rate as f64
    }

    #[inline]
    fn is_long_enough(&self, frames: usize) -> bool {
        self.secs(frames) >= self.min_duration
    }

    fn region(&self, start: usize, end: usize) -> SoundRegion {
        SoundRegion {
            start: self.secs(start),
            end: self.secs(end),
        }
    }

    /// Find sound regions across all channels
    ///
    /// A frame is silent when the max-abs sample across channels is below the
    /// threshold. A sound region is closed by a following silence of at least
    /// `min_duration`. If the signal ends in sound, that trailing region is
    /// kept only when it is itself at least `min_duration` long; a trailing
    /// silence shorter than `min_duration` counts as part of that region.
    pub fn detect<C: AsRef<[f32]>>(&self, channels: &[C]) -> Vec<SoundRegion> {
        let frames = channels
            .iter()
            .map(|ch| ch.as_ref().len())
            .min()
            .unwrap_or(0);

        let mut regions = Vec::new();
        let mut sound_start: Option<usize> = None;
        let mut silence_start: Option<usize> = None;

        for i in 0..frames {
            let level = channels
                .iter()
                .fold(0.0f32, |max, ch| max.max(ch.as_ref()[i].abs()));

            if level < self.threshold {
                if silence_start.is_none() {
                    silence_start = Some(i);
                }
                continue;
            }

            if let Some(gap_start) = silence_start.take() {
                if self.is_long_enough(i - gap_start) {
                    if let Some(start) = sound_start {
                        if gap_start > start {
                            regions.push(self.region(start, gap_start));
                        }
                    }
                    sound_start = None;
                }
            }
            if sound_start.is_none() {
                sound_start = Some(i);
            }
        }

        if let Some(start) = sound_start {
            match silence_start {
                Some(gap_start) if self.is_long_enough(frames - gap_start) => {
                    if gap_start > start {
                        regions.push(self.region(start, gap_start));
                    }
                }
                _ => {
                    if self.is_long_enough(frames - start) {
                        regions.push(self.region(start, frames));
                    }
                }
            }
        }

        debug!(regions = regions.len(), frames, "silence detection complete");
        regions
    }
}

/// Convenience wrapper around [`SilenceDetector`]
pub fn detect_silence<C: AsRef<[f32]>>(
    channels: &[C],
    sample_rate: u32,
    threshold: f32,
    min_duration: f64,
) -> Result<Vec<SoundRegion>, AnalysisError> {
    Ok(SilenceDetector::new(sample_rate, threshold, min_duration)?.detect(channels))
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Build a mono signal from (seconds, amplitude) segments
    fn segments(sample_rate: u32, parts: &[(f64, f32)]) -> Vec<f32> {
        let mut out = Vec::new();
        for &(secs, amp) in parts {
            let n = (secs * sample_rate as f64).round() as usize;
            out.extend(std::iter::repeat(amp).take(n));
        }
        out
    }

    #[test]
    fn test_short_tail_is_dropped() {
        let signal = segments(1000, &[(0.3, 0.5), (0.6, 0.001), (0.1, 0.5)]);
        let regions = detect_silence(&[signal], 1000, 0.01, 0.5).unwrap();

        assert_eq!(regions.len(), 1);
        assert!((regions[0].start - 0.0).abs() < 1e-9);
        assert!((regions[0].end - 0.3).abs() < 1e-9);
    }

    #[test]
    fn test_long_tail_is_kept() {
        let signal = segments(1000, &[(0.3, 0.5), (0.6, 0.0), (0.7, 0.5)]);
        let regions = detect_silence(&[signal], 1000, 0.01, 0.5).unwrap();

        assert_eq!(regions.len(), 2);
        assert!((regions[1].start - 0.9).abs() < 1e-9);
        assert!((regions[1].end - 1.6).abs() < 1e-9);
    }

    #[test]
    fn test_short_gap_is_absorbed() {
        let signal = segments(1000, &[(0.3, 0.5), (0.1, 0.0), (0.3, 0.5), (0.5, 0.0)]);
        let regions = detect_silence(&[signal], 1000, 0.01, 0.5).unwrap();

        assert_eq!(regions.len(), 1);
        assert!((regions[0].start - 0.0).abs() < 1e-9);
        assert!((regions[0].end - 0.7).abs() < 1e-9);
    }

    #[test]
    fn test_leading_silence_skipped() {
        let signal = segments(1000, &[(0.5, 0.0), (0.6, 0.5)]);
        let regions = detect_silence(&[signal], 1000, 0.01, 0.5).unwrap();

        assert_eq!(regions.len(), 1);
        assert!((regions[0].start - 0.5).abs() < 1e-9);
        assert!((regions[0].end - 1.1).abs() < 1e-9);
    }

    #[test]
    fn test_any_channel_breaks_silence() {
        let left = segments(1000, &[(1.0, 0.0)]);
        let right = segments(1000, &[(0.2, 0.0), (0.6, 0.4), (0.2, 0.0)]);
        let regions = detect_silence(&[left, right], 1000, 0.01, 0.1).unwrap();

        assert_eq!(regions.len(), 1);
        assert!((regions[0].start - 0.2).abs() < 1e-9);
        assert!((regions[0].end - 0.8).abs() < 1e-9);
    }

    #[test]
    fn test_all_silent() {
        let signal = vec![0.0f32; 1000];
        assert!(detect_silence(&[signal], 1000, 0.01, 0.1).unwrap().is_empty());
    }

    #[test]
    fn test_invalid_parameters() {
        assert!(SilenceDetector::new(0, 0.01, 0.5).is_err());
        assert!(SilenceDetector::new(44100, -0.1, 0.5).is_err());
        assert!(SilenceDetector::new(44100, 0.01, -1.0).is_err());
    }
}
