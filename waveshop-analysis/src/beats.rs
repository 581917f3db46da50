//! Beat and tempo detection from windowed energy onsets

use crate::AnalysisError;
use tracing::debug;

/// Default analysis window length in seconds (50ms)
pub const BEAT_WINDOW_SECS: f64 = 0.05;

/// Window energy must exceed this multiple of the mean energy to count as a beat
const ENERGY_THRESHOLD_RATIO: f32 = 1.5;

/// Result of a beat analysis pass
#[derive(Debug, Clone, PartialEq, Default)]
pub struct BeatAnalysis {
    /// Estimated tempo in beats per minute (0 when undetermined)
    pub bpm: f64,
    /// Beat positions in seconds
    pub beats: Vec<f64>,
    /// Regularity of the inter-beat intervals (0.0 - 1.0)
    pub confidence: f64,
}

impl BeatAnalysis {
    /// Result used when fewer than two beats were found
    pub fn none() -> Self {
        Self::default()
    }
}

/// Energy-based beat detector
///
/// Splits the signal into fixed windows, marks windows whose energy is a
/// local maximum above `1.5 x mean energy`, and derives the tempo from the
/// mean spacing of those windows.
#[derive(Debug, Clone)]
pub struct BeatDetector {
    sample_rate: u32,
    window_secs: f64,
}

impl BeatDetector {
    /// Create a new detector for the given sample rate
    pub fn new(sample_rate: u32) -> Result<Self, AnalysisError> {
        if sample_rate == 0 {
            return Err(AnalysisError::ZeroSampleRate);
        }
        Ok(Self {
            sample_rate,
            window_secs: BEAT_WINDOW_SECS,
        })
    }

    /// Override the analysis window length
    pub fn with_window_secs(mut self, window_secs: f64) -> Result<Self, AnalysisError> {
        if !(window_secs > 0.0) {
            return Err(AnalysisError::InvalidParameter {
                name: "window_secs",
                reason: format!("must be positive, got {window_secs}"),
            });
        }
        self.window_secs = window_secs;
        Ok(self)
    }

    /// Window length in samples (never zero)
    pub fn window_samples(&self) -> usize {
        ((self.window_secs * self.sample_rate as f64).floor() as usize).max(1)
    }

    /// Sum of squared samples for every window
    fn window_energies(&self, samples: &[f32]) -> Vec<f32> {
        samples
            .chunks(self.window_samples())
            .map(|window| window.iter().map(|s| s * s).sum())
            .collect()
    }

    /// Analyze a mono signal (usually channel 0 of a buffer)
    pub fn detect(&self, samples: &[f32]) -> BeatAnalysis {
        let energies = self.window_energies(samples);
        if energies.len() < 2 {
            return BeatAnalysis::none();
        }

        let mean = energies.iter().sum::<f32>() / energies.len() as f32;
        let threshold = mean * ENERGY_THRESHOLD_RATIO;
        let window_secs = self.window_samples() as f64 / self.sample_rate as f64;

        let last = energies.len() - 1;
        let beats: Vec<f64> = energies
            .iter()
            .enumerate()
            // Edge windows have a single neighbour and never qualify
            .filter(|&(i, &energy)| {
                i > 0
                    && i < last
                    && energy > threshold
                    && energy > energies[i - 1]
                    && energy > energies[i + 1]
            })
            .map(|(i, _)| i as f64 * window_secs)
            .collect();

        if beats.len() < 2 {
            debug!(beats = beats.len(), "not enough beats for tempo estimate");
            return BeatAnalysis::none();
        }

        let intervals: Vec<f64> = beats.windows(2).map(|pair| pair[1] - pair[0]).collect();
        let mean_interval = intervals.iter().sum::<f64>() / intervals.len() as f64;
        let variance = intervals
            .iter()
            .map(|i| (i - mean_interval).powi(2))
            .sum::<f64>()
            / intervals.len() as f64;

        let bpm = 60.0 / mean_interval;
        let confidence = (1.0 - 10.0 * variance).max(0.0);

        debug!(bpm, confidence, beats = beats.len(), "beat analysis complete");

        BeatAnalysis {
            bpm,
            beats,
            confidence,
        }
    }
}
