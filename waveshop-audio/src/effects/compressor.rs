//! Soft-knee compressor
//!
//! Feed-forward design: the gain computer works in dB on the instantaneous
//! sample level, and an envelope follower with separate attack and release
//! time constants smooths the gain reduction. Channels are processed
//! independently (no stereo linking).

use serde::{Deserialize, Serialize};
use waveshop_analysis::db_to_linear;

use crate::buffer::SampleBuffer;
use crate::error::{AudioError, Result};

/// Level floor used for silent samples
const MIN_LEVEL_DB: f64 = -120.0;

/// Compressor parameters
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CompressorParams {
    /// Threshold in dBFS
    pub threshold_db: f64,
    /// Compression ratio (>= 1)
    pub ratio: f64,
    /// Attack time in seconds
    pub attack: f64,
    /// Release time in seconds
    pub release: f64,
    /// Knee width in dB
    pub knee_db: f64,
}

impl Default for CompressorParams {
    fn default() -> Self {
        Self {
            threshold_db: -24.0,
            ratio: 4.0,
            attack: 0.003,
            release: 0.25,
            knee_db: 6.0,
        }
    }
}

impl CompressorParams {
    pub fn new(threshold_db: f64, ratio: f64, attack: f64, release: f64, knee_db: f64) -> Result<Self> {
        let params = Self {
            threshold_db,
            ratio,
            attack,
            release,
            knee_db,
        };
        params.validate()?;
        Ok(params)
    }

    pub fn validate(&self) -> Result<()> {
        if !self.threshold_db.is_finite() {
            return Err(AudioError::invalid("threshold_db", "must be finite"));
        }
        if !(self.ratio >= 1.0) || !self.ratio.is_finite() {
            return Err(AudioError::invalid(
                "ratio",
                format!("must be at least 1, got {}", self.ratio),
            ));
        }
        for (name, value) in [
            ("attack", self.attack),
            ("release", self.release),
            ("knee_db", self.knee_db),
        ] {
            if !(value >= 0.0) || !value.is_finite() {
                return Err(AudioError::invalid(
                    name,
                    format!("must be non-negative, got {value}"),
                ));
            }
        }
        Ok(())
    }

    /// Static gain change in dB (<= 0) for an input level
    pub fn gain_reduction_db(&self, input_db: f64) -> f64 {
        let threshold = self.threshold_db;
        let ratio = self.ratio;
        let knee = self.knee_db;

        if input_db < threshold - knee / 2.0 {
            0.0
        } else if input_db > threshold + knee / 2.0 || knee <= 0.0 {
            threshold + (input_db - threshold) / ratio - input_db
        } else {
            // Quadratic knee curve
            let x = input_db - (threshold - knee / 2.0);
            (1.0 / ratio - 1.0) * (x * x) / (2.0 * knee)
        }
    }
}

/// One-pole smoothing coefficient for a time constant
fn time_coeff(seconds: f64, sample_rate: f64) -> f64 {
    if seconds <= 0.0 {
        0.0
    } else {
        (-1.0 / (sample_rate * seconds)).exp()
    }
}

fn compress_channel(samples: &[f32], params: &CompressorParams, sample_rate: f64) -> Vec<f32> {
    let attack_coeff = time_coeff(params.attack, sample_rate);
    let release_coeff = time_coeff(params.release, sample_rate);

    // Smoothed gain reduction in dB (0 = no reduction)
    let mut envelope = 0.0f64;

    samples
        .iter()
        .map(|&sample| {
            let level = (sample as f64).abs();
            let level_db = if level > 0.0 {
                (20.0 * level.log10()).max(MIN_LEVEL_DB)
            } else {
                MIN_LEVEL_DB
            };

            let target = params.gain_reduction_db(level_db);
            let coeff = if target < envelope {
                attack_coeff
            } else {
                release_coeff
            };
            envelope = coeff * envelope + (1.0 - coeff) * target;

            sample * db_to_linear(envelope as f32)
        })
        .collect()
}

/// Apply the compressor to every channel independently
pub fn compress(buffer: &SampleBuffer, params: &CompressorParams) -> Result<SampleBuffer> {
    params.validate()?;
    let sample_rate = buffer.sample_rate() as f64;
    buffer.map_channels(|_, samples| compress_channel(samples, params, sample_rate))
}
