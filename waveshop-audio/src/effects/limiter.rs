//! Sample-level brickwall limiter
//!
//! Hard clamp at the threshold. Applying it twice gives the same result as
//! applying it once.

use serde::{Deserialize, Serialize};

use crate::buffer::SampleBuffer;
use crate::error::{AudioError, Result};

/// Default limiter ceiling (linear)
pub const DEFAULT_LIMIT: f32 = 0.95;

/// Limiter parameters
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LimiterParams {
    /// Linear ceiling
    pub threshold: f32,
}

impl Default for LimiterParams {
    fn default() -> Self {
        Self {
            threshold: DEFAULT_LIMIT,
        }
    }
}

impl LimiterParams {
    pub fn new(threshold: f32) -> Result<Self> {
        let params = Self { threshold };
        params.validate()?;
        Ok(params)
    }

    /// The ceiling must lie in (0, 1]
    pub fn validate(&self) -> Result<()> {
        if !(self.threshold > 0.0 && self.threshold <= 1.0) {
            return Err(AudioError::invalid(
                "threshold",
                format!("must be within (0, 1], got {}", self.threshold),
            ));
        }
        Ok(())
    }
}

#[inline]
fn clamp_sample(sample: f32, threshold: f32) -> f32 {
    if sample.abs() > threshold {
        threshold.copysign(sample)
    } else {
        sample
    }
}

/// Clamp every sample to `[-threshold, threshold]`
pub fn limit(buffer: &SampleBuffer, params: &LimiterParams) -> Result<SampleBuffer> {
    params.validate()?;
    let threshold = params.threshold;
    Ok(buffer.map_samples(|s| clamp_sample(s, threshold)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clamps_peaks() {
        let buffer = SampleBuffer::mono(vec![1.2, -1.5, 0.5, 0.95, -0.96], 44100).unwrap();
        let out = limit(&buffer, &LimiterParams::default()).unwrap();
        assert_eq!(out.channel(0).unwrap(), &[0.95, -0.95, 0.5, 0.95, -0.95]);
    }

    #[test]
    fn test_idempotent() {
        let samples: Vec<f32> = (0..512).map(|i| ((i as f32) * 0.1).sin() * 1.4).collect();
        let buffer = SampleBuffer::mono(samples, 44100).unwrap();
        let params = LimiterParams::new(0.8).unwrap();

        let once = limit(&buffer, &params).unwrap();
        let twice = limit(&once, &params).unwrap();
        assert_eq!(once, twice);
    }

    #[test]
    fn test_threshold_validation() {
        assert!(LimiterParams::new(1.5).is_err());
        assert!(LimiterParams::new(-0.5).is_err());
        assert!(LimiterParams::new(0.0).is_err());
        assert!(LimiterParams::new(1.0).is_ok());
    }
}
