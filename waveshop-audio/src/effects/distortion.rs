//! Waveshaping distortion
//!
//! Stateless tanh soft clip. `drive = 1 + amount * 50` and the output is
//! divided by `tanh(drive)` so a full-scale input stays at full scale.

use serde::{Deserialize, Serialize};

use crate::buffer::SampleBuffer;
use crate::error::{AudioError, Result};

/// Drive added at `amount = 1.0`
const MAX_EXTRA_DRIVE: f32 = 50.0;

/// Distortion parameters
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct DistortionParams {
    /// Distortion amount (0.0 - 1.0)
    pub amount: f32,
}

impl DistortionParams {
    pub fn new(amount: f32) -> Result<Self> {
        let params = Self { amount };
        params.validate()?;
        Ok(params)
    }

    pub fn validate(&self) -> Result<()> {
        if !(0.0..=1.0).contains(&self.amount) {
            return Err(AudioError::invalid(
                "amount",
                format!("must be within [0, 1], got {}", self.amount),
            ));
        }
        Ok(())
    }

    /// Pre-gain fed into the waveshaper
    pub fn drive(&self) -> f32 {
        1.0 + self.amount * MAX_EXTRA_DRIVE
    }
}

/// Shape a single sample
#[inline]
pub fn shape(sample: f32, drive: f32) -> f32 {
    (sample * drive).tanh() / drive.tanh()
}

/// Apply the soft clipper to every sample
pub fn distort(buffer: &SampleBuffer, params: &DistortionParams) -> Result<SampleBuffer> {
    params.validate()?;
    let drive = params.drive();
    Ok(buffer.map_samples(|s| shape(s, drive)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_drive_mapping() {
        assert_eq!(DistortionParams::new(0.0).unwrap().drive(), 1.0);
        assert_eq!(DistortionParams::new(1.0).unwrap().drive(), 51.0);
        assert_eq!(DistortionParams::new(0.5).unwrap().drive(), 26.0);
    }

    #[test]
    fn test_unity_at_full_scale() {
        for amount in [0.0, 0.3, 1.0] {
            let drive = DistortionParams::new(amount).unwrap().drive();
            assert!((shape(1.0, drive) - 1.0).abs() < 1e-6);
            assert!((shape(-1.0, drive) + 1.0).abs() < 1e-6);
        }
    }

    #[test]
    fn test_distortion_boosts_quiet_samples() {
        let buffer = SampleBuffer::mono(vec![0.1, -0.1, 0.0], 44100).unwrap();
        let out = distort(&buffer, &DistortionParams::new(0.5).unwrap()).unwrap();
        let samples = out.channel(0).unwrap();

        assert!(samples[0] > 0.9);
        assert!(samples[1] < -0.9);
        assert_eq!(samples[2], 0.0);
        assert_eq!(out.frame_count(), 3);
    }

    #[test]
    fn test_amount_out_of_range() {
        assert!(DistortionParams::new(1.5).is_err());
        assert!(DistortionParams::new(-0.1).is_err());
        assert!(DistortionParams::new(f32::NAN).is_err());
    }
}
