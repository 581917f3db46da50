//! Chorus and flanger - LFO-modulated delay lines
//!
//! Both sweep a fractional delay with a sine LFO and read the line with linear
//! interpolation. The flanger feeds the delayed signal back into the line; the
//! chorus never does.

use std::f64::consts::PI;

use serde::{Deserialize, Serialize};

use super::{check_mix, mix_dry_wet};
use crate::buffer::SampleBuffer;
use crate::error::{AudioError, Result};

/// Feedback magnitude limit for the flanger
const MAX_FEEDBACK: f32 = 0.95;

/// Which modulated-delay effect to run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModulationKind {
    Chorus,
    Flanger,
}

/// Parameters shared by chorus and flanger
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ModulationParams {
    /// LFO rate in Hz
    pub rate: f64,
    /// Sweep depth in seconds
    pub depth: f64,
    /// Minimum delay in seconds
    pub base_delay: f64,
    /// Feedback gain (flanger only)
    pub feedback: f32,
    /// Wet/dry mix (0.0 - 1.0)
    pub mix: f32,
}

impl ModulationParams {
    pub fn new(rate: f64, depth: f64, base_delay: f64, feedback: f32, mix: f32) -> Result<Self> {
        let params = Self {
            rate,
            depth,
            base_delay,
            feedback,
            mix,
        };
        params.validate()?;
        Ok(params)
    }

    /// Typical chorus settings
    pub fn chorus() -> Self {
        Self {
            rate: 1.5,
            depth: 0.003,
            base_delay: 0.02,
            feedback: 0.0,
            mix: 0.5,
        }
    }

    /// Typical flanger settings
    pub fn flanger() -> Self {
        Self {
            rate: 0.5,
            depth: 0.002,
            base_delay: 0.001,
            feedback: 0.5,
            mix: 0.5,
        }
    }

    pub fn validate(&self) -> Result<()> {
        if !(self.rate > 0.0) || !self.rate.is_finite() {
            return Err(AudioError::invalid(
                "rate",
                format!("must be positive, got {}", self.rate),
            ));
        }
        if !(self.depth >= 0.0) || !self.depth.is_finite() {
            return Err(AudioError::invalid(
                "depth",
                format!("must be non-negative, got {}", self.depth),
            ));
        }
        if !(self.base_delay > 0.0) || !self.base_delay.is_finite() {
            return Err(AudioError::invalid(
                "base_delay",
                format!("must be positive, got {}", self.base_delay),
            ));
        }
        if !(self.feedback.abs() < MAX_FEEDBACK) {
            return Err(AudioError::invalid(
                "feedback",
                format!("magnitude must be below {MAX_FEEDBACK}, got {}", self.feedback),
            ));
        }
        check_mix(self.mix)
    }

    /// Frames appended so the longest delayed copy is fully heard
    pub fn tail_frames(&self, sample_rate: u32) -> usize {
        ((self.base_delay + self.depth) * sample_rate as f64).ceil() as usize
    }
}

/// Read a fractional position from the line with linear interpolation
#[inline]
fn read_line(line: &[f32], position: f64) -> f32 {
    if position < 0.0 {
        return 0.0;
    }
    let index = position.floor() as usize;
    let frac = (position - index as f64) as f32;
    let s0 = line[index];
    let s1 = line.get(index + 1).copied().unwrap_or(0.0);
    s0 * (1.0 - frac) + s1 * frac
}

fn modulate_channel(
    samples: &[f32],
    params: &ModulationParams,
    kind: ModulationKind,
    sample_rate: f64,
    out_len: usize,
) -> Vec<f32> {
    let feedback = match kind {
        ModulationKind::Chorus => 0.0,
        ModulationKind::Flanger => params.feedback,
    };
    let base = params.base_delay * sample_rate;
    let sweep = params.depth * sample_rate;
    let phase_inc = params.rate / sample_rate;

    let mut line = vec![0.0f32; out_len];
    let mut out = Vec::with_capacity(out_len);
    let mut phase = 0.0f64;

    for i in 0..out_len {
        let dry = samples.get(i).copied().unwrap_or(0.0);

        // Sine LFO mapped to 0.0 - 1.0; keep at least one frame of delay so the
        // interpolated read never touches the slot being written
        let lfo = (phase * 2.0 * PI).sin() * 0.5 + 0.5;
        phase += phase_inc;
        if phase >= 1.0 {
            phase -= 1.0;
        }
        let delay = (base + lfo * sweep).max(1.0);

        let delayed = read_line(&line, i as f64 - delay);
        line[i] = dry + delayed * feedback;
        out.push(mix_dry_wet(dry, delayed, params.mix));
    }

    out
}

/// Apply a modulated delay, extending the buffer by its tail
pub fn modulate(
    buffer: &SampleBuffer,
    params: &ModulationParams,
    kind: ModulationKind,
) -> Result<SampleBuffer> {
    params.validate()?;
    let sample_rate = buffer.sample_rate();
    let out_len = buffer.frame_count() + params.tail_frames(sample_rate);

    buffer.map_channels(|_, samples| {
        modulate_channel(samples, params, kind, sample_rate as f64, out_len)
    })
}

/// Chorus: modulated delay without feedback
pub fn chorus(buffer: &SampleBuffer, params: &ModulationParams) -> Result<SampleBuffer> {
    modulate(buffer, params, ModulationKind::Chorus)
}

/// Flanger: modulated delay with feedback
pub fn flanger(buffer: &SampleBuffer, params: &ModulationParams) -> Result<SampleBuffer> {
    modulate(buffer, params, ModulationKind::Flanger)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn impulse(frames: usize) -> Vec<f32> {
        let mut samples = vec![0.0; frames];
        samples[0] = 1.0;
        samples
    }

    #[test]
    fn test_tail_length() {
        let params = ModulationParams::new(1.0, 0.005, 0.02, 0.0, 0.5).unwrap();
        assert_eq!(params.tail_frames(1000), 25);

        let buffer = SampleBuffer::silent(2, 100, 1000).unwrap();
        let out = chorus(&buffer, &params).unwrap();
        assert_eq!(out.frame_count(), 125);
        assert_eq!(out.num_channels(), 2);
    }

    #[test]
    fn test_zero_depth_chorus_is_plain_delay() {
        let params = ModulationParams::new(2.0, 0.0, 0.01, 0.0, 1.0).unwrap();
        let buffer = SampleBuffer::mono(impulse(50), 1000).unwrap();
        let out = chorus(&buffer, &params).unwrap();
        let samples = out.channel(0).unwrap();

        assert!((samples[10] - 1.0).abs() < 1e-6);
        assert!(samples.iter().enumerate().all(|(i, &s)| i == 10 || s.abs() < 1e-6));
    }

    #[test]
    fn test_chorus_ignores_feedback() {
        let params = ModulationParams::new(2.0, 0.0, 0.01, 0.5, 1.0).unwrap();
        let buffer = SampleBuffer::mono(impulse(50), 1000).unwrap();
        let out = chorus(&buffer, &params).unwrap();
        assert!(out.channel(0).unwrap()[20].abs() < 1e-6);
    }

    #[test]
    fn test_flanger_recirculates() {
        let params = ModulationParams::new(2.0, 0.0, 0.01, 0.5, 1.0).unwrap();
        let buffer = SampleBuffer::mono(impulse(50), 1000).unwrap();
        let out = flanger(&buffer, &params).unwrap();
        let samples = out.channel(0).unwrap();

        assert!((samples[10] - 1.0).abs() < 1e-6);
        assert!((samples[20] - 0.5).abs() < 1e-6);
        assert!((samples[30] - 0.25).abs() < 1e-6);
    }

    #[test]
    fn test_modulation_moves_the_echo() {
        let params = ModulationParams::new(5.0, 0.004, 0.002, 0.0, 1.0).unwrap();
        let signal: Vec<f32> = (0..2000).map(|i| ((i as f32) * 0.05).sin()).collect();
        let buffer = SampleBuffer::mono(signal, 1000).unwrap();
        let out = chorus(&buffer, &params).unwrap();

        assert!(out.channel(0).unwrap().iter().all(|s| s.is_finite()));
        assert_ne!(out.channel(0).unwrap()[..2000], buffer.channel(0).unwrap()[..]);
    }

    #[test]
    fn test_invalid_parameters() {
        assert!(ModulationParams::new(0.0, 0.002, 0.001, 0.0, 0.5).is_err());
        assert!(ModulationParams::new(1.0, -0.002, 0.001, 0.0, 0.5).is_err());
        assert!(ModulationParams::new(1.0, 0.002, 0.0, 0.0, 0.5).is_err());
        assert!(ModulationParams::new(1.0, 0.002, 0.001, 0.99, 0.5).is_err());
        assert!(ModulationParams::new(1.0, 0.002, 0.001, 0.0, -0.5).is_err());
        assert!(ModulationParams::chorus().validate().is_ok());
        assert!(ModulationParams::flanger().validate().is_ok());
    }
}
