//! Feedback delay (echo)
//!
//! The delay line recirculates its own output scaled by `feedback`; the output
//! buffer is extended by three delay periods so the echoes can ring out.

use serde::{Deserialize, Serialize};

use super::mix_dry_wet;
use crate::buffer::SampleBuffer;
use crate::error::{AudioError, Result};

/// Maximum delay time in seconds
pub const MAX_DELAY_SECS: f64 = 2.0;

/// Feedback must stay strictly below this to guarantee decay
pub const MAX_FEEDBACK: f32 = 0.95;

/// Tail length in delay periods
const TAIL_PERIODS: usize = 3;

/// Feedback delay parameters
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DelayParams {
    /// Delay time in seconds (0 - 2.0)
    pub delay_time: f64,
    /// Feedback amount [0, 0.95)
    pub feedback: f32,
    /// Wet/dry mix (0.0 = dry, 1.0 = wet)
    pub mix: f32,
}

impl Default for DelayParams {
    fn default() -> Self {
        Self {
            delay_time: 0.5,
            feedback: 0.3,
            mix: 0.5,
        }
    }
}

impl DelayParams {
    pub fn new(delay_time: f64, feedback: f32, mix: f32) -> Result<Self> {
        let params = Self {
            delay_time,
            feedback,
            mix,
        };
        params.validate()?;
        Ok(params)
    }

    pub fn validate(&self) -> Result<()> {
        if !(self.delay_time > 0.0 && self.delay_time <= MAX_DELAY_SECS) {
            return Err(AudioError::invalid(
                "delay_time",
                format!("must be within (0, {MAX_DELAY_SECS}] s, got {}", self.delay_time),
            ));
        }
        if !(self.feedback >= 0.0 && self.feedback < MAX_FEEDBACK) {
            return Err(AudioError::invalid(
                "feedback",
                format!("must be within [0, {MAX_FEEDBACK}), got {}", self.feedback),
            ));
        }
        super::check_mix(self.mix)
    }

    /// Delay length in whole frames (at least one)
    pub fn delay_frames(&self, sample_rate: u32) -> usize {
        ((self.delay_time * sample_rate as f64).round() as usize).max(1)
    }

    /// Frames appended after the input to capture the feedback decay
    pub fn tail_frames(&self, sample_rate: u32) -> usize {
        TAIL_PERIODS * self.delay_frames(sample_rate)
    }
}

fn delay_channel(samples: &[f32], delay: usize, params: &DelayParams, out_len: usize) -> Vec<f32> {
    let mut line = vec![0.0f32; out_len];
    let mut out = Vec::with_capacity(out_len);

    for i in 0..out_len {
        let dry = samples.get(i).copied().unwrap_or(0.0);
        let delayed = if i >= delay { line[i - delay] } else { 0.0 };
        line[i] = dry + delayed * params.feedback;
        out.push(mix_dry_wet(dry, delayed, params.mix));
    }

    out
}

/// Apply the feedback delay, extending the buffer by its tail
pub fn delay(buffer: &SampleBuffer, params: &DelayParams) -> Result<SampleBuffer> {
    params.validate()?;
    let sample_rate = buffer.sample_rate();
    let delay = params.delay_frames(sample_rate);
    let out_len = buffer.frame_count() + params.tail_frames(sample_rate);

    buffer.map_channels(|_, samples| delay_channel(samples, delay, params, out_len))
}
