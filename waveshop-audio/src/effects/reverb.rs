//! Convolution reverb with a synthesized impulse response
//!
//! The impulse is exponentially decaying white noise:
//! `impulse[i] = noise(-1, 1) * exp(-3 * i / N)` with `N = decay * sample_rate`.
//! Two independent noise channels form a stereo impulse; input channel `c`
//! uses impulse channel `c % 2`.
//!
//! Convolution runs FFT overlap-add (rustfft) and matches direct time-domain
//! convolution up to float rounding.

use std::sync::Arc;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rustfft::num_complex::Complex;
use rustfft::{Fft, FftPlanner};
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{check_mix, mix_dry_wet};
use crate::buffer::SampleBuffer;
use crate::error::{AudioError, Result};

/// Longest impulse response we synthesize, in seconds
pub const MAX_DECAY_SECS: f64 = 20.0;

/// Exponent scale of the impulse envelope (reaches e^-3 at the end)
const ENVELOPE_RATE: f64 = 3.0;

/// Number of impulse channels
const IMPULSE_CHANNELS: usize = 2;

/// Convolution reverb parameters
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ReverbParams {
    /// Impulse response length in seconds
    pub decay: f64,
    /// Wet/dry mix (0.0 - 1.0)
    pub mix: f32,
    /// Fixed seed for a reproducible impulse; `None` draws from OS entropy
    #[serde(default)]
    pub seed: Option<u64>,
}

impl Default for ReverbParams {
    fn default() -> Self {
        Self {
            decay: 2.0,
            mix: 0.3,
            seed: None,
        }
    }
}

impl ReverbParams {
    pub fn new(decay: f64, mix: f32) -> Result<Self> {
        let params = Self {
            decay,
            mix,
            seed: None,
        };
        params.validate()?;
        Ok(params)
    }

    /// Use a fixed impulse seed
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    pub fn validate(&self) -> Result<()> {
        if !(self.decay > 0.0 && self.decay <= MAX_DECAY_SECS) {
            return Err(AudioError::invalid(
                "decay",
                format!("must be within (0, {MAX_DECAY_SECS}] s, got {}", self.decay),
            ));
        }
        check_mix(self.mix)
    }

    /// Impulse length in frames (at least one)
    pub fn impulse_frames(&self, sample_rate: u32) -> usize {
        ((self.decay * sample_rate as f64).round() as usize).max(1)
    }

    /// Frames appended after the input (the impulse length)
    pub fn tail_frames(&self, sample_rate: u32) -> usize {
        self.impulse_frames(sample_rate)
    }
}

/// Synthesize the stereo impulse response
pub fn synthesize_impulse(params: &ReverbParams, sample_rate: u32) -> Vec<Vec<f32>> {
    let mut rng = match params.seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    };
    let len = params.impulse_frames(sample_rate);

    (0..IMPULSE_CHANNELS)
        .map(|_| {
            (0..len)
                .map(|i| {
                    let noise: f64 = rng.gen_range(-1.0..1.0);
                    (noise * (-ENVELOPE_RATE * i as f64 / len as f64).exp()) as f32
                })
                .collect()
        })
        .collect()
}

/// Reference time-domain convolution (full length `n + k - 1`)
pub fn convolve_direct(signal: &[f32], kernel: &[f32]) -> Vec<f32> {
    if signal.is_empty() || kernel.is_empty() {
        return Vec::new();
    }
    let mut out = vec![0.0f64; signal.len() + kernel.len() - 1];
    for (i, &x) in signal.iter().enumerate() {
        if x == 0.0 {
            continue;
        }
        for (j, &h) in kernel.iter().enumerate() {
            out[i + j] += x as f64 * h as f64;
        }
    }
    out.into_iter().map(|s| s as f32).collect()
}

/// FFT overlap-add convolver for one kernel
pub struct Convolver {
    block: usize,
    fft_size: usize,
    forward: Arc<dyn Fft<f64>>,
    inverse: Arc<dyn Fft<f64>>,
    kernel_spectrum: Vec<Complex<f64>>,
    kernel_len: usize,
}

impl Convolver {
    /// Prepare the kernel spectrum
    pub fn new(kernel: &[f32]) -> Self {
        let block = kernel.len().max(1).next_power_of_two();
        let fft_size = block * 2;

        let mut planner = FftPlanner::new();
        let forward = planner.plan_fft_forward(fft_size);
        let inverse = planner.plan_fft_inverse(fft_size);

        let mut kernel_spectrum = vec![Complex::new(0.0, 0.0); fft_size];
        for (slot, &h) in kernel_spectrum.iter_mut().zip(kernel) {
            *slot = Complex::new(h as f64, 0.0);
        }
        forward.process(&mut kernel_spectrum);

        Self {
            block,
            fft_size,
            forward,
            inverse,
            kernel_spectrum,
            kernel_len: kernel.len(),
        }
    }

    /// Convolve a signal, returning the full `n + k - 1` frames
    pub fn convolve(&self, signal: &[f32]) -> Vec<f32> {
        if signal.is_empty() || self.kernel_len == 0 {
            return Vec::new();
        }
        let out_len = signal.len() + self.kernel_len - 1;
        let mut out = vec![0.0f64; out_len];
        let mut scratch = vec![Complex::new(0.0, 0.0); self.fft_size];
        let scale = 1.0 / self.fft_size as f64;

        for (block_idx, chunk) in signal.chunks(self.block).enumerate() {
            scratch.fill(Complex::new(0.0, 0.0));
            for (slot, &x) in scratch.iter_mut().zip(chunk) {
                *slot = Complex::new(x as f64, 0.0);
            }

            self.forward.process(&mut scratch);
            for (bin, h) in scratch.iter_mut().zip(&self.kernel_spectrum) {
                *bin = *bin * *h;
            }
            self.inverse.process(&mut scratch);

            let start = block_idx * self.block;
            let valid = (chunk.len() + self.kernel_len - 1).min(out_len - start);
            for (acc, value) in out[start..start + valid].iter_mut().zip(&scratch) {
                *acc += value.re * scale;
            }
        }

        out.into_iter().map(|s| s as f32).collect()
    }
}

/// Convolve with a synthesized impulse, extending the buffer by its length
pub fn reverb(buffer: &SampleBuffer, params: &ReverbParams) -> Result<SampleBuffer> {
    params.validate()?;
    let sample_rate = buffer.sample_rate();
    let impulse = synthesize_impulse(params, sample_rate);
    let out_len = buffer.frame_count() + params.tail_frames(sample_rate);

    debug!(
        impulse_frames = impulse[0].len(),
        frames = buffer.frame_count(),
        seeded = params.seed.is_some(),
        "rendering convolution reverb"
    );

    let convolvers: Vec<Convolver> = impulse.iter().map(|ch| Convolver::new(ch)).collect();

    buffer.map_channels(|index, samples| {
        let wet = convolvers[index % IMPULSE_CHANNELS].convolve(samples);
        (0..out_len)
            .map(|i| {
                let dry = samples.get(i).copied().unwrap_or(0.0);
                let wet = wet.get(i).copied().unwrap_or(0.0);
                mix_dry_wet(dry, wet, params.mix)
            })
            .collect()
    })
}
