//! Biquad filters: peaking / shelving EQ bands, high-pass and low-pass
//!
//! Coefficients follow the RBJ Audio EQ Cookbook. Each channel runs its own
//! filter state; EQ bands are applied in series, each stage feeding the next.

use std::f64::consts::PI;

use serde::{Deserialize, Serialize};

use crate::buffer::SampleBuffer;
use crate::error::{AudioError, Result};

/// Fixed Q used by the single-stage high-pass and low-pass filters
pub const PASS_FILTER_Q: f64 = 1.0;

/// Normalized biquad coefficients (a* feed-forward, b* feedback)
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BiquadCoeffs {
    pub a0: f64,
    pub a1: f64,
    pub a2: f64,
    pub b1: f64,
    pub b2: f64,
}

impl BiquadCoeffs {
    /// Pass-through filter
    pub const IDENTITY: Self = Self {
        a0: 1.0,
        a1: 0.0,
        a2: 0.0,
        b1: 0.0,
        b2: 0.0,
    };

    /// Normalize raw cookbook terms by the leading feedback coefficient
    fn normalized(b0: f64, b1: f64, b2: f64, a0: f64, a1: f64, a2: f64) -> Self {
        Self {
            a0: b0 / a0,
            a1: b1 / a0,
            a2: b2 / a0,
            b1: a1 / a0,
            b2: a2 / a0,
        }
    }

    /// Peaking bell at `freq` with `gain_db` boost/cut
    pub fn peaking(sample_rate: f64, freq: f64, gain_db: f64, q: f64) -> Self {
        let a = 10f64.powf(gain_db / 40.0);
        let omega = 2.0 * PI * freq / sample_rate;
        let (sin_omega, cos_omega) = omega.sin_cos();
        let alpha = sin_omega / (2.0 * q);

        Self::normalized(
            1.0 + alpha * a,
            -2.0 * cos_omega,
            1.0 - alpha * a,
            1.0 + alpha / a,
            -2.0 * cos_omega,
            1.0 - alpha / a,
        )
    }

    /// Low shelf below `freq`
    pub fn low_shelf(sample_rate: f64, freq: f64, gain_db: f64, q: f64) -> Self {
        let a = 10f64.powf(gain_db / 40.0);
        let omega = 2.0 * PI * freq / sample_rate;
        let (sin_omega, cos_omega) = omega.sin_cos();
        let alpha = sin_omega / (2.0 * q);
        let sqrt_a_alpha = 2.0 * a.sqrt() * alpha;

        Self::normalized(
            a * ((a + 1.0) - (a - 1.0) * cos_omega + sqrt_a_alpha),
            2.0 * a * ((a - 1.0) - (a + 1.0) * cos_omega),
            a * ((a + 1.0) - (a - 1.0) * cos_omega - sqrt_a_alpha),
            (a + 1.0) + (a - 1.0) * cos_omega + sqrt_a_alpha,
            -2.0 * ((a - 1.0) + (a + 1.0) * cos_omega),
            (a + 1.0) + (a - 1.0) * cos_omega - sqrt_a_alpha,
        )
    }

    /// High shelf above `freq`
    pub fn high_shelf(sample_rate: f64, freq: f64, gain_db: f64, q: f64) -> Self {
        let a = 10f64.powf(gain_db / 40.0);
        let omega = 2.0 * PI * freq / sample_rate;
        let (sin_omega, cos_omega) = omega.sin_cos();
        let alpha = sin_omega / (2.0 * q);
        let sqrt_a_alpha = 2.0 * a.sqrt() * alpha;

        Self::normalized(
            a * ((a + 1.0) + (a - 1.0) * cos_omega + sqrt_a_alpha),
            -2.0 * a * ((a - 1.0) + (a + 1.0) * cos_omega),
            a * ((a + 1.0) + (a - 1.0) * cos_omega - sqrt_a_alpha),
            (a + 1.0) - (a - 1.0) * cos_omega + sqrt_a_alpha,
            2.0 * ((a - 1.0) - (a + 1.0) * cos_omega),
            (a + 1.0) - (a - 1.0) * cos_omega - sqrt_a_alpha,
        )
    }

    /// Second-order low-pass
    pub fn low_pass(sample_rate: f64, freq: f64, q: f64) -> Self {
        let omega = 2.0 * PI * freq / sample_rate;
        let (sin_omega, cos_omega) = omega.sin_cos();
        let alpha = sin_omega / (2.0 * q);

        Self::normalized(
            (1.0 - cos_omega) / 2.0,
            1.0 - cos_omega,
            (1.0 - cos_omega) / 2.0,
            1.0 + alpha,
            -2.0 * cos_omega,
            1.0 - alpha,
        )
    }

    /// Second-order high-pass
    pub fn high_pass(sample_rate: f64, freq: f64, q: f64) -> Self {
        let omega = 2.0 * PI * freq / sample_rate;
        let (sin_omega, cos_omega) = omega.sin_cos();
        let alpha = sin_omega / (2.0 * q);

        Self::normalized(
            (1.0 + cos_omega) / 2.0,
            -(1.0 + cos_omega),
            (1.0 + cos_omega) / 2.0,
            1.0 + alpha,
            -2.0 * cos_omega,
            1.0 - alpha,
        )
    }
}

/// Direct form I state for one channel
#[derive(Debug, Default, Clone)]
struct BiquadState {
    x1: f64,
    x2: f64,
    y1: f64,
    y2: f64,
}

impl BiquadState {
    #[inline]
    fn process(&mut self, input: f64, coeffs: &BiquadCoeffs) -> f64 {
        let output = coeffs.a0 * input + coeffs.a1 * self.x1 + coeffs.a2 * self.x2
            - coeffs.b1 * self.y1
            - coeffs.b2 * self.y2;

        self.x2 = self.x1;
        self.x1 = input;
        self.y2 = self.y1;
        self.y1 = output;

        output
    }
}

/// Run one channel through a biquad with fresh state
fn filter_channel(samples: &[f32], coeffs: &BiquadCoeffs) -> Vec<f32> {
    let mut state = BiquadState::default();
    samples
        .iter()
        .map(|&s| state.process(s as f64, coeffs) as f32)
        .collect()
}

/// Run every channel through a series of biquad stages
pub fn apply_biquads(buffer: &SampleBuffer, stages: &[BiquadCoeffs]) -> Result<SampleBuffer> {
    buffer.map_channels(|_, samples| {
        let mut out = samples.to_vec();
        for coeffs in stages {
            out = filter_channel(&out, coeffs);
        }
        out
    })
}

fn check_below_nyquist(frequency: f64, sample_rate: u32) -> Result<()> {
    let nyquist = sample_rate as f64 / 2.0;
    if frequency >= nyquist {
        return Err(AudioError::invalid(
            "frequency",
            format!("{frequency} Hz is not below Nyquist ({nyquist} Hz)"),
        ));
    }
    Ok(())
}

fn check_frequency(frequency: f64) -> Result<()> {
    if !(frequency > 0.0) || !frequency.is_finite() {
        return Err(AudioError::invalid(
            "frequency",
            format!("must be a positive number of Hz, got {frequency}"),
        ));
    }
    Ok(())
}

/// EQ band shape
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EqBandKind {
    #[default]
    Peaking,
    LowShelf,
    HighShelf,
}

/// One EQ band
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EqBand {
    pub kind: EqBandKind,
    /// Center / corner frequency in Hz
    pub frequency: f64,
    pub gain_db: f64,
    pub q: f64,
}

impl EqBand {
    /// Create a validated band
    pub fn new(kind: EqBandKind, frequency: f64, gain_db: f64, q: f64) -> Result<Self> {
        let band = Self {
            kind,
            frequency,
            gain_db,
            q,
        };
        band.validate()?;
        Ok(band)
    }

    /// Peaking band shortcut
    pub fn peaking(frequency: f64, gain_db: f64, q: f64) -> Result<Self> {
        Self::new(EqBandKind::Peaking, frequency, gain_db, q)
    }

    pub fn validate(&self) -> Result<()> {
        check_frequency(self.frequency)?;
        if !self.gain_db.is_finite() {
            return Err(AudioError::invalid("gain_db", "must be finite"));
        }
        if !(self.q > 0.0) || !self.q.is_finite() {
            return Err(AudioError::invalid(
                "q",
                format!("must be positive, got {}", self.q),
            ));
        }
        Ok(())
    }

    /// Coefficients for this band at `sample_rate`
    pub fn coefficients(&self, sample_rate: u32) -> Result<BiquadCoeffs> {
        self.validate()?;
        check_below_nyquist(self.frequency, sample_rate)?;
        let sr = sample_rate as f64;
        Ok(match self.kind {
            EqBandKind::Peaking => BiquadCoeffs::peaking(sr, self.frequency, self.gain_db, self.q),
            EqBandKind::LowShelf => {
                BiquadCoeffs::low_shelf(sr, self.frequency, self.gain_db, self.q)
            }
            EqBandKind::HighShelf => {
                BiquadCoeffs::high_shelf(sr, self.frequency, self.gain_db, self.q)
            }
        })
    }
}

/// Apply EQ bands in series
pub fn apply_eq(buffer: &SampleBuffer, bands: &[EqBand]) -> Result<SampleBuffer> {
    let stages = bands
        .iter()
        .map(|band| band.coefficients(buffer.sample_rate()))
        .collect::<Result<Vec<_>>>()?;
    apply_biquads(buffer, &stages)
}

/// Parameters of the single-stage high-pass / low-pass filters (Q fixed at 1)
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PassFilter {
    pub frequency: f64,
}

impl PassFilter {
    pub fn new(frequency: f64) -> Result<Self> {
        check_frequency(frequency)?;
        Ok(Self { frequency })
    }

    pub fn validate(&self) -> Result<()> {
        check_frequency(self.frequency)
    }
}

/// Remove content below `params.frequency`
pub fn high_pass(buffer: &SampleBuffer, params: &PassFilter) -> Result<SampleBuffer> {
    params.validate()?;
    check_below_nyquist(params.frequency, buffer.sample_rate())?;
    let coeffs = BiquadCoeffs::high_pass(
        buffer.sample_rate() as f64,
        params.frequency,
        PASS_FILTER_Q,
    );
    apply_biquads(buffer, &[coeffs])
}

/// Remove content above `params.frequency`
pub fn low_pass(buffer: &SampleBuffer, params: &PassFilter) -> Result<SampleBuffer> {
    params.validate()?;
    check_below_nyquist(params.frequency, buffer.sample_rate())?;
    let coeffs = BiquadCoeffs::low_pass(
        buffer.sample_rate() as f64,
        params.frequency,
        PASS_FILTER_Q,
    );
    apply_biquads(buffer, &[coeffs])
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sine(freq: f64, sample_rate: u32, frames: usize) -> Vec<f32> {
        (0..frames)
            .map(|i| (2.0 * PI * freq * i as f64 / sample_rate as f64).sin() as f32 * 0.5)
            .collect()
    }

    fn rms(samples: &[f32]) -> f32 {
        (samples.iter().map(|s| s * s).sum::<f32>() / samples.len() as f32).sqrt()
    }

    #[test]
    fn test_flat_eq_is_identity() {
        let buffer = SampleBuffer::mono(sine(440.0, 48000, 4800), 48000).unwrap();
        let bands = [
            EqBand::new(EqBandKind::LowShelf, 100.0, 0.0, 0.707).unwrap(),
            EqBand::peaking(1000.0, 0.0, 1.0).unwrap(),
            EqBand::new(EqBandKind::HighShelf, 8000.0, 0.0, 0.707).unwrap(),
        ];
        let out = apply_eq(&buffer, &bands).unwrap();

        for (a, b) in buffer.channel(0).unwrap().iter().zip(out.channel(0).unwrap()) {
            assert!((a - b).abs() < 1e-5);
        }
    }

    #[test]
    fn test_peaking_boost_raises_level() {
        let buffer = SampleBuffer::mono(sine(1000.0, 48000, 48000), 48000).unwrap();
        let out = apply_eq(&buffer, &[EqBand::peaking(1000.0, 6.0, 1.0).unwrap()]).unwrap();

        // Skip the first 1000 samples of filter settling
        let gain = rms(&out.channel(0).unwrap()[1000..]) / rms(&buffer.channel(0).unwrap()[1000..]);
        assert!((gain - 2.0).abs() < 0.05, "Expected ~+6dB, got x{}", gain);
    }

    #[test]
    fn test_high_pass_removes_dc() {
        let buffer = SampleBuffer::mono(vec![1.0; 48000], 48000).unwrap();
        let out = high_pass(&buffer, &PassFilter::new(100.0).unwrap()).unwrap();

        assert_eq!(out.frame_count(), buffer.frame_count());
        assert!(out.channel(0).unwrap()[47999].abs() < 1e-3);
    }

    #[test]
    fn test_low_pass_keeps_dc_and_cuts_highs() {
        let dc = SampleBuffer::mono(vec![0.5; 48000], 48000).unwrap();
        let out = low_pass(&dc, &PassFilter::new(1000.0).unwrap()).unwrap();
        assert!((out.channel(0).unwrap()[47999] - 0.5).abs() < 1e-3);

        let high = SampleBuffer::mono(sine(15000.0, 48000, 48000), 48000).unwrap();
        let out = low_pass(&high, &PassFilter::new(500.0).unwrap()).unwrap();
        assert!(rms(&out.channel(0).unwrap()[1000..]) < 0.01);
    }

    #[test]
    fn test_filters_keep_channels_independent() {
        let buffer = SampleBuffer::new(vec![vec![1.0; 100], vec![0.0; 100]], 8000).unwrap();
        let out = high_pass(&buffer, &PassFilter::new(200.0).unwrap()).unwrap();

        assert_eq!(out.num_channels(), 2);
        assert!(out.channel(1).unwrap().iter().all(|&s| s == 0.0));
    }

    #[test]
    fn test_invalid_parameters_rejected() {
        assert!(PassFilter::new(-10.0).is_err());
        assert!(PassFilter::new(0.0).is_err());
        assert!(EqBand::peaking(1000.0, 3.0, 0.0).is_err());
        assert!(EqBand::peaking(f64::NAN, 3.0, 1.0).is_err());

        let buffer = SampleBuffer::mono(vec![0.0; 10], 8000).unwrap();
        assert!(low_pass(&buffer, &PassFilter::new(5000.0).unwrap()).is_err());
    }
}
