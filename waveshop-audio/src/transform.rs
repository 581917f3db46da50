//! Whole-buffer transforms: gain staging, fades, channel routing, editing,
//! resampling and measurement.
//!
//! All functions return a freshly allocated buffer and leave their input alone.

use serde::{Deserialize, Serialize};
use waveshop_analysis::{db_to_linear, SoundRegion};

use crate::buffer::{secs_to_frames, SampleBuffer};
use crate::error::{AudioError, Result};

/// Gain applied to samples under the noise gate threshold
const GATE_ATTENUATION: f32 = 0.1;

fn check_non_negative(name: &'static str, value: f64) -> Result<()> {
    if !(value >= 0.0) || !value.is_finite() {
        return Err(AudioError::invalid(
            name,
            format!("must be a non-negative number, got {value}"),
        ));
    }
    Ok(())
}

/// Scale so the loudest sample sits at `target_level`
///
/// An all-zero buffer is returned unchanged.
pub fn normalize(buffer: &SampleBuffer, target_level: f32) -> Result<SampleBuffer> {
    if !(target_level > 0.0) || !target_level.is_finite() {
        return Err(AudioError::invalid(
            "target_level",
            format!("must be positive, got {target_level}"),
        ));
    }
    let peak = buffer.peak();
    if peak == 0.0 {
        return Ok(buffer.clone());
    }
    let gain = target_level / peak;
    Ok(buffer.map_samples(|s| s * gain))
}

/// Apply a gain change in dB
pub fn apply_gain_db(buffer: &SampleBuffer, gain_db: f32) -> Result<SampleBuffer> {
    if !gain_db.is_finite() {
        return Err(AudioError::invalid("gain_db", "must be finite"));
    }
    let gain = db_to_linear(gain_db);
    Ok(buffer.map_samples(|s| s * gain))
}

/// Linear fade-in over the first `fade_in` seconds and fade-out over the last
/// `fade_out` seconds
///
/// Fades longer than the buffer cover the whole buffer; overlapping fades
/// multiply.
pub fn fade(buffer: &SampleBuffer, fade_in: f64, fade_out: f64) -> Result<SampleBuffer> {
    check_non_negative("fade_in", fade_in)?;
    check_non_negative("fade_out", fade_out)?;

    let len = buffer.frame_count();
    let in_frames = buffer.frames_for(fade_in).min(len);
    let out_frames = buffer.frames_for(fade_out).min(len);

    let gain_at = |i: usize| -> f32 {
        let mut gain = 1.0;
        if i < in_frames {
            gain *= i as f32 / in_frames as f32;
        }
        let from_end = len - 1 - i;
        if from_end < out_frames {
            gain *= from_end as f32 / out_frames as f32;
        }
        gain
    };

    buffer.map_channels(|_, samples| {
        samples
            .iter()
            .enumerate()
            .map(|(i, &s)| s * gain_at(i))
            .collect()
    })
}

/// Attenuate samples whose magnitude is below `threshold` to 10%
pub fn noise_gate(buffer: &SampleBuffer, threshold: f32) -> Result<SampleBuffer> {
    if !(threshold >= 0.0) {
        return Err(AudioError::invalid(
            "threshold",
            format!("must be non-negative, got {threshold}"),
        ));
    }
    Ok(buffer.map_samples(|s| {
        if s.abs() < threshold {
            s * GATE_ATTENUATION
        } else {
            s
        }
    }))
}

/// Output channel layout
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChannelMode {
    /// Average of all channels
    Mono,
    /// Channel 0 only
    Left,
    /// Channel 1 only
    Right,
    /// Two channels
    #[default]
    Stereo,
}

/// Route channels into the requested layout
///
/// `Stereo` leaves buffers with two or more channels untouched and duplicates
/// a mono channel.
pub fn mixdown(buffer: &SampleBuffer, mode: ChannelMode) -> Result<SampleBuffer> {
    let sample_rate = buffer.sample_rate();
    match mode {
        ChannelMode::Mono => {
            let count = buffer.num_channels() as f32;
            let mixed = (0..buffer.frame_count())
                .map(|i| buffer.channels().iter().map(|ch| ch[i]).sum::<f32>() / count)
                .collect();
            SampleBuffer::mono(mixed, sample_rate)
        }
        ChannelMode::Left => SampleBuffer::mono(buffer.channel(0)?.to_vec(), sample_rate),
        ChannelMode::Right => SampleBuffer::mono(buffer.channel(1)?.to_vec(), sample_rate),
        ChannelMode::Stereo => {
            if buffer.num_channels() >= 2 {
                Ok(buffer.clone())
            } else {
                let mono = buffer.channel(0)?.to_vec();
                SampleBuffer::new(vec![mono.clone(), mono], sample_rate)
            }
        }
    }
}

/// Join `a` and `b`, overlapping `duration` seconds with a linear crossfade
///
/// Result length is `len(a) + len(b) - overlap`; the overlap is capped at the
/// shorter of the two buffers.
pub fn crossfade(a: &SampleBuffer, b: &SampleBuffer, duration: f64) -> Result<SampleBuffer> {
    check_non_negative("duration", duration)?;
    a.ensure_compatible(b)?;

    let len_a = a.frame_count();
    let len_b = b.frame_count();
    let overlap = a.frames_for(duration).min(len_a).min(len_b);
    let start = len_a - overlap;

    let channels = a
        .channels()
        .iter()
        .zip(b.channels())
        .map(|(ch_a, ch_b)| {
            let mut out = Vec::with_capacity(len_a + len_b - overlap);
            out.extend_from_slice(&ch_a[..start]);
            for k in 0..overlap {
                let t = k as f32 / overlap as f32;
                out.push(ch_a[start + k] * (1.0 - t) + ch_b[k] * t);
            }
            out.extend_from_slice(&ch_b[overlap..]);
            out
        })
        .collect();

    SampleBuffer::new(channels, a.sample_rate())
}

/// Append `b` after `a`
pub fn concat(a: &SampleBuffer, b: &SampleBuffer) -> Result<SampleBuffer> {
    crossfade(a, b, 0.0)
}

/// Linear-interpolation read at a fractional index (clamped to the last sample)
#[inline]
fn interpolate(samples: &[f32], position: f64) -> f32 {
    let index = position.floor() as usize;
    let frac = (position - index as f64) as f32;
    let last = samples.len() - 1;
    let s0 = samples[index.min(last)];
    let s1 = samples[(index + 1).min(last)];
    s0 + (s1 - s0) * frac
}

/// Re-index every channel to `new_len` frames stepping `step` source frames
fn reindex(buffer: &SampleBuffer, new_len: usize, step: f64, sample_rate: u32) -> Result<SampleBuffer> {
    let channels = buffer
        .channels()
        .iter()
        .map(|ch| {
            if ch.is_empty() {
                return Vec::new();
            }
            (0..new_len).map(|i| interpolate(ch, i as f64 * step)).collect()
        })
        .collect();
    SampleBuffer::new(channels, sample_rate)
}

/// Linear-interpolation sample rate conversion
///
/// New length is `floor(len * target_rate / rate)`.
pub fn resample(buffer: &SampleBuffer, target_rate: u32) -> Result<SampleBuffer> {
    if target_rate == 0 {
        return Err(AudioError::invalid("target_rate", "must be positive"));
    }
    let rate = buffer.sample_rate();
    if rate == target_rate {
        return Ok(buffer.clone());
    }
    let new_len = (buffer.frame_count() as u64 * target_rate as u64 / rate as u64) as usize;
    let step = rate as f64 / target_rate as f64;
    reindex(buffer, new_len, step, target_rate)
}

/// Naive time stretch by `ratio` (pitch changes along with duration)
///
/// New length is `floor(len * ratio)`; the sample rate is unchanged.
pub fn time_stretch(buffer: &SampleBuffer, ratio: f64) -> Result<SampleBuffer> {
    if !(ratio > 0.0) || !ratio.is_finite() {
        return Err(AudioError::invalid(
            "ratio",
            format!("must be positive, got {ratio}"),
        ));
    }
    let new_len = (buffer.frame_count() as f64 * ratio).floor() as usize;
    reindex(buffer, new_len, 1.0 / ratio, buffer.sample_rate())
}

/// Reverse every channel
pub fn reverse(buffer: &SampleBuffer) -> Result<SampleBuffer> {
    buffer.map_channels(|_, samples| samples.iter().rev().copied().collect())
}

/// Convert a `[start, end)` range in seconds to clamped frame indices
fn frame_range(buffer: &SampleBuffer, start: f64, end: f64) -> Result<(usize, usize)> {
    check_non_negative("start", start)?;
    check_non_negative("end", end)?;
    if start > end {
        return Err(AudioError::invalid(
            "range",
            format!("start {start} s is after end {end} s"),
        ));
    }
    let len = buffer.frame_count();
    Ok((
        buffer.frames_for(start).min(len),
        buffer.frames_for(end).min(len),
    ))
}

/// Keep only `[start, end)` seconds
pub fn trim(buffer: &SampleBuffer, start: f64, end: f64) -> Result<SampleBuffer> {
    let (from, to) = frame_range(buffer, start, end)?;
    buffer.map_channels(|_, samples| samples[from..to].to_vec())
}

/// Cut `[start, end)` seconds out and join the remaining parts
pub fn delete_range(buffer: &SampleBuffer, start: f64, end: f64) -> Result<SampleBuffer> {
    let (from, to) = frame_range(buffer, start, end)?;
    buffer.map_channels(|_, samples| {
        let mut out = Vec::with_capacity(samples.len() - (to - from));
        out.extend_from_slice(&samples[..from]);
        out.extend_from_slice(&samples[to..]);
        out
    })
}

/// Insert `duration` seconds of silence at `at` seconds
pub fn insert_silence(buffer: &SampleBuffer, at: f64, duration: f64) -> Result<SampleBuffer> {
    check_non_negative("at", at)?;
    check_non_negative("duration", duration)?;
    let pos = buffer.frames_for(at).min(buffer.frame_count());
    let gap = secs_to_frames(duration, buffer.sample_rate());
    buffer.map_channels(|_, samples| {
        let mut out = Vec::with_capacity(samples.len() + gap);
        out.extend_from_slice(&samples[..pos]);
        out.extend(std::iter::repeat(0.0).take(gap));
        out.extend_from_slice(&samples[pos..]);
        out
    })
}

/// Sound regions separated by silences of at least `min_duration` seconds
pub fn detect_silence(
    buffer: &SampleBuffer,
    threshold: f32,
    min_duration: f64,
) -> Result<Vec<SoundRegion>> {
    Ok(waveshop_analysis::detect_silence(
        buffer.channels(),
        buffer.sample_rate(),
        threshold,
        min_duration,
    )?)
}

/// Simplified loudness estimate (`20*log10(rms) + 3`)
pub fn estimate_loudness(buffer: &SampleBuffer) -> f32 {
    waveshop_analysis::estimate_loudness(buffer.channels())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ramp(frames: usize) -> Vec<f32> {
        (0..frames).map(|i| i as f32 / frames as f32).collect()
    }

    #[test]
    fn test_normalize_hits_target() {
        let buffer = SampleBuffer::new(vec![vec![0.1, -0.4, 0.2], vec![0.05, 0.3, -0.1]], 8000)
            .unwrap();
        let out = normalize(&buffer, 0.9).unwrap();

        assert!((out.peak() - 0.9).abs() < 1e-6);
        assert!((out.channel(0).unwrap()[0] - 0.225).abs() < 1e-6);
        // Input untouched
        assert_eq!(buffer.channel(0).unwrap()[1], -0.4);
    }

    #[test]
    fn test_normalize_silence_is_noop() {
        let buffer = SampleBuffer::silent(2, 100, 8000).unwrap();
        assert_eq!(normalize(&buffer, 1.0).unwrap(), buffer);
        assert!(normalize(&buffer, 0.0).is_err());
    }

    #[test]
    fn test_gain_db() {
        let buffer = SampleBuffer::mono(vec![0.5], 8000).unwrap();
        let out = apply_gain_db(&buffer, -6.0206).unwrap();
        assert!((out.channel(0).unwrap()[0] - 0.25).abs() < 1e-4);
    }

    #[test]
    fn test_fades() {
        let buffer = SampleBuffer::mono(vec![1.0; 10], 10).unwrap();
        let out = fade(&buffer, 0.4, 0.2).unwrap();
        let samples = out.channel(0).unwrap();

        assert_eq!(samples[0], 0.0);
        assert!((samples[1] - 0.25).abs() < 1e-6);
        assert!((samples[3] - 0.75).abs() < 1e-6);
        assert_eq!(samples[4], 1.0);
        assert!((samples[8] - 0.5).abs() < 1e-6);
        assert_eq!(samples[9], 0.0);
        assert_eq!(out.frame_count(), 10);
    }

    #[test]
    fn test_fade_longer_than_buffer() {
        let buffer = SampleBuffer::mono(vec![1.0; 4], 4).unwrap();
        let out = fade(&buffer, 10.0, 0.0).unwrap();
        assert_eq!(out.channel(0).unwrap(), &[0.0, 0.25, 0.5, 0.75]);
        assert!(fade(&buffer, -1.0, 0.0).is_err());
    }

    #[test]
    fn test_noise_gate() {
        let buffer = SampleBuffer::mono(vec![0.01, -0.02, 0.5, -0.6], 8000).unwrap();
        let out = noise_gate(&buffer, 0.1).unwrap();
        let samples = out.channel(0).unwrap();

        assert!((samples[0] - 0.001).abs() < 1e-7);
        assert!((samples[1] + 0.002).abs() < 1e-7);
        assert_eq!(&samples[2..], &[0.5, -0.6]);
    }

    #[test]
    fn test_mixdown_modes() {
        let buffer = SampleBuffer::new(vec![vec![1.0, 0.0], vec![0.0, 1.0]], 8000).unwrap();

        let mono = mixdown(&buffer, ChannelMode::Mono).unwrap();
        assert_eq!(mono.channels(), &[vec![0.5, 0.5]]);

        let right = mixdown(&buffer, ChannelMode::Right).unwrap();
        assert_eq!(right.channels(), &[vec![0.0, 1.0]]);

        assert_eq!(mixdown(&buffer, ChannelMode::Stereo).unwrap(), buffer);

        let single = SampleBuffer::mono(vec![0.3, 0.4], 8000).unwrap();
        assert_eq!(
            mixdown(&single, ChannelMode::Right).unwrap_err(),
            AudioError::ChannelOutOfRange {
                index: 1,
                channels: 1
            }
        );
        assert_eq!(mixdown(&single, ChannelMode::Stereo).unwrap().num_channels(), 2);
    }

    #[test]
    fn test_crossfade_length_and_blend() {
        let a = SampleBuffer::mono(vec![1.0; 10], 10).unwrap();
        let b = SampleBuffer::mono(vec![0.0; 6], 10).unwrap();
        let out = crossfade(&a, &b, 0.4).unwrap();
        let samples = out.channel(0).unwrap();

        assert_eq!(out.frame_count(), 10 + 6 - 4);
        assert_eq!(samples[5], 1.0);
        assert_eq!(samples[6], 1.0); // t = 0
        assert!((samples[7] - 0.75).abs() < 1e-6);
        assert!((samples[9] - 0.25).abs() < 1e-6);
        assert_eq!(samples[10], 0.0);
    }

    #[test]
    fn test_crossfade_requires_matching_buffers() {
        let a = SampleBuffer::mono(vec![1.0; 10], 10).unwrap();
        let b = SampleBuffer::mono(vec![1.0; 10], 20).unwrap();
        assert!(matches!(
            crossfade(&a, &b, 0.1),
            Err(AudioError::SampleRateMismatch { .. })
        ));

        let c = SampleBuffer::silent(2, 10, 10).unwrap();
        assert!(matches!(
            crossfade(&a, &c, 0.1),
            Err(AudioError::MismatchedChannels { .. })
        ));
    }

    #[test]
    fn test_concat() {
        let a = SampleBuffer::mono(vec![1.0, 2.0], 10).unwrap();
        let b = SampleBuffer::mono(vec![3.0], 10).unwrap();
        assert_eq!(concat(&a, &b).unwrap().channel(0).unwrap(), &[1.0, 2.0, 3.0]);
    }

    #[test]
    fn test_resample_length_and_values() {
        let buffer = SampleBuffer::mono(ramp(441), 44100).unwrap();
        let out = resample(&buffer, 48000).unwrap();

        assert_eq!(out.frame_count(), 480);
        assert_eq!(out.sample_rate(), 48000);

        let down = resample(&SampleBuffer::mono(vec![0.0, 1.0, 2.0, 3.0], 4).unwrap(), 2).unwrap();
        assert_eq!(down.channel(0).unwrap(), &[0.0, 2.0]);

        let up = resample(&SampleBuffer::mono(vec![0.0, 1.0], 2).unwrap(), 4).unwrap();
        assert_eq!(up.channel(0).unwrap(), &[0.0, 0.5, 1.0, 1.0]);
    }

    #[test]
    fn test_time_stretch() {
        let buffer = SampleBuffer::mono(vec![0.0, 1.0, 2.0, 3.0], 8000).unwrap();
        let out = time_stretch(&buffer, 1.5).unwrap();

        assert_eq!(out.frame_count(), 6);
        assert_eq!(out.sample_rate(), 8000);
        assert!((out.channel(0).unwrap()[1] - 0.6666667).abs() < 1e-5);
        assert!(time_stretch(&buffer, 0.0).is_err());
    }

    #[test]
    fn test_editing_ops() {
        let buffer = SampleBuffer::mono(vec![0.0, 1.0, 2.0, 3.0, 4.0], 5).unwrap();

        assert_eq!(
            reverse(&buffer).unwrap().channel(0).unwrap(),
            &[4.0, 3.0, 2.0, 1.0, 0.0]
        );
        assert_eq!(trim(&buffer, 0.2, 0.6).unwrap().channel(0).unwrap(), &[1.0, 2.0]);
        assert_eq!(
            delete_range(&buffer, 0.2, 0.6).unwrap().channel(0).unwrap(),
            &[0.0, 3.0, 4.0]
        );
        assert_eq!(
            insert_silence(&buffer, 0.4, 0.4).unwrap().channel(0).unwrap(),
            &[0.0, 1.0, 0.0, 0.0, 2.0, 3.0, 4.0]
        );
        assert!(trim(&buffer, 0.6, 0.2).is_err());
    }

    #[test]
    fn test_loudness_and_silence_wrappers() {
        let buffer = SampleBuffer::mono(vec![1.0, -1.0, 1.0, -1.0], 4).unwrap();
        assert!((estimate_loudness(&buffer) - 3.0).abs() < 1e-4);

        let regions = detect_silence(&buffer, 0.01, 0.5).unwrap();
        assert_eq!(regions.len(), 1);
        assert!(detect_silence(&buffer, -1.0, 0.5).is_err());
    }
}
