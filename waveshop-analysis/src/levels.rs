//! Peak, RMS and simplified loudness measurements
//!
//! The loudness estimate is a plain RMS approximation (`20*log10(rms) + 3`),
//! not a gated LUFS measurement.

/// Offset added to the RMS level to approximate integrated loudness
const LOUDNESS_OFFSET_DB: f32 = 3.0;

/// Convert dB to linear gain
#[inline]
pub fn db_to_linear(db: f32) -> f32 {
    10.0f32.powf(db / 20.0)
}

/// Convert linear gain to dB (`-inf` for zero)
#[inline]
pub fn linear_to_db(linear: f32) -> f32 {
    20.0 * linear.log10()
}

/// Maximum absolute sample across all channels
pub fn peak<C: AsRef<[f32]>>(channels: &[C]) -> f32 {
    channels
        .iter()
        .flat_map(|ch| ch.as_ref().iter())
        .fold(0.0f32, |max, s| max.max(s.abs()))
}

/// Root-mean-square over every sample of every channel
pub fn rms<C: AsRef<[f32]>>(channels: &[C]) -> f32 {
    let count: usize = channels.iter().map(|ch| ch.as_ref().len()).sum();
    if count == 0 {
        return 0.0;
    }
    // Accumulate in f64 so long buffers don't lose precision
    let sum: f64 = channels
        .iter()
        .flat_map(|ch| ch.as_ref().iter())
        .map(|&s| (s as f64) * (s as f64))
        .sum();
    (sum / count as f64).sqrt() as f32
}

/// Simplified loudness estimate in dB
///
/// Returns `f32::NEG_INFINITY` for digital silence.
pub fn estimate_loudness<C: AsRef<[f32]>>(channels: &[C]) -> f32 {
    let level = rms(channels);
    if level <= 0.0 {
        return f32::NEG_INFINITY;
    }
    linear_to_db(level) + LOUDNESS_OFFSET_DB
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_db_conversions() {
        assert!((db_to_linear(0.0) - 1.0).abs() < 1e-6);
        assert!((db_to_linear(-6.0) - 0.501).abs() < 0.001);
        assert!((linear_to_db(0.5) + 6.02).abs() < 0.01);
        assert_eq!(linear_to_db(0.0), f32::NEG_INFINITY);
    }

    #[test]
    fn test_peak_across_channels() {
        let channels = vec![vec![0.1, -0.7], vec![0.5, 0.2]];
        assert!((peak(&channels) - 0.7).abs() < 1e-6);
    }

    #[test]
    fn test_rms_of_constant_signal() {
        let channels = vec![vec![0.5; 100], vec![-0.5; 100]];
        assert!((rms(&channels) - 0.5).abs() < 1e-6);
    }

    #[test]
    fn test_loudness_estimate() {
        // Full-scale square wave: rms = 1.0 -> 0 dB + 3
        let channels = vec![vec![1.0, -1.0, 1.0, -1.0]];
        assert!((estimate_loudness(&channels) - 3.0).abs() < 1e-4);

        let quiet = vec![vec![0.1; 64]];
        assert!((estimate_loudness(&quiet) - (-17.0)).abs() < 0.01);
    }

    #[test]
    fn test_loudness_of_silence() {
        let channels = vec![vec![0.0f32; 16]];
        assert_eq!(estimate_loudness(&channels), f32::NEG_INFINITY);
        let empty: Vec<Vec<f32>> = Vec::new();
        assert_eq!(estimate_loudness(&empty), f32::NEG_INFINITY);
    }
}
