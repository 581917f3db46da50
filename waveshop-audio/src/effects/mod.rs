//! Audio effects for Waveshop
//!
//! Every effect is a function from `(&SampleBuffer, &Params)` to a new
//! `SampleBuffer`. Filters and dynamics keep the frame count; time-based
//! effects append a tail whose length is known up front (`tail_frames`).

mod compressor;
mod delay;
mod distortion;
mod filter;
mod limiter;
mod modulation;
mod reverb;

pub use compressor::{compress, CompressorParams};
pub use delay::{delay, DelayParams, MAX_DELAY_SECS, MAX_FEEDBACK};
pub use distortion::{distort, DistortionParams};
pub use filter::{
    apply_biquads, apply_eq, high_pass, low_pass, BiquadCoeffs, EqBand, EqBandKind, PassFilter,
    PASS_FILTER_Q,
};
pub use limiter::{limit, LimiterParams, DEFAULT_LIMIT};
pub use modulation::{chorus, flanger, modulate, ModulationKind, ModulationParams};
pub use reverb::{
    convolve_direct, reverb, synthesize_impulse, Convolver, ReverbParams, MAX_DECAY_SECS,
};

use crate::error::{AudioError, Result};

/// Linear blend of the unprocessed and processed signal
#[inline(always)]
pub(crate) fn mix_dry_wet(dry: f32, wet: f32, mix: f32) -> f32 {
    dry * (1.0 - mix) + wet * mix
}

/// Wet/dry mix must lie in [0, 1]
pub(crate) fn check_mix(mix: f32) -> Result<()> {
    if !(0.0..=1.0).contains(&mix) {
        return Err(AudioError::invalid(
            "mix",
            format!("must be within [0, 1], got {mix}"),
        ));
    }
    Ok(())
}
