//! Audio engine for Waveshop - buffers, effects, and transforms
//!
//! This crate provides the offline processing pipeline:
//! - SampleBuffer: immutable multichannel PCM data
//! - Effects: biquad EQ and pass filters, compressor, distortion, limiter,
//!   feedback delay, chorus/flanger, convolution reverb
//! - Transforms: normalize, fades, gating, channel mixdown, crossfade,
//!   resampling, time stretch, editing cuts
//! - EffectChain / RenderSession: ordered stages rendered one at a time

mod buffer;
mod chain;
mod error;
pub mod effects;
pub mod transform;

pub use buffer::{secs_to_frames, SampleBuffer};
pub use chain::{Effect, EffectChain, RenderSession};
pub use error::{AudioError, Result};
pub use transform::ChannelMode;

pub use waveshop_analysis::SoundRegion;
