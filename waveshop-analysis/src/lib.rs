//! Audio analysis module for Waveshop
//!
//! Works on raw channel slices so it can be shared by the effect engine,
//! the exporter and the command line tools:
//! - Beat and tempo estimation from windowed energy onsets
//! - Silence / sound region detection
//! - Peak, RMS and simplified loudness estimates

mod beats;
mod levels;
mod silence;

pub use beats::{BeatAnalysis, BeatDetector, BEAT_WINDOW_SECS};
pub use levels::{db_to_linear, estimate_loudness, linear_to_db, peak, rms};
pub use silence::{detect_silence, SilenceDetector, SoundRegion};

use thiserror::Error;

/// Errors raised by analysis routines
#[derive(Error, Debug, Clone, PartialEq)]
pub enum AnalysisError {
    #[error("sample rate must be positive")]
    ZeroSampleRate,
    #[error("invalid parameter {name}: {reason}")]
    InvalidParameter { name: &'static str, reason: String },
}
