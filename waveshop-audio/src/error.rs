//! Error type shared by every buffer operation

use thiserror::Error;
use waveshop_analysis::AnalysisError;

/// Errors that can occur while building or processing sample buffers
#[derive(Error, Debug, Clone, PartialEq)]
pub enum AudioError {
    #[error("invalid parameter {name}: {reason}")]
    InvalidParameter { name: &'static str, reason: String },
    #[error("channel {index} out of range (buffer has {channels})")]
    ChannelOutOfRange { index: usize, channels: usize },
    #[error("buffer has no channels")]
    NoChannels,
    #[error("channel lengths differ: expected {expected} frames, got {actual}")]
    MismatchedLength { expected: usize, actual: usize },
    #[error("channel counts differ: {left} vs {right}")]
    MismatchedChannels { left: usize, right: usize },
    #[error("sample rates differ: {left} Hz vs {right} Hz")]
    SampleRateMismatch { left: u32, right: u32 },
    #[error("processing failed in {stage}: {reason}")]
    Processing { stage: &'static str, reason: String },
    #[error("analysis error: {0}")]
    Analysis(#[from] AnalysisError),
}

impl AudioError {
    pub(crate) fn invalid(name: &'static str, reason: impl Into<String>) -> Self {
        AudioError::InvalidParameter {
            name,
            reason: reason.into(),
        }
    }
}

/// Shorthand result type for buffer operations
pub type Result<T> = std::result::Result<T, AudioError>;
