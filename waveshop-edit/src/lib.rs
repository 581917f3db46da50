//! Editing state for Waveshop
//!
//! - Regions and loop markers on the timeline
//! - Bounded undo/redo history for selections and edit states
//! - Snap-to-grid with marker magnetism

mod history;
mod selection;
mod snap;

pub use history::History;
pub use selection::{
    EffectSnapshot, HistoryEntry, LoopMarker, Region, SelectionEntry, SelectionManager,
    EDIT_HISTORY_LIMIT, SELECTION_HISTORY_LIMIT,
};
pub use snap::SnapGrid;

use thiserror::Error;

/// Errors raised by editing operations
#[derive(Error, Debug, Clone, PartialEq)]
pub enum EditError {
    #[error("{0} not found")]
    NotFound(String),
    #[error("invalid range: {start} - {end}")]
    InvalidRange { start: f64, end: f64 },
    #[error("invalid marker position: {0}")]
    InvalidPosition(f64),
    #[error("snap interval must be positive, got {0}")]
    InvalidInterval(f64),
}
