//! Regions, loop markers, the current selection and their undo histories

use serde::{Deserialize, Serialize};
use tracing::debug;
use uuid::Uuid;
use waveshop_audio::effects::{DelayParams, EqBand, ReverbParams};
use waveshop_audio::{Effect, EffectChain};

use crate::history::History;
use crate::snap::SnapGrid;
use crate::EditError;

/// Depth of the selection-only history
pub const SELECTION_HISTORY_LIMIT: usize = 50;

/// Depth of the edit-state history
pub const EDIT_HISTORY_LIMIT: usize = 20;

fn check_range(start: f64, end: f64) -> Result<(), EditError> {
    if !(start >= 0.0 && start <= end) || !end.is_finite() {
        return Err(EditError::InvalidRange { start, end });
    }
    Ok(())
}

fn check_position(position: f64) -> Result<(), EditError> {
    if !(position >= 0.0) || !position.is_finite() {
        return Err(EditError::InvalidPosition(position));
    }
    Ok(())
}

/// Labeled time span in seconds
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Region {
    pub id: Uuid,
    pub start: f64,
    pub end: f64,
    pub color: String,
    pub label: String,
}

impl Region {
    pub fn duration(&self) -> f64 {
        self.end - self.start
    }

    pub fn contains(&self, time: f64) -> bool {
        time >= self.start && time <= self.end
    }
}

/// Labeled point on the timeline
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoopMarker {
    pub id: Uuid,
    pub position: f64,
    pub color: String,
    pub label: String,
}

impl LoopMarker {
    pub fn new(position: f64, color: impl Into<String>, label: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            position,
            color: color.into(),
            label: label.into(),
        }
    }
}

/// A saved selection
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SelectionEntry {
    pub start: f64,
    pub end: f64,
}

/// Effect settings of the editor at one point in time
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EffectSnapshot {
    pub gain_db: f32,
    pub fade_in: f64,
    pub fade_out: f64,
    pub eq: Vec<EqBand>,
    pub reverb: Option<ReverbParams>,
    pub delay: Option<DelayParams>,
    pub normalize: Option<f32>,
}

impl EffectSnapshot {
    /// Chain that renders these settings
    ///
    /// Order: EQ, gain, delay, reverb, normalize, fades. Neutral settings add
    /// no stage.
    pub fn to_chain(&self) -> EffectChain {
        let mut chain = EffectChain::new();
        if self.eq.iter().any(|band| band.gain_db != 0.0) {
            chain.push(Effect::Eq {
                bands: self.eq.clone(),
            });
        }
        if self.gain_db != 0.0 {
            chain.push(Effect::Gain { db: self.gain_db });
        }
        if let Some(delay) = self.delay {
            chain.push(Effect::Delay(delay));
        }
        if let Some(reverb) = self.reverb {
            chain.push(Effect::Reverb(reverb));
        }
        if let Some(level) = self.normalize {
            chain.push(Effect::Normalize { level });
        }
        if self.fade_in > 0.0 || self.fade_out > 0.0 {
            chain.push(Effect::Fade {
                fade_in: self.fade_in,
                fade_out: self.fade_out,
            });
        }
        chain
    }
}

/// Full edit state stored for undo
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub start: f64,
    pub end: f64,
    pub bookmarks: Vec<LoopMarker>,
    pub effects: EffectSnapshot,
}

/// Timeline editing state of one open file
#[derive(Debug)]
pub struct SelectionManager {
    regions: Vec<Region>,
    markers: Vec<LoopMarker>,
    selection: Option<SelectionEntry>,
    selection_history: History<SelectionEntry>,
    edit_history: History<HistoryEntry>,
    pub snap: SnapGrid,
}

impl Default for SelectionManager {
    fn default() -> Self {
        Self {
            regions: Vec::new(),
            markers: Vec::new(),
            selection: None,
            selection_history: History::new(SELECTION_HISTORY_LIMIT),
            edit_history: History::new(EDIT_HISTORY_LIMIT),
            snap: SnapGrid::default(),
        }
    }
}

impl SelectionManager {
    pub fn new() -> Self {
        Self::default()
    }

    // Regions

    pub fn add_region(
        &mut self,
        start: f64,
        end: f64,
        color: impl Into<String>,
        label: impl Into<String>,
    ) -> Result<Uuid, EditError> {
        check_range(start, end)?;
        let region = Region {
            id: Uuid::new_v4(),
            start,
            end,
            color: color.into(),
            label: label.into(),
        };
        let id = region.id;
        debug!(%id, start, end, "region added");
        self.regions.push(region);
        Ok(id)
    }

    pub fn update_region(&mut self, id: Uuid, start: f64, end: f64) -> Result<(), EditError> {
        check_range(start, end)?;
        let region = self
            .regions
            .iter_mut()
            .find(|r| r.id == id)
            .ok_or_else(|| EditError::NotFound(format!("region {id}")))?;
        region.start = start;
        region.end = end;
        Ok(())
    }

    /// Silent no-op for unknown ids
    pub fn remove_region(&mut self, id: Uuid) {
        self.regions.retain(|r| r.id != id);
    }

    pub fn region(&self, id: Uuid) -> Result<&Region, EditError> {
        self.regions
            .iter()
            .find(|r| r.id == id)
            .ok_or_else(|| EditError::NotFound(format!("region {id}")))
    }

    pub fn regions(&self) -> &[Region] {
        &self.regions
    }

    /// Regions covering `time` (bounds inclusive)
    pub fn regions_at(&self, time: f64) -> Vec<&Region> {
        self.regions.iter().filter(|r| r.contains(time)).collect()
    }

    pub fn clear_regions(&mut self) {
        self.regions.clear();
    }

    // Markers, kept sorted by position

    fn sort_markers(&mut self) {
        self.markers
            .sort_by(|a, b| a.position.total_cmp(&b.position));
    }

    pub fn add_marker(
        &mut self,
        position: f64,
        color: impl Into<String>,
        label: impl Into<String>,
    ) -> Result<Uuid, EditError> {
        check_position(position)?;
        let marker = LoopMarker::new(position, color, label);
        let id = marker.id;
        self.markers.push(marker);
        self.sort_markers();
        Ok(id)
    }

    pub fn move_marker(&mut self, id: Uuid, position: f64) -> Result<(), EditError> {
        check_position(position)?;
        let marker = self
            .markers
            .iter_mut()
            .find(|m| m.id == id)
            .ok_or_else(|| EditError::NotFound(format!("marker {id}")))?;
        marker.position = position;
        self.sort_markers();
        Ok(())
    }

    /// Silent no-op for unknown ids
    pub fn remove_marker(&mut self, id: Uuid) {
        self.markers.retain(|m| m.id != id);
    }

    pub fn markers(&self) -> &[LoopMarker] {
        &self.markers
    }

    /// Snap `time` to the grid or a nearby marker
    pub fn snap_time(&self, time: f64) -> f64 {
        self.snap.find_nearest_snap_point(time, &self.markers)
    }

    // Selection

    pub fn selection(&self) -> Option<SelectionEntry> {
        self.selection
    }

    pub fn set_selection(&mut self, start: f64, end: f64) -> Result<(), EditError> {
        check_range(start, end)?;
        self.selection = Some(SelectionEntry { start, end });
        Ok(())
    }

    pub fn clear_selection(&mut self) {
        self.selection = None;
    }

    /// Select and record in the selection history
    pub fn save_selection(&mut self, start: f64, end: f64) -> Result<(), EditError> {
        self.set_selection(start, end)?;
        self.selection_history.push(SelectionEntry { start, end });
        Ok(())
    }

    /// Restore the previous saved selection
    pub fn undo_selection(&mut self) -> Option<SelectionEntry> {
        let entry = *self.selection_history.undo()?;
        self.selection = Some(entry);
        Some(entry)
    }

    pub fn redo_selection(&mut self) -> Option<SelectionEntry> {
        let entry = *self.selection_history.redo()?;
        self.selection = Some(entry);
        Some(entry)
    }

    pub fn selection_history(&self) -> &History<SelectionEntry> {
        &self.selection_history
    }

    // Edit-state history

    /// Capture the current selection and markers with `effects`
    pub fn capture_state(&self, effects: EffectSnapshot) -> HistoryEntry {
        let (start, end) = self
            .selection
            .map_or((0.0, 0.0), |s| (s.start, s.end));
        HistoryEntry {
            start,
            end,
            bookmarks: self.markers.clone(),
            effects,
        }
    }

    pub fn push_state(&mut self, entry: HistoryEntry) {
        self.edit_history.push(entry);
    }

    /// Step back and restore selection and markers from that entry
    pub fn undo(&mut self) -> Option<&HistoryEntry> {
        let entry = self.edit_history.undo()?.clone();
        self.restore(&entry);
        self.edit_history.current()
    }

    /// Step forward and restore selection and markers from that entry
    pub fn redo(&mut self) -> Option<&HistoryEntry> {
        let entry = self.edit_history.redo()?.clone();
        self.restore(&entry);
        self.edit_history.current()
    }

    fn restore(&mut self, entry: &HistoryEntry) {
        self.selection = (entry.end > entry.start).then_some(SelectionEntry {
            start: entry.start,
            end: entry.end,
        });
        self.markers = entry.bookmarks.clone();
        self.sort_markers();
    }

    pub fn can_undo(&self) -> bool {
        self.edit_history.can_undo()
    }

    pub fn can_redo(&self) -> bool {
        self.edit_history.can_redo()
    }

    pub fn current_state(&self) -> Option<&HistoryEntry> {
        self.edit_history.current()
    }

    pub fn edit_history(&self) -> &History<HistoryEntry> {
        &self.edit_history
    }
}
