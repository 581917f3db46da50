//! Snap-to-grid

use serde::{Deserialize, Serialize};

use crate::selection::LoopMarker;
use crate::EditError;

/// Regular time grid; positions are in seconds
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SnapGrid {
    pub enabled: bool,
    interval: f64,
}

impl Default for SnapGrid {
    fn default() -> Self {
        Self {
            enabled: true,
            interval: 0.1,
        }
    }
}

impl SnapGrid {
    pub fn new(interval: f64) -> Result<Self, EditError> {
        let mut grid = Self::default();
        grid.set_interval(interval)?;
        Ok(grid)
    }

    /// Grid spacing matching one beat at `bpm`
    pub fn from_bpm(bpm: f64) -> Result<Self, EditError> {
        Self::new(60.0 / bpm)
    }

    pub fn interval(&self) -> f64 {
        self.interval
    }

    pub fn set_interval(&mut self, interval: f64) -> Result<(), EditError> {
        if !(interval > 0.0) || !interval.is_finite() {
            return Err(EditError::InvalidInterval(interval));
        }
        self.interval = interval;
        Ok(())
    }

    /// Nearest grid line, or `time` unchanged while disabled
    pub fn snap(&self, time: f64) -> f64 {
        if !self.enabled {
            return time;
        }
        (time / self.interval).round() * self.interval
    }

    /// Snap target for `time`, letting nearby markers win over the grid
    ///
    /// A marker is chosen when it is strictly closer than the grid point and
    /// no more than one interval away from `time`.
    pub fn find_nearest_snap_point(&self, time: f64, markers: &[LoopMarker]) -> f64 {
        let grid = self.snap(time);
        let grid_distance = (grid - time).abs();

        markers
            .iter()
            .map(|m| (m.position, (m.position - time).abs()))
            .filter(|&(_, d)| d < grid_distance && d <= self.interval)
            .min_by(|a, b| a.1.total_cmp(&b.1))
            .map_or(grid, |(position, _)| position)
    }
}
