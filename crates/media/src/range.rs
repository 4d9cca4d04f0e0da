//! Time sub-ranges of an asset.

use serde::{Deserialize, Serialize};

use framesift_common::error::{FramesiftError, FramesiftResult};

/// A `[start, end]` span in seconds with `0 <= start <= end`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TimeRange {
    start: f64,
    end: f64,
}

impl TimeRange {
    /// Build a range, rejecting negative, non-finite, or inverted bounds.
    pub fn new(start: f64, end: f64) -> FramesiftResult<Self> {
        if !start.is_finite() || !end.is_finite() {
            return Err(FramesiftError::media(format!(
                "time range bounds must be finite (got {start}..{end})"
            )));
        }
        if start < 0.0 {
            return Err(FramesiftError::media(format!(
                "time range start must be non-negative (got {start})"
            )));
        }
        if start > end {
            return Err(FramesiftError::media(format!(
                "time range start {start} is after end {end}"
            )));
        }
        Ok(Self { start, end })
    }

    pub fn start(&self) -> f64 {
        self.start
    }

    pub fn end(&self) -> f64 {
        self.end
    }

    /// Length of the range in seconds.
    pub fn duration(&self) -> f64 {
        self.end - self.start
    }

    /// Whether the range lies within `[0, duration]`.
    pub fn fits_within(&self, duration: f64) -> bool {
        self.end <= duration
    }

    /// Clamp the range so it lies within `[0, duration]`.
    pub fn clamped_to(&self, duration: f64) -> Self {
        let end = self.end.min(duration.max(0.0));
        Self {
            start: self.start.min(end),
            end,
        }
    }
}
