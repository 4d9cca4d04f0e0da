//! Per-frame analysis output.

use serde::{Deserialize, Serialize};

/// One scored sample: the time the frame was taken from and its score.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FrameResult {
    /// Seconds from the start of the asset.
    pub time: f64,

    /// Analyzer-specific score.
    pub amount: f64,
}

impl FrameResult {
    pub fn new(time: f64, amount: f64) -> Self {
        Self { time, amount }
    }
}
