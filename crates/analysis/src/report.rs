//! Serializable summaries of a finished analysis.

use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use framesift_common::error::FramesiftResult;

use crate::result::FrameResult;

/// A contiguous stretch of samples scoring above a threshold.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Segment {
    pub start: f64,
    pub end: f64,
    /// Highest score inside the segment.
    pub peak: f64,
}

/// The outcome of one run, as written by `framesift analyze --report`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisReport {
    pub generated_at: DateTime<Utc>,
    /// Source file or asset label.
    pub source: String,
    pub analyzer: String,
    pub interval_secs: f64,
    pub duration_secs: f64,
    pub results: Vec<FrameResult>,
}

impl AnalysisReport {
    pub fn new(
        source: impl Into<String>,
        analyzer: impl Into<String>,
        interval_secs: f64,
        duration_secs: f64,
        results: Vec<FrameResult>,
    ) -> Self {
        Self {
            generated_at: Utc::now(),
            source: source.into(),
            analyzer: analyzer.into(),
            interval_secs,
            duration_secs,
            results,
        }
    }

    /// Highest-scoring sample; the earliest wins ties.
    pub fn peak(&self) -> Option<FrameResult> {
        self.results.iter().copied().fold(None, |best, r| match best {
            Some(b) if b.amount >= r.amount => Some(b),
            _ => Some(r),
        })
    }

    pub fn mean_amount(&self) -> Option<f64> {
        if self.results.is_empty() {
            return None;
        }
        let sum: f64 = self.results.iter().map(|r| r.amount).sum();
        Some(sum / self.results.len() as f64)
    }

    /// Merge consecutive samples with `amount > threshold` into segments.
    ///
    /// Each sample covers `[time, time + interval)`, clipped to the asset
    /// duration.
    pub fn segments_above(&self, threshold: f64) -> Vec<Segment> {
        let mut segments: Vec<Segment> = Vec::new();
        let mut open: Option<Segment> = None;

        for r in &self.results {
            if r.amount <= threshold {
                segments.extend(open.take());
                continue;
            }
            let end = (r.time + self.interval_secs).min(self.duration_secs);
            open = Some(match open {
                Some(seg) => Segment {
                    start: seg.start,
                    end,
                    peak: seg.peak.max(r.amount),
                },
                None => Segment {
                    start: r.time,
                    end,
                    peak: r.amount,
                },
            });
        }
        segments.extend(open);
        segments
    }

    pub fn to_json(&self) -> FramesiftResult<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn write_to(&self, path: &Path) -> FramesiftResult<()> {
        std::fs::write(path, self.to_json()?)?;
        tracing::info!(path = %path.display(), results = self.results.len(), "Wrote analysis report");
        Ok(())
    }
}
