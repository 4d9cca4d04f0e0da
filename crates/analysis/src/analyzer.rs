//! The per-frame analyzer capability.

use std::str::FromStr;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use async_trait::async_trait;

use framesift_common::config::AnalysisDefaults;
use framesift_common::error::FramesiftError;

use crate::error::AnalysisError;
use crate::human::{HumanAnalyzer, SkinToneDetector};
use crate::motion::MotionAnalyzer;
use crate::result::FrameResult;
use crate::sampler::FrameSource;

/// Receives the fraction of the asset analyzed so far, in `[0, 1]`.
pub type ProgressFn = dyn Fn(f64) + Send + Sync;

/// Scores a sequence of frames.
///
/// Implementations pull frames one at a time, check `cancel` after each
/// pull and before any per-frame work, and report `time / duration` through
/// `on_progress` after each result.
#[async_trait]
pub trait FrameAnalyzer: Send + Sync {
    /// Display name, e.g. "Motion".
    fn title(&self) -> &str;

    /// Consume `frames` and return one result per frame, in pull order.
    async fn analyze(
        &self,
        frames: Box<dyn FrameSource>,
        duration: f64,
        cancel: &AtomicBool,
        on_progress: &ProgressFn,
    ) -> Result<Vec<FrameResult>, AnalysisError>;
}

/// Report progress for a frame at `time`, clamped to `[0, 1]`.
pub(crate) fn report_progress(on_progress: &ProgressFn, time: f64, duration: f64) {
    let fraction = if duration > 0.0 { time / duration } else { 1.0 };
    on_progress(fraction.clamp(0.0, 1.0));
}

/// Built-in analyzers, selectable by name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnalyzerKind {
    Motion,
    Human,
}

impl AnalyzerKind {
    pub fn name(self) -> &'static str {
        match self {
            Self::Motion => "motion",
            Self::Human => "human",
        }
    }

    /// Instantiate the analyzer with its default collaborators.
    pub fn build(self, defaults: &AnalysisDefaults) -> Arc<dyn FrameAnalyzer> {
        match self {
            Self::Motion => Arc::new(MotionAnalyzer::default()),
            Self::Human => Arc::new(HumanAnalyzer::new(Box::new(SkinToneDetector::new(
                defaults.skin_coverage_threshold,
            )))),
        }
    }
}

impl FromStr for AnalyzerKind {
    type Err = FramesiftError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "motion" => Ok(Self::Motion),
            "human" | "humans" => Ok(Self::Human),
            other => Err(FramesiftError::config(format!(
                "Unknown analyzer '{other}' (expected motion or human)"
            ))),
        }
    }
}
