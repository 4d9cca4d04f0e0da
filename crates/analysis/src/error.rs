//! Analysis failures.

/// Why an analysis run did not produce results.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum AnalysisError {
    /// The asset has no video track, or its duration or frame rate could
    /// not be read.
    #[error("Unable to load track data")]
    UnableToLoadTrackData,

    /// A per-frame computation failed; the whole run is aborted.
    #[error("Frame analysis failed: {0}")]
    FrameAnalysis(String),

    /// The run was cancelled cooperatively.
    #[error("Analysis cancelled")]
    Cancelled,
}

impl AnalysisError {
    pub fn frame_analysis(msg: impl Into<String>) -> Self {
        Self::FrameAnalysis(msg.into())
    }

    /// Whether this outcome is a cancellation rather than a failure.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}
