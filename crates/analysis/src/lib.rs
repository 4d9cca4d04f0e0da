//! FrameSift Analysis
//!
//! Turns a video asset into a time series of per-frame scores:
//! - **Sampler:** fixed-interval timestamps and a lazy, pull-based frame source
//! - **Motion:** frame-to-frame feature distance
//! - **Human:** per-frame human presence (0.0 or 1.0)
//! - **Run:** the cancellable, progress-reporting orchestrator
//! - **Report:** serializable summaries of a finished run
//!
//! Analyzers are pure consumers of frames. All I/O happens in the sampler,
//! through the [`framesift_media::VideoAsset`] it wraps.

pub mod analyzer;
pub mod error;
pub mod human;
pub mod motion;
pub mod report;
pub mod result;
pub mod run;
pub mod sampler;

pub use analyzer::{AnalyzerKind, FrameAnalyzer, ProgressFn};
pub use error::AnalysisError;
pub use human::{HumanAnalyzer, HumanDetector, SkinToneDetector};
pub use motion::{FeatureExtractor, FeaturePrint, MotionAnalyzer, ThumbnailHistogramExtractor};
pub use report::{AnalysisReport, Segment};
pub use result::FrameResult;
pub use run::{AnalysisRun, AnalysisSnapshot, AnalysisState};
pub use sampler::{sample_timestamps, FrameSampler, FrameSource};
