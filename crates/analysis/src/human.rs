//! Human presence scoring.

use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use image::RgbImage;

use framesift_common::error::{FramesiftError, FramesiftResult};

use crate::analyzer::{report_progress, FrameAnalyzer, ProgressFn};
use crate::error::AnalysisError;
use crate::result::FrameResult;
use crate::sampler::FrameSource;

/// Decides whether a frame shows at least one person.
pub trait HumanDetector: Send + Sync {
    fn detect(&self, image: &RgbImage) -> FramesiftResult<bool>;
}

/// Flags a frame when enough of it is skin-toned.
///
/// Pixels are classified in YCbCr space using the usual skin cluster
/// (`77 <= Cb <= 127`, `133 <= Cr <= 173`), which is largely independent of
/// brightness and skin shade.
#[derive(Debug, Clone)]
pub struct SkinToneDetector {
    /// Minimum fraction of skin pixels for a positive detection.
    pub coverage_threshold: f64,
}

impl SkinToneDetector {
    pub fn new(coverage_threshold: f64) -> Self {
        Self { coverage_threshold }
    }

    /// Fraction of pixels that fall in the skin cluster.
    pub fn coverage(&self, image: &RgbImage) -> FramesiftResult<f64> {
        let total = image.width() as u64 * image.height() as u64;
        if total == 0 {
            return Err(FramesiftError::media("cannot classify an empty image"));
        }

        let skin = image.pixels().filter(|p| is_skin(p.0)).count() as u64;
        Ok(skin as f64 / total as f64)
    }
}

impl Default for SkinToneDetector {
    fn default() -> Self {
        Self::new(0.08)
    }
}

impl HumanDetector for SkinToneDetector {
    fn detect(&self, image: &RgbImage) -> FramesiftResult<bool> {
        Ok(self.coverage(image)? >= self.coverage_threshold)
    }
}

fn is_skin([r, g, b]: [u8; 3]) -> bool {
    let (r, g, b) = (r as f64, g as f64, b as f64);
    let cb = 128.0 - 0.168736 * r - 0.331264 * g + 0.5 * b;
    let cr = 128.0 + 0.5 * r - 0.418688 * g - 0.081312 * b;
    (77.0..=127.0).contains(&cb) && (133.0..=173.0).contains(&cr)
}

/// Scores each frame 1.0 when a person is detected and 0.0 otherwise.
///
/// Detector errors are treated as "no person"; only cancellation stops the
/// analysis.
pub struct HumanAnalyzer {
    detector: Box<dyn HumanDetector>,
}

impl HumanAnalyzer {
    pub fn new(detector: Box<dyn HumanDetector>) -> Self {
        Self { detector }
    }
}

impl Default for HumanAnalyzer {
    fn default() -> Self {
        Self::new(Box::new(SkinToneDetector::default()))
    }
}

#[async_trait]
impl FrameAnalyzer for HumanAnalyzer {
    fn title(&self) -> &str {
        "Humans"
    }

    async fn analyze(
        &self,
        mut frames: Box<dyn FrameSource>,
        duration: f64,
        cancel: &AtomicBool,
        on_progress: &ProgressFn,
    ) -> Result<Vec<FrameResult>, AnalysisError> {
        let mut results = Vec::with_capacity(frames.remaining());

        while let Some(frame) = frames.next_frame().await {
            if cancel.load(Ordering::SeqCst) {
                return Err(AnalysisError::Cancelled);
            }

            let present = match self.detector.detect(&frame.image) {
                Ok(present) => present,
                Err(e) => {
                    tracing::warn!(time = frame.time, error = %e, "Human detection failed");
                    false
                }
            };

            results.push(FrameResult::new(frame.time, if present { 1.0 } else { 0.0 }));
            report_progress(on_progress, frame.time, duration);
        }

        tracing::debug!(frames = results.len(), "Human analysis finished");
        Ok(results)
    }
}
