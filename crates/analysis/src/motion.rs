//! Motion scoring: distance between consecutive frame fingerprints.
//!
//! # Algorithm
//!
//! 1. **Fingerprint** each frame with a [`FeatureExtractor`].
//! 2. **Compare** with the previous frame's fingerprint (Euclidean distance).
//! 3. **Emit** the distance as the frame's score. The first frame has no
//!    predecessor and scores 0 at time 0.
//!
//! The default [`ThumbnailHistogramExtractor`] combines a small luma
//! thumbnail (spatial layout) with a coarse RGB histogram (colour mass),
//! both normalized to `[0, 1]`, so scores are comparable across resolutions.

use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use image::imageops::{self, FilterType};
use image::RgbImage;

use framesift_common::error::{FramesiftError, FramesiftResult};

use crate::analyzer::{report_progress, FrameAnalyzer, ProgressFn};
use crate::error::AnalysisError;
use crate::result::FrameResult;
use crate::sampler::FrameSource;

/// A fixed-length image fingerprint.
#[derive(Debug, Clone, PartialEq)]
pub struct FeaturePrint {
    values: Vec<f32>,
}

impl FeaturePrint {
    pub fn new(values: Vec<f32>) -> Self {
        Self { values }
    }

    pub fn values(&self) -> &[f32] {
        &self.values
    }

    /// Euclidean distance. Fingerprints of different lengths are not
    /// comparable.
    pub fn distance(&self, other: &FeaturePrint) -> FramesiftResult<f64> {
        if self.values.len() != other.values.len() {
            return Err(FramesiftError::media(format!(
                "feature length mismatch ({} vs {})",
                self.values.len(),
                other.values.len()
            )));
        }

        let sum: f64 = self
            .values
            .iter()
            .zip(&other.values)
            .map(|(a, b)| {
                let d = (*a as f64) - (*b as f64);
                d * d
            })
            .sum();
        Ok(sum.sqrt())
    }
}

/// Produces a fingerprint for a frame.
pub trait FeatureExtractor: Send + Sync {
    fn extract(&self, image: &RgbImage) -> FramesiftResult<FeaturePrint>;
}

/// Luma thumbnail plus per-channel histogram.
#[derive(Debug, Clone)]
pub struct ThumbnailHistogramExtractor {
    /// Thumbnail edge length in pixels.
    pub thumbnail_size: u32,

    /// Histogram bins per colour channel.
    pub bins: usize,
}

impl Default for ThumbnailHistogramExtractor {
    fn default() -> Self {
        Self {
            thumbnail_size: 16,
            bins: 8,
        }
    }
}

impl FeatureExtractor for ThumbnailHistogramExtractor {
    fn extract(&self, image: &RgbImage) -> FramesiftResult<FeaturePrint> {
        let (width, height) = image.dimensions();
        if width == 0 || height == 0 {
            return Err(FramesiftError::media("cannot fingerprint an empty image"));
        }
        if self.thumbnail_size == 0 || self.bins == 0 {
            return Err(FramesiftError::config(
                "thumbnail size and histogram bins must be non-zero",
            ));
        }

        let side = self.thumbnail_size;
        let luma = imageops::grayscale(image);
        let thumb = imageops::resize(&luma, side, side, FilterType::Triangle);

        let mut values = Vec::with_capacity((side * side) as usize + self.bins * 3);
        values.extend(thumb.pixels().map(|p| p.0[0] as f32 / 255.0));

        let mut histogram = vec![0u32; self.bins * 3];
        for pixel in image.pixels() {
            for (channel, &value) in pixel.0.iter().enumerate() {
                let bin = (value as usize * self.bins) / 256;
                histogram[channel * self.bins + bin] += 1;
            }
        }
        let total = (width as f32) * (height as f32);
        values.extend(histogram.into_iter().map(|count| count as f32 / total));

        Ok(FeaturePrint::new(values))
    }
}

/// Scores each frame by how much it differs from the one before.
pub struct MotionAnalyzer {
    extractor: Box<dyn FeatureExtractor>,
}

impl MotionAnalyzer {
    pub fn new(extractor: Box<dyn FeatureExtractor>) -> Self {
        Self { extractor }
    }
}

impl Default for MotionAnalyzer {
    fn default() -> Self {
        Self::new(Box::new(ThumbnailHistogramExtractor::default()))
    }
}

#[async_trait]
impl FrameAnalyzer for MotionAnalyzer {
    fn title(&self) -> &str {
        "Motion"
    }

    async fn analyze(
        &self,
        mut frames: Box<dyn FrameSource>,
        duration: f64,
        cancel: &AtomicBool,
        on_progress: &ProgressFn,
    ) -> Result<Vec<FrameResult>, AnalysisError> {
        let mut results = Vec::with_capacity(frames.remaining());
        let mut previous: Option<FeaturePrint> = None;

        while let Some(frame) = frames.next_frame().await {
            if cancel.load(Ordering::SeqCst) {
                return Err(AnalysisError::Cancelled);
            }

            let print = self.extractor.extract(&frame.image).map_err(|e| {
                tracing::warn!(time = frame.time, error = %e, "Feature extraction failed");
                AnalysisError::frame_analysis("feature print")
            })?;

            let result = match previous.as_ref() {
                None => FrameResult::new(0.0, 0.0),
                Some(prev) => {
                    let distance = print.distance(prev).map_err(|e| {
                        tracing::warn!(time = frame.time, error = %e, "Feature distance failed");
                        AnalysisError::frame_analysis("distance")
                    })?;
                    FrameResult::new(frame.time, distance)
                }
            };

            previous = Some(print);
            results.push(result);
            report_progress(on_progress, result.time, duration);
        }

        tracing::debug!(frames = results.len(), "Motion analysis finished");
        Ok(results)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use framesift_media::SampledFrame;
    use image::Rgb;

    fn solid(value: u8) -> RgbImage {
        RgbImage::from_pixel(32, 24, Rgb([value, value, value]))
    }

    fn frames(images: Vec<(f64, RgbImage)>) -> Box<dyn FrameSource> {
        let frames: Vec<SampledFrame> = images
            .into_iter()
            .map(|(time, image)| SampledFrame { time, image })
            .collect();
        Box::new(frames.into_iter())
    }

    /// Always yields a fingerprint whose length depends on the image width.
    struct WidthSensitiveExtractor;

    impl FeatureExtractor for WidthSensitiveExtractor {
        fn extract(&self, image: &RgbImage) -> FramesiftResult<FeaturePrint> {
            Ok(FeaturePrint::new(vec![0.0; image.width() as usize]))
        }
    }

    #[test]
    fn test_identical_images_have_zero_distance() {
        let extractor = ThumbnailHistogramExtractor::default();
        let a = extractor.extract(&solid(40)).unwrap();
        let b = extractor.extract(&solid(40)).unwrap();
        assert_eq!(a.distance(&b).unwrap(), 0.0);
        assert_eq!(a.values().len(), 16 * 16 + 8 * 3);
    }

    #[test]
    fn test_different_images_have_positive_distance() {
        let extractor = ThumbnailHistogramExtractor::default();
        let dark = extractor.extract(&solid(10)).unwrap();
        let light = extractor.extract(&solid(240)).unwrap();
        assert!(dark.distance(&light).unwrap() > 0.5);
    }

    #[test]
    fn test_empty_image_fails() {
        let extractor = ThumbnailHistogramExtractor::default();
        assert!(extractor.extract(&RgbImage::new(0, 0)).is_err());
    }

    #[tokio::test]
    async fn test_first_frame_scores_zero() {
        let analyzer = MotionAnalyzer::default();
        let cancel = AtomicBool::new(false);
        let results = analyzer
            .analyze(
                frames(vec![(0.0, solid(0)), (1.0, solid(0)), (2.0, solid(255))]),
                3.0,
                &cancel,
                &|_| {},
            )
            .await
            .unwrap();

        assert_eq!(results.len(), 3);
        assert_eq!(results[0], FrameResult::new(0.0, 0.0));
        assert_eq!(results[1].amount, 0.0);
        assert!(results[2].amount > 0.0);
        assert_eq!(results[2].time, 2.0);
    }

    #[tokio::test]
    async fn test_cancel_before_work() {
        let analyzer = MotionAnalyzer::default();
        let cancel = AtomicBool::new(true);
        let outcome = analyzer
            .analyze(frames(vec![(0.0, solid(0))]), 1.0, &cancel, &|_| {})
            .await;
        assert_eq!(outcome, Err(AnalysisError::Cancelled));
    }

    #[tokio::test]
    async fn test_feature_failure_aborts() {
        let analyzer = MotionAnalyzer::default();
        let cancel = AtomicBool::new(false);
        let outcome = analyzer
            .analyze(
                frames(vec![(0.0, solid(0)), (1.0, RgbImage::new(0, 0))]),
                2.0,
                &cancel,
                &|_| {},
            )
            .await;
        assert_eq!(outcome, Err(AnalysisError::frame_analysis("feature print")));
    }

    #[tokio::test]
    async fn test_distance_failure_aborts() {
        let analyzer = MotionAnalyzer::new(Box::new(WidthSensitiveExtractor));
        let cancel = AtomicBool::new(false);
        let outcome = analyzer
            .analyze(
                frames(vec![(0.0, solid(0)), (1.0, RgbImage::new(8, 8))]),
                2.0,
                &cancel,
                &|_| {},
            )
            .await;
        assert_eq!(outcome, Err(AnalysisError::frame_analysis("distance")));
    }
}
