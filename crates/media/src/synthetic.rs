//! In-memory procedural assets.
//!
//! A [`SyntheticAsset`] renders each frame from a closure of its timestamp.
//! It exercises the analysis and export pipelines without touching the
//! filesystem, and can be told to fail specific decodes or to have no video
//! track at all.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use image::{Rgb, RgbImage};

use framesift_common::error::{FramesiftError, FramesiftResult};

use crate::asset::{SampledFrame, VideoAsset, VideoTrack};

/// Renders the frame shown at a given time.
pub type FrameGenerator = dyn Fn(f64) -> RgbImage + Send + Sync;

/// A procedural video source.
pub struct SyntheticAsset {
    label: String,
    duration: Option<f64>,
    track: Option<VideoTrack>,
    generator: Arc<FrameGenerator>,
    failing_times: Vec<f64>,
    decode_delay: Option<Duration>,
    metadata_delay: Option<Duration>,
    source_path: Option<PathBuf>,
    decodes: AtomicUsize,
}

impl SyntheticAsset {
    /// A uniformly grey asset of the given duration and geometry.
    pub fn new(duration: f64, width: u32, height: u32, frame_rate: f64) -> Self {
        Self {
            label: format!("synthetic:{width}x{height}@{frame_rate}"),
            duration: Some(duration),
            track: Some(VideoTrack {
                width,
                height,
                frame_rate,
                codec: "rawvideo".to_string(),
            }),
            generator: Arc::new(move |_| RgbImage::from_pixel(width, height, Rgb([128, 128, 128]))),
            failing_times: Vec::new(),
            decode_delay: None,
            metadata_delay: None,
            source_path: None,
            decodes: AtomicUsize::new(0),
        }
    }

    /// A black asset with a white square sweeping left to right over its
    /// duration, so every frame differs from its predecessor.
    pub fn moving_square(duration: f64, width: u32, height: u32, frame_rate: f64) -> Self {
        let side = (width.min(height) / 4).max(1);
        Self::new(duration, width, height, frame_rate).with_generator(move |t| {
            let mut img = RgbImage::new(width, height);
            let span = width.saturating_sub(side) as f64;
            let x0 = ((t / duration.max(f64::EPSILON)).clamp(0.0, 1.0) * span) as u32;
            let y0 = height.saturating_sub(side) / 2;
            for y in y0..(y0 + side).min(height) {
                for x in x0..(x0 + side).min(width) {
                    img.put_pixel(x, y, Rgb([255, 255, 255]));
                }
            }
            img
        })
    }

    /// Replace the frame renderer.
    pub fn with_generator<F>(mut self, generator: F) -> Self
    where
        F: Fn(f64) -> RgbImage + Send + Sync + 'static,
    {
        self.generator = Arc::new(generator);
        self
    }

    /// Make decode requests for these timestamps fail.
    pub fn failing_at(mut self, times: impl IntoIterator<Item = f64>) -> Self {
        self.failing_times.extend(times);
        self
    }

    /// Simulate decode latency per frame.
    pub fn with_decode_delay(mut self, delay: Duration) -> Self {
        self.decode_delay = Some(delay);
        self
    }

    /// Sleep before answering duration and track queries.
    pub fn with_metadata_delay(mut self, delay: Duration) -> Self {
        self.metadata_delay = Some(delay);
        self
    }

    async fn metadata_pause(&self) {
        if let Some(delay) = self.metadata_delay {
            tokio::time::sleep(delay).await;
        }
    }

    /// Drop the video track, as for an audio-only file.
    pub fn without_video_track(mut self) -> Self {
        self.track = None;
        self
    }

    /// Make the duration unloadable.
    pub fn without_duration(mut self) -> Self {
        self.duration = None;
        self
    }

    /// Pretend the asset is backed by `path`.
    pub fn with_source_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.source_path = Some(path.into());
        self
    }

    /// Number of decode requests served so far, failed ones included.
    pub fn decode_count(&self) -> usize {
        self.decodes.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl VideoAsset for SyntheticAsset {
    fn label(&self) -> String {
        self.label.clone()
    }

    fn source_path(&self) -> Option<&Path> {
        self.source_path.as_deref()
    }

    async fn load_duration(&self) -> FramesiftResult<f64> {
        self.metadata_pause().await;
        self.duration
            .ok_or_else(|| FramesiftError::probe("duration unknown"))
    }

    async fn load_video_track(&self) -> FramesiftResult<VideoTrack> {
        self.metadata_pause().await;
        self.track
            .clone()
            .ok_or_else(|| FramesiftError::probe("no video stream"))
    }

    async fn frame_near(&self, time: f64, tolerance: f64) -> FramesiftResult<SampledFrame> {
        self.decodes.fetch_add(1, Ordering::SeqCst);

        if let Some(delay) = self.decode_delay {
            tokio::time::sleep(delay).await;
        }

        let track = self
            .track
            .as_ref()
            .ok_or_else(|| FramesiftError::decode("no video stream"))?;

        if self.failing_times.iter().any(|f| (f - time).abs() < 1e-9) {
            return Err(FramesiftError::decode(format!(
                "synthetic decode failure at {time:.3}s"
            )));
        }

        let snapped = if track.frame_rate > 0.0 {
            (time * track.frame_rate).round() / track.frame_rate
        } else {
            time
        };
        let actual = if (snapped - time).abs() <= tolerance {
            snapped
        } else {
            time
        };

        Ok(SampledFrame {
            time: actual,
            image: (self.generator)(actual),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_snaps_within_tolerance() {
        let asset = SyntheticAsset::new(10.0, 8, 8, 10.0);
        let frame = asset.frame_near(1.04, 0.05).await.unwrap();
        assert!((frame.time - 1.0).abs() < 1e-9);

        let exact = asset.frame_near(1.04, 0.0).await.unwrap();
        assert!((exact.time - 1.04).abs() < 1e-9);
        assert_eq!(asset.decode_count(), 2);
    }

    #[tokio::test]
    async fn test_failing_times() {
        let asset = SyntheticAsset::new(10.0, 8, 8, 10.0).failing_at([2.0]);
        assert!(asset.frame_near(2.0, 0.1).await.is_err());
        assert!(asset.frame_near(3.0, 0.1).await.is_ok());
    }

    #[tokio::test]
    async fn test_missing_track_and_duration() {
        let asset = SyntheticAsset::new(10.0, 8, 8, 10.0)
            .without_video_track()
            .without_duration();
        assert!(asset.load_video_track().await.is_err());
        assert!(asset.load_duration().await.is_err());
    }

    #[tokio::test]
    async fn test_moving_square_zero_height() {
        let asset = SyntheticAsset::moving_square(1.0, 8, 0, 25.0);
        let frame = asset.frame_near(0.5, 0.1).await.unwrap();
        assert_eq!(frame.image.height(), 0);
    }

    #[tokio::test]
    async fn test_moving_square_changes_over_time() {
        let asset = SyntheticAsset::moving_square(4.0, 64, 32, 25.0);
        let a = asset.frame_near(0.0, 0.0).await.unwrap();
        let b = asset.frame_near(3.0, 0.0).await.unwrap();
        assert_eq!(a.image.dimensions(), (64, 32));
        assert_ne!(a.image.as_raw(), b.image.as_raw());
    }
}
