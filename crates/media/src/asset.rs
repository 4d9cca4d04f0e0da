//! The video asset capability consumed by analysis and export.

use std::path::Path;

use async_trait::async_trait;
use image::RgbImage;

use framesift_common::error::FramesiftResult;

/// Metadata for the primary video track of an asset.
#[derive(Debug, Clone, PartialEq)]
pub struct VideoTrack {
    /// Coded width in pixels.
    pub width: u32,

    /// Coded height in pixels.
    pub height: u32,

    /// Nominal frames per second.
    pub frame_rate: f64,

    /// Codec short name (e.g. "h264").
    pub codec: String,
}

/// One decoded frame together with the time it was actually taken from.
///
/// `time` may differ from the requested timestamp by up to the tolerance
/// window passed to [`VideoAsset::frame_near`].
#[derive(Debug, Clone)]
pub struct SampledFrame {
    /// Presentation time of the decoded frame, in seconds.
    pub time: f64,

    /// Decoded pixels.
    pub image: RgbImage,
}

/// A read-only video source.
///
/// Implementations must be safe to share between tasks: nothing here
/// mutates the underlying media.
#[async_trait]
pub trait VideoAsset: Send + Sync {
    /// Human-readable label for logs.
    fn label(&self) -> String;

    /// Backing file, if the asset is file based.
    fn source_path(&self) -> Option<&Path>;

    /// Total duration in seconds.
    async fn load_duration(&self) -> FramesiftResult<f64>;

    /// Metadata of the primary video track. Errors when the asset has no
    /// video track or its frame rate cannot be determined.
    async fn load_video_track(&self) -> FramesiftResult<VideoTrack>;

    /// Decode the frame nearest `time`, accepting any frame within
    /// `tolerance` seconds on either side.
    async fn frame_near(&self, time: f64, tolerance: f64) -> FramesiftResult<SampledFrame>;
}
