//! FrameSift Media
//!
//! The boundary between FrameSift and actual video files:
//! - **Asset:** the read-only [`VideoAsset`] capability (duration, video
//!   track metadata, decode-a-frame-near-a-time)
//! - **FFmpeg:** [`FfmpegAsset`], backed by the `ffprobe` and `ffmpeg` binaries
//! - **Synthetic:** [`SyntheticAsset`], an in-memory procedural source
//! - **Range:** validated [`TimeRange`] sub-ranges of an asset
//!
//! Assets never mutate their source, so one `Arc<dyn VideoAsset>` can be
//! shared by any number of concurrent analysis runs and exports.

pub mod asset;
pub mod ffmpeg;
pub mod range;
pub mod synthetic;

pub use asset::*;
pub use ffmpeg::FfmpegAsset;
pub use range::TimeRange;
pub use synthetic::SyntheticAsset;
