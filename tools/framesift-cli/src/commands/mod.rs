pub mod analyze;
pub mod check;
pub mod export;
pub mod probe;

use framesift_common::config::AppConfig;
use framesift_media::FfmpegAsset;

/// Open `video` with the configured tool binaries.
pub(crate) fn open_asset(config: &AppConfig, video: &std::path::Path) -> FfmpegAsset {
    FfmpegAsset::new(video)
        .with_tools(config.tools.ffmpeg.clone(), config.tools.ffprobe.clone())
        .with_frame_width(config.analysis.frame_width)
}
