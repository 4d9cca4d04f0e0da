//! Show video metadata.

use std::path::PathBuf;

use framesift_common::config::AppConfig;
use framesift_media::VideoAsset;

pub async fn run(config: &AppConfig, video: PathBuf) -> anyhow::Result<()> {
    let asset = super::open_asset(config, &video);

    let duration = asset
        .load_duration()
        .await
        .map_err(|e| anyhow::anyhow!("Failed to probe {}: {e}", video.display()))?;

    println!("Video: {}", video.display());
    println!("  Duration: {duration:.3}s");

    match asset.load_video_track().await {
        Ok(track) => {
            println!("  Resolution: {}x{}", track.width, track.height);
            println!("  Frame rate: {:.3} fps", track.frame_rate);
            println!("  Codec: {}", track.codec);
        }
        Err(e) => println!("  Video track: unavailable ({e})"),
    }

    Ok(())
}
