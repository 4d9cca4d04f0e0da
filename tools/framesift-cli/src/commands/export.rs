//! Export a time range of a video.

use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use framesift_common::config::AppConfig;
use framesift_export::{ClipExporter, ExportBackend, FfmpegBackend, QualityPreset};
use framesift_media::{TimeRange, VideoAsset};

pub async fn run(
    config: &AppConfig,
    video: PathBuf,
    start: f64,
    end: f64,
    output: PathBuf,
    preset: Option<String>,
) -> anyhow::Result<()> {
    let preset: QualityPreset = preset
        .as_deref()
        .unwrap_or(config.export.preset.as_str())
        .parse()?;
    let range = TimeRange::new(start, end)?;

    let backend = Arc::new(FfmpegBackend::new(config.tools.ffmpeg.clone()));
    if !backend.is_available() {
        anyhow::bail!(
            "{} is not available; run `framesift check`",
            config.tools.ffmpeg.display()
        );
    }

    let asset: Arc<dyn VideoAsset> = Arc::new(super::open_asset(config, &video));
    let duration = asset.load_duration().await?;
    let range = clamp_to_asset(range, duration)?;
    let exporter = Arc::new(
        ClipExporter::new(backend)
            .with_preset(preset)
            .with_poll_interval(Duration::from_millis(config.export.poll_interval_ms)),
    );

    println!("Exporting: {}", video.display());
    println!("  Range: {:.3}s - {:.3}s", range.start(), range.end());
    println!("  Output: {}", output.display());
    println!("  Preset: {preset}");

    let mut rx = exporter.subscribe();
    let mut task = tokio::spawn({
        let exporter = exporter.clone();
        let output = output.clone();
        async move { exporter.export(asset, range, &output).await }
    });

    let ctrl_c = tokio::spawn({
        let exporter = exporter.clone();
        async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                println!("\n  Cancelling...");
                exporter.cancel();
            }
        }
    });

    loop {
        tokio::select! {
            joined = &mut task => {
                joined?;
                break;
            }
            changed = rx.changed() => {
                if changed.is_err() {
                    break;
                }
                let snapshot = rx.borrow_and_update().clone();
                if snapshot.is_exporting {
                    print!("\r  Progress: {:.1}%  ", snapshot.progress * 100.0);
                    std::io::stdout().flush().ok();
                }
            }
        }
    }
    ctrl_c.abort();
    println!();

    let snapshot = exporter.snapshot();
    if let Some(e) = snapshot.error {
        anyhow::bail!("Export failed: {e}");
    }
    match snapshot.last_output_path {
        Some(path) => println!("Export complete: {}", path.display()),
        None => println!("Export cancelled."),
    }

    Ok(())
}

/// Trim a range that runs past the end of the asset. A range lying
/// entirely beyond the end is an error.
fn clamp_to_asset(range: TimeRange, duration: f64) -> anyhow::Result<TimeRange> {
    if range.fits_within(duration) {
        return Ok(range);
    }
    let clamped = range.clamped_to(duration);
    if clamped.duration() <= 0.0 {
        anyhow::bail!(
            "range {:.3}s - {:.3}s starts past the end of the video ({duration:.3}s)",
            range.start(),
            range.end()
        );
    }
    tracing::warn!(
        requested_end = range.end(),
        duration,
        "Export range runs past the end of the video; trimming"
    );
    Ok(clamped)
}
