//! Check system capabilities.

use std::path::Path;

use framesift_common::config::AppConfig;
use framesift_media::ffmpeg::tool_version;

/// Report tool availability and the config file at `config_path`. When
/// `init_config` is given and no file exists there, write it.
pub async fn run(
    config: &AppConfig,
    config_path: &Path,
    init_config: Option<&AppConfig>,
) -> anyhow::Result<()> {
    println!("FrameSift System Check");
    println!("{}", "=".repeat(50));

    let mut all_ok = true;
    for (name, binary) in [
        ("ffmpeg", &config.tools.ffmpeg),
        ("ffprobe", &config.tools.ffprobe),
    ] {
        match tool_version(binary).await {
            Some(version) => println!("[OK] {name}: {version}"),
            None => {
                all_ok = false;
                println!("[MISSING] {name} ({})", binary.display());
            }
        }
    }

    println!();
    let written = match init_config {
        Some(file_config) => write_if_missing(file_config, config_path)?,
        None => false,
    };
    if written {
        println!("[OK] Wrote config: {}", config_path.display());
    } else {
        println!(
            "Config: {} ({})",
            config_path.display(),
            if config_path.exists() { "found" } else { "defaults" }
        );
    }

    println!();
    if all_ok {
        println!("All required tools are available. FrameSift is ready.");
    } else {
        println!("Install ffmpeg (which ships ffprobe) or point tools.ffmpeg/tools.ffprobe at it.");
    }

    Ok(())
}

/// Save `config` to `path` unless a file is already there.
fn write_if_missing(config: &AppConfig, path: &Path) -> std::io::Result<bool> {
    if path.exists() {
        return Ok(false);
    }
    config.save_to(path)?;
    tracing::info!(path = %path.display(), "Wrote config file");
    Ok(true)
}
