//! FFmpeg-backed assets: metadata via `ffprobe`, frames via `ffmpeg`.
//!
//! Frame requests first use a keyframe-snapping input seek, which is fast
//! but may land anywhere in the preceding GOP. When the decoded frame falls
//! outside the caller's tolerance window the request is repeated with
//! accurate seeking, which decodes forward to the exact timestamp.

use std::path::{Path, PathBuf};
use std::process::Stdio;

use async_trait::async_trait;
use serde::Deserialize;
use tokio::process::Command;
use tokio::sync::OnceCell;

use framesift_common::error::{FramesiftError, FramesiftResult};

use crate::asset::{SampledFrame, VideoAsset, VideoTrack};

/// Default width frames are scaled to before being handed to analyzers.
pub const DEFAULT_FRAME_WIDTH: u32 = 320;

/// A video file read through the FFmpeg command-line tools.
#[derive(Debug)]
pub struct FfmpegAsset {
    path: PathBuf,
    ffmpeg: PathBuf,
    ffprobe: PathBuf,
    frame_width: u32,
    probe: OnceCell<ProbeInfo>,
}

/// Metadata extracted from `ffprobe -show_format -show_streams`.
#[derive(Debug, Clone, PartialEq)]
pub struct ProbeInfo {
    /// Container duration in seconds, falling back to the video stream's.
    pub duration_secs: Option<f64>,

    /// Container start time; decoded timestamps are reported relative to it.
    pub start_time_secs: f64,

    /// First video stream, if any.
    pub video: Option<ProbedVideoStream>,
}

/// Video stream fields from `ffprobe`.
#[derive(Debug, Clone, PartialEq)]
pub struct ProbedVideoStream {
    pub width: u32,
    pub height: u32,
    pub codec: String,
    /// `None` when ffprobe reports `0/0` or nothing usable.
    pub frame_rate: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct FfprobeOutput {
    #[serde(default)]
    streams: Vec<FfprobeStream>,
    format: Option<FfprobeFormat>,
}

#[derive(Debug, Deserialize)]
struct FfprobeStream {
    codec_type: Option<String>,
    codec_name: Option<String>,
    width: Option<u32>,
    height: Option<u32>,
    avg_frame_rate: Option<String>,
    r_frame_rate: Option<String>,
    duration: Option<String>,
}

#[derive(Debug, Deserialize)]
struct FfprobeFormat {
    duration: Option<String>,
    start_time: Option<String>,
}

impl FfmpegAsset {
    /// Open `path` using `ffmpeg`/`ffprobe` from `PATH`.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            ffmpeg: PathBuf::from("ffmpeg"),
            ffprobe: PathBuf::from("ffprobe"),
            frame_width: DEFAULT_FRAME_WIDTH,
            probe: OnceCell::new(),
        }
    }

    /// Use explicit tool binaries.
    pub fn with_tools(mut self, ffmpeg: impl Into<PathBuf>, ffprobe: impl Into<PathBuf>) -> Self {
        self.ffmpeg = ffmpeg.into();
        self.ffprobe = ffprobe.into();
        self
    }

    /// Width decoded frames are scaled to. Height follows the aspect ratio.
    pub fn with_frame_width(mut self, width: u32) -> Self {
        self.frame_width = width.max(2);
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Probe the file once and cache the result.
    pub async fn probe(&self) -> FramesiftResult<&ProbeInfo> {
        self.probe.get_or_try_init(|| self.run_ffprobe()).await
    }

    async fn run_ffprobe(&self) -> FramesiftResult<ProbeInfo> {
        if !self.path.exists() {
            return Err(FramesiftError::FileNotFound {
                path: self.path.clone(),
            });
        }

        tracing::debug!(path = %self.path.display(), "Running ffprobe");
        let output = Command::new(&self.ffprobe)
            .args([
                "-v",
                "error",
                "-print_format",
                "json",
                "-show_format",
                "-show_streams",
            ])
            .arg(&self.path)
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| FramesiftError::probe(format!("Failed to start ffprobe: {e}")))?;

        if !output.status.success() {
            return Err(FramesiftError::probe(format!(
                "ffprobe failed (status {}): {}",
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }

        let info = parse_probe_output(&String::from_utf8_lossy(&output.stdout))?;
        tracing::info!(
            path = %self.path.display(),
            duration_secs = ?info.duration_secs,
            has_video = info.video.is_some(),
            "Probed asset"
        );
        Ok(info)
    }

    async fn decode_at(
        &self,
        info: &ProbeInfo,
        time: f64,
        accurate: bool,
    ) -> FramesiftResult<SampledFrame> {
        let seek = format!("{:.6}", time + info.start_time_secs);
        let filter = format!("scale={}:-2,showinfo", self.frame_width);

        let mut cmd = Command::new(&self.ffmpeg);
        cmd.args(["-hide_banner", "-nostdin", "-loglevel", "info"]);
        if !accurate {
            cmd.arg("-noaccurate_seek");
        }
        cmd.args(["-ss", seek.as_str(), "-copyts", "-i"])
            .arg(&self.path)
            .args([
                "-frames:v",
                "1",
                "-an",
                "-vf",
                filter.as_str(),
                "-f",
                "image2pipe",
                "-c:v",
                "png",
                "pipe:1",
            ])
            .stdin(Stdio::null())
            .kill_on_drop(true);

        let output = cmd
            .output()
            .await
            .map_err(|e| FramesiftError::decode(format!("Failed to start ffmpeg: {e}")))?;

        if !output.status.success() {
            return Err(FramesiftError::decode(format!(
                "ffmpeg frame decode at {time:.3}s failed (status {})",
                output.status
            )));
        }
        if output.stdout.is_empty() {
            return Err(FramesiftError::decode(format!(
                "no frame decoded at {time:.3}s"
            )));
        }

        let image = image::load_from_memory(&output.stdout)
            .map_err(|e| FramesiftError::decode(format!("Invalid frame image at {time:.3}s: {e}")))?
            .to_rgb8();

        let stderr = String::from_utf8_lossy(&output.stderr);
        let actual = match parse_showinfo_pts_time(&stderr) {
            Some(pts_time) => (pts_time - info.start_time_secs).max(0.0),
            None => {
                tracing::debug!(time, "No showinfo timestamp; assuming requested time");
                time
            }
        };

        Ok(SampledFrame {
            time: actual,
            image,
        })
    }
}

#[async_trait]
impl VideoAsset for FfmpegAsset {
    fn label(&self) -> String {
        self.path.display().to_string()
    }

    fn source_path(&self) -> Option<&Path> {
        Some(&self.path)
    }

    async fn load_duration(&self) -> FramesiftResult<f64> {
        let info = self.probe().await?;
        info.duration_secs
            .filter(|d| *d > 0.0)
            .ok_or_else(|| FramesiftError::probe("duration unknown"))
    }

    async fn load_video_track(&self) -> FramesiftResult<VideoTrack> {
        let info = self.probe().await?;
        let stream = info
            .video
            .as_ref()
            .ok_or_else(|| FramesiftError::probe("no video stream"))?;
        let frame_rate = stream
            .frame_rate
            .ok_or_else(|| FramesiftError::probe("video frame rate unavailable"))?;
        Ok(VideoTrack {
            width: stream.width,
            height: stream.height,
            frame_rate,
            codec: stream.codec.clone(),
        })
    }

    async fn frame_near(&self, time: f64, tolerance: f64) -> FramesiftResult<SampledFrame> {
        let info = self.probe().await?;

        if tolerance > 0.0 {
            let fast = self.decode_at(info, time, false).await?;
            if (fast.time - time).abs() <= tolerance {
                return Ok(fast);
            }
            tracing::debug!(
                requested = time,
                actual = fast.time,
                tolerance,
                "Keyframe seek landed outside tolerance; retrying with accurate seek"
            );
        }

        self.decode_at(info, time, true).await
    }
}

/// Parse the JSON printed by `ffprobe -print_format json -show_format -show_streams`.
pub fn parse_probe_output(json: &str) -> FramesiftResult<ProbeInfo> {
    let raw: FfprobeOutput = serde_json::from_str(json)?;

    let video_raw = raw
        .streams
        .iter()
        .find(|s| s.codec_type.as_deref() == Some("video"));

    let video = video_raw.map(|s| ProbedVideoStream {
        width: s.width.unwrap_or(0),
        height: s.height.unwrap_or(0),
        codec: s.codec_name.clone().unwrap_or_default(),
        frame_rate: s
            .avg_frame_rate
            .as_deref()
            .and_then(parse_frame_rate)
            .or_else(|| s.r_frame_rate.as_deref().and_then(parse_frame_rate)),
    });

    let format_duration = raw
        .format
        .as_ref()
        .and_then(|f| f.duration.as_deref())
        .and_then(parse_seconds);
    let stream_duration = video_raw
        .and_then(|s| s.duration.as_deref())
        .and_then(parse_seconds);

    let start_time_secs = raw
        .format
        .as_ref()
        .and_then(|f| f.start_time.as_deref())
        .and_then(parse_seconds)
        .unwrap_or(0.0)
        .max(0.0);

    Ok(ProbeInfo {
        duration_secs: format_duration.or(stream_duration),
        start_time_secs,
        video,
    })
}

/// Parse an ffprobe rate such as `30000/1001` or `25`.
pub fn parse_frame_rate(raw: &str) -> Option<f64> {
    let rate = match raw.split_once('/') {
        Some((num, den)) => {
            let num = num.trim().parse::<f64>().ok()?;
            let den = den.trim().parse::<f64>().ok()?;
            if den == 0.0 {
                return None;
            }
            num / den
        }
        None => raw.trim().parse::<f64>().ok()?,
    };
    (rate.is_finite() && rate > 0.0).then_some(rate)
}

fn parse_seconds(raw: &str) -> Option<f64> {
    raw.trim().parse::<f64>().ok().filter(|v| v.is_finite())
}

/// Extract the first `pts_time:` value logged by the `showinfo` filter.
pub fn parse_showinfo_pts_time(stderr: &str) -> Option<f64> {
    stderr
        .lines()
        .filter(|line| line.contains("showinfo"))
        .find_map(|line| {
            let start = line.find("pts_time:")? + "pts_time:".len();
            line[start..].split_whitespace().next()?.parse::<f64>().ok()
        })
}

/// First line of `<binary> -version`, or `None` when the tool is unavailable.
pub async fn tool_version(binary: &Path) -> Option<String> {
    let output = Command::new(binary)
        .arg("-version")
        .stdin(Stdio::null())
        .kill_on_drop(true)
        .output()
        .await
        .ok()?;
    if !output.status.success() {
        return None;
    }
    String::from_utf8_lossy(&output.stdout)
        .lines()
        .next()
        .map(|line| line.trim().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE_PROBE: &str = r#"{
        "streams": [
            {
                "index": 0,
                "codec_name": "aac",
                "codec_type": "audio",
                "duration": "12.000000"
            },
            {
                "index": 1,
                "codec_name": "h264",
                "codec_type": "video",
                "width": 1280,
                "height": 720,
                "avg_frame_rate": "30000/1001",
                "r_frame_rate": "30000/1001",
                "duration": "11.978644"
            }
        ],
        "format": {
            "filename": "clip.mp4",
            "duration": "12.010000",
            "start_time": "0.000000"
        }
    }"#;

    #[test]
    fn test_parse_probe_output() {
        let info = parse_probe_output(SAMPLE_PROBE).unwrap();
        assert_eq!(info.duration_secs, Some(12.01));
        assert_eq!(info.start_time_secs, 0.0);

        let video = info.video.unwrap();
        assert_eq!(video.width, 1280);
        assert_eq!(video.height, 720);
        assert_eq!(video.codec, "h264");
        assert!((video.frame_rate.unwrap() - 29.97).abs() < 0.01);
    }

    #[test]
    fn test_parse_probe_audio_only() {
        let json = r#"{
            "streams": [{ "codec_type": "audio", "codec_name": "mp3" }],
            "format": { "duration": "180.5" }
        }"#;
        let info = parse_probe_output(json).unwrap();
        assert!(info.video.is_none());
        assert_eq!(info.duration_secs, Some(180.5));
    }

    #[test]
    fn test_parse_probe_falls_back_to_stream_duration() {
        let json = r#"{
            "streams": [{
                "codec_type": "video",
                "codec_name": "vp9",
                "width": 640,
                "height": 360,
                "avg_frame_rate": "0/0",
                "r_frame_rate": "24/1",
                "duration": "4.5"
            }],
            "format": {}
        }"#;
        let info = parse_probe_output(json).unwrap();
        assert_eq!(info.duration_secs, Some(4.5));
        assert_eq!(info.video.unwrap().frame_rate, Some(24.0));
    }

    #[test]
    fn test_parse_probe_rejects_garbage() {
        assert!(parse_probe_output("not json").is_err());
    }

    #[test]
    fn test_parse_frame_rate() {
        assert_eq!(parse_frame_rate("25/1"), Some(25.0));
        assert_eq!(parse_frame_rate("60"), Some(60.0));
        assert_eq!(parse_frame_rate("0/0"), None);
        assert_eq!(parse_frame_rate("abc"), None);
        assert_eq!(parse_frame_rate("-5/1"), None);
    }

    #[test]
    fn test_parse_showinfo_pts_time() {
        let stderr = "\
Input #0, mov,mp4,m4a,3gp,3g2,mj2, from 'clip.mp4':
[Parsed_showinfo_1 @ 0x5581] config in time_base: 1/15360, frame_rate: 30/1
[Parsed_showinfo_1 @ 0x5581] n:   0 pts:  61440 pts_time:4       duration:    512 fmt:yuv420p
frame=    1 fps=0.0 q=-0.0 Lsize=N/A";
        assert_eq!(parse_showinfo_pts_time(stderr), Some(4.0));
    }

    #[test]
    fn test_parse_showinfo_missing() {
        assert_eq!(parse_showinfo_pts_time("frame=1 fps=0.0"), None);
    }

    #[tokio::test]
    async fn test_missing_file_is_reported() {
        let asset = FfmpegAsset::new("/definitely/not/here.mp4");
        let err = asset.load_duration().await.unwrap_err();
        assert!(matches!(err, FramesiftError::FileNotFound { .. }));
    }
}
