//! Output containers and quality presets.

use std::fmt;
use std::str::FromStr;

use framesift_common::error::FramesiftError;
use framesift_media::VideoTrack;

/// Container written by an export, chosen from the output extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContainerFormat {
    Mp4,
    M4v,
    Mov,
    Mkv,
    WebM,
}

impl ContainerFormat {
    /// Container for a file extension (case-insensitive, without the dot).
    /// Unrecognized extensions map to MP4.
    pub fn from_extension(ext: &str) -> Self {
        match ext.to_ascii_lowercase().as_str() {
            "m4v" => Self::M4v,
            "mov" | "qt" => Self::Mov,
            "mkv" => Self::Mkv,
            "webm" => Self::WebM,
            _ => Self::Mp4,
        }
    }

    /// Extensions this container is written under.
    pub fn extensions(self) -> &'static [&'static str] {
        match self {
            Self::Mp4 => &["mp4"],
            Self::M4v => &["m4v"],
            Self::Mov => &["mov", "qt"],
            Self::Mkv => &["mkv"],
            Self::WebM => &["webm"],
        }
    }

    pub fn accepts_extension(self, ext: &str) -> bool {
        let ext = ext.to_ascii_lowercase();
        self.extensions().contains(&ext.as_str())
    }

    /// ffmpeg muxer name (`-f`).
    pub fn muxer(self) -> &'static str {
        match self {
            Self::Mp4 | Self::M4v => "mp4",
            Self::Mov => "mov",
            Self::Mkv => "matroska",
            Self::WebM => "webm",
        }
    }

    /// Whether a stream in `codec` can be copied into this container as-is.
    pub fn can_carry_codec(self, codec: &str) -> bool {
        let codec = codec.to_ascii_lowercase();
        match self {
            Self::Mkv => true,
            Self::WebM => matches!(codec.as_str(), "vp8" | "vp9" | "av1"),
            Self::Mp4 | Self::M4v => {
                matches!(codec.as_str(), "h264" | "hevc" | "mpeg4" | "av1")
            }
            Self::Mov => matches!(
                codec.as_str(),
                "h264" | "hevc" | "mpeg4" | "prores" | "mjpeg" | "av1"
            ),
        }
    }

    fn faststart(self) -> bool {
        matches!(self, Self::Mp4 | Self::M4v | Self::Mov)
    }
}

impl fmt::Display for ContainerFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extensions()[0])
    }
}

/// Encoding quality for an export.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum QualityPreset {
    #[default]
    Highest,
    Medium,
    Low,
    /// Copy streams without re-encoding. Cuts snap to keyframes.
    Passthrough,
}

impl QualityPreset {
    pub fn name(self) -> &'static str {
        match self {
            Self::Highest => "highest",
            Self::Medium => "medium",
            Self::Low => "low",
            Self::Passthrough => "passthrough",
        }
    }

    /// Whether this preset can write `track` into `container` under a file
    /// named `*.{extension}`.
    pub fn is_compatible(self, track: &VideoTrack, container: ContainerFormat, extension: &str) -> bool {
        if !container.accepts_extension(extension) {
            return false;
        }
        if track.width == 0 || track.height == 0 {
            return false;
        }
        match self {
            Self::Passthrough => container.can_carry_codec(&track.codec),
            _ => true,
        }
    }

    /// ffmpeg codec arguments for this preset in `container`.
    pub fn codec_args(self, container: ContainerFormat) -> Vec<String> {
        let mut args: Vec<String> = Vec::new();

        match (self, container) {
            (Self::Passthrough, _) => {
                args.extend(["-c", "copy"].map(String::from));
            }
            (_, ContainerFormat::WebM) => {
                let (crf, audio) = match self {
                    Self::Highest => ("24", "160k"),
                    Self::Medium => ("32", "128k"),
                    _ => ("40", "96k"),
                };
                args.extend(
                    [
                        "-c:v", "libvpx-vp9", "-crf", crf, "-b:v", "0", "-c:a", "libopus", "-b:a",
                        audio,
                    ]
                    .map(String::from),
                );
            }
            _ => {
                let (crf, speed, audio) = match self {
                    Self::Highest => ("18", "slow", "192k"),
                    Self::Medium => ("23", "medium", "128k"),
                    _ => ("28", "veryfast", "96k"),
                };
                args.extend(
                    [
                        "-c:v", "libx264", "-preset", speed, "-crf", crf, "-pix_fmt", "yuv420p",
                        "-c:a", "aac", "-b:a", audio,
                    ]
                    .map(String::from),
                );
            }
        }

        if container.faststart() {
            args.extend(["-movflags", "+faststart"].map(String::from));
        }
        args
    }
}

impl FromStr for QualityPreset {
    type Err = FramesiftError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "highest" | "high" => Ok(Self::Highest),
            "medium" => Ok(Self::Medium),
            "low" => Ok(Self::Low),
            "passthrough" | "copy" => Ok(Self::Passthrough),
            other => Err(FramesiftError::config(format!(
                "Unknown preset '{other}' (expected highest, medium, low, or passthrough)"
            ))),
        }
    }
}

impl fmt::Display for QualityPreset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
