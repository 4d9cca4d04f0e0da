//! FrameSift Export
//!
//! Re-encodes a time sub-range of a video asset into a new file.
//!
//! # Pipeline
//!
//! ```text
//! asset + range ──┐
//!                 ├── compatibility check (preset × track × container)
//! output.ext ─────┘         │
//!                           ├── ExportSession ──▶ .output.<uuid>.partial.ext
//!                           │        ▲ progress polled every tick
//!                           ▼
//!                  remove existing output, move temp into place
//! ```
//!
//! The encoder sits behind [`ExportBackend`]/[`ExportSession`]; the default
//! [`FfmpegBackend`] drives `ffmpeg -progress`.

pub mod backend;
pub mod error;
pub mod exporter;
pub mod ffmpeg;
pub mod format;

pub use backend::{ExportBackend, ExportRequest, ExportSession, SessionStatus};
pub use error::ExportError;
pub use exporter::{ClipExporter, ExportSnapshot};
pub use ffmpeg::FfmpegBackend;
pub use format::{ContainerFormat, QualityPreset};
