//! Encoder abstraction.

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;

use framesift_media::{TimeRange, VideoAsset, VideoTrack};

use crate::error::ExportError;
use crate::format::{ContainerFormat, QualityPreset};

/// Everything a backend needs to encode one clip.
#[derive(Clone)]
pub struct ExportRequest {
    pub asset: Arc<dyn VideoAsset>,
    pub range: TimeRange,
    pub container: ContainerFormat,
    pub preset: QualityPreset,
    /// Where the session writes. The exporter moves it into place afterwards.
    pub output_path: PathBuf,
}

/// Status of an export session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionStatus {
    Waiting,
    Exporting,
    Completed,
    Failed(String),
    Cancelled,
}

/// One in-flight encode.
#[async_trait]
pub trait ExportSession: Send + Sync {
    /// Encode to the request's output path. Resolves with the final status.
    async fn run(&self) -> SessionStatus;

    /// Fraction of the range encoded so far, in `[0, 1]`.
    fn progress(&self) -> f64;

    fn status(&self) -> SessionStatus;

    /// Ask the session to stop. `run` then resolves with
    /// [`SessionStatus::Cancelled`].
    fn cancel(&self);
}

/// Creates export sessions.
pub trait ExportBackend: Send + Sync {
    fn name(&self) -> &str;

    /// Whether the backend can run on this system.
    fn is_available(&self) -> bool;

    /// Whether `preset` can write `track` into `container` as `*.{extension}`.
    fn is_compatible(
        &self,
        preset: QualityPreset,
        track: &VideoTrack,
        container: ContainerFormat,
        extension: &str,
    ) -> bool {
        preset.is_compatible(track, container, extension)
    }

    fn create_session(&self, request: ExportRequest) -> Result<Arc<dyn ExportSession>, ExportError>;
}
