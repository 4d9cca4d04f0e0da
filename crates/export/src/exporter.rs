//! Clip export orchestration.
//!
//! [`ClipExporter`] validates a request, runs one [`ExportSession`] into a
//! temporary file next to the destination, publishes polled progress, and
//! finally swaps the temporary file into place. Observers follow along
//! through [`ExportSnapshot`]s.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::watch;

use framesift_media::{TimeRange, VideoAsset};

use crate::backend::{ExportBackend, ExportRequest, ExportSession, SessionStatus};
use crate::error::ExportError;
use crate::format::{ContainerFormat, QualityPreset};

/// Default interval between progress polls.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Everything an observer can see about the exporter.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExportSnapshot {
    pub is_exporting: bool,
    pub progress: f64,
    pub error: Option<ExportError>,
    /// Destination of the most recent successful export.
    pub last_output_path: Option<PathBuf>,
}

/// Exports time ranges of assets, one at a time.
pub struct ClipExporter {
    backend: Arc<dyn ExportBackend>,
    preset: QualityPreset,
    poll_interval: Duration,
    state_tx: watch::Sender<ExportSnapshot>,
    session: Mutex<Option<Arc<dyn ExportSession>>>,
    cancel_flag: AtomicBool,
}

/// How an export ended, before it is folded into the snapshot.
enum Outcome {
    Written,
    Cancelled,
    Failed(ExportError),
}

impl ClipExporter {
    pub fn new(backend: Arc<dyn ExportBackend>) -> Self {
        let (state_tx, _) = watch::channel(ExportSnapshot::default());
        Self {
            backend,
            preset: QualityPreset::default(),
            poll_interval: DEFAULT_POLL_INTERVAL,
            state_tx,
            session: Mutex::new(None),
            cancel_flag: AtomicBool::new(false),
        }
    }

    pub fn with_preset(mut self, preset: QualityPreset) -> Self {
        self.preset = preset;
        self
    }

    /// Zero intervals are bumped to one millisecond.
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval.max(Duration::from_millis(1));
        self
    }

    pub fn preset(&self) -> QualityPreset {
        self.preset
    }

    /// Export `range` of `asset` to `output_path`, replacing any existing
    /// file there.
    ///
    /// Resolves once the export has finished, failed, or been cancelled; the
    /// outcome is published as state. A call made while another export is
    /// running is ignored.
    pub async fn export(&self, asset: Arc<dyn VideoAsset>, range: TimeRange, output_path: &Path) {
        let cancel_flag = &self.cancel_flag;
        let started = self.state_tx.send_if_modified(|snapshot| {
            if snapshot.is_exporting {
                return false;
            }
            cancel_flag.store(false, Ordering::SeqCst);
            *snapshot = ExportSnapshot {
                is_exporting: true,
                ..ExportSnapshot::default()
            };
            true
        });
        if !started {
            tracing::warn!(output = %output_path.display(), "Export already running; ignoring request");
            return;
        }

        tracing::info!(
            asset = %asset.label(),
            start = range.start(),
            end = range.end(),
            output = %output_path.display(),
            preset = %self.preset,
            backend = self.backend.name(),
            "Starting export"
        );

        let outcome = match self.run_export(asset, range, output_path).await {
            // a stop requested during setup is not an error
            Outcome::Failed(_) if self.cancel_flag.load(Ordering::SeqCst) => Outcome::Cancelled,
            outcome => outcome,
        };

        if let Ok(mut session) = self.session.lock() {
            *session = None;
        }

        self.state_tx.send_modify(|snapshot| {
            snapshot.is_exporting = false;
            match outcome {
                Outcome::Written => {
                    tracing::info!(output = %output_path.display(), "Export finished");
                    snapshot.progress = 1.0;
                    snapshot.error = None;
                    snapshot.last_output_path = Some(output_path.to_path_buf());
                }
                Outcome::Cancelled => {
                    tracing::info!(output = %output_path.display(), "Export cancelled");
                    snapshot.progress = 0.0;
                    snapshot.error = None;
                }
                Outcome::Failed(e) => {
                    tracing::error!(output = %output_path.display(), error = %e, "Export failed");
                    snapshot.progress = 0.0;
                    snapshot.error = Some(e);
                }
            }
        });
    }

    async fn run_export(
        &self,
        asset: Arc<dyn VideoAsset>,
        range: TimeRange,
        output_path: &Path,
    ) -> Outcome {
        let extension = output_path
            .extension()
            .map(|e| e.to_string_lossy().into_owned())
            .unwrap_or_default();
        let container = ContainerFormat::from_extension(&extension);

        let track = asset.load_video_track().await;
        if self.cancel_flag.load(Ordering::SeqCst) {
            return Outcome::Cancelled;
        }
        let track = match track {
            Ok(track) => track,
            Err(e) => {
                tracing::warn!(error = %e, "Cannot export asset without a readable video track");
                return Outcome::Failed(ExportError::InvalidExportSession);
            }
        };
        if !self
            .backend
            .is_compatible(self.preset, &track, container, &extension)
        {
            return Outcome::Failed(ExportError::IncompatibleOutputFileType(extension));
        }

        let duration = asset.load_duration().await;
        if self.cancel_flag.load(Ordering::SeqCst) {
            return Outcome::Cancelled;
        }
        match duration {
            Ok(duration) if range.fits_within(duration) => {}
            Ok(duration) => {
                tracing::warn!(duration, end = range.end(), "Export range exceeds asset duration");
                return Outcome::Failed(ExportError::InvalidExportSession);
            }
            Err(e) => {
                tracing::warn!(error = %e, "Asset duration unavailable");
                return Outcome::Failed(ExportError::InvalidExportSession);
            }
        }

        let temp_path = temp_path_for(output_path, &extension);
        let request = ExportRequest {
            asset,
            range,
            container,
            preset: self.preset,
            output_path: temp_path.clone(),
        };
        let session = match self.backend.create_session(request) {
            Ok(session) => session,
            Err(e) => return Outcome::Failed(e),
        };

        if let Ok(mut slot) = self.session.lock() {
            *slot = Some(session.clone());
        }
        // cancel() may have run before the session was visible to it
        if self.cancel_flag.load(Ordering::SeqCst) {
            session.cancel();
        }

        tracing::debug!(temp = %temp_path.display(), container = %container, "Writing export to temp file");
        let status = self.drive(session.as_ref()).await;

        if self.cancel_flag.load(Ordering::SeqCst) || status == SessionStatus::Cancelled {
            remove_temp(&temp_path).await;
            return Outcome::Cancelled;
        }

        match status {
            SessionStatus::Completed => match replace_file(&temp_path, output_path).await {
                Ok(()) => Outcome::Written,
                Err(e) => {
                    remove_temp(&temp_path).await;
                    Outcome::Failed(e)
                }
            },
            SessionStatus::Failed(message) => {
                remove_temp(&temp_path).await;
                Outcome::Failed(ExportError::Internal(message))
            }
            other => {
                remove_temp(&temp_path).await;
                Outcome::Failed(ExportError::internal(format!(
                    "export session ended in unexpected state {other:?}"
                )))
            }
        }
    }

    /// Run the session, publishing its progress on every poll tick.
    async fn drive(&self, session: &dyn ExportSession) -> SessionStatus {
        let run = session.run();
        tokio::pin!(run);

        let mut ticker = tokio::time::interval(self.poll_interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                status = &mut run => return status,
                _ = ticker.tick() => {
                    if session.status() == SessionStatus::Exporting {
                        let progress = session.progress().clamp(0.0, 1.0);
                        self.state_tx.send_if_modified(|snapshot| {
                            if !snapshot.is_exporting || snapshot.progress == progress {
                                return false;
                            }
                            snapshot.progress = progress;
                            true
                        });
                    }
                }
            }
        }
    }

    /// Cancel the running export, or clear progress and error when idle.
    pub fn cancel(&self) {
        let exporting = self.state_tx.borrow().is_exporting;
        if exporting {
            self.cancel_flag.store(true, Ordering::SeqCst);
            if let Some(session) = self.session.lock().ok().and_then(|s| s.clone()) {
                session.cancel();
            }
            tracing::info!("Export cancellation requested");
            return;
        }

        self.state_tx.send_modify(|snapshot| {
            snapshot.progress = 0.0;
            snapshot.error = None;
        });
    }

    pub fn subscribe(&self) -> watch::Receiver<ExportSnapshot> {
        self.state_tx.subscribe()
    }

    pub fn snapshot(&self) -> ExportSnapshot {
        self.state_tx.borrow().clone()
    }

    pub fn is_exporting(&self) -> bool {
        self.state_tx.borrow().is_exporting
    }

    pub fn progress(&self) -> f64 {
        self.state_tx.borrow().progress
    }

    pub fn error(&self) -> Option<ExportError> {
        self.state_tx.borrow().error.clone()
    }

    pub fn last_output_path(&self) -> Option<PathBuf> {
        self.state_tx.borrow().last_output_path.clone()
    }
}

/// A fresh hidden file beside `output`, keeping its extension.
fn temp_path_for(output: &Path, extension: &str) -> PathBuf {
    let stem = output
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "export".to_string());
    let name = if extension.is_empty() {
        format!(".{stem}.{}.partial", uuid::Uuid::new_v4())
    } else {
        format!(".{stem}.{}.partial.{extension}", uuid::Uuid::new_v4())
    };
    match output.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir.join(name),
        _ => PathBuf::from(name),
    }
}

/// Remove any existing destination, then move `temp` into place.
async fn replace_file(temp: &Path, destination: &Path) -> Result<(), ExportError> {
    match tokio::fs::remove_file(destination).await {
        Ok(()) => tracing::debug!(path = %destination.display(), "Removed existing output"),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => {
            return Err(ExportError::internal(format!(
                "failed to remove existing {}: {e}",
                destination.display()
            )))
        }
    }

    tokio::fs::rename(temp, destination).await.map_err(|e| {
        ExportError::internal(format!(
            "failed to move export into {}: {e}",
            destination.display()
        ))
    })
}

async fn remove_temp(path: &Path) {
    match tokio::fs::remove_file(path).await {
        Ok(()) => tracing::debug!(path = %path.display(), "Removed temp export"),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => tracing::warn!(path = %path.display(), error = %e, "Failed to remove temp export"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_temp_path_is_hidden_sibling() {
        let temp = temp_path_for(Path::new("/clips/out.mp4"), "mp4");
        assert_eq!(temp.parent(), Some(Path::new("/clips")));
        let name = temp.file_name().unwrap().to_string_lossy().into_owned();
        assert!(name.starts_with(".out."));
        assert!(name.ends_with(".partial.mp4"));

        assert_ne!(temp, temp_path_for(Path::new("/clips/out.mp4"), "mp4"));
    }

    #[test]
    fn test_temp_path_relative() {
        let temp = temp_path_for(Path::new("out.webm"), "webm");
        assert_eq!(temp.parent(), Some(Path::new("")));
    }

    #[tokio::test]
    async fn test_replace_file_overwrites() {
        let dir = tempfile::tempdir().unwrap();
        let temp = dir.path().join(".new.partial");
        let dest = dir.path().join("out.mp4");
        std::fs::write(&temp, b"new").unwrap();
        std::fs::write(&dest, b"old").unwrap();

        replace_file(&temp, &dest).await.unwrap();

        assert_eq!(std::fs::read(&dest).unwrap(), b"new");
        assert!(!temp.exists());
    }
}
