//! ClipExporter behaviour against a scripted in-memory backend.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Notify;

use framesift_export::{
    ClipExporter, ExportBackend, ExportError, ExportRequest, ExportSession, SessionStatus,
};
use framesift_media::{SyntheticAsset, TimeRange, VideoAsset};

/// Knobs shared by the fake backend and every session it creates.
#[derive(Default)]
struct Script {
    /// Complete as soon as the session starts.
    auto_finish: bool,
    /// Refuse to create sessions.
    reject: bool,
    /// Fail the encode with this message.
    fail_with: Option<String>,
    progress_bits: AtomicU64,
    finish: Notify,
    sessions: AtomicUsize,
}

impl Script {
    fn set_progress(&self, progress: f64) {
        self.progress_bits.store(progress.to_bits(), Ordering::SeqCst);
    }
}

struct FakeBackend {
    script: Arc<Script>,
}

impl ExportBackend for FakeBackend {
    fn name(&self) -> &str {
        "fake"
    }

    fn is_available(&self) -> bool {
        true
    }

    fn create_session(&self, request: ExportRequest) -> Result<Arc<dyn ExportSession>, ExportError> {
        if self.script.reject {
            return Err(ExportError::InvalidExportSession);
        }
        self.script.sessions.fetch_add(1, Ordering::SeqCst);
        Ok(Arc::new(FakeSession {
            script: self.script.clone(),
            output: request.output_path,
            status: Mutex::new(SessionStatus::Waiting),
            cancelled: AtomicBool::new(false),
            cancel_notify: Notify::new(),
        }))
    }
}

struct FakeSession {
    script: Arc<Script>,
    output: PathBuf,
    status: Mutex<SessionStatus>,
    cancelled: AtomicBool,
    cancel_notify: Notify,
}

impl FakeSession {
    fn finish(&self) -> SessionStatus {
        match &self.script.fail_with {
            Some(message) => SessionStatus::Failed(message.clone()),
            None => {
                std::fs::write(&self.output, b"clip").unwrap();
                SessionStatus::Completed
            }
        }
    }
}

#[async_trait]
impl ExportSession for FakeSession {
    async fn run(&self) -> SessionStatus {
        std::fs::write(&self.output, b"partial").unwrap();
        *self.status.lock().unwrap() = SessionStatus::Exporting;

        let status = if self.cancelled.load(Ordering::SeqCst) {
            SessionStatus::Cancelled
        } else if self.script.auto_finish {
            self.finish()
        } else {
            tokio::select! {
                _ = self.script.finish.notified() => self.finish(),
                _ = self.cancel_notify.notified() => SessionStatus::Cancelled,
            }
        };

        *self.status.lock().unwrap() = status.clone();
        status
    }

    fn progress(&self) -> f64 {
        f64::from_bits(self.script.progress_bits.load(Ordering::SeqCst))
    }

    fn status(&self) -> SessionStatus {
        self.status.lock().unwrap().clone()
    }

    fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
        self.cancel_notify.notify_one();
    }
}

fn exporter(script: Script) -> (Arc<ClipExporter>, Arc<Script>) {
    let script = Arc::new(script);
    let exporter = ClipExporter::new(Arc::new(FakeBackend {
        script: script.clone(),
    }))
    .with_poll_interval(Duration::from_millis(5));
    (Arc::new(exporter), script)
}

fn asset() -> Arc<dyn VideoAsset> {
    Arc::new(SyntheticAsset::new(10.0, 64, 36, 25.0).with_source_path("/videos/source.mp4"))
}

fn range(start: f64, end: f64) -> TimeRange {
    TimeRange::new(start, end).unwrap()
}

fn dir_entries(dir: &Path) -> Vec<String> {
    let mut names: Vec<String> = std::fs::read_dir(dir)
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    names.sort();
    names
}

#[tokio::test]
async fn test_export_to_fresh_path() {
    let dir = tempfile::tempdir().unwrap();
    let output = dir.path().join("clip.mp4");
    let (exporter, _) = exporter(Script {
        auto_finish: true,
        ..Script::default()
    });

    exporter.export(asset(), range(2.0, 5.0), &output).await;

    let snapshot = exporter.snapshot();
    assert_eq!(snapshot.last_output_path, Some(output.clone()));
    assert_eq!(snapshot.error, None);
    assert!(!snapshot.is_exporting);
    assert_eq!(std::fs::read(&output).unwrap(), b"clip");
    assert_eq!(dir_entries(dir.path()), vec!["clip.mp4"]);
}

#[tokio::test]
async fn test_export_overwrites_existing_file() {
    let dir = tempfile::tempdir().unwrap();
    let output = dir.path().join("clip.mov");
    std::fs::write(&output, b"old").unwrap();
    let (exporter, _) = exporter(Script {
        auto_finish: true,
        ..Script::default()
    });

    exporter.export(asset(), range(0.0, 10.0), &output).await;

    assert_eq!(exporter.error(), None);
    assert_eq!(std::fs::read(&output).unwrap(), b"clip");
    assert_eq!(dir_entries(dir.path()), vec!["clip.mov"]);
}

#[tokio::test]
async fn test_unrecognized_extension_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let (exporter, script) = exporter(Script {
        auto_finish: true,
        ..Script::default()
    });

    exporter
        .export(asset(), range(0.0, 1.0), &dir.path().join("clip.avi"))
        .await;
    assert_eq!(
        exporter.error(),
        Some(ExportError::IncompatibleOutputFileType("avi".to_string()))
    );
    assert!(!exporter.is_exporting());

    exporter
        .export(asset(), range(0.0, 1.0), &dir.path().join("clip"))
        .await;
    assert_eq!(
        exporter.error(),
        Some(ExportError::IncompatibleOutputFileType(String::new()))
    );

    assert_eq!(script.sessions.load(Ordering::SeqCst), 0);
    assert!(dir_entries(dir.path()).is_empty());
    assert_eq!(exporter.last_output_path(), None);
}

#[tokio::test]
async fn test_cancel_after_progress() {
    let dir = tempfile::tempdir().unwrap();
    let output = dir.path().join("clip.webm");
    std::fs::write(&output, b"old").unwrap();
    let (exporter, script) = exporter(Script::default());
    let mut rx = exporter.subscribe();

    let task = tokio::spawn({
        let exporter = exporter.clone();
        let output = output.clone();
        async move { exporter.export(asset(), range(1.0, 9.0), &output).await }
    });

    script.set_progress(0.4);
    rx.wait_for(|s| s.progress >= 0.4).await.unwrap();
    assert!(exporter.is_exporting());

    exporter.cancel();
    task.await.unwrap();

    let snapshot = exporter.snapshot();
    assert!(!snapshot.is_exporting);
    assert_eq!(snapshot.progress, 0.0);
    assert_eq!(snapshot.error, None);
    assert_eq!(snapshot.last_output_path, None);
    assert_eq!(std::fs::read(&output).unwrap(), b"old");
    assert_eq!(dir_entries(dir.path()), vec!["clip.webm"]);
}

#[tokio::test]
async fn test_session_failure_is_internal() {
    let dir = tempfile::tempdir().unwrap();
    let (exporter, _) = exporter(Script {
        auto_finish: true,
        fail_with: Some("encoder exploded".to_string()),
        ..Script::default()
    });

    exporter
        .export(asset(), range(0.0, 3.0), &dir.path().join("clip.mkv"))
        .await;

    assert_eq!(
        exporter.error(),
        Some(ExportError::Internal("encoder exploded".to_string()))
    );
    assert!(!exporter.is_exporting());
    assert!(dir_entries(dir.path()).is_empty());
}

#[tokio::test]
async fn test_session_creation_failure() {
    let dir = tempfile::tempdir().unwrap();
    let (exporter, _) = exporter(Script {
        reject: true,
        ..Script::default()
    });

    exporter
        .export(asset(), range(0.0, 3.0), &dir.path().join("clip.mp4"))
        .await;

    assert_eq!(exporter.error(), Some(ExportError::InvalidExportSession));
    assert!(dir_entries(dir.path()).is_empty());
}

#[tokio::test]
async fn test_range_past_end_is_invalid() {
    let dir = tempfile::tempdir().unwrap();
    let (exporter, script) = exporter(Script {
        auto_finish: true,
        ..Script::default()
    });

    exporter
        .export(asset(), range(8.0, 12.0), &dir.path().join("clip.mp4"))
        .await;

    assert_eq!(exporter.error(), Some(ExportError::InvalidExportSession));
    assert_eq!(script.sessions.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_second_export_is_ignored_while_running() {
    let dir = tempfile::tempdir().unwrap();
    let first = dir.path().join("first.mp4");
    let second = dir.path().join("second.mp4");
    let (exporter, script) = exporter(Script::default());
    let mut rx = exporter.subscribe();

    let task = tokio::spawn({
        let exporter = exporter.clone();
        let first = first.clone();
        async move { exporter.export(asset(), range(0.0, 2.0), &first).await }
    });
    rx.wait_for(|s| s.is_exporting).await.unwrap();

    exporter.export(asset(), range(0.0, 2.0), &second).await;
    assert!(exporter.is_exporting());

    script.finish.notify_one();
    task.await.unwrap();

    assert_eq!(script.sessions.load(Ordering::SeqCst), 1);
    assert_eq!(exporter.last_output_path(), Some(first));
    assert!(!second.exists());
}

#[tokio::test]
async fn test_cancel_when_idle_clears_error() {
    let dir = tempfile::tempdir().unwrap();
    let (exporter, _) = exporter(Script::default());

    exporter
        .export(asset(), range(0.0, 1.0), &dir.path().join("clip.txt"))
        .await;
    assert!(exporter.error().is_some());

    exporter.cancel();
    let snapshot = exporter.snapshot();
    assert_eq!(snapshot.error, None);
    assert_eq!(snapshot.progress, 0.0);
    assert!(!snapshot.is_exporting);
}

#[tokio::test]
async fn test_cancel_during_setup_sets_no_error() {
    let dir = tempfile::tempdir().unwrap();
    let (exporter, script) = exporter(Script {
        auto_finish: true,
        ..Script::default()
    });
    let slow: Arc<dyn VideoAsset> = Arc::new(
        SyntheticAsset::new(10.0, 64, 36, 25.0)
            .with_source_path("/videos/source.mp4")
            .with_metadata_delay(Duration::from_millis(200)),
    );
    let mut rx = exporter.subscribe();

    let task = tokio::spawn({
        let exporter = exporter.clone();
        let output = dir.path().join("clip.avi");
        async move { exporter.export(slow, range(0.0, 1.0), &output).await }
    });
    rx.wait_for(|s| s.is_exporting).await.unwrap();

    exporter.cancel();
    task.await.unwrap();

    let snapshot = exporter.snapshot();
    assert!(!snapshot.is_exporting);
    assert_eq!(snapshot.error, None);
    assert_eq!(snapshot.progress, 0.0);
    assert_eq!(snapshot.last_output_path, None);
    assert_eq!(script.sessions.load(Ordering::SeqCst), 0);
    assert!(dir_entries(dir.path()).is_empty());
}
