//! Analysis run orchestration.
//!
//! An [`AnalysisRun`] owns one analyzer and drives it over a sampled asset
//! as a background task. Callers never block on it: they read published
//! [`AnalysisSnapshot`]s or flip the cancellation flag.
//!
//! ```text
//! Idle ──start──▶ Running ──▶ Completed | Cancelled | Failed
//!   ▲                                        │
//!   └──────────────── cancel() ──────────────┘
//! ```

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use tokio::sync::watch;
use tokio::task::JoinHandle;

use framesift_media::VideoAsset;

use crate::analyzer::FrameAnalyzer;
use crate::error::AnalysisError;
use crate::result::FrameResult;
use crate::sampler::{FrameSampler, FrameSource};

/// Lifecycle of an analysis run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AnalysisState {
    /// Nothing started, or cleared.
    #[default]
    Idle,
    /// Frames are being analyzed.
    Running,
    /// Finished with results.
    Completed,
    /// Stopped by the caller.
    Cancelled,
    /// Stopped by an error.
    Failed,
}

/// Everything an observer can see about a run.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AnalysisSnapshot {
    pub state: AnalysisState,
    /// Fraction complete while running; 0 otherwise.
    pub progress: f64,
    pub is_running: bool,
    /// Populated only in [`AnalysisState::Completed`].
    pub results: Vec<FrameResult>,
    /// Populated only in [`AnalysisState::Failed`].
    pub error: Option<AnalysisError>,
}

impl AnalysisSnapshot {
    fn running() -> Self {
        Self {
            state: AnalysisState::Running,
            is_running: true,
            ..Self::default()
        }
    }

    fn finished(outcome: Result<Vec<FrameResult>, AnalysisError>) -> Self {
        match outcome {
            Ok(results) => Self {
                state: AnalysisState::Completed,
                results,
                ..Self::default()
            },
            Err(AnalysisError::Cancelled) => Self {
                state: AnalysisState::Cancelled,
                ..Self::default()
            },
            Err(error) => Self {
                state: AnalysisState::Failed,
                error: Some(error),
                ..Self::default()
            },
        }
    }
}

/// Drives one [`FrameAnalyzer`] over an asset, one run at a time.
pub struct AnalysisRun {
    analyzer: Arc<dyn FrameAnalyzer>,
    state_tx: Arc<watch::Sender<AnalysisSnapshot>>,
    cancel_flag: Arc<AtomicBool>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl AnalysisRun {
    pub fn new(analyzer: Arc<dyn FrameAnalyzer>) -> Self {
        let (state_tx, _) = watch::channel(AnalysisSnapshot::default());
        Self {
            analyzer,
            state_tx: Arc::new(state_tx),
            cancel_flag: Arc::new(AtomicBool::new(false)),
            task: Mutex::new(None),
        }
    }

    /// Title of the wrapped analyzer.
    pub fn title(&self) -> &str {
        self.analyzer.title()
    }

    /// Start analyzing `asset` every `interval` seconds.
    ///
    /// Returns `false` without touching state when a run is already active
    /// or the interval is not a positive number. Track data is loaded before
    /// returning; if that fails the run ends in [`AnalysisState::Failed`]
    /// immediately. Otherwise the analysis continues in the background.
    pub async fn start(&self, asset: Arc<dyn VideoAsset>, interval: f64) -> bool {
        if !(interval.is_finite() && interval > 0.0) {
            tracing::warn!(interval, "Rejecting analysis with invalid sampling interval");
            return false;
        }

        let cancel_flag = self.cancel_flag.clone();
        let started = self.state_tx.send_if_modified(|snapshot| {
            if snapshot.is_running {
                return false;
            }
            cancel_flag.store(false, Ordering::SeqCst);
            *snapshot = AnalysisSnapshot::running();
            true
        });
        if !started {
            tracing::warn!(analyzer = self.title(), "Analysis already running; ignoring start");
            return false;
        }

        tracing::info!(
            analyzer = self.title(),
            asset = %asset.label(),
            interval,
            "Starting analysis"
        );

        let duration = match load_track_data(asset.as_ref()).await {
            Ok(duration) => duration,
            Err(e) => {
                tracing::error!(asset = %asset.label(), error = %e, "Analysis setup failed");
                self.state_tx.send_replace(AnalysisSnapshot::finished(Err(e)));
                return true;
            }
        };

        let sampler = FrameSampler::new(asset, duration, interval);
        tracing::debug!(
            duration,
            samples = sampler.remaining(),
            tolerance = sampler.tolerance(),
            "Planned frame samples"
        );

        let analyzer = self.analyzer.clone();
        let state_tx = self.state_tx.clone();
        let cancel_flag = self.cancel_flag.clone();

        let handle = tokio::spawn(async move {
            let progress_tx = state_tx.clone();
            let on_progress = move |progress: f64| {
                progress_tx.send_if_modified(|snapshot| {
                    if !snapshot.is_running {
                        return false;
                    }
                    snapshot.progress = progress;
                    true
                });
            };

            let outcome = analyzer
                .analyze(Box::new(sampler), duration, &cancel_flag, &on_progress)
                .await;

            match &outcome {
                Ok(results) => {
                    tracing::info!(
                        analyzer = analyzer.title(),
                        frames = results.len(),
                        "Analysis completed"
                    )
                }
                Err(AnalysisError::Cancelled) => {
                    tracing::info!(analyzer = analyzer.title(), "Analysis cancelled")
                }
                Err(e) => {
                    tracing::error!(analyzer = analyzer.title(), error = %e, "Analysis failed")
                }
            }

            state_tx.send_replace(AnalysisSnapshot::finished(outcome));
        });

        if let Ok(mut task) = self.task.lock() {
            *task = Some(handle);
        }
        true
    }

    /// Cancel the active run, or clear a finished one.
    ///
    /// While running this only raises the cooperative flag; the run settles
    /// in [`AnalysisState::Cancelled`] at the next frame boundary.
    pub fn cancel(&self) {
        let cancel_flag = self.cancel_flag.clone();
        self.state_tx.send_if_modified(|snapshot| {
            if snapshot.is_running {
                cancel_flag.store(true, Ordering::SeqCst);
                tracing::info!("Cancellation requested");
                false
            } else {
                *snapshot = AnalysisSnapshot::default();
                true
            }
        });
    }

    /// Wait for the background task, if any, to finish.
    pub async fn wait(&self) {
        let handle = self.task.lock().ok().and_then(|mut task| task.take());
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                tracing::error!(error = %e, "Analysis task aborted");
                self.state_tx.send_replace(AnalysisSnapshot::finished(Err(
                    AnalysisError::frame_analysis(format!("analysis task aborted: {e}")),
                )));
            }
        }
    }

    /// Receive a snapshot on every state or progress change.
    pub fn subscribe(&self) -> watch::Receiver<AnalysisSnapshot> {
        self.state_tx.subscribe()
    }

    pub fn snapshot(&self) -> AnalysisSnapshot {
        self.state_tx.borrow().clone()
    }

    pub fn state(&self) -> AnalysisState {
        self.state_tx.borrow().state
    }

    pub fn progress(&self) -> f64 {
        self.state_tx.borrow().progress
    }

    pub fn is_running(&self) -> bool {
        self.state_tx.borrow().is_running
    }

    pub fn results(&self) -> Vec<FrameResult> {
        self.state_tx.borrow().results.clone()
    }

    pub fn error(&self) -> Option<AnalysisError> {
        self.state_tx.borrow().error.clone()
    }
}

/// Duration of an asset that has a usable video track.
async fn load_track_data(asset: &dyn VideoAsset) -> Result<f64, AnalysisError> {
    let duration = asset.load_duration().await.map_err(|e| {
        tracing::debug!(error = %e, "Duration unavailable");
        AnalysisError::UnableToLoadTrackData
    })?;
    let track = asset.load_video_track().await.map_err(|e| {
        tracing::debug!(error = %e, "Video track unavailable");
        AnalysisError::UnableToLoadTrackData
    })?;

    if !duration.is_finite() || duration < 0.0 || !(track.frame_rate > 0.0) {
        return Err(AnalysisError::UnableToLoadTrackData);
    }
    Ok(duration)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::motion::MotionAnalyzer;
    use framesift_media::SyntheticAsset;

    fn motion_run() -> AnalysisRun {
        AnalysisRun::new(Arc::new(MotionAnalyzer::default()))
    }

    #[test]
    fn test_initial_state() {
        let run = motion_run();
        assert_eq!(run.snapshot(), AnalysisSnapshot::default());
        assert_eq!(run.title(), "Motion");
    }

    #[tokio::test]
    async fn test_rejects_invalid_interval() {
        let run = motion_run();
        let asset = Arc::new(SyntheticAsset::new(4.0, 8, 8, 10.0));
        assert!(!run.start(asset.clone(), 0.0).await);
        assert!(!run.start(asset, f64::NAN).await);
        assert_eq!(run.state(), AnalysisState::Idle);
    }

    #[tokio::test]
    async fn test_missing_duration_fails_setup() {
        let run = motion_run();
        let asset = Arc::new(SyntheticAsset::new(4.0, 8, 8, 10.0).without_duration());
        assert!(run.start(asset.clone(), 1.0).await);

        assert_eq!(run.state(), AnalysisState::Failed);
        assert_eq!(run.error(), Some(AnalysisError::UnableToLoadTrackData));
        assert!(!run.is_running());
        assert_eq!(asset.decode_count(), 0);
    }

    #[tokio::test]
    async fn test_clear_after_completion() {
        let run = motion_run();
        run.start(Arc::new(SyntheticAsset::new(3.0, 8, 8, 10.0)), 1.0)
            .await;
        run.wait().await;
        assert_eq!(run.state(), AnalysisState::Completed);
        assert_eq!(run.results().len(), 3);

        run.cancel();
        assert_eq!(run.snapshot(), AnalysisSnapshot::default());
    }
}
