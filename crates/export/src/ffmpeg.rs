//! ffmpeg-backed export sessions.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Instant;

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, BufReader};
use tokio::process::Command;
use tokio::sync::Notify;

use crate::backend::{ExportBackend, ExportRequest, ExportSession, SessionStatus};
use crate::error::ExportError;

/// Seconds without `out_time` advancing before a stall is logged.
const STALL_WARNING_SECS: u64 = 10;

/// Stderr lines kept for error messages.
const STDERR_TAIL_LINES: usize = 8;

/// Encodes clips with the `ffmpeg` binary.
#[derive(Debug, Clone)]
pub struct FfmpegBackend {
    ffmpeg: PathBuf,
}

impl FfmpegBackend {
    pub fn new(ffmpeg: impl Into<PathBuf>) -> Self {
        Self {
            ffmpeg: ffmpeg.into(),
        }
    }
}

impl Default for FfmpegBackend {
    fn default() -> Self {
        Self::new("ffmpeg")
    }
}

impl ExportBackend for FfmpegBackend {
    fn name(&self) -> &str {
        "ffmpeg"
    }

    fn is_available(&self) -> bool {
        std::process::Command::new(&self.ffmpeg)
            .arg("-version")
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .map(|status| status.success())
            .unwrap_or(false)
    }

    fn create_session(&self, request: ExportRequest) -> Result<Arc<dyn ExportSession>, ExportError> {
        let Some(source) = request.asset.source_path() else {
            tracing::warn!(asset = %request.asset.label(), "Asset has no backing file");
            return Err(ExportError::InvalidExportSession);
        };
        if request.range.duration() <= 0.0 {
            tracing::warn!(
                start = request.range.start(),
                end = request.range.end(),
                "Refusing to export an empty range"
            );
            return Err(ExportError::InvalidExportSession);
        }

        let args = build_args(source, &request);
        tracing::debug!(args = ?args, "Prepared ffmpeg export");

        Ok(Arc::new(FfmpegSession {
            ffmpeg: self.ffmpeg.clone(),
            args,
            expected_duration_secs: request.range.duration(),
            status: Mutex::new(SessionStatus::Waiting),
            progress_bits: AtomicU64::new(0f64.to_bits()),
            cancel_requested: AtomicBool::new(false),
            cancel_notify: Notify::new(),
        }))
    }
}

fn build_args(source: &Path, request: &ExportRequest) -> Vec<String> {
    let mut args: Vec<String> = vec![
        "-hide_banner".into(),
        "-nostdin".into(),
        "-y".into(),
        "-ss".into(),
        format!("{:.6}", request.range.start()),
        "-i".into(),
        source.to_string_lossy().into_owned(),
        "-t".into(),
        format!("{:.6}", request.range.duration()),
        "-map".into(),
        "0:v:0".into(),
        "-map".into(),
        "0:a?".into(),
    ];
    args.extend(request.preset.codec_args(request.container));
    args.extend([
        "-f".into(),
        request.container.muxer().into(),
        "-progress".into(),
        "pipe:1".into(),
        "-nostats".into(),
        request.output_path.to_string_lossy().into_owned(),
    ]);
    args
}

/// A single ffmpeg encode.
pub struct FfmpegSession {
    ffmpeg: PathBuf,
    args: Vec<String>,
    expected_duration_secs: f64,
    status: Mutex<SessionStatus>,
    progress_bits: AtomicU64,
    cancel_requested: AtomicBool,
    cancel_notify: Notify,
}

impl FfmpegSession {
    fn set_status(&self, status: SessionStatus) {
        if let Ok(mut current) = self.status.lock() {
            *current = status;
        }
    }

    fn set_progress(&self, progress: f64) {
        self.progress_bits
            .store(progress.clamp(0.0, 1.0).to_bits(), Ordering::SeqCst);
    }

    /// Run ffmpeg to completion. `Ok(false)` means it was cancelled.
    async fn encode(&self) -> Result<bool, String> {
        let mut child = Command::new(&self.ffmpeg)
            .args(&self.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| format!("Failed to start ffmpeg: {e}"))?;

        tracing::info!(
            pid = child.id(),
            expected_duration_secs = self.expected_duration_secs,
            "ffmpeg export started"
        );

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| "Failed to capture ffmpeg stdout".to_string())?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| "Failed to capture ffmpeg stderr".to_string())?;

        // ffmpeg blocks if its stderr pipe fills up
        let stderr_task = tokio::spawn(async move {
            let mut output = String::new();
            match BufReader::new(stderr).read_to_string(&mut output).await {
                Ok(_) => output,
                Err(err) => format!("<failed to read ffmpeg stderr: {err}>"),
            }
        });

        let mut lines = BufReader::new(stdout).lines();
        let started = Instant::now();
        let mut state = ProgressState::default();
        let mut last_progress_secs = 0.0f64;
        let mut last_progress_wall = Instant::now();

        loop {
            tokio::select! {
                _ = self.cancel_notify.notified() => {
                    if let Err(e) = child.kill().await {
                        tracing::warn!(error = %e, "Failed to kill ffmpeg");
                    }
                    stderr_task.abort();
                    return Ok(false);
                }
                line = lines.next_line() => {
                    let line = match line {
                        Ok(Some(line)) => line,
                        Ok(None) => break,
                        Err(e) => return Err(format!("Failed reading ffmpeg progress: {e}")),
                    };
                    let Some((key, value)) = line.trim().split_once('=') else {
                        continue;
                    };
                    state.update(key, value);
                    if key != "progress" {
                        continue;
                    }

                    self.set_progress(state.fraction(self.expected_duration_secs));
                    if state.out_time_secs > last_progress_secs + 0.001 {
                        last_progress_secs = state.out_time_secs;
                        last_progress_wall = Instant::now();
                    }
                    if last_progress_wall.elapsed().as_secs() >= STALL_WARNING_SECS {
                        tracing::warn!(
                            out_time_secs = state.out_time_secs,
                            elapsed_secs = started.elapsed().as_secs_f64(),
                            "No ffmpeg progress advancement for 10s"
                        );
                        last_progress_wall = Instant::now();
                    }
                }
            }
        }

        let status = child
            .wait()
            .await
            .map_err(|e| format!("Failed to wait on ffmpeg: {e}"))?;
        let stderr_output = stderr_task
            .await
            .unwrap_or_else(|_| "<failed to join stderr reader>".to_string());

        if self.cancel_requested.load(Ordering::SeqCst) {
            return Ok(false);
        }
        if !status.success() {
            return Err(format!(
                "ffmpeg export failed (status {status}): {}",
                stderr_tail(&stderr_output)
            ));
        }

        tracing::info!(
            elapsed_secs = started.elapsed().as_secs_f64(),
            "ffmpeg export finished"
        );
        Ok(true)
    }
}

#[async_trait]
impl ExportSession for FfmpegSession {
    async fn run(&self) -> SessionStatus {
        if self.cancel_requested.load(Ordering::SeqCst) {
            self.set_status(SessionStatus::Cancelled);
            return SessionStatus::Cancelled;
        }

        self.set_status(SessionStatus::Exporting);
        let status = match self.encode().await {
            Ok(true) => {
                self.set_progress(1.0);
                SessionStatus::Completed
            }
            Ok(false) => SessionStatus::Cancelled,
            Err(message) => SessionStatus::Failed(message),
        };
        self.set_status(status.clone());
        status
    }

    fn progress(&self) -> f64 {
        f64::from_bits(self.progress_bits.load(Ordering::SeqCst))
    }

    fn status(&self) -> SessionStatus {
        self.status
            .lock()
            .map(|s| s.clone())
            .unwrap_or_else(|_| SessionStatus::Failed("status lock poisoned".to_string()))
    }

    fn cancel(&self) {
        self.cancel_requested.store(true, Ordering::SeqCst);
        self.cancel_notify.notify_one();
    }
}

fn stderr_tail(stderr: &str) -> String {
    let lines: Vec<&str> = stderr.trim().lines().collect();
    let start = lines.len().saturating_sub(STDERR_TAIL_LINES);
    lines[start..].join("\n")
}

/// Accumulates `key=value` lines from `ffmpeg -progress`.
#[derive(Debug, Default)]
struct ProgressState {
    out_time_secs: f64,
    complete: bool,
}

impl ProgressState {
    fn update(&mut self, key: &str, value: &str) {
        match key {
            // out_time_ms is actually microseconds
            "out_time_ms" | "out_time_us" => {
                if let Ok(us) = value.parse::<f64>() {
                    self.out_time_secs = us / 1_000_000.0;
                }
            }
            "progress" => {
                self.complete = value == "end";
            }
            _ => {}
        }
    }

    fn fraction(&self, expected_duration_secs: f64) -> f64 {
        if self.complete {
            return 1.0;
        }
        if expected_duration_secs <= 0.0 {
            return 0.0;
        }
        (self.out_time_secs / expected_duration_secs).clamp(0.0, 1.0)
    }
}
