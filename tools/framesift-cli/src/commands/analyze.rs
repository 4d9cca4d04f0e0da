//! Score a video frame by frame.

use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;

use framesift_analysis::{AnalysisReport, AnalysisRun, AnalysisState, AnalyzerKind};
use framesift_common::config::AppConfig;
use framesift_media::VideoAsset;

/// Width of the bar column in the result table.
const BAR_WIDTH: usize = 40;

pub async fn run(
    config: &AppConfig,
    video: PathBuf,
    analyzer: String,
    interval: Option<f64>,
    report: Option<PathBuf>,
    threshold: f64,
) -> anyhow::Result<()> {
    let kind: AnalyzerKind = analyzer.parse()?;
    let interval = interval.unwrap_or(config.analysis.interval_secs);
    let asset: Arc<dyn VideoAsset> = Arc::new(super::open_asset(config, &video));
    let run = Arc::new(AnalysisRun::new(kind.build(&config.analysis)));

    println!("Analyzing: {}", video.display());
    println!("  Analyzer: {}", run.title());
    println!("  Interval: {interval}s");

    if !run.start(asset.clone(), interval).await {
        anyhow::bail!("Could not start analysis: interval must be a positive number of seconds");
    }

    let ctrl_c = tokio::spawn({
        let run = run.clone();
        async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                println!("\n  Cancelling...");
                run.cancel();
            }
        }
    });

    let mut rx = run.subscribe();
    loop {
        let snapshot = rx.borrow_and_update().clone();
        if !snapshot.is_running {
            break;
        }
        print!("\r  Progress: {:.1}%  ", snapshot.progress * 100.0);
        std::io::stdout().flush().ok();
        if rx.changed().await.is_err() {
            break;
        }
    }
    run.wait().await;
    ctrl_c.abort();
    println!();

    let snapshot = run.snapshot();
    match snapshot.state {
        AnalysisState::Completed => {}
        AnalysisState::Cancelled => {
            println!("Analysis cancelled.");
            return Ok(());
        }
        AnalysisState::Failed => {
            let reason = snapshot
                .error
                .map(|e| e.to_string())
                .unwrap_or_else(|| "unknown error".to_string());
            anyhow::bail!("Analysis failed: {reason}");
        }
        AnalysisState::Idle | AnalysisState::Running => {
            anyhow::bail!("Analysis ended in unexpected state {:?}", snapshot.state);
        }
    }

    let duration = asset.load_duration().await.unwrap_or(0.0);
    let report_data = AnalysisReport::new(
        video.display().to_string(),
        run.title(),
        interval,
        duration,
        snapshot.results,
    );

    print_table(&report_data);
    print_summary(&report_data, threshold);

    if let Some(path) = report {
        report_data.write_to(&path)?;
        println!("Report written to {}", path.display());
    }

    Ok(())
}

fn print_table(report: &AnalysisReport) {
    let max = report
        .peak()
        .map(|p| p.amount)
        .filter(|a| *a > 0.0)
        .unwrap_or(1.0);

    println!("{:>10}  {:>10}", "time (s)", "amount");
    for r in &report.results {
        let filled = ((r.amount / max) * BAR_WIDTH as f64).round() as usize;
        println!(
            "{:>10.3}  {:>10.4}  {}",
            r.time,
            r.amount,
            "#".repeat(filled.min(BAR_WIDTH))
        );
    }
}

fn print_summary(report: &AnalysisReport, threshold: f64) {
    println!();
    println!("Frames analyzed: {}", report.results.len());
    if let Some(peak) = report.peak() {
        println!("  Peak: {:.4} at {:.3}s", peak.amount, peak.time);
    }
    if let Some(mean) = report.mean_amount() {
        println!("  Mean: {mean:.4}");
    }

    let segments = report.segments_above(threshold);
    if segments.is_empty() {
        println!("  No segments above {threshold}");
        return;
    }
    println!("  Segments above {threshold}:");
    for seg in segments {
        println!(
            "    {:>8.3}s - {:>8.3}s  (peak {:.4})",
            seg.start, seg.end, seg.peak
        );
    }
}
