//! Fixed-interval frame sampling.
//!
//! [`sample_timestamps`] computes where to look; [`FrameSampler`] walks
//! those offsets lazily, decoding one frame per pull. Decode failures are
//! skipped so a damaged region of the file leaves a gap in the output
//! rather than aborting the run.

use std::sync::Arc;

use async_trait::async_trait;

use framesift_media::{SampledFrame, VideoAsset};

/// Absorbs floating-point error in `duration / interval`, so that
/// `10.0 / 0.1` counts as exactly 100 samples.
const SAMPLE_EPSILON: f64 = 1e-9;

/// Timestamps `i * interval` for every `i < floor(duration / interval)`.
///
/// Every sample's full interval fits inside the duration, so the last
/// timestamp is always strictly below `duration`. Non-positive or
/// non-finite inputs yield no samples.
pub fn sample_timestamps(duration: f64, interval: f64) -> Vec<f64> {
    if !(duration.is_finite() && interval.is_finite()) || duration <= 0.0 || interval <= 0.0 {
        return Vec::new();
    }

    let count = (duration / interval + SAMPLE_EPSILON).floor() as usize;
    (0..count).map(|i| i as f64 * interval).collect()
}

/// Tolerance window used for a given sampling interval.
pub fn tolerance_for(interval: f64) -> f64 {
    interval / 4.0
}

/// A lazy, single-pass, pull-based sequence of decoded frames.
#[async_trait]
pub trait FrameSource: Send {
    /// Pull the next frame, or `None` when the sequence is exhausted.
    async fn next_frame(&mut self) -> Option<SampledFrame>;

    /// Upper bound on the number of frames still to come.
    fn remaining(&self) -> usize;
}

/// In-memory frames, mostly for driving analyzers directly.
#[async_trait]
impl FrameSource for std::vec::IntoIter<SampledFrame> {
    async fn next_frame(&mut self) -> Option<SampledFrame> {
        self.next()
    }

    fn remaining(&self) -> usize {
        self.len()
    }
}

/// Decodes frames from an asset at precomputed offsets.
pub struct FrameSampler {
    asset: Arc<dyn VideoAsset>,
    timestamps: std::vec::IntoIter<f64>,
    tolerance: f64,
    dropped: usize,
}

impl FrameSampler {
    /// Plan samples over `duration` every `interval` seconds. Nothing is
    /// decoded until the first pull.
    pub fn new(asset: Arc<dyn VideoAsset>, duration: f64, interval: f64) -> Self {
        Self::with_timestamps(
            asset,
            sample_timestamps(duration, interval),
            tolerance_for(interval),
        )
    }

    /// Sample at explicit offsets with an explicit tolerance.
    pub fn with_timestamps(asset: Arc<dyn VideoAsset>, timestamps: Vec<f64>, tolerance: f64) -> Self {
        Self {
            asset,
            timestamps: timestamps.into_iter(),
            tolerance: tolerance.max(0.0),
            dropped: 0,
        }
    }

    pub fn tolerance(&self) -> f64 {
        self.tolerance
    }

    /// Number of offsets skipped so far because decoding failed.
    pub fn dropped(&self) -> usize {
        self.dropped
    }
}

#[async_trait]
impl FrameSource for FrameSampler {
    async fn next_frame(&mut self) -> Option<SampledFrame> {
        for requested in self.timestamps.by_ref() {
            match self.asset.frame_near(requested, self.tolerance).await {
                Ok(frame) => return Some(frame),
                Err(e) => {
                    self.dropped += 1;
                    tracing::warn!(
                        asset = %self.asset.label(),
                        requested,
                        error = %e,
                        "Skipping undecodable frame"
                    );
                }
            }
        }
        None
    }

    fn remaining(&self) -> usize {
        self.timestamps.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use framesift_media::SyntheticAsset;
    use proptest::prelude::*;

    #[test]
    fn test_even_split() {
        assert_eq!(sample_timestamps(10.0, 2.0), vec![0.0, 2.0, 4.0, 6.0, 8.0]);
    }

    #[test]
    fn test_partial_interval_dropped() {
        assert_eq!(sample_timestamps(9.5, 2.0), vec![0.0, 2.0, 4.0, 6.0]);
    }

    #[test]
    fn test_fine_interval_absorbs_rounding() {
        assert_eq!(sample_timestamps(10.0, 0.1).len(), 100);
        assert_eq!(sample_timestamps(3.0, 0.3).len(), 10);
    }

    #[test]
    fn test_degenerate_inputs() {
        assert!(sample_timestamps(0.5, 1.0).is_empty());
        assert!(sample_timestamps(0.0, 1.0).is_empty());
        assert!(sample_timestamps(10.0, 0.0).is_empty());
        assert!(sample_timestamps(10.0, -1.0).is_empty());
        assert!(sample_timestamps(f64::NAN, 1.0).is_empty());
    }

    #[tokio::test]
    async fn test_sampler_is_lazy_and_skips_failures() {
        let asset = Arc::new(SyntheticAsset::new(10.0, 8, 8, 25.0).failing_at([4.0]));
        let mut sampler = FrameSampler::new(asset.clone(), 10.0, 2.0);

        assert_eq!(asset.decode_count(), 0);
        assert_eq!(sampler.remaining(), 5);
        assert!((sampler.tolerance() - 0.5).abs() < 1e-12);

        let mut times = Vec::new();
        while let Some(frame) = sampler.next_frame().await {
            times.push(frame.time);
        }

        assert_eq!(times, vec![0.0, 2.0, 6.0, 8.0]);
        assert_eq!(sampler.dropped(), 1);
        assert_eq!(asset.decode_count(), 5);
        assert!(sampler.next_frame().await.is_none());
    }

    proptest! {
        #[test]
        fn test_samples_cover_duration(duration in 0.01f64..10_000.0, interval in 0.01f64..100.0) {
            let times = sample_timestamps(duration, interval);
            let n = times.len() as f64;

            // every planned interval fits; one more would not
            prop_assert!(n * interval <= duration + 1e-6);
            prop_assert!((n + 1.0) * interval > duration - 1e-6);

            if let Some(last) = times.last() {
                prop_assert!(*last < duration);
            }
            for pair in times.windows(2) {
                prop_assert!(pair[0] < pair[1]);
            }
        }
    }
}
