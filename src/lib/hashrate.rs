//! Cumulative share-work series and windowed hashrate estimation.
//!
//! The monitoring API exposes only a monotonically increasing
//! `share_work_sum` per channel. Instantaneous hashrate is derived from the
//! growth of that counter over a trailing window: each unit of work at
//! difficulty 1 corresponds to 2^32 expected hash attempts.

use std::collections::VecDeque;

use serde::Serialize;

/// Maximum samples retained per series. At one sample per 10 s poll cycle
/// this holds two hours of history.
pub const RING_CAPACITY: usize = 720;

/// Trailing window over which the instantaneous hashrate is estimated.
pub const HASHRATE_WINDOW_MS: u64 = 180_000;

/// Expected hash attempts per unit of share work at difficulty 1 (2^32).
pub const DIFF1_HASHES: f64 = 4_294_967_296.0;

/// One raw cumulative-work observation for a channel.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ShareWorkSample {
    pub timestamp_ms: u64,
    pub share_work_sum: f64,
}

/// One derived display sample of estimated hashrate.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct HashratePoint {
    pub timestamp_ms: u64,
    pub hashrate: f64,
}

/// Fixed-capacity FIFO sample buffer; the oldest entry is evicted on
/// overflow, so the series is self-limiting regardless of run duration.
#[derive(Debug, Clone)]
pub struct SampleRing<T> {
    samples: VecDeque<T>,
}

impl<T> Default for SampleRing<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> SampleRing<T> {
    pub fn new() -> Self {
        Self {
            samples: VecDeque::with_capacity(RING_CAPACITY),
        }
    }

    pub fn push(&mut self, sample: T) {
        if self.samples.len() == RING_CAPACITY {
            self.samples.pop_front();
        }
        self.samples.push_back(sample);
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn front(&self) -> Option<&T> {
        self.samples.front()
    }

    pub fn back(&self) -> Option<&T> {
        self.samples.back()
    }

    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.samples.iter()
    }
}

impl<T: Clone> SampleRing<T> {
    /// Snapshot copy, oldest first.
    pub fn to_vec(&self) -> Vec<T> {
        self.samples.iter().cloned().collect()
    }
}

impl SampleRing<ShareWorkSample> {
    /// Estimate the hashrate in H/s over the trailing window.
    ///
    /// Returns 0.0 when fewer than two samples exist, when no time has
    /// elapsed between the chosen samples, or when the counter was flat or
    /// decreased. A decrease means the counter was reset (the channel was
    /// reopened), never negative work.
    pub fn windowed_hashrate(&self, now_ms: u64) -> f64 {
        if self.samples.len() < 2 {
            return 0.0;
        }
        let (Some(newest), Some(oldest)) = (self.samples.back(), self.samples.front()) else {
            return 0.0;
        };

        // Oldest sample still inside the window, falling back to the oldest
        // retained sample when the whole buffer is older than the window.
        let cutoff = now_ms.saturating_sub(HASHRATE_WINDOW_MS);
        let baseline = self
            .samples
            .iter()
            .find(|s| s.timestamp_ms >= cutoff)
            .unwrap_or(oldest);

        let dt_secs = newest.timestamp_ms.saturating_sub(baseline.timestamp_ms) as f64 / 1000.0;
        if dt_secs <= 0.0 {
            return 0.0;
        }
        let dwork = newest.share_work_sum - baseline.share_work_sum;
        if dwork <= 0.0 {
            return 0.0;
        }
        (dwork / dt_secs) * DIFF1_HASHES
    }
}
