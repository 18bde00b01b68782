//! Debounced progress reporting with a smoothed ETA
//!
//! The reporter is fed after every processed identifier but only returns a snapshot
//! when one is due, so subscribers are not flooded on fast runs. It holds no clock of
//! its own: elapsed time arrives with each [`JobProgress`], which keeps it deterministic.

use crate::config::ProgressConfig;
use crate::types::{Eta, ProgressSnapshot};
use std::time::Duration;

/// Loop state the reporter derives snapshots from
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct JobProgress {
    /// Identifiers processed
    pub completed: usize,
    /// Identifiers in the batch
    pub total: usize,
    /// Failures so far (record and holdings)
    pub failed: usize,
    /// Time since the run started
    pub elapsed: Duration,
}

/// Throttles progress updates and tracks the per-item rate
#[derive(Debug)]
pub struct ProgressReporter {
    config: ProgressConfig,
    last_emit: Option<(Duration, usize)>,
    /// Smoothed seconds per item
    secs_per_item: Option<f64>,
    last_sample: (Duration, usize),
}

impl ProgressReporter {
    /// New reporter with nothing emitted yet
    pub fn new(config: ProgressConfig) -> Self {
        Self {
            config,
            last_emit: None,
            secs_per_item: None,
            last_sample: (Duration::ZERO, 0),
        }
    }

    /// Record a completed item; returns a snapshot when one should be published
    ///
    /// A snapshot is due for the first and last item, when `min_interval` has passed
    /// since the previous one, or when `min_items` items completed since then.
    pub fn on_item_completed(&mut self, progress: &JobProgress) -> Option<ProgressSnapshot> {
        self.update_rate(progress);

        let is_first = self.last_emit.is_none();
        let is_last = progress.completed >= progress.total;
        let due = match self.last_emit {
            None => true,
            Some((at, completed)) => {
                progress.elapsed.saturating_sub(at) >= self.config.min_interval
                    || self
                        .config
                        .min_items
                        .is_some_and(|n| progress.completed.saturating_sub(completed) >= n)
            }
        };

        if is_first || is_last || due {
            self.last_emit = Some((progress.elapsed, progress.completed));
            Some(self.snapshot(progress))
        } else {
            None
        }
    }

    /// Unthrottled view of the current progress
    pub fn snapshot(&self, progress: &JobProgress) -> ProgressSnapshot {
        snapshot_at(progress, self.secs_per_item)
    }

    /// Smoothed seconds per item, once an item has completed
    pub fn secs_per_item(&self) -> Option<f64> {
        self.secs_per_item
    }

    fn update_rate(&mut self, progress: &JobProgress) {
        let (prev_elapsed, prev_completed) = self.last_sample;
        let items = progress.completed.saturating_sub(prev_completed);
        if items == 0 {
            return;
        }
        self.last_sample = (progress.elapsed, progress.completed);

        self.secs_per_item = Some(match self.secs_per_item {
            // straight-line rate seeds the average
            None => progress.elapsed.as_secs_f64() / progress.completed as f64,
            Some(avg) => {
                let sample =
                    progress.elapsed.saturating_sub(prev_elapsed).as_secs_f64() / items as f64;
                let alpha = self.config.eta_smoothing;
                alpha * sample + (1.0 - alpha) * avg
            }
        });
    }
}

/// Snapshot of `progress` extrapolated at `secs_per_item`
///
/// Without a rate the straight-line `elapsed / completed` is used; with nothing
/// completed the ETA is unknown.
pub fn snapshot_at(progress: &JobProgress, secs_per_item: Option<f64>) -> ProgressSnapshot {
    let percent = if progress.total == 0 {
        100.0
    } else {
        (progress.completed as f32 / progress.total as f32) * 100.0
    };

    ProgressSnapshot {
        completed: progress.completed,
        total: progress.total,
        failed: progress.failed,
        percent,
        elapsed_ms: u64::try_from(progress.elapsed.as_millis()).unwrap_or(u64::MAX),
        eta: eta(progress, secs_per_item),
        is_final: progress.completed >= progress.total,
    }
}

fn eta(progress: &JobProgress, secs_per_item: Option<f64>) -> Eta {
    if progress.completed == 0 {
        return Eta::Unknown;
    }
    let per_item =
        secs_per_item.unwrap_or_else(|| progress.elapsed.as_secs_f64() / progress.completed as f64);
    let remaining = progress.total.saturating_sub(progress.completed) as f64;
    Eta::Remaining {
        seconds: (per_item * remaining).round() as u64,
    }
}
