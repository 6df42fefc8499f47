//! Classification progress accumulated across chained batches

use serde::Serialize;

use crate::models::{ClassificationStatus, JobSummary};

/// Running totals for one classification run (a chain of batches)
///
/// Each batch reports its own counters starting from zero. The accumulator
/// adds completed batches so views can show one monotonic success count for
/// the whole run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProgressAccumulator {
    cumulative_success: u64,
    total_known: u64,
}

impl ProgressAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Successes from batches that have already completed
    pub fn cumulative_success(&self) -> u64 {
        self.cumulative_success
    }

    /// Best known size of the whole run's backlog
    pub fn total_known(&self) -> u64 {
        self.total_known
    }

    /// Fold a completed batch into the totals
    pub fn on_batch_completed(&mut self, summary: &JobSummary) {
        self.cumulative_success += summary.success;
        self.total_known = self.total_known.max(self.cumulative_success);
    }

    /// Record a backlog probe. The run's total never shrinks below what has
    /// already been classified plus what is still waiting.
    pub fn observe_backlog(&mut self, remaining: u64) {
        self.total_known = self
            .total_known
            .max(self.cumulative_success + remaining);
    }

    /// Live batch status with the success count of earlier batches added in
    pub fn merged(&self, live: &ClassificationStatus) -> ClassificationStatus {
        let mut merged = live.clone();
        merged.summary.success = live.summary.success + self.cumulative_success;
        merged
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

/// Display-ready overall progress
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ProgressView {
    pub processed: u64,
    pub total: u64,
    pub remaining: u64,
    pub percent: u8,
}

impl ProgressView {
    /// Overall progress of a run given a merged status and the known backlog
    pub fn from_status(status: &ClassificationStatus, total_unclassified: u64) -> Self {
        let processed = status.summary.success + status.summary.failed;
        let total = total_unclassified.max(processed).max(status.summary.total);
        let percent = if total == 0 {
            0
        } else {
            ((processed as f64 / total as f64) * 100.0).round().min(100.0) as u8
        };
        Self {
            processed,
            total,
            remaining: total - processed,
            percent,
        }
    }

    /// One-line status text, e.g. "AI classifying 65/100 (65%)"
    pub fn status_line(&self) -> String {
        format!(
            "AI classifying {}/{} ({}%)",
            self.processed, self.total, self.percent
        )
    }
}
