use std::sync::atomic::{AtomicU64, Ordering};

use crate::processing::PipelineOutcome;

/// Thread-safe counters describing pipeline activity.
#[derive(Debug, Default)]
pub struct PipelineMetrics {
    documents_processed: AtomicU64,
    pages_merged: AtomicU64,
    pages_failed: AtomicU64,
    task_failures: AtomicU64,
    chunks_produced: AtomicU64,
    runs_cancelled: AtomicU64,
    runs_aborted: AtomicU64,
}

impl PipelineMetrics {
    /// Create an empty metrics accumulator.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a completed run.
    pub fn record_outcome(&self, outcome: &PipelineOutcome) {
        let task_failures = outcome.partial_failures.len()
            + outcome
                .failed_pages
                .iter()
                .map(|page| page.task_failures.len())
                .sum::<usize>();

        self.documents_processed.fetch_add(1, Ordering::Relaxed);
        self.pages_merged
            .fetch_add(outcome.merged.len() as u64, Ordering::Relaxed);
        self.pages_failed
            .fetch_add(outcome.failed_pages.len() as u64, Ordering::Relaxed);
        self.task_failures
            .fetch_add(task_failures as u64, Ordering::Relaxed);
        self.chunks_produced
            .fetch_add(outcome.chunks.len() as u64, Ordering::Relaxed);
        if outcome.cancelled {
            self.runs_cancelled.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Record a hard-cancelled run.
    pub fn record_aborted(&self) {
        self.runs_aborted.fetch_add(1, Ordering::Relaxed);
    }

    /// Return a snapshot of the current counters.
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            documents_processed: self.documents_processed.load(Ordering::Relaxed),
            pages_merged: self.pages_merged.load(Ordering::Relaxed),
            pages_failed: self.pages_failed.load(Ordering::Relaxed),
            task_failures: self.task_failures.load(Ordering::Relaxed),
            chunks_produced: self.chunks_produced.load(Ordering::Relaxed),
            runs_cancelled: self.runs_cancelled.load(Ordering::Relaxed),
            runs_aborted: self.runs_aborted.load(Ordering::Relaxed),
        }
    }
}

/// Immutable view of pipeline counters used for reporting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub struct MetricsSnapshot {
    /// Documents that completed a run (gracefully cancelled runs included).
    pub documents_processed: u64,
    /// Pages that produced a merged result.
    pub pages_merged: u64,
    /// Pages without a merged result.
    pub pages_failed: u64,
    /// Individual (page, processor) task failures.
    pub task_failures: u64,
    /// Chunks emitted across all runs.
    pub chunks_produced: u64,
    /// Runs that were cancelled gracefully.
    pub runs_cancelled: u64,
    /// Runs that were aborted.
    pub runs_aborted: u64,
}
