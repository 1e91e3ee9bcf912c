//! Run-wide progress counters and the final crawl summary.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::types::CellCode;

/// Classification outcome for one processed work item.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CellOutcome {
    /// Probe reported zero results; discarded.
    Empty,
    /// Fully paginated within the cap.
    Leaf,
    /// Replaced by child cells at the next ladder level.
    Subdivided,
    /// Over the cap at the deepest level; paginated up to the cap anyway.
    BestEffort,
    /// Probe or pagination failed after retries; skipped.
    Failed,
}

/// Report for one processed work item.
#[derive(Clone, Debug)]
pub struct CellReport {
    /// Identity code of the item (cell code or region name).
    pub code: CellCode,
    /// How the item was classified.
    pub outcome: CellOutcome,
    /// Total reported by the probe (zero when the probe itself failed).
    pub reported_total: usize,
    /// Records fetched across the probe and all pages.
    pub fetched: usize,
    /// Records that were new to the store.
    pub new_records: usize,
    /// Child cells produced by subdivision.
    pub children: usize,
}

/// A cell that stayed over the cap at the deepest ladder level; coverage
/// there is known-incomplete.
#[derive(Clone, Debug)]
pub struct BestEffortCell {
    /// Identity code of the cell.
    pub code: CellCode,
    /// Total the service reported for it.
    pub reported_total: usize,
}

/// Aggregate counters at one point in time.
#[derive(Clone, Copy, Debug, Default)]
pub struct ProgressCounts {
    pub processed: usize,
    pub empty: usize,
    pub leaves: usize,
    pub subdivided: usize,
    pub best_effort: usize,
    pub failed: usize,
    pub fetched: usize,
    pub new_records: usize,
}

/// Final run report.
#[derive(Clone, Debug)]
pub struct CrawlSummary {
    /// Distinct records in the store at the end of the run.
    pub unique_records: usize,
    /// Cumulative search requests issued.
    pub api_calls: u64,
    /// Wall-clock run duration.
    pub elapsed: Duration,
    /// Aggregate per-outcome counters.
    pub counts: ProgressCounts,
    /// Cells whose coverage is known-incomplete.
    pub best_effort: Vec<BestEffortCell>,
}

/// Shared, lock-guarded run progress. Clone-able handle; all workers
/// record into the same counters.
#[derive(Clone, Default)]
pub struct RunProgress {
    inner: Arc<Mutex<ProgressInner>>,
}

#[derive(Default)]
struct ProgressInner {
    counts: ProgressCounts,
    best_effort: Vec<BestEffortCell>,
}

impl RunProgress {
    /// Create empty progress state.
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold one item report into the counters.
    pub fn record(&self, report: &CellReport) {
        let mut inner = self.inner.lock().expect("run progress poisoned");
        inner.counts.processed += 1;
        inner.counts.fetched += report.fetched;
        inner.counts.new_records += report.new_records;
        match report.outcome {
            CellOutcome::Empty => inner.counts.empty += 1,
            CellOutcome::Leaf => inner.counts.leaves += 1,
            CellOutcome::Subdivided => inner.counts.subdivided += 1,
            CellOutcome::BestEffort => {
                inner.counts.best_effort += 1;
                inner.best_effort.push(BestEffortCell {
                    code: report.code.clone(),
                    reported_total: report.reported_total,
                });
            }
            CellOutcome::Failed => inner.counts.failed += 1,
        }
    }

    /// Snapshot of the aggregate counters.
    pub fn counts(&self) -> ProgressCounts {
        self.inner.lock().expect("run progress poisoned").counts
    }

    /// Build the final run report.
    pub fn summary(&self, unique_records: usize, api_calls: u64, elapsed: Duration) -> CrawlSummary {
        let inner = self.inner.lock().expect("run progress poisoned");
        CrawlSummary {
            unique_records,
            api_calls,
            elapsed,
            counts: inner.counts,
            best_effort: inner.best_effort.clone(),
        }
    }
}
