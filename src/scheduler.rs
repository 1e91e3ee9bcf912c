//! Bounded-concurrency crawl scheduler.
//!
//! A fixed pool of worker threads pulls work items from a shared queue
//! seeded with one entry per configured region. Subdivision pushes child
//! cells back onto the queue, so it grows during the run. Workers are
//! fully independent; the run terminates when the queue is empty and no
//! worker is busy, or early when the stop flag trips.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use tracing::{info, warn};

use crate::checkpoint::{Checkpointer, SaveTrigger};
use crate::client::{ApiCallCounter, SearchApi};
use crate::config::CrawlConfig;
use crate::constants::progress as progress_consts;
use crate::errors::CrawlError;
use crate::partition::{Partitioner, Processed, WorkItem};
use crate::progress::{CrawlSummary, RunProgress};
use crate::store::RecordStore;

/// Cooperative stop signal shared with the embedding application.
///
/// Tripping it stops the scheduler from handing out new items; in-flight
/// cells finish and a final checkpoint is flushed before `run` returns.
#[derive(Clone, Debug, Default)]
pub struct StopFlag(Arc<AtomicBool>);

impl StopFlag {
    /// Create an untripped flag.
    pub fn new() -> Self {
        Self::default()
    }

    /// Request a graceful stop.
    pub fn trigger(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    /// Whether a stop has been requested.
    pub fn is_triggered(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

/// How long a waiting worker sleeps before re-checking the stop flag.
const IDLE_WAIT: Duration = Duration::from_millis(200);

struct QueueState {
    items: VecDeque<WorkItem>,
    active: usize,
    draining: bool,
}

/// Runs the crawl: owns the queue, the worker pool, and the reporting
/// cadence. All shared state (store, counters, checkpointer) is injected.
pub struct CrawlScheduler<'a> {
    config: &'a CrawlConfig,
    client: &'a dyn SearchApi,
    store: &'a RecordStore,
    checkpointer: &'a Checkpointer,
    calls: &'a ApiCallCounter,
    stop: StopFlag,
}

impl<'a> CrawlScheduler<'a> {
    /// Build a scheduler over shared crawl state.
    pub fn new(
        config: &'a CrawlConfig,
        client: &'a dyn SearchApi,
        store: &'a RecordStore,
        checkpointer: &'a Checkpointer,
        calls: &'a ApiCallCounter,
        stop: StopFlag,
    ) -> Self {
        Self {
            config,
            client,
            store,
            checkpointer,
            calls,
            stop,
        }
    }

    /// Run the crawl to completion (or until the stop flag trips), flush a
    /// final checkpoint, and return the summary. Blocks the calling thread.
    pub fn run(&self) -> Result<CrawlSummary, CrawlError> {
        let started = Instant::now();
        let progress = RunProgress::new();
        let queue = Mutex::new(QueueState {
            items: self
                .config
                .regions
                .iter()
                .cloned()
                .map(WorkItem::Region)
                .collect(),
            active: 0,
            draining: false,
        });
        let available = Condvar::new();
        let last_report = Mutex::new(Instant::now());

        info!(
            "[geosweep:crawl] starting: {} regions, {} workers, cap={}, ladder={:?}",
            self.config.regions.len(),
            self.config.worker_count,
            self.config.cap,
            self.config.ladder
        );

        thread::scope(|scope| {
            for _ in 0..self.config.worker_count {
                scope.spawn(|| {
                    self.worker_loop(&queue, &available, &progress, started, &last_report)
                });
            }
        });

        if self.stop.is_triggered() {
            let leftover = queue.lock().expect("crawl queue poisoned").items.len();
            info!("[geosweep:crawl] stop requested; {leftover} queued items abandoned");
        }

        self.checkpointer.save(self.store, self.calls)?;

        let summary = progress.summary(self.store.len(), self.calls.get(), started.elapsed());
        for cell in &summary.best_effort {
            info!(
                "[geosweep:crawl] best-effort coverage at {} (reported {})",
                cell.code, cell.reported_total
            );
        }
        info!(
            "[geosweep:crawl] done: {} records, {} api calls, {:.1} min",
            summary.unique_records,
            summary.api_calls,
            summary.elapsed.as_secs_f64() / 60.0
        );
        Ok(summary)
    }

    fn worker_loop(
        &self,
        queue: &Mutex<QueueState>,
        available: &Condvar,
        progress: &RunProgress,
        started: Instant,
        last_report: &Mutex<Instant>,
    ) {
        loop {
            let item = {
                let mut state = queue.lock().expect("crawl queue poisoned");
                loop {
                    if state.draining || self.stop.is_triggered() {
                        state.draining = true;
                        available.notify_all();
                        return;
                    }
                    if let Some(item) = state.items.pop_front() {
                        state.active += 1;
                        break item;
                    }
                    if state.active == 0 {
                        // Queue empty and nobody working: the crawl is done.
                        available.notify_all();
                        return;
                    }
                    let (next, _) = available
                        .wait_timeout(state, IDLE_WAIT)
                        .expect("crawl queue poisoned");
                    state = next;
                }
            };

            let partitioner = Partitioner::new(self.config, self.client, self.store)
                .with_checkpoint(self.checkpointer, self.calls);
            let Processed { report, children } = partitioner.process(&item);
            progress.record(&report);

            if let Err(err) =
                self.checkpointer
                    .maybe_save(SaveTrigger::CellComplete, self.store, self.calls)
            {
                warn!("[geosweep:checkpoint] snapshot failed: {err}");
            }

            {
                let mut state = queue.lock().expect("crawl queue poisoned");
                if !children.is_empty() && !state.draining && !self.stop.is_triggered() {
                    state.items.extend(children.into_iter().map(WorkItem::Cell));
                }
                state.active -= 1;
                available.notify_all();
            }

            self.maybe_report(progress, started, last_report, queue);
        }
    }

    /// Cadence-limited progress line; skipped entirely while another
    /// worker holds the report slot.
    fn maybe_report(
        &self,
        progress: &RunProgress,
        started: Instant,
        last_report: &Mutex<Instant>,
        queue: &Mutex<QueueState>,
    ) {
        let report_every = Duration::from_millis(progress_consts::REPORT_EVERY_MS);
        {
            let Ok(mut last) = last_report.try_lock() else {
                return;
            };
            if last.elapsed() < report_every {
                return;
            }
            *last = Instant::now();
        }

        let counts = progress.counts();
        let records = self.store.len();
        let queued = queue.lock().expect("crawl queue poisoned").items.len();
        let minutes = started.elapsed().as_secs_f64() / 60.0;
        let rate = if minutes > 0.0 {
            records as f64 / minutes
        } else {
            0.0
        };
        info!(
            "[geosweep:crawl] processed={} queued={queued} leaves={} subdivided={} best_effort={} empty={} failed={} records={records} api_calls={} rate={rate:.0}/min",
            counts.processed,
            counts.leaves,
            counts.subdivided,
            counts.best_effort,
            counts.empty,
            counts.failed,
            self.calls.get()
        );
    }
}
