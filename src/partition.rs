//! Cell classification and work-item processing.
//!
//! Classification is a pure function of the probed total, the ladder
//! position, and the cap; the [`Partitioner`] owns the probe, pagination,
//! and subdivision I/O around it. A failed item is logged and skipped,
//! never fatal to the run.

use tracing::{debug, warn};

use crate::cell::{self, GridCell};
use crate::checkpoint::{Checkpointer, SaveTrigger};
use crate::client::{ApiCallCounter, SearchApi};
use crate::config::{CrawlConfig, SeedRegion};
use crate::errors::CrawlError;
use crate::geo;
use crate::progress::{CellOutcome, CellReport};
use crate::record::StoreRecord;
use crate::store::RecordStore;
use crate::types::CellCode;

/// Work pulled from the crawl queue: a configured seed region or a grid
/// cell produced by subdivision.
#[derive(Clone, Debug)]
pub enum WorkItem {
    /// A configured top-level region of interest.
    Region(SeedRegion),
    /// A grid cell produced by seeding or subdivision.
    Cell(GridCell),
}

impl WorkItem {
    /// Identity code for logs and reports.
    pub fn code(&self) -> CellCode {
        match self {
            WorkItem::Region(region) => region.name.clone(),
            WorkItem::Cell(cell) => cell.code(),
        }
    }
}

/// Decision for a probed item.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Classification {
    /// Nothing here; discard without further requests.
    Empty,
    /// Fully coverable by direct pagination.
    Leaf,
    /// Too dense; refine at the next ladder level.
    Subdivide,
    /// Too dense at the deepest level; paginate what the cap allows.
    BestEffort,
}

/// Classify a probed total against the cap and ladder position.
pub fn classify(reported_total: usize, level: usize, config: &CrawlConfig) -> Classification {
    if reported_total == 0 {
        Classification::Empty
    } else if reported_total <= config.cap {
        Classification::Leaf
    } else if level < config.max_level {
        Classification::Subdivide
    } else {
        Classification::BestEffort
    }
}

/// Number of useful pages for a reported total: enough to cover it,
/// bounded by the pages the cap makes meaningful.
pub fn page_budget(reported_total: usize, config: &CrawlConfig) -> usize {
    let wanted = reported_total.div_ceil(config.api.page_size);
    let capped = config.cap.div_ceil(config.api.page_size);
    wanted.min(capped).max(1)
}

/// Result of processing one work item.
#[derive(Debug)]
pub struct Processed {
    /// Outcome and counts for reporting.
    pub report: CellReport,
    /// Child cells to enqueue (non-empty only for subdivision).
    pub children: Vec<GridCell>,
}

/// Drives probe → classify → paginate/subdivide for work items.
pub struct Partitioner<'a> {
    config: &'a CrawlConfig,
    client: &'a dyn SearchApi,
    store: &'a RecordStore,
    checkpoint: Option<(&'a Checkpointer, &'a ApiCallCounter)>,
}

impl<'a> Partitioner<'a> {
    /// Build a partitioner over the shared client and store.
    pub fn new(config: &'a CrawlConfig, client: &'a dyn SearchApi, store: &'a RecordStore) -> Self {
        Self {
            config,
            client,
            store,
            checkpoint: None,
        }
    }

    /// Attach a checkpointer so long paginations can snapshot mid-cell as
    /// record thresholds trip.
    pub fn with_checkpoint(
        mut self,
        checkpointer: &'a Checkpointer,
        calls: &'a ApiCallCounter,
    ) -> Self {
        self.checkpoint = Some((checkpointer, calls));
        self
    }

    /// Probe, classify, and fully handle one work item. Failures degrade
    /// to a `Failed` report; they never propagate.
    pub fn process(&self, item: &WorkItem) -> Processed {
        match self.try_process(item) {
            Ok(processed) => processed,
            Err(err) => {
                warn!("[geosweep:crawl] {} failed, skipping: {err}", item.code());
                Processed {
                    report: CellReport {
                        code: item.code(),
                        outcome: CellOutcome::Failed,
                        reported_total: 0,
                        fetched: 0,
                        new_records: 0,
                        children: 0,
                    },
                    children: Vec::new(),
                }
            }
        }
    }

    fn try_process(&self, item: &WorkItem) -> Result<Processed, CrawlError> {
        let (lat, lng, radius_km) = match item {
            WorkItem::Region(region) => (
                region.lat,
                region.lng,
                region.radius_km.min(self.config.max_radius_km),
            ),
            WorkItem::Cell(grid_cell) => {
                let (lat, lng) = grid_cell.center();
                (
                    lat,
                    lng,
                    grid_cell.covering_radius_km(self.config.margin_km, self.config.max_radius_km),
                )
            }
        };

        let page = self.client.probe(lat, lng, radius_km)?;
        let total = page.total;
        let mut fetched = page.records.len();
        let mut new_records = self.ingest(page.records);

        // A region is never best-effort itself: when dense it seeds the
        // coarsest grid instead.
        let classification = match item {
            WorkItem::Region(_) if total > self.config.cap => Classification::Subdivide,
            WorkItem::Region(_) => classify(total, 0, self.config),
            WorkItem::Cell(grid_cell) => classify(total, grid_cell.level, self.config),
        };
        debug!(
            "[geosweep:crawl] {} total={total} radius={radius_km:.1}km -> {classification:?}",
            item.code()
        );

        let (outcome, children) = match classification {
            Classification::Empty => (CellOutcome::Empty, Vec::new()),
            Classification::Leaf | Classification::BestEffort => {
                let (page_fetched, page_new) = self.paginate(lat, lng, radius_km, total)?;
                fetched += page_fetched;
                new_records += page_new;
                let outcome = if classification == Classification::Leaf {
                    CellOutcome::Leaf
                } else {
                    CellOutcome::BestEffort
                };
                (outcome, Vec::new())
            }
            Classification::Subdivide => (CellOutcome::Subdivided, self.subdivide(item)),
        };

        Ok(Processed {
            report: CellReport {
                code: item.code(),
                outcome,
                reported_total: total,
                fetched,
                new_records,
                children: children.len(),
            },
            children,
        })
    }

    /// Fetch pages 2..=budget for an item whose page 1 came from the
    /// probe. Stops early on an empty page.
    fn paginate(
        &self,
        lat: f64,
        lng: f64,
        radius_km: f64,
        total: usize,
    ) -> Result<(usize, usize), CrawlError> {
        let budget = page_budget(total, self.config);
        let mut fetched = 0;
        let mut new_records = 0;
        for page_no in 2..=budget {
            let rows = self.client.fetch_page(lat, lng, radius_km, page_no)?;
            if rows.is_empty() {
                break;
            }
            fetched += rows.len();
            new_records += self.ingest(rows);
        }
        Ok((fetched, new_records))
    }

    fn ingest(&self, records: Vec<StoreRecord>) -> usize {
        let new_records = self.store.ingest(records);
        if new_records > 0
            && let Some((checkpointer, calls)) = self.checkpoint
            && let Err(err) = checkpointer.maybe_save(SaveTrigger::RecordsIngested, self.store, calls)
        {
            warn!("[geosweep:checkpoint] snapshot failed: {err}");
        }
        new_records
    }

    fn subdivide(&self, item: &WorkItem) -> Vec<GridCell> {
        match item {
            WorkItem::Region(region) => {
                let radius = region.radius_km.min(self.config.max_radius_km);
                let (south, west, north, east) = geo::bbox_around(region.lat, region.lng, radius);
                cell::tile(south, west, north, east, self.config.step_for_level(0), 0)
            }
            WorkItem::Cell(grid_cell) => {
                let child_level = grid_cell.level + 1;
                grid_cell.children(self.config.step_for_level(child_level), child_level)
            }
        }
    }
}
