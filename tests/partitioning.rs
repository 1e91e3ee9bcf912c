use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use serde_json::json;
use tempfile::tempdir;

use geosweep::{
    ApiCallCounter, CellOutcome, Checkpointer, CrawlConfig, CrawlError, CrawlScheduler, GridCell,
    Partitioner, RecordStore, SearchApi, SearchPage, SeedRegion, StopFlag, StoreRecord, WorkItem,
    cell, geo,
};

fn test_config(ladder: Vec<f64>, cap: usize, max_level: usize) -> CrawlConfig {
    CrawlConfig {
        ladder,
        cap,
        max_level,
        worker_count: 4,
        regions: vec![SeedRegion {
            name: "Testville".to_string(),
            lat: 1.0,
            lng: 1.0,
            radius_km: 50.0,
        }],
        ..CrawlConfig::default()
    }
    .validated()
    .unwrap()
}

fn page_rows(prefix: &str, total: usize, page_size: usize, page_no: usize) -> Vec<StoreRecord> {
    let start = (page_no - 1) * page_size;
    if start >= total {
        return Vec::new();
    }
    let count = page_size.min(total - start);
    (0..count)
        .map(|idx| {
            StoreRecord::from_payload(
                json!({"sellerId": format!("{prefix}-{}", start + idx)}),
                "sellerId",
            )
            .unwrap()
        })
        .collect()
}

/// Reports the same total for every query; records get distinct ids per
/// query center so dedup does not hide pagination behavior.
struct FixedTotalApi {
    total: usize,
    page_size: usize,
    calls: Arc<AtomicUsize>,
}

impl FixedTotalApi {
    fn new(total: usize, page_size: usize) -> Self {
        Self {
            total,
            page_size,
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    fn prefix(lat: f64, lng: f64) -> String {
        format!("{:.4}:{:.4}", lat, lng)
    }
}

impl SearchApi for FixedTotalApi {
    fn probe(&self, lat: f64, lng: f64, _radius_km: f64) -> Result<SearchPage, CrawlError> {
        self.calls.fetch_add(1, Ordering::Relaxed);
        Ok(SearchPage {
            total: self.total,
            records: page_rows(&Self::prefix(lat, lng), self.total, self.page_size, 1),
        })
    }

    fn fetch_page(
        &self,
        lat: f64,
        lng: f64,
        _radius_km: f64,
        page_no: usize,
    ) -> Result<Vec<StoreRecord>, CrawlError> {
        self.calls.fetch_add(1, Ordering::Relaxed);
        Ok(page_rows(
            &Self::prefix(lat, lng),
            self.total,
            self.page_size,
            page_no,
        ))
    }
}

/// Always fails with the given error kind.
struct FailingApi {
    transient: bool,
}

impl SearchApi for FailingApi {
    fn probe(&self, _lat: f64, _lng: f64, _radius_km: f64) -> Result<SearchPage, CrawlError> {
        if self.transient {
            Err(CrawlError::Transient {
                reason: "connection refused".to_string(),
            })
        } else {
            Err(CrawlError::Api {
                code: "50000".to_string(),
                message: "malformed request".to_string(),
            })
        }
    }

    fn fetch_page(
        &self,
        _lat: f64,
        _lng: f64,
        _radius_km: f64,
        _page_no: usize,
    ) -> Result<Vec<StoreRecord>, CrawlError> {
        unreachable!("probe always fails first")
    }
}

fn unit_cell() -> GridCell {
    GridCell {
        south: 0.0,
        west: 0.0,
        north: 1.0,
        east: 1.0,
        level: 0,
    }
}

#[test]
fn leaf_cell_paginates_fully() {
    let config = test_config(vec![1.0, 0.5], 500, 1);
    let api = FixedTotalApi::new(250, config.api.page_size);
    let store = RecordStore::new();

    let processed =
        Partitioner::new(&config, &api, &store).process(&WorkItem::Cell(unit_cell()));

    assert_eq!(processed.report.outcome, CellOutcome::Leaf);
    assert_eq!(processed.report.reported_total, 250);
    assert_eq!(processed.report.fetched, 250);
    assert_eq!(processed.report.new_records, 250);
    assert!(processed.children.is_empty());
    assert_eq!(store.len(), 250);
    // Probe plus pages 2 and 3.
    assert_eq!(api.calls.load(Ordering::Relaxed), 3);
}

#[test]
fn total_at_cap_stays_a_leaf() {
    let config = test_config(vec![1.0, 0.5], 500, 1);
    let api = FixedTotalApi::new(500, config.api.page_size);
    let store = RecordStore::new();

    let processed =
        Partitioner::new(&config, &api, &store).process(&WorkItem::Cell(unit_cell()));

    assert_eq!(processed.report.outcome, CellOutcome::Leaf);
    assert!(processed.children.is_empty());
    assert_eq!(store.len(), 500);
}

#[test]
fn total_over_cap_subdivides_into_expected_children() {
    let config = test_config(vec![1.0, 0.5], 500, 1);
    let api = FixedTotalApi::new(501, config.api.page_size);
    let store = RecordStore::new();

    let processed =
        Partitioner::new(&config, &api, &store).process(&WorkItem::Cell(unit_cell()));

    assert_eq!(processed.report.outcome, CellOutcome::Subdivided);
    // 1.0° parent over a 0.5° child step: a 2x2 tiling.
    assert_eq!(processed.children.len(), 4);
    assert!(processed.children.iter().all(|c| c.level == 1));
    // The probe's first page is still ingested for coverage.
    assert_eq!(store.len(), config.api.page_size);
}

#[test]
fn dense_cell_at_max_level_is_best_effort_and_terminates() {
    let config = test_config(vec![1.0, 0.5], 500, 1);
    let api = FixedTotalApi::new(9_999, config.api.page_size);
    let store = RecordStore::new();
    let deepest = GridCell {
        south: 0.0,
        west: 0.0,
        north: 0.5,
        east: 0.5,
        level: 1,
    };

    let processed = Partitioner::new(&config, &api, &store).process(&WorkItem::Cell(deepest));

    assert_eq!(processed.report.outcome, CellOutcome::BestEffort);
    assert!(processed.children.is_empty());
    // Only the pages the cap makes meaningful are fetched: probe + 4 more.
    assert_eq!(api.calls.load(Ordering::Relaxed), 5);
    assert_eq!(store.len(), 500);
}

#[test]
fn transient_and_api_failures_degrade_to_failed_cells() {
    let config = test_config(vec![1.0, 0.5], 500, 1);
    let store = RecordStore::new();

    for transient in [true, false] {
        let api = FailingApi { transient };
        let processed =
            Partitioner::new(&config, &api, &store).process(&WorkItem::Cell(unit_cell()));
        assert_eq!(processed.report.outcome, CellOutcome::Failed);
        assert!(processed.children.is_empty());
    }
    assert!(store.is_empty());
}

#[test]
fn shallow_region_paginates_directly_without_a_grid() {
    let config = test_config(vec![1.0, 0.5], 500, 1);
    let api = FixedTotalApi::new(250, config.api.page_size);
    let store = RecordStore::new();
    let out_dir = tempdir().unwrap();
    let checkpointer = Checkpointer::new(out_dir.path(), 10_000, 10_000);
    let calls = ApiCallCounter::default();

    let scheduler = CrawlScheduler::new(
        &config,
        &api,
        &store,
        &checkpointer,
        &calls,
        StopFlag::new(),
    );
    let summary = scheduler.run().unwrap();

    assert_eq!(summary.counts.processed, 1);
    assert_eq!(summary.counts.leaves, 1);
    assert_eq!(summary.counts.subdivided, 0);
    assert_eq!(summary.unique_records, 250);
}

#[test]
fn always_dense_stub_terminates_at_max_level() {
    let config = test_config(vec![1.0, 0.5], 500, 1);
    let api = FixedTotalApi::new(501, config.api.page_size);
    let store = RecordStore::new();
    let out_dir = tempdir().unwrap();
    let checkpointer = Checkpointer::new(out_dir.path(), 10_000, 10_000);
    let calls = ApiCallCounter::default();

    let scheduler = CrawlScheduler::new(
        &config,
        &api,
        &store,
        &checkpointer,
        &calls,
        StopFlag::new(),
    );
    let summary = scheduler.run().unwrap();

    // The run must bottom out instead of recursing forever.
    let region = &config.regions[0];
    let (south, west, north, east) = geo::bbox_around(region.lat, region.lng, region.radius_km);
    let level0 = cell::tile(south, west, north, east, 1.0, 0).len();
    let level1 = level0 * 4;

    assert_eq!(summary.counts.processed, 1 + level0 + level1);
    assert_eq!(summary.counts.subdivided, 1 + level0);
    assert_eq!(summary.counts.best_effort, level1);
    assert_eq!(summary.best_effort.len(), level1);
    assert!(
        summary
            .best_effort
            .iter()
            .all(|cell| cell.reported_total == 501)
    );
}

#[test]
fn tripped_stop_flag_prevents_any_scheduling() {
    let config = test_config(vec![1.0, 0.5], 500, 1);
    let api = FixedTotalApi::new(250, config.api.page_size);
    let store = RecordStore::new();
    let out_dir = tempdir().unwrap();
    let checkpointer = Checkpointer::new(out_dir.path(), 10_000, 10_000);
    let calls = ApiCallCounter::default();

    let stop = StopFlag::new();
    stop.trigger();
    let scheduler = CrawlScheduler::new(&config, &api, &store, &checkpointer, &calls, stop);
    let summary = scheduler.run().unwrap();

    assert_eq!(summary.counts.processed, 0);
    // The shutdown flush still writes a (empty) snapshot.
    assert!(checkpointer.records_path().exists());
}
