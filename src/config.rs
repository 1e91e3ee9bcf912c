//! Crawl configuration and validation.

use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;

use crate::constants::api;
use crate::errors::CrawlError;
use crate::retry::RetryPolicy;
use crate::types::RegionName;

fn default_region_radius_km() -> f64 {
    200.0
}

/// A top-level region of interest to cover.
#[derive(Clone, Debug, Deserialize)]
pub struct SeedRegion {
    /// Display name used in logs and reports.
    pub name: RegionName,
    /// Center latitude, degrees.
    pub lat: f64,
    /// Center longitude, degrees.
    pub lng: f64,
    /// Initial search radius around the center, kilometres.
    #[serde(default = "default_region_radius_km")]
    pub radius_km: f64,
}

/// Search service endpoint and request shaping.
#[derive(Clone, Debug)]
pub struct ApiConfig {
    /// Base URL of the service.
    pub base_url: String,
    /// Search endpoint path appended to the base URL.
    pub search_path: String,
    /// `Origin` header the service expects.
    pub origin: String,
    /// `Referer` header the service expects.
    pub referer: String,
    /// User agent presented to the service.
    pub user_agent: String,
    /// Payload field carrying the record identifier.
    pub id_field: String,
    /// Fixed page size the service paginates with.
    pub page_size: usize,
    /// Per-request timeout; exceeding it counts as a transient failure.
    pub timeout: Duration,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: api::DEFAULT_BASE_URL.to_string(),
            search_path: api::SEARCH_PATH.to_string(),
            origin: api::DEFAULT_ORIGIN.to_string(),
            referer: api::DEFAULT_REFERER.to_string(),
            user_agent: api::DEFAULT_USER_AGENT.to_string(),
            id_field: api::DEFAULT_ID_FIELD.to_string(),
            page_size: 100,
            timeout: Duration::from_secs(30),
        }
    }
}

/// Top-level crawl configuration.
#[derive(Clone, Debug)]
pub struct CrawlConfig {
    /// Resolution ladder: per-level cell step in degrees, coarsest first.
    /// Each step must divide the previous one evenly so children tile
    /// their parent exactly.
    pub ladder: Vec<f64>,
    /// Max trustworthy results for a single query. Conservative: the
    /// service returns duplicates rather than erroring past its real
    /// boundary, and that boundary is not assumed stable.
    pub cap: usize,
    /// Hard service limit on query radius, kilometres.
    pub max_radius_km: f64,
    /// Deepest ladder index before a dense cell is accepted best-effort.
    pub max_level: usize,
    /// Safety margin added to each cell's covering radius, kilometres.
    pub margin_km: f64,
    /// Worker thread count.
    pub worker_count: usize,
    /// New-record count that triggers a checkpoint write.
    pub checkpoint_every_records: usize,
    /// Completed-cell count that triggers a checkpoint write.
    pub checkpoint_every_cells: usize,
    /// Retry budget for transient search failures.
    pub retry: RetryPolicy,
    /// Search service endpoint settings.
    pub api: ApiConfig,
    /// Regions of interest seeding the work queue.
    pub regions: Vec<SeedRegion>,
    /// Directory receiving checkpoint artifacts.
    pub output_dir: PathBuf,
}

impl Default for CrawlConfig {
    fn default() -> Self {
        Self {
            // ~111 km, ~5.5 km, and ~280 m cells.
            ladder: vec![1.0, 0.05, 0.0025],
            cap: 10_000,
            max_radius_km: 200.0,
            max_level: 2,
            margin_km: 1.0,
            worker_count: 10,
            checkpoint_every_records: 1_000,
            checkpoint_every_cells: 50,
            retry: RetryPolicy::default(),
            api: ApiConfig::default(),
            regions: Vec::new(),
            output_dir: PathBuf::from("output"),
        }
    }
}

impl CrawlConfig {
    /// Validate invariants the crawler depends on, returning the config
    /// unchanged on success. Called once at startup; violations are fatal.
    pub fn validated(self) -> Result<Self, CrawlError> {
        if self.regions.is_empty() {
            return Err(CrawlError::Configuration(
                "at least one seed region is required".to_string(),
            ));
        }
        if self.ladder.is_empty() {
            return Err(CrawlError::Configuration(
                "resolution ladder must not be empty".to_string(),
            ));
        }
        if self.ladder.iter().any(|step| *step <= 0.0) {
            return Err(CrawlError::Configuration(
                "ladder steps must be positive degrees".to_string(),
            ));
        }
        for pair in self.ladder.windows(2) {
            let (coarse, fine) = (pair[0], pair[1]);
            if fine >= coarse {
                return Err(CrawlError::Configuration(format!(
                    "ladder must be strictly descending, got {coarse} then {fine}"
                )));
            }
            let ratio = coarse / fine;
            if (ratio - ratio.round()).abs() > 1e-6 {
                return Err(CrawlError::Configuration(format!(
                    "ladder step {fine} must divide {coarse} evenly (ratio {ratio})"
                )));
            }
        }
        if self.max_level >= self.ladder.len() {
            return Err(CrawlError::Configuration(format!(
                "max_level {} exceeds the deepest ladder index {}",
                self.max_level,
                self.ladder.len() - 1
            )));
        }
        if self.worker_count == 0 {
            return Err(CrawlError::Configuration(
                "worker_count must be at least 1".to_string(),
            ));
        }
        if self.api.page_size == 0 || self.cap < self.api.page_size {
            return Err(CrawlError::Configuration(format!(
                "cap {} must be at least the page size {}",
                self.cap, self.api.page_size
            )));
        }
        if self.max_radius_km <= 0.0 {
            return Err(CrawlError::Configuration(
                "max_radius_km must be positive".to_string(),
            ));
        }
        if self.checkpoint_every_records == 0 || self.checkpoint_every_cells == 0 {
            return Err(CrawlError::Configuration(
                "checkpoint thresholds must be positive".to_string(),
            ));
        }
        if self.retry.max_attempts == 0 {
            return Err(CrawlError::Configuration(
                "retry max_attempts must be at least 1".to_string(),
            ));
        }
        Ok(self)
    }

    /// Step in degrees for cells at `level`.
    pub fn step_for_level(&self, level: usize) -> f64 {
        self.ladder[level]
    }
}
