//! Search service client: probes, page fetches, and error classification.
//!
//! The crawler core only sees the [`SearchApi`] trait; [`HttpSearchClient`]
//! is the production implementation speaking the service's POST envelope.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use serde_json::Value;
use tracing::debug;
use ureq::Agent;

use crate::config::ApiConfig;
use crate::constants::api;
use crate::errors::CrawlError;
use crate::record::StoreRecord;
use crate::retry::RetryPolicy;

/// One page of search results plus the service-reported total.
#[derive(Clone, Debug, Default)]
pub struct SearchPage {
    /// Matching-record count reported by the service. Trustworthy even
    /// when it exceeds the pagination cap.
    pub total: usize,
    /// Records on this page, rows without an identifier dropped.
    pub records: Vec<StoreRecord>,
}

/// Process-wide search request counter. Observability only.
#[derive(Clone, Debug, Default)]
pub struct ApiCallCounter(Arc<AtomicU64>);

impl ApiCallCounter {
    /// Count one issued request.
    pub fn increment(&self) {
        self.0.fetch_add(1, Ordering::Relaxed);
    }

    /// Current cumulative count.
    pub fn get(&self) -> u64 {
        self.0.load(Ordering::Relaxed)
    }

    /// Restore the counter from a prior run's checkpoint.
    pub fn set(&self, value: u64) {
        self.0.store(value, Ordering::Relaxed);
    }
}

/// Search backend seam between the crawler core and the wire.
///
/// Both calls either return a page (possibly empty) or fail with a
/// transient or structured error; retry handling lives behind the
/// implementation.
pub trait SearchApi: Send + Sync {
    /// Fetch page 1 for `center` + `radius_km`, returning the reported
    /// total alongside the first page of records.
    fn probe(&self, lat: f64, lng: f64, radius_km: f64) -> Result<SearchPage, CrawlError>;

    /// Fetch a single page (1-based `page_no`).
    fn fetch_page(
        &self,
        lat: f64,
        lng: f64,
        radius_km: f64,
        page_no: usize,
    ) -> Result<Vec<StoreRecord>, CrawlError>;
}

/// HTTP client for the search service.
///
/// One instance is shared by all workers; the agent's connection pool is
/// sized to the worker count so concurrent cells do not contend for
/// connections.
pub struct HttpSearchClient {
    agent: Agent,
    search_url: String,
    config: ApiConfig,
    retry: RetryPolicy,
    calls: ApiCallCounter,
}

impl HttpSearchClient {
    /// Build a client for `config`, with the connection pool sized for
    /// `pool_size` concurrent workers.
    pub fn new(
        config: ApiConfig,
        retry: RetryPolicy,
        pool_size: usize,
        calls: ApiCallCounter,
    ) -> Self {
        let agent: Agent = Agent::config_builder()
            .timeout_global(Some(config.timeout))
            .user_agent(config.user_agent.as_str())
            .max_idle_connections_per_host(pool_size.max(1))
            .build()
            .into();
        let search_url = format!("{}{}", config.base_url, config.search_path);
        Self {
            agent,
            search_url,
            config,
            retry,
            calls,
        }
    }

    /// Issue one search request under the retry policy.
    fn search(
        &self,
        lat: f64,
        lng: f64,
        radius_km: f64,
        page_no: usize,
    ) -> Result<SearchPage, CrawlError> {
        self.retry
            .run("searchStore", || self.attempt(lat, lng, radius_km, page_no))
    }

    /// A single request attempt with no retry handling.
    fn attempt(
        &self,
        lat: f64,
        lng: f64,
        radius_km: f64,
        page_no: usize,
    ) -> Result<SearchPage, CrawlError> {
        let payload = serde_json::json!({
            "page": { "pageNo": page_no, "pageSize": self.config.page_size },
            "categoryId": "",
            "keyword": "",
            // Integral kilometres; ceil so the query never under-covers.
            "distance": radius_km.ceil() as u64,
            "longitude": lng,
            "latitude": lat,
        });

        self.calls.increment();
        debug!(
            "[geosweep:client] searchStore page={page_no} center=({lat:.4},{lng:.4}) radius={radius_km:.1}km"
        );
        let response = self
            .agent
            .post(&self.search_url)
            .header("Origin", self.config.origin.as_str())
            .header("Referer", self.config.referer.as_str())
            .send_json(&payload)
            .map_err(classify_transport)?;

        let body = response
            .into_body()
            .read_to_string()
            .map_err(|err| CrawlError::Transient {
                reason: format!("failed reading search response body: {err}"),
            })?;

        parse_envelope(&body, &self.config.id_field)
    }
}

impl SearchApi for HttpSearchClient {
    fn probe(&self, lat: f64, lng: f64, radius_km: f64) -> Result<SearchPage, CrawlError> {
        self.search(lat, lng, radius_km, 1)
    }

    fn fetch_page(
        &self,
        lat: f64,
        lng: f64,
        radius_km: f64,
        page_no: usize,
    ) -> Result<Vec<StoreRecord>, CrawlError> {
        Ok(self.search(lat, lng, radius_km, page_no)?.records)
    }
}

/// Map a wire-level failure onto the crawl error taxonomy: 429 and 5xx
/// are transient, other HTTP rejections are structured API errors, and
/// anything below HTTP (connect, TLS, timeout) is transient.
fn classify_transport(err: ureq::Error) -> CrawlError {
    match err {
        ureq::Error::StatusCode(code) if code == 429 || (500..=599).contains(&code) => {
            CrawlError::Transient {
                reason: format!("http status {code}"),
            }
        }
        ureq::Error::StatusCode(code) => CrawlError::Api {
            code: code.to_string(),
            message: "search request rejected".to_string(),
        },
        other => CrawlError::Transient {
            reason: other.to_string(),
        },
    }
}

/// Parse the service's response envelope `{code, message, data:{total, list}}`.
fn parse_envelope(body: &str, id_field: &str) -> Result<SearchPage, CrawlError> {
    let json: Value = serde_json::from_str(body).map_err(|err| CrawlError::Transient {
        reason: format!("malformed search response: {err}"),
    })?;

    let code = json.get("code").and_then(Value::as_str).unwrap_or_default();
    if code != api::SUCCESS_CODE {
        let message = json
            .get("message")
            .and_then(Value::as_str)
            .unwrap_or("unknown rejection")
            .to_string();
        return Err(CrawlError::Api {
            code: code.to_string(),
            message,
        });
    }

    let data = json.get("data").cloned().unwrap_or(Value::Null);
    let total = data.get("total").and_then(Value::as_u64).unwrap_or(0) as usize;
    let records = match data.get("list") {
        Some(Value::Array(rows)) => rows
            .iter()
            .filter_map(|row| StoreRecord::from_payload(row.clone(), id_field))
            .collect(),
        _ => Vec::new(),
    };
    Ok(SearchPage { total, records })
}
