//! Durable rolling snapshots of the record store.
//!
//! Three artifacts land in the output directory and are replaced as a
//! unit on every save:
//!
//! - `records.json` — array of raw record payloads, the resume source
//! - `records.csv` — fixed column projection of common fields
//! - `progress_meta.json` — `{saved_at, record_count, api_calls}`
//!
//! Each file is written to a temporary sibling and renamed into place, so
//! a reader never observes a partially written snapshot.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{info, warn};

use crate::client::ApiCallCounter;
use crate::constants::checkpoint;
use crate::errors::CrawlError;
use crate::record::StoreRecord;
use crate::store::RecordStore;

/// Metadata envelope persisted alongside the record artifacts.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CheckpointMeta {
    /// When the snapshot was written.
    pub saved_at: DateTime<Utc>,
    /// Distinct records in the snapshot.
    pub record_count: usize,
    /// Cumulative search requests issued, across resumed runs.
    pub api_calls: u64,
}

/// Which event caused a [`Checkpointer::maybe_save`] invocation.
#[derive(Clone, Copy, Debug)]
pub enum SaveTrigger {
    /// A work item finished processing.
    CellComplete,
    /// A batch of records was ingested.
    RecordsIngested,
}

/// Writes and restores the rolling snapshot.
///
/// Save bookkeeping sits behind one mutex so concurrent workers serialize
/// through `maybe_save`; the actual write happens inside the lock, which
/// keeps snapshots strictly ordered.
pub struct Checkpointer {
    output_dir: PathBuf,
    every_records: usize,
    every_cells: usize,
    state: Mutex<SaveState>,
}

#[derive(Default)]
struct SaveState {
    records_at_last_save: usize,
    cells_since_save: usize,
}

impl Checkpointer {
    /// Create a checkpointer writing into `output_dir`, saving whenever
    /// `every_records` new records or `every_cells` completed cells
    /// accumulate, whichever happens first.
    pub fn new(output_dir: impl Into<PathBuf>, every_records: usize, every_cells: usize) -> Self {
        Self {
            output_dir: output_dir.into(),
            every_records,
            every_cells,
            state: Mutex::new(SaveState::default()),
        }
    }

    /// Path of the records JSON artifact.
    pub fn records_path(&self) -> PathBuf {
        self.output_dir.join(checkpoint::RECORDS_FILENAME)
    }

    /// Path of the tabular CSV artifact.
    pub fn table_path(&self) -> PathBuf {
        self.output_dir.join(checkpoint::TABLE_FILENAME)
    }

    /// Path of the metadata envelope.
    pub fn meta_path(&self) -> PathBuf {
        self.output_dir.join(checkpoint::META_FILENAME)
    }

    /// Seed `store` from the previous snapshot, restoring the cumulative
    /// request counter. Returns how many records were loaded.
    ///
    /// A missing snapshot starts empty silently; a corrupt one starts
    /// empty with a warning. Never fatal.
    pub fn load(&self, store: &RecordStore, calls: &ApiCallCounter, id_field: &str) -> usize {
        match self.try_load(id_field) {
            Ok(None) => 0,
            Ok(Some((records, meta))) => {
                let loaded = store.ingest(records);
                if let Some(meta) = meta {
                    calls.set(meta.api_calls);
                }
                let mut state = self.state.lock().expect("checkpoint state poisoned");
                state.records_at_last_save = store.len();
                info!(
                    "[geosweep:checkpoint] resumed {loaded} records from {}",
                    self.records_path().display()
                );
                loaded
            }
            Err(err) => {
                warn!("[geosweep:checkpoint] discarding prior checkpoint: {err}");
                0
            }
        }
    }

    fn try_load(
        &self,
        id_field: &str,
    ) -> Result<Option<(Vec<StoreRecord>, Option<CheckpointMeta>)>, CrawlError> {
        let records_path = self.records_path();
        if !records_path.exists() {
            return Ok(None);
        }
        let body = fs::read_to_string(&records_path)?;
        let rows: Vec<Value> =
            serde_json::from_str(&body).map_err(|err| CrawlError::CorruptCheckpoint {
                reason: format!("{}: {err}", records_path.display()),
            })?;
        let records = rows
            .into_iter()
            .filter_map(|row| StoreRecord::from_payload(row, id_field))
            .collect();

        // A broken meta file only loses the request counter, not records.
        let meta = fs::read_to_string(self.meta_path())
            .ok()
            .and_then(|body| serde_json::from_str(&body).ok());
        Ok(Some((records, meta)))
    }

    /// Note trigger progress and write a snapshot when a threshold hits.
    /// Returns whether a snapshot was written.
    pub fn maybe_save(
        &self,
        trigger: SaveTrigger,
        store: &RecordStore,
        calls: &ApiCallCounter,
    ) -> Result<bool, CrawlError> {
        let mut state = self.state.lock().expect("checkpoint state poisoned");
        if let SaveTrigger::CellComplete = trigger {
            state.cells_since_save += 1;
        }
        let new_records = store.len().saturating_sub(state.records_at_last_save);
        let due = new_records >= self.every_records || state.cells_since_save >= self.every_cells;
        if !due {
            return Ok(false);
        }
        self.write_snapshot(store, calls, &mut state)?;
        Ok(true)
    }

    /// Unconditional snapshot write; used for the shutdown flush.
    pub fn save(&self, store: &RecordStore, calls: &ApiCallCounter) -> Result<(), CrawlError> {
        let mut state = self.state.lock().expect("checkpoint state poisoned");
        self.write_snapshot(store, calls, &mut state)
    }

    fn write_snapshot(
        &self,
        store: &RecordStore,
        calls: &ApiCallCounter,
        state: &mut SaveState,
    ) -> Result<(), CrawlError> {
        let records = store.snapshot();
        fs::create_dir_all(&self.output_dir)?;

        let payloads: Vec<&Value> = records.iter().map(|record| &record.payload).collect();
        let records_body =
            serde_json::to_string_pretty(&payloads).map_err(io::Error::other)?;
        write_atomic(&self.records_path(), &records_body)?;
        write_atomic(&self.table_path(), &csv_table(&records))?;

        let meta = CheckpointMeta {
            saved_at: Utc::now(),
            record_count: records.len(),
            api_calls: calls.get(),
        };
        let meta_body = serde_json::to_string_pretty(&meta).map_err(io::Error::other)?;
        write_atomic(&self.meta_path(), &meta_body)?;

        state.records_at_last_save = records.len();
        state.cells_since_save = 0;
        info!(
            "[geosweep:checkpoint] saved {} records ({} api calls)",
            meta.record_count, meta.api_calls
        );
        Ok(())
    }
}

/// Write `contents` to a same-directory temporary file, then rename over
/// `path`. The rename stays on one filesystem, so readers see either the
/// old snapshot or the new one, never a prefix.
fn write_atomic(path: &Path, contents: &str) -> io::Result<()> {
    let tmp = path.with_extension(checkpoint::TMP_EXTENSION);
    fs::write(&tmp, contents)?;
    fs::rename(&tmp, path)
}

/// Render the fixed column projection with minimal RFC 4180 quoting.
fn csv_table(records: &[StoreRecord]) -> String {
    let mut out = String::new();
    out.push_str(&checkpoint::TABLE_COLUMNS.join(","));
    out.push('\n');
    for record in records {
        let mut first = true;
        for column in checkpoint::TABLE_COLUMNS {
            if !first {
                out.push(',');
            }
            first = false;
            out.push_str(&csv_field(&record.field_as_text(column)));
        }
        out.push('\n');
    }
    out
}

fn csv_field(value: &str) -> String {
    if value.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record(id: &str, name: &str) -> StoreRecord {
        StoreRecord::from_payload(json!({"sellerId": id, "storeName": name}), "sellerId").unwrap()
    }

    #[test]
    fn csv_table_projects_fixed_columns() {
        let table = csv_table(&[record("s1", "Plain Shop")]);
        let mut lines = table.lines();
        assert_eq!(lines.next().unwrap(), checkpoint::TABLE_COLUMNS.join(","));
        let row = lines.next().unwrap();
        assert!(row.starts_with("s1,Plain Shop,"));
        assert_eq!(row.matches(',').count(), checkpoint::TABLE_COLUMNS.len() - 1);
    }

    #[test]
    fn csv_field_quotes_separators_and_quotes() {
        assert_eq!(csv_field("plain"), "plain");
        assert_eq!(csv_field("a,b"), "\"a,b\"");
        assert_eq!(csv_field("say \"hi\""), "\"say \"\"hi\"\"\"");
        assert_eq!(csv_field("line\nbreak"), "\"line\nbreak\"");
    }
}
