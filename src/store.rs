//! Thread-safe deduplicating record store shared by all workers.

use std::sync::{Arc, RwLock};

use indexmap::IndexMap;
use indexmap::map::Entry;

use crate::record::StoreRecord;
use crate::types::RecordId;

/// Clone-able handle to the shared id → record map.
///
/// The map only ever grows within a run. First writer wins: a later
/// duplicate for the same identifier is discarded, never merged, so which
/// concurrent ingester lands first is semantically irrelevant (both carry
/// an equivalent record from the same service).
#[derive(Clone, Default)]
pub struct RecordStore {
    inner: Arc<RwLock<IndexMap<RecordId, StoreRecord>>>,
}

impl RecordStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert every record whose id is unseen; returns how many were new.
    pub fn ingest(&self, records: Vec<StoreRecord>) -> usize {
        if records.is_empty() {
            return 0;
        }
        let mut inner = self.inner.write().expect("record store poisoned");
        let mut new = 0;
        for record in records {
            if let Entry::Vacant(slot) = inner.entry(record.id.clone()) {
                slot.insert(record);
                new += 1;
            }
        }
        new
    }

    /// Number of distinct records ingested so far.
    pub fn len(&self) -> usize {
        self.inner.read().expect("record store poisoned").len()
    }

    /// Returns `true` when no record has been ingested yet.
    pub fn is_empty(&self) -> bool {
        self.inner.read().expect("record store poisoned").is_empty()
    }

    /// Point-in-time copy of all records, in first-seen order.
    pub fn snapshot(&self) -> Vec<StoreRecord> {
        self.inner
            .read()
            .expect("record store poisoned")
            .values()
            .cloned()
            .collect()
    }
}
