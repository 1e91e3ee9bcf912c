use serde_json::Value;

use crate::types::RecordId;

/// Opaque record returned by the search service.
///
/// Only the identifier field is ever interpreted; the rest of the payload
/// is carried through to the durable artifacts untouched and never
/// mutated after ingestion.
#[derive(Clone, Debug, PartialEq)]
pub struct StoreRecord {
    /// Stable unique identifier assigned by the service.
    pub id: RecordId,
    /// Raw payload exactly as returned by the service.
    pub payload: Value,
}

impl StoreRecord {
    /// Build a record from a raw payload by extracting `id_field`.
    ///
    /// Returns `None` when the field is missing, empty, or not a scalar;
    /// such rows are dropped, matching the service's occasional blank
    /// entries.
    pub fn from_payload(payload: Value, id_field: &str) -> Option<Self> {
        let id = match payload.get(id_field)? {
            Value::String(text) if !text.is_empty() => text.clone(),
            Value::Number(number) => number.to_string(),
            _ => return None,
        };
        Some(Self { id, payload })
    }

    /// String projection of a payload field for the tabular export.
    /// Missing and null fields become the empty string; nested values are
    /// compact JSON.
    pub fn field_as_text(&self, key: &str) -> String {
        match self.payload.get(key) {
            None | Some(Value::Null) => String::new(),
            Some(Value::String(text)) => text.clone(),
            Some(other) => other.to_string(),
        }
    }
}
