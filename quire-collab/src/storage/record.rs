//! The persisted document record.

use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

use super::StoreError;
use crate::delta::Delta;

/// One room's durable snapshot.
///
/// `data` always holds at least one operation; an empty sequence is rejected
/// at the storage boundary in both directions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PersistedDocument {
    /// Room id, primary key.
    pub id: String,
    pub data: Delta,
    /// Milliseconds since the epoch of the latest write.
    pub last_saved: u64,
}

impl PersistedDocument {
    pub fn new(id: impl Into<String>, data: Delta, last_saved: u64) -> Result<Self, StoreError> {
        let record = Self {
            id: id.into(),
            data,
            last_saved,
        };
        record.validate()?;
        Ok(record)
    }

    pub fn validate(&self) -> Result<(), StoreError> {
        validate(&self.id, &self.data)
    }
}

/// Check an id/data pair before it is written or after it is read.
pub(crate) fn validate(id: &str, data: &Delta) -> Result<(), StoreError> {
    if id.trim().is_empty() {
        return Err(StoreError::InvalidRecord {
            id: id.to_string(),
            reason: "empty document id".into(),
        });
    }
    if data.ops.is_empty() {
        return Err(StoreError::InvalidRecord {
            id: id.to_string(),
            reason: "document has no operations".into(),
        });
    }
    Ok(())
}

/// Current wall-clock time in epoch milliseconds.
pub fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

/// Timestamp for a new write: wall clock, but never at or before the previous
/// write so `lastSaved` strictly increases per document.
pub(crate) fn next_save_time(previous: Option<u64>) -> u64 {
    let now = now_millis();
    match previous {
        Some(prev) if prev >= now => prev + 1,
        _ => now,
    }
}
