//! Cold-start loading of a room's snapshot.

use log::{debug, info};

use crate::delta::Delta;
use crate::storage::{load_async, SharedStore, StoreError};

/// What the loader produced for a new room.
#[derive(Debug, Clone, PartialEq)]
pub struct LoadedDocument {
    pub snapshot: Delta,
    /// `lastSaved` of the stored record, if there was one.
    pub last_saved: Option<u64>,
    pub from_store: bool,
}

/// Fetches persisted snapshots, defaulting rooms that were never saved.
#[derive(Clone)]
pub struct DocumentLoader {
    store: SharedStore,
}

impl DocumentLoader {
    pub fn new(store: SharedStore) -> Self {
        Self { store }
    }

    /// Load `room_id`. A missing record yields the default document; a store
    /// failure is an error and never falls back to a fabricated document.
    pub async fn load(&self, room_id: &str) -> Result<LoadedDocument, StoreError> {
        match load_async(&self.store, room_id).await? {
            Some(record) => {
                if !record.data.is_document() {
                    return Err(StoreError::InvalidRecord {
                        id: room_id.to_string(),
                        reason: "stored snapshot contains retain or delete".into(),
                    });
                }
                info!("Loaded room '{room_id}' from store (lastSaved {})", record.last_saved);
                Ok(LoadedDocument {
                    snapshot: record.data,
                    last_saved: Some(record.last_saved),
                    from_store: true,
                })
            }
            None => {
                debug!("No stored document for room '{room_id}', starting empty");
                Ok(LoadedDocument {
                    snapshot: Delta::default_document(),
                    last_saved: None,
                    from_store: false,
                })
            }
        }
    }
}
