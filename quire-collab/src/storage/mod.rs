//! Durable document storage.
//!
//! Architecture:
//! ```text
//! ┌──────────────┐   load (cold start)   ┌────────────────────┐
//! │ RoomRegistry │ ────────────────────► │ dyn DocumentStore  │
//! │ Checkpointer │ ────────────────────► │  ├─ RocksStore     │
//! └──────────────┘   upsert (checkpoint) │  └─ MemoryStore    │
//!                                        └────────────────────┘
//! ```
//!
//! Store calls are synchronous; async callers go through [`load_async`] and
//! [`upsert_async`], which run them on the blocking thread pool so a slow
//! disk never stalls the runtime.

pub mod memory;
pub mod record;
pub mod rocks;

use std::sync::Arc;

pub use memory::MemoryStore;
pub use record::{now_millis, PersistedDocument};
pub use rocks::{DocumentMetadata, RocksStore, StoreConfig};

use crate::delta::Delta;

/// Create-or-replace storage of room snapshots, keyed by room id.
pub trait DocumentStore: Send + Sync + 'static {
    /// Fetch a room's record; `Ok(None)` when none exists.
    fn load(&self, id: &str) -> Result<Option<PersistedDocument>, StoreError>;

    /// Write `data` as the room's snapshot, stamping a new `lastSaved`.
    fn upsert(&self, id: &str, data: &Delta) -> Result<PersistedDocument, StoreError>;
}

/// Store handle shared by the registry, checkpointer and HTTP layer.
pub type SharedStore = Arc<dyn DocumentStore>;

pub async fn load_async(
    store: &SharedStore,
    id: &str,
) -> Result<Option<PersistedDocument>, StoreError> {
    let store = Arc::clone(store);
    let id = id.to_string();
    tokio::task::spawn_blocking(move || store.load(&id))
        .await
        .map_err(|e| StoreError::Unavailable(e.to_string()))?
}

pub async fn upsert_async(
    store: &SharedStore,
    id: &str,
    data: Delta,
) -> Result<PersistedDocument, StoreError> {
    let store = Arc::clone(store);
    let id = id.to_string();
    tokio::task::spawn_blocking(move || store.upsert(&id, &data))
        .await
        .map_err(|e| StoreError::Unavailable(e.to_string()))?
}

/// Storage errors.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    /// RocksDB internal error
    #[error("Database error: {0}")]
    Database(String),
    /// Record violates the non-empty document invariant
    #[error("Invalid record '{id}': {reason}")]
    InvalidRecord { id: String, reason: String },
    #[error("Serialization error: {0}")]
    Serialization(String),
    #[error("Compression error: {0}")]
    Compression(String),
    /// Store could not be reached at all
    #[error("Storage unavailable: {0}")]
    Unavailable(String),
}

impl From<rocksdb::Error> for StoreError {
    fn from(e: rocksdb::Error) -> Self {
        StoreError::Database(e.to_string())
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(e: serde_json::Error) -> Self {
        StoreError::Serialization(e.to_string())
    }
}
