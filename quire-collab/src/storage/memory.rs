//! In-memory document store, used when no data directory is configured.

use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};

use super::record::{next_save_time, validate, PersistedDocument};
use super::{DocumentStore, StoreError};
use crate::delta::Delta;

#[derive(Debug, Default)]
pub struct MemoryStore {
    documents: Mutex<HashMap<String, PersistedDocument>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.documents
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl DocumentStore for MemoryStore {
    fn load(&self, id: &str) -> Result<Option<PersistedDocument>, StoreError> {
        let documents = self.documents.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(documents.get(id).cloned())
    }

    fn upsert(&self, id: &str, data: &Delta) -> Result<PersistedDocument, StoreError> {
        validate(id, data)?;
        let mut documents = self.documents.lock().unwrap_or_else(PoisonError::into_inner);
        let previous = documents.get(id).map(|doc| doc.last_saved);
        let record = PersistedDocument {
            id: id.to_string(),
            data: data.clone(),
            last_saved: next_save_time(previous),
        };
        documents.insert(id.to_string(), record.clone());
        Ok(record)
    }
}
