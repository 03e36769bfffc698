//! RocksDB-backed persistent document store.
//!
//! Column families:
//! - `documents`: room snapshots (JSON delta, LZ4 compressed), keyed by room id
//! - `metadata`: per-room metadata (JSON: created_at, last_saved, save_count, sizes)
//!
//! Both families are written in one atomic batch per upsert.
//!
//! Reference: Kleppmann, DDIA, Chapter 3 (LSM Trees, SSTables)

use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

use rocksdb::{
    BlockBasedOptions, Cache, ColumnFamilyDescriptor, DBCompressionType, DBWithThreadMode,
    IteratorMode, Options, SingleThreaded, WriteBatch, WriteOptions,
};
use serde::{Deserialize, Serialize};

use super::record::{next_save_time, validate, PersistedDocument};
use super::{DocumentStore, StoreError};
use crate::delta::Delta;

/// Column family names.
const CF_DOCUMENTS: &str = "documents";
const CF_METADATA: &str = "metadata";

const COLUMN_FAMILIES: &[&str] = &[CF_DOCUMENTS, CF_METADATA];

/// Store configuration.
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// Database directory path
    pub path: PathBuf,
    /// Block cache size in bytes (default: 64MB)
    pub block_cache_size: usize,
    /// Bloom filter bits per key (default: 10)
    pub bloom_filter_bits: i32,
    /// Enable fsync on every write (default: false)
    pub sync_writes: bool,
    /// Max open files for RocksDB (default: 512)
    pub max_open_files: i32,
    /// Write buffer size per column family (default: 16MB)
    pub write_buffer_size: usize,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("quire_data"),
            block_cache_size: 64 * 1024 * 1024,
            bloom_filter_bits: 10,
            sync_writes: false,
            max_open_files: 512,
            write_buffer_size: 16 * 1024 * 1024,
        }
    }
}

impl StoreConfig {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            ..Self::default()
        }
    }

    /// Create config for testing (small caches).
    pub fn for_testing(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            block_cache_size: 8 * 1024 * 1024,
            bloom_filter_bits: 10,
            sync_writes: false,
            max_open_files: 64,
            write_buffer_size: 4 * 1024 * 1024,
        }
    }
}

/// Metadata stored alongside each snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentMetadata {
    /// First write, epoch millis
    pub created_at: u64,
    /// Latest write, epoch millis
    pub last_saved: u64,
    /// Number of upserts since creation
    pub save_count: u64,
    /// Uncompressed snapshot size in bytes
    pub snapshot_size: u64,
    /// Compressed snapshot size in bytes
    pub compressed_size: u64,
}

/// RocksDB-backed document store.
pub struct RocksStore {
    db: DBWithThreadMode<SingleThreaded>,
    config: StoreConfig,
    /// Serializes read-modify-write of metadata across upserts.
    write_lock: Mutex<()>,
}

impl RocksStore {
    /// Open the store, creating the database and column families if missing.
    pub fn open(config: StoreConfig) -> Result<Self, StoreError> {
        let mut db_opts = Options::default();
        db_opts.create_if_missing(true);
        db_opts.create_missing_column_families(true);
        db_opts.set_max_open_files(config.max_open_files);
        db_opts.set_keep_log_file_num(5);
        db_opts.increase_parallelism(num_cpus());

        let cf_descriptors: Vec<ColumnFamilyDescriptor> = COLUMN_FAMILIES
            .iter()
            .map(|name| ColumnFamilyDescriptor::new(*name, Self::cf_options(name, &config)))
            .collect();

        let db = DBWithThreadMode::<SingleThreaded>::open_cf_descriptors(
            &db_opts,
            &config.path,
            cf_descriptors,
        )?;

        Ok(Self {
            db,
            config,
            write_lock: Mutex::new(()),
        })
    }

    fn cf_options(name: &str, config: &StoreConfig) -> Options {
        let mut opts = Options::default();

        let mut block_opts = BlockBasedOptions::default();
        let cache = Cache::new_lru_cache(config.block_cache_size);
        block_opts.set_block_cache(&cache);
        block_opts.set_bloom_filter(config.bloom_filter_bits as f64, false);
        block_opts.set_block_size(16 * 1024);
        opts.set_block_based_table_factory(&block_opts);

        opts.set_write_buffer_size(config.write_buffer_size);
        opts.set_max_write_buffer_number(2);

        match name {
            // Values are already LZ4 framed by us
            CF_DOCUMENTS => opts.set_compression_type(DBCompressionType::None),
            _ => opts.set_compression_type(DBCompressionType::Lz4),
        }

        opts
    }

    /// Load a room's metadata, if it has ever been saved.
    pub fn load_metadata(&self, id: &str) -> Result<Option<DocumentMetadata>, StoreError> {
        let cf = self.cf(CF_METADATA)?;
        match self.db.get_cf(cf, id.as_bytes())? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }

    pub fn document_exists(&self, id: &str) -> Result<bool, StoreError> {
        let cf = self.cf(CF_DOCUMENTS)?;
        Ok(self.db.get_cf(cf, id.as_bytes())?.is_some())
    }

    /// All stored room ids, in key order.
    pub fn list_documents(&self) -> Result<Vec<String>, StoreError> {
        let cf = self.cf(CF_METADATA)?;
        let mut ids = Vec::new();
        for item in self.db.iterator_cf(cf, IteratorMode::Start) {
            let (key, _) = item?;
            let id = String::from_utf8(key.to_vec())
                .map_err(|e| StoreError::Serialization(e.to_string()))?;
            ids.push(id);
        }
        Ok(ids)
    }

    pub fn path(&self) -> &Path {
        &self.config.path
    }

    fn cf(&self, name: &str) -> Result<&rocksdb::ColumnFamily, StoreError> {
        self.db
            .cf_handle(name)
            .ok_or_else(|| StoreError::Database(format!("Column family '{name}' not found")))
    }
}

impl DocumentStore for RocksStore {
    fn load(&self, id: &str) -> Result<Option<PersistedDocument>, StoreError> {
        let cf = self.cf(CF_DOCUMENTS)?;
        let Some(compressed) = self.db.get_cf(cf, id.as_bytes())? else {
            return Ok(None);
        };

        let json = lz4_flex::decompress_size_prepended(&compressed)
            .map_err(|e| StoreError::Compression(e.to_string()))?;
        let data: Delta = serde_json::from_slice(&json)?;
        validate(id, &data)?;

        let last_saved = self
            .load_metadata(id)?
            .map(|meta| meta.last_saved)
            .unwrap_or(0);

        Ok(Some(PersistedDocument {
            id: id.to_string(),
            data,
            last_saved,
        }))
    }

    fn upsert(&self, id: &str, data: &Delta) -> Result<PersistedDocument, StoreError> {
        validate(id, data)?;
        let json = serde_json::to_vec(data)?;
        let compressed = lz4_flex::compress_prepend_size(&json);

        let cf_docs = self.cf(CF_DOCUMENTS)?;
        let cf_meta = self.cf(CF_METADATA)?;

        let _guard = self.write_lock.lock().unwrap_or_else(PoisonError::into_inner);
        let previous = self.load_metadata(id)?;
        let last_saved = next_save_time(previous.as_ref().map(|m| m.last_saved));
        let meta = DocumentMetadata {
            created_at: previous.as_ref().map_or(last_saved, |m| m.created_at),
            last_saved,
            save_count: previous.as_ref().map_or(0, |m| m.save_count) + 1,
            snapshot_size: json.len() as u64,
            compressed_size: compressed.len() as u64,
        };

        let mut batch = WriteBatch::default();
        batch.put_cf(cf_docs, id.as_bytes(), &compressed);
        batch.put_cf(cf_meta, id.as_bytes(), serde_json::to_vec(&meta)?);

        let mut write_opts = WriteOptions::default();
        write_opts.set_sync(self.config.sync_writes);
        self.db.write_opt(batch, &write_opts)?;

        Ok(PersistedDocument {
            id: id.to_string(),
            data: data.clone(),
            last_saved,
        })
    }
}

/// Number of CPU cores for RocksDB parallelism.
fn num_cpus() -> i32 {
    std::thread::available_parallelism()
        .map(|n| n.get() as i32)
        .unwrap_or(4)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn open_temp() -> (tempfile::TempDir, RocksStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = RocksStore::open(StoreConfig::for_testing(dir.path())).unwrap();
        (dir, store)
    }

    #[test]
    fn test_store_open() {
        let (dir, store) = open_temp();
        assert_eq!(store.path(), dir.path());
        assert!(store.list_documents().unwrap().is_empty());
    }

    #[test]
    fn test_upsert_and_load() {
        let (_dir, store) = open_temp();
        let data = Delta::new()
            .insert("Hello", serde_json::json!({ "bold": true }).as_object().cloned())
            .insert(" world\n", None);

        let saved = store.upsert("abc123", &data).unwrap();
        let loaded = store.load("abc123").unwrap().unwrap();
        assert_eq!(loaded, saved);
        assert_eq!(loaded.data, data);
        assert!(store.document_exists("abc123").unwrap());
    }

    #[test]
    fn test_missing_document() {
        let (_dir, store) = open_temp();
        assert_eq!(store.load("nope").unwrap(), None);
        assert!(!store.document_exists("nope").unwrap());
        assert_eq!(store.load_metadata("nope").unwrap(), None);
    }

    #[test]
    fn test_metadata_tracks_saves() {
        let (_dir, store) = open_temp();
        let data = Delta::new().insert("hi\n", None);

        let first = store.upsert("abc123", &data).unwrap();
        let second = store.upsert("abc123", &data).unwrap();
        assert!(second.last_saved > first.last_saved);

        let meta = store.load_metadata("abc123").unwrap().unwrap();
        assert_eq!(meta.save_count, 2);
        assert_eq!(meta.created_at, first.last_saved);
        assert_eq!(meta.last_saved, second.last_saved);
        assert_eq!(meta.snapshot_size, serde_json::to_vec(&data).unwrap().len() as u64);
        assert!(meta.compressed_size > 0);
    }

    #[test]
    fn test_empty_document_rejected() {
        let (_dir, store) = open_temp();
        let result = store.upsert("abc123", &Delta::new());
        assert!(matches!(result, Err(StoreError::InvalidRecord { .. })));
        assert!(!store.document_exists("abc123").unwrap());
    }

    #[test]
    fn test_stored_empty_document_rejected_on_load() {
        let (_dir, store) = open_temp();
        let cf = store.cf(CF_DOCUMENTS).unwrap();
        let raw = lz4_flex::compress_prepend_size(br#"{"ops":[]}"#);
        store.db.put_cf(cf, b"broken", raw).unwrap();

        assert!(matches!(
            store.load("broken"),
            Err(StoreError::InvalidRecord { .. })
        ));
    }

    #[test]
    fn test_corrupt_value_is_an_error() {
        let (_dir, store) = open_temp();
        let cf = store.cf(CF_DOCUMENTS).unwrap();
        store.db.put_cf(cf, b"garbage", b"\xff\xff").unwrap();
        assert!(store.load("garbage").is_err());
    }

    #[test]
    fn test_list_documents() {
        let (_dir, store) = open_temp();
        let data = Delta::default_document();
        store.upsert("b", &data).unwrap();
        store.upsert("a", &data).unwrap();
        assert_eq!(store.list_documents().unwrap(), vec!["a".to_string(), "b".to_string()]);
    }

    #[test]
    fn test_persists_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let data = Delta::new().insert("durable\n", None);
        let saved = {
            let store = RocksStore::open(StoreConfig::for_testing(dir.path())).unwrap();
            store.upsert("abc123", &data).unwrap()
        };

        let store = RocksStore::open(StoreConfig::for_testing(dir.path())).unwrap();
        assert_eq!(store.load("abc123").unwrap(), Some(saved));
    }
}
