//! RocksDB-backed operation logs.
//!
//! Column families:
//! - `records`: one envelope per accepted operation,
//!   keyed `<doc_key:16 bytes><index:8 bytes big-endian>`
//! - `metadata`: per-document [`LogMetadata`], keyed `<doc_key:16 bytes>`
//! - `base`: optional base content envelope, keyed `<doc_key:16 bytes>`
//!
//! `doc_key` is a UUIDv5 of the document name, so every document's records
//! share a fixed 16-byte prefix and sort by index.
//!
//! Each push writes record + metadata in one atomic `WriteBatch`. With
//! `sync_writes` the batch is fsynced before `push` returns.

use rocksdb::{
    BlockBasedOptions, Cache, ColumnFamily, ColumnFamilyDescriptor, DBCompressionType,
    DBWithThreadMode, IteratorMode, Options, SingleThreaded, WriteBatch, WriteOptions,
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::SystemTime;
use uuid::Uuid;

use super::record::StoredRecord;
use super::{LogError, LogProvider, LogRecord, OperationLog, RecordMeta};

const CF_RECORDS: &str = "records";
const CF_METADATA: &str = "metadata";
const CF_BASE: &str = "base";

const COLUMN_FAMILIES: &[&str] = &[CF_RECORDS, CF_METADATA, CF_BASE];

type Db = DBWithThreadMode<SingleThreaded>;

/// RocksDB log store configuration.
#[derive(Debug, Clone)]
pub struct RocksLogConfig {
    /// Database directory path
    pub path: PathBuf,
    /// Block cache size in bytes (default: 64MB)
    pub block_cache_size: usize,
    /// Bloom filter bits per key (default: 10)
    pub bloom_filter_bits: i32,
    /// fsync every push before acknowledging (default: true)
    pub sync_writes: bool,
    /// Max open files for RocksDB (default: 512)
    pub max_open_files: i32,
    /// Write buffer size per column family (default: 32MB)
    pub write_buffer_size: usize,
}

impl Default for RocksLogConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("quire_data"),
            block_cache_size: 64 * 1024 * 1024,
            bloom_filter_bits: 10,
            sync_writes: true,
            max_open_files: 512,
            write_buffer_size: 32 * 1024 * 1024,
        }
    }
}

impl RocksLogConfig {
    /// Small caches, no fsync.
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

/// Per-document bookkeeping stored next to the records.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogMetadata {
    pub name: String,
    /// Number of records (next index)
    pub len: u64,
    /// Creation timestamp (seconds since epoch)
    pub created_at: u64,
    /// Last push timestamp (seconds since epoch)
    pub updated_at: u64,
}

impl LogMetadata {
    fn new(name: &str) -> Self {
        let now = now_secs();
        Self {
            name: name.to_string(),
            len: 0,
            created_at: now,
            updated_at: now,
        }
    }

    fn encode(&self) -> Result<Vec<u8>, LogError> {
        bincode::serde::encode_to_vec(self, bincode::config::standard())
            .map_err(|e| LogError::Encode(e.to_string()))
    }

    fn decode(bytes: &[u8]) -> Result<Self, LogError> {
        let (meta, _) = bincode::serde::decode_from_slice(bytes, bincode::config::standard())
            .map_err(|e| LogError::Decode(e.to_string()))?;
        Ok(meta)
    }
}

/// One RocksDB database holding the logs of many documents.
pub struct RocksLogProvider {
    db: Arc<Db>,
    config: RocksLogConfig,
}

impl RocksLogProvider {
    /// Open the store, creating the database and column families if needed.
    pub fn open(config: RocksLogConfig) -> Result<Self, LogError> {
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

        let db = Db::open_cf_descriptors(&db_opts, &config.path, cf_descriptors)?;
        log::info!("Opened operation log store at {}", config.path.display());

        Ok(Self {
            db: Arc::new(db),
            config,
        })
    }

    fn cf_options(name: &str, config: &RocksLogConfig) -> Options {
        let mut opts = Options::default();

        let mut block_opts = BlockBasedOptions::default();
        let cache = Cache::new_lru_cache(config.block_cache_size);
        block_opts.set_block_cache(&cache);
        block_opts.set_bloom_filter(config.bloom_filter_bits as f64, false);
        block_opts.set_block_size(16 * 1024);
        opts.set_block_based_table_factory(&block_opts);
        opts.set_write_buffer_size(config.write_buffer_size);

        match name {
            CF_RECORDS => {
                // Payloads are LZ4-compressed already.
                opts.set_compression_type(DBCompressionType::None);
                opts.set_max_write_buffer_number(4);
                opts.set_prefix_extractor(rocksdb::SliceTransform::create_fixed_prefix(16));
            }
            CF_METADATA => {
                opts.set_compression_type(DBCompressionType::Lz4);
                opts.set_max_write_buffer_number(2);
                opts.optimize_for_point_lookup(point_lookup_cache_mb(config.block_cache_size));
            }
            CF_BASE => {
                opts.set_compression_type(DBCompressionType::None);
            }
            _ => {}
        }

        opts
    }

    /// Names of every document with a log in this store.
    pub fn list_documents(&self) -> Result<Vec<String>, LogError> {
        let cf = cf(&self.db, CF_METADATA)?;
        let mut names = Vec::new();
        for item in self.db.iterator_cf(cf, IteratorMode::Start) {
            let (_, value) = item?;
            names.push(LogMetadata::decode(&value)?.name);
        }
        Ok(names)
    }

    /// Whether `name` has a log in this store. Never creates one.
    pub fn contains(&self, name: &str) -> Result<bool, LogError> {
        let cf_meta = cf(&self.db, CF_METADATA)?;
        match self.db.get_cf(cf_meta, doc_key(name).as_bytes())? {
            Some(bytes) => Ok(LogMetadata::decode(&bytes)?.name == name),
            None => Ok(false),
        }
    }

    /// Remove a document's records, base content and metadata.
    pub fn delete_document(&self, name: &str) -> Result<u64, LogError> {
        let doc_key = doc_key(name);
        let cf_records = cf(&self.db, CF_RECORDS)?;
        let cf_meta = cf(&self.db, CF_METADATA)?;
        let cf_base = cf(&self.db, CF_BASE)?;

        let len = match self.db.get_cf(cf_meta, doc_key.as_bytes())? {
            Some(bytes) => LogMetadata::decode(&bytes)?.len,
            None => return Ok(0),
        };

        let mut batch = WriteBatch::default();
        batch.delete_range_cf(cf_records, record_key(doc_key, 0), record_key(doc_key, len));
        batch.delete_cf(cf_base, doc_key.as_bytes());
        batch.delete_cf(cf_meta, doc_key.as_bytes());
        self.db.write(batch)?;
        Ok(len)
    }

    pub fn path(&self) -> &Path {
        &self.config.path
    }
}

impl LogProvider for RocksLogProvider {
    type Log = RocksLog;

    fn recover(&self, name: &str) -> Result<RocksLog, LogError> {
        let doc_key = doc_key(name);
        let cf_records = cf(&self.db, CF_RECORDS)?;
        let cf_meta = cf(&self.db, CF_METADATA)?;

        let meta = match self.db.get_cf(cf_meta, doc_key.as_bytes())? {
            Some(bytes) => {
                let meta = LogMetadata::decode(&bytes)?;
                if meta.name != name {
                    return Err(LogError::Corrupt {
                        index: 0,
                        reason: format!("metadata belongs to '{}'", meta.name),
                    });
                }
                meta
            }
            None => {
                let meta = LogMetadata::new(name);
                self.db.put_cf(cf_meta, doc_key.as_bytes(), meta.encode()?)?;
                log::info!("Created operation log for '{name}'");
                meta
            }
        };

        // The last record must exist and nothing may follow it.
        if meta.len > 0 && self.db.get_cf(cf_records, record_key(doc_key, meta.len - 1))?.is_none() {
            return Err(LogError::Corrupt {
                index: meta.len - 1,
                reason: "record missing".into(),
            });
        }
        if self.db.get_cf(cf_records, record_key(doc_key, meta.len))?.is_some() {
            return Err(LogError::Corrupt {
                index: meta.len,
                reason: "record beyond recorded length".into(),
            });
        }

        log::debug!("Recovered operation log for '{name}' with {} records", meta.len);
        Ok(RocksLog {
            db: self.db.clone(),
            doc_key,
            meta,
            sync_writes: self.config.sync_writes,
            open: true,
        })
    }
}

/// Handle to one document's log inside a [`RocksLogProvider`].
pub struct RocksLog {
    db: Arc<Db>,
    doc_key: Uuid,
    meta: LogMetadata,
    sync_writes: bool,
    open: bool,
}

impl RocksLog {
    pub fn metadata(&self) -> &LogMetadata {
        &self.meta
    }
}

impl OperationLog for RocksLog {
    fn push(&mut self, meta: &RecordMeta, payload: &[u8]) -> Result<u64, LogError> {
        if !self.open {
            return Err(LogError::Closed);
        }
        if meta.index != self.meta.len {
            return Err(LogError::Sequence {
                expected: self.meta.len,
                got: meta.index,
            });
        }

        let cf_records = cf(&self.db, CF_RECORDS)?;
        let cf_meta = cf(&self.db, CF_METADATA)?;

        let stored = StoredRecord::seal(*meta, payload)?;
        let mut next_meta = self.meta.clone();
        next_meta.len += 1;
        next_meta.updated_at = now_secs();

        let mut batch = WriteBatch::default();
        batch.put_cf(cf_records, record_key(self.doc_key, meta.index), stored.encode()?);
        batch.put_cf(cf_meta, self.doc_key.as_bytes(), next_meta.encode()?);

        let mut write_opts = WriteOptions::default();
        write_opts.set_sync(self.sync_writes);
        self.db.write_opt(batch, &write_opts)?;

        self.meta = next_meta;
        Ok(meta.index)
    }

    fn len(&self) -> u64 {
        self.meta.len
    }

    fn read(&self, index: u64) -> Result<LogRecord, LogError> {
        if !self.open {
            return Err(LogError::Closed);
        }
        if index >= self.meta.len {
            return Err(LogError::OutOfRange {
                index,
                len: self.meta.len,
            });
        }
        let cf_records = cf(&self.db, CF_RECORDS)?;
        match self.db.get_cf(cf_records, record_key(self.doc_key, index))? {
            Some(bytes) => StoredRecord::decode(index, &bytes)?.open(index),
            None => Err(LogError::Corrupt {
                index,
                reason: "record missing".into(),
            }),
        }
    }

    fn base_content(&self) -> Result<Option<Vec<u8>>, LogError> {
        if !self.open {
            return Err(LogError::Closed);
        }
        let cf_base = cf(&self.db, CF_BASE)?;
        match self.db.get_cf(cf_base, self.doc_key.as_bytes())? {
            // Base envelopes are sealed as index 0.
            Some(bytes) => Ok(Some(StoredRecord::decode(0, &bytes)?.open(0)?.payload)),
            None => Ok(None),
        }
    }

    fn set_base_content(&mut self, content: &[u8]) -> Result<(), LogError> {
        if !self.open {
            return Err(LogError::Closed);
        }
        if self.meta.len > 0 || self.base_content()?.is_some() {
            return Err(LogError::BaseFixed);
        }

        let cf_base = cf(&self.db, CF_BASE)?;
        let cf_meta = cf(&self.db, CF_METADATA)?;

        let stored = StoredRecord::seal(RecordMeta::new(0, Uuid::nil(), None), content)?;
        let mut next_meta = self.meta.clone();
        next_meta.updated_at = now_secs();

        let mut batch = WriteBatch::default();
        batch.put_cf(cf_base, self.doc_key.as_bytes(), stored.encode()?);
        batch.put_cf(cf_meta, self.doc_key.as_bytes(), next_meta.encode()?);

        let mut write_opts = WriteOptions::default();
        write_opts.set_sync(self.sync_writes);
        self.db.write_opt(batch, &write_opts)?;

        self.meta = next_meta;
        Ok(())
    }

    fn close(&mut self) -> Result<(), LogError> {
        if self.open {
            self.open = false;
            for name in [CF_RECORDS, CF_BASE] {
                self.db.flush_cf(cf(&self.db, name)?)?;
            }
        }
        Ok(())
    }

    fn is_open(&self) -> bool {
        self.open
    }
}

fn cf<'a>(db: &'a Db, name: &str) -> Result<&'a ColumnFamily, LogError> {
    db.cf_handle(name)
        .ok_or_else(|| LogError::Storage(format!("Column family '{name}' not found")))
}

/// Fixed 16-byte prefix for a document's keys.
fn doc_key(name: &str) -> Uuid {
    Uuid::new_v5(&Uuid::NAMESPACE_OID, name.as_bytes())
}

/// Record key: doc_key (16 bytes) + index (8 bytes big-endian).
fn record_key(doc_key: Uuid, index: u64) -> Vec<u8> {
    let mut key = Vec::with_capacity(24);
    key.extend_from_slice(doc_key.as_bytes());
    key.extend_from_slice(&index.to_be_bytes());
    key
}

/// `optimize_for_point_lookup` takes its cache size in MB.
fn point_lookup_cache_mb(block_cache_size: usize) -> u64 {
    (block_cache_size / (1024 * 1024)) as u64
}

fn now_secs() -> u64 {
    SystemTime::now()
        .duration_since(SystemTime::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

fn num_cpus() -> i32 {
    std::thread::available_parallelism()
        .map(|n| n.get() as i32)
        .unwrap_or(4)
}
