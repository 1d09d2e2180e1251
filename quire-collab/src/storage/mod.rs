//! Durability log for accepted operations.
//!
//! Architecture:
//! ```text
//! ┌──────────────┐  push(meta, payload)   ┌─────────────────────┐
//! │ DocumentActor│ ─────────────────────► │ OperationLog        │
//! │ (one writer) │                        │  index 0, 1, 2, ... │
//! └──────┬───────┘  LogCursor::goto(i)    └─────────┬───────────┘
//!        │ ◄──────────────────────────────────────┘
//!        │        random access for rebasing
//!        ▼
//!   LogProvider::recover(name): opens or creates one log per document
//! ```
//!
//! A log may also carry base content: the state that record 0 applies to.
//! It is not an indexed entry; it can only be set while the log is empty.
//!
//! Backends:
//! - [`MemoryLogProvider`]: process-local, survives actor restarts
//! - [`RocksLogProvider`]: RocksDB, LZ4-compressed and checksummed records
//!
//! A push is durable when it returns; the actor never acknowledges an
//! operation before that.

pub mod memory;
pub mod record;
pub mod rocks;

use serde::{Deserialize, Serialize};
use std::time::SystemTime;
use thiserror::Error;
use uuid::Uuid;

pub use memory::{MemoryLog, MemoryLogProvider};
pub use record::{decode_record, encode_record};
pub use rocks::{LogMetadata, RocksLog, RocksLogConfig, RocksLogProvider};

/// Metadata pushed alongside every serialized operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordMeta {
    /// Position in the document history.
    pub index: u64,
    /// Actor that submitted the operation.
    pub author: Uuid,
    /// Last index the author had observed (`None` = initial state).
    pub base: Option<u64>,
    /// Seconds since epoch at acceptance.
    pub timestamp: u64,
}

impl RecordMeta {
    pub fn new(index: u64, author: Uuid, base: Option<u64>) -> Self {
        let timestamp = SystemTime::now()
            .duration_since(SystemTime::UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs();
        Self {
            index,
            author,
            base,
            timestamp,
        }
    }
}

/// One persisted record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogRecord {
    pub meta: RecordMeta,
    pub payload: Vec<u8>,
}

/// Log errors.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LogError {
    #[error("Log is closed")]
    Closed,
    #[error("Record {index} out of range (log holds {len})")]
    OutOfRange { index: u64, len: u64 },
    #[error("Out-of-order push: expected index {expected}, got {got}")]
    Sequence { expected: u64, got: u64 },
    #[error("Corrupt record {index}: {reason}")]
    Corrupt { index: u64, reason: String },
    #[error("Decode error: {0}")]
    Decode(String),
    #[error("Encode error: {0}")]
    Encode(String),
    #[error("Storage error: {0}")]
    Storage(String),
    #[error("Base content can only be set once, before the first record")]
    BaseFixed,
}

impl From<rocksdb::Error> for LogError {
    fn from(e: rocksdb::Error) -> Self {
        LogError::Storage(e.to_string())
    }
}

/// Append-only, index-addressed store of one document's operations.
pub trait OperationLog: Send + 'static {
    /// Append a record. `meta.index` must equal `len()`. Durable on return.
    fn push(&mut self, meta: &RecordMeta, payload: &[u8]) -> Result<u64, LogError>;

    /// Number of records (the next index to be assigned).
    fn len(&self) -> u64;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Random access by index.
    fn read(&self, index: u64) -> Result<LogRecord, LogError>;

    /// Content the first record applies to, if any was set.
    fn base_content(&self) -> Result<Option<Vec<u8>>, LogError>;

    /// Set the base content. Fails with [`LogError::BaseFixed`] once a base
    /// exists or a record has been pushed. Durable on return.
    fn set_base_content(&mut self, content: &[u8]) -> Result<(), LogError>;

    /// Release resources. Every later call fails with [`LogError::Closed`].
    fn close(&mut self) -> Result<(), LogError>;

    fn is_open(&self) -> bool;
}

/// Opens the log of a named document, creating it if absent.
pub trait LogProvider: Send + Sync + 'static {
    type Log: OperationLog;

    /// Open and validate the log for `name`.
    fn recover(&self, name: &str) -> Result<Self::Log, LogError>;
}

/// Forward cursor over a log with random repositioning.
pub struct LogCursor<'a, L: OperationLog + ?Sized> {
    log: &'a L,
    position: u64,
    current: Option<LogRecord>,
}

impl<'a, L: OperationLog + ?Sized> LogCursor<'a, L> {
    /// Cursor positioned at the first record.
    pub fn new(log: &'a L) -> Self {
        Self {
            log,
            position: 0,
            current: None,
        }
    }

    pub fn has_next(&self) -> bool {
        self.position < self.log.len()
    }

    /// Read the record at the cursor and step past it.
    pub fn next(&mut self) -> Result<Option<RecordMeta>, LogError> {
        if !self.has_next() {
            self.current = None;
            return Ok(None);
        }
        let record = self.log.read(self.position)?;
        let meta = record.meta;
        self.current = Some(record);
        self.position += 1;
        Ok(Some(meta))
    }

    /// Payload of the record last returned by [`next`](Self::next).
    pub fn payload(&self) -> Option<&[u8]> {
        self.current.as_ref().map(|record| record.payload.as_slice())
    }

    /// Reposition so the next read returns record `index`.
    pub fn goto(&mut self, index: u64) -> Result<(), LogError> {
        let len = self.log.len();
        if index > len {
            return Err(LogError::OutOfRange { index, len });
        }
        self.position = index;
        self.current = None;
        Ok(())
    }

    pub fn position(&self) -> u64 {
        self.position
    }
}
