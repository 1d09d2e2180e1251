//! # Quire Collaborative Document Engine
//!
//! Accepts concurrent edits to shared plain-text documents, rebases them
//! against the accepted history with operational transformation, and logs
//! them durably before acknowledging.
//!
//! ## Architecture
//!
//! ```text
//! Session layer ──open()──► DocumentRegistry ──► DocumentHandle
//!                                              │
//!             apply(op, author, base) ─────────┘
//!                         │
//!                         ▼
//!             DocumentActor (one per document, own thread)
//!               ├── History::rebase  (quire-ot transform)
//!               ├── Operation::apply
//!               └── History::append ──► OperationLog (memory / RocksDB)
//! ```
//!
//! The actor returns the rebased operation and its index; fanning it out to
//! other sessions is the caller's job.

pub mod config;
pub mod document;
pub mod history;
pub mod registry;
pub mod storage;

pub use config::DocumentConfig;
pub use document::{Accepted, DocumentError, DocumentHandle, DocumentState, DocumentStats, Snapshot};
pub use history::{History, HistoryEntry, HistoryError};
pub use registry::DocumentRegistry;
pub use storage::{
    LogCursor, LogError, LogProvider, LogRecord, MemoryLogProvider, OperationLog, RecordMeta,
    RocksLogConfig, RocksLogProvider,
};

pub use quire_ot::{Operation, OtError, Run};
