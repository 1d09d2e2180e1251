//! In-process log backend.
//!
//! Records live in the provider, not in the log handle, so a document can be
//! closed and recovered again within one process. Used by tests and by
//! servers that do not need restart durability.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use super::{LogError, LogProvider, LogRecord, OperationLog, RecordMeta};

/// Everything stored for one document.
#[derive(Default)]
struct Stored {
    base: Option<Vec<u8>>,
    records: Vec<LogRecord>,
}

type Records = Arc<Mutex<Stored>>;

/// Unlimited push budget.
const UNLIMITED: u64 = u64::MAX;

/// Shared registry of in-memory logs, keyed by document name.
#[derive(Clone)]
pub struct MemoryLogProvider {
    logs: Arc<Mutex<HashMap<String, Records>>>,
    /// Remaining successful pushes across all logs (fault injection).
    push_budget: Arc<AtomicU64>,
}

impl Default for MemoryLogProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryLogProvider {
    pub fn new() -> Self {
        Self {
            logs: Arc::new(Mutex::new(HashMap::new())),
            push_budget: Arc::new(AtomicU64::new(UNLIMITED)),
        }
    }

    /// Let `n` more pushes succeed, then fail every push with a storage error.
    pub fn fail_pushes_after(&self, n: u64) {
        self.push_budget.store(n, Ordering::SeqCst);
    }

    /// Number of records stored for `name`.
    pub fn record_count(&self, name: &str) -> usize {
        self.records(name)
            .ok()
            .and_then(|records| records.lock().ok().map(|s| s.records.len()))
            .unwrap_or(0)
    }

    /// Replace the payload of a stored record (simulates on-disk corruption).
    pub fn overwrite_payload(&self, name: &str, index: u64, payload: Vec<u8>) -> Result<(), LogError> {
        let records = self.records(name)?;
        let mut stored = records.lock().map_err(poisoned)?;
        let len = stored.records.len() as u64;
        let record = stored
            .records
            .get_mut(index as usize)
            .ok_or(LogError::OutOfRange { index, len })?;
        record.payload = payload;
        Ok(())
    }

    fn records(&self, name: &str) -> Result<Records, LogError> {
        let mut logs = self.logs.lock().map_err(poisoned)?;
        Ok(logs.entry(name.to_string()).or_default().clone())
    }
}

impl LogProvider for MemoryLogProvider {
    type Log = MemoryLog;

    fn recover(&self, name: &str) -> Result<MemoryLog, LogError> {
        let records = self.records(name)?;
        {
            let stored = records.lock().map_err(poisoned)?;
            for (i, record) in stored.records.iter().enumerate() {
                if record.meta.index != i as u64 {
                    return Err(LogError::Corrupt {
                        index: i as u64,
                        reason: format!("record carries index {}", record.meta.index),
                    });
                }
            }
        }
        Ok(MemoryLog {
            records,
            push_budget: self.push_budget.clone(),
            open: true,
        })
    }
}

/// Handle to one in-memory log.
pub struct MemoryLog {
    records: Records,
    push_budget: Arc<AtomicU64>,
    open: bool,
}

impl MemoryLog {
    fn take_budget(&self) -> bool {
        self.push_budget
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |left| match left {
                UNLIMITED => Some(UNLIMITED),
                0 => None,
                n => Some(n - 1),
            })
            .is_ok()
    }
}

impl OperationLog for MemoryLog {
    fn push(&mut self, meta: &RecordMeta, payload: &[u8]) -> Result<u64, LogError> {
        if !self.open {
            return Err(LogError::Closed);
        }
        let mut stored = self.records.lock().map_err(poisoned)?;
        let expected = stored.records.len() as u64;
        if meta.index != expected {
            return Err(LogError::Sequence {
                expected,
                got: meta.index,
            });
        }
        if !self.take_budget() {
            return Err(LogError::Storage("injected push failure".into()));
        }
        stored.records.push(LogRecord {
            meta: *meta,
            payload: payload.to_vec(),
        });
        Ok(expected)
    }

    fn len(&self) -> u64 {
        self.records.lock().map(|s| s.records.len() as u64).unwrap_or(0)
    }

    fn read(&self, index: u64) -> Result<LogRecord, LogError> {
        if !self.open {
            return Err(LogError::Closed);
        }
        let stored = self.records.lock().map_err(poisoned)?;
        stored
            .records
            .get(index as usize)
            .cloned()
            .ok_or(LogError::OutOfRange {
                index,
                len: stored.records.len() as u64,
            })
    }

    fn base_content(&self) -> Result<Option<Vec<u8>>, LogError> {
        if !self.open {
            return Err(LogError::Closed);
        }
        Ok(self.records.lock().map_err(poisoned)?.base.clone())
    }

    fn set_base_content(&mut self, content: &[u8]) -> Result<(), LogError> {
        if !self.open {
            return Err(LogError::Closed);
        }
        let mut stored = self.records.lock().map_err(poisoned)?;
        if stored.base.is_some() || !stored.records.is_empty() {
            return Err(LogError::BaseFixed);
        }
        stored.base = Some(content.to_vec());
        Ok(())
    }

    fn close(&mut self) -> Result<(), LogError> {
        self.open = false;
        Ok(())
    }

    fn is_open(&self) -> bool {
        self.open
    }
}

fn poisoned<T>(_: std::sync::PoisonError<T>) -> LogError {
    LogError::Storage("memory log lock poisoned".into())
}
