//! Document history: the ordered sequence of accepted operations.
//!
//! Entry `i` takes the document from the state after entry `i - 1` to the
//! state after entry `i`. Entry 0 applies to the log's base content (empty if
//! none was set), which is the state at index `None`. Only the newest `capacity` entries stay in memory;
//! older ones are read back from the log when a stale operation has to be
//! rebased past them.

use std::collections::VecDeque;

use log::trace;
use quire_ot::{transform, Operation, OtError, Side};
use thiserror::Error;
use uuid::Uuid;

use crate::storage::{
    decode_record, encode_record, LogCursor, LogError, OperationLog, RecordMeta,
};

/// History errors.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum HistoryError {
    #[error("Base index {base} is ahead of history (next index {next})")]
    InvalidBase { base: u64, next: u64 },
    #[error("Transform failed: {0}")]
    Transform(#[from] OtError),
    #[error(transparent)]
    Log(#[from] LogError),
    #[error("Replay failed at record {index}: {reason}")]
    Replay { index: u64, reason: String },
}

#[derive(Debug, Clone, PartialEq)]
pub struct HistoryEntry {
    pub author: Uuid,
    pub op: Operation,
}

pub struct History<L: OperationLog> {
    log: L,
    /// Most recent entries; `window[0]` has index `window_start`.
    window: VecDeque<HistoryEntry>,
    window_start: u64,
    capacity: usize,
    next: u64,
    seeks: u64,
}

impl<L: OperationLog> History<L> {
    /// Replay `log` from its base content and return the history together
    /// with the reconstructed buffer.
    pub fn recover(log: L, capacity: usize) -> Result<(Self, Vec<u8>), HistoryError> {
        let mut buffer = log.base_content()?.unwrap_or_default();
        let mut window = VecDeque::new();
        {
            let mut cursor = LogCursor::new(&log);
            loop {
                let index = cursor.position();
                let meta = match cursor.next() {
                    Ok(Some(meta)) => meta,
                    Ok(None) => break,
                    Err(e) => return Err(replay_error(index, e)),
                };
                let op = decode_record(cursor.payload().unwrap_or_default())
                    .map_err(|e| replay_error(index, e))?;
                op.apply_to(&mut buffer)
                    .map_err(|e| replay_error(index, e))?;

                window.push_back(HistoryEntry {
                    author: meta.author,
                    op,
                });
                if window.len() > capacity {
                    window.pop_front();
                }
            }
        }

        let next = log.len();
        let window_start = next - window.len() as u64;
        Ok((
            Self {
                log,
                window,
                window_start,
                capacity,
                next,
                seeks: 0,
            },
            buffer,
        ))
    }

    /// Index the next accepted operation will receive.
    pub fn next_index(&self) -> u64 {
        self.next
    }

    /// Index of the newest entry, `None` while the history is empty.
    pub fn last_index(&self) -> Option<u64> {
        self.next.checked_sub(1)
    }

    /// Rewrite `op`, authored against the state after entry `base`, so it
    /// applies to the current state. `None` is the initial empty state.
    pub fn rebase(
        &mut self,
        op: Operation,
        author: Uuid,
        base: Option<u64>,
    ) -> Result<Operation, HistoryError> {
        let from = match base {
            None => 0,
            Some(base) if base < self.next => base + 1,
            Some(base) => {
                return Err(HistoryError::InvalidBase {
                    base,
                    next: self.next,
                })
            }
        };

        let mut op = op;
        if from < self.window_start {
            self.seeks += 1;
            trace!("Seeking log for entries {}..{}", from, self.window_start);
            let mut cursor = LogCursor::new(&self.log);
            cursor.goto(from)?;
            while cursor.position() < self.window_start {
                let index = cursor.position();
                let meta = cursor.next()?.ok_or(LogError::OutOfRange {
                    index,
                    len: self.log.len(),
                })?;
                let past = decode_record(cursor.payload().unwrap_or_default())?;
                op = transform_past(op, &author, &meta.author, &past)?;
            }
        }

        let skip = from.saturating_sub(self.window_start) as usize;
        for entry in self.window.iter().skip(skip) {
            op = transform_past(op, &author, &entry.author, &entry.op)?;
        }
        Ok(op)
    }

    /// Durably record an accepted operation. A failed push leaves the
    /// history unchanged.
    pub fn append(
        &mut self,
        author: Uuid,
        base: Option<u64>,
        op: Operation,
    ) -> Result<u64, HistoryError> {
        let index = self.next;
        let payload = encode_record(&op)?;
        self.log.push(&RecordMeta::new(index, author, base), &payload)?;

        self.next += 1;
        self.window.push_back(HistoryEntry { author, op });
        while self.window.len() > self.capacity {
            self.window.pop_front();
            self.window_start += 1;
        }
        Ok(index)
    }

    /// Number of rebases that had to read evicted entries from the log.
    pub fn seeks(&self) -> u64 {
        self.seeks
    }

    pub fn cached(&self) -> usize {
        self.window.len()
    }

    pub fn close(&mut self) -> Result<(), HistoryError> {
        self.log.close()?;
        Ok(())
    }
}

/// Rebase `op` past one accepted entry, keeping only the rewritten `op`.
fn transform_past(
    op: Operation,
    author: &Uuid,
    past_author: &Uuid,
    past: &Operation,
) -> Result<Operation, OtError> {
    let (rebased, _) = transform(&op, past, Side::by_author(author, past_author))?;
    Ok(rebased)
}

fn replay_error(index: u64, e: impl std::fmt::Display) -> HistoryError {
    HistoryError::Replay {
        index,
        reason: e.to_string(),
    }
}
