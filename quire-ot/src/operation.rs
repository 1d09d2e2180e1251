//! Run-based operation representation, normalization and application.
//!
//! Normal form ("squeezed"):
//! ```text
//! Retain(n) │ Insert(t)? Delete(d)? │ Retain(n) │ Insert(t)? Delete(d)? │ ...
//! ```
//! - no empty runs
//! - no two adjacent runs of the same kind
//! - between two retains, at most one insert followed by at most one delete
//!
//! The builder methods keep an operation in normal form as it grows, so every
//! `Operation` value is normalized.

use serde::{Deserialize, Serialize};

use crate::error::OtError;
use crate::transform::Side;

/// One unit of an operation.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Run {
    /// Keep `n` bytes of the source.
    Retain(usize),
    /// Emit new bytes.
    Insert(Vec<u8>),
    /// Drop these exact bytes from the source.
    Delete(Vec<u8>),
}

impl Run {
    /// Span with direction: retains and inserts are positive, deletes negative.
    pub fn signed_len(&self) -> i64 {
        match self {
            Run::Retain(n) => *n as i64,
            Run::Insert(text) => text.len() as i64,
            Run::Delete(text) => -(text.len() as i64),
        }
    }

    /// Magnitude of the span.
    pub fn len(&self) -> usize {
        match self {
            Run::Retain(n) => *n,
            Run::Insert(text) | Run::Delete(text) => text.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// A transformation from a buffer of `base_len()` bytes to one of
/// `target_len()` bytes.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "Vec<Run>", into = "Vec<Run>")]
pub struct Operation {
    runs: Vec<Run>,
    base_len: usize,
    target_len: usize,
}

impl Operation {
    /// The empty operation (identity on the empty buffer).
    pub fn new() -> Self {
        Self::default()
    }

    /// Normalize an arbitrary run list.
    ///
    /// Drops empty runs, merges neighbours of the same kind and moves inserts
    /// ahead of deletes at the same position.
    pub fn from_runs(runs: impl IntoIterator<Item = Run>) -> Self {
        let mut op = Self::new();
        for run in runs {
            op.push(run);
        }
        op
    }

    /// Insert `text` at `pos` of a buffer of `base_len` bytes.
    pub fn insert_at(base_len: usize, pos: usize, text: impl AsRef<[u8]>) -> Result<Self, OtError> {
        if pos > base_len {
            return Err(OtError::OutOfRange {
                needed: pos,
                len: base_len,
            });
        }
        Ok(Self::new()
            .retain(pos)
            .insert(text)
            .retain(base_len - pos))
    }

    /// Delete `len` bytes of `buffer` starting at `pos`, recording the text.
    pub fn delete_at(buffer: &[u8], pos: usize, len: usize) -> Result<Self, OtError> {
        let end = pos.saturating_add(len);
        if end > buffer.len() {
            return Err(OtError::OutOfRange {
                needed: end,
                len: buffer.len(),
            });
        }
        Ok(Self::new()
            .retain(pos)
            .delete(&buffer[pos..end])
            .retain(buffer.len() - end))
    }

    pub fn retain(mut self, n: usize) -> Self {
        self.push_retain(n);
        self
    }

    pub fn insert(mut self, text: impl AsRef<[u8]>) -> Self {
        self.push_insert(text.as_ref());
        self
    }

    pub fn delete(mut self, text: impl AsRef<[u8]>) -> Self {
        self.push_delete(text.as_ref());
        self
    }

    /// Append a run, keeping normal form.
    pub fn push(&mut self, run: Run) {
        match run {
            Run::Retain(n) => self.push_retain(n),
            Run::Insert(text) => self.push_insert(&text),
            Run::Delete(text) => self.push_delete(&text),
        }
    }

    pub fn push_retain(&mut self, n: usize) {
        if n == 0 {
            return;
        }
        self.base_len += n;
        self.target_len += n;
        if let Some(Run::Retain(last)) = self.runs.last_mut() {
            *last += n;
        } else {
            self.runs.push(Run::Retain(n));
        }
    }

    pub fn push_insert(&mut self, text: &[u8]) {
        if text.is_empty() {
            return;
        }
        self.target_len += text.len();

        // Inserts sort ahead of a trailing delete.
        let n = self.runs.len();
        if let Some(Run::Delete(_)) = self.runs.last() {
            if n >= 2 {
                if let Run::Insert(prev) = &mut self.runs[n - 2] {
                    prev.extend_from_slice(text);
                    return;
                }
            }
            self.runs.insert(n - 1, Run::Insert(text.to_vec()));
            return;
        }

        if let Some(Run::Insert(prev)) = self.runs.last_mut() {
            prev.extend_from_slice(text);
        } else {
            self.runs.push(Run::Insert(text.to_vec()));
        }
    }

    pub fn push_delete(&mut self, text: &[u8]) {
        if text.is_empty() {
            return;
        }
        self.base_len += text.len();
        if let Some(Run::Delete(prev)) = self.runs.last_mut() {
            prev.extend_from_slice(text);
        } else {
            self.runs.push(Run::Delete(text.to_vec()));
        }
    }

    pub fn runs(&self) -> &[Run] {
        &self.runs
    }

    /// Length of the buffer this operation applies to.
    pub fn base_len(&self) -> usize {
        self.base_len
    }

    /// Length of the buffer this operation produces.
    pub fn target_len(&self) -> usize {
        self.target_len
    }

    /// True if applying the operation leaves every buffer unchanged.
    pub fn is_noop(&self) -> bool {
        self.runs.iter().all(|run| matches!(run, Run::Retain(_)))
    }

    /// Apply to `buffer`, returning the new content. `buffer` is not touched.
    pub fn apply(&self, buffer: &[u8]) -> Result<Vec<u8>, OtError> {
        self.check(buffer)?;

        let mut out = Vec::with_capacity(self.target_len);
        let mut pos = 0;
        for run in &self.runs {
            match run {
                Run::Retain(n) => {
                    out.extend_from_slice(&buffer[pos..pos + n]);
                    pos += n;
                }
                Run::Insert(text) => out.extend_from_slice(text),
                Run::Delete(text) => pos += text.len(),
            }
        }
        Ok(out)
    }

    /// Apply in place. On error `buffer` is left exactly as it was.
    pub fn apply_to(&self, buffer: &mut Vec<u8>) -> Result<(), OtError> {
        if self.is_noop() {
            return self.check(buffer);
        }
        let next = self.apply(buffer)?;
        *buffer = next;
        Ok(())
    }

    /// Validate lengths and every delete's text against `buffer`.
    fn check(&self, buffer: &[u8]) -> Result<(), OtError> {
        if self.base_len > buffer.len() {
            return Err(OtError::OutOfRange {
                needed: self.base_len,
                len: buffer.len(),
            });
        }
        if self.base_len < buffer.len() {
            return Err(OtError::LengthMismatch {
                expected: buffer.len(),
                actual: self.base_len,
            });
        }

        let mut pos = 0;
        for run in &self.runs {
            match run {
                Run::Retain(n) => pos += n,
                Run::Insert(_) => {}
                Run::Delete(text) => {
                    if buffer[pos..pos + text.len()] != text[..] {
                        return Err(OtError::ContentMismatch { offset: pos });
                    }
                    pos += text.len();
                }
            }
        }
        Ok(())
    }

    /// The operation that undoes this one.
    pub fn inverse(&self) -> Operation {
        self.runs
            .iter()
            .map(|run| match run {
                Run::Retain(n) => Run::Retain(*n),
                Run::Insert(text) => Run::Delete(text.clone()),
                Run::Delete(text) => Run::Insert(text.clone()),
            })
            .collect()
    }

    /// Map a byte offset in the source buffer to the target buffer.
    ///
    /// `side` places the offset relative to an insert at the same position:
    /// `Left` keeps it before the inserted text, `Right` moves it after.
    pub fn transform_index(&self, index: usize, side: Side) -> usize {
        let mut source = 0;
        let mut mapped = index;
        for run in &self.runs {
            if source > index {
                break;
            }
            match run {
                Run::Retain(n) => source += n,
                Run::Insert(text) => {
                    if source < index || side == Side::Right {
                        mapped += text.len();
                    }
                }
                Run::Delete(text) => {
                    mapped -= text.len().min(index - source);
                    source += text.len();
                }
            }
        }
        mapped
    }
}

impl FromIterator<Run> for Operation {
    fn from_iter<I: IntoIterator<Item = Run>>(iter: I) -> Self {
        Self::from_runs(iter)
    }
}

impl From<Vec<Run>> for Operation {
    fn from(runs: Vec<Run>) -> Self {
        Self::from_runs(runs)
    }
}

impl From<Operation> for Vec<Run> {
    fn from(op: Operation) -> Self {
        op.runs
    }
}
