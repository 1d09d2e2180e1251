//! Partial run consumption shared by `compose` and `transform`.

use crate::operation::Run;

/// The unconsumed remainder of the current run.
#[derive(Debug, Clone, Copy)]
pub(crate) enum Piece<'a> {
    Retain(usize),
    Insert(&'a [u8]),
    Delete(&'a [u8]),
}

impl Piece<'_> {
    pub(crate) fn len(&self) -> usize {
        match self {
            Piece::Retain(n) => *n,
            Piece::Insert(text) | Piece::Delete(text) => text.len(),
        }
    }
}

/// Walks a run slice, allowing the head run to be split.
pub(crate) struct RunCursor<'a> {
    runs: &'a [Run],
    index: usize,
    offset: usize,
}

impl<'a> RunCursor<'a> {
    pub(crate) fn new(runs: &'a [Run]) -> Self {
        Self {
            runs,
            index: 0,
            offset: 0,
        }
    }

    pub(crate) fn peek(&self) -> Option<Piece<'a>> {
        let run = self.runs.get(self.index)?;
        Some(match run {
            Run::Retain(n) => Piece::Retain(n - self.offset),
            Run::Insert(text) => Piece::Insert(&text[self.offset..]),
            Run::Delete(text) => Piece::Delete(&text[self.offset..]),
        })
    }

    /// Consume `n` units of the head run. `n` never exceeds the head's length.
    pub(crate) fn advance(&mut self, n: usize) {
        let Some(run) = self.runs.get(self.index) else {
            return;
        };
        self.offset += n;
        if self.offset >= run.len() {
            self.index += 1;
            self.offset = 0;
        }
    }

    /// Consume whatever is left of the head run.
    pub(crate) fn skip(&mut self) {
        self.index += 1;
        self.offset = 0;
    }
}
