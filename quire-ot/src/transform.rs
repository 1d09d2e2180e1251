//! Transformation of concurrent operations (TP1).
//!
//! ```text
//!            doc
//!          a/   \b
//!          ▼     ▼
//!       a(doc) b(doc)
//!          b'\   /a'
//!             ▼ ▼
//!          converged
//! ```

use crate::cursor::{Piece, RunCursor};
use crate::error::OtError;
use crate::operation::Operation;

/// Which operand's insert lands first when both insert at the same offset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Side {
    Left,
    Right,
}

impl Side {
    /// Tie-break from a total order over author ids: the lower id goes first.
    ///
    /// Equal ids place the left operand second, so an author's later edit
    /// lands after its own earlier one.
    pub fn by_author<T: Ord + ?Sized>(left: &T, right: &T) -> Side {
        if left < right {
            Side::Left
        } else {
            Side::Right
        }
    }

    pub fn flip(self) -> Side {
        match self {
            Side::Left => Side::Right,
            Side::Right => Side::Left,
        }
    }
}

/// Rebase two operations issued against the same base onto each other.
///
/// Returns `(a', b')` where `a'` applies after `b` and `b'` applies after `a`,
/// with `b'(a(doc)) == a'(b(doc))`.
pub fn transform(
    a: &Operation,
    b: &Operation,
    first: Side,
) -> Result<(Operation, Operation), OtError> {
    if a.base_len() != b.base_len() {
        return Err(OtError::LengthMismatch {
            expected: a.base_len(),
            actual: b.base_len(),
        });
    }

    let mut a_prime = Operation::new();
    let mut b_prime = Operation::new();
    let mut left = RunCursor::new(a.runs());
    let mut right = RunCursor::new(b.runs());

    loop {
        match (left.peek(), right.peek()) {
            (None, None) => break,
            (Some(Piece::Insert(x)), Some(Piece::Insert(y))) => {
                if first == Side::Left {
                    a_prime.push_insert(x);
                    b_prime.push_retain(x.len());
                    left.skip();
                } else {
                    b_prime.push_insert(y);
                    a_prime.push_retain(y.len());
                    right.skip();
                }
            }
            (Some(Piece::Insert(text)), _) => {
                a_prime.push_insert(text);
                b_prime.push_retain(text.len());
                left.skip();
            }
            (_, Some(Piece::Insert(text))) => {
                b_prime.push_insert(text);
                a_prime.push_retain(text.len());
                right.skip();
            }
            (Some(x), Some(y)) => {
                let n = x.len().min(y.len());
                match (x, y) {
                    (Piece::Retain(_), Piece::Retain(_)) => {
                        a_prime.push_retain(n);
                        b_prime.push_retain(n);
                    }
                    // The other side already removed these bytes.
                    (Piece::Delete(_), Piece::Delete(_)) => {}
                    (Piece::Delete(text), Piece::Retain(_)) => a_prime.push_delete(&text[..n]),
                    (Piece::Retain(_), Piece::Delete(text)) => b_prime.push_delete(&text[..n]),
                    _ => unreachable!("transform: unconsumed insert"),
                }
                left.advance(n);
                right.advance(n);
            }
            (None, Some(_)) | (Some(_), None) => {
                return Err(OtError::LengthMismatch {
                    expected: a.base_len(),
                    actual: b.base_len(),
                });
            }
        }
    }

    Ok((a_prime, b_prime))
}
