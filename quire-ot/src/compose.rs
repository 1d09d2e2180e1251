//! Sequential composition of two operations.

use crate::cursor::{Piece, RunCursor};
use crate::error::OtError;
use crate::operation::Operation;

/// Merge `a` followed by `b` into a single operation.
///
/// Requires `a.target_len() == b.base_len()`. Text inserted by `a` and then
/// deleted by `b` cancels out; the two recorded texts must agree.
pub fn compose(a: &Operation, b: &Operation) -> Result<Operation, OtError> {
    if a.target_len() != b.base_len() {
        return Err(OtError::LengthMismatch {
            expected: a.target_len(),
            actual: b.base_len(),
        });
    }

    let mut out = Operation::new();
    let mut left = RunCursor::new(a.runs());
    let mut right = RunCursor::new(b.runs());
    // Position within the intermediate buffer (a's target, b's source).
    let mut offset = 0;

    loop {
        match (left.peek(), right.peek()) {
            (None, None) => break,
            (Some(Piece::Delete(text)), _) => {
                out.push_delete(text);
                left.skip();
            }
            (_, Some(Piece::Insert(text))) => {
                out.push_insert(text);
                right.skip();
            }
            (Some(x), Some(y)) => {
                let n = x.len().min(y.len());
                match (x, y) {
                    (Piece::Retain(_), Piece::Retain(_)) => out.push_retain(n),
                    (Piece::Retain(_), Piece::Delete(text)) => out.push_delete(&text[..n]),
                    (Piece::Insert(text), Piece::Retain(_)) => out.push_insert(&text[..n]),
                    (Piece::Insert(inserted), Piece::Delete(deleted)) => {
                        if inserted[..n] != deleted[..n] {
                            return Err(OtError::ContentMismatch { offset });
                        }
                    }
                    // Deletes on the left and inserts on the right are consumed above.
                    _ => unreachable!("compose: unconsumed delete/insert"),
                }
                offset += n;
                left.advance(n);
                right.advance(n);
            }
            (None, Some(_)) | (Some(_), None) => {
                return Err(OtError::LengthMismatch {
                    expected: a.target_len(),
                    actual: b.base_len(),
                });
            }
        }
    }

    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::operation::Run;

    #[test]
    fn test_compose_sequential_inserts() {
        let doc = b"Hello World!";
        let a = Operation::insert_at(12, 6, "wide ").unwrap();
        let b = Operation::insert_at(17, 0, "Yo ").unwrap();
        let ab = compose(&a, &b).unwrap();
        assert_eq!(ab.apply(doc).unwrap(), b"Yo Hello wide World!");
        assert_eq!(ab.base_len(), 12);
        assert_eq!(ab.target_len(), 20);
    }

    #[test]
    fn test_compose_insert_then_delete_cancels() {
        let a = Operation::new().retain(3).insert("tmp").retain(2);
        let b = Operation::new().retain(3).delete("tmp").retain(2);
        let ab = compose(&a, &b).unwrap();
        assert!(ab.is_noop());
        assert_eq!(ab.runs(), &[Run::Retain(5)]);
    }

    #[test]
    fn test_compose_partial_cancel() {
        let doc = b"ab";
        let a = Operation::new().retain(1).insert("XYZ").retain(1);
        let b = Operation::new().retain(2).delete("YZb");
        let ab = compose(&a, &b).unwrap();
        assert_eq!(ab.apply(doc).unwrap(), b"aX");
        assert_eq!(
            ab.runs(),
            &[
                Run::Retain(1),
                Run::Insert(b"X".to_vec()),
                Run::Delete(b"b".to_vec()),
            ]
        );
    }

    #[test]
    fn test_compose_delete_passthrough() {
        let doc = b"abcdef";
        let a = Operation::delete_at(doc, 0, 2).unwrap();
        let b = Operation::delete_at(b"cdef", 2, 2).unwrap();
        let ab = compose(&a, &b).unwrap();
        assert_eq!(ab.apply(doc).unwrap(), b"cd");
    }

    #[test]
    fn test_compose_length_mismatch() {
        let a = Operation::new().retain(3);
        let b = Operation::new().retain(4);
        assert_eq!(
            compose(&a, &b),
            Err(OtError::LengthMismatch { expected: 3, actual: 4 })
        );
    }

    #[test]
    fn test_compose_cancel_text_mismatch() {
        let a = Operation::new().insert("abc");
        let b = Operation::new().delete("abd");
        assert_eq!(compose(&a, &b), Err(OtError::ContentMismatch { offset: 0 }));
    }

    #[test]
    fn test_compose_with_inverse_is_identity() {
        let doc = b"some text";
        let op = Operation::new().retain(5).delete("text").insert("words");
        let ab = compose(&op, &op.inverse()).unwrap();
        assert_eq!(ab.base_len(), doc.len());
        assert_eq!(ab.apply(doc).unwrap(), doc);
    }
}
