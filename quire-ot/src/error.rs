use thiserror::Error;

/// Errors raised by the operation algebra.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum OtError {
    /// Two operations (or an operation and a buffer) disagree on length.
    #[error("Length mismatch: expected {expected}, got {actual}")]
    LengthMismatch { expected: usize, actual: usize },

    /// A retain or delete would read past the end of the buffer.
    #[error("Operation spans {needed} bytes but buffer holds {len}")]
    OutOfRange { needed: usize, len: usize },

    /// A delete's recorded text differs from the bytes it would remove.
    #[error("Deleted text does not match buffer at offset {offset}")]
    ContentMismatch { offset: usize },
}
