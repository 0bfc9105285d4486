//! Error types for the binary codec.

use thiserror::Error;

/// Result type for codec operations.
pub type CodecResult<T> = Result<T, CodecError>;

/// Errors that can occur while encoding or decoding savevault formats.
///
/// Every variant signals corruption of the underlying file: the codec is
/// only ever handed bytes that a well-formed writer produced, so any
/// mismatch means the file was damaged or tampered with.
#[derive(Debug, Error)]
pub enum CodecError {
    /// The input ended before the structure was complete.
    #[error("truncated input: needed {needed} bytes, {available} available")]
    Truncated {
        /// Bytes required to finish decoding.
        needed: usize,
        /// Bytes actually available.
        available: usize,
    },

    /// The input contained bytes past the end of the decoded structure.
    #[error("{extra} trailing bytes after record")]
    TrailingBytes {
        /// Number of unconsumed bytes.
        extra: usize,
    },

    /// An index slot was not exactly [`crate::ENTRY_SIZE`] bytes.
    #[error("index entry must be {expected} bytes, got {actual}")]
    InvalidEntrySize {
        /// Required slot width.
        expected: usize,
        /// Width actually supplied.
        actual: usize,
    },

    /// A decoded length prefix exceeded its sanity cap.
    #[error("{field} length {len} exceeds maximum {max}")]
    LengthOutOfRange {
        /// Which length field was out of range.
        field: &'static str,
        /// The decoded length.
        len: u32,
        /// The maximum permitted length.
        max: u32,
    },
}
