//! Record decoding errors

use thiserror::Error;

/// Errors produced while encoding or decoding binary records
#[derive(Debug, Error)]
pub enum RecordError {
    /// Input ended before the record was complete
    #[error("Truncated record: {0}")]
    Truncated(&'static str),

    /// A length-prefixed string was not valid UTF-8
    #[error("Invalid UTF-8 in field {field}")]
    InvalidString { field: &'static str },

    /// A string is longer than its u16 length prefix can describe
    #[error("Field {field} too long: {len} bytes (max: {max})")]
    FieldTooLong {
        field: &'static str,
        len: usize,
        max: usize,
    },

    /// Bytes left over after a complete listing was decoded
    #[error("Trailing data after listing: {0} bytes")]
    TrailingData(usize),

    /// I/O error from the underlying reader or writer
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Type alias for record results
pub type Result<T> = std::result::Result<T, RecordError>;
