//! Error types for HID sessions

use thiserror::Error;

/// Errors surfaced by context and session operations
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HidError {
    /// The context has not been initialized and auto-initialization is off
    #[error("HID context is not initialized")]
    NotInitialized,

    /// No attached device matched the request
    #[error("Device not found")]
    DeviceNotFound,

    /// Operation on a closed, closing or unknown session
    #[error("Invalid or closed device handle")]
    HandleInvalid,

    /// The underlying transport reported an error
    #[error("Transport failure: {0}")]
    TransportFailure(String),

    /// A direct transfer did not complete in time
    #[error("Transfer timed out")]
    Timeout,

    /// The buffer cannot hold the data the operation needs
    #[error("Buffer too small: needed {needed}, got {available}")]
    BufferTooSmall { needed: usize, available: usize },
}

impl HidError {
    pub(crate) fn transport(message: impl Into<String>) -> Self {
        HidError::TransportFailure(message.into())
    }
}

impl From<records::RecordError> for HidError {
    fn from(e: records::RecordError) -> Self {
        HidError::TransportFailure(format!("Malformed record: {}", e))
    }
}

/// Type alias for HID results
pub type Result<T> = std::result::Result<T, HidError>;

/// Reject buffers that cannot hold the leading Report ID byte
pub(crate) fn require_report_id(len: usize) -> Result<()> {
    if len == 0 {
        return Err(HidError::BufferTooSmall {
            needed: 1,
            available: 0,
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = HidError::BufferTooSmall {
            needed: 1,
            available: 0,
        };
        assert_eq!(err.to_string(), "Buffer too small: needed 1, got 0");

        let err = HidError::transport("pipe stalled");
        assert_eq!(err.to_string(), "Transport failure: pipe stalled");
    }

    #[test]
    fn test_record_error_conversion() {
        let err: HidError = records::RecordError::Truncated("path").into();
        assert!(matches!(err, HidError::TransportFailure(msg) if msg.contains("path")));
    }

    #[test]
    fn test_require_report_id() {
        assert!(require_report_id(1).is_ok());
        assert_eq!(
            require_report_id(0),
            Err(HidError::BufferTooSmall {
                needed: 1,
                available: 0
            })
        );
    }
}
