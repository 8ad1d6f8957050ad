//! Last-error records
//!
//! Every session and the context itself carry one [`ErrorRecord`]. Operations
//! clear it on entry and replace it on failure, so the string always describes
//! the most recent operation in that scope.

use crate::error::{HidError, Result};
use crate::sync::lock;
use std::sync::Mutex;

/// Reported when the scope has no recorded failure
pub const NO_ERROR: &str = "Success";

#[derive(Debug, Default)]
pub struct ErrorRecord {
    message: Mutex<Option<String>>,
}

impl ErrorRecord {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn clear(&self) {
        *lock(&self.message) = None;
    }

    pub fn set(&self, error: &HidError) {
        *lock(&self.message) = Some(error.to_string());
    }

    /// Store the error of a failed result and pass the result through
    pub fn record<T>(&self, result: Result<T>) -> Result<T> {
        if let Err(e) = &result {
            self.set(e);
        }
        result
    }

    /// The recorded message, or [`NO_ERROR`]
    pub fn message(&self) -> String {
        lock(&self.message)
            .clone()
            .unwrap_or_else(|| NO_ERROR.to_string())
    }

    pub fn is_set(&self) -> bool {
        lock(&self.message).is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_record_reports_success() {
        let record = ErrorRecord::new();
        assert_eq!(record.message(), NO_ERROR);
        assert!(!record.is_set());
    }

    #[test]
    fn test_record_replaces_and_clears() {
        let record = ErrorRecord::new();

        let result: Result<()> = record.record(Err(HidError::DeviceNotFound));
        assert!(result.is_err());
        assert_eq!(record.message(), "Device not found");

        record.set(&HidError::Timeout);
        assert_eq!(record.message(), "Transfer timed out");

        let ok: Result<u8> = record.record(Ok(7));
        assert_eq!(ok, Ok(7));
        // success does not erase an earlier failure, only clear() does
        assert!(record.is_set());

        record.clear();
        assert_eq!(record.message(), NO_ERROR);
    }
}
