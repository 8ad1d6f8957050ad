//! Test utilities for hidlink
//!
//! Provides record builders and timing helpers shared by the test suites of
//! every crate in the workspace.
//!
//! # Example
//!
//! ```
//! use common::test_utils::create_mock_device_record;
//!
//! let record = create_mock_device_record(1, 0x1234, 0x5678);
//! assert_eq!(record.vendor_id, 0x1234);
//! assert_eq!(record.serial_number, "SN000001");
//! ```

use records::{BusType, DeviceRecord};
use std::future::Future;
use std::time::{Duration, Instant};

/// Default test timeout (5 seconds)
pub const DEFAULT_TEST_TIMEOUT: Duration = Duration::from_secs(5);

/// Create a mock USB HID device record
///
/// The path is derived from `index` so records built with different indices
/// never collide.
pub fn create_mock_device_record(index: u32, vendor_id: u16, product_id: u16) -> DeviceRecord {
    DeviceRecord {
        path: format!("mock-{}:1.0", index),
        vendor_id,
        product_id,
        serial_number: format!("SN{:06}", index),
        release_number: 0x0100,
        manufacturer_string: format!("Test Manufacturer {}", index),
        product_string: format!("Test Product {}", index),
        usage_page: 0x0001,
        usage: 0x0006,
        interface_number: 0,
        bus_type: BusType::Usb,
    }
}

/// Create `count` records sharing one vendor ID with sequential product IDs
pub fn create_mock_listing(count: u32) -> Vec<DeviceRecord> {
    (1..=count)
        .map(|i| create_mock_device_record(i, 0x1234, 0x1000 + i as u16))
        .collect()
}

/// Run a future with a timeout
///
/// # Example
/// ```no_run
/// use common::test_utils::{with_timeout, DEFAULT_TEST_TIMEOUT};
///
/// #[tokio::test]
/// async fn test_with_timeout() {
///     let result = with_timeout(DEFAULT_TEST_TIMEOUT, async { 42 }).await.unwrap();
///     assert_eq!(result, 42);
/// }
/// ```
pub async fn with_timeout<T, F>(duration: Duration, future: F) -> Result<T, TimeoutError>
where
    F: Future<Output = T>,
{
    tokio::time::timeout(duration, future)
        .await
        .map_err(|_| TimeoutError { duration })
}

/// Poll `condition` until it holds or `timeout` elapses
///
/// Returns whether the condition was observed to hold.
pub fn wait_until<F>(timeout: Duration, mut condition: F) -> bool
where
    F: FnMut() -> bool,
{
    let deadline = Instant::now() + timeout;
    loop {
        if condition() {
            return true;
        }
        if Instant::now() >= deadline {
            return false;
        }
        std::thread::sleep(Duration::from_millis(2));
    }
}

/// Error returned when a test times out
#[derive(Debug)]
pub struct TimeoutError {
    /// The timeout duration that was exceeded
    pub duration: Duration,
}

impl std::fmt::Display for TimeoutError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Test timed out after {:?}", self.duration)
    }
}

impl std::error::Error for TimeoutError {}

/// Build a minimal report descriptor declaring a usage page and usage
///
/// Encodes `Usage Page`, `Usage` and an empty application collection.
pub fn create_mock_report_descriptor(usage_page: u16, usage: u16) -> Vec<u8> {
    let [page_lo, page_hi] = usage_page.to_le_bytes();
    let [usage_lo, usage_hi] = usage.to_le_bytes();
    vec![
        0x06, page_lo, page_hi, // Usage Page (2 bytes)
        0x0a, usage_lo, usage_hi, // Usage (2 bytes)
        0xa1, 0x01, // Collection (Application)
        0xc0, // End Collection
    ]
}
