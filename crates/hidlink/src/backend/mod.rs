//! Transport backends
//!
//! A backend lists devices and opens them; an opened device is a [`Transport`].
//! The session core only ever talks to these two traits, so the physical bus
//! (libusb here, an in-memory device in tests) stays out of the session logic.
//!
//! Backends exchange the fixed-layout records from the `records` crate rather
//! than the logical [`crate::DeviceInfo`], and always hand back fully owned
//! listings: whatever native list the platform produces is walked and released
//! before `device_listing` returns.

pub mod libusb;
pub mod mock;

use crate::error::Result;
use common::BackendSettings;
use records::{DeviceRecord, SessionRecord};
use std::time::Duration;

pub use libusb::LibUsbBackend;
pub use mock::{MockBackend, MockDevice};

/// HID report types, numbered as in the `wValue` high byte of GET/SET_REPORT
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum ReportType {
    Input = 0x01,
    Output = 0x02,
    Feature = 0x03,
}

/// Result of one bounded transfer submission
#[derive(Debug, PartialEq, Eq)]
pub enum Submit {
    /// A report of this many bytes was written into the buffer
    Report(usize),
    /// Nothing arrived within the wait, or the transfer was cancelled
    Timeout,
    /// The transport can no longer deliver reports
    Fail(crate::HidError),
}

/// An opened device handle
///
/// Implementations must be usable from the transfer loop thread and from
/// application threads at the same time.
pub trait Transport: Send + Sync {
    /// Endpoint and configuration metadata for this handle
    fn session_record(&self) -> SessionRecord;

    /// Descriptor of the opened interface
    fn device_record(&self) -> DeviceRecord;

    /// Wait up to `timeout` for the next input report
    fn submit(&self, buf: &mut [u8], timeout: Duration) -> Submit;

    /// Abort a pending `submit` where the transport can; otherwise the next
    /// `submit` returns `Timeout` without waiting
    fn cancel(&self);

    /// Send an output report over the interrupt OUT path; `data[0]` is the
    /// Report ID
    fn write(&self, data: &[u8], timeout: Duration) -> Result<usize>;

    /// SET_REPORT over the control channel; `data[0]` is the Report ID
    fn set_report(&self, report_type: ReportType, data: &[u8], timeout: Duration)
    -> Result<usize>;

    /// GET_REPORT over the control channel
    ///
    /// `buf[0]` holds the requested Report ID on entry and still holds it on
    /// return. The count includes that byte.
    fn get_report(&self, report_type: ReportType, buf: &mut [u8], timeout: Duration)
    -> Result<usize>;

    fn string_descriptor(&self, index: u8) -> Result<String>;

    /// Copy the raw report descriptor into `buf`, returning the copied length
    fn report_descriptor(&self, buf: &mut [u8]) -> Result<usize>;
}

/// A source of devices
pub trait Backend: Send + Sync {
    fn name(&self) -> &'static str;

    fn init(&self) -> Result<()> {
        Ok(())
    }

    fn exit(&self) -> Result<()> {
        Ok(())
    }

    /// Snapshot of HID interfaces, optionally pre-filtered by VID/PID (0 = any)
    fn device_listing(&self, vendor_id: u16, product_id: u16) -> Result<Vec<DeviceRecord>>;

    /// Open the interface at `path` for exclusive use
    fn open_path(&self, path: &str, settings: &BackendSettings) -> Result<Box<dyn Transport>>;
}
