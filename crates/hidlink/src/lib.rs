//! Report-oriented access to HID devices
//!
//! `hidlink` discovers attached HID devices, opens sessions against them and
//! exchanges input, output and feature reports. Each open session owns one
//! background transfer loop that drains incoming input reports into a FIFO
//! queue; reads consume from that queue in blocking, timed or non-blocking
//! mode. Output and feature traffic goes straight to the transport.
//!
//! Everything hangs off a [`HidContext`], which owns the transport backend,
//! the configuration, the table of open sessions and the context-wide last
//! error. Sessions are addressed by opaque [`SessionId`] values, so a closed
//! session can never be reached again through a stale id.
//!
//! # Example
//!
//! ```
//! use common::HidConfig;
//! use common::test_utils::create_mock_device_record;
//! use hidlink::HidContext;
//! use hidlink::backend::mock::{MockBackend, MockDevice};
//!
//! let backend = MockBackend::new();
//! let device = MockDevice::new(create_mock_device_record(1, 0x1234, 0x5678));
//! backend.add_device(device.clone());
//!
//! let ctx = HidContext::new(backend, HidConfig::default());
//! let devices = ctx.enumerate(0x1234, 0).unwrap();
//! assert_eq!(devices.len(), 1);
//!
//! let id = ctx.open_path(&devices[0].path).unwrap();
//! device.inject_report(vec![0x01, 0xaa, 0xbb]);
//! let report = ctx.read_timeout(id, 64, 1000).unwrap();
//! assert_eq!(report, vec![0x01, 0xaa, 0xbb]);
//!
//! ctx.close(id).unwrap();
//! ```

pub mod backend;
pub mod context;
pub mod enumerate;
pub mod error;
pub mod error_channel;
pub mod info;
pub mod queue;
pub mod registry;
pub mod session;
pub mod sync;
mod transfer;

#[cfg(feature = "async")]
mod async_io;

pub use backend::{Backend, ReportType, Submit, Transport};
pub use context::HidContext;
pub use enumerate::Enumerator;
pub use error::{HidError, Result};
pub use error_channel::{ErrorRecord, NO_ERROR};
pub use info::DeviceInfo;
pub use queue::QueueStats;
pub use records::{API_VERSION, ApiVersion, BusType};
pub use registry::SessionId;
pub use session::{Session, SessionState};
