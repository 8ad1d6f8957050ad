//! Fixed-layout records for hidlink
//!
//! This crate defines the binary records exchanged between the session core and
//! a transport backend. They keep the native field order and widths (fixed-width
//! integers for IDs, explicit ordering) and are deliberately kept apart from the
//! logical `DeviceInfo` type used by the rest of the library.
//!
//! # Example
//!
//! ```
//! use records::{BusType, DeviceRecord, decode_listing, encode_listing};
//!
//! let record = DeviceRecord {
//!     path: "1-4:1.0".to_string(),
//!     vendor_id: 0x046d,
//!     product_id: 0xc52b,
//!     bus_type: BusType::Usb,
//!     ..Default::default()
//! };
//!
//! let bytes = encode_listing(&[record.clone()]).unwrap();
//! let decoded = decode_listing(&bytes).unwrap();
//! assert_eq!(decoded, vec![record]);
//! ```

pub mod codec;
pub mod error;
pub mod types;
pub mod version;

pub use codec::{
    decode_device_record, decode_listing, decode_session_record, encode_device_record,
    encode_listing, encode_session_record,
};
pub use error::{RecordError, Result};
pub use types::{BusType, DeviceRecord, SessionRecord};
pub use version::{API_VERSION, ApiVersion, make_version};
