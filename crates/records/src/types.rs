//! Record type definitions

use std::fmt;

/// Underlying bus of a HID device
///
/// Discriminants match the native `hid_bus_type` values.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum BusType {
    #[default]
    Unknown = 0x00,
    Usb = 0x01,
    /// Bluetooth or Bluetooth LE
    Bluetooth = 0x02,
    I2c = 0x03,
    Spi = 0x04,
}

impl BusType {
    /// Map a raw bus value, treating anything unrecognised as `Unknown`
    pub fn from_raw(value: u32) -> Self {
        match value {
            0x01 => BusType::Usb,
            0x02 => BusType::Bluetooth,
            0x03 => BusType::I2c,
            0x04 => BusType::Spi,
            _ => BusType::Unknown,
        }
    }

    pub fn as_raw(self) -> u32 {
        self as u32
    }
}

impl fmt::Display for BusType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            BusType::Unknown => "unknown",
            BusType::Usb => "usb",
            BusType::Bluetooth => "bluetooth",
            BusType::I2c => "i2c",
            BusType::Spi => "spi",
        };
        f.write_str(name)
    }
}

/// One entry of a backend device listing, in native field order
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeviceRecord {
    /// Platform-specific device path
    pub path: String,
    pub vendor_id: u16,
    pub product_id: u16,
    pub serial_number: String,
    /// Device release number in binary-coded decimal
    pub release_number: u16,
    pub manufacturer_string: String,
    pub product_string: String,
    pub usage_page: u16,
    pub usage: u16,
    /// USB interface number, or -1 when not applicable
    pub interface_number: i32,
    pub bus_type: BusType,
}

impl DeviceRecord {
    /// Whether this record passes a vendor/product filter (0 matches anything)
    pub fn matches(&self, vendor_id: u16, product_id: u16) -> bool {
        (vendor_id == 0 || self.vendor_id == vendor_id)
            && (product_id == 0 || self.product_id == product_id)
    }
}

/// Metadata a transport reports for an opened handle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionRecord {
    pub config_number: i32,
    pub interface: i32,
    pub report_descriptor_size: u16,
    /// Interrupt IN endpoint address, -1 if absent
    pub input_endpoint: i32,
    /// Interrupt OUT endpoint address, -1 if absent
    pub output_endpoint: i32,
    pub input_ep_max_packet_size: i32,
    /// String descriptor indices, 0 if absent
    pub manufacturer_index: i32,
    pub product_index: i32,
    pub serial_index: i32,
}

impl SessionRecord {
    /// Encoded size in bytes
    pub const ENCODED_LEN: usize = 8 * 4 + 2;

    pub fn has_output_endpoint(&self) -> bool {
        self.output_endpoint >= 0
    }
}

impl Default for SessionRecord {
    fn default() -> Self {
        Self {
            config_number: 1,
            interface: 0,
            report_descriptor_size: 0,
            input_endpoint: -1,
            output_endpoint: -1,
            input_ep_max_packet_size: 64,
            manufacturer_index: 0,
            product_index: 0,
            serial_index: 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bus_type_raw_values() {
        assert_eq!(BusType::Usb.as_raw(), 1);
        assert_eq!(BusType::Spi.as_raw(), 4);
        assert_eq!(BusType::from_raw(2), BusType::Bluetooth);
        assert_eq!(BusType::from_raw(0x42), BusType::Unknown);
    }

    #[test]
    fn test_record_filter() {
        let record = DeviceRecord {
            vendor_id: 0x1234,
            product_id: 0x5678,
            ..Default::default()
        };
        assert!(record.matches(0, 0));
        assert!(record.matches(0x1234, 0));
        assert!(record.matches(0, 0x5678));
        assert!(record.matches(0x1234, 0x5678));
        assert!(!record.matches(0x1234, 0x0001));
        assert!(!record.matches(0x4321, 0));
    }

    #[test]
    fn test_session_record_defaults() {
        let record = SessionRecord::default();
        assert!(!record.has_output_endpoint());
        assert_eq!(record.input_ep_max_packet_size, 64);
    }
}
