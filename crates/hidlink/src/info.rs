//! Logical device descriptor

use records::{BusType, DeviceRecord};
use std::fmt;

/// Immutable snapshot of one HID interface, produced by enumeration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceInfo {
    /// Opaque platform path, accepted by `HidContext::open_path`
    pub path: String,
    pub vendor_id: u16,
    pub product_id: u16,
    pub serial_number: String,
    pub release_number: u16,
    pub manufacturer_string: String,
    pub product_string: String,
    pub usage_page: u16,
    pub usage: u16,
    /// USB interface number, -1 for non-USB buses
    pub interface_number: i32,
    pub bus_type: BusType,
}

impl From<DeviceRecord> for DeviceInfo {
    fn from(record: DeviceRecord) -> Self {
        Self {
            path: record.path,
            vendor_id: record.vendor_id,
            product_id: record.product_id,
            serial_number: record.serial_number,
            release_number: record.release_number,
            manufacturer_string: record.manufacturer_string,
            product_string: record.product_string,
            usage_page: record.usage_page,
            usage: record.usage,
            interface_number: record.interface_number,
            bus_type: record.bus_type,
        }
    }
}

impl From<&DeviceInfo> for DeviceRecord {
    fn from(info: &DeviceInfo) -> Self {
        Self {
            path: info.path.clone(),
            vendor_id: info.vendor_id,
            product_id: info.product_id,
            serial_number: info.serial_number.clone(),
            release_number: info.release_number,
            manufacturer_string: info.manufacturer_string.clone(),
            product_string: info.product_string.clone(),
            usage_page: info.usage_page,
            usage: info.usage,
            interface_number: info.interface_number,
            bus_type: info.bus_type,
        }
    }
}

impl fmt::Display for DeviceInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} - {:04X}:{:04X} - {} - {} ({})",
            self.path,
            self.vendor_id,
            self.product_id,
            self.manufacturer_string,
            self.product_string,
            self.serial_number
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_format() {
        let info = DeviceInfo::from(DeviceRecord {
            path: "1-2:1.0".to_string(),
            vendor_id: 0x046d,
            product_id: 0xc52b,
            serial_number: "0042".to_string(),
            manufacturer_string: "Logitech".to_string(),
            product_string: "Receiver".to_string(),
            ..Default::default()
        });
        assert_eq!(
            info.to_string(),
            "1-2:1.0 - 046D:C52B - Logitech - Receiver (0042)"
        );
    }

    #[test]
    fn test_record_conversion_keeps_fields() {
        let record = DeviceRecord {
            path: "bt-1".to_string(),
            usage_page: 0xff00,
            usage: 1,
            interface_number: -1,
            bus_type: BusType::Bluetooth,
            ..Default::default()
        };
        let info = DeviceInfo::from(record.clone());
        assert_eq!(DeviceRecord::from(&info), record);
    }
}
