//! Device enumeration

use crate::backend::Backend;
use crate::error::{HidError, Result};
use crate::info::DeviceInfo;
use std::collections::HashSet;
use tracing::debug;

/// Turns a backend listing into owned [`DeviceInfo`] values
pub struct Enumerator<'a> {
    backend: &'a dyn Backend,
}

impl<'a> Enumerator<'a> {
    pub fn new(backend: &'a dyn Backend) -> Self {
        Self { backend }
    }

    /// Every attached HID interface matching the filters (0 matches any)
    ///
    /// Devices come back in listing order, each path once. No match is an
    /// empty vector, not an error.
    pub fn enumerate(&self, vendor_id: u16, product_id: u16) -> Result<Vec<DeviceInfo>> {
        let listing = self.backend.device_listing(vendor_id, product_id)?;
        let total = listing.len();

        let mut seen = HashSet::with_capacity(total);
        let devices: Vec<DeviceInfo> = listing
            .into_iter()
            .filter(|record| record.matches(vendor_id, product_id))
            .filter(|record| seen.insert(record.path.clone()))
            .map(DeviceInfo::from)
            .collect();

        debug!(
            "Enumerated {} of {} {} devices (filter {:04x}:{:04x})",
            devices.len(),
            total,
            self.backend.name(),
            vendor_id,
            product_id
        );
        Ok(devices)
    }

    /// First device matching the filters and, when given, the serial number
    pub fn find(
        &self,
        vendor_id: u16,
        product_id: u16,
        serial_number: Option<&str>,
    ) -> Result<DeviceInfo> {
        self.enumerate(vendor_id, product_id)?
            .into_iter()
            .find(|device| serial_number.is_none_or(|serial| device.serial_number == serial))
            .ok_or(HidError::DeviceNotFound)
    }
}
