//! libusb backend
//!
//! Talks to USB HID interfaces directly through `rusb`. Every interface with
//! class code 0x03 on the active configuration is listed as a separate device,
//! with a path of the form `bus-port.port…:config.interface`.
//!
//! Input reports are read from the interface's interrupt IN endpoint. Output
//! reports use the interrupt OUT endpoint when there is one and a control
//! SET_REPORT otherwise. Feature and input reports travel over the control
//! channel as class-specific GET/SET_REPORT requests.

use crate::backend::{Backend, ReportType, Submit, Transport};
use crate::error::{HidError, Result};
use common::BackendSettings;
use records::{BusType, DeviceRecord, SessionRecord};
use rusb::{
    Context, Device, DeviceDescriptor, DeviceHandle, Direction, Recipient, RequestType,
    TransferType, UsbContext,
};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tracing::{debug, trace, warn};

const HID_CLASS: u8 = 0x03;

const HID_GET_REPORT: u8 = 0x01;
const HID_SET_REPORT: u8 = 0x09;
const GET_DESCRIPTOR: u8 = 0x06;
const REPORT_DESCRIPTOR_TYPE: u16 = 0x22;

/// Largest report descriptor fetched (HID_API_MAX_REPORT_DESCRIPTOR_SIZE)
pub const MAX_REPORT_DESCRIPTOR_SIZE: usize = 4096;

/// Timeout for descriptor and string reads
const DESCRIPTOR_TIMEOUT: Duration = Duration::from_millis(1000);

/// Backend over a private libusb context
pub struct LibUsbBackend {
    context: Context,
}

impl LibUsbBackend {
    pub fn new() -> Result<Self> {
        let context = Context::new().map_err(map_rusb_error)?;
        Ok(Self { context })
    }
}

/// Interrupt endpoints of one HID interface (alternate setting 0)
#[derive(Debug, Clone, Copy)]
struct HidInterface {
    config_number: u8,
    interface_number: u8,
    /// Address and max packet size
    input_endpoint: Option<(u8, u16)>,
    output_endpoint: Option<u8>,
}

fn hid_interfaces(device: &Device<Context>) -> Vec<HidInterface> {
    let config = match device
        .active_config_descriptor()
        .or_else(|_| device.config_descriptor(0))
    {
        Ok(config) => config,
        Err(e) => {
            trace!(
                "No config descriptor for bus={} addr={}: {}",
                device.bus_number(),
                device.address(),
                e
            );
            return Vec::new();
        }
    };

    let mut found = Vec::new();
    for interface in config.interfaces() {
        let Some(setting) = interface.descriptors().next() else {
            continue;
        };
        if setting.class_code() != HID_CLASS {
            continue;
        }

        let mut hid = HidInterface {
            config_number: config.number(),
            interface_number: setting.interface_number(),
            input_endpoint: None,
            output_endpoint: None,
        };
        for endpoint in setting.endpoint_descriptors() {
            if endpoint.transfer_type() != TransferType::Interrupt {
                continue;
            }
            match endpoint.direction() {
                Direction::In if hid.input_endpoint.is_none() => {
                    hid.input_endpoint = Some((endpoint.address(), endpoint.max_packet_size()));
                }
                Direction::Out if hid.output_endpoint.is_none() => {
                    hid.output_endpoint = Some(endpoint.address());
                }
                _ => {}
            }
        }
        found.push(hid);
    }
    found
}

/// Format an interface path from its bus topology
pub fn format_path(bus: u8, ports: &[u8], config_number: u8, interface_number: u8) -> String {
    let ports = ports
        .iter()
        .map(|p| p.to_string())
        .collect::<Vec<_>>()
        .join(".");
    format!("{}-{}:{}.{}", bus, ports, config_number, interface_number)
}

fn device_path(device: &Device<Context>, interface: &HidInterface) -> String {
    let ports = device
        .port_numbers()
        .ok()
        .filter(|ports| !ports.is_empty())
        .unwrap_or_else(|| vec![device.address()]);
    format_path(
        device.bus_number(),
        &ports,
        interface.config_number,
        interface.interface_number,
    )
}

/// Re-encode a decoded `bcdDevice` as the raw BCD value
fn release_number(version: rusb::Version) -> u16 {
    let major = version.major() as u16;
    ((major / 10) << 12) | ((major % 10) << 8) | ((version.minor() as u16) << 4)
        | version.sub_minor() as u16
}

fn read_string(handle: &DeviceHandle<Context>, index: u8) -> rusb::Result<String> {
    let languages = handle.read_languages(DESCRIPTOR_TIMEOUT)?;
    match languages.first() {
        Some(language) => handle.read_string_descriptor(*language, index, DESCRIPTOR_TIMEOUT),
        None => handle.read_string_descriptor_ascii(index),
    }
}

fn read_optional_string(handle: Option<&DeviceHandle<Context>>, index: Option<u8>) -> String {
    match (handle, index) {
        (Some(handle), Some(index)) => read_string(handle, index).unwrap_or_else(|e| {
            trace!("Could not read string descriptor {}: {}", index, e);
            String::new()
        }),
        _ => String::new(),
    }
}

fn fetch_report_descriptor(
    handle: &DeviceHandle<Context>,
    interface_number: u8,
    buf: &mut [u8],
) -> rusb::Result<usize> {
    handle.read_control(
        rusb::request_type(Direction::In, RequestType::Standard, Recipient::Interface),
        GET_DESCRIPTOR,
        REPORT_DESCRIPTOR_TYPE << 8,
        interface_number as u16,
        buf,
        DESCRIPTOR_TIMEOUT,
    )
}

/// First Usage Page and Usage declared by a report descriptor
///
/// Returns zero for whichever item is missing.
pub fn parse_usage(descriptor: &[u8]) -> (u16, u16) {
    let mut usage_page = None;
    let mut usage = None;
    let mut i = 0;

    while i < descriptor.len() {
        let key = descriptor[i];

        // Long items: [0xFE][size][tag][data...]
        if key & 0xf0 == 0xf0 {
            let data_len = descriptor.get(i + 1).copied().unwrap_or(0) as usize;
            i += data_len + 3;
            continue;
        }

        let data_len = match key & 0x03 {
            3 => 4,
            n => n as usize,
        };
        let item = key & 0xfc;
        if item == 0x04 || item == 0x08 {
            let Some(bytes) = descriptor.get(i + 1..i + 1 + data_len) else {
                break;
            };
            let value = bytes
                .iter()
                .rev()
                .fold(0u32, |acc, b| (acc << 8) | *b as u32) as u16;
            if item == 0x04 {
                usage_page.get_or_insert(value);
            } else {
                usage.get_or_insert(value);
            }
            if usage_page.is_some() && usage.is_some() {
                break;
            }
        }
        i += data_len + 1;
    }

    (usage_page.unwrap_or(0), usage.unwrap_or(0))
}

fn build_record(
    device: &Device<Context>,
    descriptor: &DeviceDescriptor,
    interface: &HidInterface,
    handle: Option<&DeviceHandle<Context>>,
) -> DeviceRecord {
    let (usage_page, usage) = handle
        .and_then(|handle| {
            let mut buf = vec![0u8; MAX_REPORT_DESCRIPTOR_SIZE];
            fetch_report_descriptor(handle, interface.interface_number, &mut buf)
                .ok()
                .map(|len| parse_usage(&buf[..len]))
        })
        .unwrap_or((0, 0));

    DeviceRecord {
        path: device_path(device, interface),
        vendor_id: descriptor.vendor_id(),
        product_id: descriptor.product_id(),
        serial_number: read_optional_string(handle, descriptor.serial_number_string_index()),
        release_number: release_number(descriptor.device_version()),
        manufacturer_string: read_optional_string(handle, descriptor.manufacturer_string_index()),
        product_string: read_optional_string(handle, descriptor.product_string_index()),
        usage_page,
        usage,
        interface_number: interface.interface_number as i32,
        bus_type: BusType::Usb,
    }
}

impl Backend for LibUsbBackend {
    fn name(&self) -> &'static str {
        "libusb"
    }

    fn device_listing(&self, vendor_id: u16, product_id: u16) -> Result<Vec<DeviceRecord>> {
        // The native list is released when `devices` goes out of scope, after
        // every entry has been copied into an owned record.
        let devices = self.context.devices().map_err(map_rusb_error)?;
        let mut listing = Vec::new();

        for device in devices.iter() {
            let Ok(descriptor) = device.device_descriptor() else {
                continue;
            };
            if (vendor_id != 0 && descriptor.vendor_id() != vendor_id)
                || (product_id != 0 && descriptor.product_id() != product_id)
            {
                continue;
            }

            let interfaces = hid_interfaces(&device);
            if interfaces.is_empty() {
                continue;
            }

            // Strings and report descriptors need an open handle; without
            // permission the device is still listed with empty strings.
            let handle = match device.open() {
                Ok(handle) => Some(handle),
                Err(e) => {
                    debug!(
                        "Cannot open {:04x}:{:04x} for strings: {}",
                        descriptor.vendor_id(),
                        descriptor.product_id(),
                        e
                    );
                    None
                }
            };

            for interface in &interfaces {
                listing.push(build_record(&device, &descriptor, interface, handle.as_ref()));
            }
        }

        debug!("libusb listing: {} HID interfaces", listing.len());
        Ok(listing)
    }

    fn open_path(&self, path: &str, settings: &BackendSettings) -> Result<Box<dyn Transport>> {
        let devices = self.context.devices().map_err(map_rusb_error)?;

        for device in devices.iter() {
            let Ok(descriptor) = device.device_descriptor() else {
                continue;
            };
            for interface in hid_interfaces(&device) {
                if device_path(&device, &interface) == path {
                    let transport = LibUsbTransport::open(&device, &descriptor, interface, settings)?;
                    return Ok(Box::new(transport));
                }
            }
        }

        Err(HidError::DeviceNotFound)
    }
}

struct LibUsbTransport {
    handle: DeviceHandle<Context>,
    interface_number: u8,
    input_endpoint: u8,
    output_endpoint: Option<u8>,
    kernel_driver_detached: bool,
    session: SessionRecord,
    record: DeviceRecord,
    cancelled: AtomicBool,
}

impl LibUsbTransport {
    fn open(
        device: &Device<Context>,
        descriptor: &DeviceDescriptor,
        interface: HidInterface,
        settings: &BackendSettings,
    ) -> Result<Self> {
        let Some((input_endpoint, max_packet_size)) = interface.input_endpoint else {
            return Err(HidError::transport(format!(
                "Interface {} has no interrupt IN endpoint",
                interface.interface_number
            )));
        };

        let handle = device.open().map_err(|e| {
            warn!("Failed to open device: {}", e);
            map_rusb_error(e)
        })?;
        let iface = interface.interface_number;

        let mut kernel_driver_detached = false;
        if settings.detach_kernel_driver {
            match handle.kernel_driver_active(iface) {
                Ok(true) => {
                    handle.detach_kernel_driver(iface).map_err(|e| {
                        warn!("Failed to detach kernel driver from interface {}: {}", iface, e);
                        map_rusb_error(e)
                    })?;
                    debug!("Detached kernel driver from interface {}", iface);
                    kernel_driver_detached = true;
                }
                Ok(false) => {}
                Err(e) => {
                    debug!(
                        "Could not check kernel driver status for interface {}: {}",
                        iface, e
                    );
                }
            }
        }

        if let Err(e) = handle.claim_interface(iface) {
            warn!("Failed to claim interface {}: {}", iface, e);
            if kernel_driver_detached {
                let _ = handle.attach_kernel_driver(iface);
            }
            return Err(map_rusb_error(e));
        }

        let mut scratch = vec![0u8; MAX_REPORT_DESCRIPTOR_SIZE];
        let report_descriptor_size = fetch_report_descriptor(&handle, iface, &mut scratch)
            .map(|len| len as u16)
            .unwrap_or(0);

        let session = SessionRecord {
            config_number: interface.config_number as i32,
            interface: iface as i32,
            report_descriptor_size,
            input_endpoint: input_endpoint as i32,
            output_endpoint: interface.output_endpoint.map_or(-1, |ep| ep as i32),
            input_ep_max_packet_size: max_packet_size as i32,
            manufacturer_index: descriptor.manufacturer_string_index().unwrap_or(0) as i32,
            product_index: descriptor.product_string_index().unwrap_or(0) as i32,
            serial_index: descriptor.serial_number_string_index().unwrap_or(0) as i32,
        };
        let record = build_record(device, descriptor, &interface, Some(&handle));

        debug!(
            "Claimed interface {} of {} (in={:#04x}, out={:?})",
            iface, record.path, input_endpoint, interface.output_endpoint
        );

        Ok(Self {
            handle,
            interface_number: iface,
            input_endpoint,
            output_endpoint: interface.output_endpoint,
            kernel_driver_detached,
            session,
            record,
            cancelled: AtomicBool::new(false),
        })
    }

    fn report_value(report_type: ReportType, report_id: u8) -> u16 {
        ((report_type as u16) << 8) | report_id as u16
    }
}

/// Split off a zero Report ID, which is never sent on the wire
fn strip_report_id(data: &[u8]) -> (&[u8], usize) {
    match data.first() {
        Some(0) => (&data[1..], 1),
        _ => (data, 0),
    }
}

impl Transport for LibUsbTransport {
    fn session_record(&self) -> SessionRecord {
        self.session
    }

    fn device_record(&self) -> DeviceRecord {
        self.record.clone()
    }

    fn submit(&self, buf: &mut [u8], timeout: Duration) -> Submit {
        // Synchronous libusb reads cannot be interrupted; the bounded timeout
        // caps how long a cancel can go unnoticed.
        if self.cancelled.swap(false, Ordering::AcqRel) {
            return Submit::Timeout;
        }

        match self.handle.read_interrupt(self.input_endpoint, buf, timeout) {
            Ok(len) => Submit::Report(len),
            Err(rusb::Error::Timeout) | Err(rusb::Error::Interrupted) => Submit::Timeout,
            Err(e) => Submit::Fail(map_rusb_error(e)),
        }
    }

    fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
    }

    fn write(&self, data: &[u8], timeout: Duration) -> Result<usize> {
        let Some(endpoint) = self.output_endpoint else {
            return self.set_report(ReportType::Output, data, timeout);
        };

        let (payload, skipped) = strip_report_id(data);
        self.handle
            .write_interrupt(endpoint, payload, timeout)
            .map(|len| len + skipped)
            .map_err(map_rusb_error)
    }

    fn set_report(&self, report_type: ReportType, data: &[u8], timeout: Duration) -> Result<usize> {
        let Some(&report_id) = data.first() else {
            return Err(HidError::BufferTooSmall {
                needed: 1,
                available: 0,
            });
        };
        let (payload, skipped) = strip_report_id(data);

        self.handle
            .write_control(
                rusb::request_type(Direction::Out, RequestType::Class, Recipient::Interface),
                HID_SET_REPORT,
                Self::report_value(report_type, report_id),
                self.interface_number as u16,
                payload,
                timeout,
            )
            .map(|len| len + skipped)
            .map_err(map_rusb_error)
    }

    fn get_report(
        &self,
        report_type: ReportType,
        buf: &mut [u8],
        timeout: Duration,
    ) -> Result<usize> {
        let Some(&report_id) = buf.first() else {
            return Err(HidError::BufferTooSmall {
                needed: 1,
                available: 0,
            });
        };

        // Unnumbered reports come back without an ID byte, so read past it.
        let (target, skipped) = if report_id == 0 {
            (&mut buf[1..], 1)
        } else {
            (&mut buf[..], 0)
        };

        self.handle
            .read_control(
                rusb::request_type(Direction::In, RequestType::Class, Recipient::Interface),
                HID_GET_REPORT,
                Self::report_value(report_type, report_id),
                self.interface_number as u16,
                target,
                timeout,
            )
            .map(|len| len + skipped)
            .map_err(map_rusb_error)
    }

    fn string_descriptor(&self, index: u8) -> Result<String> {
        read_string(&self.handle, index).map_err(map_rusb_error)
    }

    fn report_descriptor(&self, buf: &mut [u8]) -> Result<usize> {
        fetch_report_descriptor(&self.handle, self.interface_number, buf).map_err(map_rusb_error)
    }
}

impl Drop for LibUsbTransport {
    fn drop(&mut self) {
        if let Err(e) = self.handle.release_interface(self.interface_number) {
            warn!("Failed to release interface {}: {}", self.interface_number, e);
        }

        if self.kernel_driver_detached {
            match self.handle.attach_kernel_driver(self.interface_number) {
                Ok(()) => debug!(
                    "Reattached kernel driver to interface {}",
                    self.interface_number
                ),
                Err(e) => debug!(
                    "Could not reattach kernel driver to interface {}: {}",
                    self.interface_number, e
                ),
            }
        }
    }
}

/// Map rusb errors onto the session error taxonomy
pub fn map_rusb_error(err: rusb::Error) -> HidError {
    match err {
        rusb::Error::Timeout => HidError::Timeout,
        rusb::Error::NotFound => HidError::DeviceNotFound,
        _ => HidError::TransportFailure(err.to_string()),
    }
}
