//! In-memory backend
//!
//! `MockBackend` serves scripted devices without touching real hardware. Tests
//! (and applications that want a virtual device) inject input reports, seed
//! feature/input reports, capture writes and force transport failures through
//! a [`MockDevice`] handle that stays usable while a session has the device open.
//!
//! Listings and session metadata cross the backend boundary in their fixed
//! wire layout, the same bytes a native helper would hand over.

use crate::backend::{Backend, ReportType, Submit, Transport};
use crate::error::{HidError, Result};
use crate::sync::lock;
use common::BackendSettings;
use records::{
    DeviceRecord, SessionRecord, decode_listing, decode_session_record, encode_listing,
    encode_session_record,
};
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};
use tracing::debug;

#[derive(Debug, Default)]
struct MockState {
    incoming: VecDeque<Vec<u8>>,
    failure: Option<String>,
    cancelled: bool,
    open: bool,
    echo_output: bool,
    writes: Vec<Vec<u8>>,
    feature_reports: HashMap<u8, Vec<u8>>,
    input_reports: HashMap<u8, Vec<u8>>,
    strings: HashMap<u8, String>,
    report_descriptor: Vec<u8>,
    session: SessionRecord,
    hold_writes: bool,
    held_writes: usize,
}

#[derive(Debug)]
struct MockDeviceInner {
    record: DeviceRecord,
    state: Mutex<MockState>,
    ready: Condvar,
}

/// Scriptable virtual HID device
#[derive(Debug, Clone)]
pub struct MockDevice {
    inner: Arc<MockDeviceInner>,
}

impl MockDevice {
    /// Create a device with interrupt IN 0x81 / OUT 0x01 endpoints
    ///
    /// String indices 1, 2 and 3 resolve to the record's manufacturer, product
    /// and serial strings.
    pub fn new(record: DeviceRecord) -> Self {
        let mut strings = HashMap::new();
        strings.insert(1, record.manufacturer_string.clone());
        strings.insert(2, record.product_string.clone());
        strings.insert(3, record.serial_number.clone());

        let session = SessionRecord {
            config_number: 1,
            interface: record.interface_number.max(0),
            report_descriptor_size: 0,
            input_endpoint: 0x81,
            output_endpoint: 0x01,
            input_ep_max_packet_size: 64,
            manufacturer_index: 1,
            product_index: 2,
            serial_index: 3,
        };

        Self {
            inner: Arc::new(MockDeviceInner {
                record,
                state: Mutex::new(MockState {
                    strings,
                    session,
                    ..Default::default()
                }),
                ready: Condvar::new(),
            }),
        }
    }

    pub fn with_report_descriptor(self, descriptor: Vec<u8>) -> Self {
        {
            let mut state = lock(&self.inner.state);
            state.session.report_descriptor_size = descriptor.len().min(u16::MAX as usize) as u16;
            state.report_descriptor = descriptor;
        }
        self
    }

    /// Route writes through SET_REPORT(Output) as devices without an OUT
    /// endpoint do
    pub fn without_output_endpoint(self) -> Self {
        lock(&self.inner.state).session.output_endpoint = -1;
        self
    }

    pub fn with_max_packet_size(self, size: i32) -> Self {
        lock(&self.inner.state).session.input_ep_max_packet_size = size;
        self
    }

    pub fn with_string(self, index: u8, value: &str) -> Self {
        lock(&self.inner.state)
            .strings
            .insert(index, value.to_string());
        self
    }

    /// Loop output reports back: interrupt writes become input reports and
    /// SET_REPORT(Output) is answered by GET_REPORT(Input) with the same ID
    pub fn with_echo(self) -> Self {
        lock(&self.inner.state).echo_output = true;
        self
    }

    pub fn path(&self) -> &str {
        &self.inner.record.path
    }

    pub fn record(&self) -> &DeviceRecord {
        &self.inner.record
    }

    /// Deliver an input report as if it arrived on the interrupt IN endpoint
    pub fn inject_report(&self, report: Vec<u8>) {
        lock(&self.inner.state).incoming.push_back(report);
        self.inner.ready.notify_all();
    }

    /// Make the next submission fail, as an unplugged device would
    pub fn fail(&self, message: &str) {
        lock(&self.inner.state).failure = Some(message.to_string());
        self.inner.ready.notify_all();
    }

    pub fn set_feature_report(&self, report: Vec<u8>) {
        if let Some(&id) = report.first() {
            lock(&self.inner.state).feature_reports.insert(id, report);
        }
    }

    pub fn set_input_report(&self, report: Vec<u8>) {
        if let Some(&id) = report.first() {
            lock(&self.inner.state).input_reports.insert(id, report);
        }
    }

    /// Feature report last stored under `report_id`
    pub fn feature_report(&self, report_id: u8) -> Option<Vec<u8>> {
        lock(&self.inner.state)
            .feature_reports
            .get(&report_id)
            .cloned()
    }

    /// Every buffer written through the interrupt OUT path
    pub fn writes(&self) -> Vec<Vec<u8>> {
        lock(&self.inner.state).writes.clone()
    }

    /// Park every interrupt write and SET_REPORT until
    /// [`MockDevice::release_writes`], like a device that stops ACKing
    pub fn hold_writes(&self) {
        lock(&self.inner.state).hold_writes = true;
    }

    pub fn release_writes(&self) {
        lock(&self.inner.state).hold_writes = false;
        self.inner.ready.notify_all();
    }

    /// Writes currently parked by [`MockDevice::hold_writes`]
    pub fn held_writes(&self) -> usize {
        lock(&self.inner.state).held_writes
    }

    pub fn is_open(&self) -> bool {
        lock(&self.inner.state).open
    }
}

/// Backend serving [`MockDevice`]s in insertion order
#[derive(Debug, Clone, Default)]
pub struct MockBackend {
    devices: Arc<Mutex<Vec<MockDevice>>>,
    listing_failure: Arc<Mutex<Option<String>>>,
    listing_cutoff: Arc<Mutex<Option<usize>>>,
}

impl MockBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_device(&self, device: MockDevice) {
        lock(&self.devices).push(device);
    }

    /// Unplug a device from the listing; open sessions keep their handle
    pub fn remove_device(&self, path: &str) -> Option<MockDevice> {
        let mut devices = lock(&self.devices);
        let index = devices.iter().position(|d| d.path() == path)?;
        Some(devices.remove(index))
    }

    /// Make listings fail with `message` until cleared with `None`
    pub fn set_listing_failure(&self, message: Option<&str>) {
        *lock(&self.listing_failure) = message.map(str::to_string);
    }

    /// Cut encoded listings off after `len` bytes until cleared with `None`
    pub fn truncate_listing(&self, len: Option<usize>) {
        *lock(&self.listing_cutoff) = len;
    }
}

impl Backend for MockBackend {
    fn name(&self) -> &'static str {
        "mock"
    }

    fn device_listing(&self, vendor_id: u16, product_id: u16) -> Result<Vec<DeviceRecord>> {
        if let Some(message) = lock(&self.listing_failure).clone() {
            return Err(HidError::TransportFailure(message));
        }

        let matching: Vec<DeviceRecord> = lock(&self.devices)
            .iter()
            .map(|d| d.record())
            .filter(|r| r.matches(vendor_id, product_id))
            .cloned()
            .collect();

        let mut wire = encode_listing(&matching)?;
        if let Some(len) = *lock(&self.listing_cutoff) {
            wire.truncate(len);
        }
        Ok(decode_listing(&wire)?)
    }

    fn open_path(&self, path: &str, _settings: &BackendSettings) -> Result<Box<dyn Transport>> {
        let device = lock(&self.devices)
            .iter()
            .find(|d| d.path() == path)
            .cloned()
            .ok_or(HidError::DeviceNotFound)?;

        let session = {
            let mut state = lock(&device.inner.state);
            if state.open {
                return Err(HidError::transport(format!("Device {} is busy", path)));
            }

            let mut wire = Vec::with_capacity(SessionRecord::ENCODED_LEN);
            encode_session_record(&mut wire, &state.session)?;
            let session = decode_session_record(&mut wire.as_slice())?;

            state.open = true;
            state.cancelled = false;
            session
        };

        debug!("Opened mock device {}", path);
        Ok(Box::new(MockTransport { device, session }))
    }
}

struct MockTransport {
    device: MockDevice,
    session: SessionRecord,
}

impl MockTransport {
    fn state(&self) -> MutexGuard<'_, MockState> {
        lock(&self.device.inner.state)
    }

    /// Device state, once no write hold is in place
    fn write_state(&self) -> MutexGuard<'_, MockState> {
        let mut state = self.state();
        if state.hold_writes {
            state.held_writes += 1;
            while state.hold_writes {
                state = self
                    .device
                    .inner
                    .ready
                    .wait(state)
                    .unwrap_or_else(PoisonError::into_inner);
            }
            state.held_writes -= 1;
        }
        state
    }
}

impl Transport for MockTransport {
    fn session_record(&self) -> SessionRecord {
        self.session
    }

    fn device_record(&self) -> DeviceRecord {
        self.device.record().clone()
    }

    fn submit(&self, buf: &mut [u8], timeout: Duration) -> Submit {
        let deadline = Instant::now() + timeout;
        let mut state = self.state();

        loop {
            if state.cancelled {
                state.cancelled = false;
                return Submit::Timeout;
            }
            if let Some(message) = state.failure.take() {
                return Submit::Fail(HidError::TransportFailure(message));
            }
            if let Some(report) = state.incoming.pop_front() {
                let len = report.len().min(buf.len());
                buf[..len].copy_from_slice(&report[..len]);
                return Submit::Report(len);
            }

            let now = Instant::now();
            if now >= deadline {
                return Submit::Timeout;
            }
            let (guard, _) = self
                .device
                .inner
                .ready
                .wait_timeout(state, deadline - now)
                .unwrap_or_else(PoisonError::into_inner);
            state = guard;
        }
    }

    fn cancel(&self) {
        self.state().cancelled = true;
        self.device.inner.ready.notify_all();
    }

    fn write(&self, data: &[u8], timeout: Duration) -> Result<usize> {
        let mut state = self.write_state();
        if self.session.output_endpoint < 0 {
            drop(state);
            return self.set_report(ReportType::Output, data, timeout);
        }

        state.writes.push(data.to_vec());
        if state.echo_output {
            state.incoming.push_back(data.to_vec());
            self.device.inner.ready.notify_all();
        }
        Ok(data.len())
    }

    fn set_report(
        &self,
        report_type: ReportType,
        data: &[u8],
        _timeout: Duration,
    ) -> Result<usize> {
        let Some(&report_id) = data.first() else {
            return Err(HidError::BufferTooSmall {
                needed: 1,
                available: 0,
            });
        };

        let mut state = self.write_state();
        match report_type {
            ReportType::Feature => {
                state.feature_reports.insert(report_id, data.to_vec());
            }
            ReportType::Output => {
                state.writes.push(data.to_vec());
                if state.echo_output {
                    state.input_reports.insert(report_id, data.to_vec());
                }
            }
            ReportType::Input => {
                return Err(HidError::transport("Input reports cannot be set"));
            }
        }
        Ok(data.len())
    }

    fn get_report(
        &self,
        report_type: ReportType,
        buf: &mut [u8],
        _timeout: Duration,
    ) -> Result<usize> {
        let Some(&report_id) = buf.first() else {
            return Err(HidError::BufferTooSmall {
                needed: 1,
                available: 0,
            });
        };

        let state = self.state();
        let stored = match report_type {
            ReportType::Feature => state.feature_reports.get(&report_id),
            ReportType::Input => state.input_reports.get(&report_id),
            ReportType::Output => None,
        }
        .ok_or_else(|| {
            HidError::transport(format!(
                "No {:?} report with ID {:#04x}",
                report_type, report_id
            ))
        })?;

        let len = stored.len().min(buf.len());
        buf[..len].copy_from_slice(&stored[..len]);
        buf[0] = report_id;
        Ok(len)
    }

    fn string_descriptor(&self, index: u8) -> Result<String> {
        self.state()
            .strings
            .get(&index)
            .cloned()
            .ok_or_else(|| HidError::transport(format!("No string descriptor at index {}", index)))
    }

    fn report_descriptor(&self, buf: &mut [u8]) -> Result<usize> {
        let state = self.state();
        let len = state.report_descriptor.len().min(buf.len());
        buf[..len].copy_from_slice(&state.report_descriptor[..len]);
        Ok(len)
    }
}

impl Drop for MockTransport {
    fn drop(&mut self) {
        self.state().open = false;
        debug!("Released mock device {}", self.device.path());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::test_utils::create_mock_device_record;

    #[test]
    fn test_listing_filters() {
        let backend = MockBackend::new();
        backend.add_device(MockDevice::new(create_mock_device_record(1, 0x1111, 0x0001)));
        backend.add_device(MockDevice::new(create_mock_device_record(2, 0x2222, 0x0002)));

        assert_eq!(backend.device_listing(0, 0).unwrap().len(), 2);
        assert_eq!(backend.device_listing(0x2222, 0).unwrap()[0].path, "mock-2:1.0");
        assert!(backend.device_listing(0x3333, 0).unwrap().is_empty());
    }

    #[test]
    fn test_truncated_listing_is_malformed() {
        let backend = MockBackend::new();
        backend.add_device(MockDevice::new(create_mock_device_record(1, 0x1111, 0x0001)));

        backend.truncate_listing(Some(10));
        let err = backend.device_listing(0, 0).unwrap_err();
        assert!(matches!(&err, HidError::TransportFailure(msg) if msg.starts_with("Malformed record")));

        // an empty listing is only its count prefix
        assert!(backend.device_listing(0x9999, 0).unwrap().is_empty());
        backend.truncate_listing(Some(2));
        assert!(backend.device_listing(0x9999, 0).is_err());

        backend.truncate_listing(None);
        assert_eq!(backend.device_listing(0, 0).unwrap().len(), 1);
    }

    #[test]
    fn test_session_record_survives_wire_layout() {
        let backend = MockBackend::new();
        let device = MockDevice::new(create_mock_device_record(1, 0x1111, 0x0001))
            .with_report_descriptor(vec![0x05, 0x01, 0x09, 0x06])
            .without_output_endpoint();
        backend.add_device(device.clone());

        let transport = backend
            .open_path(device.path(), &BackendSettings::default())
            .unwrap();
        let record = transport.session_record();
        assert_eq!(record.report_descriptor_size, 4);
        assert_eq!(record.output_endpoint, -1);
        assert_eq!(record.input_endpoint, 0x81);
        assert_eq!(record.serial_index, 3);
    }

    #[test]
    fn test_held_writes_wait_for_release() {
        let backend = MockBackend::new();
        let device = MockDevice::new(create_mock_device_record(1, 0x1111, 0x0001));
        backend.add_device(device.clone());
        let transport: Arc<dyn Transport> = Arc::from(
            backend
                .open_path(device.path(), &BackendSettings::default())
                .unwrap(),
        );

        device.hold_writes();
        let writer = {
            let transport = Arc::clone(&transport);
            std::thread::spawn(move || {
                transport.set_report(ReportType::Feature, &[0x02, 0x10], Duration::from_secs(1))
            })
        };
        while device.held_writes() == 0 {
            std::thread::sleep(Duration::from_millis(1));
        }
        assert_eq!(device.feature_report(0x02), None);

        device.release_writes();
        assert_eq!(writer.join().unwrap(), Ok(2));
        assert_eq!(device.held_writes(), 0);
        assert_eq!(device.feature_report(0x02), Some(vec![0x02, 0x10]));
    }

    #[test]
    fn test_open_is_exclusive() {
        let backend = MockBackend::new();
        let device = MockDevice::new(create_mock_device_record(1, 0x1111, 0x0001));
        backend.add_device(device.clone());
        let settings = BackendSettings::default();

        let transport = backend.open_path(device.path(), &settings).unwrap();
        assert!(device.is_open());
        assert!(backend.open_path(device.path(), &settings).is_err());

        drop(transport);
        assert!(!device.is_open());
        assert!(backend.open_path(device.path(), &settings).is_ok());
    }

    #[test]
    fn test_submit_delivers_injected_report() {
        let backend = MockBackend::new();
        let device = MockDevice::new(create_mock_device_record(1, 0x1111, 0x0001));
        backend.add_device(device.clone());
        let transport = backend
            .open_path(device.path(), &BackendSettings::default())
            .unwrap();

        let mut buf = [0u8; 8];
        assert_eq!(
            transport.submit(&mut buf, Duration::from_millis(5)),
            Submit::Timeout
        );

        device.inject_report(vec![1, 2, 3]);
        assert_eq!(
            transport.submit(&mut buf, Duration::from_millis(5)),
            Submit::Report(3)
        );
        assert_eq!(&buf[..3], &[1, 2, 3]);

        transport.cancel();
        device.inject_report(vec![4]);
        assert_eq!(transport.submit(&mut buf, Duration::from_secs(1)), Submit::Timeout);
    }

    #[test]
    fn test_get_report_keeps_report_id() {
        let backend = MockBackend::new();
        let device = MockDevice::new(create_mock_device_record(1, 0x1111, 0x0001));
        backend.add_device(device.clone());
        device.set_feature_report(vec![0x05, 0x10, 0x20]);
        let transport = backend
            .open_path(device.path(), &BackendSettings::default())
            .unwrap();

        let mut buf = [0x05, 0, 0, 0, 0];
        let n = transport
            .get_report(ReportType::Feature, &mut buf, Duration::from_secs(1))
            .unwrap();
        assert_eq!(&buf[..n], &[0x05, 0x10, 0x20]);

        let mut missing = [0x06, 0];
        assert!(
            transport
                .get_report(ReportType::Feature, &mut missing, Duration::from_secs(1))
                .is_err()
        );
    }
}
