//! Device sessions
//!
//! A [`Session`] is one open HID interface: the transport handle, its
//! endpoint metadata, the input report queue fed by the session's transfer
//! loop, the blocking-mode flag and the session's last-error record.
//!
//! The lifecycle is `Opening → Open → Closing → Closed`. Direct operations
//! (writes, feature/input reports, strings, descriptors) hold a shared guard
//! on the lifecycle for their whole duration; `close` raises the closing flag,
//! which turns away new direct operations with `HandleInvalid`, then takes the
//! guard exclusively to enter `Closing`, so teardown waits for in-flight ones.
//! Reads only check the state on entry and then wait on the queue, which
//! `close` wakes.

use crate::backend::{ReportType, Transport};
use crate::error::{HidError, Result, require_report_id};
use crate::error_channel::ErrorRecord;
use crate::info::DeviceInfo;
use crate::queue::{Pop, QueueStats, ReportQueue};
use crate::sync::{StartupLatch, lock, read_lock, write_lock};
use crate::transfer::TransferLoop;
use common::SessionSettings;
use records::SessionRecord;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use std::thread::JoinHandle;
use std::time::Duration;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Opening,
    Open,
    Closing,
    Closed,
}

struct Lifecycle {
    state: SessionState,
    /// Released on close; `None` once the session is closed
    transport: Option<Arc<dyn Transport>>,
}

pub struct Session {
    info: DeviceInfo,
    record: SessionRecord,
    settings: SessionSettings,
    blocking: AtomicBool,
    closing: AtomicBool,
    lifecycle: RwLock<Lifecycle>,
    queue: Arc<ReportQueue>,
    errors: Arc<ErrorRecord>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

/// Convert a millisecond wait into a queue timeout (negative = forever)
fn read_wait(milliseconds: i32) -> Option<Duration> {
    u64::try_from(milliseconds).ok().map(Duration::from_millis)
}

/// Keep at most `max_len - 1` characters, leaving room for the terminator
fn truncate_string(value: &str, max_len: usize) -> Result<String> {
    if max_len == 0 {
        return Err(HidError::BufferTooSmall {
            needed: 1,
            available: 0,
        });
    }
    Ok(value.chars().take(max_len - 1).collect())
}

impl Session {
    /// Spawn the transfer loop and wait until it is running
    pub(crate) fn start(transport: Box<dyn Transport>, settings: &SessionSettings) -> Result<Self> {
        let transport: Arc<dyn Transport> = Arc::from(transport);
        let record = transport.session_record();
        let info = DeviceInfo::from(transport.device_record());

        let queue = Arc::new(ReportQueue::new(settings.queue_capacity));
        let errors = Arc::new(ErrorRecord::new());
        let latch = Arc::new(StartupLatch::new(2));

        let session = Self {
            info,
            record,
            settings: settings.clone(),
            blocking: AtomicBool::new(true),
            closing: AtomicBool::new(false),
            lifecycle: RwLock::new(Lifecycle {
                state: SessionState::Opening,
                transport: Some(Arc::clone(&transport)),
            }),
            queue: Arc::clone(&queue),
            errors: Arc::clone(&errors),
            worker: Mutex::new(None),
        };

        let transfer = TransferLoop {
            transport,
            queue,
            errors,
            latch: Arc::clone(&latch),
            poll_interval: settings.poll_interval(),
            packet_size: record.input_ep_max_packet_size,
        };
        let handle = transfer.spawn(format!("hid-rx {}", session.info.path))?;
        *lock(&session.worker) = Some(handle);

        latch.arrive_and_wait();
        write_lock(&session.lifecycle).state = SessionState::Open;

        debug!(
            "Session open on {} (in={:#04x}, out={}, packet size {})",
            session.info.path,
            record.input_endpoint,
            record.output_endpoint,
            record.input_ep_max_packet_size
        );
        Ok(session)
    }

    pub fn state(&self) -> SessionState {
        read_lock(&self.lifecycle).state
    }

    pub fn path(&self) -> &str {
        &self.info.path
    }

    pub fn session_record(&self) -> SessionRecord {
        self.record
    }

    /// Message of the last failed operation on this session
    pub fn last_error(&self) -> String {
        self.errors.message()
    }

    pub fn queue_stats(&self) -> QueueStats {
        self.queue.stats()
    }

    /// Run `op` against the transport while holding the lifecycle open
    fn direct<T>(&self, op: impl FnOnce(&dyn Transport) -> Result<T>) -> Result<T> {
        self.errors.clear();
        if self.closing.load(Ordering::Acquire) {
            return self.errors.record(Err(HidError::HandleInvalid));
        }

        let lifecycle = read_lock(&self.lifecycle);
        let result = match (&lifecycle.state, &lifecycle.transport) {
            (SessionState::Open, Some(transport)) => op(transport.as_ref()),
            _ => Err(HidError::HandleInvalid),
        };
        drop(lifecycle);
        self.errors.record(result)
    }

    fn ensure_open(&self) -> Result<()> {
        if self.closing.load(Ordering::Acquire) {
            return Err(HidError::HandleInvalid);
        }
        match read_lock(&self.lifecycle).state {
            SessionState::Open => Ok(()),
            _ => Err(HidError::HandleInvalid),
        }
    }

    fn read_report(&self, length: usize, wait: Option<Duration>) -> Result<Vec<u8>> {
        require_report_id(length)?;
        self.ensure_open()?;

        match self.queue.pop(wait) {
            Pop::Report(mut report) => {
                report.truncate(length);
                Ok(report)
            }
            Pop::Empty => Ok(Vec::new()),
            Pop::Shutdown => Err(HidError::HandleInvalid),
            Pop::Finished(reason) => Err(HidError::TransportFailure(
                reason.unwrap_or_else(|| "Transfer loop stopped".to_string()),
            )),
        }
    }

    /// Read the next input report, waiting only in blocking mode
    ///
    /// Returns an empty vector when non-blocking and nothing is queued.
    pub fn read(&self, length: usize) -> Result<Vec<u8>> {
        self.errors.clear();
        let wait = if self.blocking.load(Ordering::Acquire) {
            None
        } else {
            Some(Duration::ZERO)
        };
        let result = self.read_report(length, wait);
        self.errors.record(result)
    }

    /// Read the next input report, waiting at most `milliseconds`
    ///
    /// Negative waits forever and zero polls once. An expired wait returns an
    /// empty vector rather than an error.
    pub fn read_timeout(&self, length: usize, milliseconds: i32) -> Result<Vec<u8>> {
        self.errors.clear();
        let result = self.read_report(length, read_wait(milliseconds));
        self.errors.record(result)
    }

    pub fn set_nonblocking(&self, nonblocking: bool) -> Result<()> {
        self.errors.clear();
        let result = self.ensure_open().map(|()| {
            self.blocking.store(!nonblocking, Ordering::Release);
            debug!(
                "{}: {} reads",
                self.info.path,
                if nonblocking { "non-blocking" } else { "blocking" }
            );
        });
        self.errors.record(result)
    }

    /// Send an output report; `data[0]` is the Report ID
    pub fn write(&self, data: &[u8]) -> Result<usize> {
        let timeout = self.settings.write_timeout();
        self.direct(|transport| {
            require_report_id(data.len())?;
            transport.write(data, timeout)
        })
    }

    pub fn send_feature_report(&self, data: &[u8]) -> Result<usize> {
        self.set_report(ReportType::Feature, data)
    }

    pub fn send_output_report(&self, data: &[u8]) -> Result<usize> {
        self.set_report(ReportType::Output, data)
    }

    fn set_report(&self, report_type: ReportType, data: &[u8]) -> Result<usize> {
        let timeout = self.settings.control_timeout();
        self.direct(|transport| {
            require_report_id(data.len())?;
            transport.set_report(report_type, data, timeout)
        })
    }

    pub fn get_feature_report(&self, report_id: u8, length: usize) -> Result<Vec<u8>> {
        self.get_report(ReportType::Feature, report_id, length)
    }

    pub fn get_input_report(&self, report_id: u8, length: usize) -> Result<Vec<u8>> {
        self.get_report(ReportType::Input, report_id, length)
    }

    fn get_report(&self, report_type: ReportType, report_id: u8, length: usize) -> Result<Vec<u8>> {
        let timeout = self.settings.control_timeout();
        self.direct(|transport| {
            require_report_id(length)?;
            let mut buf = vec![0u8; length];
            buf[0] = report_id;
            let len = transport.get_report(report_type, &mut buf, timeout)?;
            buf.truncate(len);
            Ok(buf)
        })
    }

    /// Read a string descriptor, falling back to the enumerated value when
    /// the device declares no index for it
    fn descriptor_string(&self, index: i32, cached: &str, max_len: usize) -> Result<String> {
        self.direct(|transport| {
            let value = match u8::try_from(index) {
                Ok(index) if index > 0 => transport.string_descriptor(index)?,
                _ => cached.to_string(),
            };
            truncate_string(&value, max_len)
        })
    }

    pub fn get_manufacturer_string(&self, max_len: usize) -> Result<String> {
        self.descriptor_string(
            self.record.manufacturer_index,
            &self.info.manufacturer_string,
            max_len,
        )
    }

    pub fn get_product_string(&self, max_len: usize) -> Result<String> {
        self.descriptor_string(self.record.product_index, &self.info.product_string, max_len)
    }

    pub fn get_serial_number_string(&self, max_len: usize) -> Result<String> {
        self.descriptor_string(self.record.serial_index, &self.info.serial_number, max_len)
    }

    pub fn get_indexed_string(&self, index: u8, max_len: usize) -> Result<String> {
        self.direct(|transport| {
            let value = transport.string_descriptor(index)?;
            truncate_string(&value, max_len)
        })
    }

    pub fn get_device_info(&self) -> Result<DeviceInfo> {
        self.direct(|_| Ok(self.info.clone()))
    }

    /// Raw report descriptor, at most `buf_size` bytes
    pub fn get_report_descriptor(&self, buf_size: usize) -> Result<Vec<u8>> {
        self.direct(|transport| {
            require_report_id(buf_size)?;
            let mut buf = vec![0u8; buf_size];
            let len = transport.report_descriptor(&mut buf)?;
            buf.truncate(len);
            Ok(buf)
        })
    }

    /// Stop the transfer loop and release the transport
    ///
    /// Wakes every blocked reader, waits for in-flight direct operations and
    /// joins the loop thread. A second call fails with `HandleInvalid`.
    pub fn close(&self) -> Result<()> {
        if self.closing.swap(true, Ordering::AcqRel) {
            return Err(HidError::HandleInvalid);
        }

        let transport = {
            let mut lifecycle = write_lock(&self.lifecycle);
            if lifecycle.state != SessionState::Open {
                return Err(HidError::HandleInvalid);
            }
            lifecycle.state = SessionState::Closing;
            lifecycle.transport.clone()
        };

        self.queue.signal_shutdown();
        if let Some(transport) = &transport {
            transport.cancel();
        }

        if let Some(handle) = lock(&self.worker).take()
            && handle.join().is_err()
        {
            warn!("Transfer loop for {} panicked", self.info.path);
        }

        let discarded = self.queue.drain();
        let stats = self.queue.stats();
        {
            let mut lifecycle = write_lock(&self.lifecycle);
            lifecycle.state = SessionState::Closed;
            lifecycle.transport = None;
        }
        drop(transport);

        info!(
            "Closed session on {} ({} reports received, {} dropped, {} discarded)",
            self.info.path, stats.received, stats.dropped, discarded
        );
        Ok(())
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        if self.state() == SessionState::Open {
            let _ = self.close();
        }
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("path", &self.info.path)
            .field("state", &self.state())
            .field("queued", &self.queue.len())
            .finish()
    }
}
