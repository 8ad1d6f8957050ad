//! Library context
//!
//! [`HidContext`] replaces process-wide library state: it owns the backend,
//! the configuration, the table of open sessions and the context-wide last
//! error. Global operations (initialize, enumerate, open) record their
//! failures in the context error; per-session operations record theirs in the
//! session's own record.

use crate::backend::{Backend, LibUsbBackend};
use crate::enumerate::Enumerator;
use crate::error::{HidError, Result};
use crate::error_channel::ErrorRecord;
use crate::info::DeviceInfo;
use crate::queue::QueueStats;
use crate::registry::{Registry, SessionId};
use crate::session::Session;
use crate::sync::lock;
use common::HidConfig;
use records::{API_VERSION, ApiVersion};
use std::sync::{Arc, Mutex};
use tracing::{debug, info, warn};

pub struct HidContext {
    backend: Box<dyn Backend>,
    config: HidConfig,
    initialized: Mutex<bool>,
    sessions: Registry<Session>,
    last_error: ErrorRecord,
}

impl HidContext {
    /// Zero timeouts and capacities in `config` are raised to their minimum
    pub fn new(backend: impl Backend + 'static, config: HidConfig) -> Self {
        if let Err(e) = config.validate() {
            warn!("Configuration has out-of-range values: {:#}", e);
        }
        Self {
            backend: Box::new(backend),
            config,
            initialized: Mutex::new(false),
            sessions: Registry::new(),
            last_error: ErrorRecord::new(),
        }
    }

    /// Context over real USB hardware
    pub fn with_libusb(config: HidConfig) -> Result<Self> {
        Ok(Self::new(LibUsbBackend::new()?, config))
    }

    pub fn config(&self) -> &HidConfig {
        &self.config
    }

    pub fn backend_name(&self) -> &'static str {
        self.backend.name()
    }

    /// API level of this library
    pub fn version() -> ApiVersion {
        API_VERSION
    }

    /// API level formatted as `major.minor.patch`
    pub fn version_str() -> String {
        API_VERSION.to_string()
    }

    /// Prepare the backend; calling it again is a no-op
    pub fn initialize(&self) -> Result<()> {
        self.last_error.clear();
        let result = self.init_backend();
        self.last_error.record(result)
    }

    fn init_backend(&self) -> Result<()> {
        let mut initialized = lock(&self.initialized);
        if *initialized {
            return Ok(());
        }
        self.backend.init()?;
        *initialized = true;
        info!("HID context initialized ({} backend)", self.backend.name());
        Ok(())
    }

    pub fn is_initialized(&self) -> bool {
        *lock(&self.initialized)
    }

    /// Close every open session and release the backend
    pub fn exit(&self) -> Result<()> {
        self.last_error.clear();

        // Held until the registry is empty so no open can slip a session in.
        let mut initialized = lock(&self.initialized);
        let was_initialized = std::mem::replace(&mut *initialized, false);
        self.close_all();
        let result = if was_initialized {
            self.backend.exit()
        } else {
            Ok(())
        };
        drop(initialized);

        debug!("HID context exited");
        self.last_error.record(result)
    }

    fn close_all(&self) {
        for session in self.sessions.drain_all() {
            if let Err(e) = session.close() {
                debug!("Session {} already closed: {}", session.path(), e);
            }
        }
    }

    fn ensure_initialized(&self) -> Result<()> {
        if self.is_initialized() {
            return Ok(());
        }
        if self.config.backend.auto_initialize {
            self.init_backend()
        } else {
            Err(HidError::NotInitialized)
        }
    }

    /// HID interfaces matching the filters (0 matches any)
    pub fn enumerate(&self, vendor_id: u16, product_id: u16) -> Result<Vec<DeviceInfo>> {
        self.last_error.clear();
        let result = self
            .ensure_initialized()
            .and_then(|()| Enumerator::new(self.backend.as_ref()).enumerate(vendor_id, product_id));
        self.last_error.record(result)
    }

    /// Open the first device matching VID/PID and, when given, the serial
    pub fn open(
        &self,
        vendor_id: u16,
        product_id: u16,
        serial_number: Option<&str>,
    ) -> Result<SessionId> {
        self.last_error.clear();
        let result = self.ensure_initialized().and_then(|()| {
            let device = Enumerator::new(self.backend.as_ref()).find(
                vendor_id,
                product_id,
                serial_number,
            )?;
            self.open_session(&device.path)
        });
        self.last_error.record(result)
    }

    /// Open the device at a path returned by [`HidContext::enumerate`]
    pub fn open_path(&self, path: &str) -> Result<SessionId> {
        self.last_error.clear();
        let result = self
            .ensure_initialized()
            .and_then(|()| self.open_session(path));
        self.last_error.record(result)
    }

    fn open_session(&self, path: &str) -> Result<SessionId> {
        let transport = self.backend.open_path(path, &self.config.backend)?;
        let session = Session::start(transport, &self.config.session)?;

        let initialized = lock(&self.initialized);
        if !*initialized {
            drop(initialized);
            debug!("Context exited while opening {}", path);
            session.close()?;
            return Err(HidError::NotInitialized);
        }
        let id = self.sessions.insert(Arc::new(session));
        drop(initialized);

        info!("Opened {} as {}", path, id);
        Ok(id)
    }

    fn session(&self, id: SessionId) -> Result<Arc<Session>> {
        self.sessions.get(id).ok_or(HidError::HandleInvalid)
    }

    /// Close a session; its id is invalid afterwards
    pub fn close(&self, id: SessionId) -> Result<()> {
        let session = self.sessions.remove(id).ok_or(HidError::HandleInvalid)?;
        session.close()
    }

    pub fn read(&self, id: SessionId, length: usize) -> Result<Vec<u8>> {
        self.session(id)?.read(length)
    }

    /// Wait at most `milliseconds` for an input report (negative = forever)
    pub fn read_timeout(&self, id: SessionId, length: usize, milliseconds: i32) -> Result<Vec<u8>> {
        self.session(id)?.read_timeout(length, milliseconds)
    }

    pub fn set_nonblocking(&self, id: SessionId, nonblocking: bool) -> Result<()> {
        self.session(id)?.set_nonblocking(nonblocking)
    }

    pub fn write(&self, id: SessionId, data: &[u8]) -> Result<usize> {
        self.session(id)?.write(data)
    }

    pub fn send_feature_report(&self, id: SessionId, data: &[u8]) -> Result<usize> {
        self.session(id)?.send_feature_report(data)
    }

    pub fn send_output_report(&self, id: SessionId, data: &[u8]) -> Result<usize> {
        self.session(id)?.send_output_report(data)
    }

    pub fn get_feature_report(&self, id: SessionId, report_id: u8, length: usize) -> Result<Vec<u8>> {
        self.session(id)?.get_feature_report(report_id, length)
    }

    pub fn get_input_report(&self, id: SessionId, report_id: u8, length: usize) -> Result<Vec<u8>> {
        self.session(id)?.get_input_report(report_id, length)
    }

    pub fn get_manufacturer_string(&self, id: SessionId, max_len: usize) -> Result<String> {
        self.session(id)?.get_manufacturer_string(max_len)
    }

    pub fn get_product_string(&self, id: SessionId, max_len: usize) -> Result<String> {
        self.session(id)?.get_product_string(max_len)
    }

    pub fn get_serial_number_string(&self, id: SessionId, max_len: usize) -> Result<String> {
        self.session(id)?.get_serial_number_string(max_len)
    }

    pub fn get_indexed_string(&self, id: SessionId, index: u8, max_len: usize) -> Result<String> {
        self.session(id)?.get_indexed_string(index, max_len)
    }

    pub fn get_device_info(&self, id: SessionId) -> Result<DeviceInfo> {
        self.session(id)?.get_device_info()
    }

    pub fn get_report_descriptor(&self, id: SessionId, buf_size: usize) -> Result<Vec<u8>> {
        self.session(id)?.get_report_descriptor(buf_size)
    }

    pub fn queue_stats(&self, id: SessionId) -> Result<QueueStats> {
        Ok(self.session(id)?.queue_stats())
    }

    /// Last error of a session, or of the context for `None`
    ///
    /// Never fails: an unknown session yields the invalid-handle message.
    pub fn error(&self, id: Option<SessionId>) -> String {
        match id {
            None => self.last_error.message(),
            Some(id) => match self.sessions.get(id) {
                Some(session) => session.last_error(),
                None => HidError::HandleInvalid.to_string(),
            },
        }
    }

    pub fn open_sessions(&self) -> Vec<SessionId> {
        self.sessions.ids()
    }
}

impl Drop for HidContext {
    fn drop(&mut self) {
        let open = self.sessions.len();
        if open > 0 {
            warn!("Dropping HID context with {} open sessions", open);
        }
        self.close_all();
        if self.is_initialized()
            && let Err(e) = self.backend.exit()
        {
            debug!("Backend exit failed: {}", e);
        }
    }
}

impl std::fmt::Debug for HidContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HidContext")
            .field("backend", &self.backend.name())
            .field("initialized", &self.is_initialized())
            .field("sessions", &self.sessions.len())
            .finish()
    }
}
