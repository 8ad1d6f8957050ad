//! Per-session transfer loop
//!
//! One dedicated thread per open session repeatedly submits bounded interrupt
//! IN reads and pushes completed reports into the session queue. The loop
//! rendezvouses with `open` on a [`StartupLatch`] before the first submit and
//! exits once the queue's shutdown flag is raised or the transport fails.

use crate::backend::{Submit, Transport};
use crate::error::{HidError, Result};
use crate::error_channel::ErrorRecord;
use crate::queue::ReportQueue;
use crate::sync::StartupLatch;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{debug, error, info, trace};

/// Used when the endpoint does not report a usable packet size
const FALLBACK_PACKET_SIZE: usize = 64;

/// Everything the loop thread shares with its session
pub(crate) struct TransferLoop {
    pub transport: Arc<dyn Transport>,
    pub queue: Arc<ReportQueue>,
    pub errors: Arc<ErrorRecord>,
    pub latch: Arc<StartupLatch>,
    pub poll_interval: Duration,
    pub packet_size: i32,
}

impl TransferLoop {
    /// Start the loop on its own named thread
    pub fn spawn(self, name: String) -> Result<JoinHandle<()>> {
        thread::Builder::new()
            .name(name)
            .spawn(move || self.run())
            .map_err(|e| HidError::transport(format!("Failed to spawn transfer loop: {}", e)))
    }

    fn run(self) {
        let packet_size = usize::try_from(self.packet_size)
            .ok()
            .filter(|size| *size > 0)
            .unwrap_or(FALLBACK_PACKET_SIZE);
        let mut buf = vec![0u8; packet_size];

        self.latch.arrive_and_wait();
        debug!("Transfer loop started (packet size {})", packet_size);

        loop {
            if self.queue.is_shutdown() {
                break;
            }

            match self.transport.submit(&mut buf, self.poll_interval) {
                Submit::Report(len) => {
                    trace!("Input report: {} bytes", len);
                    self.queue.push(buf[..len].to_vec());
                }
                Submit::Timeout => {}
                Submit::Fail(e) => {
                    error!("Transfer loop stopped: {}", e);
                    self.errors.set(&e);
                    let reason = match e {
                        HidError::TransportFailure(message) => message,
                        other => other.to_string(),
                    };
                    self.queue.mark_finished(Some(reason));
                    return;
                }
            }
        }

        self.queue.mark_finished(None);
        info!("Transfer loop stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::Backend;
    use crate::backend::mock::{MockBackend, MockDevice};
    use crate::queue::Pop;
    use common::BackendSettings;
    use common::test_utils::create_mock_device_record;

    fn start(device: &MockDevice) -> (Arc<ReportQueue>, Arc<ErrorRecord>, JoinHandle<()>) {
        let backend = MockBackend::new();
        backend.add_device(device.clone());
        let transport: Arc<dyn Transport> = Arc::from(
            backend
                .open_path(device.path(), &BackendSettings::default())
                .unwrap(),
        );

        let queue = Arc::new(ReportQueue::new(8));
        let errors = Arc::new(ErrorRecord::new());
        let latch = Arc::new(StartupLatch::new(2));
        let transfer = TransferLoop {
            transport,
            queue: Arc::clone(&queue),
            errors: Arc::clone(&errors),
            latch: Arc::clone(&latch),
            poll_interval: Duration::from_millis(10),
            packet_size: 0,
        };
        let handle = transfer.spawn("hid-test".to_string()).unwrap();
        latch.arrive_and_wait();
        (queue, errors, handle)
    }

    #[test]
    fn test_loop_queues_reports_in_order() {
        let device = MockDevice::new(create_mock_device_record(0, 0x1234, 0x0001));
        let (queue, _errors, handle) = start(&device);

        device.inject_report(vec![1]);
        device.inject_report(vec![2]);

        assert_eq!(queue.pop(Some(Duration::from_secs(2))), Pop::Report(vec![1]));
        assert_eq!(queue.pop(Some(Duration::from_secs(2))), Pop::Report(vec![2]));

        queue.signal_shutdown();
        handle.join().unwrap();
        assert!(queue.is_finished());
    }

    #[test]
    fn test_loop_records_failure() {
        let device = MockDevice::new(create_mock_device_record(0, 0x1234, 0x0001));
        let (queue, errors, handle) = start(&device);

        device.fail("pipe error");
        handle.join().unwrap();

        assert!(queue.is_finished());
        assert!(errors.message().contains("pipe error"));
        assert!(matches!(queue.pop(None), Pop::Finished(Some(msg)) if msg.contains("pipe error")));
    }
}
