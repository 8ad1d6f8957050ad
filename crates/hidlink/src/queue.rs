//! Input report queue
//!
//! The queue is the only point of contact between a session's transfer loop
//! (sole producer) and application reads (any number of consumers). One mutex
//! guards the reports and the lifecycle flags; one condition variable wakes
//! consumers when a report arrives, when shutdown is requested and when the
//! loop stops.
//!
//! The queue is bounded. When it is full the oldest report is dropped so a
//! slow consumer sees the most recent device state instead of stale input.

use crate::sync::lock;
use std::collections::VecDeque;
use std::sync::{Condvar, Mutex, PoisonError};
use std::time::{Duration, Instant};
use tracing::{trace, warn};

/// Counters describing a queue's history
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QueueStats {
    /// Reports pushed by the transfer loop
    pub received: u64,
    /// Reports discarded because the queue was full
    pub dropped: u64,
    /// Reports currently waiting to be read
    pub queued: usize,
}

/// Outcome of waiting for a report
#[derive(Debug, PartialEq, Eq)]
pub(crate) enum Pop {
    Report(Vec<u8>),
    /// Nothing arrived before the deadline
    Empty,
    /// The session is closing
    Shutdown,
    /// The transfer loop stopped, with its failure if it had one
    Finished(Option<String>),
}

#[derive(Debug, Default)]
struct QueueState {
    reports: VecDeque<Vec<u8>>,
    shutdown: bool,
    loop_finished: bool,
    failure: Option<String>,
    received: u64,
    dropped: u64,
}

#[derive(Debug)]
pub struct ReportQueue {
    state: Mutex<QueueState>,
    available: Condvar,
    capacity: usize,
}

impl ReportQueue {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            state: Mutex::new(QueueState {
                reports: VecDeque::with_capacity(capacity),
                ..Default::default()
            }),
            available: Condvar::new(),
            capacity,
        }
    }

    /// Append a report at the tail and wake one waiting reader
    pub fn push(&self, report: Vec<u8>) {
        let mut state = lock(&self.state);
        state.received += 1;

        if state.reports.len() >= self.capacity {
            state.reports.pop_front();
            state.dropped += 1;
            warn!(
                "Input report queue full ({} reports), dropped oldest (total dropped: {})",
                self.capacity, state.dropped
            );
        }

        trace!(
            "Queued input report: len={}, queued={}",
            report.len(),
            state.reports.len() + 1
        );
        state.reports.push_back(report);
        self.available.notify_one();
    }

    /// Take the head report, waiting up to `timeout` (`None` waits forever)
    ///
    /// Queued reports are always handed out before shutdown or loop failure is
    /// reported. The deadline is absolute, so spurious wakeups never extend it.
    pub(crate) fn pop(&self, timeout: Option<Duration>) -> Pop {
        let deadline = timeout.map(|t| Instant::now() + t);
        let mut state = lock(&self.state);

        loop {
            if let Some(report) = state.reports.pop_front() {
                return Pop::Report(report);
            }
            if state.shutdown {
                return Pop::Shutdown;
            }
            if state.loop_finished {
                return Pop::Finished(state.failure.clone());
            }

            match deadline {
                None => {
                    state = self
                        .available
                        .wait(state)
                        .unwrap_or_else(PoisonError::into_inner);
                }
                Some(deadline) => {
                    let now = Instant::now();
                    if now >= deadline {
                        return Pop::Empty;
                    }
                    let (guard, _) = self
                        .available
                        .wait_timeout(state, deadline - now)
                        .unwrap_or_else(PoisonError::into_inner);
                    state = guard;
                }
            }
        }
    }

    /// Ask the producer to stop and release every waiting reader
    pub fn signal_shutdown(&self) {
        lock(&self.state).shutdown = true;
        self.available.notify_all();
    }

    pub fn is_shutdown(&self) -> bool {
        lock(&self.state).shutdown
    }

    /// Record that the producer has exited
    pub fn mark_finished(&self, failure: Option<String>) {
        let mut state = lock(&self.state);
        state.loop_finished = true;
        if failure.is_some() {
            state.failure = failure;
        }
        drop(state);
        self.available.notify_all();
    }

    #[cfg(test)]
    pub(crate) fn is_finished(&self) -> bool {
        lock(&self.state).loop_finished
    }

    /// Discard every queued report, returning how many were dropped
    pub fn drain(&self) -> usize {
        let mut state = lock(&self.state);
        let count = state.reports.len();
        state.reports.clear();
        state.reports.shrink_to_fit();
        count
    }

    pub fn len(&self) -> usize {
        lock(&self.state).reports.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn stats(&self) -> QueueStats {
        let state = lock(&self.state);
        QueueStats {
            received: state.received,
            dropped: state.dropped,
            queued: state.reports.len(),
        }
    }
}
