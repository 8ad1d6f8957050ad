//! Synchronization primitives shared by sessions and their transfer loops

use std::sync::{
    Condvar, Mutex, MutexGuard, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard,
};

/// Lock a mutex, recovering the guard if a previous holder panicked
///
/// Every structure guarded in this crate stays consistent across a panic
/// (single push/pop operations), so the poison flag carries no information.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

pub(crate) fn read_lock<T>(lock: &RwLock<T>) -> RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(PoisonError::into_inner)
}

pub(crate) fn write_lock<T>(lock: &RwLock<T>) -> RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(PoisonError::into_inner)
}

/// Single-use rendezvous for a fixed number of parties
///
/// Each party calls [`StartupLatch::arrive_and_wait`]; all of them return once
/// the last one has arrived. Used with two parties to hold `open` until the
/// session's transfer loop is listening.
#[derive(Debug)]
pub struct StartupLatch {
    remaining: Mutex<usize>,
    released: Condvar,
}

impl StartupLatch {
    pub fn new(parties: usize) -> Self {
        Self {
            remaining: Mutex::new(parties),
            released: Condvar::new(),
        }
    }

    /// Count this party in and block until every party has arrived
    pub fn arrive_and_wait(&self) {
        let mut remaining = lock(&self.remaining);
        *remaining = remaining.saturating_sub(1);
        if *remaining == 0 {
            self.released.notify_all();
            return;
        }
        while *remaining > 0 {
            remaining = self
                .released
                .wait(remaining)
                .unwrap_or_else(PoisonError::into_inner);
        }
    }

    #[cfg(test)]
    fn is_released(&self) -> bool {
        *lock(&self.remaining) == 0
    }
}
