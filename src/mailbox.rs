//! Single-slot hand-off between the reader task and the control loop.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard};

/// Holds the latest value of one instruction category.
///
/// `store` overwrites whatever is there and marks it pending; `take` clears
/// the mark and returns a copy. Taking twice without a store in between
/// returns the same value both times, so freshness has to be checked with
/// [`is_pending`](Self::is_pending) first.
#[derive(Debug, Default)]
pub struct Mailbox<T> {
    slot: Mutex<T>,
    pending: AtomicBool,
}

impl<T: Clone> Mailbox<T> {
    pub fn new(initial: T) -> Self {
        Self {
            slot: Mutex::new(initial),
            pending: AtomicBool::new(false),
        }
    }

    pub fn store(&self, value: T) {
        let mut slot = self.lock();
        *slot = value;
        self.pending.store(true, Ordering::Release);
    }

    pub fn take(&self) -> T {
        let slot = self.lock();
        self.pending.store(false, Ordering::Release);
        slot.clone()
    }

    /// Lock-free freshness check.
    pub fn is_pending(&self) -> bool {
        self.pending.load(Ordering::Acquire)
    }

    // A panic while holding the slot cannot leave T half-written: the only
    // writes are whole-value assignments.
    fn lock(&self) -> MutexGuard<'_, T> {
        self.slot.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}
