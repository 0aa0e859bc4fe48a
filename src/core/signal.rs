//! Epoch-based wake signal shared by workers and queue policies.
//!
//! Workers record the epoch before scanning the queue and sleep until it
//! moves. Anything that might make a queued job admissible bumps the epoch,
//! so a notification that races with a scan is never lost. The signal mutex
//! is a leaf lock: no other lock is acquired while it is held, which lets
//! policies wake weavers from any context.

use parking_lot::{Condvar, Mutex};

#[derive(Debug, Default)]
pub(crate) struct Signal {
    epoch: Mutex<u64>,
    cond: Condvar,
}

impl Signal {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn epoch(&self) -> u64 {
        *self.epoch.lock()
    }

    pub(crate) fn notify(&self) {
        let mut epoch = self.epoch.lock();
        *epoch = epoch.wrapping_add(1);
        self.cond.notify_all();
    }

    /// Block until the epoch differs from `seen`.
    pub(crate) fn wait_past(&self, seen: u64) {
        let mut epoch = self.epoch.lock();
        while *epoch == seen {
            self.cond.wait(&mut epoch);
        }
    }
}
