//! Counting semaphore.
//!
//! Used as the expiration signal between the timers and the dispatcher
//! thread, and for the occupancy accounting of [`crate::queue::FixedQueue`].

use std::sync::{Condvar, Mutex, PoisonError};

/// A counting semaphore usable across threads.
#[derive(Debug)]
pub struct Semaphore {
    count: Mutex<usize>,
    condvar: Condvar,
}

impl Semaphore {
    /// Create a semaphore with the given initial count.
    #[must_use]
    pub fn new(initial_count: usize) -> Self {
        Self {
            count: Mutex::new(initial_count),
            condvar: Condvar::new(),
        }
    }

    /// Decrement the count, blocking while it is zero.
    pub fn wait(&self) {
        let mut count = self.count.lock().unwrap_or_else(PoisonError::into_inner);
        while *count == 0 {
            count = self
                .condvar
                .wait(count)
                .unwrap_or_else(PoisonError::into_inner);
        }
        *count -= 1;
    }

    /// Decrement the count without blocking.
    ///
    /// Returns `true` if the count was decremented, `false` if the
    /// semaphore would have blocked.
    pub fn try_wait(&self) -> bool {
        let mut count = self.count.lock().unwrap_or_else(PoisonError::into_inner);
        if *count > 0 {
            *count -= 1;
            true
        } else {
            false
        }
    }

    /// Increment the count and wake one waiting thread.
    pub fn post(&self) {
        let mut count = self.count.lock().unwrap_or_else(PoisonError::into_inner);
        // Saturating: queues with effectively unbounded capacity seed the
        // count near usize::MAX.
        *count = count.saturating_add(1);
        drop(count);
        self.condvar.notify_one();
    }

    /// Current count (a snapshot; may be stale by the time it is read).
    #[must_use]
    pub fn count(&self) -> usize {
        *self.count.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
