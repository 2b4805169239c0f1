//! Re-entrant mutual-exclusion lock.
//!
//! Records the owning thread and a recursion depth so the owner can pass
//! through again without deadlocking. The alarm service holds one of these
//! per alarm for the duration of each callback invocation; re-entrancy is
//! what makes it legal for a callback to cancel (or free) its own alarm,
//! while a canceling caller on another thread blocks here until the
//! in-flight callback returns.

use std::marker::PhantomData;
use std::sync::{Condvar, Mutex, PoisonError};
use std::thread::{self, ThreadId};

#[derive(Debug, Default)]
struct OwnerState {
    owner: Option<ThreadId>,
    depth: usize,
}

/// A mutex that the owning thread may re-acquire.
#[derive(Debug, Default)]
pub struct RecursiveMutex {
    state: Mutex<OwnerState>,
    condvar: Condvar,
}

/// RAII guard for [`RecursiveMutex`]; releases one level of recursion on
/// drop.
///
/// The guard must be released on the thread that acquired it, so it is
/// deliberately `!Send`.
#[must_use = "the lock is released as soon as the guard is dropped"]
pub struct RecursiveMutexGuard<'a> {
    lock: &'a RecursiveMutex,
    // Ownership is tracked by thread id; sending the guard elsewhere would
    // let a foreign thread release it.
    _not_send: PhantomData<*const ()>,
}

impl RecursiveMutex {
    /// Create an unlocked mutex.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Acquire the lock, blocking while another thread owns it.
    ///
    /// The calling thread passes through immediately if it already owns the
    /// lock; each acquisition must be matched by dropping its guard.
    pub fn lock(&self) -> RecursiveMutexGuard<'_> {
        let me = thread::current().id();
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        if state.owner == Some(me) {
            state.depth += 1;
        } else {
            while state.owner.is_some() {
                state = self
                    .condvar
                    .wait(state)
                    .unwrap_or_else(PoisonError::into_inner);
            }
            state.owner = Some(me);
            state.depth = 1;
        }
        RecursiveMutexGuard {
            lock: self,
            _not_send: PhantomData,
        }
    }

    /// Whether the calling thread currently owns the lock.
    #[must_use]
    pub fn held_by_current_thread(&self) -> bool {
        let state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        state.owner == Some(thread::current().id())
    }
}

impl Drop for RecursiveMutexGuard<'_> {
    fn drop(&mut self) {
        let mut state = self
            .lock
            .state
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        debug_assert_eq!(state.owner, Some(thread::current().id()));
        state.depth -= 1;
        if state.depth == 0 {
            state.owner = None;
            drop(state);
            self.lock.condvar.notify_one();
        }
    }
}
