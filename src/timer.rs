//! One-shot timer armed at an absolute boot-clock deadline.
//!
//! Mirrors the kernel timer semantics the wake policy relies on: arming at
//! an absolute `deadline_ms` (arming zero disarms), one-shot expiry that
//! disarms the timer and invokes a callback, and an armed-state readback
//! used to detect the deadline-already-passed race.
//!
//! The backing thread sleeps on a condvar and re-checks the boot clock on
//! every wakeup, so re-arming takes effect immediately. The sleep itself
//! pauses across suspend; deadlines far enough out to span a suspend are
//! the wake policy's responsibility, not this timer's.

use std::io;
use std::sync::{Arc, Condvar, Mutex, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crate::clock;

struct TimerInner {
    /// Absolute deadline on the boot clock; 0 means disarmed.
    deadline_ms: u64,
    running: bool,
}

struct TimerShared {
    inner: Mutex<TimerInner>,
    condvar: Condvar,
    on_expire: Box<dyn Fn() + Send + Sync>,
}

/// A one-shot absolute-deadline timer with its own backing thread.
pub struct WakeupTimer {
    shared: Arc<TimerShared>,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl WakeupTimer {
    /// Create a disarmed timer whose expirations invoke `on_expire` on the
    /// timer's own thread.
    ///
    /// # Errors
    ///
    /// Returns the spawn error if the OS refuses a new thread.
    pub fn new<F>(name: &str, on_expire: F) -> io::Result<WakeupTimer>
    where
        F: Fn() + Send + Sync + 'static,
    {
        let shared = Arc::new(TimerShared {
            inner: Mutex::new(TimerInner {
                deadline_ms: 0,
                running: true,
            }),
            condvar: Condvar::new(),
            on_expire: Box::new(on_expire),
        });
        let loop_shared = Arc::clone(&shared);
        let handle = thread::Builder::new()
            .name(name.to_owned())
            .spawn(move || timer_loop(&loop_shared))?;
        Ok(WakeupTimer {
            shared,
            handle: Mutex::new(Some(handle)),
        })
    }

    /// Arm the timer for the absolute boot-clock time `deadline_ms`,
    /// replacing any previous deadline. Arming zero disarms.
    ///
    /// A deadline at or before the current clock fires as soon as the
    /// timer thread runs; callers that need a guaranteed notification for
    /// an already-passed deadline should read the timer back with
    /// [`WakeupTimer::is_armed`] and signal directly if it has already
    /// fired.
    pub fn arm(&self, deadline_ms: u64) {
        let mut inner = self
            .shared
            .inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        inner.deadline_ms = deadline_ms;
        drop(inner);
        self.shared.condvar.notify_all();
    }

    /// Whether a deadline is currently armed. Reports `false` once the
    /// timer has fired (or was disarmed).
    #[must_use]
    pub fn is_armed(&self) -> bool {
        self.shared
            .inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .deadline_ms
            != 0
    }

    /// Disarm and join the backing thread. Idempotent.
    pub fn stop(&self) {
        {
            let mut inner = self
                .shared
                .inner
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            inner.running = false;
            inner.deadline_ms = 0;
        }
        self.shared.condvar.notify_all();
        let handle = self
            .handle
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(handle) = handle {
            let _ = handle.join();
        }
    }
}

impl Drop for WakeupTimer {
    fn drop(&mut self) {
        self.stop();
    }
}

impl std::fmt::Debug for WakeupTimer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WakeupTimer")
            .field("armed", &self.is_armed())
            .finish_non_exhaustive()
    }
}

fn timer_loop(shared: &TimerShared) {
    let mut inner = shared.inner.lock().unwrap_or_else(PoisonError::into_inner);
    loop {
        if !inner.running {
            return;
        }
        if inner.deadline_ms == 0 {
            inner = shared
                .condvar
                .wait(inner)
                .unwrap_or_else(PoisonError::into_inner);
            continue;
        }
        let now = clock::now_ms();
        if inner.deadline_ms <= now {
            // One-shot: disarm before invoking so a readback after expiry
            // observes the fired state.
            inner.deadline_ms = 0;
            drop(inner);
            (shared.on_expire)();
            inner = shared.inner.lock().unwrap_or_else(PoisonError::into_inner);
            continue;
        }
        let wait = Duration::from_millis(inner.deadline_ms - now);
        let (guard, _timeout) = shared
            .condvar
            .wait_timeout(inner, wait)
            .unwrap_or_else(PoisonError::into_inner);
        inner = guard;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Instant;

    fn counting_timer(name: &str) -> (WakeupTimer, Arc<AtomicUsize>) {
        let fired = Arc::new(AtomicUsize::new(0));
        let fired2 = Arc::clone(&fired);
        let timer = WakeupTimer::new(name, move || {
            fired2.fetch_add(1, Ordering::SeqCst);
        })
        .expect("spawn failed");
        (timer, fired)
    }

    #[test]
    fn fires_once_near_deadline() {
        let (timer, fired) = counting_timer("test_timer_fires");
        let start = Instant::now();
        timer.arm(clock::now_ms() + 50);

        while fired.load(Ordering::SeqCst) == 0 {
            assert!(start.elapsed() < Duration::from_secs(5), "timer never fired");
            thread::sleep(Duration::from_millis(1));
        }
        assert!(start.elapsed() >= Duration::from_millis(40));
        assert!(!timer.is_armed());

        thread::sleep(Duration::from_millis(30));
        assert_eq!(fired.load(Ordering::SeqCst), 1);
        timer.stop();
    }

    #[test]
    fn arming_zero_disarms() {
        let (timer, fired) = counting_timer("test_timer_disarm");
        timer.arm(clock::now_ms() + 200);
        assert!(timer.is_armed());
        timer.arm(0);
        assert!(!timer.is_armed());
        thread::sleep(Duration::from_millis(250));
        assert_eq!(fired.load(Ordering::SeqCst), 0);
        timer.stop();
    }

    #[test]
    fn rearm_replaces_deadline() {
        let (timer, fired) = counting_timer("test_timer_rearm");
        timer.arm(clock::now_ms() + 5_000);
        timer.arm(clock::now_ms() + 20);
        let start = Instant::now();
        while fired.load(Ordering::SeqCst) == 0 {
            assert!(start.elapsed() < Duration::from_secs(5), "timer never fired");
            thread::sleep(Duration::from_millis(1));
        }
        timer.stop();
    }

    #[test]
    fn past_deadline_fires_immediately() {
        let (timer, fired) = counting_timer("test_timer_past");
        timer.arm(clock::now_ms().saturating_sub(10).max(1));
        let start = Instant::now();
        while fired.load(Ordering::SeqCst) == 0 {
            assert!(start.elapsed() < Duration::from_secs(5), "timer never fired");
            thread::sleep(Duration::from_millis(1));
        }
        assert!(!timer.is_armed());
        timer.stop();
    }

    #[test]
    fn stop_is_idempotent() {
        let (timer, _fired) = counting_timer("test_timer_stop");
        timer.stop();
        timer.stop();
    }
}
