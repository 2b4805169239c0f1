//! Worker thread hosting a reactor.
//!
//! Each [`WorkerThread`] owns one OS thread that runs a [`Reactor`] event
//! loop until stopped. The thread's kernel id is captured at startup so its
//! scheduling priority can be adjusted from outside (alarm callbacks back
//! audio and retransmission timers, so the service raises its workers to a
//! high priority).

use std::io;
use std::sync::mpsc;
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::{self, JoinHandle};

use crate::reactor::Reactor;

/// A named OS thread driving a reactor.
pub struct WorkerThread {
    name: String,
    reactor: Arc<Reactor>,
    tid: i64,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl WorkerThread {
    /// Spawn a worker thread. Blocks briefly until the thread has started
    /// and reported its kernel id.
    ///
    /// # Errors
    ///
    /// Returns the spawn error if the OS refuses a new thread.
    pub fn new(name: &str) -> io::Result<WorkerThread> {
        let reactor = Reactor::new();
        let (tid_tx, tid_rx) = mpsc::channel();
        let loop_reactor = Arc::clone(&reactor);
        let handle = thread::Builder::new()
            .name(name.to_owned())
            .spawn(move || {
                let _ = tid_tx.send(platform::current_tid());
                loop_reactor.run();
            })?;
        let tid = tid_rx.recv().unwrap_or(0);
        Ok(WorkerThread {
            name: name.to_owned(),
            reactor,
            tid,
            handle: Mutex::new(Some(handle)),
        })
    }

    /// The thread's name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The reactor this worker drives.
    #[must_use]
    pub fn reactor(&self) -> &Arc<Reactor> {
        &self.reactor
    }

    /// Adjust the worker's scheduling priority (a nice value; negative is
    /// higher priority). Best-effort: failure is logged, not returned,
    /// since raising priority typically needs elevated privileges.
    pub fn set_priority(&self, priority: i32) {
        if let Err(err) = platform::set_thread_priority(self.tid, priority) {
            log::debug!(
                "unable to set priority {priority} on worker `{}`: {err}",
                self.name
            );
        }
    }

    /// Stop the reactor and join the thread. Idempotent.
    pub fn stop(&self) {
        self.reactor.stop();
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

impl Drop for WorkerThread {
    fn drop(&mut self) {
        self.stop();
    }
}

impl std::fmt::Debug for WorkerThread {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkerThread")
            .field("name", &self.name)
            .field("tid", &self.tid)
            .finish_non_exhaustive()
    }
}

#[cfg(target_os = "linux")]
mod platform {
    use std::io;

    /// Kernel thread id of the calling thread.
    pub fn current_tid() -> i64 {
        // SAFETY: gettid has no preconditions and cannot fail.
        unsafe { libc::syscall(libc::SYS_gettid) }
    }

    /// Set the nice value of the thread with kernel id `tid`.
    #[expect(
        clippy::cast_possible_truncation,
        clippy::cast_sign_loss,
        reason = "kernel thread ids fit in id_t"
    )]
    pub fn set_thread_priority(tid: i64, priority: i32) -> io::Result<()> {
        // SAFETY: PRIO_PROCESS with a thread id adjusts a single thread.
        // The `which` parameter type differs between glibc and musl.
        let rc = unsafe { libc::setpriority(libc::PRIO_PROCESS as _, tid as libc::id_t, priority) };
        if rc == -1 {
            return Err(io::Error::last_os_error());
        }
        Ok(())
    }

    /// Set the nice value of the calling thread.
    pub fn set_current_thread_priority(priority: i32) -> io::Result<()> {
        set_thread_priority(current_tid(), priority)
    }
}

#[cfg(not(target_os = "linux"))]
mod platform {
    use std::io;

    pub fn current_tid() -> i64 {
        0
    }

    pub fn set_thread_priority(_tid: i64, _priority: i32) -> io::Result<()> {
        Err(io::Error::new(
            io::ErrorKind::Unsupported,
            "thread priority control is Linux-only",
        ))
    }

    pub fn set_current_thread_priority(_priority: i32) -> io::Result<()> {
        Err(io::Error::new(
            io::ErrorKind::Unsupported,
            "thread priority control is Linux-only",
        ))
    }
}

pub(crate) use platform::set_current_thread_priority;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queue::{register_dequeue, FixedQueue};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[test]
    fn spawns_and_stops() {
        let worker = WorkerThread::new("test_worker").expect("spawn failed");
        assert_eq!(worker.name(), "test_worker");
        worker.stop();
        worker.stop(); // idempotent
    }

    #[test]
    fn drives_a_registered_queue() {
        let worker = WorkerThread::new("test_queue_worker").expect("spawn failed");
        let queue: Arc<FixedQueue<u32>> = FixedQueue::unbounded();
        let sum = Arc::new(AtomicUsize::new(0));

        let sum2 = Arc::clone(&sum);
        register_dequeue(&queue, worker.reactor(), move |queue| {
            if let Some(item) = queue.try_dequeue() {
                sum2.fetch_add(item as usize, Ordering::SeqCst);
            }
        });

        queue.enqueue(5);
        queue.enqueue(7);
        while sum.load(Ordering::SeqCst) < 12 {
            thread::sleep(Duration::from_millis(1));
        }

        queue.unregister_dequeue();
        worker.stop();
        assert_eq!(sum.load(Ordering::SeqCst), 12);
    }

    #[test]
    fn set_priority_does_not_crash() {
        let worker = WorkerThread::new("test_prio_worker").expect("spawn failed");
        // Raising priority needs privileges; lowering may also be refused
        // in sandboxes. Either way this must only log.
        worker.set_priority(10);
        worker.stop();
    }
}
