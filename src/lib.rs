//! Deferred-callback alarm service for suspend-prone hosts.
//!
//! `alarum` lets many callers schedule one-shot or periodic callbacks to
//! fire at a future time on the boot-relative monotonic clock, with the
//! guarantees a latency-sensitive stack needs on a device that aggressively
//! suspends:
//!
//! * alarms fire in deadline order, equal deadlines in schedule order;
//! * `cancel` returns only once no callback for the alarm is running
//!   anywhere, and a callback may cancel its own alarm;
//! * deadlines under a configurable threshold keep the system awake via a
//!   platform wake lock; deadlines beyond it are delegated to a platform
//!   wake alarm that can bring the system out of suspend (with an
//!   in-process fallback when no platform callouts are registered).
//!
//! # Architecture
//!
//! ```text
//! set/cancel ──► monitor ──► pending list (sorted by deadline)
//!                   │
//!                   ├──► wake policy ──► in-process timer + wake lock
//!                   │                └─► platform wake alarm
//!                   ▼
//!            expiration semaphore ──► dispatcher thread
//!                                         │ pops due alarms,
//!                                         │ re-anchors periodic ones
//!                                         ▼
//!                                   worker queue (FIFO)
//!                                         ▼
//!                              worker thread ──► user callback
//!                                     (under the alarm's callback lock)
//! ```
//!
//! # Example
//!
//! ```no_run
//! use alarum::Alarm;
//!
//! let alarm = Alarm::new("link_supervision")?;
//! alarm.set(100, || println!("supervision timeout"));
//! assert!(alarm.is_scheduled());
//! alarm.cancel(); // waits out an in-flight callback, if any
//! # Ok::<(), alarum::AlarmError>(())
//! ```
//!
//! The first alarm created in a process lazily brings up the shared
//! service (dispatcher, default worker thread and queue, timers);
//! [`cleanup`] tears it down again.

#![warn(missing_docs)]

pub mod alarm;
pub mod callout;
pub mod clock;
mod pending;
pub mod queue;
pub mod reactor;
pub mod remutex;
pub mod semaphore;
pub mod stats;
pub mod timer;
pub mod worker;

pub use alarm::{
    cleanup, register_processing_queue, set_wakelock_threshold_ms, unregister_processing_queue,
    wakelock_threshold_ms, Alarm, AlarmCallback, AlarmError,
};
pub use callout::{clear_os_callouts, set_os_callouts, CalloutError, OsCallouts, WakeAlarmFn};
pub use queue::FixedQueue;
pub use stats::{AlarmStats, StatWindow};
pub use worker::WorkerThread;
