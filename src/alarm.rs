//! Deferred-callback alarm service.
//!
//! Lets many callers schedule one-shot or periodic callbacks against the
//! boot-relative monotonic clock. The moving parts:
//!
//! * a deadline-ordered pending list of armed alarms, re-evaluated on every
//!   mutation;
//! * a dispatcher thread that waits on an expiration semaphore, pops due
//!   alarms, re-anchors periodic ones, and hands each to its worker queue;
//! * worker threads that drain their queues and invoke user callbacks
//!   under a per-alarm re-entrant lock, so `cancel` can wait out an
//!   in-flight callback without stalling unrelated alarms;
//! * a wake policy that arms a short-horizon in-process timer (holding a
//!   platform wake lock) or a long-horizon platform wake alarm, depending
//!   on how far out the earliest deadline is.
//!
//! # Locking
//!
//! One process-wide monitor serializes the pending list, all alarm
//! scheduling fields, and wake-policy re-arms. Each alarm additionally has
//! a re-entrant `callback_lock` held for the duration of its callback;
//! acquisition order is always monitor → callback_lock. The per-alarm
//! field mutexes (`sched`, `stats`) exist for Rust's aliasing rules and
//! are never held across a blocking call.

use std::io;
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::{self, JoinHandle};

use thiserror::Error;

use crate::callout::{self, WakeAlarmFn};
use crate::clock;
use crate::pending::PendingList;
use crate::queue::{self, FixedQueue};
use crate::remutex::RecursiveMutex;
use crate::semaphore::Semaphore;
use crate::stats::AlarmStats;
use crate::timer::WakeupTimer;
use crate::worker::{set_current_thread_priority, WorkerThread};

/// Wake-lock identifier handed to the platform callouts.
const WAKE_LOCK_ID: &str = "alarum_timer";

/// Nice value for the dispatcher and the default worker thread. Callbacks
/// back audio and retransmission timers, so assume latency-critical.
const CALLBACK_THREAD_PRIORITY_HIGH: i32 = -19;

/// If the next deadline is closer than this, hold a wake lock and use the
/// in-process timer instead of a platform wake alarm, so the system is not
/// bounced in and out of suspend. Writable so test suites can shrink it;
/// production code must not mutate it.
static TIMER_INTERVAL_FOR_WAKELOCK_IN_MS: AtomicI64 = AtomicI64::new(3000);

/// Whether the process-wide service is currently initialized. Mirror of
/// the `SERVICE` slot readable without a lock.
static SERVICE_UP: AtomicBool = AtomicBool::new(false);

static SERVICE: Mutex<Option<Arc<AlarmService>>> = Mutex::new(None);

/// Current wake-lock threshold in milliseconds.
#[must_use]
pub fn wakelock_threshold_ms() -> i64 {
    TIMER_INTERVAL_FOR_WAKELOCK_IN_MS.load(Ordering::Relaxed)
}

/// Override the wake-lock threshold. Intended for test suites only.
pub fn set_wakelock_threshold_ms(threshold_ms: i64) {
    TIMER_INTERVAL_FOR_WAKELOCK_IN_MS.store(threshold_ms, Ordering::Relaxed);
}

/// Failure while bringing up the process-wide alarm service.
#[derive(Debug, Error)]
pub enum AlarmError {
    /// Spawning one of the service threads failed.
    #[error("alarm service initialization failed: {0}")]
    Init(#[from] io::Error),
}

/// User callback invoked when an alarm fires. Captured state plays the
/// role of the context pointer in callback-style interfaces.
pub type AlarmCallback = Arc<dyn Fn() + Send + Sync + 'static>;

#[derive(Default)]
struct SchedState {
    /// Clock value captured at the most recent `set`; anchors periodic
    /// cadence.
    creation_time_ms: u64,
    /// User-supplied interval; for one-shot alarms, the delay from `set`.
    period_ms: u64,
    /// Absolute deadline of the next firing; 0 means not armed.
    deadline_ms: u64,
    /// Deadline of the firing currently being dispatched (periodic only);
    /// scheduling jitter is measured against this, not the re-anchored
    /// deadline.
    prev_deadline_ms: u64,
    /// Worker queue that will run the callback.
    queue: Option<Arc<FixedQueue<Alarm>>>,
    callback: Option<AlarmCallback>,
}

struct AlarmInner {
    name: Box<str>,
    is_periodic: bool,
    /// Held while this alarm's callback executes. Re-entrant so the
    /// callback itself may cancel or free the alarm; `cancel` from another
    /// thread blocks on it until the callback returns.
    callback_lock: RecursiveMutex,
    /// Lock-free mirror of `sched.callback.is_some()`, maintained under
    /// the monitor.
    armed: AtomicBool,
    /// Guarded by the monitor; the mutex only satisfies aliasing rules.
    sched: Mutex<SchedState>,
    stats: Mutex<AlarmStats>,
}

/// Handle to one alarm. Clones refer to the same alarm; identity is the
/// underlying allocation, not the name.
#[derive(Clone)]
pub struct Alarm {
    inner: Arc<AlarmInner>,
}

struct MonitorState {
    pending: PendingList,
    /// Whether the short-horizon in-process timer is armed (and therefore
    /// whether the wake lock is held).
    timer_set: bool,
}

struct AlarmService {
    monitor: Mutex<MonitorState>,
    /// Expiration signal: posted by both timers, the platform wake alarm,
    /// and the too-close self-heal; waited on by the dispatcher.
    expired: Arc<Semaphore>,
    /// Short-horizon in-process timer.
    timer: WakeupTimer,
    /// Long-horizon fallback used when no platform callouts are
    /// registered. Holds no wake lock.
    wake_timer: WakeupTimer,
    dispatcher_active: AtomicBool,
    dispatcher: Mutex<Option<JoinHandle<()>>>,
    default_worker: WorkerThread,
    default_queue: Arc<FixedQueue<Alarm>>,
}

fn service() -> Option<Arc<AlarmService>> {
    SERVICE
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .clone()
}

fn service_or_init() -> Result<Arc<AlarmService>, AlarmError> {
    let mut slot = SERVICE.lock().unwrap_or_else(PoisonError::into_inner);
    if let Some(svc) = slot.as_ref() {
        return Ok(Arc::clone(svc));
    }
    let svc = AlarmService::start()?;
    *slot = Some(Arc::clone(&svc));
    SERVICE_UP.store(true, Ordering::Release);
    Ok(svc)
}

fn expect_service() -> Arc<AlarmService> {
    service().expect("alarm service is not initialized (torn down by cleanup?)")
}

impl AlarmService {
    fn start() -> Result<Arc<AlarmService>, AlarmError> {
        let expired = Arc::new(Semaphore::new(0));

        let timer_expired = Arc::clone(&expired);
        let timer = WakeupTimer::new("alarm_timer", move || timer_expired.post())
            .inspect_err(|err| log::error!("unable to create alarm timer: {err}"))?;

        let wake_expired = Arc::clone(&expired);
        let wake_timer = WakeupTimer::new("alarm_wake_timer", move || wake_expired.post())
            .inspect_err(|err| log::error!("unable to create wake timer: {err}"))?;

        let default_worker = WorkerThread::new("alarm_default_callbacks")
            .inspect_err(|err| log::error!("unable to create default callback thread: {err}"))?;
        default_worker.set_priority(CALLBACK_THREAD_PRIORITY_HIGH);
        let default_queue = FixedQueue::unbounded();

        let svc = Arc::new(AlarmService {
            monitor: Mutex::new(MonitorState {
                pending: PendingList::new(),
                timer_set: false,
            }),
            expired,
            timer,
            wake_timer,
            dispatcher_active: AtomicBool::new(true),
            dispatcher: Mutex::new(None),
            default_worker,
            default_queue,
        });

        queue::register_dequeue(
            &svc.default_queue,
            svc.default_worker.reactor(),
            alarm_queue_ready,
        );

        let loop_svc = Arc::clone(&svc);
        let handle = thread::Builder::new()
            .name("alarm_dispatcher".to_owned())
            .spawn(move || {
                if let Err(err) = set_current_thread_priority(CALLBACK_THREAD_PRIORITY_HIGH) {
                    log::debug!("unable to raise dispatcher priority: {err}");
                }
                dispatch_loop(&loop_svc);
            })
            .inspect_err(|err| log::error!("unable to create dispatcher thread: {err}"))?;
        *svc.dispatcher.lock().unwrap_or_else(PoisonError::into_inner) = Some(handle);

        Ok(svc)
    }

    /// Remove `alarm` from the pending list and drain every copy of it
    /// from its worker queue. Caller must hold the monitor.
    fn remove_pending_locked(mon: &mut MonitorState, alarm: &Alarm) {
        mon.pending.remove(alarm);
        let queue = alarm
            .inner
            .sched
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .queue
            .clone();
        if let Some(queue) = queue {
            // There should be at most one copy; drain defensively.
            while queue.try_remove(|item| item.same(alarm)).is_some() {}
        }
    }

    /// Compute the next deadline for `alarm` and (re)insert it into the
    /// pending list, re-evaluating the wake policy if the earliest
    /// deadline changed. Caller must hold the monitor.
    fn schedule_next_instance(&self, mon: &mut MonitorState, alarm: &Alarm) {
        // If the alarm is armed and at the front, the earliest deadline is
        // about to change and the schedule must be re-evaluated either way.
        let was_front = mon
            .pending
            .front()
            .is_some_and(|(_, front)| front.same(alarm));
        let already_armed = alarm
            .inner
            .sched
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .callback
            .is_some();
        if already_armed {
            Self::remove_pending_locked(mon, alarm);
        }

        let deadline_ms = {
            let mut sched = alarm
                .inner
                .sched
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            let just_now = clock::now_ms();
            let mut ms_into_period = 0;
            if alarm.inner.is_periodic && sched.period_ms != 0 {
                // Anchor firings to creation_time + k * period so latency in
                // one callback does not push every later firing.
                ms_into_period = just_now.wrapping_sub(sched.creation_time_ms) % sched.period_ms;
            }
            sched.deadline_ms = just_now.wrapping_add(sched.period_ms - ms_into_period);
            sched.deadline_ms
        };

        mon.pending.insert(deadline_ms, alarm.clone());
        alarm.inner.armed.store(true, Ordering::Release);

        let is_front = mon
            .pending
            .front()
            .is_some_and(|(_, front)| front.same(alarm));
        if was_front || is_front {
            self.reschedule_root_alarm(mon);
        }
    }

    /// Re-evaluate the wake policy against the earliest pending deadline.
    /// Caller must hold the monitor.
    fn reschedule_root_alarm(&self, mon: &mut MonitorState) {
        let timer_was_set = mon.timer_set;

        // Deadlines to arm; zero disarms, like a zeroed timer spec.
        let mut timer_deadline_ms: u64 = 0;
        let mut wake_deadline_ms: u64 = 0;

        if let Some(&(next_deadline_ms, _)) = mon.pending.front() {
            #[expect(
                clippy::cast_possible_wrap,
                reason = "monotonic ms values fit in i64 for many centuries"
            )]
            let delta = next_deadline_ms as i64 - clock::now_ms() as i64;
            if delta < wakelock_threshold_ms() {
                let mut lock_held = true;
                if !mon.timer_set {
                    if let Some(callouts) = callout::current() {
                        if let Err(err) = callouts.acquire_wake_lock(WAKE_LOCK_ID) {
                            log::error!("unable to acquire wake lock: {err}");
                            lock_held = false;
                        }
                    }
                }
                if lock_held {
                    timer_deadline_ms = next_deadline_ms;
                }
            } else if let Some(callouts) = callout::current() {
                let expired = Arc::clone(&self.expired);
                let on_wake: WakeAlarmFn = Arc::new(move || expired.post());
                #[expect(
                    clippy::cast_sign_loss,
                    reason = "delta >= the (non-negative in this branch) threshold"
                )]
                if !callouts.set_wake_alarm(delta as u64, true, on_wake) {
                    log::error!("unable to set wake alarm for {delta}ms");
                }
            } else {
                // No platform alarm available: fall back to an in-process
                // timer with no wake lock. Fires late across a suspend.
                wake_deadline_ms = next_deadline_ms;
            }
        }

        mon.timer_set = timer_deadline_ms != 0;
        if timer_was_set && !mon.timer_set {
            if let Some(callouts) = callout::current() {
                if let Err(err) = callouts.release_wake_lock(WAKE_LOCK_ID) {
                    log::warn!("unable to release wake lock: {err}");
                }
            }
        }

        self.wake_timer.arm(wake_deadline_ms);
        self.timer.arm(timer_deadline_ms);

        // A deadline that elapsed between the computation above and the arm
        // call can leave the timer fired-and-disarmed with no notification
        // pending for it. Read the timer back and post the expiration
        // directly in that case. If the timer actually fired normally this
        // signals twice for one alarm, which is harmless: the dispatcher
        // re-validates the front of the pending list before dispatching.
        if mon.timer_set && !self.timer.is_armed() {
            log::debug!("alarm expiration too close, posting expiration directly");
            self.expired.post();
        }
    }

    /// Cancel `alarm` under the monitor: un-schedule it, clear its
    /// callback state, and re-evaluate the wake policy if it was the
    /// earliest pending alarm.
    fn cancel_locked(&self, mon: &mut MonitorState, alarm: &Alarm) {
        let was_front = mon
            .pending
            .front()
            .is_some_and(|(_, front)| front.same(alarm));

        Self::remove_pending_locked(mon, alarm);

        {
            let mut sched = alarm
                .inner
                .sched
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            sched.deadline_ms = 0;
            sched.prev_deadline_ms = 0;
            sched.callback = None;
            sched.queue = None;
        }
        alarm.inner.armed.store(false, Ordering::Release);
        alarm
            .inner
            .stats
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .canceled_count += 1;

        if was_front {
            self.reschedule_root_alarm(mon);
        }
    }
}

/// Dispatcher loop: detect expirations and hand due alarms to their worker
/// queues.
fn dispatch_loop(svc: &Arc<AlarmService>) {
    loop {
        svc.expired.wait();
        if !svc.dispatcher_active.load(Ordering::Acquire) {
            break;
        }

        let mut mon = svc.monitor.lock().unwrap_or_else(PoisonError::into_inner);

        // The alarm may have been canceled (or re-armed further out)
        // between the expiration post and now. Nothing to do unless the
        // front of the list is actually due.
        let now_ms = clock::now_ms();
        let due = match mon.pending.front() {
            Some(&(deadline_ms, ref front)) if deadline_ms <= now_ms => Some(front.clone()),
            _ => None,
        };
        let Some(alarm) = due else {
            svc.reschedule_root_alarm(&mut mon);
            continue;
        };
        mon.pending.remove(&alarm);

        if alarm.inner.is_periodic {
            {
                let mut sched = alarm
                    .inner
                    .sched
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner);
                sched.prev_deadline_ms = sched.deadline_ms;
            }
            svc.schedule_next_instance(&mut mon, &alarm);
            alarm
                .inner
                .stats
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .rescheduled_count += 1;
        }

        // Re-arm before enqueueing so later deadlines become eligible
        // independent of this callback's latency.
        svc.reschedule_root_alarm(&mut mon);

        let queue = alarm
            .inner
            .sched
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .queue
            .clone();
        if let Some(queue) = queue {
            queue.enqueue(alarm.clone());
        }
    }
    log::debug!("alarm dispatcher exited");
}

/// Ready handler bound to every processing queue: invoke the callback of
/// one dequeued alarm under its callback lock.
fn alarm_queue_ready(queue: &Arc<FixedQueue<Alarm>>) {
    let Some(svc) = service() else {
        // Torn down with items still queued; drain so the reactor settles.
        let _ = queue.try_dequeue();
        return;
    };

    let mon = svc.monitor.lock().unwrap_or_else(PoisonError::into_inner);
    let Some(alarm) = queue.try_dequeue() else {
        // Canceled between the ready notification and this dispatch.
        return;
    };

    let (callback, deadline_ms) = {
        let mut sched = alarm
            .inner
            .sched
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        let callback = sched.callback.clone();
        let deadline_ms = if alarm.inner.is_periodic {
            // Already re-anchored by the dispatcher; measure jitter
            // against the firing that put us here.
            sched.prev_deadline_ms
        } else {
            // Fully serviced after this; distinguish expired from armed.
            let deadline_ms = sched.deadline_ms;
            sched.deadline_ms = 0;
            sched.callback = None;
            deadline_ms
        };
        (callback, deadline_ms)
    };
    if !alarm.inner.is_periodic {
        alarm.inner.armed.store(false, Ordering::Release);
    }

    // Take the callback lock before releasing the monitor so a racing
    // cancel observes either "still queued" or "callback in progress",
    // never a gap between the two.
    let callback_guard = alarm.inner.callback_lock.lock();
    drop(mon);

    let Some(callback) = callback else {
        drop(callback_guard);
        return;
    };

    let t0 = clock::now_ms();
    callback();
    let t1 = clock::now_ms();

    alarm
        .inner
        .stats
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .update_scheduling(t0, deadline_ms, t1.saturating_sub(t0));

    drop(callback_guard);
}

impl Alarm {
    /// Create a one-shot alarm.
    ///
    /// The first alarm created in a process brings up the shared service:
    /// the pending list, both timers, the expiration semaphore, the
    /// default worker thread and queue, and the dispatcher.
    ///
    /// # Errors
    ///
    /// Returns [`AlarmError`] if service initialization fails; the failure
    /// is also logged.
    pub fn new(name: &str) -> Result<Alarm, AlarmError> {
        Self::new_internal(name, false)
    }

    /// Create a periodic alarm. Firings are anchored to the `set` time
    /// plus whole multiples of the period.
    ///
    /// # Errors
    ///
    /// Returns [`AlarmError`] if service initialization fails.
    pub fn new_periodic(name: &str) -> Result<Alarm, AlarmError> {
        Self::new_internal(name, true)
    }

    fn new_internal(name: &str, is_periodic: bool) -> Result<Alarm, AlarmError> {
        service_or_init()?;
        Ok(Alarm {
            inner: Arc::new(AlarmInner {
                name: name.into(),
                is_periodic,
                callback_lock: RecursiveMutex::new(),
                armed: AtomicBool::new(false),
                sched: Mutex::new(SchedState::default()),
                stats: Mutex::new(AlarmStats::default()),
            }),
        })
    }

    /// Arm the alarm to fire `interval_ms` from now on the default worker
    /// queue. Re-arms (replacing deadline, callback, and queue) if the
    /// alarm is already scheduled.
    ///
    /// # Panics
    ///
    /// Panics if the service has been torn down by [`cleanup`].
    pub fn set<F>(&self, interval_ms: u64, callback: F)
    where
        F: Fn() + Send + Sync + 'static,
    {
        let svc = expect_service();
        let queue = Arc::clone(&svc.default_queue);
        self.set_internal(&svc, interval_ms, Arc::new(callback), queue);
    }

    /// Arm the alarm on a specific processing queue (registered with
    /// [`register_processing_queue`]).
    ///
    /// # Panics
    ///
    /// Panics if the service has been torn down by [`cleanup`].
    pub fn set_on_queue<F>(&self, interval_ms: u64, callback: F, queue: &Arc<FixedQueue<Alarm>>)
    where
        F: Fn() + Send + Sync + 'static,
    {
        let svc = expect_service();
        self.set_internal(&svc, interval_ms, Arc::new(callback), Arc::clone(queue));
    }

    fn set_internal(
        &self,
        svc: &AlarmService,
        period_ms: u64,
        callback: AlarmCallback,
        queue: Arc<FixedQueue<Alarm>>,
    ) {
        let mut mon = svc.monitor.lock().unwrap_or_else(PoisonError::into_inner);

        {
            let mut sched = self
                .inner
                .sched
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            sched.creation_time_ms = clock::now_ms();
            sched.period_ms = period_ms;
            sched.queue = Some(queue);
            sched.callback = Some(callback);
        }

        svc.schedule_next_instance(&mut mon, self);
        self.inner
            .stats
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .scheduled_count += 1;
    }

    /// Disarm the alarm and wait out any in-flight callback.
    ///
    /// On return: the alarm will not fire again until re-armed, and no
    /// callback for it is running on any thread. Idempotent, and legal
    /// from inside the alarm's own callback (the wait passes through
    /// re-entrantly in that case).
    pub fn cancel(&self) {
        let Some(svc) = service() else {
            return;
        };
        {
            let mut mon = svc.monitor.lock().unwrap_or_else(PoisonError::into_inner);
            svc.cancel_locked(&mut mon, self);
        }
        // If the callback is mid-flight on a worker, block here until it
        // completes.
        drop(self.inner.callback_lock.lock());
    }

    /// Whether the alarm is currently armed. Best-effort lock-free read;
    /// `false` whenever the service is not up.
    #[must_use]
    pub fn is_scheduled(&self) -> bool {
        SERVICE_UP.load(Ordering::Acquire) && self.inner.armed.load(Ordering::Relaxed)
    }

    /// Milliseconds until the alarm is due, or 0 if it is not armed (or
    /// already due, or the service is not up).
    #[must_use]
    pub fn remaining_ms(&self) -> u64 {
        let Some(svc) = service() else {
            return 0;
        };
        let just_now = clock::now_ms();
        let _mon = svc.monitor.lock().unwrap_or_else(PoisonError::into_inner);
        let deadline_ms = self
            .inner
            .sched
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .deadline_ms;
        deadline_ms.saturating_sub(just_now)
    }

    /// Cancel the alarm and release this handle.
    pub fn free(self) {
        self.cancel();
    }

    /// The name given at creation.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// Whether this alarm re-arms itself after each firing.
    #[must_use]
    pub fn is_periodic(&self) -> bool {
        self.inner.is_periodic
    }

    /// Snapshot of the alarm's statistics. Only meaningful when no
    /// callback is in flight.
    #[must_use]
    pub fn stats(&self) -> AlarmStats {
        self.inner
            .stats
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Identity comparison: both handles refer to the same alarm.
    pub(crate) fn same(&self, other: &Alarm) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl std::fmt::Debug for Alarm {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Alarm")
            .field("name", &self.inner.name)
            .field("is_periodic", &self.inner.is_periodic)
            .field("armed", &self.inner.armed.load(Ordering::Relaxed))
            .finish_non_exhaustive()
    }
}

/// Bind a processing queue to a worker thread: the worker's reactor will
/// run alarm callbacks for every alarm subsequently `set` on this queue.
pub fn register_processing_queue(queue: &Arc<FixedQueue<Alarm>>, worker: &WorkerThread) {
    queue::register_dequeue(queue, worker.reactor(), alarm_queue_ready);
}

/// Unbind a processing queue from its worker and cancel every alarm
/// currently scheduled on it.
pub fn unregister_processing_queue(queue: &Arc<FixedQueue<Alarm>>) {
    queue.unregister_dequeue();

    let Some(svc) = service() else {
        return;
    };
    let mut mon = svc.monitor.lock().unwrap_or_else(PoisonError::into_inner);
    let bound: Vec<Alarm> = mon
        .pending
        .iter()
        .filter(|(_, alarm)| {
            alarm
                .inner
                .sched
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .queue
                .as_ref()
                .is_some_and(|bound_queue| Arc::ptr_eq(bound_queue, queue))
        })
        .map(|(_, alarm)| alarm.clone())
        .collect();
    for alarm in &bound {
        svc.cancel_locked(&mut mon, alarm);
    }
}

/// Tear down the process-wide service: stop the dispatcher, the default
/// worker, and both timers, release the wake lock if held, and drop all
/// pending state. The next [`Alarm::new`] re-initializes from scratch.
/// No-op when the service was never brought up.
pub fn cleanup() {
    let svc = {
        let mut slot = SERVICE.lock().unwrap_or_else(PoisonError::into_inner);
        SERVICE_UP.store(false, Ordering::Release);
        slot.take()
    };
    let Some(svc) = svc else {
        return;
    };

    // Stop the dispatcher first so nothing new reaches the worker queues.
    svc.dispatcher_active.store(false, Ordering::Release);
    svc.expired.post();
    let handle = svc
        .dispatcher
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .take();
    if let Some(handle) = handle {
        let _ = handle.join();
    }

    svc.default_queue.unregister_dequeue();
    svc.default_worker.stop();

    {
        let mut mon = svc.monitor.lock().unwrap_or_else(PoisonError::into_inner);
        if mon.timer_set {
            // The short-horizon timer left the wake lock held.
            mon.timer_set = false;
            if let Some(callouts) = callout::current() {
                if let Err(err) = callouts.release_wake_lock(WAKE_LOCK_ID) {
                    log::warn!("unable to release wake lock during cleanup: {err}");
                }
            }
        }
        mon.pending.clear();
    }

    svc.timer.stop();
    svc.wake_timer.stop();
}
