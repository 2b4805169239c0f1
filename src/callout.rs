//! Platform wake callouts.
//!
//! The host platform owns suspend policy. These callouts let the alarm
//! service keep the system awake while a short-horizon timer is armed, and
//! request a wake out of suspend for long-horizon deadlines. Registration
//! is process-wide.
//!
//! When nothing is registered, wake-lock operations succeed as no-ops and
//! the service substitutes its in-process wake timer for the platform
//! alarm, so alarms still fire on hosts without a platform alarm facility.

use std::sync::{Arc, PoisonError, RwLock};

use thiserror::Error;

/// Invoked by the platform when a wake alarm it accepted expires.
pub type WakeAlarmFn = Arc<dyn Fn() + Send + Sync + 'static>;

/// Failure reported by a wake-lock operation.
#[derive(Debug, Error)]
pub enum CalloutError {
    /// The platform returned a non-success status code.
    #[error("platform returned status {0}")]
    Status(i32),
    /// The platform does not support the operation.
    #[error("operation not supported by the platform")]
    Unsupported,
}

/// Suspend-related services provided by the host platform.
pub trait OsCallouts: Send + Sync {
    /// Schedule a platform alarm `delay_ms` out. When `should_wake` is
    /// true the alarm may bring the system out of suspend. `expired` is
    /// invoked when the alarm fires. Returns `false` if the platform
    /// refuses the request.
    fn set_wake_alarm(&self, delay_ms: u64, should_wake: bool, expired: WakeAlarmFn) -> bool;

    /// Keep the system awake until the matching release.
    ///
    /// # Errors
    ///
    /// Any [`CalloutError`]; the caller logs it and continues, accepting
    /// that the alarm may fire late if the device suspends.
    fn acquire_wake_lock(&self, lock_name: &str) -> Result<(), CalloutError>;

    /// Release a previously acquired wake lock.
    ///
    /// # Errors
    ///
    /// Any [`CalloutError`]; logged by the caller.
    fn release_wake_lock(&self, lock_name: &str) -> Result<(), CalloutError>;
}

static CALLOUTS: RwLock<Option<Arc<dyn OsCallouts>>> = RwLock::new(None);

/// Install the process-wide platform callouts, replacing any previous set.
pub fn set_os_callouts(callouts: Arc<dyn OsCallouts>) {
    *CALLOUTS.write().unwrap_or_else(PoisonError::into_inner) = Some(callouts);
}

/// Remove the process-wide platform callouts.
pub fn clear_os_callouts() {
    *CALLOUTS.write().unwrap_or_else(PoisonError::into_inner) = None;
}

/// The currently registered callouts, if any.
pub(crate) fn current() -> Option<Arc<dyn OsCallouts>> {
    CALLOUTS
        .read()
        .unwrap_or_else(PoisonError::into_inner)
        .clone()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingCallouts {
        acquires: AtomicUsize,
    }

    impl OsCallouts for CountingCallouts {
        fn set_wake_alarm(&self, _delay_ms: u64, _should_wake: bool, _expired: WakeAlarmFn) -> bool {
            true
        }

        fn acquire_wake_lock(&self, _lock_name: &str) -> Result<(), CalloutError> {
            self.acquires.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        fn release_wake_lock(&self, _lock_name: &str) -> Result<(), CalloutError> {
            Ok(())
        }
    }

    #[test]
    fn trait_object_dispatch() {
        let callouts = Arc::new(CountingCallouts {
            acquires: AtomicUsize::new(0),
        });
        let as_trait: Arc<dyn OsCallouts> = Arc::clone(&callouts) as Arc<dyn OsCallouts>;
        as_trait
            .acquire_wake_lock("test_lock")
            .expect("acquire should succeed");
        as_trait
            .release_wake_lock("test_lock")
            .expect("release should succeed");
        assert!(as_trait.set_wake_alarm(10, true, Arc::new(|| {})));
        assert_eq!(callouts.acquires.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn register_and_clear() {
        let callouts = Arc::new(CountingCallouts {
            acquires: AtomicUsize::new(0),
        });
        set_os_callouts(Arc::clone(&callouts) as Arc<dyn OsCallouts>);
        assert!(current().is_some());
        clear_os_callouts();
        assert!(current().is_none());
    }

    #[test]
    fn error_messages() {
        assert_eq!(
            CalloutError::Status(-3).to_string(),
            "platform returned status -3"
        );
        assert_eq!(
            CalloutError::Unsupported.to_string(),
            "operation not supported by the platform"
        );
    }
}
