//! Monotonic boot-relative clock in milliseconds.
//!
//! Every deadline in this crate is an absolute value of this clock, so timer
//! expirations can be compared against `deadline_ms` without unit
//! conversion. The clock never jumps backward and is unaffected by
//! wall-clock changes.

/// Current boot-relative monotonic time in milliseconds.
///
/// Reads `CLOCK_BOOTTIME`, which keeps counting across suspend. A failed
/// clock read is logged and reported as 0; the scheduler treats that as
/// "re-evaluate soon" rather than an error, and the dispatcher re-validates
/// the front of the pending list before firing anything.
#[cfg(target_os = "linux")]
#[expect(
    clippy::cast_sign_loss,
    reason = "boot clock seconds and nanoseconds are non-negative"
)]
pub fn now_ms() -> u64 {
    let mut ts = libc::timespec {
        tv_sec: 0,
        tv_nsec: 0,
    };
    // SAFETY: `ts` is a valid, writable timespec and CLOCK_BOOTTIME is a
    // supported clock id on Linux.
    let rc = unsafe { libc::clock_gettime(libc::CLOCK_BOOTTIME, &mut ts) };
    if rc == -1 {
        log::error!(
            "unable to read CLOCK_BOOTTIME: {}",
            std::io::Error::last_os_error()
        );
        return 0;
    }
    (ts.tv_sec as u64).wrapping_mul(1000) + (ts.tv_nsec as u64) / 1_000_000
}

/// Current monotonic time in milliseconds (process-epoch fallback).
///
/// Non-Linux hosts have no boot clock we can portably read, so anchor an
/// [`std::time::Instant`] at first use. This clock pauses during suspend,
/// which is acceptable here because the platform wake callouts do not exist
/// off Linux either.
#[cfg(not(target_os = "linux"))]
pub fn now_ms() -> u64 {
    use std::sync::OnceLock;
    use std::time::Instant;
    static EPOCH: OnceLock<Instant> = OnceLock::new();
    let epoch = EPOCH.get_or_init(Instant::now);
    epoch.elapsed().as_millis() as u64
}
