//! Cooperative thread interruption.
//!
//! Rust threads cannot be pre-empted, so pools signal cancellation through a
//! per-thread flag instead. Every thread lazily owns an [`Interrupter`]; a pool
//! keeps a clone of each worker's interrupter and raises it on `shutdown_now`
//! or when a watchdog deadline passes. Task code observes the signal through
//! [`sleep`], [`is_interrupted`] or [`interrupted`].
//!
//! ```
//! use std::time::Duration;
//! use workstage::core::interrupt;
//!
//! let me = interrupt::current();
//! me.interrupt();
//! assert!(interrupt::sleep(Duration::from_secs(5)).is_err());
//! // `sleep` consumed the signal.
//! assert!(!interrupt::is_interrupted());
//! ```

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};
use thiserror::Error;

/// Returned by interruptible waits when the calling thread was interrupted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("thread interrupted")]
pub struct Interrupted;

#[derive(Debug, Default)]
struct Signal {
    raised: AtomicBool,
    lock: Mutex<()>,
    wake: Condvar,
}

/// Handle to one thread's interrupt flag.
///
/// Cloning is cheap; all clones refer to the same flag.
#[derive(Debug, Clone, Default)]
pub struct Interrupter {
    signal: Arc<Signal>,
}

impl Interrupter {
    /// Raise the flag and wake the owning thread if it is blocked in [`sleep`].
    pub fn interrupt(&self) {
        let _guard = self.signal.lock.lock();
        self.signal.raised.store(true, Ordering::Release);
        self.signal.wake.notify_all();
    }

    /// Whether the flag is currently raised.
    #[must_use]
    pub fn is_raised(&self) -> bool {
        self.signal.raised.load(Ordering::Acquire)
    }

    /// Lower the flag, returning whether it was raised.
    pub fn clear(&self) -> bool {
        self.signal.raised.swap(false, Ordering::AcqRel)
    }

    /// Whether both handles refer to the same thread's flag.
    #[must_use]
    pub fn same_as(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.signal, &other.signal)
    }

    fn sleep_until(&self, deadline: Instant) -> Result<(), Interrupted> {
        let mut guard = self.signal.lock.lock();
        loop {
            if self.clear() {
                return Err(Interrupted);
            }
            if self.signal.wake.wait_until(&mut guard, deadline).timed_out() {
                return if self.clear() { Err(Interrupted) } else { Ok(()) };
            }
        }
    }
}

thread_local! {
    static CURRENT: Interrupter = Interrupter::default();
}

/// The interrupter belonging to the calling thread.
#[must_use]
pub fn current() -> Interrupter {
    CURRENT.with(Clone::clone)
}

/// Whether the calling thread has a pending interrupt. Does not clear it.
#[must_use]
pub fn is_interrupted() -> bool {
    CURRENT.with(Interrupter::is_raised)
}

/// Test-and-clear the calling thread's interrupt flag.
pub fn interrupted() -> bool {
    CURRENT.with(Interrupter::clear)
}

/// Sleep for `duration`, returning early with [`Interrupted`] if the calling
/// thread is interrupted before or during the wait. The flag is cleared when
/// the interruption is reported.
pub fn sleep(duration: Duration) -> Result<(), Interrupted> {
    let deadline = Instant::now() + duration;
    CURRENT.with(|me| me.sleep_until(deadline))
}

/// Return `Err(Interrupted)` (clearing the flag) if the calling thread has a
/// pending interrupt.
pub fn check() -> Result<(), Interrupted> {
    if interrupted() {
        Err(Interrupted)
    } else {
        Ok(())
    }
}
