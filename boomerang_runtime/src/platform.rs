//! The platform adapter (spec §6): the handful of primitives the scheduler
//! and watchdog build on. On this target they are thin, direct wrappers
//! around `std::sync`/`std::thread` rather than an abstract trait, since
//! this workspace has exactly one platform to run the runtime on.
//!
//! [`Semaphore`] is the one primitive `std` doesn't provide directly. It
//! follows the `(Mutex<count>, Condvar)` signalling idiom used elsewhere in
//! this workspace's family of runtimes for exactly this purpose: a counter
//! guarded by a mutex, with a condvar to park/wake waiters.

use std::sync::{Condvar, Mutex};

/// A counting semaphore: `acquire` blocks while the count is zero, `release`
/// adds to the count and wakes waiters.
///
/// This is the `semaphore_new`/`acquire`/`release` trio from spec §6. Workers
/// park on it in [`crate::scheduler::Scheduler::wait_for_work`]; the
/// last-idle worker releases it to wake the others.
#[derive(Debug)]
pub struct Semaphore {
    count: Mutex<usize>,
    cond: Condvar,
}

impl Semaphore {
    pub fn new(initial: usize) -> Self {
        Self {
            count: Mutex::new(initial),
            cond: Condvar::new(),
        }
    }

    /// Block until a permit is available, then consume it.
    pub fn acquire(&self) {
        let mut count = self.count.lock().expect("semaphore mutex poisoned");
        while *count == 0 {
            count = self.cond.wait(count).expect("semaphore mutex poisoned");
        }
        *count -= 1;
    }

    /// Release `n` permits, waking up to `n` waiters.
    pub fn release(&self, n: usize) {
        if n == 0 {
            return;
        }
        let mut count = self.count.lock().expect("semaphore mutex poisoned");
        *count += n;
        if n == 1 {
            self.cond.notify_one();
        } else {
            self.cond.notify_all();
        }
    }
}

/// Nested interrupt-disable/enable, for bare-metal targets (spec §6).
///
/// Threaded targets backed by an OS scheduler (the only target this
/// workspace builds for) have no hardware interrupt mask to toggle, so this
/// is a no-op counter kept only so the call sites spec §6 describes have
/// somewhere to live if this runtime is ever retargeted to `no_std`.
#[derive(Debug, Default)]
pub struct InterruptGuard {
    depth: std::sync::atomic::AtomicU32,
}

impl InterruptGuard {
    pub const fn new() -> Self {
        Self {
            depth: std::sync::atomic::AtomicU32::new(0),
        }
    }

    pub fn disable_nested(&self) {
        self.depth
            .fetch_add(1, std::sync::atomic::Ordering::AcqRel);
    }

    pub fn enable_nested(&self) {
        self.depth
            .fetch_sub(1, std::sync::atomic::Ordering::AcqRel);
    }
}
