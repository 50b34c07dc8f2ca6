//! Per-reactor timed guards with renewable deadlines (spec §4.3): each
//! watchdog owns a dedicated thread that sleeps until either its deadline
//! expires unrenewed, or it's told to stop/terminate.

use std::sync::{Arc, Condvar, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use boomerang_core::Timestamp;

/// The guarded state (spec §3): all three fields are written only while
/// holding the mutex that also backs `cond`, matching the C
/// `reactor_mutex`/`cond` pair owned by the reactor.
struct WatchdogState {
    expiration: Timestamp,
    active: bool,
    terminate: bool,
}

/// A renewable timed guard. `start`/`stop`/`terminate` are the only public
/// entry points; all three assume the caller already holds whatever
/// external synchronization the embedding reactor needs for its own state
/// (spec §4.3's "precondition: caller holds `reactor_mutex`" — here that
/// role is played by [`Watchdog`]'s own internal mutex, since this crate
/// doesn't otherwise expose the surrounding reactor's state).
pub struct Watchdog {
    name: String,
    min_expiration: Duration,
    state: Arc<Mutex<WatchdogState>>,
    cond: Arc<Condvar>,
    thread: Mutex<Option<JoinHandle<()>>>,
}

impl std::fmt::Debug for Watchdog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let guard = self.state.lock().expect("watchdog mutex poisoned");
        f.debug_struct("Watchdog")
            .field("name", &self.name)
            .field("min_expiration", &self.min_expiration)
            .field("active", &guard.active)
            .field("terminate", &guard.terminate)
            .finish()
    }
}

impl Watchdog {
    /// Construct a watchdog and start its dedicated thread (spec §4.3's
    /// `initialize` plus the `thread_create` call from spec §6, combined:
    /// there is no separate step where the thread exists but isn't running
    /// yet).
    pub fn new(
        name: impl Into<String>,
        min_expiration: Duration,
        handler: impl Fn() + Send + Sync + 'static,
    ) -> Self {
        let name = name.into();
        let state = Arc::new(Mutex::new(WatchdogState {
            expiration: Timestamp::NEVER,
            active: false,
            terminate: false,
        }));
        let cond = Arc::new(Condvar::new());

        let thread = {
            let state = state.clone();
            let cond = cond.clone();
            let thread_name = name.clone();
            thread::Builder::new()
                .name(format!("watchdog-{thread_name}"))
                .spawn(move || watchdog_thread_main(state, cond, handler, thread_name))
                .expect("failed to spawn watchdog thread")
        };

        Self {
            name,
            min_expiration,
            state,
            cond,
            thread: Mutex::new(Some(thread)),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Arm (or renew) the watchdog: it will fire no earlier than
    /// `current_tag_time + min_expiration + additional_timeout`. Renewing
    /// before the previous deadline simply pushes the deadline out — the
    /// thread re-reads `expiration` on every wake, so the handler fires at
    /// most once, at the latest requested expiration (spec §8).
    pub fn start(&self, current_tag_time: Timestamp, additional_timeout: Duration) {
        let mut guard = self.state.lock().expect("watchdog mutex poisoned");
        guard.terminate = false;
        guard.expiration = current_tag_time + (self.min_expiration + additional_timeout);
        tracing::debug!(watchdog = %self.name, expiration = ?guard.expiration, "watchdog armed");
        if !guard.active {
            // The thread is parked in its indefinite wait; wake it so it
            // starts timing the deadline we just set. If it's already
            // `active` (inside the timed wait), it will pick up the
            // renewed expiration on its own next wake without us signaling
            // — signaling here too would just be a spurious wake.
            self.cond.notify_one();
        }
    }

    /// Cancel a pending expiration. No-op if the watchdog isn't currently
    /// waiting on one.
    pub fn stop(&self) {
        let mut guard = self.state.lock().expect("watchdog mutex poisoned");
        if !guard.active {
            return;
        }
        guard.expiration = Timestamp::NEVER;
        self.cond.notify_one();
    }

    /// Shut the watchdog down for good: cancels any pending expiration,
    /// signals the thread to exit, and joins it.
    pub fn terminate(&self) {
        {
            let mut guard = self.state.lock().expect("watchdog mutex poisoned");
            guard.terminate = true;
            guard.expiration = Timestamp::NEVER;
            self.cond.notify_one();
        }
        if let Some(handle) = self.thread.lock().expect("watchdog mutex poisoned").take() {
            handle.join().expect("watchdog thread panicked");
        }
    }
}

impl Drop for Watchdog {
    fn drop(&mut self) {
        if self.thread.lock().expect("watchdog mutex poisoned").is_some() {
            self.terminate();
        }
    }
}

/// Shutdown barrier for a set of watchdogs (spec §4.3 `wait_all`): stop
/// then terminate each in turn, joining its thread before moving to the
/// next.
pub fn wait_all(watchdogs: &[Watchdog]) {
    for watchdog in watchdogs {
        watchdog.stop();
        watchdog.terminate();
    }
}

fn watchdog_thread_main(
    state: Arc<Mutex<WatchdogState>>,
    cond: Arc<Condvar>,
    handler: impl Fn() + Send + Sync,
    name: String,
) {
    let mut guard = state.lock().expect("watchdog mutex poisoned");
    loop {
        if guard.terminate {
            break;
        }

        if guard.expiration == Timestamp::NEVER {
            guard.active = false;
            tracing::trace!(watchdog = %name, "waiting for a timeout to arm");
            while guard.expiration == Timestamp::NEVER && !guard.terminate {
                guard = cond.wait(guard).expect("watchdog mutex poisoned");
            }
            if guard.terminate {
                break;
            }
            continue;
        }

        guard.active = true;
        tracing::trace!(watchdog = %name, "entering timed wait");
        loop {
            if guard.terminate || guard.expiration == Timestamp::NEVER {
                break;
            }
            let now = Timestamp::now();
            match guard.expiration.checked_duration_since(now) {
                Some(remaining) if !remaining.is_zero() => {
                    let (g, _timeout) = cond
                        .wait_timeout(guard, remaining)
                        .expect("watchdog mutex poisoned");
                    guard = g;
                }
                _ => break,
            }
        }

        if guard.terminate {
            break;
        }
        if guard.expiration == Timestamp::NEVER {
            // Stopped before it expired.
            guard.active = false;
            continue;
        }

        // Actually timed out: physical_time >= expiration, expiration is
        // still armed, and we haven't been told to terminate.
        tracing::warn!(watchdog = %name, "watchdog expired, firing handler");
        handler();
        guard.active = false;
    }
    guard.active = false;
}
