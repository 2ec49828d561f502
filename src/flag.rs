use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use log::warn;
use parking_lot::{Condvar, Mutex};

/// A set/clear/wait flag shared between worker threads and their owners.
///
/// Waiters block on a condition variable until the flag is set; `clear` does
/// not wake anyone. This is the coordination primitive behind the PWM pause
/// gate, the stop flags, the triggered flag and the global interrupt gate.
pub(crate) struct Flag {
    state: Mutex<bool>,
    cond: Condvar,
}

impl Flag {
    pub fn new(set: bool) -> Flag {
        Flag {
            state: Mutex::new(set),
            cond: Condvar::new(),
        }
    }

    pub fn set(&self) {
        let mut state = self.state.lock();
        *state = true;
        self.cond.notify_all();
    }

    pub fn clear(&self) {
        *self.state.lock() = false;
    }

    pub fn is_set(&self) -> bool {
        *self.state.lock()
    }

    /// Blocks until the flag is set.
    pub fn wait(&self) {
        let mut state = self.state.lock();
        while !*state {
            self.cond.wait(&mut state);
        }
    }

    /// Blocks until the flag is set or `timeout` elapses. Returns whether the
    /// flag was set when the wait ended.
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut state = self.state.lock();
        while !*state {
            if self.cond.wait_until(&mut state, deadline).timed_out() {
                return *state;
            }
        }
        true
    }
}

/// Joins a worker thread, giving up after `timeout`. The stop flag must have
/// been set before calling this; an abandoned thread is logged, not joined.
pub(crate) fn join_with_timeout(name: &str, handle: JoinHandle<()>, timeout: Duration) {
    let deadline = Instant::now() + timeout;
    while !handle.is_finished() {
        if Instant::now() >= deadline {
            warn!("{name} worker did not stop within {timeout:?}, abandoning thread");
            return;
        }
        std::thread::sleep(Duration::from_millis(1));
    }
    if handle.join().is_err() {
        warn!("{name} worker panicked");
    }
}
