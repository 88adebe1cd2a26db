//! Wait event for the loopback driver.
//!
//! Models the session's read-wait handle: an auto-reset signal for the
//! empty-to-non-empty receive ring transition, plus a latch that keeps the
//! event permanently signaled once the session starts terminating.

use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};

#[derive(Default)]
struct EventState {
    signaled: bool,
    latched: bool,
}

/// A waitable event with auto-reset signalling and a terminate latch.
#[derive(Default)]
pub struct Event {
    state: Mutex<EventState>,
    cond: Condvar,
}

impl Event {
    pub fn new() -> Self {
        Self::default()
    }

    /// Signal one pending (or the next) wait.
    pub fn signal(&self) {
        let mut state = self.state.lock();
        state.signaled = true;
        drop(state);
        self.cond.notify_all();
    }

    /// Keep the event signaled from now on. Used when the session starts
    /// terminating; no reset exists.
    pub fn latch(&self) {
        let mut state = self.state.lock();
        state.latched = true;
        state.signaled = true;
        drop(state);
        self.cond.notify_all();
    }

    /// Wait until signaled or `timeout` elapses. Returns `true` on signal.
    ///
    /// A plain signal is consumed by the returning waiter; a latched event
    /// satisfies every wait without being consumed.
    pub fn wait(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut state = self.state.lock();
        loop {
            if state.latched {
                return true;
            }
            if state.signaled {
                state.signaled = false;
                return true;
            }
            if self.cond.wait_until(&mut state, deadline).timed_out() {
                if state.latched {
                    return true;
                }
                return std::mem::take(&mut state.signaled);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn wait_times_out_without_signal() {
        let event = Event::new();
        let start = Instant::now();
        assert!(!event.wait(Duration::from_millis(50)));
        assert!(start.elapsed() >= Duration::from_millis(50));
    }

    #[test]
    fn signal_wakes_a_waiter() {
        let event = Arc::new(Event::new());
        let waiter = {
            let event = event.clone();
            thread::spawn(move || event.wait(Duration::from_secs(5)))
        };
        thread::sleep(Duration::from_millis(10));
        event.signal();
        assert!(waiter.join().unwrap());
    }

    #[test]
    fn signal_is_consumed_once() {
        let event = Event::new();
        event.signal();
        assert!(event.wait(Duration::from_millis(10)));
        assert!(!event.wait(Duration::from_millis(10)));
    }

    #[test]
    fn latch_satisfies_every_wait() {
        let event = Event::new();
        event.latch();
        assert!(event.wait(Duration::from_millis(10)));
        assert!(event.wait(Duration::from_millis(10)));
    }
}
