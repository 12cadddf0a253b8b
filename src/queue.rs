//! A FIFO guarded by a mutex plus a "not-empty" condition variable (§4.3).
//!
//! Grounded on the source's `ProtectedList<Elem>`: a mutex-protected
//! `std::queue` plus a separate condition that is only broadcast when a
//! `put()` transitions the queue from empty to non-empty. `take()` and
//! `waiting_while_empty()` are kept as two separate calls for fidelity to the
//! historical two-step protocol (and are exactly what §9's open question
//! warns is race-prone); `take_with_timeout()` is the race-free replacement
//! recommended there and is what every new call site in this crate uses.

use std::collections::VecDeque;
use std::sync::{Condvar, Mutex};
use std::time::{Duration, Instant};

/// Mutex + condvar protected FIFO queue.
pub struct ProtectedQueue<T> {
    state: Mutex<VecDeque<T>>,
    not_empty: Condvar,
    default_timeout: Duration,
}

impl<T> ProtectedQueue<T> {
    pub fn new(default_timeout: Duration) -> Self {
        Self {
            state: Mutex::new(VecDeque::new()),
            not_empty: Condvar::new(),
            default_timeout,
        }
    }

    /// Enqueue `x`. If the queue transitioned from empty to non-empty,
    /// broadcast the not-empty condition to wake every waiter.
    pub fn put(&self, x: T) {
        let mut guard = self.state.lock().unwrap();
        let was_empty = guard.is_empty();
        guard.push_back(x);
        if was_empty {
            self.not_empty.notify_all();
        }
    }

    /// Pop the front element without blocking. Returns `None` ("the empty
    /// sentinel") if the queue is empty at the instant of the call.
    pub fn take(&self) -> Option<T> {
        let mut guard = self.state.lock().unwrap();
        guard.pop_front()
    }

    /// Block until the queue is non-empty or the default timeout elapses.
    /// Returns `true` if woken by a `put`, `false` on timeout. Does not
    /// consume an element — callers historically followed this with `take()`,
    /// which races against a concurrent consumer; prefer `take_with_timeout`.
    pub fn waiting_while_empty(&self) -> bool {
        let guard = self.state.lock().unwrap();
        if !guard.is_empty() {
            return true;
        }
        let (guard, timeout_result) = self
            .not_empty
            .wait_timeout_while(guard, self.default_timeout, |q| q.is_empty())
            .unwrap();
        !timeout_result.timed_out() && !guard.is_empty()
    }

    /// Atomically wait for an element (up to `timeout`) and pop it, closing
    /// the race window between `waiting_while_empty()` and `take()`.
    pub fn take_with_timeout(&self, timeout: Duration) -> Option<T> {
        let guard = self.state.lock().unwrap();
        let (mut guard, _timeout_result) = self
            .not_empty
            .wait_timeout_while(guard, timeout, |q| q.is_empty())
            .unwrap();
        guard.pop_front()
    }

    /// Same as `take_with_timeout` but bounded by an absolute deadline rather
    /// than a relative duration, so repeated polling inside a larger deadline
    /// loop (e.g. the acquisition driver's readout wait) doesn't reset the
    /// clock on every call.
    pub fn take_until(&self, deadline: Instant) -> Option<T> {
        let now = Instant::now();
        if now >= deadline {
            return self.take();
        }
        self.take_with_timeout(deadline - now)
    }

    pub fn len(&self) -> usize {
        self.state.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn take_on_empty_returns_none() {
        let q: ProtectedQueue<u32> = ProtectedQueue::new(Duration::from_millis(50));
        assert_eq!(q.take(), None);
    }

    #[test]
    fn put_then_take_round_trips() {
        let q: ProtectedQueue<u32> = ProtectedQueue::new(Duration::from_millis(50));
        q.put(42);
        assert_eq!(q.take(), Some(42));
        assert_eq!(q.take(), None);
    }

    #[test]
    fn waiting_while_empty_times_out() {
        let q: ProtectedQueue<u32> = ProtectedQueue::new(Duration::from_millis(20));
        assert!(!q.waiting_while_empty());
    }

    #[test]
    fn waiting_while_empty_wakes_on_put() {
        let q = Arc::new(ProtectedQueue::<u32>::new(Duration::from_secs(5)));
        let q2 = q.clone();
        let handle = thread::spawn(move || {
            thread::sleep(Duration::from_millis(20));
            q2.put(7);
        });
        assert!(q.waiting_while_empty());
        assert_eq!(q.take(), Some(7));
        handle.join().unwrap();
    }

    #[test]
    fn take_with_timeout_is_race_free() {
        let q = Arc::new(ProtectedQueue::<u32>::new(Duration::from_secs(5)));
        let q2 = q.clone();
        let handle = thread::spawn(move || {
            thread::sleep(Duration::from_millis(20));
            q2.put(9);
        });
        assert_eq!(q.take_with_timeout(Duration::from_secs(1)), Some(9));
        handle.join().unwrap();
    }

    #[test]
    fn take_with_timeout_elapses_on_empty() {
        let q: ProtectedQueue<u32> = ProtectedQueue::new(Duration::from_secs(5));
        assert_eq!(q.take_with_timeout(Duration::from_millis(20)), None);
    }
}
