//! Counting semaphore.
//!
//! The primitive every other component is built from: the creation gate,
//! per-leader join channels, mutexes and barriers all reduce to `wait` and
//! `signal` on a [`Semaphore`]. It is process-local; waiters park on a
//! `parking_lot` condition variable.
//!
//! ## Lifecycle
//!
//! A semaphore is live from [`Semaphore::new`] until [`Semaphore::destroy`].
//! Destroying it wakes every blocked waiter with [`SemError::Destroyed`];
//! every later operation fails the same way and a second destroy reports
//! [`SemError::AlreadyDestroyed`].

use std::cell::UnsafeCell;
use std::ops::{Deref, DerefMut};
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};

use crate::error::SemError;

#[derive(Debug)]
struct SemState {
    value: usize,
    destroyed: bool,
}

/// Counting semaphore with blocking `wait` and waking `signal`.
#[derive(Debug)]
pub struct Semaphore {
    state: Mutex<SemState>,
    cond: Condvar,
}

impl Semaphore {
    /// Create a semaphore holding `initial` permits.
    #[must_use]
    pub const fn new(initial: usize) -> Self {
        Self {
            state: Mutex::new(SemState {
                value: initial,
                destroyed: false,
            }),
            cond: Condvar::new(),
        }
    }

    /// Block until the value is positive, then decrement it.
    pub fn wait(&self) -> Result<(), SemError> {
        let mut state = self.state.lock();
        loop {
            if state.destroyed {
                return Err(SemError::Destroyed);
            }
            if state.value > 0 {
                state.value -= 1;
                return Ok(());
            }
            self.cond.wait(&mut state);
        }
    }

    /// [`wait`](Self::wait), giving up after `timeout`.
    pub fn wait_timeout(&self, timeout: Duration) -> Result<(), SemError> {
        match Instant::now().checked_add(timeout) {
            Some(deadline) => self.wait_until(deadline),
            None => self.wait(),
        }
    }

    /// [`wait`](Self::wait), giving up at `deadline`.
    pub fn wait_until(&self, deadline: Instant) -> Result<(), SemError> {
        let mut state = self.state.lock();
        loop {
            if state.destroyed {
                return Err(SemError::Destroyed);
            }
            if state.value > 0 {
                state.value -= 1;
                return Ok(());
            }
            if self.cond.wait_until(&mut state, deadline).timed_out() {
                // A signal may have landed right at the deadline.
                if !state.destroyed && state.value > 0 {
                    state.value -= 1;
                    return Ok(());
                }
                return Err(if state.destroyed {
                    SemError::Destroyed
                } else {
                    SemError::TimedOut
                });
            }
        }
    }

    /// Decrement without blocking.
    pub fn try_wait(&self) -> Result<(), SemError> {
        let mut state = self.state.lock();
        if state.destroyed {
            return Err(SemError::Destroyed);
        }
        if state.value == 0 {
            return Err(SemError::WouldBlock);
        }
        state.value -= 1;
        Ok(())
    }

    /// Increment the value and wake one waiter.
    pub fn signal(&self) -> Result<(), SemError> {
        {
            let mut state = self.state.lock();
            if state.destroyed {
                return Err(SemError::Destroyed);
            }
            state.value += 1;
        }
        self.cond.notify_one();
        Ok(())
    }

    /// Current value.
    pub fn value(&self) -> Result<usize, SemError> {
        let state = self.state.lock();
        if state.destroyed {
            return Err(SemError::Destroyed);
        }
        Ok(state.value)
    }

    /// Release the semaphore. Blocked waiters return [`SemError::Destroyed`].
    pub fn destroy(&self) -> Result<(), SemError> {
        {
            let mut state = self.state.lock();
            if state.destroyed {
                return Err(SemError::AlreadyDestroyed);
            }
            state.destroyed = true;
            state.value = 0;
        }
        self.cond.notify_all();
        Ok(())
    }

    #[must_use]
    pub fn is_destroyed(&self) -> bool {
        self.state.lock().destroyed
    }
}

/// A value reachable only while holding the single permit of a binary
/// semaphore. This is how the creation gate guards the thread registry.
pub struct Gated<T> {
    gate: Semaphore,
    value: UnsafeCell<T>,
}

// SAFETY: `value` is only reached through a `GateGuard`, and at most one guard
// exists at a time because the gate starts at 1 and only a guard's drop
// signals it.
unsafe impl<T: Send> Sync for Gated<T> {}

impl<T> Gated<T> {
    #[must_use]
    pub const fn new(value: T) -> Self {
        Self {
            gate: Semaphore::new(1),
            value: UnsafeCell::new(value),
        }
    }

    /// Wait for the gate and return exclusive access.
    pub fn acquire(&self) -> Result<GateGuard<'_, T>, SemError> {
        self.gate.wait()?;
        Ok(GateGuard { gated: self })
    }

    /// Destroy the gate. Threads blocked in `acquire`, and every later
    /// `acquire`, fail with [`SemError::Destroyed`]. A guard that is already
    /// held stays valid until dropped.
    pub fn destroy(&self) -> Result<(), SemError> {
        self.gate.destroy()
    }
}

/// Exclusive access to a [`Gated`] value; releases the gate on drop.
pub struct GateGuard<'a, T> {
    gated: &'a Gated<T>,
}

impl<T> Deref for GateGuard<'_, T> {
    type Target = T;

    fn deref(&self) -> &T {
        // SAFETY: this guard holds the gate's only permit.
        unsafe { &*self.gated.value.get() }
    }
}

impl<T> DerefMut for GateGuard<'_, T> {
    fn deref_mut(&mut self) -> &mut T {
        // SAFETY: this guard holds the gate's only permit.
        unsafe { &mut *self.gated.value.get() }
    }
}

impl<T> Drop for GateGuard<'_, T> {
    fn drop(&mut self) {
        // Fails only if the gate was destroyed while held; nobody can enter then.
        let _ = self.gated.gate.signal();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::thread;

    #[test]
    fn wait_consumes_initial_permits() {
        let sem = Semaphore::new(2);
        sem.wait().unwrap();
        sem.wait().unwrap();
        assert_eq!(sem.value(), Ok(0));
        assert_eq!(sem.try_wait(), Err(SemError::WouldBlock));
    }

    #[test]
    fn signal_wakes_a_blocked_waiter() {
        let sem = Arc::new(Semaphore::new(0));
        let waiter = {
            let sem = Arc::clone(&sem);
            thread::spawn(move || sem.wait())
        };
        thread::sleep(Duration::from_millis(20));
        sem.signal().unwrap();
        assert_eq!(waiter.join().unwrap(), Ok(()));
        assert_eq!(sem.value(), Ok(0));
    }

    #[test]
    fn wait_timeout_expires_without_permit() {
        let sem = Semaphore::new(0);
        let started = Instant::now();
        assert_eq!(
            sem.wait_timeout(Duration::from_millis(30)),
            Err(SemError::TimedOut)
        );
        assert!(started.elapsed() >= Duration::from_millis(30));
    }

    #[test]
    fn destroy_releases_waiters_and_is_detected_twice() {
        let sem = Arc::new(Semaphore::new(0));
        let waiters: Vec<_> = (0..3)
            .map(|_| {
                let sem = Arc::clone(&sem);
                thread::spawn(move || sem.wait())
            })
            .collect();
        thread::sleep(Duration::from_millis(20));
        sem.destroy().unwrap();
        for waiter in waiters {
            assert_eq!(waiter.join().unwrap(), Err(SemError::Destroyed));
        }
        assert_eq!(sem.destroy(), Err(SemError::AlreadyDestroyed));
        assert_eq!(sem.signal(), Err(SemError::Destroyed));
        assert_eq!(sem.value(), Err(SemError::Destroyed));
        assert!(sem.is_destroyed());
    }

    #[test]
    fn gated_value_is_mutually_exclusive() {
        let gated = Arc::new(Gated::new(0usize));
        let inside = Arc::new(AtomicUsize::new(0));
        let workers: Vec<_> = (0..8)
            .map(|_| {
                let gated = Arc::clone(&gated);
                let inside = Arc::clone(&inside);
                thread::spawn(move || {
                    for _ in 0..500 {
                        let mut guard = gated.acquire().unwrap();
                        assert_eq!(inside.fetch_add(1, Ordering::SeqCst), 0);
                        *guard += 1;
                        inside.fetch_sub(1, Ordering::SeqCst);
                    }
                })
            })
            .collect();
        for worker in workers {
            worker.join().unwrap();
        }
        assert_eq!(*gated.acquire().unwrap(), 8 * 500);
    }

    #[test]
    fn destroyed_gate_refuses_entry() {
        let gated = Gated::new(());
        {
            let _held = gated.acquire().unwrap();
            gated.destroy().unwrap();
        }
        assert!(matches!(gated.acquire(), Err(SemError::Destroyed)));
    }
}
