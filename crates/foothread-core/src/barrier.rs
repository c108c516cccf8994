//! One-shot counting barrier.
//!
//! `init(n)` arms the barrier for `n` parties. The arrival counter is never
//! reset: the `n`-th arrival releases everyone who arrived (itself included)
//! and every later arrival passes straight through.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use crate::error::SyncError;
use crate::lifecycle::Slot;
use crate::sem::Semaphore;

const OP_INIT: &str = "barrier_init";
const OP_WAIT: &str = "barrier_wait";
const OP_DESTROY: &str = "barrier_destroy";
const OP_QUERY: &str = "barrier_query";

/// How a `wait` call was satisfied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Arrival {
    /// One of the first `n` parties; returned once all `n` had arrived.
    Released,
    /// Arrived after the barrier had already released; did not block.
    Straggler,
}

#[derive(Debug)]
struct BarrierCore {
    target: usize,
    arrived: AtomicUsize,
    rendezvous: Semaphore,
}

#[derive(Debug)]
pub struct Barrier {
    slot: Slot<BarrierCore>,
}

impl Default for Barrier {
    fn default() -> Self {
        Self::new()
    }
}

impl Barrier {
    /// An uninitialized barrier.
    #[must_use]
    pub const fn new() -> Self {
        Self { slot: Slot::new() }
    }

    /// Arm the barrier for `n` parties.
    pub fn init(&self, n: usize) -> Result<(), SyncError> {
        if n == 0 {
            return Err(SyncError::InvalidCount);
        }
        self.slot.init(
            OP_INIT,
            BarrierCore {
                target: n,
                arrived: AtomicUsize::new(0),
                rendezvous: Semaphore::new(0),
            },
        )
    }

    /// Arrive and block until all `n` parties have arrived.
    pub fn wait(&self) -> Result<Arrival, SyncError> {
        self.arrive(None)
    }

    /// [`wait`](Self::wait), giving up after `timeout`. The arrival still
    /// counts towards the release.
    pub fn wait_timeout(&self, timeout: Duration) -> Result<Arrival, SyncError> {
        self.arrive(Some(timeout))
    }

    fn arrive(&self, timeout: Option<Duration>) -> Result<Arrival, SyncError> {
        let core = self.slot.live(OP_WAIT)?;
        let count = core.arrived.fetch_add(1, Ordering::AcqRel) + 1;
        if count > core.target {
            return Ok(Arrival::Straggler);
        }
        if count == core.target {
            for _ in 0..core.target {
                core.rendezvous
                    .signal()
                    .map_err(|e| SyncError::from_sem(OP_WAIT, e))?;
            }
        }
        let released = match timeout {
            None => core.rendezvous.wait(),
            Some(timeout) => core.rendezvous.wait_timeout(timeout),
        };
        released.map_err(|e| SyncError::from_sem(OP_WAIT, e))?;
        Ok(Arrival::Released)
    }

    /// Release the barrier. Blocked parties fail with
    /// [`SyncError::UseAfterDestroy`].
    pub fn destroy(&self) -> Result<(), SyncError> {
        let core = self.slot.retire(OP_DESTROY)?;
        core.rendezvous
            .destroy()
            .map_err(|e| SyncError::from_sem(OP_DESTROY, e))
    }

    /// Number of parties the barrier was armed for.
    pub fn target(&self) -> Result<usize, SyncError> {
        Ok(self.slot.live(OP_QUERY)?.target)
    }

    /// Arrivals so far, stragglers included.
    pub fn arrivals(&self) -> Result<usize, SyncError> {
        Ok(self.slot.live(OP_QUERY)?.arrived.load(Ordering::Acquire))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn single_party_passes_through() {
        let barrier = Barrier::new();
        barrier.init(1).unwrap();
        assert_eq!(barrier.wait(), Ok(Arrival::Released));
        assert_eq!(barrier.wait(), Ok(Arrival::Straggler));
        assert_eq!(barrier.arrivals(), Ok(2));
    }

    #[test]
    fn zero_parties_is_rejected() {
        let barrier = Barrier::new();
        assert_eq!(barrier.init(0), Err(SyncError::InvalidCount));
        assert_eq!(
            barrier.wait(),
            Err(SyncError::UninitializedUse { op: "barrier_wait" })
        );
    }

    #[test]
    fn releases_all_parties_together() {
        let barrier = Arc::new(Barrier::new());
        barrier.init(4).unwrap();
        let waiters: Vec<_> = (0..3)
            .map(|_| {
                let b = Arc::clone(&barrier);
                thread::spawn(move || b.wait())
            })
            .collect();
        while barrier.arrivals() != Ok(3) {
            thread::yield_now();
        }
        assert_eq!(barrier.wait(), Ok(Arrival::Released));
        for waiter in waiters {
            assert_eq!(waiter.join().unwrap(), Ok(Arrival::Released));
        }
    }

    #[test]
    fn early_arrival_times_out() {
        let barrier = Barrier::new();
        barrier.init(2).unwrap();
        assert_eq!(
            barrier.wait_timeout(Duration::from_millis(20)),
            Err(SyncError::TimedOut { op: "barrier_wait" })
        );
        assert_eq!(barrier.target(), Ok(2));
    }

    #[test]
    fn destroy_twice_is_detected() {
        let barrier = Barrier::new();
        barrier.init(3).unwrap();
        barrier.destroy().unwrap();
        assert_eq!(
            barrier.destroy(),
            Err(SyncError::DoubleDestroy { op: "barrier_destroy" })
        );
        assert_eq!(
            barrier.wait(),
            Err(SyncError::UseAfterDestroy { op: "barrier_wait" })
        );
    }

    #[test]
    fn queries_report_their_own_op() {
        let barrier = Barrier::new();
        assert_eq!(
            barrier.target(),
            Err(SyncError::UninitializedUse { op: "barrier_query" })
        );
        barrier.init(2).unwrap();
        barrier.destroy().unwrap();
        assert_eq!(
            barrier.arrivals(),
            Err(SyncError::UseAfterDestroy { op: "barrier_query" })
        );
    }
}
