//! Ownership-checked mutex.
//!
//! A binary semaphore plus the native id of the thread that last locked it.
//! Only that thread may unlock, and unlocking a free mutex is an error. Both
//! violations are fatal through [`Mutex::unlock`]: a diagnostic naming
//! `mutex_unlock` goes to stderr and the process exits with status 1.
//! [`Mutex::try_unlock`] reports them as [`SyncError`] instead.
//!
//! Locking is not reentrant; a second `lock` by the owner deadlocks.

use std::time::Duration;

use crate::error::SyncError;
use crate::ident::NativeId;
use crate::lifecycle::Slot;
use crate::log::{self, LogEntry, LogLevel};
use crate::sem::Semaphore;

const OP_INIT: &str = "mutex_init";
const OP_LOCK: &str = "mutex_lock";
const OP_UNLOCK: &str = "mutex_unlock";
const OP_DESTROY: &str = "mutex_destroy";
const OP_QUERY: &str = "mutex_query";

#[derive(Debug, Default)]
struct OwnerRecord {
    // Kept after unlock so a repeat unlock by the same thread reads as
    // "already unlocked" rather than "not owner".
    owner: Option<NativeId>,
    locked: bool,
}

#[derive(Debug)]
struct MutexCore {
    sem: Semaphore,
    record: parking_lot::Mutex<OwnerRecord>,
}

/// Mutex with strict ownership. Starts uninitialized; call [`init`](Self::init).
#[derive(Debug)]
pub struct Mutex {
    slot: Slot<MutexCore>,
}

impl Default for Mutex {
    fn default() -> Self {
        Self::new()
    }
}

impl Mutex {
    #[must_use]
    pub const fn new() -> Self {
        Self { slot: Slot::new() }
    }

    /// Make the mutex usable: unlocked, no owner.
    pub fn init(&self) -> Result<(), SyncError> {
        self.slot.init(
            OP_INIT,
            MutexCore {
                sem: Semaphore::new(1),
                record: parking_lot::Mutex::new(OwnerRecord::default()),
            },
        )
    }

    /// Block until the mutex is free, then take it.
    pub fn lock(&self) -> Result<(), SyncError> {
        let core = self.slot.live(OP_LOCK)?;
        core.sem.wait().map_err(|e| SyncError::from_sem(OP_LOCK, e))?;
        core.take_ownership();
        Ok(())
    }

    /// [`lock`](Self::lock), giving up after `timeout` with
    /// [`SyncError::TimedOut`].
    pub fn lock_timeout(&self, timeout: Duration) -> Result<(), SyncError> {
        let core = self.slot.live(OP_LOCK)?;
        core.sem
            .wait_timeout(timeout)
            .map_err(|e| SyncError::from_sem(OP_LOCK, e))?;
        core.take_ownership();
        Ok(())
    }

    /// Release the mutex, reporting ownership violations as errors.
    pub fn try_unlock(&self) -> Result<(), SyncError> {
        let core = self.slot.live(OP_UNLOCK)?;
        let caller = NativeId::current();
        let mut record = core.record.lock();
        if record.owner != Some(caller) {
            return Err(SyncError::Unauthorized {
                owner: record.owner,
                caller,
            });
        }
        let free = core.sem.value().map_err(|e| SyncError::from_sem(OP_UNLOCK, e))? > 0;
        if !record.locked || free {
            return Err(SyncError::AlreadyUnlocked);
        }
        record.locked = false;
        core.sem
            .signal()
            .map_err(|e| SyncError::from_sem(OP_UNLOCK, e))
    }

    /// Release the mutex.
    ///
    /// Unlocking a mutex the caller does not own, or one that is already
    /// free, terminates the process. Lifecycle errors (uninitialized,
    /// destroyed) are returned.
    pub fn unlock(&self) -> Result<(), SyncError> {
        match self.try_unlock() {
            Err(err) if err.is_invariant_violation() => log::fatal(OP_UNLOCK, err),
            other => other,
        }
    }

    /// Release the semaphore and forget the owner. Blocked lockers fail with
    /// [`SyncError::UseAfterDestroy`].
    pub fn destroy(&self) -> Result<(), SyncError> {
        let core = self.slot.retire(OP_DESTROY)?;
        core.sem
            .destroy()
            .map_err(|e| SyncError::from_sem(OP_DESTROY, e))?;
        log::emit(&LogEntry::new(LogLevel::Trace, "mutex_destroyed").with_op(OP_DESTROY));
        Ok(())
    }

    /// Whether some thread currently holds the mutex.
    pub fn is_locked(&self) -> Result<bool, SyncError> {
        let core = self.slot.live(OP_QUERY)?;
        let locked = core.record.lock().locked;
        Ok(locked)
    }

    /// The current holder, if locked.
    pub fn owner(&self) -> Result<Option<NativeId>, SyncError> {
        let core = self.slot.live(OP_QUERY)?;
        let record = core.record.lock();
        Ok(record.locked.then_some(record.owner).flatten())
    }
}

impl MutexCore {
    fn take_ownership(&self) {
        let mut record = self.record.lock();
        record.owner = Some(NativeId::current());
        record.locked = true;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn lock_records_the_caller() {
        let mutex = Mutex::new();
        mutex.init().unwrap();
        assert_eq!(mutex.owner(), Ok(None));
        mutex.lock().unwrap();
        assert_eq!(mutex.owner(), Ok(Some(NativeId::current())));
        assert_eq!(mutex.is_locked(), Ok(true));
        mutex.unlock().unwrap();
        assert_eq!(mutex.is_locked(), Ok(false));
        assert_eq!(mutex.owner(), Ok(None));
        mutex.destroy().unwrap();
    }

    #[test]
    fn fresh_mutex_has_no_owner_to_unlock() {
        let mutex = Mutex::new();
        mutex.init().unwrap();
        let err = mutex.try_unlock().unwrap_err();
        assert!(matches!(err, SyncError::Unauthorized { owner: None, .. }));
    }

    #[test]
    fn second_unlock_by_owner_is_already_unlocked() {
        let mutex = Mutex::new();
        mutex.init().unwrap();
        mutex.lock().unwrap();
        mutex.try_unlock().unwrap();
        assert_eq!(mutex.try_unlock(), Err(SyncError::AlreadyUnlocked));
    }

    #[test]
    fn other_thread_cannot_unlock() {
        let mutex = Arc::new(Mutex::new());
        mutex.init().unwrap();
        mutex.lock().unwrap();
        let owner = NativeId::current();
        let m = Arc::clone(&mutex);
        let err = thread::spawn(move || m.try_unlock()).join().unwrap().unwrap_err();
        match err {
            SyncError::Unauthorized { owner: recorded, caller } => {
                assert_eq!(recorded, Some(owner));
                assert_ne!(caller, owner);
            }
            other => panic!("expected Unauthorized, got {other:?}"),
        }
        mutex.unlock().unwrap();
    }

    #[test]
    fn lock_timeout_while_held() {
        let mutex = Mutex::new();
        mutex.init().unwrap();
        mutex.lock().unwrap();
        assert_eq!(
            mutex.lock_timeout(Duration::from_millis(20)),
            Err(SyncError::TimedOut { op: "mutex_lock" })
        );
        mutex.unlock().unwrap();
    }

    #[test]
    fn lifecycle_errors_are_returned_not_fatal() {
        let mutex = Mutex::new();
        assert_eq!(
            mutex.unlock(),
            Err(SyncError::UninitializedUse { op: "mutex_unlock" })
        );
        assert_eq!(
            mutex.destroy(),
            Err(SyncError::UninitializedUse { op: "mutex_destroy" })
        );
        mutex.init().unwrap();
        assert_eq!(
            mutex.init(),
            Err(SyncError::AlreadyInitialized { op: "mutex_init" })
        );
        mutex.destroy().unwrap();
        assert_eq!(
            mutex.destroy(),
            Err(SyncError::DoubleDestroy { op: "mutex_destroy" })
        );
        assert_eq!(
            mutex.lock(),
            Err(SyncError::UseAfterDestroy { op: "mutex_lock" })
        );
        mutex.init().unwrap();
        mutex.lock().unwrap();
        mutex.unlock().unwrap();
    }

    #[test]
    fn queries_report_their_own_op() {
        let mutex = Mutex::new();
        assert_eq!(
            mutex.is_locked(),
            Err(SyncError::UninitializedUse { op: "mutex_query" })
        );
        mutex.init().unwrap();
        mutex.destroy().unwrap();
        assert_eq!(
            mutex.owner(),
            Err(SyncError::UseAfterDestroy { op: "mutex_query" })
        );
    }

    #[test]
    fn destroy_releases_a_blocked_locker() {
        let mutex = Arc::new(Mutex::new());
        mutex.init().unwrap();
        mutex.lock().unwrap();
        let m = Arc::clone(&mutex);
        let waiter = thread::spawn(move || m.lock());
        thread::sleep(Duration::from_millis(20));
        mutex.destroy().unwrap();
        assert_eq!(
            waiter.join().unwrap(),
            Err(SyncError::UseAfterDestroy { op: "mutex_lock" })
        );
    }
}
