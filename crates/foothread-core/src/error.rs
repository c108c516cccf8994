//! Error types.
//!
//! Creation failures are recoverable and come back as [`ThreadError`].
//! Misuse of a mutex or barrier is a [`SyncError`]; the two mutex ownership
//! violations are additionally fatal when raised through
//! [`Mutex::unlock`](crate::Mutex::unlock).

use std::io;

use thiserror::Error;

use crate::ident::NativeId;

/// Failure of a thread lifecycle operation.
#[derive(Debug, Error)]
pub enum ThreadError {
    #[error("thread registry is full ({capacity} control blocks)")]
    CapacityExceeded { capacity: usize },
    #[error("could not allocate a {stack_size}-byte stack: {source}")]
    AllocationFailed {
        stack_size: usize,
        #[source]
        source: io::Error,
    },
    #[error("runtime was shut down while waiting")]
    ShutDown,
    #[error("join timed out with {pending} follower(s) still running")]
    JoinTimedOut { pending: usize },
}

/// Misuse of a [`Mutex`](crate::Mutex) or [`Barrier`](crate::Barrier).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum SyncError {
    #[error("{op}: used before init")]
    UninitializedUse { op: &'static str },
    #[error("{op}: used after destroy")]
    UseAfterDestroy { op: &'static str },
    #[error("{op}: already destroyed")]
    DoubleDestroy { op: &'static str },
    #[error("{op}: already initialized")]
    AlreadyInitialized { op: &'static str },
    #[error("barrier count must be at least 1")]
    InvalidCount,
    #[error("mutex_unlock: not owner (owner {owner:?}, caller {caller})")]
    Unauthorized {
        owner: Option<NativeId>,
        caller: NativeId,
    },
    #[error("mutex_unlock: already unlocked")]
    AlreadyUnlocked,
    #[error("{op}: timed out")]
    TimedOut { op: &'static str },
}

impl SyncError {
    /// POSIX errno closest to this error, for diagnostics.
    #[must_use]
    pub const fn errno(self) -> i32 {
        match self {
            Self::UninitializedUse { .. }
            | Self::UseAfterDestroy { .. }
            | Self::DoubleDestroy { .. }
            | Self::InvalidCount => libc::EINVAL,
            Self::AlreadyInitialized { .. } => libc::EBUSY,
            Self::Unauthorized { .. } | Self::AlreadyUnlocked => libc::EPERM,
            Self::TimedOut { .. } => libc::ETIMEDOUT,
        }
    }

    /// Ownership violations that `unlock` treats as unrecoverable.
    #[must_use]
    pub const fn is_invariant_violation(self) -> bool {
        matches!(self, Self::Unauthorized { .. } | Self::AlreadyUnlocked)
    }

    pub(crate) const fn from_sem(op: &'static str, err: SemError) -> Self {
        match err {
            SemError::Destroyed => Self::UseAfterDestroy { op },
            SemError::AlreadyDestroyed => Self::DoubleDestroy { op },
            SemError::TimedOut | SemError::WouldBlock => Self::TimedOut { op },
        }
    }
}

/// Failure of a [`Semaphore`](crate::sem::Semaphore) operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum SemError {
    #[error("semaphore destroyed")]
    Destroyed,
    #[error("semaphore already destroyed")]
    AlreadyDestroyed,
    #[error("semaphore wait timed out")]
    TimedOut,
    #[error("semaphore value is zero")]
    WouldBlock,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ownership_violations_are_fatal_class() {
        let caller = NativeId::current();
        assert!(SyncError::Unauthorized { owner: None, caller }.is_invariant_violation());
        assert!(SyncError::AlreadyUnlocked.is_invariant_violation());
        assert!(!SyncError::UninitializedUse { op: "mutex_lock" }.is_invariant_violation());
    }

    #[test]
    fn errno_mapping() {
        assert_eq!(SyncError::AlreadyUnlocked.errno(), libc::EPERM);
        assert_eq!(SyncError::InvalidCount.errno(), libc::EINVAL);
        assert_eq!(
            SyncError::AlreadyInitialized { op: "mutex_init" }.errno(),
            libc::EBUSY
        );
    }

    #[test]
    fn sem_errors_carry_the_operation() {
        assert_eq!(
            SyncError::from_sem("barrier_wait", SemError::Destroyed),
            SyncError::UseAfterDestroy { op: "barrier_wait" }
        );
        let msg = SyncError::from_sem("mutex_lock", SemError::TimedOut).to_string();
        assert_eq!(msg, "mutex_lock: timed out");
    }

    #[test]
    fn capacity_message_names_the_bound() {
        let err = ThreadError::CapacityExceeded { capacity: 4 };
        assert!(err.to_string().contains('4'));
    }
}
