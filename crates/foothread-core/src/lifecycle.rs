//! Init/destroy state shared by [`Mutex`](crate::Mutex) and
//! [`Barrier`](crate::Barrier).

use std::sync::Arc;

use parking_lot::RwLock;

use crate::error::SyncError;

#[derive(Debug)]
enum State<T> {
    Uninitialized,
    Live(Arc<T>),
    Destroyed,
}

/// A primitive's live core, or the reason there is none.
///
/// Operations clone the `Arc` out and drop the lock before blocking, so a
/// concurrent `destroy` never waits behind a sleeping waiter.
#[derive(Debug)]
pub(crate) struct Slot<T> {
    state: RwLock<State<T>>,
}

impl<T> Slot<T> {
    pub(crate) const fn new() -> Self {
        Self {
            state: RwLock::new(State::Uninitialized),
        }
    }

    /// Install `core`. Fails if one is already live.
    pub(crate) fn init(&self, op: &'static str, core: T) -> Result<(), SyncError> {
        let mut state = self.state.write();
        if matches!(*state, State::Live(_)) {
            return Err(SyncError::AlreadyInitialized { op });
        }
        *state = State::Live(Arc::new(core));
        Ok(())
    }

    pub(crate) fn live(&self, op: &'static str) -> Result<Arc<T>, SyncError> {
        match &*self.state.read() {
            State::Live(core) => Ok(Arc::clone(core)),
            State::Uninitialized => Err(SyncError::UninitializedUse { op }),
            State::Destroyed => Err(SyncError::UseAfterDestroy { op }),
        }
    }

    /// Take the live core out, leaving the slot destroyed.
    pub(crate) fn retire(&self, op: &'static str) -> Result<Arc<T>, SyncError> {
        let mut state = self.state.write();
        match std::mem::replace(&mut *state, State::Destroyed) {
            State::Live(core) => Ok(core),
            State::Uninitialized => {
                *state = State::Uninitialized;
                Err(SyncError::UninitializedUse { op })
            }
            State::Destroyed => Err(SyncError::DoubleDestroy { op }),
        }
    }
}
