//! Native thread identity.
//!
//! Every thread that touches the library, whether launched by a [`Runtime`]
//! or not, is identified by its kernel thread id. Leaders are keyed by it and
//! mutex ownership is recorded with it.
//!
//! [`Runtime`]: crate::Runtime

use std::cell::Cell;
use std::fmt;

use serde::Serialize;

/// Kernel-level id of a thread (`gettid` on Linux).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct NativeId(i64);

thread_local! {
    static CACHED: Cell<Option<NativeId>> = const { Cell::new(None) };
}

impl NativeId {
    /// Id of the calling thread. Resolved once per thread, then cached.
    #[must_use]
    pub fn current() -> Self {
        CACHED.with(|slot| {
            if let Some(id) = slot.get() {
                return id;
            }
            let id = NativeId(raw_thread_id());
            slot.set(Some(id));
            id
        })
    }

    /// The raw integer id.
    #[must_use]
    pub const fn as_raw(self) -> i64 {
        self.0
    }
}

impl fmt::Display for NativeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "tid {}", self.0)
    }
}

#[cfg(target_os = "linux")]
fn raw_thread_id() -> i64 {
    // SAFETY: gettid takes no arguments and cannot fail.
    let tid = unsafe { libc::syscall(libc::SYS_gettid) };
    tid as i64
}

#[cfg(not(target_os = "linux"))]
fn raw_thread_id() -> i64 {
    use std::sync::atomic::{AtomicI64, Ordering};

    // No gettid: hand out process-unique ids instead.
    static NEXT: AtomicI64 = AtomicI64::new(1);
    NEXT.fetch_add(1, Ordering::Relaxed)
}
