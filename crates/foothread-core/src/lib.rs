//! # foothread-core
//!
//! User-level threads with a leader/follower join protocol, an
//! ownership-checked mutex and a one-shot barrier, all built from one
//! counting-semaphore primitive.
//!
//! A [`Runtime`] owns the thread registry and join channels. Most programs
//! use the process-wide one through [`create_thread`] and [`exit_thread`]:
//!
//! ```
//! use foothread_core::{create_thread, exit_thread, Attributes};
//!
//! create_thread(Some(Attributes::joinable()), |n: u32| {
//!     assert_eq!(n, 7);
//!     exit_thread();
//! }, 7).unwrap();
//! // Returns once the child has called exit_thread().
//! exit_thread();
//! ```
//!
//! `unsafe` is confined to the semaphore-gated cell and the native thread id
//! lookup.

#![deny(unsafe_code)]

pub mod barrier;
pub mod config;
pub mod error;
#[allow(unsafe_code)]
pub mod ident;
mod lifecycle;
pub mod log;
pub mod mutex;
pub mod registry;
#[allow(unsafe_code)]
pub mod sem;
pub mod thread;

use std::sync::OnceLock;

pub use barrier::{Arrival, Barrier};
pub use config::Config;
pub use error::{SemError, SyncError, ThreadError};
pub use ident::NativeId;
pub use mutex::Mutex;
pub use registry::{Attributes, JoinPolicy, Leader};
pub use thread::{Runtime, ThreadHandle};

/// The process-wide runtime, configured from the environment on first use.
pub fn global() -> &'static Runtime {
    static GLOBAL: OnceLock<Runtime> = OnceLock::new();
    GLOBAL.get_or_init(|| Runtime::new(Config::from_env()))
}

/// [`Runtime::create`] on the [`global`] runtime.
pub fn create_thread<F, A>(
    attributes: Option<Attributes>,
    entry: F,
    arg: A,
) -> Result<ThreadHandle, ThreadError>
where
    F: FnOnce(A) + Send + 'static,
    A: Send + 'static,
{
    global().create(attributes, entry, arg)
}

/// [`Runtime::exit`] on the [`global`] runtime.
pub fn exit_thread() {
    global().exit();
}
