//! # foothread-forest
//!
//! Sums the trees of a parent-pointer forest with one foothread per node,
//! synchronizing through one [`foothread_core::Mutex`] and a barrier per
//! node.

#![deny(unsafe_code)]

pub mod compute;
pub mod error;
pub mod forest;
#[cfg(unix)]
#[allow(unsafe_code)]
pub mod signals;
pub mod source;

pub use compute::{RootSum, RootSums, compute_sums};
pub use error::ForestError;
pub use forest::Forest;
pub use source::{LeafSource, MapSource, ReaderSource};
