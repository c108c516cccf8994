//! Runtime configuration.
//!
//! A [`Runtime`](crate::Runtime) takes its [`Config`] at construction. The
//! process-wide runtime returned by [`global`](crate::global) reads it from
//! the environment:
//! - `FOOTHREAD_THREADS_MAX`: registry capacity per session. A positive
//!   integer, or `unbounded` / `0` for a growable registry. Default 1024.
//! - `FOOTHREAD_STACK_SIZE`: default stack size in bytes, with an optional
//!   `k`/`m`/`g` suffix. Default 2 MiB.
//!
//! Unparseable values fall back to the defaults.

use std::num::NonZeroUsize;

use crate::registry::{Attributes, JoinPolicy};

/// Default registry capacity.
pub const THREADS_MAX: usize = 1024;

/// Default stack size for new threads: 2 MiB.
pub const DEFAULT_STACK_SIZE: usize = 2 * 1024 * 1024;

pub(crate) const DEFAULT_STACK: NonZeroUsize = match NonZeroUsize::new(DEFAULT_STACK_SIZE) {
    Some(size) => size,
    None => panic!("default stack size must be non-zero"),
};

const DEFAULT_CAPACITY: NonZeroUsize = match NonZeroUsize::new(THREADS_MAX) {
    Some(cap) => cap,
    None => panic!("default capacity must be non-zero"),
};

/// Tunables for one [`Runtime`](crate::Runtime).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Config {
    /// Maximum control blocks per session; `None` grows without bound.
    pub capacity: Option<NonZeroUsize>,
    /// Stack size used when `create` is called without attributes.
    pub default_stack_size: NonZeroUsize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            capacity: Some(DEFAULT_CAPACITY),
            default_stack_size: DEFAULT_STACK,
        }
    }
}

impl Config {
    /// Read configuration from the process environment.
    #[must_use]
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build a configuration from an arbitrary key lookup.
    #[must_use]
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();
        if let Some(capacity) = lookup("FOOTHREAD_THREADS_MAX").and_then(|v| parse_capacity(&v)) {
            config.capacity = capacity;
        }
        if let Some(size) = lookup("FOOTHREAD_STACK_SIZE").and_then(|v| parse_size(&v)) {
            config.default_stack_size = size;
        }
        config
    }

    /// Set the registry bound (`None` = unbounded).
    #[must_use]
    pub const fn with_capacity(mut self, capacity: Option<NonZeroUsize>) -> Self {
        self.capacity = capacity;
        self
    }

    /// Set the default stack size.
    #[must_use]
    pub const fn with_default_stack_size(mut self, size: NonZeroUsize) -> Self {
        self.default_stack_size = size;
        self
    }

    /// Attributes applied when `create` receives none: detached, default stack.
    #[must_use]
    pub const fn default_attributes(&self) -> Attributes {
        Attributes {
            join_policy: JoinPolicy::Detached,
            stack_size: self.default_stack_size,
        }
    }
}

/// `Some(None)` means unbounded; `None` means unparseable.
fn parse_capacity(raw: &str) -> Option<Option<NonZeroUsize>> {
    let raw = raw.trim().to_ascii_lowercase();
    match raw.as_str() {
        "unbounded" | "none" | "unlimited" | "0" => Some(None),
        other => other.parse::<usize>().ok().map(NonZeroUsize::new),
    }
}

fn parse_size(raw: &str) -> Option<NonZeroUsize> {
    let raw = raw.trim().to_ascii_lowercase();
    let (digits, shift) = match raw.as_bytes().last()? {
        b'k' => (&raw[..raw.len() - 1], 10),
        b'm' => (&raw[..raw.len() - 1], 20),
        b'g' => (&raw[..raw.len() - 1], 30),
        _ => (raw.as_str(), 0),
    };
    let base: usize = digits.trim().parse().ok()?;
    base.checked_mul(1usize << shift).and_then(NonZeroUsize::new)
}
