//! Thread control blocks and the per-session registry.
//!
//! The registry is only ever touched through the creation gate
//! ([`Gated<Registry>`](crate::sem::Gated)). It owns the list of control
//! blocks created in the current session and the table of join channels,
//! one per leader.

use std::collections::HashMap;
use std::num::NonZeroUsize;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use crate::config::DEFAULT_STACK;
use crate::ident::NativeId;
use crate::sem::Semaphore;

/// Whether a thread takes part in its creator's join.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash)]
pub enum JoinPolicy {
    /// The creator's `exit` waits for this thread's `exit`.
    Joinable,
    /// Fire-and-forget; never blocks anyone.
    #[default]
    Detached,
}

/// Creation attributes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Attributes {
    pub join_policy: JoinPolicy,
    pub stack_size: NonZeroUsize,
}

impl Attributes {
    /// Detached with a 2 MiB stack.
    pub const DEFAULT: Self = Self {
        join_policy: JoinPolicy::Detached,
        stack_size: DEFAULT_STACK,
    };

    /// Shorthand for `DEFAULT.with_join_policy(JoinPolicy::Joinable)`.
    #[must_use]
    pub const fn joinable() -> Self {
        Self::DEFAULT.with_join_policy(JoinPolicy::Joinable)
    }

    #[must_use]
    pub const fn with_join_policy(mut self, join_policy: JoinPolicy) -> Self {
        self.join_policy = join_policy;
        self
    }

    #[must_use]
    pub const fn with_stack_size(mut self, stack_size: NonZeroUsize) -> Self {
        self.stack_size = stack_size;
        self
    }
}

impl Default for Attributes {
    fn default() -> Self {
        Self::DEFAULT
    }
}

/// Who joins a thread.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Leader {
    /// Detached: the thread leads itself and joins nobody.
    SelfLed,
    /// Joinable: the native id of the thread that called `create`.
    Creator(NativeId),
}

/// Completion channel owned by one leader.
///
/// Every joinable child signals `rendezvous` once on exit; the leader waits
/// on it once per child. `expected` only grows under the creation gate and
/// `joined` is only touched by the leader itself.
#[derive(Debug)]
pub(crate) struct JoinChannel {
    rendezvous: Semaphore,
    expected: AtomicUsize,
    joined: AtomicUsize,
}

impl JoinChannel {
    pub(crate) fn new() -> Self {
        Self {
            rendezvous: Semaphore::new(0),
            expected: AtomicUsize::new(0),
            joined: AtomicUsize::new(0),
        }
    }

    pub(crate) fn rendezvous(&self) -> &Semaphore {
        &self.rendezvous
    }

    pub(crate) fn pending(&self) -> usize {
        self.expected
            .load(Ordering::Acquire)
            .saturating_sub(self.joined.load(Ordering::Acquire))
    }

    pub(crate) fn expected(&self) -> usize {
        self.expected.load(Ordering::Acquire)
    }

    pub(crate) fn mark_joined(&self) {
        self.joined.fetch_add(1, Ordering::AcqRel);
    }
}

/// Per-thread control block.
#[derive(Debug)]
pub struct ControlBlock {
    id: u64,
    leader: Leader,
    attributes: Attributes,
    link: Option<Arc<JoinChannel>>,
    exited: AtomicBool,
}

impl ControlBlock {
    pub(crate) fn new(
        id: u64,
        leader: Leader,
        attributes: Attributes,
        link: Option<Arc<JoinChannel>>,
    ) -> Self {
        Self {
            id,
            leader,
            attributes,
            link,
            exited: AtomicBool::new(false),
        }
    }

    #[must_use]
    pub fn id(&self) -> u64 {
        self.id
    }

    #[must_use]
    pub fn leader(&self) -> Leader {
        self.leader
    }

    #[must_use]
    pub fn attributes(&self) -> Attributes {
        self.attributes
    }

    #[must_use]
    pub fn has_exited(&self) -> bool {
        self.exited.load(Ordering::Acquire)
    }

    /// Mark the thread exited. Returns the leader's channel the first time a
    /// joinable thread exits, `None` on every later call and for detached
    /// threads.
    pub(crate) fn take_exit(&self) -> Option<&Arc<JoinChannel>> {
        if self.exited.swap(true, Ordering::AcqRel) {
            return None;
        }
        self.link.as_ref()
    }
}

/// Control blocks and join channels of one session.
#[derive(Debug)]
pub(crate) struct Registry {
    blocks: Vec<Arc<ControlBlock>>,
    channels: HashMap<NativeId, Arc<JoinChannel>>,
    capacity: Option<NonZeroUsize>,
}

impl Registry {
    pub(crate) fn new(capacity: Option<NonZeroUsize>) -> Self {
        Self {
            blocks: Vec::new(),
            channels: HashMap::new(),
            capacity,
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.blocks.len()
    }

    /// The bound that is currently reached, if any.
    pub(crate) fn full_at(&self) -> Option<usize> {
        self.capacity
            .map(NonZeroUsize::get)
            .filter(|&cap| self.blocks.len() >= cap)
    }

    pub(crate) fn push(&mut self, block: Arc<ControlBlock>) {
        self.blocks.push(block);
    }

    pub(crate) fn channel(&self, leader: NativeId) -> Option<Arc<JoinChannel>> {
        self.channels.get(&leader).cloned()
    }

    /// Count one more follower on `leader`'s channel, installing it if new.
    pub(crate) fn adopt(&mut self, leader: NativeId, channel: Arc<JoinChannel>) {
        let channel = self.channels.entry(leader).or_insert(channel);
        channel.expected.fetch_add(1, Ordering::AcqRel);
    }

    /// Remove `leader`'s channel if it is still `channel`.
    pub(crate) fn retire(&mut self, leader: NativeId, channel: &Arc<JoinChannel>) {
        if self
            .channels
            .get(&leader)
            .is_some_and(|current| Arc::ptr_eq(current, channel))
        {
            self.channels.remove(&leader);
        }
    }

    pub(crate) fn has_leaders(&self) -> bool {
        !self.channels.is_empty()
    }

    /// Control blocks whose leader is `leader`.
    pub(crate) fn followers_of(&self, leader: NativeId) -> impl Iterator<Item = &Arc<ControlBlock>> {
        self.blocks
            .iter()
            .filter(move |block| block.leader == Leader::Creator(leader))
    }

    /// Empty the registry, handing back the channels so they can be destroyed.
    pub(crate) fn reset(&mut self) -> Vec<Arc<JoinChannel>> {
        self.blocks.clear();
        self.channels.drain().map(|(_, channel)| channel).collect()
    }
}
