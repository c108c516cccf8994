//! Thread creation and the leader/follower join protocol.
//!
//! There is no native join. A thread that creates joinable children becomes
//! their *leader*; its [`Runtime::exit`] is a rendezvous that completes only
//! when every direct joinable child has called `exit` itself. Each leader has
//! its own join channel (a counting semaphore plus counters), so unrelated
//! leader chains never see each other's completions.
//!
//! ## Sessions
//!
//! Library state (creation gate, registry, join channels) is created lazily by
//! the first `create` and torn down when the last leader finishes its join,
//! or by [`Runtime::shutdown`]. The next `create` starts a fresh session.
//! Control-block ids keep increasing across sessions.
//!
//! ## Execution contexts
//!
//! Each thread is an OS thread in the creator's address space, signal
//! disposition and filesystem namespace, launched through
//! `std::thread::Builder` with the requested stack size. The new thread gets
//! its own control block handed to it at launch and keeps it in a
//! thread-local, so `exit` never has to search the registry for the caller.

use std::cell::RefCell;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::thread;
use std::time::{Duration, Instant};

use parking_lot::Mutex;

use crate::config::Config;
use crate::error::{SemError, ThreadError};
use crate::ident::NativeId;
use crate::log::{self, LogEntry, LogLevel};
use crate::registry::{Attributes, ControlBlock, JoinChannel, JoinPolicy, Leader, Registry};
use crate::sem::{GateGuard, Gated};

static NEXT_RUNTIME_KEY: AtomicU64 = AtomicU64::new(1);

thread_local! {
    static CURRENT: RefCell<Option<Current>> = const { RefCell::new(None) };
}

/// What a launched thread knows about itself.
struct Current {
    runtime: u64,
    block: Arc<ControlBlock>,
}

struct Session {
    registry: Gated<Registry>,
}

/// Handle returned by [`Runtime::create`].
#[derive(Debug, Clone)]
pub struct ThreadHandle {
    block: Arc<ControlBlock>,
}

impl ThreadHandle {
    #[must_use]
    pub fn id(&self) -> u64 {
        self.block.id()
    }

    #[must_use]
    pub fn join_policy(&self) -> JoinPolicy {
        self.block.attributes().join_policy
    }

    #[must_use]
    pub fn stack_size(&self) -> usize {
        self.block.attributes().stack_size.get()
    }

    #[must_use]
    pub fn leader(&self) -> Leader {
        self.block.leader()
    }

    /// Whether the thread has called `exit`.
    #[must_use]
    pub fn has_exited(&self) -> bool {
        self.block.has_exited()
    }
}

/// Library state: one instance per independent thread family.
pub struct Runtime {
    key: u64,
    config: Config,
    next_id: AtomicU64,
    session: Mutex<Option<Arc<Session>>>,
}

impl Default for Runtime {
    fn default() -> Self {
        Self::new(Config::default())
    }
}

impl Runtime {
    #[must_use]
    pub fn new(config: Config) -> Self {
        Self {
            key: NEXT_RUNTIME_KEY.fetch_add(1, Ordering::Relaxed),
            config,
            next_id: AtomicU64::new(1),
            session: Mutex::new(None),
        }
    }

    #[must_use]
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Whether a session is active.
    #[must_use]
    pub fn is_initialized(&self) -> bool {
        self.session.lock().is_some()
    }

    /// Number of control blocks in the current session (0 when uninitialized).
    #[must_use]
    pub fn registered(&self) -> usize {
        let Some(session) = self.session.lock().clone() else {
            return 0;
        };
        session.registry.acquire().map_or(0, |registry| registry.len())
    }

    /// Launch `entry(arg)` on a new thread.
    ///
    /// `attributes` of `None` means detached with the configured default
    /// stack size. On error nothing is registered and no thread runs.
    pub fn create<F, A>(
        &self,
        attributes: Option<Attributes>,
        entry: F,
        arg: A,
    ) -> Result<ThreadHandle, ThreadError>
    where
        F: FnOnce(A) + Send + 'static,
        A: Send + 'static,
    {
        let attributes = attributes.unwrap_or_else(|| self.config.default_attributes());
        loop {
            let session = self.session_or_init();
            match session.registry.acquire() {
                Ok(mut registry) => return self.launch(&mut registry, attributes, entry, arg),
                // Torn down between lookup and entry: start over on a fresh one.
                Err(_) => self.forget_session(&session),
            }
        }
    }

    fn launch<F, A>(
        &self,
        registry: &mut Registry,
        attributes: Attributes,
        entry: F,
        arg: A,
    ) -> Result<ThreadHandle, ThreadError>
    where
        F: FnOnce(A) + Send + 'static,
        A: Send + 'static,
    {
        if let Some(capacity) = registry.full_at() {
            log::emit(
                &LogEntry::new(LogLevel::Warn, "thread_create_failed")
                    .with_op("create")
                    .with_details(serde_json::json!({ "reason": "capacity", "capacity": capacity })),
            );
            return Err(ThreadError::CapacityExceeded { capacity });
        }

        let creator = NativeId::current();
        let id = self.next_id.load(Ordering::Acquire);
        let (leader, link) = match attributes.join_policy {
            JoinPolicy::Detached => (Leader::SelfLed, None),
            JoinPolicy::Joinable => {
                let channel = registry
                    .channel(creator)
                    .unwrap_or_else(|| Arc::new(JoinChannel::new()));
                (Leader::Creator(creator), Some(channel))
            }
        };
        let block = Arc::new(ControlBlock::new(id, leader, attributes, link.clone()));

        let child_block = Arc::clone(&block);
        let runtime = self.key;
        let spawned = thread::Builder::new()
            .name(format!("foothread-{id}"))
            .stack_size(attributes.stack_size.get())
            .spawn(move || {
                CURRENT.with(|slot| {
                    *slot.borrow_mut() = Some(Current {
                        runtime,
                        block: child_block,
                    });
                });
                entry(arg);
            });
        // The OS thread is not joined natively; dropping the handle detaches it.
        if let Err(source) = spawned {
            log::emit(
                &LogEntry::new(LogLevel::Warn, "thread_create_failed")
                    .with_op("create")
                    .with_native(creator)
                    .with_errno(source.raw_os_error().unwrap_or(0))
                    .with_details(serde_json::json!({
                        "reason": "stack",
                        "stack_size": attributes.stack_size.get(),
                    })),
            );
            return Err(ThreadError::AllocationFailed {
                stack_size: attributes.stack_size.get(),
                source,
            });
        }

        self.next_id.store(id + 1, Ordering::Release);
        if let Some(channel) = link {
            registry.adopt(creator, channel);
        }
        registry.push(Arc::clone(&block));
        log::emit(
            &LogEntry::new(LogLevel::Debug, "thread_create")
                .with_op("create")
                .with_thread(id)
                .with_native(creator)
                .with_details(serde_json::json!({
                    "joinable": attributes.join_policy == JoinPolicy::Joinable,
                    "stack_size": attributes.stack_size.get(),
                })),
        );
        Ok(ThreadHandle { block })
    }

    /// Leave the join protocol. Idempotent.
    ///
    /// - Uninitialized runtime, or a detached caller: returns immediately.
    /// - Leader: blocks until every joinable child it created has called
    ///   `exit`. The last leader to finish tears the session down.
    /// - Follower: signals its leader once.
    ///
    /// A caller that is both first joins its own followers, then signals.
    pub fn exit(&self) {
        if let Err(err) = self.exit_until(None) {
            log::emit(
                &LogEntry::new(LogLevel::Warn, "exit_interrupted")
                    .with_op("exit")
                    .with_native(NativeId::current())
                    .with_details(serde_json::json!({ "error": err.to_string() })),
            );
        }
    }

    /// [`exit`](Self::exit) with a bounded leader join.
    ///
    /// On [`ThreadError::JoinTimedOut`] the followers accounted for so far
    /// stay accounted for; calling `exit` again resumes the join.
    pub fn exit_timeout(&self, timeout: Duration) -> Result<(), ThreadError> {
        self.exit_until(Instant::now().checked_add(timeout))
    }

    fn exit_until(&self, deadline: Option<Instant>) -> Result<(), ThreadError> {
        let Some(session) = self.session.lock().clone() else {
            return Ok(());
        };
        let me = self.current_block();
        if me
            .as_ref()
            .is_some_and(|block| block.attributes().join_policy == JoinPolicy::Detached)
        {
            return Ok(());
        }

        let caller = NativeId::current();
        let channel = match session.registry.acquire() {
            Ok(registry) => registry.channel(caller),
            Err(_) => None,
        };
        if let Some(channel) = channel {
            self.join_followers(&session, caller, &channel, deadline)?;
        }

        if let Some(block) = me {
            if let Some(link) = block.take_exit() {
                log::emit(
                    &LogEntry::new(LogLevel::Debug, "follower_signal")
                        .with_op("exit")
                        .with_thread(block.id())
                        .with_native(caller),
                );
                // A destroyed channel means the session was shut down under us.
                let _ = link.rendezvous().signal();
            }
        }
        Ok(())
    }

    fn join_followers(
        &self,
        session: &Arc<Session>,
        leader: NativeId,
        channel: &Arc<JoinChannel>,
        deadline: Option<Instant>,
    ) -> Result<(), ThreadError> {
        log::emit(
            &LogEntry::new(LogLevel::Debug, "leader_join_begin")
                .with_op("exit")
                .with_native(leader)
                .with_details(serde_json::json!({
                    "followers": channel.expected(),
                    "pending": channel.pending(),
                })),
        );
        // Only this thread adds followers to its own channel, and it is here.
        while channel.pending() > 0 {
            let waited = match deadline {
                None => channel.rendezvous().wait(),
                Some(deadline) => channel.rendezvous().wait_until(deadline),
            };
            match waited {
                Ok(()) => channel.mark_joined(),
                Err(SemError::TimedOut) => {
                    return Err(ThreadError::JoinTimedOut {
                        pending: channel.pending(),
                    });
                }
                Err(_) => return Err(ThreadError::ShutDown),
            }
        }
        log::emit(
            &LogEntry::new(LogLevel::Debug, "leader_join_done")
                .with_op("exit")
                .with_native(leader)
                .with_details(serde_json::json!({ "joined": channel.expected() })),
        );

        let Ok(mut registry) = session.registry.acquire() else {
            return Ok(());
        };
        registry.retire(leader, channel);
        let _ = channel.rendezvous().destroy();
        if !registry.has_leaders() {
            self.dismantle(session, registry);
            log::emit(&LogEntry::new(LogLevel::Info, "session_teardown").with_native(leader));
        }
        Ok(())
    }

    /// Tear down the current session. Idempotent.
    ///
    /// Leaders blocked in `exit` are released, the registry is emptied and
    /// the runtime becomes uninitialized. Threads already running keep
    /// running; their later `exit` calls are no-ops.
    pub fn shutdown(&self) {
        // The session stays installed until its gate is held, so a `create`
        // still inside the old session finishes before a new one can start.
        let Some(session) = self.session.lock().clone() else {
            return;
        };
        let released = session.registry.acquire().map_or_else(
            |_| {
                self.forget_session(&session);
                0
            },
            |registry| self.dismantle(&session, registry),
        );
        log::emit(
            &LogEntry::new(LogLevel::Info, "shutdown")
                .with_details(serde_json::json!({ "released_leaders": released })),
        );
    }

    /// Empty the registry, detach the session from the runtime and destroy
    /// its semaphores. Returns the number of join channels destroyed.
    fn dismantle(&self, session: &Arc<Session>, mut registry: GateGuard<'_, Registry>) -> usize {
        let channels = registry.reset();
        self.forget_session(session);
        // Anyone queued on the gate now fails and retries on a fresh session.
        let _ = session.registry.destroy();
        drop(registry);
        for channel in &channels {
            let _ = channel.rendezvous().destroy();
        }
        channels.len()
    }

    /// Ids of the joinable threads the caller has created in this session.
    #[must_use]
    pub fn followers(&self) -> Vec<u64> {
        let Some(session) = self.session.lock().clone() else {
            return Vec::new();
        };
        let caller = NativeId::current();
        session.registry.acquire().map_or_else(
            |_| Vec::new(),
            |registry| registry.followers_of(caller).map(|block| block.id()).collect(),
        )
    }

    /// Handle of the calling thread, if this runtime launched it.
    #[must_use]
    pub fn current(&self) -> Option<ThreadHandle> {
        self.current_block().map(|block| ThreadHandle { block })
    }

    fn current_block(&self) -> Option<Arc<ControlBlock>> {
        CURRENT.with(|slot| {
            slot.borrow()
                .as_ref()
                .filter(|current| current.runtime == self.key)
                .map(|current| Arc::clone(&current.block))
        })
    }

    fn session_or_init(&self) -> Arc<Session> {
        let mut slot = self.session.lock();
        if let Some(session) = slot.as_ref() {
            return Arc::clone(session);
        }
        let session = Arc::new(Session {
            registry: Gated::new(Registry::new(self.config.capacity)),
        });
        *slot = Some(Arc::clone(&session));
        log::emit(
            &LogEntry::new(LogLevel::Info, "session_init").with_details(serde_json::json!({
                "capacity": self.config.capacity.map(|c| c.get()),
            })),
        );
        session
    }

    fn forget_session(&self, session: &Arc<Session>) {
        let mut slot = self.session.lock();
        if slot.as_ref().is_some_and(|current| Arc::ptr_eq(current, session)) {
            *slot = None;
        }
    }
}
