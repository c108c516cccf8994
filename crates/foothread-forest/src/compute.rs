//! One joinable foothread per node.
//!
//! Leaves read a value and add it to their parent's partial sum, then arrive
//! at the parent's barrier. Internal nodes first wait on their own barrier
//! (sized `children + 1`), report the partial sum, forward it to their
//! parent unless they are a root, and then arrive at the parent's barrier.
//! For a root that last arrival is at its own, already released barrier and
//! passes straight through.
//!
//! The calling thread is the leader of every node thread: its `exit` returns
//! once all of them have finished, after which the root sums are final.

use std::io::Write;
use std::sync::Arc;
use std::sync::atomic::{AtomicI64, Ordering};

use foothread_core::log::{self, LogEntry, LogLevel};
use foothread_core::{Attributes, Barrier, Mutex, Runtime, SyncError};
use serde::Serialize;

use crate::error::ForestError;
use crate::forest::Forest;
use crate::source::LeafSource;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RootSum {
    pub node: usize,
    pub sum: i64,
}

/// Final sums, one per root in node order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RootSums {
    pub roots: Vec<RootSum>,
}

impl RootSums {
    #[must_use]
    pub fn get(&self, node: usize) -> Option<i64> {
        self.roots.iter().find(|r| r.node == node).map(|r| r.sum)
    }
}

struct Shared {
    forest: Forest,
    child_counts: Vec<usize>,
    sums: Vec<AtomicI64>,
    barriers: Vec<Barrier>,
    mutex: Mutex,
    source: parking_lot::Mutex<Box<dyn LeafSource>>,
    out: parking_lot::Mutex<Box<dyn Write + Send>>,
    failure: parking_lot::Mutex<Option<ForestError>>,
}

impl Shared {
    fn record(&self, err: ForestError) {
        let mut failure = self.failure.lock();
        if failure.is_none() {
            log::emit(
                &LogEntry::new(LogLevel::Error, "node_failed")
                    .with_details(serde_json::json!({ "error": err.to_string() })),
            );
            *failure = Some(err);
        }
    }

    /// Run `body` under the foothread mutex.
    fn critical(&self, body: impl FnOnce(&Self) -> Result<(), ForestError>) {
        if let Err(err) = self.mutex.lock() {
            self.record(err.into());
            return;
        }
        if let Err(err) = body(self) {
            self.record(err);
        }
        if let Err(err) = self.mutex.unlock() {
            self.record(err.into());
        }
    }

    fn arrive(&self, node: usize) {
        if let Err(err) = self.barriers[node].wait() {
            self.record(err.into());
        }
    }

    fn add_to_parent(&self, node: usize, value: i64) {
        let parent = self.forest.parent(node);
        self.sums[parent].fetch_add(value, Ordering::Relaxed);
    }

    fn run_node(&self, node: usize) {
        let parent = self.forest.parent(node);
        if self.child_counts[node] == 0 {
            self.critical(|shared| {
                {
                    let mut out = shared.out.lock();
                    write!(out, "Leaf Node {node:2} :: Enter a positive integer: ")?;
                    out.flush()?;
                }
                let value = shared.source.lock().read_leaf(node)?;
                shared.add_to_parent(node, value);
                Ok(())
            });
            self.arrive(parent);
        } else {
            self.arrive(node);
            self.critical(|shared| {
                let partial = shared.sums[node].load(Ordering::Relaxed);
                writeln!(
                    shared.out.lock(),
                    "Internal Node {node:2} gets the partial sum {partial:2} from its children"
                )?;
                if parent != node {
                    shared.add_to_parent(node, partial);
                }
                Ok(())
            });
            self.arrive(parent);
        }
    }

    /// Tear down the primitives. Releases any node still blocked on them.
    fn destroy(&self) -> Result<(), SyncError> {
        let mut first = self.mutex.destroy().err();
        for barrier in &self.barriers {
            if let Err(err) = barrier.destroy() {
                first.get_or_insert(err);
            }
        }
        first.map_or(Ok(()), Err)
    }
}

/// Sum every tree of `forest`, printing progress and the root sums to `out`.
///
/// Must be called from a thread that is not already leading joinable
/// threads of `runtime`: its `exit` is used to wait for the node threads.
pub fn compute_sums<S, W>(
    runtime: &Arc<Runtime>,
    forest: &Forest,
    source: S,
    out: W,
) -> Result<RootSums, ForestError>
where
    S: LeafSource + 'static,
    W: Write + Send + 'static,
{
    let child_counts = forest.child_counts();
    let barriers: Vec<Barrier> = child_counts.iter().map(|_| Barrier::new()).collect();
    for (barrier, &children) in barriers.iter().zip(&child_counts) {
        barrier.init(children + 1)?;
    }
    let mutex = Mutex::new();
    mutex.init()?;

    let shared = Arc::new(Shared {
        forest: forest.clone(),
        sums: child_counts.iter().map(|_| AtomicI64::new(0)).collect(),
        child_counts,
        barriers,
        mutex,
        source: parking_lot::Mutex::new(Box::new(source)),
        out: parking_lot::Mutex::new(Box::new(out)),
        failure: parking_lot::Mutex::new(None),
    });

    for node in 0..forest.len() {
        let rt = Arc::clone(runtime);
        let state = Arc::clone(&shared);
        let created = runtime.create(
            Some(Attributes::joinable()),
            move |node: usize| {
                state.run_node(node);
                rt.exit();
            },
            node,
        );
        if let Err(err) = created {
            // Nodes already running may be waiting on barriers that can no
            // longer fill up; destroying them lets those nodes finish.
            let _ = shared.destroy();
            runtime.exit();
            return Err(err.into());
        }
    }

    runtime.exit();

    let roots = RootSums {
        roots: forest
            .roots()
            .map(|node| RootSum {
                node,
                sum: shared.sums[node].load(Ordering::Relaxed),
            })
            .collect(),
    };
    {
        let mut out = shared.out.lock();
        for root in &roots.roots {
            writeln!(out, "Sum at root (node {}) = {}", root.node, root.sum)?;
        }
        out.flush()?;
    }

    shared.destroy()?;
    match shared.failure.lock().take() {
        Some(err) => Err(err),
        None => Ok(roots),
    }
}
