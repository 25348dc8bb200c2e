//! The `Executor` collaborator and two concrete implementations
//!
//! [`OrderedExecutor`](crate::OrderedExecutor) delegates actually running a
//! task to any `Executor`; this crate supplies [`RayonExecutor`] (a thin
//! wrapper over `rayon::spawn`, used as the default) and [`DeadlineExecutor`]
//! (the "priority variant ordering by deadline" the design recommends for
//! expirable tasks, layered over any other `Executor`).

use crate::error::OrderedTaskError;
use log::warn;
use parking_lot::Mutex;
use std::cmp::Ordering as CmpOrdering;
use std::collections::BinaryHeap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

/// A boxed, one-shot unit of work handed to an [`Executor`].
pub type BoxedTask = Box<dyn FnOnce() + Send>;

/// The external execution collaborator [`crate::OrderedExecutor`] delegates
/// to. Any conforming executor works; nothing in this crate assumes a
/// particular thread pool implementation.
pub trait Executor: Send + Sync {
    /// Hand `task` off for execution. Must not block the caller waiting for
    /// `task` to complete.
    fn execute(&self, task: BoxedTask);
}

/// The default [`Executor`]: every task is handed to the global `rayon`
/// thread pool via `rayon::spawn`.
#[derive(Default, Clone, Copy)]
pub struct RayonExecutor;

impl Executor for RayonExecutor {
    fn execute(&self, task: BoxedTask) {
        rayon::spawn(task);
    }
}

/// A task paired with the deadline by which it must have *begun* executing.
pub struct ExpirableTask {
    deadline: Instant,
    task: BoxedTask,
}

impl ExpirableTask {
    /// Wrap `task` with a deadline.
    pub fn new(deadline: Instant, task: BoxedTask) -> Self {
        Self { deadline, task }
    }

    /// `true` if `deadline` has already passed.
    pub fn is_expired(&self) -> bool {
        Instant::now() >= self.deadline
    }
}

struct HeapEntry {
    deadline: Instant,
    seq: u64,
    task: BoxedTask,
}

impl PartialEq for HeapEntry {
    fn eq(&self, other: &Self) -> bool {
        self.deadline == other.deadline && self.seq == other.seq
    }
}
impl Eq for HeapEntry {}

impl PartialOrd for HeapEntry {
    fn partial_cmp(&self, other: &Self) -> Option<CmpOrdering> {
        Some(self.cmp(other))
    }
}

impl Ord for HeapEntry {
    fn cmp(&self, other: &Self) -> CmpOrdering {
        // BinaryHeap is a max-heap; reverse so the earliest deadline sorts
        // highest (popped first). Tie-break on sequence so submission order
        // among equal deadlines is preserved.
        other
            .deadline
            .cmp(&self.deadline)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

/// An [`Executor`] that orders pending tasks by deadline, delegating actual
/// execution to an inner [`Executor`].
///
/// This crate does not run a background scheduler thread (the core provides
/// no scheduler by design) — callers periodically invoke [`DeadlineExecutor::tick`]
/// to dispatch whatever is ready and expire whatever has missed its window,
/// e.g. from an existing event loop or timer.
pub struct DeadlineExecutor<E> {
    inner: E,
    pending: Mutex<BinaryHeap<HeapEntry>>,
    seq: AtomicU64,
}

impl<E: Executor> DeadlineExecutor<E> {
    /// Wrap `inner` with deadline ordering.
    pub fn new(inner: E) -> Self {
        Self {
            inner,
            pending: Mutex::new(BinaryHeap::new()),
            seq: AtomicU64::new(0),
        }
    }

    /// Enqueue `task` to run before `deadline`. Does not itself dispatch;
    /// call [`DeadlineExecutor::tick`] to drain ready/expired entries.
    pub fn submit(&self, task: ExpirableTask) {
        let seq = self.seq.fetch_add(1, Ordering::Relaxed);
        self.pending.lock().push(HeapEntry {
            deadline: task.deadline,
            seq,
            task: task.task,
        });
    }

    /// Drain every currently pending task: ones already past their deadline
    /// are logged and returned as [`OrderedTaskError::Expired`]; the rest are
    /// dispatched to the inner executor. Returns `(dispatched, expired_errors)`.
    pub fn tick(&self) -> (usize, Vec<OrderedTaskError>) {
        let mut dispatched = 0;
        let mut expired = Vec::new();
        let mut heap = self.pending.lock();
        while let Some(entry) = heap.pop() {
            if Instant::now() >= entry.deadline {
                warn!("expirable task missed its deadline before dispatch");
                expired.push(OrderedTaskError::Expired);
                continue;
            }
            self.inner.execute(entry.task);
            dispatched += 1;
        }
        (dispatched, expired)
    }
}

impl<E: Executor> Executor for DeadlineExecutor<E> {
    /// Tasks submitted through the plain `Executor` interface have no
    /// deadline semantics to apply, so they are dispatched immediately to
    /// the inner executor rather than queued.
    fn execute(&self, task: BoxedTask) {
        self.inner.execute(task);
    }
}
