//! Per-key task chaining: [`TaskWrapper`] and [`OrderedExecutor`]
//!
//! Each key has at most one active chain, tracked in a `DashMap<K, Arc<TaskWrapper<K>>>`.
//! Submitting a task for a key that has no current chain makes it the chain
//! head and dispatches it to the executor immediately; submitting for a key
//! that already has a chain instead publishes the new wrapper as the current
//! tail's `next` and returns without a separate dispatch. A wrapper's task
//! and chain continuation are therefore only ever touched by one thread at a
//! time: either the thread the executor originally ran the head on, or that
//! same thread continuing inline through however many successors have been
//! chained on by the time it gets there — so no two threads ever race to run
//! the same wrapped task, and no worker thread blocks waiting on another.

use crate::error::{OrderedTaskError, Result};
use crate::executor::{BoxedTask, Executor};
use dashmap::DashMap;
use log::trace;
use parking_lot::Mutex;
use std::any::Any;
use std::hash::Hash;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, OnceLock};

const FIRST: u8 = 0;
const CHAINED: u8 = 1;
const TRIGGERED: u8 = 2;

/// The three states a chained task wrapper passes through, per the design's
/// state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WrapperState {
    /// No predecessor; dispatched to the executor immediately on submission.
    First,
    /// Has a predecessor; will run when that predecessor's continuation
    /// reaches it, not via a separate executor dispatch.
    Chained,
    /// Claimed for execution (running or already run).
    Triggered,
}

impl From<u8> for WrapperState {
    fn from(v: u8) -> Self {
        match v {
            FIRST => WrapperState::First,
            CHAINED => WrapperState::Chained,
            _ => WrapperState::Triggered,
        }
    }
}

struct TaskWrapper<K> {
    key: K,
    task: Mutex<Option<BoxedTask>>,
    state: AtomicU8,
    next: OnceLock<Arc<TaskWrapper<K>>>,
}

impl<K> TaskWrapper<K> {
    fn state(&self) -> WrapperState {
        WrapperState::from(self.state.load(Ordering::Acquire))
    }

    /// Claim this wrapper for execution exactly once: succeeds (and
    /// transitions to [`WrapperState::Triggered`]) the first time it is
    /// called, fails every time after.
    fn claim(&self) -> bool {
        loop {
            let cur = self.state.load(Ordering::Acquire);
            if cur == TRIGGERED {
                return false;
            }
            if self
                .state
                .compare_exchange(cur, TRIGGERED, Ordering::AcqRel, Ordering::Acquire)
                .is_ok()
            {
                return true;
            }
        }
    }
}

/// Per-key serialization of otherwise concurrently dispatched tasks.
///
/// Tasks submitted under the same key run strictly in submission order and
/// never overlap in time; tasks under different keys carry no ordering
/// guarantee relative to each other and may run concurrently.
pub struct OrderedExecutor<K, E> {
    chains: Arc<DashMap<K, Arc<TaskWrapper<K>>>>,
    executor: E,
}

impl<K, E> OrderedExecutor<K, E>
where
    K: Eq + Hash + Clone + Send + Sync + 'static,
    E: Executor,
{
    /// Create an ordered executor delegating actual execution to `executor`.
    pub fn new(executor: E) -> Self {
        Self {
            chains: Arc::new(DashMap::new()),
            executor,
        }
    }

    /// Current chain state for `key`, if a chain is active. Intended for
    /// tests and diagnostics.
    pub fn state_of(&self, key: &K) -> Option<WrapperState> {
        self.chains.get(key).map(|w| w.state())
    }

    /// Submit `task` to run under `key`, serialized with respect to any
    /// other task currently chained under the same key.
    ///
    /// Panics inside `task` (or inside any successor this call ends up
    /// running inline as it continues the chain) are caught; the first is
    /// turned into a [`OrderedTaskError::TaskPanicked`] and logged once the
    /// chain segment this call drives is exhausted, with any further panics
    /// in the same segment folded into its `suppressed` count rather than
    /// lost.
    pub fn submit(&self, key: K, task: impl FnOnce() + Send + 'static) {
        let wrapper = Arc::new(TaskWrapper {
            key: key.clone(),
            task: Mutex::new(Some(Box::new(task))),
            state: AtomicU8::new(CHAINED),
            next: OnceLock::new(),
        });

        let prev = self.chains.insert(key, Arc::clone(&wrapper));
        match prev {
            None => {
                wrapper.state.store(FIRST, Ordering::Release);
                trace!("ordered: new chain head dispatched");
                self.dispatch(wrapper);
            }
            Some(prev_wrapper) => {
                trace!("ordered: chained onto existing head");
                prev_wrapper
                    .next
                    .set(wrapper)
                    .unwrap_or_else(|_| panic!("a wrapper's `next` must be published exactly once"));
            }
        }
    }

    fn dispatch(&self, head: Arc<TaskWrapper<K>>) {
        let chains = Arc::clone(&self.chains);
        self.executor.execute(Box::new(move || {
            if let Err(err) = run_chain(chains, head) {
                log::error!("ordered task chain ended in error: {err}");
            }
        }));
    }
}

/// Run `current` and every successor chained onto it by the time this
/// thread reaches each link, in order, on this thread, without ever
/// submitting a second task to the executor or blocking on another thread.
///
/// The first panic encountered anywhere in the chain is returned as a
/// [`OrderedTaskError::TaskPanicked`]; further panics in the same chain are
/// folded into its `suppressed` count rather than propagated, since Rust
/// panics carry no native "suppressed exceptions" list to attach them to.
fn run_chain<K>(chains: Arc<DashMap<K, Arc<TaskWrapper<K>>>>, mut current: Arc<TaskWrapper<K>>) -> Result<()>
where
    K: Eq + Hash + Clone,
{
    let mut panics: Vec<Box<dyn Any + Send>> = Vec::new();

    loop {
        let claimed = current.claim();
        debug_assert!(claimed, "a chain head is only ever driven by one thread");

        if let Some(task) = current.task.lock().take() {
            if let Err(payload) = catch_unwind(AssertUnwindSafe(task)) {
                panics.push(payload);
            }
        }

        let is_last = chains
            .remove_if(&current.key, |_, w| Arc::ptr_eq(w, &current))
            .is_some();
        if is_last {
            break;
        }

        // Not the last: some submit() call has already observed `current` as
        // the chain's previous wrapper and is in the process of (or about
        // to) publish `next`. Spin until it becomes visible.
        let next = loop {
            if let Some(n) = current.next.get() {
                break Arc::clone(n);
            }
            std::hint::spin_loop();
        };
        current = next;
    }

    if panics.is_empty() {
        return Ok(());
    }
    let suppressed = panics.len() - 1;
    let first = panics.remove(0);
    Err(OrderedTaskError::from_panic_payload(first, suppressed))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::RayonExecutor;
    use std::sync::Mutex as StdMutex;
    use std::thread;
    use std::time::Duration;

    struct InlineExecutor;
    impl Executor for InlineExecutor {
        fn execute(&self, task: BoxedTask) {
            task();
        }
    }

    #[test]
    fn single_key_tasks_run_in_submission_order() {
        let exec = OrderedExecutor::new(InlineExecutor);
        let order = Arc::new(StdMutex::new(Vec::new()));
        for i in 0..20 {
            let order = Arc::clone(&order);
            exec.submit("k", move || order.lock().unwrap().push(i));
        }
        assert_eq!(*order.lock().unwrap(), (0..20).collect::<Vec<_>>());
    }

    #[test]
    fn different_keys_do_not_block_each_other() {
        let exec = OrderedExecutor::new(InlineExecutor);
        let order = Arc::new(StdMutex::new(Vec::new()));
        for key in ["a", "b", "c"] {
            for i in 0..5 {
                let order = Arc::clone(&order);
                exec.submit(key, move || order.lock().unwrap().push((key, i)));
            }
        }
        let log = order.lock().unwrap();
        for key in ["a", "b", "c"] {
            let seq: Vec<_> = log.iter().filter(|(k, _)| *k == key).map(|(_, i)| *i).collect();
            assert_eq!(seq, (0..5).collect::<Vec<_>>());
        }
    }

    #[test]
    fn chain_is_removed_from_the_map_once_exhausted() {
        let exec = OrderedExecutor::new(InlineExecutor);
        exec.submit("k", || {});
        assert!(exec.state_of(&"k").is_none());
    }

    #[test]
    fn concurrent_submissions_across_many_keys_preserve_per_key_order() {
        let exec = Arc::new(OrderedExecutor::new(RayonExecutor));
        let order = Arc::new(DashMap::<u32, StdMutex<Vec<u32>>>::new());
        let keys = 10u32;
        let tasks_per_key = 10u32;

        let mut handles = Vec::new();
        for t in 0..3 {
            let exec = Arc::clone(&exec);
            let order = Arc::clone(&order);
            handles.push(thread::spawn(move || {
                for seq in 0..tasks_per_key {
                    let key = (t + seq) % keys;
                    let order = Arc::clone(&order);
                    exec.submit(key, move || {
                        order
                            .entry(key)
                            .or_insert_with(|| StdMutex::new(Vec::new()))
                            .lock()
                            .unwrap()
                            .push(seq);
                    });
                }
            }));
        }
        for h in handles {
            h.join().unwrap();
        }

        // Give rayon's pool a moment to finish dispatched chains.
        thread::sleep(Duration::from_millis(200));

        for entry in order.iter() {
            let seq = entry.value().lock().unwrap().clone();
            let mut sorted = seq.clone();
            sorted.sort_unstable();
            assert_eq!(seq, sorted, "key {} observed out-of-order execution", entry.key());
        }
    }
}
