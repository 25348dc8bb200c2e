//! Multi-producer, multi-consumer lock-free linked queue
//!
//! `offer` is identical to [`crate::mpsc::MpscQueue::offer`]. `poll` CAS-
//! advances `tail` before extracting an element, so concurrent consumers
//! race on the pointer advance rather than the element itself; `remove` and
//! `for_each` tombstone elements in place and prune lazily on traversal.

use crate::error::Result;
use crate::node::Node;
use crossbeam_epoch::{self as epoch, Atomic, Owned, Shared};
use crossbeam_utils::CachePadded;
use log::trace;
use std::sync::atomic::Ordering;

/// An unbounded MPMC queue.
pub struct MpmcQueue<T> {
    head: CachePadded<Atomic<Node<T>>>,
    tail: CachePadded<Atomic<Node<T>>>,
}

impl<T> MpmcQueue<T> {
    /// Create a new, empty queue.
    pub fn new() -> Self {
        let guard = unsafe { epoch::unprotected() };
        let sentinel = Node::<T>::sentinel().into_shared(guard);
        Self {
            head: CachePadded::new(Atomic::from(sentinel)),
            tail: CachePadded::new(Atomic::from(sentinel)),
        }
    }

    /// Enqueue `item`. Wait-free per producer.
    pub fn offer(&self, item: T) -> Result<()> {
        let guard = epoch::pin();
        let new_node = Node::new(item).into_shared(&guard);
        let prev_head = self.head.swap(new_node, Ordering::AcqRel, &guard);
        let prev_ref = unsafe { prev_head.deref() };
        prev_ref.next.store(new_node, Ordering::Release);
        trace!("mpmc offer linearized");
        Ok(())
    }

    /// Dequeue an element; any number of consumers may call this
    /// concurrently. Returns `None` once the queue is drained.
    ///
    /// Linearizes at the successful CAS of `tail`.
    pub fn poll(&self) -> Option<T> {
        let guard = epoch::pin();
        loop {
            let tail = self.tail.load(Ordering::Acquire, &guard);
            let tail_ref = unsafe { tail.deref() };
            let next = tail_ref.next.load(Ordering::Acquire, &guard);
            let Some(next_ref) = (unsafe { next.as_ref() }) else {
                return None;
            };

            if self
                .tail
                .compare_exchange(
                    tail,
                    next,
                    Ordering::AcqRel,
                    Ordering::Acquire,
                    &guard,
                )
                .is_err()
            {
                continue;
            }

            unsafe {
                guard.defer_destroy(tail);
            }

            if let Some(elem) = next_ref.take_element(&guard) {
                let owned: Owned<T> = unsafe { elem.into_owned() };
                return Some(*owned.into_box());
            }
            // Already claimed by a racing poll/remove; this node is now a
            // tombstone we just advanced past. Keep looking.
        }
    }

    /// Peek the next live (non-tombstoned) element, pruning tombstones from
    /// the front of the chain along the way.
    pub fn peek(&self) -> Option<T>
    where
        T: Clone,
    {
        let guard = epoch::pin();
        loop {
            let tail = self.tail.load(Ordering::Acquire, &guard);
            let tail_ref = unsafe { tail.deref() };
            let next = tail_ref.next.load(Ordering::Acquire, &guard);
            let Some(next_ref) = (unsafe { next.as_ref() }) else {
                return None;
            };

            let elem = next_ref.peek_element(&guard);
            if !elem.is_null() {
                return Some(unsafe { elem.deref() }.clone());
            }

            // Tombstoned: prune by advancing tail, then retry.
            if self
                .tail
                .compare_exchange(
                    tail,
                    next,
                    Ordering::AcqRel,
                    Ordering::Acquire,
                    &guard,
                )
                .is_ok()
            {
                unsafe {
                    guard.defer_destroy(tail);
                }
            }
        }
    }

    /// Remove the first element equal to `target`, if present.
    ///
    /// Tombstones the matching node in place; it remains physically linked
    /// until a subsequent traversal prunes it.
    pub fn remove(&self, target: &T) -> bool
    where
        T: PartialEq,
    {
        let guard = epoch::pin();
        let mut prev = self.tail.load(Ordering::Acquire, &guard);
        loop {
            let prev_ref = unsafe { prev.deref() };
            let cur = prev_ref.next.load(Ordering::Acquire, &guard);
            let Some(cur_ref) = (unsafe { cur.as_ref() }) else {
                return false;
            };

            let elem = cur_ref.peek_element(&guard);
            if !elem.is_null() && unsafe { elem.deref() } == target {
                if cur_ref
                    .element
                    .compare_exchange(
                        elem,
                        Shared::null(),
                        Ordering::AcqRel,
                        Ordering::Acquire,
                        &guard,
                    )
                    .is_ok()
                {
                    unsafe {
                        guard.defer_destroy(elem);
                    }
                    return true;
                }
                // Lost the race to another remover/poller; element already
                // gone, so this is not a match anymore.
                return false;
            }
            prev = cur;
        }
    }

    /// Invoke `action` on every live element, front to back, pruning
    /// tombstones encountered along the way.
    pub fn for_each<F: FnMut(&T)>(&self, mut action: F) {
        let guard = epoch::pin();
        let mut prev = self.tail.load(Ordering::Acquire, &guard);
        loop {
            let prev_ref = unsafe { prev.deref() };
            let cur = prev_ref.next.load(Ordering::Acquire, &guard);
            let Some(cur_ref) = (unsafe { cur.as_ref() }) else {
                return;
            };

            let elem = cur_ref.peek_element(&guard);
            if elem.is_null() {
                // Prune: CAS at chain start via `tail`, else via `prev.next`.
                if std::ptr::eq(prev_ref, unsafe {
                    self.tail.load(Ordering::Acquire, &guard).deref()
                }) {
                    let _ = self.tail.compare_exchange(
                        prev,
                        cur,
                        Ordering::AcqRel,
                        Ordering::Acquire,
                        &guard,
                    );
                } else {
                    let _ = prev_ref.next.compare_exchange(
                        cur,
                        cur_ref.next.load(Ordering::Acquire, &guard),
                        Ordering::AcqRel,
                        Ordering::Acquire,
                        &guard,
                    );
                }
                prev = cur;
                continue;
            }

            action(unsafe { elem.deref() });
            prev = cur;
        }
    }

    /// True if the queue currently has no live elements (racy: a concurrent
    /// `offer` may land immediately after this returns).
    pub fn is_empty(&self) -> bool {
        self.peek_is_none()
    }

    fn peek_is_none(&self) -> bool {
        let guard = epoch::pin();
        let tail = self.tail.load(Ordering::Acquire, &guard);
        unsafe { tail.deref() }
            .next
            .load(Ordering::Acquire, &guard)
            .is_null()
    }

    /// Install a fresh sentinel as the new head, then as the new tail — in
    /// that order, so a concurrent `offer` racing the clear can never be
    /// lost by linking onto a node about to be unreachable from `tail`.
    pub fn clear(&self) {
        let guard = epoch::pin();
        let old_tail = self.tail.load(Ordering::Acquire, &guard);
        let fresh: Owned<Node<T>> = Node::sentinel();
        let fresh: Shared<'_, Node<T>> = fresh.into_shared(&guard);
        self.head.store(fresh, Ordering::Release);
        self.tail.store(fresh, Ordering::Release);

        let mut node = old_tail;
        loop {
            let node_ref = unsafe { node.deref() };
            let next = node_ref.next.load(Ordering::Acquire, &guard);
            if let Some(elem) = node_ref.take_element(&guard) {
                unsafe {
                    guard.defer_destroy(elem);
                }
            }
            unsafe {
                guard.defer_destroy(node);
            }
            if next.is_null() {
                break;
            }
            node = next;
        }
    }
}

impl<T> Default for MpmcQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Drop for MpmcQueue<T> {
    fn drop(&mut self) {
        while self.poll().is_some() {}
        let guard = unsafe { epoch::unprotected() };
        let tail = self.tail.load(Ordering::Relaxed, guard);
        unsafe {
            guard.defer_destroy(tail);
        }
    }
}

unsafe impl<T: Send> Send for MpmcQueue<T> {}
unsafe impl<T: Send> Sync for MpmcQueue<T> {}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn offer_then_poll_round_trips() {
        let q: MpmcQueue<i32> = MpmcQueue::new();
        q.offer(7).unwrap();
        assert_eq!(q.poll(), Some(7));
        assert_eq!(q.poll(), None);
    }

    #[test]
    fn remove_tombstones_a_match() {
        let q: MpmcQueue<i32> = MpmcQueue::new();
        q.offer(1).unwrap();
        q.offer(2).unwrap();
        q.offer(3).unwrap();
        assert!(q.remove(&2));
        assert!(!q.remove(&2));

        let mut seen = Vec::new();
        q.for_each(|x| seen.push(*x));
        assert_eq!(seen, vec![1, 3]);
    }

    #[test]
    fn for_each_prunes_tombstones() {
        let q: MpmcQueue<i32> = MpmcQueue::new();
        for i in 0..5 {
            q.offer(i).unwrap();
        }
        q.remove(&0);
        q.remove(&4);
        let mut seen = Vec::new();
        q.for_each(|x| seen.push(*x));
        assert_eq!(seen, vec![1, 2, 3]);
    }

    #[test]
    fn at_most_once_under_contention() {
        let q = Arc::new(MpmcQueue::<usize>::new());
        let producers = 4;
        let consumers = 4;
        let per_producer = 5_000;
        let total = producers * per_producer;

        let mut handles = Vec::new();
        for pid in 0..producers {
            let q = Arc::clone(&q);
            handles.push(thread::spawn(move || {
                for i in 0..per_producer {
                    q.offer(pid * per_producer + i).unwrap();
                }
            }));
        }
        for h in handles {
            h.join().unwrap();
        }

        let consumed = Arc::new(std::sync::atomic::AtomicUsize::new(0));
        let mut handles = Vec::new();
        for _ in 0..consumers {
            let q = Arc::clone(&q);
            let consumed = Arc::clone(&consumed);
            handles.push(thread::spawn(move || {
                let mut local = HashSet::new();
                loop {
                    match q.poll() {
                        Some(v) => {
                            local.insert(v);
                            consumed.fetch_add(1, Ordering::SeqCst);
                        }
                        None => {
                            if consumed.load(Ordering::SeqCst) >= total {
                                break;
                            }
                            thread::yield_now();
                        }
                    }
                }
                local
            }));
        }

        let mut union = HashSet::new();
        let mut total_seen = 0;
        for h in handles {
            let local = h.join().unwrap();
            total_seen += local.len();
            for v in local {
                assert!(union.insert(v), "value {v} consumed more than once");
            }
        }
        assert_eq!(total_seen, total);
        assert_eq!(union.len(), total);
    }
}
