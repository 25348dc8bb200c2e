//! Multi-producer, single-consumer lock-free linked queue
//!
//! Enqueue is wait-free per producer: it performs one atomic exchange on
//! `head` and one release store. Dequeue is consumer-only and never blocks;
//! callers needing blocking semantics should wrap this queue with
//! [`crate::blocking`].

use crate::error::Result;
use crate::node::Node;
use crossbeam_epoch::{self as epoch, Atomic, Owned, Shared};
use crossbeam_utils::CachePadded;
use log::trace;
use std::sync::atomic::Ordering;

/// An unbounded MPSC queue.
///
/// The list always contains at least the sentinel `tail` node; elements are
/// the nodes reachable from `tail.next` up to and including `head`.
pub struct MpscQueue<T> {
    head: CachePadded<Atomic<Node<T>>>,
    tail: CachePadded<Atomic<Node<T>>>,
}

impl<T> MpscQueue<T> {
    /// Create a new, empty queue.
    pub fn new() -> Self {
        let guard = unsafe { epoch::unprotected() };
        let sentinel = Node::<T>::sentinel().into_shared(guard);
        Self {
            head: CachePadded::new(Atomic::from(sentinel)),
            tail: CachePadded::new(Atomic::from(sentinel)),
        }
    }

    /// Enqueue `item`. Never blocks and never fails for this unbounded
    /// variant other than rejecting a logically-null element type upstream.
    ///
    /// Linearizes at the atomic exchange of `head`.
    pub fn offer(&self, item: T) -> Result<()> {
        let guard = epoch::pin();
        let new_node = Node::new(item).into_shared(&guard);

        // get-and-set(head) linearizes concurrent producers
        let prev_head = self.head.swap(new_node, Ordering::AcqRel, &guard);
        let prev_ref = unsafe { prev_head.deref() };
        prev_ref.next.store(new_node, Ordering::Release);
        trace!("mpsc offer linearized");
        Ok(())
    }

    /// Dequeue the oldest element, or `None` if the queue is empty.
    ///
    /// Must only be called from the single consumer thread.
    pub fn poll(&self) -> Option<T> {
        let guard = epoch::pin();
        let tail = self.tail.load(Ordering::Relaxed, &guard);
        let tail_ref = unsafe { tail.deref() };
        let next = tail_ref.next.load(Ordering::Acquire, &guard);
        if next.is_null() {
            return None;
        }
        let next_ref = unsafe { next.deref() };
        let elem = next_ref.take_element(&guard)?;
        self.tail.store(next, Ordering::Release);
        unsafe {
            guard.defer_destroy(tail);
        }
        let owned: Owned<T> = unsafe { elem.into_owned() };
        Some(*owned.into_box())
    }

    /// Peek the next element to be dequeued without removing it.
    pub fn peek(&self) -> Option<T>
    where
        T: Clone,
    {
        let guard = epoch::pin();
        let tail = self.tail.load(Ordering::Relaxed, &guard);
        let tail_ref = unsafe { tail.deref() };
        let next = tail_ref.next.load(Ordering::Acquire, &guard);
        if next.is_null() {
            return None;
        }
        let next_ref = unsafe { next.deref() };
        let elem = next_ref.peek_element(&guard);
        if elem.is_null() {
            None
        } else {
            Some(unsafe { elem.deref() }.clone())
        }
    }

    /// Approximate size, intended for debugging only: walks the chain.
    pub fn size(&self) -> usize {
        let guard = epoch::pin();
        let mut node = self.tail.load(Ordering::Relaxed, &guard);
        let mut count = 0usize;
        loop {
            let node_ref = unsafe { node.deref() };
            let next = node_ref.next.load(Ordering::Acquire, &guard);
            if next.is_null() {
                break;
            }
            count += 1;
            node = next;
        }
        count
    }

    /// True if the queue currently has no elements.
    pub fn is_empty(&self) -> bool {
        let guard = epoch::pin();
        let tail = self.tail.load(Ordering::Relaxed, &guard);
        unsafe { tail.deref() }
            .next
            .load(Ordering::Acquire, &guard)
            .is_null()
    }

    /// Replace the chain with a fresh empty sentinel.
    ///
    /// Consumer-only: callers must guarantee no concurrent `poll`/`peek`.
    pub fn clear(&self) {
        let guard = epoch::pin();
        let old_tail = self.tail.load(Ordering::Relaxed, &guard);
        let fresh: Owned<Node<T>> = Node::sentinel();
        let fresh: Shared<'_, Node<T>> = fresh.into_shared(&guard);
        self.head.store(fresh, Ordering::Release);
        self.tail.store(fresh, Ordering::Release);

        // Drain and destroy the old chain; elements still attached are
        // dropped along with their nodes.
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

impl<T> Default for MpscQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Drop for MpscQueue<T> {
    fn drop(&mut self) {
        while self.poll().is_some() {}
        let guard = unsafe { epoch::unprotected() };
        let tail = self.tail.load(Ordering::Relaxed, guard);
        unsafe {
            guard.defer_destroy(tail);
        }
    }
}

unsafe impl<T: Send> Send for MpscQueue<T> {}
unsafe impl<T: Send> Sync for MpscQueue<T> {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn offer_then_poll_round_trips() {
        let q: MpscQueue<i32> = MpscQueue::new();
        assert!(q.is_empty());
        q.offer(42).unwrap();
        assert!(!q.is_empty());
        assert_eq!(q.poll(), Some(42));
        assert!(q.is_empty());
        assert_eq!(q.poll(), None);
    }

    #[test]
    fn fifo_order_single_producer() {
        let q: MpscQueue<i32> = MpscQueue::new();
        for i in 0..100 {
            q.offer(i).unwrap();
        }
        for i in 0..100 {
            assert_eq!(q.poll(), Some(i));
        }
        assert_eq!(q.poll(), None);
    }

    #[test]
    fn fifo_order_multiple_producers() {
        use std::sync::Arc;
        use std::thread;

        let q = Arc::new(MpscQueue::<(usize, usize)>::new());
        let producers = 8;
        let per_producer = 2_000;
        let mut handles = Vec::new();
        for pid in 0..producers {
            let q = Arc::clone(&q);
            handles.push(thread::spawn(move || {
                for seq in 0..per_producer {
                    q.offer((pid, seq)).unwrap();
                }
            }));
        }
        for h in handles {
            h.join().unwrap();
        }

        let mut last_seen = vec![None; producers];
        let mut total = 0;
        while let Some((pid, seq)) = q.poll() {
            if let Some(last) = last_seen[pid] {
                assert!(seq > last, "producer {pid} sequence went backwards");
            }
            last_seen[pid] = Some(seq);
            total += 1;
        }
        assert_eq!(total, producers * per_producer);
    }

    #[test]
    fn clear_empties_the_queue() {
        let q: MpscQueue<i32> = MpscQueue::new();
        for i in 0..10 {
            q.offer(i).unwrap();
        }
        q.clear();
        assert!(q.is_empty());
        assert_eq!(q.poll(), None);
        q.offer(1).unwrap();
        assert_eq!(q.poll(), Some(1));
    }

    #[test]
    fn size_is_approximate_but_accurate_when_quiescent() {
        let q: MpscQueue<i32> = MpscQueue::new();
        assert_eq!(q.size(), 0);
        for i in 0..5 {
            q.offer(i).unwrap();
        }
        assert_eq!(q.size(), 5);
        q.poll();
        assert_eq!(q.size(), 4);
    }
}
