//! Capacity-tracked bounded wrappers over the unbounded queue cores
//!
//! `ingress`/`egress` are eventually-consistent monotonic counters; their
//! difference is a conservative upper bound on the current size. As spec'd,
//! the size check races with concurrent producers, so true in-flight size
//! may momentarily exceed `capacity` by at most `O(producers)` — an accepted
//! tradeoff, not a bug (see DESIGN.md).

use crate::error::{QueueError, Result};
use crate::mpmc::MpmcQueue;
use crate::mpsc::MpscQueue;
use log::warn;
use std::sync::atomic::{AtomicUsize, Ordering};

/// A queue core that can be wrapped with capacity accounting.
pub trait QueueCore<T> {
    /// Enqueue unconditionally (the unbounded delegate's `offer`).
    fn offer_unbounded(&self, item: T) -> Result<()>;
    /// Dequeue unconditionally (the unbounded delegate's `poll`).
    fn poll_unbounded(&self) -> Option<T>;
}

impl<T> QueueCore<T> for MpscQueue<T> {
    fn offer_unbounded(&self, item: T) -> Result<()> {
        self.offer(item)
    }
    fn poll_unbounded(&self) -> Option<T> {
        self.poll()
    }
}

impl<T> QueueCore<T> for MpmcQueue<T> {
    fn offer_unbounded(&self, item: T) -> Result<()> {
        self.offer(item)
    }
    fn poll_unbounded(&self) -> Option<T> {
        self.poll()
    }
}

/// A capacity-tracked wrapper over any [`QueueCore`].
pub struct BoundedQueue<Q> {
    inner: Q,
    capacity: usize,
    ingress: AtomicUsize,
    egress: AtomicUsize,
}

impl<T, Q: QueueCore<T>> BoundedQueue<Q> {
    /// Wrap `inner` with a capacity bound.
    pub fn new(inner: Q, capacity: usize) -> Self {
        Self {
            inner,
            capacity,
            ingress: AtomicUsize::new(0),
            egress: AtomicUsize::new(0),
        }
    }

    /// Offer `item` if the conservative size bound has room; otherwise
    /// returns [`QueueError::Full`] without touching the delegate queue.
    pub fn offer(&self, item: T) -> Result<()> {
        if self.size() >= self.capacity {
            warn!("bounded queue at capacity ({})", self.capacity);
            return Err(QueueError::full(self.capacity));
        }
        self.inner.offer_unbounded(item)?;
        self.ingress.fetch_add(1, Ordering::Release);
        Ok(())
    }

    /// Dequeue, incrementing `egress` on success.
    pub fn poll(&self) -> Option<T> {
        let item = self.inner.poll_unbounded();
        if item.is_some() {
            self.egress.fetch_add(1, Ordering::Release);
        }
        item
    }

    /// Conservative size bound: `max(0, ingress - egress)`.
    pub fn size(&self) -> usize {
        let ingress = self.ingress.load(Ordering::Acquire);
        let egress = self.egress.load(Ordering::Acquire);
        ingress.saturating_sub(egress)
    }

    /// Remaining capacity under the conservative size bound.
    pub fn remaining_capacity(&self) -> usize {
        self.capacity.saturating_sub(self.size())
    }

    /// The queue's configured capacity.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Borrow the wrapped delegate queue directly (e.g. for `peek`).
    pub fn inner(&self) -> &Q {
        &self.inner
    }
}

/// A bounded MPSC queue.
pub type BoundedMpscQueue<T> = BoundedQueue<MpscQueue<T>>;
/// A bounded MPMC queue.
pub type BoundedMpmcQueue<T> = BoundedQueue<MpmcQueue<T>>;

impl<T> BoundedMpscQueue<T> {
    /// Construct a bounded MPSC queue with the given capacity.
    pub fn bounded(capacity: usize) -> Self {
        Self::new(MpscQueue::new(), capacity)
    }
}

impl<T> BoundedMpmcQueue<T> {
    /// Construct a bounded MPMC queue with the given capacity.
    pub fn bounded(capacity: usize) -> Self {
        Self::new(MpmcQueue::new(), capacity)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_past_capacity() {
        let q: BoundedMpscQueue<i32> = BoundedMpscQueue::bounded(2);
        assert!(q.offer(1).is_ok());
        assert!(q.offer(2).is_ok());
        assert!(matches!(q.offer(3), Err(QueueError::Full { capacity: 2 })));
        assert_eq!(q.size(), 2);
        assert_eq!(q.remaining_capacity(), 0);
    }

    #[test]
    fn frees_capacity_on_poll() {
        let q: BoundedMpscQueue<i32> = BoundedMpscQueue::bounded(1);
        q.offer(1).unwrap();
        assert!(q.offer(2).is_err());
        assert_eq!(q.poll(), Some(1));
        assert!(q.offer(2).is_ok());
    }

    #[test]
    fn mpmc_bounded_round_trips() {
        let q: BoundedMpmcQueue<i32> = BoundedMpmcQueue::bounded(4);
        for i in 0..4 {
            q.offer(i).unwrap();
        }
        assert!(q.offer(4).is_err());
        for i in 0..4 {
            assert_eq!(q.poll(), Some(i));
        }
    }
}
