//! The shared node type underlying the MPSC and MPMC linked queues
//!
//! A [`Node`] carries an element behind its own epoch-protected pointer
//! (rather than storing the element inline) so that the element can be
//! cleared independently of the node's linkage. That independence is what
//! lets the MPMC queue tombstone a removed element while leaving the node
//! physically linked for a later traversal to prune.

use crossbeam_epoch::{Atomic, Guard, Owned, Shared};
use std::sync::atomic::Ordering;

/// A link in the queue's singly-linked chain.
///
/// Nodes never own other nodes directly; they are reachable only through the
/// queue's `head`/`tail` pointers and through `next` links, and are reclaimed
/// via epoch-based garbage collection once unlinked.
pub(crate) struct Node<T> {
    pub(crate) element: Atomic<T>,
    pub(crate) next: Atomic<Node<T>>,
}

impl<T> Node<T> {
    /// Allocate a node carrying `element`.
    pub(crate) fn new(element: T) -> Owned<Self> {
        Owned::new(Self {
            element: Atomic::new(element),
            next: Atomic::null(),
        })
    }

    /// Allocate the empty sentinel used as the initial tail of a queue.
    pub(crate) fn sentinel() -> Owned<Self> {
        Owned::new(Self {
            element: Atomic::null(),
            next: Atomic::null(),
        })
    }

    /// Atomically take the element out of this node, leaving it tombstoned.
    ///
    /// Returns `None` if the element was already removed by a racing
    /// consumer (MPMC) or was never set (the sentinel).
    pub(crate) fn take_element<'g>(&self, guard: &'g Guard) -> Option<Shared<'g, T>> {
        let prev = self.element.swap(Shared::null(), Ordering::AcqRel, guard);
        if prev.is_null() {
            None
        } else {
            Some(prev)
        }
    }

    /// Peek the current element without removing it.
    pub(crate) fn peek_element<'g>(&self, guard: &'g Guard) -> Shared<'g, T> {
        self.element.load(Ordering::Acquire, guard)
    }

    /// Whether this node's element has been cleared (a tombstone, or the
    /// unpopulated sentinel).
    pub(crate) fn is_tombstoned(&self, guard: &Guard) -> bool {
        self.peek_element(guard).is_null()
    }
}
