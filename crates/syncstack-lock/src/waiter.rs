//! The parked-waiter chain backing [`crate::reentrant::ReentrantLock`]
//!
//! A singly-linked queue of suspended-thread descriptors, pushed at `tail`
//! and serviced from `head`, in the same raw-`AtomicPtr` /
//! `compare_exchange`-retry-loop idiom as this workspace's own
//! `syncstack-queue` MPSC core. A [`Waiter`] is "claimed" by winning a CAS
//! on its `claimed` flag; exactly one of (the waiter giving up on
//! timeout/interrupt) or (the releaser targeting it for exclusive wakeup)
//! wins that race for any given waiter. Because at most one thread can ever
//! own the lock and thus call [`WaiterChain::wake_next`], and a
//! newly-woken waiter is solely responsible for unlinking and freeing its
//! own node once it confirms ownership, no other thread ever touches a
//! node after its owning side has finished with it — so raw `Box`
//! ownership transfer is sufficient here without epoch reclamation.

use std::ptr;
use std::sync::atomic::{AtomicBool, AtomicPtr, Ordering};
use std::thread::Thread;

/// Sentinel appended to the last waiter's `next` to declare the chain
/// closed; a subsequent push observing this at `tail` must start a fresh
/// chain rather than linking onto a closed one.
pub(crate) fn invalidated() -> *mut Waiter {
    // A non-null, never-dereferenced marker distinct from any real
    // allocation and from `ptr::null_mut()`.
    usize::MAX as *mut Waiter
}

pub(crate) struct Waiter {
    thread: Thread,
    claimed: AtomicBool,
    next: AtomicPtr<Waiter>,
}

impl Waiter {
    fn new_boxed(thread: Thread) -> *mut Waiter {
        Box::into_raw(Box::new(Waiter {
            thread,
            claimed: AtomicBool::new(false),
            next: AtomicPtr::new(ptr::null_mut()),
        }))
    }

    /// Attempt to claim this waiter. Returns `true` exactly once across
    /// however many callers race on it.
    fn claim(&self) -> bool {
        self.claimed
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }
}

/// The waiter chain: producers (threads about to park) push at `tail`;
/// the releaser services from `head`.
pub(crate) struct WaiterChain {
    head: AtomicPtr<Waiter>,
    tail: AtomicPtr<Waiter>,
}

impl WaiterChain {
    pub(crate) fn new() -> Self {
        Self {
            head: AtomicPtr::new(ptr::null_mut()),
            tail: AtomicPtr::new(ptr::null_mut()),
        }
    }

    /// `true` if the chain is currently empty (no contention observed).
    pub(crate) fn is_empty(&self) -> bool {
        let head = self.head.load(Ordering::Acquire);
        head.is_null() || head == invalidated()
    }

    /// Push the current thread onto the tail of the chain, (re)starting a
    /// fresh chain if the previous one was closed via [`invalidated`].
    /// Returns the raw waiter pointer so the caller can later check whether
    /// it has reached the head.
    pub(crate) fn push_current(&self) -> *mut Waiter {
        let node = Waiter::new_boxed(std::thread::current());
        loop {
            let tail = self.tail.load(Ordering::Acquire);
            if tail.is_null() || tail == invalidated() {
                match self
                    .tail
                    .compare_exchange(tail, node, Ordering::AcqRel, Ordering::Acquire)
                {
                    Ok(_) => {
                        self.head.store(node, Ordering::Release);
                        return node;
                    }
                    Err(_) => continue,
                }
            }
            let tail_ref = unsafe { &*tail };
            match tail_ref
                .next
                .compare_exchange(ptr::null_mut(), node, Ordering::AcqRel, Ordering::Acquire)
            {
                Ok(_) => {
                    let _ =
                        self.tail
                            .compare_exchange(tail, node, Ordering::AcqRel, Ordering::Relaxed);
                    return node;
                }
                Err(_) => {
                    let next = tail_ref.next.load(Ordering::Acquire);
                    if !next.is_null() && next != invalidated() {
                        let _ = self.tail.compare_exchange(
                            tail,
                            next,
                            Ordering::AcqRel,
                            Ordering::Relaxed,
                        );
                    }
                }
            }
        }
    }

    /// Whether `waiter` is currently at the head of the chain. Only
    /// compares pointer values; never dereferences.
    pub(crate) fn is_head(&self, waiter: *mut Waiter) -> bool {
        self.head.load(Ordering::Acquire) == waiter
    }

    /// Attempt to unregister `waiter` (called by the waiting thread itself
    /// on timeout/interrupt). `true` means this call won the race: the
    /// waiter must give up and must not touch the node again. `false` means
    /// a releaser already claimed this waiter for wakeup: the caller is now
    /// the designated next owner and must spin-acquire instead of giving
    /// up (see [`crate::reentrant::ReentrantLock`]).
    pub(crate) fn unregister(&self, waiter: *mut Waiter) -> bool {
        unsafe { &*waiter }.claim()
    }

    /// Releaser-side: find the first unclaimed waiter reachable from
    /// `head`, claim it exclusively, and unpark its thread. The claimed
    /// waiter remains at `head` — the newly-woken thread unlinks and frees
    /// its own node once it confirms ownership (see
    /// [`WaiterChain::advance_past`]). Waiters found already claimed (they
    /// self-unregistered on timeout/interrupt) are pruned and freed here,
    /// since their owning thread has already left and will not touch them
    /// again. Returns `None` once the chain is exhausted.
    pub(crate) fn wake_next(&self) -> Option<Thread> {
        loop {
            let head = self.head.load(Ordering::Acquire);
            if head.is_null() || head == invalidated() {
                return None;
            }
            let head_ref = unsafe { &*head };
            if head_ref.claim() {
                return Some(head_ref.thread.clone());
            }
            // Lost the race to a concurrent self-unregister: this node is
            // abandoned, prune it and keep scanning.
            let next = head_ref.next.load(Ordering::Acquire);
            self.head.store(next, Ordering::Release);
            unsafe {
                drop(Box::from_raw(head));
            }
        }
    }

    /// Called by a thread that has confirmed it is at `head` and has just
    /// won ownership: unlink and free its own node.
    pub(crate) fn advance_past(&self, waiter: *mut Waiter) {
        let next = unsafe { (*waiter).next.load(Ordering::Acquire) };
        self.head.store(next, Ordering::Release);
        unsafe {
            drop(Box::from_raw(waiter));
        }
    }

    /// Close the chain: CAS `tail`'s `next` from null to [`invalidated`].
    /// On success, also null out `head`/`tail` so the next push starts
    /// fresh. Called by a releaser that found no live waiter to wake.
    pub(crate) fn try_close(&self) {
        let tail = self.tail.load(Ordering::Acquire);
        if tail.is_null() || tail == invalidated() {
            return;
        }
        let tail_ref = unsafe { &*tail };
        if tail_ref
            .next
            .compare_exchange(
                ptr::null_mut(),
                invalidated(),
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_ok()
        {
            self.head.store(ptr::null_mut(), Ordering::Release);
            self.tail.store(ptr::null_mut(), Ordering::Release);
        }
    }
}

impl Drop for WaiterChain {
    fn drop(&mut self) {
        let mut node = self.head.load(Ordering::Relaxed);
        while !node.is_null() && node != invalidated() {
            let next = unsafe { (*node).next.load(Ordering::Relaxed) };
            unsafe {
                drop(Box::from_raw(node));
            }
            node = next;
        }
    }
}

unsafe impl Send for WaiterChain {}
unsafe impl Sync for WaiterChain {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn push_then_wake_keeps_head_until_self_advance() {
        let chain = WaiterChain::new();
        assert!(chain.is_empty());
        let w = chain.push_current();
        assert!(chain.is_head(w));
        let thread = chain.wake_next();
        assert!(thread.is_some());
        assert!(chain.is_head(w), "head stays until the waiter self-advances");
        chain.advance_past(w);
        assert!(chain.is_empty());
    }

    #[test]
    fn self_unregister_wins_before_wake() {
        let chain = WaiterChain::new();
        let w = chain.push_current();
        assert!(chain.unregister(w));
        // A releaser arriving afterwards finds no live waiter.
        assert!(chain.wake_next().is_none());
    }

    #[test]
    fn wake_wins_before_self_unregister() {
        let chain = WaiterChain::new();
        let w = chain.push_current();
        assert!(chain.wake_next().is_some());
        // The waiter's own attempt to give up now loses the race.
        assert!(!chain.unregister(w));
        chain.advance_past(w);
    }

    #[test]
    fn close_then_fresh_push_restarts_chain() {
        let chain = WaiterChain::new();
        let w = chain.push_current();
        chain.wake_next();
        chain.advance_past(w);
        chain.try_close();
        assert!(chain.is_empty());
        let w2 = chain.push_current();
        assert!(chain.is_head(w2));
        chain.wake_next();
        chain.advance_past(w2);
    }
}
