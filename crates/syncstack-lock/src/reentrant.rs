//! Hybrid reentrant mutual-exclusion lock
//!
//! Acquisition follows the state machine spec'd for this workspace: a
//! bounded spin attempting a direct CAS on `owner`, then a push onto the
//! [`WaiterChain`], then parking until woken and confirmed at the head of
//! the chain. Release decrements the reentrancy count and, once it reaches
//! zero, wakes the next live waiter or closes the chain if none remain.
//!
//! Reentrancy is owner-only: a thread already holding the lock that calls
//! `lock()` again never touches the waiter chain, it only increments
//! `lock_count`.

use crate::error::{LockError, Result};
use crate::waiter::WaiterChain;
use crossbeam_utils::Backoff;
use log::{debug, trace};
use std::sync::atomic::{AtomicI64, AtomicU32, AtomicU64, Ordering};
use std::thread::{self, ThreadId};
use std::time::{Duration, Instant};

/// Default number of bounded-spin attempts before a foreign thread parks.
pub const DEFAULT_SPINS: usize = 5;

/// An explicit, clonable cancellation flag threaded through
/// `lock_interruptibly`/`try_lock_for` in place of a per-thread interrupt
/// flag, matching [`syncstack_queue::blocking::CancellationToken`]'s design
/// (Rust has no interrupt flag, so this is the only available shape).
#[derive(Clone, Default)]
pub struct CancellationToken(std::sync::Arc<std::sync::atomic::AtomicBool>);

impl CancellationToken {
    /// Create a fresh, uncancelled token.
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation of any blocking acquisition observing this token.
    pub fn cancel(&self) {
        self.0.store(true, Ordering::Release);
    }

    /// Non-consuming check: `true` if cancellation has been requested but
    /// not yet observed/cleared.
    pub fn is_set(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }

    pub(crate) fn take(&self) -> bool {
        self.0.swap(false, Ordering::AcqRel)
    }

    fn restore(&self) {
        self.0.store(true, Ordering::Release);
    }
}

/// `ThreadId` has no "null" value, so the owner field is represented as a
/// packed `u64` (0 meaning unowned) derived from `Thread::id()`'s internal
/// counter via a thread-local registration table. This avoids unsafe
/// transmutes of `ThreadId` while keeping the owner field a single atomic.
fn thread_token() -> u64 {
    thread_local! {
        static TOKEN: u64 = next_token();
    }
    TOKEN.with(|t| *t)
}

fn next_token() -> u64 {
    static COUNTER: AtomicU64 = AtomicU64::new(1);
    COUNTER.fetch_add(1, Ordering::Relaxed)
}

/// A hybrid reentrant mutual-exclusion lock.
///
/// Fast, uncontended acquisition is a single CAS on an atomic owner token;
/// contended acquisition parks the calling thread on a FIFO waiter chain.
/// The lock is reentrant: the owning thread may acquire it repeatedly
/// without blocking, and must release it the same number of times.
pub struct ReentrantLock {
    owner: AtomicU64,
    lock_count: AtomicI64,
    waiters: WaiterChain,
    spins: AtomicU32,
}

impl ReentrantLock {
    /// Create a new, unlocked lock with the default bounded-spin count.
    pub fn new() -> Self {
        Self::with_spins(DEFAULT_SPINS)
    }

    /// Create a new, unlocked lock with an explicit bounded-spin count.
    pub fn with_spins(spins: usize) -> Self {
        Self {
            owner: AtomicU64::new(0),
            lock_count: AtomicI64::new(0),
            waiters: WaiterChain::new(),
            spins: AtomicU32::new(spins as u32),
        }
    }

    /// `true` if the calling thread currently holds the lock.
    pub fn is_held_by_current_thread(&self) -> bool {
        self.owner.load(Ordering::Acquire) == thread_token()
    }

    /// Number of reentrant acquisitions currently held by the owner, or 0
    /// if unlocked. Approximate if called by a non-owning thread.
    pub fn hold_count(&self) -> i64 {
        self.lock_count.load(Ordering::Acquire).max(0)
    }

    /// CAS `owner` from unowned to `token`, initializing `lock_count`. Does
    /// not consult the waiter chain: used both by the uncontended fast path
    /// (after confirming the chain is empty) and by a parked waiter that has
    /// confirmed it is at the head of the chain.
    fn cas_owner_free(&self, token: u64) -> bool {
        self.owner
            .compare_exchange(0, token, Ordering::AcqRel, Ordering::Acquire)
            .map(|_| {
                self.lock_count.store(1, Ordering::Release);
                true
            })
            .unwrap_or(false)
    }

    fn try_reenter(&self, token: u64) -> bool {
        if self.owner.load(Ordering::Acquire) == token {
            self.lock_count.fetch_add(1, Ordering::Relaxed);
            true
        } else {
            false
        }
    }

    /// The uncontended fast path: reenter if already owner, otherwise CAS
    /// only if the waiter chain is empty (head == null), per the spec'd
    /// state machine's step 1.
    fn try_acquire_fast(&self, token: u64) -> bool {
        if self.try_reenter(token) {
            return true;
        }
        if !self.waiters.is_empty() {
            return false;
        }
        self.cas_owner_free(token)
    }

    /// Acquire the lock, blocking uninterruptibly until it is held.
    pub fn lock(&self) {
        let token = thread_token();
        if self.try_acquire_fast(token) {
            trace!("lock acquired on fast path");
            return;
        }
        let backoff = Backoff::new();
        for _ in 0..self.spins.load(Ordering::Relaxed) {
            if self.try_acquire_fast(token) {
                return;
            }
            backoff.snooze();
        }
        self.park_until_owner(token, None, None)
            .expect("uninterruptible lock() cannot fail");
    }

    /// Acquire the lock, returning [`LockError::Interrupted`] if `token` is
    /// cancelled before acquisition completes.
    pub fn lock_interruptibly(&self, token: &CancellationToken) -> Result<()> {
        let me = thread_token();
        if self.try_acquire_fast(me) {
            return Ok(());
        }
        let backoff = Backoff::new();
        for _ in 0..self.spins.load(Ordering::Relaxed) {
            if self.try_acquire_fast(me) {
                return Ok(());
            }
            if token.take() {
                return Err(LockError::Interrupted);
            }
            backoff.snooze();
        }
        self.park_until_owner(me, None, Some(token))
    }

    /// Attempt to acquire the lock without blocking. Never parks.
    pub fn try_lock(&self) -> bool {
        self.try_acquire_fast(thread_token())
    }

    /// Attempt to acquire the lock, parking up to `timeout` before giving up.
    pub fn try_lock_for(&self, timeout: Duration, token: &CancellationToken) -> Result<bool> {
        let me = thread_token();
        if self.try_acquire_fast(me) {
            return Ok(true);
        }
        let deadline = Instant::now() + timeout;
        let backoff = Backoff::new();
        for _ in 0..self.spins.load(Ordering::Relaxed) {
            if self.try_acquire_fast(me) {
                return Ok(true);
            }
            if Instant::now() >= deadline {
                return Ok(false);
            }
            backoff.snooze();
        }
        match self.park_until_owner(me, Some(deadline), Some(token)) {
            Ok(()) => Ok(true),
            Err(LockError::Timeout { .. }) => Ok(false),
            Err(other) => Err(other),
        }
    }

    /// Park until this thread reaches the head of the waiter chain and wins
    /// ownership, or until `deadline`/`token` cuts the wait short.
    fn park_until_owner(
        &self,
        me: u64,
        deadline: Option<Instant>,
        token: Option<&CancellationToken>,
    ) -> Result<()> {
        let waiter = self.waiters.push_current();
        // Retry the CAS once more: covers the missed-wake race where
        // ownership was released between the spin loop and this push.
        if self.waiters.is_head(waiter) && self.cas_owner_free(me) {
            self.waiters.advance_past(waiter);
            return Ok(());
        }
        loop {
            if let Some(t) = token {
                if t.take() {
                    if self.waiters.unregister(waiter) {
                        return Err(LockError::Interrupted);
                    }
                    // A releaser already claimed this waiter for wakeup:
                    // the signal is in flight, spin-acquire and restore
                    // the cancellation flag rather than dropping the
                    // wakeup on the floor.
                    self.spin_acquire_after_claim(me, waiter);
                    t.restore();
                    return Ok(());
                }
            }
            match deadline {
                Some(d) => {
                    let now = Instant::now();
                    if now >= d {
                        if self.waiters.unregister(waiter) {
                            return Err(LockError::timeout(Duration::ZERO));
                        }
                        self.spin_acquire_after_claim(me, waiter);
                        return Ok(());
                    }
                    thread::park_timeout(d - now);
                }
                None => thread::park(),
            }
            if self.waiters.is_head(waiter) && self.cas_owner_free(me) {
                self.waiters.advance_past(waiter);
                return Ok(());
            }
        }
    }

    /// Spin until ownership is won, used once a releaser has already
    /// targeted this waiter for wakeup (so giving up is no longer an
    /// option: the wakeup must be consumed).
    fn spin_acquire_after_claim(&self, me: u64, waiter: *mut crate::waiter::Waiter) {
        let backoff = Backoff::new();
        loop {
            if self.waiters.is_head(waiter) && self.cas_owner_free(me) {
                self.waiters.advance_past(waiter);
                return;
            }
            backoff.snooze();
        }
    }

    /// Release one level of reentrant ownership. Wakes the next live waiter
    /// once the count reaches zero.
    ///
    /// # Panics
    ///
    /// Panics with [`LockError::IllegalState`] semantics surfaced via a
    /// `Result`-returning caller is not possible for a `Drop`-friendly API,
    /// so `unlock` returns a [`Result`] instead of panicking directly.
    pub fn unlock(&self) -> Result<()> {
        let token = thread_token();
        if self.owner.load(Ordering::Acquire) != token {
            return Err(LockError::illegal_state(
                "unlock called by a thread that does not hold the lock",
            ));
        }
        let remaining = self.lock_count.fetch_sub(1, Ordering::AcqRel) - 1;
        if remaining > 0 {
            return Ok(());
        }
        self.owner.store(0, Ordering::Release);
        match self.waiters.wake_next() {
            Some(thread) => {
                debug!("waking next waiter");
                thread.unpark();
            }
            None => self.waiters.try_close(),
        }
        Ok(())
    }

    /// Run `f` while holding the lock, releasing it afterwards even if `f`
    /// panics.
    pub fn with_lock<R>(&self, f: impl FnOnce() -> R) -> R {
        self.lock();
        struct Guard<'a>(&'a ReentrantLock);
        impl Drop for Guard<'_> {
            fn drop(&mut self) {
                let _ = self.0.unlock();
            }
        }
        let _guard = Guard(self);
        f()
    }
}

impl Default for ReentrantLock {
    fn default() -> Self {
        Self::new()
    }
}

unsafe impl Send for ReentrantLock {}
unsafe impl Sync for ReentrantLock {}

/// Returns the current thread's numeric identity used by [`ReentrantLock`].
/// Exposed so [`crate::condition::Condition`] can save/restore ownership
/// across a wait without re-deriving it.
pub(crate) fn current_token() -> u64 {
    thread_token()
}

/// Test-only accessor kept for completeness; `ThreadId` itself is not
/// derivable from the packed token, so tests assert on behavior instead.
#[allow(dead_code)]
pub(crate) fn token_for(_id: ThreadId) -> Option<u64> {
    None
}
