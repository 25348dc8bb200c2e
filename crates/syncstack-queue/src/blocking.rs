//! Blocking facades over the lock-free queue cores
//!
//! Every blocking method is the same three-piece composition spec'd for this
//! crate: a fast try, a bounded spin (default [`DEFAULT_SPINS`] iterations),
//! then cooperative back-off — either yielding the scheduler
//! ([`YieldingBlocking`]) or parking the thread ([`ParkingBlockingSc`] for a
//! single consumer, [`ParkingBlockingMc`] for many).
//!
//! Cancellation is modeled with an explicit [`CancellationToken`] rather
//! than a per-thread interrupt flag (Rust has none): a blocking call that
//! observes the token set clears it and returns [`QueueError::Interrupted`],
//! mirroring the clear-on-observe contract spec'd for interrupt flags.

use crate::bounded::{BoundedQueue, QueueCore};
use crate::error::{QueueError, Result};
use crate::mpmc::MpmcQueue;
use crate::mpsc::MpscQueue;
use crossbeam_utils::Backoff;
use log::{trace, warn};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, Thread};
use std::time::{Duration, Instant};

/// Default bounded-spin count before falling back to cooperative back-off.
pub const DEFAULT_SPINS: usize = 5;

/// An explicit, clonable cancellation flag threaded through blocking calls
/// in place of a per-thread interrupt flag.
#[derive(Clone, Default)]
pub struct CancellationToken(Arc<AtomicBool>);

impl CancellationToken {
    /// Create a fresh, uncancelled token.
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation of any blocking call observing this token.
    pub fn cancel(&self) {
        self.0.store(true, Ordering::Release);
    }

    /// True if cancellation has been requested but not yet observed/cleared.
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }

    /// Observe-and-clear: if cancellation was requested, clear it and
    /// return `true` exactly once.
    fn take(&self) -> bool {
        self.0.swap(false, Ordering::AcqRel)
    }
}

/// A queue that can be tried without blocking, returning the item back on
/// rejection so the caller can retry or back off.
pub trait TryQueue<T> {
    /// Attempt to enqueue `item`; `Some(item)` means rejected (full).
    fn try_offer(&self, item: T) -> Option<T>;
    /// Attempt to dequeue; `None` means empty.
    fn try_poll(&self) -> Option<T>;
}

impl<T> TryQueue<T> for MpscQueue<T> {
    fn try_offer(&self, item: T) -> Option<T> {
        match self.offer(item) {
            Ok(()) => None,
            Err(_) => unreachable!("unbounded mpsc offer never fails"),
        }
    }
    fn try_poll(&self) -> Option<T> {
        self.poll()
    }
}

impl<T> TryQueue<T> for MpmcQueue<T> {
    fn try_offer(&self, item: T) -> Option<T> {
        match self.offer(item) {
            Ok(()) => None,
            Err(_) => unreachable!("unbounded mpmc offer never fails"),
        }
    }
    fn try_poll(&self) -> Option<T> {
        self.poll()
    }
}

impl<T, Q: QueueCore<T>> TryQueue<T> for BoundedQueue<Q> {
    fn try_offer(&self, item: T) -> Option<T> {
        if self.size() >= self.capacity() {
            return Some(item);
        }
        match self.offer(item) {
            Ok(()) => None,
            Err(QueueError::Full { .. }) => None, // racing offer lost; caller retries
            Err(_) => None,
        }
    }
    fn try_poll(&self) -> Option<T> {
        self.poll()
    }
}

/// Compute the deadline for a timed operation.
fn deadline(timeout: Duration) -> Instant {
    Instant::now() + timeout
}

fn remaining(deadline: Instant) -> Option<Duration> {
    deadline.checked_duration_since(Instant::now())
}

/// Spin-then-yield blocking facade over any [`TryQueue`].
pub struct YieldingBlocking<Q> {
    inner: Q,
    spins: usize,
}

impl<T, Q: TryQueue<T>> YieldingBlocking<Q> {
    /// Wrap `inner`, spinning up to [`DEFAULT_SPINS`] times before yielding.
    pub fn new(inner: Q) -> Self {
        Self::with_spins(inner, DEFAULT_SPINS)
    }

    /// Wrap `inner` with an explicit spin count.
    pub fn with_spins(inner: Q, spins: usize) -> Self {
        Self { inner, spins }
    }

    /// Borrow the wrapped queue.
    pub fn inner(&self) -> &Q {
        &self.inner
    }

    /// Block until `item` is accepted, until `token` is cancelled.
    pub fn put(&self, mut item: T, token: &CancellationToken) -> Result<()> {
        let backoff = Backoff::new();
        loop {
            match self.inner.try_offer(item) {
                None => return Ok(()),
                Some(returned) => item = returned,
            }
            if token.take() {
                return Err(QueueError::Interrupted);
            }
            if backoff.is_completed() {
                thread::yield_now();
            } else {
                backoff.snooze();
            }
        }
    }

    /// Block until `item` is accepted or `timeout` elapses.
    pub fn offer_timeout(
        &self,
        mut item: T,
        timeout: Duration,
        token: &CancellationToken,
    ) -> Result<()> {
        let deadline = deadline(timeout);
        let start = Instant::now();
        let backoff = Backoff::new();
        loop {
            match self.inner.try_offer(item) {
                None => return Ok(()),
                Some(returned) => item = returned,
            }
            if token.take() {
                return Err(QueueError::Interrupted);
            }
            if remaining(deadline).is_none() {
                warn!("offer_timeout elapsed");
                return Err(QueueError::timeout(start.elapsed()));
            }
            if backoff.is_completed() {
                thread::yield_now();
            } else {
                backoff.snooze();
            }
        }
    }

    /// Block until an element is available, until `token` is cancelled.
    pub fn take(&self, token: &CancellationToken) -> Result<T> {
        let backoff = Backoff::new();
        loop {
            if let Some(item) = self.inner.try_poll() {
                return Ok(item);
            }
            if token.take() {
                return Err(QueueError::Interrupted);
            }
            if backoff.is_completed() {
                thread::yield_now();
            } else {
                backoff.snooze();
            }
        }
    }

    /// Block until an element is available or `timeout` elapses.
    pub fn poll_timeout(&self, timeout: Duration, token: &CancellationToken) -> Result<T> {
        let deadline = deadline(timeout);
        let start = Instant::now();
        let backoff = Backoff::new();
        loop {
            if let Some(item) = self.inner.try_poll() {
                return Ok(item);
            }
            if token.take() {
                return Err(QueueError::Interrupted);
            }
            if remaining(deadline).is_none() {
                return Err(QueueError::timeout(start.elapsed()));
            }
            if backoff.is_completed() {
                thread::yield_now();
            } else {
                backoff.snooze();
            }
        }
    }
}

/// Parking blocking facade for a single consumer, over an MPSC queue.
///
/// Holds one suspended-thread slot: a producer that finds the slot occupied
/// when it succeeds wakes exactly that thread.
pub struct ParkingBlockingSc<T> {
    inner: MpscQueue<T>,
    waiting: Mutex<Option<Thread>>,
}

impl<T> ParkingBlockingSc<T> {
    /// Wrap `inner` with single-consumer parking semantics.
    pub fn new(inner: MpscQueue<T>) -> Self {
        Self {
            inner,
            waiting: Mutex::new(None),
        }
    }

    /// Producers call this after a successful offer to wake the parked
    /// consumer, if any.
    pub fn offer(&self, item: T) -> Result<()> {
        self.inner.offer(item)?;
        if let Some(t) = self.waiting.lock().take() {
            trace!("waking parked sc consumer");
            t.unpark();
        }
        Ok(())
    }

    /// Park until an element is available or `token` is cancelled.
    pub fn take(&self, token: &CancellationToken) -> Result<T> {
        let backoff = Backoff::new();
        for _ in 0..DEFAULT_SPINS {
            if let Some(item) = self.inner.poll() {
                return Ok(item);
            }
            backoff.snooze();
        }
        loop {
            *self.waiting.lock() = Some(thread::current());
            // Close the missed-wakeup race: poll once more after registering.
            if let Some(item) = self.inner.poll() {
                self.waiting.lock().take();
                return Ok(item);
            }
            if token.take() {
                self.waiting.lock().take();
                return Err(QueueError::Interrupted);
            }
            thread::park();
            if let Some(item) = self.inner.poll() {
                self.waiting.lock().take();
                return Ok(item);
            }
        }
    }

    /// Park until an element is available or `timeout` elapses.
    pub fn poll_timeout(&self, timeout: Duration, token: &CancellationToken) -> Result<T> {
        let deadline = deadline(timeout);
        let start = Instant::now();
        for _ in 0..DEFAULT_SPINS {
            if let Some(item) = self.inner.poll() {
                return Ok(item);
            }
        }
        loop {
            *self.waiting.lock() = Some(thread::current());
            if let Some(item) = self.inner.poll() {
                self.waiting.lock().take();
                return Ok(item);
            }
            if token.take() {
                self.waiting.lock().take();
                return Err(QueueError::Interrupted);
            }
            let Some(left) = remaining(deadline) else {
                self.waiting.lock().take();
                return Err(QueueError::timeout(start.elapsed()));
            };
            thread::park_timeout(left);
            if let Some(item) = self.inner.poll() {
                self.waiting.lock().take();
                return Ok(item);
            }
        }
    }
}

/// Parking blocking facade for many consumers, over an MPMC queue.
///
/// The waiter registry is itself an [`MpmcQueue`] of thread handles: a
/// consumer about to park enqueues its own handle, polls once more to close
/// the missed-wakeup race, then parks; a producer that succeeds wakes every
/// currently registered waiter.
pub struct ParkingBlockingMc<T> {
    inner: MpmcQueue<T>,
    waiters: MpmcQueue<Thread>,
}

impl<T> ParkingBlockingMc<T> {
    /// Wrap `inner` with multi-consumer parking semantics.
    pub fn new(inner: MpmcQueue<T>) -> Self {
        Self {
            inner,
            waiters: MpmcQueue::new(),
        }
    }

    /// Producers call this after a successful offer to wake all currently
    /// registered waiters.
    pub fn offer(&self, item: T) -> Result<()> {
        self.inner.offer(item)?;
        while let Some(t) = self.waiters.poll() {
            trace!("waking parked mc consumer");
            t.unpark();
        }
        Ok(())
    }

    /// Park until an element is available or `token` is cancelled.
    pub fn take(&self, token: &CancellationToken) -> Result<T> {
        let backoff = Backoff::new();
        for _ in 0..DEFAULT_SPINS {
            if let Some(item) = self.inner.poll() {
                return Ok(item);
            }
            backoff.snooze();
        }
        loop {
            self.waiters.offer(thread::current())?;
            if let Some(item) = self.inner.poll() {
                return Ok(item);
            }
            if token.take() {
                return Err(QueueError::Interrupted);
            }
            thread::park();
            if let Some(item) = self.inner.poll() {
                return Ok(item);
            }
        }
    }

    /// Park until an element is available or `timeout` elapses.
    pub fn poll_timeout(&self, timeout: Duration, token: &CancellationToken) -> Result<T> {
        let deadline = deadline(timeout);
        let start = Instant::now();
        for _ in 0..DEFAULT_SPINS {
            if let Some(item) = self.inner.poll() {
                return Ok(item);
            }
        }
        loop {
            self.waiters.offer(thread::current())?;
            if let Some(item) = self.inner.poll() {
                return Ok(item);
            }
            if token.take() {
                return Err(QueueError::Interrupted);
            }
            let Some(left) = remaining(deadline) else {
                return Err(QueueError::timeout(start.elapsed()));
            };
            thread::park_timeout(left);
            if let Some(item) = self.inner.poll() {
                return Ok(item);
            }
        }
    }
}
