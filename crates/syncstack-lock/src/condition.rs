//! Monitor-condition bridge for [`ReentrantLock`]
//!
//! A [`Condition`] decouples signalling from the hybrid lock's own waiter
//! chain by routing through an auxiliary intrinsic monitor — here,
//! `parking_lot::{Mutex<()>, Condvar}` — rather than the lock's internal
//! atomic/park machinery. Waiting fully releases the owning lock (saving
//! its reentrancy count) and reacquires it with that same count on the way
//! out, whether the wait ended via signal, spurious wake, or interruption.

use crate::error::{LockError, Result};
use crate::reentrant::{CancellationToken, ReentrantLock};
use parking_lot::{Condvar, Mutex};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// A condition variable associated with a [`ReentrantLock`].
///
/// The caller must hold the associated lock when calling [`Condition::await_`],
/// [`Condition::signal`], or [`Condition::signal_all`] — this is enforced
/// with [`LockError::IllegalState`], per spec.md's ownership-check
/// requirement for monitor operations.
pub struct Condition {
    lock: Arc<ReentrantLock>,
    monitor: Mutex<()>,
    condvar: Condvar,
}

impl Condition {
    /// Create a condition bound to `lock`.
    pub fn new(lock: Arc<ReentrantLock>) -> Self {
        Self {
            lock,
            monitor: Mutex::new(()),
            condvar: Condvar::new(),
        }
    }

    fn check_owned(&self) -> Result<()> {
        if !self.lock.is_held_by_current_thread() {
            return Err(LockError::illegal_state(
                "condition operation attempted without holding the associated lock",
            ));
        }
        Ok(())
    }

    /// Atomically save the caller's reentrancy count, fully release the
    /// lock, and wait on the internal monitor until signalled or woken
    /// spuriously. Regains the lock with the saved count before returning,
    /// even if the wait is interrupted.
    pub fn await_(&self) -> Result<()> {
        self.check_owned()?;
        // Take the monitor guard *before* releasing the lock: `signal`/
        // `signal_all` also need the guard to notify, and can only obtain
        // the lock once we release it below, so holding the guard across
        // that release closes the window where a signal could fire before
        // we are actually parked on the condvar.
        let mut guard = self.monitor.lock();
        let saved_count = self.release_fully_for_wait()?;
        self.condvar.wait(&mut guard);
        drop(guard);
        self.reacquire_with_count(saved_count)
    }

    /// As [`Condition::await_`], but returns [`LockError::Interrupted`] (and
    /// still regains the lock) if `token` is observed cancelled.
    pub fn await_interruptibly(&self, token: &CancellationToken) -> Result<()> {
        self.check_owned()?;
        let mut guard = self.monitor.lock();
        let saved_count = self.release_fully_for_wait()?;
        let interrupted;
        loop {
            let result = self
                .condvar
                .wait_for(&mut guard, Duration::from_millis(5));
            if !result.timed_out() {
                interrupted = false;
                break;
            }
            if token.take() {
                interrupted = true;
                break;
            }
        }
        drop(guard);
        self.reacquire_with_count(saved_count)?;
        if interrupted {
            return Err(LockError::Interrupted);
        }
        Ok(())
    }

    /// As [`Condition::await_`], but gives up waiting once `timeout` elapses,
    /// still regaining the lock either way. Returns `true` if signalled
    /// before the timeout, `false` if the timeout elapsed first.
    pub fn await_timeout(&self, timeout: Duration) -> Result<bool> {
        self.check_owned()?;
        let mut guard = self.monitor.lock();
        let saved_count = self.release_fully_for_wait()?;
        let deadline = Instant::now() + timeout;
        let woke;
        loop {
            let now = Instant::now();
            if now >= deadline {
                woke = false;
                break;
            }
            let result = self.condvar.wait_for(&mut guard, deadline - now);
            if !result.timed_out() {
                woke = true;
                break;
            }
        }
        drop(guard);
        self.reacquire_with_count(saved_count)?;
        Ok(woke)
    }

    /// Wake exactly one thread waiting on this condition. The caller must
    /// hold the associated lock.
    pub fn signal(&self) -> Result<()> {
        self.check_owned()?;
        let _guard = self.monitor.lock();
        self.condvar.notify_one();
        Ok(())
    }

    /// Wake every thread waiting on this condition. The caller must hold
    /// the associated lock.
    pub fn signal_all(&self) -> Result<()> {
        self.check_owned()?;
        let _guard = self.monitor.lock();
        self.condvar.notify_all();
        Ok(())
    }

    /// Fully release the lock (regardless of reentrancy depth) and return
    /// the saved depth so it can be restored on reacquisition.
    fn release_fully_for_wait(&self) -> Result<i64> {
        let saved = self.lock.hold_count();
        for _ in 0..saved {
            self.lock.unlock()?;
        }
        Ok(saved)
    }

    fn reacquire_with_count(&self, saved_count: i64) -> Result<()> {
        self.lock.lock();
        for _ in 1..saved_count {
            self.lock.lock();
        }
        Ok(())
    }
}
