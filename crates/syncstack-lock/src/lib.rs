//! A hybrid reentrant mutual-exclusion lock with a monitor-condition bridge
//!
//! [`ReentrantLock`] combines an uncontended atomic fast path with a parked
//! waiter chain for fairness under contention: an acquiring thread first
//! attempts a CAS on the owner field, falls back to a bounded spin, and
//! finally parks on a FIFO chain of [`Waiter`](waiter::Waiter) records.
//! Release wakes the next live waiter in chain order, or closes the chain
//! with an `INVALIDATED` sentinel once no live waiter remains.
//!
//! [`condition::Condition`] layers condition-variable semantics on top of a
//! lock instance via an auxiliary `parking_lot` monitor, decoupling signal
//! delivery from the lock's own waiter-chain machinery while still saving
//! and restoring reentrancy depth across a wait.

pub mod condition;
pub mod error;
pub mod reentrant;
mod waiter;

pub use condition::Condition;
pub use error::{LockError, Result};
pub use reentrant::{CancellationToken, ReentrantLock};
