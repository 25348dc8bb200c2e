//! Lock-free MP/SC and MP/MC linked FIFO queues
//!
//! This crate provides the queue family described in the workspace-level
//! design: a wait-free single-consumer queue ([`mpsc::MpscQueue`]), a
//! multi-consumer queue with lazy tombstone pruning ([`mpmc::MpmcQueue`]),
//! capacity-tracked bounded wrappers over either ([`bounded`]), and
//! spin/yield or park-based blocking facades over any of them
//! ([`blocking`]).
//!
//! Reclamation of unlinked nodes uses epoch-based garbage collection
//! (`crossbeam-epoch`) so the queues are ABA-free without a hand-rolled
//! hazard-pointer scheme.

pub mod blocking;
pub mod bounded;
pub mod error;
pub mod mpmc;
pub mod mpsc;
mod node;

pub use blocking::{CancellationToken, ParkingBlockingMc, ParkingBlockingSc, TryQueue, YieldingBlocking};
pub use bounded::{BoundedMpmcQueue, BoundedMpscQueue, BoundedQueue, QueueCore};
pub use error::{QueueError, Result};
pub use mpmc::MpmcQueue;
pub use mpsc::MpscQueue;
