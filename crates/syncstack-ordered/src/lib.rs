//! Per-key ordered task execution over an arbitrary executor.
//!
//! [`OrderedExecutor`] guarantees that tasks submitted under the same key run
//! strictly in submission order and never concurrently, without blocking the
//! executor's worker threads: a submission either becomes the head of a new
//! per-key chain (and is dispatched) or is appended to the currently running
//! chain (and is run inline by whichever thread is already driving it).
//!
//! [`DeadlineExecutor`] layers deadline ordering on top of any [`Executor`]
//! for callers that also want expirable tasks; it does not run a background
//! scheduler thread, so callers drive it by calling
//! [`DeadlineExecutor::tick`] periodically.

mod error;
mod executor;
mod wrapper;

pub use error::{OrderedTaskError, Result};
pub use executor::{BoxedTask, DeadlineExecutor, Executor, ExpirableTask, RayonExecutor};
pub use wrapper::{OrderedExecutor, WrapperState};
