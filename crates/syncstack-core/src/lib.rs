//! Umbrella crate: re-exports each primitive crate behind a feature, all
//! enabled by default, mirroring how this workspace's component crates are
//! meant to be pulled in individually or as a whole.
//!
//! ```toml
//! # pull in everything
//! syncstack-core = "0.1"
//!
//! # or pick only what you need
//! syncstack-core = { version = "0.1", default-features = false, features = ["lock"] }
//! ```

#[cfg(feature = "queue")]
pub use syncstack_queue as queue;

#[cfg(feature = "lock")]
pub use syncstack_lock as lock;

#[cfg(feature = "leftright")]
pub use syncstack_leftright as leftright;

#[cfg(feature = "ordered")]
pub use syncstack_ordered as ordered;
