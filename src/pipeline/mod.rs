//! The `pipeline` module holds the outbound delivery engine.
//!
//! - `batcher`: bounded FIFO queue and the load-adaptive flush interval.
//! - `connection`: reachability belief with throttled probing.
//! - `replay`: spillover into the offline store and paged replay out of it.
//! - `sender`: the recurring task tying the three together.
//!
//! Shared state is guarded by short-lived `std::sync::Mutex` sections that
//! are never held across an `.await`, so the loops can run on a
//! multi-threaded runtime next to the public client API.

pub mod batcher;
pub mod connection;
pub mod replay;
pub mod sender;

pub use batcher::{BatchLimits, Batcher};
pub use connection::{ConnectionMonitor, PROBE_COOLDOWN};
pub use replay::{OfflineSpool, REPLAY_PAGE_SIZE, ReplayReport};
pub use sender::{MAINTENANCE_INTERVAL, SenderLoop, TickReport};
