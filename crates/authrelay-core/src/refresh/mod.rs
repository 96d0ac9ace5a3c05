//! Single-flight session refresh.
//!
//! # State machine
//! ```text
//! Idle ──first Unauthorized──▶ Refreshing ──refresh settles──▶ Idle
//!                                   │
//!            other Unauthorized ────┘ (enqueue as waiter, suspend)
//! ```
//!
//! The first caller to see a refreshable 401 while idle leads the episode and
//! runs the injected refresh. Everyone else who sees a 401 meanwhile parks on
//! a oneshot. When the refresh settles, the waiter queue is drained in one
//! step under the lock and every waiter gets the same outcome: `Proceed`
//! (replay once) or `Abort` (surface the refresh error).

mod coordinator;
mod episode;
mod guard;

pub use coordinator::{refresh_fn, RefreshCoordinator, RefreshFn, RefreshFuture};

#[cfg(test)]
mod tests;
