//! Retry and backoff policy.
//!
//! Bounded exponential backoff for transient failures (no response, 5xx).
//! Applied only where a call site opts in, typically idempotent reads.

mod policy;
mod run;

pub use policy::{RetryDecision, RetryPolicy};
pub use run::run_with_retry;
