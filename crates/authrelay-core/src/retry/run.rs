//! Retry loop: run an async call until success or the policy says stop.

use std::future::Future;

use crate::classify::{classify, CallContext};
use crate::error::TransportError;

use super::policy::{RetryDecision, RetryPolicy};

/// Runs `call` until it succeeds or the retry policy says to stop.
/// On a transient failure, sleeps for the backoff delay then tries again.
/// The last outcome is returned unchanged.
pub async fn run_with_retry<T, F, Fut>(policy: &RetryPolicy, mut call: F) -> Result<T, TransportError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, TransportError>>,
{
    let ctx = CallContext::default();
    let mut attempt = 0u32;
    loop {
        let err = match call().await {
            Ok(v) => return Ok(v),
            Err(e) => e,
        };
        let kind = classify(&err, &ctx);
        match policy.decide(attempt, kind) {
            RetryDecision::NoRetry => {
                if kind.is_transient() {
                    tracing::warn!(attempts = attempt + 1, %kind, "giving up after retries");
                }
                return Err(err);
            }
            RetryDecision::RetryAfter(delay) => {
                attempt += 1;
                tracing::debug!(attempt, delay_ms = delay.as_millis() as u64, %kind, "retrying");
                tokio::time::sleep(delay).await;
            }
        }
    }
}
