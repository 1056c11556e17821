//! Racing an operation against a deadline.
//!
//! Exactly one branch's result is ever observable: either the operation
//! completes first and the timer is dropped, or the timer elapses first,
//! the operation future is dropped at the race point, and the invocation
//! resolves to [`Failure::Timeout`]. A dropped future cannot run past its
//! last poll, so a timed-out operation can never publish a late result or
//! mutate shared state after the race has resolved.

use crate::errors::{Failure, Outcome};
use std::future::Future;
use std::time::Duration;
use tracing::debug;

/// Races an operation against a deadline.
///
/// Returns the operation's own [`Outcome`] when it finishes in time, or
/// [`Failure::Timeout`] when the deadline elapses first.
pub async fn deadline<R>(
    limit: Duration,
    operation: impl Future<Output = Outcome<R>>,
) -> Outcome<R> {
    match tokio::time::timeout(limit, operation).await {
        Ok(outcome) => outcome,
        Err(_elapsed) => {
            debug!(limit_ms = limit.as_millis() as u64, "operation timed out");
            Err(Failure::Timeout)
        }
    }
}
