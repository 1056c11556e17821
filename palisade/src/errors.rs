//! Failure taxonomy and outcome type for command execution.
//!
//! Every asynchronous unit in the framework produces exactly one
//! [`Outcome`]: a success value or one of the closed set of [`Failure`]
//! kinds. Failures flow as data, never as unwinding.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// The closed set of ways a command invocation can fail.
///
/// A `Failure` carries enough detail for diagnostics and never carries a
/// successful value. Once produced by a pipeline step it is returned
/// unchanged; only an explicit fallback decision may replace it.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Failure {
    /// The transport operation itself failed (connection, I/O, or a
    /// payload the boundary could not deserialize).
    #[error("transport error: {detail}")]
    Transport {
        /// Underlying cause, for diagnostics.
        detail: String,
    },

    /// The service answered, but the embedded status in the parsed body
    /// marks the response as failed.
    #[error("response error: {detail}")]
    Response {
        /// What the service reported.
        detail: String,
    },

    /// The operation did not complete before its deadline.
    #[error("operation timed out")]
    Timeout,

    /// The command's circuit breaker is open; the pipeline was not run.
    #[error("circuit breaker open")]
    BreakerOpen,

    /// The command's concurrency pool is at capacity; the pipeline was
    /// not run.
    #[error("concurrency pool exhausted")]
    PoolExhausted,
}

impl Failure {
    /// Creates a transport failure.
    #[must_use]
    pub fn transport(detail: impl Into<String>) -> Self {
        Self::Transport {
            detail: detail.into(),
        }
    }

    /// Creates a response failure.
    #[must_use]
    pub fn response(detail: impl Into<String>) -> Self {
        Self::Response {
            detail: detail.into(),
        }
    }

    /// Returns a stable label identifying the failure kind.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Transport { .. } => "transport",
            Self::Response { .. } => "response",
            Self::Timeout => "timeout",
            Self::BreakerOpen => "breaker_open",
            Self::PoolExhausted => "pool_exhausted",
        }
    }

    /// Returns true if the failure was produced before the pipeline ran
    /// (a breaker or pool rejection rather than a pipeline outcome).
    #[must_use]
    pub fn is_rejection(&self) -> bool {
        matches!(self, Self::BreakerOpen | Self::PoolExhausted)
    }
}

/// The result of one asynchronous unit of work: a value or a classified
/// [`Failure`], never both.
pub type Outcome<R> = Result<R, Failure>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_failure_display_names_cause() {
        let failure = Failure::transport("connection refused");
        assert_eq!(failure.to_string(), "transport error: connection refused");

        let failure = Failure::Timeout;
        assert_eq!(failure.to_string(), "operation timed out");
    }

    #[test]
    fn test_failure_kind_labels() {
        assert_eq!(Failure::transport("x").kind(), "transport");
        assert_eq!(Failure::response("x").kind(), "response");
        assert_eq!(Failure::Timeout.kind(), "timeout");
        assert_eq!(Failure::BreakerOpen.kind(), "breaker_open");
        assert_eq!(Failure::PoolExhausted.kind(), "pool_exhausted");
    }

    #[test]
    fn test_rejection_kinds() {
        assert!(Failure::BreakerOpen.is_rejection());
        assert!(Failure::PoolExhausted.is_rejection());
        assert!(!Failure::Timeout.is_rejection());
        assert!(!Failure::transport("x").is_rejection());
    }

    #[test]
    fn test_failure_serde_round_trip() {
        let failure = Failure::response("status 500");
        let json = serde_json::to_string(&failure).unwrap();
        let back: Failure = serde_json::from_str(&json).unwrap();
        assert_eq!(failure, back);
    }
}
