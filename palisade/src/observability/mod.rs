//! Tracing setup and per-invocation records.

use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};
use tracing_subscriber::EnvFilter;

/// Initializes a tracing subscriber controlled by `RUST_LOG`.
///
/// Safe to call more than once; later calls are no-ops.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .try_init();
}

/// Serializable summary of one finished command invocation, for hosts
/// that persist invocation logs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InvocationRecord {
    /// Command name.
    pub command: String,
    /// `"success"` or the failure kind label.
    pub outcome: String,
    /// Whether a fallback masked the failure.
    pub recovered: bool,
    /// Wall-clock duration in milliseconds.
    pub duration_ms: f64,
    /// Unix timestamp of completion.
    pub timestamp: f64,
}

impl InvocationRecord {
    /// Creates a record for a finished invocation.
    #[must_use]
    pub fn new(
        command: impl Into<String>,
        outcome: impl Into<String>,
        recovered: bool,
        duration_ms: f64,
    ) -> Self {
        let timestamp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|elapsed| elapsed.as_secs_f64())
            .unwrap_or(0.0);

        Self {
            command: command.into(),
            outcome: outcome.into(),
            recovered,
            duration_ms,
            timestamp,
        }
    }

    /// Returns true if the invocation ended in success, recovered or not.
    #[must_use]
    pub fn succeeded(&self) -> bool {
        self.outcome == "success"
    }
}
