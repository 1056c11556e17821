//! Bounded in-flight invocation guard.
//!
//! Each guarded command tracks how many invocations are currently in
//! flight. At capacity, entry fails immediately with
//! [`Failure::PoolExhausted`] and the pipeline never starts. Slots are
//! RAII permits, so release happens on every exit path, including panics
//! and cancelled futures.

use crate::errors::Failure;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

/// Configuration for a command's concurrency guard.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct PoolConfig {
    /// Maximum simultaneous in-flight invocations.
    pub capacity: usize,
}

impl PoolConfig {
    /// Creates a configuration with the given capacity.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self { capacity }
    }

    /// Validates the configuration.
    pub fn validate(&self) -> Result<(), String> {
        if self.capacity < 1 {
            return Err("capacity must be >= 1".to_string());
        }
        Ok(())
    }
}

/// Per-command bound on simultaneous in-flight invocations.
#[derive(Debug)]
pub struct ConcurrencyGuard {
    capacity: usize,
    permits: Arc<Semaphore>,
}

impl ConcurrencyGuard {
    /// Creates a guard with all slots free.
    #[must_use]
    pub fn new(config: PoolConfig) -> Self {
        Self {
            capacity: config.capacity,
            permits: Arc::new(Semaphore::new(config.capacity)),
        }
    }

    /// Claims a slot, failing immediately when the pool is at capacity.
    pub fn try_acquire(&self) -> Result<PoolPermit, Failure> {
        Arc::clone(&self.permits)
            .try_acquire_owned()
            .map(PoolPermit)
            .map_err(|_| Failure::PoolExhausted)
    }

    /// Number of invocations currently in flight.
    #[must_use]
    pub fn in_flight(&self) -> usize {
        self.capacity - self.permits.available_permits()
    }

    /// Configured capacity.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

/// RAII slot in a command's pool; dropping it frees the slot.
#[derive(Debug)]
pub struct PoolPermit(OwnedSemaphorePermit);
