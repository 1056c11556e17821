//! Reusable commands binding a pipeline to its protective wrappers.
//!
//! A [`Command`] is the callable unit of the framework: a pipeline, an
//! optional fallback, and optional protective wrappers (deadline, circuit
//! breaker, concurrency pool). It is built once, then invoked repeatedly
//! and concurrently; breaker and pool state are the only mutable state
//! shared between invocations.
//!
//! Rejections produced before the pipeline runs ([`Failure::BreakerOpen`],
//! [`Failure::PoolExhausted`]) propagate directly; the fallback is
//! consulted only for the pipeline's own terminal failure.


use crate::breaker::{BreakerConfig, BreakerStateKind, CircuitBreaker};
use crate::context::ExecutionContext;
use crate::errors::{Failure, Outcome};
use crate::fallback::Fallback;
use crate::observability::InvocationRecord;
use crate::pipeline::Pipeline;
use crate::pool::{ConcurrencyGuard, PoolConfig};
use crate::timeout::deadline;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{debug, warn};

/// Declarative configuration for a command's protective wrappers.
///
/// Hosts typically deserialize this from their own configuration source
/// and hand it to the builder.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CommandConfig {
    /// Deadline for one invocation, if any.
    pub timeout: Option<Duration>,
    /// Circuit breaker settings, if any.
    pub breaker: Option<BreakerConfig>,
    /// Concurrency pool settings, if any.
    pub pool: Option<PoolConfig>,
}

impl CommandConfig {
    /// Creates an empty configuration: no deadline, breaker, or pool.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the invocation deadline.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Sets the circuit breaker configuration.
    #[must_use]
    pub fn with_breaker(mut self, breaker: BreakerConfig) -> Self {
        self.breaker = Some(breaker);
        self
    }

    /// Sets the concurrency pool configuration.
    #[must_use]
    pub fn with_pool(mut self, pool: PoolConfig) -> Self {
        self.pool = Some(pool);
        self
    }

    /// Validates the configuration.
    pub fn validate(&self) -> Result<(), String> {
        if let Some(timeout) = self.timeout {
            if timeout.is_zero() {
                return Err("timeout must be positive".to_string());
            }
        }
        if let Some(ref breaker) = self.breaker {
            breaker.validate()?;
        }
        if let Some(ref pool) = self.pool {
            pool.validate()?;
        }
        Ok(())
    }
}

/// Error produced when a command is built from an invalid configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid configuration for command '{command}': {message}")]
pub struct CommandBuildError {
    /// The command being built.
    pub command: String,
    /// What was wrong.
    pub message: String,
}

/// Builder binding a pipeline and fallback into a [`Command`].
pub struct CommandBuilder<A, R> {
    name: String,
    pipeline: Pipeline<A, R>,
    fallback: Fallback<R>,
    config: CommandConfig,
}

impl<A, R> CommandBuilder<A, R>
where
    A: Send + 'static,
    R: Send + 'static,
{
    /// Sets the fallback consulted on terminal pipeline failure.
    #[must_use]
    pub fn fallback(mut self, fallback: Fallback<R>) -> Self {
        self.fallback = fallback;
        self
    }

    /// Replaces the whole wrapper configuration.
    #[must_use]
    pub fn config(mut self, config: CommandConfig) -> Self {
        self.config = config;
        self
    }

    /// Sets the invocation deadline.
    #[must_use]
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.config.timeout = Some(timeout);
        self
    }

    /// Enables a circuit breaker.
    #[must_use]
    pub fn breaker(mut self, breaker: BreakerConfig) -> Self {
        self.config.breaker = Some(breaker);
        self
    }

    /// Enables a concurrency pool.
    #[must_use]
    pub fn pool(mut self, pool: PoolConfig) -> Self {
        self.config.pool = Some(pool);
        self
    }

    /// Validates the configuration and builds the command.
    pub fn build(self) -> Result<Command<A, R>, CommandBuildError> {
        self.config
            .validate()
            .map_err(|message| CommandBuildError {
                command: self.name.clone(),
                message,
            })?;

        let breaker = self
            .config
            .breaker
            .map(|config| CircuitBreaker::new(self.name.as_str(), config));
        let guard = self.config.pool.map(ConcurrencyGuard::new);

        Ok(Command {
            inner: Arc::new(CommandInner {
                name: self.name,
                pipeline: self.pipeline,
                fallback: self.fallback,
                timeout: self.config.timeout,
                breaker,
                guard,
            }),
        })
    }
}

struct CommandInner<A, R> {
    name: String,
    pipeline: Pipeline<A, R>,
    fallback: Fallback<R>,
    timeout: Option<Duration>,
    breaker: Option<CircuitBreaker>,
    guard: Option<ConcurrencyGuard>,
}

/// A reusable, callable recipe combining a pipeline and a fallback.
///
/// Cloning is cheap; clones share the pipeline and the breaker/pool
/// state, so a nested invocation observes the same protective wrappers
/// as a top-level one.
pub struct Command<A, R> {
    inner: Arc<CommandInner<A, R>>,
}

impl<A, R> Clone for Command<A, R> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<A, R> std::fmt::Debug for Command<A, R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Command")
            .field("name", &self.inner.name)
            .finish_non_exhaustive()
    }
}

impl<A, R> Command<A, R>
where
    A: Send + 'static,
    R: Send + 'static,
{
    /// Starts building a command around the given pipeline.
    #[must_use]
    pub fn builder(name: impl Into<String>, pipeline: Pipeline<A, R>) -> CommandBuilder<A, R> {
        CommandBuilder {
            name: name.into(),
            pipeline,
            fallback: Fallback::none(),
            config: CommandConfig::new(),
        }
    }

    /// Returns the command name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// Observable breaker state, if a breaker is configured.
    #[must_use]
    pub fn breaker_state(&self) -> Option<BreakerStateKind> {
        self.inner.breaker.as_ref().map(CircuitBreaker::state)
    }

    /// Invocations currently in flight, if a pool is configured.
    #[must_use]
    pub fn in_flight(&self) -> Option<usize> {
        self.inner.guard.as_ref().map(ConcurrencyGuard::in_flight)
    }

    /// Runs the command under the given context.
    ///
    /// This is the top-level invocation form; inside another command's
    /// pipeline, use [`StepContext::invoke`](crate::pipeline::StepContext::invoke)
    /// instead, which reuses the enclosing context.
    pub async fn invoke(&self, ctx: &Arc<ExecutionContext>, argument: A) -> Outcome<R> {
        self.execute(ctx, argument).await.0
    }

    /// Runs the command and returns a serializable invocation record
    /// alongside the outcome.
    pub async fn invoke_recorded(
        &self,
        ctx: &Arc<ExecutionContext>,
        argument: A,
    ) -> (Outcome<R>, InvocationRecord) {
        let started = Instant::now();
        let (outcome, recovered) = self.execute(ctx, argument).await;
        let duration_ms = started.elapsed().as_secs_f64() * 1000.0;

        let label = match &outcome {
            Ok(_) => "success",
            Err(failure) => failure.kind(),
        };
        let record = InvocationRecord::new(&self.inner.name, label, recovered, duration_ms);

        (outcome, record)
    }

    async fn execute(&self, ctx: &Arc<ExecutionContext>, argument: A) -> (Outcome<R>, bool) {
        let inner = &*self.inner;

        let permit = match &inner.breaker {
            Some(breaker) => match breaker.try_admit() {
                Ok(permit) => Some(permit),
                Err(failure) => {
                    debug!(command = %inner.name, "short-circuited, breaker open");
                    return (Err(failure), false);
                }
            },
            None => None,
        };

        let _slot = match &inner.guard {
            Some(guard) => match guard.try_acquire() {
                Ok(slot) => Some(slot),
                Err(failure) => {
                    warn!(command = %inner.name, "rejected, pool exhausted");
                    return (Err(failure), false);
                }
            },
            None => None,
        };

        let run = inner.pipeline.run(ctx, argument);
        let outcome = match inner.timeout {
            Some(limit) => deadline(limit, run).await,
            None => run.await,
        };

        if let Some(permit) = permit {
            permit.complete(outcome.is_ok());
        }

        match outcome {
            Ok(value) => (Ok(value), false),
            Err(failure) => match inner.fallback.consult(&failure) {
                Some(recovered) => {
                    debug!(
                        command = %inner.name,
                        kind = failure.kind(),
                        "failure masked by fallback"
                    );
                    (Ok(recovered), true)
                }
                None => {
                    warn!(
                        command = %inner.name,
                        kind = failure.kind(),
                        %failure,
                        "terminal failure"
                    );
                    (Err(failure), false)
                }
            },
        }
    }
}
