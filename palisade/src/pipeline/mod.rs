//! Short-circuiting step pipelines with ambient context propagation.
//!
//! A [`Pipeline`] is an ordered sequence of asynchronous steps. Each
//! step's success value feeds the next step; the first failure stops the
//! run and is returned unchanged, and later steps never execute. Every
//! step receives the same [`StepContext`], which carries the invocation
//! tree's shared [`ExecutionContext`] so step authors never thread it
//! explicitly. The carrier is scoped to one run, not global state.

use crate::command::Command;
use crate::context::ExecutionContext;
use crate::errors::{Failure, Outcome};
use crate::transport::Transport;
use futures::future::BoxFuture;
use futures::FutureExt;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

/// The ambient handle a step executes under.
///
/// Cloning is cheap and every clone refers to the same underlying
/// [`ExecutionContext`] instance, so nested commands invoked through
/// [`StepContext::invoke`] observe the identical context as their parent.
#[derive(Clone)]
pub struct StepContext {
    ctx: Arc<ExecutionContext>,
}

impl StepContext {
    pub(crate) fn new(ctx: Arc<ExecutionContext>) -> Self {
        Self { ctx }
    }

    /// Returns the shared execution context.
    #[must_use]
    pub fn execution(&self) -> &Arc<ExecutionContext> {
        &self.ctx
    }

    /// Returns the transport handle from the shared context.
    #[must_use]
    pub fn transport(&self) -> &Arc<dyn Transport> {
        self.ctx.transport()
    }

    /// Invokes another command inside this run.
    ///
    /// The nested command reuses the enclosing context; no context is
    /// passed at the call site. The nested result is awaited at a genuine
    /// suspension point, never by blocking the driving thread.
    pub async fn invoke<A, R>(&self, command: &Command<A, R>, argument: A) -> Outcome<R>
    where
        A: Send + 'static,
        R: Send + 'static,
    {
        command.invoke(&self.ctx, argument).await
    }
}

impl std::fmt::Debug for StepContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StepContext")
            .field("run_id", &self.ctx.run_id())
            .finish()
    }
}

type Runner<A, R> = Arc<dyn Fn(StepContext, A) -> BoxFuture<'static, Outcome<R>> + Send + Sync>;

/// An ordered, short-circuiting sequence of asynchronous steps from an
/// argument of type `A` to an [`Outcome`] of `R`.
///
/// Built once at setup time and immutable thereafter; cloning shares the
/// step chain.
pub struct Pipeline<A, R> {
    runner: Runner<A, R>,
}

impl<A, R> Clone for Pipeline<A, R> {
    fn clone(&self) -> Self {
        Self {
            runner: Arc::clone(&self.runner),
        }
    }
}

impl<A, R> std::fmt::Debug for Pipeline<A, R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pipeline").finish_non_exhaustive()
    }
}

impl<A, R> Pipeline<A, R>
where
    A: Send + 'static,
    R: Send + 'static,
{
    /// Creates a pipeline from its first step.
    pub fn new<F, Fut>(step: F) -> Self
    where
        F: Fn(StepContext, A) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Outcome<R>> + Send + 'static,
    {
        Self {
            runner: Arc::new(move |scope, input| guarded(step(scope, input)).boxed()),
        }
    }

    /// Appends a step fed by the previous step's success value.
    ///
    /// The new step runs only if everything before it succeeded; the
    /// first failure short-circuits the whole pipeline unchanged.
    pub fn then<F, Fut, S>(self, step: F) -> Pipeline<A, S>
    where
        F: Fn(StepContext, R) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Outcome<S>> + Send + 'static,
        S: Send + 'static,
    {
        let prev = self.runner;
        let step = Arc::new(step);
        Pipeline {
            runner: Arc::new(move |scope, input| {
                let prev = Arc::clone(&prev);
                let step = Arc::clone(&step);
                async move {
                    let value = prev(scope.clone(), input).await?;
                    guarded(step(scope, value)).await
                }
                .boxed()
            }),
        }
    }

    /// Appends a pure transformation of the previous step's value.
    pub fn map<F, S>(self, transform: F) -> Pipeline<A, S>
    where
        F: Fn(R) -> S + Send + Sync + 'static,
        S: Send + 'static,
    {
        let transform = Arc::new(transform);
        self.then(move |_scope, value| {
            let transform = Arc::clone(&transform);
            async move { Ok::<S, Failure>(transform(value)) }
        })
    }

    /// Runs the pipeline under the given context.
    ///
    /// The same context instance reaches every step and every nested
    /// command invocation within this run.
    pub async fn run(&self, ctx: &Arc<ExecutionContext>, input: A) -> Outcome<R> {
        (self.runner)(StepContext::new(Arc::clone(ctx)), input).await
    }
}

/// Runs one step, converting a panic into a transport failure instead of
/// letting it escape the pipeline.
async fn guarded<R: Send>(step: impl Future<Output = Outcome<R>> + Send) -> Outcome<R> {
    match AssertUnwindSafe(step).catch_unwind().await {
        Ok(outcome) => outcome,
        Err(panic) => Err(Failure::transport(panic_detail(&panic))),
    }
}

fn panic_detail(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        format!("step panicked: {message}")
    } else if let Some(message) = panic.downcast_ref::<String>() {
        format!("step panicked: {message}")
    } else {
        "step panicked".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{ScriptedTransport, StepCounter};
    use parking_lot::Mutex;
    use pretty_assertions::assert_eq;

    fn test_context() -> Arc<ExecutionContext> {
        Arc::new(ExecutionContext::new(Arc::new(ScriptedTransport::new())))
    }

    #[tokio::test]
    async fn test_values_flow_between_steps() {
        let pipeline = Pipeline::new(|_scope, input: i32| async move { Ok(input + 1) })
            .then(|_scope, value| async move { Ok(value * 10) })
            .map(|value| format!("v{value}"));

        let ctx = test_context();
        assert_eq!(pipeline.run(&ctx, 4).await.unwrap(), "v50");
    }

    #[tokio::test]
    async fn test_first_failure_short_circuits() {
        let ran = StepCounter::new();
        let later = ran.clone();

        let pipeline = Pipeline::new(|_scope, _input: ()| async move {
            Err::<i32, _>(Failure::transport("down"))
        })
        .then(move |_scope, value| {
            let later = later.clone();
            async move {
                later.hit();
                Ok::<i32, Failure>(value)
            }
        });

        let ctx = test_context();
        let failure = pipeline.run(&ctx, ()).await.unwrap_err();

        assert_eq!(failure, Failure::transport("down"));
        assert_eq!(ran.count(), 0);
    }

    #[tokio::test]
    async fn test_step_panic_becomes_transport_failure() {
        let pipeline = Pipeline::new(|_scope, input: i32| async move {
            assert!(input != 0, "boom");
            Ok(input)
        });

        let ctx = test_context();
        let failure = pipeline.run(&ctx, 0).await.unwrap_err();

        assert_eq!(failure.kind(), "transport");
        assert!(failure.to_string().contains("boom"));
    }

    #[tokio::test]
    async fn test_every_step_sees_the_same_context() {
        let seen: Arc<Mutex<Vec<usize>>> = Arc::new(Mutex::new(Vec::new()));
        let first = Arc::clone(&seen);
        let second = Arc::clone(&seen);

        let pipeline = Pipeline::new(move |scope: StepContext, _input: ()| {
            let first = Arc::clone(&first);
            async move {
                first.lock().push(Arc::as_ptr(scope.execution()) as usize);
                Ok(())
            }
        })
        .then(move |scope, ()| {
            let second = Arc::clone(&second);
            async move {
                second.lock().push(Arc::as_ptr(scope.execution()) as usize);
                Ok(())
            }
        });

        let ctx = test_context();
        pipeline.run(&ctx, ()).await.unwrap();

        let seen = seen.lock();
        assert_eq!(seen.len(), 2);
        assert_eq!(seen[0], Arc::as_ptr(&ctx) as usize);
        assert_eq!(seen[0], seen[1]);
    }
}
