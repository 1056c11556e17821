//! Shared execution context for one invocation tree.
//!
//! An [`ExecutionContext`] is created once per top-level invocation (or
//! reused across many) and shared by `Arc` with every nested command in
//! the tree. It is read-only from the pipeline's perspective and is never
//! mutated mid-run.

use crate::transport::{HttpTransport, Transport};
use std::any::Any;
use std::collections::HashMap;
use std::sync::Arc;
use uuid::Uuid;

/// Shared handle to the external resources a call tree needs.
///
/// Holds the transport client plus any named host resources. Identity is
/// checkable with [`Arc::ptr_eq`], which is how nested commands can be
/// verified to reuse their parent's context.
pub struct ExecutionContext {
    run_id: Uuid,
    transport: Arc<dyn Transport>,
    resources: HashMap<String, Arc<dyn Any + Send + Sync>>,
}

impl ExecutionContext {
    /// Creates a context around a transport handle.
    #[must_use]
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            transport,
            resources: HashMap::new(),
        }
    }

    /// Creates a context backed by the default HTTP transport.
    #[must_use]
    pub fn http() -> Self {
        Self::new(Arc::new(HttpTransport::new()))
    }

    /// Attaches a named shared resource.
    ///
    /// Resources are attached at construction time only; the context is
    /// immutable once a run starts.
    #[must_use]
    pub fn with_resource(
        mut self,
        key: impl Into<String>,
        resource: Arc<dyn Any + Send + Sync>,
    ) -> Self {
        self.resources.insert(key.into(), resource);
        self
    }

    /// Returns the run identity of this context.
    #[must_use]
    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    /// Returns the transport handle.
    #[must_use]
    pub fn transport(&self) -> &Arc<dyn Transport> {
        &self.transport
    }

    /// Looks up a named resource, downcast to its concrete type.
    #[must_use]
    pub fn resource<T: Any + Send + Sync>(&self, key: &str) -> Option<Arc<T>> {
        self.resources
            .get(key)
            .and_then(|resource| Arc::clone(resource).downcast::<T>().ok())
    }

    /// Returns true if a resource is registered under the key.
    #[must_use]
    pub fn has_resource(&self, key: &str) -> bool {
        self.resources.contains_key(key)
    }
}

impl std::fmt::Debug for ExecutionContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExecutionContext")
            .field("run_id", &self.run_id)
            .field("resources", &self.resources.keys().collect::<Vec<_>>())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::ScriptedTransport;

    #[test]
    fn test_context_identity() {
        let ctx = Arc::new(ExecutionContext::new(Arc::new(ScriptedTransport::new())));
        let shared = Arc::clone(&ctx);
        assert!(Arc::ptr_eq(&ctx, &shared));

        let other = Arc::new(ExecutionContext::new(Arc::new(ScriptedTransport::new())));
        assert!(!Arc::ptr_eq(&ctx, &other));
        assert_ne!(ctx.run_id(), other.run_id());
    }

    #[test]
    fn test_typed_resource_access() {
        let ctx = ExecutionContext::new(Arc::new(ScriptedTransport::new()))
            .with_resource("region", Arc::new("eu-west-1".to_string()));

        let region: Arc<String> = ctx.resource("region").unwrap();
        assert_eq!(*region, "eu-west-1");

        // Wrong type downcasts to None rather than panicking.
        assert!(ctx.resource::<u64>("region").is_none());
        assert!(ctx.resource::<String>("missing").is_none());
        assert!(ctx.has_resource("region"));
    }
}
