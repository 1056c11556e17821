//! Last-chance recovery for terminal pipeline failures.
//!
//! A fallback is consulted exactly once, with the failure the pipeline
//! ended on. Producing a value masks the failure from the command's
//! caller; producing nothing lets the original failure propagate.

use crate::errors::Failure;
use std::sync::Arc;

type RecoverFn<R> = Arc<dyn Fn(&Failure) -> Option<R> + Send + Sync>;

/// A pure recovery function associated with a command at construction.
pub struct Fallback<R> {
    recover: Option<RecoverFn<R>>,
}

impl<R> Fallback<R> {
    /// A fallback that never recovers; failures propagate unchanged.
    #[must_use]
    pub fn none() -> Self {
        Self { recover: None }
    }

    /// A fallback that consults the given function.
    pub fn recover<F>(recover: F) -> Self
    where
        F: Fn(&Failure) -> Option<R> + Send + Sync + 'static,
    {
        Self {
            recover: Some(Arc::new(recover)),
        }
    }

    /// A fallback that masks every failure with a fixed value.
    #[must_use]
    pub fn value(value: R) -> Self
    where
        R: Clone + Send + Sync + 'static,
    {
        Self::recover(move |_| Some(value.clone()))
    }

    /// Consults the fallback for the given failure.
    #[must_use]
    pub fn consult(&self, failure: &Failure) -> Option<R> {
        self.recover.as_ref().and_then(|recover| recover(failure))
    }

    /// Returns true if a recovery function is configured.
    #[must_use]
    pub fn is_configured(&self) -> bool {
        self.recover.is_some()
    }
}

impl<R> Clone for Fallback<R> {
    fn clone(&self) -> Self {
        Self {
            recover: self.recover.clone(),
        }
    }
}

impl<R> Default for Fallback<R> {
    fn default() -> Self {
        Self::none()
    }
}

impl<R> std::fmt::Debug for Fallback<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Fallback")
            .field("configured", &self.is_configured())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_none_never_recovers() {
        let fallback: Fallback<i32> = Fallback::none();
        assert!(!fallback.is_configured());
        assert!(fallback.consult(&Failure::Timeout).is_none());
    }

    #[test]
    fn test_value_masks_every_failure() {
        let fallback = Fallback::value(0);
        assert_eq!(fallback.consult(&Failure::Timeout), Some(0));
        assert_eq!(fallback.consult(&Failure::transport("x")), Some(0));
    }

    #[test]
    fn test_selective_recovery() {
        let fallback = Fallback::recover(|failure| match failure {
            Failure::Timeout => Some("cached".to_string()),
            _ => None,
        });

        assert_eq!(fallback.consult(&Failure::Timeout), Some("cached".to_string()));
        assert!(fallback.consult(&Failure::BreakerOpen).is_none());
    }
}
