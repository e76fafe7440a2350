//! Failure classification
//!
//! The breaker itself knows nothing about transports. A classifier decides,
//! once per attempted call, whether the outcome counts as a failure. Errors
//! returned by the operation always count; a classifier can additionally
//! flag a successful value (an HTTP 503 response, say) as a failure.

use std::any::Any;
use std::time::Duration;

/// Raw result of an attempted call, type-erased so it can be downcast
#[derive(Debug, Clone, Copy)]
pub enum Outcome<'a> {
    Success(&'a dyn Any),
    Error(&'a dyn Any),
}

impl<'a> Outcome<'a> {
    pub fn is_error(&self) -> bool {
        matches!(self, Outcome::Error(_))
    }

    /// Downcast the returned value, if the call succeeded with a `T`
    pub fn value<T: 'static>(&self) -> Option<&'a T> {
        match self {
            Outcome::Success(value) => value.downcast_ref::<T>(),
            Outcome::Error(_) => None,
        }
    }

    /// Downcast the returned error, if the call failed with an `E`
    pub fn error<E: 'static>(&self) -> Option<&'a E> {
        match self {
            Outcome::Error(error) => error.downcast_ref::<E>(),
            Outcome::Success(_) => None,
        }
    }
}

/// Context provided to failure classifiers
#[derive(Debug)]
pub struct FailureContext<'a> {
    /// Circuit name
    pub circuit_name: &'a str,
    pub outcome: Outcome<'a>,
    /// How long the call took
    pub duration: Duration,
}

/// Decides whether an attempted call counts as a failure
///
/// # Examples
///
/// ```rust
/// use traffic_breaker::{FailureClassifier, FailureContext};
///
/// /// Treats HTTP-like status codes of 400 and above as failures
/// #[derive(Debug)]
/// struct StatusClassifier;
///
/// impl FailureClassifier for StatusClassifier {
///     fn is_failure(&self, ctx: &FailureContext<'_>) -> bool {
///         ctx.outcome.value::<u16>().is_some_and(|status| *status >= 400)
///     }
/// }
/// ```
pub trait FailureClassifier: Send + Sync + std::fmt::Debug {
    /// Returns `true` if this outcome should be recorded as a failure.
    ///
    /// The breaker records an `Err` outcome as a failure regardless of the
    /// answer; the return value only matters for successful values.
    fn is_failure(&self, ctx: &FailureContext<'_>) -> bool;
}

/// Classifier that fails on errors only
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultClassifier;

impl FailureClassifier for DefaultClassifier {
    fn is_failure(&self, ctx: &FailureContext<'_>) -> bool {
        ctx.outcome.is_error()
    }
}

/// Predicate-based classifier using a closure
pub struct PredicateClassifier<F>
where
    F: Fn(&FailureContext<'_>) -> bool + Send + Sync,
{
    predicate: F,
}

impl<F> PredicateClassifier<F>
where
    F: Fn(&FailureContext<'_>) -> bool + Send + Sync,
{
    pub fn new(predicate: F) -> Self {
        Self { predicate }
    }
}

impl<F> FailureClassifier for PredicateClassifier<F>
where
    F: Fn(&FailureContext<'_>) -> bool + Send + Sync,
{
    fn is_failure(&self, ctx: &FailureContext<'_>) -> bool {
        (self.predicate)(ctx)
    }
}

impl<F> std::fmt::Debug for PredicateClassifier<F>
where
    F: Fn(&FailureContext<'_>) -> bool + Send + Sync,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PredicateClassifier")
            .field("predicate", &"<closure>")
            .finish()
    }
}
