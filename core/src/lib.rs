//! traffic-breaker - circuit breaker with pluggable transition policies
//!
//! This crate provides a circuit breaker built around a small state machine:
//! - Closed → Open → HalfOpen → Closed lifecycle driven by `state-machines`
//! - Open/half-open/close decisions delegated to pure checks over a [`Snapshot`]
//! - Failure classification decoupled from any transport via [`FailureClassifier`]
//! - Safe sharing across threads; the wrapped call never runs under the lock
//!
//! # Example
//!
//! ```rust
//! use std::time::Duration;
//! use traffic_breaker::{CircuitBreaker, CircuitError};
//!
//! let circuit = CircuitBreaker::builder("payments")
//!     .failure_threshold(3)
//!     .success_threshold(1)
//!     .timeout(Duration::from_secs(1))
//!     .on_open(|name, snapshot| println!("{} opened after {} failures", name, snapshot.failures))
//!     .build()
//!     .expect("valid configuration");
//!
//! // Execute with circuit protection
//! let result = circuit.call(|| Ok::<_, String>("charged"));
//! assert_eq!(result.unwrap(), "charged");
//!
//! for _ in 0..3 {
//!     let _ = circuit.call(|| Err::<(), _>("gateway down".to_string()));
//! }
//!
//! // The breaker is open: the operation is not attempted
//! match circuit.call(|| Ok::<_, String>("never runs")) {
//!     Err(CircuitError::Open(open)) => assert_eq!(open.circuit, "payments"),
//!     other => panic!("expected open circuit, got {:?}", other),
//! }
//! ```

pub mod builder;
pub mod callbacks;
pub mod circuit;
pub mod classifier;
pub mod clock;
pub mod errors;
pub mod policy;

pub use builder::CircuitBuilder;
pub use circuit::{CircuitBreaker, Config};
pub use classifier::{
    DefaultClassifier, FailureClassifier, FailureContext, Outcome, PredicateClassifier,
};
pub use clock::{Clock, ManualClock, MonotonicClock};
pub use errors::{CircuitError, ConfigError, OpenCircuit};
pub use policy::{Check, Policy, Snapshot};

use std::fmt;

/// Lifecycle state of a circuit breaker
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum State {
    /// Calls pass through
    Closed,
    /// Calls are rejected without invoking the operation
    Open,
    /// Calls pass through while recovery is tested
    HalfOpen,
}

impl State {
    /// State name as reported by the underlying state machine
    pub fn as_str(&self) -> &'static str {
        match self {
            State::Closed => "Closed",
            State::Open => "Open",
            State::HalfOpen => "HalfOpen",
        }
    }

    pub(crate) fn from_name(name: &str) -> Self {
        match name {
            "Open" => State::Open,
            "HalfOpen" => State::HalfOpen,
            _ => State::Closed,
        }
    }
}

impl fmt::Display for State {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
