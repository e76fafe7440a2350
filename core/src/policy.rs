//! Transition policies for the circuit breaker
//!
//! Every transition decision is a pure predicate over a [`Snapshot`], a
//! by-value copy of the breaker's state taken under the breaker lock. Checks
//! never see the breaker itself, so they cannot mutate it.

use crate::State;
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Immutable view of a circuit breaker handed to policy checks and callbacks
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Snapshot {
    pub state: State,
    /// Failures since the last reset or entry into HalfOpen
    pub failures: usize,
    /// Successes since the last reset or entry into HalfOpen
    pub successes: usize,
    /// Current failure streak
    pub consecutive_failures: usize,
    /// Current success streak
    pub consecutive_successes: usize,
    pub failure_threshold: usize,
    pub success_threshold: usize,
    /// Effective open timeout (jitter already applied)
    pub timeout: Duration,
    /// When the circuit last entered Open
    pub opened_at: Option<Instant>,
    /// Clock reading at the moment the snapshot was taken
    pub now: Instant,
}

impl Snapshot {
    /// Time spent since the circuit last opened
    pub fn open_elapsed(&self) -> Option<Duration> {
        self.opened_at.map(|opened_at| self.now.saturating_duration_since(opened_at))
    }

    /// Time left before the open timeout expires (zero once it has)
    pub fn retry_after(&self) -> Duration {
        self.open_elapsed()
            .map(|elapsed| self.timeout.saturating_sub(elapsed))
            .unwrap_or(Duration::ZERO)
    }

    /// Total outcomes counted toward the aggregate counters
    pub fn total_calls(&self) -> usize {
        self.failures + self.successes
    }
}

/// A transition predicate
pub type Check = Arc<dyn Fn(&Snapshot) -> bool + Send + Sync>;

/// Trip when aggregate failures reach the failure threshold
pub fn default_open_check(s: &Snapshot) -> bool {
    s.failures >= s.failure_threshold
}

/// Let a call through once the circuit has been open for strictly longer than the timeout
pub fn default_half_open_check(s: &Snapshot) -> bool {
    s.state == State::Open && s.open_elapsed().is_some_and(|elapsed| elapsed > s.timeout)
}

/// Close once enough successes were seen while half-open
pub fn default_close_check(s: &Snapshot) -> bool {
    s.state == State::HalfOpen && s.successes >= s.success_threshold
}

/// Trip on a failure streak instead of an aggregate count
pub fn consecutive_open_check(s: &Snapshot) -> bool {
    s.consecutive_failures >= s.failure_threshold
}

/// Close on a success streak instead of an aggregate count
pub fn consecutive_close_check(s: &Snapshot) -> bool {
    s.state == State::HalfOpen && s.consecutive_successes >= s.success_threshold
}

/// Rate-based open check
///
/// Trips when `failures / (failures + successes) >= rate`, evaluated only once
/// at least `minimum_calls` outcomes were counted. `rate` is clamped to
/// `0.0..=1.0`.
///
/// # Example
///
/// ```rust
/// use traffic_breaker::{CircuitBreaker, policy};
///
/// let circuit = CircuitBreaker::builder("search")
///     .open_check(policy::failure_rate(0.5, 10))
///     .build()
///     .unwrap();
/// assert!(circuit.is_closed());
/// ```
pub fn failure_rate(rate: f64, minimum_calls: usize) -> impl Fn(&Snapshot) -> bool + Send + Sync {
    let rate = rate.clamp(0.0, 1.0);
    move |s: &Snapshot| {
        let total = s.total_calls();
        if total == 0 || total < minimum_calls {
            return false;
        }
        (s.failures as f64 / total as f64) >= rate
    }
}

/// The three transition checks a breaker consults
#[derive(Clone)]
pub struct Policy {
    /// Evaluated after each failure recorded while Closed
    pub open_check: Check,
    /// Evaluated at the start of every call while Open
    pub half_open_check: Check,
    /// Evaluated after each success recorded while HalfOpen
    pub close_check: Check,
}

impl Policy {
    /// Streak-based policy using the consecutive counters
    pub fn consecutive() -> Self {
        Self {
            open_check: Arc::new(consecutive_open_check),
            half_open_check: Arc::new(default_half_open_check),
            close_check: Arc::new(consecutive_close_check),
        }
    }

    pub fn with_open_check<F>(mut self, f: F) -> Self
    where
        F: Fn(&Snapshot) -> bool + Send + Sync + 'static,
    {
        self.open_check = Arc::new(f);
        self
    }

    pub fn with_half_open_check<F>(mut self, f: F) -> Self
    where
        F: Fn(&Snapshot) -> bool + Send + Sync + 'static,
    {
        self.half_open_check = Arc::new(f);
        self
    }

    pub fn with_close_check<F>(mut self, f: F) -> Self
    where
        F: Fn(&Snapshot) -> bool + Send + Sync + 'static,
    {
        self.close_check = Arc::new(f);
        self
    }

    pub(crate) fn should_open(&self, s: &Snapshot) -> bool {
        (self.open_check)(s)
    }

    pub(crate) fn should_half_open(&self, s: &Snapshot) -> bool {
        (self.half_open_check)(s)
    }

    pub(crate) fn should_close(&self, s: &Snapshot) -> bool {
        (self.close_check)(s)
    }
}

impl Default for Policy {
    fn default() -> Self {
        Self {
            open_check: Arc::new(default_open_check),
            half_open_check: Arc::new(default_half_open_check),
            close_check: Arc::new(default_close_check),
        }
    }
}

impl fmt::Debug for Policy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Policy")
            .field("open_check", &"<fn>")
            .field("half_open_check", &"<fn>")
            .field("close_check", &"<fn>")
            .finish()
    }
}
