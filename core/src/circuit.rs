//! Circuit breaker implementation using state machines
//!
//! The lifecycle is a `state-machines` dynamic machine whose guards are the
//! breaker's policy checks. Guards only ever see a [`Snapshot`], so a custom
//! check cannot reach back into the breaker.
//!
//! Locking: all bookkeeping for one breaker runs under a single mutex around
//! the machine. The wrapped operation, the failure classifier and transition
//! callbacks run with that mutex released.

use crate::{
    callbacks::Callbacks,
    classifier::{DefaultClassifier, FailureClassifier, FailureContext, Outcome},
    clock::{Clock, MonotonicClock},
    errors::{CircuitError, ConfigError, OpenCircuit},
    policy::{Policy, Snapshot},
};
use parking_lot::Mutex;
use state_machines::state_machine;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Circuit breaker configuration
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    /// Failures required to open the circuit (default 5)
    pub failure_threshold: usize,

    /// Successes required in HalfOpen to close the circuit (default 5)
    pub success_threshold: usize,

    /// How long the circuit stays Open before a call is let through (default 5s)
    pub timeout: Duration,

    /// Jitter factor for the open timeout (0.0 = no jitter, 1.0 = full jitter)
    /// Uses chrono-machines formula: timeout * (1 - jitter + rand * jitter)
    pub jitter_factor: f64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            success_threshold: 5,
            timeout: Duration::from_secs(5),
            jitter_factor: 0.0,
        }
    }
}

impl Config {
    /// Reject configurations the breaker cannot run with
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.failure_threshold == 0 {
            return Err(ConfigError::ZeroFailureThreshold);
        }
        if self.success_threshold == 0 {
            return Err(ConfigError::ZeroSuccessThreshold);
        }
        if !(0.0..=1.0).contains(&self.jitter_factor) {
            return Err(ConfigError::InvalidJitter(self.jitter_factor));
        }
        Ok(())
    }
}

/// Outcome counters and open timestamp
#[derive(Debug, Clone, Copy, Default)]
pub struct Counters {
    pub failures: usize,
    pub successes: usize,
    pub consecutive_failures: usize,
    pub consecutive_successes: usize,
    pub opened_at: Option<Instant>,
    /// Open timeout sampled when the circuit last opened
    pub open_timeout: Duration,
}

impl Counters {
    fn new(open_timeout: Duration) -> Self {
        Self {
            open_timeout,
            ..Default::default()
        }
    }
}

/// Circuit breaker context - shared data across all states
#[derive(Clone)]
pub struct CircuitContext {
    pub name: String,
    pub config: Config,
    pub policy: Policy,
    pub clock: Arc<dyn Clock>,
    pub failure_classifier: Arc<dyn FailureClassifier>,
    pub counters: Arc<Mutex<Counters>>,
}

impl Default for CircuitContext {
    fn default() -> Self {
        Self::new(
            String::new(),
            Config::default(),
            Policy::default(),
            Arc::new(MonotonicClock),
            Arc::new(DefaultClassifier),
        )
    }
}

impl std::fmt::Debug for CircuitContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CircuitContext")
            .field("name", &self.name)
            .field("config", &self.config)
            .field("policy", &self.policy)
            .field("clock", &self.clock)
            .field("failure_classifier", &self.failure_classifier)
            .field("counters", &*self.counters.lock())
            .finish()
    }
}

impl CircuitContext {
    pub fn new(
        name: String,
        config: Config,
        policy: Policy,
        clock: Arc<dyn Clock>,
        failure_classifier: Arc<dyn FailureClassifier>,
    ) -> Self {
        let counters = Arc::new(Mutex::new(Counters::new(config.timeout)));
        Self {
            name,
            config,
            policy,
            clock,
            failure_classifier,
            counters,
        }
    }

    /// Copy the current counters into a snapshot for the given state
    fn snapshot(&self, state: crate::State) -> Snapshot {
        let counters = *self.counters.lock();
        Snapshot {
            state,
            failures: counters.failures,
            successes: counters.successes,
            consecutive_failures: counters.consecutive_failures,
            consecutive_successes: counters.consecutive_successes,
            failure_threshold: self.config.failure_threshold,
            success_threshold: self.config.success_threshold,
            timeout: counters.open_timeout,
            opened_at: counters.opened_at,
            now: self.clock.now(),
        }
    }

    /// Open timeout for the next Open period, jittered if configured
    fn open_timeout(&self) -> Duration {
        if self.config.jitter_factor > 0.0 {
            let base_ms = millis_saturating(self.config.timeout);
            let policy = chrono_machines::Policy {
                max_attempts: 1,
                base_delay_ms: base_ms,
                multiplier: 1.0,
                max_delay_ms: base_ms,
            };
            let timeout_ms = policy.calculate_delay(1, self.config.jitter_factor);
            Duration::from_millis(timeout_ms as u64)
        } else {
            self.config.timeout
        }
    }
}

/// Whole milliseconds in `d`, capped at `u64::MAX`
fn millis_saturating(d: Duration) -> u64 {
    u64::try_from(d.as_millis()).unwrap_or(u64::MAX)
}

// Define the circuit breaker state machine with dynamic mode
state_machine! {
    name: Circuit,
    context: CircuitContext,
    dynamic: true,

    initial: Closed,
    states: [Closed, Open, HalfOpen],
    events {
        trip {
            guards: [should_open],
            transition: { from: Closed, to: Open }
        }
        reopen {
            transition: { from: HalfOpen, to: Open }
        }
        attempt_reset {
            guards: [timeout_elapsed],
            transition: { from: Open, to: HalfOpen }
        }
        close {
            guards: [should_close],
            transition: { from: HalfOpen, to: Closed }
        }
        force_open {
            transition: { from: [Closed, HalfOpen], to: Open }
        }
        force_half_open {
            transition: { from: [Closed, Open], to: HalfOpen }
        }
        force_close {
            transition: { from: [Open, HalfOpen], to: Closed }
        }
    }
}

impl Circuit<Closed> {
    fn should_open(&self, ctx: &CircuitContext) -> bool {
        ctx.policy.should_open(&ctx.snapshot(crate::State::Closed))
    }
}

impl Circuit<Open> {
    fn timeout_elapsed(&self, ctx: &CircuitContext) -> bool {
        ctx.policy.should_half_open(&ctx.snapshot(crate::State::Open))
    }
}

impl Circuit<HalfOpen> {
    fn should_close(&self, ctx: &CircuitContext) -> bool {
        ctx.policy.should_close(&ctx.snapshot(crate::State::HalfOpen))
    }
}

fn current_state(machine: &DynamicCircuit) -> crate::State {
    crate::State::from_name(machine.current_state())
}

/// Circuit breaker public API
///
/// `CircuitBreaker` is `Send + Sync`; share one instance between callers
/// with an `Arc`.
pub struct CircuitBreaker {
    machine: Mutex<DynamicCircuit>,
    context: CircuitContext,
    callbacks: Callbacks,
}

impl std::fmt::Debug for CircuitBreaker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CircuitBreaker")
            .field("name", &self.context.name)
            .field("state", &self.state())
            .field("callbacks", &self.callbacks)
            .finish()
    }
}

impl CircuitBreaker {
    /// Create a circuit breaker with default policy (use builder() for more options)
    pub fn new(name: impl Into<String>, config: Config) -> Result<Self, ConfigError> {
        config.validate()?;
        let context = CircuitContext::new(
            name.into(),
            config,
            Policy::default(),
            Arc::new(MonotonicClock),
            Arc::new(DefaultClassifier),
        );
        Ok(Self::with_context_and_callbacks(context, Callbacks::new()))
    }

    /// Create a circuit breaker with custom context and callbacks (used by builder)
    pub(crate) fn with_context_and_callbacks(
        context: CircuitContext,
        callbacks: Callbacks,
    ) -> Self {
        let machine = DynamicCircuit::new(context.clone());

        Self {
            machine: Mutex::new(machine),
            context,
            callbacks,
        }
    }

    /// Create a new circuit breaker builder
    pub fn builder(name: impl Into<String>) -> crate::builder::CircuitBuilder {
        crate::builder::CircuitBuilder::new(name)
    }

    /// Execute a fallible operation with circuit breaker protection
    ///
    /// The configured failure classifier sees every attempted outcome once.
    /// An `Err` is always recorded as a failure and returned as
    /// [`CircuitError::Execution`]; an `Ok` value flagged by the classifier is
    /// recorded as a failure but still returned.
    pub fn call<T, E, F>(&self, operation: F) -> Result<T, CircuitError<E>>
    where
        F: FnOnce() -> Result<T, E>,
        T: 'static,
        E: 'static,
    {
        self.try_acquire()?;

        let started = self.context.clock.now();
        let result = operation();
        let duration = self.context.clock.now().saturating_duration_since(started);

        let failed = {
            let outcome = match &result {
                Ok(value) => Outcome::Success(value),
                Err(error) => Outcome::Error(error),
            };
            let ctx = FailureContext {
                circuit_name: &self.context.name,
                outcome,
                duration,
            };
            self.context.failure_classifier.is_failure(&ctx) || outcome.is_error()
        };
        self.record(failed);

        result.map_err(CircuitError::Execution)
    }

    /// Execute with a per-call failure predicate instead of the configured classifier
    ///
    /// `is_failure` is invoked exactly once with the operation's result; an
    /// `Err` counts as a failure whatever it answers.
    pub fn call_classified<T, E, F, P>(
        &self,
        operation: F,
        is_failure: P,
    ) -> Result<T, CircuitError<E>>
    where
        F: FnOnce() -> Result<T, E>,
        P: FnOnce(&Result<T, E>) -> bool,
    {
        self.try_acquire()?;

        let result = operation();
        let failed = is_failure(&result) || result.is_err();
        self.record(failed);

        result.map_err(CircuitError::Execution)
    }

    /// Admission half of [`call`](Self::call)
    ///
    /// Moves Open → HalfOpen when the half-open check passes, then rejects if
    /// the circuit is still open. Callers that run the operation themselves
    /// (async code, for instance) pair this with
    /// [`record_success`](Self::record_success) / [`record_failure`](Self::record_failure).
    pub fn try_acquire(&self) -> Result<(), OpenCircuit> {
        let mut machine = self.machine.lock();

        let mut transition = None;
        if current_state(&machine) == crate::State::Open
            && machine.handle(CircuitEvent::AttemptReset).is_ok()
        {
            transition = Some(self.enter_half_open());
        }

        let rejection = if current_state(&machine) == crate::State::Open {
            let snapshot = self.context.snapshot(crate::State::Open);
            Some(OpenCircuit {
                circuit: self.context.name.clone(),
                opened_at: snapshot.opened_at,
                retry_after: snapshot.retry_after(),
            })
        } else {
            None
        };
        drop(machine);

        self.notify(transition);

        match rejection {
            Some(open) => {
                tracing::debug!(
                    circuit = %self.context.name,
                    retry_after = ?open.retry_after,
                    "call rejected, circuit open"
                );
                Err(open)
            }
            None => Ok(()),
        }
    }

    /// Record a successful operation and drive HalfOpen -> Closed transitions
    pub fn record_success(&self) {
        self.record(false);
    }

    /// Record a failed operation and attempt to trip the circuit
    pub fn record_failure(&self) {
        self.record(true);
    }

    fn record(&self, failed: bool) {
        let mut machine = self.machine.lock();
        let transition = if failed {
            self.on_failure(&mut machine)
        } else {
            self.on_success(&mut machine)
        };
        drop(machine);

        self.notify(transition);
    }

    fn on_failure(&self, machine: &mut DynamicCircuit) -> Option<Snapshot> {
        {
            let mut counters = self.context.counters.lock();
            counters.failures += 1;
            counters.consecutive_failures += 1;
            counters.consecutive_successes = 0;
        }
        tracing::trace!(circuit = %self.context.name, "failure recorded");

        // A single failure while probing reopens the circuit
        let opened = match current_state(machine) {
            crate::State::Closed => machine.handle(CircuitEvent::Trip).is_ok(),
            crate::State::HalfOpen => machine.handle(CircuitEvent::Reopen).is_ok(),
            crate::State::Open => false,
        };

        opened.then(|| {
            let snapshot = self.mark_open();
            tracing::warn!(
                circuit = %self.context.name,
                failures = snapshot.failures,
                consecutive_failures = snapshot.consecutive_failures,
                timeout = ?snapshot.timeout,
                "circuit opened"
            );
            snapshot
        })
    }

    fn on_success(&self, machine: &mut DynamicCircuit) -> Option<Snapshot> {
        {
            let mut counters = self.context.counters.lock();
            counters.successes += 1;
            counters.consecutive_successes += 1;
            counters.consecutive_failures = 0;
        }
        tracing::trace!(circuit = %self.context.name, "success recorded");

        if current_state(machine) == crate::State::HalfOpen
            && machine.handle(CircuitEvent::Close).is_ok()
        {
            let snapshot = self.context.snapshot(crate::State::Closed);
            tracing::info!(
                circuit = %self.context.name,
                successes = snapshot.successes,
                "circuit closed"
            );
            return Some(snapshot);
        }
        None
    }

    /// Force the circuit open
    ///
    /// On an already open circuit this only restarts the open timeout.
    pub fn force_open(&self) {
        let mut machine = self.machine.lock();
        let transition = if current_state(&machine) == crate::State::Open {
            self.mark_open();
            None
        } else if machine.handle(CircuitEvent::ForceOpen).is_ok() {
            Some(self.mark_open())
        } else {
            None
        };
        drop(machine);

        tracing::debug!(circuit = %self.context.name, "circuit forced open");
        self.notify(transition);
    }

    /// Force the circuit into HalfOpen, zeroing the aggregate counters
    pub fn force_half_open(&self) {
        let mut machine = self.machine.lock();
        let transition = if current_state(&machine) == crate::State::HalfOpen {
            self.clear_aggregates();
            None
        } else if machine.handle(CircuitEvent::ForceHalfOpen).is_ok() {
            Some(self.enter_half_open())
        } else {
            None
        };
        drop(machine);

        tracing::debug!(circuit = %self.context.name, "circuit forced half-open");
        self.notify(transition);
    }

    /// Force the circuit closed; counters are left untouched
    pub fn force_close(&self) {
        let mut machine = self.machine.lock();
        let transition = (current_state(&machine) != crate::State::Closed
            && machine.handle(CircuitEvent::ForceClose).is_ok())
        .then(|| self.context.snapshot(crate::State::Closed));
        drop(machine);

        tracing::debug!(circuit = %self.context.name, "circuit forced closed");
        self.notify(transition);
    }

    /// Zero all counters and reset circuit to Closed state
    pub fn reset(&self) {
        let mut machine = self.machine.lock();
        *self.context.counters.lock() = Counters::new(self.context.config.timeout);
        // Recreate machine in Closed state
        *machine = DynamicCircuit::new(self.context.clone());
        drop(machine);

        tracing::debug!(circuit = %self.context.name, "circuit reset");
    }

    /// Copy of the breaker's state and counters
    pub fn snapshot(&self) -> Snapshot {
        let machine = self.machine.lock();
        self.context.snapshot(current_state(&machine))
    }

    pub fn state(&self) -> crate::State {
        current_state(&self.machine.lock())
    }

    /// Get current state name
    pub fn state_name(&self) -> &'static str {
        self.state().as_str()
    }

    pub fn is_open(&self) -> bool {
        self.state() == crate::State::Open
    }

    pub fn is_closed(&self) -> bool {
        self.state() == crate::State::Closed
    }

    pub fn is_half_open(&self) -> bool {
        self.state() == crate::State::HalfOpen
    }

    pub fn failure_count(&self) -> usize {
        self.snapshot().failures
    }

    pub fn success_count(&self) -> usize {
        self.snapshot().successes
    }

    pub fn consecutive_failures(&self) -> usize {
        self.snapshot().consecutive_failures
    }

    pub fn consecutive_successes(&self) -> usize {
        self.snapshot().consecutive_successes
    }

    /// When the circuit last entered Open (cleared by `reset`)
    pub fn opened_at(&self) -> Option<Instant> {
        self.snapshot().opened_at
    }

    pub fn name(&self) -> &str {
        &self.context.name
    }

    pub fn config(&self) -> &Config {
        &self.context.config
    }

    /// Apply Open-state bookkeeping (timestamp + sampled timeout)
    fn mark_open(&self) -> Snapshot {
        let now = self.context.clock.now();
        let timeout = self.context.open_timeout();
        {
            let mut counters = self.context.counters.lock();
            counters.opened_at = Some(now);
            counters.open_timeout = timeout;
        }
        self.context.snapshot(crate::State::Open)
    }

    /// Apply HalfOpen-state bookkeeping (aggregate counters start over)
    fn enter_half_open(&self) -> Snapshot {
        self.clear_aggregates();
        tracing::info!(circuit = %self.context.name, "circuit half-open, probing recovery");
        self.context.snapshot(crate::State::HalfOpen)
    }

    fn clear_aggregates(&self) {
        let mut counters = self.context.counters.lock();
        counters.failures = 0;
        counters.successes = 0;
    }

    fn notify(&self, transition: Option<Snapshot>) {
        if let Some(snapshot) = transition {
            self.callbacks.trigger(&self.context.name, &snapshot);
        }
    }
}
