//! Builder API for ergonomic circuit breaker configuration

use crate::{
    callbacks::Callbacks,
    circuit::{CircuitBreaker, CircuitContext, Config},
    classifier::{DefaultClassifier, FailureClassifier},
    clock::{Clock, MonotonicClock},
    errors::ConfigError,
    policy::{Policy, Snapshot},
};
use std::sync::Arc;
use std::time::Duration;

/// Builder for creating circuit breakers with fluent API
pub struct CircuitBuilder {
    name: String,
    config: Config,
    policy: Policy,
    clock: Option<Arc<dyn Clock>>,
    failure_classifier: Option<Arc<dyn FailureClassifier>>,
    callbacks: Callbacks,
}

impl CircuitBuilder {
    /// Create a new builder for a circuit with the given name
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            config: Config::default(),
            policy: Policy::default(),
            clock: None,
            failure_classifier: None,
            callbacks: Callbacks::new(),
        }
    }

    /// Replace the whole configuration
    pub fn config(mut self, config: Config) -> Self {
        self.config = config;
        self
    }

    /// Set the failure threshold (failures needed to open the circuit)
    pub fn failure_threshold(mut self, threshold: usize) -> Self {
        self.config.failure_threshold = threshold;
        self
    }

    /// Set the success threshold (successes needed to close from half-open)
    pub fn success_threshold(mut self, threshold: usize) -> Self {
        self.config.success_threshold = threshold;
        self
    }

    /// Set how long the circuit stays open before probing
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.config.timeout = timeout;
        self
    }

    /// Set the jitter factor (0.0 = no jitter, 1.0 = full jitter)
    /// Uses chrono-machines formula: timeout * (1 - jitter + rand * jitter)
    pub fn jitter_factor(mut self, factor: f64) -> Self {
        self.config.jitter_factor = factor;
        self
    }

    /// Replace all three transition checks
    pub fn policy(mut self, policy: Policy) -> Self {
        self.policy = policy;
        self
    }

    /// Override the Closed -> Open check
    pub fn open_check<F>(mut self, f: F) -> Self
    where
        F: Fn(&Snapshot) -> bool + Send + Sync + 'static,
    {
        self.policy = self.policy.with_open_check(f);
        self
    }

    /// Override the Open -> HalfOpen check
    pub fn half_open_check<F>(mut self, f: F) -> Self
    where
        F: Fn(&Snapshot) -> bool + Send + Sync + 'static,
    {
        self.policy = self.policy.with_half_open_check(f);
        self
    }

    /// Override the HalfOpen -> Closed check
    pub fn close_check<F>(mut self, f: F) -> Self
    where
        F: Fn(&Snapshot) -> bool + Send + Sync + 'static,
    {
        self.policy = self.policy.with_close_check(f);
        self
    }

    /// Set the time source (defaults to [`MonotonicClock`])
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    /// Set a failure classifier to decide which outcomes count as failures
    ///
    /// Errors always count. Use a classifier to also count successful values
    /// that signal a degraded dependency, such as a 5xx response.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use traffic_breaker::{CircuitBreaker, PredicateClassifier};
    /// use std::sync::Arc;
    ///
    /// let circuit = CircuitBreaker::builder("api")
    ///     .failure_classifier(Arc::new(PredicateClassifier::new(|ctx| {
    ///         ctx.outcome.value::<u16>().is_some_and(|status| *status >= 500)
    ///     })))
    ///     .build()
    ///     .unwrap();
    ///
    /// assert_eq!(circuit.call(|| Ok::<u16, String>(503)).unwrap(), 503);
    /// assert_eq!(circuit.failure_count(), 1);
    /// ```
    pub fn failure_classifier(mut self, classifier: Arc<dyn FailureClassifier>) -> Self {
        self.failure_classifier = Some(classifier);
        self
    }

    /// Set callback for when circuit opens
    pub fn on_open<F>(mut self, f: F) -> Self
    where
        F: Fn(&str, &Snapshot) + Send + Sync + 'static,
    {
        self.callbacks.on_open = Some(Arc::new(f));
        self
    }

    /// Set callback for when circuit closes
    pub fn on_close<F>(mut self, f: F) -> Self
    where
        F: Fn(&str, &Snapshot) + Send + Sync + 'static,
    {
        self.callbacks.on_close = Some(Arc::new(f));
        self
    }

    /// Set callback for when circuit enters half-open
    pub fn on_half_open<F>(mut self, f: F) -> Self
    where
        F: Fn(&str, &Snapshot) + Send + Sync + 'static,
    {
        self.callbacks.on_half_open = Some(Arc::new(f));
        self
    }

    /// Build the circuit breaker, rejecting invalid thresholds
    pub fn build(self) -> Result<CircuitBreaker, ConfigError> {
        self.config.validate()?;

        let clock = self.clock.unwrap_or_else(|| Arc::new(MonotonicClock));
        let failure_classifier = self
            .failure_classifier
            .unwrap_or_else(|| Arc::new(DefaultClassifier));

        let context = CircuitContext::new(
            self.name,
            self.config,
            self.policy,
            clock,
            failure_classifier,
        );

        Ok(CircuitBreaker::with_context_and_callbacks(
            context,
            self.callbacks,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_defaults() {
        let circuit = CircuitBuilder::new("test").build().unwrap();

        assert_eq!(circuit.state_name(), "Closed");
        assert!(circuit.is_closed());
        assert_eq!(circuit.config(), &Config::default());
    }

    #[test]
    fn test_builder_custom_config() {
        let circuit = CircuitBuilder::new("test")
            .failure_threshold(10)
            .success_threshold(3)
            .timeout(Duration::from_secs(60))
            .build()
            .unwrap();

        assert!(circuit.is_closed());
        assert_eq!(circuit.config().failure_threshold, 10);
        assert_eq!(circuit.config().success_threshold, 3);
        assert_eq!(circuit.config().timeout, Duration::from_secs(60));
    }

    #[test]
    fn test_builder_rejects_invalid_config() {
        let err = CircuitBuilder::new("test")
            .failure_threshold(0)
            .build()
            .unwrap_err();
        assert_eq!(err, ConfigError::ZeroFailureThreshold);

        let err = CircuitBuilder::new("test")
            .success_threshold(0)
            .build()
            .unwrap_err();
        assert_eq!(err, ConfigError::ZeroSuccessThreshold);

        let err = CircuitBuilder::new("test")
            .jitter_factor(-0.1)
            .build()
            .unwrap_err();
        assert_eq!(err, ConfigError::InvalidJitter(-0.1));

        let err = CircuitBuilder::new("test")
            .config(Config {
                jitter_factor: f64::NAN,
                ..Default::default()
            })
            .build()
            .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidJitter(_)));
    }

    #[test]
    fn test_builder_with_callbacks() {
        use std::sync::atomic::{AtomicBool, Ordering};

        let opened = Arc::new(AtomicBool::new(false));
        let opened_clone = opened.clone();

        let circuit = CircuitBuilder::new("test")
            .failure_threshold(2)
            .on_open(move |_name, _snapshot| {
                opened_clone.store(true, Ordering::SeqCst);
            })
            .build()
            .unwrap();

        // Trigger failures to open circuit
        let _ = circuit.call(|| Err::<(), _>("error 1"));
        let _ = circuit.call(|| Err::<(), _>("error 2"));

        // Callback should have been triggered
        assert!(opened.load(Ordering::SeqCst));
    }

    #[test]
    fn test_builder_open_check_override() {
        let circuit = CircuitBuilder::new("test")
            .failure_threshold(100)
            .open_check(|s| s.consecutive_failures >= 2)
            .build()
            .unwrap();

        let _ = circuit.call(|| Err::<(), _>("error 1"));
        assert!(circuit.is_closed());
        let _ = circuit.call(|| Err::<(), _>("error 2"));
        assert!(circuit.is_open());
    }

    #[test]
    fn test_builder_close_check_override() {
        let circuit = CircuitBuilder::new("test")
            .success_threshold(10)
            .close_check(|s| s.consecutive_successes >= 1)
            .build()
            .unwrap();

        circuit.force_half_open();
        let _ = circuit.call(|| Ok::<_, String>(()));
        assert!(circuit.is_closed());
    }
}
