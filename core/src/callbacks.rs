//! Callback system for circuit breaker state transitions

use crate::{State, policy::Snapshot};
use std::sync::Arc;

pub type TransitionFn = Arc<dyn Fn(&str, &Snapshot) + Send + Sync>;

/// Callbacks for circuit breaker events
#[derive(Clone, Default)]
pub struct Callbacks {
    pub on_open: Option<TransitionFn>,
    pub on_close: Option<TransitionFn>,
    pub on_half_open: Option<TransitionFn>,
}

impl Callbacks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fire the callback registered for the state the snapshot landed in
    pub fn trigger(&self, circuit: &str, snapshot: &Snapshot) {
        let callback = match snapshot.state {
            State::Open => &self.on_open,
            State::Closed => &self.on_close,
            State::HalfOpen => &self.on_half_open,
        };
        if let Some(callback) = callback {
            callback(circuit, snapshot);
        }
    }
}

impl std::fmt::Debug for Callbacks {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Callbacks")
            .field("on_open", &self.on_open.is_some())
            .field("on_close", &self.on_close.is_some())
            .field("on_half_open", &self.on_half_open.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use std::time::{Duration, Instant};

    #[test]
    fn test_trigger_dispatches_on_target_state() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let mut callbacks = Callbacks::new();
        let log = seen.clone();
        callbacks.on_half_open = Some(Arc::new(move |name: &str, s: &Snapshot| {
            log.lock().push(format!("{}:{}", name, s.state));
        }));

        let mut snapshot = Snapshot {
            state: State::HalfOpen,
            failures: 0,
            successes: 0,
            consecutive_failures: 0,
            consecutive_successes: 0,
            failure_threshold: 1,
            success_threshold: 1,
            timeout: Duration::from_secs(1),
            opened_at: None,
            now: Instant::now(),
        };
        callbacks.trigger("api", &snapshot);

        // No callback registered for Open
        snapshot.state = State::Open;
        callbacks.trigger("api", &snapshot);

        assert_eq!(*seen.lock(), vec!["api:HalfOpen".to_string()]);
    }
}
