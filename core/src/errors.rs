//! Error types for circuit breaker operations

use std::time::{Duration, Instant};
use thiserror::Error;

/// Rejection raised when the circuit is open and the operation was not attempted
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("circuit '{circuit}' is open (retry after {retry_after:?})")]
pub struct OpenCircuit {
    /// Circuit name
    pub circuit: String,
    /// When the circuit last entered Open
    pub opened_at: Option<Instant>,
    /// Time left on the open timeout when the call was rejected
    pub retry_after: Duration,
}

/// Errors returned from [`CircuitBreaker::call`](crate::CircuitBreaker::call)
#[derive(Debug, Error)]
pub enum CircuitError<E> {
    /// Circuit is open, the operation was not attempted
    #[error(transparent)]
    Open(#[from] OpenCircuit),
    /// The wrapped operation ran and failed; its error is forwarded unchanged
    #[error("circuit execution failed: {0}")]
    Execution(#[source] E),
}

impl<E> CircuitError<E> {
    /// True when the call was short-circuited by an open breaker
    pub fn is_open(&self) -> bool {
        matches!(self, CircuitError::Open(_))
    }

    /// The operation's own error, if the operation was attempted
    pub fn into_execution(self) -> Option<E> {
        match self {
            CircuitError::Execution(e) => Some(e),
            CircuitError::Open(_) => None,
        }
    }
}

/// Invalid breaker configuration, reported at construction
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    #[error("failure_threshold must be greater than 0")]
    ZeroFailureThreshold,
    #[error("success_threshold must be greater than 0")]
    ZeroSuccessThreshold,
    #[error("jitter_factor must be within 0.0..=1.0, got {0}")]
    InvalidJitter(f64),
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error as _;

    #[test]
    fn test_open_and_execution_are_distinguishable() {
        let open: CircuitError<std::io::Error> = OpenCircuit {
            circuit: "db".to_string(),
            opened_at: None,
            retry_after: Duration::from_millis(250),
        }
        .into();
        assert!(open.is_open());
        assert!(open.source().is_none());
        assert!(open.to_string().starts_with("circuit 'db' is open"));

        let failed: CircuitError<std::io::Error> =
            CircuitError::Execution(std::io::Error::other("connection reset"));
        assert!(!failed.is_open());
        assert_eq!(
            failed.source().map(|e| e.to_string()),
            Some("connection reset".to_string())
        );
        assert_eq!(
            failed.into_execution().map(|e| e.kind()),
            Some(std::io::ErrorKind::Other)
        );
    }

    #[test]
    fn test_config_error_messages() {
        assert_eq!(
            ConfigError::ZeroFailureThreshold.to_string(),
            "failure_threshold must be greater than 0"
        );
        assert_eq!(
            ConfigError::InvalidJitter(1.5).to_string(),
            "jitter_factor must be within 0.0..=1.0, got 1.5"
        );
    }
}
