//! Circuit breaker to stop hammering a failing model.
//!
//! Each model id has its own circuit. When calls to a model fail repeatedly,
//! the circuit opens and further calls fail fast until the recovery timeout
//! passes.

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::{Duration, Instant};

use crate::config::duration_str;

/// Circuit breaker configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CircuitBreakerConfig {
    /// Consecutive failures before opening the circuit
    pub failure_threshold: u32,

    /// Time before a half-open probe is allowed (e.g., "30s")
    #[serde(with = "duration_str")]
    pub recovery_timeout: Duration,

    /// Successes in half-open needed to close the circuit
    pub success_threshold: u32,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            recovery_timeout: Duration::from_secs(30),
            success_threshold: 2,
        }
    }
}

/// State of a circuit.
#[derive(Debug, Clone, PartialEq)]
pub enum CircuitState {
    /// Normal operation
    Closed { failures: u32 },

    /// Calls fail fast
    Open { opened_at: Instant },

    /// Probing whether the model recovered
    HalfOpen { successes: u32 },
}

/// Per-model circuit breaker.
pub struct CircuitBreaker {
    states: RwLock<HashMap<String, CircuitState>>,
    config: CircuitBreakerConfig,
}

impl CircuitBreaker {
    pub fn new(config: CircuitBreakerConfig) -> Self {
        Self {
            states: RwLock::new(HashMap::new()),
            config,
        }
    }

    /// True if calls to `model` should fail fast.
    ///
    /// An open circuit whose recovery timeout has passed moves to half-open
    /// and lets the call through.
    pub fn is_open(&self, model: &str) -> bool {
        let states = self.states.read();
        match states.get(model) {
            Some(CircuitState::Open { opened_at }) => {
                if opened_at.elapsed() >= self.config.recovery_timeout {
                    drop(states);
                    self.transition_to_half_open(model);
                    false
                } else {
                    true
                }
            }
            _ => false,
        }
    }

    pub fn record_success(&self, model: &str) {
        let mut states = self.states.write();
        match states.get(model).cloned() {
            Some(CircuitState::HalfOpen { successes }) => {
                if successes + 1 >= self.config.success_threshold {
                    states.insert(model.to_string(), CircuitState::Closed { failures: 0 });
                    tracing::info!(model, "Circuit closed after successful recovery");
                } else {
                    states.insert(
                        model.to_string(),
                        CircuitState::HalfOpen {
                            successes: successes + 1,
                        },
                    );
                }
            }
            Some(CircuitState::Closed { failures }) if failures > 0 => {
                states.insert(model.to_string(), CircuitState::Closed { failures: 0 });
            }
            _ => {}
        }
    }

    pub fn record_failure(&self, model: &str) {
        let mut states = self.states.write();
        let failures = match states.get(model).cloned() {
            None => 0,
            Some(CircuitState::Closed { failures }) => failures,
            Some(CircuitState::HalfOpen { .. }) => {
                states.insert(
                    model.to_string(),
                    CircuitState::Open {
                        opened_at: Instant::now(),
                    },
                );
                tracing::warn!(model, "Circuit reopened after failed recovery attempt");
                return;
            }
            Some(CircuitState::Open { .. }) => return,
        };

        if failures + 1 >= self.config.failure_threshold {
            states.insert(
                model.to_string(),
                CircuitState::Open {
                    opened_at: Instant::now(),
                },
            );
            tracing::warn!(
                model,
                failures = failures + 1,
                "Circuit opened after repeated failures"
            );
        } else {
            states.insert(
                model.to_string(),
                CircuitState::Closed {
                    failures: failures + 1,
                },
            );
        }
    }

    fn transition_to_half_open(&self, model: &str) {
        let mut states = self.states.write();
        if matches!(states.get(model), Some(CircuitState::Open { .. })) {
            states.insert(model.to_string(), CircuitState::HalfOpen { successes: 0 });
            tracing::info!(model, "Circuit half-open, probing model");
        }
    }

    /// Current state of a model's circuit.
    pub fn state(&self, model: &str) -> CircuitState {
        self.states
            .read()
            .get(model)
            .cloned()
            .unwrap_or(CircuitState::Closed { failures: 0 })
    }

    /// Reset all circuits to closed.
    pub fn reset(&self) {
        self.states.write().clear();
    }
}

impl Default for CircuitBreaker {
    fn default() -> Self {
        Self::new(CircuitBreakerConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn breaker(failure_threshold: u32, recovery: Duration) -> CircuitBreaker {
        CircuitBreaker::new(CircuitBreakerConfig {
            failure_threshold,
            recovery_timeout: recovery,
            success_threshold: 1,
        })
    }

    #[test]
    fn test_circuit_starts_closed() {
        let cb = CircuitBreaker::default();
        assert!(!cb.is_open("judge/a"));
        assert_eq!(cb.state("judge/a"), CircuitState::Closed { failures: 0 });
    }

    #[test]
    fn test_circuit_opens_after_failures() {
        let cb = breaker(2, Duration::from_secs(60));
        cb.record_failure("judge/a");
        assert!(!cb.is_open("judge/a"));
        cb.record_failure("judge/a");
        assert!(cb.is_open("judge/a"));
    }

    #[test]
    fn test_success_resets_failures() {
        let cb = breaker(3, Duration::from_secs(60));
        cb.record_failure("m");
        cb.record_failure("m");
        cb.record_success("m");
        cb.record_failure("m");
        cb.record_failure("m");
        assert!(!cb.is_open("m"));
    }

    #[test]
    fn test_models_are_independent() {
        let cb = breaker(1, Duration::from_secs(60));
        cb.record_failure("flaky");
        assert!(cb.is_open("flaky"));
        assert!(!cb.is_open("steady"));
    }

    #[test]
    fn test_half_open_after_recovery_timeout() {
        let cb = breaker(1, Duration::ZERO);
        cb.record_failure("m");
        assert!(!cb.is_open("m"));
        assert_eq!(cb.state("m"), CircuitState::HalfOpen { successes: 0 });

        cb.record_success("m");
        assert_eq!(cb.state("m"), CircuitState::Closed { failures: 0 });
    }

    #[test]
    fn test_half_open_failure_reopens() {
        let cb = breaker(1, Duration::ZERO);
        cb.record_failure("m");
        assert!(!cb.is_open("m"));
        cb.record_failure("m");
        assert!(matches!(cb.state("m"), CircuitState::Open { .. }));
    }

    #[test]
    fn test_config_reads_humantime() {
        let config: CircuitBreakerConfig =
            serde_yaml::from_str("failure_threshold: 4\nrecovery_timeout: 1m 30s").unwrap();
        assert_eq!(config.failure_threshold, 4);
        assert_eq!(config.recovery_timeout, Duration::from_secs(90));
        assert_eq!(config.success_threshold, 2);
    }
}
