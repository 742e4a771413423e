//! Resilience patterns for model invocation.
//!
//! - Circuit breaker per model id
//! - Token usage accounting with an optional global budget
//!
//! Retry with backoff lives in [`crate::invocation`], built on `backon`.

mod circuit_breaker;
mod usage;

pub use circuit_breaker::{CircuitBreaker, CircuitBreakerConfig, CircuitState};
pub use usage::{LlmUsage, TokenBudget, UsageTracker};
