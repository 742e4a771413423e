//! # debatebench-runtime
//!
//! Async side of DebateBench: model calls, debate generation, judgment
//! collection, storage, and batch orchestration.
//!
//! `debatebench-core` stays pure. Everything that talks to a model or
//! touches disk lives here.
//!
//! ## Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use debatebench_runtime::{
//!     BatchOrchestrator, ExchangeRegistry, ExchangeRequest, JsonFileStore, ProviderRegistry,
//!     RuntimeConfig,
//! };
//!
//! let config = RuntimeConfig::from_file("debatebench.yaml")?;
//! let provider = ProviderRegistry::with_defaults().from_config(&config.provider)?;
//! let storage = Arc::new(JsonFileStore::new(&config.storage.root));
//! let batch = BatchOrchestrator::new(provider, storage, &config);
//!
//! let registry = ExchangeRegistry::new();
//! let report = batch
//!     .generate(&[ExchangeRequest::new("Resolved: ...", "model/a", "model/b")], &registry)
//!     .await;
//! ```

pub mod batch;
pub mod cache;
pub mod collector;
pub mod config;
pub mod invocation;
pub mod prompts;
pub mod providers;
pub mod registry;
pub mod resilience;
pub mod runner;
pub mod storage;

#[cfg(test)]
mod test_support;

pub use batch::{
    BatchError, BatchOrchestrator, BatchReport, GenerationError, GenerationFailure,
    GenerationReport, UnitFailure,
};
pub use cache::ExchangeCache;
pub use collector::{CollectOutcome, CollectorError, JudgmentCollector};
pub use config::{
    CacheConfig, ConfigError, DebateConfig, InvocationConfig, JudgingConfig, ProviderConfig,
    RuntimeConfig, StorageConfig,
};
pub use invocation::{InvocationError, ModelInvoker};
pub use prompts::{DebatePromptStyle, DefaultPromptBuilder, PromptBuilder};
pub use providers::{
    ChatMessage, CompletionConfig, CompletionResponse, LlmProvider, ProviderError,
    ProviderFactory, ProviderRegistry, TokenUsage,
};
pub use registry::{ExchangeEntry, ExchangeEvent, ExchangeRegistry, ExchangeStatus};
pub use resilience::{CircuitBreaker, CircuitBreakerConfig, LlmUsage, UsageTracker};
pub use runner::{DebateRunner, ExchangeRequest, RunnerError};
pub use storage::{InMemoryStore, InsertOutcome, JsonFileStore, Storage, StorageError};
