//! Runtime configuration.
//!
//! Every section is optional; a missing section falls back to its defaults.
//!
//! ```yaml
//! provider:
//!   kind: openrouter
//!   settings:
//!     app_title: DebateBench
//! invocation:
//!   max_attempts: 3
//!   min_backoff: 500ms
//!   max_backoff: 10s
//!   request_timeout: 120s
//!   max_concurrency: 8
//! debate:
//!   prompt_style: structured
//!   budgets: { opening: 300, rebuttal: 250, closing: 200 }
//! judging:
//!   max_tokens: 1500
//! storage:
//!   root: data
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use debatebench_core::WordBudgets;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use thiserror::Error;

use crate::prompts::DebatePromptStyle;
use crate::resilience::CircuitBreakerConfig;

/// Errors from loading or validating configuration.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Failed to parse config YAML: {0}")]
    YamlError(#[from] serde_yaml::Error),

    #[error("Invalid config: {0}")]
    Invalid(String),
}

/// Serde adapter for humantime strings such as `"500ms"` or `"1m 30s"`.
pub mod duration_str {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&humantime::format_duration(*value).to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let raw = String::deserialize(deserializer)?;
        humantime::parse_duration(&raw).map_err(serde::de::Error::custom)
    }
}

/// Which provider backs every model call, and its settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderConfig {
    pub kind: String,

    #[serde(default = "empty_settings")]
    pub settings: JsonValue,
}

fn empty_settings() -> JsonValue {
    JsonValue::Object(Default::default())
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            kind: "openrouter".to_string(),
            settings: empty_settings(),
        }
    }
}

/// Retry, concurrency, and budget settings for model calls.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InvocationConfig {
    /// Total attempts per call, including the first
    pub max_attempts: usize,

    #[serde(with = "duration_str")]
    pub min_backoff: Duration,

    #[serde(with = "duration_str")]
    pub max_backoff: Duration,

    /// Passed to the provider as its per-request timeout
    #[serde(with = "duration_str")]
    pub request_timeout: Duration,

    /// Upper bound on in-flight model calls
    pub max_concurrency: usize,

    /// Global token budget across all calls
    pub max_total_tokens: Option<u64>,
}

impl Default for InvocationConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            min_backoff: Duration::from_millis(500),
            max_backoff: Duration::from_secs(10),
            request_timeout: Duration::from_secs(120),
            max_concurrency: 8,
            max_total_tokens: None,
        }
    }
}

/// Debater settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DebateConfig {
    pub temperature: f32,

    /// `max_tokens = ceil(word_budget * token_multiplier)`
    pub token_multiplier: f64,

    pub prompt_style: DebatePromptStyle,

    pub budgets: WordBudgets,
}

impl Default for DebateConfig {
    fn default() -> Self {
        Self {
            temperature: 0.7,
            token_multiplier: 2.0,
            prompt_style: DebatePromptStyle::default(),
            budgets: WordBudgets::default(),
        }
    }
}

/// Evaluator settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct JudgingConfig {
    pub temperature: f32,
    pub max_tokens: u32,
}

impl Default for JudgingConfig {
    fn default() -> Self {
        Self {
            temperature: 0.7,
            max_tokens: 1500,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Directory holding `exchanges/` and `judgments/`
    pub root: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from("data"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub max_entries: u64,

    #[serde(with = "duration_str")]
    pub ttl: Duration,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_entries: 1_000,
            ttl: Duration::from_secs(3600),
        }
    }
}

/// Top-level runtime configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    pub provider: ProviderConfig,
    pub invocation: InvocationConfig,
    pub circuit_breaker: CircuitBreakerConfig,
    pub debate: DebateConfig,
    pub judging: JudgingConfig,
    pub storage: StorageConfig,
    pub cache: CacheConfig,
}

impl RuntimeConfig {
    /// Parse and validate a YAML document.
    pub fn from_yaml(yaml: &str) -> Result<Self, ConfigError> {
        let config: RuntimeConfig = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate a YAML file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.invocation.max_attempts == 0 {
            return Err(ConfigError::Invalid(
                "invocation.max_attempts must be at least 1".to_string(),
            ));
        }
        if self.invocation.max_concurrency == 0 {
            return Err(ConfigError::Invalid(
                "invocation.max_concurrency must be at least 1".to_string(),
            ));
        }
        if self.invocation.min_backoff > self.invocation.max_backoff {
            return Err(ConfigError::Invalid(
                "invocation.min_backoff must not exceed max_backoff".to_string(),
            ));
        }
        if !(self.debate.token_multiplier > 0.0) {
            return Err(ConfigError::Invalid(
                "debate.token_multiplier must be positive".to_string(),
            ));
        }
        if self.provider.kind.trim().is_empty() {
            return Err(ConfigError::Invalid("provider.kind must not be empty".to_string()));
        }
        Ok(())
    }
}
