//! Provider factories and the registry that resolves a configured provider.
//!
//! The runtime config names a provider `kind` plus free-form `settings`.
//! Factories registered here turn that pair into an [`LlmProvider`].
//!
//! ## Usage
//!
//! ```ignore
//! let registry = ProviderRegistry::with_defaults();
//! let provider = registry.from_config(&config.provider)?;
//! ```

use std::collections::BTreeMap;
use std::sync::Arc;

use serde_json::Value as JsonValue;

use super::{LlmProvider, ProviderError};
use crate::config::ProviderConfig;

/// Builds providers of one kind from JSON settings.
pub trait ProviderFactory: Send + Sync {
    /// Unique identifier matched against `provider.kind` (e.g., "openrouter").
    fn provider_type(&self) -> &'static str;

    /// Create a provider instance from its settings.
    fn create(&self, settings: &JsonValue) -> Result<Arc<dyn LlmProvider>, ProviderError>;

    /// Validate settings without creating a provider.
    fn validate_config(&self, settings: &JsonValue) -> Result<(), ProviderError>;

    /// Human-readable description of this provider.
    fn description(&self) -> &'static str {
        "LLM provider"
    }
}

/// Provider factories keyed by kind.
#[derive(Default)]
pub struct ProviderRegistry {
    factories: BTreeMap<String, Arc<dyn ProviderFactory>>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a provider factory, replacing any factory of the same kind.
    pub fn register(&mut self, factory: Arc<dyn ProviderFactory>) {
        self.factories
            .insert(factory.provider_type().to_string(), factory);
    }

    fn factory(&self, provider_type: &str) -> Result<&Arc<dyn ProviderFactory>, ProviderError> {
        self.factories.get(provider_type).ok_or_else(|| {
            ProviderError::NotConfigured(format!(
                "Unknown provider type: '{}'. Available: {:?}",
                provider_type,
                self.available_types()
            ))
        })
    }

    /// Create a provider from its kind and settings.
    pub fn create(
        &self,
        provider_type: &str,
        settings: &JsonValue,
    ) -> Result<Arc<dyn LlmProvider>, ProviderError> {
        let factory = self.factory(provider_type)?;
        factory.validate_config(settings)?;
        let provider = factory.create(settings)?;
        tracing::debug!(provider = provider_type, "Created LLM provider");
        Ok(provider)
    }

    /// Create the provider named by the runtime config.
    pub fn from_config(&self, config: &ProviderConfig) -> Result<Arc<dyn LlmProvider>, ProviderError> {
        self.create(&config.kind, &config.settings)
    }

    /// Validate settings for a provider kind.
    pub fn validate(&self, provider_type: &str, settings: &JsonValue) -> Result<(), ProviderError> {
        self.factory(provider_type)?.validate_config(settings)
    }

    pub fn available_types(&self) -> Vec<&str> {
        self.factories.keys().map(|s| s.as_str()).collect()
    }

    pub fn has_provider(&self, provider_type: &str) -> bool {
        self.factories.contains_key(provider_type)
    }

    /// Registry with every provider compiled into this build.
    #[cfg(feature = "openrouter")]
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(super::OpenRouterProviderFactory));
        registry
    }

    /// Registry with every provider compiled into this build.
    #[cfg(not(feature = "openrouter"))]
    pub fn with_defaults() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for ProviderRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderRegistry")
            .field("providers", &self.available_types())
            .finish()
    }
}
