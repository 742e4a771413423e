//! API keys for model providers.
//!
//! A provider describes where its key lives with a [`KeyLookup`] (a settings
//! field plus an environment variable). The resolved [`ApiKey`] keeps the
//! value in a [`SecretString`], so it stays out of `Debug`, `Display` and
//! tracing output. A blank value counts as missing.

use std::fmt;

use secrecy::{ExposeSecret, SecretString};
use serde_json::Value as JsonValue;

use super::ProviderError;

/// Where a key was found.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeySource {
    Settings,
    Env,
    Explicit,
}

impl fmt::Display for KeySource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            KeySource::Settings => "provider settings",
            KeySource::Env => "environment",
            KeySource::Explicit => "caller",
        })
    }
}

/// Settings field and environment variable that hold one provider's key.
#[derive(Debug, Clone, Copy)]
pub struct KeyLookup {
    /// Human name used in error messages, e.g. "OpenRouter API key"
    pub label: &'static str,
    pub setting: &'static str,
    pub env_var: &'static str,
}

impl KeyLookup {
    /// Settings first, then the environment.
    pub fn resolve(&self, settings: &JsonValue) -> Result<ApiKey, ProviderError> {
        if let Some(value) = non_blank(settings[self.setting].as_str()) {
            return Ok(ApiKey::with_source(value, KeySource::Settings));
        }
        self.from_env()
    }

    pub fn from_env(&self) -> Result<ApiKey, ProviderError> {
        let value = std::env::var(self.env_var).ok();
        match non_blank(value.as_deref()) {
            Some(value) => Ok(ApiKey::with_source(value, KeySource::Env)),
            None => Err(self.missing()),
        }
    }

    /// True if [`KeyLookup::resolve`] would succeed.
    pub fn is_available(&self, settings: &JsonValue) -> bool {
        non_blank(settings[self.setting].as_str()).is_some()
            || std::env::var(self.env_var).is_ok_and(|v| !v.trim().is_empty())
    }

    pub fn missing(&self) -> ProviderError {
        ProviderError::NotConfigured(format!(
            "{} required: set '{}' in provider settings or {} in the environment",
            self.label, self.setting, self.env_var
        ))
    }
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.filter(|v| !v.trim().is_empty())
}

/// A resolved provider key. Only [`ApiKey::expose`] reveals the value.
pub struct ApiKey {
    value: SecretString,
    source: KeySource,
}

impl ApiKey {
    pub fn explicit(value: impl Into<String>) -> Self {
        Self::with_source(value, KeySource::Explicit)
    }

    fn with_source(value: impl Into<String>, source: KeySource) -> Self {
        Self {
            value: SecretString::from(value.into()),
            source,
        }
    }

    /// Call at the request site; do not keep the returned slice.
    pub fn expose(&self) -> &str {
        self.value.expose_secret()
    }

    pub fn is_empty(&self) -> bool {
        self.value.expose_secret().trim().is_empty()
    }

    pub fn source(&self) -> KeySource {
        self.source
    }
}

impl fmt::Debug for ApiKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ApiKey")
            .field("value", &"[REDACTED]")
            .field("source", &self.source)
            .finish()
    }
}

impl fmt::Display for ApiKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[REDACTED] (from {})", self.source)
    }
}
