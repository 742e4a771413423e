//! OpenRouter provider (OpenAI-compatible chat completions).
//!
//! Debaters and evaluators are addressed by OpenRouter model ids such as
//! `anthropic/claude-sonnet-4.5`, so one provider covers every model in a plan.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use super::{
    ApiKey, ChatMessage, CompletionConfig, CompletionResponse, KeyLookup, LlmProvider,
    ProviderError, ProviderFactory, TokenUsage,
};

const DEFAULT_BASE_URL: &str = "https://openrouter.ai/api/v1";
const OPENROUTER_KEY: KeyLookup = KeyLookup {
    label: "OpenRouter API key",
    setting: "api_key",
    env_var: "OPENROUTER_API_KEY",
};

/// OpenRouter chat completion client.
#[derive(Debug)]
pub struct OpenRouterProvider {
    credential: ApiKey,
    base_url: String,
    referer: Option<String>,
    app_title: Option<String>,
    client: reqwest::Client,
}

impl OpenRouterProvider {
    /// Create with an explicit key and the default endpoint.
    pub fn new(api_key: impl Into<String>) -> Result<Self, ProviderError> {
        Self::build(
            ApiKey::explicit(api_key),
            DEFAULT_BASE_URL.to_string(),
            None,
            None,
        )
    }

    /// Create from `OPENROUTER_API_KEY`.
    pub fn from_env() -> Result<Self, ProviderError> {
        let credential = OPENROUTER_KEY.from_env()?;
        Self::build(credential, DEFAULT_BASE_URL.to_string(), None, None)
    }

    /// Create from provider settings with environment fallback for the key.
    ///
    /// Recognized settings: `api_key`, `base_url`, `referer`, `app_title`.
    pub fn from_config(settings: &JsonValue) -> Result<Self, ProviderError> {
        let credential = OPENROUTER_KEY.resolve(settings)?;
        let base_url = settings["base_url"]
            .as_str()
            .unwrap_or(DEFAULT_BASE_URL)
            .trim_end_matches('/')
            .to_string();

        Self::build(
            credential,
            base_url,
            settings["referer"].as_str().map(str::to_string),
            settings["app_title"].as_str().map(str::to_string),
        )
    }

    fn build(
        credential: ApiKey,
        base_url: String,
        referer: Option<String>,
        app_title: Option<String>,
    ) -> Result<Self, ProviderError> {
        let client = reqwest::Client::builder()
            .build()
            .map_err(|e| ProviderError::NotConfigured(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self {
            credential,
            base_url,
            referer,
            app_title,
            client,
        })
    }

    fn chat_url(&self) -> String {
        format!("{}/chat/completions", self.base_url)
    }
}

#[derive(Serialize)]
struct ChatApiRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    temperature: f32,
    max_tokens: u32,
}

#[derive(Deserialize)]
struct ChatApiResponse {
    #[serde(default)]
    choices: Vec<Choice>,
    usage: Option<Usage>,
    model: Option<String>,
    error: Option<ApiError>,
}

#[derive(Deserialize)]
struct Choice {
    message: Option<ChoiceMessage>,
    finish_reason: Option<String>,
}

#[derive(Deserialize)]
struct ChoiceMessage {
    content: Option<String>,
}

#[derive(Deserialize)]
struct Usage {
    #[serde(default)]
    prompt_tokens: u32,
    #[serde(default)]
    completion_tokens: u32,
}

#[derive(Deserialize)]
struct ApiError {
    message: Option<String>,
}

#[async_trait]
impl LlmProvider for OpenRouterProvider {
    async fn complete(
        &self,
        messages: Vec<ChatMessage>,
        config: &CompletionConfig,
    ) -> Result<CompletionResponse, ProviderError> {
        let request = ChatApiRequest {
            model: &config.model,
            messages: &messages,
            temperature: config.temperature,
            max_tokens: config.max_tokens,
        };

        let mut builder = self
            .client
            .post(self.chat_url())
            .bearer_auth(self.credential.expose())
            .timeout(config.timeout)
            .json(&request);
        if let Some(referer) = &self.referer {
            builder = builder.header("HTTP-Referer", referer);
        }
        if let Some(title) = &self.app_title {
            builder = builder.header("X-Title", title);
        }

        let response = builder.send().await.map_err(|e| {
            if e.is_timeout() {
                ProviderError::Timeout(config.timeout)
            } else {
                ProviderError::HttpError(e.to_string())
            }
        })?;

        let status = response.status();
        if status.as_u16() == 429 {
            let retry_after = response
                .headers()
                .get("retry-after")
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.parse::<u64>().ok())
                .map(Duration::from_secs);
            return Err(ProviderError::RateLimited { retry_after });
        }
        if status.as_u16() == 401 || status.as_u16() == 403 {
            return Err(ProviderError::AuthError);
        }

        let body = response
            .text()
            .await
            .map_err(|e| ProviderError::HttpError(e.to_string()))?;
        let parsed: ChatApiResponse =
            serde_json::from_str(&body).map_err(|e| ProviderError::ParseError(e.to_string()))?;

        if !status.is_success() || parsed.error.is_some() {
            let message = parsed
                .error
                .and_then(|e| e.message)
                .unwrap_or_else(|| format!("HTTP {}", status.as_u16()));
            return Err(ProviderError::ApiError {
                status: status.as_u16(),
                message,
            });
        }

        let choice = parsed.choices.into_iter().next();
        let stop_reason = choice.as_ref().and_then(|c| c.finish_reason.clone());
        let content = choice
            .and_then(|c| c.message)
            .and_then(|m| m.content)
            .unwrap_or_default();
        let usage = parsed
            .usage
            .map(|u| TokenUsage {
                prompt_tokens: u.prompt_tokens,
                completion_tokens: u.completion_tokens,
            })
            .unwrap_or_default();

        Ok(CompletionResponse {
            content,
            usage,
            model: parsed.model.unwrap_or_else(|| config.model.clone()),
            stop_reason,
        })
    }

    async fn health_check(&self) -> bool {
        !self.credential.is_empty()
    }

    fn name(&self) -> &str {
        "openrouter"
    }
}

/// Factory for [`OpenRouterProvider`].
///
/// ## Settings
/// ```yaml
/// provider:
///   kind: openrouter
///   settings:
///     api_key: "sk-or-..."          # optional, falls back to OPENROUTER_API_KEY
///     base_url: "https://..."       # optional
///     referer: "https://my.app"     # optional HTTP-Referer header
///     app_title: "DebateBench"      # optional X-Title header
/// ```
pub struct OpenRouterProviderFactory;

impl ProviderFactory for OpenRouterProviderFactory {
    fn provider_type(&self) -> &'static str {
        "openrouter"
    }

    fn create(&self, settings: &JsonValue) -> Result<Arc<dyn LlmProvider>, ProviderError> {
        Ok(Arc::new(OpenRouterProvider::from_config(settings)?))
    }

    fn validate_config(&self, settings: &JsonValue) -> Result<(), ProviderError> {
        if !OPENROUTER_KEY.is_available(settings) {
            return Err(OPENROUTER_KEY.missing());
        }

        if let Some(url) = settings["base_url"].as_str() {
            if !url.starts_with("http://") && !url.starts_with("https://") {
                return Err(ProviderError::NotConfigured(
                    "base_url must start with http:// or https://".to_string(),
                ));
            }
        }

        Ok(())
    }

    fn description(&self) -> &'static str {
        "OpenRouter OpenAI-compatible chat completions"
    }
}
