//! Mock provider shared by runner, collector, and batch tests.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::config::InvocationConfig;
use crate::invocation::ModelInvoker;
use crate::providers::{
    ChatMessage, CompletionConfig, CompletionResponse, LlmProvider, ProviderError, TokenUsage,
};
use crate::resilience::CircuitBreakerConfig;

#[derive(Debug, Clone)]
pub struct RecordedCall {
    pub model: String,
    pub max_tokens: u32,
    pub temperature: f32,
    pub system: String,
    pub prompt: String,
}

/// Answers each call with `reply(model, prompt)`.
pub struct FnProvider<F> {
    reply: F,
    calls: Mutex<Vec<RecordedCall>>,
}

impl<F> FnProvider<F>
where
    F: Fn(&str, &str) -> Result<String, ProviderError> + Send + Sync,
{
    pub fn new(reply: F) -> Arc<Self> {
        Arc::new(Self {
            reply,
            calls: Mutex::new(Vec::new()),
        })
    }

    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().clone()
    }
}

#[async_trait]
impl<F> LlmProvider for FnProvider<F>
where
    F: Fn(&str, &str) -> Result<String, ProviderError> + Send + Sync,
{
    async fn complete(
        &self,
        messages: Vec<ChatMessage>,
        config: &CompletionConfig,
    ) -> Result<CompletionResponse, ProviderError> {
        let system = messages
            .iter()
            .find(|m| m.role == "system")
            .map(|m| m.content.clone())
            .unwrap_or_default();
        let prompt = messages.last().map(|m| m.content.clone()).unwrap_or_default();
        self.calls.lock().push(RecordedCall {
            model: config.model.clone(),
            max_tokens: config.max_tokens,
            temperature: config.temperature,
            system,
            prompt: prompt.clone(),
        });

        let content = (self.reply)(&config.model, &prompt)?;
        Ok(CompletionResponse {
            content,
            usage: TokenUsage {
                prompt_tokens: 10,
                completion_tokens: 10,
            },
            model: config.model.clone(),
            stop_reason: Some("stop".to_string()),
        })
    }

    async fn health_check(&self) -> bool {
        true
    }

    fn name(&self) -> &str {
        "fn-provider"
    }
}

/// Invoker with millisecond backoff so retry tests stay fast.
pub fn fast_invoker(provider: Arc<dyn LlmProvider>) -> Arc<ModelInvoker> {
    Arc::new(ModelInvoker::new(
        provider,
        InvocationConfig {
            min_backoff: Duration::from_millis(1),
            max_backoff: Duration::from_millis(2),
            ..InvocationConfig::default()
        },
        CircuitBreakerConfig::default(),
    ))
}

/// `n` words with no sentence punctuation.
pub fn words(n: usize) -> String {
    vec!["word"; n].join(" ")
}
