//! Model invocation: the single path every debater and evaluator call takes.
//!
//! A call passes through, in order:
//! - the per-model circuit breaker
//! - the global token budget
//! - a concurrency permit
//! - the provider, retried with exponential backoff while the error is
//!   retryable (empty output or rate limiting)

use std::sync::Arc;
use std::time::Duration;

use backon::{ExponentialBuilder, Retryable};
use thiserror::Error;
use tokio::sync::Semaphore;

use crate::config::{InvocationConfig, RuntimeConfig};
use crate::providers::{ChatMessage, CompletionConfig, LlmProvider, ProviderError};
use crate::resilience::{CircuitBreaker, CircuitBreakerConfig, UsageTracker};

/// Errors from [`ModelInvoker::invoke`].
#[derive(Error, Debug)]
pub enum InvocationError {
    #[error("Model call failed: {0}")]
    Provider(#[from] ProviderError),

    #[error("Circuit open for model {model}")]
    CircuitOpen { model: String },

    #[error("Token budget exhausted")]
    BudgetExceeded,

    #[error("Invoker is shut down")]
    Closed,
}

/// Shared, rate-bounded access to one [`LlmProvider`].
pub struct ModelInvoker {
    provider: Arc<dyn LlmProvider>,
    config: InvocationConfig,
    permits: Semaphore,
    breaker: CircuitBreaker,
    usage: UsageTracker,
}

impl ModelInvoker {
    pub fn new(
        provider: Arc<dyn LlmProvider>,
        config: InvocationConfig,
        breaker: CircuitBreakerConfig,
    ) -> Self {
        Self {
            provider,
            permits: Semaphore::new(config.max_concurrency),
            usage: UsageTracker::new(config.max_total_tokens),
            breaker: CircuitBreaker::new(breaker),
            config,
        }
    }

    pub fn from_config(provider: Arc<dyn LlmProvider>, config: &RuntimeConfig) -> Self {
        Self::new(
            provider,
            config.invocation.clone(),
            config.circuit_breaker.clone(),
        )
    }

    /// Send `messages` to `model` and return its non-empty reply.
    pub async fn invoke(
        &self,
        model: &str,
        messages: Vec<ChatMessage>,
        temperature: f32,
        max_tokens: u32,
    ) -> Result<String, InvocationError> {
        if self.breaker.is_open(model) {
            return Err(InvocationError::CircuitOpen {
                model: model.to_string(),
            });
        }
        if !self.usage.can_spend() {
            return Err(InvocationError::BudgetExceeded);
        }

        let _permit = self
            .permits
            .acquire()
            .await
            .map_err(|_| InvocationError::Closed)?;

        let request = CompletionConfig {
            model: model.to_string(),
            max_tokens,
            temperature,
            timeout: self.config.request_timeout,
        };

        let backoff = ExponentialBuilder::default()
            .with_min_delay(self.config.min_backoff)
            .with_max_delay(self.config.max_backoff)
            .with_max_times(self.config.max_attempts.saturating_sub(1));

        let result = (|| self.attempt(messages.clone(), &request))
            .retry(backoff)
            .sleep(tokio::time::sleep)
            .when(ProviderError::is_retryable)
            .notify(|err: &ProviderError, delay: Duration| {
                tracing::warn!(model, error = %err, ?delay, "Retrying model call");
            })
            .await;

        match result {
            Ok(content) => {
                self.breaker.record_success(model);
                Ok(content)
            }
            Err(err) => {
                self.breaker.record_failure(model);
                tracing::warn!(model, error = %err, "Model call failed");
                Err(InvocationError::Provider(err))
            }
        }
    }

    async fn attempt(
        &self,
        messages: Vec<ChatMessage>,
        request: &CompletionConfig,
    ) -> Result<String, ProviderError> {
        let response = self.provider.complete(messages, request).await?;
        self.usage.record(&request.model, &response.usage);

        tracing::debug!(
            model = %request.model,
            provider = self.provider.name(),
            tokens = response.usage.total(),
            stop_reason = ?response.stop_reason,
            "Model call returned"
        );

        if response.content.trim().is_empty() {
            return Err(ProviderError::EmptyResponse {
                model: request.model.clone(),
            });
        }
        Ok(response.content)
    }

    pub fn usage(&self) -> &UsageTracker {
        &self.usage
    }

    pub fn circuit_breaker(&self) -> &CircuitBreaker {
        &self.breaker
    }

    pub fn provider_name(&self) -> &str {
        self.provider.name()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::{CompletionResponse, TokenUsage};
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Replays scripted replies, then repeats the last one.
    struct ScriptedProvider {
        replies: Mutex<VecDeque<Result<String, ProviderError>>>,
        calls: AtomicUsize,
        tokens_per_call: u32,
    }

    impl ScriptedProvider {
        fn new(replies: Vec<Result<String, ProviderError>>) -> Arc<Self> {
            Arc::new(Self {
                replies: Mutex::new(replies.into()),
                calls: AtomicUsize::new(0),
                tokens_per_call: 10,
            })
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    fn clone_reply(reply: &Result<String, ProviderError>) -> Result<String, ProviderError> {
        match reply {
            Ok(text) => Ok(text.clone()),
            Err(ProviderError::EmptyResponse { model }) => Err(ProviderError::EmptyResponse {
                model: model.clone(),
            }),
            Err(ProviderError::RateLimited { retry_after }) => Err(ProviderError::RateLimited {
                retry_after: *retry_after,
            }),
            Err(_) => Err(ProviderError::AuthError),
        }
    }

    #[async_trait]
    impl LlmProvider for ScriptedProvider {
        async fn complete(
            &self,
            _messages: Vec<ChatMessage>,
            config: &CompletionConfig,
        ) -> Result<CompletionResponse, ProviderError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let reply = {
                let mut replies = self.replies.lock();
                if replies.len() > 1 {
                    replies.pop_front()
                } else {
                    replies.front().map(clone_reply)
                }
            };
            let content = reply.unwrap_or_else(|| Ok(String::new()))?;
            Ok(CompletionResponse {
                content,
                usage: TokenUsage {
                    prompt_tokens: self.tokens_per_call / 2,
                    completion_tokens: self.tokens_per_call / 2,
                },
                model: config.model.clone(),
                stop_reason: Some("stop".to_string()),
            })
        }

        async fn health_check(&self) -> bool {
            true
        }

        fn name(&self) -> &str {
            "scripted"
        }
    }

    fn fast_config() -> InvocationConfig {
        InvocationConfig {
            min_backoff: Duration::from_millis(1),
            max_backoff: Duration::from_millis(2),
            ..InvocationConfig::default()
        }
    }

    fn invoker(provider: Arc<ScriptedProvider>, config: InvocationConfig) -> ModelInvoker {
        ModelInvoker::new(provider, config, CircuitBreakerConfig::default())
    }

    #[tokio::test]
    async fn test_empty_output_is_retried() {
        let provider = ScriptedProvider::new(vec![
            Ok("   ".to_string()),
            Ok("An argument.".to_string()),
        ]);
        let invoker = invoker(provider.clone(), fast_config());

        let text = invoker
            .invoke("pro/model", vec![ChatMessage::user("go")], 0.7, 600)
            .await
            .unwrap();

        assert_eq!(text, "An argument.");
        assert_eq!(provider.calls(), 2);
        assert_eq!(invoker.usage().total().llm_calls, 2);
    }

    #[tokio::test]
    async fn test_persistent_empty_output_exhausts_attempts() {
        let provider = ScriptedProvider::new(vec![Ok(String::new())]);
        let invoker = invoker(provider.clone(), fast_config());

        let err = invoker
            .invoke("pro/model", vec![ChatMessage::user("go")], 0.7, 600)
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            InvocationError::Provider(ProviderError::EmptyResponse { .. })
        ));
        assert_eq!(provider.calls(), 3);
    }

    #[tokio::test]
    async fn test_auth_error_not_retried() {
        let provider = ScriptedProvider::new(vec![Err(ProviderError::AuthError)]);
        let invoker = invoker(provider.clone(), fast_config());

        let err = invoker
            .invoke("judge/model", vec![ChatMessage::user("go")], 0.7, 1500)
            .await
            .unwrap_err();

        assert!(matches!(err, InvocationError::Provider(ProviderError::AuthError)));
        assert_eq!(provider.calls(), 1);
    }

    #[tokio::test]
    async fn test_open_circuit_fails_fast() {
        let provider = ScriptedProvider::new(vec![Err(ProviderError::AuthError)]);
        let invoker = ModelInvoker::new(
            provider.clone(),
            fast_config(),
            CircuitBreakerConfig {
                failure_threshold: 1,
                recovery_timeout: Duration::from_secs(60),
                success_threshold: 1,
            },
        );

        let _ = invoker
            .invoke("flaky", vec![ChatMessage::user("go")], 0.7, 10)
            .await;
        let err = invoker
            .invoke("flaky", vec![ChatMessage::user("go")], 0.7, 10)
            .await
            .unwrap_err();

        assert!(matches!(err, InvocationError::CircuitOpen { .. }));
        assert_eq!(provider.calls(), 1);
    }

    #[tokio::test]
    async fn test_budget_blocks_once_spent() {
        let provider = ScriptedProvider::new(vec![Ok("text".to_string())]);
        let invoker = invoker(
            provider.clone(),
            InvocationConfig {
                max_total_tokens: Some(10),
                ..fast_config()
            },
        );

        invoker
            .invoke("m", vec![ChatMessage::user("go")], 0.7, 10)
            .await
            .unwrap();
        let err = invoker
            .invoke("m", vec![ChatMessage::user("go")], 0.7, 10)
            .await
            .unwrap_err();

        assert!(matches!(err, InvocationError::BudgetExceeded));
        assert_eq!(provider.calls(), 1);
    }

    struct SlowProvider {
        in_flight: AtomicUsize,
        peak: AtomicUsize,
    }

    #[async_trait]
    impl LlmProvider for SlowProvider {
        async fn complete(
            &self,
            _messages: Vec<ChatMessage>,
            config: &CompletionConfig,
        ) -> Result<CompletionResponse, ProviderError> {
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(10)).await;
            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            Ok(CompletionResponse {
                content: "ok".to_string(),
                usage: TokenUsage::default(),
                model: config.model.clone(),
                stop_reason: None,
            })
        }

        async fn health_check(&self) -> bool {
            true
        }

        fn name(&self) -> &str {
            "slow"
        }
    }

    #[tokio::test]
    async fn test_concurrency_is_bounded() {
        let provider = Arc::new(SlowProvider {
            in_flight: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
        });
        let invoker = ModelInvoker::new(
            provider.clone(),
            InvocationConfig {
                max_concurrency: 2,
                ..fast_config()
            },
            CircuitBreakerConfig::default(),
        );

        let calls = (0..6).map(|_| invoker.invoke("m", vec![ChatMessage::user("go")], 0.7, 10));
        let results = futures::future::join_all(calls).await;

        assert!(results.iter().all(|r| r.is_ok()));
        assert!(provider.peak.load(Ordering::SeqCst) <= 2);
    }
}
