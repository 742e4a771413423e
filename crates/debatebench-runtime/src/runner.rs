//! Builds one exchange by driving both debaters through the protocol.

use std::sync::Arc;

use debatebench_core::{
    count_words, truncate_to_budget, DebateSpec, Exchange, Protocol, ProtocolError, TurnKind,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::DebateConfig;
use crate::invocation::{InvocationError, ModelInvoker};
use crate::prompts::{PromptBuilder, DEBATER_SYSTEM_PROMPT};
use crate::providers::ChatMessage;
use crate::registry::ExchangeRegistry;

/// Errors that abort an exchange.
#[derive(Error, Debug)]
pub enum RunnerError {
    #[error("Model call for {kind} failed: {source}")]
    Invocation {
        kind: TurnKind,
        #[source]
        source: InvocationError,
    },

    #[error(transparent)]
    Protocol(#[from] ProtocolError),
}

/// What to debate and who debates it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExchangeRequest {
    pub topic: String,
    pub pro_model: String,
    pub con_model: String,
}

impl ExchangeRequest {
    pub fn new(
        topic: impl Into<String>,
        pro_model: impl Into<String>,
        con_model: impl Into<String>,
    ) -> Self {
        Self {
            topic: topic.into(),
            pro_model: pro_model.into(),
            con_model: con_model.into(),
        }
    }
}

impl From<&DebateSpec> for ExchangeRequest {
    fn from(spec: &DebateSpec) -> Self {
        Self::new(&spec.topic, &spec.pro_model, &spec.con_model)
    }
}

/// Stateless across calls: each run owns the exchange it builds.
pub struct DebateRunner {
    invoker: Arc<ModelInvoker>,
    prompts: Arc<dyn PromptBuilder>,
    protocol: Protocol,
    temperature: f32,
    token_multiplier: f64,
}

impl DebateRunner {
    pub fn new(
        invoker: Arc<ModelInvoker>,
        prompts: Arc<dyn PromptBuilder>,
        config: &DebateConfig,
    ) -> Self {
        Self {
            invoker,
            prompts,
            protocol: Protocol::new(config.budgets),
            temperature: config.temperature,
            token_multiplier: config.token_multiplier,
        }
    }

    pub fn protocol(&self) -> &Protocol {
        &self.protocol
    }

    /// Build a complete exchange.
    pub async fn run(&self, request: &ExchangeRequest) -> Result<Exchange, RunnerError> {
        self.drive(request, None).await
    }

    /// Build a complete exchange, reporting progress to `registry`.
    pub async fn run_tracked(
        &self,
        request: &ExchangeRequest,
        registry: &ExchangeRegistry,
    ) -> Result<Exchange, RunnerError> {
        self.drive(request, Some(registry)).await
    }

    async fn drive(
        &self,
        request: &ExchangeRequest,
        registry: Option<&ExchangeRegistry>,
    ) -> Result<Exchange, RunnerError> {
        let mut exchange = Exchange::new(&request.topic, &request.pro_model, &request.con_model);
        if let Some(registry) = registry {
            registry.begin(&exchange);
        }
        tracing::info!(
            exchange_id = exchange.id(),
            topic = %request.topic,
            pro = %request.pro_model,
            con = %request.con_model,
            "Exchange started"
        );

        match self.construct(&mut exchange, registry).await {
            Ok(()) => {
                if let Some(registry) = registry {
                    registry.complete(exchange.id());
                }
                tracing::info!(exchange_id = exchange.id(), "Exchange complete");
                Ok(exchange)
            }
            Err(err) => {
                if let Some(registry) = registry {
                    registry.fail(exchange.id(), err.to_string());
                }
                tracing::warn!(exchange_id = exchange.id(), error = %err, "Exchange aborted");
                Err(err)
            }
        }
    }

    async fn construct(
        &self,
        exchange: &mut Exchange,
        registry: Option<&ExchangeRegistry>,
    ) -> Result<(), RunnerError> {
        while let Some(kind) = self.protocol.next_kind(exchange) {
            let side = kind.side();
            let budget = self.protocol.budget(kind);
            let model = exchange.model_for(side).to_string();
            if let Some(registry) = registry {
                registry.turn_started(exchange.id(), kind);
            }

            let prompt = {
                let prior: Vec<&str> = exchange.turns().iter().map(|t| t.text()).collect();
                self.prompts
                    .build_turn_prompt(kind, exchange.topic(), &prior, side, budget)
            };
            let messages = vec![
                ChatMessage::system(DEBATER_SYSTEM_PROMPT),
                ChatMessage::user(prompt),
            ];

            let raw = self
                .invoker
                .invoke(&model, messages, self.temperature, self.max_tokens(budget))
                .await
                .map_err(|source| RunnerError::Invocation { kind, source })?;

            let trimmed = raw.trim();
            let produced = count_words(trimmed);
            let text = truncate_to_budget(trimmed, budget);
            if produced > budget {
                tracing::warn!(
                    exchange_id = exchange.id(),
                    %kind,
                    produced,
                    budget,
                    kept = count_words(&text),
                    "Turn truncated to word budget"
                );
            }

            let turn = self.protocol.make_turn(kind, text)?;
            if let Some(registry) = registry {
                registry.record_turn(exchange.id(), &turn);
            }
            tracing::debug!(exchange_id = exchange.id(), %kind, words = turn.word_count(), "Turn recorded");
            self.protocol.append(exchange, turn)?;
        }
        Ok(())
    }

    /// Token allowance for a turn, generously above its word budget.
    fn max_tokens(&self, budget: usize) -> u32 {
        (budget as f64 * self.token_multiplier).ceil() as u32
    }
}
