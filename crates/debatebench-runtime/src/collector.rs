//! Collects one judgment per (config, exchange, run) slot.

use std::sync::Arc;

use chrono::Utc;
use debatebench_core::{parse_verdict, EvaluatorConfig, Exchange, Judgment, JudgmentKey, Verdict};
use thiserror::Error;

use crate::config::JudgingConfig;
use crate::invocation::{InvocationError, ModelInvoker};
use crate::prompts::{PromptBuilder, JUDGE_SYSTEM_PROMPT};
use crate::providers::ChatMessage;
use crate::storage::{InsertOutcome, Storage, StorageError};

#[derive(Error, Debug)]
pub enum CollectorError {
    #[error("Exchange {0} is incomplete and cannot be judged")]
    IncompleteExchange(String),

    #[error("Unknown rubric '{0}'")]
    UnknownRubric(String),

    #[error("Evaluator call failed: {0}")]
    Invocation(#[from] InvocationError),

    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// Result of one collection attempt.
#[derive(Debug, Clone)]
pub enum CollectOutcome {
    Recorded(Judgment),
    /// The slot already held a judgment; nothing new was written.
    Skipped,
}

pub struct JudgmentCollector {
    invoker: Arc<ModelInvoker>,
    prompts: Arc<dyn PromptBuilder>,
    storage: Arc<dyn Storage>,
    temperature: f32,
    max_tokens: u32,
}

impl JudgmentCollector {
    pub fn new(
        invoker: Arc<ModelInvoker>,
        prompts: Arc<dyn PromptBuilder>,
        storage: Arc<dyn Storage>,
        config: &JudgingConfig,
    ) -> Self {
        Self {
            invoker,
            prompts,
            storage,
            temperature: config.temperature,
            max_tokens: config.max_tokens,
        }
    }

    /// Judge `exchange` under `config` for `run_index`, unless already judged.
    ///
    /// An unparseable verdict is not an error: the judgment is stored with an
    /// empty verdict and the raw evaluator text.
    pub async fn collect(
        &self,
        exchange: &Exchange,
        config: &EvaluatorConfig,
        run_index: u32,
    ) -> Result<CollectOutcome, CollectorError> {
        if !exchange.is_complete() {
            return Err(CollectorError::IncompleteExchange(exchange.id().to_string()));
        }

        let key = JudgmentKey {
            config_key: config.key(),
            exchange_id: exchange.id().to_string(),
            run_index,
        };
        if self.storage.judgment_exists(&key).await? {
            tracing::debug!(key = %key, "Judgment exists, skipping");
            return Ok(CollectOutcome::Skipped);
        }

        let transcript = self.prompts.build_transcript(exchange);
        let prompt = self
            .prompts
            .build_judge_prompt(&config.rubric, &transcript)
            .ok_or_else(|| CollectorError::UnknownRubric(config.rubric.clone()))?;
        let messages = vec![
            ChatMessage::system(JUDGE_SYSTEM_PROMPT),
            ChatMessage::user(prompt),
        ];

        let raw_text = self
            .invoker
            .invoke(&config.model, messages, self.temperature, self.max_tokens)
            .await?;

        let verdict = parse_verdict(&raw_text).unwrap_or_else(|err| {
            tracing::warn!(key = %key, error = %err, "Could not parse verdict, keeping raw text");
            Verdict::default()
        });

        let judgment = Judgment {
            exchange_id: exchange.id().to_string(),
            config: config.clone(),
            run_index,
            verdict,
            raw_text,
            judged_at: Utc::now(),
        };

        match self.storage.insert_judgment(&judgment).await? {
            InsertOutcome::Inserted => {
                tracing::debug!(key = %key, winner = ?judgment.winner(), "Judgment recorded");
                Ok(CollectOutcome::Recorded(judgment))
            }
            InsertOutcome::AlreadyExists => {
                tracing::info!(key = %key, "Judgment written concurrently, discarding duplicate");
                Ok(CollectOutcome::Skipped)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::prompts::DefaultPromptBuilder;
    use crate::providers::ProviderError;
    use crate::storage::fixtures::complete_exchange;
    use crate::storage::InMemoryStore;
    use crate::test_support::{fast_invoker, FnProvider};
    use async_trait::async_trait;
    use debatebench_core::{Category, Side};

    const GOOD_VERDICT: &str = r#"After weighing the round:
{"winner": "CON", "scores": {"clash": {"PRO": 2, "CON": 4}}, "confidence": 0.8, "reasoning": "CON won clash."}"#;

    fn collector(
        reply: &'static str,
        storage: Arc<dyn Storage>,
    ) -> (JudgmentCollector, Arc<FnProvider<impl Fn(&str, &str) -> Result<String, ProviderError> + Send + Sync>>) {
        let provider = FnProvider::new(move |_: &str, _: &str| Ok(reply.to_string()));
        let collector = JudgmentCollector::new(
            fast_invoker(provider.clone()),
            Arc::new(DefaultPromptBuilder::default()),
            storage,
            &JudgingConfig::default(),
        );
        (collector, provider)
    }

    fn config() -> EvaluatorConfig {
        EvaluatorConfig::new("judge/model", "p1")
    }

    #[tokio::test]
    async fn test_records_parsed_verdict() {
        let store = Arc::new(InMemoryStore::new());
        let (collector, provider) = collector(GOOD_VERDICT, store.clone());

        let outcome = collector
            .collect(&complete_exchange("ex1"), &config(), 0)
            .await
            .unwrap();

        let CollectOutcome::Recorded(judgment) = outcome else {
            panic!("expected a recorded judgment");
        };
        assert_eq!(judgment.winner(), Some(Side::Con));
        assert_eq!(judgment.verdict.scores[&Category::Clash].con, Some(4));
        assert_eq!(judgment.verdict.confidence, Some(0.8));
        assert_eq!(judgment.raw_text, GOOD_VERDICT);
        assert_eq!(store.judgment_count(), 1);

        let call = &provider.calls()[0];
        assert_eq!(call.model, "judge/model");
        assert_eq!(call.max_tokens, 1500);
        assert!(call.prompt.contains("[PRO_OPEN] PRO"));
    }

    #[tokio::test]
    async fn test_rerun_is_skipped_without_model_call() {
        let store = Arc::new(InMemoryStore::new());
        let (collector, provider) = collector(GOOD_VERDICT, store.clone());
        let exchange = complete_exchange("ex1");

        collector.collect(&exchange, &config(), 0).await.unwrap();
        let second = collector.collect(&exchange, &config(), 0).await.unwrap();

        assert!(matches!(second, CollectOutcome::Skipped));
        assert_eq!(provider.calls().len(), 1);
        assert_eq!(store.judgment_count(), 1);
    }

    #[tokio::test]
    async fn test_unparseable_output_keeps_raw_text() {
        let store = Arc::new(InMemoryStore::new());
        let (collector, _) = collector("PRO wins, clearly.", store.clone());

        let outcome = collector
            .collect(&complete_exchange("ex1"), &config(), 3)
            .await
            .unwrap();

        let CollectOutcome::Recorded(judgment) = outcome else {
            panic!("expected a recorded judgment");
        };
        assert!(judgment.verdict.is_empty());
        assert_eq!(judgment.raw_text, "PRO wins, clearly.");
        assert_eq!(judgment.run_index, 3);
    }

    #[tokio::test]
    async fn test_rejects_incomplete_exchange() {
        let store = Arc::new(InMemoryStore::new());
        let (collector, provider) = collector(GOOD_VERDICT, store);
        let partial = Exchange::with_id("ex1", "t", "a", "b");

        let err = collector.collect(&partial, &config(), 0).await.unwrap_err();

        assert!(matches!(err, CollectorError::IncompleteExchange(_)));
        assert!(provider.calls().is_empty());
    }

    #[tokio::test]
    async fn test_unknown_rubric() {
        let store = Arc::new(InMemoryStore::new());
        let (collector, provider) = collector(GOOD_VERDICT, store);

        let err = collector
            .collect(&complete_exchange("ex1"), &EvaluatorConfig::new("judge/model", "p7"), 0)
            .await
            .unwrap_err();

        assert!(matches!(err, CollectorError::UnknownRubric(r) if r == "p7"));
        assert!(provider.calls().is_empty());
    }

    #[tokio::test]
    async fn test_configs_differing_only_in_separator_are_both_judged() {
        let store = Arc::new(InMemoryStore::new());
        let (collector, provider) = collector(GOOD_VERDICT, store.clone());
        let exchange = complete_exchange("ex1");

        let slash = EvaluatorConfig::new("org/model", "p0");
        let underscore = EvaluatorConfig::new("org_model", "p0");
        let first = collector.collect(&exchange, &slash, 0).await.unwrap();
        let second = collector.collect(&exchange, &underscore, 0).await.unwrap();

        assert!(matches!(first, CollectOutcome::Recorded(_)));
        assert!(matches!(second, CollectOutcome::Recorded(_)));
        assert_eq!(provider.calls().len(), 2);
        assert_eq!(store.judgments_for(&underscore).await.unwrap().len(), 1);
    }

    /// Reports every slot as free, so the conditional insert decides the race.
    struct RacingStore(InMemoryStore);

    #[async_trait]
    impl Storage for RacingStore {
        async fn judgment_exists(&self, _key: &JudgmentKey) -> Result<bool, StorageError> {
            Ok(false)
        }
        async fn get_judgment(&self, key: &JudgmentKey) -> Result<Option<Judgment>, StorageError> {
            self.0.get_judgment(key).await
        }
        async fn insert_judgment(&self, judgment: &Judgment) -> Result<InsertOutcome, StorageError> {
            self.0.insert_judgment(judgment).await
        }
        async fn judgments_for(&self, config: &EvaluatorConfig) -> Result<Vec<Judgment>, StorageError> {
            self.0.judgments_for(config).await
        }
        async fn all_judgments(&self) -> Result<Vec<Judgment>, StorageError> {
            self.0.all_judgments().await
        }
        async fn put_exchange(&self, exchange: &Exchange) -> Result<(), StorageError> {
            self.0.put_exchange(exchange).await
        }
        async fn get_exchange(&self, id: &str) -> Result<Option<Exchange>, StorageError> {
            self.0.get_exchange(id).await
        }
        async fn list_exchanges(&self) -> Result<Vec<Exchange>, StorageError> {
            self.0.list_exchanges().await
        }
    }

    #[tokio::test]
    async fn test_lost_race_is_skipped() {
        let store = Arc::new(RacingStore(InMemoryStore::new()));
        let (collector, _) = collector(GOOD_VERDICT, store.clone());
        let exchange = complete_exchange("ex1");

        let first = collector.collect(&exchange, &config(), 0).await.unwrap();
        let second = collector.collect(&exchange, &config(), 0).await.unwrap();

        assert!(matches!(first, CollectOutcome::Recorded(_)));
        assert!(matches!(second, CollectOutcome::Skipped));
        assert_eq!(store.0.judgment_count(), 1);
    }
}
