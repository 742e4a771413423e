//! Batch orchestration over an experiment plan.
//!
//! Judging fans out over every `config × exchange × run_index` unit;
//! generation fans out over debate requests. Both run under a
//! `buffer_unordered` bound, and a failed unit is recorded and counted
//! without stopping the rest.

use std::sync::Arc;

use debatebench_core::{EvaluatorConfig, Exchange, ExperimentPlan};
use futures::stream::{self, StreamExt};
use serde::Serialize;
use thiserror::Error;

use crate::cache::ExchangeCache;
use crate::collector::{CollectOutcome, JudgmentCollector};
use crate::config::RuntimeConfig;
use crate::invocation::ModelInvoker;
use crate::prompts::{DefaultPromptBuilder, PromptBuilder};
use crate::providers::LlmProvider;
use crate::registry::ExchangeRegistry;
use crate::runner::{DebateRunner, ExchangeRequest, RunnerError};
use crate::storage::{Storage, StorageError};

#[derive(Error, Debug)]
pub enum BatchError {
    #[error("Exchange '{0}' named in the plan is not stored")]
    UnknownExchange(String),

    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// Why one requested debate was not stored.
#[derive(Error, Debug)]
pub enum GenerationError {
    #[error(transparent)]
    Run(#[from] RunnerError),

    #[error("Debate finished but could not be stored: {0}")]
    Storage(#[from] StorageError),
}

/// One judging unit that failed.
#[derive(Debug, Clone, Serialize)]
pub struct UnitFailure {
    pub config: EvaluatorConfig,
    pub exchange_id: String,
    pub run_index: u32,
    pub error: String,
}

/// Counts from a judging batch.
#[derive(Debug, Clone, Default, Serialize)]
pub struct BatchReport {
    pub completed: usize,
    pub skipped: usize,
    pub errored: usize,
    pub failures: Vec<UnitFailure>,
}

impl BatchReport {
    pub fn total(&self) -> usize {
        self.completed + self.skipped + self.errored
    }
}

/// One debate that could not be generated or stored.
#[derive(Debug, Clone, Serialize)]
pub struct GenerationFailure {
    pub request: ExchangeRequest,
    pub error: String,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct GenerationReport {
    /// Ids of stored exchanges, in completion order
    pub completed: Vec<String>,
    pub failures: Vec<GenerationFailure>,
}

pub struct BatchOrchestrator {
    runner: Arc<DebateRunner>,
    collector: Arc<JudgmentCollector>,
    storage: Arc<dyn Storage>,
    cache: ExchangeCache,
    invoker: Arc<ModelInvoker>,
    max_concurrency: usize,
}

impl BatchOrchestrator {
    /// Wire runner, collector, and cache around one provider and store.
    pub fn new(
        provider: Arc<dyn LlmProvider>,
        storage: Arc<dyn Storage>,
        config: &RuntimeConfig,
    ) -> Self {
        let invoker = Arc::new(ModelInvoker::from_config(provider, config));
        let prompts: Arc<dyn PromptBuilder> =
            Arc::new(DefaultPromptBuilder::new(config.debate.prompt_style));
        Self::with_parts(invoker, prompts, storage, config)
    }

    /// Build from an existing invoker and prompt builder.
    pub fn with_parts(
        invoker: Arc<ModelInvoker>,
        prompts: Arc<dyn PromptBuilder>,
        storage: Arc<dyn Storage>,
        config: &RuntimeConfig,
    ) -> Self {
        Self {
            runner: Arc::new(DebateRunner::new(
                invoker.clone(),
                prompts.clone(),
                &config.debate,
            )),
            collector: Arc::new(JudgmentCollector::new(
                invoker.clone(),
                prompts,
                storage.clone(),
                &config.judging,
            )),
            cache: ExchangeCache::from_config(storage.clone(), &config.cache),
            storage,
            invoker,
            max_concurrency: config.invocation.max_concurrency.max(1),
        }
    }

    pub fn runner(&self) -> &DebateRunner {
        &self.runner
    }

    pub fn invoker(&self) -> &ModelInvoker {
        &self.invoker
    }

    pub fn storage(&self) -> &Arc<dyn Storage> {
        &self.storage
    }

    /// Exchanges a plan judges: the listed ids, or every stored exchange.
    pub async fn plan_exchanges(
        &self,
        plan: &ExperimentPlan,
    ) -> Result<Vec<Arc<Exchange>>, BatchError> {
        if plan.exchanges.is_empty() {
            let all = self.storage.list_exchanges().await?;
            let mut exchanges = Vec::with_capacity(all.len());
            for exchange in all {
                let exchange = Arc::new(exchange);
                self.cache.insert(exchange.clone()).await;
                exchanges.push(exchange);
            }
            return Ok(exchanges);
        }

        let mut exchanges = Vec::with_capacity(plan.exchanges.len());
        for id in &plan.exchanges {
            let exchange = self
                .cache
                .get(id)
                .await?
                .ok_or_else(|| BatchError::UnknownExchange(id.clone()))?;
            exchanges.push(exchange);
        }
        Ok(exchanges)
    }

    /// Judge every unit of `plan` over `exchanges`.
    pub async fn judge(&self, plan: &ExperimentPlan, exchanges: &[Arc<Exchange>]) -> BatchReport {
        let configs = plan.configs();
        let units: Vec<(EvaluatorConfig, Arc<Exchange>, u32)> = configs
            .iter()
            .flat_map(|config| {
                exchanges.iter().flat_map(move |exchange| {
                    (0..plan.runs_per_exchange)
                        .map(move |run| (config.clone(), exchange.clone(), run))
                })
            })
            .collect();

        tracing::info!(
            plan = %plan.name,
            configs = configs.len(),
            exchanges = exchanges.len(),
            units = units.len(),
            "Starting judging batch"
        );

        let collector = &self.collector;
        let mut outcomes = stream::iter(units)
            .map(|(config, exchange, run_index)| async move {
                let result = collector.collect(&exchange, &config, run_index).await;
                (config, exchange, run_index, result)
            })
            .buffer_unordered(self.max_concurrency);

        let mut report = BatchReport::default();
        while let Some((config, exchange, run_index, result)) = outcomes.next().await {
            match result {
                Ok(CollectOutcome::Recorded(_)) => report.completed += 1,
                Ok(CollectOutcome::Skipped) => report.skipped += 1,
                Err(err) => {
                    tracing::warn!(
                        config = %config,
                        exchange_id = exchange.id(),
                        run_index,
                        error = %err,
                        "Judging unit failed"
                    );
                    report.errored += 1;
                    report.failures.push(UnitFailure {
                        config,
                        exchange_id: exchange.id().to_string(),
                        run_index,
                        error: err.to_string(),
                    });
                }
            }
        }

        tracing::info!(
            completed = report.completed,
            skipped = report.skipped,
            errored = report.errored,
            "Judging batch finished"
        );
        report
    }

    /// Generate and store each requested exchange.
    pub async fn generate(
        &self,
        requests: &[ExchangeRequest],
        registry: &ExchangeRegistry,
    ) -> GenerationReport {
        tracing::info!(debates = requests.len(), "Starting generation batch");

        let mut outcomes = stream::iter(requests)
            .map(|request| async move { (request, self.generate_one(request, registry).await) })
            .buffer_unordered(self.max_concurrency);

        let mut report = GenerationReport::default();
        while let Some((request, result)) = outcomes.next().await {
            match result {
                Ok(id) => report.completed.push(id),
                Err(error) => {
                    tracing::warn!(topic = %request.topic, error = %error, "Debate generation failed");
                    report.failures.push(GenerationFailure {
                        request: request.clone(),
                        error: error.to_string(),
                    });
                }
            }
        }

        tracing::info!(
            completed = report.completed.len(),
            failed = report.failures.len(),
            "Generation batch finished"
        );
        report
    }

    async fn generate_one(
        &self,
        request: &ExchangeRequest,
        registry: &ExchangeRegistry,
    ) -> Result<String, GenerationError> {
        let exchange = self.runner.run_tracked(request, registry).await?;
        self.storage.put_exchange(&exchange).await?;

        let id = exchange.id().to_string();
        self.cache.insert(Arc::new(exchange)).await;
        Ok(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::ProviderError;
    use crate::registry::ExchangeStatus;
    use crate::storage::fixtures::complete_exchange;
    use crate::storage::InMemoryStore;
    use crate::test_support::{fast_invoker, FnProvider};
    use debatebench_core::{build_report, group_judgments, TurnKind};

    fn plan(runs: u32, exchanges: &[&str]) -> ExperimentPlan {
        let ids: Vec<String> = exchanges.iter().map(|s| format!("\"{s}\"")).collect();
        ExperimentPlan::from_yaml(&format!(
            r#"
plan_version: "1.0"
name: "batch-test"
evaluators:
  models: ["judge/x", "judge/y"]
  rubrics: ["p0", "bogus"]
runs_per_exchange: {runs}
exchanges: [{}]
"#,
            ids.join(", ")
        ))
        .unwrap()
    }

    fn orchestrator(
        reply: impl Fn(&str, &str) -> Result<String, ProviderError> + Send + Sync + 'static,
        storage: Arc<dyn Storage>,
    ) -> BatchOrchestrator {
        BatchOrchestrator::with_parts(
            fast_invoker(FnProvider::new(reply)),
            Arc::new(DefaultPromptBuilder::default()),
            storage,
            &RuntimeConfig::default(),
        )
    }

    fn verdict(model: &str, _: &str) -> Result<String, ProviderError> {
        let winner = if model == "judge/x" { "PRO" } else { "CON" };
        Ok(format!(r#"{{"winner": "{winner}", "confidence": 0.9}}"#))
    }

    #[tokio::test]
    async fn test_judge_counts_every_unit() {
        let store = Arc::new(InMemoryStore::new());
        store.put_exchange(&complete_exchange("e1")).await.unwrap();
        store.put_exchange(&complete_exchange("e2")).await.unwrap();
        let batch = orchestrator(verdict, store.clone());
        let plan = plan(3, &[]);

        let exchanges = batch.plan_exchanges(&plan).await.unwrap();
        let report = batch.judge(&plan, &exchanges).await;

        // 2 models x 2 rubrics x 2 exchanges x 3 runs; "bogus" units fail
        assert_eq!(report.total(), 24);
        assert_eq!(report.completed, 12);
        assert_eq!(report.errored, 12);
        assert!(report.failures.iter().all(|f| f.config.rubric == "bogus"));
        assert_eq!(store.judgment_count(), 12);
    }

    #[tokio::test]
    async fn test_rerun_skips_existing_units() {
        let store = Arc::new(InMemoryStore::new());
        store.put_exchange(&complete_exchange("e1")).await.unwrap();
        let batch = orchestrator(verdict, store.clone());
        let plan = plan(2, &["e1"]);
        let exchanges = batch.plan_exchanges(&plan).await.unwrap();

        batch.judge(&plan, &exchanges).await;
        let second = batch.judge(&plan, &exchanges).await;

        assert_eq!(second.completed, 0);
        assert_eq!(second.skipped, 4);
        assert_eq!(store.judgment_count(), 4);
    }

    #[tokio::test]
    async fn test_judged_batch_feeds_report() {
        let store = Arc::new(InMemoryStore::new());
        store.put_exchange(&complete_exchange("e1")).await.unwrap();
        let batch = orchestrator(verdict, store.clone());
        let plan = plan(2, &["e1"]);
        let exchanges = batch.plan_exchanges(&plan).await.unwrap();
        batch.judge(&plan, &exchanges).await;

        let set = group_judgments(store.all_judgments().await.unwrap());
        let report = build_report(&set, &plan.weights);

        assert_eq!(report.metrics.len(), 2);
        assert!(report.metrics.iter().all(|m| m.flip_rate == 0.0));
    }

    #[tokio::test]
    async fn test_unknown_plan_exchange() {
        let store = Arc::new(InMemoryStore::new());
        let batch = orchestrator(verdict, store);

        let err = batch.plan_exchanges(&plan(1, &["missing"])).await.unwrap_err();
        assert!(matches!(err, BatchError::UnknownExchange(id) if id == "missing"));
    }

    #[tokio::test]
    async fn test_generate_isolates_failures() {
        let store = Arc::new(InMemoryStore::new());
        let batch = orchestrator(
            |model: &str, _: &str| {
                if model == "broken/model" {
                    Err(ProviderError::AuthError)
                } else {
                    Ok("A fair point.".to_string())
                }
            },
            store.clone(),
        );
        let registry = ExchangeRegistry::new();
        let requests = vec![
            ExchangeRequest::new("Topic one", "a/model", "b/model"),
            ExchangeRequest::new("Topic two", "broken/model", "b/model"),
            ExchangeRequest::new("Topic three", "b/model", "a/model"),
        ];

        let report = batch.generate(&requests, &registry).await;

        assert_eq!(report.completed.len(), 2);
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].request.topic, "Topic two");
        assert_eq!(store.list_exchanges().await.unwrap().len(), 2);

        let failed = registry
            .snapshot()
            .into_iter()
            .filter(|e| matches!(e.status, ExchangeStatus::Failed(_)))
            .count();
        assert_eq!(failed, 1);
    }

    #[tokio::test]
    async fn test_generation_error_keeps_its_cause() {
        let batch = orchestrator(
            |_: &str, _: &str| Err(ProviderError::AuthError),
            Arc::new(InMemoryStore::new()),
        );
        let registry = ExchangeRegistry::new();
        let request = ExchangeRequest::new("Topic", "a/model", "b/model");

        let err = batch.generate_one(&request, &registry).await.unwrap_err();

        assert!(matches!(
            err,
            GenerationError::Run(RunnerError::Invocation { kind: TurnKind::ProOpen, .. })
        ));

        let report = batch.generate(&[request], &registry).await;
        assert_eq!(report.failures[0].error, err.to_string());
    }
}
