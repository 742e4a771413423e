//! Token usage accounting and the optional global token budget.

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::providers::TokenUsage;

/// Global token budget. Usage only grows; a spent budget stays spent.
pub struct TokenBudget {
    /// Maximum tokens allowed
    pub max_tokens: u64,

    used: AtomicU64,
}

impl TokenBudget {
    pub fn new(max_tokens: u64) -> Self {
        Self {
            max_tokens,
            used: AtomicU64::new(0),
        }
    }

    /// True while at least one token remains.
    pub fn has_remaining(&self) -> bool {
        self.remaining() > 0
    }

    pub fn record(&self, tokens: u64) {
        self.used.fetch_add(tokens, Ordering::SeqCst);
    }

    pub fn remaining(&self) -> u64 {
        self.max_tokens.saturating_sub(self.used.load(Ordering::SeqCst))
    }

    pub fn used(&self) -> u64 {
        self.used.load(Ordering::SeqCst)
    }
}

/// Accumulated usage for one model or for the whole run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LlmUsage {
    pub total_tokens: u64,
    pub prompt_tokens: u64,
    pub completion_tokens: u64,

    /// Number of successful calls
    pub llm_calls: u64,

    /// Estimated cost in USD
    pub estimated_cost: f64,
}

impl LlmUsage {
    /// Add usage from one response.
    pub fn add(&mut self, usage: &TokenUsage, model: &str) {
        self.prompt_tokens += u64::from(usage.prompt_tokens);
        self.completion_tokens += u64::from(usage.completion_tokens);
        self.total_tokens += u64::from(usage.total());
        self.llm_calls += 1;
        self.estimated_cost += Self::estimate_cost(usage, model);
    }

    fn merge(&mut self, other: &LlmUsage) {
        self.prompt_tokens += other.prompt_tokens;
        self.completion_tokens += other.completion_tokens;
        self.total_tokens += other.total_tokens;
        self.llm_calls += other.llm_calls;
        self.estimated_cost += other.estimated_cost;
    }

    /// Rough cost from list prices per million tokens.
    fn estimate_cost(usage: &TokenUsage, model: &str) -> f64 {
        let (input_rate, output_rate) = match model {
            m if m.contains("sonnet") => (3.0, 15.0),
            m if m.contains("opus") => (15.0, 75.0),
            m if m.contains("haiku") => (1.0, 5.0),
            m if m.contains("gpt-4o-mini") => (0.15, 0.6),
            m if m.contains("gpt-4o") => (2.5, 10.0),
            m if m.contains("gemini") && m.contains("flash") => (0.3, 2.5),
            m if m.contains("llama") => (0.2, 0.6),
            _ => (1.0, 3.0),
        };

        (f64::from(usage.prompt_tokens) / 1_000_000.0) * input_rate
            + (f64::from(usage.completion_tokens) / 1_000_000.0) * output_rate
    }
}

/// Usage per model plus an optional global budget.
pub struct UsageTracker {
    budget: Option<TokenBudget>,
    by_model: RwLock<BTreeMap<String, LlmUsage>>,
}

impl UsageTracker {
    pub fn new(max_total_tokens: Option<u64>) -> Self {
        Self {
            budget: max_total_tokens.map(TokenBudget::new),
            by_model: RwLock::new(BTreeMap::new()),
        }
    }

    /// False once a configured budget is spent.
    pub fn can_spend(&self) -> bool {
        self.budget.as_ref().map_or(true, TokenBudget::has_remaining)
    }

    pub fn record(&self, model: &str, usage: &TokenUsage) {
        if let Some(budget) = &self.budget {
            budget.record(u64::from(usage.total()));
        }
        self.by_model
            .write()
            .entry(model.to_string())
            .or_default()
            .add(usage, model);
    }

    /// Remaining global budget, if one is configured.
    pub fn remaining(&self) -> Option<u64> {
        self.budget.as_ref().map(TokenBudget::remaining)
    }

    pub fn by_model(&self) -> BTreeMap<String, LlmUsage> {
        self.by_model.read().clone()
    }

    /// Usage summed over every model.
    pub fn total(&self) -> LlmUsage {
        let mut total = LlmUsage::default();
        for usage in self.by_model.read().values() {
            total.merge(usage);
        }
        total
    }
}

impl Default for UsageTracker {
    fn default() -> Self {
        Self::new(None)
    }
}
