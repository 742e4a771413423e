//! Stability analytics: turn repeated verdicts into metrics and a ranking.
//!
//! Everything here is a pure function over collected [`Judgment`]s. The same
//! judgment set always yields the same report.

mod metrics;
mod ranking;
mod report;
mod sensitivity;

pub use metrics::{compute_metrics, per_side_score_variance, SideVariance, StabilityMetrics};
pub use ranking::{rank, RankedConfig, RankingWeights};
pub use report::{build_report, StabilityReport};
pub use sensitivity::{prompt_sensitivity, PromptSensitivity};

use std::collections::BTreeMap;

use crate::types::{EvaluatorConfig, Judgment};

/// Runs for one configuration, keyed by exchange id. Runs are sorted by run index.
pub type RunsByExchange = BTreeMap<String, Vec<Judgment>>;

/// All judgments, grouped by configuration and then by exchange.
pub type JudgmentSet = BTreeMap<EvaluatorConfig, RunsByExchange>;

/// Group judgments by configuration and exchange.
///
/// Runs within an exchange are ordered by `run_index`, so the first entry is
/// the lowest run index.
pub fn group_judgments(judgments: impl IntoIterator<Item = Judgment>) -> JudgmentSet {
    let mut set = JudgmentSet::new();
    for judgment in judgments {
        set.entry(judgment.config.clone())
            .or_default()
            .entry(judgment.exchange_id.clone())
            .or_default()
            .push(judgment);
    }

    for runs in set.values_mut().flat_map(|by_exchange| by_exchange.values_mut()) {
        runs.sort_by_key(|j| j.run_index);
    }
    set
}

/// Population variance. Empty and single-sample inputs give 0.
pub(crate) fn population_variance(samples: &[f64]) -> f64 {
    if samples.len() < 2 {
        return 0.0;
    }
    let n = samples.len() as f64;
    let mean = samples.iter().sum::<f64>() / n;
    samples.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / n
}

pub(crate) fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        0.0
    } else {
        values.iter().sum::<f64>() / values.len() as f64
    }
}
