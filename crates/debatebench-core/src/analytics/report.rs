//! Full stability report over a judgment set.

use std::collections::BTreeMap;
use std::fmt::Write as _;

use serde::{Deserialize, Serialize};

use super::{compute_metrics, prompt_sensitivity, rank, JudgmentSet, PromptSensitivity, RankedConfig, RankingWeights, StabilityMetrics};

/// Metrics, ranking, and rubric sensitivity for every configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StabilityReport {
    pub weights: RankingWeights,
    pub metrics: Vec<StabilityMetrics>,
    pub ranking: Vec<RankedConfig>,
    /// One entry per model judged under at least two rubrics
    pub sensitivity: Vec<PromptSensitivity>,
}

/// Build the report for `set`.
pub fn build_report(set: &JudgmentSet, weights: &RankingWeights) -> StabilityReport {
    let metrics: Vec<StabilityMetrics> = set
        .iter()
        .map(|(config, runs)| compute_metrics(config, runs))
        .collect();
    let ranking = rank(&metrics, weights);

    let mut rubric_counts: BTreeMap<&str, usize> = BTreeMap::new();
    for config in set.keys() {
        *rubric_counts.entry(config.model.as_str()).or_default() += 1;
    }
    let sensitivity = rubric_counts
        .into_iter()
        .filter(|(_, count)| *count >= 2)
        .map(|(model, _)| prompt_sensitivity(set, model))
        .collect();

    tracing::info!(
        configs = metrics.len(),
        judgments = metrics.iter().map(|m| m.judgment_count).sum::<usize>(),
        "Built stability report"
    );

    StabilityReport {
        weights: *weights,
        metrics,
        ranking,
        sensitivity,
    }
}

impl StabilityReport {
    pub fn metrics_for(&self, config_key: &str) -> Option<&StabilityMetrics> {
        self.metrics.iter().find(|m| m.config.key() == config_key)
    }

    /// Plain-text table for terminal output.
    pub fn to_table(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(
            out,
            "{:<5} {:<48} {:>8} {:>8} {:>9} {:>9} {:>9} {:>6}",
            "RANK", "CONFIG", "SCORE", "FLIP", "SCORE_VAR", "CONF_VAR", "SIDE_BIAS", "RUNS"
        );
        for row in &self.ranking {
            let Some(m) = self.metrics_for(&row.config.key()) else {
                continue;
            };
            let _ = writeln!(
                out,
                "{:<5} {:<48} {:>8.4} {:>8.4} {:>9.4} {:>9.4} {:>9.4} {:>6}",
                row.rank,
                row.config.to_string(),
                row.score,
                m.flip_rate,
                m.mean_score_variance(),
                m.confidence_variance,
                m.side_bias,
                m.judgment_count
            );
        }

        if !self.sensitivity.is_empty() {
            let _ = writeln!(out);
            let _ = writeln!(out, "Prompt sensitivity");
            for s in &self.sensitivity {
                let _ = writeln!(
                    out,
                    "  {} ({}): disagreement {:.4}, avg score delta {:.4} over {} comparisons",
                    s.model,
                    s.rubrics.join(", "),
                    s.disagreement_rate,
                    s.avg_score_delta,
                    s.compared_exchanges
                );
            }
        }
        out
    }
}
