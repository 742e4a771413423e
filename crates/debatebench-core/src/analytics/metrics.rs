//! Per-configuration stability metrics.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use super::{mean, population_variance, RunsByExchange};
use crate::types::{Category, EvaluatorConfig, Judgment, Side};

/// Stability figures for one evaluator configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StabilityMetrics {
    pub config: EvaluatorConfig,

    /// Fraction of multi-run exchanges whose observed winners disagree
    pub flip_rate: f64,

    /// Mean per-side score variance, one entry per category
    pub score_variance: BTreeMap<Category, f64>,

    /// Mean per-exchange variance of reported confidence
    pub confidence_variance: f64,

    /// `|PRO wins / decided judgments - 0.5|` over every judgment
    pub side_bias: f64,

    pub judgment_count: usize,
    pub exchange_count: usize,
}

impl StabilityMetrics {
    /// Average of the per-category score variances.
    pub fn mean_score_variance(&self) -> f64 {
        mean(&self.score_variance.values().copied().collect::<Vec<_>>())
    }
}

/// Per-side score variance for one category.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct SideVariance {
    pub pro: f64,
    pub con: f64,
}

/// Exchanges with at least two runs. Metrics other than side bias only look at these.
fn qualifying(runs: &RunsByExchange) -> impl Iterator<Item = &[Judgment]> {
    runs.values()
        .filter(|judgments| judgments.len() >= 2)
        .map(Vec::as_slice)
}

fn side_samples(judgments: &[Judgment], category: Category, side: Side) -> Vec<f64> {
    judgments
        .iter()
        .filter_map(|j| j.verdict.scores.get(&category))
        .filter_map(|scores| scores.get(side))
        .map(f64::from)
        .collect()
}

fn flip_rate(runs: &RunsByExchange) -> f64 {
    let mut total = 0usize;
    let mut flipped = 0usize;
    for judgments in qualifying(runs) {
        total += 1;
        let winners: BTreeSet<Side> = judgments.iter().filter_map(Judgment::winner).collect();
        if winners.len() > 1 {
            flipped += 1;
        }
    }

    if total == 0 {
        0.0
    } else {
        flipped as f64 / total as f64
    }
}

/// Pooled score variance: PRO and CON samples each contribute one
/// (exchange, side) variance to the category's pool.
fn pooled_score_variance(runs: &RunsByExchange) -> BTreeMap<Category, f64> {
    Category::ALL
        .into_iter()
        .map(|category| {
            let mut pool = Vec::new();
            for judgments in qualifying(runs) {
                for side in [Side::Pro, Side::Con] {
                    let samples = side_samples(judgments, category, side);
                    if !samples.is_empty() {
                        pool.push(population_variance(&samples));
                    }
                }
            }
            (category, mean(&pool))
        })
        .collect()
}

/// Score variance with PRO and CON reported separately instead of pooled.
pub fn per_side_score_variance(runs: &RunsByExchange) -> BTreeMap<Category, SideVariance> {
    Category::ALL
        .into_iter()
        .map(|category| {
            let per_side = |side| {
                let variances: Vec<f64> = qualifying(runs)
                    .map(|judgments| side_samples(judgments, category, side))
                    .filter(|samples| !samples.is_empty())
                    .map(|samples| population_variance(&samples))
                    .collect();
                mean(&variances)
            };
            (
                category,
                SideVariance {
                    pro: per_side(Side::Pro),
                    con: per_side(Side::Con),
                },
            )
        })
        .collect()
}

fn confidence_variance(runs: &RunsByExchange) -> f64 {
    let variances: Vec<f64> = qualifying(runs)
        .map(|judgments| {
            judgments
                .iter()
                .filter_map(|j| j.verdict.confidence)
                .collect::<Vec<_>>()
        })
        .filter(|samples| samples.len() >= 2)
        .map(|samples| population_variance(&samples))
        .collect();
    mean(&variances)
}

fn side_bias(runs: &RunsByExchange) -> f64 {
    let (mut pro, mut con) = (0usize, 0usize);
    for winner in runs.values().flatten().filter_map(Judgment::winner) {
        match winner {
            Side::Pro => pro += 1,
            Side::Con => con += 1,
        }
    }

    let decided = pro + con;
    if decided == 0 {
        return 0.0;
    }
    (pro as f64 / decided as f64 - 0.5).abs()
}

/// Compute every stability metric for one configuration.
pub fn compute_metrics(config: &EvaluatorConfig, runs: &RunsByExchange) -> StabilityMetrics {
    let metrics = StabilityMetrics {
        config: config.clone(),
        flip_rate: flip_rate(runs),
        score_variance: pooled_score_variance(runs),
        confidence_variance: confidence_variance(runs),
        side_bias: side_bias(runs),
        judgment_count: runs.values().map(Vec::len).sum(),
        exchange_count: runs.len(),
    };

    tracing::debug!(
        config = %config,
        flip_rate = metrics.flip_rate,
        side_bias = metrics.side_bias,
        judgments = metrics.judgment_count,
        "Computed stability metrics"
    );

    metrics
}
