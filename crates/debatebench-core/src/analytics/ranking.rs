//! Composite instability score and configuration ranking.

use serde::{Deserialize, Serialize};

use super::StabilityMetrics;
use crate::types::EvaluatorConfig;

/// Weights of the composite instability score. Lower scores rank higher.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RankingWeights {
    pub flip_rate: f64,
    pub score_variance: f64,
    pub confidence_variance: f64,
    pub side_bias: f64,
}

impl Default for RankingWeights {
    fn default() -> Self {
        Self {
            flip_rate: 3.0,
            score_variance: 1.0,
            confidence_variance: 0.5,
            side_bias: 2.0,
        }
    }
}

impl RankingWeights {
    /// Weighted instability score for one configuration.
    pub fn composite(&self, metrics: &StabilityMetrics) -> f64 {
        self.flip_rate * metrics.flip_rate
            + self.score_variance * metrics.mean_score_variance()
            + self.confidence_variance * metrics.confidence_variance
            + self.side_bias * metrics.side_bias
    }
}

/// One row of the stability ranking.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankedConfig {
    /// 1-based position, most stable first
    pub rank: usize,
    pub config: EvaluatorConfig,
    pub score: f64,
}

/// Rank configurations ascending by composite score.
///
/// Equal scores are ordered by config key so the ranking is reproducible.
pub fn rank(metrics: &[StabilityMetrics], weights: &RankingWeights) -> Vec<RankedConfig> {
    let mut scored: Vec<(String, &StabilityMetrics, f64)> = metrics
        .iter()
        .map(|m| (m.config.key(), m, weights.composite(m)))
        .collect();

    scored.sort_by(|a, b| a.2.total_cmp(&b.2).then_with(|| a.0.cmp(&b.0)));

    scored
        .into_iter()
        .enumerate()
        .map(|(i, (_, m, score))| RankedConfig {
            rank: i + 1,
            config: m.config.clone(),
            score,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use super::*;
    use crate::types::Category;

    fn metrics(model: &str, flip_rate: f64, side_bias: f64) -> StabilityMetrics {
        StabilityMetrics {
            config: EvaluatorConfig::new(model, "p0"),
            flip_rate,
            score_variance: BTreeMap::from([(Category::Clash, 0.5), (Category::Evidence, 1.5)]),
            confidence_variance: 0.2,
            side_bias,
            judgment_count: 6,
            exchange_count: 2,
        }
    }

    #[test]
    fn test_default_composite() {
        let m = metrics("a", 0.5, 0.25);
        // 3*0.5 + 1*1.0 + 0.5*0.2 + 2*0.25
        assert!((RankingWeights::default().composite(&m) - 3.1).abs() < 1e-12);
    }

    #[test]
    fn test_rank_ascending_with_one_based_positions() {
        let ranked = rank(
            &[metrics("shaky", 1.0, 0.0), metrics("steady", 0.0, 0.0)],
            &RankingWeights::default(),
        );
        assert_eq!(ranked[0].config.model, "steady");
        assert_eq!(ranked[0].rank, 1);
        assert_eq!(ranked[1].rank, 2);
    }

    #[test]
    fn test_ties_broken_by_key() {
        let ranked = rank(
            &[metrics("zeta", 0.0, 0.0), metrics("alpha", 0.0, 0.0)],
            &RankingWeights::default(),
        );
        assert_eq!(ranked[0].config.model, "alpha");
    }

    #[test]
    fn test_custom_weights_change_order() {
        let biased = metrics("biased", 0.0, 0.5);
        let flippy = metrics("flippy", 0.5, 0.0);
        let defaults = rank(&[biased.clone(), flippy.clone()], &RankingWeights::default());
        assert_eq!(defaults[0].config.model, "biased");

        let weights = RankingWeights {
            flip_rate: 0.0,
            ..Default::default()
        };
        let custom = rank(&[biased, flippy], &weights);
        assert_eq!(custom[0].config.model, "flippy");
    }

    #[test]
    fn test_partial_weights_deserialize_with_defaults() {
        let weights: RankingWeights = serde_yaml::from_str("flip_rate: 1.0").unwrap();
        assert_eq!(weights.flip_rate, 1.0);
        assert_eq!(weights.side_bias, 2.0);
    }
}
