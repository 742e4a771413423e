//! Prompt sensitivity: how much a verdict moves when only the rubric changes.

use serde::{Deserialize, Serialize};

use super::{mean, JudgmentSet, RunsByExchange};
use crate::types::{Category, Judgment, Side};

/// Rubric sensitivity for one evaluator model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PromptSensitivity {
    pub model: String,

    /// Rubric variants found for the model, sorted
    pub rubrics: Vec<String>,

    /// (rubric pair, exchange) comparisons made
    pub compared_exchanges: usize,

    /// Share of comparisons where both first runs named a winner and they differ.
    /// A comparison with an undecided side counts as agreement.
    pub disagreement_rate: f64,

    /// Mean absolute per-category, per-side score delta between first runs
    pub avg_score_delta: f64,
}

/// Compare first-run verdicts across every pair of rubrics used with `model`.
pub fn prompt_sensitivity(set: &JudgmentSet, model: &str) -> PromptSensitivity {
    let variants: Vec<(&str, &RunsByExchange)> = set
        .iter()
        .filter(|(config, _)| config.model == model)
        .map(|(config, runs)| (config.rubric.as_str(), runs))
        .collect();

    let mut compared = 0usize;
    let mut disagreements = Vec::new();
    let mut deltas = Vec::new();

    for (i, (_, left)) in variants.iter().enumerate() {
        for (_, right) in &variants[i + 1..] {
            for (exchange_id, left_runs) in left.iter() {
                let (Some(a), Some(b)) = (
                    left_runs.first(),
                    right.get(exchange_id).and_then(|runs| runs.first()),
                ) else {
                    continue;
                };
                compared += 1;

                let differs = matches!((a.winner(), b.winner()), (Some(wa), Some(wb)) if wa != wb);
                disagreements.push(if differs { 1.0 } else { 0.0 });
                deltas.extend(score_deltas(a, b));
            }
        }
    }

    PromptSensitivity {
        model: model.to_string(),
        rubrics: variants.iter().map(|(rubric, _)| rubric.to_string()).collect(),
        compared_exchanges: compared,
        disagreement_rate: mean(&disagreements),
        avg_score_delta: mean(&deltas),
    }
}

fn score_deltas(a: &Judgment, b: &Judgment) -> Vec<f64> {
    let mut deltas = Vec::new();
    for category in Category::ALL {
        let (Some(sa), Some(sb)) = (
            a.verdict.scores.get(&category),
            b.verdict.scores.get(&category),
        ) else {
            continue;
        };
        for side in [Side::Pro, Side::Con] {
            if let (Some(x), Some(y)) = (sa.get(side), sb.get(side)) {
                deltas.push(f64::from(x.abs_diff(y)));
            }
        }
    }
    deltas
}
