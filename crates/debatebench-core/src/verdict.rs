//! Verdict extraction from free-form evaluator output.
//!
//! Evaluators are asked for a JSON object but routinely wrap it in prose or
//! code fences. Parsing takes the outermost `{ ... }` slice and then reads
//! each field on its own, so one malformed field never discards the rest.

use std::collections::BTreeMap;

use serde_json::{Map, Value};
use thiserror::Error;

use crate::types::{Category, Side, SideScores, Verdict};

/// Lowest and highest accepted category score.
pub const SCORE_RANGE: std::ops::RangeInclusive<u8> = 1..=5;

/// Why no structured verdict could be recovered.
#[derive(Error, Debug)]
pub enum VerdictParseError {
    #[error("No JSON object found in evaluator output")]
    NoJsonObject,

    #[error("Evaluator JSON is malformed: {0}")]
    MalformedJson(#[from] serde_json::Error),
}

/// Parse a verdict from raw evaluator text.
///
/// Fields that are missing, malformed, or out of range are left unset.
pub fn parse_verdict(raw: &str) -> Result<Verdict, VerdictParseError> {
    let start = raw.find('{').ok_or(VerdictParseError::NoJsonObject)?;
    let end = raw.rfind('}').ok_or(VerdictParseError::NoJsonObject)?;
    if end < start {
        return Err(VerdictParseError::NoJsonObject);
    }

    let object: Map<String, Value> = serde_json::from_str(&raw[start..=end])?;

    Ok(Verdict {
        winner: object
            .get("winner")
            .and_then(Value::as_str)
            .and_then(Side::parse_alias),
        scores: object
            .get("scores")
            .and_then(Value::as_object)
            .map(parse_scores)
            .unwrap_or_default(),
        confidence: object.get("confidence").and_then(parse_confidence),
        reasoning: object
            .get("reasoning")
            .and_then(Value::as_str)
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty()),
    })
}

fn parse_category(key: &str) -> Option<Category> {
    let normalized = key.trim().to_ascii_lowercase().replace([' ', '-'], "_");
    Category::ALL
        .into_iter()
        .find(|category| category.key() == normalized)
}

fn parse_scores(object: &Map<String, Value>) -> BTreeMap<Category, SideScores> {
    let mut scores = BTreeMap::new();
    for (key, value) in object {
        let (Some(category), Some(sides)) = (parse_category(key), value.as_object()) else {
            continue;
        };

        let mut entry = SideScores::default();
        for (side_key, score) in sides {
            let Some(score) = parse_score(score) else {
                continue;
            };
            match Side::parse_alias(side_key) {
                Some(Side::Pro) => entry.pro = Some(score),
                Some(Side::Con) => entry.con = Some(score),
                None => {}
            }
        }

        if !entry.is_empty() {
            scores.insert(category, entry);
        }
    }
    scores
}

fn parse_score(value: &Value) -> Option<u8> {
    let n = match value {
        Value::Number(n) => n
            .as_u64()
            .or_else(|| n.as_f64().filter(|f| f.fract() == 0.0 && *f >= 0.0).map(|f| f as u64))?,
        _ => return None,
    };
    u8::try_from(n).ok().filter(|s| SCORE_RANGE.contains(s))
}

fn parse_confidence(value: &Value) -> Option<f64> {
    let c = match value {
        Value::Number(n) => n.as_f64()?,
        Value::String(s) => s.trim().parse::<f64>().ok()?,
        _ => return None,
    };
    (0.0..=1.0).contains(&c).then_some(c)
}
