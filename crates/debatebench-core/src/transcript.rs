//! Transcript rendering: the text evaluators read.

use lazy_static::lazy_static;
use regex::Regex;

use crate::types::{Exchange, Side, TurnKind};

lazy_static! {
    static ref TURN_HEADER: Regex =
        Regex::new(r"(?m)^\[([A-Z_]+)\] (PRO|CON)$").expect("valid turn header regex");
}

const HEAVY_RULE_WIDTH: usize = 80;

/// Render an exchange as a plain-text transcript.
///
/// Every turn is labeled with its kind and side so the evaluator can attribute
/// each argument without guessing.
pub fn render_transcript(exchange: &Exchange) -> String {
    let mut lines = vec![
        format!("Resolution: {}", exchange.topic()),
        format!(
            "PRO (side A): {} | CON (side B): {}",
            exchange.pro_model(),
            exchange.con_model()
        ),
        "=".repeat(HEAVY_RULE_WIDTH),
    ];

    for turn in exchange.turns() {
        lines.push(format!("[{}] {}", turn.kind().label(), turn.side().label()));
        lines.push(format!("Word count: {}", turn.word_count()));
        lines.push(turn.text().to_string());
        lines.push("-".repeat(HEAVY_RULE_WIDTH));
    }

    lines.join("\n")
}

/// Recover `(kind, side)` for every labeled turn header in a transcript.
///
/// Headers whose label is not a turn kind are skipped.
pub fn parse_turn_headers(transcript: &str) -> Vec<(TurnKind, Side)> {
    TURN_HEADER
        .captures_iter(transcript)
        .filter_map(|caps| {
            let kind = caps[1].parse::<TurnKind>().ok()?;
            let side = Side::parse_alias(&caps[2])?;
            Some((kind, side))
        })
        .collect()
}
