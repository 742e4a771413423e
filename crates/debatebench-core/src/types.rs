//! Shared data types for exchanges, judgments, and evaluator configurations.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::protocol::ProtocolError;

/// One of the two debaters.
///
/// `Pro` is side A and always opens; `Con` is side B.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Side {
    Pro,
    Con,
}

impl Side {
    /// Display label used in transcripts and prompts.
    pub fn label(self) -> &'static str {
        match self {
            Side::Pro => "PRO",
            Side::Con => "CON",
        }
    }

    /// Debate-format name of the side.
    pub fn stance(self) -> &'static str {
        match self {
            Side::Pro => "Affirmative",
            Side::Con => "Negative",
        }
    }

    pub fn opponent(self) -> Side {
        match self {
            Side::Pro => Side::Con,
            Side::Con => Side::Pro,
        }
    }

    /// Lenient parse for judge output. Accepts `PRO`/`CON`, `SIDE_A`/`SIDE_B`,
    /// `A`/`B` and `AFFIRMATIVE`/`NEGATIVE`, case-insensitively.
    pub fn parse_alias(value: &str) -> Option<Side> {
        match value.trim().to_ascii_uppercase().as_str() {
            "PRO" | "SIDE_A" | "SIDE A" | "A" | "AFFIRMATIVE" => Some(Side::Pro),
            "CON" | "SIDE_B" | "SIDE B" | "B" | "NEGATIVE" => Some(Side::Con),
            _ => None,
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Stage of the debate a turn belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Opening,
    Rebuttal,
    Closing,
}

/// The six fixed positions in an exchange.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TurnKind {
    ProOpen,
    ConOpen,
    ProRebut,
    ConRebut,
    ProClose,
    ConClose,
}

impl TurnKind {
    /// Protocol order. An exchange is complete once every kind appears once, in this order.
    pub const ORDER: [TurnKind; 6] = [
        TurnKind::ProOpen,
        TurnKind::ConOpen,
        TurnKind::ProRebut,
        TurnKind::ConRebut,
        TurnKind::ProClose,
        TurnKind::ConClose,
    ];

    pub fn side(self) -> Side {
        match self {
            TurnKind::ProOpen | TurnKind::ProRebut | TurnKind::ProClose => Side::Pro,
            TurnKind::ConOpen | TurnKind::ConRebut | TurnKind::ConClose => Side::Con,
        }
    }

    pub fn phase(self) -> Phase {
        match self {
            TurnKind::ProOpen | TurnKind::ConOpen => Phase::Opening,
            TurnKind::ProRebut | TurnKind::ConRebut => Phase::Rebuttal,
            TurnKind::ProClose | TurnKind::ConClose => Phase::Closing,
        }
    }

    /// Zero-based position in [`TurnKind::ORDER`].
    pub fn position(self) -> usize {
        match self {
            TurnKind::ProOpen => 0,
            TurnKind::ConOpen => 1,
            TurnKind::ProRebut => 2,
            TurnKind::ConRebut => 3,
            TurnKind::ProClose => 4,
            TurnKind::ConClose => 5,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            TurnKind::ProOpen => "PRO_OPEN",
            TurnKind::ConOpen => "CON_OPEN",
            TurnKind::ProRebut => "PRO_REBUT",
            TurnKind::ConRebut => "CON_REBUT",
            TurnKind::ProClose => "PRO_CLOSE",
            TurnKind::ConClose => "CON_CLOSE",
        }
    }
}

impl fmt::Display for TurnKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Error returned when a string is not a turn kind label.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Unknown turn kind: {0}")]
pub struct UnknownTurnKind(pub String);

impl FromStr for TurnKind {
    type Err = UnknownTurnKind;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        TurnKind::ORDER
            .into_iter()
            .find(|kind| kind.label() == s)
            .ok_or_else(|| UnknownTurnKind(s.to_string()))
    }
}

/// Count whitespace-separated words.
pub fn count_words(text: &str) -> usize {
    text.split_whitespace().count()
}

/// A single contribution at a fixed protocol position.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Turn {
    kind: TurnKind,
    text: String,
    word_count: usize,
    produced_at: DateTime<Utc>,
}

impl Turn {
    /// Build a turn, rejecting text longer than `budget` words.
    pub fn new(kind: TurnKind, text: impl Into<String>, budget: usize) -> Result<Self, ProtocolError> {
        let text = text.into();
        let word_count = count_words(&text);
        if word_count > budget {
            return Err(ProtocolError::BudgetExceeded {
                kind,
                word_count,
                budget,
            });
        }

        Ok(Self {
            kind,
            text,
            word_count,
            produced_at: Utc::now(),
        })
    }

    pub fn kind(&self) -> TurnKind {
        self.kind
    }

    pub fn side(&self) -> Side {
        self.kind.side()
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn word_count(&self) -> usize {
        self.word_count
    }

    pub fn produced_at(&self) -> DateTime<Utc> {
        self.produced_at
    }
}

/// One structured debate between two sides over a fixed topic.
///
/// Turns are append-only and must follow [`TurnKind::ORDER`]. Deserialization
/// re-checks the order so a tampered record cannot re-enter the pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "ExchangeRecord")]
pub struct Exchange {
    id: String,
    topic: String,
    pro_model: String,
    con_model: String,
    turns: Vec<Turn>,
    created_at: DateTime<Utc>,
}

/// Unchecked serialized form of an [`Exchange`].
#[derive(Deserialize)]
struct ExchangeRecord {
    id: String,
    topic: String,
    pro_model: String,
    con_model: String,
    #[serde(default)]
    turns: Vec<Turn>,
    created_at: DateTime<Utc>,
}

impl TryFrom<ExchangeRecord> for Exchange {
    type Error = ProtocolError;

    fn try_from(record: ExchangeRecord) -> Result<Self, Self::Error> {
        let mut exchange = Exchange {
            id: record.id,
            topic: record.topic,
            pro_model: record.pro_model,
            con_model: record.con_model,
            turns: Vec::with_capacity(record.turns.len()),
            created_at: record.created_at,
        };
        for turn in record.turns {
            exchange.append(turn)?;
        }
        Ok(exchange)
    }
}

impl Exchange {
    /// Start an empty exchange with a fresh id.
    pub fn new(
        topic: impl Into<String>,
        pro_model: impl Into<String>,
        con_model: impl Into<String>,
    ) -> Self {
        Self::with_id(uuid::Uuid::new_v4().to_string(), topic, pro_model, con_model)
    }

    /// Start an empty exchange with a caller-chosen id.
    pub fn with_id(
        id: impl Into<String>,
        topic: impl Into<String>,
        pro_model: impl Into<String>,
        con_model: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            topic: topic.into(),
            pro_model: pro_model.into(),
            con_model: con_model.into(),
            turns: Vec::new(),
            created_at: Utc::now(),
        }
    }

    /// Append the next turn. Fails unless `turn.kind()` is the next kind in protocol order.
    pub fn append(&mut self, turn: Turn) -> Result<(), ProtocolError> {
        let expected = self.next_kind();
        if expected != Some(turn.kind) {
            return Err(ProtocolError::SequenceViolation {
                expected,
                got: turn.kind,
            });
        }
        self.turns.push(turn);
        Ok(())
    }

    /// Kind the next appended turn must have, or `None` once complete.
    pub fn next_kind(&self) -> Option<TurnKind> {
        TurnKind::ORDER.get(self.turns.len()).copied()
    }

    /// Number of turns appended so far.
    pub fn position(&self) -> usize {
        self.turns.len()
    }

    pub fn is_complete(&self) -> bool {
        self.turns.len() == TurnKind::ORDER.len()
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    pub fn pro_model(&self) -> &str {
        &self.pro_model
    }

    pub fn con_model(&self) -> &str {
        &self.con_model
    }

    /// Identity of the model arguing `side`.
    pub fn model_for(&self, side: Side) -> &str {
        match side {
            Side::Pro => &self.pro_model,
            Side::Con => &self.con_model,
        }
    }

    pub fn turns(&self) -> &[Turn] {
        &self.turns
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }
}

/// An (evaluator model, rubric variant) pair: the unit compared in the ranking.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EvaluatorConfig {
    /// Evaluator model identity (e.g., "anthropic/claude-sonnet-4.5")
    pub model: String,

    /// Rubric variant identity (e.g., "p0")
    pub rubric: String,
}

impl EvaluatorConfig {
    pub fn new(model: impl Into<String>, rubric: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            rubric: rubric.into(),
        }
    }

    /// Filesystem-safe key, `<model with '/' as '_'>_<rubric>`.
    ///
    /// A literal `_`, `~` or `\` is written as a `~` escape, and so is a `/`
    /// in the rubric. The only bare `_` in the rubric part is therefore the
    /// separator, and distinct configs always get distinct keys.
    pub fn key(&self) -> String {
        let mut key = String::with_capacity(self.model.len() + self.rubric.len() + 1);
        for c in self.model.chars() {
            match c {
                '/' => key.push('_'),
                c => push_key_char(&mut key, c),
            }
        }
        key.push('_');
        for c in self.rubric.chars() {
            match c {
                '/' => key.push_str("~s"),
                c => push_key_char(&mut key, c),
            }
        }
        key
    }
}

fn push_key_char(key: &mut String, c: char) {
    match c {
        '_' => key.push_str("~_"),
        '~' => key.push_str("~~"),
        '\\' => key.push_str("~b"),
        c => key.push(c),
    }
}

impl fmt::Display for EvaluatorConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} [{}]", self.model, self.rubric)
    }
}

/// Scoring categories a judge reports per side.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    ArgumentQuality,
    Evidence,
    Clash,
    Weighing,
}

impl Category {
    pub const ALL: [Category; 4] = [
        Category::ArgumentQuality,
        Category::Evidence,
        Category::Clash,
        Category::Weighing,
    ];

    pub fn key(self) -> &'static str {
        match self {
            Category::ArgumentQuality => "argument_quality",
            Category::Evidence => "evidence",
            Category::Clash => "clash",
            Category::Weighing => "weighing",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

/// Per-side scores for one category, each 1-5 when present.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SideScores {
    #[serde(rename = "PRO", default, skip_serializing_if = "Option::is_none")]
    pub pro: Option<u8>,

    #[serde(rename = "CON", default, skip_serializing_if = "Option::is_none")]
    pub con: Option<u8>,
}

impl SideScores {
    pub fn get(&self, side: Side) -> Option<u8> {
        match side {
            Side::Pro => self.pro,
            Side::Con => self.con,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.pro.is_none() && self.con.is_none()
    }
}

/// Structured verdict recovered from judge output.
///
/// Every field is optional: "not parsed" is never conflated with a zero score.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Verdict {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub winner: Option<Side>,

    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub scores: BTreeMap<Category, SideScores>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reasoning: Option<String>,
}

impl Verdict {
    /// True when nothing structured was recovered.
    pub fn is_empty(&self) -> bool {
        self.winner.is_none()
            && self.scores.is_empty()
            && self.confidence.is_none()
            && self.reasoning.is_none()
    }
}

/// Identifies one judgment slot: (config, exchange, run).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct JudgmentKey {
    pub config_key: String,
    pub exchange_id: String,
    pub run_index: u32,
}

impl fmt::Display for JudgmentKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}#{}", self.config_key, self.exchange_id, self.run_index)
    }
}

/// One evaluator's verdict on one exchange for one run index. Write-once.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Judgment {
    pub exchange_id: String,
    pub config: EvaluatorConfig,
    pub run_index: u32,
    #[serde(flatten)]
    pub verdict: Verdict,
    /// Unmodified evaluator output
    pub raw_text: String,
    pub judged_at: DateTime<Utc>,
}

impl Judgment {
    pub fn key(&self) -> JudgmentKey {
        JudgmentKey {
            config_key: self.config.key(),
            exchange_id: self.exchange_id.clone(),
            run_index: self.run_index,
        }
    }

    pub fn winner(&self) -> Option<Side> {
        self.verdict.winner
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_side_is_explicit_per_kind() {
        let pro: Vec<_> = TurnKind::ORDER
            .iter()
            .filter(|k| k.side() == Side::Pro)
            .collect();
        assert_eq!(pro, vec![&TurnKind::ProOpen, &TurnKind::ProRebut, &TurnKind::ProClose]);
    }

    #[test]
    fn test_position_matches_order() {
        for (i, kind) in TurnKind::ORDER.iter().enumerate() {
            assert_eq!(kind.position(), i);
        }
    }

    #[test]
    fn test_turn_kind_label_round_trip() {
        for kind in TurnKind::ORDER {
            assert_eq!(kind.label().parse::<TurnKind>().unwrap(), kind);
        }
        assert!("PRO_SUMMARY".parse::<TurnKind>().is_err());
    }

    #[test]
    fn test_turn_kind_serde_label() {
        let json = serde_json::to_string(&TurnKind::ConRebut).unwrap();
        assert_eq!(json, "\"CON_REBUT\"");
    }

    #[test]
    fn test_side_aliases() {
        assert_eq!(Side::parse_alias("side_a"), Some(Side::Pro));
        assert_eq!(Side::parse_alias(" Con "), Some(Side::Con));
        assert_eq!(Side::parse_alias("Negative"), Some(Side::Con));
        assert_eq!(Side::parse_alias("tie"), None);
    }

    #[test]
    fn test_turn_rejects_over_budget() {
        let result = Turn::new(TurnKind::ProOpen, "one two three", 2);
        assert!(matches!(
            result,
            Err(ProtocolError::BudgetExceeded { word_count: 3, budget: 2, .. })
        ));
    }

    #[test]
    fn test_config_key_is_path_safe() {
        let config = EvaluatorConfig::new("anthropic/claude-sonnet-4.5", "p1");
        assert_eq!(config.key(), "anthropic_claude-sonnet-4.5_p1");
    }

    #[test]
    fn test_config_keys_do_not_collide() {
        let slash = EvaluatorConfig::new("org/model", "p0");
        let underscore = EvaluatorConfig::new("org_model", "p0");
        assert_eq!(slash.key(), "org_model_p0");
        assert_eq!(underscore.key(), "org~_model_p0");

        // The separator cannot be confused with an underscore in either part
        assert_ne!(
            EvaluatorConfig::new("a", "b_p0").key(),
            EvaluatorConfig::new("a_b", "p0").key()
        );
        assert_ne!(
            EvaluatorConfig::new("a/b", "p0").key(),
            EvaluatorConfig::new("a", "b/p0").key()
        );
        assert!(!EvaluatorConfig::new("a\\b", "x/y").key().contains(['/', '\\']));
    }

    mod key_props {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn distinct_configs_have_distinct_keys(
                m1 in "[a-z/_~.-]{1,8}",
                r1 in "[a-z0-9/_~]{1,4}",
                m2 in "[a-z/_~.-]{1,8}",
                r2 in "[a-z0-9/_~]{1,4}",
            ) {
                let a = EvaluatorConfig::new(m1, r1);
                let b = EvaluatorConfig::new(m2, r2);
                prop_assert_eq!(a == b, a.key() == b.key());
            }
        }
    }

    #[test]
    fn test_exchange_deserialize_rejects_bad_order() {
        let mut exchange = Exchange::with_id("x", "topic", "a", "b");
        exchange
            .append(Turn::new(TurnKind::ProOpen, "hello", 10).unwrap())
            .unwrap();
        let mut value = serde_json::to_value(&exchange).unwrap();
        value["turns"][0]["kind"] = serde_json::json!("CON_OPEN");

        let result: Result<Exchange, _> = serde_json::from_value(value);
        assert!(result.is_err());
    }

    #[test]
    fn test_exchange_serde_round_trip() {
        let mut exchange = Exchange::with_id("x", "topic", "a", "b");
        exchange
            .append(Turn::new(TurnKind::ProOpen, "hello there", 10).unwrap())
            .unwrap();
        let json = serde_json::to_string(&exchange).unwrap();
        let back: Exchange = serde_json::from_str(&json).unwrap();
        assert_eq!(back, exchange);
    }

    #[test]
    fn test_judgment_flattens_verdict() {
        let judgment = Judgment {
            exchange_id: "x".to_string(),
            config: EvaluatorConfig::new("m", "p0"),
            run_index: 0,
            verdict: Verdict {
                winner: Some(Side::Pro),
                ..Default::default()
            },
            raw_text: "{}".to_string(),
            judged_at: Utc::now(),
        };
        let value = serde_json::to_value(&judgment).unwrap();
        assert_eq!(value["winner"], "PRO");
        assert!(value.get("confidence").is_none());

        let back: Judgment = serde_json::from_value(value).unwrap();
        assert_eq!(back.verdict.winner, Some(Side::Pro));
        assert_eq!(back.verdict.confidence, None);
    }
}
