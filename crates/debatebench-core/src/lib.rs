//! # debatebench-core
//!
//! Deterministic debate protocol and judge stability analytics.
//!
//! This crate answers two questions without making a single model call:
//! - Is this exchange a legal six-turn debate within its word budgets?
//! - Given many repeated verdicts, which evaluator configuration is most stable?
//!
//! ## Key Guarantees
//!
//! 1. **Deterministic**: the same judgments always produce the same report
//! 2. **No LLM calls**: invocation lives in `debatebench-runtime`
//! 3. **Explicit sides**: every turn kind maps to its side by exhaustive match
//! 4. **Honest parsing**: unparsed verdict fields are `None`, never zero
//!
//! ## Example
//!
//! ```rust,ignore
//! use debatebench_core::{build_report, group_judgments, RankingWeights};
//!
//! let set = group_judgments(judgments);
//! let report = build_report(&set, &RankingWeights::default());
//! for row in &report.ranking {
//!     println!("{}. {} ({:.3})", row.rank, row.config, row.score);
//! }
//! ```

pub mod analytics;
pub mod plan;
pub mod protocol;
pub mod transcript;
pub mod truncate;
pub mod types;
pub mod verdict;

// Re-export main types at crate root
pub use analytics::{
    build_report, compute_metrics, group_judgments, per_side_score_variance, prompt_sensitivity,
    rank, JudgmentSet, PromptSensitivity, RankedConfig, RankingWeights, RunsByExchange,
    SideVariance, StabilityMetrics, StabilityReport,
};
pub use plan::{DebateSpec, Evaluators, ExperimentPlan, PlanError};
pub use protocol::{Protocol, ProtocolError, WordBudgets};
pub use transcript::{parse_turn_headers, render_transcript};
pub use truncate::{count_words, truncate_to_budget};
pub use types::{
    Category, EvaluatorConfig, Exchange, Judgment, JudgmentKey, Phase, Side, SideScores, Turn,
    TurnKind, UnknownTurnKind, Verdict,
};
pub use verdict::{parse_verdict, VerdictParseError};
