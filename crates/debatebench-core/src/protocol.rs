//! Turn-taking protocol.
//!
//! The protocol is a six-state sequence: PRO and CON alternate through an
//! opening, a rebuttal, and a closing. Each phase has a word budget.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::types::{Exchange, Phase, Turn, TurnKind};

/// Errors raised by the protocol state machine.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    #[error("Turn out of order: expected {}, got {got}", describe_expected(.expected))]
    SequenceViolation {
        expected: Option<TurnKind>,
        got: TurnKind,
    },

    #[error("{kind} has {word_count} words, budget is {budget}")]
    BudgetExceeded {
        kind: TurnKind,
        word_count: usize,
        budget: usize,
    },
}

fn describe_expected(expected: &Option<TurnKind>) -> &'static str {
    expected
        .map(|kind| kind.label())
        .unwrap_or("nothing (exchange complete)")
}

/// Per-phase word budgets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WordBudgets {
    pub opening: usize,
    pub rebuttal: usize,
    pub closing: usize,
}

impl Default for WordBudgets {
    fn default() -> Self {
        Self {
            opening: 300,
            rebuttal: 250,
            closing: 200,
        }
    }
}

impl WordBudgets {
    pub fn budget(&self, kind: TurnKind) -> usize {
        match kind.phase() {
            Phase::Opening => self.opening,
            Phase::Rebuttal => self.rebuttal,
            Phase::Closing => self.closing,
        }
    }
}

/// The debate protocol: fixed turn order plus configurable budgets.
#[derive(Debug, Clone, Default)]
pub struct Protocol {
    budgets: WordBudgets,
}

impl Protocol {
    pub fn new(budgets: WordBudgets) -> Self {
        Self { budgets }
    }

    pub fn budgets(&self) -> &WordBudgets {
        &self.budgets
    }

    /// Word budget for `kind`.
    pub fn budget(&self, kind: TurnKind) -> usize {
        self.budgets.budget(kind)
    }

    /// Next kind the exchange accepts, or `None` when it is complete.
    pub fn next_kind(&self, exchange: &Exchange) -> Option<TurnKind> {
        exchange.next_kind()
    }

    /// Build a turn of `kind`, enforcing its budget.
    pub fn make_turn(&self, kind: TurnKind, text: impl Into<String>) -> Result<Turn, ProtocolError> {
        Turn::new(kind, text, self.budget(kind))
    }

    /// Append `turn`, checking its budget and then its position.
    pub fn append(&self, exchange: &mut Exchange, turn: Turn) -> Result<(), ProtocolError> {
        let budget = self.budget(turn.kind());
        if turn.word_count() > budget {
            return Err(ProtocolError::BudgetExceeded {
                kind: turn.kind(),
                word_count: turn.word_count(),
                budget,
            });
        }
        exchange.append(turn)
    }

    /// Human-readable listing of the turn order and budgets.
    pub fn summary(&self) -> String {
        let mut lines = vec![
            "Debate protocol".to_string(),
            "===============".to_string(),
        ];
        for (i, kind) in TurnKind::ORDER.iter().enumerate() {
            lines.push(format!(
                "{}. {:<10} {} ({}), max {} words",
                i + 1,
                kind.label(),
                kind.side().label(),
                kind.side().stance(),
                self.budget(*kind)
            ));
        }
        lines.push(format!(
            "Total: {} turns, {} words max",
            TurnKind::ORDER.len(),
            TurnKind::ORDER.iter().map(|k| self.budget(*k)).sum::<usize>()
        ));
        lines.join("\n")
    }
}
