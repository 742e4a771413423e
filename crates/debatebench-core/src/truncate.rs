//! Word-budget truncation.
//!
//! Over-budget model output is cut back to the budget, preferring to end on a
//! sentence boundary inside the last 30% of the budget.

pub use crate::types::count_words;

const SENTENCE_ENDINGS: [char; 3] = ['.', '!', '?'];

/// Truncate `text` to at most `budget` whitespace-separated words.
///
/// Text already within budget is returned unchanged. Otherwise the words are
/// re-joined with single spaces, cut at the latest sentence end in the
/// window `[budget - budget*3/10, budget]`, or hard-cut at `budget`.
pub fn truncate_to_budget(text: &str, budget: usize) -> String {
    let words: Vec<&str> = text.split_whitespace().collect();
    if words.len() <= budget {
        return text.to_string();
    }
    if budget == 0 {
        return String::new();
    }

    let window = budget * 3 / 10;
    let floor = budget.saturating_sub(window).max(1);
    let cut = (floor..=budget)
        .rev()
        .find(|&c| words[c - 1].ends_with(SENTENCE_ENDINGS))
        .unwrap_or(budget);

    tracing::debug!(
        words = words.len(),
        budget,
        cut,
        sentence_boundary = cut < budget || words[budget - 1].ends_with(SENTENCE_ENDINGS),
        "Truncated text to budget"
    );

    words[..cut].join(" ")
}
