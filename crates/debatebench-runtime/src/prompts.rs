//! Prompts for debaters and evaluators.
//!
//! Prompts are split the same way for every call:
//! 1. A fixed system prompt framing the role
//! 2. Turn- or rubric-specific instructions
//! 3. Dynamic content (prior turns, transcript)

use debatebench_core::{render_transcript, Exchange, Phase, Side, TurnKind};
use serde::{Deserialize, Serialize};

/// System prompt for every debater call.
pub const DEBATER_SYSTEM_PROMPT: &str =
    "You are a skilled debater participating in a structured debate.";

/// System prompt for every evaluator call.
pub const JUDGE_SYSTEM_PROMPT: &str =
    "You are an experienced debate judge. You evaluate debates fairly and return your verdict as a single JSON object.";

/// Rubric ids understood by [`DefaultPromptBuilder`].
pub const RUBRICS: [&str; 3] = ["p0", "p1", "p2"];

/// Builds the text sent to debaters and evaluators.
pub trait PromptBuilder: Send + Sync {
    /// Prompt for one turn, given every earlier turn's text in order.
    fn build_turn_prompt(
        &self,
        kind: TurnKind,
        topic: &str,
        prior_texts: &[&str],
        side: Side,
        budget: usize,
    ) -> String;

    /// Transcript embedded in judge prompts.
    fn build_transcript(&self, exchange: &Exchange) -> String {
        render_transcript(exchange)
    }

    /// Judge prompt for `rubric`, or `None` if the rubric is unknown.
    fn build_judge_prompt(&self, rubric: &str, transcript: &str) -> Option<String>;
}

/// Debater prompt variant.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DebatePromptStyle {
    #[default]
    Standard,
    /// Standard plus an explicit instruction to clash in rebuttals
    Structured,
    /// Minimal instructions
    Freeform,
}

const CLASH_INSTRUCTION: &str = "\
IMPORTANT: You must directly clash with your opponent's arguments. For each major point they made, either:
- Show why their evidence is flawed
- Show why their reasoning is incorrect
- Show why their impacts are outweighed by yours

";

const VERDICT_FORMAT: &str = r#"
## Output Format (JSON)
Respond with a single JSON object and nothing else:
{
  "winner": "PRO" | "CON",
  "scores": {
    "argument_quality": {"PRO": 1-5, "CON": 1-5},
    "evidence": {"PRO": 1-5, "CON": 1-5},
    "clash": {"PRO": 1-5, "CON": 1-5},
    "weighing": {"PRO": 1-5, "CON": 1-5}
  },
  "confidence": 0.0-1.0,
  "reasoning": "2-3 sentences explaining your decision"
}
"#;

/// Prompt builder with the built-in debater styles and rubrics `p0`, `p1`, `p2`.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultPromptBuilder {
    style: DebatePromptStyle,
}

impl DefaultPromptBuilder {
    pub fn new(style: DebatePromptStyle) -> Self {
        Self { style }
    }

    pub fn style(&self) -> DebatePromptStyle {
        self.style
    }

    fn standard_prompt(
        &self,
        kind: TurnKind,
        topic: &str,
        prior_texts: &[&str],
        side: Side,
        budget: usize,
    ) -> String {
        let mut prompt = format!(
            "You are participating in a Public Forum debate.\n\n\
             Resolution: {topic}\n\
             Your side: {stance} ({side})\n\
             Speech type: {speech}\n\n\
             WORD LIMIT: aim for approximately {budget} words.\n\n\
             Guidelines:\n\
             - Write a complete, coherent speech of about {budget} words\n\
             - Make clear, well-structured arguments\n\
             - Use evidence and reasoning\n\
             - Respond to previous arguments when applicable\n\
             - Write in plain text only (no markdown or special formatting)\n\n",
            stance = side.stance(),
            speech = speech_name(kind),
        );

        prompt.push_str(match kind.phase() {
            Phase::Opening => {
                "This is your opening speech. Present your core arguments in favor of your side.\n\
                 - Clearly state your main claims\n\
                 - Provide reasoning and evidence\n\
                 - Establish a framework for evaluating the debate\n"
            }
            Phase::Rebuttal => {
                "This is your rebuttal speech. Respond to your opponent's arguments.\n\
                 - Address their main points directly\n\
                 - Refute their claims with counter-evidence and reasoning\n\
                 - Rebuild your own arguments that were attacked\n"
            }
            Phase::Closing => {
                "This is your closing speech. Synthesize the debate and make your final case.\n\
                 - Summarize the key points of clash\n\
                 - Weigh impacts and explain why your side wins\n\
                 - Make final persuasive appeals\n"
            }
        });

        if !prior_texts.is_empty() {
            prompt.push_str("\nPrevious speeches in the debate:\n");
            for (i, text) in prior_texts.iter().enumerate() {
                prompt.push_str(&format!("\n--- Speech {} ---\n{}\n", i + 1, text));
            }
        }

        prompt.push('\n');
        if self.style == DebatePromptStyle::Structured && kind.phase() == Phase::Rebuttal {
            prompt.push_str(CLASH_INSTRUCTION);
        }
        prompt.push_str(&format!(
            "Now write your {} speech ({} side). MAXIMUM {} words: anything beyond the limit will be cut off.",
            speech_name(kind),
            side,
            budget
        ));
        prompt
    }

    fn freeform_prompt(
        &self,
        kind: TurnKind,
        topic: &str,
        prior_texts: &[&str],
        side: Side,
        budget: usize,
    ) -> String {
        let mut prompt = format!(
            "You are arguing the {stance} side of this resolution: {topic}\n\n\
             Write a {speech} speech of about {budget} words explaining why your side is correct.\n\
             Write in plain text only.\n",
            stance = side.stance(),
            speech = speech_name(kind),
        );

        if !prior_texts.is_empty() {
            prompt.push_str("\nThe debate so far:\n");
            for text in prior_texts {
                prompt.push_str(text);
                prompt.push_str("\n\n");
            }
            prompt.push_str("Respond as you see fit.\n");
        }
        prompt
    }
}

impl PromptBuilder for DefaultPromptBuilder {
    fn build_turn_prompt(
        &self,
        kind: TurnKind,
        topic: &str,
        prior_texts: &[&str],
        side: Side,
        budget: usize,
    ) -> String {
        match self.style {
            DebatePromptStyle::Standard | DebatePromptStyle::Structured => {
                self.standard_prompt(kind, topic, prior_texts, side, budget)
            }
            DebatePromptStyle::Freeform => {
                self.freeform_prompt(kind, topic, prior_texts, side, budget)
            }
        }
    }

    fn build_judge_prompt(&self, rubric: &str, transcript: &str) -> Option<String> {
        let focus = match rubric {
            // Comprehensive analysis
            "p0" => {
                "Provide a thorough evaluation covering:\n\
                 1. ARGUMENT QUALITY: strength, logic, and evidence of each side's arguments\n\
                 2. CLASH AND REBUTTAL: how well each side engaged the opponent's arguments\n\
                 3. IMPACT WEIGHING: how each side weighed the importance of their impacts\n\
                 4. SPEAKING QUALITY: clarity, organization, and persuasiveness\n"
            }
            // Winner-focused
            "p1" => {
                "Focus on:\n\
                 - Which side won the most important arguments?\n\
                 - Which side did better impact comparison and weighing?\n\
                 - Which side addressed the clash more effectively?\n"
            }
            // Argument quality
            "p2" => {
                "Evaluate each speech for:\n\
                 - LOGICAL SOUNDNESS: are the arguments internally consistent?\n\
                 - EVIDENCE QUALITY: how strong is the factual support?\n\
                 - RELEVANCE: do arguments directly address the resolution?\n\
                 - DEPTH: how thoroughly are arguments developed?\n"
            }
            _ => return None,
        };

        Some(format!(
            "Evaluate the following debate and determine a winner.\n\n\
             {transcript}\n\n\
             {focus}{VERDICT_FORMAT}\n\
             Be objective and balanced in your evaluation."
        ))
    }
}

fn speech_name(kind: TurnKind) -> &'static str {
    match kind.phase() {
        Phase::Opening => "opening",
        Phase::Rebuttal => "rebuttal",
        Phase::Closing => "closing",
    }
}
