//! Query gate
//!
//! Decides whether a question is specific enough to be worth a
//! retrieval + completion round trip. The rule is a plain word count:
//! fewer than [`MIN_QUESTION_WORDS`] whitespace-separated words deflects.

use serde::Serialize;

/// Questions with fewer words than this are deflected
pub const MIN_QUESTION_WORDS: usize = 5;

/// Notice shown alongside the example questions
pub const DEFLECTION_NOTICE: &str = "That seems a bit short. Can you clarify?";

/// Static suggestions returned on every deflection
pub const EXAMPLE_QUESTIONS: [&str; 3] = [
    "What are the key milestones in the NPD plan?",
    "Who approved the latest revision?",
    "What are the risks mentioned in section 3?",
];

/// Outcome of evaluating a question
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "decision", rename_all = "snake_case")]
pub enum GateDecision {
    Deflect { examples: Vec<String> },
    Proceed,
}

impl GateDecision {
    pub fn is_proceed(&self) -> bool {
        matches!(self, GateDecision::Proceed)
    }
}

#[derive(Debug, Clone, Copy)]
pub struct QueryGate {
    min_words: usize,
}

impl Default for QueryGate {
    fn default() -> Self {
        Self {
            min_words: MIN_QUESTION_WORDS,
        }
    }
}

impl QueryGate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn evaluate(&self, question: &str) -> GateDecision {
        let words = word_count(question);

        if words < self.min_words {
            tracing::debug!(words, min = self.min_words, "Question deflected");
            GateDecision::Deflect {
                examples: EXAMPLE_QUESTIONS.iter().map(|q| q.to_string()).collect(),
            }
        } else {
            GateDecision::Proceed
        }
    }
}

/// Whitespace-separated word count
pub fn word_count(text: &str) -> usize {
    text.split_whitespace().count()
}
