//! Alias-aware answer matching.
//!
//! An answer is correct when, after normalization, it contains the expected
//! answer or any phrase equivalent to it in the [`AliasTable`]. Containment
//! rather than equality is intended: models wrap the retrieved fact in
//! explanatory prose and the benchmark scores retrieval, not phrasing.

use crate::alias::AliasTable;
use crate::ground_truth::GroundTruthRecord;
use crate::transcript::QuestionRecord;
use serde::{Deserialize, Serialize};

/// Outcome of scoring one question.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchOutcome {
    pub index: u32,
    pub matched: bool,
    pub predicted: String,
    pub expected: String,
}

fn is_strippable(c: char) -> bool {
    c.is_whitespace()
        || c.is_ascii_punctuation()
        || matches!(c, '\u{201c}' | '\u{201d}' | '\u{2018}' | '\u{2019}' | '\u{ab}' | '\u{bb}' | '\u{2026}')
}

/// Case-fold, collapse internal whitespace and strip surrounding punctuation.
pub fn normalize(text: &str) -> String {
    let folded = text.to_lowercase();
    let collapsed = folded.split_whitespace().collect::<Vec<_>>().join(" ");
    collapsed.trim_matches(is_strippable).to_string()
}

/// Decides whether predicted answers match expected ones.
#[derive(Debug, Clone, Copy)]
pub struct Matcher<'a> {
    aliases: &'a AliasTable,
}

impl<'a> Matcher<'a> {
    pub fn new(aliases: &'a AliasTable) -> Self {
        Self { aliases }
    }

    /// True if `predicted` contains `expected` or one of its aliases.
    pub fn is_match(&self, predicted: &str, expected: &str) -> bool {
        let predicted = normalize(predicted);
        let expected = normalize(expected);

        if expected.is_empty() {
            return false;
        }

        match self.aliases.group_of_normalized(&expected) {
            Some(group) => group
                .members()
                .any(|member| predicted.contains(member)),
            None => predicted.contains(&expected),
        }
    }

    /// Score a transcript record against its ground truth.
    pub fn score(&self, question: &QuestionRecord, truth: &GroundTruthRecord) -> MatchOutcome {
        MatchOutcome {
            index: question.index,
            matched: self.is_match(&question.predicted_answer, &truth.expected_answer),
            predicted: question.predicted_answer.clone(),
            expected: truth.expected_answer.clone(),
        }
    }
}
