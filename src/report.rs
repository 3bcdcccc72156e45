//! Evaluation report and its text form.
//!
//! The text form is read by downstream averaging tools, which only look at
//! the `Depth Analysis` block and at the last token of the last line:
//!
//! ```text
//! 1. <prompt> 1
//! 2. <prompt> 0
//! 3. <prompt> unscoreable
//!
//! Depth Analysis
//! 0-50% accuracy: 1.0000000000 (2)
//! 50-100% accuracy: 0.0000000000 (1)
//!
//! Average accuracy: 0.6666666667
//! ```
//!
//! The trailing line must keep that shape in every configuration.

use crate::depth::BucketSummary;
use crate::error::{EvalError, Result};
use crate::matcher::MatchOutcome;
use crate::transcript::QuestionRecord;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::LazyLock;

/// Heading that opens the bucket block.
pub const DEPTH_HEADING: &str = "Depth Analysis";

/// Prefix of the trailing overall-accuracy line.
pub const AVERAGE_PREFIX: &str = "Average accuracy:";

/// Per-question token for questions without ground truth.
pub const UNSCOREABLE: &str = "unscoreable";

static BUCKET_LINE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(\d+)-(\d+)% accuracy: (.+?)(?:\s+\((\d+)\))?$").expect("valid regex")
});

/// A transcript question and, when it had ground truth, its outcome.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuestionResult {
    pub question: QuestionRecord,
    /// `None` for unscoreable questions.
    pub outcome: Option<MatchOutcome>,
}

impl QuestionResult {
    fn token(&self) -> &'static str {
        match &self.outcome {
            Some(o) if o.matched => "1",
            Some(_) => "0",
            None => UNSCOREABLE,
        }
    }
}

/// Full result of one evaluation unit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationReport {
    /// Document label, for bookkeeping only.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub document: Option<String>,
    /// Page count of the evaluated document, for bookkeeping only.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub n_pages: Option<u32>,
    /// Ascending by question index.
    pub questions: Vec<QuestionResult>,
    /// Present only when depth analysis ran.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub buckets: Option<Vec<BucketSummary>>,
    pub scored: usize,
    pub unscoreable: usize,
    pub overall_accuracy: f64,
}

impl EvaluationReport {
    /// Render the text report with `precision` decimals.
    pub fn to_text(&self, precision: usize) -> String {
        let mut out = String::new();

        for result in &self.questions {
            let prompt = result.question.prompt.trim();
            let line = if prompt.is_empty() {
                format!("{}. {}\n", result.question.index, result.token())
            } else {
                format!("{}. {} {}\n", result.question.index, prompt, result.token())
            };
            out.push_str(&line);
        }

        if let Some(buckets) = &self.buckets {
            out.push_str(&format!("\n{}\n", DEPTH_HEADING));
            for bucket in buckets {
                if let Some(accuracy) = bucket.accuracy {
                    out.push_str(&format!(
                        "{} accuracy: {:.*} ({})\n",
                        bucket.label(),
                        precision,
                        accuracy,
                        bucket.count
                    ));
                }
            }
        }

        out.push_str(&format!(
            "\n{} {:.*}\n",
            AVERAGE_PREFIX, precision, self.overall_accuracy
        ));
        out
    }
}

/// One bucket line read back from a report.
#[derive(Debug, Clone, PartialEq)]
pub struct BucketReading {
    pub low_percent: u32,
    pub high_percent: u32,
    /// `None` when the report marked the bucket as having no scores.
    pub accuracy: Option<f64>,
    pub count: Option<usize>,
}

impl BucketReading {
    pub fn label(&self) -> String {
        format!("{}-{}%", self.low_percent, self.high_percent)
    }
}

/// The parts of a report that cross-document averaging consumes.
#[derive(Debug, Clone, PartialEq)]
pub struct ReportSummary {
    pub buckets: Vec<BucketReading>,
    pub overall_accuracy: f64,
}

impl ReportSummary {
    /// Read a text report; `origin` is only used in diagnostics.
    pub fn parse(text: &str, origin: &Path) -> Result<Self> {
        let overall_accuracy = text
            .lines()
            .rev()
            .find(|l| !l.trim().is_empty())
            .and_then(|l| l.split_whitespace().last())
            .and_then(|token| token.parse::<f64>().ok())
            .filter(|v| (0.0..=1.0).contains(v))
            .ok_or_else(|| {
                EvalError::report(origin, "last line does not end in an accuracy in [0, 1]")
            })?;

        let mut buckets = Vec::new();
        let mut lines = text.lines().map(str::trim);
        if lines.any(|l| l == DEPTH_HEADING) {
            for line in lines.take_while(|l| !l.is_empty()) {
                let caps = BUCKET_LINE.captures(line).ok_or_else(|| {
                    EvalError::report(origin, format!("unrecognized bucket line '{}'", line))
                })?;
                buckets.push(BucketReading {
                    low_percent: caps[1].parse().unwrap_or_default(),
                    high_percent: caps[2].parse().unwrap_or_default(),
                    accuracy: caps[3].parse::<f64>().ok(),
                    count: caps.get(4).and_then(|m| m.as_str().parse().ok()),
                });
            }
        }

        Ok(Self {
            buckets,
            overall_accuracy,
        })
    }

    /// Summarize an in-memory report.
    pub fn from_report(report: &EvaluationReport) -> Self {
        let buckets = report
            .buckets
            .iter()
            .flatten()
            .filter(|b| b.accuracy.is_some())
            .map(|b| BucketReading {
                low_percent: (b.low * 100.0).round() as u32,
                high_percent: (b.high * 100.0).round().min(100.0) as u32,
                accuracy: b.accuracy,
                count: Some(b.count),
            })
            .collect();

        Self {
            buckets,
            overall_accuracy: report.overall_accuracy,
        }
    }
}
