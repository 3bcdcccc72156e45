//! Parsing of model transcripts.
//!
//! A transcript is written by the inference client as a sequence of blocks:
//!
//! ```text
//! #1
//! Prompt: What is the capital mentioned in the memo?
//! Output: The memo mentions Paris.
//!
//! #2
//! Prompt: ...
//! Output: first line of a long answer
//! continued on a second line
//! ```
//!
//! [`TranscriptParser`] walks the lines once with a small state machine and
//! yields a [`QuestionRecord`] per block, in file order.

use crate::config::TranscriptConfig;
use crate::error::{EvalError, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::str::Lines;

/// One question/answer block of a transcript.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuestionRecord {
    /// 1-based question index from the `#<N>` marker.
    pub index: u32,
    /// Prompt text sent to the model.
    pub prompt: String,
    /// The model's answer, continuation lines joined with single spaces.
    pub predicted_answer: String,
}

#[derive(Debug)]
enum State {
    ExpectingMarker,
    ExpectingPrompt { index: u32, marker_line: usize },
    ExpectingAnswer { index: u32, prompt: String, marker_line: usize },
    AccumulatingAnswer { record: QuestionRecord },
    Done,
}

/// Lazy parser over transcript text.
///
/// Yields `Ok(record)` per block and stops after the first `Err`.
pub struct TranscriptParser<'a> {
    lines: Lines<'a>,
    line_no: usize,
    state: State,
    seen: HashSet<u32>,
    pending_error: Option<EvalError>,
    prompt_label: &'a str,
    answer_label: &'a str,
    source_name: PathBuf,
}

impl<'a> TranscriptParser<'a> {
    /// Create a parser over `text` using the configured labels.
    pub fn new(text: &'a str, labels: &'a TranscriptConfig) -> Self {
        Self {
            lines: text.lines(),
            line_no: 0,
            state: State::ExpectingMarker,
            seen: HashSet::new(),
            pending_error: None,
            prompt_label: labels.prompt_label.trim(),
            answer_label: labels.answer_label.trim(),
            source_name: PathBuf::from("<transcript>"),
        }
    }

    /// Name used in diagnostics, usually the transcript path.
    pub fn with_source_name(mut self, name: impl Into<PathBuf>) -> Self {
        self.source_name = name.into();
        self
    }

    fn error(&mut self, line: usize, reason: impl Into<String>) -> EvalError {
        self.state = State::Done;
        EvalError::MalformedTranscript {
            file: self.source_name.clone(),
            line,
            reason: reason.into(),
        }
    }

    /// Parse a `#<N>` marker line, returning `None` for ordinary text.
    fn marker(line: &str) -> Option<&str> {
        let digits = line.strip_prefix('#')?;
        (!digits.is_empty() && digits.bytes().all(|b| b.is_ascii_digit())).then_some(digits)
    }

    fn open_block(&mut self, digits: &str) -> std::result::Result<State, EvalError> {
        let line = self.line_no;
        let index: u32 = match digits.parse() {
            Ok(index) if index > 0 => index,
            _ => return Err(self.error(line, format!("invalid question marker '#{}'", digits))),
        };

        if !self.seen.insert(index) {
            return Err(self.error(line, format!("question marker #{} repeats", index)));
        }

        Ok(State::ExpectingPrompt {
            index,
            marker_line: line,
        })
    }

    fn step(&mut self, raw: &str) -> std::result::Result<Option<QuestionRecord>, EvalError> {
        let line = raw.trim();
        let line_no = self.line_no;

        match std::mem::replace(&mut self.state, State::Done) {
            State::ExpectingMarker => {
                if line.is_empty() {
                    self.state = State::ExpectingMarker;
                } else if let Some(digits) = Self::marker(line) {
                    self.state = self.open_block(digits)?;
                } else {
                    return Err(self.error(line_no, "text outside of a '#<N>' question block"));
                }
            }
            State::ExpectingPrompt { index, marker_line } => {
                if line.is_empty() {
                    self.state = State::ExpectingPrompt { index, marker_line };
                } else if let Some(rest) = line.strip_prefix(self.prompt_label) {
                    self.state = State::ExpectingAnswer {
                        index,
                        prompt: rest.trim().to_string(),
                        marker_line,
                    };
                } else {
                    let reason = format!(
                        "block #{} is missing its '{}' line",
                        index, self.prompt_label
                    );
                    return Err(self.error(line_no, reason));
                }
            }
            State::ExpectingAnswer {
                index,
                mut prompt,
                marker_line,
            } => {
                if let Some(rest) = line.strip_prefix(self.answer_label) {
                    self.state = State::AccumulatingAnswer {
                        record: QuestionRecord {
                            index,
                            prompt,
                            predicted_answer: rest.trim().to_string(),
                        },
                    };
                } else if line.is_empty() {
                    self.state = State::ExpectingAnswer {
                        index,
                        prompt,
                        marker_line,
                    };
                } else if Self::marker(line).is_some() {
                    let reason = format!(
                        "block #{} (line {}) is missing its '{}' line",
                        index, marker_line, self.answer_label
                    );
                    return Err(self.error(line_no, reason));
                } else {
                    append_continuation(&mut prompt, line);
                    self.state = State::ExpectingAnswer {
                        index,
                        prompt,
                        marker_line,
                    };
                }
            }
            State::AccumulatingAnswer { mut record } => {
                if let Some(digits) = Self::marker(line) {
                    // The finished block is still valid; report the bad marker on the next call.
                    match self.open_block(digits) {
                        Ok(state) => self.state = state,
                        Err(e) => self.pending_error = Some(e),
                    }
                    return Ok(Some(record));
                }
                if !line.is_empty() {
                    append_continuation(&mut record.predicted_answer, line);
                }
                self.state = State::AccumulatingAnswer { record };
            }
            State::Done => {}
        }

        Ok(None)
    }

    fn finish(&mut self) -> Option<Result<QuestionRecord>> {
        let line_no = self.line_no;
        match std::mem::replace(&mut self.state, State::Done) {
            State::ExpectingMarker | State::Done => None,
            State::AccumulatingAnswer { record } => Some(Ok(record)),
            State::ExpectingPrompt { index, .. } => {
                let reason = format!(
                    "block #{} is missing its '{}' line",
                    index, self.prompt_label
                );
                Some(Err(self.error(line_no, reason)))
            }
            State::ExpectingAnswer {
                index, marker_line, ..
            } => {
                let reason = format!(
                    "block #{} (line {}) is missing its '{}' line",
                    index, marker_line, self.answer_label
                );
                Some(Err(self.error(line_no, reason)))
            }
        }
    }
}

fn append_continuation(text: &mut String, line: &str) {
    if !text.is_empty() {
        text.push(' ');
    }
    text.push_str(line);
}

impl Iterator for TranscriptParser<'_> {
    type Item = Result<QuestionRecord>;

    fn next(&mut self) -> Option<Self::Item> {
        if let Some(e) = self.pending_error.take() {
            return Some(Err(e));
        }
        if matches!(self.state, State::Done) {
            return None;
        }

        while let Some(raw) = self.lines.next() {
            self.line_no += 1;
            match self.step(raw) {
                Ok(Some(record)) => return Some(Ok(record)),
                Ok(None) => {
                    if matches!(self.state, State::Done) {
                        return None;
                    }
                }
                Err(e) => return Some(Err(e)),
            }
        }

        self.finish()
    }
}

impl std::iter::FusedIterator for TranscriptParser<'_> {}

/// Parse a whole transcript, failing on the first malformed block.
pub fn parse_transcript(text: &str, labels: &TranscriptConfig) -> Result<Vec<QuestionRecord>> {
    TranscriptParser::new(text, labels).collect()
}

/// Read and parse a transcript file.
pub fn load_transcript(path: &Path, labels: &TranscriptConfig) -> Result<Vec<QuestionRecord>> {
    let text = std::fs::read_to_string(path).map_err(|e| EvalError::io(path, e))?;
    TranscriptParser::new(&text, labels)
        .with_source_name(path)
        .collect()
}
