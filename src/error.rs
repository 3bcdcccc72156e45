//! Error types for needle evaluation.

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias using our custom error.
pub type Result<T> = std::result::Result<T, EvalError>;

/// Errors that abort an evaluation unit.
///
/// Per-question problems (a question without ground truth) are not errors;
/// they are reported as unscoreable instead.
#[derive(Error, Debug)]
pub enum EvalError {
    /// Error reading or writing files.
    #[error("I/O error for path '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Structural failure while parsing a model transcript.
    #[error("malformed transcript '{}' at line {line}: {reason}", .file.display())]
    MalformedTranscript {
        file: PathBuf,
        line: usize,
        reason: String,
    },

    /// Duplicate, missing or unparsable ground-truth or needle-metadata rows.
    #[error("failed to load ground truth '{}'{}: {reason}", .file.display(), at_line(.line))]
    GroundTruthLoad {
        file: PathBuf,
        line: Option<usize>,
        reason: String,
    },

    /// Malformed alias file.
    #[error("failed to load alias file '{}' at line {line}: {reason}", .file.display())]
    AliasLoad {
        file: PathBuf,
        line: usize,
        reason: String,
    },

    /// Invalid settings or conflicting flags.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Error during serialization/deserialization.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// A report file could not be read back.
    #[error("unreadable report '{}': {reason}", .file.display())]
    Report { file: PathBuf, reason: String },
}

impl EvalError {
    /// Create an I/O error with path context.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    pub(crate) fn ground_truth(
        file: impl Into<PathBuf>,
        line: usize,
        reason: impl Into<String>,
    ) -> Self {
        Self::GroundTruthLoad {
            file: file.into(),
            line: Some(line),
            reason: reason.into(),
        }
    }

    pub(crate) fn ground_truth_file(file: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Self::GroundTruthLoad {
            file: file.into(),
            line: None,
            reason: reason.into(),
        }
    }

    pub(crate) fn alias(file: impl Into<PathBuf>, line: usize, reason: impl Into<String>) -> Self {
        Self::AliasLoad {
            file: file.into(),
            line,
            reason: reason.into(),
        }
    }

    pub(crate) fn report(file: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Self::Report {
            file: file.into(),
            reason: reason.into(),
        }
    }
}

fn at_line(line: &Option<usize>) -> String {
    line.map(|l| format!(" at line {}", l)).unwrap_or_default()
}

impl From<serde_json::Error> for EvalError {
    fn from(err: serde_json::Error) -> Self {
        EvalError::Serialization(err.to_string())
    }
}

impl From<csv::Error> for EvalError {
    fn from(err: csv::Error) -> Self {
        EvalError::Serialization(err.to_string())
    }
}
