//! Persistence layer for evaluation reports.
//!
//! Supports both the text report (the downstream contract) and a JSON
//! rendering of the full structured report.

use crate::error::{EvalError, Result};
use crate::report::{EvaluationReport, ReportSummary};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;

/// Default filename for per-document text reports.
pub const DEFAULT_REPORT_FILENAME: &str = "results_scores.txt";

/// On-disk format of a report.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReportFormat {
    /// Line-oriented text report.
    Text,
    /// Pretty-printed JSON of the structured report.
    Json,
}

impl ReportFormat {
    /// Determine format from file extension.
    pub fn from_path(path: &Path) -> Self {
        match path.extension().and_then(|e| e.to_str()) {
            Some("json") => ReportFormat::Json,
            _ => ReportFormat::Text,
        }
    }
}

fn ensure_parent(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            fs::create_dir_all(parent).map_err(|e| EvalError::io(parent, e))?;
        }
    }
    Ok(())
}

/// Write `contents` to a temporary file in the target's directory.
fn stage(path: &Path, contents: &str) -> Result<NamedTempFile> {
    ensure_parent(path)?;
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };

    let mut temp = NamedTempFile::new_in(dir).map_err(|e| EvalError::io(path, e))?;
    temp.write_all(contents.as_bytes())
        .and_then(|()| temp.flush())
        .map_err(|e| EvalError::io(path, e))?;
    Ok(temp)
}

/// Write the text report and, optionally, the JSON report.
///
/// Both files are staged first; neither target is touched unless both
/// could be written.
pub fn save_reports(
    report: &EvaluationReport,
    text_path: &Path,
    json_path: Option<&Path>,
    precision: usize,
) -> Result<()> {
    let mut staged = vec![(stage(text_path, &report.to_text(precision))?, text_path)];
    if let Some(path) = json_path {
        let data = serde_json::to_string_pretty(report)?;
        staged.push((stage(path, &data)?, path));
    }

    let mut persisted: Vec<PathBuf> = Vec::with_capacity(staged.len());
    for (temp, path) in staged {
        if let Err(e) = temp.persist(path) {
            for done in &persisted {
                let _ = fs::remove_file(done);
            }
            return Err(EvalError::io(path, e.error));
        }
        persisted.push(path.to_path_buf());
    }
    Ok(())
}

/// Write the text report.
pub fn save_text_report(report: &EvaluationReport, path: &Path, precision: usize) -> Result<()> {
    save_reports(report, path, None, precision)
}

/// Write the structured report as JSON.
pub fn save_json_report(report: &EvaluationReport, path: &Path) -> Result<()> {
    ensure_parent(path)?;
    let data = serde_json::to_string_pretty(report)
        .map_err(|e| EvalError::Serialization(e.to_string()))?;
    fs::write(path, data).map_err(|e| EvalError::io(path, e))
}

/// Load a structured report from JSON.
pub fn load_json_report(path: &Path) -> Result<EvaluationReport> {
    let data = fs::read_to_string(path).map_err(|e| EvalError::io(path, e))?;
    serde_json::from_str(&data).map_err(|e| EvalError::Serialization(e.to_string()))
}

/// Load the averaging-relevant parts of a report in either format.
pub fn load_report_summary(path: &Path) -> Result<ReportSummary> {
    match ReportFormat::from_path(path) {
        ReportFormat::Json => Ok(ReportSummary::from_report(&load_json_report(path)?)),
        ReportFormat::Text => {
            let text = fs::read_to_string(path).map_err(|e| EvalError::io(path, e))?;
            ReportSummary::parse(&text, path)
        }
    }
}
