//! Cross-document averaging of evaluation reports.
//!
//! A results tree holds one report per (document, page count) unit:
//!
//! ```text
//! Results/
//!   Acme/
//!     Acme_25Pages/results_scores.txt
//!     Acme_50Pages/results_scores.txt
//!   Globex/
//!     Globex_25Pages/results_scores.txt
//! ```
//!
//! [`summarize`] reads every report and averages, per page count, each
//! depth bucket's accuracy and the overall accuracy across documents. The
//! result is the matrix a heatmap is drawn from.

use crate::error::Result;
use crate::persistence::load_report_summary;
use crate::report::ReportSummary;
use regex::Regex;
use std::collections::{BTreeMap, BTreeSet};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

static UNIT_DIR: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(.+)_(\d+)Pages$").expect("valid regex"));

/// Row label for the overall accuracy.
pub const OVERALL_ROW: &str = "overall";

/// A report file found in a results tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReportLocation {
    pub document: String,
    pub n_pages: u32,
    pub path: PathBuf,
}

/// Find `<root>/<doc>/<doc>_<N>Pages/<file_name>` reports, sorted.
pub fn find_reports(root: &Path, file_name: &str) -> Vec<ReportLocation> {
    let mut found: Vec<ReportLocation> = WalkDir::new(root)
        .follow_links(true)
        .into_iter()
        .filter_map(|entry| match entry {
            Ok(entry) => Some(entry),
            Err(e) => {
                warn!(error = %e, "skipping unreadable entry in results tree");
                None
            }
        })
        .filter(|entry| entry.file_type().is_file() && entry.file_name() == file_name)
        .filter_map(|entry| {
            let unit = entry.path().parent()?.file_name()?.to_str()?;
            let caps = UNIT_DIR.captures(unit)?;
            Some(ReportLocation {
                document: caps[1].to_string(),
                n_pages: caps[2].parse().ok()?,
                path: entry.path().to_path_buf(),
            })
        })
        .collect();

    found.sort_by(|a, b| {
        (a.document.as_str(), a.n_pages, &a.path).cmp(&(b.document.as_str(), b.n_pages, &b.path))
    });
    found
}

/// One row of the accuracy matrix.
#[derive(Debug, Clone, PartialEq)]
pub struct MatrixRow {
    /// Depth bucket label such as `0-10%`, or [`OVERALL_ROW`].
    pub label: String,
    /// One cell per page count; `None` when no document reported it.
    pub cells: Vec<Option<f64>>,
}

impl MatrixRow {
    /// Mean of the filled cells.
    pub fn average(&self) -> Option<f64> {
        mean(self.cells.iter().flatten().copied())
    }
}

/// Mean accuracies by depth bucket (rows) and page count (columns).
#[derive(Debug, Clone, PartialEq)]
pub struct AccuracyMatrix {
    pub page_counts: Vec<u32>,
    pub rows: Vec<MatrixRow>,
    pub documents: usize,
}

fn mean(values: impl Iterator<Item = f64>) -> Option<f64> {
    let (sum, n) = values.fold((0.0, 0usize), |(s, n), v| (s + v, n + 1));
    (n > 0).then(|| sum / n as f64)
}

/// Average parsed reports into a matrix.
pub fn build_matrix(reports: &[(ReportLocation, ReportSummary)]) -> AccuracyMatrix {
    let page_counts: Vec<u32> = reports
        .iter()
        .map(|(loc, _)| loc.n_pages)
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect();
    let documents = reports
        .iter()
        .map(|(loc, _)| loc.document.as_str())
        .collect::<BTreeSet<_>>()
        .len();

    // (low, high) percent -> page count -> values
    let mut buckets: BTreeMap<(u32, u32), BTreeMap<u32, Vec<f64>>> = BTreeMap::new();
    let mut overall: BTreeMap<u32, Vec<f64>> = BTreeMap::new();

    for (loc, summary) in reports {
        for bucket in &summary.buckets {
            if let Some(accuracy) = bucket.accuracy {
                buckets
                    .entry((bucket.low_percent, bucket.high_percent))
                    .or_default()
                    .entry(loc.n_pages)
                    .or_default()
                    .push(accuracy);
            }
        }
        overall
            .entry(loc.n_pages)
            .or_default()
            .push(summary.overall_accuracy);
    }

    let cells_for = |values: &BTreeMap<u32, Vec<f64>>| -> Vec<Option<f64>> {
        page_counts
            .iter()
            .map(|n| values.get(n).and_then(|v| mean(v.iter().copied())))
            .collect()
    };

    let mut rows: Vec<MatrixRow> = buckets
        .iter()
        .map(|(&(low, high), values)| MatrixRow {
            label: format!("{}-{}%", low, high),
            cells: cells_for(values),
        })
        .collect();
    rows.push(MatrixRow {
        label: OVERALL_ROW.to_string(),
        cells: cells_for(&overall),
    });

    AccuracyMatrix {
        page_counts,
        rows,
        documents,
    }
}

/// Read every report under `root` and average them.
///
/// Reports that cannot be read are logged and skipped so one broken unit
/// does not hide the rest.
pub fn summarize(root: &Path, file_name: &str) -> AccuracyMatrix {
    let mut reports = Vec::new();

    for location in find_reports(root, file_name) {
        match load_report_summary(&location.path) {
            Ok(summary) => {
                debug!(path = %location.path.display(), "read report");
                reports.push((location, summary));
            }
            Err(e) => warn!(error = %e, "skipping report"),
        }
    }

    let matrix = build_matrix(&reports);
    info!(
        root = %root.display(),
        reports = reports.len(),
        documents = matrix.documents,
        "averaged reports"
    );
    matrix
}

impl AccuracyMatrix {
    /// Write the matrix as CSV, optionally with an `Average` column.
    pub fn write_csv<W: Write>(&self, writer: W, precision: usize, with_average: bool) -> Result<()> {
        let mut wtr = csv::Writer::from_writer(writer);

        let mut header = vec!["depth".to_string()];
        header.extend(self.page_counts.iter().map(u32::to_string));
        if with_average {
            header.push("Average".to_string());
        }
        wtr.write_record(&header)?;

        let fmt = |v: Option<f64>| v.map(|v| format!("{:.*}", precision, v)).unwrap_or_default();

        for row in &self.rows {
            let mut record = vec![row.label.clone()];
            record.extend(row.cells.iter().map(|c| fmt(*c)));
            if with_average {
                record.push(fmt(row.average()));
            }
            wtr.write_record(&record)?;
        }

        wtr.flush().map_err(|e| crate::error::EvalError::io("<csv output>", e))?;
        Ok(())
    }
}
