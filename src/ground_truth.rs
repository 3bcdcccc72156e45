//! Ground-truth answers and needle placement metadata.
//!
//! Expected answers come from a line-oriented file where each row carries
//! the answer as its first double-quoted substring, optionally preceded by
//! an explicit question index:
//!
//! ```text
//! 1. The secret ingredient is "cardamom".
//! 2, "blue whale"
//! "Nairobi"
//! ```
//!
//! Rows without an explicit index take their 1-based position among the
//! non-blank rows. Needle metadata is CSV: `index,position[,type]`.

use crate::error::{EvalError, Result};
use crate::matcher::normalize;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;
use tracing::debug;

static QUOTED: LazyLock<Regex> = LazyLock::new(|| Regex::new(r#""(.*?)""#).expect("valid regex"));
static INDEX_PREFIX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(\d+)\s*(?:[.,:]|\t)").expect("valid regex"));

/// Expected answer for one question.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroundTruthRecord {
    pub index: u32,
    pub expected_answer: String,
}

/// Kind of needle planted in the document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NeedleType {
    #[default]
    Text,
    Multimodal,
}

impl NeedleType {
    /// Parse from string (case-insensitive).
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "text" => Some(NeedleType::Text),
            "multimodal" | "image" | "text+image" => Some(NeedleType::Multimodal),
            _ => None,
        }
    }
}

/// Where a needle was planted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NeedleInfo {
    pub index: u32,
    /// Relative depth in `[0, 1]`.
    pub depth: f64,
    /// 1-based page, when the metadata was given in pages.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub page: Option<u32>,
    pub needle_type: NeedleType,
}

/// How the position column of the needle metadata is interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DepthScale {
    /// Positions are already relative depths in `[0, 1]`.
    #[default]
    Relative,
    /// Positions are 1-based page numbers out of this many pages.
    Pages(u32),
}

impl DepthScale {
    /// Pages when a page count is known, relative otherwise.
    pub fn from_page_count(n_pages: Option<u32>) -> Self {
        n_pages.map_or(DepthScale::Relative, DepthScale::Pages)
    }

    fn normalize(self, position: f64) -> std::result::Result<(f64, Option<u32>), String> {
        if !position.is_finite() {
            return Err(format!("position {} is not a finite number", position));
        }

        match self {
            DepthScale::Relative => {
                if (0.0..=1.0).contains(&position) {
                    Ok((position, None))
                } else {
                    Err(format!(
                        "relative depth {} is outside [0, 1]; pass a page count for page positions",
                        position
                    ))
                }
            }
            DepthScale::Pages(n_pages) => {
                if position.fract() != 0.0 || position < 1.0 || position > f64::from(n_pages) {
                    return Err(format!(
                        "page {} is not a page number in 1..={}",
                        position, n_pages
                    ));
                }
                let page = position as u32;
                Ok((f64::from(page - 1) / f64::from(n_pages), Some(page)))
            }
        }
    }
}

/// Index-keyed ground truth and optional needle metadata.
#[derive(Debug, Clone, Default)]
pub struct GroundTruthStore {
    origin: PathBuf,
    answers: HashMap<u32, GroundTruthRecord>,
    needles: Option<HashMap<u32, NeedleInfo>>,
    scale: DepthScale,
}

impl GroundTruthStore {
    /// Load expected answers, and needle metadata if a path is given.
    pub fn load(answers: &Path, needles: Option<&Path>, scale: DepthScale) -> Result<Self> {
        let text = std::fs::read_to_string(answers).map_err(|e| EvalError::io(answers, e))?;
        let mut store = Self::from_answers_text(&text, answers)?;

        if let Some(path) = needles {
            let file = std::fs::File::open(path).map_err(|e| EvalError::io(path, e))?;
            store.needles = Some(parse_needles(file, scale, path)?);
            store.scale = scale;
        }

        debug!(
            path = %answers.display(),
            answers = store.answers.len(),
            needles = store.needles.as_ref().map_or(0, HashMap::len),
            "loaded ground truth"
        );
        Ok(store)
    }

    /// Parse ground-truth rows; `origin` is only used in diagnostics.
    pub fn from_answers_text(text: &str, origin: &Path) -> Result<Self> {
        let mut answers = HashMap::new();
        let mut ordinal = 0u32;

        for (idx, raw) in text.lines().enumerate() {
            let line_no = idx + 1;
            let line = raw.trim();
            if line.is_empty() {
                continue;
            }
            ordinal += 1;

            let index = match INDEX_PREFIX.captures(line) {
                Some(caps) => caps[1].parse::<u32>().ok().filter(|&i| i > 0).ok_or_else(|| {
                    EvalError::ground_truth(origin, line_no, format!("invalid index '{}'", &caps[1]))
                })?,
                None => ordinal,
            };

            let expected = QUOTED
                .captures(line)
                .map(|caps| caps[1].to_string())
                .ok_or_else(|| {
                    EvalError::ground_truth(origin, line_no, "row has no double-quoted answer")
                })?;

            if normalize(&expected).is_empty() {
                return Err(EvalError::ground_truth(
                    origin,
                    line_no,
                    format!("expected answer for question {} is empty", index),
                ));
            }

            match answers.entry(index) {
                Entry::Occupied(_) => {
                    return Err(EvalError::ground_truth(
                        origin,
                        line_no,
                        format!("duplicate index {}", index),
                    ));
                }
                Entry::Vacant(slot) => {
                    slot.insert(GroundTruthRecord {
                        index,
                        expected_answer: expected,
                    });
                }
            }
        }

        Ok(Self {
            origin: origin.to_path_buf(),
            answers,
            needles: None,
            scale: DepthScale::Relative,
        })
    }

    /// Attach needle metadata parsed from CSV text.
    pub fn with_needles_csv(mut self, csv_text: &str, scale: DepthScale, origin: &Path) -> Result<Self> {
        self.needles = Some(parse_needles(csv_text.as_bytes(), scale, origin)?);
        self.scale = scale;
        Ok(self)
    }

    /// Path the answers were loaded from.
    pub fn origin(&self) -> &Path {
        &self.origin
    }

    pub fn answer(&self, index: u32) -> Option<&GroundTruthRecord> {
        self.answers.get(&index)
    }

    pub fn needle(&self, index: u32) -> Option<&NeedleInfo> {
        self.needles.as_ref().and_then(|n| n.get(&index))
    }

    /// How the loaded needle positions were interpreted.
    pub fn depth_scale(&self) -> DepthScale {
        self.scale
    }

    /// Whether a needle-metadata file was loaded.
    pub fn has_needles(&self) -> bool {
        self.needles.is_some()
    }

    /// All ground-truth indices, ascending.
    pub fn indices(&self) -> Vec<u32> {
        let mut indices: Vec<u32> = self.answers.keys().copied().collect();
        indices.sort_unstable();
        indices
    }

    pub fn len(&self) -> usize {
        self.answers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.answers.is_empty()
    }
}

fn parse_needles<R: std::io::Read>(
    reader: R,
    scale: DepthScale,
    origin: &Path,
) -> Result<HashMap<u32, NeedleInfo>> {
    let mut rdr = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .trim(csv::Trim::All)
        .comment(Some(b'#'))
        .from_reader(reader);

    let mut needles = HashMap::new();

    for (row, record) in rdr.records().enumerate() {
        let record = record.map_err(|e| match e.position() {
            Some(pos) => EvalError::ground_truth(origin, pos.line() as usize, e.to_string()),
            None => EvalError::ground_truth_file(origin, e.to_string()),
        })?;
        let line = record.position().map_or(row + 1, |p| p.line() as usize);

        if record.iter().all(str::is_empty) {
            continue;
        }

        let raw_index = record.get(0).unwrap_or_default();
        let index = match raw_index.parse::<u32>() {
            Ok(i) if i > 0 => i,
            // A non-numeric first row is a header.
            Err(_) if needles.is_empty() && row == 0 => continue,
            _ => {
                return Err(EvalError::ground_truth(
                    origin,
                    line,
                    format!("invalid question index '{}'", raw_index),
                ));
            }
        };

        let raw_position = record.get(1).ok_or_else(|| {
            EvalError::ground_truth(origin, line, "missing position column")
        })?;
        let position: f64 = raw_position.parse().map_err(|_| {
            EvalError::ground_truth(
                origin,
                line,
                format!("unparsable position '{}'", raw_position),
            )
        })?;
        let (depth, page) = scale
            .normalize(position)
            .map_err(|reason| EvalError::ground_truth(origin, line, reason))?;

        let needle_type = match record.get(2).filter(|t| !t.is_empty()) {
            Some(raw) => NeedleType::parse(raw).ok_or_else(|| {
                EvalError::ground_truth(origin, line, format!("unknown needle type '{}'", raw))
            })?,
            None => NeedleType::default(),
        };

        let info = NeedleInfo {
            index,
            depth,
            page,
            needle_type,
        };
        if needles.insert(index, info).is_some() {
            return Err(EvalError::ground_truth(
                origin,
                line,
                format!("duplicate index {}", index),
            ));
        }
    }

    Ok(needles)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn answers(text: &str) -> Result<GroundTruthStore> {
        GroundTruthStore::from_answers_text(text, Path::new("gt.txt"))
    }

    fn failing_line(err: EvalError) -> Option<usize> {
        match err {
            EvalError::GroundTruthLoad { line, .. } => line,
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_positional_rows() {
        let store = answers("The answer is \"Paris\".\n\n\"42\"\n").unwrap();

        assert_eq!(store.len(), 2);
        assert_eq!(store.answer(1).unwrap().expected_answer, "Paris");
        assert_eq!(store.answer(2).unwrap().expected_answer, "42");
        assert!(store.answer(3).is_none());
    }

    #[test]
    fn test_explicit_indices() {
        let store = answers("3. \"c\"\n1, \"a\"\n2:\t\"b\"\n10\t\"j\"\n").unwrap();

        assert_eq!(store.indices(), vec![1, 2, 3, 10]);
        assert_eq!(store.answer(3).unwrap().expected_answer, "c");
        assert_eq!(store.answer(10).unwrap().expected_answer, "j");
    }

    #[test]
    fn test_only_first_quoted_substring_is_used() {
        let store = answers("1. \"Oslo\" (not \"Bergen\")\n").unwrap();
        assert_eq!(store.answer(1).unwrap().expected_answer, "Oslo");
    }

    #[test]
    fn test_duplicate_index_is_rejected() {
        let err = answers("1. \"a\"\n1. \"b\"\n").unwrap_err();
        assert_eq!(failing_line(err), Some(2));
    }

    #[test]
    fn test_duplicate_between_explicit_and_positional() {
        assert!(answers("\"a\"\n1. \"b\"\n").is_err());
    }

    #[test]
    fn test_row_without_quotes_is_malformed() {
        let err = answers("\"a\"\nno quotes here\n").unwrap_err();
        assert_eq!(failing_line(err), Some(2));
    }

    #[test]
    fn test_empty_answer_is_rejected() {
        assert!(answers("1. \"\"\n").is_err());
        assert!(answers("1. \" . \"\n").is_err());
    }

    #[test]
    fn test_needles_relative_depths() {
        let csv_text = "index,depth,type\n1,0.0,text\n2,0.45,multimodal\n3,1.0\n";
        let store = answers("\"a\"\n\"b\"\n\"c\"\n")
            .unwrap()
            .with_needles_csv(csv_text, DepthScale::Relative, Path::new("needles.csv"))
            .unwrap();

        assert!(store.has_needles());
        assert_eq!(store.needle(2).unwrap().depth, 0.45);
        assert_eq!(store.needle(2).unwrap().needle_type, NeedleType::Multimodal);
        assert_eq!(store.needle(3).unwrap().needle_type, NeedleType::Text);
        assert_eq!(store.needle(3).unwrap().page, None);
    }

    #[test]
    fn test_needles_page_positions() {
        let store = GroundTruthStore::default()
            .with_needles_csv("1,1\n2,13\n3,25\n", DepthScale::Pages(25), Path::new("n.csv"))
            .unwrap();

        assert_eq!(store.needle(1).unwrap().depth, 0.0);
        assert_eq!(store.needle(2).unwrap().depth, 12.0 / 25.0);
        assert_eq!(store.needle(3).unwrap().page, Some(25));
        assert!(store.needle(3).unwrap().depth < 1.0);
    }

    #[test]
    fn test_needles_reject_bad_rows() {
        let origin = Path::new("n.csv");
        let base = GroundTruthStore::default;

        assert!(base().with_needles_csv("1,abc\n", DepthScale::Relative, origin).is_err());
        assert!(base().with_needles_csv("1,1.5\n", DepthScale::Relative, origin).is_err());
        assert!(base().with_needles_csv("1,26\n", DepthScale::Pages(25), origin).is_err());
        assert!(base().with_needles_csv("1,0\n", DepthScale::Pages(25), origin).is_err());
        assert!(base().with_needles_csv("1,0.5,video\n", DepthScale::Relative, origin).is_err());
        assert!(base().with_needles_csv("1\n", DepthScale::Relative, origin).is_err());
        assert!(base().with_needles_csv("1,0.1\nx,0.2\n", DepthScale::Relative, origin).is_err());
    }

    #[test]
    fn test_needles_duplicate_index() {
        let err = GroundTruthStore::default()
            .with_needles_csv("1,0.1\n2,0.2\n1,0.3\n", DepthScale::Relative, Path::new("n.csv"))
            .unwrap_err();
        assert_eq!(failing_line(err), Some(3));
    }

    #[test]
    fn test_load_from_files() {
        let dir = TempDir::new().unwrap();
        let gt = dir.path().join("gt.txt");
        let needles = dir.path().join("needles.csv");
        std::fs::write(&gt, "\"alpha\"\n\"beta\"\n").unwrap();
        std::fs::write(&needles, "1,5\n2,10\n").unwrap();

        let store = GroundTruthStore::load(&gt, Some(&needles), DepthScale::Pages(10)).unwrap();
        assert_eq!(store.len(), 2);
        assert_eq!(store.needle(2).unwrap().depth, 0.9);
    }

    #[test]
    fn test_load_missing_file() {
        let err = GroundTruthStore::load(Path::new("/nonexistent/gt.txt"), None, DepthScale::Relative)
            .unwrap_err();
        assert!(matches!(err, EvalError::Io { .. }));
    }
}
