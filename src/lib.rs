//! Needle Eval - scoring for needle-in-a-haystack document QA runs.
//!
//! A needle run plants short facts ("needles") at known depths inside long
//! documents and asks a model to recover them. This library turns the
//! model's transcript into a per-question verdict, an overall accuracy and
//! an accuracy-by-depth breakdown.
//!
//! # Overview
//!
//! 1. The transcript is parsed into numbered question blocks
//! 2. Each predicted answer is matched against the ground truth, expanded
//!    through an optional alias table, by normalized substring containment
//! 3. Outcomes are bucketed by needle depth
//! 4. A fixed-format text report (and optionally JSON) is written
//!
//! # Quick Start
//!
//! ```no_run
//! use needle_eval::{Config, EvaluationInputs, run_evaluation};
//! use std::path::PathBuf;
//!
//! fn main() -> anyhow::Result<()> {
//!     let config = Config::load(None)?;
//!
//!     let inputs = EvaluationInputs {
//!         transcript: PathBuf::from("pred.txt"),
//!         ground_truth: PathBuf::from("groundtruth.txt"),
//!         output: PathBuf::from("results_scores.txt"),
//!         needles_info: Some(PathBuf::from("needles_info.csv")),
//!         depth_analysis: true,
//!         n_pages: Some(25),
//!         ..Default::default()
//!     };
//!
//!     let report = run_evaluation(&inputs, &config)?;
//!     println!("accuracy: {}", report.overall_accuracy);
//!     Ok(())
//! }
//! ```
//!
//! # Architecture
//!
//! - **TranscriptParser**: lazy parser over `#<N>` question blocks
//! - **GroundTruthStore**: expected answers and needle metadata by index
//! - **AliasTable**: equivalence groups of interchangeable phrases
//! - **Matcher**: normalized substring matching
//! - **depth**: equal-width depth buckets
//! - **EvaluationReport**: the text and JSON report
//! - **summary**: averages many reports into a depth by page-count matrix

pub mod alias;
pub mod config;
pub mod depth;
pub mod error;
pub mod evaluation;
pub mod ground_truth;
pub mod matcher;
pub mod persistence;
pub mod report;
pub mod summary;
pub mod transcript;

// Re-export commonly used types
pub use alias::{AliasGroup, AliasTable};
pub use config::Config;
pub use depth::BucketSummary;
pub use error::{EvalError, Result};
pub use evaluation::{EvaluationInputs, Evaluator, run_evaluation};
pub use ground_truth::{DepthScale, GroundTruthRecord, GroundTruthStore, NeedleInfo, NeedleType};
pub use matcher::{MatchOutcome, Matcher};
pub use persistence::{load_report_summary, save_json_report, save_reports, save_text_report};
pub use report::{EvaluationReport, ReportSummary};
pub use summary::{AccuracyMatrix, summarize};
pub use transcript::{QuestionRecord, TranscriptParser};
