//! Evaluation of one transcript against its ground truth.
//!
//! [`Evaluator`] joins transcript records with ground truth by question
//! index, scores them, and optionally buckets the outcomes by needle depth.
//! [`run_evaluation`] wraps it with loading and report writing for one
//! (document, page count) unit. Nothing is written unless every input
//! loaded cleanly.

use crate::alias::AliasTable;
use crate::config::Config;
use crate::depth::{MAX_BUCKETS, bucket_by_depth, bucket_by_position, overall_accuracy};
use crate::error::{EvalError, Result};
use crate::ground_truth::{DepthScale, GroundTruthStore};
use crate::matcher::Matcher;
use crate::persistence::save_reports;
use crate::report::{EvaluationReport, QuestionResult};
use crate::transcript::{QuestionRecord, load_transcript};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Scores transcript records against a ground-truth store.
pub struct Evaluator<'a> {
    store: &'a GroundTruthStore,
    matcher: Matcher<'a>,
    num_buckets: Option<usize>,
}

impl<'a> Evaluator<'a> {
    pub fn new(store: &'a GroundTruthStore, aliases: &'a AliasTable) -> Self {
        Self {
            store,
            matcher: Matcher::new(aliases),
            num_buckets: None,
        }
    }

    /// Enable depth analysis with `num_buckets` buckets.
    pub fn with_depth_analysis(mut self, num_buckets: usize) -> Self {
        self.num_buckets = Some(num_buckets);
        self
    }

    /// Score every question and aggregate.
    ///
    /// Questions without ground truth are kept in the report as unscoreable
    /// and excluded from every accuracy.
    pub fn evaluate(&self, mut questions: Vec<QuestionRecord>) -> Result<EvaluationReport> {
        if let Some(n) = self.num_buckets {
            check_bucket_count(n)?;
        }

        questions.sort_by_key(|q| q.index);

        let mut results = Vec::with_capacity(questions.len());
        let mut outcomes = Vec::with_capacity(questions.len());

        for question in questions {
            let outcome = match self.store.answer(question.index) {
                Some(truth) => {
                    let outcome = self.matcher.score(&question, truth);
                    outcomes.push(outcome.clone());
                    Some(outcome)
                }
                None => {
                    warn!(
                        question = question.index,
                        "no ground-truth answer; question is unscoreable"
                    );
                    None
                }
            };
            results.push(QuestionResult { question, outcome });
        }

        let asked: HashSet<u32> = results.iter().map(|r| r.question.index).collect();
        let unasked: Vec<u32> = self
            .store
            .indices()
            .into_iter()
            .filter(|i| !asked.contains(i))
            .collect();
        if !unasked.is_empty() {
            warn!(
                count = unasked.len(),
                first = unasked[0],
                "ground-truth rows without a transcript question"
            );
        }

        let overall = overall_accuracy(&outcomes).ok_or_else(|| {
            EvalError::ground_truth_file(
                self.store.origin(),
                format!(
                    "none of the {} transcript questions has a ground-truth answer",
                    results.len()
                ),
            )
        })?;

        let buckets = self.num_buckets.map(|n| {
            if self.store.has_needles() {
                bucket_by_depth(&outcomes, self.store, n)
            } else {
                warn!("no needle metadata; bucketing questions by position");
                bucket_by_position(&outcomes, n)
            }
        });

        Ok(EvaluationReport {
            document: None,
            n_pages: None,
            scored: outcomes.len(),
            unscoreable: results.len() - outcomes.len(),
            questions: results,
            buckets,
            overall_accuracy: overall,
        })
    }
}

pub(crate) fn check_bucket_count(num_buckets: usize) -> Result<()> {
    if (1..=MAX_BUCKETS).contains(&num_buckets) {
        Ok(())
    } else {
        Err(EvalError::Configuration(format!(
            "number of depth buckets must be between 1 and {}, got {}",
            MAX_BUCKETS, num_buckets
        )))
    }
}

/// Paths and flags for one evaluation unit.
#[derive(Debug, Clone, Default)]
pub struct EvaluationInputs {
    pub transcript: PathBuf,
    pub ground_truth: PathBuf,
    pub output: PathBuf,
    pub json_output: Option<PathBuf>,
    pub alias_file: Option<PathBuf>,
    pub needles_info: Option<PathBuf>,
    pub depth_analysis: bool,
    /// Overrides the configured bucket count.
    pub num_buckets: Option<usize>,
    pub n_pages: Option<u32>,
    pub document: Option<String>,
}

impl EvaluationInputs {
    fn inputs(&self) -> impl Iterator<Item = &Path> {
        [Some(&self.transcript), Some(&self.ground_truth)]
            .into_iter()
            .chain([self.alias_file.as_ref(), self.needles_info.as_ref()])
            .flatten()
            .map(PathBuf::as_path)
    }

    /// Reject flag combinations that cannot produce a sound report.
    pub fn validate(&self) -> Result<()> {
        if self.n_pages == Some(0) {
            return Err(EvalError::Configuration(
                "page count must be at least 1".to_string(),
            ));
        }

        if let Some(n) = self.num_buckets {
            check_bucket_count(n)?;
        }

        let outputs = std::iter::once(self.output.as_path()).chain(self.json_output.as_deref());
        for output in outputs {
            if self.inputs().any(|input| input == output) {
                return Err(EvalError::Configuration(format!(
                    "output '{}' would overwrite an input file",
                    output.display()
                )));
            }
        }

        if self.json_output.as_deref() == Some(self.output.as_path()) {
            return Err(EvalError::Configuration(
                "text and JSON reports must go to different files".to_string(),
            ));
        }

        Ok(())
    }
}

/// Load inputs, evaluate, and write the report files.
pub fn run_evaluation(inputs: &EvaluationInputs, config: &Config) -> Result<EvaluationReport> {
    config.validate()?;
    inputs.validate()?;

    let num_buckets = inputs.num_buckets.unwrap_or(config.depth.num_buckets);

    let questions = load_transcript(&inputs.transcript, &config.transcript)?;
    if questions.is_empty() {
        return Err(EvalError::MalformedTranscript {
            file: inputs.transcript.clone(),
            line: 1,
            reason: "transcript contains no '#<N>' question blocks".to_string(),
        });
    }

    let aliases = match &inputs.alias_file {
        Some(path) => AliasTable::load(path, config.aliases.delimiter)?,
        None => AliasTable::default(),
    };

    // Metadata is always validated; only bucketing depends on the flag.
    let store = GroundTruthStore::load(
        &inputs.ground_truth,
        inputs.needles_info.as_deref(),
        DepthScale::from_page_count(inputs.n_pages),
    )?;
    if store.has_needles() && !inputs.depth_analysis {
        debug!("needle metadata loaded but depth analysis is off");
    }

    let mut evaluator = Evaluator::new(&store, &aliases);
    if inputs.depth_analysis {
        evaluator = evaluator.with_depth_analysis(num_buckets);
    }

    let mut report = evaluator.evaluate(questions)?;
    report.document = inputs.document.clone();
    report.n_pages = inputs.n_pages;

    save_reports(
        &report,
        &inputs.output,
        inputs.json_output.as_deref(),
        config.report.precision,
    )?;

    info!(
        document = inputs.document.as_deref().unwrap_or("-"),
        pages = inputs.n_pages.unwrap_or_default(),
        scored = report.scored,
        unscoreable = report.unscoreable,
        accuracy = report.overall_accuracy,
        path = %inputs.output.display(),
        "wrote evaluation report"
    );

    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::persistence::load_json_report;
    use std::fs;
    use tempfile::TempDir;

    const TRANSCRIPT: &str = "#1\nPrompt: What is the boiling point?\nOutput: The answer is 100 degrees Celsius.\n\n#2\nPrompt: Which city?\nOutput: PARIS\n\n#3\nPrompt: Which animal?\nOutput: A small\nred fox.\n";
    const GROUND_TRUTH: &str = "1. \"100\"\n2. \"paris\"\n3. \"wolf\"\n";

    struct Fixture {
        dir: TempDir,
    }

    impl Fixture {
        fn new() -> Self {
            let dir = TempDir::new().unwrap();
            fs::write(dir.path().join("pred.txt"), TRANSCRIPT).unwrap();
            fs::write(dir.path().join("gt.txt"), GROUND_TRUTH).unwrap();
            Self { dir }
        }

        fn path(&self, name: &str) -> PathBuf {
            self.dir.path().join(name)
        }

        fn write(&self, name: &str, content: &str) -> PathBuf {
            let path = self.path(name);
            fs::write(&path, content).unwrap();
            path
        }

        fn inputs(&self) -> EvaluationInputs {
            EvaluationInputs {
                transcript: self.path("pred.txt"),
                ground_truth: self.path("gt.txt"),
                output: self.path("out/results_scores.txt"),
                ..Default::default()
            }
        }

        fn output(&self) -> String {
            fs::read_to_string(self.path("out/results_scores.txt")).unwrap()
        }
    }

    #[test]
    fn test_overall_accuracy_without_depth_metadata() {
        let fx = Fixture::new();
        let report = run_evaluation(&fx.inputs(), &Config::default()).unwrap();

        assert_eq!(report.scored, 3);
        assert!(report.buckets.is_none());

        let text = fx.output();
        assert_eq!(text.split_whitespace().last(), Some("0.6666666667"));
        assert!(!text.contains("Depth Analysis"));
        assert!(text.starts_with("1. What is the boiling point? 1\n2. Which city? 1\n3. Which animal? 0\n"));
    }

    #[test]
    fn test_depth_buckets_from_metadata() {
        let fx = Fixture::new();
        let needles = fx.write("needles.csv", "1,0.1\n2,0.3\n3,0.9\n");
        let inputs = EvaluationInputs {
            needles_info: Some(needles),
            depth_analysis: true,
            num_buckets: Some(2),
            ..fx.inputs()
        };

        let report = run_evaluation(&inputs, &Config::default()).unwrap();
        let buckets = report.buckets.as_ref().unwrap();
        assert_eq!((buckets[0].count, buckets[0].accuracy), (2, Some(1.0)));
        assert_eq!((buckets[1].count, buckets[1].accuracy), (1, Some(0.0)));

        let text = fx.output();
        assert!(text.contains(
            "\nDepth Analysis\n0-50% accuracy: 1.0000000000 (2)\n50-100% accuracy: 0.0000000000 (1)\n"
        ));
        assert!(text.ends_with("\nAverage accuracy: 0.6666666667\n"));
    }

    #[test]
    fn test_page_positions_use_page_count() {
        let fx = Fixture::new();
        let needles = fx.write("needles.csv", "index,page,type\n1,1,text\n2,10,multimodal\n3,20,text\n");
        let inputs = EvaluationInputs {
            needles_info: Some(needles),
            depth_analysis: true,
            num_buckets: Some(2),
            n_pages: Some(20),
            document: Some("Acme".to_string()),
            json_output: Some(fx.path("out/report.json")),
            ..fx.inputs()
        };

        let report = run_evaluation(&inputs, &Config::default()).unwrap();
        let buckets = report.buckets.as_ref().unwrap();
        assert_eq!(buckets[0].count, 2);
        assert_eq!(buckets[1].count, 1);

        let saved = load_json_report(&fx.path("out/report.json")).unwrap();
        assert_eq!(saved.buckets, report.buckets);
        assert_eq!(saved.questions, report.questions);
        assert!((saved.overall_accuracy - report.overall_accuracy).abs() < 1e-12);
        assert_eq!(saved.document.as_deref(), Some("Acme"));
        assert_eq!(saved.n_pages, Some(20));
    }

    #[test]
    fn test_missing_answer_label_writes_nothing() {
        let fx = Fixture::new();
        fx.write(
            "pred.txt",
            "#1\nPrompt: a\nOutput: b\n\n#2\nPrompt: c\n\n#3\nPrompt: d\nOutput: e\n",
        );

        let err = run_evaluation(&fx.inputs(), &Config::default()).unwrap_err();
        assert!(matches!(err, EvalError::MalformedTranscript { .. }));
        assert!(!fx.path("out/results_scores.txt").exists());
    }

    #[test]
    fn test_unscoreable_questions_are_excluded() {
        let fx = Fixture::new();
        fx.write("gt.txt", "1. \"100\"\n3. \"fox\"\n");

        let report = run_evaluation(&fx.inputs(), &Config::default()).unwrap();
        assert_eq!(report.scored, 2);
        assert_eq!(report.unscoreable, 1);
        assert_eq!(report.overall_accuracy, 1.0);

        let text = fx.output();
        assert!(text.contains("2. Which city? unscoreable\n"));
        assert!(text.ends_with("Average accuracy: 1.0000000000\n"));
    }

    #[test]
    fn test_all_unscoreable_is_an_error() {
        let fx = Fixture::new();
        fx.write("gt.txt", "7. \"x\"\n");

        let err = run_evaluation(&fx.inputs(), &Config::default()).unwrap_err();
        assert!(matches!(err, EvalError::GroundTruthLoad { line: None, .. }));
        assert!(!fx.path("out/results_scores.txt").exists());
    }

    #[test]
    fn test_aliases_rescue_paraphrase() {
        let fx = Fixture::new();
        let aliases = fx.write("aliases.txt", "\"wolf\" \"red fox\"\n");
        let inputs = EvaluationInputs {
            alias_file: Some(aliases),
            ..fx.inputs()
        };

        let report = run_evaluation(&inputs, &Config::default()).unwrap();
        assert_eq!(report.overall_accuracy, 1.0);
    }

    #[test]
    fn test_bad_alias_file_aborts() {
        let fx = Fixture::new();
        let aliases = fx.write("aliases.txt", "\"unterminated\n");
        let inputs = EvaluationInputs {
            alias_file: Some(aliases),
            ..fx.inputs()
        };

        let err = run_evaluation(&inputs, &Config::default()).unwrap_err();
        assert!(matches!(err, EvalError::AliasLoad { .. }));
        assert!(!fx.path("out/results_scores.txt").exists());
    }

    #[test]
    fn test_position_buckets_without_metadata() {
        let fx = Fixture::new();
        let inputs = EvaluationInputs {
            depth_analysis: true,
            num_buckets: Some(3),
            ..fx.inputs()
        };

        let report = run_evaluation(&inputs, &Config::default()).unwrap();
        let counts: Vec<usize> = report.buckets.unwrap().iter().map(|b| b.count).collect();
        assert_eq!(counts, vec![1, 1, 1]);
    }

    #[test]
    fn test_metadata_checked_without_depth_analysis() {
        let fx = Fixture::new();
        let needles = fx.write("needles.csv", "not,a,valid,file\n1,oops\n");
        let inputs = EvaluationInputs {
            needles_info: Some(needles),
            ..fx.inputs()
        };

        let err = run_evaluation(&inputs, &Config::default()).unwrap_err();
        assert!(matches!(err, EvalError::GroundTruthLoad { line: Some(2), .. }));
        assert!(!fx.path("out/results_scores.txt").exists());
    }

    #[test]
    fn test_valid_metadata_without_depth_analysis_skips_buckets() {
        let fx = Fixture::new();
        let needles = fx.write("needles.csv", "1,0.1\n2,0.3\n3,0.9\n");
        let inputs = EvaluationInputs {
            needles_info: Some(needles),
            ..fx.inputs()
        };

        let report = run_evaluation(&inputs, &Config::default()).unwrap();
        assert!(report.buckets.is_none());
        assert!(!fx.output().contains("Depth Analysis"));
    }

    #[test]
    fn test_failed_json_write_leaves_no_text_report() {
        let fx = Fixture::new();
        let inputs = EvaluationInputs {
            json_output: Some(fx.path("gt.txt/report.json")),
            ..fx.inputs()
        };

        assert!(run_evaluation(&inputs, &Config::default()).is_err());
        assert!(!fx.path("out/results_scores.txt").exists());
        assert_eq!(fs::read_to_string(fx.path("gt.txt")).unwrap(), GROUND_TRUTH);
    }

    #[test]
    fn test_oversized_bucket_count_is_configuration_error() {
        let fx = Fixture::new();
        let inputs = EvaluationInputs {
            depth_analysis: true,
            num_buckets: Some(usize::MAX),
            ..fx.inputs()
        };

        let err = run_evaluation(&inputs, &Config::default()).unwrap_err();
        assert!(matches!(err, EvalError::Configuration(_)));
        assert!(!fx.path("out/results_scores.txt").exists());

        let mut config = Config::default();
        config.depth.num_buckets = MAX_BUCKETS + 1;
        let inputs = EvaluationInputs {
            depth_analysis: true,
            ..fx.inputs()
        };
        assert!(matches!(
            run_evaluation(&inputs, &config),
            Err(EvalError::Configuration(_))
        ));

        let inputs = EvaluationInputs {
            num_buckets: Some(MAX_BUCKETS),
            depth_analysis: true,
            ..fx.inputs()
        };
        assert!(run_evaluation(&inputs, &Config::default()).is_ok());
    }

    #[test]
    fn test_evaluator_rejects_bad_bucket_counts() {
        let store = GroundTruthStore::from_answers_text("\"a\"\n", Path::new("gt.txt")).unwrap();
        let aliases = AliasTable::default();
        let questions = vec![QuestionRecord {
            index: 1,
            prompt: String::new(),
            predicted_answer: "a".to_string(),
        }];

        for n in [0, MAX_BUCKETS + 1] {
            let result = Evaluator::new(&store, &aliases)
                .with_depth_analysis(n)
                .evaluate(questions.clone());
            assert!(matches!(result, Err(EvalError::Configuration(_))));
        }
    }

    #[test]
    fn test_idempotent_output() {
        let fx = Fixture::new();
        let needles = fx.write("needles.csv", "3,0.95\n1,0.05\n2,0.55\n");
        let inputs = EvaluationInputs {
            needles_info: Some(needles),
            depth_analysis: true,
            ..fx.inputs()
        };

        run_evaluation(&inputs, &Config::default()).unwrap();
        let first = fs::read(fx.path("out/results_scores.txt")).unwrap();
        run_evaluation(&inputs, &Config::default()).unwrap();
        let second = fs::read(fx.path("out/results_scores.txt")).unwrap();

        assert_eq!(first, second);
    }

    #[test]
    fn test_conflicting_flags() {
        let fx = Fixture::new();

        let overwrite = EvaluationInputs {
            output: fx.path("gt.txt"),
            ..fx.inputs()
        };
        assert!(matches!(
            run_evaluation(&overwrite, &Config::default()),
            Err(EvalError::Configuration(_))
        ));

        let zero_pages = EvaluationInputs {
            n_pages: Some(0),
            ..fx.inputs()
        };
        assert!(zero_pages.validate().is_err());

        let zero_buckets = EvaluationInputs {
            depth_analysis: true,
            num_buckets: Some(0),
            ..fx.inputs()
        };
        assert!(zero_buckets.validate().is_err());

        let same_outputs = EvaluationInputs {
            json_output: Some(fx.path("out/results_scores.txt")),
            ..fx.inputs()
        };
        assert!(same_outputs.validate().is_err());

        assert_eq!(fs::read_to_string(fx.path("gt.txt")).unwrap(), GROUND_TRUTH);
    }

    #[test]
    fn test_evaluator_sorts_by_index() {
        let store = GroundTruthStore::from_answers_text("\"a\"\n\"b\"\n", Path::new("gt.txt")).unwrap();
        let aliases = AliasTable::default();
        let questions = vec![
            QuestionRecord {
                index: 2,
                prompt: "second".to_string(),
                predicted_answer: "b".to_string(),
            },
            QuestionRecord {
                index: 1,
                prompt: "first".to_string(),
                predicted_answer: "nope".to_string(),
            },
        ];

        let report = Evaluator::new(&store, &aliases).evaluate(questions).unwrap();
        let order: Vec<u32> = report.questions.iter().map(|q| q.question.index).collect();
        assert_eq!(order, vec![1, 2]);
        assert_eq!(report.overall_accuracy, 0.5);
    }
}
