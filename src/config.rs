//! Configuration for needle evaluation.
//!
//! Supports both environment variables and YAML config file.
//! Environment variables take precedence over config file values, and
//! command-line flags take precedence over both.

use crate::depth::MAX_BUCKETS;
use crate::error::{EvalError, Result};
use crate::persistence::DEFAULT_REPORT_FILENAME;
use serde::{Deserialize, Serialize};
use std::env;
use std::path::{Path, PathBuf};

/// Transcript label settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranscriptConfig {
    /// Label opening the prompt line of a block.
    #[serde(default = "default_prompt_label")]
    pub prompt_label: String,

    /// Label opening the model answer line of a block.
    #[serde(default = "default_answer_label")]
    pub answer_label: String,
}

fn default_prompt_label() -> String {
    "Prompt:".to_string()
}

fn default_answer_label() -> String {
    "Output:".to_string()
}

impl Default for TranscriptConfig {
    fn default() -> Self {
        Self {
            prompt_label: default_prompt_label(),
            answer_label: default_answer_label(),
        }
    }
}

/// Alias file settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AliasConfig {
    /// Separator between phrases in unquoted alias lines.
    #[serde(default = "default_delimiter")]
    pub delimiter: char,
}

fn default_delimiter() -> char {
    '|'
}

impl Default for AliasConfig {
    fn default() -> Self {
        Self {
            delimiter: default_delimiter(),
        }
    }
}

/// Depth analysis settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DepthConfig {
    /// Number of equal-width depth buckets.
    #[serde(default = "default_num_buckets")]
    pub num_buckets: usize,
}

fn default_num_buckets() -> usize {
    10
}

impl Default for DepthConfig {
    fn default() -> Self {
        Self {
            num_buckets: default_num_buckets(),
        }
    }
}

/// Report settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportConfig {
    /// Decimal places for accuracies in the text report.
    #[serde(default = "default_precision")]
    pub precision: usize,

    /// File name of per-document reports, used when averaging a results tree.
    #[serde(default = "default_file_name")]
    pub file_name: String,
}

fn default_precision() -> usize {
    10
}

fn default_file_name() -> String {
    DEFAULT_REPORT_FILENAME.to_string()
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self {
            precision: default_precision(),
            file_name: default_file_name(),
        }
    }
}

/// Full application configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub transcript: TranscriptConfig,
    #[serde(default)]
    pub aliases: AliasConfig,
    #[serde(default)]
    pub depth: DepthConfig,
    #[serde(default)]
    pub report: ReportConfig,
}

impl Config {
    /// Load configuration from an optional explicit file and the environment.
    ///
    /// Priority (highest to lowest):
    /// 1. Environment variables (NEEDLE_EVAL_*)
    /// 2. `explicit` config file, else ~/.config/needle-eval/config.yaml
    /// 3. Default values
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        let mut config = match explicit {
            Some(path) => Self::load_from_file(path)?,
            None => match Self::config_file_path() {
                Some(path) if path.exists() => Self::load_from_file(&path)?,
                _ => Config::default(),
            },
        };

        config.apply_env(|key| env::var(key).ok())?;
        Ok(config)
    }

    /// Load configuration from a specific file path.
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| EvalError::io(path, e))?;

        serde_yaml::from_str(&content).map_err(|e| {
            EvalError::Configuration(format!(
                "failed to parse config file '{}': {}",
                path.display(),
                e
            ))
        })
    }

    /// Get the default config file path.
    pub fn config_file_path() -> Option<PathBuf> {
        directories::ProjectDirs::from("", "", "needle-eval")
            .map(|dirs| dirs.config_dir().join("config.yaml"))
    }

    fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<()> {
        if let Some(label) = lookup("NEEDLE_EVAL_PROMPT_LABEL") {
            self.transcript.prompt_label = label;
        }

        if let Some(label) = lookup("NEEDLE_EVAL_ANSWER_LABEL") {
            self.transcript.answer_label = label;
        }

        if let Some(delimiter) = lookup("NEEDLE_EVAL_ALIAS_DELIMITER") {
            let mut chars = delimiter.chars();
            match (chars.next(), chars.next()) {
                (Some(c), None) => self.aliases.delimiter = c,
                _ => {
                    return Err(EvalError::Configuration(format!(
                        "NEEDLE_EVAL_ALIAS_DELIMITER must be a single character, got '{}'",
                        delimiter
                    )));
                }
            }
        }

        if let Some(buckets) = lookup("NEEDLE_EVAL_NUM_BUCKETS") {
            self.depth.num_buckets = buckets.trim().parse().map_err(|_| {
                EvalError::Configuration(format!(
                    "NEEDLE_EVAL_NUM_BUCKETS is not a number: '{}'",
                    buckets
                ))
            })?;
        }

        if let Some(precision) = lookup("NEEDLE_EVAL_PRECISION") {
            self.report.precision = precision.trim().parse().map_err(|_| {
                EvalError::Configuration(format!(
                    "NEEDLE_EVAL_PRECISION is not a number: '{}'",
                    precision
                ))
            })?;
        }

        Ok(())
    }

    /// Validate settings that would otherwise produce a meaningless report.
    pub fn validate(&self) -> Result<()> {
        let prompt = self.transcript.prompt_label.trim();
        let answer = self.transcript.answer_label.trim();

        if prompt.is_empty() || answer.is_empty() {
            return Err(EvalError::Configuration(
                "transcript prompt and answer labels must not be empty".to_string(),
            ));
        }

        if prompt == answer {
            return Err(EvalError::Configuration(format!(
                "transcript prompt and answer labels must differ, both are '{}'",
                prompt
            )));
        }

        if self.aliases.delimiter == '"' || self.aliases.delimiter.is_whitespace() {
            return Err(EvalError::Configuration(format!(
                "alias delimiter {:?} is not allowed",
                self.aliases.delimiter
            )));
        }

        if !(1..=MAX_BUCKETS).contains(&self.depth.num_buckets) {
            return Err(EvalError::Configuration(format!(
                "number of depth buckets must be between 1 and {}, got {}",
                MAX_BUCKETS, self.depth.num_buckets
            )));
        }

        if !(1..=17).contains(&self.report.precision) {
            return Err(EvalError::Configuration(format!(
                "report precision must be between 1 and 17, got {}",
                self.report.precision
            )));
        }

        Ok(())
    }
}
