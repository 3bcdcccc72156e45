//! Needle Eval CLI
//!
//! Scores needle-in-a-haystack transcripts and averages the resulting
//! reports across documents.

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use needle_eval::{
    config::Config,
    evaluation::{EvaluationInputs, run_evaluation},
    summary::summarize,
};
use std::fs::File;
use std::io;
use std::path::PathBuf;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

/// Needle Eval - scoring for needle-in-a-haystack document QA
#[derive(Parser)]
#[command(name = "needle-eval")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Config file (defaults to ~/.config/needle-eval/config.yaml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Score one transcript against its ground truth
    Evaluate(EvaluateArgs),

    /// Average reports across documents into a depth by page-count CSV
    Average(AverageArgs),
}

#[derive(Args)]
struct EvaluateArgs {
    /// Model transcript
    #[arg(long = "input-pred")]
    input_pred: PathBuf,

    /// Ground-truth answers
    #[arg(long = "input-groundtruth")]
    input_groundtruth: PathBuf,

    /// Report destination
    #[arg(long = "output-file")]
    output_file: PathBuf,

    /// Alias file of interchangeable answers
    #[arg(long = "alias-file")]
    alias_file: Option<PathBuf>,

    /// Break accuracy down by needle depth
    #[arg(long = "depth-analysis")]
    depth_analysis: bool,

    /// Number of depth buckets
    #[arg(long = "num-buckets")]
    num_buckets: Option<usize>,

    /// Needle metadata CSV (index, position, type)
    #[arg(long = "needles-info-file")]
    needles_info_file: Option<PathBuf>,

    /// Page count of the document; needle positions are then page numbers
    #[arg(long = "n-pages")]
    n_pages: Option<u32>,

    /// Also write the structured report as JSON
    #[arg(long = "json-output")]
    json_output: Option<PathBuf>,

    /// Document label recorded in the JSON report
    #[arg(long)]
    document: Option<String>,
}

#[derive(Args)]
struct AverageArgs {
    /// Results root laid out as <doc>/<doc>_<N>Pages/<report>
    root: PathBuf,

    /// Report file name to look for (defaults to the configured name)
    #[arg(long)]
    report_name: Option<String>,

    /// CSV destination (stdout when omitted)
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Append an Average column across page counts
    #[arg(long)]
    with_average: bool,
}

fn main() {
    init_tracing();

    if let Err(err) = run() {
        error!("{}", diagnostic(&err));
        std::process::exit(1);
    }
}

/// One-line failure message: the error and all of its causes.
fn diagnostic(err: &anyhow::Error) -> String {
    format!("{:#}", err)
}

fn run() -> Result<()> {
    let cli = Cli::parse();

    let config = Config::load(cli.config.as_deref()).context("Failed to load configuration")?;
    config.validate().context("Invalid configuration")?;

    match cli.command {
        Commands::Evaluate(args) => cmd_evaluate(args, &config),
        Commands::Average(args) => cmd_average(args, &config),
    }
}

fn cmd_evaluate(args: EvaluateArgs, config: &Config) -> Result<()> {
    let inputs = EvaluationInputs {
        transcript: args.input_pred,
        ground_truth: args.input_groundtruth,
        output: args.output_file,
        json_output: args.json_output,
        alias_file: args.alias_file,
        needles_info: args.needles_info_file,
        depth_analysis: args.depth_analysis,
        num_buckets: args.num_buckets,
        n_pages: args.n_pages,
        document: args.document,
    };

    run_evaluation(&inputs, config)?;
    Ok(())
}

fn cmd_average(args: AverageArgs, config: &Config) -> Result<()> {
    if !args.root.is_dir() {
        anyhow::bail!("Results root '{}' is not a directory", args.root.display());
    }

    let report_name = args
        .report_name
        .unwrap_or_else(|| config.report.file_name.clone());
    let matrix = summarize(&args.root, &report_name);

    if matrix.page_counts.is_empty() {
        anyhow::bail!(
            "No readable '{}' reports under '{}'",
            report_name,
            args.root.display()
        );
    }

    let precision = config.report.precision;
    match &args.output {
        Some(path) => {
            let file = File::create(path)
                .with_context(|| format!("Failed to create '{}'", path.display()))?;
            matrix
                .write_csv(file, precision, args.with_average)
                .context("Failed to write summary CSV")?;
            info!(path = %path.display(), "wrote summary");
        }
        None => matrix
            .write_csv(io::stdout().lock(), precision, args.with_average)
            .context("Failed to write summary CSV")?,
    }

    Ok(())
}

fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}
