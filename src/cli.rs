use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(
    name = "cellscore",
    version,
    about = "Recall scoring for vision-model stem cell line curation"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Score one ground-truth/model-output document pair
    Score(ScoreArgs),
    /// Score every model over a results directory and write the report manifest
    Batch(BatchArgs),
    /// Render a batch report manifest as markdown
    Report(ReportArgs),
    /// Compare exact vs age-range-aware recall for one field
    AgeAudit(AgeAuditArgs),
}

#[derive(Args, Debug, Clone)]
pub struct ScoreArgs {
    #[arg(long)]
    pub gt_path: PathBuf,

    #[arg(long)]
    pub model_path: PathBuf,

    #[arg(long, default_value_t = false)]
    pub json: bool,

    /// Print a per-field match/miss line for every compared pair
    #[arg(long, default_value_t = false)]
    pub show_fields: bool,

    /// Use age-range equivalence for donor.age instead of exact matching
    #[arg(long, default_value_t = false)]
    pub semantic_age: bool,
}

#[derive(Args, Debug, Clone)]
pub struct BatchArgs {
    /// Directory holding ground_truth/ and model_output/<model>/
    #[arg(long)]
    pub results_dir: PathBuf,

    /// Defaults to <results-dir>/field_recall_results.json
    #[arg(long)]
    pub report_path: Option<PathBuf>,

    #[arg(long, default_value_t = false)]
    pub semantic_age: bool,
}

#[derive(Args, Debug, Clone)]
pub struct ReportArgs {
    /// Manifest written by the batch subcommand
    #[arg(long)]
    pub results_path: PathBuf,

    /// Defaults to field_recall_report.md next to the manifest
    #[arg(long)]
    pub output_path: Option<PathBuf>,

    #[arg(long, default_value_t = 0.8)]
    pub high_threshold: f64,

    #[arg(long, default_value_t = 0.2)]
    pub low_threshold: f64,
}

#[derive(Args, Debug, Clone)]
pub struct AgeAuditArgs {
    /// Directory holding ground_truth/ and model_output/<model>/
    #[arg(long)]
    pub results_dir: PathBuf,

    #[arg(long, default_value = "donor.age")]
    pub field_path: String,

    /// When set, the audit is also written as a JSON report
    #[arg(long)]
    pub report_path: Option<PathBuf>,
}
