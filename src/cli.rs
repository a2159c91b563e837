use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

#[derive(Parser, Debug)]
#[command(
    name = "ltr-rubric",
    version,
    about = "Learning-to-rank feature extraction and run evaluation tooling for rubric judgments"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Build RankLib feature rows from self-rated judgments.
    BuildFeatures(BuildFeaturesArgs),
    /// Restrict candidate runs to the query/document pairs of a baseline run.
    FilterRuns(FilterRunsArgs),
    /// Filter candidate runs against every baseline run in a directory.
    BatchFilter(BatchFilterArgs),
    /// Flatten paragraph rankings of a judgment file into JSON lines.
    ConvertJsonl(ConvertJsonlArgs),
    /// Evaluate a directory of runs with an external evaluator.
    Evaluate(EvaluateArgs),
    /// Plot two or more evaluation summaries as a grouped bar chart.
    Plot(PlotArgs),
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
pub enum FeatureMode {
    /// Direct grading prompts only.
    None,
    Nuggets,
    Questions,
    #[value(name = "multi-criteria")]
    MultiCriteria,
    /// Nugget, question and direct grading prompts.
    Standard,
    /// Every scheme, concatenated.
    All,
}

impl FeatureMode {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Nuggets => "nuggets",
            Self::Questions => "questions",
            Self::MultiCriteria => "multi-criteria",
            Self::Standard => "standard",
            Self::All => "all",
        }
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
pub enum MissingRatings {
    /// Emit the scheme's full slice as zero padding.
    ZeroFill,
    /// Leave the scheme out of the row.
    Skip,
}

#[derive(Args, Debug, Clone)]
pub struct BuildFeaturesArgs {
    /// Judgment file (JSONL, optionally gzipped).
    #[arg(long, short = 'j')]
    pub judgments: PathBuf,

    /// Relevance judgment file used to label rows.
    #[arg(long, short = 'q')]
    pub qrel: PathBuf,

    /// Output RankLib feature file.
    #[arg(long, short = 'o')]
    pub output: PathBuf,

    #[arg(long, value_enum, default_value_t = FeatureMode::Standard)]
    pub mode: FeatureMode,

    /// Emit integer encodings only.
    #[arg(long, default_value_t = false)]
    pub no_one_hot: bool,

    #[arg(long, value_enum, default_value_t = MissingRatings::ZeroFill)]
    pub missing_ratings: MissingRatings,

    #[arg(long)]
    pub max_queries: Option<usize>,

    #[arg(long)]
    pub max_paragraphs: Option<usize>,

    /// Directory for per-criterion run files (multi-criteria mode only).
    #[arg(long)]
    pub criteria_dir: Option<PathBuf>,

    /// Export only this criterion.
    #[arg(long)]
    pub criterion: Option<String>,
}

#[derive(Args, Debug, Clone)]
pub struct FilterRunsArgs {
    #[arg(long)]
    pub base_run: PathBuf,

    #[arg(long, num_args = 1.., required = true)]
    pub feature_runs: Vec<PathBuf>,

    #[arg(long)]
    pub output_dir: PathBuf,
}

#[derive(Args, Debug, Clone)]
pub struct BatchFilterArgs {
    /// Directory of baseline runs.
    #[arg(long)]
    pub base_run_dir: PathBuf,

    /// Directory of candidate feature runs.
    #[arg(long)]
    pub feature_dir: PathBuf,

    /// Defaults to `<feature-dir>/filtered`.
    #[arg(long)]
    pub output_root: Option<PathBuf>,

    #[arg(long, default_value = "*.run")]
    pub pattern: String,
}

#[derive(Args, Debug, Clone)]
pub struct ConvertJsonlArgs {
    #[arg(long)]
    pub input: PathBuf,

    #[arg(long)]
    pub output: PathBuf,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
pub enum LabelStyle {
    FileName,
    RelativePath,
}

#[derive(Args, Debug, Clone)]
pub struct EvaluateArgs {
    #[arg(long)]
    pub qrels: PathBuf,

    /// Directory searched recursively for run files.
    #[arg(long)]
    pub runs_dir: PathBuf,

    #[arg(long, default_value = "*.run")]
    pub pattern: String,

    #[arg(long, default_value = "ndcg_summary.txt")]
    pub summary: PathBuf,

    #[arg(long, default_value = "ndcg_evaluation.log")]
    pub log_file: PathBuf,

    /// Evaluate run files as they are, without the repair pass.
    #[arg(long, default_value_t = false)]
    pub no_clean: bool,

    #[arg(long, value_enum, default_value_t = LabelStyle::FileName)]
    pub label_style: LabelStyle,

    /// Write the evaluator's raw output under this name next to each run.
    #[arg(long)]
    pub output_name: Option<String>,

    #[arg(long)]
    pub max_queries: Option<usize>,

    #[arg(long)]
    pub max_docs_per_query: Option<usize>,

    #[arg(long, default_value = "trec_eval")]
    pub trec_eval: PathBuf,

    #[arg(long, default_value = "ndcg_cut.20")]
    pub metric: String,

    #[arg(long)]
    pub manifest_path: Option<PathBuf>,
}

#[derive(Args, Debug, Clone)]
pub struct PlotArgs {
    /// Summary file; the first one orders the chart.
    #[arg(long = "summary", required = true)]
    pub summaries: Vec<PathBuf>,

    /// Suffix stripped from run names, one per summary.
    #[arg(long = "strip-suffix")]
    pub strip_suffixes: Vec<String>,

    /// Legend label, one per summary.
    #[arg(long = "label")]
    pub labels: Vec<String>,

    #[arg(long, short = 'o')]
    pub output: PathBuf,
}
