use std::fs::{self, File, OpenOptions};
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use tempfile::NamedTempFile;
use tracing::info;

use crate::cli::{EvaluateArgs, LabelStyle};
use crate::model::{EvaluatedRun, EvaluationManifest, RunStatus};
use crate::util::{
    discover_files, ensure_parent_directory, now_utc_string, sha256_file, write_json_pretty,
};

use super::clean::{check_input, clean_run, limit_queries};
use super::log::EvalLog;
use super::trec_eval::{extract_metric, metric_tag, run_evaluator};

#[derive(Debug, Clone)]
pub struct EvalOptions {
    pub qrels: PathBuf,
    pub clean: bool,
    pub max_queries: Option<usize>,
    pub max_docs_per_query: Option<usize>,
    pub trec_eval: PathBuf,
    pub metric: String,
    pub output_name: Option<String>,
}

impl EvalOptions {
    pub fn from_args(args: &EvaluateArgs) -> Self {
        Self {
            qrels: args.qrels.clone(),
            clean: !args.no_clean,
            max_queries: args.max_queries,
            max_docs_per_query: args.max_docs_per_query,
            trec_eval: args.trec_eval.clone(),
            metric: args.metric.clone(),
            output_name: args.output_name.clone(),
        }
    }
}

pub fn run(args: EvaluateArgs) -> Result<()> {
    let started_at = now_utc_string();
    let options = EvalOptions::from_args(&args);

    let log = EvalLog::create(&args.log_file)?;
    reset_summary(&args.summary)?;

    log.info(&format!("=== Evaluating {} ===", args.runs_dir.display()))?;
    if !args.runs_dir.exists() {
        log.error(&format!("Directory not found: {}", args.runs_dir.display()))?;
        return Ok(());
    }

    let run_files = discover_files(&args.runs_dir, &args.pattern, true)?;
    info!(runs = run_files.len(), pattern = %args.pattern, "discovered run files");

    let mut runs = Vec::with_capacity(run_files.len());
    for run_file in &run_files {
        let label = run_label(&args.runs_dir, run_file, args.label_style);
        let outcome = evaluate_run(run_file, &options, &log);

        let record = match outcome {
            Ok(metric_value) => {
                append_summary(&args.summary, &label, &metric_value)?;
                EvaluatedRun {
                    label,
                    path: run_file.display().to_string(),
                    sha256: sha256_file(run_file).ok(),
                    status: RunStatus::Evaluated,
                    metric_value: Some(metric_value),
                    failure_reason: None,
                }
            }
            Err(err) => {
                let reason = format!("{err:#}");
                log.error(&format!("Error: {reason}"))?;
                EvaluatedRun {
                    label,
                    path: run_file.display().to_string(),
                    sha256: sha256_file(run_file).ok(),
                    status: RunStatus::Skipped,
                    metric_value: None,
                    failure_reason: Some(reason),
                }
            }
        };
        runs.push(record);
    }

    let evaluated_count = runs
        .iter()
        .filter(|run| run.status == RunStatus::Evaluated)
        .count();
    let skipped_count = runs.len() - evaluated_count;
    log.info(&format!(
        "Evaluated {evaluated_count} runs, skipped {skipped_count}; summary in {}, log in {}",
        args.summary.display(),
        log.path().display()
    ))?;

    if let Some(manifest_path) = &args.manifest_path {
        let manifest = EvaluationManifest {
            manifest_version: 1,
            started_at,
            finished_at: now_utc_string(),
            qrels_path: options.qrels.display().to_string(),
            runs_dir: args.runs_dir.display().to_string(),
            metric: options.metric.clone(),
            cleaned: options.clean,
            max_queries: options.max_queries,
            max_docs_per_query: options.max_docs_per_query,
            evaluated_count,
            skipped_count,
            runs,
        };
        write_json_pretty(manifest_path, &manifest)?;
        info!(path = %manifest_path.display(), "wrote evaluation manifest");
    }

    Ok(())
}

pub fn run_label(runs_dir: &Path, run_file: &Path, style: LabelStyle) -> String {
    match style {
        LabelStyle::FileName => run_file
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| run_file.display().to_string()),
        LabelStyle::RelativePath => run_file
            .strip_prefix(runs_dir)
            .unwrap_or(run_file)
            .display()
            .to_string(),
    }
}

/// Evaluates one run and returns the metric value. Intermediate files are
/// removed when their handles drop, on success and failure alike.
pub fn evaluate_run(run_file: &Path, options: &EvalOptions, log: &EvalLog) -> Result<String> {
    log.info(&format!("Evaluating: {}", run_file.display()))?;

    let cleaned = if options.clean {
        let temp = NamedTempFile::new().context("failed to create temporary cleaned run")?;
        let stats = clean_run(run_file, temp.path(), options.max_docs_per_query, log)?;
        log.info(&format!(
            "Cleaned {}: {} lines kept, {} reconstructed, {} malformed, {} over the per-query cap",
            run_file.display(),
            stats.written,
            stats.reconstructed,
            stats.malformed,
            stats.capped
        ))?;
        Some(temp)
    } else {
        check_input(run_file)?;
        None
    };
    let cleaned_path = cleaned
        .as_ref()
        .map(|temp| temp.path())
        .unwrap_or(run_file);

    let limited = match options.max_queries {
        Some(max_queries) => {
            let temp = NamedTempFile::new().context("failed to create temporary limited run")?;
            let reader = BufReader::new(
                File::open(cleaned_path)
                    .with_context(|| format!("Cannot read {}", cleaned_path.display()))?,
            );
            let written = limit_queries(reader, BufWriter::new(temp.as_file()), max_queries)?;
            if written == 0 {
                bail!("{} is empty after limiting queries", run_file.display());
            }
            Some(temp)
        }
        None => None,
    };
    let eval_path = limited
        .as_ref()
        .map(|temp| temp.path())
        .unwrap_or(cleaned_path);

    let output = run_evaluator(&options.trec_eval, &options.metric, &options.qrels, eval_path)?;
    if !output.stderr.is_empty() {
        log.append_raw(&String::from_utf8_lossy(&output.stderr))?;
    }
    if !output.status.success() {
        bail!(
            "{} failed for {} ({})",
            options.trec_eval.display(),
            run_file.display(),
            output.status
        );
    }

    let stdout = String::from_utf8_lossy(&output.stdout);
    let tag = metric_tag(&options.metric);
    let Some(metric_value) = extract_metric(&stdout, &tag) else {
        bail!(
            "Could not parse {tag} from {} output for {}",
            options.trec_eval.display(),
            run_file.display()
        );
    };

    if let Some(output_name) = &options.output_name {
        let scores_path = run_file
            .parent()
            .unwrap_or_else(|| Path::new("."))
            .join(output_name);
        fs::write(&scores_path, stdout.as_bytes())
            .with_context(|| format!("failed to write {}", scores_path.display()))?;
    }

    Ok(metric_value)
}

fn reset_summary(path: &Path) -> Result<()> {
    ensure_parent_directory(path)?;
    File::create(path).with_context(|| format!("failed to create {}", path.display()))?;
    Ok(())
}

pub fn append_summary(path: &Path, label: &str, metric_value: &str) -> Result<()> {
    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("failed to open {}", path.display()))?;
    writeln!(file, "{label} {metric_value}")
        .with_context(|| format!("failed to write {}", path.display()))
}
