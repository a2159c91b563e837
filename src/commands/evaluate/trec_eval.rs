use std::path::Path;
use std::process::{Command, Output};

use anyhow::{Context, Result};

/// `ndcg_cut.20` is requested as a measure but reported as `ndcg_cut_20`.
pub fn metric_tag(metric: &str) -> String {
    metric.replace('.', "_")
}

/// Third whitespace-separated field of the first output line mentioning `tag`.
pub fn extract_metric(stdout: &str, tag: &str) -> Option<String> {
    stdout
        .lines()
        .filter(|line| line.contains(tag))
        .find_map(|line| line.split_whitespace().nth(2).map(ToOwned::to_owned))
}

pub fn run_evaluator(binary: &Path, metric: &str, qrels: &Path, run: &Path) -> Result<Output> {
    Command::new(binary)
        .arg("-m")
        .arg(metric)
        .arg(qrels)
        .arg(run)
        .output()
        .with_context(|| format!("failed to execute {}", binary.display()))
}
