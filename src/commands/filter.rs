use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tracing::{error, info};

use crate::cli::{BatchFilterArgs, FilterRunsArgs};
use crate::trec::{pair_set, read_run, write_filtered_run};
use crate::util::{discover_files, ensure_directory, file_stem_string};

pub fn run(args: FilterRunsArgs) -> Result<()> {
    let written = filter_runs(&args.base_run, &args.feature_runs, &args.output_dir)?;
    info!(
        base_run = %args.base_run.display(),
        files = written.len(),
        "filtering complete"
    );
    Ok(())
}

/// Writes each candidate run, restricted to the baseline's pairs, into
/// `output_dir` under its original file name.
pub fn filter_runs(
    base_run: &Path,
    feature_runs: &[PathBuf],
    output_dir: &Path,
) -> Result<Vec<PathBuf>> {
    let baseline = read_run(base_run)?;
    let allowed = pair_set(&baseline);
    info!(path = %base_run.display(), pairs = allowed.len(), "loaded baseline run");

    ensure_directory(output_dir)?;
    let mut written = Vec::with_capacity(feature_runs.len());

    for feature_path in feature_runs {
        let candidate = read_run(feature_path)?;
        let file_name = feature_path
            .file_name()
            .with_context(|| format!("run path has no file name: {}", feature_path.display()))?;
        let output_path = output_dir.join(file_name);

        let lines = write_filtered_run(&candidate, &allowed, &output_path)?;
        info!(path = %output_path.display(), lines, "wrote filtered feature run");
        written.push(output_path);
    }

    Ok(written)
}

pub fn run_batch(args: BatchFilterArgs) -> Result<()> {
    let output_root = args
        .output_root
        .clone()
        .unwrap_or_else(|| args.feature_dir.join("filtered"));

    let base_runs = discover_files(&args.base_run_dir, &args.pattern, false)?;
    let feature_runs = discover_files(&args.feature_dir, &args.pattern, false)?;
    info!(
        base_runs = base_runs.len(),
        feature_runs = feature_runs.len(),
        output_root = %output_root.display(),
        "starting batch filter"
    );

    let mut failures = 0usize;
    for base_run in &base_runs {
        let run_name = file_stem_string(base_run);
        info!(run = %run_name, "processing baseline");

        let output_dir = output_root.join(&run_name);
        if let Err(err) = filter_runs(base_run, &feature_runs, &output_dir) {
            failures += 1;
            error!(run = %run_name, error = %format!("{err:#}"), "baseline failed, continuing");
        }
    }

    info!(
        processed = base_runs.len(),
        failed = failures,
        "batch filter complete"
    );
    Ok(())
}
