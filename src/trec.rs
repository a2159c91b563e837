//! Ranked-run files: `<qid> Q0 <docid> <rank> <score> <tag>`.

use std::collections::{BTreeMap, HashSet};
use std::fs::File;
use std::io::{BufRead, BufWriter, Write};
use std::path::Path;

use anyhow::{Context, Result, bail};

use crate::model::{DocId, QueryId};
use crate::util::{ensure_parent_directory, open_text_reader};

pub const FILTERED_TAG: &str = "filtered";

/// Scores per document per query, iterated in ascending id order.
pub type Run = BTreeMap<QueryId, BTreeMap<DocId, f64>>;

pub fn parse_run_line(line: &str) -> Result<(QueryId, DocId, f64)> {
    let fields: Vec<&str> = line.split_whitespace().collect();
    if fields.len() != 6 {
        bail!("expected 6 fields, found {}: {}", fields.len(), line.trim());
    }
    let score = fields[4]
        .parse::<f64>()
        .with_context(|| format!("invalid score: {}", fields[4]))?;
    Ok((fields[0].to_string(), fields[2].to_string(), score))
}

pub fn read_run(path: &Path) -> Result<Run> {
    let reader = open_text_reader(path)?;
    let mut run = Run::new();

    for (index, line) in reader.lines().enumerate() {
        let line = line.with_context(|| format!("failed to read {}", path.display()))?;
        let (query_id, doc_id, score) = parse_run_line(&line)
            .with_context(|| format!("{}:{}", path.display(), index + 1))?;
        run.entry(query_id).or_default().insert(doc_id, score);
    }

    Ok(run)
}

pub fn pair_set(run: &Run) -> HashSet<(QueryId, DocId)> {
    run.iter()
        .flat_map(|(query_id, docs)| {
            docs.keys()
                .map(move |doc_id| (query_id.clone(), doc_id.clone()))
        })
        .collect()
}

/// Renders a score the way it was most likely written: integral values keep a `.0`.
pub fn format_score(score: f64) -> String {
    if score.is_finite() && score.fract() == 0.0 && score.abs() < 1e16 {
        format!("{score:.1}")
    } else {
        score.to_string()
    }
}

pub fn filtered_lines<'a>(
    run: &'a Run,
    allowed: &'a HashSet<(QueryId, DocId)>,
) -> impl Iterator<Item = String> + 'a {
    run.iter().flat_map(move |(query_id, docs)| {
        docs.iter()
            .filter(move |(doc_id, _)| {
                allowed.contains(&(query_id.to_string(), doc_id.to_string()))
            })
            .map(move |(doc_id, score)| {
                format!(
                    "{query_id} Q0 {doc_id} 0 {} {FILTERED_TAG}",
                    format_score(*score)
                )
            })
    })
}

pub fn write_filtered_run(
    run: &Run,
    allowed: &HashSet<(QueryId, DocId)>,
    output_path: &Path,
) -> Result<usize> {
    ensure_parent_directory(output_path)?;
    let file = File::create(output_path)
        .with_context(|| format!("failed to create {}", output_path.display()))?;
    let mut writer = BufWriter::new(file);

    let mut written = 0usize;
    for line in filtered_lines(run, allowed) {
        writeln!(writer, "{line}")
            .with_context(|| format!("failed to write {}", output_path.display()))?;
        written += 1;
    }
    writer
        .flush()
        .with_context(|| format!("failed to flush {}", output_path.display()))?;

    Ok(written)
}
