use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use tracing::{info, warn};

use crate::model::{DocId, Query, QueryId};
use crate::util::ensure_directory;

use super::encode::paragraph_ratings;
use super::schemes::PromptScheme;

pub const KNOWN_CRITERIA: &[&str] = &["exactness", "topicality", "coverage", "contextual_fit"];

const EXPORTABLE_RATINGS: std::ops::RangeInclusive<i64> = 0..=3;

/// Canonical criterion name: lowercase with underscores, so `Contextual Fit`
/// and `contextual_fit` name the same criterion.
pub fn normalize_criterion(raw: &str) -> String {
    raw.trim()
        .split(|character: char| character.is_whitespace() || character == '-')
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join("_")
        .to_lowercase()
}

pub fn resolve_criteria(requested: Option<&str>) -> Result<Vec<&'static str>> {
    let Some(requested) = requested else {
        return Ok(KNOWN_CRITERIA.to_vec());
    };

    let normalized = normalize_criterion(requested);
    match KNOWN_CRITERIA
        .iter()
        .find(|criterion| **criterion == normalized)
    {
        Some(criterion) => Ok(vec![*criterion]),
        None => bail!(
            "unknown criterion '{requested}', expected one of: {}",
            KNOWN_CRITERIA.join(", ")
        ),
    }
}

pub type CriterionRatings = BTreeMap<String, Vec<(QueryId, DocId, i64)>>;

/// Groups every rating of `scheme` by normalized criterion id.
pub fn partition_by_criterion(queries: &[Query], scheme: &PromptScheme) -> CriterionRatings {
    let mut partitioned = CriterionRatings::new();
    for query in queries {
        for paragraph in &query.paragraphs {
            for (criterion, rating) in paragraph_ratings(paragraph, scheme) {
                partitioned
                    .entry(normalize_criterion(&criterion))
                    .or_default()
                    .push((
                        query.query_id.clone(),
                        paragraph.paragraph_id.clone(),
                        rating,
                    ));
            }
        }
    }
    partitioned
}

pub fn criterion_run_line(query_id: &str, doc_id: &str, rating: i64) -> String {
    format!("{query_id} 0 {doc_id} 1 {rating} run")
}

/// Writes `<dir>/<criterion>.run` for each requested criterion and returns the
/// written paths with their line counts.
pub fn export_criterion_runs(
    queries: &[Query],
    scheme: &PromptScheme,
    dir: &Path,
    criteria: &[&str],
) -> Result<Vec<(PathBuf, usize)>> {
    ensure_directory(dir)?;
    let partitioned = partition_by_criterion(queries, scheme);
    let mut written = Vec::with_capacity(criteria.len());

    for criterion in criteria {
        let path = dir.join(format!("{criterion}.run"));
        let file =
            File::create(&path).with_context(|| format!("failed to create {}", path.display()))?;
        let mut writer = BufWriter::new(file);

        let entries = partitioned
            .get(*criterion)
            .map(Vec::as_slice)
            .unwrap_or_default();
        if entries.is_empty() {
            warn!(criterion = %criterion, "no ratings recorded for criterion");
        }

        let mut lines = 0usize;
        for (query_id, doc_id, rating) in entries {
            if !EXPORTABLE_RATINGS.contains(rating) {
                warn!(
                    criterion = %criterion,
                    query_id = %query_id,
                    doc_id = %doc_id,
                    rating = *rating,
                    "dropping out-of-range criterion rating"
                );
                continue;
            }
            writeln!(writer, "{}", criterion_run_line(query_id, doc_id, *rating))
                .with_context(|| format!("failed to write {}", path.display()))?;
            lines += 1;
        }
        writer
            .flush()
            .with_context(|| format!("failed to flush {}", path.display()))?;

        info!(criterion = %criterion, path = %path.display(), lines, "wrote criterion run");
        written.push((path, lines));
    }

    Ok(written)
}
