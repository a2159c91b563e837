//! Loading of query/paragraph judgment files and grade selection.

use std::io::BufRead;
use std::path::Path;

use anyhow::{Context, Result};
use tracing::{info, warn};

use crate::model::{ExamGrade, Paragraph, Query, QueryId, RatingId};
use crate::util::open_text_reader;

/// Selects the exam grades of a paragraph.
#[derive(Debug, Clone, Copy, Default)]
pub struct GradeFilter<'a> {
    pub prompt_class: Option<&'a str>,
    pub self_rated_only: bool,
}

impl<'a> GradeFilter<'a> {
    pub fn self_rated() -> Self {
        Self {
            prompt_class: None,
            self_rated_only: true,
        }
    }

    pub fn prompt_class(prompt_class: &'a str) -> Self {
        Self {
            prompt_class: Some(prompt_class),
            self_rated_only: false,
        }
    }

    pub fn matches(&self, grade: &ExamGrade) -> bool {
        if let Some(expected) = self.prompt_class
            && grade.prompt_class() != Some(expected)
        {
            return false;
        }
        !self.self_rated_only || grade.is_self_rated()
    }
}

pub fn retrieve_grades<'p>(
    paragraph: &'p Paragraph,
    filter: GradeFilter<'_>,
) -> impl Iterator<Item = &'p ExamGrade> {
    paragraph
        .exam_grades()
        .iter()
        .filter(move |grade| filter.matches(grade))
}

/// Flattens the self-ratings of every matching grade, in grade order.
pub fn collect_ratings(paragraph: &Paragraph, filter: GradeFilter<'_>) -> Vec<(RatingId, i64)> {
    retrieve_grades(paragraph, filter)
        .flat_map(|grade| grade.ratings())
        .map(|rating| (rating.id().to_string(), rating.self_rating))
        .collect()
}

pub fn parse_query_line(line: &str) -> Result<Query> {
    let (query_id, paragraphs): (QueryId, Vec<Paragraph>) =
        serde_json::from_str(line).context("expected [query_id, [paragraph, ...]]")?;
    Ok(Query {
        query_id,
        paragraphs,
    })
}

/// Reads a JSONL (or JSONL.gz) judgment file. Malformed lines are skipped.
pub fn load_queries(
    path: &Path,
    max_queries: Option<usize>,
    max_paragraphs: Option<usize>,
) -> Result<Vec<Query>> {
    let reader = open_text_reader(path)?;
    let mut queries = Vec::new();

    for (index, line) in reader.lines().enumerate() {
        if max_queries.is_some_and(|max| queries.len() >= max) {
            break;
        }

        let line = line.with_context(|| format!("failed to read {}", path.display()))?;
        if line.trim().is_empty() {
            continue;
        }

        match parse_query_line(&line) {
            Ok(mut query) => {
                if let Some(max) = max_paragraphs {
                    query.paragraphs.truncate(max);
                }
                queries.push(query);
            }
            Err(err) => {
                warn!(
                    path = %path.display(),
                    line = index + 1,
                    error = %format!("{err:#}"),
                    "skipping malformed judgment line"
                );
            }
        }
    }

    info!(path = %path.display(), queries = queries.len(), "loaded judgments");
    Ok(queries)
}
