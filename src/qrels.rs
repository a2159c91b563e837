use std::collections::HashMap;
use std::io::BufRead;
use std::path::Path;

use anyhow::{Context, Result};
use tracing::{debug, warn};

use crate::model::{DocId, QueryId};
use crate::util::open_text_reader;

/// Relevance grades keyed by (query id, document id).
#[derive(Debug, Clone, Default)]
pub struct RelevanceLabels {
    labels: HashMap<(QueryId, DocId), i64>,
}

impl RelevanceLabels {
    pub fn label(&self, query_id: &str, doc_id: &str) -> i64 {
        self.labels
            .get(&(query_id.to_string(), doc_id.to_string()))
            .copied()
            .unwrap_or(0)
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn insert(&mut self, query_id: QueryId, doc_id: DocId, relevance: i64) {
        self.labels.insert((query_id, doc_id), relevance);
    }
}

/// Parses `<qid> <iteration> <docid> <relevance>` lines; malformed lines are skipped.
pub fn parse_qrel_line(line: &str) -> Option<(QueryId, DocId, i64)> {
    let parts: Vec<&str> = line.split_whitespace().collect();
    if parts.len() < 4 {
        return None;
    }
    let relevance = parts[3].parse::<i64>().ok()?;
    Some((parts[0].to_string(), parts[2].to_string(), relevance))
}

pub fn read_qrel(path: &Path) -> Result<RelevanceLabels> {
    let reader = open_text_reader(path)?;
    let mut labels = RelevanceLabels::default();

    for line in reader.lines() {
        let line = line.with_context(|| format!("failed to read {}", path.display()))?;
        match parse_qrel_line(&line) {
            Some((query_id, doc_id, relevance)) => labels.insert(query_id, doc_id, relevance),
            None => warn!(line = %line.trim(), "skipping malformed qrel line"),
        }
    }

    debug!(path = %path.display(), labels = labels.len(), "loaded relevance labels");
    Ok(labels)
}

#[cfg(test)]
mod tests {
    use std::fs;

    use tempfile::TempDir;

    use super::*;

    #[test]
    fn read_qrel_keeps_only_well_formed_lines() {
        let dir = TempDir::new().expect("temp dir");
        let path = dir.path().join("qrels.txt");
        fs::write(
            &path,
            "1 0 docA 2\n1 0 docB\n2 0 docC high\n\n2 Q0 docD 0 extra\n",
        )
        .expect("write qrels");

        let labels = read_qrel(&path).expect("qrels should load");
        assert_eq!(labels.len(), 2);
        assert_eq!(labels.label("1", "docA"), 2);
        assert_eq!(labels.label("2", "docD"), 0);
        assert_eq!(labels.label("1", "docB"), 0);
        assert_eq!(labels.label("9", "missing"), 0);
    }

    #[test]
    fn parse_qrel_line_rejects_non_integer_relevance() {
        assert_eq!(
            parse_qrel_line("1 0 docA 2"),
            Some(("1".to_string(), "docA".to_string(), 2))
        );
        assert_eq!(parse_qrel_line("1 0 docA 2.5"), None);
        assert_eq!(parse_qrel_line("1 0 docA"), None);
    }
}
