use std::fs::File;
use std::io::{BufRead, BufWriter, Write};
use std::path::Path;

use anyhow::{Context, Result};
use serde_json::Value;
use tracing::{info, warn};

use crate::cli::ConvertJsonlArgs;
use crate::model::RunEntryRecord;
use crate::util::{ensure_parent_directory, open_text_reader};

pub fn run(args: ConvertJsonlArgs) -> Result<()> {
    let written = convert(&args.input, &args.output)?;
    info!(
        input = %args.input.display(),
        output = %args.output.display(),
        records = written,
        "converted rankings"
    );
    Ok(())
}

pub fn convert(input: &Path, output: &Path) -> Result<usize> {
    let reader = open_text_reader(input)?;

    ensure_parent_directory(output)?;
    let file =
        File::create(output).with_context(|| format!("failed to create {}", output.display()))?;
    let mut writer = BufWriter::new(file);
    let mut written = 0usize;

    for (index, line) in reader.lines().enumerate() {
        let line_number = index + 1;
        let line = line.with_context(|| format!("failed to read {}", input.display()))?;
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        for record in records_from_line(line, line_number) {
            let encoded = serde_json::to_string(&record)
                .with_context(|| format!("failed to encode record from line {line_number}"))?;
            writeln!(writer, "{encoded}")
                .with_context(|| format!("failed to write {}", output.display()))?;
            written += 1;
        }
    }

    writer
        .flush()
        .with_context(|| format!("failed to flush {}", output.display()))?;
    Ok(written)
}

/// Flattens one `[query_id, [paragraph, ...]]` line; malformed parts are
/// skipped with a warning naming the line.
pub fn records_from_line(line: &str, line_number: usize) -> Vec<RunEntryRecord> {
    let query_data: Value = match serde_json::from_str(line) {
        Ok(value) => value,
        Err(err) => {
            warn!(line = line_number, error = %err, "skipping line with invalid JSON");
            return Vec::new();
        }
    };

    let Some(items) = query_data.as_array().filter(|items| items.len() == 2) else {
        warn!(line = line_number, "unexpected record shape, skipping");
        return Vec::new();
    };
    let (query_id, paragraphs) = (&items[0], &items[1]);

    let mut records = Vec::new();
    for paragraph in paragraphs.as_array().map(Vec::as_slice).unwrap_or_default() {
        let Some(paragraph_id) = paragraph.get("paragraph_id") else {
            warn!(line = line_number, key = "paragraph_id", "paragraph missing key");
            continue;
        };
        let Some(rankings) = paragraph
            .get("paragraph_data")
            .and_then(|data| data.get("rankings"))
        else {
            warn!(line = line_number, key = "paragraph_data.rankings", "paragraph missing key");
            continue;
        };

        for ranking in rankings.as_array().map(Vec::as_slice).unwrap_or_default() {
            let (Some(rank), Some(score), Some(method)) = (
                ranking.get("rank"),
                ranking.get("score"),
                ranking.get("method"),
            ) else {
                warn!(line = line_number, "ranking missing rank, score or method");
                continue;
            };

            records.push(RunEntryRecord {
                query_id: query_id.clone(),
                document_id: paragraph_id.clone(),
                rank: rank.clone(),
                score: score.clone(),
                method: method.clone(),
            });
        }
    }

    records
}

#[cfg(test)]
mod tests {
    use std::fs;

    use serde_json::json;
    use tempfile::TempDir;

    use super::{convert, records_from_line};

    #[test]
    fn records_from_line_flattens_paragraph_rankings() {
        let line = r#"["q1", [
            {"paragraph_id": "p1", "paragraph_data": {"judgments": [], "rankings": [
                {"method": "bm25", "paragraph_id": "p1", "rank": 1, "score": 12.5},
                {"method": "dense", "rank": 4, "score": 0.3}
            ]}},
            {"paragraph_id": "p2", "paragraph_data": {"rankings": [{"method": "bm25", "rank": 2}]}},
            {"paragraph_data": {"rankings": []}}
        ]]"#;

        let records = records_from_line(line, 1);
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].query_id, json!("q1"));
        assert_eq!(records[0].document_id, json!("p1"));
        assert_eq!(records[1].method, json!("dense"));
        assert_eq!(records[1].score, json!(0.3));
    }

    #[test]
    fn records_from_line_rejects_wrong_shapes() {
        assert!(records_from_line("{not json", 1).is_empty());
        assert!(records_from_line(r#"{"query": "q1"}"#, 2).is_empty());
        assert!(records_from_line(r#"["q1", [], "extra"]"#, 3).is_empty());
    }

    #[test]
    fn convert_writes_one_json_object_per_ranking() {
        let dir = TempDir::new().expect("temp dir");
        let input = dir.path().join("judgments.jsonl");
        let output = dir.path().join("out").join("runs.jsonl");
        fs::write(
            &input,
            concat!(
                r#"["q1", [{"paragraph_id": "p1", "paragraph_data": {"rankings": [{"method": "m", "rank": 1, "score": 2.0}]}}]]"#,
                "\n\n",
                "garbage\n",
                r#"["q2", [{"paragraph_id": "p9", "paragraph_data": {"rankings": [{"method": "m", "rank": 3, "score": 1.5}]}}]]"#,
                "\n"
            ),
        )
        .expect("write input");

        let written = convert(&input, &output).expect("convert should succeed");
        assert_eq!(written, 2);

        let contents = fs::read_to_string(&output).expect("read output");
        let first: serde_json::Value =
            serde_json::from_str(contents.lines().next().expect("first line")).expect("json");
        assert_eq!(
            first,
            json!({"query_id": "q1", "document_id": "p1", "rank": 1, "score": 2.0, "method": "m"})
        );
    }
}
