use std::collections::HashSet;
use std::fs::{self, File};
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::Path;

use anyhow::{Context, Result, bail};

use super::log::EvalLog;

const DEFAULT_RANK: &str = "1000";
const DEFAULT_SCORE: &str = "0.0";
const DEFAULT_TAG: &str = "AUTO";
const PREVIEW_LINES: usize = 5;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CleanStats {
    pub written: usize,
    pub reconstructed: usize,
    pub malformed: usize,
    pub capped: usize,
}

fn is_digits(value: &str) -> bool {
    !value.is_empty() && value.chars().all(|character| character.is_ascii_digit())
}

fn is_number(value: &str) -> bool {
    value.parse::<f64>().is_ok()
}

/// Returns the query id and the six-field line, or `None` when fewer than
/// three fields are present. Lines that are already well formed pass through.
pub fn repair_line(line: &str) -> Option<(&str, String, bool)> {
    let fields: Vec<&str> = line.split_whitespace().collect();
    if fields.len() < 3 {
        return None;
    }

    let query_id = fields[0];
    if fields.len() == 6 && is_digits(fields[3]) && is_number(fields[4]) {
        return Some((query_id, line.trim().to_string(), false));
    }

    let rank = fields
        .get(3)
        .copied()
        .filter(|rank| is_digits(rank))
        .unwrap_or(DEFAULT_RANK);
    let score = fields
        .get(4)
        .copied()
        .filter(|score| is_number(score))
        .unwrap_or(DEFAULT_SCORE);
    let tag = fields.get(5).copied().unwrap_or(DEFAULT_TAG);

    Some((
        query_id,
        format!("{query_id} Q0 {} {rank} {score} {tag}", fields[2]),
        true,
    ))
}

/// Repairs every line of `reader` into `writer`, keeping at most
/// `max_docs_per_query` consecutive lines per query id.
pub fn clean_lines<R: BufRead, W: Write>(
    reader: R,
    mut writer: W,
    max_docs_per_query: Option<usize>,
    source: &str,
    log: &EvalLog,
) -> Result<CleanStats> {
    let mut stats = CleanStats::default();
    let mut previous_query: Option<String> = None;
    let mut doc_count = 0usize;

    for (index, line) in reader.lines().enumerate() {
        let line_number = index + 1;
        let line = line.with_context(|| format!("failed to read {source}"))?;
        let trimmed = line.trim();
        if trimmed.is_empty() {
            log.info(&format!("Skipping empty line {line_number} in {source}"))?;
            continue;
        }

        let Some((query_id, repaired, reconstructed)) = repair_line(trimmed) else {
            stats.malformed += 1;
            log.error(&format!("Malformed line {line_number} in {source}: {trimmed}"))?;
            continue;
        };

        if previous_query.as_deref() != Some(query_id) {
            doc_count = 0;
            previous_query = Some(query_id.to_string());
        }

        if max_docs_per_query.is_some_and(|max| doc_count >= max) {
            stats.capped += 1;
            continue;
        }

        writeln!(writer, "{repaired}").context("failed to write cleaned run")?;
        doc_count += 1;
        stats.written += 1;
        if reconstructed {
            stats.reconstructed += 1;
        }
    }

    writer.flush().context("failed to flush cleaned run")?;
    Ok(stats)
}

/// Fails when `path` is not a readable, non-empty file.
pub fn check_input(path: &Path) -> Result<()> {
    let metadata = match fs::metadata(path) {
        Ok(metadata) if metadata.is_file() => metadata,
        _ => bail!("Cannot read {}", path.display()),
    };
    File::open(path).with_context(|| format!("Cannot read {}", path.display()))?;
    if metadata.len() == 0 {
        bail!("File {} is empty", path.display());
    }
    Ok(())
}

pub fn clean_run(
    input: &Path,
    output: &Path,
    max_docs_per_query: Option<usize>,
    log: &EvalLog,
) -> Result<CleanStats> {
    check_input(input)?;
    log_preview(input, log)?;

    let reader = BufReader::new(
        File::open(input).with_context(|| format!("Cannot read {}", input.display()))?,
    );
    let writer = BufWriter::new(
        File::create(output).with_context(|| format!("failed to create {}", output.display()))?,
    );
    let stats = clean_lines(
        reader,
        writer,
        max_docs_per_query,
        &input.display().to_string(),
        log,
    )
    .with_context(|| format!("Error processing {}", input.display()))?;

    if stats.written == 0 {
        bail!("Cleaned output of {} is empty", input.display());
    }
    Ok(stats)
}

fn log_preview(input: &Path, log: &EvalLog) -> Result<()> {
    let reader = BufReader::new(
        File::open(input).with_context(|| format!("Cannot read {}", input.display()))?,
    );
    let mut preview = format!("First {PREVIEW_LINES} lines of {}:\n", input.display());
    for line in reader.lines().take(PREVIEW_LINES) {
        let line = line.with_context(|| format!("Cannot read {}", input.display()))?;
        preview.push_str(&line);
        preview.push('\n');
    }
    preview.push_str(&"-".repeat(24));
    preview.push('\n');
    log.append_raw(&preview)
}

/// Keeps lines whose query id is among the first `max_queries` distinct ids
/// seen; later lines of admitted ids still pass.
pub fn limit_queries<R: BufRead, W: Write>(
    reader: R,
    mut writer: W,
    max_queries: usize,
) -> Result<usize> {
    let mut admitted: HashSet<String> = HashSet::new();
    let mut written = 0usize;

    for line in reader.lines() {
        let line = line.context("failed to read run for query limiting")?;
        let Some(query_id) = line.split_whitespace().next() else {
            continue;
        };

        if !admitted.contains(query_id) {
            if admitted.len() >= max_queries {
                continue;
            }
            admitted.insert(query_id.to_string());
        }

        writeln!(writer, "{line}").context("failed to write limited run")?;
        written += 1;
    }

    writer.flush().context("failed to flush limited run")?;
    Ok(written)
}
