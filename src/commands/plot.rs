use std::collections::HashMap;
use std::fmt::{self, Write as _};
use std::fs;
use std::io::BufRead;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use tracing::{info, warn};

use crate::cli::PlotArgs;
use crate::util::{ensure_parent_directory, file_stem_string, open_text_reader};

const BEFORE_SUFFIX: &str = ".run";
const AFTER_SUFFIX: &str = "/cv-5fold-run-test.run";
const SERIES_COLORS: &[&str] = &[
    "#1f77b4", "#d62728", "#2ca02c", "#ff7f0e", "#9467bd", "#8c564b",
];

const WIDTH: f64 = 800.0;
const HEIGHT: f64 = 600.0;
const MARGIN_LEFT: f64 = 80.0;
const MARGIN_RIGHT: f64 = 30.0;
const MARGIN_TOP: f64 = 60.0;
const MARGIN_BOTTOM: f64 = 200.0;
const Y_TICKS: usize = 5;

/// Runs present in every summary, ordered by the first summary's value.
#[derive(Debug, Clone, PartialEq)]
pub struct ComparisonTable {
    pub series: Vec<String>,
    pub runs: Vec<String>,
    /// `values[series][run]`
    pub values: Vec<Vec<f64>>,
}

pub fn run(args: PlotArgs) -> Result<()> {
    let suffixes = resolve_suffixes(args.summaries.len(), &args.strip_suffixes)?;
    let labels = resolve_labels(&args.summaries, &args.labels)?;

    let summaries = args
        .summaries
        .iter()
        .zip(&suffixes)
        .map(|(path, suffix)| load_summary(path, suffix))
        .collect::<Result<Vec<_>>>()?;

    let table = align_summaries(labels, &summaries);
    if table.runs.is_empty() {
        warn!("no run appears in every summary, chart will be empty");
    }
    for (index, run) in table.runs.iter().enumerate() {
        let values: Vec<f64> = table.values.iter().map(|series| series[index]).collect();
        info!(run = %run, values = ?values, "aligned run");
    }

    let svg = render_svg(&table).context("failed to render comparison chart")?;
    ensure_parent_directory(&args.output)?;
    fs::write(&args.output, svg)
        .with_context(|| format!("failed to write {}", args.output.display()))?;
    info!(path = %args.output.display(), runs = table.runs.len(), "wrote comparison chart");

    Ok(())
}

fn resolve_suffixes(summary_count: usize, provided: &[String]) -> Result<Vec<String>> {
    if summary_count < 2 {
        bail!("at least two summaries are required, got {summary_count}");
    }
    if provided.is_empty() {
        return Ok((0..summary_count)
            .map(|index| {
                let suffix = if index == 0 { BEFORE_SUFFIX } else { AFTER_SUFFIX };
                suffix.to_string()
            })
            .collect());
    }
    if provided.len() != summary_count {
        bail!(
            "got {} --strip-suffix values for {summary_count} summaries",
            provided.len()
        );
    }
    Ok(provided.to_vec())
}

fn resolve_labels(summaries: &[PathBuf], provided: &[String]) -> Result<Vec<String>> {
    if provided.is_empty() {
        return Ok(summaries
            .iter()
            .enumerate()
            .map(|(index, path)| match index {
                0 => "Before".to_string(),
                1 => "After".to_string(),
                _ => file_stem_string(path),
            })
            .collect());
    }
    if provided.len() != summaries.len() {
        bail!(
            "got {} --label values for {} summaries",
            provided.len(),
            summaries.len()
        );
    }
    Ok(provided.to_vec())
}

/// Parses `<run> <value>` lines; anything else is ignored.
pub fn parse_summary(text: &str, suffix: &str) -> HashMap<String, f64> {
    text.lines()
        .filter_map(|line| {
            let parts: Vec<&str> = line.split_whitespace().collect();
            let [name, value] = parts.as_slice() else {
                return None;
            };
            let value = value.parse::<f64>().ok()?;
            let name = if suffix.is_empty() {
                name.to_string()
            } else {
                name.replace(suffix, "")
            };
            Some((name, value))
        })
        .collect()
}

pub fn load_summary(path: &Path, suffix: &str) -> Result<HashMap<String, f64>> {
    let mut text = String::new();
    for line in open_text_reader(path)?.lines() {
        let line = line.with_context(|| format!("failed to read {}", path.display()))?;
        text.push_str(&line);
        text.push('\n');
    }
    let summary = parse_summary(&text, suffix);
    info!(path = %path.display(), runs = summary.len(), "loaded summary");
    Ok(summary)
}

pub fn align_summaries(
    series: Vec<String>,
    summaries: &[HashMap<String, f64>],
) -> ComparisonTable {
    let Some((first, rest)) = summaries.split_first() else {
        return ComparisonTable {
            series,
            runs: Vec::new(),
            values: Vec::new(),
        };
    };

    let mut runs: Vec<(&String, f64)> = first
        .iter()
        .filter(|(name, _)| rest.iter().all(|summary| summary.contains_key(*name)))
        .map(|(name, value)| (name, *value))
        .collect();
    runs.sort_by(|a, b| a.1.total_cmp(&b.1).then_with(|| a.0.cmp(b.0)));

    let values = summaries
        .iter()
        .map(|summary| runs.iter().map(|(name, _)| summary[*name]).collect())
        .collect();

    ComparisonTable {
        series,
        runs: runs.into_iter().map(|(name, _)| name.clone()).collect(),
        values,
    }
}

fn escape_xml(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

fn axis_max(table: &ComparisonTable) -> f64 {
    let max = table
        .values
        .iter()
        .flatten()
        .copied()
        .fold(0.0_f64, f64::max);
    if max <= 0.0 {
        1.0
    } else {
        (max * 10.0).ceil() / 10.0
    }
}

/// Grouped bar chart: one group per run, one bar per summary.
pub fn render_svg(table: &ComparisonTable) -> Result<String, fmt::Error> {
    let plot_width = WIDTH - MARGIN_LEFT - MARGIN_RIGHT;
    let plot_height = HEIGHT - MARGIN_TOP - MARGIN_BOTTOM;
    let baseline = MARGIN_TOP + plot_height;
    let y_max = axis_max(table);
    let group_width = plot_width / table.runs.len().max(1) as f64;
    let bar_width = group_width * 0.8 / table.series.len().max(1) as f64;

    let mut svg = String::new();
    writeln!(
        svg,
        r#"<svg xmlns="http://www.w3.org/2000/svg" width="{WIDTH}" height="{HEIGHT}" viewBox="0 0 {WIDTH} {HEIGHT}" font-family="sans-serif">"#
    )?;
    writeln!(svg, r#"<rect width="{WIDTH}" height="{HEIGHT}" fill="white"/>"#)?;
    writeln!(
        svg,
        r#"<text x="{}" y="30" text-anchor="middle" font-size="16">NDCG@20 Before and After Reranking</text>"#,
        WIDTH / 2.0
    )?;

    for tick in 0..=Y_TICKS {
        let value = y_max * tick as f64 / Y_TICKS as f64;
        let y = baseline - plot_height * tick as f64 / Y_TICKS as f64;
        writeln!(
            svg,
            r##"<line x1="{MARGIN_LEFT}" y1="{y:.2}" x2="{:.2}" y2="{y:.2}" stroke="#bbbbbb" stroke-dasharray="4 3" stroke-opacity="0.7"/>"##,
            MARGIN_LEFT + plot_width
        )?;
        writeln!(
            svg,
            r#"<text x="{:.2}" y="{:.2}" text-anchor="end" font-size="11">{value:.2}</text>"#,
            MARGIN_LEFT - 6.0,
            y + 4.0
        )?;
    }

    for (series_index, values) in table.values.iter().enumerate() {
        let color = SERIES_COLORS[series_index % SERIES_COLORS.len()];
        for (run_index, value) in values.iter().enumerate() {
            let height = plot_height * (value.max(0.0) / y_max).min(1.0);
            let x = MARGIN_LEFT
                + group_width * run_index as f64
                + group_width * 0.1
                + bar_width * series_index as f64;
            writeln!(
                svg,
                r#"<rect x="{x:.2}" y="{:.2}" width="{bar_width:.2}" height="{height:.2}" fill="{color}"><title>{}: {value}</title></rect>"#,
                baseline - height,
                escape_xml(&table.series[series_index])
            )?;
        }
    }

    for (run_index, run) in table.runs.iter().enumerate() {
        let x = MARGIN_LEFT + group_width * (run_index as f64 + 0.5);
        let y = baseline + 10.0;
        writeln!(
            svg,
            r#"<text x="{x:.2}" y="{y:.2}" text-anchor="end" font-size="10" transform="rotate(-90 {x:.2} {y:.2})">{}</text>"#,
            escape_xml(run)
        )?;
    }

    writeln!(
        svg,
        r#"<line x1="{MARGIN_LEFT}" y1="{baseline}" x2="{}" y2="{baseline}" stroke="black"/>"#,
        MARGIN_LEFT + plot_width
    )?;
    writeln!(
        svg,
        r#"<line x1="{MARGIN_LEFT}" y1="{MARGIN_TOP}" x2="{MARGIN_LEFT}" y2="{baseline}" stroke="black"/>"#
    )?;
    writeln!(
        svg,
        r#"<text x="{:.2}" y="{}" text-anchor="middle" font-size="13">Run</text>"#,
        MARGIN_LEFT + plot_width / 2.0,
        HEIGHT - 10.0
    )?;
    writeln!(
        svg,
        r#"<text x="20" y="{0:.2}" text-anchor="middle" font-size="13" transform="rotate(-90 20 {0:.2})">NDCG@20</text>"#,
        MARGIN_TOP + plot_height / 2.0
    )?;

    for (series_index, label) in table.series.iter().enumerate() {
        let color = SERIES_COLORS[series_index % SERIES_COLORS.len()];
        let y = MARGIN_TOP + 10.0 + 18.0 * series_index as f64;
        let x = MARGIN_LEFT + plot_width - 110.0;
        writeln!(
            svg,
            r#"<rect x="{x:.2}" y="{y:.2}" width="12" height="12" fill="{color}"/><text x="{:.2}" y="{:.2}" font-size="12">{}</text>"#,
            x + 18.0,
            y + 10.0,
            escape_xml(label)
        )?;
    }

    svg.push_str("</svg>\n");
    Ok(svg)
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::fs;
    use std::path::PathBuf;

    use tempfile::TempDir;

    use super::{align_summaries, parse_summary, render_svg, resolve_labels, resolve_suffixes};
    use crate::cli::PlotArgs;

    #[test]
    fn parse_summary_strips_suffix_and_ignores_bad_lines() {
        let text = "bm25.run 0.41\ndense.run 0.52\nbroken\nextra.run 0.1 more\nnan_run.run abc\n";
        let summary = parse_summary(text, ".run");
        assert_eq!(summary.len(), 2);
        assert_eq!(summary["bm25"], 0.41);
        assert_eq!(summary["dense"], 0.52);

        let after = parse_summary("bm25/cv-5fold-run-test.run 0.47\n", "/cv-5fold-run-test.run");
        assert_eq!(after["bm25"], 0.47);
    }

    #[test]
    fn align_summaries_inner_joins_and_orders_by_first_summary() {
        let summary = |entries: &[(&str, f64)]| -> HashMap<String, f64> {
            entries
                .iter()
                .map(|(name, value)| (name.to_string(), *value))
                .collect()
        };
        let before = summary(&[("a", 0.5), ("b", 0.2), ("c", 0.3), ("only_before", 0.1)]);
        let after = summary(&[("a", 0.6), ("b", 0.1), ("c", 0.35), ("only_after", 0.9)]);

        let table = align_summaries(
            vec!["Before".to_string(), "After".to_string()],
            &[before, after],
        );
        assert_eq!(table.runs, vec!["b", "c", "a"]);
        assert_eq!(table.values[0], vec![0.2, 0.3, 0.5]);
        assert_eq!(table.values[1], vec![0.1, 0.35, 0.6]);
    }

    #[test]
    fn mismatched_argument_lists_are_rejected() {
        assert!(resolve_suffixes(1, &[]).is_err());
        assert!(resolve_suffixes(2, &[".run".to_string()]).is_err());
        assert_eq!(
            resolve_suffixes(3, &[]).expect("defaults"),
            vec![".run", "/cv-5fold-run-test.run", "/cv-5fold-run-test.run"]
        );

        let summaries = vec![PathBuf::from("before.txt"), PathBuf::from("after.txt")];
        assert!(resolve_labels(&summaries, &["only one".to_string()]).is_err());
        assert_eq!(
            resolve_labels(&summaries, &[]).expect("defaults"),
            vec!["Before", "After"]
        );
    }

    #[test]
    fn render_svg_draws_one_bar_per_series_and_run() {
        let table = align_summaries(
            vec!["Before".to_string(), "After <x>".to_string()],
            &[
                HashMap::from([("r1".to_string(), 0.2), ("r2".to_string(), 0.4)]),
                HashMap::from([("r1".to_string(), 0.3), ("r2".to_string(), 0.1)]),
            ],
        );
        let svg = render_svg(&table).expect("chart should render");

        assert!(svg.starts_with("<svg"));
        assert!(svg.trim_end().ends_with("</svg>"));
        assert_eq!(svg.matches("<title>").count(), 4);
        assert!(svg.contains("After &lt;x&gt;"));
        assert!(svg.contains("NDCG@20 Before and After Reranking"));
    }

    #[test]
    fn run_writes_chart_file() {
        let dir = TempDir::new().expect("temp dir");
        let before = dir.path().join("before.txt");
        let after = dir.path().join("after.txt");
        fs::write(&before, "bm25.run 0.41\ndense.run 0.52\n").expect("write before");
        fs::write(
            &after,
            "bm25/cv-5fold-run-test.run 0.47\nsplade/cv-5fold-run-test.run 0.6\n",
        )
        .expect("write after");
        let output = dir.path().join("plots").join("ndcg.svg");

        super::run(PlotArgs {
            summaries: vec![before, after],
            strip_suffixes: Vec::new(),
            labels: Vec::new(),
            output: output.clone(),
        })
        .expect("plot should succeed");

        let svg = fs::read_to_string(&output).expect("read chart");
        assert_eq!(svg.matches("<title>").count(), 2);
        assert!(svg.contains(">bm25</text>"));
        assert!(!svg.contains("splade"));
    }
}
