use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use anyhow::{Context, Result, bail};
use tracing::{debug, info, trace, warn};

use crate::cli::{BuildFeaturesArgs, FeatureMode, MissingRatings};
use crate::judgments::load_queries;
use crate::model::{Paragraph, Query};
use crate::qrels::{RelevanceLabels, read_qrel};
use crate::util::ensure_parent_directory;

use super::criteria::{export_criterion_runs, resolve_criteria};
use super::encode::{
    FeatureRow, RatingStats, append_scheme_features, paragraph_ratings, scheme_width,
};
use super::schemes::{PromptScheme, SchemeKind, criteria_scheme, schemes_for};

#[derive(Debug, Clone)]
pub struct FeatureConfig {
    pub mode: FeatureMode,
    pub schemes: Vec<&'static PromptScheme>,
    pub one_hot: bool,
    pub missing_ratings: MissingRatings,
}

impl FeatureConfig {
    pub fn new(mode: FeatureMode, one_hot: bool, missing_ratings: MissingRatings) -> Self {
        Self {
            mode,
            schemes: schemes_for(mode),
            one_hot,
            missing_ratings,
        }
    }

    /// Width of a row carrying every selected prompt class.
    pub fn row_width(&self) -> usize {
        self.schemes
            .iter()
            .map(|scheme| scheme_width(scheme, self.one_hot))
            .sum()
    }

    fn includes_criteria(&self) -> bool {
        self.schemes
            .iter()
            .any(|scheme| scheme.kind == SchemeKind::MultiCriteria)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FeatureWriteSummary {
    pub rows: usize,
    pub mismatched_rows: usize,
}

pub fn run(args: BuildFeaturesArgs) -> Result<()> {
    let config = FeatureConfig::new(args.mode, !args.no_one_hot, args.missing_ratings);

    let criteria = match (&args.criteria_dir, &args.criterion) {
        (Some(_), _) if !config.includes_criteria() => bail!(
            "--criteria-dir requires a mode with the multi-criteria scheme, got '{}'",
            config.mode.as_str()
        ),
        (Some(_), requested) => Some(resolve_criteria(requested.as_deref())?),
        (None, Some(_)) => bail!("--criterion requires --criteria-dir"),
        (None, None) => None,
    };

    info!(
        mode = config.mode.as_str(),
        one_hot = config.one_hot,
        prompt_classes = ?config.schemes.iter().map(|scheme| scheme.name).collect::<Vec<_>>(),
        "building feature vectors"
    );

    let labels = read_qrel(&args.qrel)?;
    let queries = load_queries(&args.judgments, args.max_queries, args.max_paragraphs)?;

    if let (Some(dir), Some(criteria)) = (&args.criteria_dir, &criteria) {
        export_criterion_runs(&queries, criteria_scheme(), dir, criteria)?;
    }

    let summary = write_ranklib_features(&queries, &labels, &config, &args.output)?;
    info!(
        path = %args.output.display(),
        rows = summary.rows,
        mismatched_rows = summary.mismatched_rows,
        "wrote RankLib features"
    );

    Ok(())
}

pub fn write_ranklib_features(
    queries: &[Query],
    labels: &RelevanceLabels,
    config: &FeatureConfig,
    output: &Path,
) -> Result<FeatureWriteSummary> {
    let stats = RatingStats::from_queries(queries);
    debug!(rating_ids = stats.rating_ids(), "computed rating histogram");

    ensure_parent_directory(output)?;
    let file =
        File::create(output).with_context(|| format!("failed to create {}", output.display()))?;
    let mut writer = BufWriter::new(file);

    let expected_width = config.row_width();
    let mut summary = FeatureWriteSummary::default();

    for query in queries {
        debug!(query_id = %query.query_id, paragraphs = query.paragraphs.len(), "processing query");
        for paragraph in &query.paragraphs {
            let row = build_row(&query.query_id, paragraph, config, &stats, labels);

            if row.values.len() != expected_width {
                summary.mismatched_rows += 1;
                warn!(
                    query_id = %row.query_id,
                    doc_id = %row.doc_id,
                    expected = expected_width,
                    found = row.values.len(),
                    "feature row width differs from the prompt class layout"
                );
            }

            writeln!(writer, "{}", row.to_ranklib_line())
                .with_context(|| format!("failed to write {}", output.display()))?;
            summary.rows += 1;
        }
    }

    writer
        .flush()
        .with_context(|| format!("failed to flush {}", output.display()))?;
    Ok(summary)
}

pub fn build_row(
    query_id: &str,
    paragraph: &Paragraph,
    config: &FeatureConfig,
    stats: &RatingStats,
    labels: &RelevanceLabels,
) -> FeatureRow {
    let label = labels.label(query_id, &paragraph.paragraph_id);
    let mut row = FeatureRow::new(query_id.to_string(), paragraph.paragraph_id.clone(), label);

    for scheme in &config.schemes {
        let ratings = paragraph_ratings(paragraph, scheme);
        if ratings.is_empty() && config.missing_ratings == MissingRatings::Skip {
            debug!(
                prompt_class = scheme.name,
                doc_id = %paragraph.paragraph_id,
                "no ratings, omitting prompt class"
            );
            continue;
        }
        append_scheme_features(&mut row, scheme, &ratings, stats, config.one_hot);
    }

    debug!(
        query_id = %row.query_id,
        doc_id = %row.doc_id,
        label = row.label,
        features = row.values.len(),
        "assembled feature row"
    );
    for (index, (value, name)) in row.values.iter().zip(&row.names).enumerate() {
        trace!(position = index + 1, value = *value, name = %name, "feature");
    }

    row
}
