use std::collections::{BTreeMap, HashMap};

use crate::judgments::{GradeFilter, collect_ratings, retrieve_grades};
use crate::model::{DocId, Paragraph, Query, QueryId, RatingId};

use super::schemes::PromptScheme;

/// Rating distribution per rating id across the whole judged set.
#[derive(Debug, Clone, Default)]
pub struct RatingStats {
    histogram: HashMap<RatingId, BTreeMap<i64, usize>>,
    mean: HashMap<RatingId, f64>,
}

impl RatingStats {
    pub fn from_queries(queries: &[Query]) -> Self {
        let mut histogram: HashMap<RatingId, BTreeMap<i64, usize>> = HashMap::new();
        for query in queries {
            for paragraph in &query.paragraphs {
                for grade in retrieve_grades(paragraph, GradeFilter::self_rated()) {
                    for rating in grade.ratings() {
                        *histogram
                            .entry(rating.id().to_string())
                            .or_default()
                            .entry(rating.self_rating)
                            .or_default() += 1;
                    }
                }
            }
        }

        let mean = histogram
            .iter()
            .filter_map(|(id, counts)| {
                let total: usize = counts.values().sum();
                if total == 0 {
                    return None;
                }
                let weighted: f64 = counts
                    .iter()
                    .map(|(rating, count)| *rating as f64 * *count as f64)
                    .sum();
                Some((id.clone(), weighted / total as f64))
            })
            .collect();

        Self { histogram, mean }
    }

    pub fn rating_ids(&self) -> usize {
        self.histogram.len()
    }

    pub fn mean_rating(&self, id: &str) -> f64 {
        self.mean.get(id).copied().unwrap_or(0.0)
    }

    pub fn informativeness(&self, id: &str) -> usize {
        self.histogram
            .get(id)
            .map(|counts| {
                counts.get(&4).copied().unwrap_or(0) + counts.get(&5).copied().unwrap_or(0)
            })
            .unwrap_or(0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortKey {
    MeanRating,
    Informativeness,
    Rating,
}

impl SortKey {
    fn as_str(self) -> &'static str {
        match self {
            Self::MeanRating => "mean_rating",
            Self::Informativeness => "informativeness",
            Self::Rating => "rating",
        }
    }

    fn key(self, stats: &RatingStats, id: &str, rating: i64) -> f64 {
        match self {
            Self::MeanRating => stats.mean_rating(id),
            Self::Informativeness => stats.informativeness(id) as f64,
            Self::Rating => rating as f64,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Encoding {
    Integer,
    OneHot,
}

/// One RankLib row. `names` runs parallel to `values`.
#[derive(Debug, Clone)]
pub struct FeatureRow {
    pub query_id: QueryId,
    pub doc_id: DocId,
    pub label: i64,
    pub values: Vec<usize>,
    pub names: Vec<String>,
}

impl FeatureRow {
    pub fn new(query_id: QueryId, doc_id: DocId, label: i64) -> Self {
        Self {
            query_id,
            doc_id,
            label,
            values: Vec::new(),
            names: Vec::new(),
        }
    }

    fn push(&mut self, value: usize, name: String) {
        self.values.push(value);
        self.names.push(name);
    }

    pub fn to_ranklib_line(&self) -> String {
        let mut line = format!("{} qid:{}", self.label, self.query_id);
        for (index, value) in self.values.iter().enumerate() {
            line.push_str(&format!(" {}:{}", index + 1, value));
        }
        line.push_str(&format!(" # {}", self.doc_id));
        line
    }
}

pub fn one_hot(scheme: &PromptScheme, rating: u32) -> Vec<usize> {
    let mut encoded = vec![0; scheme.one_hot_len()];
    encoded[scheme.clamp(i64::from(rating)) as usize] = 1;
    encoded
}

/// Sorts descending by `key` (stable), truncates or zero-pads to the expected
/// length and clamps each slot into the valid range.
pub fn sorted_padded(
    scheme: &PromptScheme,
    ratings: &[(RatingId, i64)],
    key: SortKey,
    stats: &RatingStats,
) -> Vec<u32> {
    let mut sorted: Vec<&(RatingId, i64)> = ratings.iter().collect();
    sorted.sort_by(|a, b| {
        key.key(stats, &b.0, b.1)
            .total_cmp(&key.key(stats, &a.0, a.1))
    });

    let mut slots: Vec<u32> = sorted
        .into_iter()
        .take(scheme.expected_len)
        .map(|(_, rating)| scheme.clamp(*rating))
        .collect();
    slots.resize(scheme.expected_len, 0);
    slots
}

fn push_sorted(
    row: &mut FeatureRow,
    scheme: &PromptScheme,
    ratings: &[(RatingId, i64)],
    key: SortKey,
    encoding: Encoding,
    stats: &RatingStats,
) {
    let slots = sorted_padded(scheme, ratings, key, stats);
    for (slot, rating) in slots.into_iter().enumerate() {
        match encoding {
            Encoding::Integer => row.push(
                rating as usize,
                format!("{}_int_{}_{slot}", scheme.name, key.as_str()),
            ),
            Encoding::OneHot => {
                for (position, bit) in one_hot(scheme, rating).into_iter().enumerate() {
                    row.push(
                        bit,
                        format!("{}_one_hot_{}_{slot}_{position}", scheme.name, key.as_str()),
                    );
                }
            }
        }
    }
}

/// Appends one prompt class's slice to `row`. An empty `ratings` list yields
/// the zero-padded slice.
pub fn append_scheme_features(
    row: &mut FeatureRow,
    scheme: &PromptScheme,
    ratings: &[(RatingId, i64)],
    stats: &RatingStats,
    with_one_hot: bool,
) {
    if scheme.is_small_range() {
        let rating = ratings
            .first()
            .map(|(_, rating)| scheme.clamp(*rating))
            .unwrap_or(0);
        row.push(rating as usize, format!("{}_integer_rating", scheme.name));
        if with_one_hot {
            for (position, bit) in one_hot(scheme, rating).into_iter().enumerate() {
                row.push(bit, format!("{}_one_hot_{position}", scheme.name));
            }
        }
        return;
    }

    let mut plan = vec![(SortKey::MeanRating, Encoding::Integer)];
    if with_one_hot {
        plan.push((SortKey::MeanRating, Encoding::OneHot));
        if scheme.has_informativeness() {
            plan.push((SortKey::Informativeness, Encoding::OneHot));
        }
    }
    plan.push((SortKey::Rating, Encoding::Integer));
    if with_one_hot {
        plan.push((SortKey::Rating, Encoding::OneHot));
    }

    for (key, encoding) in plan {
        push_sorted(row, scheme, ratings, key, encoding, stats);
    }

    for threshold in 0..i64::from(scheme.max_valid()) {
        let count = ratings
            .iter()
            .filter(|(_, rating)| *rating >= threshold)
            .count();
        row.push(count, format!("{}_count_geq_{threshold}", scheme.name));
    }
}

/// Width of one prompt class's slice, independent of the ratings seen.
pub fn scheme_width(scheme: &PromptScheme, with_one_hot: bool) -> usize {
    let one_hot_len = if with_one_hot { scheme.one_hot_len() } else { 0 };
    if scheme.is_small_range() {
        return 1 + one_hot_len;
    }

    let informativeness = if with_one_hot && scheme.has_informativeness() {
        scheme.expected_len * one_hot_len
    } else {
        0
    };

    2 * scheme.expected_len * (1 + one_hot_len) + informativeness + scheme.max_valid() as usize
}

pub fn paragraph_ratings(
    paragraph: &Paragraph,
    scheme: &PromptScheme,
) -> Vec<(RatingId, i64)> {
    collect_ratings(paragraph, GradeFilter::prompt_class(scheme.name))
}
