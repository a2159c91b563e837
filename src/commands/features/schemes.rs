use crate::cli::FeatureMode;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchemeKind {
    /// One relevance grade per paragraph.
    Direct,
    /// Many graded nuggets or questions per paragraph.
    Rubric,
    /// One grade per fixed criterion.
    MultiCriteria,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PromptScheme {
    pub name: &'static str,
    pub valid: &'static [u32],
    pub expected_len: usize,
    pub kind: SchemeKind,
}

impl PromptScheme {
    pub fn max_valid(&self) -> u32 {
        self.valid.iter().copied().max().unwrap_or(0)
    }

    pub fn one_hot_len(&self) -> usize {
        self.max_valid() as usize + 1
    }

    pub fn clamp(&self, rating: i64) -> u32 {
        u32::try_from(rating)
            .ok()
            .filter(|value| self.valid.contains(value))
            .unwrap_or(0)
    }

    pub fn is_small_range(&self) -> bool {
        self.valid.len() <= 3 && self.kind != SchemeKind::MultiCriteria
    }

    /// Informativeness counts 4 and 5 grades, so it only means something on rubric scales.
    pub fn has_informativeness(&self) -> bool {
        self.kind == SchemeKind::Rubric
    }
}

const ZERO_TO_FIVE: &[u32] = &[0, 1, 2, 3, 4, 5];
const ZERO_TO_THREE: &[u32] = &[0, 1, 2, 3];
const BINARY: &[u32] = &[0, 1];
const TERNARY: &[u32] = &[0, 1, 2];

const RUBRIC_EXPECTED_LEN: usize = 10;
const CRITERIA_EXPECTED_LEN: usize = 4;

pub const NUGGET_SCHEMES: &[PromptScheme] = &[PromptScheme {
    name: "NuggetSelfRatedPrompt",
    valid: ZERO_TO_FIVE,
    expected_len: RUBRIC_EXPECTED_LEN,
    kind: SchemeKind::Rubric,
}];

pub const QUESTION_SCHEMES: &[PromptScheme] = &[PromptScheme {
    name: "QuestionSelfRatedUnanswerablePromptWithChoices",
    valid: ZERO_TO_FIVE,
    expected_len: RUBRIC_EXPECTED_LEN,
    kind: SchemeKind::Rubric,
}];

pub const CRITERIA_SCHEMES: &[PromptScheme] = &[PromptScheme {
    name: "CriteriaSelfRatedPrompt",
    valid: ZERO_TO_THREE,
    expected_len: CRITERIA_EXPECTED_LEN,
    kind: SchemeKind::MultiCriteria,
}];

pub const DIRECT_SCHEMES: &[PromptScheme] = &[
    direct("FagB", BINARY),
    direct("FagB_few", BINARY),
    direct("HELM", BINARY),
    direct("Sun", BINARY),
    direct("Sun_few", BINARY),
    direct("Thomas", TERNARY),
];

const fn direct(name: &'static str, valid: &'static [u32]) -> PromptScheme {
    PromptScheme {
        name,
        valid,
        expected_len: 1,
        kind: SchemeKind::Direct,
    }
}

/// Prompt classes contributing to a row, in emission order.
pub fn schemes_for(mode: FeatureMode) -> Vec<&'static PromptScheme> {
    let groups: &[&'static [PromptScheme]] = match mode {
        FeatureMode::None => &[DIRECT_SCHEMES],
        FeatureMode::Nuggets => &[NUGGET_SCHEMES],
        FeatureMode::Questions => &[QUESTION_SCHEMES],
        FeatureMode::MultiCriteria => &[CRITERIA_SCHEMES],
        FeatureMode::Standard => &[NUGGET_SCHEMES, QUESTION_SCHEMES, DIRECT_SCHEMES],
        FeatureMode::All => &[
            NUGGET_SCHEMES,
            QUESTION_SCHEMES,
            CRITERIA_SCHEMES,
            DIRECT_SCHEMES,
        ],
    };

    groups.iter().copied().flatten().collect()
}

pub fn criteria_scheme() -> &'static PromptScheme {
    &CRITERIA_SCHEMES[0]
}
