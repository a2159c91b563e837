use serde::{Deserialize, Serialize};

pub type QueryId = String;
pub type DocId = String;
pub type RatingId = String;

#[derive(Debug, Clone, Deserialize)]
pub struct SelfRating {
    #[serde(default)]
    pub question_id: Option<String>,
    #[serde(default)]
    pub nugget_id: Option<String>,
    #[serde(default, alias = "criterion")]
    pub criterion_id: Option<String>,
    pub self_rating: i64,
}

impl SelfRating {
    pub fn id(&self) -> &str {
        self.question_id
            .as_deref()
            .or(self.nugget_id.as_deref())
            .or(self.criterion_id.as_deref())
            .unwrap_or("")
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PromptInfo {
    #[serde(default)]
    pub prompt_class: Option<String>,
    #[serde(default)]
    pub is_self_rated: Option<bool>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ExamGrade {
    #[serde(default)]
    pub prompt_info: Option<PromptInfo>,
    #[serde(default)]
    pub self_ratings: Option<Vec<SelfRating>>,
}

impl ExamGrade {
    pub fn prompt_class(&self) -> Option<&str> {
        self.prompt_info
            .as_ref()
            .and_then(|info| info.prompt_class.as_deref())
    }

    pub fn is_self_rated(&self) -> bool {
        self.prompt_info
            .as_ref()
            .and_then(|info| info.is_self_rated)
            .unwrap_or_else(|| self.self_ratings.as_ref().is_some_and(|r| !r.is_empty()))
    }

    pub fn ratings(&self) -> &[SelfRating] {
        self.self_ratings.as_deref().unwrap_or(&[])
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct Paragraph {
    pub paragraph_id: DocId,
    #[serde(default)]
    pub exam_grades: Option<Vec<ExamGrade>>,
}

impl Paragraph {
    pub fn exam_grades(&self) -> &[ExamGrade] {
        self.exam_grades.as_deref().unwrap_or(&[])
    }
}

#[derive(Debug, Clone)]
pub struct Query {
    pub query_id: QueryId,
    pub paragraphs: Vec<Paragraph>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunEntryRecord {
    pub query_id: serde_json::Value,
    pub document_id: serde_json::Value,
    pub rank: serde_json::Value,
    pub score: serde_json::Value,
    pub method: serde_json::Value,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Evaluated,
    Skipped,
}

#[derive(Debug, Clone, Serialize)]
pub struct EvaluatedRun {
    pub label: String,
    pub path: String,
    pub sha256: Option<String>,
    pub status: RunStatus,
    pub metric_value: Option<String>,
    pub failure_reason: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct EvaluationManifest {
    pub manifest_version: u32,
    pub started_at: String,
    pub finished_at: String,
    pub qrels_path: String,
    pub runs_dir: String,
    pub metric: String,
    pub cleaned: bool,
    pub max_queries: Option<usize>,
    pub max_docs_per_query: Option<usize>,
    pub evaluated_count: usize,
    pub skipped_count: usize,
    pub runs: Vec<EvaluatedRun>,
}
