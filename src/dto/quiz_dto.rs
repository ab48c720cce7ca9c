use crate::models::language::Language;
use crate::models::question_group::QuestionGroup;
use crate::models::quiz::{PromptCount, QuizRecord};
use crate::services::quiz_store::DEFAULT_PAGE_SIZE;
use crate::utils::encoding::{to_data_url, PNG_MIME};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct GenerationRequest {
    #[validate(length(min = 1, max = 200))]
    pub title: String,
    #[validate(range(min = 1, max = 100, message = "Question count must be between 1 and 100"))]
    #[serde(alias = "questionCount")]
    pub question_count: u32,
    #[validate(length(min = 1, max = 4000))]
    pub prompt: String,
    pub language: Language,
    #[serde(default, alias = "ownerId")]
    pub owner_id: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneratedQuizResponse {
    pub id: Uuid,
    pub title: String,
    pub language: Language,
    pub question_groups: Vec<QuestionGroup>,
    pub embedded: bool,
    pub preview_image: String,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context_quizzes: Option<usize>,
}

impl GeneratedQuizResponse {
    pub fn with_context_quizzes(mut self, count: usize) -> Self {
        self.context_quizzes = Some(count);
        self
    }
}

impl From<QuizRecord> for GeneratedQuizResponse {
    fn from(value: QuizRecord) -> Self {
        Self {
            id: value.id,
            embedded: value.is_embedded(),
            preview_image: to_data_url(PNG_MIME, &value.preview_image),
            title: value.title,
            language: value.language,
            question_groups: value.question_groups,
            created_at: value.created_at,
            context_quizzes: None,
        }
    }
}

/// A stored quiz without its document bytes or raw vector.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuizDetailResponse {
    pub id: Uuid,
    pub owner_id: Option<String>,
    pub title: String,
    pub language: Language,
    pub prompt: String,
    pub question_groups: Vec<QuestionGroup>,
    pub embedded: bool,
    pub preview_image: String,
    pub created_at: DateTime<Utc>,
}

impl From<QuizRecord> for QuizDetailResponse {
    fn from(value: QuizRecord) -> Self {
        Self {
            id: value.id,
            embedded: value.is_embedded(),
            preview_image: to_data_url(PNG_MIME, &value.preview_image),
            owner_id: value.owner_id,
            title: value.title,
            language: value.language,
            prompt: value.prompt,
            question_groups: value.question_groups,
            created_at: value.created_at,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct QuizListQuery {
    pub page: Option<i64>,
    pub size: Option<i64>,
}

impl QuizListQuery {
    pub fn page(&self) -> i64 {
        self.page.unwrap_or(0).max(0)
    }

    pub fn size(&self) -> i64 {
        self.size.unwrap_or(DEFAULT_PAGE_SIZE).clamp(1, 100)
    }

    /// Row offset of the requested page, `None` when it does not fit in an `i64`.
    pub fn offset(&self) -> Option<i64> {
        self.page().checked_mul(self.size())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PromptRecommendationsResponse {
    pub owner_id: String,
    pub prompts: Vec<PromptCount>,
}
