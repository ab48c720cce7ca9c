use super::language::Language;
use super::question_group::QuestionGroup;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Output of the document renderer.
#[derive(Debug, Clone)]
pub struct RenderedDocument {
    pub bytes: Vec<u8>,
    pub preview_image: Vec<u8>,
    /// Every rendered line in page order, newline separated.
    pub text: String,
    pub page_count: usize,
}

/// The persisted quiz entity.
#[derive(Debug, Clone)]
pub struct QuizRecord {
    pub id: Uuid,
    pub owner_id: Option<String>,
    pub title: String,
    pub question_groups: Vec<QuestionGroup>,
    pub document: Vec<u8>,
    pub document_text: String,
    pub embedding: Vec<f32>,
    pub preview_image: Vec<u8>,
    pub language: Language,
    pub prompt: String,
    pub created_at: DateTime<Utc>,
    /// Set only on records returned by a similarity query.
    pub relevance_score: Option<f32>,
}

impl QuizRecord {
    pub fn is_embedded(&self) -> bool {
        !self.embedding.is_empty()
    }

    pub fn with_relevance(mut self, score: f32) -> Self {
        self.relevance_score = Some(score);
        self
    }
}

/// Listing projection of a quiz, newest first in owner listings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuizSummary {
    pub id: Uuid,
    pub title: String,
    pub language: Language,
    pub prompt: String,
    pub preview_image: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PromptCount {
    pub prompt: String,
    pub count: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct PaginatedQuizzes {
    pub items: Vec<QuizSummary>,
    pub total: i64,
    pub page: i64,
    pub per_page: i64,
    pub total_pages: i64,
}

impl PaginatedQuizzes {
    pub fn new(items: Vec<QuizSummary>, total: i64, page: i64, per_page: i64) -> Self {
        let total_pages = if per_page > 0 {
            ((total as f64) / (per_page as f64)).ceil() as i64
        } else {
            1
        };
        Self {
            items,
            total,
            page,
            per_page,
            total_pages,
        }
    }
}
